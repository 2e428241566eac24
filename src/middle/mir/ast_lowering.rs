use super::{Block, CallKind, Function, InstructionArena, InstructionId, Module, Value};
use crate::{
    frontend::ast::{Expression, ExpressionKind, FunctionDefinition, Identifier, Program},
    middle::{
        resolve::{ResolutionMap, ValueNameResolution},
        type_checking::{TypeEnvironment, ty::TypeKind},
    },
};

struct LoweringContext<'env> {
    resolutions: &'env ResolutionMap,
    environment: &'env mut TypeEnvironment,
    arena: InstructionArena,
    next_temporary: u32,
}

impl<'env> LoweringContext<'env> {
    fn create_temporary(&mut self) -> String {
        self.next_temporary += 1;
        format!("${}", self.next_temporary)
    }

    fn symbol_name(&self, identifier: &Identifier) -> String {
        let symbol = self.resolutions.binding(identifier);
        self.resolutions.symbol(symbol).name.clone()
    }

    fn lower_block(&mut self, name: impl Into<String>, expression: &Expression) -> Block {
        let block = self.arena.new_block(name);
        self.lower_expression(&block, expression);
        block
    }

    /// Lowers an expression and returns the name holding its value
    fn lower_operand(&mut self, block: &Block, expression: &Expression) -> String {
        let id = self.lower_expression(block, expression);
        self.arena[id].ident.clone()
    }

    fn lower_operands(&mut self, block: &Block, expressions: &[Expression]) -> Vec<String> {
        expressions
            .iter()
            .map(|expression| self.lower_operand(block, expression))
            .collect()
    }

    /// Gives the instruction holding a bound value the name of its binding,
    /// moving its type-table entry along
    fn rename(&mut self, id: InstructionId, name: String) {
        let temporary = std::mem::replace(&mut self.arena[id].ident, name.clone());

        if let Some(ty) = self.environment.table.remove(&temporary) {
            self.environment.table.insert(name, ty);
        }
    }

    fn lower_function(&mut self, block: &Block, function: &FunctionDefinition) {
        let name = self.symbol_name(&function.name);
        let parameters = function
            .parameters
            .iter()
            .map(|parameter| self.symbol_name(&parameter.name))
            .collect();

        let body = self.lower_block(format!("body ({name})"), &function.body);

        self.arena.append(
            block,
            name,
            Value::Fun(Function {
                parameters,
                body,
                is_recursive: false,
            }),
            function.name.span,
        );
    }

    /// Appends the instructions evaluating `expression` to `block` and
    /// returns the last one, which holds the value
    fn lower_expression(&mut self, block: &Block, expression: &Expression) -> InstructionId {
        let value = match &expression.kind {
            ExpressionKind::Unit => Value::Unit,
            ExpressionKind::Bool(value) => Value::Bool(*value),
            ExpressionKind::Int(value) => Value::Int(*value),
            ExpressionKind::Float(value) => Value::Float(*value),
            ExpressionKind::String(value) => Value::String(value.clone()),
            ExpressionKind::Variable(identifier) => match self.resolutions.resolution(identifier) {
                ValueNameResolution::Local(symbol) => {
                    Value::Ref(self.resolutions.symbol(symbol).name.clone())
                }
                ValueNameResolution::External(symbol) => Value::XRef(symbol.to_string()),
            },
            ExpressionKind::Unary { operator, operand } => Value::Unary {
                operator: *operator,
                operand: self.lower_operand(block, operand),
            },
            ExpressionKind::Binary { operator, lhs, rhs } => Value::Binary {
                operator: *operator,
                lhs: self.lower_operand(block, lhs),
                rhs: self.lower_operand(block, rhs),
            },
            ExpressionKind::If {
                condition,
                positive,
                negative,
            } => Value::If {
                condition: self.lower_operand(block, condition),
                positive: self.lower_block("then", positive),
                negative: self.lower_block("else", negative),
            },
            ExpressionKind::Let {
                binder,
                bound,
                body,
            } => {
                let bound = self.lower_expression(block, bound);
                let name = self.symbol_name(&binder.name);
                self.rename(bound, name);

                return self.lower_expression(block, body);
            }
            ExpressionKind::LetRec { function, body } => {
                self.lower_function(block, function);

                return self.lower_expression(block, body);
            }
            ExpressionKind::LetTuple {
                binders,
                bound,
                body,
            } => {
                let from = self.lower_operand(block, bound);

                let TypeKind::Tuple(elements) = &**self.environment.node_type(bound.id) else {
                    unreachable!("destructured value '{from}' is not a tuple")
                };
                let elements = elements.to_vec();

                for (index, (binder, ty)) in binders.iter().zip(elements).enumerate() {
                    let name = self.symbol_name(&binder.name);
                    self.environment.table.insert(name.clone(), ty);

                    self.arena.append(
                        block,
                        name,
                        Value::TupleLoad {
                            from: from.clone(),
                            index,
                        },
                        binder.name.span,
                    );
                }

                return self.lower_expression(block, body);
            }
            ExpressionKind::Apply { callee, arguments } => Value::App {
                callee: self.lower_operand(block, callee),
                arguments: self.lower_operands(block, arguments),
                kind: CallKind::Direct,
            },
            ExpressionKind::Tuple(elements) => Value::Tuple(self.lower_operands(block, elements)),
            ExpressionKind::ArrayMake { size, element } => Value::ArrayCreate {
                size: self.lower_operand(block, size),
                element: self.lower_operand(block, element),
            },
            ExpressionKind::ArrayLiteral(elements) => {
                Value::ArrayLiteral(self.lower_operands(block, elements))
            }
            ExpressionKind::ArrayLength(array) => {
                Value::ArrayLength(self.lower_operand(block, array))
            }
            ExpressionKind::ArrayGet { array, index } => Value::ArrayLoad {
                array: self.lower_operand(block, array),
                index: self.lower_operand(block, index),
            },
            ExpressionKind::ArrayPut {
                array,
                index,
                value,
            } => Value::ArrayStore {
                array: self.lower_operand(block, array),
                index: self.lower_operand(block, index),
                value: self.lower_operand(block, value),
            },
            ExpressionKind::Some(element) => Value::Some(self.lower_operand(block, element)),
            ExpressionKind::None => Value::None,
            ExpressionKind::Match {
                target,
                binder,
                some_arm,
                none_arm,
            } => {
                let target_name = self.lower_operand(block, target);

                let TypeKind::Option(element) = &**self.environment.node_type(target.id) else {
                    unreachable!("matched value '{target_name}' is not an option")
                };
                let element = element.clone();

                let condition = self.create_temporary();
                let bool = self.environment.context.bool();
                self.environment.table.insert(condition.clone(), bool);
                self.arena.append(
                    block,
                    condition.clone(),
                    Value::IsSome(target_name.clone()),
                    target.span,
                );

                let positive = self.lower_block("then", some_arm);
                let name = self.symbol_name(&binder.name);
                self.environment.table.insert(name.clone(), element);
                self.arena.prepend(
                    &positive,
                    name,
                    Value::DerefSome(target_name),
                    binder.name.span,
                );

                Value::If {
                    condition,
                    positive,
                    negative: self.lower_block("else", none_arm),
                }
            }
            ExpressionKind::Typed { child, .. } => return self.lower_expression(block, child),
        };

        let ident = self.create_temporary();
        let ty = self.environment.node_type(expression.id).clone();
        self.environment.table.insert(ident.clone(), ty);

        self.arena.append(block, ident, value, expression.span)
    }
}

/// K-normalizes a type checked program into MIR. Every temporary gets an
/// entry in the type table of `environment`.
pub fn build(
    program: &Program,
    resolutions: &ResolutionMap,
    environment: &mut TypeEnvironment,
) -> Module {
    let mut context = LoweringContext {
        resolutions,
        environment,
        arena: InstructionArena::new(),
        next_temporary: 0,
    };

    let entry = context.lower_block("program", &program.body);
    log::debug!(
        "lowered program into MIR with {} temporaries",
        context.next_temporary
    );

    Module {
        arena: context.arena,
        entry,
    }
}
