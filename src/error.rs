//! Diagnostics shared by every pass
//!
//! Every user-facing failure is a [`CompileError`]. Errors are fatal for the
//! compilation unit, so passes return the first one they hit and the pipeline
//! stops there. Violations of the invariants one pass guarantees to the next
//! are bugs in the compiler and panic instead.

use colored::Colorize;

use crate::{
    config::Config,
    frontend::{SourceFile, Span},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Two bindings introduced together (parameters of one function, elements
    /// of one tuple pattern) or two declarations share a name
    DuplicateSymbol { name: String },
    /// `_` was used as an expression
    UndeclaredWildcardUse,
    /// A type annotation names neither a primitive nor a declared alias
    UnknownType { name: String },
    TypeMismatch { left: String, right: String },
    ArityMismatch {
        shape: ArityShape,
        left_count: usize,
        right_count: usize,
        left: String,
        right: String,
    },
    /// Unifying would create an infinite type
    OccursCheck { variable: String, ty: String },
    CannotInfer { what: String, ty: String },
    IllegalComparison {
        operator: String,
        ty: String,
        ordering: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityShape {
    Function,
    Tuple,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSymbol { name } => {
                write!(f, "symbol '{name}' is defined more than once in the same scope")
            }
            Self::UndeclaredWildcardUse => {
                write!(f, "'_' discards a value and cannot be referenced")
            }
            Self::UnknownType { name } => write!(f, "unknown type name '{name}'"),
            Self::TypeMismatch { left, right } => {
                write!(f, "type mismatch between '{left}' and '{right}'")
            }
            Self::ArityMismatch {
                shape,
                left_count,
                right_count,
                left,
                right,
            } => {
                let what = match shape {
                    ArityShape::Function => "parameters of function",
                    ArityShape::Tuple => "elements of tuple",
                };

                write!(
                    f,
                    "number of {what} does not match: {left_count} vs {right_count} (between '{left}' and '{right}')"
                )
            }
            Self::OccursCheck { variable, ty } => write!(
                f,
                "cyclic dependency: type variable '{variable}' occurs in '{ty}'"
            ),
            Self::CannotInfer { what, ty } => {
                write!(f, "cannot infer the type of {what}: '{ty}' is not fully determined")
            }
            Self::IllegalComparison {
                operator,
                ty,
                ordering: true,
            } => write!(f, "'{ty}' can't be compared with operator '{operator}'"),
            Self::IllegalComparison {
                operator,
                ty,
                ordering: false,
            } => write!(
                f,
                "'{ty}' can't be compared with operator '{operator}' since it contains an array or a function"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub span: Span,
    /// Context accumulated while the error propagated, innermost first
    pub notes: Vec<String>,
    origin: Option<&'static str>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            notes: Vec::new(),
            origin: None,
        }
    }

    /// Records the compiler source location which raised this error
    pub fn with_origin(mut self, origin: &'static str) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Renders the error for a terminal, with a highlighted source excerpt.
    /// Escape codes are left out unless `config.color` is set.
    pub fn render(&self, source: &SourceFile, config: &Config) -> String {
        let mut rendered = String::new();

        if let Some(origin) = self.origin {
            rendered.push_str(&format!("{}: {}\n", "backtrace".blue(), origin.white()));
        }

        rendered.push_str(&format!(
            "{}: {} {}\n",
            "error".red(),
            self.kind,
            format!("(at {})", source.format_span_position(self.span)).white()
        ));
        rendered.push_str(&source.highlight_span(self.span));

        for note in &self.notes {
            rendered.push_str(&format!("\n  {}: {note}", "note".cyan()));
        }

        if config.color {
            rendered
        } else {
            strip_ansi_escapes::strip_str(rendered)
        }
    }
}

impl core::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;

        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }

        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Builds a [`CompileError`], recording where in the compiler it was raised
/// when the `error-backtrace` feature is enabled
#[cfg(feature = "error-backtrace")]
macro_rules! report_error {
    ($kind:expr, $span:expr $(,)?) => {
        $crate::error::CompileError::new($kind, $span).with_origin(concat!(
            module_path!(),
            " (at ",
            file!(),
            ":",
            line!(),
            ")"
        ))
    };
}

#[cfg(not(feature = "error-backtrace"))]
macro_rules! report_error {
    ($kind:expr, $span:expr $(,)?) => {
        $crate::error::CompileError::new($kind, $span)
    };
}

pub(crate) use report_error;
