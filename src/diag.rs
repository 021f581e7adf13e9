use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use thiserror::Error;

/// Line number (starting at one).
pub type Position = u32;

/// Sink for every diagnostic the pipeline produces.
///
/// The scanner, parser and resolver report here and keep going; the driver
/// consults the two flags to pick its exit code, and drains the rendered
/// reports to display them.  Shared as an `Rc` like [`crate::ctx::Context`].
#[derive(Debug, Default)]
pub struct Diagnostics {
    reports: RefCell<Vec<String>>,
    had_error: Cell<bool>,
    had_runtime_error: Cell<bool>,
}

impl Diagnostics {
    pub fn new() -> Rc<Self> {
        Rc::new(Diagnostics::default())
    }

    /// Records a scan/parse/resolve error.  `location` is either empty,
    /// `" at end"`, or `" at '<lexeme>'"`.
    pub fn static_error(&self, line: Position, location: &str, message: &str) {
        self.had_error.set(true);
        self.reports
            .borrow_mut()
            .push(format!("[line {}] Error{}: {}", line, location, message));
    }

    /// Records an execution-time error.
    pub fn runtime_error(&self, line: Position, message: &str) {
        self.had_runtime_error.set(true);
        self.reports
            .borrow_mut()
            .push(format!("{}\n[line {}]", message, line));
    }

    pub fn had_error(&self) -> bool {
        self.had_error.get()
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error.get()
    }

    /// Clears flags and pending reports, e.g. between REPL lines.
    pub fn reset(&self) {
        self.had_error.set(false);
        self.had_runtime_error.set(false);
        self.reports.borrow_mut().clear();
    }

    /// Removes and returns all reports recorded so far.
    pub fn take_reports(&self) -> Vec<String> {
        self.reports.borrow_mut().drain(..).collect()
    }
}

/// A runtime error together with the source line it happened on.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub pos: Position,
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    pub fn new(pos: Position, kind: RuntimeErrorKind) -> RuntimeError {
        RuntimeError { pos, kind }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{name}'.")]
    UndefinedVariable { name: String },
    #[error("'{name}' used without initialization.")]
    UninitializedVariable { name: String },
    #[error("Attempted redeclaration of '{name}'.")]
    RedeclaredVariable { name: String },
    #[error("'{operator}' operand must be a number.")]
    OperandMustBeNumber { operator: &'static str },
    #[error("'{operator}' operands must be a number.")]
    OperandsMustBeNumbers { operator: &'static str },
    #[error("'+' operands must be numbers or strings.")]
    AddOperands,
    #[error("'\\' can only be used on strings.")]
    BackslashOnNonString,
    #[error("Can only increment or decrement variables.")]
    InvalidIncrementTarget,
    #[error("Can only call functions.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {found}.")]
    ArityMismatch { expected: usize, found: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_errors_render_line_and_location() {
        let diag = Diagnostics::new();
        diag.static_error(3, " at 'x'", "Invalid assignment target");
        assert!(diag.had_error());
        assert!(!diag.had_runtime_error());
        assert_eq!(
            diag.take_reports(),
            vec!["[line 3] Error at 'x': Invalid assignment target"]
        );
    }

    #[test]
    fn runtime_errors_render_message_then_line() {
        let diag = Diagnostics::new();
        diag.runtime_error(7, "Undefined variable 'x'.");
        assert!(diag.had_runtime_error());
        assert_eq!(diag.take_reports(), vec!["Undefined variable 'x'.\n[line 7]"]);
    }

    #[test]
    fn reset_clears_flags_and_reports() {
        let diag = Diagnostics::new();
        diag.static_error(1, "", "Unterminated string.");
        diag.reset();
        assert!(!diag.had_error());
        assert!(diag.take_reports().is_empty());
    }
}
