//! API to control the interpreter.

use std::io::prelude::*;
use std::rc::Rc;

use crate::ast::ExprId;
use crate::ctx::Context;
use crate::diag::Diagnostics;
use crate::eval::Evaluator;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;

/// What a run of one source unit amounted to.  The driver maps these to its
/// exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A scan, parse, or resolve error; the program was not executed.
    StaticError,
    /// Execution started and stopped at a runtime error.
    RuntimeError,
}

/// Tree-walk interpreter.
///
/// One value holds a whole session: globals, interned symbols, and resolved
/// variable distances persist across [`Interpreter::run`] calls, so a REPL
/// can define a function on one line and call it on the next.
///
/// # Example
///
/// ```
/// use loxen::interpreter::{Interpreter, Outcome};
///
/// let mut output: Vec<u8> = Vec::new();
/// let mut interp = Interpreter::new(&mut output);
///
/// let func_def = r#"
///     fun max(x, y) {
///         if (x > y) {
///             return x;
///         } else {
///             return y;
///         }
///     }
/// "#;
/// assert_eq!(interp.run(func_def), Outcome::Success);
/// assert_eq!(interp.run("println(max(10, 20));"), Outcome::Success);
/// assert_eq!(interp.run("println(max(5, 4));"), Outcome::Success);
///
/// assert_eq!(output, b"20\n5\n");
/// ```
#[derive(Debug)]
pub struct Interpreter<'t, W: Write> {
    ctx: Rc<Context>,
    diagnostics: Rc<Diagnostics>,
    evaluator: Evaluator<'t, W>,
    next_expr_id: ExprId,
}

impl<W: Write> Interpreter<'_, W> {
    pub fn new(output: &mut W) -> Interpreter<'_, W> {
        let ctx = Context::new();
        let diagnostics = Diagnostics::new();
        Interpreter {
            ctx: ctx.clone(),
            diagnostics,
            evaluator: Evaluator::new(output, ctx),
            next_expr_id: 0,
        }
    }

    /// Runs one source unit through the pipeline.  The evaluator is only
    /// invoked when the front end reported nothing; diagnostics from the run
    /// are available through [`Interpreter::reports`].
    pub fn run(&mut self, source: &str) -> Outcome {
        self.diagnostics.reset();

        let tokens =
            Scanner::new(source, self.ctx.clone(), self.diagnostics.clone()).scan_tokens();
        let mut parser = Parser::new(tokens, self.diagnostics.clone(), self.next_expr_id);
        let statements = parser.parse();
        self.next_expr_id = parser.next_expr_id();

        let locals = Resolver::new(self.diagnostics.clone()).resolve(&statements);
        if self.diagnostics.had_error() {
            return Outcome::StaticError;
        }

        self.evaluator.add_locals(locals);
        if let Err(error) = self.evaluator.interpret(&statements) {
            self.diagnostics
                .runtime_error(error.pos, &error.to_string());
            return Outcome::RuntimeError;
        }
        Outcome::Success
    }

    /// Removes and returns the diagnostics rendered by the last run.
    pub fn reports(&self) -> Vec<String> {
        self.diagnostics.take_reports()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpret(source: &str) -> (Outcome, String, Vec<String>) {
        let mut raw_output: Vec<u8> = Vec::new();
        let mut interp = Interpreter::new(&mut raw_output);
        let outcome = interp.run(source);
        let reports = interp.reports();
        let output = String::from_utf8(raw_output).expect("cannot convert output to string");
        (outcome, output, reports)
    }

    fn expect_output(source: &str, expected: &str) {
        let (outcome, output, reports) = interpret(source);
        assert_eq!(outcome, Outcome::Success, "reports: {:?}", reports);
        assert_eq!(output, expected);
    }

    #[test]
    fn print_expr() {
        expect_output("print 3 * 2;", "6");
    }

    #[test]
    fn empty_program_succeeds_silently() {
        expect_output("", "");
    }

    #[test]
    fn static_errors_skip_execution() {
        let (outcome, output, reports) = interpret("print 1; var 2;");
        assert_eq!(outcome, Outcome::StaticError);
        assert_eq!(output, "", "nothing may execute after a front-end error");
        assert_eq!(
            reports,
            vec!["[line 1] Error at '2': Expect variable name."]
        );
    }

    #[test]
    fn runtime_errors_render_message_then_line() {
        let (outcome, output, reports) = interpret("print 1;\nprint missing;\nprint 2;");
        assert_eq!(outcome, Outcome::RuntimeError);
        assert_eq!(output, "1", "execution stops at the failing statement");
        assert_eq!(reports, vec!["Undefined variable 'missing'.\n[line 2]"]);
    }

    #[test]
    fn several_static_errors_accumulate_in_one_run() {
        let (outcome, _, reports) = interpret("var 1;\nprint ==;\nbreak;");
        assert_eq!(outcome, Outcome::StaticError);
        assert!(reports.len() >= 3, "reports: {:?}", reports);
    }

    #[test]
    fn session_state_survives_across_runs() {
        let mut output: Vec<u8> = Vec::new();
        let mut interp = Interpreter::new(&mut output);
        assert_eq!(interp.run("var greeting = \"hello\";"), Outcome::Success);
        assert_eq!(interp.run("println(greeting);"), Outcome::Success);
        assert_eq!(output, b"hello\n");
    }

    #[test]
    fn closures_created_in_one_run_still_resolve_in_later_runs() {
        let mut output: Vec<u8> = Vec::new();
        let mut interp = Interpreter::new(&mut output);
        let def = r#"
            fun mk() {
                var i = 0;
                fun inc() {
                    i = i + 1;
                    return i;
                }
                return inc;
            }
        "#;
        assert_eq!(interp.run(def), Outcome::Success);
        assert_eq!(interp.run("var f = mk();"), Outcome::Success);
        assert_eq!(interp.run("print f(); print f();"), Outcome::Success);
        assert_eq!(output, b"12");
    }

    #[test]
    fn a_failed_line_does_not_poison_the_session() {
        let mut output: Vec<u8> = Vec::new();
        let mut interp = Interpreter::new(&mut output);
        assert_eq!(interp.run("var x = ;"), Outcome::StaticError);
        assert!(!interp.reports().is_empty());
        assert_eq!(interp.run("var x = 7; print x;"), Outcome::Success);
        assert!(interp.reports().is_empty());
        assert_eq!(output, b"7");
    }
}
