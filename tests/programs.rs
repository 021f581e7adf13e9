//! End-to-end language tests through the public facade.

use loxen::interpreter::{Interpreter, Outcome};

fn run(source: &str) -> (Outcome, String, Vec<String>) {
    let mut raw_output: Vec<u8> = Vec::new();
    let mut interp = Interpreter::new(&mut raw_output);
    let outcome = interp.run(source);
    let reports = interp.reports();
    let output = String::from_utf8(raw_output).expect("output is valid utf-8");
    (outcome, output, reports)
}

fn assert_prints(source: &str, expected: &str) {
    let (outcome, output, reports) = run(source);
    assert_eq!(outcome, Outcome::Success, "reports: {:?}", reports);
    assert_eq!(output, expected, "source: {}", source);
}

fn assert_static_error(source: &str) -> Vec<String> {
    let (outcome, _, reports) = run(source);
    assert_eq!(outcome, Outcome::StaticError, "source: {}", source);
    assert!(!reports.is_empty());
    reports
}

fn assert_runtime_error(source: &str) -> Vec<String> {
    let (outcome, _, reports) = run(source);
    assert_eq!(outcome, Outcome::RuntimeError, "source: {}", source);
    assert!(!reports.is_empty());
    reports
}

#[test]
fn arithmetic_precedence() {
    assert_prints("print 1 + 2 * 3;", "7");
}

#[test]
fn string_concatenation() {
    assert_prints("var a = \"hi\"; print a + \" \" + \"there\";", "hi there");
}

#[test]
fn closures_share_their_captured_counter() {
    let source = r#"
        fun mk() {
            var i = 0;
            fun inc() {
                i = i + 1;
                return i;
            }
            return inc;
        }
        var f = mk();
        print f();
        print f();
        print f();
    "#;
    assert_prints(source, "123");
}

#[test]
fn loop_with_continue_and_break() {
    assert_prints(
        "for (var i = 0; i < 3; i = i + 1) { if (i == 1) continue; if (i == 2) break; print i; }",
        "0",
    );
}

#[test]
fn postfix_increment() {
    assert_prints("var x = 5; print x++; print x;", "56");
}

#[test]
fn ternary_and_logical_fallback() {
    assert_prints(
        "print (true ? \"a\" : \"b\"); print (nil or \"fallback\");",
        "afallback",
    );
}

#[test]
fn backslash_postfix_appends_a_newline() {
    assert_prints("var s = \"hi\"; print s\\;", "hi\n");
}

#[test]
fn fibonacci() {
    let source = r#"
        fun fib(n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
        for (var i = 0; i < 8; i = i + 1) {
            print fib(i), " ";
        }
    "#;
    // The comma operator stringifies and joins; print adds nothing.
    assert_prints(source, "0 1 1 2 3 5 8 13 ");
}

#[test]
fn anonymous_functions_as_arguments() {
    let source = r#"
        fun twice(f, x) {
            return f(f(x));
        }
        print twice(fun (n) { return n + 3; }, 1);
    "#;
    assert_prints(source, "7");
}

#[test]
fn println_writes_a_line() {
    assert_prints("println(\"one\"); println(\"two\");", "one\ntwo\n");
}

#[test]
fn uninitialized_read_is_a_runtime_error() {
    let reports = assert_runtime_error("var x; print x;");
    assert_eq!(reports, vec!["'x' used without initialization.\n[line 1]"]);
}

#[test]
fn local_redeclaration_is_a_static_error() {
    let reports = assert_static_error("{ var x; var x; }");
    assert_eq!(
        reports,
        vec!["[line 1] Error at 'x': Already a variable with this name in this scope."]
    );
}

#[test]
fn break_outside_a_loop_is_a_static_error() {
    assert_static_error("break;");
}

#[test]
fn return_at_top_level_is_a_static_error() {
    assert_static_error("return 1;");
}

#[test]
fn calling_a_number_is_a_runtime_error() {
    let reports = assert_runtime_error("var x = 1; x(2);");
    assert_eq!(reports, vec!["Can only call functions.\n[line 1]"]);
}

#[test]
fn wrong_arity_is_a_runtime_error() {
    let reports = assert_runtime_error("fun f(a, b) {} f(1);");
    assert_eq!(reports, vec!["Expected 2 arguments but got 1.\n[line 1]"]);
}

#[test]
fn one_bad_statement_yields_many_diagnostics() {
    let reports = assert_static_error("var 1; var 2; print 3;");
    assert_eq!(reports.len(), 2);
}

#[test]
fn deeply_nested_scopes_resolve() {
    let source = r#"
        var x = "global";
        {
            var x = "outer";
            {
                var x = "inner";
                print x;
            }
            print x;
        }
        print x;
    "#;
    assert_prints(source, "innerouterglobal");
}

#[test]
fn shadowing_does_not_disturb_existing_closures() {
    // The classic resolver test: `show` must keep seeing the binding it
    // captured, not the later shadowing declaration.
    let source = r#"
        var a = "first";
        {
            fun show() {
                print a;
            }
            show();
            var a = "second";
            show();
        }
    "#;
    assert_prints(source, "firstfirst");
}

#[test]
fn empty_program() {
    assert_prints("", "");
}
