mod common;

use common::{num, run};
use pretty_assertions::assert_eq;

#[test]
fn scopes_separated() {
    let run = run("

{
    var x = \"foo bar\";
    var y = \"baz\";
    print \"x: \" + x + \" y: \" + y;
}

{
    var x = \"bar\";
    print x;
    var z = x + y;
}
    ");

    assert_eq!(run.output(), "x: foo bar y: baz\nbar\n");
    assert_eq!(run.errors(), vec!["12:17 - Undefined variable 'y'."]);
    assert_eq!(run.exit_code(), 70);
}

#[test]
fn reports_every_syntax_error_in_one_pass() {
    let run = run("print ;\nvar 1 = 2;\nfun (a) {}\nprint \"fine\";\nclass { }");

    assert_eq!(
        run.errors(),
        vec![
            "1:7 - Error at ';': Expect expression.",
            "2:5 - Error at '1': Expect variable name.",
            "3:5 - Error at '(': Expect function name.",
            "5:7 - Error at '{': Expect class name.",
        ]
    );
    // Nothing runs once the file has syntax errors.
    assert_eq!(run.output(), "");
    assert_eq!(run.exit_code(), 65);
}

#[test]
fn lexical_errors_are_collected_too() {
    let run = run("var a = 1 #;\nvar s = \"open");
    assert_eq!(
        run.errors(),
        vec![
            "1:11 - Error: Unexpected character '#'.",
            "2:9 - Error: Unterminated string.",
            "2:14 - Error at end: Expect expression.",
        ]
    );
}

#[test]
fn resolution_errors_stop_execution() {
    let run = run("print \"before\";\nreturn;");
    assert_eq!(run.errors(), vec!["2:1 - Error at 'return': Can't return from top-level code."]);
    assert_eq!(run.output(), "");
    assert_eq!(run.exit_code(), 65);
}

#[test]
fn division_by_zero() {
    let run = run("var a = 1;\nprint a / 0;\na = 2;");
    assert_eq!(run.errors(), vec!["2:9 - Division by zero."]);
    // The rest of the program is abandoned.
    assert_eq!(run.global("a"), num(1.0));
    assert_eq!(run.exit_code(), 70);
}

#[test]
fn modulo_by_zero() {
    let run = run("print 5 % 0;");
    assert_eq!(run.errors(), vec!["1:9 - Division by zero."]);
}

#[test]
fn operand_type_errors() {
    let cases = [
        ("print -\"a\";", "1:7 - Operand must be a number."),
        ("print 1 < \"a\";", "1:9 - Operands must be numbers."),
        ("print nil + 1;", "1:11 - Operands must be two numbers or at least one string."),
        ("print \"a\" * 2;", "1:11 - Operands must be numbers."),
        ("var x = 1; x -= \"a\";", "1:14 - Operands must be numbers."),
    ];
    for (source, expected) in cases {
        assert_eq!(run(source).errors(), vec![expected], "{source}");
    }
}

#[test]
fn call_errors() {
    let cases = [
        ("\"text\"();", "1:8 - Can only call functions and classes."),
        ("fun f(a, b) {}\nf(1);", "2:4 - Expected 2 arguments but got 1."),
        ("clock(1);", "1:8 - Expected 0 arguments but got 1."),
        ("print 1.field;", "1:9 - Only instances and classes have properties."),
        ("var n = 1; n.field = 2;", "1:14 - Only instances and classes have fields."),
        ("print missing;", "1:7 - Undefined variable 'missing'."),
        ("missing = 1;", "1:1 - Undefined variable 'missing'."),
    ];
    for (source, expected) in cases {
        assert_eq!(run(source).errors(), vec![expected], "{source}");
    }
}

#[test]
fn unbounded_recursion_is_a_runtime_error() {
    let run = run("fun down(n) { return down(n + 1); }\ndown(0);");
    assert_eq!(run.errors(), vec!["1:32 - Stack overflow."]);
    assert_eq!(run.exit_code(), 70);
}

#[test]
fn runtime_error_inside_a_function_restores_scope() {
    let run = run("var a = \"global\";\nfun f() { var a = \"local\"; return 1 / 0; }\nf();");
    assert_eq!(run.errors(), vec!["2:37 - Division by zero."]);

    // The session keeps working, and globals are visible again.
    let mut run = run;
    run.compiler.reset_errors();
    run.compiler.run_source(None, "print a;", &mut run.interp);
    assert!(run.compiler.diagnostics().is_empty());
    assert_eq!(run.output(), "global\n");
}
