mod common;

use common::{num, run, string};
use pretty_assertions::assert_eq;

#[test]
fn fields_round_trip() {
    let run = run("
class Box {}
var b = Box();
b.value = 42;
var result = b.value;
print b;
print Box;
");
    assert_eq!(run.global("result"), num(42.0));
    assert_eq!(run.output(), "Box instance\nBox\n");
}

#[test]
fn initializer_and_methods() {
    let run = run("
class Point {
    init(x, y) {
        this.x = x;
        this.y = y;
    }

    sum() {
        return this.x + this.y;
    }
}
var p = Point(3, 4);
var result = p.sum();
var again = p.init(1, 1).sum();
");
    assert_eq!(run.global("result"), num(7.0));
    // Calling init directly returns the instance again.
    assert_eq!(run.global("again"), num(2.0));
}

#[test]
fn bound_methods_remember_their_instance() {
    let run = run("
class Greeter {
    init(name) { this.name = name; }
    greet() { return \"hi \" + this.name; }
}
var greet = Greeter(\"ada\").greet;
var result = greet();
");
    assert_eq!(run.global("result"), string("hi ada"));
}

#[test]
fn inherited_methods() {
    let run = run("
class Animal {
    speak() { return \"...\"; }
    name() { return \"animal\"; }
}
class Dog < Animal {
    speak() { return \"woof\"; }
}
var d = Dog();
var speak = d.speak();
var name = d.name();
");
    assert_eq!(run.global("speak"), string("woof"));
    assert_eq!(run.global("name"), string("animal"));
}

#[test]
fn super_dispatches_to_the_immediate_superclass() {
    let run = run("
class A {
    method() { return \"A\"; }
}
class B < A {
    method() { return \"B\"; }
    test() { return super.method(); }
}
class C < B {}
var result = C().test();
");
    assert_eq!(run.global("result"), string("A"));
}

#[test]
fn field_declarations_initialize_instances() {
    let run = run("
class Counter {
    count = 10;
    label: String;
    bump() { this.count += 1; return this.count; }
}
var c = Counter();
c.bump();
var result = c.bump();
var label = c.label;
");
    assert_eq!(run.global("result"), num(12.0));
    assert_eq!(run.global("label"), Some(vuel::Val::Nil));
}

#[test]
fn fields_are_set_after_the_super_call() {
    let run = run("
class Base {
    init(tag) { this.tag = tag; this.kind = \"base\"; }
}
class Derived < Base {
    kind = \"derived\";
    init(tag) {
        super.init(tag);
        this.seen = this.kind;
    }
}
var d = Derived(\"t\");
var tag = d.tag;
var seen = d.seen;
");
    assert_eq!(run.global("tag"), string("t"));
    assert_eq!(run.global("seen"), string("derived"));
}

#[test]
fn subclasses_without_init_inherit_it() {
    let run = run("
class A { init(x) { this.x = x; } }
class B < A {}
var b = B(5);
print b.x;
var again = b.init(7).x;
");
    assert_eq!(run.errors(), Vec::<String>::new());
    assert_eq!(run.output(), "5\n");
    assert_eq!(run.global("again"), num(7.0));
}

#[test]
fn fields_run_after_the_inherited_init() {
    let run = run("
class A { init(x) { this.x = x; this.tag = \"a\"; } }
class B < A { tag = \"b\"; }
var b = B(5);
var x = b.x;
var tag = b.tag;
");
    assert_eq!(run.global("x"), num(5.0));
    assert_eq!(run.global("tag"), string("b"));
}

#[test]
fn super_init_runs_fields_of_a_class_without_init() {
    let run = run("
class A { count = 1; }
class B < A {
    init() {
        super.init();
        this.count += 1;
    }
}
var result = B().count;
");
    assert_eq!(run.global("result"), num(2.0));
}

#[test]
fn classes_without_init_chain_to_the_base() {
    let run = run("
class Base {
    init() { this.ready = true; }
}
class Derived < Base {
    extra = 1;
}
var d = Derived();
var ready = d.ready;
var extra = d.extra;
");
    assert_eq!(run.global("ready"), Some(vuel::Val::Bool(true)));
    assert_eq!(run.global("extra"), num(1.0));
}

#[test]
fn static_members() {
    let run = run("
class Config {
    static defaults = 3;
    static scaled(n) { return n * Config.defaults; }
}
Config.defaults += 1;
var result = Config.scaled(2);
");
    assert_eq!(run.global("result"), num(8.0));
}

#[test]
fn statics_are_inherited_but_written_locally() {
    let run = run("
class A {
    static count = 1;
    static who() { return \"A\"; }
}
class B < A {}
var inherited = B.count;
var who = B.who();
B.count = 5;
var a = A.count;
var b = B.count;
");
    assert_eq!(run.global("inherited"), num(1.0));
    assert_eq!(run.global("who"), string("A"));
    assert_eq!(run.global("a"), num(1.0));
    assert_eq!(run.global("b"), num(5.0));
}

#[test]
fn instances_compare_by_reference() {
    let run = run("class A {} var a = A(); var b = a; print a == b; print a == A();");
    assert_eq!(run.output(), "true\nfalse\n");
}

#[test]
fn class_errors() {
    let cases = [
        ("class A {} A().missing;", "1:16 - Undefined property 'missing'."),
        ("class A {} A.missing;", "1:14 - Undefined property 'missing'."),
        ("var NotAClass = 1;\nclass B < NotAClass {}", "2:11 - Superclass must be a class."),
        ("class A { init(a) {} }\nA();", "2:3 - Expected 1 arguments but got 0."),
        ("class A { init(a) {} }\nclass B < A {}\nB();", "3:3 - Expected 1 arguments but got 0."),
        ("class A { x = 1; }\nA(2);", "2:4 - Expected 0 arguments but got 1."),
        (
            "class A {}\nclass B < A { m() { return super.missing; } }\nB().m();",
            "2:34 - Undefined property 'missing'.",
        ),
    ];
    for (source, expected) in cases {
        assert_eq!(run(source).errors(), vec![expected], "{source}");
    }
}
