#![allow(dead_code)]

use std::{cell::RefCell, path::Path, rc::Rc};

use vuel::{Compiler, Config, Interpreter, Val};

/// One program run with its output captured.
pub struct Run {
    pub compiler: Compiler,
    pub interp: Interpreter,
    out: Rc<RefCell<Vec<u8>>>,
}

impl Run {
    pub fn global(&self, name: &str) -> Option<Val> {
        self.interp.get_global(name)
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.out.borrow()).into_owned()
    }

    pub fn errors(&self) -> Vec<String> {
        self.compiler.diagnostics().iter().map(ToString::to_string).collect()
    }

    pub fn exit_code(&self) -> u8 {
        self.compiler.exit_code()
    }
}

pub fn session(root: Option<&Path>) -> (Compiler, Rc<RefCell<Vec<u8>>>) {
    let out = Rc::new(RefCell::new(Vec::new()));
    let compiler = Compiler::with_output(Config::default(), out.clone());
    let compiler = match root {
        Some(root) => compiler.with_root(root),
        None => compiler,
    };
    (compiler, out)
}

pub fn run(source: &str) -> Run {
    let (mut compiler, out) = session(None);
    let mut interp = compiler.new_interpreter();
    compiler.run_source(None, source, &mut interp);
    Run { compiler, interp, out }
}

pub fn num(x: f64) -> Option<Val> {
    Some(Val::Num(x))
}

pub fn string(s: &str) -> Option<Val> {
    Some(Val::String(s.into()))
}
