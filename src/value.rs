use std::{fmt, rc::Rc};

use crate::callable::{Callable, ClassInstance};

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Val {
    Nil,
    Bool(bool),
    Num(f64),
    String(Rc<str>),
    Callable(Callable),
    Instance(Rc<ClassInstance>),
}

impl Val {
    /// Only `nil` and `false` are falsy.
    pub fn truthy(&self) -> bool {
        !matches!(self, Val::Nil | Val::Bool(false))
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::String(a), Val::String(b)) => a == b,
            (Val::Callable(a), Val::Callable(b)) => a.same(b),
            (Val::Instance(a), Val::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(x) => write!(f, "{}", x),
            Self::Num(x) => write!(f, "{}", x),
            Self::String(x) => write!(f, "{}", x),
            Self::Callable(c) => write!(f, "{}", c),
            Self::Instance(i) => write!(f, "{} instance", i.class.name),
        }
    }
}

impl From<f64> for Val {
    fn from(value: f64) -> Self {
        Val::Num(value)
    }
}

impl From<bool> for Val {
    fn from(value: bool) -> Self {
        Val::Bool(value)
    }
}

impl From<&str> for Val {
    fn from(value: &str) -> Self {
        Val::String(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Val::Nil.truthy());
        assert!(!Val::Bool(false).truthy());
        assert!(Val::Bool(true).truthy());
        assert!(Val::Num(0.0).truthy());
        assert!(Val::from("").truthy());
    }

    #[test]
    fn equality() {
        assert_eq!(Val::Nil, Val::Nil);
        assert_ne!(Val::Nil, Val::Bool(false));
        assert_ne!(Val::Num(0.0), Val::Nil);
        assert_eq!(Val::from("ab"), Val::from("ab"));
        assert_ne!(Val::from("1"), Val::Num(1.0));
    }

    #[test]
    fn numbers_print_without_trailing_zero() {
        assert_eq!(Val::Num(14.0).to_string(), "14");
        assert_eq!(Val::Num(2.5).to_string(), "2.5");
        assert_eq!(Val::Num(-3.0).to_string(), "-3");
    }
}
