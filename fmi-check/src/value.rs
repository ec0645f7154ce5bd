use std::fmt::Display;

use crate::{
    schema::{ScalarVariable, ScalarVariableElement},
    traits::{CapabilityError, Common},
};

/// A single variable value tagged with its FMI base type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Real(f64),
    Integer(i32),
    Boolean(bool),
    Enum(i32),
    String(String),
}

impl Value {
    /// Read the current value of `var` from a model instance, translating negated aliases.
    pub fn read<C: Common + ?Sized>(
        inst: &mut C,
        var: &ScalarVariable,
    ) -> Result<Self, CapabilityError> {
        let vrs = [var.value_reference];
        let value = match &var.elem {
            ScalarVariableElement::Real(_) => {
                let mut value = [0.0];
                inst.get_real(&vrs, &mut value)?;
                let [value] = value;
                Value::Real(value)
            }
            ScalarVariableElement::Integer(_) => {
                let mut value = [0];
                inst.get_integer(&vrs, &mut value)?;
                let [value] = value;
                Value::Integer(value)
            }
            ScalarVariableElement::Enumeration(_) => {
                let mut value = [0];
                inst.get_integer(&vrs, &mut value)?;
                let [value] = value;
                Value::Enum(value)
            }
            ScalarVariableElement::Boolean(_) => {
                let mut value = [false];
                inst.get_boolean(&vrs, &mut value)?;
                let [value] = value;
                Value::Boolean(value)
            }
            ScalarVariableElement::String => {
                let mut value = [String::new()];
                inst.get_string(&vrs, &mut value)?;
                let [value] = value;
                Value::String(value)
            }
        };

        Ok(if var.alias.is_negated() {
            value.negated()
        } else {
            value
        })
    }

    /// Apply the sign translation of a negated alias.
    pub fn negated(self) -> Self {
        match self {
            Value::Real(v) => Value::Real(-v),
            Value::Integer(v) => Value::Integer(v.wrapping_neg()),
            Value::Enum(v) => Value::Enum(v.wrapping_neg()),
            Value::Boolean(v) => Value::Boolean(!v),
            Value::String(s) => Value::String(s),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Real(v) => write!(f, "{v}"),
            Value::Integer(v) | Value::Enum(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{}", u8::from(*v)),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negated() {
        assert_eq!(Value::Integer(i32::MIN).negated(), Value::Integer(i32::MIN));
        assert_eq!(Value::Enum(-2).negated(), Value::Enum(2));
        assert_eq!(Value::Real(1.5).negated(), Value::Real(-1.5));
        assert_eq!(Value::Boolean(true).negated(), Value::Boolean(false));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Real(0.1).to_string(), "0.1");
        assert_eq!(Value::Boolean(false).to_string(), "0");
        assert_eq!(Value::Enum(3).negated().to_string(), "-3");
    }
}
