//! Compile-time values, used for constant member defaults.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BinOp, Lit, UnaryOp};
use crate::types::{NodeType, StructType, Type, TypeKind};

#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub ty: StructType,
    pub members: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeValue {
    pub ty: NodeType,
    pub props: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefValue {
    /// Type of the referenced value.
    pub ty: Type,
    pub value: Rc<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Struct(StructValue),
    Node(NodeValue),
    Ref(RefValue),
}

impl From<&Lit> for Value {
    fn from(lit: &Lit) -> Self {
        match lit {
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Int(i) => Value::Int(*i),
            Lit::Float(x) => Value::Float(*x),
            Lit::Str(s) => Value::Str(s.clone()),
        }
    }
}

impl Value {
    pub fn get_type(&self) -> Type {
        match self {
            Value::Void => Type::void(),
            Value::Bool(_) => Type::bool(),
            Value::Int(_) => Type::int(),
            Value::Float(_) => Type::float(),
            Value::Str(_) => Type::string(),
            Value::Struct(v) => Type::new(TypeKind::Struct(v.ty.clone()), None),
            Value::Node(v) => Type::new(TypeKind::Node(v.ty.clone()), None),
            Value::Ref(r) => Type::reference(r.ty.clone()),
        }
    }

    pub fn reference(value: Value) -> Value {
        Value::Ref(RefValue {
            ty: value.get_type(),
            value: Rc::new(value),
        })
    }

    /// Fold a unary operator. `None` if the operand does not support it.
    pub fn unary(op: UnaryOp, operand: &Value) -> Option<Value> {
        match (op, operand) {
            (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int),
            (UnaryOp::Neg, Value::Float(x)) => Some(Value::Float(-x)),
            (UnaryOp::Not, Value::Bool(b)) => Some(Value::Bool(!b)),
            _ => None,
        }
    }

    /// Fold a binary operator over two constants of the same primitive type.
    /// Comparisons are not folded; overflow and division by zero yield `None`.
    pub fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> Option<Value> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => match op {
                BinOp::Add => a.checked_add(*b),
                BinOp::Sub => a.checked_sub(*b),
                BinOp::Mul => a.checked_mul(*b),
                BinOp::Div => a.checked_div(*b),
                BinOp::Rem => a.checked_rem(*b),
                _ => None,
            }
            .map(Value::Int),
            (Value::Float(a), Value::Float(b)) => match op {
                BinOp::Add => Some(a + b),
                BinOp::Sub => Some(a - b),
                BinOp::Mul => Some(a * b),
                BinOp::Div => Some(a / b),
                BinOp::Rem => Some(a % b),
                _ => None,
            }
            .map(Value::Float),
            (Value::Bool(a), Value::Bool(b)) => match op {
                BinOp::And => Some(Value::Bool(*a && *b)),
                BinOp::Or => Some(Value::Bool(*a || *b)),
                _ => None,
            },
            (Value::Str(a), Value::Str(b)) if op == BinOp::Add => Some(Value::Str(format!("{a}{b}"))),
            _ => None,
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &IndexMap<String, Value>) -> fmt::Result {
    f.write_str(" {")?;
    for (i, (name, value)) in fields.iter().enumerate() {
        let sep = if i == 0 { " " } else { ", " };
        write!(f, "{sep}{name}: {value}")?;
    }
    f.write_str(" }")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Struct(v) => {
                match &v.ty.name {
                    Some(name) => write!(f, "{name}")?,
                    None => f.write_str("struct")?,
                }
                write_fields(f, &v.members)
            }
            Value::Node(v) => {
                write!(f, "{}", v.ty.name)?;
                write_fields(f, &v.props)
            }
            Value::Ref(r) => write!(f, "&{}", r.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FullIdentPath;

    #[test]
    fn types_follow_variants() {
        assert_eq!(Value::Int(1).get_type(), Type::int());
        assert_eq!(Value::Str("a".into()).get_type(), Type::string());
        assert_eq!(
            Value::reference(Value::Float(1.0)).get_type(),
            Type::reference(Type::float())
        );
    }

    #[test]
    fn folds_arithmetic() {
        assert_eq!(
            Value::binary(BinOp::Mul, &Value::Int(6), &Value::Int(7)),
            Some(Value::Int(42))
        );
        assert_eq!(
            Value::binary(BinOp::Add, &Value::Str("a".into()), &Value::Str("b".into())),
            Some(Value::Str("ab".into()))
        );
        assert_eq!(Value::binary(BinOp::Div, &Value::Int(1), &Value::Int(0)), None);
        assert_eq!(Value::binary(BinOp::Add, &Value::Int(1), &Value::Float(1.0)), None);
        assert_eq!(Value::binary(BinOp::Less, &Value::Int(1), &Value::Int(2)), None);
        assert_eq!(Value::unary(UnaryOp::Neg, &Value::Int(i64::MIN)), None);
        assert_eq!(Value::unary(UnaryOp::Not, &Value::Bool(false)), Some(Value::Bool(true)));
    }

    #[test]
    fn displays_node_values() {
        let ty = NodeType {
            name: FullIdentPath::from("ui::Button"),
            props: IndexMap::new(),
        };
        let mut props = IndexMap::new();
        props.insert("text".to_string(), Value::Str("ok".into()));
        props.insert("width".to_string(), Value::Float(2.0));
        let value = Value::Node(NodeValue { ty, props });
        assert_eq!(value.to_string(), "ui::Button { text: \"ok\", width: 2.0 }");
        assert_eq!(value.get_type().to_string(), "ui::Button");
    }
}
