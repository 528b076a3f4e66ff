use crate::binding::{Binding, ObjectId};
use crate::ease::Ease;
use crate::timestamp::Timestamp;

/// A vector of 1 to 4 float lanes carrying its declared dimensionality.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Vector {
    pub dim: u8,
    pub lanes: [f32; 4],
}

impl Vector {
    pub fn new(dim: u8, lanes: [f32; 4]) -> Self {
        debug_assert!((1..=4).contains(&dim));
        Self { dim, lanes }
    }

    pub fn splat(dim: u8, v: f32) -> Self {
        Self::new(dim, [v; 4])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.lanes[..self.dim as usize]
    }
}

/// Every value the expression resolver can produce. A closed sum type instead
/// of reflection-driven dynamic typing: each call site states what it expects
/// and coercion is explicit.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
    Time(Timestamp),
    Vector(Vector),
    Array(Vec<Value>),
    Object(ObjectId),
    Binding(Binding),
    Ease(Ease),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Time(_) => "timestamp",
            Self::Vector(_) => "vector",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Binding(_) => "binding",
            Self::Ease(_) => "ease",
        }
    }

    /// Numeric coercion: ints and bools widen to float, everything else fails.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Int(v) => Some(*v as f32),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(i32::from(*v)),
            _ => None,
        }
    }

    /// Coerces to a vector of exactly `dim` lanes. Accepts an existing vector
    /// of matching dimension, a single numeric (splatted when `dim == 1`), or
    /// an array of 1..=4 numeric/boolean elements of matching length.
    pub fn as_vector(&self, dim: u8) -> Option<Vector> {
        debug_assert!((1..=4).contains(&dim));
        match self {
            Self::Vector(v) if v.dim == dim => Some(*v),
            Self::Array(items) if items.len() == dim as usize => {
                let mut lanes = [0.0f32; 4];
                for (lane, item) in lanes.iter_mut().zip(items) {
                    *lane = item.as_f32()?;
                }
                Some(Vector::new(dim, lanes))
            }
            _ if dim == 1 => self.as_f32().map(|v| Vector::new(1, [v, 0.0, 0.0, 0.0])),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercions() {
        assert_eq!(Value::Int(3).as_f32(), Some(3.0));
        assert_eq!(Value::Bool(true).as_f32(), Some(1.0));
        assert_eq!(Value::Bool(false).as_f32(), Some(0.0));
        assert_eq!(Value::Str("x".into()).as_f32(), None);
        assert_eq!(Value::Float(2.5).as_int(), None);
    }

    #[test]
    fn arrays_coerce_to_vectors_of_declared_dimension() {
        let arr = Value::Array(vec![Value::Int(1), Value::Float(2.0), Value::Bool(true)]);
        let v = arr.as_vector(3).unwrap();
        assert_eq!(v.as_slice(), &[1.0, 2.0, 1.0]);
        assert!(arr.as_vector(2).is_none());
    }

    #[test]
    fn scalar_coerces_only_to_one_lane() {
        assert_eq!(Value::Float(5.0).as_vector(1).unwrap().as_slice(), &[5.0]);
        assert!(Value::Float(5.0).as_vector(3).is_none());
    }

    #[test]
    fn array_with_non_numeric_element_fails() {
        let arr = Value::Array(vec![Value::Int(1), Value::Str("x".into())]);
        assert!(arr.as_vector(2).is_none());
    }
}
