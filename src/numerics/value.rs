//! Numeric values produced by compiled expressions.

use std::fmt;

/// Result of evaluating a named expression; keeps the symbolic shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    /// Absolute value of a scalar, Euclidean norm of a vector.
    pub fn magnitude(&self) -> f64 {
        match self {
            Self::Scalar(v) => v.abs(),
            Self::Vector(v) => v.iter().map(|x| x * x).sum::<f64>().sqrt(),
        }
    }

    /// Components as a slice (one element for scalars).
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Vector(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    pub fn into_vec(self) -> Vec<f64> {
        match self {
            Self::Scalar(v) => vec![v],
            Self::Vector(v) => v,
        }
    }

    /// Zero value with the same shape.
    pub fn zeroed(&self) -> Self {
        match self {
            Self::Scalar(_) => Self::Scalar(0.0),
            Self::Vector(v) => Self::Vector(vec![0.0; v.len()]),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{}", v),
            Self::Vector(v) => write!(f, "{:?}", v),
        }
    }
}
