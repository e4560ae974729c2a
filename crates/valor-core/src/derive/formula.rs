//! # Attribute Formulas
//!
//! Structured expressions used by computed attributes (`Speed`, `Move`,
//! `HP`...). A formula is data, not source text: it serializes as a small
//! tagged tree and is evaluated against already-resolved attribute levels.

use serde::{Deserialize, Serialize};

/// A dependency expression over attribute levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Formula {
    /// A literal number.
    Const { value: f64 },
    /// The resolved level of another attribute.
    Attr { signature: String },
    /// Sum of every term.
    Sum { terms: Vec<Formula> },
    /// `of / by`. A zero divisor evaluates to negative infinity.
    Div { of: Box<Formula>, by: f64 },
    /// `of * by`.
    Mul { of: Box<Formula>, by: f64 },
    /// Round toward negative infinity.
    Floor { of: Box<Formula> },
}

impl Formula {
    #[must_use]
    pub fn attr(signature: &str) -> Self {
        Self::Attr {
            signature: signature.to_string(),
        }
    }

    #[must_use]
    pub fn sum(terms: Vec<Formula>) -> Self {
        Self::Sum { terms }
    }

    #[must_use]
    pub fn div(self, by: f64) -> Self {
        Self::Div {
            of: Box::new(self),
            by,
        }
    }

    #[must_use]
    pub fn mul(self, by: f64) -> Self {
        Self::Mul {
            of: Box::new(self),
            by,
        }
    }

    #[must_use]
    pub fn floor(self) -> Self {
        Self::Floor { of: Box::new(self) }
    }

    /// Signatures this formula reads, in first-use order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Const { .. } => {}
                Self::Attr { signature } => {
                    if !out.contains(&signature.as_str()) {
                        out.push(signature);
                    }
                }
                Self::Sum { terms } => stack.extend(terms.iter().rev()),
                Self::Div { of, .. } | Self::Mul { of, .. } | Self::Floor { of } => {
                    stack.push(of);
                }
            }
        }
        out
    }

    /// Evaluate with `lookup` supplying attribute levels.
    pub fn eval(&self, lookup: &mut dyn FnMut(&str) -> f64) -> f64 {
        match self {
            Self::Const { value } => *value,
            Self::Attr { signature } => lookup(signature),
            Self::Sum { terms } => terms.iter().map(|t| t.eval(lookup)).sum(),
            Self::Div { of, by } => {
                if *by == 0.0 {
                    f64::NEG_INFINITY
                } else {
                    of.eval(lookup) / by
                }
            }
            Self::Mul { of, by } => of.eval(lookup) * by,
            Self::Floor { of } => of.eval(lookup).floor(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
