//! Free variables of a math expression
//!
//! A [`Var`] is the external identity of a leaf clause: the same `Var` used
//! when building a graph is used to bind a numeric value at evaluation time.
//! The spatial axes `X`, `Y`, and `Z` are predefined; everything else is an
//! opaque handle created with [`Var::new`].
use serde::{Deserialize, Serialize};

/// An input variable of a math expression
///
/// Variables are "global", in that every instance of `Var::X` represents the
/// same thing; a fresh local variable is created with [`Var::new`], which
/// picks a random 64-bit value that is very unlikely to collide with anything
/// else.
#[allow(missing_docs)]
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
)]
pub enum Var {
    X,
    Y,
    Z,
    V(VarIndex),
}

/// Index of a non-axis variable (implemented as a `u64`)
#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct VarIndex(u64);

impl Var {
    /// Returns a new non-axis variable with a random 64-bit index
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Var::V(VarIndex(rand::random()))
    }

    /// Checks whether this is one of the spatial axes
    pub fn is_axis(&self) -> bool {
        matches!(self, Var::X | Var::Y | Var::Z)
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Var::X => write!(f, "X"),
            Var::Y => write!(f, "Y"),
            Var::Z => write!(f, "Z"),
            Var::V(VarIndex(v)) => write!(f, "V({v:x})"),
        }
    }
}
