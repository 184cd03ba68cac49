//! Module containing the universal error type for this crate
use crate::var::Var;
use thiserror::Error;

/// Universal error type for `whittle`
#[derive(Error, Debug)]
pub enum Error {
    /// Node is not present in this `Context`
    #[error("node is not present in this `Context`")]
    BadNode,

    /// Variable is missing in the evaluation map
    #[error("variable {0} is missing in the evaluation map")]
    MissingVar(Var),

    /// Tape contains no clauses beyond the sentinel
    #[error("tape contains no clauses beyond the sentinel")]
    EmptyTape,

    /// Clause 0 must be the invalid sentinel
    #[error("clause 0 must be the invalid sentinel")]
    BadSentinel,

    /// A clause references an operand at or after its own position
    #[error("clause {0} references operand {1}, which is not earlier in the tape")]
    BadOperand(u32, u32),

    /// A clause other than the sentinel carries the invalid opcode
    #[error("clause {0} has the invalid opcode")]
    InvalidClause(u32),

    /// A constant or variable table entry points at the wrong kind of clause
    #[error("leaf table entry points at clause {0}, which is not a leaf of that kind")]
    BadLeaf(u32),

    /// Choice slice length does not match clause count
    #[error("choice slice length ({0}) does not match clause count ({1})")]
    BadChoiceSlice(usize, usize),

    /// Requested batch size exceeds the evaluator's lane width
    #[error("batch size ({0}) exceeds the evaluator's lane width ({1})")]
    BadBatchSize(usize, usize),

    /// The base of the specialization stack cannot be popped
    #[error("the base of the specialization stack cannot be popped")]
    PopBaseTape,
}
