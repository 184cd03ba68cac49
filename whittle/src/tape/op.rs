use serde::{Deserialize, Serialize};

/// Operation performed by a single [`Clause`](crate::tape::Clause)
///
/// This is a closed enumeration: the evaluator's dispatch match is exhaustive
/// over it, so adding an opcode is a compile-time-checked change to both this
/// enum and the dispatch table.
///
/// The three leaf opcodes (`Invalid`, `Const`, `Var`) are never dispatched;
/// their rows are populated by binding, not computed.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
)]
pub enum Opcode {
    /// Sentinel for clause 0 and unused operand slots
    Invalid,

    /// Constant leaf; its value lives in the tape's constant table
    Const,

    /// Variable leaf; its value is bound through the variable table
    Var,

    /// Sum of both operands
    Add,
    /// Difference of both operands
    Sub,
    /// Product of both operands
    Mul,
    /// Quotient of both operands
    Div,
    /// Lane-wise minimum; participates in specialization
    Min,
    /// Lane-wise maximum; participates in specialization
    Max,
    /// Left operand raised to the right operand
    Pow,
    /// `b`-th root of `a`
    NthRoot,
    /// Non-negative modulo (result in `[0, |b|)`)
    Mod,
    /// Two-argument arctangent `atan2(a, b)`
    Atan2,
    /// `a` where finite, else `b`
    NanFill,

    /// `a * a`
    Square,
    /// Square root
    Sqrt,
    /// Negation
    Neg,
    /// Sine
    Sin,
    /// Cosine
    Cos,
    /// Tangent
    Tan,
    /// Arcsine
    Asin,
    /// Arccosine
    Acos,
    /// Arctangent
    Atan,
    /// Exponential
    Exp,
    /// Absolute value
    Abs,
    /// Reciprocal
    Recip,
    /// Pass-through of a materialized constant
    ConstVar,
}

impl Opcode {
    /// Returns the number of operand slots this opcode uses (0, 1, or 2)
    pub fn arg_count(&self) -> usize {
        match self {
            Opcode::Invalid | Opcode::Const | Opcode::Var => 0,

            Opcode::Square
            | Opcode::Sqrt
            | Opcode::Neg
            | Opcode::Sin
            | Opcode::Cos
            | Opcode::Tan
            | Opcode::Asin
            | Opcode::Acos
            | Opcode::Atan
            | Opcode::Exp
            | Opcode::Abs
            | Opcode::Recip
            | Opcode::ConstVar => 1,

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Min
            | Opcode::Max
            | Opcode::Pow
            | Opcode::NthRoot
            | Opcode::Mod
            | Opcode::Atan2
            | Opcode::NanFill => 2,
        }
    }

    /// Checks whether this is a leaf opcode (populated by binding)
    pub fn is_leaf(&self) -> bool {
        self.arg_count() == 0
    }

    /// Checks whether this opcode records a branch-keeping choice
    pub fn is_choice(&self) -> bool {
        matches!(self, Opcode::Min | Opcode::Max)
    }

    /// Returns the opcode's name, as used in tape dumps
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Invalid => "INVALID",
            Opcode::Const => "CONST",
            Opcode::Var => "VAR",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Min => "MIN",
            Opcode::Max => "MAX",
            Opcode::Pow => "POW",
            Opcode::NthRoot => "NTH-ROOT",
            Opcode::Mod => "MOD",
            Opcode::Atan2 => "ATAN2",
            Opcode::NanFill => "NAN-FILL",
            Opcode::Square => "SQUARE",
            Opcode::Sqrt => "SQRT",
            Opcode::Neg => "NEG",
            Opcode::Sin => "SIN",
            Opcode::Cos => "COS",
            Opcode::Tan => "TAN",
            Opcode::Asin => "ASIN",
            Opcode::Acos => "ACOS",
            Opcode::Atan => "ATAN",
            Opcode::Exp => "EXP",
            Opcode::Abs => "ABS",
            Opcode::Recip => "RECIP",
            Opcode::ConstVar => "CONST-VAR",
        }
    }
}
