use serde::{Deserialize, Serialize};

/// A branch-keeping decision for a single `min` or `max` clause
///
/// The discriminants form a bitfield:
/// ```rust
/// # use whittle::eval::Choice;
/// assert_eq!(Choice::Left as u8 | Choice::Right as u8, Choice::Both as u8);
/// ```
/// so per-lane verdicts can be accumulated with `|=`: any disagreement
/// between lanes degrades the decision to [`Choice::Both`].
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
#[repr(u8)]
pub enum Choice {
    /// No lane has been inspected yet
    None = 0,

    /// Every inspected lane picked the left-hand operand
    Left = 1,

    /// Every inspected lane picked the right-hand operand
    Right = 2,

    /// Lanes disagree (or tie), so both operands must be kept
    Both = 3,
}

impl Default for Choice {
    fn default() -> Self {
        Self::None
    }
}

impl std::ops::BitOrAssign<Choice> for Choice {
    fn bitor_assign(&mut self, other: Self) {
        *self = match (*self as u8) | (other as u8) {
            0 => Self::None,
            1 => Self::Left,
            2 => Self::Right,
            3 => Self::Both,
            _ => unreachable!(),
        }
    }
}
