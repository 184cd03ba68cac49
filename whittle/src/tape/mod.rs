//! Clause graphs ("tapes") and their specialization stack
//!
//! A tape is a flattened math expression: an ordered list of [`Clause`]s in
//! which every operand reference points strictly earlier in the list, so the
//! stored order is already a valid evaluation order.  The structural tables
//! ([`TapeData`]) are immutable once built and may be shared between any
//! number of evaluators; the [`Tape`] handle wraps them together with a
//! per-evaluator stack of *specializations*, each a shortened active order
//! derived from branch-keeping decisions at `min`/`max` clauses.
mod op;
pub use op::Opcode;

use crate::{Error, eval::Choice, var::Var};
use bimap::BiMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dense identifier of a clause within a tape
///
/// Ids are assigned by position and are stable for the lifetime of the graph.
/// Id 0 is the unused sentinel, which also fills unused operand slots.
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
#[serde(transparent)]
pub struct ClauseId(u32);

impl ClauseId {
    /// Id of the sentinel clause, also used for unused operand slots
    pub const SENTINEL: Self = ClauseId(0);

    /// Builds an id from a raw tape position
    pub fn new(i: u32) -> Self {
        Self(i)
    }

    /// Returns the id as a `usize`, suitable for indexing
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// One node of the evaluation graph: an opcode plus operand references
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Clause {
    /// Operation performed by this clause
    pub op: Opcode,
    /// First operand (sentinel if unused)
    pub a: ClauseId,
    /// Second operand (sentinel if unused)
    pub b: ClauseId,
}

impl Clause {
    /// Builds a leaf clause (no operands)
    pub fn leaf(op: Opcode) -> Self {
        Self {
            op,
            a: ClauseId::SENTINEL,
            b: ClauseId::SENTINEL,
        }
    }

    /// Builds a one-operand clause
    pub fn unary(op: Opcode, a: ClauseId) -> Self {
        Self {
            op,
            a,
            b: ClauseId::SENTINEL,
        }
    }

    /// Builds a two-operand clause
    pub fn binary(op: Opcode, a: ClauseId, b: ClauseId) -> Self {
        Self { op, a, b }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Structural tables of a clause graph
///
/// Holds the ordered clause list, the variable binding table (a bijection
/// from [`Var`] to the leaf clause carrying that variable), and the constant
/// table.  A `TapeData` is immutable once built; wrap it in an `Arc` and hand
/// it to as many [`Tape`] handles as there are evaluators.
#[derive(Debug, Serialize, Deserialize)]
pub struct TapeData {
    clauses: Vec<Clause>,
    vars: BiMap<Var, ClauseId>,
    constants: Vec<(ClauseId, f32)>,
}

impl TapeData {
    /// Builds and validates the structural tables
    ///
    /// The clause list must start with the [`Opcode::Invalid`] sentinel,
    /// contain at least one more clause (the last one is the root), and
    /// satisfy the topological-order invariant: every used operand id is
    /// non-zero and strictly less than its clause's own id.  The variable
    /// and constant tables must point at leaf clauses of the matching kind.
    pub fn new(
        clauses: Vec<Clause>,
        vars: BiMap<Var, ClauseId>,
        constants: Vec<(ClauseId, f32)>,
    ) -> Result<Self, Error> {
        if clauses.len() < 2 {
            return Err(Error::EmptyTape);
        }
        if clauses[0].op != Opcode::Invalid {
            return Err(Error::BadSentinel);
        }
        for (i, c) in clauses.iter().enumerate().skip(1) {
            if c.op == Opcode::Invalid {
                return Err(Error::InvalidClause(i as u32));
            }
            let args = c.op.arg_count();
            for operand in [c.a, c.b].into_iter().take(args) {
                if operand == ClauseId::SENTINEL || operand.get() >= i {
                    return Err(Error::BadOperand(i as u32, operand.0));
                }
            }
        }
        for (_, id) in vars.iter() {
            if clauses.get(id.get()).map(|c| c.op) != Some(Opcode::Var) {
                return Err(Error::BadLeaf(id.0));
            }
        }
        for &(id, _) in &constants {
            if clauses.get(id.get()).map(|c| c.op) != Some(Opcode::Const) {
                return Err(Error::BadLeaf(id.0));
            }
        }
        Ok(Self {
            clauses,
            vars,
            constants,
        })
    }

    /// Returns the total clause count, including the sentinel
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// A tape always contains at least the sentinel and a root
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the root (output) clause, which is always stored last
    pub fn root(&self) -> ClauseId {
        ClauseId((self.clauses.len() - 1) as u32)
    }

    /// Looks up a clause by id
    pub fn clause(&self, id: ClauseId) -> Clause {
        self.clauses[id.get()]
    }

    /// Returns the variable binding table
    pub fn vars(&self) -> &BiMap<Var, ClauseId> {
        &self.vars
    }

    /// Returns the clause carrying the given variable, if it is bound here
    pub fn var_clause(&self, var: Var) -> Option<ClauseId> {
        self.vars.get_by_left(&var).copied()
    }

    /// Returns the constant table
    pub fn constants(&self) -> &[(ClauseId, f32)] {
        &self.constants
    }
}

////////////////////////////////////////////////////////////////////////////////

/// One entry of the specialization stack: an active sub-order plus the
/// branch-keeping decision locked in for every choice clause.
///
/// A `min`/`max` clause whose choice is `Left` or `Right` stays in the order
/// (consumers read its row), but is evaluated as a copy of its kept
/// operand's row; its dead operand subtree is absent from the order.
#[derive(Clone, Debug)]
struct SubTape {
    order: Vec<ClauseId>,
    choices: Vec<Choice>,
}

/// Light-weight handle to a clause graph, plus its specialization stack
///
/// Cloning a `Tape` shares the structural [`TapeData`] (behind an `Arc`) and
/// copies the stack.  The stack is deliberately *not* shared: it is mutable
/// state tied to one evaluator's sequence of [`push`](Tape::push) and
/// [`pop`](Tape::pop) calls, so each worker must own its own handle.
#[derive(Clone, Debug)]
pub struct Tape {
    data: Arc<TapeData>,
    tapes: Vec<SubTape>,
}

impl From<TapeData> for Tape {
    fn from(data: TapeData) -> Self {
        Self::new(Arc::new(data))
    }
}

impl Tape {
    /// Builds a handle at specialization depth 0 (every clause active)
    pub fn new(data: Arc<TapeData>) -> Self {
        let order = data
            .clauses
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.op.is_leaf())
            .map(|(i, _)| ClauseId(i as u32))
            .collect();
        let choices = vec![Choice::Both; data.len()];
        Self {
            data,
            tapes: vec![SubTape { order, choices }],
        }
    }

    /// Borrows the shared structural tables
    pub fn data(&self) -> &TapeData {
        &self.data
    }

    /// Returns a new reference to the shared structural tables
    ///
    /// Use this to build an independent handle (and evaluator) for another
    /// worker: `Tape::new(tape.shared())`.
    pub fn shared(&self) -> Arc<TapeData> {
        self.data.clone()
    }

    /// Returns the current active order (top of the specialization stack)
    pub fn active(&self) -> &[ClauseId] {
        &self.tapes.last().unwrap().order
    }

    /// Returns the decision currently locked in for the given clause
    ///
    /// This is `Both` for any clause that has not been specialized (and for
    /// non-choice clauses, which never are).
    pub fn choice(&self, id: ClauseId) -> Choice {
        self.tapes.last().unwrap().choices[id.get()]
    }

    /// Returns the specialization depth (0 = the full tape)
    pub fn depth(&self) -> usize {
        self.tapes.len() - 1
    }

    /// Pushes a shortened active order derived from the given decisions
    ///
    /// `choices` is indexed by clause id and must cover the whole tape; only
    /// the entries for `min`/`max` clauses in the current active order are
    /// consulted.  Clauses already locked `Left` or `Right` keep their prior
    /// decision (their dead operand rows are stale, so fresh decisions for
    /// them are meaningless and ignored).
    ///
    /// The new order is the minimal subset of the current one that still
    /// contains the root and is closed under "every active clause's kept
    /// operands are active or leaves", computed in a single reverse
    /// (root-to-leaves) pass.
    pub fn push(&mut self, choices: &[Choice]) -> Result<(), Error> {
        if choices.len() != self.data.len() {
            return Err(Error::BadChoiceSlice(choices.len(), self.data.len()));
        }
        let prev = self.tapes.last().unwrap();
        let mut active = vec![false; self.data.len()];
        active[self.data.root().get()] = true;

        let mut order = Vec::with_capacity(prev.order.len());
        let mut locked = prev.choices.clone();
        for &id in prev.order.iter().rev() {
            if !active[id.get()] {
                continue;
            }
            order.push(id);
            let c = self.data.clause(id);
            if c.op.is_choice() {
                let d = match prev.choices[id.get()] {
                    Choice::Both => match choices[id.get()] {
                        Choice::None => Choice::Both,
                        d => d,
                    },
                    d => d,
                };
                locked[id.get()] = d;
                if d != Choice::Right {
                    active[c.a.get()] = true;
                }
                if d != Choice::Left {
                    active[c.b.get()] = true;
                }
            } else {
                for operand in [c.a, c.b].into_iter().take(c.op.arg_count()) {
                    active[operand.get()] = true;
                }
            }
        }
        order.reverse();
        self.tapes.push(SubTape {
            order,
            choices: locked,
        });
        Ok(())
    }

    /// Pops the top of the specialization stack
    ///
    /// Fails with [`Error::PopBaseTape`] at depth 0; the base entry always
    /// evaluates the full graph and must remain.
    pub fn pop(&mut self) -> Result<(), Error> {
        if self.tapes.len() == 1 {
            return Err(Error::PopBaseTape);
        }
        self.tapes.pop();
        Ok(())
    }
}

impl std::fmt::Display for Tape {
    /// Dumps the active order, showing only the kept operands of specialized
    /// choice clauses
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &id in self.active() {
            let c = self.data.clause(id);
            write!(f, "${} = {}", id.0, c.op.name())?;
            let (a, b) = match (c.op.is_choice(), self.choice(id)) {
                (true, Choice::Left) => (true, false),
                (true, Choice::Right) => (false, true),
                _ => (c.op.arg_count() >= 1, c.op.arg_count() == 2),
            };
            if a {
                write!(f, " ${}", c.a.0)?;
            }
            if b {
                write!(f, " ${}", c.b.0)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
