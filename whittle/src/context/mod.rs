//! Infrastructure for representing math expressions as graphs
//!
//! A [`Context`] is an arena allocator for expression nodes, with local
//! deduplication: building the same operation on the same operands twice
//! returns the same [`Node`].  It performs no constant folding and no
//! symbolic simplification; it exists to produce valid, topologically
//! ordered [`Tape`]s for the evaluator.
pub(crate) mod indexed;
mod op;

pub use op::{BinaryOpcode, Op, UnaryOpcode};

use crate::{
    Error,
    eval::ArrayEval,
    tape::{Clause, ClauseId, Opcode, Tape, TapeData},
    var::Var,
};
use bimap::BiMap;
use indexed::{IndexMap, define_index};
use nalgebra::Point3;
use ordered_float::OrderedFloat;
use std::collections::HashMap;

define_index!(Node, "An index in the `Context::ops` map");

/// A `Context` holds a set of deduplicated constants, variables, and
/// operations.
///
/// It should be used like an arena allocator: it grows over time, then frees
/// all of its contents when dropped.
#[derive(Debug, Default)]
pub struct Context {
    ops: IndexMap<Op, Node>,
}

impl Context {
    /// Builds a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the context
    ///
    /// All [`Node`] handles from this context are invalidated.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Returns the number of [`Op`] nodes in the context
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Checks whether the context is empty
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Looks up the operation for the given node
    pub fn get_op(&self, node: Node) -> Option<&Op> {
        self.ops.get_by_index(node)
    }

    /// Checks whether the given [`Node`] is valid in this context
    fn check_node(&self, node: Node) -> Result<(), Error> {
        self.get_op(node).ok_or(Error::BadNode).map(|_| ())
    }

    ////////////////////////////////////////////////////////////////////////////
    // Primitives

    /// Constructs or finds the node for the `X` axis
    ///
    /// ```
    /// # use whittle::context::Context;
    /// let mut ctx = Context::new();
    /// let x = ctx.x();
    /// let v = ctx.eval_xyz(x, 1.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 1.0);
    /// ```
    pub fn x(&mut self) -> Node {
        self.var(Var::X)
    }

    /// Constructs or finds the node for the `Y` axis
    pub fn y(&mut self) -> Node {
        self.var(Var::Y)
    }

    /// Constructs or finds the node for the `Z` axis
    pub fn z(&mut self) -> Node {
        self.var(Var::Z)
    }

    /// Constructs or finds a node for the given variable
    pub fn var(&mut self, v: Var) -> Node {
        self.ops.insert(Op::Var(v))
    }

    /// Returns a node representing the given constant value
    ///
    /// ```
    /// # let mut ctx = whittle::context::Context::new();
    /// let v = ctx.constant(3.0);
    /// assert_eq!(ctx.eval_xyz(v, 0.0, 0.0, 0.0).unwrap(), 3.0);
    /// ```
    pub fn constant(&mut self, f: f32) -> Node {
        self.ops.insert(Op::Const(OrderedFloat(f)))
    }

    ////////////////////////////////////////////////////////////////////////////
    // Helper functions to create operation nodes

    /// Finds or creates a [`Node`] for the given unary operation
    fn op_unary(&mut self, a: Node, op: UnaryOpcode) -> Result<Node, Error> {
        self.check_node(a)?;
        Ok(self.ops.insert(Op::Unary(op, a)))
    }

    /// Finds or creates a [`Node`] for the given binary operation
    fn op_binary(
        &mut self,
        a: Node,
        b: Node,
        op: BinaryOpcode,
    ) -> Result<Node, Error> {
        self.check_node(a)?;
        self.check_node(b)?;
        Ok(self.ops.insert(Op::Binary(op, a, b)))
    }

    /// Finds or creates a [`Node`] for the given commutative operation;
    /// deduplication is encouraged by sorting `a` and `b`.
    fn op_binary_commutative(
        &mut self,
        a: Node,
        b: Node,
        op: BinaryOpcode,
    ) -> Result<Node, Error> {
        self.op_binary(a.min(b), a.max(b), op)
    }

    /// Builds an addition node
    /// ```
    /// # let mut ctx = whittle::context::Context::new();
    /// let x = ctx.x();
    /// let one = ctx.constant(1.0);
    /// let op = ctx.add(x, one).unwrap();
    /// let v = ctx.eval_xyz(op, 1.0, 0.0, 0.0).unwrap();
    /// assert_eq!(v, 2.0);
    /// ```
    pub fn add(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary_commutative(a, b, BinaryOpcode::Add)
    }

    /// Builds a subtraction node
    pub fn sub(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary(a, b, BinaryOpcode::Sub)
    }

    /// Builds a multiplication node
    pub fn mul(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary_commutative(a, b, BinaryOpcode::Mul)
    }

    /// Builds a division node
    pub fn div(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary(a, b, BinaryOpcode::Div)
    }

    /// Builds a node which takes the minimum of two inputs
    ///
    /// `min` nodes participate in specialization: when one branch dominates
    /// a whole batch, the other branch can be pruned from the active tape.
    pub fn min(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary_commutative(a, b, BinaryOpcode::Min)
    }

    /// Builds a node which takes the maximum of two inputs
    pub fn max(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary_commutative(a, b, BinaryOpcode::Max)
    }

    /// Builds a node which raises `a` to the power `b`
    pub fn pow(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary(a, b, BinaryOpcode::Pow)
    }

    /// Builds a node which takes the `b`-th root of `a`
    pub fn nth_root(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary(a, b, BinaryOpcode::NthRoot)
    }

    /// Builds a non-negative modulo node
    ///
    /// ```
    /// # let mut ctx = whittle::context::Context::new();
    /// let x = ctx.x();
    /// let three = ctx.constant(3.0);
    /// let op = ctx.modulo(x, three).unwrap();
    /// assert_eq!(ctx.eval_xyz(op, -1.0, 0.0, 0.0).unwrap(), 2.0);
    /// ```
    pub fn modulo(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary(a, b, BinaryOpcode::Mod)
    }

    /// Builds a two-argument arctangent node
    pub fn atan2(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary(a, b, BinaryOpcode::Atan2)
    }

    /// Builds a node which passes through `a`, replacing NaN lanes with `b`
    pub fn nanfill(&mut self, a: Node, b: Node) -> Result<Node, Error> {
        self.op_binary(a, b, BinaryOpcode::NanFill)
    }

    /// Builds a node which squares its input
    pub fn square(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Square)
    }

    /// Builds a square-root node
    pub fn sqrt(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Sqrt)
    }

    /// Builds a negation node
    pub fn neg(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Neg)
    }

    /// Builds a sine node
    pub fn sin(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Sin)
    }

    /// Builds a cosine node
    pub fn cos(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Cos)
    }

    /// Builds a tangent node
    pub fn tan(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Tan)
    }

    /// Builds an arcsine node
    pub fn asin(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Asin)
    }

    /// Builds an arccosine node
    pub fn acos(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Acos)
    }

    /// Builds an arctangent node
    pub fn atan(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Atan)
    }

    /// Builds an exponential node
    pub fn exp(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Exp)
    }

    /// Builds an absolute-value node
    pub fn abs(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Abs)
    }

    /// Builds a reciprocal node
    pub fn recip(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::Recip)
    }

    /// Builds a materialized-constant node, which passes through its input
    pub fn const_var(&mut self, a: Node) -> Result<Node, Error> {
        self.op_unary(a, UnaryOpcode::ConstVar)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Flattening into tapes

    /// Flattens the subgraph rooted at `node` into a [`Tape`] handle
    ///
    /// ```
    /// # use whittle::context::Context;
    /// let mut ctx = Context::new();
    /// let x = ctx.x();
    /// let y = ctx.y();
    /// let sum = ctx.add(x, y)?;
    /// let tape = ctx.tape(sum)?;
    /// assert_eq!(tape.active().len(), 1); // X and Y are leaves
    /// # Ok::<(), whittle::Error>(())
    /// ```
    pub fn tape(&self, node: Node) -> Result<Tape, Error> {
        self.tape_data(node).map(Tape::from)
    }

    /// Flattens the subgraph rooted at `node` into validated structural
    /// tables
    ///
    /// The result is in depth-first post-order, which is a valid topological
    /// order; the root is stored last.
    pub fn tape_data(&self, node: Node) -> Result<TapeData, Error> {
        self.check_node(node)?;

        let mut ids: HashMap<Node, ClauseId> = HashMap::new();
        let mut clauses = vec![Clause::leaf(Opcode::Invalid)];
        let mut vars = BiMap::new();
        let mut constants = vec![];

        let mut todo = vec![(node, false)];
        while let Some((n, ready)) = todo.pop() {
            if ids.contains_key(&n) {
                continue;
            }
            let op = *self.get_op(n).ok_or(Error::BadNode)?;
            if !ready {
                // Visit children first, then revisit this node
                todo.push((n, true));
                for child in op.iter_children() {
                    if !ids.contains_key(&child) {
                        todo.push((child, false));
                    }
                }
                continue;
            }
            let id = ClauseId::new(clauses.len() as u32);
            clauses.push(match op {
                Op::Const(c) => {
                    constants.push((id, c.0));
                    Clause::leaf(Opcode::Const)
                }
                Op::Var(v) => {
                    vars.insert(v, id);
                    Clause::leaf(Opcode::Var)
                }
                Op::Unary(op, a) => Clause::unary(op.into(), ids[&a]),
                Op::Binary(op, a, b) => {
                    Clause::binary(op.into(), ids[&a], ids[&b])
                }
            });
            ids.insert(n, id);
        }
        TapeData::new(clauses, vars, constants)
    }

    /// Convenience function to evaluate the given node at a single point
    ///
    /// This builds a fresh tape and evaluator per call, so it is only
    /// suitable for tests and one-off evaluation.
    pub fn eval_xyz(
        &self,
        node: Node,
        x: f32,
        y: f32,
        z: f32,
    ) -> Result<f32, Error> {
        let tape = self.tape(node)?;
        let mut eval = ArrayEval::new(tape);
        Ok(eval.eval(Point3::new(x, y, z)))
    }
}
