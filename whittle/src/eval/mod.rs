//! Batched evaluation of clause graphs
//!
//! The [`ArrayEvaluator`] owns a [`Tape`] handle and a 2-D value buffer with
//! one row per clause and a fixed lane width `N`.  A walk computes every
//! active clause's row from its operand rows, element-wise across the first
//! `count <= N` lanes; the root clause's row holds the result.
//!
//! After a walk, the evaluator can vote on every `min`/`max` clause: if one
//! operand strictly dominates the other on every evaluated lane, the losing
//! branch is irrelevant for this batch, and
//! [`eval_and_push`](ArrayEvaluator::eval_and_push) records that decision in
//! a shortened tape.  This is what lets hierarchical callers (octree-style
//! meshers and renderers) evaluate ever-smaller spatial regions against
//! ever-shorter tapes, popping back on the way up.
mod choice;
pub use choice::Choice;

use crate::{
    Error,
    tape::{ClauseId, Opcode, Tape},
    var::Var,
};
use nalgebra::Point3;
use std::collections::BTreeMap;

/// Evaluator for many lanes of point data at once
///
/// The lane width `N` is fixed at type-definition time and bounds the batch
/// size of every walk; [`ArrayEval`] picks the default of 256 lanes.
///
/// Each evaluator owns its tape handle (and therefore its specialization
/// stack); share the structural data between evaluators with
/// [`Tape::shared`].
pub struct ArrayEvaluator<const N: usize = 256> {
    tape: Tape,

    /// One row per clause; lanes `[0, count)` are valid after a walk
    f: Vec<[f32; N]>,

    /// Lane count of the most recent walk
    count: usize,
}

/// Array evaluator with the default lane width
pub type ArrayEval = ArrayEvaluator<256>;

impl<const N: usize> ArrayEvaluator<N> {
    /// Builds an evaluator with every variable initialized to 0
    pub fn new(tape: Tape) -> Self {
        Self::new_with_vars(tape, &BTreeMap::new())
    }

    /// Builds an evaluator, binding variables from the given map
    ///
    /// Constant rows are filled from the tape's constant table; variable
    /// rows default to 0 when the map has no entry for them.  Map entries
    /// for variables that are not bound in this graph are ignored.
    pub fn new_with_vars(tape: Tape, vars: &BTreeMap<Var, f32>) -> Self {
        let mut f = vec![[0.0; N]; tape.data().len()];
        for &(id, v) in tape.data().constants() {
            f[id.get()] = [v; N];
        }
        let mut out = Self { tape, f, count: 0 };
        for (&var, &value) in vars {
            out.set_var(var, value);
        }
        out
    }

    /// Borrows the owned tape handle
    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Borrows the owned tape handle mutably (e.g. to [`Tape::pop`])
    pub fn tape_mut(&mut self) -> &mut Tape {
        &mut self.tape
    }

    /// Sets the given variable across all lanes
    ///
    /// This is a no-op if the variable is not bound in this graph.
    pub fn set_var(&mut self, var: Var, value: f32) {
        if let Some(id) = self.tape.data().var_clause(var) {
            self.f[id.get()] = [value; N];
        }
    }

    /// Writes new values for every bound variable, returning whether any of
    /// them changed
    ///
    /// Fails with [`Error::MissingVar`] if a bound variable has no entry in
    /// the map.
    pub fn update_vars(
        &mut self,
        vars: &BTreeMap<Var, f32>,
    ) -> Result<bool, Error> {
        let mut changed = false;
        for (&var, &id) in self.tape.data().vars().iter() {
            let value = *vars.get(&var).ok_or(Error::MissingVar(var))?;
            if self.f[id.get()][0] != value {
                self.f[id.get()] = [value; N];
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Writes one sample position into the given lane of the X/Y/Z rows
    ///
    /// Use this to stage a batch before calling
    /// [`values`](ArrayEvaluator::values).  Axes that the graph does not use
    /// are skipped.
    ///
    /// # Panics
    /// If `index >= N`; lane indices are a caller responsibility.
    pub fn set(&mut self, pt: Point3<f32>, index: usize) {
        assert!(index < N, "lane index {index} exceeds lane width {N}");
        for (var, value) in [(Var::X, pt.x), (Var::Y, pt.y), (Var::Z, pt.z)] {
            if let Some(id) = self.tape.data().var_clause(var) {
                self.f[id.get()][index] = value;
            }
        }
    }

    /// Evaluates the graph at a single point
    pub fn eval(&mut self, pt: Point3<f32>) -> f32 {
        self.set(pt, 0);
        self.walk(1);
        self.f[self.tape.data().root().get()][0]
    }

    /// Evaluates at a single point, then pushes a specialized tape
    ///
    /// Every `min`/`max` clause whose operands differ at this point has its
    /// dominated branch pruned from the new active order.  The caller is
    /// responsible for only reusing the pushed tape within a region where
    /// the same branches dominate, and for popping on the way out.
    pub fn eval_and_push(&mut self, pt: Point3<f32>) -> f32 {
        let out = self.eval(pt);
        let mut choices = vec![Choice::Both; self.tape.data().len()];
        for i in 0..self.tape.active().len() {
            let id = self.tape.active()[i];
            let c = self.tape.data().clause(id);
            if c.op.is_choice() && self.tape.choice(id) == Choice::Both {
                choices[id.get()] = self.check(c.op, c.a, c.b);
            }
        }
        self.tape.push(&choices).unwrap();
        out
    }

    /// Walks the active tape across the first `count` lanes
    ///
    /// The caller must already have written `count` lanes of input into the
    /// relevant leaf rows (via [`set`](ArrayEvaluator::set) or
    /// [`set_var`](ArrayEvaluator::set_var)).  Returns a view of the root
    /// row's first `count` lanes, which remains valid until the next
    /// evaluation call.
    pub fn values(&mut self, count: usize) -> Result<&[f32], Error> {
        if count > N {
            return Err(Error::BadBatchSize(count, N));
        }
        self.walk(count);
        Ok(&self.f[self.tape.data().root().get()][..count])
    }

    /// Votes on a single choice clause by comparing its operand rows across
    /// the evaluated lanes
    ///
    /// Any lane where neither operand strictly wins (ties, NaN) votes
    /// [`Choice::Both`], as does disagreement between lanes.
    fn check(&self, op: Opcode, a: ClauseId, b: ClauseId) -> Choice {
        let fa = &self.f[a.get()];
        let fb = &self.f[b.get()];
        let mut out = Choice::None;
        for i in 0..self.count {
            out |= match op {
                Opcode::Max => {
                    if fa[i] > fb[i] {
                        Choice::Left
                    } else if fb[i] > fa[i] {
                        Choice::Right
                    } else {
                        Choice::Both
                    }
                }
                Opcode::Min => {
                    if fa[i] > fb[i] {
                        Choice::Right
                    } else if fb[i] > fa[i] {
                        Choice::Left
                    } else {
                        Choice::Both
                    }
                }
                op => unreachable!("choice check on {op:?}"),
            };
            if out == Choice::Both {
                break;
            }
        }
        out
    }

    /// Computes every active clause's row from its operand rows
    fn walk(&mut self, count: usize) {
        self.count = count;
        for index in 0..self.tape.active().len() {
            let id = self.tape.active()[index];
            let c = self.tape.data().clause(id);
            let choice = if c.op.is_choice() {
                self.tape.choice(id)
            } else {
                Choice::Both
            };

            // Operands always precede the clause, so splitting at the
            // clause's own row gives us the output slot and (read-only)
            // access to every operand row.
            let (head, tail) = self.f.split_at_mut(id.get());
            let out = &mut tail[0];
            let a = &head[c.a.get()];
            let b = &head[c.b.get()];

            match c.op {
                Opcode::Add => {
                    for i in 0..count {
                        out[i] = a[i] + b[i];
                    }
                }
                Opcode::Sub => {
                    for i in 0..count {
                        out[i] = a[i] - b[i];
                    }
                }
                Opcode::Mul => {
                    for i in 0..count {
                        out[i] = a[i] * b[i];
                    }
                }
                Opcode::Div => {
                    for i in 0..count {
                        out[i] = a[i] / b[i];
                    }
                }
                Opcode::Min => match choice {
                    Choice::Left => {
                        out[..count].copy_from_slice(&a[..count]);
                    }
                    Choice::Right => {
                        out[..count].copy_from_slice(&b[..count]);
                    }
                    _ => {
                        for i in 0..count {
                            out[i] = if a[i].is_nan() || b[i].is_nan() {
                                f32::NAN
                            } else {
                                a[i].min(b[i])
                            };
                        }
                    }
                },
                Opcode::Max => match choice {
                    Choice::Left => {
                        out[..count].copy_from_slice(&a[..count]);
                    }
                    Choice::Right => {
                        out[..count].copy_from_slice(&b[..count]);
                    }
                    _ => {
                        for i in 0..count {
                            out[i] = if a[i].is_nan() || b[i].is_nan() {
                                f32::NAN
                            } else {
                                a[i].max(b[i])
                            };
                        }
                    }
                },
                Opcode::Pow => {
                    for i in 0..count {
                        out[i] = a[i].powf(b[i]);
                    }
                }
                Opcode::NthRoot => {
                    for i in 0..count {
                        out[i] = a[i].powf(1.0 / b[i]);
                    }
                }
                Opcode::Mod => {
                    for i in 0..count {
                        out[i] = a[i].rem_euclid(b[i]);
                    }
                }
                Opcode::Atan2 => {
                    for i in 0..count {
                        out[i] = a[i].atan2(b[i]);
                    }
                }
                Opcode::NanFill => {
                    for i in 0..count {
                        out[i] = if a[i].is_nan() { b[i] } else { a[i] };
                    }
                }
                Opcode::Square => {
                    for i in 0..count {
                        let s = a[i];
                        out[i] = s * s;
                    }
                }
                Opcode::Sqrt => {
                    for i in 0..count {
                        out[i] = a[i].sqrt();
                    }
                }
                Opcode::Neg => {
                    for i in 0..count {
                        out[i] = -a[i];
                    }
                }
                Opcode::Sin => {
                    for i in 0..count {
                        out[i] = a[i].sin();
                    }
                }
                Opcode::Cos => {
                    for i in 0..count {
                        out[i] = a[i].cos();
                    }
                }
                Opcode::Tan => {
                    for i in 0..count {
                        out[i] = a[i].tan();
                    }
                }
                Opcode::Asin => {
                    for i in 0..count {
                        out[i] = a[i].asin();
                    }
                }
                Opcode::Acos => {
                    for i in 0..count {
                        out[i] = a[i].acos();
                    }
                }
                Opcode::Atan => {
                    for i in 0..count {
                        out[i] = a[i].atan();
                    }
                }
                Opcode::Exp => {
                    for i in 0..count {
                        out[i] = a[i].exp();
                    }
                }
                Opcode::Abs => {
                    for i in 0..count {
                        out[i] = a[i].abs();
                    }
                }
                Opcode::Recip => {
                    for i in 0..count {
                        out[i] = 1.0 / a[i];
                    }
                }
                Opcode::ConstVar => {
                    out[..count].copy_from_slice(&a[..count]);
                }

                Opcode::Invalid | Opcode::Const | Opcode::Var => {
                    unreachable!("leaf opcode {:?} in active tape", c.op)
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::Context;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant() {
        let mut ctx = Context::new();
        let p = ctx.constant(1.5);
        let mut eval = ArrayEval::new(ctx.tape(p).unwrap());
        assert_eq!(eval.eval(Point3::new(0.0, 0.0, 0.0)), 1.5);
    }

    #[test]
    fn test_circle() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let x2 = ctx.square(x).unwrap();
        let y2 = ctx.square(y).unwrap();
        let r = ctx.add(x2, y2).unwrap();
        let one = ctx.constant(1.0);
        let circle = ctx.sub(r, one).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(circle).unwrap());
        assert_eq!(eval.eval(Point3::new(0.0, 0.0, 0.0)), -1.0);
        assert_eq!(eval.eval(Point3::new(1.0, 0.0, 0.0)), 0.0);
        assert_eq!(eval.eval(Point3::new(0.0, 2.0, 0.0)), 3.0);
    }

    #[test]
    fn test_determinism() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let m = ctx.max(x, y).unwrap();
        let s = ctx.sin(m).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(s).unwrap());
        let a = eval.eval(Point3::new(0.3, 0.7, 0.0));
        let b = eval.eval(Point3::new(0.3, 0.7, 0.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_p_max() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let m = ctx.max(x, y).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(m).unwrap());
        assert_eq!(eval.eval(Point3::new(3.0, 5.0, 0.0)), 5.0);

        assert_eq!(eval.eval_and_push(Point3::new(3.0, 5.0, 0.0)), 5.0);
        assert_eq!(eval.tape().depth(), 1);

        // Only the max clause itself survives, as a copy of the y row
        assert_eq!(eval.tape().active().len(), 1);

        // Still correct where y dominates...
        assert_eq!(eval.eval(Point3::new(1.0, 2.0, 0.0)), 2.0);

        // ...and wrong by design where dominance flips: the caller must not
        // reuse this specialization outside its cell
        assert_eq!(eval.eval(Point3::new(7.0, 2.0, 0.0)), 2.0);

        eval.tape_mut().pop().unwrap();
        assert_eq!(eval.tape().depth(), 0);
        assert_eq!(eval.eval(Point3::new(7.0, 2.0, 0.0)), 7.0);
    }

    #[test]
    fn test_p_min() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let m = ctx.min(x, y).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(m).unwrap());
        assert_eq!(eval.eval_and_push(Point3::new(3.0, 5.0, 0.0)), 3.0);
        assert_eq!(eval.eval(Point3::new(1.0, -10.0, 0.0)), 1.0);
        eval.tape_mut().pop().unwrap();
        assert_eq!(eval.eval(Point3::new(1.0, -10.0, 0.0)), -10.0);
    }

    #[test]
    fn test_tie_keeps_both() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let m = ctx.min(x, y).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(m).unwrap());
        let before = eval.tape().active().to_vec();
        assert_eq!(eval.eval_and_push(Point3::new(2.0, 2.0, 0.0)), 2.0);
        assert_eq!(eval.tape().active(), &before[..]);
    }

    #[test]
    fn test_mod() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let three = ctx.constant(3.0);
        let m = ctx.modulo(x, three).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(m).unwrap());
        assert_eq!(eval.eval(Point3::new(-1.0, 0.0, 0.0)), 2.0);
        assert_eq!(eval.eval(Point3::new(7.0, 0.0, 0.0)), 1.0);
        for i in -20..20 {
            let v = eval.eval(Point3::new(i as f32 * 0.7, 0.0, 0.0));
            assert!((0.0..3.0).contains(&v));
        }
    }

    #[test]
    fn test_batch_square() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let sq = ctx.square(x).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(sq).unwrap());
        for (i, v) in [-2.0, 0.0, 2.0].into_iter().enumerate() {
            eval.set(Point3::new(v, 0.0, 0.0), i);
        }
        assert_eq!(eval.values(3).unwrap(), &[4.0, 0.0, 4.0]);
    }

    #[test]
    fn test_batch_size() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let mut eval = ArrayEval::new(ctx.tape(x).unwrap());
        assert!(matches!(
            eval.values(257),
            Err(Error::BadBatchSize(257, 256))
        ));
    }

    #[test]
    fn test_batch_mixed_dominance() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let m = ctx.max(x, y).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(m).unwrap());
        eval.set(Point3::new(1.0, 0.0, 0.0), 0);
        eval.set(Point3::new(0.0, 1.0, 0.0), 1);
        assert_eq!(eval.values(2).unwrap(), &[1.0, 1.0]);

        // Lanes disagree, so the decision pass must keep both branches
        assert_eq!(
            eval.check(Opcode::Max, ClauseId::new(1), ClauseId::new(2)),
            Choice::Both
        );
    }

    #[test]
    fn test_update_vars() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let v = Var::new();
        let r = ctx.var(v);
        let sum = ctx.add(x, r).unwrap();

        let mut eval = ArrayEval::new_with_vars(
            ctx.tape(sum).unwrap(),
            &BTreeMap::from([(v, 10.0)]),
        );
        assert_eq!(eval.eval(Point3::new(1.0, 0.0, 0.0)), 11.0);

        let mut vars = BTreeMap::from([(v, 10.0), (Var::X, 1.0)]);
        assert!(!eval.update_vars(&vars).unwrap());
        vars.insert(v, 20.0);
        assert!(eval.update_vars(&vars).unwrap());
        assert_eq!(eval.eval(Point3::new(1.0, 0.0, 0.0)), 21.0);

        // Every bound variable must be present in the map
        vars.remove(&Var::X);
        assert!(matches!(
            eval.update_vars(&vars),
            Err(Error::MissingVar(Var::X))
        ));
    }

    #[test]
    fn test_nan_fill() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let s = ctx.sqrt(x).unwrap();
        let zero = ctx.constant(0.0);
        let n = ctx.nanfill(s, zero).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(n).unwrap());
        assert_eq!(eval.eval(Point3::new(4.0, 0.0, 0.0)), 2.0);
        assert_eq!(eval.eval(Point3::new(-1.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_numeric_edge_cases() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let one = ctx.constant(1.0);
        let r = ctx.div(one, x).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(r).unwrap());
        assert_eq!(eval.eval(Point3::new(0.0, 0.0, 0.0)), f32::INFINITY);

        let mut ctx = Context::new();
        let x = ctx.x();
        let s = ctx.sqrt(x).unwrap();
        let mut eval = ArrayEval::new(ctx.tape(s).unwrap());
        assert!(eval.eval(Point3::new(-1.0, 0.0, 0.0)).is_nan());
    }

    #[test]
    fn test_pow() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let three = ctx.constant(3.0);
        let p = ctx.pow(x, three).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(p).unwrap());
        assert_eq!(eval.eval(Point3::new(2.0, 0.0, 0.0)), 8.0);
    }

    #[test]
    fn test_unary_chain() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let n = ctx.neg(x).unwrap();
        let a = ctx.abs(n).unwrap();
        let e = ctx.exp(a).unwrap();
        let r = ctx.recip(e).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(r).unwrap());
        assert_relative_eq!(
            eval.eval(Point3::new(2.0, 0.0, 0.0)),
            (2.0f32).exp().recip()
        );
    }

    #[test]
    fn test_const_var() {
        let mut ctx = Context::new();
        let c = ctx.constant(0.5);
        let cv = ctx.const_var(c).unwrap();
        let x = ctx.x();
        let sum = ctx.add(x, cv).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(sum).unwrap());
        assert_eq!(eval.eval(Point3::new(1.0, 0.0, 0.0)), 1.5);
    }

    #[test]
    fn test_transcendental() {
        let mut ctx = Context::new();
        let x = ctx.x();
        let y = ctx.y();
        let a = ctx.atan2(y, x).unwrap();

        let mut eval = ArrayEval::new(ctx.tape(a).unwrap());
        assert_relative_eq!(
            eval.eval(Point3::new(0.0, 1.0, 0.0)),
            std::f32::consts::FRAC_PI_2
        );

        let mut ctx = Context::new();
        let x = ctx.x();
        let two = ctx.constant(2.0);
        let r = ctx.nth_root(x, two).unwrap();
        let mut eval = ArrayEval::new(ctx.tape(r).unwrap());
        assert_relative_eq!(eval.eval(Point3::new(9.0, 0.0, 0.0)), 3.0);
    }

    #[test]
    fn test_narrow_evaluator() {
        // A minimal lane width still handles single-point evaluation
        let mut ctx = Context::new();
        let x = ctx.x();
        let sq = ctx.square(x).unwrap();
        let mut eval: ArrayEvaluator<1> =
            ArrayEvaluator::new(ctx.tape(sq).unwrap());
        assert_eq!(eval.eval(Point3::new(3.0, 0.0, 0.0)), 9.0);
        assert!(matches!(eval.values(2), Err(Error::BadBatchSize(2, 1))));
    }
}
