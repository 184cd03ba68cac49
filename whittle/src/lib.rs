//! Whittle is the numeric heart of an implicit-surface modeling kernel: it
//! evaluates a graph of scalar math operations over batches of sample points,
//! and *whittles down* that graph as evaluation descends into smaller spatial
//! regions.
//!
//! An **implicit surface** is a function `f(x, y, z)`; by convention,
//! `f(x, y, z) < 0` means that position is **inside** the shape, `> 0` means
//! **outside**, and the surface itself is the zero set.  Shapes are built by
//! combining primitives with `min` (union) and `max` (intersection), which
//! means large models are dominated by `min`/`max` clauses — and at any given
//! sample position, most of their branches are irrelevant.
//!
//! # Shape construction
//! Expressions are constructed within a [`Context`](crate::context::Context),
//! which acts as an arena-style allocator with local deduplication:
//! ```
//! use whittle::context::Context;
//!
//! let mut ctx = Context::new();
//! let x = ctx.x();
//! let y = ctx.y();
//! let sum = ctx.add(x, y)?;
//! # Ok::<(), whittle::Error>(())
//! ```
//!
//! # Evaluation
//! A context flattens an expression into a [`Tape`](crate::tape::Tape): an
//! ordered list of clauses in which every operand points earlier in the list.
//! The [`ArrayEval`](crate::eval::ArrayEval) walks the tape's active clauses
//! over up to 256 lanes of sample data at once:
//! ```
//! use nalgebra::Point3;
//! use whittle::{context::Context, eval::ArrayEval};
//!
//! let mut ctx = Context::new();
//! let x = ctx.x();
//! let y = ctx.y();
//! let out = ctx.max(x, y)?;
//!
//! let mut eval = ArrayEval::new(ctx.tape(out)?);
//! assert_eq!(eval.eval(Point3::new(3.0, 5.0, 0.0)), 5.0);
//! # Ok::<(), whittle::Error>(())
//! ```
//!
//! # Specialization
//! [`ArrayEval::eval_and_push`](crate::eval::ArrayEvaluator::eval_and_push)
//! additionally votes on every `min`/`max` clause: a branch that strictly
//! loses on every evaluated lane is pruned, and the shortened active order is
//! pushed onto the tape's specialization stack.  Callers recursing through
//! space (octree-style) push on the way down and pop on the way back up:
//! ```
//! # use nalgebra::Point3;
//! # use whittle::{context::Context, eval::ArrayEval};
//! # let mut ctx = Context::new();
//! # let x = ctx.x();
//! # let y = ctx.y();
//! # let out = ctx.max(x, y)?;
//! let mut eval = ArrayEval::new(ctx.tape(out)?);
//! assert_eq!(eval.eval_and_push(Point3::new(3.0, 5.0, 0.0)), 5.0);
//!
//! // y dominates this entire region, so the x branch is gone
//! assert_eq!(eval.tape().depth(), 1);
//! assert_eq!(eval.eval(Point3::new(1.0, 2.0, 0.0)), 2.0);
//!
//! eval.tape_mut().pop()?;
//! # Ok::<(), whittle::Error>(())
//! ```
//!
//! The structural tables of a tape are immutable and may be shared between
//! threads; the specialization stack is owned by its evaluator, so parallel
//! workers each build their own evaluator over the same shared data (see
//! [`Tape::shared`](crate::tape::Tape::shared)).  Specialization is sound
//! only within the spatial region whose samples agree on every decision;
//! choosing that granularity is the caller's responsibility.
#![warn(missing_docs)]

pub mod context;
pub mod eval;
pub mod tape;
pub mod var;

mod error;
pub use error::Error;
