//! Integration tests for hierarchical (push/pop) specialization
use approx::assert_relative_eq;
use nalgebra::Point3;
use whittle::{
    context::{Context, Node},
    eval::ArrayEval,
    tape::Tape,
};

/// Builds a circle as a signed-distance expression
fn circle(ctx: &mut Context, cx: f32, cy: f32, r: f32) -> Node {
    let x = ctx.x();
    let y = ctx.y();
    let cx = ctx.constant(cx);
    let cy = ctx.constant(cy);
    let dx = ctx.sub(x, cx).unwrap();
    let dy = ctx.sub(y, cy).unwrap();
    let dx2 = ctx.square(dx).unwrap();
    let dy2 = ctx.square(dy).unwrap();
    let d2 = ctx.add(dx2, dy2).unwrap();
    let d = ctx.sqrt(d2).unwrap();
    let r = ctx.constant(r);
    ctx.sub(d, r).unwrap()
}

/// Union of two circles, well separated along the X axis
fn two_circles(ctx: &mut Context) -> Node {
    let a = circle(ctx, -0.5, 0.0, 0.4);
    let b = circle(ctx, 0.5, 0.0, 0.4);
    ctx.min(a, b).unwrap()
}

#[test]
fn descent_soundness() {
    let mut ctx = Context::new();
    let shape = two_circles(&mut ctx);
    let mut eval = ArrayEval::new(ctx.tape(shape).unwrap());
    let full = eval.tape().active().len();

    // All probes live deep inside the left circle's dominance region
    let probe = Point3::new(-0.45, 0.1, 0.0);
    let expected = eval.eval(probe);

    for (x, y) in [(-0.5, 0.0), (-0.45, 0.05), (-0.46, 0.08)] {
        eval.eval_and_push(Point3::new(x, y, 0.0));
    }
    assert_eq!(eval.tape().depth(), 3);

    // The right circle's subtree is gone from the active order
    assert!(eval.tape().active().len() < full);

    // Same dominance pattern, so the specialized tape agrees exactly
    assert_eq!(eval.eval(probe), expected);

    while eval.tape().depth() > 0 {
        eval.tape_mut().pop().unwrap();
    }
    assert_eq!(eval.tape().active().len(), full);
    assert_eq!(eval.eval(probe), expected);
}

#[test]
fn stack_symmetry() {
    let mut ctx = Context::new();
    let shape = two_circles(&mut ctx);
    let mut eval = ArrayEval::new(ctx.tape(shape).unwrap());

    let mut orders = vec![eval.tape().active().to_vec()];
    for (x, y) in [(-0.5, 0.0), (-0.45, 0.1), (-0.52, -0.05)] {
        eval.eval_and_push(Point3::new(x, y, 0.0));
        orders.push(eval.tape().active().to_vec());
    }
    while eval.tape().depth() > 0 {
        assert_eq!(eval.tape().active(), &orders[eval.tape().depth()][..]);
        eval.tape_mut().pop().unwrap();
    }
    assert_eq!(eval.tape().active(), &orders[0][..]);
}

#[test]
fn batch_matches_brute_force_within_cell() {
    let mut ctx = Context::new();
    let shape = two_circles(&mut ctx);
    let tape = ctx.tape(shape).unwrap();

    let mut brute = ArrayEval::new(Tape::new(tape.shared()));
    let mut fast = ArrayEval::new(tape);

    // Specialize on the cell center, then batch-evaluate a grid of samples
    // inside the cell; every lane agrees with the unspecialized evaluator.
    fast.eval_and_push(Point3::new(-0.5, 0.0, 0.0));
    let mut pts = vec![];
    for i in 0..8 {
        for j in 0..8 {
            let x = -0.6 + 0.025 * i as f32;
            let y = -0.1 + 0.025 * j as f32;
            pts.push(Point3::new(x, y, 0.0));
        }
    }
    for (i, &p) in pts.iter().enumerate() {
        fast.set(p, i);
    }
    let out = fast.values(pts.len()).unwrap().to_vec();
    for (&p, v) in pts.iter().zip(out) {
        assert_eq!(brute.eval(p), v);
    }
}

#[test]
fn workers_share_structural_data() {
    let mut ctx = Context::new();
    let shape = two_circles(&mut ctx);
    let data = ctx.tape(shape).unwrap().shared();

    // One worker per octant-style region, each owning its evaluator and
    // specialization stack over the same read-only tables.
    std::thread::scope(|s| {
        for cx in [-0.5f32, 0.5] {
            let data = data.clone();
            s.spawn(move || {
                let mut eval = ArrayEval::new(Tape::new(data));
                let v = eval.eval_and_push(Point3::new(cx, 0.0, 0.0));
                assert_eq!(v, -0.4);
                assert_eq!(eval.tape().depth(), 1);
                assert_relative_eq!(
                    eval.eval(Point3::new(cx, 0.3, 0.0)),
                    -0.1,
                    epsilon = 1e-6
                );
            });
        }
    });
}
