//! Post-op pipeline behavior through the public GEMM entries: node
//! ordering, per-kind semantics, bias axes and the cursor positions
//! seen across tile fringes.

use lpgemm_kernels::postops::{self, Accumulator};
use lpgemm_kernels::{gemm_f32, gemm_f32_with_block_sizes, BiasAxis, BlockSizes, PostOp};

fn lcg(seed: &mut u64) -> u64 {
    *seed = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *seed >> 33
}

fn fill_f32(len: usize, seed: &mut u64) -> Vec<f32> {
    (0..len).map(|_| (lcg(seed) % 1000) as f32 / 250.0 - 2.0).collect()
}

/// Plain matmul followed by the scalar pipeline, the golden model.
fn golden(
    m: usize,
    n: usize,
    k: usize,
    a: &[f32],
    b: &[f32],
    ops: &[PostOp<'_, f32>],
) -> Vec<f32> {
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for kk in 0..k {
                acc += a[i * k + kk] * b[kk * n + j];
            }
            out[i * n + j] = postops::apply(acc, ops, i, j);
        }
    }
    out
}

fn check(m: usize, n: usize, k: usize, ops: &[PostOp<'_, f32>]) {
    let mut seed = (m * 31 + n * 7 + k) as u64 + 0xabc;
    let a = fill_f32(m * k, &mut seed);
    let b = fill_f32(k * n, &mut seed);
    let want = golden(m, n, k, &a, &b, ops);

    let mut got = vec![0.0f32; m * n];
    gemm_f32(m, n, k, 1.0, &a, k, &b, n, 0.0, &mut got, n, ops).unwrap();
    for (i, (g, w)) in got.iter().zip(&want).enumerate() {
        assert!(
            (g - w).abs() <= 2e-4 * (1.0 + w.abs()),
            "element {i}: got {g}, want {w}"
        );
    }
}

#[test]
fn bias_then_relu_differs_from_relu_then_bias() {
    let n = 23;
    let bias: Vec<f32> = (0..n).map(|j| j as f32 * 0.3 - 3.0).collect();
    let bias_first = [
        PostOp::Bias {
            values: &bias,
            axis: BiasAxis::Col,
        },
        PostOp::Relu,
    ];
    let relu_first = [
        PostOp::Relu,
        PostOp::Bias {
            values: &bias,
            axis: BiasAxis::Col,
        },
    ];
    check(9, n, 17, &bias_first);
    check(9, n, 17, &relu_first);

    // and the two orders genuinely produce different outputs
    let mut seed = 1u64;
    let a = fill_f32(9 * 17, &mut seed);
    let b = fill_f32(17 * n, &mut seed);
    assert_ne!(
        golden(9, n, 17, &a, &b, &bias_first),
        golden(9, n, 17, &a, &b, &relu_first)
    );
}

#[test]
fn each_node_kind() {
    check(7, 18, 21, &[PostOp::Relu]);
    check(7, 18, 21, &[PostOp::ReluScale(0.01)]);
    check(7, 18, 21, &[PostOp::GeluTanh]);
    check(7, 18, 21, &[PostOp::GeluErf]);
    check(
        7,
        18,
        21,
        &[PostOp::Clip {
            min: -0.75,
            max: 1.25,
        }],
    );
}

#[test]
fn disable_sentinel_stops_the_chain() {
    let bias = vec![1000.0f32; 18];
    check(
        6,
        18,
        12,
        &[
            PostOp::Relu,
            PostOp::Disable,
            PostOp::Bias {
                values: &bias,
                axis: BiasAxis::Col,
            },
        ],
    );
}

#[test]
fn row_axis_bias() {
    let m = 13;
    let bias: Vec<f32> = (0..m).map(|i| i as f32 - 6.0).collect();
    check(
        m,
        29,
        15,
        &[PostOp::Bias {
            values: &bias,
            axis: BiasAxis::Row,
        }],
    );
}

#[test]
fn full_pipeline_stack() {
    let n = 40;
    let bias: Vec<f32> = (0..n).map(|j| (j as f32 * 0.17).sin()).collect();
    check(
        17,
        n,
        33,
        &[
            PostOp::Bias {
                values: &bias,
                axis: BiasAxis::Col,
            },
            PostOp::GeluTanh,
            PostOp::ReluScale(0.1),
            PostOp::Clip {
                min: -0.5,
                max: 0.9,
            },
        ],
    );
}

#[test]
fn cursor_positions_survive_fringe_chains() {
    // column-indexed bias makes any cursor slip visible; cover every
    // row and column remainder against a full 6 x 16 tile grid
    for m in [5, 6, 7, 11] {
        for n in [1, 2, 4, 8, 10, 15, 16, 17, 31] {
            let bias: Vec<f32> = (0..n).map(|j| 10.0 * j as f32).collect();
            check(
                m,
                n,
                9,
                &[PostOp::Bias {
                    values: &bias,
                    axis: BiasAxis::Col,
                }],
            );
        }
    }
}

#[test]
fn pipeline_runs_once_across_kc_partitions() {
    // with a tiny KC the K loop takes many partitions; relu must only
    // fire after the last one, never on partial sums
    let (m, n, k) = (12, 20, 160);
    let mut seed = 9u64;
    let a = fill_f32(m * k, &mut seed);
    let b = fill_f32(k * n, &mut seed);
    let want = golden(m, n, k, &a, &b, &[PostOp::Relu]);

    let bs = BlockSizes {
        mc: 6,
        nc: 16,
        kc: 16,
        mr: 6,
        nr: 16,
    };
    let mut got = vec![0.0f32; m * n];
    gemm_f32_with_block_sizes(m, n, k, 1.0, &a, k, &b, n, 0.0, &mut got, n, &[PostOp::Relu], bs)
        .unwrap();
    for (i, (g, w)) in got.iter().zip(&want).enumerate() {
        assert!(
            (g - w).abs() <= 2e-4 * (1.0 + w.abs()),
            "element {i}: got {g}, want {w}"
        );
    }
}

#[test]
fn integer_pipeline_semantics() {
    // scalar handlers drive the integer paths too; spot-check them
    assert_eq!(postops::apply(-8i32, &[PostOp::ReluScale(3)], 0, 0), -24);
    assert_eq!(
        postops::apply(
            40i32,
            &[PostOp::Clip {
                min: -10,
                max: 10
            }],
            0,
            0
        ),
        10
    );
    let bias = [5i32, 7];
    assert_eq!(
        postops::apply(
            1i32,
            &[PostOp::Bias {
                values: &bias,
                axis: BiasAxis::Col
            }],
            0,
            1
        ),
        8
    );
    assert_eq!(3000i32.gelu_tanh(), 3000);
}
