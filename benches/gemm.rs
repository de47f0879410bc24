use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use lpgemm_kernels::{gemm_f32, gemm_s8s8s16, gemm_u8s8s16, par_gemm_f32, BiasAxis, PostOp};
use rand::Rng;

fn benchmark_gemm_f32(c: &mut Criterion) {
    let mut group = c.benchmark_group("gemm_f32");

    let sizes: &[(usize, usize, usize)] = &[
        (256, 256, 256),
        (512, 512, 512),
        (1024, 1024, 1024),
        // Transformer-like shapes: (tokens, hidden, hidden)
        (128, 4096, 4096),
        (1, 4096, 4096),
    ];

    let mut rng = rand::thread_rng();

    for &(m, n, k) in sizes {
        let flops = (2 * m * n * k) as u64;
        group.throughput(Throughput::Elements(flops));

        let a: Vec<f32> = (0..m * k).map(|_| rng.gen()).collect();
        let b: Vec<f32> = (0..k * n).map(|_| rng.gen()).collect();
        let bias: Vec<f32> = (0..n).map(|_| rng.gen()).collect();
        let mut c_out = vec![0.0f32; m * n];

        group.bench_function(format!("serial_{m}x{n}x{k}"), |bench| {
            bench.iter(|| {
                gemm_f32(
                    black_box(m),
                    black_box(n),
                    black_box(k),
                    1.0,
                    black_box(&a),
                    k,
                    black_box(&b),
                    n,
                    0.0,
                    black_box(&mut c_out),
                    n,
                    &[],
                )
                .unwrap()
            })
        });

        let fused = [
            PostOp::Bias {
                values: &bias,
                axis: BiasAxis::Col,
            },
            PostOp::Relu,
        ];
        group.bench_function(format!("bias_relu_{m}x{n}x{k}"), |bench| {
            bench.iter(|| {
                gemm_f32(
                    black_box(m),
                    black_box(n),
                    black_box(k),
                    1.0,
                    black_box(&a),
                    k,
                    black_box(&b),
                    n,
                    0.0,
                    black_box(&mut c_out),
                    n,
                    black_box(&fused),
                )
                .unwrap()
            })
        });

        group.bench_function(format!("parallel_{m}x{n}x{k}"), |bench| {
            bench.iter(|| {
                par_gemm_f32(
                    black_box(m),
                    black_box(n),
                    black_box(k),
                    1.0,
                    black_box(&a),
                    k,
                    black_box(&b),
                    n,
                    0.0,
                    black_box(&mut c_out),
                    n,
                    &[],
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

fn benchmark_gemm_int8(c: &mut Criterion) {
    let mut group = c.benchmark_group("gemm_int8");

    let mut rng = rand::thread_rng();

    for &(m, n, k) in &[(256, 256, 256), (512, 512, 512)] {
        let flops = (2 * m * n * k) as u64;
        group.throughput(Throughput::Elements(flops));

        let a_u8: Vec<u8> = (0..m * k).map(|_| rng.gen()).collect();
        let a_i8: Vec<i8> = (0..m * k).map(|_| rng.gen()).collect();
        let b: Vec<i8> = (0..k * n).map(|_| rng.gen()).collect();
        let mut c_out = vec![0i16; m * n];

        group.bench_function(format!("u8s8s16_{m}x{n}x{k}"), |bench| {
            bench.iter(|| {
                let _ = gemm_u8s8s16(
                    black_box(m),
                    black_box(n),
                    black_box(k),
                    1,
                    black_box(&a_u8),
                    k,
                    black_box(&b),
                    n,
                    0,
                    black_box(&mut c_out),
                    n,
                    &[],
                );
            })
        });

        group.bench_function(format!("s8s8s16_{m}x{n}x{k}"), |bench| {
            bench.iter(|| {
                let _ = gemm_s8s8s16(
                    black_box(m),
                    black_box(n),
                    black_box(k),
                    1,
                    black_box(&a_i8),
                    k,
                    black_box(&b),
                    n,
                    0,
                    black_box(&mut c_out),
                    n,
                    &[],
                );
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_gemm_f32, benchmark_gemm_int8);
criterion_main!(benches);
