use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use peephole::{Program, Runner};
use std::fmt::Write;

/// A chain of `width` weight-decay updates, each padded with identities.
fn training_step(width: usize) -> String {
    let mut text = String::new();
    for i in 0..width {
        writeln!(text, "(graph param{i} (g{i} w{i}) (return (ScalarMul 1 w{i})))", i = i).unwrap();
    }
    text.push_str("(graph main (lr) (return (MakeTuple");
    for i in 0..width {
        write!(
            text,
            " (AddN (MakeTuple (Mul (AllReduce (Identity (Add g{i} 0))) (Mul 2 (Mul 3 lr))) (Mul w{i} 1.0)))",
            i = i
        )
        .unwrap();
    }
    text.push_str(")))");
    text
}

fn criterion_benchmark(c: &mut Criterion) {
    let program: Program = training_step(64).parse().unwrap();
    let runner = Runner::default();
    c.bench_function("run_to_saturation_64", |b| {
        b.iter_batched(
            || program.clone(),
            |mut p| black_box(runner.run(&mut p)),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
