use criterion::{criterion_group, criterion_main, Criterion};
use jack::{compiler::compile, lexer::SUGGESTED_TOKENS_CAPACITY, util::intern::Interner};
use std::hint::black_box;

static INPUT: &str = include_str!("../../fixtures/Square/Square.jack");

fn criterion_benchmark(c: &mut Criterion) {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    let mut interner = Interner::with_capacity(128);

    c.bench_function("compiler", |b| {
        b.iter(|| {
            tokens.clear();
            let code = compile(black_box(INPUT), &mut tokens, &mut interner).unwrap();
            black_box(code);
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
