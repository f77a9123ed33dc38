//! Benchmark for the analysis pipeline.

use criterion::{criterion_group, criterion_main, Criterion};
use flowscope::complexity::estimate;
use flowscope::control_flow::build_control_flow;
use flowscope::diagnostics::Diagnostics;
use flowscope::parser::{parse, Lexer};
use flowscope::{compile, SemanticAnalyzer};
use std::hint::black_box;

const PROGRAM: &str = r#"
function fib(n: number) {
    if (n < 2) { return n; }
    return fib(n - 1) + fib(n - 2);
}

function sum(xs: array, n: number) {
    let total = 0;
    for (let i = 0; i < n; i++) {
        for (let j = 0; j < i; j++) {
            total += xs[j];
        }
    }
    return total;
}

let values = [1, 2, 3, 4, 5];
let result = sum(values, 5) + fib(10);
while (result > 0) {
    result = result - 1;
}
"#;

/// Программа из `copies` склеенных копий с разными именами функций.
fn large_program(copies: usize) -> String {
    (0..copies)
        .map(|i| PROGRAM.replace("fib", &format!("fib{}", i)).replace("sum", &format!("sum{}", i)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn benchmark_lexer(c: &mut Criterion) {
    let source = large_program(20);
    c.bench_function("lexer (20 programs)", |b| {
        b.iter(|| {
            let mut diagnostics = Diagnostics::new();
            black_box(Lexer::new(&source).tokenize(&mut diagnostics))
        });
    });
}

fn benchmark_parser(c: &mut Criterion) {
    let source = large_program(20);
    let mut diagnostics = Diagnostics::new();
    let tokens = Lexer::new(&source).tokenize(&mut diagnostics);
    c.bench_function("parser (20 programs)", |b| {
        b.iter(|| {
            let mut diagnostics = Diagnostics::new();
            black_box(parse(&tokens, &mut diagnostics).unwrap())
        });
    });
}

fn benchmark_analysis(c: &mut Criterion) {
    let mut diagnostics = Diagnostics::new();
    let tokens = Lexer::new(PROGRAM).tokenize(&mut diagnostics);
    let tree = parse(&tokens, &mut diagnostics).unwrap();

    c.bench_function("semantic analysis", |b| {
        b.iter(|| {
            let mut diagnostics = Diagnostics::new();
            black_box(SemanticAnalyzer::new(&tree).analyze(&mut diagnostics).unwrap())
        });
    });
    c.bench_function("control flow + complexity", |b| {
        b.iter(|| {
            let flow = build_control_flow(&tree).unwrap();
            black_box(estimate(&flow))
        });
    });
}

fn benchmark_compile(c: &mut Criterion) {
    c.bench_function("compile (full pipeline)", |b| {
        b.iter(|| black_box(compile(black_box(PROGRAM))));
    });
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_analysis,
    benchmark_compile
);
criterion_main!(benches);
