use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use search_syntax::parser::Parser;
use search_syntax::renderer::Renderer;
use search_syntax::{parse, parse_with_config, SearchConfig};
use std::hint::black_box;

fn test_cases() -> Vec<(&'static str, &'static str)> {
    vec![
        ("simple", "is:unresolved"),
        ("medium", "is:unresolved !level:error times_seen:>100 browser.name:[Chrome, Firefox]"),
        (
            "complex",
            r#"(event.type:error OR event.type:default) AND !user.email:"a@b.com" age:-24h transaction.duration:>300ms tags[server.name]:web-1 count():>10 free text"#,
        ),
        ("unbalanced", "((((((((((((((((a:1 b:2"),
    ]
}

// Benchmark: raw tokenizing without validation
fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_performance");

    for (name, query) in test_cases() {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &query, |b, &query| {
            b.iter(|| black_box(Parser::new(black_box(query)).parse()))
        });
    }

    group.finish();
}

// Benchmark: tokenizing plus validity annotation
fn benchmark_validate(c: &mut Criterion) {
    let config = SearchConfig::default();
    let mut group = c.benchmark_group("validate_performance");

    for (name, query) in test_cases() {
        group.bench_with_input(BenchmarkId::new("parse", name), &query, |b, &query| {
            b.iter(|| black_box(parse_with_config(black_box(query), &config)))
        });
    }

    group.finish();
}

// Benchmark: rendering with a moving cursor, as the search bar does per keystroke
fn benchmark_renderer(c: &mut Criterion) {
    let mut group = c.benchmark_group("renderer_performance");

    for (name, query) in test_cases() {
        let parsed = parse(query);
        group.bench_with_input(BenchmarkId::new("render", name), &parsed, |b, parsed| {
            let mut renderer = Renderer::new();
            let mut cursor = 0;
            b.iter(|| {
                cursor = (cursor + 1) % (query.len() + 1);
                black_box(renderer.render(parsed, Some(cursor)))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parser,
    benchmark_validate,
    benchmark_renderer
);
criterion_main!(benches);
