#[macro_use]
extern crate criterion;
extern crate bitpatch;

use bitpatch::{match_main, Config};
use criterion::Criterion;

static BENCH_PATTERN: &str = "bitap";
const BENCH_TEXT: &[&str] = &[
    "------------------------------------------------",
    "bitap-------------------------------------------",
    "--------------------bitap-----------------------",
    "-------------------------------------------bitap",
];

fn criterion_benchmark(c: &mut Criterion) {
    // TODO: Generate test cases randomly. Vary text length, pattern length,
    // match location (start, end, none). Benchmark both including pattern
    // mask creation time and amortized.
    let config = Config::default();
    for (i, txt) in BENCH_TEXT.iter().enumerate() {
        c.bench_function(&format!("match_main_{}", i + 1), move |b| {
            b.iter(|| match_main(&config, txt, BENCH_PATTERN, 0))
        });
        c.bench_function(&format!("baseline_{}", i + 1), move |b| {
            b.iter(|| txt.find(BENCH_PATTERN))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
