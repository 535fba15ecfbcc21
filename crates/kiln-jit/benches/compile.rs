//! Compile and run benchmarks
//!
//! Measures whole-script compilation and warm calls through inline caches.

use criterion::{Criterion, criterion_group, criterion_main};
use kiln_jit::{JitConfig, Runtime};
use std::hint::black_box;

const SCRIPT: &str = "function get(o) { return o.x; } \
                      function P() { this.x = 1; } \
                      var a = new P(); var b = { y: 2, x: 3 }; \
                      get(a) + get(b) * 10";

fn bench_compile(c: &mut Criterion) {
    let rt = Runtime::new(JitConfig::default()).expect("runtime should start");
    // Warm the stub library so only the script itself is measured.
    rt.eval(SCRIPT).expect("script should run");

    c.bench_function("compile_script", |b| {
        b.iter(|| rt.compile(black_box(SCRIPT)).expect("compile should succeed"))
    });
}

fn bench_warm_calls(c: &mut Criterion) {
    let rt = Runtime::new(JitConfig::default()).expect("runtime should start");
    let script = rt.compile(SCRIPT).expect("compile should succeed");
    script.call(&[]).expect("first run should succeed");

    c.bench_function("run_polymorphic_script", |b| {
        b.iter(|| black_box(script.call(&[]).expect("run should succeed")))
    });
}

criterion_group!(benches, bench_compile, bench_warm_calls);
criterion_main!(benches);
