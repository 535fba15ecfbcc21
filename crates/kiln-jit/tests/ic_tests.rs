//! Inline cache behaviour observed through the public API

use kiln_jit::{HostValue, IcKind, JitConfig, Runtime, Value};
use proptest::prelude::*;

fn runtime() -> Runtime {
    Runtime::new(JitConfig::default()).expect("runtime should start")
}

#[test]
fn polymorphic_site_caches_each_map() {
    let rt = runtime();
    let value = rt
        .eval(
            "function get(o) { return o.x; } \
             var a = { x: 1 }; var b = { y: 2, x: 3 }; \
             get(a) + get(b) * 10 + get(a) * 100",
        )
        .expect("script should run");
    assert_eq!(value.as_smi(), Some(131));

    let stats = rt.ic_stats();
    assert!(
        stats
            .iter()
            .any(|ic| ic.kind == IcKind::Fixed && ic.probes >= 2 && !ic.megamorphic),
        "no polymorphic site in {stats:?}"
    );
}

#[test]
fn computed_keys_use_keyed_caches() {
    let rt = runtime();
    let value = rt
        .eval(
            "function read(o, k) { return o[k]; } \
             var o = { a: 1, b: 2 }; read(o, 'a') + read(o, 'b') * 10",
        )
        .expect("script should run");
    assert_eq!(value.as_smi(), Some(21));
    assert!(rt.ic_stats().iter().any(|ic| ic.kind == IcKind::Normal && ic.probes == 2));
}

#[test]
fn smi_keys_on_named_objects_are_not_cached() {
    let rt = runtime();
    let value = rt
        .eval(
            "function read(o, k) { return o[k]; } \
             var o = { a: 1 }; o[1] = 2; \
             read(o, 1) + read(o, 1) + read(o, 'a')",
        )
        .expect("script should run");
    assert_eq!(value.as_smi(), Some(5));

    // Only the string key produced a probe at the keyed site.
    let keyed: Vec<_> = rt
        .ic_stats()
        .into_iter()
        .filter(|ic| ic.kind == IcKind::Normal && ic.probes > 0)
        .collect();
    assert_eq!(keyed.len(), 1, "keyed sites: {keyed:?}");
    assert_eq!(keyed[0].probes, 1);
}

#[test]
fn site_goes_megamorphic_past_the_probe_limit() {
    let rt = Runtime::new(JitConfig {
        ic_probe_limit: 2,
        ..JitConfig::default()
    })
    .expect("runtime should start");
    let value = rt
        .eval(
            "function get(o) { return o.x; } \
             get({ x: 1 }) + get({ a: 0, x: 2 }) + get({ b: 0, x: 3 }) + get({ c: 0, x: 4 })",
        )
        .expect("script should run");
    assert_eq!(value.as_smi(), Some(10));
    assert!(rt.ic_stats().iter().any(|ic| ic.megamorphic && ic.probes == 2));
}

#[test]
fn stores_through_a_cached_slot_are_visible() {
    let rt = runtime();
    let value = rt
        .eval(
            "function bump(o) { o.n = o.n + 1; return o.n; } \
             var c = { n: 0 }; bump(c); bump(c); bump(c)",
        )
        .expect("script should run");
    assert_eq!(value.as_smi(), Some(3));
}

fn expected(exact: i64) -> HostValue {
    match Value::try_smi(exact) {
        Some(_) => HostValue::Int(exact),
        None => HostValue::Number(exact as f64),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_smi_arithmetic_matches_i64(a in any::<i32>(), b in any::<i32>()) {
        let rt = runtime();
        rt.eval(
            "function add(a, b) { return a + b; } \
             function sub(a, b) { return a - b; } \
             function mul(a, b) { return a * b; }",
        )
        .expect("script should run");

        let (a, b) = (a as i64, b as i64);
        for (name, exact) in [("add", a + b), ("sub", a - b), ("mul", a * b)] {
            let f = rt.global(name).expect("global should be readable");
            let f = rt
                .function(f)
                .expect("function check should succeed")
                .expect("global is a function");
            let result = f
                .call(&[Value::smi(a), Value::smi(b)])
                .expect("call should succeed");
            prop_assert_eq!(rt.inspect(result).expect("inspect should succeed"), expected(exact));
        }
    }
}
