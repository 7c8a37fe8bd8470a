//! Performance benchmarks for overload resolution and value marshaling.
//!
//! - Binding: overload groups of growing size, param arrays, generics
//! - Marshaling: primitives, strings and object identity lookups
//! - Dispatch: member calls through the bridge entry points
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect scope timings for
//! the binder and the marshaler:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hostbridge::binder::{Binder, NoCallbacks};
use hostbridge::prelude::*;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    let Some(frame_view) = FRAME_VIEW.get() else {
        return;
    };
    let view = frame_view.lock();
    println!("\n=== Profiling: {} frames recorded ===\n", view.recent_frames().count());
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

fn noop(_: &mut CallContext) -> Result<(), BridgeError> {
    Ok(())
}

/// `count` overloads of `F`, each taking `i + 1` parameters of one type.
fn overload_group(count: usize) -> Vec<Arc<MethodEntry>> {
    let types = [HostType::INT32, HostType::DOUBLE, HostType::STRING, HostType::INT64];
    (0..count)
        .map(|i| {
            let params = (0..=i % 4).map(|p| ParamEntry::new(format!("p{p}"), types[(i + p) % types.len()].clone()));
            Arc::new(MethodEntry::new("F", noop).with_params(params))
        })
        .collect()
}

fn binding_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let registry = TypeRegistry::with_builtins();
    let binder = Binder::new(&registry, &NoCallbacks);

    let mut group = c.benchmark_group("binder/overloads");
    for count in [1, 4, 16, 64] {
        let methods = overload_group(count);
        let args = vec![HostValue::F64(1.0)];
        group.bench_with_input(BenchmarkId::from_parameter(count), &methods, |b, methods| {
            b.iter(|| {
                let bound = binder.bind_to_method(black_box(methods), black_box(&args));
                end_profiling_frame();
                black_box(bound.is_ok())
            });
        });
    }
    group.finish();

    let sum = [Arc::new(
        MethodEntry::new("Sum", noop).with_param(ParamEntry::params("values", HostType::INT32)),
    )];
    let args: Vec<HostValue> = (0..32).map(|i| HostValue::F64(f64::from(i))).collect();
    c.bench_function("binder/param_array_32", |b| {
        b.iter(|| black_box(binder.bind_to_method(&sum, black_box(&args)).is_ok()));
    });

    let identity = [Arc::new(
        MethodEntry::new("Identity", noop)
            .with_generic_params(["T"])
            .with_param(ParamEntry::new("value", HostType::MethodParam(0)))
            .returns(HostType::MethodParam(0)),
    )];
    let args = [HostValue::from("text")];
    c.bench_function("binder/generic_inference", |b| {
        b.iter(|| black_box(binder.bind_to_method(&identity, black_box(&args)).is_ok()));
    });

    print_profiling_stats();
}

fn marshaling_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let bridge = Bridge::new(TypeRegistry::with_builtins(), BridgeConfig::default().without_library());
    let Ok(state) = bridge.lock() else {
        return;
    };

    let mut group = c.benchmark_group("marshal");
    let values = [
        ("number", HostValue::F64(42.0)),
        ("string", HostValue::from("a moderately sized string value")),
        ("int64_box", HostValue::I64(9_007_199_254_740_993)),
    ];
    for (name, value) in &values {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let foreign = state.to_foreign(black_box(value));
                black_box(foreign.and_then(|v| state.to_host(&v)).is_ok())
            });
        });
    }

    let object = HostValue::Object(HostObject::new(HostType::OBJECT, ()));
    group.bench_function("object_identity", |b| {
        b.iter(|| black_box(state.to_foreign(black_box(&object)).is_ok()));
    });
    group.finish();
}

fn dispatch_benchmarks(c: &mut Criterion) {
    let bridge = Bridge::new(TypeRegistry::with_builtins(), BridgeConfig::default().without_library());
    let Ok(state) = bridge.lock() else {
        return;
    };
    let text = HostValue::from("dispatch");
    let length = HostValue::from("Length");

    c.bench_function("dispatch/property_get", |b| {
        b.iter(|| black_box(state.index(black_box(&text), &length).is_ok()));
    });
    c.bench_function("dispatch/box_arithmetic", |b| {
        b.iter(|| {
            let sum = state.arithmetic(ArithOp::Add, HostValue::I64(black_box(1 << 60)), HostValue::F64(1.0));
            black_box(sum.is_ok())
        });
    });
}

criterion_group!(benches, binding_benchmarks, marshaling_benchmarks, dispatch_benchmarks);
criterion_main!(benches);
