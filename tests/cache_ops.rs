//! Integration tests for compile-cache behavior observed through the sorts
//!
//! Counts are read as deltas around each scenario because the cache is
//! process-wide and shared with any other instantiation this binary makes.

mod common;

use std::sync::{Arc, Barrier, Mutex, MutexGuard};

use bulkr::kernels::CompilationKey;
use bulkr::{sort_by_key_with, sort_with, Greater, Less};

// Count deltas are only meaningful when the tests of this binary do not
// interleave their compiles; each test holds this for its duration.
static COUNTER_LOCK: Mutex<()> = Mutex::new(());

fn counter_guard() -> MutexGuard<'static, ()> {
    COUNTER_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn test_concurrent_sorts_compile_once() {
    let _guard = counter_guard();
    let Some(ctl) = common::gpu_control() else {
        return;
    };
    let client = ctl.client().unwrap();
    let before = client.compile_cache().compile_count();

    // Eight threads race the same instantiation from a cold cache; exactly
    // one compile must happen and every thread must still sort correctly.
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let ctl = ctl.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let mut keys: Vec<u32> = (0..64).map(|i| (i * 37 + t) % 64).collect();
                let mut values: Vec<u32> = (0..64).collect();
                barrier.wait();
                sort_by_key_with(&ctl, &mut keys, &mut values, Less::new(), "").unwrap();
                assert!(keys.windows(2).all(|w| w[0] <= w[1]));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let after = client.compile_cache().compile_count();
    assert_eq!(after - before, 1);

    // A later call of the same instantiation is a pure cache hit.
    let mut keys: Vec<u32> = (0..64).rev().collect();
    let mut values: Vec<u32> = (0..64).collect();
    sort_by_key_with(&ctl, &mut keys, &mut values, Less::new(), "").unwrap();
    assert_eq!(client.compile_cache().compile_count(), after);
}

#[test]
fn test_distinct_instantiations_compile_separately() {
    let _guard = counter_guard();
    let Some(ctl) = common::gpu_control() else {
        return;
    };
    let client = ctl.client().unwrap();
    let before = client.compile_cache().compile_count();

    let mut a = vec![3i32, 1, 4, 1];
    sort_with(&ctl, &mut a, Less::new(), "").unwrap();

    let mut b = vec![2.5f32, 0.5, 1.5, 3.5];
    sort_with(&ctl, &mut b, Less::new(), "").unwrap();

    let after = client.compile_cache().compile_count();
    assert_eq!(after - before, 2);
}

#[test]
fn test_debug_control_retains_kernel_source() {
    let _guard = counter_guard();
    let Some(ctl) = common::gpu_control() else {
        return;
    };
    let ctl = ctl.with_debug(true);
    let client = ctl.client().unwrap();

    let mut keys = vec![5i32, -1, 3, 7];
    sort_with(&ctl, &mut keys, Greater::new(), "").unwrap();
    assert_eq!(keys, vec![7, 5, 3, -1]);

    // Look the compiled kernel up under its cache identity; a hit must not
    // recompile, and the retained source names the specialization.
    let key = CompilationKey::new(
        "sort",
        "i32".into(),
        String::new(),
        "greater_i32".into(),
        "",
        client.device_index(),
    );
    let kernel = client
        .compile_cache()
        .get_or_compile(&key, || panic!("expected a cache hit"))
        .unwrap();

    let source = kernel.source().expect("debug control retains source");
    assert!(source.contains("greater_i32_call"));
    assert!(source.contains("// instantiated: sort<i32, greater_i32>"));
}
