//! Common test utilities
#![allow(dead_code)]

use bulkr::{is_gpu_available, Control, DeviceType, SortOrdering};

/// A control for the default adapter, or `None` when the machine has no GPU.
///
/// Tests that need a device call this and return early on `None`, so the
/// suite passes on CI machines without adapters.
pub fn gpu_control() -> Option<Control> {
    if !is_gpu_available() {
        println!("No GPU available, skipping test");
        return None;
    }
    Some(Control::new())
}

/// Ordering on the low bits of a `u32` key, exercising a stateful
/// user-defined functor on both the host and device sides.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ByLowBits {
    pub mask: u32,
}

impl DeviceType for ByLowBits {
    fn type_name() -> String {
        "by_low_bits".into()
    }

    fn type_definition() -> String {
        "struct by_low_bits { mask: u32 }\n\
         fn by_low_bits_call(c: by_low_bits, a: u32, b: u32) -> bool {\n\
             return (a & c.mask) < (b & c.mask);\n\
         }\n"
            .into()
    }
}

impl SortOrdering<u32> for ByLowBits {
    fn precedes(&self, a: &u32, b: &u32) -> bool {
        (a & self.mask) < (b & self.mask)
    }
}

/// Assert that `keys` is ordered by `precedes`: no adjacent pair is inverted.
pub fn assert_sorted_by<K: std::fmt::Debug>(keys: &[K], precedes: impl Fn(&K, &K) -> bool) {
    for (i, window) in keys.windows(2).enumerate() {
        assert!(
            !precedes(&window[1], &window[0]),
            "inversion at index {}: {:?} before {:?}",
            i,
            window[0],
            window[1]
        );
    }
}
