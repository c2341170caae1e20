//! Device type registry: WGSL names and definitions for host types
//!
//! Every type that crosses the host/device boundary must resolve to two pieces
//! of text: a single WGSL token naming the type, and (for non-builtins) a
//! self-contained WGSL declaration of it. Built-in storage scalars (`u32`,
//! `i32`, `f32`) carry an empty definition because WGSL already knows them.
//!
//! Ordering functors follow the same rule, with one extra call-site
//! convention: a registered ordering type `name` must also define
//! `fn name_call(c: name, a: K, b: K) -> bool` in its WGSL definition, which
//! is what the kernel templates invoke with the buffer-transported functor
//! value.
//!
//! # Example
//!
//! ```ignore
//! #[repr(C)]
//! #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
//! struct ByLowBits {
//!     mask: u32,
//! }
//!
//! impl DeviceType for ByLowBits {
//!     fn type_name() -> String {
//!         "by_low_bits".into()
//!     }
//!     fn type_definition() -> String {
//!         "struct by_low_bits { mask: u32 }\n\
//!          fn by_low_bits_call(c: by_low_bits, a: u32, b: u32) -> bool {\n\
//!              return (a & c.mask) < (b & c.mask);\n\
//!          }\n"
//!             .into()
//!     }
//! }
//!
//! impl SortOrdering<u32> for ByLowBits {
//!     fn precedes(&self, a: &u32, b: &u32) -> bool {
//!         (a & self.mask) < (b & self.mask)
//!     }
//! }
//! ```

use std::marker::PhantomData;

use crate::error::{Error, Result};

/// A host type that can cross into device kernels.
///
/// `type_name` must be a single token usable as a WGSL type name;
/// `type_definition` is the WGSL declaration of the type, or empty for WGSL
/// builtins. The `Pod` bound makes "trivially copyable" a type-system fact:
/// values are transported to the device as raw bytes.
pub trait DeviceType: bytemuck::Pod {
    /// The WGSL name of this type (a single identifier token).
    fn type_name() -> String;

    /// The WGSL declaration of this type; empty for builtins.
    fn type_definition() -> String {
        String::new()
    }
}

/// An ordering functor usable by the sort algorithms.
///
/// Host paths call `precedes` directly; the accelerator path splices the
/// type's WGSL definition into the kernel and calls `<name>_call` with the
/// functor value bound as a one-element buffer. `precedes(a, b)` returning
/// `true` means "a precedes b" (a strict weak ordering).
pub trait SortOrdering<K: DeviceType>: DeviceType {
    /// Host-side evaluation of the ordering.
    fn precedes(&self, a: &K, b: &K) -> bool;
}

macro_rules! impl_builtin_device_type {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl DeviceType for $ty {
                fn type_name() -> String {
                    $name.to_string()
                }
            }
        )*
    };
}

// WGSL storage-compatible scalars. f64/i64 have no WGSL storage type and are
// deliberately left without impls.
impl_builtin_device_type! {
    u32 => "u32",
    i32 => "i32",
    f32 => "f32",
}

// ============================================================================
// Built-in Orderings
// ============================================================================

/// Ascending ordering functor for scalar keys (`a < b`).
///
/// The padding field keeps the struct non-zero-sized so it can be bound as a
/// device buffer; WGSL structs cannot be empty either.
#[repr(C)]
pub struct Less<K> {
    _pad: u32,
    _marker: PhantomData<K>,
}

/// Descending ordering functor for scalar keys (`a > b`).
#[repr(C)]
pub struct Greater<K> {
    _pad: u32,
    _marker: PhantomData<K>,
}

macro_rules! impl_scalar_ordering {
    ($functor:ident, $prefix:literal, $wgsl_op:literal, $host:expr) => {
        impl<K> $functor<K> {
            /// Create the functor.
            pub fn new() -> Self {
                Self {
                    _pad: 0,
                    _marker: PhantomData,
                }
            }
        }

        impl<K> Default for $functor<K> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<K> Clone for $functor<K> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<K> Copy for $functor<K> {}

        // Safe: repr(C), a single u32 field and a ZST marker; no padding.
        unsafe impl<K: 'static> bytemuck::Zeroable for $functor<K> {}
        unsafe impl<K: 'static> bytemuck::Pod for $functor<K> {}

        impl<K: DeviceType + PartialOrd> DeviceType for $functor<K> {
            fn type_name() -> String {
                format!(concat!($prefix, "_{}"), K::type_name())
            }

            fn type_definition() -> String {
                let k = K::type_name();
                format!(
                    concat!(
                        "struct ",
                        $prefix,
                        "_{k} {{ _pad: u32 }}\n",
                        "fn ",
                        $prefix,
                        "_{k}_call(c: ",
                        $prefix,
                        "_{k}, a: {k}, b: {k}) -> bool {{ return a ",
                        $wgsl_op,
                        " b; }}\n"
                    ),
                    k = k
                )
            }
        }

        impl<K: DeviceType + PartialOrd> SortOrdering<K> for $functor<K> {
            fn precedes(&self, a: &K, b: &K) -> bool {
                $host(a, b)
            }
        }
    };
}

impl_scalar_ordering!(Less, "less", "<", |a: &K, b: &K| a < b);
impl_scalar_ordering!(Greater, "greater", ">", |a: &K, b: &K| a > b);

// ============================================================================
// Validation and Prelude Assembly
// ============================================================================

fn is_wgsl_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

const WGSL_BUILTINS: &[&str] = &["u32", "i32", "f32"];

/// Check that `T` resolves to a usable WGSL binding.
///
/// Called at the dispatcher boundary so a bad registration surfaces as a
/// typed error before any compile is attempted. Builtins need no definition;
/// everything else must carry one.
pub fn validate<T: DeviceType>() -> Result<()> {
    let name = T::type_name();
    if !is_wgsl_identifier(&name) {
        return Err(Error::MissingTypeBinding { type_name: name });
    }
    if !WGSL_BUILTINS.contains(&name.as_str()) && T::type_definition().is_empty() {
        return Err(Error::MissingTypeBinding { type_name: name });
    }
    Ok(())
}

/// Concatenate the caller prelude and a deterministic sequence of type
/// definitions, emitting each definition at most once.
///
/// Dedup keys on the definition text itself, so a type referenced as both key
/// and value (or two functors sharing a helper type) never produces a WGSL
/// redefinition error.
pub fn assemble_prelude(user_prelude: &str, definitions: &[String]) -> String {
    let mut out = String::new();
    if !user_prelude.is_empty() {
        out.push_str(user_prelude);
        if !user_prelude.ends_with('\n') {
            out.push('\n');
        }
    }
    let mut seen: Vec<&str> = Vec::new();
    for def in definitions {
        if def.is_empty() || seen.contains(&def.as_str()) {
            continue;
        }
        seen.push(def);
        out.push_str(def);
        if !def.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}
