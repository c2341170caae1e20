//! Error types for bulkr

use crate::kernels::CompilationKey;
use thiserror::Error;

/// Result type alias using bulkr's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bulkr operations
#[derive(Error, Debug)]
pub enum Error {
    /// A type reached the accelerator path without a usable WGSL binding
    #[error(
        "Missing device type binding for '{type_name}': register a WGSL name and definition via DeviceType"
    )]
    MissingTypeBinding {
        /// The offending type name (possibly empty or malformed)
        type_name: String,
    },

    /// The accelerator path received a size it cannot handle
    #[error("Unsupported size {len} for '{op}': the accelerator path requires a power-of-two length")]
    UnsupportedSize {
        /// The operation name
        op: &'static str,
        /// The rejected input length
        len: usize,
    },

    /// The requested run mode has no implementation for this algorithm
    #[error("The {backend} backend of '{op}' is not implemented")]
    UnsupportedBackend {
        /// The operation name
        op: &'static str,
        /// The dispatched backend name
        backend: &'static str,
    },

    /// Kernel source failed to compile on the device
    #[error("Device compile failed for {key:?}: {diagnostic}")]
    DeviceCompile {
        /// The cache identity of the failed compilation
        key: CompilationKey,
        /// The device compiler diagnostic text
        diagnostic: String,
    },

    /// A kernel launch, argument bind, or buffer map failed at the platform layer
    #[error("Device runtime failure during '{op}': {detail}")]
    DeviceRuntime {
        /// The offending operation name
        op: &'static str,
        /// Platform error detail
        detail: String,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Why the argument was rejected
        reason: String,
    },

    /// GPU backend initialization or platform error
    #[error("Backend error: {0}")]
    Backend(String),
}
