//! Per-call execution control
//!
//! A [`Control`] value travels with every algorithm invocation and decides
//! where and how the call runs: which adapter, which execution path, whether
//! compiled kernel source is retained for inspection, and how aggressively
//! work is oversubscribed per compute unit. Controls are cheap to clone and
//! carry no live device resources; the client for the selected adapter is
//! resolved from the process-wide cache at dispatch time, so constructing a
//! `Control` never touches the GPU.

use crate::device::{get_or_create_client, GpuClient, GpuDevice};
use crate::error::Result;

/// Which execution path an algorithm call takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run on the selected GPU adapter.
    Accelerator,
    /// Force a multi-threaded host implementation.
    MultiCoreHost,
    /// Force a single-threaded host implementation.
    SerialHost,
}

/// Execution parameters for a single algorithm call.
#[derive(Debug, Clone)]
pub struct Control {
    device: GpuDevice,
    run_mode: RunMode,
    debug: bool,
    wg_per_compute_unit: u32,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            device: GpuDevice::new(0),
            run_mode: RunMode::Accelerator,
            debug: false,
            wg_per_compute_unit: 64,
        }
    }
}

impl Control {
    /// A control targeting the default adapter with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a specific adapter.
    pub fn with_device(mut self, device: GpuDevice) -> Self {
        self.device = device;
        self
    }

    /// Select the execution path.
    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    /// Retain generated kernel source alongside compiled kernels. Useful when
    /// diagnosing comparator code; off by default to keep cache entries small.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Hint for how many workgroups to launch per compute unit in algorithms
    /// that size their grid from device occupancy.
    pub fn with_wg_per_compute_unit(mut self, wg: u32) -> Self {
        self.wg_per_compute_unit = wg;
        self
    }

    /// The adapter this control targets.
    pub fn device(&self) -> &GpuDevice {
        &self.device
    }

    /// The selected execution path.
    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    /// Whether kernel source retention is enabled.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// The workgroup oversubscription hint.
    pub fn wg_per_compute_unit(&self) -> u32 {
        self.wg_per_compute_unit
    }

    /// Resolve the cached client for the selected adapter.
    ///
    /// Clients are created lazily and shared process-wide per adapter index,
    /// so every call for the same adapter observes the same device, queue,
    /// and compile cache.
    pub fn client(&self) -> Result<GpuClient> {
        get_or_create_client(&self.device)
    }
}
