//! Kernel compilation and the process-wide compile cache
//!
//! A specialized kernel is compiled at most once per [`CompilationKey`] for
//! the lifetime of the process. The cache holds one `OnceLock` cell per key;
//! the map lock is held only long enough to fetch or insert the cell, so
//! unrelated keys compile in parallel while racers on the same key block on
//! the cell and then observe the first compile's outcome. Failures are
//! cached too: repeated lookups of a broken specialization re-surface the
//! original diagnostic instead of re-compiling.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use wgpu::{
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    BufferBindingType, ComputePipeline, ComputePipelineDescriptor, Device,
    PipelineLayoutDescriptor, ShaderModuleDescriptor, ShaderSource, ShaderStages,
};

use crate::error::{Error, Result};

// ============================================================================
// CompilationKey
// ============================================================================

/// The identity under which a compiled kernel is cached.
///
/// Equal keys yield the identical cached kernel. `value_type` is empty for
/// keys-only kernels; `prelude_hash` folds the caller-supplied device code
/// into the fingerprint without retaining the text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompilationKey {
    /// Catalog template name.
    pub template: &'static str,
    /// WGSL name of the key type.
    pub key_type: String,
    /// WGSL name of the value type (empty for keys-only kernels).
    pub value_type: String,
    /// WGSL name of the comparator type.
    pub comparator_type: String,
    /// Hash of the caller-supplied prelude text.
    pub prelude_hash: u64,
    /// Adapter index the kernel was compiled against.
    pub device_id: usize,
}

impl CompilationKey {
    /// Build a key from the specialization's type names and prelude text.
    pub fn new(
        template: &'static str,
        key_type: String,
        value_type: String,
        comparator_type: String,
        prelude: &str,
        device_id: usize,
    ) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        prelude.hash(&mut hasher);
        Self {
            template,
            key_type,
            value_type,
            comparator_type,
            prelude_hash: hasher.finish(),
            device_id,
        }
    }
}

// ============================================================================
// CompiledKernel
// ============================================================================

/// A ready-to-launch compiled kernel.
///
/// Lives until process exit; never evicted. The working set is bounded by the
/// number of (template, type-triple) combinations a program instantiates.
pub struct CompiledKernel {
    pipeline: ComputePipeline,
    layout: BindGroupLayout,
    workgroup_size: u32,
    source: Option<String>,
}

impl CompiledKernel {
    /// The compute pipeline to bind.
    pub fn pipeline(&self) -> &ComputePipeline {
        &self.pipeline
    }

    /// The bind group layout the pipeline was built against.
    pub fn layout(&self) -> &BindGroupLayout {
        &self.layout
    }

    /// Workgroup size baked into the compiled module.
    ///
    /// This is the WGSL analog of the platform's preferred work-group-size
    /// multiple: on WGSL the workgroup size is a compile-time constant of the
    /// module, so it is recorded here at compile time.
    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// The fully assembled source, retained when the control's debug flag
    /// was set at compile time.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

#[derive(Clone, Debug)]
struct CompileFailure {
    diagnostic: String,
}

type Outcome = std::result::Result<Arc<CompiledKernel>, CompileFailure>;

// ============================================================================
// CompileCache
// ============================================================================

/// Process-wide mapping from [`CompilationKey`] to [`CompiledKernel`].
///
/// Guarantees at-most-one compile per distinct key; concurrent first-time
/// lookups for the same key block until the first compile completes, then
/// observe its result.
#[derive(Default)]
pub struct CompileCache {
    entries: Mutex<HashMap<CompilationKey, Arc<OnceLock<Outcome>>>>,
    compiles: AtomicUsize,
}

impl CompileCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached kernel for `key`, compiling with `f` on first use.
    ///
    /// `f` returns either a kernel or a diagnostic string; both outcomes are
    /// cached. A cached failure surfaces as [`Error::DeviceCompile`] carrying
    /// the diagnostic and the key.
    pub fn get_or_compile<F>(&self, key: &CompilationKey, f: F) -> Result<Arc<CompiledKernel>>
    where
        F: FnOnce() -> std::result::Result<CompiledKernel, String>,
    {
        let cell = {
            let mut entries = self.entries.lock();
            entries.entry(key.clone()).or_default().clone()
        };

        let outcome = cell.get_or_init(|| {
            self.compiles.fetch_add(1, Ordering::Relaxed);
            f().map(Arc::new)
                .map_err(|diagnostic| CompileFailure { diagnostic })
        });

        match outcome {
            Ok(kernel) => Ok(kernel.clone()),
            Err(failure) => Err(Error::DeviceCompile {
                key: key.clone(),
                diagnostic: failure.diagnostic.clone(),
            }),
        }
    }

    /// Number of compile invocations performed so far.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache has seen no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// WGSL Compilation
// ============================================================================

/// Bind group layout for the sort kernels: `rw_storage` read-write data
/// buffers at bindings `0..rw_storage`, the comparator as a read-only storage
/// buffer, and the pass parameters as a uniform.
fn create_layout(device: &Device, label: &str, rw_storage: u32) -> BindGroupLayout {
    let mut entries = Vec::with_capacity(rw_storage as usize + 2);

    for binding in 0..rw_storage {
        entries.push(BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }

    entries.push(BindGroupLayoutEntry {
        binding: rw_storage,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    entries.push(BindGroupLayoutEntry {
        binding: rw_storage + 1,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Compile an assembled WGSL compilation unit into a [`CompiledKernel`].
///
/// Validation errors from module and pipeline creation are captured with an
/// error scope and returned as the diagnostic string, which the compile
/// cache stores as a cached failure.
pub fn compile_wgsl(
    device: &Device,
    label: &'static str,
    entry_point: &'static str,
    source: &str,
    rw_storage: u32,
    workgroup_size: u32,
    keep_source: bool,
) -> std::result::Result<CompiledKernel, String> {
    let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(ShaderModuleDescriptor {
        label: Some(label),
        source: ShaderSource::Wgsl(source.into()),
    });

    let layout = create_layout(device, label, rw_storage);

    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        immediate_size: 0,
    });

    let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    });

    if let Some(error) = pollster::block_on(error_scope.pop()) {
        return Err(error.to_string());
    }

    Ok(CompiledKernel {
        pipeline,
        layout,
        workgroup_size,
        source: keep_source.then(|| source.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn test_key(template: &'static str, prelude: &str) -> CompilationKey {
        CompilationKey::new(
            template,
            "u32".into(),
            "f32".into(),
            "less_u32".into(),
            prelude,
            0,
        )
    }

    #[test]
    fn test_key_equality_and_hash_sensitivity() {
        let a = test_key("sort_by_key", "");
        let b = test_key("sort_by_key", "");
        assert_eq!(a, b);

        let c_prelude = test_key("sort_by_key", "// extra");
        assert_ne!(a, c_prelude);

        let mut c_device = test_key("sort_by_key", "");
        c_device.device_id = 1;
        assert_ne!(a, c_device);

        assert_ne!(a, test_key("sort", ""));
    }

    // The once-per-key contract is independent of the GPU: exercise it with
    // injected compile closures. Closures returning Err stand in for device
    // compile failures, which must be cached.
    #[test]
    fn test_failure_is_cached_and_resurfaced() {
        let cache = CompileCache::new();
        let key = test_key("sort_by_key", "");

        let first = cache.get_or_compile(&key, || Err("bad token".to_string()));
        assert!(matches!(first, Err(Error::DeviceCompile { .. })));

        // Second lookup must not invoke the closure again.
        let second = cache.get_or_compile(&key, || panic!("recompiled a cached failure"));
        match second {
            Err(Error::DeviceCompile { diagnostic, key: k }) => {
                assert_eq!(diagnostic, "bad token");
                assert_eq!(k, key);
            }
            other => panic!("expected DeviceCompile, got {:?}", other.map(|_| ())),
        }
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_lookups_compile_once() {
        let cache = Arc::new(CompileCache::new());
        let key = test_key("sort_by_key", "");
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    let _ = cache.get_or_compile(&key, || {
                        // Widen the race window so losers really do contend.
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Err("only one of us compiles".to_string())
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn test_distinct_keys_compile_separately() {
        let cache = CompileCache::new();
        let a = test_key("sort_by_key", "");
        let b = test_key("sort", "");

        let _ = cache.get_or_compile(&a, || Err("a".to_string()));
        let _ = cache.get_or_compile(&b, || Err("b".to_string()));

        assert_eq!(cache.compile_count(), 2);
        assert_eq!(cache.len(), 2);
    }
}
