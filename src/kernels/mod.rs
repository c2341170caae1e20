//! Kernel source catalog and runtime specialization
//!
//! WGSL has no templates, so generic kernels are kept as source text with
//! `{{KEY}}`, `{{VALUE}}`, and `{{COMP}}` placeholders and specialized by
//! string splicing at compile time, one compilation per distinct
//! [`CompilationKey`]. The catalog itself is immutable `'static` data; the
//! host only ever reads it.

mod compile;
pub mod sort;

pub use compile::{CompilationKey, CompileCache, CompiledKernel, compile_wgsl};

/// A named device kernel source template.
///
/// `source` is WGSL text containing generic placeholders; `entry_point` is
/// the compute entry the specialized module exposes; `rw_storage_buffers` is
/// the number of read-write data buffers the kernel binds before the
/// comparator and parameter bindings.
pub struct KernelTemplate {
    /// Catalog lookup name.
    pub name: &'static str,
    /// WGSL source with specialization placeholders.
    pub source: &'static str,
    /// Compute entry point name.
    pub entry_point: &'static str,
    /// Read-write storage buffer count (bindings 0..n).
    pub rw_storage_buffers: u32,
    /// Workgroup size baked into the template's `@workgroup_size`.
    pub workgroup_size: u32,
}

static CATALOG: &[KernelTemplate] = &[
    KernelTemplate {
        name: "sort_by_key",
        source: sort::SORT_BY_KEY_TEMPLATE,
        entry_point: "sort_by_key",
        rw_storage_buffers: 2,
        workgroup_size: sort::WGSIZE,
    },
    KernelTemplate {
        name: "sort",
        source: sort::SORT_TEMPLATE,
        entry_point: "sort",
        rw_storage_buffers: 1,
        workgroup_size: sort::WGSIZE,
    },
];

/// Look up a template by name.
pub fn template(name: &str) -> Option<&'static KernelTemplate> {
    CATALOG.iter().find(|t| t.name == name)
}

/// Specialize a template with concrete WGSL type names.
///
/// Returns the spliced source followed by an instantiation banner naming the
/// specialization. `value` is `None` for keys-only kernels.
pub fn specialize(
    tpl: &KernelTemplate,
    key: &str,
    value: Option<&str>,
    comp: &str,
) -> String {
    let mut source = tpl.source.replace("{{KEY}}", key).replace("{{COMP}}", comp);
    if let Some(value) = value {
        source = source.replace("{{VALUE}}", value);
    }
    let banner = match value {
        Some(value) => format!(
            "\n// instantiated: {}<{}, {}, {}>\n",
            tpl.name, key, value, comp
        ),
        None => format!("\n// instantiated: {}<{}, {}>\n", tpl.name, key, comp),
    };
    source.push_str(&banner);
    source
}
