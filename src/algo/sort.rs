//! Bitonic merge sort, keyed and keys-only
//!
//! `sort_by_key` reorders a key slice and applies the identical permutation to
//! a value slice; `sort` reorders keys alone. Both run a bitonic network on
//! the accelerator: `log2(n) * (log2(n) + 1) / 2` compare-exchange launches,
//! each dispatching `n / 2` threads. The data buffers and the comparator are
//! bound once per call; only the 16-byte pass uniform changes between
//! launches, and every launch is awaited before the next pass parameters are
//! written.
//!
//! The network's shape requires power-of-two input lengths; other lengths are
//! rejected up front with [`Error::UnsupportedSize`] before any device
//! resource is touched, and inputs are left untouched on every error path.

use wgpu::Buffer;

use crate::control::{Control, RunMode};
use crate::device::{DeviceVector, GpuClient};
use crate::error::{Error, Result};
use crate::kernels::{self, CompilationKey, KernelTemplate};
use crate::registry::{self, DeviceType, SortOrdering};

// ============================================================================
// Slice Entry Points
// ============================================================================

/// Sort `keys` in place and permute `values` identically, on the default
/// adapter.
///
/// `values` may be longer than `keys`; only the first `keys.len()` values
/// participate. `comp.precedes(a, b)` defines the order: `Less` yields
/// ascending keys, `Greater` descending.
///
/// # Errors
///
/// [`Error::InvalidArgument`] when `values` is shorter than `keys`;
/// [`Error::UnsupportedSize`] when the length is not a power of two;
/// [`Error::UnsupportedBackend`] when the control forces a host run mode.
pub fn sort_by_key<K, V, C>(keys: &mut [K], values: &mut [V], comp: C) -> Result<()>
where
    K: DeviceType,
    V: DeviceType,
    C: SortOrdering<K>,
{
    sort_by_key_with(&Control::default(), keys, values, comp, "")
}

/// [`sort_by_key`] with an explicit control and a WGSL prelude spliced ahead
/// of the kernel (helper functions the comparator calls, shared constants).
pub fn sort_by_key_with<K, V, C>(
    ctl: &Control,
    keys: &mut [K],
    values: &mut [V],
    comp: C,
    prelude: &str,
) -> Result<()>
where
    K: DeviceType,
    V: DeviceType,
    C: SortOrdering<K>,
{
    const OP: &str = "sort_by_key";

    let n = keys.len();
    if values.len() < n {
        return Err(Error::InvalidArgument {
            arg: "values",
            reason: format!("{} values for {} keys", values.len(), n),
        });
    }
    if n <= 1 {
        return Ok(());
    }
    check_run_mode(ctl, OP)?;

    registry::validate::<K>()?;
    registry::validate::<V>()?;
    registry::validate::<C>()?;
    check_power_of_two(n, OP)?;

    let client = ctl.client()?;
    let mut key_vec = DeviceVector::from_host_slice(&client, keys)?;
    let mut value_vec = DeviceVector::from_host_slice(&client, &mut values[..n])?;

    run_bitonic::<K, C>(
        ctl,
        &client,
        sort_by_key_template()?,
        Some(V::type_name()),
        Some(V::type_definition()),
        &[key_vec.buffer(), value_vec.buffer()],
        n,
        &comp,
        prelude,
        OP,
    )?;

    // Mapping materializes the device results back into the caller's slices.
    key_vec.map()?;
    value_vec.map()?;
    Ok(())
}

/// [`sort_by_key`] over vectors already resident on the device.
///
/// Results stay in the vectors' buffers; call [`DeviceVector::map`] to bring
/// them host-side. Both vectors must have been created through the control's
/// adapter.
pub fn sort_by_key_device<K, V, C>(
    ctl: &Control,
    keys: &mut DeviceVector<'_, K>,
    values: &mut DeviceVector<'_, V>,
    comp: C,
    prelude: &str,
) -> Result<()>
where
    K: DeviceType,
    V: DeviceType,
    C: SortOrdering<K>,
{
    const OP: &str = "sort_by_key";

    let n = keys.len();
    if values.len() < n {
        return Err(Error::InvalidArgument {
            arg: "values",
            reason: format!("{} values for {} keys", values.len(), n),
        });
    }
    if n <= 1 {
        return Ok(());
    }
    check_run_mode(ctl, OP)?;

    registry::validate::<K>()?;
    registry::validate::<V>()?;
    registry::validate::<C>()?;
    check_power_of_two(n, OP)?;

    let client = keys.client().clone();
    run_bitonic::<K, C>(
        ctl,
        &client,
        sort_by_key_template()?,
        Some(V::type_name()),
        Some(V::type_definition()),
        &[keys.buffer(), values.buffer()],
        n,
        &comp,
        prelude,
        OP,
    )
}

/// Sort `keys` in place on the default adapter.
pub fn sort<K, C>(keys: &mut [K], comp: C) -> Result<()>
where
    K: DeviceType,
    C: SortOrdering<K>,
{
    sort_with(&Control::default(), keys, comp, "")
}

/// [`sort`] with an explicit control and WGSL prelude.
pub fn sort_with<K, C>(ctl: &Control, keys: &mut [K], comp: C, prelude: &str) -> Result<()>
where
    K: DeviceType,
    C: SortOrdering<K>,
{
    const OP: &str = "sort";

    let n = keys.len();
    if n <= 1 {
        return Ok(());
    }
    check_run_mode(ctl, OP)?;

    registry::validate::<K>()?;
    registry::validate::<C>()?;
    check_power_of_two(n, OP)?;

    let client = ctl.client()?;
    let mut key_vec = DeviceVector::from_host_slice(&client, keys)?;

    run_bitonic::<K, C>(
        ctl,
        &client,
        sort_template()?,
        None,
        None,
        &[key_vec.buffer()],
        n,
        &comp,
        prelude,
        OP,
    )?;

    key_vec.map()?;
    Ok(())
}

/// [`sort`] over a vector already resident on the device.
pub fn sort_device<K, C>(
    ctl: &Control,
    keys: &mut DeviceVector<'_, K>,
    comp: C,
    prelude: &str,
) -> Result<()>
where
    K: DeviceType,
    C: SortOrdering<K>,
{
    const OP: &str = "sort";

    let n = keys.len();
    if n <= 1 {
        return Ok(());
    }
    check_run_mode(ctl, OP)?;

    registry::validate::<K>()?;
    registry::validate::<C>()?;
    check_power_of_two(n, OP)?;

    let client = keys.client().clone();
    run_bitonic::<K, C>(
        ctl,
        &client,
        sort_template()?,
        None,
        None,
        &[keys.buffer()],
        n,
        &comp,
        prelude,
        OP,
    )
}

// ============================================================================
// Dispatch Checks
// ============================================================================

fn check_run_mode(ctl: &Control, op: &'static str) -> Result<()> {
    match ctl.run_mode() {
        RunMode::Accelerator => Ok(()),
        RunMode::MultiCoreHost => Err(Error::UnsupportedBackend {
            op,
            backend: "multi-core-host",
        }),
        RunMode::SerialHost => Err(Error::UnsupportedBackend {
            op,
            backend: "serial-host",
        }),
    }
}

fn check_power_of_two(n: usize, op: &'static str) -> Result<()> {
    if n.is_power_of_two() {
        Ok(())
    } else {
        Err(Error::UnsupportedSize { op, len: n })
    }
}

fn sort_by_key_template() -> Result<&'static KernelTemplate> {
    kernels::template("sort_by_key")
        .ok_or_else(|| Error::Backend("kernel catalog is missing 'sort_by_key'".into()))
}

fn sort_template() -> Result<&'static KernelTemplate> {
    kernels::template("sort")
        .ok_or_else(|| Error::Backend("kernel catalog is missing 'sort'".into()))
}

// ============================================================================
// Engine
// ============================================================================

/// Drive the full stage/pass schedule of the bitonic network over already
/// resident data buffers.
///
/// Binds `data_buffers`, the comparator value, and the pass uniform into one
/// bind group up front; each launch rewrites only the uniform.
#[allow(clippy::too_many_arguments)]
fn run_bitonic<K, C>(
    ctl: &Control,
    client: &GpuClient,
    tpl: &'static KernelTemplate,
    value_name: Option<String>,
    value_definition: Option<String>,
    data_buffers: &[&Buffer],
    n: usize,
    comp: &C,
    prelude: &str,
    op: &'static str,
) -> Result<()>
where
    K: DeviceType,
    C: SortOrdering<K>,
{
    let key_name = K::type_name();
    let comp_name = C::type_name();

    let key = CompilationKey::new(
        tpl.name,
        key_name.clone(),
        value_name.clone().unwrap_or_default(),
        comp_name.clone(),
        prelude,
        client.device_index(),
    );

    let keep_source = ctl.debug();
    let kernel = client.compile_cache().get_or_compile(&key, || {
        let mut definitions = vec![K::type_definition()];
        if let Some(def) = value_definition {
            definitions.push(def);
        }
        definitions.push(C::type_definition());

        let mut source = registry::assemble_prelude(prelude, &definitions);
        source.push_str(&kernels::specialize(
            tpl,
            &key_name,
            value_name.as_deref(),
            &comp_name,
        ));

        kernels::compile_wgsl(
            client.wgpu_device(),
            tpl.name,
            tpl.entry_point,
            &source,
            tpl.rw_storage_buffers,
            tpl.workgroup_size,
            keep_source,
        )
    })?;

    // Transport the comparator value as a one-element read-only buffer. The
    // buffer must be at least 4 bytes even for stateless functors.
    let comp_bytes = bytemuck::bytes_of(comp);
    let comp_size = ((comp_bytes.len().max(4) as u64).div_ceil(4)) * 4;
    let comp_buffer = client.create_storage_buffer("bulkr comparator", comp_size);
    if !comp_bytes.is_empty() {
        client.write_buffer(&comp_buffer, std::slice::from_ref(comp));
    }

    let params_buffer = client.create_uniform_buffer("bulkr pass params", 16);

    let mut buffers: Vec<&Buffer> = data_buffers.to_vec();
    buffers.push(&comp_buffer);
    buffers.push(&params_buffer);
    let bind_group = client.create_bind_group(kernel.layout(), &buffers);

    let n_half = (n / 2) as u32;
    let workgroups = n_half.div_ceil(kernel.workgroup_size());
    let stages = n.trailing_zeros();

    for stage in 0..stages {
        for pass in 0..=stage {
            client.write_buffer(&params_buffer, &[n_half, stage, pass, 0u32]);

            let mut encoder =
                client
                    .wgpu_device()
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some(tpl.name),
                    });
            {
                let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(tpl.name),
                    timestamp_writes: None,
                });
                cpass.set_pipeline(kernel.pipeline());
                cpass.set_bind_group(0, &bind_group, &[]);
                cpass.dispatch_workgroups(workgroups, 1, 1);
            }
            client.submit_and_wait(encoder, op)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Greater, Less};
    use rand::Rng;

    // Host replica of one kernel launch: same index math, same direction
    // rule, same compare-exchange. Running the full schedule through it
    // validates the network independently of any GPU.
    fn run_pass<K: Copy, V: Copy>(
        keys: &mut [K],
        values: &mut [V],
        stage: u32,
        pass: u32,
        precedes: &dyn Fn(&K, &K) -> bool,
    ) {
        let n_half = keys.len() / 2;
        for i in 0..n_half {
            let pair_distance = 1usize << (stage - pass);
            let block_width = 2 * pair_distance;
            let left_id = (i % pair_distance) + (i / pair_distance) * block_width;
            let right_id = left_id + pair_distance;

            let same_direction_width = 1usize << stage;
            let ascending = (i / same_direction_width) % 2 == 0;

            let swap = if ascending {
                precedes(&keys[right_id], &keys[left_id])
            } else {
                precedes(&keys[left_id], &keys[right_id])
            };
            if swap {
                keys.swap(left_id, right_id);
                values.swap(left_id, right_id);
            }
        }
    }

    fn simulate_network<K: Copy, V: Copy>(
        keys: &mut [K],
        values: &mut [V],
        precedes: impl Fn(&K, &K) -> bool,
    ) {
        let stages = keys.len().trailing_zeros();
        for stage in 0..stages {
            for pass in 0..=stage {
                run_pass(keys, values, stage, pass, &precedes);
            }
        }
    }

    #[test]
    fn test_network_sorts_small_ascending() {
        let mut keys = vec![4u32, 2, 1, 3];
        let mut values = vec![b'd', b'b', b'a', b'c'];
        simulate_network(&mut keys, &mut values, |a, b| a < b);
        assert_eq!(keys, vec![1, 2, 3, 4]);
        assert_eq!(values, vec![b'a', b'b', b'c', b'd']);
    }

    #[test]
    fn test_network_sorts_descending() {
        let mut keys = vec![4i32, 2, 1, 3, 8, 6, 5, 7];
        let mut values: Vec<u32> = (0..8).collect();
        simulate_network(&mut keys, &mut values, |a, b| a > b);
        assert_eq!(keys, vec![8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_network_matches_std_sort_on_random_input() {
        let mut rng = rand::thread_rng();
        for &n in &[2usize, 4, 8, 64, 256, 1024] {
            let keys: Vec<u32> = (0..n).map(|_| rng.gen_range(0..64)).collect();
            let values: Vec<u32> = (0..n as u32).collect();

            let mut got_keys = keys.clone();
            let mut got_values = values.clone();
            simulate_network(&mut got_keys, &mut got_values, |a, b| a < b);

            let mut expected = keys.clone();
            expected.sort_unstable();
            assert_eq!(got_keys, expected, "keys diverged at n={}", n);

            // The permutation applied to values is the one that sorted keys.
            let mut pairs: Vec<(u32, u32)> = got_keys.into_iter().zip(got_values).collect();
            pairs.sort_unstable();
            let mut original: Vec<(u32, u32)> = keys.into_iter().zip(values).collect();
            original.sort_unstable();
            assert_eq!(pairs, original);
        }
    }

    #[test]
    fn test_values_shorter_than_keys_rejected() {
        let mut keys = vec![3u32, 1, 2, 0];
        let mut values = vec![0u32; 2];
        let result = sort_by_key(&mut keys, &mut values, Less::new());
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
        // Inputs must be untouched on the error path.
        assert_eq!(keys, vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_trivial_lengths_are_no_ops() {
        let mut empty: Vec<u32> = vec![];
        let mut no_values: Vec<u32> = vec![];
        assert!(sort_by_key(&mut empty, &mut no_values, Less::new()).is_ok());

        let mut single = vec![9u32];
        let mut single_value = vec![7u32];
        assert!(sort_by_key(&mut single, &mut single_value, Less::new()).is_ok());
        assert_eq!(single, vec![9]);
        assert_eq!(single_value, vec![7]);

        let mut one = vec![5i32];
        assert!(sort(&mut one, Greater::new()).is_ok());
        assert_eq!(one, vec![5]);
    }

    #[test]
    fn test_host_run_modes_are_unsupported() {
        // Run-mode rejection happens before any adapter is touched, so this
        // holds on machines with no GPU at all.
        let ctl = Control::new().with_run_mode(RunMode::SerialHost);
        let mut keys = vec![3u32, 1, 2, 0];
        let mut values = vec![0u32, 1, 2, 3];
        match sort_by_key_with(&ctl, &mut keys, &mut values, Less::new(), "") {
            Err(Error::UnsupportedBackend { op, backend }) => {
                assert_eq!(op, "sort_by_key");
                assert_eq!(backend, "serial-host");
            }
            other => panic!("expected UnsupportedBackend, got {:?}", other),
        }
        assert_eq!(keys, vec![3, 1, 2, 0]);
        assert_eq!(values, vec![0, 1, 2, 3]);

        let ctl = Control::new().with_run_mode(RunMode::MultiCoreHost);
        assert!(matches!(
            sort_with(&ctl, &mut keys, Less::new(), ""),
            Err(Error::UnsupportedBackend {
                backend: "multi-core-host",
                ..
            })
        ));
    }

    #[test]
    fn test_non_power_of_two_rejected_before_device_touch() {
        // A length check failure must not require a working adapter; the
        // rejection happens before the client is resolved.
        let mut keys: Vec<u32> = (0..1000).rev().collect();
        let mut values: Vec<u32> = (0..1000).collect();
        let before_keys = keys.clone();
        let before_values = values.clone();

        match sort_by_key(&mut keys, &mut values, Less::new()) {
            Err(Error::UnsupportedSize { op, len }) => {
                assert_eq!(op, "sort_by_key");
                assert_eq!(len, 1000);
            }
            other => panic!("expected UnsupportedSize, got {:?}", other),
        }
        assert_eq!(keys, before_keys);
        assert_eq!(values, before_values);

        let mut keys = vec![1u32, 2, 3];
        assert!(matches!(
            sort(&mut keys, Less::new()),
            Err(Error::UnsupportedSize { op: "sort", len: 3 })
        ));
    }
}
