//! Bitonic sort kernel templates
//!
//! Each dispatch performs a single compare-exchange pass of the bitonic
//! network; the host drives the stage/pass schedule and awaits every launch.
//! Thread `i`, `stage`, and `pass` together determine the pair of elements to
//! compare and the intended direction. Data buffers and the comparator are
//! bound once per sort call; only the small uniform is rewritten per launch.

/// Workgroup size baked into the sort templates.
///
/// The dispatch is bounds-guarded on `n_half`, so sizes smaller than one
/// workgroup still execute correctly.
pub const WGSIZE: u32 = 64;

/// Compare-exchange pass over (key, value) pairs.
pub const SORT_BY_KEY_TEMPLATE: &str = r#"
struct PassParams {
    n_half: u32,
    stage: u32,
    pass_index: u32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read_write> keys: array<{{KEY}}>;
@group(0) @binding(1) var<storage, read_write> values: array<{{VALUE}}>;
@group(0) @binding(2) var<storage, read> user_comp: {{COMP}};
@group(0) @binding(3) var<uniform> params: PassParams;

@compute @workgroup_size(64)
fn sort_by_key(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.n_half) {
        return;
    }

    let pair_distance = 1u << (params.stage - params.pass_index);
    let block_width = 2u * pair_distance;
    let left_id = (i % pair_distance) + (i / pair_distance) * block_width;
    let right_id = left_id + pair_distance;

    let left_key = keys[left_id];
    let right_key = keys[right_id];

    // Blocks of width 1 << stage alternate sort direction.
    let same_direction_width = 1u << params.stage;
    let ascending = ((i / same_direction_width) % 2u) == 0u;

    var swap = false;
    if (ascending) {
        swap = {{COMP}}_call(user_comp, right_key, left_key);
    } else {
        swap = {{COMP}}_call(user_comp, left_key, right_key);
    }

    if (swap) {
        keys[left_id] = right_key;
        keys[right_id] = left_key;
        let left_value = values[left_id];
        values[left_id] = values[right_id];
        values[right_id] = left_value;
    }
}
"#;

/// Compare-exchange pass over keys only.
pub const SORT_TEMPLATE: &str = r#"
struct PassParams {
    n_half: u32,
    stage: u32,
    pass_index: u32,
    _pad: u32,
}

@group(0) @binding(0) var<storage, read_write> keys: array<{{KEY}}>;
@group(0) @binding(1) var<storage, read> user_comp: {{COMP}};
@group(0) @binding(2) var<uniform> params: PassParams;

@compute @workgroup_size(64)
fn sort(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if (i >= params.n_half) {
        return;
    }

    let pair_distance = 1u << (params.stage - params.pass_index);
    let block_width = 2u * pair_distance;
    let left_id = (i % pair_distance) + (i / pair_distance) * block_width;
    let right_id = left_id + pair_distance;

    let left_key = keys[left_id];
    let right_key = keys[right_id];

    let same_direction_width = 1u << params.stage;
    let ascending = ((i / same_direction_width) % 2u) == 0u;

    var swap = false;
    if (ascending) {
        swap = {{COMP}}_call(user_comp, right_key, left_key);
    } else {
        swap = {{COMP}}_call(user_comp, left_key, right_key);
    }

    if (swap) {
        keys[left_id] = right_key;
        keys[right_id] = left_key;
    }
}
"#;
