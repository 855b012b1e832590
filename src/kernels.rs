//! Hand-authored WGSL kernel sources for the boid tick.
//!
//! Buffer struct and binding declarations are *not* written here; the
//! kernel pipeline prepends the schema compiler's generated declarations,
//! which is the only place byte layout is defined. These sources contain
//! logic only and refer to the bindings by their registered names:
//! `agents`, `objects`, `colliders`, `params`.
//!
//! Kernel order per tick is `avoidance` then `movement` then `collision`.
//! Movement consumes the `steer` field avoidance wrote in the same buffer;
//! there is no host synchronization between passes, the order is the
//! dependency.

/// Entry point names, dispatched in this order each tick.
pub const KERNEL_AVOIDANCE: &str = "avoidance";
pub const KERNEL_MOVEMENT: &str = "movement";
pub const KERNEL_COLLISION: &str = "collision";

/// Shared helpers: world-position-to-tile mapping, identical arithmetic to
/// the host grid (subtract origin, divide, floor, clamp).
pub const HELPERS_WGSL: &str = r#"
fn tile_of(pos: vec3<f32>) -> vec2<u32> {
    let local = (pos.xz - vec2<f32>(params.grid_origin_x, params.grid_origin_z)) / params.grid_cell_size;
    let tx = clamp(i32(floor(local.x)), 0, i32(params.grid_size_x) - 1);
    let ty = clamp(i32(floor(local.y)), 0, i32(params.grid_size_y) - 1);
    return vec2<u32>(u32(tx), u32(ty));
}

fn cell_hash_of(pos: vec3<f32>) -> u32 {
    let t = tile_of(pos);
    return t.x + t.y * params.grid_size_x;
}
"#;

/// Separation steering. Scans the active population and accumulates a
/// falloff-weighted push away from every neighbor inside the agent's
/// avoidance radius, scaled by its avoidance strength. Output lands in
/// `agents[i].steer` for the movement pass.
pub const AVOIDANCE_WGSL: &str = r#"
@compute @workgroup_size(64)
fn avoidance(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.active_count {
        return;
    }
    let a = agents[i];
    if a.alive == 0u {
        return;
    }

    let pos = objects[i].transform[3].xyz;
    var steer = vec3<f32>(0.0);
    for (var j = 0u; j < params.active_count; j++) {
        if j == i || agents[j].alive == 0u {
            continue;
        }
        let d = pos - objects[j].transform[3].xyz;
        let dist = length(d);
        if dist > 0.0001 && dist < a.avoid_radius {
            steer += d / dist * ((a.avoid_radius - dist) / a.avoid_radius);
        }
    }

    agents[i].steer = steer * a.avoid_strength;
}
"#;

/// Seek-and-integrate. Combines target seeking, the avoidance output and
/// the externally applied force, clamps the step to the agent's speed,
/// integrates, rebuilds the world transform (uniform scale + translation)
/// and recomputes the spatial cell hash.
pub const MOVEMENT_WGSL: &str = r#"
@compute @workgroup_size(64)
fn movement(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.active_count {
        return;
    }
    let a = agents[i];
    var obj = objects[i];
    let pos_now = obj.transform[3].xyz;

    if a.alive == 0u {
        // Dead agents stop moving but keep tracking their (fading) scale
        // so the kill shrink reaches the renderer.
        obj.transform = mat4x4<f32>(
            vec4<f32>(a.scale, 0.0, 0.0, 0.0),
            vec4<f32>(0.0, a.scale, 0.0, 0.0),
            vec4<f32>(0.0, 0.0, a.scale, 0.0),
            vec4<f32>(pos_now, 1.0),
        );
        obj.visible = select(0u, 1u, a.scale > 0.001);
        objects[i] = obj;
        return;
    }

    var pos = pos_now;
    let to_target = a.goal - pos;
    var step_v = vec3<f32>(0.0);
    let dist = length(to_target);
    if dist > 0.001 {
        step_v = to_target / dist * a.speed;
    }

    var extra = a.steer + a.external_force;
    let em = length(extra);
    if em > a.max_force && em > 0.0001 {
        extra = extra / em * a.max_force;
    }
    step_v += extra;

    let mag = length(step_v);
    if mag > 0.0001 {
        step_v = step_v / mag * min(mag, a.speed);
    }

    pos += step_v * params.dt;
    pos = clamp(
        pos,
        vec3<f32>(-params.world_half_extent),
        vec3<f32>(params.world_half_extent),
    );

    obj.transform = mat4x4<f32>(
        vec4<f32>(a.scale, 0.0, 0.0, 0.0),
        vec4<f32>(0.0, a.scale, 0.0, 0.0),
        vec4<f32>(0.0, 0.0, a.scale, 0.0),
        vec4<f32>(pos, 1.0),
    );
    obj.cell_hash = cell_hash_of(pos);
    obj.visible = select(0u, 1u, a.scale > 0.001);
    objects[i] = obj;
}
"#;

/// Static-collider response. Spheres store their radius in
/// `half_extents.x`; boxes push out along the shallowest penetration axis.
pub const COLLISION_WGSL: &str = r#"
@compute @workgroup_size(64)
fn collision(@builtin(global_invocation_id) gid: vec3<u32>) {
    let i = gid.x;
    if i >= params.active_count {
        return;
    }
    if agents[i].alive == 0u {
        return;
    }

    var pos = objects[i].transform[3].xyz;
    for (var c = 0u; c < params.collider_count; c++) {
        let col = colliders[c];
        if col.shape == 0u {
            let d = pos - col.center;
            let dist = length(d);
            let r = col.half_extents.x;
            if dist < r && dist > 0.0001 {
                pos = col.center + d / dist * r;
            }
        } else {
            let rel = pos - col.center;
            let overlap = col.half_extents - abs(rel);
            if overlap.x > 0.0 && overlap.y > 0.0 && overlap.z > 0.0 {
                if overlap.x <= overlap.y && overlap.x <= overlap.z {
                    pos.x = col.center.x + sign(rel.x) * col.half_extents.x;
                } else if overlap.y <= overlap.z {
                    pos.y = col.center.y + sign(rel.y) * col.half_extents.y;
                } else {
                    pos.z = col.center.z + sign(rel.z) * col.half_extents.z;
                }
            }
        }
    }

    objects[i].transform[3] = vec4<f32>(pos, 1.0);
    objects[i].cell_hash = cell_hash_of(pos);
}
"#;

/// All kernel logic concatenated, ready for the pipeline's declaration
/// header.
pub fn tick_kernels_wgsl() -> String {
    format!(
        "{}\n{}\n{}\n{}",
        HELPERS_WGSL, AVOIDANCE_WGSL, MOVEMENT_WGSL, COLLISION_WGSL
    )
}
