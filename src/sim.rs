//! Boid simulation core: agent lifecycle, per-tick orchestration and
//! host-side queries.
//!
//! All flocking math runs on the device; the host owns lifecycle (spawn,
//! kill, fades), the per-tick upload/dispatch/readback cadence, and the
//! spatial grid rebuilt from each readback. Dead slots are tombstones:
//! capacity is fixed at construction and slots are never compacted or
//! reused, so an [`AgentId`] stays unique for the life of the sim.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use log::warn;

use crate::buffer::StructuredBuffer;
use crate::error::SimError;
use crate::gpu::GpuContext;
use crate::grid::SpatialGrid;
use crate::kernels::{
    tick_kernels_wgsl, KERNEL_AVOIDANCE, KERNEL_COLLISION, KERNEL_MOVEMENT,
};
use crate::pipeline::KernelPipeline;
use crate::schema::{Schema, Value};
use gpuflock_derive::GpuRecord;

/// Stable handle for one agent. Monotonic, never recycled.
pub type AgentId = u32;

const BUF_AGENTS: &str = "agents";
const BUF_OBJECTS: &str = "objects";
const BUF_COLLIDERS: &str = "colliders";
const BUF_PARAMS: &str = "params";

/// Host-authored per-agent state. Kernels read everything here and write
/// only `steer`.
#[derive(GpuRecord, Clone, Debug)]
pub struct BoidInput {
    pub goal: Vec3,
    pub external_force: Vec3,
    pub steer: Vec3,
    pub color: Vec3,
    pub alive: bool,
    pub speed: f32,
    pub scale: f32,
    pub health: f32,
    pub owner: u32,
    pub avoid_radius: f32,
    pub avoid_strength: f32,
    pub max_force: f32,
}

/// Device-authored per-agent state: the world transform the kernels
/// integrate, plus the spatial cell hash and the visibility flag.
#[derive(GpuRecord, Clone, Debug)]
pub struct BoidObject {
    pub transform: Mat4,
    pub cell_hash: u32,
    pub agent_id: u32,
    pub visible: bool,
}

/// Device-side static collider record. Spheres carry their radius in
/// `half_extents.x`.
#[derive(GpuRecord, Clone, Debug)]
pub struct ColliderRec {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub shape: u32,
}

/// Per-tick uniform parameters shared by every kernel.
#[derive(GpuRecord, Clone, Debug)]
pub struct SimParams {
    pub dt: f32,
    pub time: f32,
    pub active_count: u32,
    pub collider_count: u32,
    pub grid_origin_x: f32,
    pub grid_origin_z: f32,
    pub grid_cell_size: f32,
    pub world_half_extent: f32,
    pub grid_size_x: u32,
    pub grid_size_y: u32,
}

/// Host-facing collider shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColliderShape {
    Sphere,
    Box,
}

/// A static obstacle agents are pushed out of each tick.
#[derive(Clone, Copy, Debug)]
pub struct Collider {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub shape: ColliderShape,
}

impl Collider {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            half_extents: Vec3::splat(radius),
            shape: ColliderShape::Sphere,
        }
    }

    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
            shape: ColliderShape::Box,
        }
    }

    fn to_record(self) -> ColliderRec {
        ColliderRec {
            center: self.center,
            half_extents: self.half_extents,
            shape: match self.shape {
                ColliderShape::Sphere => 0,
                ColliderShape::Box => 1,
            },
        }
    }
}

/// Spawn-time agent parameters. The default is a unit-scale idle agent at
/// the origin.
#[derive(Clone, Debug)]
pub struct AgentInit {
    pub position: Vec3,
    pub target: Vec3,
    pub color: Vec3,
    pub speed: f32,
    pub scale: f32,
    pub health: f32,
    pub owner: u32,
    pub avoid_radius: f32,
    pub avoid_strength: f32,
    pub max_force: f32,
}

impl Default for AgentInit {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            target: Vec3::ZERO,
            color: Vec3::ONE,
            speed: 5.0,
            scale: 1.0,
            health: 100.0,
            owner: 0,
            avoid_radius: 2.0,
            avoid_strength: 4.0,
            max_force: 10.0,
        }
    }
}

/// Read-only view of one agent assembled from the host mirrors.
#[derive(Clone, Copy, Debug)]
pub struct AgentSnapshot {
    pub position: Vec3,
    pub active: bool,
    pub owner: u32,
    pub speed: f32,
    pub health: f32,
}

/// Fixed simulation dimensions. Capacity and world bounds cannot change
/// after construction.
#[derive(Clone, Debug)]
pub struct SimConfig {
    pub capacity: u32,
    pub max_colliders: u32,
    pub world_half_extent: f32,
    pub grid_cell_size: f32,
    /// Seconds for the kill shrink to reach zero scale.
    pub fade_duration: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            max_colliders: 64,
            world_half_extent: 50.0,
            grid_cell_size: 4.0,
            fade_duration: 0.6,
        }
    }
}

impl SimConfig {
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_world_half_extent(mut self, half_extent: f32) -> Self {
        self.world_half_extent = half_extent;
        self
    }

    pub fn with_grid_cell_size(mut self, cell_size: f32) -> Self {
        self.grid_cell_size = cell_size;
        self
    }

    fn grid_dim(&self) -> u32 {
        ((self.world_half_extent * 2.0) / self.grid_cell_size).ceil().max(1.0) as u32
    }
}

/// Easing curves for lifecycle animations, evaluated per tick as plain
/// data instead of chained callbacks.
#[derive(Clone, Copy, Debug)]
pub enum Easing {
    Linear,
    CubicIn,
    CubicOut,
}

impl Easing {
    /// Progress remap on `t` in `[0, 1]`.
    pub fn eval(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => 1.0 - (1.0 - t).powi(3),
        }
    }
}

/// One in-flight kill shrink. Advanced by `tick`, removed at completion.
struct Fade {
    elapsed: f32,
    duration: f32,
    start_scale: f32,
    easing: Easing,
}

impl Fade {
    fn scale_at(&self) -> f32 {
        let progress = if self.duration <= 0.0 {
            1.0
        } else {
            self.elapsed / self.duration
        };
        self.start_scale * (1.0 - self.easing.eval(progress))
    }

    fn done(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// The GPU-resident flock.
pub struct BoidSim {
    ctx: Arc<GpuContext>,
    pipeline: KernelPipeline,
    grid: SpatialGrid,
    config: SimConfig,
    /// Slots ever occupied, tombstones included.
    active_count: u32,
    next_id: AgentId,
    /// Published ids, the surface commands and queries resolve against.
    id_to_slot: HashMap<AgentId, u32>,
    /// Internal slot ownership, updated at spawn time.
    slot_to_id: Vec<AgentId>,
    /// Spawns waiting for end-of-tick publication.
    pending_publish: Vec<(AgentId, u32)>,
    fades: HashMap<AgentId, Fade>,
    time: f32,
    capacity_warned: bool,
}

impl BoidSim {
    /// Compile the schemas, allocate the four buffers and finalize the
    /// kernel pipeline.
    pub fn new(ctx: Arc<GpuContext>, config: SimConfig) -> Result<Self, SimError> {
        // `!(x > 0.0)` also rejects NaN.
        if !(config.grid_cell_size > 0.0) {
            return Err(SimError::Config(format!(
                "grid cell size must be positive, got {}",
                config.grid_cell_size
            )));
        }
        if !(config.world_half_extent > 0.0) {
            return Err(SimError::Config(format!(
                "world half extent must be positive, got {}",
                config.world_half_extent
            )));
        }

        let input_schema = Schema::for_record::<BoidInput>(true, Some(config.capacity), false)?;
        let object_schema = Schema::for_record::<BoidObject>(true, Some(config.capacity), false)?;
        let collider_schema =
            Schema::for_record::<ColliderRec>(true, Some(config.max_colliders), false)?;
        let params_schema = Schema::for_record::<SimParams>(false, None, true)?;

        let mut pipeline = KernelPipeline::new("Boid Tick");
        pipeline.add_buffer(BUF_AGENTS, StructuredBuffer::new(&ctx, input_schema))?;
        pipeline.add_buffer(BUF_OBJECTS, StructuredBuffer::new(&ctx, object_schema))?;
        pipeline.add_buffer(BUF_COLLIDERS, StructuredBuffer::new(&ctx, collider_schema))?;
        pipeline.add_buffer(BUF_PARAMS, StructuredBuffer::new(&ctx, params_schema))?;
        pipeline.finalize(
            &ctx,
            &tick_kernels_wgsl(),
            &[KERNEL_AVOIDANCE, KERNEL_MOVEMENT, KERNEL_COLLISION],
        )?;

        let dim = config.grid_dim();
        let origin = Vec2::splat(-config.world_half_extent);
        let grid = SpatialGrid::new(origin, config.grid_cell_size, dim, dim);

        Ok(Self {
            ctx,
            pipeline,
            grid,
            config,
            active_count: 0,
            next_id: 0,
            id_to_slot: HashMap::new(),
            slot_to_id: Vec::new(),
            pending_publish: Vec::new(),
            fades: HashMap::new(),
            time: 0.0,
            capacity_warned: false,
        })
    }

    pub fn len(&self) -> u32 {
        self.active_count
    }

    pub fn is_empty(&self) -> bool {
        self.active_count == 0
    }

    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    fn buffer_mut(&mut self, name: &str) -> &mut StructuredBuffer {
        self.pipeline
            .buffer_mut(name)
            .expect("buffer registered at construction")
    }

    fn buffer(&self, name: &str) -> &StructuredBuffer {
        self.pipeline
            .buffer(name)
            .expect("buffer registered at construction")
    }

    fn slot_of(&self, id: AgentId) -> Option<u32> {
        let slot = self.id_to_slot.get(&id).copied();
        if slot.is_none() {
            warn!("unknown or unpublished agent id {}, command dropped", id);
        }
        slot
    }

    /// Append an agent into the next free slot. Returns `None` when the
    /// population is at capacity; the warning fires once, not per call.
    pub fn add_agent(&mut self, init: AgentInit) -> Option<AgentId> {
        if self.active_count >= self.config.capacity {
            if !self.capacity_warned {
                warn!(
                    "agent capacity {} reached, further spawns dropped",
                    self.config.capacity
                );
                self.capacity_warned = true;
            }
            return None;
        }

        let slot = self.active_count;
        let id = self.next_id;
        self.next_id += 1;

        let input = BoidInput {
            goal: init.target,
            external_force: Vec3::ZERO,
            steer: Vec3::ZERO,
            color: init.color,
            alive: true,
            speed: init.speed,
            scale: init.scale,
            health: init.health,
            owner: init.owner,
            avoid_radius: init.avoid_radius,
            avoid_strength: init.avoid_strength,
            max_force: init.max_force,
        };
        let (tx, ty) = self.grid.tile_at(Vec2::new(init.position.x, init.position.z));
        let object = BoidObject {
            transform: Mat4::from_scale_rotation_translation(
                Vec3::splat(init.scale),
                glam::Quat::IDENTITY,
                init.position,
            ),
            cell_hash: self.grid.hash(tx, ty),
            agent_id: id,
            visible: true,
        };

        let ctx = Arc::clone(&self.ctx);
        self.buffer_mut(BUF_AGENTS).set_element(&ctx, slot, &input);
        self.buffer_mut(BUF_OBJECTS).set_element(&ctx, slot, &object);

        self.active_count += 1;
        self.slot_to_id.push(id);
        // Visible to kernels immediately, to gameplay queries next tick.
        self.pending_publish.push((id, slot));
        Some(id)
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Order per tick: advance fades, upload inputs and parameters, dispatch
    /// avoidance/movement/collision in one submission, read back both agent
    /// buffers (the single blocking point), rebuild the spatial grid from
    /// the fresh object transforms, then publish newly spawned ids.
    pub fn tick(&mut self, dt: f32, colliders: &[Collider]) {
        self.time += dt;
        self.advance_fades(dt);

        let ctx = Arc::clone(&self.ctx);
        let active = self.active_count;

        if colliders.len() > self.config.max_colliders as usize {
            warn!(
                "{} colliders exceed capacity {}, extras ignored",
                colliders.len(),
                self.config.max_colliders
            );
        }
        let collider_count = colliders.len().min(self.config.max_colliders as usize);
        for (i, collider) in colliders.iter().take(collider_count).enumerate() {
            let rec = collider.to_record();
            self.buffer_mut(BUF_COLLIDERS).set_element(&ctx, i as u32, &rec);
        }

        let (grid_size_x, grid_size_y) = self.grid.size();
        let params = SimParams {
            dt,
            time: self.time,
            active_count: active,
            collider_count: collider_count as u32,
            grid_origin_x: self.grid.origin().x,
            grid_origin_z: self.grid.origin().y,
            grid_cell_size: self.grid.cell_size(),
            world_half_extent: self.config.world_half_extent,
            grid_size_x,
            grid_size_y,
        };
        self.buffer_mut(BUF_PARAMS).set_element(&ctx, 0, &params);
        self.buffer_mut(BUF_AGENTS).upload_range(&ctx, active);

        if let Err(err) = self.pipeline.dispatch(
            &ctx,
            &[KERNEL_AVOIDANCE, KERNEL_MOVEMENT, KERNEL_COLLISION],
            active,
        ) {
            warn!("tick dispatch failed: {}", err);
            self.publish_pending();
            return;
        }

        if active > 0 {
            self.readback_and_rehash(&ctx, active);
        }
        self.publish_pending();
    }

    /// Read back the active range of both agent buffers and rebuild grid
    /// occupancy from the refreshed object mirrors.
    fn readback_and_rehash(&mut self, ctx: &GpuContext, active: u32) {
        let input_len = active as u64 * self.buffer(BUF_AGENTS).schema().stride() as u64;
        let object_len = active as u64 * self.buffer(BUF_OBJECTS).schema().stride() as u64;

        let agents_ok = self.buffer_mut(BUF_AGENTS).request_readback(ctx, 0, input_len);
        let objects_ok = self
            .buffer_mut(BUF_OBJECTS)
            .request_readback(ctx, 0, object_len);
        if agents_ok {
            self.buffer_mut(BUF_AGENTS).resolve_readback(ctx);
        }
        if objects_ok {
            self.buffer_mut(BUF_OBJECTS).resolve_readback(ctx);
        } else {
            // Keep the previous grid rather than hashing stale transforms.
            return;
        }

        self.grid.clear();
        let (size_x, _) = self.grid.size();
        for slot in 0..active {
            let Some(input) = self.buffer(BUF_AGENTS).read_element::<BoidInput>(slot) else {
                continue;
            };
            if !input.alive {
                continue;
            }
            let Some(object) = self.buffer(BUF_OBJECTS).read_element::<BoidObject>(slot) else {
                continue;
            };
            let x = object.cell_hash % size_x;
            let y = object.cell_hash / size_x;
            self.grid.insert(x, y, self.slot_to_id[slot as usize]);
        }
    }

    fn publish_pending(&mut self) {
        for (id, slot) in self.pending_publish.drain(..) {
            self.id_to_slot.insert(id, slot);
        }
    }

    fn advance_fades(&mut self, dt: f32) {
        if self.fades.is_empty() {
            return;
        }
        let ctx = Arc::clone(&self.ctx);
        let mut finished = Vec::new();
        let mut updates = Vec::new();
        for (id, fade) in &mut self.fades {
            fade.elapsed += dt;
            let scale = if fade.done() { 0.0 } else { fade.scale_at() };
            if let Some(&slot) = self.id_to_slot.get(id) {
                updates.push((slot, scale));
            }
            if fade.done() {
                finished.push(*id);
            }
        }
        for (slot, scale) in updates {
            self.buffer_mut(BUF_AGENTS).set_element_partial(
                &ctx,
                slot,
                &[("scale", Value::Float(scale))],
                true,
            );
        }
        for id in finished {
            self.fades.remove(&id);
        }
    }

    /// Write one field of an agent's input record, flushed immediately.
    fn set_input_field(&mut self, id: AgentId, key: &str, value: Value) {
        let Some(slot) = self.slot_of(id) else { return };
        let ctx = Arc::clone(&self.ctx);
        self.buffer_mut(BUF_AGENTS)
            .set_element_partial(&ctx, slot, &[(key, value)], true);
    }

    pub fn set_target(&mut self, id: AgentId, target: Vec3) {
        self.set_input_field(id, "goal", Value::Vec3(target));
    }

    /// Alias for [`set_target`](Self::set_target); movement is always
    /// seek-based.
    pub fn move_to(&mut self, id: AgentId, target: Vec3) {
        self.set_target(id, target);
    }

    pub fn set_external_force(&mut self, id: AgentId, force: Vec3) {
        self.set_input_field(id, "external_force", Value::Vec3(force));
    }

    pub fn set_color(&mut self, id: AgentId, color: Vec3) {
        self.set_input_field(id, "color", Value::Vec3(color));
    }

    pub fn set_speed(&mut self, id: AgentId, speed: f32) {
        self.set_input_field(id, "speed", Value::Float(speed));
    }

    pub fn set_active(&mut self, id: AgentId, active: bool) {
        self.set_input_field(id, "alive", Value::Bool(active));
    }

    /// Subtract health; reaching zero kills the agent.
    pub fn damage(&mut self, id: AgentId, amount: f32) {
        let Some(slot) = self.slot_of(id) else { return };
        let health = self
            .buffer(BUF_AGENTS)
            .read_element::<BoidInput>(slot)
            .map(|input| input.health)
            .unwrap_or(0.0);
        let health = (health - amount).max(0.0);
        self.set_input_field(id, "health", Value::Float(health));
        if health <= 0.0 {
            self.kill(id);
        }
    }

    /// Deactivate an agent and start its shrink-out. The slot becomes a
    /// permanent tombstone.
    pub fn kill(&mut self, id: AgentId) {
        let Some(slot) = self.slot_of(id) else { return };
        let scale = self
            .buffer(BUF_AGENTS)
            .read_element::<BoidInput>(slot)
            .map(|input| input.scale)
            .unwrap_or(1.0);
        self.set_input_field(id, "alive", Value::Bool(false));
        self.fades.insert(
            id,
            Fade {
                elapsed: 0.0,
                duration: self.config.fade_duration,
                start_scale: scale,
                easing: Easing::CubicOut,
            },
        );
    }

    /// Ids recorded in the agent's 3x3 cell neighborhood as of the last
    /// tick's readback, the agent's own id included. Callers filter.
    pub fn get_neighbors(&self, id: AgentId) -> Vec<AgentId> {
        let Some(&slot) = self.id_to_slot.get(&id) else {
            return Vec::new();
        };
        let Some(object) = self.buffer(BUF_OBJECTS).read_element::<BoidObject>(slot) else {
            return Vec::new();
        };
        let (size_x, _) = self.grid.size();
        let x = object.cell_hash % size_x;
        let y = object.cell_hash / size_x;

        let mut out = Vec::new();
        for (nx, ny) in self.grid.neighbors(x, y) {
            out.extend_from_slice(self.grid.ids_at(nx, ny));
        }
        out
    }

    /// Snapshot from the host mirrors; position reflects the last resolved
    /// readback.
    pub fn get_agent_snapshot(&self, id: AgentId) -> Option<AgentSnapshot> {
        let &slot = self.id_to_slot.get(&id)?;
        let input = self.buffer(BUF_AGENTS).read_element::<BoidInput>(slot)?;
        let object = self.buffer(BUF_OBJECTS).read_element::<BoidObject>(slot)?;
        Some(AgentSnapshot {
            position: object.transform.w_axis.truncate(),
            active: input.alive,
            owner: input.owner,
            speed: input.speed,
            health: input.health,
        })
    }

    /// Drop any in-flight readbacks, keeping the mirrors at their previous
    /// snapshot. Call before tearing the device down mid-tick.
    pub fn cancel_pending_readbacks(&mut self) {
        let ctx = Arc::clone(&self.ctx);
        self.buffer_mut(BUF_AGENTS).cancel_readback(&ctx);
        self.buffer_mut(BUF_OBJECTS).cancel_readback(&ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_easing_endpoints() {
        for easing in [Easing::Linear, Easing::CubicIn, Easing::CubicOut] {
            assert_eq!(easing.eval(0.0), 0.0);
            assert_eq!(easing.eval(1.0), 1.0);
            assert_eq!(easing.eval(-1.0), 0.0);
            assert_eq!(easing.eval(2.0), 1.0);
        }
    }

    #[test]
    fn test_cubic_out_front_loads_progress() {
        assert!(Easing::CubicOut.eval(0.25) > 0.25);
        assert!(Easing::CubicIn.eval(0.25) < 0.25);
    }

    #[test]
    fn test_fade_scale_monotonic() {
        let mut fade = Fade {
            elapsed: 0.0,
            duration: 1.0,
            start_scale: 2.0,
            easing: Easing::CubicOut,
        };
        let mut last = fade.scale_at();
        assert_eq!(last, 2.0);
        for _ in 0..12 {
            fade.elapsed += 0.1;
            let now = fade.scale_at();
            assert!(now <= last);
            last = now;
        }
        assert!(fade.done());
        assert!(fade.scale_at().abs() < 1e-5);
    }

    #[test]
    fn test_collider_record_encoding() {
        let sphere = Collider::sphere(Vec3::new(1.0, 2.0, 3.0), 4.0).to_record();
        assert_eq!(sphere.shape, 0);
        assert_eq!(sphere.half_extents.x, 4.0);

        let cuboid = Collider::cuboid(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0)).to_record();
        assert_eq!(cuboid.shape, 1);
        assert_eq!(cuboid.half_extents, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_config_grid_dim_covers_world() {
        let config = SimConfig::default()
            .with_world_half_extent(50.0)
            .with_grid_cell_size(4.0);
        assert_eq!(config.grid_dim(), 25);

        // Non-divisible extents round the cell count up
        let config = config.with_grid_cell_size(3.0);
        assert_eq!(config.grid_dim(), 34);
    }

    #[test]
    fn test_record_schemas_compile() {
        let input = Schema::for_record::<BoidInput>(true, Some(16), false).unwrap();
        assert_eq!(input.stride() % 16, 0);
        assert!(input.offset_of("steer").is_some());
        assert!(input.offset_of("max_force").is_some());

        let object = Schema::for_record::<BoidObject>(true, Some(16), false).unwrap();
        assert_eq!(object.offset_of("transform"), Some(0));
        assert_eq!(object.offset_of("cell_hash"), Some(64));
        assert_eq!(object.stride(), 80);

        let params = Schema::for_record::<SimParams>(false, None, true).unwrap();
        assert!(params.is_uniform());
        assert_eq!(params.stride() % 16, 0);
    }
}
