//! # gpuflock - GPU-resident boid simulation core
//!
//! A structured-buffer compute pipeline plus a flocking simulation built on
//! it. Agent state lives on the GPU in schema-described buffers; the host
//! issues field-granular writes, dispatches an ordered kernel chain each
//! tick, and reads the results back once per tick to serve gameplay queries.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gpuflock::prelude::*;
//!
//! let ctx = std::sync::Arc::new(GpuContext::new_blocking()?);
//! let mut sim = BoidSim::new(ctx, SimConfig::default())?;
//!
//! let id = sim.add_agent(AgentInit {
//!     position: Vec3::new(0.0, 0.0, 5.0),
//!     target: Vec3::ZERO,
//!     ..Default::default()
//! }).unwrap();
//!
//! loop {
//!     sim.tick(1.0 / 60.0, &[]);
//!     let snapshot = sim.get_agent_snapshot(id);
//! }
//! ```
//!
//! ## Layers
//!
//! - [`schema`] - record descriptors, byte layouts, WGSL declaration text
//! - [`buffer`] - device buffers with mirror, partial writes and readback
//! - [`pipeline`] - binding table plus ordered kernel dispatch
//! - [`grid`] - host-side spatial hash for neighbor queries
//! - [`sim`] - the boid core tying the layers together
//!
//! Record types are declared with `#[derive(GpuRecord)]`; the schema
//! compiler owns every offset and the generated WGSL declarations, so host
//! and device can never disagree on layout.

// The derive macro emits `gpuflock::`-qualified paths, which this alias
// makes resolvable from inside the crate itself.
extern crate self as gpuflock;

pub mod buffer;
pub mod error;
pub mod gpu;
pub mod grid;
pub mod kernels;
pub mod pipeline;
pub mod schema;
pub mod sim;

pub use bytemuck;
pub use glam;

pub use buffer::StructuredBuffer;
pub use error::{GpuError, PipelineError, SchemaError, SimError};
pub use gpu::GpuContext;
pub use gpuflock_derive::GpuRecord;
pub use grid::SpatialGrid;
pub use pipeline::{KernelPipeline, WORKGROUP_SIZE};
pub use schema::{FieldDef, PrimKind, Schema, Value};
pub use sim::{
    AgentId, AgentInit, AgentSnapshot, BoidSim, Collider, ColliderShape, Easing, SimConfig,
};

/// Trait implemented by `#[derive(GpuRecord)]`.
///
/// A record type is the declarative schema source for one buffer element:
/// a name, an ordered field table, and keyed accessors the structured
/// buffer uses for field-granular marshaling. Layout (offsets, stride,
/// padding) is computed by [`Schema`], never here.
///
/// Derive this; implementing it by hand invites a host/device layout
/// mismatch the compiler cannot catch.
pub trait RecordType: Clone {
    /// Element type identity, also the emitted WGSL struct name.
    const NAME: &'static str;

    /// Field table in declaration order.
    const FIELDS: &'static [schema::FieldDef];

    /// Read one field by name. `None` for unknown keys.
    fn value(&self, key: &str) -> Option<schema::Value>;

    /// Write one field by name. Unknown keys and kind mismatches are
    /// ignored.
    fn apply(&mut self, key: &str, value: schema::Value);

    /// All fields zero, matching a zero-filled buffer element.
    fn zeroed() -> Self;
}

/// Common imports for building simulations.
pub mod prelude {
    pub use crate::glam::{Mat4, Vec2, Vec3, Vec4};
    pub use crate::sim::{
        AgentId, AgentInit, AgentSnapshot, BoidSim, Collider, ColliderShape, SimConfig,
    };
    pub use crate::{GpuContext, GpuRecord, RecordType, Schema, StructuredBuffer, Value};
}
