//! Error types for gpuflock.
//!
//! Fatal configuration errors (bad schema, unfinalized pipeline, no GPU)
//! are surfaced through these types at startup. Recoverable per-agent
//! conditions (stale index, capacity, overlapping readback) are not errors:
//! they are sentinel returns plus a logged warning, so one bad write can
//! never stall the tick loop.

use std::fmt;

/// Errors raised while compiling a record type into a buffer layout.
#[derive(Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// An array schema was requested without a maximum element count.
    MissingElementCount(String),
    /// A record type declared no fields.
    EmptyRecord(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::MissingElementCount(name) => write!(
                f,
                "schema `{}` is an array but no maximum element count was given",
                name
            ),
            SchemaError::EmptyRecord(name) => {
                write!(f, "schema `{}` has no fields", name)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Errors raised by the kernel pipeline.
///
/// All of these indicate a structural misconfiguration, not a transient
/// race; they are never retried.
#[derive(Debug)]
pub enum PipelineError {
    /// `dispatch` was called before `finalize`.
    NotFinalized,
    /// `finalize` was called twice.
    AlreadyFinalized,
    /// A dispatch named a kernel entry point that was never compiled.
    UnknownKernel(String),
    /// A buffer name was registered twice.
    DuplicateBuffer(String),
    /// A lookup named a buffer that was never registered.
    UnknownBuffer(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NotFinalized => {
                write!(f, "pipeline dispatched before finalize()")
            }
            PipelineError::AlreadyFinalized => {
                write!(f, "pipeline finalized twice")
            }
            PipelineError::UnknownKernel(name) => {
                write!(f, "unknown kernel entry point `{}`", name)
            }
            PipelineError::DuplicateBuffer(name) => {
                write!(f, "buffer `{}` registered twice", name)
            }
            PipelineError::UnknownBuffer(name) => {
                write!(f, "unknown buffer `{}`", name)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Errors that can occur during GPU initialization.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(
                f,
                "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."
            ),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur while building the simulation core.
#[derive(Debug)]
pub enum SimError {
    /// A record schema failed to compile.
    Schema(SchemaError),
    /// The kernel pipeline was misconfigured.
    Pipeline(PipelineError),
    /// The simulation dimensions failed validation.
    Config(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Schema(e) => write!(f, "schema error: {}", e),
            SimError::Pipeline(e) => write!(f, "pipeline error: {}", e),
            SimError::Config(msg) => write!(f, "invalid simulation config: {}", msg),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Schema(e) => Some(e),
            SimError::Pipeline(e) => Some(e),
            SimError::Config(_) => None,
        }
    }
}

impl From<SchemaError> for SimError {
    fn from(e: SchemaError) -> Self {
        SimError::Schema(e)
    }
}

impl From<PipelineError> for SimError {
    fn from(e: PipelineError) -> Self {
        SimError::Pipeline(e)
    }
}
