//! Kernel pipeline: binding table construction and ordered dispatch.
//!
//! The pipeline owns the named structured buffers, builds the bind group
//! once at `finalize`, and runs an ordered list of kernels per invocation.
//! Kernels in one dispatch run back-to-back in a single command submission
//! with no host-side synchronization between them; the caller's ordering
//! *is* the dependency contract.

use std::collections::HashMap;

use crate::buffer::StructuredBuffer;
use crate::error::PipelineError;
use crate::gpu::GpuContext;

/// Threads per workgroup for every kernel in the module.
pub const WORKGROUP_SIZE: u32 = 64;

struct Finalized {
    bind_group: wgpu::BindGroup,
    kernels: HashMap<String, wgpu::ComputePipeline>,
}

/// An ordered set of named buffers plus the compiled kernel module.
pub struct KernelPipeline {
    label: String,
    names: Vec<String>,
    buffers: HashMap<String, StructuredBuffer>,
    finalized: Option<Finalized>,
}

impl KernelPipeline {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            names: Vec::new(),
            buffers: HashMap::new(),
            finalized: None,
        }
    }

    /// Register a buffer. Binding indices follow registration order.
    pub fn add_buffer(&mut self, name: &str, buffer: StructuredBuffer) -> Result<(), PipelineError> {
        if self.finalized.is_some() {
            return Err(PipelineError::AlreadyFinalized);
        }
        if self.buffers.contains_key(name) {
            return Err(PipelineError::DuplicateBuffer(name.to_string()));
        }
        self.names.push(name.to_string());
        self.buffers.insert(name.to_string(), buffer);
        Ok(())
    }

    pub fn buffer(&self, name: &str) -> Result<&StructuredBuffer, PipelineError> {
        self.buffers
            .get(name)
            .ok_or_else(|| PipelineError::UnknownBuffer(name.to_string()))
    }

    pub fn buffer_mut(&mut self, name: &str) -> Result<&mut StructuredBuffer, PipelineError> {
        self.buffers
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownBuffer(name.to_string()))
    }

    /// Declaration text prepended to the kernel source: struct declarations
    /// (once per unique element type) followed by binding declarations in
    /// registration order. This is the only textual contract between host
    /// and device code.
    pub fn wgsl_declarations(&self) -> String {
        let mut out = String::new();
        let mut declared = Vec::new();
        for name in &self.names {
            let schema = self.buffers[name].schema();
            if let Some(decl) = schema.wgsl_struct_decl() {
                if !declared.contains(&schema.name().to_string()) {
                    declared.push(schema.name().to_string());
                    out.push_str(&decl);
                    out.push_str("\n\n");
                }
            }
        }
        for (binding, name) in self.names.iter().enumerate() {
            let schema = self.buffers[name].schema();
            out.push_str(&schema.wgsl_binding_decl(0, binding as u32, name));
            out.push('\n');
        }
        out
    }

    /// Compile and link the kernel module once: declarations + hand-authored
    /// kernel source, one compute pipeline per entry point, one bind group
    /// over all registered buffers.
    pub fn finalize(
        &mut self,
        ctx: &GpuContext,
        kernel_source: &str,
        entry_points: &[&str],
    ) -> Result<(), PipelineError> {
        if self.finalized.is_some() {
            return Err(PipelineError::AlreadyFinalized);
        }

        let source = format!("{}\n{}", self.wgsl_declarations(), kernel_source);
        let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = self
            .names
            .iter()
            .enumerate()
            .map(|(binding, name)| {
                let schema = self.buffers[name].schema();
                let ty = if schema.is_uniform() {
                    wgpu::BufferBindingType::Uniform
                } else {
                    wgpu::BufferBindingType::Storage { read_only: false }
                };
                wgpu::BindGroupLayoutEntry {
                    binding: binding as u32,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }
            })
            .collect();

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{} Bind Group Layout", self.label)),
                    entries: &layout_entries,
                });

        let group_entries: Vec<wgpu::BindGroupEntry> = self
            .names
            .iter()
            .enumerate()
            .map(|(binding, name)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: self.buffers[name].raw().as_entire_binding(),
            })
            .collect();

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Bind Group", self.label)),
            layout: &bind_group_layout,
            entries: &group_entries,
        });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{} Pipeline Layout", self.label)),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let mut kernels = HashMap::new();
        for &entry in entry_points {
            let pipeline = ctx
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(entry),
                    compilation_options: Default::default(),
                    cache: None,
                });
            kernels.insert(entry.to_string(), pipeline);
        }

        self.finalized = Some(Finalized { bind_group, kernels });
        Ok(())
    }

    /// Run the named kernels in order within one command submission, each
    /// sized for `active_count` elements. Dispatching before `finalize` or
    /// naming an unknown kernel is a structural error, never retried.
    pub fn dispatch(
        &self,
        ctx: &GpuContext,
        kernel_names: &[&str],
        active_count: u32,
    ) -> Result<(), PipelineError> {
        let finalized = self.finalized.as_ref().ok_or(PipelineError::NotFinalized)?;
        if active_count == 0 {
            return Ok(());
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{} Dispatch", self.label)),
            });

        let workgroups = active_count.div_ceil(WORKGROUP_SIZE);
        for &name in kernel_names {
            let pipeline = finalized
                .kernels
                .get(name)
                .ok_or_else(|| PipelineError::UnknownKernel(name.to_string()))?;

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(name),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &finalized.bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }
}
