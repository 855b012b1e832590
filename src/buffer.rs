//! Device-resident structured buffers.
//!
//! A [`StructuredBuffer`] is a fixed-capacity flat byte array on the device,
//! addressed through a compiled [`Schema`]. The host keeps a byte mirror of
//! the whole allocation: writes marshal into the mirror and flush the touched
//! bytes to the device; readback copies device bytes into a staging buffer
//! and back into the mirror.
//!
//! Write granularity matters here. `set_element_partial` is the dominant
//! steady-state path and flushes exactly the touched field bytes, one
//! `write_buffer` per field, never the whole stride. `upload_range` is the
//! once-per-tick convergence flush of the active region.

use log::warn;

use crate::gpu::GpuContext;
use crate::schema::{Schema, Value};
use crate::RecordType;

/// A fixed-stride device buffer with host-side typed accessors.
pub struct StructuredBuffer {
    schema: Schema,
    buffer: wgpu::Buffer,
    staging: wgpu::Buffer,
    mirror: Vec<u8>,
    /// Byte range of the in-flight readback, if any. Concurrent reads on one
    /// buffer are serialized by this flag, not queued.
    pending_read: Option<(u64, u64)>,
}

impl StructuredBuffer {
    /// Allocate the device buffer, staging buffer and host mirror for a
    /// schema. Capacity is fixed; growing means recreating.
    pub fn new(ctx: &GpuContext, schema: Schema) -> Self {
        let size = schema.byte_size();
        let usage = if schema.is_uniform() {
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST
        } else {
            wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
        };

        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(schema.name()),
            size,
            usage,
            mapped_at_creation: false,
        });
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            mirror: vec![0u8; size as usize],
            schema,
            buffer,
            staging,
            pending_read: None,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    fn element_range(&self, index: u32) -> Option<std::ops::Range<usize>> {
        if index >= self.schema.max_elements() {
            warn!(
                "index {} out of range for buffer `{}` (max {}), write dropped",
                index,
                self.schema.name(),
                self.schema.max_elements()
            );
            return None;
        }
        let start = index as usize * self.schema.stride() as usize;
        Some(start..start + self.schema.stride() as usize)
    }

    /// Marshal a full record into the element at `index` and upload its
    /// stride. Out-of-range indices warn and do nothing; a transient stale
    /// slot must never take the tick loop down.
    pub fn set_element<R: RecordType>(&mut self, ctx: &GpuContext, index: u32, record: &R) {
        let Some(range) = self.element_range(index) else {
            return;
        };
        let base = range.start as u64;
        self.schema.write_record(&mut self.mirror[range.clone()], record);
        ctx.queue.write_buffer(&self.buffer, base, &self.mirror[range]);
    }

    /// Write only the named fields of the element at `index`. With `upload`,
    /// each touched field's bytes are flushed immediately; without it the
    /// write lands in the mirror and rides the next `upload_range`.
    ///
    /// Unknown field names warn and are skipped.
    pub fn set_element_partial(
        &mut self,
        ctx: &GpuContext,
        index: u32,
        fields: &[(&str, Value)],
        upload: bool,
    ) {
        let Some(range) = self.element_range(index) else {
            return;
        };
        let base = range.start;
        for (key, value) in fields {
            let Some((field, offset)) = self
                .schema
                .field_layouts()
                .find(|(field, _)| field.key == Some(*key))
            else {
                warn!(
                    "unknown field `{}` on buffer `{}`, write skipped",
                    key,
                    self.schema.name()
                );
                continue;
            };
            // A mismatched kind would write the wrong byte count and bleed
            // into the neighboring fields.
            if value.kind() != field.kind {
                warn!(
                    "field `{}` on buffer `{}` is {:?} but got {:?}, write skipped",
                    key,
                    self.schema.name(),
                    field.kind,
                    value.kind()
                );
                continue;
            }
            let at = base + offset as usize;
            let len = value.kind().byte_size() as usize;
            value.write_to(&mut self.mirror[at..]);
            if upload {
                ctx.queue
                    .write_buffer(&self.buffer, at as u64, &self.mirror[at..at + len]);
            }
        }
    }

    /// Flush the first `element_count * stride` mirror bytes in one
    /// transfer. Called once per tick so the device converges even when
    /// intermediate partial uploads were skipped.
    pub fn upload_range(&self, ctx: &GpuContext, element_count: u32) {
        let count = element_count.min(self.schema.max_elements());
        if count == 0 {
            return;
        }
        let len = count as usize * self.schema.stride() as usize;
        ctx.queue.write_buffer(&self.buffer, 0, &self.mirror[..len]);
    }

    /// Queue an asynchronous device-to-host copy covering `byte_len` bytes
    /// at `byte_offset`. The copy window is widened as needed to satisfy
    /// map alignment, so the requested range is always fully refreshed.
    /// Returns `false` (and warns) when a previous readback on this buffer
    /// has not been resolved yet; the caller retries next tick.
    pub fn request_readback(&mut self, ctx: &GpuContext, byte_offset: u64, byte_len: u64) -> bool {
        if self.pending_read.is_some() {
            warn!(
                "readback on buffer `{}` still pending, request ignored",
                self.schema.name()
            );
            return false;
        }
        let Some((byte_offset, byte_len)) =
            map_window(byte_offset, byte_len, self.schema.byte_size())
        else {
            return false;
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, byte_offset, &self.staging, byte_offset, byte_len);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging.slice(byte_offset..byte_offset + byte_len);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        self.pending_read = Some((byte_offset, byte_len));
        true
    }

    /// Wait for the pending readback, copy the bytes into the host mirror
    /// and return the refreshed range. This is the tick's single suspension
    /// point. Returns `None` when nothing was pending.
    pub fn resolve_readback(&mut self, ctx: &GpuContext) -> Option<std::ops::Range<usize>> {
        let (offset, len) = self.pending_read.take()?;
        ctx.device.poll(wgpu::Maintain::Wait);

        let range = offset as usize..(offset + len) as usize;
        {
            let slice = self.staging.slice(offset..offset + len);
            let data = slice.get_mapped_range();
            self.mirror[range.clone()].copy_from_slice(&data);
        }
        self.staging.unmap();
        Some(range)
    }

    /// Drop a pending readback without publishing its bytes. The mirror
    /// keeps its previous consistent snapshot. Note that the in-flight map
    /// still completes (one blocking poll) before the staging buffer is
    /// unmapped; only the result is discarded.
    pub fn cancel_readback(&mut self, ctx: &GpuContext) {
        if self.pending_read.take().is_some() {
            // The map must still complete before the staging buffer can be
            // unmapped and reused.
            ctx.device.poll(wgpu::Maintain::Wait);
            self.staging.unmap();
        }
    }

    /// Synchronous convenience wrapper: request + resolve in one call,
    /// returning exactly the requested bytes (clamped to the buffer end).
    /// Returns `None` when a previous read is still pending.
    pub fn read_range(&mut self, ctx: &GpuContext, byte_offset: u64, byte_len: u64) -> Option<Vec<u8>> {
        if !self.request_readback(ctx, byte_offset, byte_len) {
            return None;
        }
        let refreshed = self.resolve_readback(ctx)?;
        // The copy window may start earlier than the request because of map
        // alignment; hand back only the requested slice of it.
        let start = byte_offset as usize;
        let end = (byte_offset + byte_len).min(self.schema.byte_size()) as usize;
        debug_assert!(refreshed.start <= start && end <= refreshed.end);
        Some(self.mirror[start..end].to_vec())
    }

    /// Decode the element at `index` from the host mirror. Reflects the
    /// last resolved readback, not live device state.
    pub fn read_element<R: RecordType>(&self, index: u32) -> Option<R> {
        if index >= self.schema.max_elements() {
            return None;
        }
        let start = index as usize * self.schema.stride() as usize;
        Some(self.schema.read_record(&self.mirror[start..start + self.schema.stride() as usize]))
    }

    /// Raw view of the host mirror, element-granular.
    pub fn mirror_element(&self, index: u32) -> Option<&[u8]> {
        if index >= self.schema.max_elements() {
            return None;
        }
        let start = index as usize * self.schema.stride() as usize;
        Some(&self.mirror[start..start + self.schema.stride() as usize])
    }
}

/// The aligned copy window covering `byte_offset..byte_offset + byte_len`,
/// clamped to `total`. Map offsets must be 8-byte aligned and sizes 4-byte
/// aligned; the window grows by the alignment slack so the requested range
/// stays inside it. `None` when nothing remains to copy.
fn map_window(byte_offset: u64, byte_len: u64, total: u64) -> Option<(u64, u64)> {
    if byte_offset >= total {
        return None;
    }
    let start = byte_offset & !7;
    let len = byte_len + (byte_offset - start);
    let len = ((len + 3) & !3).min(total - start);
    if len == 0 {
        None
    } else {
        Some((start, len))
    }
}
