//! Record schemas: primitive kinds, packed layouts and WGSL declarations.
//!
//! The schema compiler turns a [`RecordType`](crate::RecordType) (or a bare
//! primitive kind) into the byte layout a device buffer and its kernels must
//! agree on: per-field offsets, the element stride, and the declaration text
//! that gets prepended to kernel source. Host and device never exchange
//! layout information at runtime; this module is the single source of truth.

use glam::{Mat4, Vec3, Vec4};

use crate::error::SchemaError;
use crate::RecordType;

/// The closed set of primitive kinds a record field may have.
///
/// Sizes and alignments reproduce WGSL storage-buffer rules exactly: 3- and
/// 4-component vectors and matrices align to 16 bytes, scalars (including
/// bool, which is carried as a 4-byte integer) align to 4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Float,
    Int,
    Uint,
    Bool,
    Vec3,
    Vec4,
    Mat4,
}

impl PrimKind {
    /// Payload size in bytes (a vec3 is 12, its 16-byte slot is alignment).
    pub const fn byte_size(self) -> u32 {
        match self {
            PrimKind::Float | PrimKind::Int | PrimKind::Uint | PrimKind::Bool => 4,
            PrimKind::Vec3 => 12,
            PrimKind::Vec4 => 16,
            PrimKind::Mat4 => 64,
        }
    }

    /// Required alignment in bytes.
    pub const fn align(self) -> u32 {
        match self {
            PrimKind::Float | PrimKind::Int | PrimKind::Uint | PrimKind::Bool => 4,
            PrimKind::Vec3 | PrimKind::Vec4 | PrimKind::Mat4 => 16,
        }
    }

    /// WGSL type name. Bool is declared as `u32`; WGSL bools have no
    /// host-shareable layout.
    pub const fn wgsl_type(self) -> &'static str {
        match self {
            PrimKind::Float => "f32",
            PrimKind::Int => "i32",
            PrimKind::Uint => "u32",
            PrimKind::Bool => "u32",
            PrimKind::Vec3 => "vec3<f32>",
            PrimKind::Vec4 => "vec4<f32>",
            PrimKind::Mat4 => "mat4x4<f32>",
        }
    }
}

/// One field of a record: an optional name plus a primitive kind.
///
/// Anonymous descriptors are used for scalar buffers (a bare `array<f32>`);
/// keyed descriptors name one field of a composite record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub key: Option<&'static str>,
    pub kind: PrimKind,
}

impl FieldDef {
    pub const fn named(key: &'static str, kind: PrimKind) -> Self {
        Self { key: Some(key), kind }
    }

    pub const fn anonymous(kind: PrimKind) -> Self {
        Self { key: None, kind }
    }
}

/// A dynamically-typed field value, the unit of host-side marshaling.
///
/// Every variant encodes to exactly `kind().byte_size()` little-endian
/// bytes; `Bool` round-trips through its 4-byte integer encoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Float(f32),
    Int(i32),
    Uint(u32),
    Bool(bool),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl Value {
    pub fn kind(&self) -> PrimKind {
        match self {
            Value::Float(_) => PrimKind::Float,
            Value::Int(_) => PrimKind::Int,
            Value::Uint(_) => PrimKind::Uint,
            Value::Bool(_) => PrimKind::Bool,
            Value::Vec3(_) => PrimKind::Vec3,
            Value::Vec4(_) => PrimKind::Vec4,
            Value::Mat4(_) => PrimKind::Mat4,
        }
    }

    /// Serialize into the front of `dst`, which must hold at least
    /// `kind().byte_size()` bytes.
    pub fn write_to(&self, dst: &mut [u8]) {
        match self {
            Value::Float(v) => dst[..4].copy_from_slice(bytemuck::bytes_of(v)),
            Value::Int(v) => dst[..4].copy_from_slice(bytemuck::bytes_of(v)),
            Value::Uint(v) => dst[..4].copy_from_slice(bytemuck::bytes_of(v)),
            Value::Bool(v) => {
                let enc: u32 = if *v { 1 } else { 0 };
                dst[..4].copy_from_slice(bytemuck::bytes_of(&enc));
            }
            Value::Vec3(v) => dst[..12].copy_from_slice(bytemuck::bytes_of(v)),
            Value::Vec4(v) => dst[..16].copy_from_slice(bytemuck::bytes_of(v)),
            Value::Mat4(v) => dst[..64].copy_from_slice(bytemuck::bytes_of(v)),
        }
    }

    /// Deserialize a value of the given kind from the front of `src`.
    pub fn read(kind: PrimKind, src: &[u8]) -> Value {
        match kind {
            PrimKind::Float => Value::Float(bytemuck::pod_read_unaligned(&src[..4])),
            PrimKind::Int => Value::Int(bytemuck::pod_read_unaligned(&src[..4])),
            PrimKind::Uint => Value::Uint(bytemuck::pod_read_unaligned(&src[..4])),
            PrimKind::Bool => {
                let enc: u32 = bytemuck::pod_read_unaligned(&src[..4]);
                Value::Bool(enc != 0)
            }
            PrimKind::Vec3 => Value::Vec3(bytemuck::pod_read_unaligned(&src[..12])),
            PrimKind::Vec4 => Value::Vec4(bytemuck::pod_read_unaligned(&src[..16])),
            PrimKind::Mat4 => Value::Mat4(bytemuck::pod_read_unaligned(&src[..64])),
        }
    }
}

/// A compiled buffer layout plus its WGSL declaration text.
///
/// Invariants: every field offset is aligned to its kind, the stride is a
/// multiple of the largest field alignment, and
/// `byte_size = stride * max_elements` for array schemas.
#[derive(Clone, Debug)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDef>,
    offsets: Vec<u32>,
    stride: u32,
    is_array: bool,
    max_elements: u32,
    uniform: bool,
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

impl Schema {
    /// Compile a record type into a layout.
    ///
    /// `max_elements` is required when `is_array` is true; the element count
    /// is fixed for the lifetime of any buffer built from this schema.
    pub fn for_record<R: RecordType>(
        is_array: bool,
        max_elements: Option<u32>,
        uniform: bool,
    ) -> Result<Schema, SchemaError> {
        Self::compile(R::NAME.to_string(), R::FIELDS.to_vec(), is_array, max_elements, uniform)
    }

    /// Compile a schema for a bare primitive buffer (e.g. `array<u32>`).
    pub fn for_primitive(
        name: &str,
        kind: PrimKind,
        is_array: bool,
        max_elements: Option<u32>,
        uniform: bool,
    ) -> Result<Schema, SchemaError> {
        Self::compile(
            name.to_string(),
            vec![FieldDef::anonymous(kind)],
            is_array,
            max_elements,
            uniform,
        )
    }

    fn compile(
        name: String,
        fields: Vec<FieldDef>,
        is_array: bool,
        max_elements: Option<u32>,
        uniform: bool,
    ) -> Result<Schema, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::EmptyRecord(name));
        }
        let max_elements = match (is_array, max_elements) {
            (true, None) => return Err(SchemaError::MissingElementCount(name)),
            (true, Some(n)) => n,
            (false, _) => 1,
        };

        let mut offsets = Vec::with_capacity(fields.len());
        let mut cursor = 0u32;
        let mut max_align = 4u32;
        for field in &fields {
            let align = field.kind.align();
            max_align = max_align.max(align);
            cursor = round_up(cursor, align);
            offsets.push(cursor);
            cursor += field.kind.byte_size();
        }
        // Uniform-space structs need 16-byte rounding even when every
        // member is a scalar.
        if uniform {
            max_align = max_align.max(16);
        }
        let stride = round_up(cursor, max_align);

        Ok(Schema {
            name,
            fields,
            offsets,
            stride,
            is_array,
            max_elements,
            uniform,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distance in bytes between consecutive elements.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn is_uniform(&self) -> bool {
        self.uniform
    }

    pub fn max_elements(&self) -> u32 {
        self.max_elements
    }

    /// Total allocation size for a buffer of this schema.
    pub fn byte_size(&self) -> u64 {
        self.stride as u64 * self.max_elements as u64
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Byte offset of a named field within one element.
    pub fn offset_of(&self, key: &str) -> Option<u32> {
        self.fields
            .iter()
            .position(|f| f.key == Some(key))
            .map(|i| self.offsets[i])
    }

    /// Fields with their element-relative byte offsets, declaration order.
    pub fn field_layouts(&self) -> impl Iterator<Item = (&FieldDef, u32)> {
        self.fields.iter().zip(self.offsets.iter().copied())
    }

    /// Whether this schema declares a named WGSL struct (composite record)
    /// as opposed to a bare primitive element.
    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1 || self.fields[0].key.is_some()
    }

    /// The WGSL element type: the struct name for composites, the primitive
    /// type otherwise.
    pub fn element_wgsl_type(&self) -> String {
        if self.is_composite() {
            self.name.clone()
        } else {
            self.fields[0].kind.wgsl_type().to_string()
        }
    }

    /// Marshal a full record into one element's bytes (`dst.len() >= stride`).
    ///
    /// Fields the record does not know are left untouched.
    pub fn write_record<R: RecordType>(&self, dst: &mut [u8], record: &R) {
        for (field, offset) in self.field_layouts() {
            let Some(key) = field.key else { continue };
            if let Some(value) = record.value(key) {
                value.write_to(&mut dst[offset as usize..]);
            }
        }
    }

    /// Decode one element's bytes into a record, starting from
    /// `R::zeroed()`.
    pub fn read_record<R: RecordType>(&self, src: &[u8]) -> R {
        let mut record = R::zeroed();
        for (field, offset) in self.field_layouts() {
            let Some(key) = field.key else { continue };
            let value = Value::read(field.kind, &src[offset as usize..]);
            record.apply(key, value);
        }
        record
    }

    /// Emit the WGSL struct declaration for a composite schema.
    ///
    /// Explicit `_pad` members fill every alignment gap and the tail up to
    /// the stride, so the declared layout is byte-identical to the host's
    /// computed offsets. Returns `None` for bare primitive schemas.
    pub fn wgsl_struct_decl(&self) -> Option<String> {
        if !self.is_composite() {
            return None;
        }

        let mut lines = Vec::new();
        let mut cursor = 0u32;
        let mut pad_count = 0u32;
        for (field, offset) in self.field_layouts() {
            if offset > cursor {
                pad_members(&mut lines, &mut pad_count, offset - cursor);
            }
            let key = field.key.unwrap_or("value");
            lines.push(format!("    {}: {},", key, field.kind.wgsl_type()));
            cursor = offset + field.kind.byte_size();
        }
        if self.stride > cursor {
            pad_members(&mut lines, &mut pad_count, self.stride - cursor);
        }

        Some(format!("struct {} {{\n{}\n}}", self.name, lines.join("\n")))
    }

    /// Emit the binding declaration tying this schema to a group/binding
    /// slot under the given binding name.
    pub fn wgsl_binding_decl(&self, group: u32, binding: u32, binding_name: &str) -> String {
        let elem = self.element_wgsl_type();
        if self.uniform {
            format!(
                "@group({}) @binding({}) var<uniform> {}: {};",
                group, binding, binding_name, elem
            )
        } else if self.is_array {
            format!(
                "@group({}) @binding({}) var<storage, read_write> {}: array<{}>;",
                group, binding, binding_name, elem
            )
        } else {
            format!(
                "@group({}) @binding({}) var<storage, read_write> {}: {};",
                group, binding, binding_name, elem
            )
        }
    }
}

// Pads are individual scalars, never arrays; uniform space requires array
// strides of 16 which would break scalar-sized gaps.
fn pad_members(lines: &mut Vec<String>, pad_count: &mut u32, gap: u32) {
    for _ in 0..gap / 4 {
        lines.push(format!("    _pad{}: f32,", pad_count));
        *pad_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuflock_derive::GpuRecord;

    #[derive(GpuRecord, Clone)]
    struct MatVec {
        transform: Mat4,
        offset: Vec3,
    }

    #[derive(GpuRecord, Clone, Debug, PartialEq)]
    struct Mixed {
        speed: f32,
        goal: Vec3,
        armed: bool,
        hits: i32,
        id: u32,
        tint: Vec4,
    }

    // ========== Layout Tests ==========

    #[test]
    fn test_kind_table() {
        assert_eq!(PrimKind::Vec3.byte_size(), 12);
        assert_eq!(PrimKind::Vec3.align(), 16);
        assert_eq!(PrimKind::Mat4.byte_size(), 64);
        assert_eq!(PrimKind::Bool.byte_size(), 4);
        assert_eq!(PrimKind::Bool.align(), 4);
        assert_eq!(PrimKind::Bool.wgsl_type(), "u32");
    }

    #[test]
    fn test_mat4_vec3_stride_is_80() {
        let schema = Schema::for_record::<MatVec>(true, Some(10), false).unwrap();
        assert_eq!(schema.offset_of("transform"), Some(0));
        assert_eq!(schema.offset_of("offset"), Some(64));
        assert_eq!(schema.stride(), 80);
        assert_eq!(schema.byte_size(), 800);
    }

    #[test]
    fn test_scalar_before_vec3_gets_padded() {
        let schema = Schema::for_record::<Mixed>(true, Some(4), false).unwrap();
        assert_eq!(schema.offset_of("speed"), Some(0));
        // vec3 aligns to 16, leaving a 12-byte gap after the leading f32
        assert_eq!(schema.offset_of("goal"), Some(16));
        assert_eq!(schema.offset_of("armed"), Some(28));
        assert_eq!(schema.offset_of("hits"), Some(32));
        assert_eq!(schema.offset_of("id"), Some(36));
        assert_eq!(schema.offset_of("tint"), Some(48));
        assert_eq!(schema.stride(), 64);
    }

    #[test]
    fn test_stride_invariants() {
        let schema = Schema::for_record::<Mixed>(true, Some(4), false).unwrap();
        let max_align = schema.fields().iter().map(|f| f.kind.align()).max().unwrap();
        let sum: u32 = schema.fields().iter().map(|f| f.kind.byte_size()).sum();
        assert_eq!(schema.stride() % max_align, 0);
        assert!(schema.stride() >= sum);
    }

    #[test]
    fn test_array_without_count_fails() {
        let err = Schema::for_record::<Mixed>(true, None, false).unwrap_err();
        assert_eq!(err, SchemaError::MissingElementCount("Mixed".into()));
    }

    #[test]
    fn test_non_array_is_single_stride() {
        let schema = Schema::for_record::<Mixed>(false, None, false).unwrap();
        assert_eq!(schema.max_elements(), 1);
        assert_eq!(schema.byte_size(), schema.stride() as u64);
    }

    #[test]
    fn test_primitive_schema() {
        let schema = Schema::for_primitive("hashes", PrimKind::Uint, true, Some(256), false).unwrap();
        assert!(!schema.is_composite());
        assert_eq!(schema.stride(), 4);
        assert_eq!(schema.byte_size(), 1024);
        assert!(schema.wgsl_struct_decl().is_none());
        assert_eq!(
            schema.wgsl_binding_decl(0, 2, "hashes"),
            "@group(0) @binding(2) var<storage, read_write> hashes: array<u32>;"
        );
    }

    #[test]
    fn test_uniform_rounds_to_16() {
        #[derive(GpuRecord, Clone)]
        struct Params {
            dt: f32,
            count: u32,
        }
        let schema = Schema::for_record::<Params>(false, None, true).unwrap();
        assert_eq!(schema.stride(), 16);
        assert!(schema
            .wgsl_binding_decl(0, 0, "params")
            .starts_with("@group(0) @binding(0) var<uniform> params: Params;"));
    }

    // ========== Value Tests ==========

    #[test]
    fn test_value_roundtrip_every_kind() {
        let cases = [
            Value::Float(3.5),
            Value::Int(-17),
            Value::Uint(99),
            Value::Bool(true),
            Value::Bool(false),
            Value::Vec3(Vec3::new(1.0, -2.0, 3.0)),
            Value::Vec4(Vec4::new(0.1, 0.2, 0.3, 0.4)),
            Value::Mat4(Mat4::from_translation(Vec3::new(5.0, 6.0, 7.0))),
        ];
        for value in cases {
            let mut buf = [0u8; 64];
            value.write_to(&mut buf);
            assert_eq!(Value::read(value.kind(), &buf), value);
        }
    }

    #[test]
    fn test_bool_encodes_as_four_byte_int() {
        let mut buf = [0xffu8; 4];
        Value::Bool(true).write_to(&mut buf);
        assert_eq!(buf, [1, 0, 0, 0]);
        Value::Bool(false).write_to(&mut buf);
        assert_eq!(buf, [0, 0, 0, 0]);
        // Any nonzero integer decodes back to true
        assert_eq!(Value::read(PrimKind::Bool, &[2, 0, 0, 0]), Value::Bool(true));
    }

    // ========== Record Marshaling Tests ==========

    #[test]
    fn test_record_roundtrip() {
        let schema = Schema::for_record::<Mixed>(true, Some(4), false).unwrap();
        let record = Mixed {
            speed: 4.25,
            goal: Vec3::new(1.0, 2.0, 3.0),
            armed: true,
            hits: -3,
            id: 42,
            tint: Vec4::new(0.5, 0.25, 0.75, 1.0),
        };

        let mut bytes = vec![0u8; schema.stride() as usize];
        schema.write_record(&mut bytes, &record);
        let back: Mixed = schema.read_record(&bytes);
        assert_eq!(back, record);
    }

    #[test]
    fn test_partial_field_write_leaves_others_untouched() {
        let schema = Schema::for_record::<Mixed>(true, Some(4), false).unwrap();
        let mut bytes = vec![0xabu8; schema.stride() as usize];

        let offset = schema.offset_of("goal").unwrap() as usize;
        Value::Vec3(Vec3::splat(9.0)).write_to(&mut bytes[offset..]);

        for (field, field_offset) in schema.field_layouts() {
            if field.key == Some("goal") {
                continue;
            }
            let start = field_offset as usize;
            let end = start + field.kind.byte_size() as usize;
            assert!(
                bytes[start..end].iter().all(|&b| b == 0xab),
                "field {:?} was clobbered",
                field.key
            );
        }
    }

    // ========== Declaration Tests ==========

    #[test]
    fn test_struct_decl_pads_match_offsets() {
        let schema = Schema::for_record::<Mixed>(true, Some(4), false).unwrap();
        let decl = schema.wgsl_struct_decl().unwrap();
        assert!(decl.starts_with("struct Mixed {"));
        assert!(decl.contains("speed: f32,"));
        // 12-byte gap between the leading f32 and the vec3
        assert!(decl.contains("_pad0: f32,"));
        assert!(decl.contains("_pad2: f32,"));
        assert!(decl.contains("goal: vec3<f32>,"));
        assert!(decl.contains("armed: u32,"));
    }

    #[test]
    fn test_binding_decl_array_storage() {
        let schema = Schema::for_record::<MatVec>(true, Some(10), false).unwrap();
        assert_eq!(
            schema.wgsl_binding_decl(0, 1, "objects"),
            "@group(0) @binding(1) var<storage, read_write> objects: array<MatVec>;"
        );
    }
}
