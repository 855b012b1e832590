//! Derive macros for the gpuflock simulation core.
//!
//! This crate provides one derive macro:
//!
//! - [`GpuRecord`] - Declares a struct as a device-buffer record type
//!
//! # Usage
//!
//! The macro is re-exported from the main `gpuflock` crate. You don't need
//! to add this crate directly:
//!
//! ```ignore
//! use gpuflock::prelude::*;
//!
//! #[derive(GpuRecord, Clone)]
//! struct Agent {
//!     target: Vec3,
//!     speed: f32,
//!     active: bool,
//! }
//! ```
//!
//! # The GpuRecord Macro
//!
//! `#[derive(GpuRecord)]` implements the `RecordType` trait, which is the
//! declarative schema the schema compiler consumes. It generates:
//!
//! - A static field table (`FIELDS`) with one entry per declared field,
//!   in declaration order
//! - Keyed accessors (`value` / `apply`) used by the structured buffer's
//!   per-field (de)serialization
//! - A `zeroed()` constructor matching an all-zero byte image
//!
//! No layout is computed here; offsets, stride and padding are the schema
//! compiler's job. The macro only enumerates fields and their primitive
//! kinds, so there is no runtime reflection anywhere in the pipeline.
//!
//! ## Supported Field Types
//!
//! | Rust Type | Primitive Kind | WGSL Type |
//! |-----------|----------------|-----------|
//! | `f32` | `Float` | `f32` |
//! | `i32` | `Int` | `i32` |
//! | `u32` | `Uint` | `u32` |
//! | `bool` | `Bool` | `u32` (0/1) |
//! | `Vec3` | `Vec3` | `vec3<f32>` |
//! | `Vec4` | `Vec4` | `vec4<f32>` |
//! | `Mat4` | `Mat4` | `mat4x4<f32>` |
//!
//! Any other field type is a compile-time error.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, Type};

/// Derive macro for device-buffer record structs.
///
/// Implements `gpuflock::RecordType`, turning the struct into a schema
/// source: a named, ordered list of primitive-kind fields plus keyed
/// get/set accessors for field-granular marshaling.
///
/// # Generated Items
///
/// For a struct `Agent`:
///
/// - `const NAME: &'static str = "Agent"` - element type identity, also the
///   emitted WGSL struct name
/// - `const FIELDS: &'static [FieldDef]` - field table in declaration order
/// - `fn value(&self, key) -> Option<Value>` - read one field by name
/// - `fn apply(&mut self, key, value)` - write one field by name (unknown
///   keys and kind mismatches are ignored)
/// - `fn zeroed() -> Self` - all fields zero, matching a zero-filled buffer
///
/// # Example
///
/// ```ignore
/// #[derive(GpuRecord, Clone)]
/// struct Agent {
///     target: Vec3,
///     external_force: Vec3,
///     speed: f32,
///     active: bool,
/// }
///
/// let schema = Schema::for_record::<Agent>(true, Some(1024), false)?;
/// assert_eq!(schema.stride() % 16, 0);
/// ```
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to an enum instead of a struct
/// - Struct uses tuple fields instead of named fields
/// - Any field has an unsupported type
#[proc_macro_derive(GpuRecord)]
pub fn derive_gpu_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let name_str = name.to_string();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("GpuRecord derive only supports structs with named fields"),
        },
        _ => panic!("GpuRecord derive only supports structs"),
    };

    if fields.is_empty() {
        panic!("GpuRecord struct must have at least one field");
    }

    let mut field_defs = Vec::new();
    let mut value_arms = Vec::new();
    let mut apply_arms = Vec::new();
    let mut zero_inits = Vec::new();

    for field in fields.iter() {
        let field_name = field.ident.as_ref().unwrap();
        let field_name_str = field_name.to_string();
        let info = record_kind_info(&field.ty, &name_str, &field_name_str);

        let kind = info.kind_token;
        let variant = info.value_variant;
        let zero = info.zero_expr;

        field_defs.push(quote! {
            gpuflock::schema::FieldDef::named(#field_name_str, gpuflock::schema::PrimKind::#kind)
        });
        value_arms.push(quote! {
            #field_name_str => Some(gpuflock::schema::Value::#variant(self.#field_name))
        });
        apply_arms.push(quote! {
            (#field_name_str, gpuflock::schema::Value::#variant(v)) => self.#field_name = v
        });
        zero_inits.push(quote! { #field_name: #zero });
    }

    let expanded = quote! {
        impl gpuflock::RecordType for #name {
            const NAME: &'static str = #name_str;

            const FIELDS: &'static [gpuflock::schema::FieldDef] = &[
                #(#field_defs),*
            ];

            fn value(&self, key: &str) -> Option<gpuflock::schema::Value> {
                match key {
                    #(#value_arms,)*
                    _ => None,
                }
            }

            fn apply(&mut self, key: &str, value: gpuflock::schema::Value) {
                match (key, value) {
                    #(#apply_arms,)*
                    _ => {}
                }
            }

            fn zeroed() -> Self {
                Self {
                    #(#zero_inits),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Per-type tokens needed by the generated impl.
struct KindInfo {
    /// `PrimKind` variant name
    kind_token: Ident,
    /// `Value` variant name
    value_variant: Ident,
    /// Expression producing the zero value for this type
    zero_expr: proc_macro2::TokenStream,
}

/// Map a Rust field type to its primitive kind.
///
/// The kind set is closed: scalar float, signed/unsigned integer, boolean,
/// 3/4-component vector and 4x4 matrix. Anything else fails the build.
fn record_kind_info(ty: &Type, struct_name: &str, field_name: &str) -> KindInfo {
    let type_str = quote!(#ty).to_string().replace(" ", "");

    let (kind, variant, zero) = match type_str.as_str() {
        "f32" => ("Float", "Float", quote! { 0.0 }),
        "i32" => ("Int", "Int", quote! { 0 }),
        "u32" => ("Uint", "Uint", quote! { 0 }),
        "bool" => ("Bool", "Bool", quote! { false }),
        "Vec3" | "glam::Vec3" => ("Vec3", "Vec3", quote! { gpuflock::glam::Vec3::ZERO }),
        "Vec4" | "glam::Vec4" => ("Vec4", "Vec4", quote! { gpuflock::glam::Vec4::ZERO }),
        "Mat4" | "glam::Mat4" => ("Mat4", "Mat4", quote! { gpuflock::glam::Mat4::ZERO }),
        _ => panic!(
            "Unsupported field type `{}` for `{}.{}`. GpuRecord fields must be \
             f32, i32, u32, bool, Vec3, Vec4 or Mat4",
            type_str, struct_name, field_name
        ),
    };

    KindInfo {
        kind_token: Ident::new(kind, proc_macro2::Span::call_site()),
        value_variant: Ident::new(variant, proc_macro2::Span::call_site()),
        zero_expr: zero,
    }
}
