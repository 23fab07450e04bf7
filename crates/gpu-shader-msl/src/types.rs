//! Metal spellings of the IR types.

use gpu_shader::{SamplerType, VarKind, VarType};

fn scalar_name(kind: VarKind) -> &'static str {
    match kind {
        VarKind::Bool => "bool",
        VarKind::Byte => "char",
        VarKind::UByte => "uchar",
        VarKind::Short => "short",
        VarKind::UShort => "ushort",
        VarKind::Int => "int",
        VarKind::Float => "float",
    }
}

/// Type used for locals, arguments, varyings and uniform members. Samplers have no value type.
pub fn msl_type(ty: VarType) -> Option<String> {
    match ty {
        VarType::Void => Some("void".to_owned()),
        VarType::Mat2 => Some("float2x2".to_owned()),
        VarType::Mat3 => Some("float3x3".to_owned()),
        VarType::Mat4 => Some("float4x4".to_owned()),
        VarType::Sampler1D | VarType::Sampler2D | VarType::Sampler3D | VarType::SamplerCube => None,
        _ => {
            let scalar = scalar_name(ty.kind());
            Some(match ty.element_count() {
                1 => scalar.to_owned(),
                n => format!("{scalar}{n}"),
            })
        }
    }
}

/// Type of a member inside a tightly packed vertex struct: vectors use Metal's `packed_` types so
/// their alignment drops to the component size.
pub fn msl_packed_type(ty: VarType) -> Option<String> {
    if ty.is_matrix() || ty.is_sampler() || ty == VarType::Void || ty.kind() == VarKind::Bool {
        return None;
    }
    let scalar = scalar_name(ty.kind());
    Some(match ty.element_count() {
        1 => scalar.to_owned(),
        n => format!("packed_{scalar}{n}"),
    })
}

pub fn msl_texture_type(ty: SamplerType) -> &'static str {
    match ty {
        SamplerType::Sampler1D => "texture1d<float>",
        SamplerType::Sampler2D => "texture2d<float>",
        SamplerType::Sampler3D => "texture3d<float>",
        SamplerType::SamplerCube => "texturecube<float>",
    }
}

/// Divisor that maps a normalized integer attribute onto `[0, 1]` / `[-1, 1]`.
pub fn normalization_scale(kind: VarKind) -> Option<&'static str> {
    match kind {
        VarKind::UByte => Some("255.0"),
        VarKind::Byte => Some("127.0"),
        VarKind::UShort => Some("65535.0"),
        VarKind::Short => Some("32767.0"),
        VarKind::Bool | VarKind::Int | VarKind::Float => None,
    }
}

/// Byte size of `ty` as a Metal struct member (`packed` selects the `packed_` spelling).
pub fn msl_member_size(ty: VarType, packed: bool) -> usize {
    match ty {
        VarType::Mat2 => 16,
        VarType::Mat3 => 48,
        VarType::Mat4 => 64,
        _ if ty.element_count() == 3 && !packed => ty.kind().bytes_size() * 4,
        _ => ty.bytes_size(),
    }
}
