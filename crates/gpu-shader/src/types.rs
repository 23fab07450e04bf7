//! Fixed scalar/vector/matrix/sampler type model shared by the IR, uniform blocks and vertex
//! layouts.

use thiserror::Error;

/// Primitive component kind of a [`VarType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarKind {
    Bool,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    Float,
}

impl VarKind {
    /// Size in bytes of one component.
    pub fn bytes_size(self) -> usize {
        match self {
            VarKind::Bool | VarKind::Byte | VarKind::UByte => 1,
            VarKind::Short | VarKind::UShort => 2,
            VarKind::Int | VarKind::Float => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarType {
    Void,

    Mat2,
    Mat3,
    Mat4,

    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,

    Float1,
    Float2,
    Float3,
    Float4,

    Bool1,
    Bool2,
    Bool3,
    Bool4,

    /// Four unsigned bytes, typically a packed RGBA color.
    Byte4,

    SByte1,
    SByte2,
    SByte3,
    SByte4,

    UByte1,
    UByte2,
    UByte3,
    UByte4,

    SShort1,
    SShort2,
    SShort3,
    SShort4,

    UShort1,
    UShort2,
    UShort3,
    UShort4,

    SInt1,
    SInt2,
    SInt3,
    SInt4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("{kind:?} has no vector type with {count} elements")]
    InvalidElementCount { kind: VarKind, count: usize },
}

impl VarType {
    pub fn kind(self) -> VarKind {
        use VarType::*;
        match self {
            Void | SByte1 | SByte2 | SByte3 | SByte4 => VarKind::Byte,
            Mat2 | Mat3 | Mat4 | Float1 | Float2 | Float3 | Float4 => VarKind::Float,
            Sampler1D | Sampler2D | Sampler3D | SamplerCube => VarKind::Int,
            SInt1 | SInt2 | SInt3 | SInt4 => VarKind::Int,
            Bool1 | Bool2 | Bool3 | Bool4 => VarKind::Bool,
            Byte4 | UByte1 | UByte2 | UByte3 | UByte4 => VarKind::UByte,
            SShort1 | SShort2 | SShort3 | SShort4 => VarKind::Short,
            UShort1 | UShort2 | UShort3 | UShort4 => VarKind::UShort,
        }
    }

    /// Number of scalar components. Matrices count every cell; samplers count as one.
    pub fn element_count(self) -> usize {
        use VarType::*;
        match self {
            Void => 0,
            Mat2 => 4,
            Mat3 => 9,
            Mat4 => 16,
            Sampler1D | Sampler2D | Sampler3D | SamplerCube => 1,
            Float1 | Bool1 | SByte1 | UByte1 | SShort1 | UShort1 | SInt1 => 1,
            Float2 | Bool2 | SByte2 | UByte2 | SShort2 | UShort2 | SInt2 => 2,
            Float3 | Bool3 | SByte3 | UByte3 | SShort3 | UShort3 | SInt3 => 3,
            Float4 | Bool4 | Byte4 | SByte4 | UByte4 | SShort4 | UShort4 | SInt4 => 4,
        }
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, VarType::Mat2 | VarType::Mat3 | VarType::Mat4)
    }

    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            VarType::Sampler1D | VarType::Sampler2D | VarType::Sampler3D | VarType::SamplerCube
        )
    }

    /// Tightly packed size in bytes (`kind size × element count`).
    pub fn bytes_size(self) -> usize {
        self.kind().bytes_size() * self.element_count()
    }

    /// Number of columns/rows of a square matrix type.
    pub fn matrix_dimension(self) -> Option<usize> {
        match self {
            VarType::Mat2 => Some(2),
            VarType::Mat3 => Some(3),
            VarType::Mat4 => Some(4),
            _ => None,
        }
    }

    /// Vector type of the same kind with `count` components (`0` yields [`VarType::Void`]).
    pub fn with_element_count(self, count: usize) -> Result<VarType, TypeError> {
        Self::vector(self.kind(), count)
    }

    pub fn vector(kind: VarKind, count: usize) -> Result<VarType, TypeError> {
        use VarType::*;
        let ty = match (kind, count) {
            (_, 0) => Void,
            (VarKind::Bool, 1) => Bool1,
            (VarKind::Bool, 2) => Bool2,
            (VarKind::Bool, 3) => Bool3,
            (VarKind::Bool, 4) => Bool4,
            (VarKind::Byte, 1) => SByte1,
            (VarKind::Byte, 2) => SByte2,
            (VarKind::Byte, 3) => SByte3,
            (VarKind::Byte, 4) => SByte4,
            (VarKind::UByte, 1) => UByte1,
            (VarKind::UByte, 2) => UByte2,
            (VarKind::UByte, 3) => UByte3,
            (VarKind::UByte, 4) => UByte4,
            (VarKind::Short, 1) => SShort1,
            (VarKind::Short, 2) => SShort2,
            (VarKind::Short, 3) => SShort3,
            (VarKind::Short, 4) => SShort4,
            (VarKind::UShort, 1) => UShort1,
            (VarKind::UShort, 2) => UShort2,
            (VarKind::UShort, 3) => UShort3,
            (VarKind::UShort, 4) => UShort4,
            (VarKind::Int, 1) => SInt1,
            (VarKind::Int, 2) => SInt2,
            (VarKind::Int, 3) => SInt3,
            (VarKind::Int, 4) => SInt4,
            (VarKind::Float, 1) => Float1,
            (VarKind::Float, 2) => Float2,
            (VarKind::Float, 3) => Float3,
            (VarKind::Float, 4) => Float4,
            (kind, count) => return Err(TypeError::InvalidElementCount { kind, count }),
        };
        Ok(ty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Precision {
    #[default]
    Default,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}
