//! Backend-neutral shader IR plus the CPU side of uniform data: block layouts, per-frame uniform
//! arenas and vertex buffer layouts.

pub mod builder;
pub mod globals;
pub mod ir;
pub mod math;
pub mod types;
pub mod uniform_block;
pub mod uniform_buffer;
pub mod upload;
pub mod vertex;

pub use builder::ShaderBuilder;
pub use globals::{collect_temps, ShaderGlobals};
pub use ir::{
    Arg, ArrayLen, Attribute, BinaryOp, Expr, FuncDecl, IrVisitor, Literal, Program, Sampler,
    SamplerType, Shader, Stm, Temp, UnaryOp, Uniform, Variable, Varying,
};
pub use math::{Mat4, INDICES_BY_COLUMNS_4X4};
pub use types::{Precision, ShaderStage, TypeError, VarKind, VarType};
pub use uniform_block::{
    BlockId, LayoutBuilder, LayoutError, RegisteredBlock, TypedUniform, UniformBlock,
    UniformBlockBuilder, UniformBlockDecl, UniformBlockRegistry, UniformField,
    UNIFORM_BLOCK_ALIGNMENT,
};
pub use uniform_buffer::{
    FieldShape, UniformBlockBuffer, UniformBufferError, UniformRead, UniformValue, Uniforms,
    UniformsRef, UniformsView,
};
#[cfg(feature = "wgpu")]
pub use upload::QueueUpload;
pub use upload::{MirrorBuffer, UploadTarget};
pub use vertex::VertexLayout;
