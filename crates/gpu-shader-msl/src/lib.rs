//! Metal Shading Language backend for `gpu-shader` programs.
//!
//! [`resolve_inputs`] decides how vertex layouts and uniform blocks become `[[buffer(n)]]`
//! bindings; [`generate_msl`] turns a [`gpu_shader::Program`] into one MSL source unit with a
//! `vertexMain`/`fragmentMain` pair; [`ShaderCache`] memoizes generation.

pub mod cache;
pub mod error;
pub mod generator;
pub mod input_layout;
pub mod types;

pub use cache::{ShaderCache, ShaderCacheLookup, ShaderCacheLookupSource};
pub use error::MslError;
pub use generator::{generate_msl, generate_msl_with_options, GeneratedShader, MslOptions};
pub use input_layout::{
    resolve_inputs, BufferLayouts, BufferShape, BufferSource, BufferVariable, InputBuffer,
    ResolvedInputs, StructMember,
};
