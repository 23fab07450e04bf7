use gpu_shader::VarType;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MslError {
    #[error("`{variable}` has type {ty:?}, which has no Metal equivalent in this position")]
    UnsupportedType { variable: String, ty: VarType },
    #[error("uniform `{name}` is not provided by any uniform block in the buffer layouts")]
    UnboundUniform { name: String },
    #[error("attribute `{name}` is not provided by any vertex layout")]
    UnboundAttribute { name: String },
    #[error("attribute `{name}` is read by the fragment stage")]
    AttributeInFragment { name: String },
    #[error("helper function `{function}` reads stage variable `{variable}`; pass it as an argument")]
    StageInputInFunction { function: String, variable: String },
    #[error("`discard` used outside the fragment stage")]
    DiscardOutsideFragment,
    #[error("stage entry point returns a value")]
    InvalidReturn,
    #[error("first argument of `{function}` must be a sampler")]
    InvalidSamplerArgument { function: String },
    #[error("attributes `{first}` and `{second}` overlap in vertex layout {binding}")]
    OverlappingAttributes {
        binding: u32,
        first: String,
        second: String,
    },
}
