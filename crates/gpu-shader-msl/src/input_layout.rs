//! Maps vertex layouts and uniform blocks onto Metal `[[buffer(n)]]` bindings.
//!
//! Every group (one vertex layout or one uniform block) that the program touches becomes one
//! binding, numbered densely in the order vertex layouts then uniform blocks. A group holding a
//! single variable is bound directly under that variable's name; larger groups get a generated
//! struct whose members (plus explicit padding) reproduce the CPU byte layout exactly.

use std::sync::Arc;

use gpu_shader::{
    ArrayLen, BlockId, Program, ShaderGlobals, UniformBlock, VarType, VertexLayout,
};

use crate::error::MslError;
use crate::types::{msl_member_size, msl_packed_type, msl_type};

/// Buffer formats a program is compiled against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BufferLayouts {
    pub vertex: Vec<VertexLayout>,
    pub uniform_blocks: Vec<Arc<UniformBlock>>,
}

impl BufferLayouts {
    pub fn new(vertex: Vec<VertexLayout>, uniform_blocks: Vec<Arc<UniformBlock>>) -> Self {
        Self {
            vertex,
            uniform_blocks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferSource {
    Vertex(VertexLayout),
    Uniform(Arc<UniformBlock>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferShape {
    /// The only variable is the parameter itself.
    Single,
    Struct { type_name: String },
}

/// A variable provided by a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferVariable {
    pub name: String,
    pub ty: VarType,
    pub offset: usize,
    pub normalized: bool,
    pub array: Option<ArrayLen>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructMember {
    Field {
        name: String,
        decl_type: String,
        array: Option<ArrayLen>,
    },
    Padding {
        bytes: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBuffer {
    pub binding: u32,
    pub source: BufferSource,
    pub param_name: String,
    pub shape: BufferShape,
    pub variables: Vec<BufferVariable>,
    /// Struct layout; empty for [`BufferShape::Single`].
    pub members: Vec<StructMember>,
    /// Instance step rate for vertex buffers (`0` steps per vertex).
    pub divisor: u32,
}

impl InputBuffer {
    pub fn is_vertex(&self) -> bool {
        matches!(self.source, BufferSource::Vertex(_))
    }

    pub fn uniform_block(&self) -> Option<&Arc<UniformBlock>> {
        match &self.source {
            BufferSource::Uniform(block) => Some(block),
            BufferSource::Vertex(_) => None,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&BufferVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Entry point parameter, e.g. `device const Buffer0* buffer0 [[buffer(0)]]`.
    pub fn param_decl(&self) -> Result<String, MslError> {
        let binding = self.binding;
        let name = &self.param_name;
        match (&self.shape, self.is_vertex()) {
            (BufferShape::Struct { type_name }, true) => Ok(format!(
                "device const {type_name}* {name} [[buffer({binding})]]"
            )),
            (BufferShape::Struct { type_name }, false) => {
                Ok(format!("constant {type_name}& {name} [[buffer({binding})]]"))
            }
            (BufferShape::Single, is_vertex) => {
                let var = self.single_variable();
                let unsupported = || MslError::UnsupportedType {
                    variable: var.name.clone(),
                    ty: var.ty,
                };
                if is_vertex {
                    let ty = msl_packed_type(var.ty).ok_or_else(unsupported)?;
                    if self.byte_addressing().is_some() {
                        return Ok(format!("device const uchar* {name} [[buffer({binding})]]"));
                    }
                    Ok(format!("device const {ty}* {name} [[buffer({binding})]]"))
                } else {
                    let ty = msl_type(var.ty).ok_or_else(unsupported)?;
                    let sigil = if var.array.is_some() { '*' } else { '&' };
                    Ok(format!("constant {ty}{sigil} {name} [[buffer({binding})]]"))
                }
            }
        }
    }

    /// `(stride, offset)` of a lone vertex attribute that does not span its whole vertex. Such a
    /// buffer is bound as raw bytes and each read computes its own address.
    pub fn byte_addressing(&self) -> Option<(usize, usize)> {
        let BufferSource::Vertex(layout) = &self.source else {
            return None;
        };
        if self.shape != BufferShape::Single {
            return None;
        }
        let var = self.variables.first()?;
        let tight = var.offset == 0 && var.ty.bytes_size() == layout.stride();
        (!tight).then_some((layout.stride(), var.offset))
    }

    fn single_variable(&self) -> &BufferVariable {
        &self.variables[0]
    }
}

/// Result of [`resolve_inputs`]: the bound buffers in binding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    pub buffers: Vec<InputBuffer>,
}

impl ResolvedInputs {
    pub fn find_attribute(&self, name: &str) -> Option<(&InputBuffer, &BufferVariable)> {
        self.buffers
            .iter()
            .filter(|b| b.is_vertex())
            .find_map(|b| b.variable(name).map(|v| (b, v)))
    }

    pub fn find_uniform(&self, block: BlockId, name: &str) -> Option<(&InputBuffer, &BufferVariable)> {
        self.buffers
            .iter()
            .filter(|b| b.uniform_block().is_some_and(|ub| ub.id() == block))
            .find_map(|b| b.variable(name).map(|v| (b, v)))
    }

    pub fn uses_instancing(&self) -> bool {
        self.buffers.iter().any(|b| b.divisor > 0)
    }
}

/// Assign bindings to every vertex layout and uniform block `program` reads.
pub fn resolve_inputs(program: &Program, layouts: &BufferLayouts) -> Result<ResolvedInputs, MslError> {
    let globals = ShaderGlobals::collect_many(&[program.vertex.clone(), program.fragment.clone()]);
    let inputs = resolve_with_globals(&globals, layouts)?;
    tracing::debug!(
        program = %program.name,
        buffers = inputs.buffers.len(),
        "resolved shader input buffers"
    );
    Ok(inputs)
}

/// [`resolve_inputs`] for a caller that already ran the reachability pass over both stages.
pub(crate) fn resolve_with_globals(
    globals: &ShaderGlobals,
    layouts: &BufferLayouts,
) -> Result<ResolvedInputs, MslError> {
    let mut buffers = Vec::new();
    let mut binding = 0u32;

    for layout in &layouts.vertex {
        if layout.is_empty() {
            tracing::warn!(binding, "skipping vertex layout without attributes");
            continue;
        }
        if !layout.attributes().iter().any(|a| globals.uses_attribute(&a.name)) {
            continue;
        }
        buffers.push(vertex_buffer(binding, layout)?);
        binding += 1;
    }

    for block in &layouts.uniform_blocks {
        if block.fields().is_empty() {
            tracing::warn!(block = block.name(), "skipping uniform block without fields");
            continue;
        }
        if !block.uniforms().any(|u| globals.uses_uniform(u)) {
            continue;
        }
        buffers.push(uniform_buffer(binding, block)?);
        binding += 1;
    }

    Ok(ResolvedInputs { buffers })
}

fn vertex_buffer(binding: u32, layout: &VertexLayout) -> Result<InputBuffer, MslError> {
    let variables: Vec<BufferVariable> = layout
        .iter()
        .map(|(attr, offset)| BufferVariable {
            name: attr.name.clone(),
            ty: attr.ty,
            offset,
            normalized: attr.normalized,
            array: None,
        })
        .collect();
    let divisor = layout.attributes().first().map_or(0, |a| a.divisor);

    if variables.len() == 1 {
        return Ok(InputBuffer {
            binding,
            source: BufferSource::Vertex(layout.clone()),
            param_name: variables[0].name.clone(),
            shape: BufferShape::Single,
            variables,
            members: Vec::new(),
            divisor,
        });
    }

    let mut members = Vec::new();
    let mut cursor = 0usize;
    let mut previous: Option<&str> = None;
    for var in &variables {
        if var.offset < cursor {
            return Err(MslError::OverlappingAttributes {
                binding,
                first: previous.unwrap_or_default().to_owned(),
                second: var.name.clone(),
            });
        }
        if var.offset > cursor {
            members.push(StructMember::Padding {
                bytes: var.offset - cursor,
            });
        }
        let decl_type = msl_packed_type(var.ty).ok_or_else(|| MslError::UnsupportedType {
            variable: var.name.clone(),
            ty: var.ty,
        })?;
        members.push(StructMember::Field {
            name: var.name.clone(),
            decl_type,
            array: None,
        });
        cursor = var.offset + var.ty.bytes_size();
        previous = Some(&var.name);
    }
    if layout.stride() > cursor {
        members.push(StructMember::Padding {
            bytes: layout.stride() - cursor,
        });
    }

    Ok(InputBuffer {
        binding,
        source: BufferSource::Vertex(layout.clone()),
        param_name: format!("buffer{binding}"),
        shape: BufferShape::Struct {
            type_name: format!("Buffer{binding}"),
        },
        variables,
        members,
        divisor,
    })
}

fn uniform_buffer(binding: u32, block: &Arc<UniformBlock>) -> Result<InputBuffer, MslError> {
    let variables: Vec<BufferVariable> = block
        .fields()
        .iter()
        .map(|f| BufferVariable {
            name: f.uniform.name.clone(),
            ty: f.uniform.ty,
            offset: f.uniform.offset,
            normalized: false,
            array: f.uniform.array,
        })
        .collect();

    if variables.len() == 1 {
        return Ok(InputBuffer {
            binding,
            source: BufferSource::Uniform(Arc::clone(block)),
            param_name: variables[0].name.clone(),
            shape: BufferShape::Single,
            variables,
            members: Vec::new(),
            divisor: 0,
        });
    }

    let mut members = Vec::new();
    let mut cursor = 0usize;
    for (var, field) in variables.iter().zip(block.fields()) {
        if var.offset > cursor {
            members.push(StructMember::Padding {
                bytes: var.offset - cursor,
            });
        }
        let unsupported = || MslError::UnsupportedType {
            variable: var.name.clone(),
            ty: var.ty,
        };
        // Lone 3-component vectors are packed so a following scalar can share their last 4 bytes.
        let packed = var.array.is_none() && var.ty.element_count() == 3 && !var.ty.is_matrix();
        let decl_type = if packed {
            msl_packed_type(var.ty)
        } else {
            msl_type(var.ty).filter(|_| !var.ty.is_sampler() && var.ty != VarType::Void)
        }
        .ok_or_else(unsupported)?;
        let size = match var.array {
            None => msl_member_size(var.ty, packed),
            Some(ArrayLen::Fixed(n)) => field.size * n,
            Some(ArrayLen::Unbounded) => field.size,
        };
        members.push(StructMember::Field {
            name: var.name.clone(),
            decl_type,
            array: var.array,
        });
        cursor = var.offset + size;
    }

    Ok(InputBuffer {
        binding,
        source: BufferSource::Uniform(Arc::clone(block)),
        param_name: instance_name(block.name(), binding),
        shape: BufferShape::Struct {
            type_name: block.name().to_owned(),
        },
        variables,
        members,
        divisor: 0,
    })
}

/// `SceneUB` is bound as `sceneUB`.
fn instance_name(block_name: &str, binding: u32) -> String {
    let mut chars = block_name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => format!("buffer{binding}"),
    }
}
