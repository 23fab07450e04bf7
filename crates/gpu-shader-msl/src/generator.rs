//! IR → Metal Shading Language.
//!
//! Output layout, in order: header, one struct per multi-variable input buffer, the varying
//! struct, reachable helper functions (callees first), the vertex entry point, then the fragment
//! entry point. Generation is a pure function of the program, the buffer layouts and
//! [`MslOptions`]; the same inputs always produce byte-identical source.

use std::fmt::Write;

use gpu_shader::globals::has_discard;
use gpu_shader::{
    collect_temps, BinaryOp, Expr, FuncDecl, Literal, Program, Sampler, ShaderGlobals, ShaderStage,
    Stm, VarKind, VarType, Variable, Varying,
};

use crate::error::MslError;
use crate::input_layout::{
    resolve_with_globals, BufferLayouts, BufferShape, BufferSource, BufferVariable, InputBuffer,
    ResolvedInputs, StructMember,
};
use crate::types::{msl_packed_type, msl_texture_type, msl_type, normalization_scale};

const INDENT: &str = "  ";

/// Names baked into the generated source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MslOptions {
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Struct carrying the clip position and varyings between the stages.
    pub vertex_out_struct: String,
    pub vertex_id: String,
    pub instance_id: String,
}

impl Default for MslOptions {
    fn default() -> Self {
        Self {
            vertex_entry: "vertexMain".to_owned(),
            fragment_entry: "fragmentMain".to_owned(),
            vertex_out_struct: "VertexOut".to_owned(),
            vertex_id: "vertexId".to_owned(),
            instance_id: "instanceId".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedShader {
    pub source: String,
    /// Fingerprint of `source`, usable as a pipeline cache key.
    pub source_hash: blake3::Hash,
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Buffer bindings the caller must provide, in binding order.
    pub inputs: ResolvedInputs,
    /// Texture/sampler pairs bound at `[[texture(index)]]` / `[[sampler(index)]]`.
    pub samplers: Vec<Sampler>,
}

pub fn generate_msl(program: &Program, layouts: &BufferLayouts) -> Result<GeneratedShader, MslError> {
    generate_msl_with_options(program, layouts, &MslOptions::default())
}

pub fn generate_msl_with_options(
    program: &Program,
    layouts: &BufferLayouts,
    options: &MslOptions,
) -> Result<GeneratedShader, MslError> {
    let vertex = ShaderGlobals::collect(&program.vertex);
    let fragment = ShaderGlobals::collect(&program.fragment);
    let all = ShaderGlobals::collect_many(&[program.vertex.clone(), program.fragment.clone()]);

    if let Some(attr) = fragment.attributes.first() {
        return Err(MslError::AttributeInFragment {
            name: attr.name.clone(),
        });
    }
    if let Some((function, variable)) = all.function_globals.first() {
        return Err(MslError::StageInputInFunction {
            function: function.clone(),
            variable: variable.name(),
        });
    }
    if has_discard(&program.vertex.body) {
        return Err(MslError::DiscardOutsideFragment);
    }

    let inputs = resolve_with_globals(&all, layouts)?;
    for attr in &vertex.attributes {
        if inputs.find_attribute(&attr.name).is_none() {
            return Err(MslError::UnboundAttribute {
                name: attr.name.clone(),
            });
        }
    }
    for uniform in vertex.uniforms.iter().chain(&fragment.uniforms) {
        if inputs.find_uniform(uniform.block, &uniform.name).is_none() {
            return Err(MslError::UnboundUniform {
                name: uniform.name.clone(),
            });
        }
    }

    let mut src = String::new();
    src.push_str("#include <metal_stdlib>\n");
    src.push_str("#include <simd/simd.h>\n\n");
    src.push_str("using namespace metal;\n");

    for buffer in &inputs.buffers {
        if let BufferShape::Struct { type_name } = &buffer.shape {
            emit_buffer_struct(&mut src, type_name, &buffer.members);
        }
    }
    emit_varying_struct(&mut src, &options.vertex_out_struct, &all.varyings)?;

    for func in &all.functions {
        let ctx = Context {
            scope: Scope::Function(&func.name),
            inputs: &inputs,
            options,
        };
        ctx.emit_function(&mut src, func)?;
    }

    let vertex_ctx = Context {
        scope: Scope::Entry(ShaderStage::Vertex),
        inputs: &inputs,
        options,
    };
    vertex_ctx.emit_entry(&mut src, &program.vertex.body, &vertex)?;
    let fragment_ctx = Context {
        scope: Scope::Entry(ShaderStage::Fragment),
        inputs: &inputs,
        options,
    };
    fragment_ctx.emit_entry(&mut src, &program.fragment.body, &fragment)?;

    let source_hash = blake3::hash(src.as_bytes());
    tracing::debug!(
        program = %program.name,
        bytes = src.len(),
        hash = %source_hash.to_hex(),
        "generated MSL"
    );

    let mut samplers = vertex.samplers;
    for sampler in fragment.samplers {
        if !samplers.iter().any(|s| s.name == sampler.name) {
            samplers.push(sampler);
        }
    }

    Ok(GeneratedShader {
        source: src,
        source_hash,
        vertex_entry: options.vertex_entry.clone(),
        fragment_entry: options.fragment_entry.clone(),
        inputs,
        samplers,
    })
}

fn emit_buffer_struct(src: &mut String, type_name: &str, members: &[StructMember]) {
    let _ = writeln!(src, "\nstruct {type_name} {{");
    let mut pad = 0usize;
    for member in members {
        match member {
            StructMember::Field {
                name,
                decl_type,
                array,
            } => {
                let _ = writeln!(src, "{INDENT}{decl_type} {name}{};", array_suffix(*array));
            }
            StructMember::Padding { bytes } => {
                let _ = writeln!(src, "{INDENT}uchar _pad{pad}[{bytes}];");
                pad += 1;
            }
        }
    }
    src.push_str("};\n");
}

fn array_suffix(array: Option<gpu_shader::ArrayLen>) -> String {
    match array {
        None => String::new(),
        Some(gpu_shader::ArrayLen::Fixed(n)) => format!("[{n}]"),
        // Metal has no runtime-sized struct members; the bound buffer may hold more elements.
        Some(gpu_shader::ArrayLen::Unbounded) => "[1]".to_owned(),
    }
}

fn emit_varying_struct(src: &mut String, name: &str, varyings: &[Varying]) -> Result<(), MslError> {
    let _ = writeln!(src, "\nstruct {name} {{");
    let _ = writeln!(src, "{INDENT}float4 position [[position]];");
    for varying in varyings {
        let ty = varying.ty;
        if ty.is_matrix() || ty.is_sampler() || ty == VarType::Void {
            return Err(MslError::UnsupportedType {
                variable: varying.name.clone(),
                ty,
            });
        }
        let decl_type = value_type(&varying.name, ty)?;
        let flat = if ty.kind() == VarKind::Float {
            ""
        } else {
            " [[flat]]"
        };
        let _ = writeln!(src, "{INDENT}{decl_type} {}{flat};", varying.name);
    }
    src.push_str("};\n");
    Ok(())
}

fn value_type(variable: &str, ty: VarType) -> Result<String, MslError> {
    msl_type(ty).ok_or_else(|| MslError::UnsupportedType {
        variable: variable.to_owned(),
        ty,
    })
}

/// Float literal text that always parses as a float in Metal.
pub(crate) fn float_literal(value: f32) -> String {
    if value.is_nan() {
        return "NAN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INFINITY" } else { "(-INFINITY)" }.to_owned();
    }
    let mut text = value.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Entry(ShaderStage),
    Function(&'a str),
}

struct Context<'a> {
    scope: Scope<'a>,
    inputs: &'a ResolvedInputs,
    options: &'a MslOptions,
}

impl Context<'_> {
    fn emit_function(&self, src: &mut String, func: &FuncDecl) -> Result<(), MslError> {
        let ret = value_type(&func.name, func.ret)?;
        let mut params = Vec::with_capacity(func.args.len());
        for arg in &func.args {
            params.push(format!("{} {}", value_type(&arg.name, arg.ty)?, arg.name));
        }
        let _ = writeln!(src, "\n{ret} {}({}) {{", func.name, params.join(", "));
        self.emit_temps(src, &func.body)?;
        self.emit_stm(src, &func.body, 1)?;
        src.push_str("}\n");
        Ok(())
    }

    fn emit_entry(&self, src: &mut String, body: &Stm, globals: &ShaderGlobals) -> Result<(), MslError> {
        let Scope::Entry(stage) = self.scope else {
            return Ok(());
        };
        let options = self.options;
        let used: Vec<&InputBuffer> = self
            .inputs
            .buffers
            .iter()
            .filter(|b| buffer_used_by(b, globals))
            .collect();

        let mut params = Vec::new();
        match stage {
            ShaderStage::Vertex => {
                params.push(format!("uint {} [[vertex_id]]", options.vertex_id));
                if used.iter().any(|b| b.divisor > 0) {
                    params.push(format!("uint {} [[instance_id]]", options.instance_id));
                }
            }
            ShaderStage::Fragment => {
                params.push(format!("{} in [[stage_in]]", options.vertex_out_struct));
            }
        }
        for buffer in &used {
            params.push(buffer.param_decl()?);
        }
        for sampler in &globals.samplers {
            let index = sampler.index;
            params.push(format!(
                "{} {} [[texture({index})]]",
                msl_texture_type(sampler.sampler_type),
                sampler.name
            ));
            params.push(format!("sampler {}Sampler [[sampler({index})]]", sampler.name));
        }

        let (qualifier, ret, entry) = match stage {
            ShaderStage::Vertex => ("vertex", options.vertex_out_struct.as_str(), &options.vertex_entry),
            ShaderStage::Fragment => ("fragment", "float4", &options.fragment_entry),
        };
        let _ = writeln!(src, "\n{qualifier} {ret} {entry}(");
        let last = params.len().saturating_sub(1);
        for (n, param) in params.iter().enumerate() {
            let sep = if n == last { "" } else { "," };
            let _ = writeln!(src, "{INDENT}{param}{sep}");
        }
        src.push_str(") {\n");
        let _ = writeln!(src, "{INDENT}{ret} out;");

        for buffer in &used {
            self.emit_buffer_locals(src, buffer, globals)?;
        }
        self.emit_temps(src, body)?;
        self.emit_stm(src, body, 1)?;
        let _ = writeln!(src, "{INDENT}return out;");
        src.push_str("}\n");
        Ok(())
    }

    /// One local per referenced member of a struct-shaped buffer.
    fn emit_buffer_locals(
        &self,
        src: &mut String,
        buffer: &InputBuffer,
        globals: &ShaderGlobals,
    ) -> Result<(), MslError> {
        if buffer.shape == BufferShape::Single {
            return Ok(());
        }
        for var in &buffer.variables {
            match &buffer.source {
                BufferSource::Vertex(_) => {
                    if !globals.uses_attribute(&var.name) {
                        continue;
                    }
                    let value = self.attribute_value(buffer, var)?;
                    let ty = value_type(&var.name, read_type(var))?;
                    let _ = writeln!(src, "{INDENT}{ty} {} = {value};", var.name);
                }
                BufferSource::Uniform(block) => {
                    let referenced = globals
                        .uniforms
                        .iter()
                        .any(|u| u.block == block.id() && u.name == var.name);
                    if !referenced || var.array.is_some() {
                        continue;
                    }
                    let ty = value_type(&var.name, var.ty)?;
                    let _ = writeln!(src, "{INDENT}{ty} {} = {}.{};", var.name, buffer.param_name, var.name);
                }
            }
        }
        Ok(())
    }

    /// Converted value of an attribute for the current vertex (or instance).
    fn attribute_value(&self, buffer: &InputBuffer, var: &BufferVariable) -> Result<String, MslError> {
        let index = match buffer.divisor {
            0 => self.options.vertex_id.clone(),
            1 => self.options.instance_id.clone(),
            d => format!("{} / {d}", self.options.instance_id),
        };
        let raw = match buffer.shape {
            BufferShape::Single => match buffer.byte_addressing() {
                None => format!("{}[{index}]", buffer.param_name),
                Some((stride, offset)) => {
                    let packed = msl_packed_type(var.ty).ok_or_else(|| MslError::UnsupportedType {
                        variable: var.name.clone(),
                        ty: var.ty,
                    })?;
                    let index = if index.contains(' ') { format!("({index})") } else { index };
                    let mut address = format!("{} + {index} * {stride}", buffer.param_name);
                    if offset > 0 {
                        let _ = write!(address, " + {offset}");
                    }
                    format!("*(device const {packed}*)({address})")
                }
            },
            BufferShape::Struct { .. } => format!("{}[{index}].{}", buffer.param_name, var.name),
        };
        let ty = value_type(&var.name, read_type(var))?;
        let converted = format!("{ty}({raw})");
        Ok(match normalization_scale(var.ty.kind()).filter(|_| var.normalized) {
            Some(scale) => format!("({converted} / {scale})"),
            None => converted,
        })
    }

    fn emit_temps(&self, src: &mut String, body: &Stm) -> Result<(), MslError> {
        for temp in collect_temps(body) {
            let name = temp.name();
            let ty = value_type(&name, temp.ty)?;
            let _ = writeln!(src, "{INDENT}{ty} {name};");
        }
        Ok(())
    }

    fn emit_stm(&self, src: &mut String, stm: &Stm, indent: usize) -> Result<(), MslError> {
        let pad = INDENT.repeat(indent);
        match stm {
            Stm::Stms(stms) => {
                for stm in stms {
                    self.emit_stm(src, stm, indent)?;
                }
            }
            Stm::Set { to, from } => {
                let _ = writeln!(src, "{pad}{} = {};", self.expr(to)?, self.expr(from)?);
            }
            Stm::If {
                cond,
                then_body,
                else_body,
            } => {
                let _ = writeln!(src, "{pad}if ({}) {{", self.condition(cond)?);
                self.emit_stm(src, then_body, indent + 1)?;
                if let Some(else_body) = else_body {
                    let _ = writeln!(src, "{pad}}} else {{");
                    self.emit_stm(src, else_body, indent + 1)?;
                }
                let _ = writeln!(src, "{pad}}}");
            }
            Stm::ForSimple {
                loop_var,
                min,
                max_exclusive,
                body,
            } => {
                let name = loop_var.name();
                let ty = value_type(&name, loop_var.ty)?;
                let _ = writeln!(
                    src,
                    "{pad}for ({ty} {name} = {}; {name} < {}; {name}++) {{",
                    self.expr(min)?,
                    self.expr(max_exclusive)?
                );
                self.emit_stm(src, body, indent + 1)?;
                let _ = writeln!(src, "{pad}}}");
            }
            Stm::Return(value) => match (self.scope, value) {
                (Scope::Entry(_), Some(_)) => return Err(MslError::InvalidReturn),
                (Scope::Entry(_), None) => {
                    let _ = writeln!(src, "{pad}return out;");
                }
                (Scope::Function(_), Some(value)) => {
                    let _ = writeln!(src, "{pad}return {};", self.expr(value)?);
                }
                (Scope::Function(_), None) => {
                    let _ = writeln!(src, "{pad}return;");
                }
            },
            Stm::Break => {
                let _ = writeln!(src, "{pad}break;");
            }
            Stm::Continue => {
                let _ = writeln!(src, "{pad}continue;");
            }
            Stm::Discard => {
                if matches!(self.scope, Scope::Entry(ShaderStage::Vertex)) {
                    return Err(MslError::DiscardOutsideFragment);
                }
                let _ = writeln!(src, "{pad}discard_fragment();");
            }
        }
        Ok(())
    }

    /// `if`/`for` headers supply their own parentheses.
    fn condition(&self, cond: &Expr) -> Result<String, MslError> {
        let text = self.expr(cond)?;
        let wrapped = matches!(
            cond,
            Expr::Unop { .. } | Expr::Ternary { .. } | Expr::Binop { .. }
        ) && text.starts_with('(')
            && text.ends_with(')');
        Ok(if wrapped {
            text[1..text.len() - 1].to_owned()
        } else {
            text
        })
    }

    fn expr(&self, expr: &Expr) -> Result<String, MslError> {
        Ok(match expr {
            Expr::Vector { ty, ops } => {
                let ty = value_type("vector constructor", *ty)?;
                format!("{ty}({})", self.list(ops)?)
            }
            Expr::Unop { op, right } => format!("({}{})", op.as_str(), self.expr(right)?),
            Expr::Binop { left, op, right } => {
                let (l, r) = (self.expr(left)?, self.expr(right)?);
                if *op == BinaryOp::Rem && left.ty().kind() == VarKind::Float {
                    format!("fmod({l}, {r})")
                } else {
                    format!("({l} {} {r})", op.as_str())
                }
            }
            Expr::Ternary {
                cond,
                on_true,
                on_false,
            } => format!(
                "({} ? {} : {})",
                self.expr(cond)?,
                self.expr(on_true)?,
                self.expr(on_false)?
            ),
            Expr::Func { name, args, .. } => self.builtin(name, args)?,
            Expr::Call { func, args } => format!("{}({})", func.name, self.list(args)?),
            Expr::Swizzle { base, swizzle } => format!("{}.{swizzle}", self.expr(base)?),
            Expr::ArrayAccess { base, index } => {
                format!("{}[{}]", self.expr(base)?, self.expr(index)?)
            }
            Expr::Literal(Literal::Int(v)) => v.to_string(),
            Expr::Literal(Literal::Float(v)) => float_literal(*v),
            Expr::Literal(Literal::Bool(v)) => v.to_string(),
            Expr::Var(var) => self.variable(var)?,
        })
    }

    fn list(&self, exprs: &[Expr]) -> Result<String, MslError> {
        let parts = exprs.iter().map(|e| self.expr(e)).collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(", "))
    }

    fn builtin(&self, name: &str, args: &[Expr]) -> Result<String, MslError> {
        let renamed = match (name, args.len()) {
            ("texture2D", _) => {
                let (Some(Expr::Var(Variable::Sampler(sampler))), Some(coord), 2) =
                    (args.first(), args.get(1), args.len())
                else {
                    return Err(MslError::InvalidSamplerArgument {
                        function: name.to_owned(),
                    });
                };
                let s = &sampler.name;
                return Ok(format!("{s}.sample({s}Sampler, {})", self.expr(coord)?));
            }
            ("atan", 2) => "atan2",
            ("mod", _) => "fmod",
            ("inversesqrt", _) => "rsqrt",
            ("dFdx", _) => "dfdx",
            ("dFdy", _) => "dfdy",
            (other, _) => other,
        };
        Ok(format!("{renamed}({})", self.list(args)?))
    }

    fn variable(&self, var: &Variable) -> Result<String, MslError> {
        let stage = match self.scope {
            Scope::Entry(stage) => stage,
            Scope::Function(function) => {
                return match var {
                    Variable::Temp(t) => Ok(t.name()),
                    Variable::Arg(a) => Ok(a.name.clone()),
                    other => Err(MslError::StageInputInFunction {
                        function: function.to_owned(),
                        variable: other.name(),
                    }),
                };
            }
        };
        Ok(match var {
            Variable::Attribute(attr) => {
                if stage == ShaderStage::Fragment {
                    return Err(MslError::AttributeInFragment {
                        name: attr.name.clone(),
                    });
                }
                let (buffer, bv) =
                    self.inputs
                        .find_attribute(&attr.name)
                        .ok_or_else(|| MslError::UnboundAttribute {
                            name: attr.name.clone(),
                        })?;
                match buffer.shape {
                    BufferShape::Single => self.attribute_value(buffer, bv)?,
                    BufferShape::Struct { .. } => attr.name.clone(),
                }
            }
            Variable::Uniform(uniform) => {
                let (buffer, bv) = self
                    .inputs
                    .find_uniform(uniform.block, &uniform.name)
                    .ok_or_else(|| MslError::UnboundUniform {
                        name: uniform.name.clone(),
                    })?;
                match (&buffer.shape, bv.array) {
                    (BufferShape::Struct { .. }, Some(_)) => {
                        format!("{}.{}", buffer.param_name, uniform.name)
                    }
                    _ => uniform.name.clone(),
                }
            }
            Variable::Varying(v) => match stage {
                ShaderStage::Vertex => format!("out.{}", v.name),
                ShaderStage::Fragment => format!("in.{}", v.name),
            },
            Variable::Temp(t) => t.name(),
            Variable::Arg(a) => a.name.clone(),
            Variable::Sampler(s) => s.name.clone(),
            Variable::Output => match stage {
                ShaderStage::Vertex => "out.position".to_owned(),
                ShaderStage::Fragment => "out".to_owned(),
            },
        })
    }
}

/// Type an attribute has once read from its buffer.
fn read_type(var: &BufferVariable) -> VarType {
    if var.normalized && var.ty.kind() != VarKind::Float {
        VarType::vector(VarKind::Float, var.ty.element_count()).unwrap_or(var.ty)
    } else {
        var.ty
    }
}

fn buffer_used_by(buffer: &InputBuffer, globals: &ShaderGlobals) -> bool {
    match &buffer.source {
        BufferSource::Vertex(_) => buffer
            .variables
            .iter()
            .any(|v| globals.uses_attribute(&v.name)),
        BufferSource::Uniform(block) => globals.uniforms.iter().any(|u| u.block == block.id()),
    }
}
