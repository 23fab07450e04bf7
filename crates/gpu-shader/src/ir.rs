//! Platform-neutral shader IR: variables, expressions, statements and programs.
//!
//! The IR is immutable once built. Code generators dispatch over [`Stm`] and [`Expr`] with one
//! exhaustive `match` per node kind; [`IrVisitor`] + [`walk_stm`] cover the read-only passes
//! (usage collection, reachability).

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::types::{Precision, ShaderStage, VarKind, VarType};
use crate::uniform_block::BlockId;

/// Per-vertex input read from a vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub name: String,
    pub ty: VarType,
    /// Integer data is converted to `[0, 1]` / `[-1, 1]` floats when read.
    pub normalized: bool,
    /// Explicit byte offset inside the vertex; `None` packs after the previous attribute.
    pub offset: Option<usize>,
    pub precision: Precision,
    /// Instancing step rate. `0` advances per vertex.
    pub divisor: u32,
    pub fixed_location: u32,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: VarType, normalized: bool, fixed_location: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            normalized,
            offset: None,
            precision: Precision::Default,
            divisor: 0,
            fixed_location,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_divisor(mut self, divisor: u32) -> Self {
        self.divisor = divisor;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Type the shader sees after normalization (integer vectors become float vectors).
    pub fn value_type(&self) -> VarType {
        if self.normalized && self.ty.kind() != VarKind::Float {
            VarType::vector(VarKind::Float, self.ty.element_count()).unwrap_or(self.ty)
        } else {
            self.ty
        }
    }
}

/// Value interpolated between the vertex and fragment stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Varying {
    pub name: String,
    pub ty: VarType,
    pub precision: Precision,
}

impl Varying {
    pub fn new(name: impl Into<String>, ty: VarType) -> Self {
        Self {
            name: name.into(),
            ty,
            precision: Precision::Default,
        }
    }
}

/// Array shape of a uniform block field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayLen {
    Fixed(usize),
    /// Trailing array whose length is decided by the bound buffer size.
    Unbounded,
}

/// Field of a uniform block, with its byte offset inside the block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uniform {
    pub name: String,
    pub ty: VarType,
    pub array: Option<ArrayLen>,
    pub precision: Precision,
    pub offset: usize,
    pub block: BlockId,
}

/// Function-local temporary, named `temp{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temp {
    pub id: u32,
    pub ty: VarType,
    pub precision: Precision,
}

impl Temp {
    pub fn new(id: u32, ty: VarType) -> Self {
        Self {
            id,
            ty,
            precision: Precision::Default,
        }
    }

    pub fn name(&self) -> String {
        format!("temp{}", self.id)
    }
}

/// Parameter of a user-defined helper function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arg {
    pub name: String,
    pub ty: VarType,
    pub precision: Precision,
}

impl Arg {
    pub fn new(name: impl Into<String>, ty: VarType) -> Self {
        Self {
            name: name.into(),
            ty,
            precision: Precision::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SamplerType {
    Sampler1D,
    Sampler2D,
    Sampler3D,
    SamplerCube,
}

impl SamplerType {
    pub fn var_type(self) -> VarType {
        match self {
            SamplerType::Sampler1D => VarType::Sampler1D,
            SamplerType::Sampler2D => VarType::Sampler2D,
            SamplerType::Sampler3D => VarType::Sampler3D,
            SamplerType::SamplerCube => VarType::SamplerCube,
        }
    }
}

/// Texture + sampler pair bound at texture unit `index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sampler {
    pub name: String,
    pub index: u32,
    pub sampler_type: SamplerType,
}

impl Sampler {
    pub fn new(name: impl Into<String>, index: u32, sampler_type: SamplerType) -> Self {
        Self {
            name: name.into(),
            index,
            sampler_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Variable {
    Attribute(Attribute),
    Varying(Varying),
    Uniform(Uniform),
    Temp(Temp),
    Arg(Arg),
    Sampler(Sampler),
    /// Stage result: clip-space position in the vertex stage, color in the fragment stage.
    Output,
}

impl Variable {
    pub fn name(&self) -> String {
        match self {
            Variable::Attribute(a) => a.name.clone(),
            Variable::Varying(v) => v.name.clone(),
            Variable::Uniform(u) => u.name.clone(),
            Variable::Temp(t) => t.name(),
            Variable::Arg(a) => a.name.clone(),
            Variable::Sampler(s) => s.name.clone(),
            Variable::Output => "out".to_owned(),
        }
    }

    pub fn ty(&self) -> VarType {
        match self {
            Variable::Attribute(a) => a.value_type(),
            Variable::Varying(v) => v.ty,
            Variable::Uniform(u) => u.ty,
            Variable::Temp(t) => t.ty,
            Variable::Arg(a) => a.ty,
            Variable::Sampler(s) => s.sampler_type.var_type(),
            Variable::Output => VarType::Float4,
        }
    }

    pub fn precision(&self) -> Precision {
        match self {
            Variable::Attribute(a) => a.precision,
            Variable::Varying(v) => v.precision,
            Variable::Uniform(u) => u.precision,
            Variable::Temp(t) => t.precision,
            Variable::Arg(a) => a.precision,
            Variable::Sampler(_) | Variable::Output => Precision::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Comparison and logical operators produce a boolean.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Bool(bool),
}

// Float literals compare by bit pattern so IR trees can key caches.
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Int(a), Literal::Int(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (Literal::Bool(a), Literal::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::Int(v) => v.hash(state),
            Literal::Float(v) => v.to_bits().hash(state),
            Literal::Bool(v) => v.hash(state),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Vector/matrix constructor, e.g. `vec4(xy, 0.0, 1.0)`.
    Vector { ty: VarType, ops: Vec<Expr> },
    Unop { op: UnaryOp, right: Box<Expr> },
    Binop {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        on_true: Box<Expr>,
        on_false: Box<Expr>,
    },
    /// Builtin function (`sin`, `mix`, `texture2D`, ...).
    Func {
        name: String,
        args: Vec<Expr>,
        ty: VarType,
    },
    /// Call to a user-defined helper function.
    Call { func: Arc<FuncDecl>, args: Vec<Expr> },
    Swizzle { base: Box<Expr>, swizzle: String },
    ArrayAccess { base: Box<Expr>, index: Box<Expr> },
    Literal(Literal),
    Var(Variable),
}

impl Expr {
    pub fn ty(&self) -> VarType {
        match self {
            Expr::Vector { ty, .. } => *ty,
            Expr::Unop { right, .. } => right.ty(),
            Expr::Binop { left, op, right } => {
                if op.is_boolean() {
                    return VarType::Bool1;
                }
                let (l, r) = (left.ty(), right.ty());
                match (l.is_matrix(), r.is_matrix()) {
                    // mat * vec yields a vector.
                    (true, false) if r.element_count() > 1 => r,
                    (false, true) if l.element_count() > 1 => l,
                    _ if r.element_count() > l.element_count() => r,
                    _ => l,
                }
            }
            Expr::Ternary { on_true, .. } => on_true.ty(),
            Expr::Func { ty, .. } => *ty,
            Expr::Call { func, .. } => func.ret,
            Expr::Swizzle { base, swizzle } => base
                .ty()
                .with_element_count(swizzle.len())
                .unwrap_or(VarType::Void),
            Expr::ArrayAccess { base, .. } => {
                let ty = base.ty();
                match ty.matrix_dimension() {
                    Some(n) => VarType::vector(VarKind::Float, n).unwrap_or(ty),
                    None => ty,
                }
            }
            Expr::Literal(Literal::Int(_)) => VarType::SInt1,
            Expr::Literal(Literal::Float(_)) => VarType::Float1,
            Expr::Literal(Literal::Bool(_)) => VarType::Bool1,
            Expr::Var(v) => v.ty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stm {
    Stms(Vec<Stm>),
    Set {
        to: Expr,
        from: Expr,
    },
    If {
        cond: Expr,
        then_body: Box<Stm>,
        else_body: Option<Box<Stm>>,
    },
    /// `for (loop_var = min; loop_var < max_exclusive; loop_var++)`.
    ForSimple {
        loop_var: Temp,
        min: Expr,
        max_exclusive: Expr,
        body: Box<Stm>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Discard,
}

/// User-defined helper function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncDecl {
    pub name: String,
    pub ret: VarType,
    pub args: Vec<Arg>,
    pub body: Stm,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shader {
    pub stage: ShaderStage,
    pub body: Stm,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Program {
    pub name: String,
    pub vertex: Shader,
    pub fragment: Shader,
}

impl Program {
    pub fn new(name: impl Into<String>, vertex: Shader, fragment: Shader) -> Self {
        Self {
            name: name.into(),
            vertex,
            fragment,
        }
    }
}

/// Read-only IR pass. Both hooks are called in pre-order by [`walk_stm`] / [`walk_expr`].
pub trait IrVisitor {
    fn visit_stm(&mut self, _stm: &Stm) {}
    fn visit_expr(&mut self, _expr: &Expr) {}
}

pub fn walk_stm<V: IrVisitor + ?Sized>(visitor: &mut V, stm: &Stm) {
    visitor.visit_stm(stm);
    match stm {
        Stm::Stms(stms) => {
            for stm in stms {
                walk_stm(visitor, stm);
            }
        }
        Stm::Set { to, from } => {
            walk_expr(visitor, to);
            walk_expr(visitor, from);
        }
        Stm::If {
            cond,
            then_body,
            else_body,
        } => {
            walk_expr(visitor, cond);
            walk_stm(visitor, then_body);
            if let Some(else_body) = else_body {
                walk_stm(visitor, else_body);
            }
        }
        Stm::ForSimple {
            min,
            max_exclusive,
            body,
            ..
        } => {
            walk_expr(visitor, min);
            walk_expr(visitor, max_exclusive);
            walk_stm(visitor, body);
        }
        Stm::Return(Some(expr)) => walk_expr(visitor, expr),
        Stm::Return(None) | Stm::Break | Stm::Continue | Stm::Discard => {}
    }
}

pub fn walk_expr<V: IrVisitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    visitor.visit_expr(expr);
    match expr {
        Expr::Vector { ops, .. } => {
            for op in ops {
                walk_expr(visitor, op);
            }
        }
        Expr::Unop { right, .. } => walk_expr(visitor, right),
        Expr::Binop { left, right, .. } => {
            walk_expr(visitor, left);
            walk_expr(visitor, right);
        }
        Expr::Ternary {
            cond,
            on_true,
            on_false,
        } => {
            walk_expr(visitor, cond);
            walk_expr(visitor, on_true);
            walk_expr(visitor, on_false);
        }
        Expr::Func { args, .. } | Expr::Call { args, .. } => {
            for arg in args {
                walk_expr(visitor, arg);
            }
        }
        Expr::Swizzle { base, .. } => walk_expr(visitor, base),
        Expr::ArrayAccess { base, index } => {
            walk_expr(visitor, base);
            walk_expr(visitor, index);
        }
        Expr::Literal(_) | Expr::Var(_) => {}
    }
}
