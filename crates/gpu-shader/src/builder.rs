//! Builder API for shader IR.
//!
//! ```
//! use gpu_shader::builder::{vec4, ShaderBuilder};
//! use gpu_shader::{Attribute, Expr, VarType, Varying};
//!
//! let pos = Attribute::new("a_Pos", VarType::Float2, false, 0);
//! let tex = Varying::new("v_Tex", VarType::Float2);
//!
//! let vertex = ShaderBuilder::vertex(|b| {
//!     b.set(&tex, Expr::from(&pos) * 0.5);
//!     b.out(vec4([Expr::from(&pos), Expr::from(0.0), Expr::from(1.0)]));
//! });
//! assert_eq!(vertex.stage, gpu_shader::ShaderStage::Vertex);
//! ```

use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};
use std::sync::Arc;

use crate::ir::{
    Arg, Attribute, BinaryOp, Expr, FuncDecl, Literal, Sampler, Shader, Stm, Temp, UnaryOp,
    Uniform, Variable, Varying,
};
use crate::types::{ShaderStage, VarType};
use crate::uniform_block::TypedUniform;

/// Temps start here; lower ids are left free for generator-internal locals.
pub const FIRST_TEMP_ID: u32 = 3;

/// Collects statements for one function body (a stage entry point or a helper function).
#[derive(Debug)]
pub struct ShaderBuilder {
    stms: Vec<Stm>,
    next_temp: u32,
}

impl Default for ShaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderBuilder {
    pub fn new() -> Self {
        Self {
            stms: Vec::new(),
            next_temp: FIRST_TEMP_ID,
        }
    }

    pub fn vertex(body: impl FnOnce(&mut ShaderBuilder)) -> Shader {
        let mut b = Self::new();
        body(&mut b);
        b.build(ShaderStage::Vertex)
    }

    pub fn fragment(body: impl FnOnce(&mut ShaderBuilder)) -> Shader {
        let mut b = Self::new();
        body(&mut b);
        b.build(ShaderStage::Fragment)
    }

    pub fn push(&mut self, stm: Stm) {
        self.stms.push(stm);
    }

    pub fn set(&mut self, to: impl Into<Expr>, from: impl Into<Expr>) {
        self.push(Stm::Set {
            to: to.into(),
            from: from.into(),
        });
    }

    /// Assign the stage output.
    pub fn out(&mut self, from: impl Into<Expr>) {
        self.set(Variable::Output, from);
    }

    pub fn temp(&mut self, ty: VarType) -> Temp {
        let temp = Temp::new(self.next_temp, ty);
        self.next_temp += 1;
        temp
    }

    pub fn if_(&mut self, cond: impl Into<Expr>, then: impl FnOnce(&mut Self)) {
        let then_body = self.block(then);
        self.push(Stm::If {
            cond: cond.into(),
            then_body: Box::new(then_body),
            else_body: None,
        });
    }

    pub fn if_else(
        &mut self,
        cond: impl Into<Expr>,
        then: impl FnOnce(&mut Self),
        otherwise: impl FnOnce(&mut Self),
    ) {
        let then_body = self.block(then);
        let else_body = self.block(otherwise);
        self.push(Stm::If {
            cond: cond.into(),
            then_body: Box::new(then_body),
            else_body: Some(Box::new(else_body)),
        });
    }

    /// `for (i = min; i < max_exclusive; i++)`. `body` receives the loop counter.
    pub fn for_range(
        &mut self,
        min: impl Into<Expr>,
        max_exclusive: impl Into<Expr>,
        body: impl FnOnce(&mut Self, Expr),
    ) {
        let loop_var = self.temp(VarType::SInt1);
        let body = self.block(|b| body(b, loop_var.into()));
        self.push(Stm::ForSimple {
            loop_var,
            min: min.into(),
            max_exclusive: max_exclusive.into(),
            body: Box::new(body),
        });
    }

    /// Declare a helper function. `body` receives one expression per argument.
    pub fn func(
        &mut self,
        name: impl Into<String>,
        ret: VarType,
        args: &[(&str, VarType)],
        body: impl FnOnce(&mut Self, &[Expr]),
    ) -> Arc<FuncDecl> {
        let args: Vec<Arg> = args.iter().map(|(n, ty)| Arg::new(*n, *ty)).collect();
        let arg_exprs: Vec<Expr> = args.iter().cloned().map(Expr::from).collect();
        let mut child = Self {
            stms: Vec::new(),
            next_temp: self.next_temp,
        };
        body(&mut child, &arg_exprs);
        self.next_temp = child.next_temp;
        Arc::new(FuncDecl {
            name: name.into(),
            ret,
            args,
            body: child.build_stm(),
        })
    }

    pub fn ret(&mut self, value: impl Into<Expr>) {
        self.push(Stm::Return(Some(value.into())));
    }

    pub fn ret_void(&mut self) {
        self.push(Stm::Return(None));
    }

    pub fn discard(&mut self) {
        self.push(Stm::Discard);
    }

    pub fn break_(&mut self) {
        self.push(Stm::Break);
    }

    pub fn continue_(&mut self) {
        self.push(Stm::Continue);
    }

    pub fn build_stm(self) -> Stm {
        Stm::Stms(self.stms)
    }

    pub fn build(self, stage: ShaderStage) -> Shader {
        Shader {
            stage,
            body: self.build_stm(),
        }
    }

    fn block(&mut self, f: impl FnOnce(&mut Self)) -> Stm {
        let outer = std::mem::take(&mut self.stms);
        f(self);
        Stm::Stms(std::mem::replace(&mut self.stms, outer))
    }
}

impl From<Variable> for Expr {
    fn from(v: Variable) -> Self {
        Expr::Var(v)
    }
}

macro_rules! var_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Var(Variable::$variant(v))
                }
            }

            impl From<&$ty> for Expr {
                fn from(v: &$ty) -> Self {
                    Expr::Var(Variable::$variant(v.clone()))
                }
            }
        )*
    };
}

var_from!(
    Attribute => Attribute,
    Varying => Varying,
    Uniform => Uniform,
    Temp => Temp,
    Arg => Arg,
    Sampler => Sampler,
);

impl<T: ?Sized> From<&TypedUniform<T>> for Expr {
    fn from(u: &TypedUniform<T>) -> Self {
        Expr::Var(Variable::Uniform(u.uniform().clone()))
    }
}

impl From<f32> for Expr {
    fn from(v: f32) -> Self {
        Expr::Literal(Literal::Float(v))
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Literal(Literal::Int(v))
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Literal(Literal::Bool(v))
    }
}

fn binop(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binop {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

macro_rules! expr_binop {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl<R: Into<Expr>> $trait<R> for Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    binop(self, BinaryOp::$op, rhs.into())
                }
            }

            impl $trait<Expr> for f32 {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    binop(self.into(), BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

expr_binop!(
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem,
);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unop {
            op: UnaryOp::Neg,
            right: Box::new(self),
        }
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unop {
            op: UnaryOp::Not,
            right: Box::new(self),
        }
    }
}

impl Expr {
    pub fn swizzle(self, swizzle: &str) -> Expr {
        Expr::Swizzle {
            base: Box::new(self),
            swizzle: swizzle.to_owned(),
        }
    }

    pub fn x(self) -> Expr {
        self.swizzle("x")
    }

    pub fn y(self) -> Expr {
        self.swizzle("y")
    }

    pub fn z(self) -> Expr {
        self.swizzle("z")
    }

    pub fn w(self) -> Expr {
        self.swizzle("w")
    }

    pub fn xy(self) -> Expr {
        self.swizzle("xy")
    }

    pub fn xyz(self) -> Expr {
        self.swizzle("xyz")
    }

    pub fn rgb(self) -> Expr {
        self.swizzle("rgb")
    }

    pub fn a(self) -> Expr {
        self.swizzle("a")
    }

    pub fn index(self, index: impl Into<Expr>) -> Expr {
        Expr::ArrayAccess {
            base: Box::new(self),
            index: Box::new(index.into()),
        }
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::Eq, rhs.into())
    }

    pub fn not_equals(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::Ne, rhs.into())
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::Lt, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::Le, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::Gt, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::Ge, rhs.into())
    }

    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::And, rhs.into())
    }

    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        binop(self, BinaryOp::Or, rhs.into())
    }

    /// `low <= self && self < high`
    pub fn in_range(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Expr {
        self.clone().ge(low).and(self.lt(high))
    }
}

pub fn ternary(cond: impl Into<Expr>, on_true: impl Into<Expr>, on_false: impl Into<Expr>) -> Expr {
    Expr::Ternary {
        cond: Box::new(cond.into()),
        on_true: Box::new(on_true.into()),
        on_false: Box::new(on_false.into()),
    }
}

pub fn call(func: &Arc<FuncDecl>, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Call {
        func: Arc::clone(func),
        args: args.into_iter().collect(),
    }
}

/// Builtin call with an explicit result type.
pub fn func(name: &str, ty: VarType, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Func {
        name: name.to_owned(),
        args: args.into_iter().collect(),
        ty,
    }
}

/// Builtin whose result has the type of its first argument.
fn generic(name: &str, args: Vec<Expr>) -> Expr {
    let ty = args.first().map_or(VarType::Float1, Expr::ty);
    func(name, ty, args)
}

macro_rules! generic_builtins {
    ($( $fn_name:ident => $glsl:literal ( $($arg:ident),+ ) ),* $(,)?) => {
        $(
            pub fn $fn_name($($arg: impl Into<Expr>),+) -> Expr {
                generic($glsl, vec![$($arg.into()),+])
            }
        )*
    };
}

generic_builtins!(
    sin => "sin"(v),
    cos => "cos"(v),
    tan => "tan"(v),
    asin => "asin"(v),
    acos => "acos"(v),
    atan => "atan"(v),
    atan2 => "atan"(y, x),
    radians => "radians"(v),
    degrees => "degrees"(v),
    pow => "pow"(b, e),
    exp => "exp"(v),
    exp2 => "exp2"(v),
    log => "log"(v),
    log2 => "log2"(v),
    sqrt => "sqrt"(v),
    inversesqrt => "inversesqrt"(v),
    abs => "abs"(v),
    sign => "sign"(v),
    ceil => "ceil"(v),
    floor => "floor"(v),
    fract => "fract"(v),
    clamp => "clamp"(v, lo, hi),
    min => "min"(a, b),
    max => "max"(a, b),
    modulo => "mod"(a, b),
    fwidth => "fwidth"(v),
    dfdx => "dFdx"(v),
    dfdy => "dFdy"(v),
    mix => "mix"(a, b, t),
    step => "step"(edge, v),
    smoothstep => "smoothstep"(lo, hi, v),
    cross => "cross"(a, b),
    normalize => "normalize"(v),
    reflect => "reflect"(i, n),
    refract => "refract"(i, n, eta),
);

pub fn clamp01(v: impl Into<Expr>) -> Expr {
    clamp(v, 0.0, 1.0)
}

pub fn length(v: impl Into<Expr>) -> Expr {
    func("length", VarType::Float1, [v.into()])
}

pub fn distance(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    func("distance", VarType::Float1, [a.into(), b.into()])
}

pub fn dot(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    func("dot", VarType::Float1, [a.into(), b.into()])
}

pub fn int(v: impl Into<Expr>) -> Expr {
    func("int", VarType::SInt1, [v.into()])
}

pub fn float(v: impl Into<Expr>) -> Expr {
    func("float", VarType::Float1, [v.into()])
}

/// Sample a 2D texture.
pub fn texture2d(sampler: impl Into<Expr>, coord: impl Into<Expr>) -> Expr {
    func("texture2D", VarType::Float4, [sampler.into(), coord.into()])
}

pub fn construct(ty: VarType, ops: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Vector {
        ty,
        ops: ops.into_iter().collect(),
    }
}

pub fn vec2(ops: impl IntoIterator<Item = Expr>) -> Expr {
    construct(VarType::Float2, ops)
}

pub fn vec3(ops: impl IntoIterator<Item = Expr>) -> Expr {
    construct(VarType::Float3, ops)
}

pub fn vec4(ops: impl IntoIterator<Item = Expr>) -> Expr {
    construct(VarType::Float4, ops)
}

pub fn mat4(ops: impl IntoIterator<Item = Expr>) -> Expr {
    construct(VarType::Mat4, ops)
}
