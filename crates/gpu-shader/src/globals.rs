//! Reachability pass: which stage inputs, samplers and helper functions a shader touches.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::ir::{
    walk_stm, Attribute, Expr, FuncDecl, IrVisitor, Sampler, Shader, Stm, Temp, Uniform, Variable,
    Varying,
};

/// Everything a stage references, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderGlobals {
    pub attributes: Vec<Attribute>,
    pub uniforms: Vec<Uniform>,
    pub varyings: Vec<Varying>,
    pub samplers: Vec<Sampler>,
    /// Reachable helpers, callees before callers.
    pub functions: Vec<Arc<FuncDecl>>,
    pub uses_output: bool,
    /// Stage-level variables referenced from inside helper functions, with the helper's name.
    pub function_globals: Vec<(String, Variable)>,
}

impl ShaderGlobals {
    pub fn collect(shader: &Shader) -> Self {
        Self::collect_many(std::slice::from_ref(shader))
    }

    /// Union over several stages (used to decide which buffers a program binds at all).
    pub fn collect_many(shaders: &[Shader]) -> Self {
        let mut collector = Collector::default();
        for shader in shaders {
            walk_stm(&mut collector, &shader.body);
        }
        collector.globals
    }

    pub fn uses_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn uses_uniform(&self, uniform: &Uniform) -> bool {
        self.uniforms
            .iter()
            .any(|u| u.block == uniform.block && u.name == uniform.name)
    }
}

#[derive(Default)]
struct Collector {
    globals: ShaderGlobals,
    seen: HashSet<(u8, String)>,
    functions: HashMap<String, Arc<FuncDecl>>,
    current_function: Option<String>,
}

impl Collector {
    fn add_variable(&mut self, var: &Variable) {
        if let Some(function) = &self.current_function {
            if !matches!(var, Variable::Temp(_) | Variable::Arg(_)) {
                self.globals
                    .function_globals
                    .push((function.clone(), var.clone()));
            }
            return;
        }
        let (tag, name) = match var {
            Variable::Attribute(a) => (0, a.name.clone()),
            Variable::Uniform(u) => (1, format!("{}.{}", u.block.0, u.name)),
            Variable::Varying(v) => (2, v.name.clone()),
            Variable::Sampler(s) => (3, s.name.clone()),
            Variable::Output => {
                self.globals.uses_output = true;
                return;
            }
            Variable::Temp(_) | Variable::Arg(_) => return,
        };
        if !self.seen.insert((tag, name)) {
            return;
        }
        match var {
            Variable::Attribute(a) => self.globals.attributes.push(a.clone()),
            Variable::Uniform(u) => self.globals.uniforms.push(u.clone()),
            Variable::Varying(v) => self.globals.varyings.push(v.clone()),
            Variable::Sampler(s) => self.globals.samplers.push(s.clone()),
            Variable::Output | Variable::Temp(_) | Variable::Arg(_) => {}
        }
    }

    fn add_function(&mut self, func: &Arc<FuncDecl>) {
        if let Some(existing) = self.functions.get(&func.name) {
            if existing != func {
                tracing::warn!(
                    function = %func.name,
                    "two different helper functions share a name; keeping the first"
                );
            }
            return;
        }
        self.functions.insert(func.name.clone(), Arc::clone(func));
        let outer = self.current_function.replace(func.name.clone());
        walk_stm(self, &func.body);
        self.current_function = outer;
        self.globals.functions.push(Arc::clone(func));
    }
}

impl IrVisitor for Collector {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Var(var) => self.add_variable(var),
            Expr::Call { func, .. } => self.add_function(func),
            _ => {}
        }
    }
}

/// Temps referenced by `body`, sorted by id. `for` counters are declared by the loop header and
/// are left out.
pub fn collect_temps(body: &Stm) -> Vec<Temp> {
    #[derive(Default)]
    struct Temps {
        found: HashMap<u32, Temp>,
        loop_vars: HashSet<u32>,
    }

    impl IrVisitor for Temps {
        fn visit_stm(&mut self, stm: &Stm) {
            if let Stm::ForSimple { loop_var, .. } = stm {
                self.loop_vars.insert(loop_var.id);
            }
        }

        fn visit_expr(&mut self, expr: &Expr) {
            if let Expr::Var(Variable::Temp(temp)) = expr {
                self.found.entry(temp.id).or_insert(*temp);
            }
        }
    }

    let mut temps = Temps::default();
    walk_stm(&mut temps, body);
    let mut out: Vec<Temp> = temps
        .found
        .into_values()
        .filter(|t| !temps.loop_vars.contains(&t.id))
        .collect();
    out.sort_by_key(|t| t.id);
    out
}

/// Whether `body` contains a `discard`.
pub fn has_discard(body: &Stm) -> bool {
    struct Discard(bool);
    impl IrVisitor for Discard {
        fn visit_stm(&mut self, stm: &Stm) {
            self.0 |= matches!(stm, Stm::Discard);
        }
    }
    let mut found = Discard(false);
    walk_stm(&mut found, body);
    found.0
}
