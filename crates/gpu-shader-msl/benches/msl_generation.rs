#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;

#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, Criterion};
#[cfg(not(target_arch = "wasm32"))]
use gpu_shader::builder::{clamp01, dot, normalize, texture2d, vec4};
#[cfg(not(target_arch = "wasm32"))]
use gpu_shader::{
    Attribute, BlockId, Expr, Program, Sampler, SamplerType, ShaderBuilder, ShaderStage,
    UniformBlockBuilder, VarType, Varying, VertexLayout,
};
#[cfg(not(target_arch = "wasm32"))]
use gpu_shader_msl::{generate_msl, resolve_inputs, BufferLayouts, ShaderCache};

/// Lit, textured mesh: one interleaved vertex buffer, one scene block, one texture.
#[cfg(not(target_arch = "wasm32"))]
fn lit_mesh() -> (Program, BufferLayouts) {
    let pos = Attribute::new("a_Pos", VarType::Float3, false, 0);
    let normal = Attribute::new("a_Normal", VarType::Float3, false, 1);
    let uv = Attribute::new("a_Uv", VarType::Float2, false, 2);
    let color = Attribute::new("a_Color", VarType::Byte4, true, 3);

    let mut ub = UniformBlockBuilder::new(BlockId(0), "SceneUB", 0);
    let view_proj = ub.mat4("u_ViewProj");
    let model = ub.mat4("u_Model");
    let light_dir = ub.vec3("u_LightDir");
    let ambient = ub.float("u_Ambient");
    let scene = Arc::new(ub.build());

    let tex = Sampler::new("u_Albedo", 0, SamplerType::Sampler2D);
    let v_uv = Varying::new("v_Uv", VarType::Float2);
    let v_normal = Varying::new("v_Normal", VarType::Float3);
    let v_color = Varying::new("v_Color", VarType::Float4);

    let vertex = ShaderBuilder::vertex(|b| {
        let world = Expr::from(&model) * vec4([Expr::from(&pos), Expr::from(1.0)]);
        b.out(Expr::from(&view_proj) * world);
        b.set(&v_normal, (Expr::from(&model) * vec4([Expr::from(&normal), Expr::from(0.0)])).xyz());
        b.set(&v_uv, &uv);
        b.set(&v_color, &color);
    });

    let mut b = ShaderBuilder::new();
    let shade = b.func(
        "shade",
        VarType::Float1,
        &[("n", VarType::Float3), ("l", VarType::Float3), ("ambient", VarType::Float1)],
        |f, a| f.ret(clamp01(dot(normalize(a[0].clone()), a[1].clone()) + a[2].clone())),
    );
    let albedo = b.temp(VarType::Float4);
    b.set(albedo, texture2d(&tex, &v_uv) * &v_color);
    b.if_(Expr::from(albedo).a().lt(0.01), |b| b.discard());
    let light = gpu_shader::builder::call(&shade, [Expr::from(&v_normal), Expr::from(&light_dir), Expr::from(&ambient)]);
    b.out(vec4([Expr::from(albedo).rgb() * light, Expr::from(albedo).a()]));
    let fragment = b.build(ShaderStage::Fragment);

    (
        Program::new("lit_mesh", vertex, fragment),
        BufferLayouts::new(vec![VertexLayout::new(vec![pos, normal, uv, color])], vec![scene]),
    )
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_generation(c: &mut Criterion) {
    let (program, layouts) = lit_mesh();
    let mut group = c.benchmark_group("msl_generation");

    group.bench_function("resolve_inputs", |b| {
        b.iter(|| {
            let inputs = resolve_inputs(black_box(&program), black_box(&layouts)).unwrap();
            black_box(inputs.buffers.len());
        })
    });

    group.bench_function("generate", |b| {
        b.iter(|| {
            let shader = generate_msl(black_box(&program), black_box(&layouts)).unwrap();
            black_box(shader.source.len());
        })
    });

    let mut cache = ShaderCache::default();
    cache
        .get_or_generate(&program, &layouts)
        .expect("program should generate");
    group.bench_function("cache_hit", |b| {
        b.iter(|| {
            let lookup = cache
                .get_or_generate(black_box(&program), black_box(&layouts))
                .unwrap();
            black_box(lookup.source);
            black_box(lookup.shader().source.len());
        })
    });

    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group!(benches, bench_generation);
#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
