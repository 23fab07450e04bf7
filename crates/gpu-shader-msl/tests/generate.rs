use std::sync::Arc;

use gpu_shader::builder::{call, float, texture2d, vec4};
use gpu_shader::{
    Attribute, BlockId, Expr, Program, Sampler, SamplerType, ShaderBuilder, ShaderStage,
    UniformBlockBuilder, VarType, Varying, VertexLayout,
};
use gpu_shader_msl::{
    generate_msl, generate_msl_with_options, BufferLayouts, BufferShape, MslError, MslOptions,
};
use pretty_assertions::assert_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn rgba(r: f32, g: f32, b: f32, a: f32) -> Expr {
    vec4([r, g, b, a].map(Expr::from))
}

fn clip(pos: &Attribute) -> Expr {
    vec4([Expr::from(pos), Expr::from(0.0), Expr::from(1.0)])
}

/// `a_Pos` in its own vertex buffer, a one-matrix uniform block, one varying.
fn minimal() -> (Program, BufferLayouts) {
    let pos = Attribute::new("a_Pos", VarType::Float2, false, 0);
    let mut ub = UniformBlockBuilder::new(BlockId(0), "ProjUB", 0);
    let proj = ub.mat4("u_ProjMat");
    let block = Arc::new(ub.build());
    let v_uv = Varying::new("v_Uv", VarType::Float2);

    let vertex = ShaderBuilder::vertex(|b| {
        b.out(Expr::from(&proj) * clip(&pos));
        b.set(&v_uv, Expr::from(&pos) * 0.5);
    });
    let fragment = ShaderBuilder::fragment(|b| {
        b.out(vec4([Expr::from(&v_uv), Expr::from(0.0), Expr::from(1.0)]));
    });
    (
        Program::new("minimal", vertex, fragment),
        BufferLayouts::new(vec![VertexLayout::new(vec![pos])], vec![block]),
    )
}

#[test]
fn minimal_program_source() {
    let (program, layouts) = minimal();
    let shader = generate_msl(&program, &layouts).unwrap();

    let expected = "\
#include <metal_stdlib>
#include <simd/simd.h>

using namespace metal;

struct VertexOut {
  float4 position [[position]];
  float2 v_Uv;
};

vertex VertexOut vertexMain(
  uint vertexId [[vertex_id]],
  device const packed_float2* a_Pos [[buffer(0)]],
  constant float4x4& u_ProjMat [[buffer(1)]]
) {
  VertexOut out;
  out.position = (u_ProjMat * float4(float2(a_Pos[vertexId]), 0.0, 1.0));
  out.v_Uv = (float2(a_Pos[vertexId]) * 0.5);
  return out;
}

fragment float4 fragmentMain(
  VertexOut in [[stage_in]]
) {
  float4 out;
  out = float4(in.v_Uv, 0.0, 1.0);
  return out;
}
";
    assert_eq!(shader.source, expected);
    assert_eq!(shader.vertex_entry, "vertexMain");
    assert_eq!(shader.fragment_entry, "fragmentMain");
    assert_eq!(shader.source_hash, blake3::hash(expected.as_bytes()));
    assert!(shader
        .inputs
        .buffers
        .iter()
        .all(|b| b.shape == BufferShape::Single));
}

#[test]
fn generation_is_deterministic_and_local() {
    let (program, layouts) = minimal();
    let first = generate_msl(&program, &layouts).unwrap();
    let second = generate_msl(&program, &layouts).unwrap();
    assert_eq!(first, second);

    // Appending one self-assignment changes exactly one line.
    let v_uv = Varying::new("v_Uv", VarType::Float2);
    let mut changed = program.clone();
    let gpu_shader::Stm::Stms(stms) = &mut changed.vertex.body else {
        panic!("builder always produces a statement list");
    };
    stms.push(gpu_shader::Stm::Set {
        to: Expr::from(&v_uv),
        from: Expr::from(&v_uv),
    });
    let changed = generate_msl(&changed, &layouts).unwrap();

    let added = "  out.v_Uv = out.v_Uv;";
    let old: Vec<&str> = first.source.lines().collect();
    let new: Vec<&str> = changed.source.lines().collect();
    assert_eq!(new.len(), old.len() + 1);
    let without: Vec<&str> = new.iter().copied().filter(|l| *l != added).collect();
    assert_eq!(without, old);
}

#[test]
fn struct_buffers_unpack_referenced_members() {
    init_tracing();
    let pos = Attribute::new("a_Pos", VarType::Float2, false, 0);
    let col = Attribute::new("a_Col", VarType::Byte4, true, 1);
    let mut ub = UniformBlockBuilder::new(BlockId(0), "SceneUB", 0);
    let proj = ub.mat4("u_ProjMat");
    let tint = ub.vec4("u_Tint");
    let scene = Arc::new(ub.build());
    let v_col = Varying::new("v_Col", VarType::Float4);

    let vertex = ShaderBuilder::vertex(|b| {
        b.out(Expr::from(&proj) * clip(&pos));
        b.set(&v_col, Expr::from(&col) * &tint);
    });
    let fragment = ShaderBuilder::fragment(|b| b.out(Expr::from(&v_col) * &tint));
    let layouts = BufferLayouts::new(vec![VertexLayout::new(vec![pos, col])], vec![scene]);
    let shader = generate_msl(&Program::new("colored", vertex, fragment), &layouts).unwrap();
    let src = &shader.source;

    for snippet in [
        "struct Buffer0 {\n  packed_float2 a_Pos;\n  packed_uchar4 a_Col;\n};\n",
        "struct SceneUB {\n  float4x4 u_ProjMat;\n  float4 u_Tint;\n};\n",
        "  device const Buffer0* buffer0 [[buffer(0)]],\n  constant SceneUB& sceneUB [[buffer(1)]]\n",
        "  VertexOut out;\n  float2 a_Pos = float2(buffer0[vertexId].a_Pos);\n  float4 a_Col = (float4(buffer0[vertexId].a_Col) / 255.0);\n  float4x4 u_ProjMat = sceneUB.u_ProjMat;\n  float4 u_Tint = sceneUB.u_Tint;\n",
        "  out.v_Col = (a_Col * u_Tint);\n",
        "  VertexOut in [[stage_in]],\n  constant SceneUB& sceneUB [[buffer(1)]]\n) {\n  float4 out;\n  float4 u_Tint = sceneUB.u_Tint;\n  out = (in.v_Col * u_Tint);\n",
    ] {
        assert!(src.contains(snippet), "missing {snippet:?} in:\n{src}");
    }
}

#[test]
fn padded_layouts_and_uniform_arrays() {
    let pos = Attribute::new("a_Pos", VarType::Float3, false, 0);
    let layout = VertexLayout::with_stride(vec![pos.clone()], 16);
    let mut ub = UniformBlockBuilder::new(BlockId(0), "BonesUB", 0);
    let count = ub.int("u_Count");
    let bones = ub.array(4, |b| b.mat4("u_Bones"));
    let block = Arc::new(ub.build());

    let vertex = ShaderBuilder::vertex(|b| {
        let bone = Expr::from(&bones).index(Expr::from(&count) - 1);
        b.out(bone * vec4([Expr::from(&pos), Expr::from(1.0)]));
    });
    let fragment = ShaderBuilder::fragment(|b| b.out(rgba(1.0, 1.0, 1.0, 1.0)));
    let layouts = BufferLayouts::new(vec![layout], vec![block]);
    let shader = generate_msl(&Program::new("skinned", vertex, fragment), &layouts).unwrap();
    let src = &shader.source;

    for snippet in [
        "  device const uchar* a_Pos [[buffer(0)]],\n  constant BonesUB& bonesUB [[buffer(1)]]\n",
        "struct BonesUB {\n  int u_Count;\n  uchar _pad0[12];\n  float4x4 u_Bones[4];\n};\n",
        "  int u_Count = bonesUB.u_Count;\n",
        "  out.position = (bonesUB.u_Bones[(u_Count - 1)] * float4(float3(*(device const packed_float3*)(a_Pos + vertexId * 16)), 1.0));\n",
    ] {
        assert!(src.contains(snippet), "missing {snippet:?} in:\n{src}");
    }
    assert!(!src.contains("struct Buffer0"));
    assert!(!src.contains("float4x4 u_Bones ="));
}

#[test]
fn lone_attribute_with_offset_reads_by_address() {
    let pos = Attribute::new("a_Pos", VarType::Float2, false, 0);
    let offset = Attribute::new("a_Offset", VarType::Float2, false, 1)
        .with_offset(8)
        .with_divisor(2);
    let vertex = ShaderBuilder::vertex(|b| {
        b.out(vec4([Expr::from(&pos) + &offset, Expr::from(0.0), Expr::from(1.0)]));
    });
    let fragment = ShaderBuilder::fragment(|b| b.out(rgba(1.0, 1.0, 1.0, 1.0)));
    let layouts = BufferLayouts::new(
        vec![VertexLayout::new(vec![pos]), VertexLayout::new(vec![offset])],
        vec![],
    );
    let shader = generate_msl(&Program::new("offset", vertex, fragment), &layouts).unwrap();
    let src = &shader.source;

    assert!(shader.inputs.buffers.iter().all(|b| b.shape == BufferShape::Single));
    for snippet in [
        "  device const packed_float2* a_Pos [[buffer(0)]],\n  device const uchar* a_Offset [[buffer(1)]]\n",
        "(float2(a_Pos[vertexId]) + float2(*(device const packed_float2*)(a_Offset + (instanceId / 2) * 16 + 8)))",
    ] {
        assert!(src.contains(snippet), "missing {snippet:?} in:\n{src}");
    }
    assert!(!src.contains("struct Buffer"));
}

#[test]
fn instanced_attributes_index_by_instance() {
    let pos = Attribute::new("a_Pos", VarType::Float2, false, 0);
    let offset = Attribute::new("a_Offset", VarType::Float2, false, 1).with_divisor(1);
    let vertex = ShaderBuilder::vertex(|b| {
        b.out(vec4([Expr::from(&pos) + &offset, Expr::from(0.0), Expr::from(1.0)]));
    });
    let fragment = ShaderBuilder::fragment(|b| b.out(rgba(1.0, 1.0, 1.0, 1.0)));
    let layouts = BufferLayouts::new(
        vec![VertexLayout::new(vec![pos]), VertexLayout::new(vec![offset])],
        vec![],
    );
    let shader = generate_msl(&Program::new("instanced", vertex, fragment), &layouts).unwrap();

    assert!(shader.source.contains(
        "  uint vertexId [[vertex_id]],\n  uint instanceId [[instance_id]],\n  device const packed_float2* a_Pos [[buffer(0)]],\n  device const packed_float2* a_Offset [[buffer(1)]]\n"
    ));
    assert!(shader
        .source
        .contains("(float2(a_Pos[vertexId]) + float2(a_Offset[instanceId]))"));
    assert!(shader.inputs.uses_instancing());
}

#[test]
fn helpers_samplers_loops_and_discard() {
    let v_uv = Varying::new("v_Uv", VarType::Float2);
    let tex = Sampler::new("u_Tex", 0, SamplerType::Sampler2D);
    let vertex = ShaderBuilder::vertex(|b| {
        b.out(rgba(0.0, 0.0, 0.0, 1.0));
        b.set(&v_uv, gpu_shader::builder::vec2([Expr::from(0.0), Expr::from(0.0)]));
    });

    let mut b = ShaderBuilder::new();
    let scale = b.func(
        "scale",
        VarType::Float4,
        &[("c", VarType::Float4), ("k", VarType::Float1)],
        |f, args| f.ret(args[0].clone() * args[1].clone()),
    );
    let acc = b.temp(VarType::Float1);
    b.set(acc, 0.0);
    b.for_range(0, 4, |b, i| b.set(acc, Expr::from(acc) + float(i)));
    b.if_(Expr::from(acc).lt(1.0), |b| b.discard());
    b.out(call(&scale, [texture2d(&tex, &v_uv), Expr::from(acc)]));
    let fragment = b.build(ShaderStage::Fragment);

    let shader = generate_msl(&Program::new("textured", vertex, fragment), &BufferLayouts::default()).unwrap();
    let src = &shader.source;
    for snippet in [
        "\nfloat4 scale(float4 c, float k) {\n  return (c * k);\n}\n",
        "  VertexOut in [[stage_in]],\n  texture2d<float> u_Tex [[texture(0)]],\n  sampler u_TexSampler [[sampler(0)]]\n) {\n",
        "  float4 out;\n  float temp3;\n  temp3 = 0.0;\n",
        "  for (int temp4 = 0; temp4 < 4; temp4++) {\n    temp3 = (temp3 + float(temp4));\n  }\n",
        "  if (temp3 < 1.0) {\n    discard_fragment();\n  }\n",
        "  out = scale(u_Tex.sample(u_TexSampler, in.v_Uv), temp3);\n",
    ] {
        assert!(src.contains(snippet), "missing {snippet:?} in:\n{src}");
    }
    assert_eq!(shader.samplers, vec![tex]);
}

#[test]
fn custom_entry_names() {
    let (program, layouts) = minimal();
    let options = MslOptions {
        vertex_entry: "vs_main".to_owned(),
        fragment_entry: "fs_main".to_owned(),
        vertex_out_struct: "Interp".to_owned(),
        vertex_id: "vid".to_owned(),
        ..MslOptions::default()
    };
    let shader = generate_msl_with_options(&program, &layouts, &options).unwrap();
    assert!(shader.source.contains("vertex Interp vs_main(\n  uint vid [[vertex_id]],"));
    assert!(shader.source.contains("a_Pos[vid]"));
    assert!(shader.source.contains("fragment float4 fs_main(\n  Interp in [[stage_in]]"));
    assert_eq!(shader.vertex_entry, "vs_main");
}

#[test]
fn empty_groups_are_skipped() {
    init_tracing();
    let (program, mut layouts) = minimal();
    layouts.vertex.insert(0, VertexLayout::new(vec![]));
    layouts
        .uniform_blocks
        .insert(0, Arc::new(UniformBlockBuilder::new(BlockId(7), "EmptyUB", 3).build()));
    let with_empty = generate_msl(&program, &layouts).unwrap();
    let (_, plain) = minimal();
    assert_eq!(with_empty.source, generate_msl(&program, &plain).unwrap().source);
}

#[test]
fn stage_rule_violations_are_errors() {
    let pos = Attribute::new("a_Pos", VarType::Float4, false, 0);
    let layouts = BufferLayouts::new(vec![VertexLayout::new(vec![pos.clone()])], vec![]);
    let vertex = ShaderBuilder::vertex(|b| b.out(&pos));

    let reads_attribute = ShaderBuilder::fragment(|b| b.out(&pos));
    assert_eq!(
        generate_msl(&Program::new("p", vertex.clone(), reads_attribute), &layouts),
        Err(MslError::AttributeInFragment {
            name: "a_Pos".to_owned()
        })
    );

    let discards = ShaderBuilder::vertex(|b| {
        b.out(&pos);
        b.discard();
    });
    let solid = ShaderBuilder::fragment(|b| b.out(rgba(1.0, 1.0, 1.0, 1.0)));
    assert_eq!(
        generate_msl(&Program::new("p", discards, solid.clone()), &layouts),
        Err(MslError::DiscardOutsideFragment)
    );

    let returns = ShaderBuilder::fragment(|b| b.ret(1.0));
    assert_eq!(
        generate_msl(&Program::new("p", vertex.clone(), returns), &layouts),
        Err(MslError::InvalidReturn)
    );

    let bad_sample = ShaderBuilder::fragment(|b| b.out(texture2d(1.0, 2.0)));
    assert_eq!(
        generate_msl(&Program::new("p", vertex.clone(), bad_sample), &layouts),
        Err(MslError::InvalidSamplerArgument {
            function: "texture2D".to_owned()
        })
    );

    let m = Varying::new("v_Mat", VarType::Mat4);
    let matrix_varying = ShaderBuilder::vertex(|b| {
        b.out(&pos);
        b.set(&m, gpu_shader::builder::mat4([Expr::from(1.0)]));
    });
    assert_eq!(
        generate_msl(&Program::new("p", matrix_varying, solid.clone()), &layouts),
        Err(MslError::UnsupportedType {
            variable: "v_Mat".to_owned(),
            ty: VarType::Mat4
        })
    );

    let unbound = Attribute::new("a_Missing", VarType::Float4, false, 1);
    let reads_unbound = ShaderBuilder::vertex(|b| b.out(Expr::from(&pos) + &unbound));
    assert_eq!(
        generate_msl(&Program::new("p", reads_unbound, solid.clone()), &layouts),
        Err(MslError::UnboundAttribute {
            name: "a_Missing".to_owned()
        })
    );

    let mut ub = UniformBlockBuilder::new(BlockId(0), "TintUB", 0);
    let tint = ub.vec4("u_Tint");
    let reads_uniform = ShaderBuilder::fragment(|b| b.out(&tint));
    assert_eq!(
        generate_msl(&Program::new("p", vertex.clone(), reads_uniform), &layouts),
        Err(MslError::UnboundUniform {
            name: "u_Tint".to_owned()
        })
    );
}

#[test]
fn helpers_must_not_read_stage_inputs() {
    let mut ub = UniformBlockBuilder::new(BlockId(0), "TintUB", 0);
    let tint = ub.vec4("u_Tint");
    let block = Arc::new(ub.build());

    let mut b = ShaderBuilder::new();
    let tint_for_helper = tint.clone();
    let helper = b.func("tinted", VarType::Float4, &[], move |f, _| f.ret(&tint_for_helper));
    b.out(call(&helper, []));
    let fragment = b.build(ShaderStage::Fragment);
    let vertex = ShaderBuilder::vertex(|b| b.out(rgba(0.0, 0.0, 0.0, 1.0)));

    assert_eq!(
        generate_msl(
            &Program::new("p", vertex, fragment),
            &BufferLayouts::new(vec![], vec![block])
        ),
        Err(MslError::StageInputInFunction {
            function: "tinted".to_owned(),
            variable: "u_Tint".to_owned()
        })
    );
}
