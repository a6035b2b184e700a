//! End-to-end checks of the HLSL output.

mod common;

use glaive::back::hlsl;

fn write(module: &glaive::Module) -> (String, hlsl::ReflectionInfo) {
    hlsl::write_string(module, &hlsl::Options::default()).unwrap()
}

#[test]
fn triangle_vertex() {
    let (output, info) = write(&common::triangle_module());

    assert!(output.contains("SV_VertexID"), "{}", output);
    assert!(output.contains(": SV_Position"), "{}", output);
    // the array literal uses initializer-list syntax
    assert!(output.contains("{"), "{}", output);
    assert!(output.contains("float positions[3] = { 0.0, 0.5, 1.0 };"), "{}", output);
    assert!(output.contains("return float4("), "{}", output);
    assert_eq!(info.entry_point_names["vs_main"], "vs_main");
}

#[test]
fn struct_argument_flattening() {
    let (output, _) = write(&common::vertex_struct_io_module());

    assert!(output.contains("struct vs_main_Input {"), "{}", output);
    assert!(output.contains("float2 pos : TEXCOORD0;"), "{}", output);
    assert!(output.contains("float4 col : TEXCOORD1;"), "{}", output);
    assert!(output.contains("vs_main(vs_main_Input _input)"), "{}", output);
    assert!(output.contains("VertexInput input;"), "{}", output);
    assert!(output.contains("input.pos = _input.pos;"), "{}", output);
    assert!(output.contains("input.col = _input.col;"), "{}", output);
}

#[test]
fn fragment_location_output() {
    let (output, _) = write(&common::fragment_if_else_module());
    assert!(output.contains("SV_Target0"), "{}", output);
}

#[test]
fn compute_numthreads() {
    let (output, _) = write(&common::compute_atomic_module());
    let numthreads = output
        .find("[numthreads(64, 1, 1)]")
        .expect("missing numthreads");
    let entry = output.find("void cs_main(").expect("missing entry point");
    assert!(numthreads < entry, "numthreads must precede the entry point");
    assert!(output.contains("InterlockedAdd"), "{}", output);
}

#[test]
fn uniform_texture_resources() {
    let (output, info) = write(&common::uniform_texture_module());

    assert!(output.contains("cbuffer _Uniforms_cbuffer"), "{}", output);
    assert!(output.contains("Texture2D<float4> tex"), "{}", output);
    assert!(output.contains("SamplerState samp"), "{}", output);
    // matrix multiplication goes through `mul` with reversed arguments
    assert!(output.contains("mul("), "{}", output);
    assert!(output.contains(".Sample(samp, "), "{}", output);
    assert_eq!(info.resource_registers.len(), 3);
}

#[test]
fn header_names_shader_model() {
    let (output, _) = write(&common::triangle_module());
    assert!(output.starts_with("// language: HLSL"), "{}", output);
    assert!(output.contains("5.1"), "{}", output);
}

#[test]
fn guarded_integer_division() {
    let (output, info) = write(&common::int_ops_module());

    assert!(
        output.contains("int _glaive_div(int a, int b)"),
        "{}",
        output
    );
    assert!(
        output.contains("int4 _glaive_div(int4 a, int4 b)"),
        "{}",
        output
    );
    assert!(output.contains("_glaive_div("), "{}", output);
    assert!(info
        .helpers_emitted
        .contains(&String::from("_glaive_div")));
}

#[test]
fn deferred_call_inits() {
    let (output, _) = write(&common::two_call_results_module());
    let assign = output.rfind("count = ").expect("initializer store missing");
    let call = output.find("span(").expect("call missing");
    assert!(assign > call);
}
