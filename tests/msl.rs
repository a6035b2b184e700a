//! End-to-end checks of the MSL output.

mod common;

use glaive::back::msl;

fn write(module: &glaive::Module) -> (String, msl::TranslationInfo) {
    msl::write_string(module, &msl::Options::default()).unwrap()
}

#[test]
fn preamble_and_entry_point() {
    let (output, info) = write(&common::triangle_module());

    assert!(output.starts_with("#include <metal_stdlib>"), "{}", output);
    assert!(output.contains("using namespace metal;"), "{}", output);
    assert!(output.contains("vertex "), "{}", output);
    assert!(output.contains("[[vertex_id]]"), "{}", output);
    assert_eq!(info.entry_point_names, vec![String::from("vs_main")]);
}

#[test]
fn vertex_struct_io() {
    let (output, _) = write(&common::vertex_struct_io_module());

    assert!(output.contains("struct vs_mainInput {"), "{}", output);
    assert!(output.contains("[[attribute(0)]]"), "{}", output);
    assert!(output.contains("[[attribute(1)]]"), "{}", output);
    assert!(output.contains("[[stage_in]]"), "{}", output);
}

#[test]
fn fragment_resources() {
    let mut options = msl::Options::default();
    options.binding_map.insert(
        msl::BindSource {
            stage: glaive::ShaderStage::Fragment,
            group: 0,
            binding: 0,
        },
        msl::BindTarget {
            buffer: Some(0),
            texture: None,
            sampler: None,
            mutable: false,
        },
    );
    options.binding_map.insert(
        msl::BindSource {
            stage: glaive::ShaderStage::Fragment,
            group: 0,
            binding: 1,
        },
        msl::BindTarget {
            buffer: None,
            texture: Some(0),
            sampler: None,
            mutable: false,
        },
    );
    options.binding_map.insert(
        msl::BindSource {
            stage: glaive::ShaderStage::Fragment,
            group: 0,
            binding: 2,
        },
        msl::BindTarget {
            buffer: None,
            texture: None,
            sampler: Some(0),
            mutable: false,
        },
    );

    let module = common::uniform_texture_module();
    let (output, _) = msl::write_string(&module, &options).unwrap();

    assert!(output.contains("[[buffer(0)]]"), "{}", output);
    assert!(output.contains("[[texture(0)]]"), "{}", output);
    assert!(output.contains("[[sampler(0)]]"), "{}", output);
    assert!(output.contains("constant Uniforms& uniforms"), "{}", output);
    assert!(output.contains(".sample(samp, "), "{}", output);
    assert!(output.contains("fragment "), "{}", output);
}

#[test]
fn inline_sampler_override() {
    let mut options = msl::Options::default();
    options.inline_samplers.insert(
        msl::BindSource {
            stage: glaive::ShaderStage::Fragment,
            group: 0,
            binding: 2,
        },
        msl::sampler::InlineSampler {
            mag_filter: msl::sampler::Filter::Linear,
            min_filter: msl::sampler::Filter::Linear,
            ..Default::default()
        },
    );

    let module = common::uniform_texture_module();
    let (output, _) = msl::write_string(&module, &options).unwrap();

    assert!(output.contains("constexpr sampler samp("), "{}", output);
    assert!(output.contains("mag_filter::linear"), "{}", output);
}

#[test]
fn compute_kernel() {
    let (output, _) = write(&common::compute_atomic_module());
    assert!(output.contains("kernel void cs_main("), "{}", output);
    assert!(output.contains("atomic_fetch_add_explicit(&counter, 1u"), "{}", output);
}

#[test]
fn guarded_integer_division() {
    let (output, _) = write(&common::int_ops_module());

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
}

#[test]
fn deferred_call_inits() {
    let (output, _) = write(&common::two_call_results_module());
    let assign = output.rfind("count = ").expect("initializer store missing");
    let call = output.find("span(").expect("call missing");
    assert!(assign > call);
}
