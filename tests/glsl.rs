//! End-to-end checks of the GLSL output.

mod common;

use glaive::back::glsl;

fn options(version: glsl::Version, stage: glaive::ShaderStage, entry: &str) -> glsl::Options {
    glsl::Options {
        version,
        shader_stage: stage,
        entry_point: String::from(entry),
        binding_bases: glsl::BindingBases::default(),
        force_highp: false,
    }
}

#[test]
fn triangle_es300() {
    let module = common::triangle_module();
    let (output, info) = glsl::write_string(
        &module,
        &options(
            glsl::Version::Embedded(300),
            glaive::ShaderStage::Vertex,
            "vs_main",
        ),
    )
    .unwrap();

    assert!(output.starts_with("#version 300 es"));
    assert!(output.contains("precision highp float;"));
    assert!(output.contains("gl_Position"));
    assert!(output.contains("gl_VertexID"));
    assert_eq!(info.entry_point_names["vs_main"], "main");
}

#[test]
fn combined_texture_sampler() {
    let module = common::uniform_texture_module();
    let (output, info) = glsl::write_string(
        &module,
        &options(
            glsl::Version::Desktop(450),
            glaive::ShaderStage::Fragment,
            "fs_main",
        ),
    )
    .unwrap();

    // the uniform struct becomes a named block
    assert!(output.contains("uniform _Uniforms_ubo {"), "{}", output);
    // one combined resource per (texture, sampler) pair
    assert!(output.contains("uniform sampler2D tex_samp;"), "{}", output);
    // the sample site uses the combined name
    assert!(output.contains("texture(tex_samp, "), "{}", output);
    assert!(info.texture_mapping.contains_key("tex_samp"));
    let mapping = &info.texture_mapping["tex_samp"];
    assert!(mapping.sampler.is_some());
}

#[test]
fn no_gl_prefix_on_user_identifiers() {
    let mut module = common::uniform_texture_module();
    // a user identifier with the reserved prefix must be escaped
    let tex = module
        .global_variables
        .iter()
        .find(|&(_, var)| var.name.as_deref() == Some("tex"))
        .map(|(handle, _)| handle)
        .unwrap();
    module.global_variables[tex].name = Some(String::from("gl_weird"));

    let (output, _) = glsl::write_string(
        &module,
        &options(
            glsl::Version::Desktop(450),
            glaive::ShaderStage::Fragment,
            "fs_main",
        ),
    )
    .unwrap();

    assert!(output.contains("_gl_weird"));
    // every occurrence of the user name carries the escaping underscore
    for (index, _) in output.match_indices("gl_weird") {
        assert_eq!(&output[index - 1..index], "_", "unescaped gl_ identifier");
    }
}

#[test]
fn unknown_entry_point_is_reported() {
    let module = common::triangle_module();
    let result = glsl::write_string(
        &module,
        &options(
            glsl::Version::Desktop(450),
            glaive::ShaderStage::Vertex,
            "missing",
        ),
    );
    match result {
        Err(glsl::Error::EntryPointNotFound(ref name)) => assert_eq!(name, "missing"),
        other => panic!("expected EntryPointNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unsupported_version_is_reported() {
    let module = common::triangle_module();
    let result = glsl::write_string(
        &module,
        &options(
            glsl::Version::Desktop(150),
            glaive::ShaderStage::Vertex,
            "vs_main",
        ),
    );
    assert!(matches!(result, Err(glsl::Error::VersionNotSupported(_))));
}

#[test]
fn guarded_integer_division() {
    let module = common::int_ops_module();
    let (output, _) = glsl::write_string(
        &module,
        &options(
            glsl::Version::Desktop(430),
            glaive::ShaderStage::Compute,
            "cs_main",
        ),
    )
    .unwrap();

    assert!(
        output.contains("int _glaive_div(int a, int b)"),
        "{}",
        output
    );
    assert!(
        output.contains("ivec4 _glaive_div(ivec4 a, ivec4 b)"),
        "{}",
        output
    );
    assert!(output.contains("_glaive_div("), "{}", output);
}

#[test]
fn deferred_call_inits() {
    let module = common::two_call_results_module();
    let (output, _) = glsl::write_string(
        &module,
        &options(
            glsl::Version::Desktop(430),
            glaive::ShaderStage::Compute,
            "cs_main",
        ),
    )
    .unwrap();
    // both calls happen, and the local receives its initializer afterwards
    let first_call = output.find("span(").expect("first call missing");
    let second_call = output[first_call + 1..]
        .find("span(")
        .expect("second call missing");
    let assign = output.rfind("count = ").expect("initializer store missing");
    assert!(assign > first_call + second_call);
}
