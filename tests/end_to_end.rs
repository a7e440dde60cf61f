use pretty_assertions::assert_eq;
use prism::spirv::spirv::{Decoration, ExecutionModel, Op, StorageClass};
use prism::spirv::test_utils::ModuleBuilder;
use prism::{
    load_targets_json, translate_all, translate_all_parallel, DriverError, Output, Target,
    TranslateError, TranslateOptions,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn header(b: &mut ModuleBuilder, model: ExecutionModel) {
    b.inst(Op::Capability, &[1]);
    b.inst_with_string(Op::ExtInstImport, &[1], "GLSL.std.450", &[]);
    b.inst(Op::MemoryModel, &[0, 1]);
    b.inst_with_string(Op::EntryPoint, &[model as u32, 4], "main", &[]);
}

/// A geometry shader that emits a single vertex. GLSL can express it; HLSL and Metal cannot.
fn geometry_module() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    header(&mut b, ExecutionModel::Geometry);
    b.inst(Op::TypeVoid, &[2]);
    b.inst(Op::TypeFunction, &[3, 2]);
    b.inst(Op::Function, &[2, 4, 0, 3]);
    b.inst(Op::Label, &[5]);
    b.inst(Op::EmitVertex, &[]);
    b.inst(Op::Return, &[]);
    b.inst(Op::FunctionEnd, &[]);
    b.to_bytes()
}

/// A fragment shader writing a constant colour.
fn solid_fragment() -> Vec<u8> {
    let output = StorageClass::Output as u32;
    let mut b = ModuleBuilder::new();
    header(&mut b, ExecutionModel::Fragment);
    b.inst_with_string(Op::Name, &[9], "color", &[]);
    b.inst(Op::Decorate, &[9, Decoration::Location as u32, 0]);
    b.inst(Op::TypeVoid, &[2]);
    b.inst(Op::TypeFunction, &[3, 2]);
    b.inst(Op::TypeFloat, &[6, 32]);
    b.inst(Op::TypeVector, &[7, 6, 4]);
    b.inst(Op::TypePointer, &[8, output, 7]);
    b.inst(Op::Variable, &[8, 9, output]);
    b.inst(Op::Constant, &[6, 10, 0.5f32.to_bits()]);
    b.inst(Op::ConstantComposite, &[7, 11, 10, 10, 10, 10]);
    b.inst(Op::Function, &[2, 4, 0, 3]);
    b.inst(Op::Label, &[5]);
    b.inst(Op::Store, &[9, 11]);
    b.inst(Op::Return, &[]);
    b.inst(Op::FunctionEnd, &[]);
    b.to_bytes()
}

const ALL_TARGETS: &str = r#"[
    {"lang": "glsl", "version": 330},
    {"lang": "glsl", "version": 100, "es": true},
    {"lang": "hlsl", "shader_model": 11},
    {"lang": "metal"},
    {"lang": "spirv"}
]"#;

#[test]
fn every_target_succeeds_for_a_plain_fragment_shader() -> anyhow::Result<()> {
    init_tracing();
    let bytes = solid_fragment();
    let targets = load_targets_json(ALL_TARGETS)?;
    let report = translate_all(&bytes, &targets, TranslateOptions::default())?;

    assert_eq!(report.results.len(), 5);
    assert_eq!(report.exit_code(), 0);

    let texts = report
        .succeeded()
        .filter_map(|(target, translation)| translation.text().map(|text| (target.name(), text)))
        .collect::<Vec<_>>();
    let expected_stores = [
        ("glsl", "\tcolor = vec4(0.5, 0.5, 0.5, 0.5);\n"),
        ("glsl", "\tgl_FragColor = vec4(0.5, 0.5, 0.5, 0.5);\n"),
        ("hlsl", "\tf_color = float4(0.5, 0.5, 0.5, 0.5);\n"),
        ("metal", "\tout.color = float4(0.5, 0.5, 0.5, 0.5);\n"),
    ];
    assert_eq!(texts.len(), expected_stores.len());
    for ((name, text), (expected_name, store)) in texts.into_iter().zip(expected_stores) {
        assert_eq!(name, expected_name);
        assert!(text.contains(store), "{name}:\n{text}");
    }

    let (_, passthrough) = report
        .succeeded()
        .find(|(target, _)| **target == Target::SpirV)
        .expect("spirv result");
    assert_eq!(passthrough.output, Output::Binary(bytes));
    Ok(())
}

#[test]
fn failing_targets_are_listed_and_successes_kept() -> anyhow::Result<()> {
    init_tracing();
    let targets = load_targets_json(ALL_TARGETS)?;
    let report = translate_all(&geometry_module(), &targets, TranslateOptions::default())?;

    assert_eq!(report.exit_code(), 1);
    let failed = report
        .failed()
        .map(|(target, err)| {
            assert!(
                matches!(err, TranslateError::BackendLimitation { .. }),
                "{target}: {err:?}"
            );
            target.name()
        })
        .collect::<Vec<_>>();
    assert_eq!(failed, vec!["hlsl", "metal"]);

    let (_, glsl) = report.succeeded().next().expect("glsl result");
    assert!(glsl.text().unwrap().contains("\tEmitVertex();\n"));
    assert_eq!(report.succeeded().count(), 3);
    Ok(())
}

#[test]
fn parallel_batch_matches_sequential_batch() -> anyhow::Result<()> {
    let targets = load_targets_json(ALL_TARGETS)?;
    for bytes in [solid_fragment(), geometry_module()] {
        let sequential = translate_all(&bytes, &targets, TranslateOptions::default())?;
        let parallel = translate_all_parallel(&bytes, &targets, TranslateOptions::default())?;
        assert_eq!(sequential.results.len(), parallel.results.len());
        for (a, b) in sequential.results.iter().zip(&parallel.results) {
            assert_eq!(a.target, b.target);
            match (&a.result, &b.result) {
                (Ok(a), Ok(b)) => assert_eq!(a.output, b.output),
                (Err(a), Err(b)) => assert_eq!(a, b),
                _ => panic!("{} differs between sequential and parallel runs", a.target),
            }
        }
    }
    Ok(())
}

#[test]
fn undecodable_input_aborts_the_batch() {
    let targets = vec![Target::SpirV];
    let err = translate_all(&[0u8; 12], &targets, TranslateOptions::default()).unwrap_err();
    assert!(matches!(err, DriverError::Decode(_)), "{err}");
}
