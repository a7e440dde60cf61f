mod common;

use prism_spirv::spirv::Op;
use prism_translate::{
    translate, DiagnosticKind, GlslOptions, HlslOptions, MetalOptions, Target, TranslateError,
    TranslateOptions,
};

fn targets() -> [Target; 3] {
    [
        Target::Glsl(GlslOptions::default()),
        Target::Hlsl(HlslOptions::default()),
        Target::Metal(MetalOptions::default()),
    ]
}

#[test]
fn selection_becomes_if_else() {
    let bytes = common::branching_fragment(|_| {});
    let translation = translate(
        &bytes,
        &Target::Glsl(GlslOptions::default()),
        TranslateOptions::default(),
    )
    .unwrap();
    let text = translation.text().unwrap();

    assert!(
        text.contains(
            "void main() {\n\
             \tif (x > 0.0) {\n\
             \t\tcolor = vec4(1.0, 1.0, 1.0, 1.0);\n\
             \t} else {\n\
             \t\tcolor = vec4(0.0, 0.0, 0.0, 0.0);\n\
             \t}\n\
             \treturn;\n\
             }\n"
        ),
        "{text}"
    );
}

#[test]
fn loop_becomes_while_true_with_break() {
    let translation = translate(
        &common::counting_loop(),
        &Target::Glsl(GlslOptions::default()),
        TranslateOptions::default(),
    )
    .unwrap();
    let text = translation.text().unwrap();

    assert!(
        text.contains(
            "\twhile (true) {\n\
             \t\tif (!(i < 4)) break;\n\
             \t\ti = (i + 1);\n\
             \t}\n\
             \treturn;\n"
        ),
        "{text}"
    );
    assert!(text.contains("\ti = 0;\n"), "{text}");
}

fn glsl_text(bytes: &[u8]) -> String {
    common::init_tracing();
    translate(bytes, &Target::Glsl(GlslOptions::default()), TranslateOptions::default())
        .unwrap()
        .text()
        .unwrap()
        .to_owned()
}

#[test]
fn loop_phi_values_are_read_before_the_back_edge_copy() {
    let text = glsl_text(&common::do_while_loop());

    // The exit test and the value read after the loop both see the incremented counter,
    // computed once per iteration before the phi is reassigned.
    assert!(
        text.contains(
            "void main() {\n\
             \tint _30;\n\
             \tint _21;\n\
             \tbool _18;\n\
             \tfloat _40;\n\
             \tvec4 _41;\n\
             \t_30 = 0;\n\
             \twhile (true) {\n\
             \t\t_21 = (_30 + 1);\n\
             \t\t_18 = (_21 < 4);\n\
             \t\t_30 = _21;\n\
             \t\tif (!(_18)) break;\n\
             \t}\n\
             \t_40 = float(_21);\n\
             \t_41 = vec4(_40, _40, _40, _40);\n\
             \tcolor = _41;\n\
             \treturn;\n\
             }\n"
        ),
        "{text}"
    );
}

#[test]
fn phi_copies_on_one_edge_happen_in_parallel() {
    let text = glsl_text(&common::swapping_loop());

    assert!(
        text.contains(
            "\t_30 = 1.0;\n\
             \t_31 = 2.0;\n\
             \t_32 = 0;\n\
             \t_33 = true;\n\
             \twhile (true) {\n\
             \t\t_21 = (_32 + 1);\n\
             \t\t_18 = (_21 < 4);\n\
             \t\tbool _c13 = _33;\n\
             \t\tfloat _31_13 = _30;\n\
             \t\t_30 = _31;\n\
             \t\t_31 = _31_13;\n\
             \t\t_32 = _21;\n\
             \t\t_33 = _18;\n\
             \t\tif (!(_c13)) break;\n\
             \t}\n\
             \t_42 = vec4(_30, _31, 0.0, 1.0);\n\
             \tcolor = _42;\n"
        ),
        "{text}"
    );
}

#[test]
fn nested_selections_close_in_order() {
    let text = glsl_text(&common::nested_selection());

    assert!(
        text.contains(
            "\tif (x > 0.0) {\n\
             \t\tif (x > 1.0) {\n\
             \t\t\tcolor = vec4(1.0, 1.0, 1.0, 1.0);\n\
             \t\t}\n\
             \t}\n\
             \treturn;\n\
             }\n"
        ),
        "{text}"
    );
}

#[test]
fn returning_arm_keeps_the_else_branch() {
    let text = glsl_text(&common::early_return());

    assert!(
        text.contains(
            "\tif (x > 0.0) {\n\
             \t\tcolor = vec4(1.0, 1.0, 1.0, 1.0);\n\
             \t\treturn;\n\
             \t} else {\n\
             \t\tcolor = vec4(0.0, 0.0, 0.0, 0.0);\n\
             \t}\n\
             \treturn;\n\
             }\n"
        ),
        "{text}"
    );
}

#[test]
fn result_id_beyond_the_bound_is_corrupt() {
    for target in targets() {
        let err = translate(&common::id_past_bound(), &target, TranslateOptions::default())
            .unwrap_err();
        assert!(
            matches!(err, TranslateError::CorruptModule { id: 16, .. }),
            "{target}: {err:?}"
        );
    }
}

#[test]
fn braces_balance_for_every_target() {
    for bytes in [
        common::branching_fragment(|_| {}),
        common::counting_loop(),
        common::uv_fragment(),
        common::mvp_vertex(),
        common::do_while_loop(),
        common::swapping_loop(),
        common::nested_selection(),
        common::early_return(),
    ] {
        for target in targets() {
            let translation = translate(&bytes, &target, TranslateOptions::default())
                .unwrap_or_else(|err| panic!("{target}: {err}"));
            let text = translation.text().unwrap();
            assert!(common::braces_balanced(text), "{target}:\n{text}");
        }
    }
}

#[test]
fn switch_is_unsupported_control_flow() {
    let bytes = common::branching_fragment(|b| {
        b.inst(Op::SelectionMerge, &[41, 0]);
        b.inst(Op::Switch, &[13, 41]);
        b.inst(Op::Label, &[41]);
    });
    let err = translate(
        &bytes,
        &Target::Glsl(GlslOptions::default()),
        TranslateOptions::default(),
    )
    .unwrap_err();
    assert!(
        matches!(err, TranslateError::UnsupportedControlFlow { label: 22, .. }),
        "{err:?}"
    );
}

#[test]
fn unknown_opcode_leaves_a_placeholder_and_a_diagnostic() {
    common::init_tracing();
    let bytes = common::branching_fragment(|b| {
        b.raw(2000, &[]);
    });
    for target in targets() {
        let translation = translate(&bytes, &target, TranslateOptions::default()).unwrap();
        let text = translation.text().unwrap();
        assert!(text.contains("\t// Unknown operation 2000\n"), "{target}:\n{text}");
        let unsupported = translation
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UnsupportedOpcode)
            .collect::<Vec<_>>();
        assert_eq!(unsupported.len(), 1, "{target}");
        assert_eq!(unsupported[0].opcode.raw(), 2000);
    }
}

#[test]
fn unknown_extended_instruction_leaves_a_placeholder() {
    let bytes = common::branching_fragment(|b| {
        b.inst(Op::ExtInst, &[6, 42, 1, 200, 18]);
    });
    let translation = translate(
        &bytes,
        &Target::Glsl(GlslOptions::default()),
        TranslateOptions::default(),
    )
    .unwrap();
    let text = translation.text().unwrap();

    assert!(text.contains("\t// Unknown GLSL instruction 200\n"), "{text}");
    assert!(translation
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnsupportedExtendedInstruction(200)));
}
