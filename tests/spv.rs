//! End-to-end checks of the SPIR-V binary emission.

mod common;

use glaive::back::spv;

// A few words of SPIR-V vocabulary, to keep the checks independent from the
// writer's own tables.
const OP_ENTRY_POINT: u16 = 15;
const OP_EXECUTION_MODE: u16 = 16;
const OP_VARIABLE: u16 = 59;
const OP_DECORATE: u16 = 71;
const OP_FUNCTION_CALL: u16 = 57;
const OP_STORE: u16 = 62;
const OP_COMPOSITE_CONSTRUCT: u16 = 80;
const OP_I_MUL: u16 = 132;
const OP_S_DIV: u16 = 135;
const OP_VECTOR_TIMES_SCALAR: u16 = 142;
const OP_F_MUL: u16 = 133;
const OP_LABEL: u16 = 248;
const OP_BRANCH: u16 = 249;
const OP_BRANCH_CONDITIONAL: u16 = 250;
const OP_SWITCH: u16 = 251;
const OP_KILL: u16 = 252;
const OP_RETURN: u16 = 253;
const OP_RETURN_VALUE: u16 = 254;
const OP_UNREACHABLE: u16 = 255;
const OP_SELECTION_MERGE: u16 = 247;
const OP_LOOP_MERGE: u16 = 246;
const OP_ATOMIC_I_ADD: u16 = 234;

const DECORATION_BUILT_IN: u32 = 11;
const BUILT_IN_POSITION: u32 = 0;
const BUILT_IN_VERTEX_INDEX: u32 = 42;
const STORAGE_CLASS_INPUT: u32 = 1;
const STORAGE_CLASS_OUTPUT: u32 = 3;
const STORAGE_CLASS_FUNCTION: u32 = 7;
const EXECUTION_MODEL_VERTEX: u32 = 0;
const EXECUTION_MODE_LOCAL_SIZE: u32 = 17;

struct Inst {
    op: u16,
    operands: Vec<u32>,
}

fn parse(words: &[u32]) -> Vec<Inst> {
    assert!(words.len() >= 5, "missing header");
    let mut instructions = Vec::new();
    let mut index = 5;
    while index < words.len() {
        let word = words[index];
        let word_count = (word >> 16) as usize;
        let op = word as u16;
        assert!(word_count > 0, "zero-length instruction");
        assert!(index + word_count <= words.len(), "truncated instruction");
        instructions.push(Inst {
            op,
            operands: words[index + 1..index + word_count].to_vec(),
        });
        index += word_count;
    }
    instructions
}

fn write(module: &glaive::Module) -> Vec<u32> {
    spv::write_vec(module, &spv::Options::default()).unwrap()
}

fn count_ops(instructions: &[Inst], op: u16) -> usize {
    instructions.iter().filter(|inst| inst.op == op).count()
}

#[test]
fn header_layout() {
    let words = write(&common::triangle_module());
    // magic, little-endian
    let bytes = words[0].to_le_bytes();
    assert_eq!(bytes, [0x03, 0x02, 0x23, 0x07]);
    // version 1.0
    assert_eq!(words[1], 1 << 16);
    // generator
    assert_eq!(words[2], 0);
    // bound
    assert!(words[3] > 0);
    // schema
    assert_eq!(words[4], 0);
    // the word stream parses to completion
    let _ = parse(&words);
}

#[test]
fn determinism() {
    let module = common::uniform_texture_module();
    let first = write(&module);
    let second = write(&module);
    assert_eq!(first, second);
}

#[test]
fn triangle_interface() {
    let words = write(&common::triangle_module());
    let instructions = parse(&words);

    let entry = instructions
        .iter()
        .find(|inst| inst.op == OP_ENTRY_POINT)
        .expect("missing OpEntryPoint");
    assert_eq!(entry.operands[0], EXECUTION_MODEL_VERTEX);

    // Builtin duality: VertexIndex decorates an Input variable, Position an
    // Output variable.
    let find_decorated = |built_in: u32| -> u32 {
        instructions
            .iter()
            .find(|inst| {
                inst.op == OP_DECORATE
                    && inst.operands.get(1) == Some(&DECORATION_BUILT_IN)
                    && inst.operands.get(2) == Some(&built_in)
            })
            .map(|inst| inst.operands[0])
            .expect("missing builtin decoration")
    };
    let index_var = find_decorated(BUILT_IN_VERTEX_INDEX);
    let position_var = find_decorated(BUILT_IN_POSITION);

    let class_of = |id: u32| -> u32 {
        instructions
            .iter()
            .find(|inst| inst.op == OP_VARIABLE && inst.operands.get(1) == Some(&id))
            .map(|inst| inst.operands[2])
            .expect("missing variable")
    };
    assert_eq!(class_of(index_var), STORAGE_CLASS_INPUT);
    assert_eq!(class_of(position_var), STORAGE_CLASS_OUTPUT);
}

#[test]
fn structured_control_flow() {
    let words = write(&common::fragment_if_else_module());
    let instructions = parse(&words);

    // every conditional branch is preceded by a merge instruction
    for (index, inst) in instructions.iter().enumerate() {
        if inst.op == OP_BRANCH_CONDITIONAL || inst.op == OP_SWITCH {
            let prev = &instructions[index - 1];
            assert!(
                prev.op == OP_SELECTION_MERGE || prev.op == OP_LOOP_MERGE,
                "conditional branch without a merge"
            );
        }
    }

    // every branch target is a declared label
    let labels: Vec<u32> = instructions
        .iter()
        .filter(|inst| inst.op == OP_LABEL)
        .map(|inst| inst.operands[0])
        .collect();
    for inst in instructions.iter() {
        let targets: &[u32] = match inst.op {
            OP_BRANCH => &inst.operands[..1],
            OP_BRANCH_CONDITIONAL => &inst.operands[1..3],
            _ => continue,
        };
        for target in targets {
            assert!(labels.contains(target), "branch to an unknown label");
        }
    }

    // no instruction follows a terminator within a block
    let mut terminated = false;
    for inst in instructions.iter() {
        match inst.op {
            OP_LABEL => terminated = false,
            _ if terminated => {
                // only new functions/labels may follow; anything else would
                // be unreachable code inside a block
                assert!(
                    inst.op != OP_STORE && inst.op != OP_BRANCH,
                    "instruction after a terminator"
                );
            }
            OP_BRANCH | OP_BRANCH_CONDITIONAL | OP_SWITCH | OP_RETURN | OP_RETURN_VALUE
            | OP_KILL | OP_UNREACHABLE => terminated = true,
            _ => {}
        }
    }
}

#[test]
fn compute_atomics() {
    let words = write(&common::compute_atomic_module());
    let instructions = parse(&words);

    assert_eq!(count_ops(&instructions, OP_ATOMIC_I_ADD), 1);

    let mode = instructions
        .iter()
        .find(|inst| inst.op == OP_EXECUTION_MODE)
        .expect("missing OpExecutionMode");
    assert_eq!(mode.operands[1], EXECUTION_MODE_LOCAL_SIZE);
    assert_eq!(&mode.operands[2..5], &[64, 1, 1]);
}

#[test]
fn vector_times_scalar_selection() {
    let words = write(&common::vector_times_scalar_module());
    let instructions = parse(&words);
    assert_eq!(count_ops(&instructions, OP_VECTOR_TIMES_SCALAR), 1);
    assert_eq!(count_ops(&instructions, OP_F_MUL), 0);
}

#[test]
fn integer_vector_arithmetic() {
    let words = write(&common::int_ops_module());
    let instructions = parse(&words);

    // an integer `vec * scalar` broadcasts the scalar and uses a plain
    // multiply; `OpVectorTimesScalar` is float-only
    assert_eq!(count_ops(&instructions, OP_VECTOR_TIMES_SCALAR), 0);
    assert_eq!(count_ops(&instructions, OP_I_MUL), 1);
    assert!(count_ops(&instructions, OP_COMPOSITE_CONSTRUCT) >= 1);

    // the division goes through the guard function; the raw opcode only
    // appears once, inside the guard itself
    assert!(count_ops(&instructions, OP_FUNCTION_CALL) >= 1);
    assert_eq!(count_ops(&instructions, OP_S_DIV), 1);
}

#[test]
fn deferred_call_result_stores() {
    let words = write(&common::two_call_results_module());
    let instructions = parse(&words);

    assert_eq!(count_ops(&instructions, OP_FUNCTION_CALL), 2);

    // the only function-scope variable is `count`
    let local_id = instructions
        .iter()
        .find(|inst| {
            inst.op == OP_VARIABLE && inst.operands.get(2) == Some(&STORAGE_CLASS_FUNCTION)
        })
        .map(|inst| inst.operands[1])
        .expect("missing the local variable");

    // one store per call result, in IR-call order
    let stores: Vec<&Inst> = instructions
        .iter()
        .filter(|inst| inst.op == OP_STORE && inst.operands.first() == Some(&local_id))
        .collect();
    assert_eq!(stores.len(), 2);
}
