use crate::back::spv::{helpers, Instruction};
use spirv::{Op, Word};

pub(super) enum Signedness {
    Unsigned = 0,
    Signed = 1,
}

//
// Debug Instructions
//

pub(super) fn instruction_source(
    source_language: spirv::SourceLanguage,
    version: u32,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Source);
    instruction.add_operand(source_language as u32);
    instruction.add_operands(helpers::bytes_to_words(&version.to_le_bytes()));
    instruction
}

pub(super) fn instruction_name(target_id: Word, name: &str) -> Instruction {
    let mut instruction = Instruction::new(Op::Name);
    instruction.add_operand(target_id);
    instruction.add_operands(helpers::string_to_words(name));
    instruction
}

pub(super) fn instruction_member_name(target_id: Word, member: Word, name: &str) -> Instruction {
    let mut instruction = Instruction::new(Op::MemberName);
    instruction.add_operand(target_id);
    instruction.add_operand(member);
    instruction.add_operands(helpers::string_to_words(name));
    instruction
}

//
// Annotation Instructions
//

pub(super) fn instruction_decorate(
    target_id: Word,
    decoration: spirv::Decoration,
    operands: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::Decorate);
    instruction.add_operand(target_id);
    instruction.add_operand(decoration as u32);

    for operand in operands {
        instruction.add_operand(*operand)
    }

    instruction
}

pub(super) fn instruction_member_decorate(
    target_id: Word,
    member_index: Word,
    decoration: spirv::Decoration,
    operands: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::MemberDecorate);
    instruction.add_operand(target_id);
    instruction.add_operand(member_index);
    instruction.add_operand(decoration as u32);

    for operand in operands {
        instruction.add_operand(*operand)
    }

    instruction
}

//
// Extension Instructions
//

pub(super) fn instruction_extension(name: &str) -> Instruction {
    let mut instruction = Instruction::new(Op::Extension);
    instruction.add_operands(helpers::string_to_words(name));
    instruction
}

pub(super) fn instruction_ext_inst_import(id: Word, name: &str) -> Instruction {
    let mut instruction = Instruction::new(Op::ExtInstImport);
    instruction.set_result(id);
    instruction.add_operands(helpers::string_to_words(name));
    instruction
}

pub(super) fn instruction_ext_inst(
    set_id: Word,
    op: spirv::GLOp,
    result_type_id: Word,
    id: Word,
    operands: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::ExtInst);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(set_id);
    instruction.add_operand(op as u32);

    for operand in operands {
        instruction.add_operand(*operand)
    }

    instruction
}

//
// Mode-Setting Instructions
//

pub(super) fn instruction_memory_model(
    addressing_model: spirv::AddressingModel,
    memory_model: spirv::MemoryModel,
) -> Instruction {
    let mut instruction = Instruction::new(Op::MemoryModel);
    instruction.add_operand(addressing_model as u32);
    instruction.add_operand(memory_model as u32);
    instruction
}

pub(super) fn instruction_entry_point(
    execution_model: spirv::ExecutionModel,
    entry_point_id: Word,
    name: &str,
    interface_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::EntryPoint);
    instruction.add_operand(execution_model as u32);
    instruction.add_operand(entry_point_id);
    instruction.add_operands(helpers::string_to_words(name));

    for interface_id in interface_ids {
        instruction.add_operand(*interface_id);
    }

    instruction
}

pub(super) fn instruction_execution_mode(
    entry_point_id: Word,
    execution_mode: spirv::ExecutionMode,
    args: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::ExecutionMode);
    instruction.add_operand(entry_point_id);
    instruction.add_operand(execution_mode as u32);
    for arg in args {
        instruction.add_operand(*arg);
    }
    instruction
}

pub(super) fn instruction_capability(capability: spirv::Capability) -> Instruction {
    let mut instruction = Instruction::new(Op::Capability);
    instruction.add_operand(capability as u32);
    instruction
}

//
// Type-Declaration Instructions
//

pub(super) fn instruction_type_void(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeVoid);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_bool(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeBool);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_int(id: Word, width: Word, signedness: Signedness) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeInt);
    instruction.set_result(id);
    instruction.add_operand(width);
    instruction.add_operand(signedness as u32);
    instruction
}

pub(super) fn instruction_type_float(id: Word, width: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeFloat);
    instruction.set_result(id);
    instruction.add_operand(width);
    instruction
}

pub(super) fn instruction_type_vector(
    id: Word,
    component_type_id: Word,
    component_count: crate::VectorSize,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeVector);
    instruction.set_result(id);
    instruction.add_operand(component_type_id);
    instruction.add_operand(component_count as u32);
    instruction
}

pub(super) fn instruction_type_matrix(
    id: Word,
    column_type_id: Word,
    column_count: crate::VectorSize,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeMatrix);
    instruction.set_result(id);
    instruction.add_operand(column_type_id);
    instruction.add_operand(column_count as u32);
    instruction
}

pub(super) fn instruction_type_image(
    id: Word,
    sampled_type_id: Word,
    dim: spirv::Dim,
    arrayed: bool,
    class: crate::ImageClass,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeImage);
    instruction.set_result(id);
    instruction.add_operand(sampled_type_id);
    instruction.add_operand(dim as u32);

    instruction.add_operand(match class {
        crate::ImageClass::Depth { .. } => 1,
        _ => 0,
    });
    instruction.add_operand(arrayed as u32);
    instruction.add_operand(match class {
        crate::ImageClass::Sampled { multi: true, .. }
        | crate::ImageClass::Depth { multi: true } => 1,
        _ => 0,
    });
    instruction.add_operand(match class {
        crate::ImageClass::Sampled { .. } | crate::ImageClass::Depth { .. } => 1,
        crate::ImageClass::Storage { .. } => 2,
    });

    let format = match class {
        crate::ImageClass::Storage { format, .. } => helpers::map_storage_format(format),
        _ => spirv::ImageFormat::Unknown,
    };

    instruction.add_operand(format as u32);
    instruction
}

pub(super) fn instruction_type_sampler(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeSampler);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_sampled_image(id: Word, image_type_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeSampledImage);
    instruction.set_result(id);
    instruction.add_operand(image_type_id);
    instruction
}

pub(super) fn instruction_type_array(
    id: Word,
    element_type_id: Word,
    length_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeArray);
    instruction.set_result(id);
    instruction.add_operand(element_type_id);
    instruction.add_operand(length_id);
    instruction
}

pub(super) fn instruction_type_runtime_array(id: Word, element_type_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeRuntimeArray);
    instruction.set_result(id);
    instruction.add_operand(element_type_id);
    instruction
}

pub(super) fn instruction_type_struct(id: Word, member_ids: &[Word]) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeStruct);
    instruction.set_result(id);

    for member_id in member_ids {
        instruction.add_operand(*member_id)
    }

    instruction
}

pub(super) fn instruction_type_pointer(
    id: Word,
    storage_class: spirv::StorageClass,
    type_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypePointer);
    instruction.set_result(id);
    instruction.add_operand(storage_class as u32);
    instruction.add_operand(type_id);
    instruction
}

pub(super) fn instruction_type_function(
    id: Word,
    return_type_id: Word,
    parameter_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::TypeFunction);
    instruction.set_result(id);
    instruction.add_operand(return_type_id);

    for parameter_id in parameter_ids {
        instruction.add_operand(*parameter_id);
    }

    instruction
}

//
// Constant-Creation Instructions
//

pub(super) fn instruction_constant_true(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantTrue);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_constant_false(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantFalse);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_constant(result_type_id: Word, id: Word, values: &[Word]) -> Instruction {
    let mut instruction = Instruction::new(Op::Constant);
    instruction.set_type(result_type_id);
    instruction.set_result(id);

    for value in values {
        instruction.add_operand(*value);
    }

    instruction
}

pub(super) fn instruction_constant_composite(
    result_type_id: Word,
    id: Word,
    constituent_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantComposite);
    instruction.set_type(result_type_id);
    instruction.set_result(id);

    for constituent_id in constituent_ids {
        instruction.add_operand(*constituent_id);
    }

    instruction
}

pub(super) fn instruction_constant_null(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ConstantNull);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

//
// Memory Instructions
//

pub(super) fn instruction_variable(
    result_type_id: Word,
    id: Word,
    storage_class: spirv::StorageClass,
    initializer_id: Option<Word>,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Variable);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(storage_class as u32);

    if let Some(initializer_id) = initializer_id {
        instruction.add_operand(initializer_id);
    }

    instruction
}

pub(super) fn instruction_load(
    result_type_id: Word,
    id: Word,
    pointer_id: Word,
    memory_access: Option<spirv::MemoryAccess>,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Load);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(pointer_id);

    instruction.add_operand(if let Some(memory_access) = memory_access {
        memory_access.bits()
    } else {
        spirv::MemoryAccess::NONE.bits()
    });

    instruction
}

pub(super) fn instruction_store(
    pointer_id: Word,
    object_id: Word,
    memory_access: Option<spirv::MemoryAccess>,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Store);
    instruction.add_operand(pointer_id);
    instruction.add_operand(object_id);

    instruction.add_operand(if let Some(memory_access) = memory_access {
        memory_access.bits()
    } else {
        spirv::MemoryAccess::NONE.bits()
    });

    instruction
}

pub(super) fn instruction_access_chain(
    result_type_id: Word,
    id: Word,
    base_id: Word,
    index_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::AccessChain);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(base_id);

    for index_id in index_ids {
        instruction.add_operand(*index_id);
    }

    instruction
}

pub(super) fn instruction_array_length(
    result_type_id: Word,
    id: Word,
    structure_id: Word,
    array_member: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::ArrayLength);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(structure_id);
    instruction.add_operand(array_member);
    instruction
}

//
// Function Instructions
//

pub(super) fn instruction_function(
    return_type_id: Word,
    id: Word,
    function_control: spirv::FunctionControl,
    function_type_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Function);
    instruction.set_type(return_type_id);
    instruction.set_result(id);
    instruction.add_operand(function_control.bits());
    instruction.add_operand(function_type_id);
    instruction
}

pub(super) fn instruction_function_parameter(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::FunctionParameter);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_function_end() -> Instruction {
    Instruction::new(Op::FunctionEnd)
}

pub(super) fn instruction_function_call(
    result_type_id: Word,
    id: Word,
    function_id: Word,
    argument_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::FunctionCall);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(function_id);

    for argument_id in argument_ids {
        instruction.add_operand(*argument_id);
    }

    instruction
}

//
// Image Instructions
//

pub(super) fn instruction_sampled_image(
    result_type_id: Word,
    id: Word,
    image_id: Word,
    sampler_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::SampledImage);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(image_id);
    instruction.add_operand(sampler_id);
    instruction
}

/// Start any of the `OpImageSample*` / `OpImage*Gather` family.
///
/// The caller appends the depth reference or gather component, the
/// image-operands mask and the mask's arguments, in that order.
pub(super) fn instruction_image_sample(
    op: Op,
    result_type_id: Word,
    id: Word,
    sampled_image_id: Word,
    coordinate_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(sampled_image_id);
    instruction.add_operand(coordinate_id);
    instruction
}

/// `OpImageFetch` or `OpImageRead`; the caller appends the image-operands
/// mask and its arguments when needed.
pub(super) fn instruction_image_fetch_or_read(
    op: Op,
    result_type_id: Word,
    id: Word,
    image_id: Word,
    coordinate_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(image_id);
    instruction.add_operand(coordinate_id);
    instruction
}

pub(super) fn instruction_image_write(
    image_id: Word,
    coordinate_id: Word,
    value_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::ImageWrite);
    instruction.add_operand(image_id);
    instruction.add_operand(coordinate_id);
    instruction.add_operand(value_id);
    instruction
}

/// Any of the `OpImageQuery*` family; the caller appends the level of detail
/// operand when the opcode takes one.
pub(super) fn instruction_image_query(
    op: Op,
    result_type_id: Word,
    id: Word,
    image_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(image_id);
    instruction
}

//
// Conversion Instructions
//

pub(super) fn instruction_unary(
    op: Op,
    result_type_id: Word,
    id: Word,
    value: Word,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(value);
    instruction
}

pub(super) fn instruction_bit_cast(result_type_id: Word, id: Word, operand: Word) -> Instruction {
    instruction_unary(Op::Bitcast, result_type_id, id, operand)
}

//
// Composite Instructions
//

pub(super) fn instruction_composite_construct(
    result_type_id: Word,
    id: Word,
    constituent_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::CompositeConstruct);
    instruction.set_type(result_type_id);
    instruction.set_result(id);

    for constituent_id in constituent_ids {
        instruction.add_operand(*constituent_id);
    }

    instruction
}

pub(super) fn instruction_composite_extract(
    result_type_id: Word,
    id: Word,
    composite_id: Word,
    indices: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::CompositeExtract);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(composite_id);

    for index in indices {
        instruction.add_operand(*index);
    }

    instruction
}

pub(super) fn instruction_composite_insert(
    result_type_id: Word,
    id: Word,
    object_id: Word,
    composite_id: Word,
    indices: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::CompositeInsert);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(object_id);
    instruction.add_operand(composite_id);

    for index in indices {
        instruction.add_operand(*index);
    }

    instruction
}

pub(super) fn instruction_vector_extract_dynamic(
    result_type_id: Word,
    id: Word,
    vector_id: Word,
    index_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::VectorExtractDynamic);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(vector_id);
    instruction.add_operand(index_id);
    instruction
}

pub(super) fn instruction_vector_shuffle(
    result_type_id: Word,
    id: Word,
    vector_1_id: Word,
    vector_2_id: Word,
    components: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(Op::VectorShuffle);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(vector_1_id);
    instruction.add_operand(vector_2_id);

    for component in components {
        instruction.add_operand(*component);
    }

    instruction
}

//
// Arithmetic, Bit, Relational and Logical Instructions
//

pub(super) fn instruction_binary(
    op: Op,
    result_type_id: Word,
    id: Word,
    left: Word,
    right: Word,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(left);
    instruction.add_operand(right);
    instruction
}

pub(super) fn instruction_vector_times_scalar(
    result_type_id: Word,
    id: Word,
    vector_id: Word,
    scalar_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::VectorTimesScalar);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(vector_id);
    instruction.add_operand(scalar_id);
    instruction
}

pub(super) fn instruction_select(
    result_type_id: Word,
    id: Word,
    condition_id: Word,
    accept_id: Word,
    reject_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::Select);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(condition_id);
    instruction.add_operand(accept_id);
    instruction.add_operand(reject_id);
    instruction
}

//
// Control-Flow Instructions
//

pub(super) fn instruction_label(id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::Label);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_selection_merge(
    merge_id: Word,
    selection_control: spirv::SelectionControl,
) -> Instruction {
    let mut instruction = Instruction::new(Op::SelectionMerge);
    instruction.add_operand(merge_id);
    instruction.add_operand(selection_control.bits());
    instruction
}

pub(super) fn instruction_loop_merge(
    merge_id: Word,
    continuing_id: Word,
    loop_control: spirv::LoopControl,
) -> Instruction {
    let mut instruction = Instruction::new(Op::LoopMerge);
    instruction.add_operand(merge_id);
    instruction.add_operand(continuing_id);
    instruction.add_operand(loop_control.bits());
    instruction
}

pub(super) fn instruction_branch(target_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::Branch);
    instruction.add_operand(target_id);
    instruction
}

pub(super) fn instruction_branch_conditional(
    condition_id: Word,
    true_label_id: Word,
    false_label_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::BranchConditional);
    instruction.add_operand(condition_id);
    instruction.add_operand(true_label_id);
    instruction.add_operand(false_label_id);
    instruction
}

pub(super) fn instruction_switch(
    selector_id: Word,
    default_id: Word,
    cases: &[(Word, Word)],
) -> Instruction {
    let mut instruction = Instruction::new(Op::Switch);
    instruction.add_operand(selector_id);
    instruction.add_operand(default_id);

    for &(value, label_id) in cases {
        instruction.add_operand(value);
        instruction.add_operand(label_id);
    }

    instruction
}

pub(super) fn instruction_kill() -> Instruction {
    Instruction::new(Op::Kill)
}

pub(super) fn instruction_return() -> Instruction {
    Instruction::new(Op::Return)
}

pub(super) fn instruction_return_value(value_id: Word) -> Instruction {
    let mut instruction = Instruction::new(Op::ReturnValue);
    instruction.add_operand(value_id);
    instruction
}

pub(super) fn instruction_unreachable() -> Instruction {
    Instruction::new(Op::Unreachable)
}

//
// Atomic Instructions
//

/// Any of the value-returning `OpAtomic*` instructions.
pub(super) fn instruction_atomic(
    op: Op,
    result_type_id: Word,
    id: Word,
    pointer_id: Word,
    scope_id: Word,
    semantics_id: Word,
    value_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(pointer_id);
    instruction.add_operand(scope_id);
    instruction.add_operand(semantics_id);

    for value_id in value_ids {
        instruction.add_operand(*value_id);
    }

    instruction
}

//
// Barrier Instructions
//

pub(super) fn instruction_control_barrier(
    exec_scope_id: Word,
    mem_scope_id: Word,
    semantics_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(Op::ControlBarrier);
    instruction.add_operand(exec_scope_id);
    instruction.add_operand(mem_scope_id);
    instruction.add_operand(semantics_id);
    instruction
}

#[cfg(test)]
mod tests {
    use spirv::*;

    struct SpecRequirements {
        op: Op,
        wc: u32,
        type_id: bool,
        result_id: bool,
        operands: bool,
    }

    fn validate(requirements: SpecRequirements, instruction: &crate::back::spv::Instruction) {
        assert_eq!(requirements.op, instruction.op);
        // the minimum word count as defined in the spec
        assert!(instruction.wc >= requirements.wc);
        assert_eq!(requirements.type_id, instruction.type_id.is_some());
        assert_eq!(requirements.result_id, instruction.result_id.is_some());
        assert!(!requirements.operands || !instruction.operands.is_empty());

        let mut output = vec![];
        instruction.to_words(&mut output);
        instruction.validate(&output);
    }

    #[test]
    fn test_instruction_source() {
        let instruction = super::instruction_source(SourceLanguage::GLSL, 450);
        validate(
            SpecRequirements {
                op: Op::Source,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_name() {
        let instruction = super::instruction_name(1, "Test");
        validate(
            SpecRequirements {
                op: Op::Name,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_decorate() {
        let instruction = super::instruction_decorate(1, Decoration::Location, &[1]);
        validate(
            SpecRequirements {
                op: Op::Decorate,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_member_decorate() {
        let instruction = super::instruction_member_decorate(1, 0, Decoration::Offset, &[16]);
        validate(
            SpecRequirements {
                op: Op::MemberDecorate,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_ext_inst_import() {
        let instruction = super::instruction_ext_inst_import(1, "GLSL.std.450");
        validate(
            SpecRequirements {
                op: Op::ExtInstImport,
                wc: 3,
                type_id: false,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_ext_inst() {
        let instruction = super::instruction_ext_inst(1, GLOp::FMax, 2, 3, &[4, 5]);
        validate(
            SpecRequirements {
                op: Op::ExtInst,
                wc: 7,
                type_id: true,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_memory_model() {
        let instruction =
            super::instruction_memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
        validate(
            SpecRequirements {
                op: Op::MemoryModel,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_entry_point() {
        let instruction =
            super::instruction_entry_point(ExecutionModel::Fragment, 1, "main", &[1, 2]);
        validate(
            SpecRequirements {
                op: Op::EntryPoint,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_execution_mode() {
        let instruction =
            super::instruction_execution_mode(1, ExecutionMode::LocalSize, &[64, 1, 1]);
        validate(
            SpecRequirements {
                op: Op::ExecutionMode,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_capability() {
        let instruction = super::instruction_capability(Capability::Shader);
        validate(
            SpecRequirements {
                op: Op::Capability,
                wc: 2,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_type_int() {
        let instruction = super::instruction_type_int(1, 32, super::Signedness::Signed);
        validate(
            SpecRequirements {
                op: Op::TypeInt,
                wc: 4,
                type_id: false,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_type_image() {
        let instruction = super::instruction_type_image(
            1,
            1,
            spirv::Dim::Dim3D,
            true,
            crate::ImageClass::Sampled {
                kind: crate::ScalarKind::Float,
                multi: true,
            },
        );
        validate(
            SpecRequirements {
                op: Op::TypeImage,
                wc: 9,
                type_id: false,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_variable() {
        let instruction = super::instruction_variable(1, 1, spirv::StorageClass::Function, Some(1));
        validate(
            SpecRequirements {
                op: Op::Variable,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_access_chain() {
        let instruction = super::instruction_access_chain(1, 2, 3, &[4, 5]);
        validate(
            SpecRequirements {
                op: Op::AccessChain,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_function_call() {
        let instruction = super::instruction_function_call(1, 1, 1, &[1, 2]);
        validate(
            SpecRequirements {
                op: Op::FunctionCall,
                wc: 4,
                type_id: true,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_vector_times_scalar() {
        let instruction = super::instruction_vector_times_scalar(1, 1, 1, 1);
        validate(
            SpecRequirements {
                op: Op::VectorTimesScalar,
                wc: 5,
                type_id: true,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_selection_merge() {
        let instruction = super::instruction_selection_merge(1, SelectionControl::NONE);
        validate(
            SpecRequirements {
                op: Op::SelectionMerge,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_loop_merge() {
        let instruction = super::instruction_loop_merge(1, 2, LoopControl::NONE);
        validate(
            SpecRequirements {
                op: Op::LoopMerge,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_branch_conditional() {
        let instruction = super::instruction_branch_conditional(1, 2, 3);
        validate(
            SpecRequirements {
                op: Op::BranchConditional,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_switch() {
        let instruction = super::instruction_switch(1, 2, &[(0, 3), (7, 4)]);
        validate(
            SpecRequirements {
                op: Op::Switch,
                wc: 3,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_atomic() {
        let instruction = super::instruction_atomic(Op::AtomicIAdd, 1, 2, 3, 4, 5, &[6]);
        validate(
            SpecRequirements {
                op: Op::AtomicIAdd,
                wc: 7,
                type_id: true,
                result_id: true,
                operands: true,
            },
            &instruction,
        );
    }

    #[test]
    fn test_instruction_control_barrier() {
        let instruction = super::instruction_control_barrier(1, 2, 3);
        validate(
            SpecRequirements {
                op: Op::ControlBarrier,
                wc: 4,
                type_id: false,
                result_id: false,
                operands: true,
            },
            &instruction,
        );
    }
}
