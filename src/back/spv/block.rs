//! Statement and expression emission, including the structured control flow
//! reconstruction: every conditional branch gets an `OpSelectionMerge`, every
//! loop header an `OpLoopMerge`, and no block receives a second terminator.

use super::{
    instructions, writer::literal_to_scalar_value, Block, Error, Function, HelperKey, HelperOp,
    Instruction, LocalType, LookupType, Writer, WriterFlags,
};
use crate::{arena::Handle, proc::TypeResolution};
use spirv::{Op, Word};

/// What a block branches to when control falls off its end.
pub(super) enum BlockExit {
    /// Return from the function.
    Return,
    /// Branch to the given label.
    Branch { target: Word },
    /// Conditional back edge of a loop: break to `merge` when the condition
    /// holds, otherwise jump back to `loop_header`.
    BreakIf {
        condition: Handle<crate::Expression>,
        loop_header: Word,
        merge: Word,
    },
}

#[derive(Clone, Copy, Default)]
pub(super) struct LoopContext {
    pub continuing_id: Option<Word>,
    pub break_id: Option<Word>,
}

pub(super) fn resolution<'a>(
    ir_function: &'a crate::Function,
    handle: Handle<crate::Expression>,
) -> Result<&'a TypeResolution, Error> {
    ir_function
        .expression_types
        .get(handle.index())
        .ok_or(Error::Validation("expression type is missing"))
}

impl Writer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn write_block(
        &mut self,
        label_id: Word,
        statements: &[crate::Statement],
        exit: BlockExit,
        loop_context: LoopContext,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<(), Error> {
        let mut block = Block::new(label_id);

        for statement in statements {
            match *statement {
                crate::Statement::Emit(ref range) => {
                    for handle in range.clone() {
                        self.cache_expression_value(
                            handle,
                            &mut block,
                            module,
                            ir_function,
                            function,
                        )?;
                    }
                }
                crate::Statement::Block(ref block_statements) => {
                    let scope_id = self.id_gen.next();
                    function.consume(block, instructions::instruction_branch(scope_id));
                    let merge_id = self.id_gen.next();
                    self.write_block(
                        scope_id,
                        block_statements,
                        BlockExit::Branch { target: merge_id },
                        loop_context,
                        module,
                        ir_function,
                        function,
                    )?;
                    block = Block::new(merge_id);
                }
                crate::Statement::If {
                    condition,
                    ref accept,
                    ref reject,
                } => {
                    let condition_id = self.cache_expression_value(
                        condition,
                        &mut block,
                        module,
                        ir_function,
                        function,
                    )?;

                    let merge_id = self.id_gen.next();
                    block.body.push(instructions::instruction_selection_merge(
                        merge_id,
                        spirv::SelectionControl::NONE,
                    ));

                    let accept_id = if accept.is_empty() {
                        None
                    } else {
                        Some(self.id_gen.next())
                    };
                    let reject_id = if reject.is_empty() {
                        None
                    } else {
                        Some(self.id_gen.next())
                    };

                    function.consume(
                        block,
                        instructions::instruction_branch_conditional(
                            condition_id,
                            accept_id.unwrap_or(merge_id),
                            reject_id.unwrap_or(merge_id),
                        ),
                    );

                    if let Some(id) = accept_id {
                        self.write_block(
                            id,
                            accept,
                            BlockExit::Branch { target: merge_id },
                            loop_context,
                            module,
                            ir_function,
                            function,
                        )?;
                    }
                    if let Some(id) = reject_id {
                        self.write_block(
                            id,
                            reject,
                            BlockExit::Branch { target: merge_id },
                            loop_context,
                            module,
                            ir_function,
                            function,
                        )?;
                    }

                    block = Block::new(merge_id);
                }
                crate::Statement::Switch {
                    selector,
                    ref cases,
                    ref default,
                } => {
                    let selector_id = self.cache_expression_value(
                        selector,
                        &mut block,
                        module,
                        ir_function,
                        function,
                    )?;

                    let merge_id = self.id_gen.next();
                    block.body.push(instructions::instruction_selection_merge(
                        merge_id,
                        spirv::SelectionControl::NONE,
                    ));

                    let default_id = self.id_gen.next();
                    let case_ids: Vec<Word> =
                        cases.iter().map(|_| self.id_gen.next()).collect();
                    let mut case_pairs = Vec::new();
                    for (case, &label_id) in cases.iter().zip(case_ids.iter()) {
                        for &value in case.values.iter() {
                            case_pairs.push((value as u32, label_id));
                        }
                    }

                    function.consume(
                        block,
                        instructions::instruction_switch(selector_id, default_id, &case_pairs),
                    );

                    let inner_context = LoopContext {
                        continuing_id: loop_context.continuing_id,
                        break_id: Some(merge_id),
                    };

                    for (index, case) in cases.iter().enumerate() {
                        // A fallthrough case branches into the next case's
                        // label instead of the merge block.
                        let target = if case.fall_through {
                            match case_ids.get(index + 1) {
                                Some(&next) => next,
                                None => default_id,
                            }
                        } else {
                            merge_id
                        };
                        self.write_block(
                            case_ids[index],
                            &case.body,
                            BlockExit::Branch { target },
                            inner_context,
                            module,
                            ir_function,
                            function,
                        )?;
                    }
                    self.write_block(
                        default_id,
                        default,
                        BlockExit::Branch { target: merge_id },
                        inner_context,
                        module,
                        ir_function,
                        function,
                    )?;

                    block = Block::new(merge_id);
                }
                crate::Statement::Loop {
                    ref body,
                    ref continuing,
                    break_if,
                } => {
                    let header_id = self.id_gen.next();
                    function.consume(block, instructions::instruction_branch(header_id));

                    let body_id = self.id_gen.next();
                    let continuing_id = self.id_gen.next();
                    let merge_id = self.id_gen.next();

                    let mut header = Block::new(header_id);
                    header.body.push(instructions::instruction_loop_merge(
                        merge_id,
                        continuing_id,
                        spirv::LoopControl::NONE,
                    ));
                    function.consume(header, instructions::instruction_branch(body_id));

                    self.write_block(
                        body_id,
                        body,
                        BlockExit::Branch {
                            target: continuing_id,
                        },
                        LoopContext {
                            continuing_id: Some(continuing_id),
                            break_id: Some(merge_id),
                        },
                        module,
                        ir_function,
                        function,
                    )?;

                    let continuing_exit = match break_if {
                        Some(condition) => BlockExit::BreakIf {
                            condition,
                            loop_header: header_id,
                            merge: merge_id,
                        },
                        None => BlockExit::Branch { target: header_id },
                    };
                    self.write_block(
                        continuing_id,
                        continuing,
                        continuing_exit,
                        LoopContext {
                            continuing_id: None,
                            break_id: Some(merge_id),
                        },
                        module,
                        ir_function,
                        function,
                    )?;

                    block = Block::new(merge_id);
                }
                crate::Statement::Break => {
                    let target = loop_context
                        .break_id
                        .ok_or(Error::Validation("break outside of a loop or switch"))?;
                    function.consume(block, instructions::instruction_branch(target));
                    // Anything after a terminator in the same block is
                    // unreachable and skipped.
                    return Ok(());
                }
                crate::Statement::Continue => {
                    let target = loop_context
                        .continuing_id
                        .ok_or(Error::Validation("continue outside of a loop"))?;
                    function.consume(block, instructions::instruction_branch(target));
                    return Ok(());
                }
                crate::Statement::Return { value } => {
                    let termination = match function.entry_point_context {
                        Some(_) => {
                            if let Some(value) = value {
                                let value_id = self.cache_expression_value(
                                    value,
                                    &mut block,
                                    module,
                                    ir_function,
                                    function,
                                )?;
                                self.write_entry_point_return(
                                    value_id,
                                    ir_function,
                                    module,
                                    &mut block,
                                    function,
                                )?;
                            }
                            instructions::instruction_return()
                        }
                        None => match value {
                            Some(value) => {
                                let value_id = self.cache_expression_value(
                                    value,
                                    &mut block,
                                    module,
                                    ir_function,
                                    function,
                                )?;
                                instructions::instruction_return_value(value_id)
                            }
                            None => instructions::instruction_return(),
                        },
                    };
                    function.consume(block, termination);
                    return Ok(());
                }
                crate::Statement::Kill => {
                    function.consume(block, instructions::instruction_kill());
                    return Ok(());
                }
                crate::Statement::Barrier(flags) => {
                    self.write_barrier(flags, &mut block, module)?;
                }
                crate::Statement::Store { pointer, value } => {
                    let value_id = self.cache_expression_value(
                        value,
                        &mut block,
                        module,
                        ir_function,
                        function,
                    )?;
                    let pointer_id = self.write_expression_pointer(
                        pointer,
                        &mut block,
                        module,
                        ir_function,
                        function,
                    )?;
                    block
                        .body
                        .push(instructions::instruction_store(pointer_id, value_id, None));
                }
                crate::Statement::ImageStore {
                    image,
                    coordinate,
                    array_index,
                    value,
                } => {
                    self.write_image_store(
                        image,
                        coordinate,
                        array_index,
                        value,
                        &mut block,
                        module,
                        ir_function,
                        function,
                    )?;
                }
                crate::Statement::Atomic {
                    pointer,
                    ref fun,
                    value,
                    result,
                } => {
                    self.write_atomic(
                        pointer,
                        fun,
                        value,
                        result,
                        &mut block,
                        module,
                        ir_function,
                        function,
                    )?;
                }
                crate::Statement::WorkGroupUniformLoad { pointer, result } => {
                    let semantics =
                        spirv::MemorySemantics::ACQUIRE_RELEASE | spirv::MemorySemantics::WORKGROUP_MEMORY;
                    let scope_id =
                        self.get_index_constant(spirv::Scope::Workgroup as u32, &module.types)?;
                    let semantics_id =
                        self.get_index_constant(semantics.bits(), &module.types)?;
                    block.body.push(instructions::instruction_control_barrier(
                        scope_id,
                        scope_id,
                        semantics_id,
                    ));
                    let result_type_id = self
                        .get_expression_type_id(&module.types, resolution(ir_function, result)?)?;
                    let pointer_id = self.write_expression_pointer(
                        pointer,
                        &mut block,
                        module,
                        ir_function,
                        function,
                    )?;
                    let load_id = self.id_gen.next();
                    block.body.push(instructions::instruction_load(
                        result_type_id,
                        load_id,
                        pointer_id,
                        None,
                    ));
                    block.body.push(instructions::instruction_control_barrier(
                        scope_id,
                        scope_id,
                        semantics_id,
                    ));
                    self.cached[result] = load_id;
                }
                crate::Statement::Call {
                    function: callee,
                    ref arguments,
                    result,
                } => {
                    let mut argument_ids = Vec::with_capacity(arguments.len());
                    for &argument in arguments.iter() {
                        argument_ids.push(self.cache_expression_value(
                            argument,
                            &mut block,
                            module,
                            ir_function,
                            function,
                        )?);
                    }
                    let callee_id = *self
                        .lookup_function
                        .get(&callee)
                        .ok_or(Error::Validation("call to a function without a definition"))?;
                    let result_type_id = match result {
                        Some(expr) => self
                            .get_expression_type_id(&module.types, resolution(ir_function, expr)?)?,
                        None => self.void_type,
                    };
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_function_call(
                        result_type_id,
                        id,
                        callee_id,
                        &argument_ids,
                    ));
                    if let Some(expr) = result {
                        self.cached[expr] = id;

                        // Flush deferred local initializers whose call results
                        // are now all available.
                        let pending = std::mem::replace(&mut function.pending_inits, Vec::new());
                        let (ready, waiting): (Vec<_>, Vec<_>) = pending
                            .into_iter()
                            .partition(|p| p.call_results.last() == Some(&expr));
                        function.pending_inits = waiting;
                        for pending_init in ready {
                            let pointer_id = function.variables[&pending_init.local].id;
                            // One store per call result, in IR-call order. The
                            // last one carries the fully evaluated initializer.
                            let head = match pending_init.call_results.split_last() {
                                Some((_, head)) => head,
                                None => continue,
                            };
                            for &call_result in head {
                                let result_id = self.cached[call_result];
                                block.body.push(instructions::instruction_store(
                                    pointer_id, result_id, None,
                                ));
                            }
                            let value_id = self.cache_expression_value(
                                pending_init.root,
                                &mut block,
                                module,
                                ir_function,
                                function,
                            )?;
                            block.body.push(instructions::instruction_store(
                                pointer_id, value_id, None,
                            ));
                        }
                    }
                }
                crate::Statement::RayQuery { .. } => {
                    return Err(Error::FeatureNotImplemented("ray queries"))
                }
            }
        }

        let termination = match exit {
            BlockExit::Return => {
                if ir_function.result.is_some() && function.entry_point_context.is_none() {
                    instructions::instruction_unreachable()
                } else {
                    instructions::instruction_return()
                }
            }
            BlockExit::Branch { target } => instructions::instruction_branch(target),
            BlockExit::BreakIf {
                condition,
                loop_header,
                merge,
            } => {
                let condition_id = self.cache_expression_value(
                    condition,
                    &mut block,
                    module,
                    ir_function,
                    function,
                )?;
                instructions::instruction_branch_conditional(condition_id, merge, loop_header)
            }
        };
        function.consume(block, termination);
        Ok(())
    }

    fn write_entry_point_return(
        &mut self,
        value_id: Word,
        ir_function: &crate::Function,
        module: &crate::Module,
        block: &mut Block,
        function: &Function,
    ) -> Result<(), Error> {
        let result = ir_function
            .result
            .as_ref()
            .ok_or(Error::Validation("entry point return with no result"))?;
        let is_whole = result.binding.is_some();

        // `context.results` is moved out to satisfy the borrow checker;
        // only read access is needed.
        let context = function
            .entry_point_context
            .as_ref()
            .ok_or(Error::Validation("missing entry point context"))?;
        let members: Vec<(Word, Word, Option<crate::BuiltIn>)> = context
            .results
            .iter()
            .map(|m| (m.id, m.type_id, m.built_in))
            .collect();

        if is_whole {
            let (var_id, type_id, built_in) = members[0];
            let out_id = self.prepare_entry_point_output(value_id, type_id, built_in, module, block)?;
            block
                .body
                .push(instructions::instruction_store(var_id, out_id, None));
        } else {
            for (index, &(var_id, type_id, built_in)) in members.iter().enumerate() {
                let extract_id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_extract(
                    type_id,
                    extract_id,
                    value_id,
                    &[index as u32],
                ));
                let out_id =
                    self.prepare_entry_point_output(extract_id, type_id, built_in, module, block)?;
                block
                    .body
                    .push(instructions::instruction_store(var_id, out_id, None));
            }
        }
        Ok(())
    }

    /// Flip the Y coordinate of a `Position` output when the writer is
    /// configured to adjust the coordinate space.
    fn prepare_entry_point_output(
        &mut self,
        value_id: Word,
        type_id: Word,
        built_in: Option<crate::BuiltIn>,
        module: &crate::Module,
        block: &mut Block,
    ) -> Result<Word, Error> {
        if built_in != Some(crate::BuiltIn::Position)
            || !self.flags.contains(WriterFlags::ADJUST_COORDINATE_SPACE)
        {
            return Ok(value_id);
        }
        let float_type_id = self.get_type_id(
            &module.types,
            LocalType::scalar(crate::ScalarKind::Float, 4).into(),
        )?;
        let y_id = self.id_gen.next();
        block.body.push(instructions::instruction_composite_extract(
            float_type_id,
            y_id,
            value_id,
            &[1],
        ));
        let neg_id = self.id_gen.next();
        block.body.push(instructions::instruction_unary(
            Op::FNegate,
            float_type_id,
            neg_id,
            y_id,
        ));
        let flipped_id = self.id_gen.next();
        block.body.push(instructions::instruction_composite_insert(
            type_id,
            flipped_id,
            neg_id,
            value_id,
            &[1],
        ));
        Ok(flipped_id)
    }

    fn write_barrier(
        &mut self,
        flags: crate::Barrier,
        block: &mut Block,
        module: &crate::Module,
    ) -> Result<(), Error> {
        let mut semantics = spirv::MemorySemantics::ACQUIRE_RELEASE;
        semantics.set(
            spirv::MemorySemantics::UNIFORM_MEMORY,
            flags.contains(crate::Barrier::STORAGE),
        );
        semantics.set(
            spirv::MemorySemantics::WORKGROUP_MEMORY,
            flags.contains(crate::Barrier::WORK_GROUP),
        );
        semantics.set(
            spirv::MemorySemantics::IMAGE_MEMORY,
            flags.contains(crate::Barrier::TEXTURE),
        );
        semantics.set(
            spirv::MemorySemantics::SUBGROUP_MEMORY,
            flags.contains(crate::Barrier::SUB_GROUP),
        );
        // The narrowest scopes that still cover the requested set.
        let exec_scope = if flags == crate::Barrier::SUB_GROUP {
            spirv::Scope::Subgroup
        } else {
            spirv::Scope::Workgroup
        };
        let mem_scope = if flags.contains(crate::Barrier::STORAGE) {
            spirv::Scope::Device
        } else {
            spirv::Scope::Workgroup
        };
        let exec_scope_id = self.get_index_constant(exec_scope as u32, &module.types)?;
        let mem_scope_id = self.get_index_constant(mem_scope as u32, &module.types)?;
        let semantics_id = self.get_index_constant(semantics.bits(), &module.types)?;
        block.body.push(instructions::instruction_control_barrier(
            exec_scope_id,
            mem_scope_id,
            semantics_id,
        ));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_atomic(
        &mut self,
        pointer: Handle<crate::Expression>,
        fun: &crate::AtomicFunction,
        value: Handle<crate::Expression>,
        result: Option<Handle<crate::Expression>>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<(), Error> {
        let value_id = self.cache_expression_value(value, block, module, ir_function, function)?;
        let pointer_id =
            self.write_expression_pointer(pointer, block, module, ir_function, function)?;

        let (kind, width) = {
            let inner = resolution(ir_function, value)?.inner_with(&module.types);
            (
                inner
                    .scalar_kind()
                    .ok_or(Error::Validation("atomic value is not a scalar"))?,
                inner
                    .scalar_width()
                    .ok_or(Error::Validation("atomic value has no width"))?,
            )
        };
        if width == 8 {
            self.require(spirv::Capability::Int64Atomics)?;
        }

        let space = resolution(ir_function, pointer)?
            .inner_with(&module.types)
            .pointer_space()
            .ok_or(Error::Validation("atomic pointer is not a pointer"))?;
        let (scope, base_semantics) = match space {
            crate::AddressSpace::Storage { .. } => (
                spirv::Scope::Device,
                spirv::MemorySemantics::UNIFORM_MEMORY,
            ),
            crate::AddressSpace::WorkGroup => (
                spirv::Scope::Workgroup,
                spirv::MemorySemantics::WORKGROUP_MEMORY,
            ),
            _ => return Err(Error::Validation("atomic in an unexpected address space")),
        };
        let scope_id = self.get_index_constant(scope as u32, &module.types)?;
        let semantics = spirv::MemorySemantics::ACQUIRE_RELEASE | base_semantics;
        let semantics_id = self.get_index_constant(semantics.bits(), &module.types)?;

        let value_type_id =
            self.get_type_id(&module.types, LocalType::scalar(kind, width).into())?;

        use crate::AtomicFunction as Af;
        let id = self.id_gen.next();
        match *fun {
            Af::Exchange {
                compare: Some(compare),
            } => {
                let compare_id =
                    self.cache_expression_value(compare, block, module, ir_function, function)?;
                // OpAtomicCompareExchange yields the old value; the IR result
                // is a (old, exchanged) pair.
                let mut instruction = super::Instruction::new(Op::AtomicCompareExchange);
                instruction.set_type(value_type_id);
                instruction.set_result(id);
                instruction.add_operand(pointer_id);
                instruction.add_operand(scope_id);
                instruction.add_operand(semantics_id);
                instruction.add_operand(semantics_id);
                instruction.add_operand(value_id);
                instruction.add_operand(compare_id);
                block.body.push(instruction);

                if let Some(result_expr) = result {
                    let bool_type_id = self.get_type_id(
                        &module.types,
                        LocalType::scalar(crate::ScalarKind::Bool, crate::BOOL_WIDTH).into(),
                    )?;
                    let equal_id = self.id_gen.next();
                    block.body.push(instructions::instruction_binary(
                        Op::IEqual,
                        bool_type_id,
                        equal_id,
                        id,
                        compare_id,
                    ));
                    let result_type_id = self
                        .get_expression_type_id(&module.types, resolution(ir_function, result_expr)?)?;
                    let pair_id = self.id_gen.next();
                    block.body.push(instructions::instruction_composite_construct(
                        result_type_id,
                        pair_id,
                        &[id, equal_id],
                    ));
                    self.cached[result_expr] = pair_id;
                }
            }
            _ => {
                let op = match *fun {
                    Af::Add => Op::AtomicIAdd,
                    Af::Subtract => Op::AtomicISub,
                    Af::And => Op::AtomicAnd,
                    Af::ExclusiveOr => Op::AtomicXor,
                    Af::InclusiveOr => Op::AtomicOr,
                    Af::Min => match kind {
                        crate::ScalarKind::Sint => Op::AtomicSMin,
                        _ => Op::AtomicUMin,
                    },
                    Af::Max => match kind {
                        crate::ScalarKind::Sint => Op::AtomicSMax,
                        _ => Op::AtomicUMax,
                    },
                    Af::Exchange { compare: None } => Op::AtomicExchange,
                    Af::Exchange { .. } => Op::AtomicCompareExchange,
                };
                block.body.push(instructions::instruction_atomic(
                    op,
                    value_type_id,
                    id,
                    pointer_id,
                    scope_id,
                    semantics_id,
                    &[value_id],
                ));
                if let Some(result_expr) = result {
                    self.cached[result_expr] = id;
                }
            }
        }
        Ok(())
    }

    /// Build the `OpAccessChain` for a pointer-typed expression, returning
    /// the pointer ID. Chains are re-emitted per use, so the resulting ID
    /// always dominates its single consumer.
    pub(super) fn write_expression_pointer(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        let mut indices = Vec::new();
        let mut current = expr_handle;
        let root_id = loop {
            current = match ir_function.expressions[current] {
                crate::Expression::Access { base, index } => {
                    let index_id =
                        self.cache_expression_value(index, block, module, ir_function, function)?;
                    indices.push(index_id);
                    base
                }
                crate::Expression::AccessIndex { base, index } => {
                    let index_id = self.get_index_constant(index, &module.types)?;
                    indices.push(index_id);
                    base
                }
                crate::Expression::GlobalVariable(handle) => {
                    let (id, wrapped) = {
                        let gv = &self.global_variables[handle.index()];
                        (gv.id, gv.wrapped)
                    };
                    if wrapped {
                        let zero_id = self.get_index_constant(0, &module.types)?;
                        indices.push(zero_id);
                    }
                    break id;
                }
                crate::Expression::LocalVariable(handle) => {
                    break function
                        .variables
                        .get(&handle)
                        .ok_or(Error::Validation("unknown local variable"))?
                        .id
                }
                crate::Expression::FunctionArgument(index) => {
                    break function.parameter_id(index)
                }
                _ => return Err(Error::Validation("unexpected pointer chain expression")),
            };
        };

        if indices.is_empty() {
            return Ok(root_id);
        }
        indices.reverse();

        let pointer_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
        let id = self.id_gen.next();
        block.body.push(instructions::instruction_access_chain(
            pointer_type_id,
            id,
            root_id,
            &indices,
        ));
        Ok(id)
    }

    /// Emit a pair of `(one, zero)` constants of the given numeric shape,
    /// used to lower boolean-to-numeric casts and saturate.
    fn write_one_zero_constants(
        &mut self,
        kind: crate::ScalarKind,
        width: crate::Bytes,
        vector_size: Option<crate::VectorSize>,
        types: &crate::Arena<crate::Type>,
    ) -> Result<(Word, Word), Error> {
        let one_value = match kind {
            crate::ScalarKind::Float => crate::ScalarValue::Float(1.0),
            crate::ScalarKind::Sint => crate::ScalarValue::Sint(1),
            crate::ScalarKind::Uint => crate::ScalarValue::Uint(1),
            crate::ScalarKind::Bool => crate::ScalarValue::Bool(true),
        };
        let scalar_one = self.write_scalar_constant(&one_value, width, types)?;
        match vector_size {
            None => {
                let scalar_type = self.get_type_id(types, LocalType::scalar(kind, width).into())?;
                let zero = self.write_null_constant(scalar_type);
                Ok((scalar_one, zero))
            }
            Some(size) => {
                let vector_type =
                    self.get_type_id(types, LocalType::vector(size, kind, width).into())?;
                let zero = self.write_null_constant(vector_type);
                let one = self.id_gen.next();
                let components = vec![scalar_one; size as usize];
                instructions::instruction_constant_composite(vector_type, one, &components)
                    .to_words(&mut self.logical_layout.declarations);
                Ok((one, zero))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn cache_expression_value(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        if self.cached.contains(expr_handle) {
            return Ok(self.cached[expr_handle]);
        }

        let is_pointer = resolution(ir_function, expr_handle)?
            .inner_with(&module.types)
            .pointer_space()
            .is_some();

        let id = match ir_function.expressions[expr_handle] {
            crate::Expression::Literal(ref literal) => self.write_scalar_constant(
                &literal_to_scalar_value(literal),
                literal.width(),
                &module.types,
            )?,
            crate::Expression::Constant(handle) => {
                module.constants.try_get(handle)?;
                self.constant_ids[handle.index()]
            }
            crate::Expression::ZeroValue(ty) => {
                let type_id = self.get_type_id(&module.types, LookupType::Handle(ty))?;
                self.write_null_constant(type_id)
            }
            crate::Expression::Compose { ty, ref components } => {
                let mut component_ids = Vec::with_capacity(components.len());
                for &component in components.iter() {
                    component_ids.push(self.cache_expression_value(
                        component,
                        block,
                        module,
                        ir_function,
                        function,
                    )?);
                }
                let type_id = self.get_type_id(&module.types, LookupType::Handle(ty))?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_construct(
                    type_id,
                    id,
                    &component_ids,
                ));
                id
            }
            crate::Expression::Access { base, index } if is_pointer => {
                let _ = (base, index);
                return self.write_expression_pointer(
                    expr_handle,
                    block,
                    module,
                    ir_function,
                    function,
                );
            }
            crate::Expression::AccessIndex { base, index } if is_pointer => {
                let _ = (base, index);
                return self.write_expression_pointer(
                    expr_handle,
                    block,
                    module,
                    ir_function,
                    function,
                );
            }
            crate::Expression::Access { base, index } => {
                let base_id =
                    self.cache_expression_value(base, block, module, ir_function, function)?;
                let base_is_vector = match *resolution(ir_function, base)?
                    .inner_with(&module.types)
                {
                    crate::TypeInner::Vector { .. } => true,
                    _ => false,
                };
                if !base_is_vector {
                    return Err(Error::FeatureNotImplemented(
                        "dynamic indexing of composite values",
                    ));
                }
                let index_id =
                    self.cache_expression_value(index, block, module, ir_function, function)?;
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_vector_extract_dynamic(
                    result_type_id,
                    id,
                    base_id,
                    index_id,
                ));
                id
            }
            crate::Expression::AccessIndex { base, index } => {
                let base_id =
                    self.cache_expression_value(base, block, module, ir_function, function)?;
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_extract(
                    result_type_id,
                    id,
                    base_id,
                    &[index],
                ));
                id
            }
            crate::Expression::Splat { size, value } => {
                let value_id =
                    self.cache_expression_value(value, block, module, ir_function, function)?;
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let components = vec![value_id; size as usize];
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_construct(
                    result_type_id,
                    id,
                    &components,
                ));
                id
            }
            crate::Expression::Swizzle {
                size,
                vector,
                pattern,
            } => {
                let vector_id =
                    self.cache_expression_value(vector, block, module, ir_function, function)?;
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let mut components = Vec::with_capacity(size as usize);
                for &sc in pattern[..size as usize].iter() {
                    components.push(sc as Word);
                }
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_vector_shuffle(
                    result_type_id,
                    id,
                    vector_id,
                    vector_id,
                    &components,
                ));
                id
            }
            crate::Expression::FunctionArgument(index) => function.parameter_id(index),
            crate::Expression::GlobalVariable(handle) => {
                let var = module.global_variables.try_get(handle)?;
                let gv = &self.global_variables[handle.index()];
                if var.space == crate::AddressSpace::Handle {
                    if gv.handle_id == 0 {
                        return Err(Error::Validation("handle global was not loaded"));
                    }
                    gv.handle_id
                } else {
                    gv.id
                }
            }
            crate::Expression::LocalVariable(handle) => {
                function
                    .variables
                    .get(&handle)
                    .ok_or(Error::Validation("unknown local variable"))?
                    .id
            }
            crate::Expression::Load { pointer } => {
                // Loading a handle global is the prelude `OpLoad` itself.
                if let crate::Expression::GlobalVariable(handle) =
                    ir_function.expressions[pointer]
                {
                    let var = module.global_variables.try_get(handle)?;
                    if var.space == crate::AddressSpace::Handle {
                        let gv = &self.global_variables[handle.index()];
                        if gv.handle_id == 0 {
                            return Err(Error::Validation("handle global was not loaded"));
                        }
                        self.cached[expr_handle] = gv.handle_id;
                        return Ok(gv.handle_id);
                    }
                }
                let pointer_id = self.write_expression_pointer(
                    pointer,
                    block,
                    module,
                    ir_function,
                    function,
                )?;
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_load(
                    result_type_id,
                    id,
                    pointer_id,
                    None,
                ));
                id
            }
            crate::Expression::ImageSample {
                image,
                sampler,
                gather,
                coordinate,
                array_index,
                offset,
                level,
                depth_ref,
            } => self.write_image_sample(
                expr_handle,
                image,
                sampler,
                gather,
                coordinate,
                array_index,
                offset,
                level,
                depth_ref,
                block,
                module,
                ir_function,
                function,
            )?,
            crate::Expression::ImageLoad {
                image,
                coordinate,
                array_index,
                index,
            } => self.write_image_load(
                expr_handle,
                image,
                coordinate,
                array_index,
                index,
                block,
                module,
                ir_function,
                function,
            )?,
            crate::Expression::ImageQuery { image, query } => self.write_image_query(
                expr_handle,
                image,
                query,
                block,
                module,
                ir_function,
                function,
            )?,
            crate::Expression::Unary { op, expr } => {
                let operand_id =
                    self.cache_expression_value(expr, block, module, ir_function, function)?;
                let (kind, width, vector_size) = {
                    let inner = resolution(ir_function, expr)?.inner_with(&module.types);
                    let size = match *inner {
                        crate::TypeInner::Vector { size, .. } => Some(size),
                        _ => None,
                    };
                    (
                        inner
                            .scalar_kind()
                            .ok_or(Error::Validation("unary operand has no scalar kind"))?,
                        inner.scalar_width(),
                        size,
                    )
                };
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let id = self.id_gen.next();
                let instruction = match op {
                    crate::UnaryOperator::Negate => match kind {
                        crate::ScalarKind::Float => instructions::instruction_unary(
                            Op::FNegate,
                            result_type_id,
                            id,
                            operand_id,
                        ),
                        crate::ScalarKind::Sint => {
                            // negating INT_MIN overflows; run the guard
                            let width = width
                                .ok_or(Error::Validation("unary operand has no width"))?;
                            let helper_id = self.get_helper_function(
                                HelperKey {
                                    op: HelperOp::Neg,
                                    kind,
                                    width,
                                    vector_size,
                                },
                                &module.types,
                            )?;
                            instructions::instruction_function_call(
                                result_type_id,
                                id,
                                helper_id,
                                &[operand_id],
                            )
                        }
                        _ => return Err(Error::Validation("cannot negate this operand")),
                    },
                    crate::UnaryOperator::Not => {
                        let spv_op = match kind {
                            crate::ScalarKind::Bool => Op::LogicalNot,
                            crate::ScalarKind::Sint | crate::ScalarKind::Uint => Op::Not,
                            _ => return Err(Error::Validation("cannot invert this operand")),
                        };
                        instructions::instruction_unary(spv_op, result_type_id, id, operand_id)
                    }
                };
                block.body.push(instruction);
                id
            }
            crate::Expression::Binary { op, left, right } => self.write_binary(
                expr_handle,
                op,
                left,
                right,
                block,
                module,
                ir_function,
                function,
            )?,
            crate::Expression::Select {
                condition,
                accept,
                reject,
            } => {
                let condition_id = self
                    .cache_expression_value(condition, block, module, ir_function, function)?;
                let accept_id =
                    self.cache_expression_value(accept, block, module, ir_function, function)?;
                let reject_id =
                    self.cache_expression_value(reject, block, module, ir_function, function)?;
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_select(
                    result_type_id,
                    id,
                    condition_id,
                    accept_id,
                    reject_id,
                ));
                id
            }
            crate::Expression::Derivative { axis, expr } => {
                let operand_id =
                    self.cache_expression_value(expr, block, module, ir_function, function)?;
                let op = match axis {
                    crate::DerivativeAxis::X => Op::DPdx,
                    crate::DerivativeAxis::Y => Op::DPdy,
                    crate::DerivativeAxis::Width => Op::Fwidth,
                };
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_unary(
                    op,
                    result_type_id,
                    id,
                    operand_id,
                ));
                id
            }
            crate::Expression::Relational { fun, argument } => {
                let argument_id =
                    self.cache_expression_value(argument, block, module, ir_function, function)?;
                let op = match fun {
                    crate::RelationalFunction::All => Op::All,
                    crate::RelationalFunction::Any => Op::Any,
                    crate::RelationalFunction::IsNan => Op::IsNan,
                    crate::RelationalFunction::IsInf => Op::IsInf,
                };
                let result_type_id = self
                    .get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_unary(
                    op,
                    result_type_id,
                    id,
                    argument_id,
                ));
                id
            }
            crate::Expression::Math {
                fun,
                arg,
                arg1,
                arg2,
                arg3,
            } => self.write_math_function(
                expr_handle,
                fun,
                arg,
                arg1,
                arg2,
                arg3,
                block,
                module,
                ir_function,
                function,
            )?,
            crate::Expression::As {
                expr,
                kind,
                convert,
            } => self.write_cast(
                expr_handle,
                expr,
                kind,
                convert,
                block,
                module,
                ir_function,
                function,
            )?,
            crate::Expression::ArrayLength(pointer) => {
                let (structure_id, member_index) = match ir_function.expressions[pointer] {
                    crate::Expression::GlobalVariable(handle) => {
                        let gv = &self.global_variables[handle.index()];
                        if !gv.wrapped {
                            return Err(Error::Validation(
                                "array length of an unwrapped global",
                            ));
                        }
                        (gv.id, 0)
                    }
                    crate::Expression::AccessIndex { base, index } => {
                        match ir_function.expressions[base] {
                            crate::Expression::GlobalVariable(handle) => {
                                (self.global_variables[handle.index()].id, index)
                            }
                            _ => {
                                return Err(Error::Validation(
                                    "array length of a non-global array",
                                ))
                            }
                        }
                    }
                    _ => return Err(Error::Validation("array length of a non-global array")),
                };
                let result_type_id = self.get_type_id(
                    &module.types,
                    LocalType::scalar(crate::ScalarKind::Uint, 4).into(),
                )?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_array_length(
                    result_type_id,
                    id,
                    structure_id,
                    member_index,
                ));
                id
            }
            crate::Expression::CallResult(_)
            | crate::Expression::AtomicResult { .. }
            | crate::Expression::WorkGroupUniformLoadResult { .. } => {
                return Err(Error::Validation(
                    "result expression used before the owning statement",
                ))
            }
        };

        self.cached[expr_handle] = id;
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_binary(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        op: crate::BinaryOperator,
        left: Handle<crate::Expression>,
        right: Handle<crate::Expression>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        let left_id = self.cache_expression_value(left, block, module, ir_function, function)?;
        let right_id = self.cache_expression_value(right, block, module, ir_function, function)?;
        let result_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;

        use crate::BinaryOperator as Bo;
        use crate::ScalarKind as Sk;
        use crate::TypeInner as Ti;

        enum Shape {
            Scalar,
            Vector(crate::VectorSize),
            Matrix,
        }
        fn shape_of(inner: &crate::TypeInner) -> Option<Shape> {
            match *inner {
                Ti::Scalar { .. } => Some(Shape::Scalar),
                Ti::Vector { size, .. } => Some(Shape::Vector(size)),
                Ti::Matrix { .. } => Some(Shape::Matrix),
                _ => None,
            }
        }

        let id = self.id_gen.next();
        let (left_shape, kind) = {
            let inner = resolution(ir_function, left)?.inner_with(&module.types);
            (
                shape_of(inner).ok_or(Error::Validation("binary operand is not a value"))?,
                inner.scalar_kind(),
            )
        };
        let right_shape = {
            let inner = resolution(ir_function, right)?.inner_with(&module.types);
            shape_of(inner).ok_or(Error::Validation("binary operand is not a value"))?
        };

        // The mixed-shape multiplies map onto dedicated SPIR-V opcodes; in
        // particular `vec * scalar` must be `OpVectorTimesScalar`, never a
        // mismatched `OpFMul`.
        let instruction = match (op, left_shape, right_shape) {
            (Bo::Multiply, Shape::Matrix, Shape::Vector(_)) => instructions::instruction_binary(
                Op::MatrixTimesVector,
                result_type_id,
                id,
                left_id,
                right_id,
            ),
            (Bo::Multiply, Shape::Vector(_), Shape::Matrix) => instructions::instruction_binary(
                Op::VectorTimesMatrix,
                result_type_id,
                id,
                left_id,
                right_id,
            ),
            (Bo::Multiply, Shape::Matrix, Shape::Matrix) => instructions::instruction_binary(
                Op::MatrixTimesMatrix,
                result_type_id,
                id,
                left_id,
                right_id,
            ),
            (Bo::Multiply, Shape::Matrix, Shape::Scalar) => instructions::instruction_binary(
                Op::MatrixTimesScalar,
                result_type_id,
                id,
                left_id,
                right_id,
            ),
            (Bo::Multiply, Shape::Scalar, Shape::Matrix) => instructions::instruction_binary(
                Op::MatrixTimesScalar,
                result_type_id,
                id,
                right_id,
                left_id,
            ),
            (Bo::Multiply, Shape::Vector(size), Shape::Scalar) => self
                .write_vector_scalar_multiply(
                    result_type_id,
                    id,
                    left_id,
                    right_id,
                    kind,
                    size,
                    block,
                )?,
            (Bo::Multiply, Shape::Scalar, Shape::Vector(size)) => self
                .write_vector_scalar_multiply(
                    result_type_id,
                    id,
                    right_id,
                    left_id,
                    kind,
                    size,
                    block,
                )?,
            _ => {
                let kind = kind.ok_or(Error::Validation("binary operand has no scalar kind"))?;

                // Integer division and remainder are undefined on a zero
                // divisor (and `INT_MIN / -1`); they go through the guard
                // functions instead of the raw opcodes.
                let helper_op = match (op, kind) {
                    (Bo::Divide, Sk::Sint) | (Bo::Divide, Sk::Uint) => Some(HelperOp::Div),
                    (Bo::Modulo, Sk::Sint) | (Bo::Modulo, Sk::Uint) => Some(HelperOp::Mod),
                    _ => None,
                };
                if let Some(helper_op) = helper_op {
                    let (width, vector_size) = {
                        let inner = resolution(ir_function, left)?.inner_with(&module.types);
                        let size = match *inner {
                            Ti::Vector { size, .. } => Some(size),
                            _ => None,
                        };
                        (
                            inner
                                .scalar_width()
                                .ok_or(Error::Validation("binary operand has no width"))?,
                            size,
                        )
                    };
                    let helper_id = self.get_helper_function(
                        HelperKey {
                            op: helper_op,
                            kind,
                            width,
                            vector_size,
                        },
                        &module.types,
                    )?;
                    block.body.push(instructions::instruction_function_call(
                        result_type_id,
                        id,
                        helper_id,
                        &[left_id, right_id],
                    ));
                    return Ok(id);
                }

                let spv_op = match op {
                    Bo::Add => match kind {
                        Sk::Float => Op::FAdd,
                        Sk::Sint | Sk::Uint => Op::IAdd,
                        Sk::Bool => return Err(Error::Validation("cannot add booleans")),
                    },
                    Bo::Subtract => match kind {
                        Sk::Float => Op::FSub,
                        Sk::Sint | Sk::Uint => Op::ISub,
                        Sk::Bool => return Err(Error::Validation("cannot subtract booleans")),
                    },
                    Bo::Multiply => match kind {
                        Sk::Float => Op::FMul,
                        Sk::Sint | Sk::Uint => Op::IMul,
                        Sk::Bool => return Err(Error::Validation("cannot multiply booleans")),
                    },
                    Bo::Divide => match kind {
                        Sk::Float => Op::FDiv,
                        Sk::Sint => Op::SDiv,
                        Sk::Uint => Op::UDiv,
                        Sk::Bool => return Err(Error::Validation("cannot divide booleans")),
                    },
                    Bo::Modulo => match kind {
                        Sk::Float => Op::FRem,
                        Sk::Sint => Op::SRem,
                        Sk::Uint => Op::UMod,
                        Sk::Bool => return Err(Error::Validation("cannot modulo booleans")),
                    },
                    Bo::Equal => match kind {
                        Sk::Float => Op::FOrdEqual,
                        Sk::Sint | Sk::Uint => Op::IEqual,
                        Sk::Bool => Op::LogicalEqual,
                    },
                    Bo::NotEqual => match kind {
                        Sk::Float => Op::FOrdNotEqual,
                        Sk::Sint | Sk::Uint => Op::INotEqual,
                        Sk::Bool => Op::LogicalNotEqual,
                    },
                    Bo::Less => match kind {
                        Sk::Float => Op::FOrdLessThan,
                        Sk::Sint => Op::SLessThan,
                        Sk::Uint => Op::ULessThan,
                        Sk::Bool => return Err(Error::Validation("cannot compare booleans")),
                    },
                    Bo::LessEqual => match kind {
                        Sk::Float => Op::FOrdLessThanEqual,
                        Sk::Sint => Op::SLessThanEqual,
                        Sk::Uint => Op::ULessThanEqual,
                        Sk::Bool => return Err(Error::Validation("cannot compare booleans")),
                    },
                    Bo::Greater => match kind {
                        Sk::Float => Op::FOrdGreaterThan,
                        Sk::Sint => Op::SGreaterThan,
                        Sk::Uint => Op::UGreaterThan,
                        Sk::Bool => return Err(Error::Validation("cannot compare booleans")),
                    },
                    Bo::GreaterEqual => match kind {
                        Sk::Float => Op::FOrdGreaterThanEqual,
                        Sk::Sint => Op::SGreaterThanEqual,
                        Sk::Uint => Op::UGreaterThanEqual,
                        Sk::Bool => return Err(Error::Validation("cannot compare booleans")),
                    },
                    Bo::And => Op::BitwiseAnd,
                    Bo::ExclusiveOr => Op::BitwiseXor,
                    Bo::InclusiveOr => Op::BitwiseOr,
                    Bo::LogicalAnd => Op::LogicalAnd,
                    Bo::LogicalOr => Op::LogicalOr,
                    Bo::ShiftLeft => Op::ShiftLeftLogical,
                    Bo::ShiftRight => match kind {
                        Sk::Sint => Op::ShiftRightArithmetic,
                        Sk::Uint => Op::ShiftRightLogical,
                        _ => return Err(Error::Validation("cannot shift this operand")),
                    },
                };
                instructions::instruction_binary(spv_op, result_type_id, id, left_id, right_id)
            }
        };
        block.body.push(instruction);
        Ok(id)
    }

    /// The `vec * scalar` product. Floats have `OpVectorTimesScalar`;
    /// integers have no mixed form, so the scalar is broadcast into a vector
    /// before a plain `OpIMul`.
    #[allow(clippy::too_many_arguments)]
    fn write_vector_scalar_multiply(
        &mut self,
        result_type_id: Word,
        id: Word,
        vector_id: Word,
        scalar_id: Word,
        kind: Option<crate::ScalarKind>,
        size: crate::VectorSize,
        block: &mut Block,
    ) -> Result<Instruction, Error> {
        Ok(match kind {
            Some(crate::ScalarKind::Float) => instructions::instruction_vector_times_scalar(
                result_type_id,
                id,
                vector_id,
                scalar_id,
            ),
            Some(crate::ScalarKind::Sint) | Some(crate::ScalarKind::Uint) => {
                let splat_id = self.id_gen.next();
                let components = vec![scalar_id; size as usize];
                block.body.push(instructions::instruction_composite_construct(
                    result_type_id,
                    splat_id,
                    &components,
                ));
                instructions::instruction_binary(Op::IMul, result_type_id, id, vector_id, splat_id)
            }
            _ => {
                return Err(Error::Validation(
                    "cannot multiply this vector and scalar",
                ))
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn write_math_function(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        fun: crate::MathFunction,
        arg: Handle<crate::Expression>,
        arg1: Option<Handle<crate::Expression>>,
        arg2: Option<Handle<crate::Expression>>,
        arg3: Option<Handle<crate::Expression>>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        use crate::MathFunction as Mf;
        use spirv::GLOp;

        let arg0_id = self.cache_expression_value(arg, block, module, ir_function, function)?;
        let arg1_id = match arg1 {
            Some(arg1) => {
                Some(self.cache_expression_value(arg1, block, module, ir_function, function)?)
            }
            None => None,
        };
        let arg2_id = match arg2 {
            Some(arg2) => {
                Some(self.cache_expression_value(arg2, block, module, ir_function, function)?)
            }
            None => None,
        };
        let arg3_id = match arg3 {
            Some(arg3) => {
                Some(self.cache_expression_value(arg3, block, module, ir_function, function)?)
            }
            None => None,
        };

        let (kind, width, vector_size) = {
            let inner = resolution(ir_function, arg)?.inner_with(&module.types);
            let size = match *inner {
                crate::TypeInner::Vector { size, .. } => Some(size),
                _ => None,
            };
            (
                inner
                    .scalar_kind()
                    .ok_or(Error::Validation("math argument has no scalar kind"))?,
                inner
                    .scalar_width()
                    .ok_or(Error::Validation("math argument has no width"))?,
                size,
            )
        };

        let result_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
        let id = self.id_gen.next();

        enum MathOp {
            Ext(GLOp),
            Custom(Op),
        }

        let missing = Error::Validation("missing math function argument");
        let math_op = match fun {
            Mf::Abs => match kind {
                crate::ScalarKind::Float => MathOp::Ext(GLOp::FAbs),
                crate::ScalarKind::Sint => {
                    // `SAbs` of INT_MIN overflows; run the guard
                    let helper_id = self.get_helper_function(
                        HelperKey {
                            op: HelperOp::Abs,
                            kind,
                            width,
                            vector_size,
                        },
                        &module.types,
                    )?;
                    block.body.push(instructions::instruction_function_call(
                        result_type_id,
                        id,
                        helper_id,
                        &[arg0_id],
                    ));
                    return Ok(id);
                }
                _ => return Err(Error::Validation("cannot take the absolute value")),
            },
            Mf::Min => MathOp::Ext(match kind {
                crate::ScalarKind::Float => GLOp::FMin,
                crate::ScalarKind::Sint => GLOp::SMin,
                _ => GLOp::UMin,
            }),
            Mf::Max => MathOp::Ext(match kind {
                crate::ScalarKind::Float => GLOp::FMax,
                crate::ScalarKind::Sint => GLOp::SMax,
                _ => GLOp::UMax,
            }),
            Mf::Clamp => MathOp::Ext(match kind {
                crate::ScalarKind::Float => GLOp::FClamp,
                crate::ScalarKind::Sint => GLOp::SClamp,
                _ => GLOp::UClamp,
            }),
            Mf::Saturate => {
                let (one_id, zero_id) =
                    self.write_one_zero_constants(kind, width, vector_size, &module.types)?;
                block.body.push(instructions::instruction_ext_inst(
                    self.gl450_ext_inst_id,
                    GLOp::FClamp,
                    result_type_id,
                    id,
                    &[arg0_id, zero_id, one_id],
                ));
                return Ok(id);
            }
            Mf::Cos => MathOp::Ext(GLOp::Cos),
            Mf::Cosh => MathOp::Ext(GLOp::Cosh),
            Mf::Sin => MathOp::Ext(GLOp::Sin),
            Mf::Sinh => MathOp::Ext(GLOp::Sinh),
            Mf::Tan => MathOp::Ext(GLOp::Tan),
            Mf::Tanh => MathOp::Ext(GLOp::Tanh),
            Mf::Acos => MathOp::Ext(GLOp::Acos),
            Mf::Asin => MathOp::Ext(GLOp::Asin),
            Mf::Atan => MathOp::Ext(GLOp::Atan),
            Mf::Atan2 => MathOp::Ext(GLOp::Atan2),
            Mf::Asinh => MathOp::Ext(GLOp::Asinh),
            Mf::Acosh => MathOp::Ext(GLOp::Acosh),
            Mf::Atanh => MathOp::Ext(GLOp::Atanh),
            Mf::Radians => MathOp::Ext(GLOp::Radians),
            Mf::Degrees => MathOp::Ext(GLOp::Degrees),
            Mf::Ceil => MathOp::Ext(GLOp::Ceil),
            Mf::Floor => MathOp::Ext(GLOp::Floor),
            Mf::Round => MathOp::Ext(GLOp::RoundEven),
            Mf::Fract => MathOp::Ext(GLOp::Fract),
            Mf::Trunc => MathOp::Ext(GLOp::Trunc),
            Mf::Modf => MathOp::Ext(GLOp::ModfStruct),
            Mf::Frexp => MathOp::Ext(GLOp::FrexpStruct),
            Mf::Ldexp => MathOp::Ext(GLOp::Ldexp),
            Mf::Exp => MathOp::Ext(GLOp::Exp),
            Mf::Exp2 => MathOp::Ext(GLOp::Exp2),
            Mf::Log => MathOp::Ext(GLOp::Log),
            Mf::Log2 => MathOp::Ext(GLOp::Log2),
            Mf::Pow => MathOp::Ext(GLOp::Pow),
            Mf::Dot => MathOp::Custom(Op::Dot),
            Mf::Cross => MathOp::Ext(GLOp::Cross),
            Mf::Distance => MathOp::Ext(GLOp::Distance),
            Mf::Length => MathOp::Ext(GLOp::Length),
            Mf::Normalize => MathOp::Ext(GLOp::Normalize),
            Mf::FaceForward => MathOp::Ext(GLOp::FaceForward),
            Mf::Reflect => MathOp::Ext(GLOp::Reflect),
            Mf::Refract => MathOp::Ext(GLOp::Refract),
            Mf::Sign => MathOp::Ext(match kind {
                crate::ScalarKind::Sint => GLOp::SSign,
                _ => GLOp::FSign,
            }),
            Mf::Fma => MathOp::Ext(GLOp::Fma),
            Mf::Mix => MathOp::Ext(GLOp::FMix),
            Mf::Step => MathOp::Ext(GLOp::Step),
            Mf::SmoothStep => MathOp::Ext(GLOp::SmoothStep),
            Mf::Sqrt => MathOp::Ext(GLOp::Sqrt),
            Mf::InverseSqrt => MathOp::Ext(GLOp::InverseSqrt),
            Mf::Transpose => MathOp::Custom(Op::Transpose),
            Mf::Determinant => MathOp::Ext(GLOp::Determinant),
            Mf::CountOneBits => MathOp::Custom(Op::BitCount),
            Mf::ReverseBits => MathOp::Custom(Op::BitReverse),
            Mf::ExtractBits => MathOp::Custom(match kind {
                crate::ScalarKind::Sint => Op::BitFieldSExtract,
                _ => Op::BitFieldUExtract,
            }),
            Mf::InsertBits => MathOp::Custom(Op::BitFieldInsert),
            Mf::FindLsb => MathOp::Ext(GLOp::FindILsb),
            Mf::FindMsb => MathOp::Ext(match kind {
                crate::ScalarKind::Sint => GLOp::FindSMsb,
                _ => GLOp::FindUMsb,
            }),
        };

        let mut operands = vec![arg0_id];
        let expected = fun.argument_count();
        if expected > 1 {
            operands.push(arg1_id.ok_or(missing.clone())?);
        }
        if expected > 2 {
            operands.push(arg2_id.ok_or(missing.clone())?);
        }
        if expected > 3 {
            operands.push(arg3_id.ok_or(missing)?);
        }

        let instruction = match math_op {
            MathOp::Ext(ext_op) => instructions::instruction_ext_inst(
                self.gl450_ext_inst_id,
                ext_op,
                result_type_id,
                id,
                &operands,
            ),
            MathOp::Custom(custom_op) => {
                let mut instruction = super::Instruction::new(custom_op);
                instruction.set_type(result_type_id);
                instruction.set_result(id);
                for operand in operands {
                    instruction.add_operand(operand);
                }
                instruction
            }
        };
        block.body.push(instruction);
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_cast(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        expr: Handle<crate::Expression>,
        kind: crate::ScalarKind,
        convert: Option<crate::Bytes>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        use crate::ScalarKind as Sk;

        let operand_id = self.cache_expression_value(expr, block, module, ir_function, function)?;
        let (src_kind, src_width, vector_size) = {
            let inner = resolution(ir_function, expr)?.inner_with(&module.types);
            let size = match *inner {
                crate::TypeInner::Vector { size, .. } => Some(size),
                _ => None,
            };
            (
                inner
                    .scalar_kind()
                    .ok_or(Error::Validation("cast operand has no scalar kind"))?,
                inner
                    .scalar_width()
                    .ok_or(Error::Validation("cast operand has no width"))?,
                size,
            )
        };
        let result_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;

        let convert = match convert {
            // Without a width this is a bit cast.
            None => {
                if src_kind == kind {
                    return Ok(operand_id);
                }
                let id = self.id_gen.next();
                block
                    .body
                    .push(instructions::instruction_bit_cast(result_type_id, id, operand_id));
                return Ok(id);
            }
            Some(dst_width) => dst_width,
        };

        let op = match (src_kind, kind) {
            (Sk::Bool, Sk::Bool) => return Ok(operand_id),
            // Booleans have no portable representation; a select over
            // constants is the only sound lowering.
            (Sk::Bool, _) => {
                let (one_id, zero_id) =
                    self.write_one_zero_constants(kind, convert, vector_size, &module.types)?;
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_select(
                    result_type_id,
                    id,
                    operand_id,
                    one_id,
                    zero_id,
                ));
                return Ok(id);
            }
            (_, Sk::Bool) => {
                let zero_id = {
                    let src_type_id = match vector_size {
                        Some(size) => self.get_type_id(
                            &module.types,
                            LocalType::vector(size, src_kind, src_width).into(),
                        )?,
                        None => self.get_type_id(
                            &module.types,
                            LocalType::scalar(src_kind, src_width).into(),
                        )?,
                    };
                    self.write_null_constant(src_type_id)
                };
                let op = match src_kind {
                    Sk::Float => Op::FUnordNotEqual,
                    _ => Op::INotEqual,
                };
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_binary(
                    op,
                    result_type_id,
                    id,
                    operand_id,
                    zero_id,
                ));
                return Ok(id);
            }
            (Sk::Float, Sk::Float) => {
                if src_width == convert {
                    return Ok(operand_id);
                }
                Op::FConvert
            }
            (Sk::Float, Sk::Sint) | (Sk::Float, Sk::Uint) => {
                // the raw conversions are undefined on NaN and out-of-range
                // input; 32-bit casts run the clamping guard instead
                if src_width == 4 && convert == 4 {
                    let helper_op = if kind == Sk::Sint {
                        HelperOp::F2I32
                    } else {
                        HelperOp::F2U32
                    };
                    let helper_id = self.get_helper_function(
                        HelperKey {
                            op: helper_op,
                            kind,
                            width: convert,
                            vector_size,
                        },
                        &module.types,
                    )?;
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_function_call(
                        result_type_id,
                        id,
                        helper_id,
                        &[operand_id],
                    ));
                    return Ok(id);
                }
                if kind == Sk::Sint {
                    Op::ConvertFToS
                } else {
                    Op::ConvertFToU
                }
            }
            (Sk::Sint, Sk::Float) => Op::ConvertSToF,
            (Sk::Uint, Sk::Float) => Op::ConvertUToF,
            (Sk::Sint, Sk::Sint) => {
                if src_width == convert {
                    return Ok(operand_id);
                }
                Op::SConvert
            }
            (Sk::Uint, Sk::Uint) => {
                if src_width == convert {
                    return Ok(operand_id);
                }
                Op::UConvert
            }
            (Sk::Sint, Sk::Uint) | (Sk::Uint, Sk::Sint) => {
                if src_width == convert {
                    Op::Bitcast
                } else {
                    return Err(Error::FeatureNotImplemented(
                        "cast between integer kinds of different widths",
                    ));
                }
            }
        };

        let id = self.id_gen.next();
        block.body.push(instructions::instruction_unary(
            op,
            result_type_id,
            id,
            operand_id,
        ));
        Ok(id)
    }
}
