//! On-demand `_glaive_*` guard functions.
//!
//! `OpSDiv`/`OpUDiv`/`OpSRem`/`OpUMod` are undefined on a zero divisor (and
//! `INT_MIN / -1`), `OpSNegate` and `SAbs` overflow on `INT_MIN`, and
//! `OpConvertFToS`/`OpConvertFToU` are undefined on NaN or out-of-range
//! input. Each guarded operation becomes a small function emitted once per
//! operand shape; `OpFunctionCall` may forward-reference them, so call sites
//! never depend on emission order.

use super::{
    instructions, Error, HelperKey, HelperOp, Instruction, LocalType, LookupFunctionType, Writer,
    WriterFlags,
};
use spirv::{Op, Word};

impl Writer {
    pub(super) fn get_helper_function(
        &mut self,
        key: HelperKey,
        types: &crate::Arena<crate::Type>,
    ) -> Result<Word, Error> {
        if let Some(&id) = self.cached_helpers.get(&key) {
            return Ok(id);
        }
        let id = self.write_helper_function(key, types)?;
        self.cached_helpers.insert(key, id);
        Ok(id)
    }

    /// A constant of the helper's shape: the scalar itself, or a splat of it.
    fn helper_constant(
        &mut self,
        value: &crate::ScalarValue,
        width: crate::Bytes,
        vector_size: Option<crate::VectorSize>,
        types: &crate::Arena<crate::Type>,
    ) -> Result<Word, Error> {
        let scalar_id = self.write_scalar_constant(value, width, types)?;
        match vector_size {
            None => Ok(scalar_id),
            Some(size) => {
                let vector_type_id = self.get_type_id(
                    types,
                    LocalType::vector(size, value.scalar_kind(), width).into(),
                )?;
                let id = self.id_gen.next();
                let components = vec![scalar_id; size as usize];
                instructions::instruction_constant_composite(vector_type_id, id, &components)
                    .to_words(&mut self.logical_layout.declarations);
                Ok(id)
            }
        }
    }

    fn write_helper_function(
        &mut self,
        key: HelperKey,
        types: &crate::Arena<crate::Type>,
    ) -> Result<Word, Error> {
        let value_type_id = match key.vector_size {
            Some(size) => {
                self.get_type_id(types, LocalType::vector(size, key.kind, key.width).into())?
            }
            None => self.get_type_id(types, LocalType::scalar(key.kind, key.width).into())?,
        };
        let bool_type_id = match key.vector_size {
            Some(size) => self.get_type_id(
                types,
                LocalType::vector(size, crate::ScalarKind::Bool, crate::BOOL_WIDTH).into(),
            )?,
            None => self.get_type_id(
                types,
                LocalType::scalar(crate::ScalarKind::Bool, crate::BOOL_WIDTH).into(),
            )?,
        };

        let (param_type_id, param_count) = match key.op {
            HelperOp::Div | HelperOp::Mod => (value_type_id, 2),
            HelperOp::Abs | HelperOp::Neg => (value_type_id, 1),
            // the conversions take a float of the same shape
            HelperOp::F2I32 | HelperOp::F2U32 => {
                let float_id = match key.vector_size {
                    Some(size) => self.get_type_id(
                        types,
                        LocalType::vector(size, crate::ScalarKind::Float, 4).into(),
                    )?,
                    None => self
                        .get_type_id(types, LocalType::scalar(crate::ScalarKind::Float, 4).into())?,
                };
                (float_id, 1)
            }
        };

        let fn_type_id = self.get_function_type(LookupFunctionType {
            parameter_type_ids: vec![param_type_id; param_count],
            return_type_id: value_type_id,
        });

        let fun_id = self.id_gen.next();
        if self.flags.contains(WriterFlags::DEBUG) {
            self.debugs
                .push(instructions::instruction_name(fun_id, key.op.debug_name()));
        }

        let param_a_id = self.id_gen.next();
        let param_b_id = if param_count == 2 {
            Some(self.id_gen.next())
        } else {
            None
        };

        let int_min = match key.width {
            8 => i64::MIN,
            _ => i32::MIN as i64,
        };
        let (zero, one) = match key.kind {
            crate::ScalarKind::Sint => {
                (crate::ScalarValue::Sint(0), crate::ScalarValue::Sint(1))
            }
            _ => (crate::ScalarValue::Uint(0), crate::ScalarValue::Uint(1)),
        };

        let mut body: Vec<Instruction> = Vec::new();
        let return_id = match key.op {
            HelperOp::Div | HelperOp::Mod => {
                let b_id = param_b_id.unwrap();
                let zero_id = self.helper_constant(&zero, key.width, key.vector_size, types)?;
                let one_id = self.helper_constant(&one, key.width, key.vector_size, types)?;

                let zero_eq_id = self.id_gen.next();
                body.push(instructions::instruction_binary(
                    Op::IEqual,
                    bool_type_id,
                    zero_eq_id,
                    b_id,
                    zero_id,
                ));
                let bad_id = match key.kind {
                    crate::ScalarKind::Sint => {
                        let min_id = self.helper_constant(
                            &crate::ScalarValue::Sint(int_min),
                            key.width,
                            key.vector_size,
                            types,
                        )?;
                        let neg_one_id = self.helper_constant(
                            &crate::ScalarValue::Sint(-1),
                            key.width,
                            key.vector_size,
                            types,
                        )?;
                        let min_eq_id = self.id_gen.next();
                        body.push(instructions::instruction_binary(
                            Op::IEqual,
                            bool_type_id,
                            min_eq_id,
                            param_a_id,
                            min_id,
                        ));
                        let neg_one_eq_id = self.id_gen.next();
                        body.push(instructions::instruction_binary(
                            Op::IEqual,
                            bool_type_id,
                            neg_one_eq_id,
                            b_id,
                            neg_one_id,
                        ));
                        let overflow_id = self.id_gen.next();
                        body.push(instructions::instruction_binary(
                            Op::LogicalAnd,
                            bool_type_id,
                            overflow_id,
                            min_eq_id,
                            neg_one_eq_id,
                        ));
                        let bad_id = self.id_gen.next();
                        body.push(instructions::instruction_binary(
                            Op::LogicalOr,
                            bool_type_id,
                            bad_id,
                            zero_eq_id,
                            overflow_id,
                        ));
                        bad_id
                    }
                    _ => zero_eq_id,
                };
                let safe_id = self.id_gen.next();
                body.push(instructions::instruction_select(
                    value_type_id,
                    safe_id,
                    bad_id,
                    one_id,
                    b_id,
                ));
                let op = match (key.op, key.kind) {
                    (HelperOp::Div, crate::ScalarKind::Sint) => Op::SDiv,
                    (HelperOp::Div, _) => Op::UDiv,
                    (HelperOp::Mod, crate::ScalarKind::Sint) => Op::SRem,
                    (HelperOp::Mod, _) => Op::UMod,
                    _ => return Err(Error::Validation("unexpected guard function")),
                };
                let result_id = self.id_gen.next();
                body.push(instructions::instruction_binary(
                    op,
                    value_type_id,
                    result_id,
                    param_a_id,
                    safe_id,
                ));
                result_id
            }
            HelperOp::Abs | HelperOp::Neg => {
                let min_id = self.helper_constant(
                    &crate::ScalarValue::Sint(int_min),
                    key.width,
                    key.vector_size,
                    types,
                )?;
                let min_eq_id = self.id_gen.next();
                body.push(instructions::instruction_binary(
                    Op::IEqual,
                    bool_type_id,
                    min_eq_id,
                    param_a_id,
                    min_id,
                ));
                let raw_id = self.id_gen.next();
                match key.op {
                    HelperOp::Abs => body.push(instructions::instruction_ext_inst(
                        self.gl450_ext_inst_id,
                        spirv::GLOp::SAbs,
                        value_type_id,
                        raw_id,
                        &[param_a_id],
                    )),
                    _ => body.push(instructions::instruction_unary(
                        Op::SNegate,
                        value_type_id,
                        raw_id,
                        param_a_id,
                    )),
                }
                // INT_MIN passes through; everything else takes the raw value
                let result_id = self.id_gen.next();
                body.push(instructions::instruction_select(
                    value_type_id,
                    result_id,
                    min_eq_id,
                    param_a_id,
                    raw_id,
                ));
                result_id
            }
            HelperOp::F2I32 | HelperOp::F2U32 => {
                let nan_id = self.id_gen.next();
                body.push(instructions::instruction_unary(
                    Op::IsNan,
                    bool_type_id,
                    nan_id,
                    param_a_id,
                ));
                let zero_f_id = self.helper_constant(
                    &crate::ScalarValue::Float(0.0),
                    4,
                    key.vector_size,
                    types,
                )?;
                let sanitized_id = self.id_gen.next();
                body.push(instructions::instruction_select(
                    param_type_id,
                    sanitized_id,
                    nan_id,
                    zero_f_id,
                    param_a_id,
                ));
                let (low, high) = match key.op {
                    HelperOp::F2I32 => (-2147483600.0, 2147483500.0),
                    _ => (0.0, 4294967040.0),
                };
                let low_id = self.helper_constant(
                    &crate::ScalarValue::Float(low),
                    4,
                    key.vector_size,
                    types,
                )?;
                let high_id = self.helper_constant(
                    &crate::ScalarValue::Float(high),
                    4,
                    key.vector_size,
                    types,
                )?;
                let clamped_id = self.id_gen.next();
                body.push(instructions::instruction_ext_inst(
                    self.gl450_ext_inst_id,
                    spirv::GLOp::FClamp,
                    param_type_id,
                    clamped_id,
                    &[sanitized_id, low_id, high_id],
                ));
                let convert_op = match key.op {
                    HelperOp::F2I32 => Op::ConvertFToS,
                    _ => Op::ConvertFToU,
                };
                let result_id = self.id_gen.next();
                body.push(instructions::instruction_unary(
                    convert_op,
                    value_type_id,
                    result_id,
                    clamped_id,
                ));
                result_id
            }
        };

        // The whole function is flushed right away; callers serialize later.
        instructions::instruction_function(
            value_type_id,
            fun_id,
            spirv::FunctionControl::NONE,
            fn_type_id,
        )
        .to_words(&mut self.logical_layout.function_definitions);
        instructions::instruction_function_parameter(param_type_id, param_a_id)
            .to_words(&mut self.logical_layout.function_definitions);
        if let Some(b_id) = param_b_id {
            instructions::instruction_function_parameter(param_type_id, b_id)
                .to_words(&mut self.logical_layout.function_definitions);
        }
        let label_id = self.id_gen.next();
        instructions::instruction_label(label_id)
            .to_words(&mut self.logical_layout.function_definitions);
        for instruction in body {
            instruction.to_words(&mut self.logical_layout.function_definitions);
        }
        instructions::instruction_return_value(return_id)
            .to_words(&mut self.logical_layout.function_definitions);
        instructions::instruction_function_end()
            .to_words(&mut self.logical_layout.function_definitions);

        Ok(fun_id)
    }
}
