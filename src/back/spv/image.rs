//! Image sampling, loads, stores and queries.
//!
//! Opcode selection follows the combination of depth reference, level kind,
//! offset and gather flag; coordinates and array indices are merged into one
//! vector because SPIR-V addresses array layers through an extra component.

use super::{block::resolution, instructions, Block, Error, Function, LocalType, Writer};
use crate::arena::Handle;
use spirv::{Op, Word};

fn vector_size_from_comps(comps: usize) -> Result<crate::VectorSize, Error> {
    Ok(match comps {
        2 => crate::VectorSize::Bi,
        3 => crate::VectorSize::Tri,
        4 => crate::VectorSize::Quad,
        _ => return Err(Error::Validation("invalid image coordinate size")),
    })
}

impl Writer {
    /// Merge the coordinate vector and the array index into the single
    /// coordinate operand SPIR-V expects.
    #[allow(clippy::too_many_arguments)]
    fn write_image_coordinates(
        &mut self,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        let coordinate_id =
            self.cache_expression_value(coordinate, block, module, ir_function, function)?;
        let array_index = match array_index {
            Some(array_index) => array_index,
            None => return Ok(coordinate_id),
        };

        let (size, kind, width) = {
            match *resolution(ir_function, coordinate)?.inner_with(&module.types) {
                crate::TypeInner::Scalar { kind, width } => (None, kind, width),
                crate::TypeInner::Vector { size, kind, width } => (Some(size), kind, width),
                _ => return Err(Error::Validation("image coordinate is not a numeric value")),
            }
        };

        let mut array_id =
            self.cache_expression_value(array_index, block, module, ir_function, function)?;
        let array_kind = resolution(ir_function, array_index)?
            .inner_with(&module.types)
            .scalar_kind()
            .ok_or(Error::Validation("array index is not a scalar"))?;
        if array_kind != kind {
            let scalar_type_id =
                self.get_type_id(&module.types, LocalType::scalar(kind, width).into())?;
            let op = match (array_kind, kind) {
                (crate::ScalarKind::Sint, crate::ScalarKind::Float) => Op::ConvertSToF,
                (crate::ScalarKind::Uint, crate::ScalarKind::Float) => Op::ConvertUToF,
                (crate::ScalarKind::Sint, crate::ScalarKind::Uint)
                | (crate::ScalarKind::Uint, crate::ScalarKind::Sint) => Op::Bitcast,
                _ => return Err(Error::Validation("array index kind mismatch")),
            };
            let converted_id = self.id_gen.next();
            block.body.push(instructions::instruction_unary(
                op,
                scalar_type_id,
                converted_id,
                array_id,
            ));
            array_id = converted_id;
        }

        let merged_size = match size {
            None => crate::VectorSize::Bi,
            Some(crate::VectorSize::Bi) => crate::VectorSize::Tri,
            Some(crate::VectorSize::Tri) => crate::VectorSize::Quad,
            Some(crate::VectorSize::Quad) => {
                return Err(Error::Validation("image coordinate is too wide to extend"))
            }
        };
        let merged_type_id =
            self.get_type_id(&module.types, LocalType::vector(merged_size, kind, width).into())?;
        let id = self.id_gen.next();
        block.body.push(instructions::instruction_composite_construct(
            merged_type_id,
            id,
            &[coordinate_id, array_id],
        ));
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn write_image_sample(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        image: Handle<crate::Expression>,
        sampler: Handle<crate::Expression>,
        gather: Option<crate::SwizzleComponent>,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        offset: Option<Handle<crate::Constant>>,
        level: crate::SampleLevel,
        depth_ref: Option<Handle<crate::Expression>>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        let image_id = self.cache_expression_value(image, block, module, ir_function, function)?;
        let sampler_id =
            self.cache_expression_value(sampler, block, module, ir_function, function)?;
        let coordinates_id = self.write_image_coordinates(
            coordinate,
            array_index,
            block,
            module,
            ir_function,
            function,
        )?;
        let depth_ref_id = match depth_ref {
            Some(depth_ref) => Some(self.cache_expression_value(
                depth_ref,
                block,
                module,
                ir_function,
                function,
            )?),
            None => None,
        };

        let mut mask = spirv::ImageOperands::empty();
        let mut mask_operands = Vec::new();
        if gather.is_none() {
            match level {
                crate::SampleLevel::Auto => {}
                crate::SampleLevel::Zero => {
                    mask |= spirv::ImageOperands::LOD;
                    let zero_id = self.write_scalar_constant(
                        &crate::ScalarValue::Float(0.0),
                        4,
                        &module.types,
                    )?;
                    mask_operands.push(zero_id);
                }
                crate::SampleLevel::Exact(lod) => {
                    mask |= spirv::ImageOperands::LOD;
                    let lod_id =
                        self.cache_expression_value(lod, block, module, ir_function, function)?;
                    mask_operands.push(lod_id);
                }
                crate::SampleLevel::Bias(bias) => {
                    mask |= spirv::ImageOperands::BIAS;
                    let bias_id =
                        self.cache_expression_value(bias, block, module, ir_function, function)?;
                    mask_operands.push(bias_id);
                }
                crate::SampleLevel::Gradient { x, y } => {
                    mask |= spirv::ImageOperands::GRAD;
                    let x_id =
                        self.cache_expression_value(x, block, module, ir_function, function)?;
                    let y_id =
                        self.cache_expression_value(y, block, module, ir_function, function)?;
                    mask_operands.push(x_id);
                    mask_operands.push(y_id);
                }
            }
        }
        if let Some(offset) = offset {
            module.constants.try_get(offset)?;
            mask |= spirv::ImageOperands::CONST_OFFSET;
            mask_operands.push(self.constant_ids[offset.index()]);
        }

        let gather_component_id = match gather {
            Some(component) => Some(self.get_index_constant(component as u32, &module.types)?),
            None => None,
        };

        let image_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, image)?)?;
        let sampled_image_type_id = self.get_type_id(
            &module.types,
            LocalType::SampledImage { image_type_id }.into(),
        )?;
        let sampled_image_id = self.id_gen.next();
        block.body.push(instructions::instruction_sampled_image(
            sampled_image_type_id,
            sampled_image_id,
            image_id,
            sampler_id,
        ));

        let result_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;

        let op = match (depth_ref_id, gather) {
            (None, None) => match level {
                crate::SampleLevel::Auto | crate::SampleLevel::Bias(_) => {
                    Op::ImageSampleImplicitLod
                }
                _ => Op::ImageSampleExplicitLod,
            },
            (None, Some(_)) => Op::ImageGather,
            (Some(_), None) => match level {
                crate::SampleLevel::Auto | crate::SampleLevel::Bias(_) => {
                    Op::ImageSampleDrefImplicitLod
                }
                _ => Op::ImageSampleDrefExplicitLod,
            },
            (Some(_), Some(_)) => Op::ImageDrefGather,
        };

        let id = self.id_gen.next();
        let mut instruction = instructions::instruction_image_sample(
            op,
            result_type_id,
            id,
            sampled_image_id,
            coordinates_id,
        );
        if let Some(dref_id) = depth_ref_id {
            instruction.add_operand(dref_id);
        } else if let Some(component_id) = gather_component_id {
            instruction.add_operand(component_id);
        }
        if !mask.is_empty() {
            instruction.add_operand(mask.bits());
            for operand in mask_operands {
                instruction.add_operand(operand);
            }
        }
        block.body.push(instruction);
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn write_image_load(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        image: Handle<crate::Expression>,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        index: Option<Handle<crate::Expression>>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        let image_id = self.cache_expression_value(image, block, module, ir_function, function)?;
        let coordinates_id = self.write_image_coordinates(
            coordinate,
            array_index,
            block,
            module,
            ir_function,
            function,
        )?;
        let class = match *resolution(ir_function, image)?.inner_with(&module.types) {
            crate::TypeInner::Image { class, .. } => class,
            _ => return Err(Error::Validation("image load of a non-image")),
        };
        let result_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;
        let id = self.id_gen.next();

        let instruction = match class {
            crate::ImageClass::Storage { .. } => instructions::instruction_image_fetch_or_read(
                Op::ImageRead,
                result_type_id,
                id,
                image_id,
                coordinates_id,
            ),
            crate::ImageClass::Sampled { multi, .. } | crate::ImageClass::Depth { multi } => {
                let mut instruction = instructions::instruction_image_fetch_or_read(
                    Op::ImageFetch,
                    result_type_id,
                    id,
                    image_id,
                    coordinates_id,
                );
                if multi {
                    let sample_id = index
                        .map(|index| {
                            self.cache_expression_value(index, block, module, ir_function, function)
                        })
                        .transpose()?
                        .ok_or(Error::Validation("multisampled fetch needs a sample index"))?;
                    instruction.add_operand(spirv::ImageOperands::SAMPLE.bits());
                    instruction.add_operand(sample_id);
                } else if let Some(level) = index {
                    let level_id =
                        self.cache_expression_value(level, block, module, ir_function, function)?;
                    instruction.add_operand(spirv::ImageOperands::LOD.bits());
                    instruction.add_operand(level_id);
                }
                instruction
            }
        };
        block.body.push(instruction);
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn write_image_query(
        &mut self,
        expr_handle: Handle<crate::Expression>,
        image: Handle<crate::Expression>,
        query: crate::ImageQuery,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<Word, Error> {
        self.require(spirv::Capability::ImageQuery)?;

        let image_id = self.cache_expression_value(image, block, module, ir_function, function)?;
        let (dim, arrayed, class) = {
            match *resolution(ir_function, image)?.inner_with(&module.types) {
                crate::TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => (dim, arrayed, class),
                _ => return Err(Error::Validation("image query of a non-image")),
            }
        };
        let result_type_id =
            self.get_expression_type_id(&module.types, resolution(ir_function, expr_handle)?)?;

        let multi = match class {
            crate::ImageClass::Sampled { multi, .. } | crate::ImageClass::Depth { multi } => multi,
            crate::ImageClass::Storage { .. } => false,
        };

        let dim_comps = match dim {
            crate::ImageDimension::D1 => 1,
            crate::ImageDimension::D2 | crate::ImageDimension::Cube => 2,
            crate::ImageDimension::D3 => 3,
        };
        let query_comps = dim_comps + arrayed as usize;

        let query_type_id = if query_comps == 1 {
            self.get_type_id(
                &module.types,
                LocalType::scalar(crate::ScalarKind::Uint, 4).into(),
            )?
        } else {
            let size = vector_size_from_comps(query_comps)?;
            self.get_type_id(
                &module.types,
                LocalType::vector(size, crate::ScalarKind::Uint, 4).into(),
            )?
        };

        let write_size_query = |writer: &mut Self,
                                block: &mut Block,
                                lod_id: Option<Word>|
         -> Word {
            let id = writer.id_gen.next();
            let (op, lod) = if multi || matches!(class, crate::ImageClass::Storage { .. }) {
                (Op::ImageQuerySize, None)
            } else {
                (Op::ImageQuerySizeLod, lod_id)
            };
            let mut instruction =
                instructions::instruction_image_query(op, query_type_id, id, image_id);
            if let Some(lod_id) = lod {
                instruction.add_operand(lod_id);
            }
            block.body.push(instruction);
            id
        };

        let id = match query {
            crate::ImageQuery::Size { level } => {
                let lod_id = match level {
                    Some(level) => {
                        self.cache_expression_value(level, block, module, ir_function, function)?
                    }
                    None => self.get_index_constant(0, &module.types)?,
                };
                let queried_id = write_size_query(self, block, Some(lod_id));
                if query_comps == dim_comps {
                    queried_id
                } else if dim_comps == 1 {
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_composite_extract(
                        result_type_id,
                        id,
                        queried_id,
                        &[0],
                    ));
                    id
                } else {
                    let components: Vec<Word> = (0..dim_comps as u32).collect();
                    let id = self.id_gen.next();
                    block.body.push(instructions::instruction_vector_shuffle(
                        result_type_id,
                        id,
                        queried_id,
                        queried_id,
                        &components,
                    ));
                    id
                }
            }
            crate::ImageQuery::NumLevels => {
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_image_query(
                    Op::ImageQueryLevels,
                    result_type_id,
                    id,
                    image_id,
                ));
                id
            }
            crate::ImageQuery::NumLayers => {
                if !arrayed {
                    return Err(Error::Validation("layer count of a non-arrayed image"));
                }
                let lod_id = self.get_index_constant(0, &module.types)?;
                let queried_id = write_size_query(self, block, Some(lod_id));
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_composite_extract(
                    result_type_id,
                    id,
                    queried_id,
                    &[query_comps as u32 - 1],
                ));
                id
            }
            crate::ImageQuery::NumSamples => {
                let id = self.id_gen.next();
                block.body.push(instructions::instruction_image_query(
                    Op::ImageQuerySamples,
                    result_type_id,
                    id,
                    image_id,
                ));
                id
            }
        };
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn write_image_store(
        &mut self,
        image: Handle<crate::Expression>,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        value: Handle<crate::Expression>,
        block: &mut Block,
        module: &crate::Module,
        ir_function: &crate::Function,
        function: &mut Function,
    ) -> Result<(), Error> {
        let image_id = self.cache_expression_value(image, block, module, ir_function, function)?;
        let coordinates_id = self.write_image_coordinates(
            coordinate,
            array_index,
            block,
            module,
            ir_function,
            function,
        )?;
        let value_id = self.cache_expression_value(value, block, module, ir_function, function)?;
        block.body.push(instructions::instruction_image_write(
            image_id,
            coordinates_id,
            value_id,
        ));
        Ok(())
    }
}
