use super::{
    helpers, instructions, instructions::Signedness, Block, CachedConstant, EntryPointContext,
    Error, Function, GlobalVariable, IdGenerator, Instruction, LocalType, LocalVariable,
    LogicalLayout, LookupFunctionType, LookupType, Options, PendingLocalInit, PhysicalLayout,
    ResultMember, Writer, WriterFlags,
};
use crate::{arena::Handle, proc::TypeResolution};
use spirv::Word;

const SUPPORTED_VERSIONS: &[(u8, u8)] = &[(1, 0), (1, 1), (1, 2), (1, 3), (1, 4), (1, 5), (1, 6)];

impl LocalType {
    pub(super) fn scalar(kind: crate::ScalarKind, width: crate::Bytes) -> Self {
        LocalType::Value {
            vector_size: None,
            kind,
            width,
            pointer_class: None,
        }
    }

    pub(super) fn vector(
        size: crate::VectorSize,
        kind: crate::ScalarKind,
        width: crate::Bytes,
    ) -> Self {
        LocalType::Value {
            vector_size: Some(size),
            kind,
            width,
            pointer_class: None,
        }
    }
}

/// Construct the `LocalType` alias of a module type, when one exists.
///
/// Simple types are interned through their `LocalType` key, so that a module
/// type and a synthesized intermediate type share one declaration.
fn make_local(inner: &crate::TypeInner) -> Option<LocalType> {
    Some(match *inner {
        crate::TypeInner::Scalar { kind, width } | crate::TypeInner::Atomic { kind, width } => {
            LocalType::scalar(kind, width)
        }
        crate::TypeInner::Vector { size, kind, width } => LocalType::vector(size, kind, width),
        crate::TypeInner::Matrix {
            columns,
            rows,
            width,
        } => LocalType::Matrix {
            columns,
            rows,
            width,
        },
        crate::TypeInner::Pointer { base, space } => LocalType::Pointer {
            base,
            class: helpers::map_address_space(space),
        },
        crate::TypeInner::ValuePointer {
            size,
            kind,
            width,
            space,
        } => LocalType::Value {
            vector_size: size,
            kind,
            width,
            pointer_class: Some(helpers::map_address_space(space)),
        },
        crate::TypeInner::Image {
            dim,
            arrayed,
            class,
        } => LocalType::Image {
            dim,
            arrayed,
            class,
        },
        crate::TypeInner::Sampler { comparison: _ } => LocalType::Sampler,
        _ => return None,
    })
}

impl Writer {
    pub fn new(options: &Options) -> Result<Self, Error> {
        let (major, minor) = options.lang_version;
        if !SUPPORTED_VERSIONS.contains(&(major, minor)) {
            return Err(Error::UnsupportedVersion(major, minor));
        }

        let mut id_gen = IdGenerator::default();
        let gl450_ext_inst_id = id_gen.next();
        let void_type = id_gen.next();

        Ok(Writer {
            physical_layout: PhysicalLayout::new(options.lang_version),
            logical_layout: LogicalLayout::default(),
            lang_version: options.lang_version,
            id_gen,
            capabilities: crate::FastHashSet::default(),
            allowed_caps: options.capabilities.clone(),
            debugs: Vec::new(),
            annotations: Vec::new(),
            flags: options.flags,
            void_type,
            lookup_type: crate::FastHashMap::default(),
            lookup_function: crate::FastHashMap::default(),
            lookup_function_type: crate::FastHashMap::default(),
            constant_ids: Vec::new(),
            cached_constants: crate::FastHashMap::default(),
            cached_nulls: crate::FastHashMap::default(),
            cached_helpers: crate::FastHashMap::default(),
            global_variables: Vec::new(),
            cached: super::CachedExpressions::default(),
            gl450_ext_inst_id,
        })
    }

    /// Track a capability, checking it against the allowed set.
    pub(super) fn require(&mut self, capability: spirv::Capability) -> Result<(), Error> {
        if let Some(ref allowed) = self.allowed_caps {
            if !allowed.contains(&capability) {
                return Err(Error::MissingCapabilities(vec![capability]));
            }
        }
        self.capabilities.insert(capability);
        Ok(())
    }

    fn scalar_type_instruction(
        &mut self,
        id: Word,
        kind: crate::ScalarKind,
        width: crate::Bytes,
    ) -> Result<Instruction, Error> {
        let bits = (width * super::BITS_PER_BYTE) as u32;
        Ok(match kind {
            crate::ScalarKind::Sint | crate::ScalarKind::Uint => {
                match width {
                    1 => self.require(spirv::Capability::Int8)?,
                    2 => self.require(spirv::Capability::Int16)?,
                    8 => self.require(spirv::Capability::Int64)?,
                    _ => {}
                }
                let signedness = if kind == crate::ScalarKind::Sint {
                    Signedness::Signed
                } else {
                    Signedness::Unsigned
                };
                instructions::instruction_type_int(id, bits, signedness)
            }
            crate::ScalarKind::Float => {
                match width {
                    2 => self.require(spirv::Capability::Float16)?,
                    8 => self.require(spirv::Capability::Float64)?,
                    _ => {}
                }
                instructions::instruction_type_float(id, bits)
            }
            crate::ScalarKind::Bool => instructions::instruction_type_bool(id),
        })
    }

    /// Fetch or declare the ID of a type.
    ///
    /// Module types must have been registered up front by
    /// [`write_type_declaration_arena`](Self::write_type_declaration_arena);
    /// local types are declared on demand.
    pub(super) fn get_type_id(
        &mut self,
        arena: &crate::Arena<crate::Type>,
        lookup_ty: LookupType,
    ) -> Result<Word, Error> {
        if let Some(&id) = self.lookup_type.get(&lookup_ty) {
            return Ok(id);
        }
        let local_ty = match lookup_ty {
            LookupType::Handle(_) => {
                return Err(Error::Validation("type handle is not registered"))
            }
            LookupType::Local(local_ty) => local_ty,
        };
        let id = self.write_local_type(arena, local_ty)?;
        self.lookup_type.insert(lookup_ty, id);
        Ok(id)
    }

    fn write_local_type(
        &mut self,
        arena: &crate::Arena<crate::Type>,
        local_ty: LocalType,
    ) -> Result<Word, Error> {
        Ok(match local_ty {
            LocalType::Value {
                vector_size: None,
                kind,
                width,
                pointer_class: None,
            } => {
                let id = self.id_gen.next();
                let instruction = self.scalar_type_instruction(id, kind, width)?;
                instruction.to_words(&mut self.logical_layout.declarations);
                id
            }
            LocalType::Value {
                vector_size: Some(size),
                kind,
                width,
                pointer_class: None,
            } => {
                let scalar_id =
                    self.get_type_id(arena, LocalType::scalar(kind, width).into())?;
                let id = self.id_gen.next();
                instructions::instruction_type_vector(id, scalar_id, size)
                    .to_words(&mut self.logical_layout.declarations);
                id
            }
            LocalType::Value {
                vector_size,
                kind,
                width,
                pointer_class: Some(class),
            } => {
                let base_id = self.get_type_id(
                    arena,
                    LocalType::Value {
                        vector_size,
                        kind,
                        width,
                        pointer_class: None,
                    }
                    .into(),
                )?;
                let id = self.id_gen.next();
                instructions::instruction_type_pointer(id, class, base_id)
                    .to_words(&mut self.logical_layout.declarations);
                id
            }
            LocalType::Matrix {
                columns,
                rows,
                width,
            } => {
                let vector_id = self.get_type_id(
                    arena,
                    LocalType::vector(rows, crate::ScalarKind::Float, width).into(),
                )?;
                let id = self.id_gen.next();
                instructions::instruction_type_matrix(id, vector_id, columns)
                    .to_words(&mut self.logical_layout.declarations);
                id
            }
            LocalType::Pointer { base, class } => {
                let base_id = self.get_type_id(arena, LookupType::Handle(base))?;
                let id = self.id_gen.next();
                instructions::instruction_type_pointer(id, class, base_id)
                    .to_words(&mut self.logical_layout.declarations);
                id
            }
            LocalType::Image {
                dim,
                arrayed,
                class,
            } => {
                let kind = match class {
                    crate::ImageClass::Sampled { kind, .. } => kind,
                    crate::ImageClass::Depth { .. } => crate::ScalarKind::Float,
                    crate::ImageClass::Storage { format, .. } => {
                        if is_extended_storage_format(format) {
                            self.require(spirv::Capability::StorageImageExtendedFormats)?;
                        }
                        crate::back::storage_format_kind(format)
                    }
                };
                match dim {
                    crate::ImageDimension::D1 => self.require(spirv::Capability::Sampled1D)?,
                    crate::ImageDimension::Cube if arrayed => {
                        self.require(spirv::Capability::SampledCubeArray)?
                    }
                    _ => {}
                }
                let sampled_type_id =
                    self.get_type_id(arena, LocalType::scalar(kind, 4).into())?;
                let id = self.id_gen.next();
                instructions::instruction_type_image(
                    id,
                    sampled_type_id,
                    helpers::map_dim(dim),
                    arrayed,
                    class,
                )
                .to_words(&mut self.logical_layout.declarations);
                id
            }
            LocalType::SampledImage { image_type_id } => {
                let id = self.id_gen.next();
                instructions::instruction_type_sampled_image(id, image_type_id)
                    .to_words(&mut self.logical_layout.declarations);
                id
            }
            LocalType::Sampler => {
                let id = self.id_gen.next();
                instructions::instruction_type_sampler(id)
                    .to_words(&mut self.logical_layout.declarations);
                id
            }
        })
    }

    /// Fetch the ID of an expression's resolved type.
    pub(super) fn get_expression_type_id(
        &mut self,
        arena: &crate::Arena<crate::Type>,
        resolution: &TypeResolution,
    ) -> Result<Word, Error> {
        match *resolution {
            TypeResolution::Handle(handle) => self.get_type_id(arena, LookupType::Handle(handle)),
            TypeResolution::Value(ref inner) => match make_local(inner) {
                Some(local_ty) => self.get_type_id(arena, local_ty.into()),
                None => Err(Error::Validation("expression type has no declaration")),
            },
        }
    }

    fn write_type_declaration_arena(
        &mut self,
        arena: &crate::Arena<crate::Type>,
    ) -> Result<(), Error> {
        for (handle, ty) in arena.iter() {
            let id = match make_local(&ty.inner) {
                // Simple kinds are interned through their local alias, so
                // that e.g. a named `vec4` and an anonymous one share a
                // single `OpTypeVector`.
                Some(local_ty) => self.get_type_id(arena, local_ty.into())?,
                None => match ty.inner {
                    crate::TypeInner::Array { base, size, stride } => {
                        let base_id = self.get_type_id(arena, LookupType::Handle(base))?;
                        let id = self.id_gen.next();
                        self.annotations.push(instructions::instruction_decorate(
                            id,
                            spirv::Decoration::ArrayStride,
                            &[stride],
                        ));
                        let instruction = match size {
                            crate::ArraySize::Constant(length) => {
                                let length_id = self.get_index_constant(length.get(), arena)?;
                                instructions::instruction_type_array(id, base_id, length_id)
                            }
                            crate::ArraySize::Dynamic => {
                                instructions::instruction_type_runtime_array(id, base_id)
                            }
                        };
                        instruction.to_words(&mut self.logical_layout.declarations);
                        id
                    }
                    crate::TypeInner::Struct {
                        ref members,
                        span: _,
                    } => {
                        let mut member_ids = Vec::with_capacity(members.len());
                        for member in members.iter() {
                            member_ids.push(
                                self.get_type_id(arena, LookupType::Handle(member.ty))?,
                            );
                        }
                        let id = self.id_gen.next();
                        for (index, member) in members.iter().enumerate() {
                            self.annotations
                                .push(instructions::instruction_member_decorate(
                                    id,
                                    index as u32,
                                    spirv::Decoration::Offset,
                                    &[member.offset],
                                ));
                            if let crate::TypeInner::Matrix {
                                columns: _,
                                rows,
                                width,
                            } = arena[member.ty].inner
                            {
                                let vec_size = match rows {
                                    crate::VectorSize::Bi => 2,
                                    crate::VectorSize::Tri | crate::VectorSize::Quad => 4,
                                };
                                self.annotations
                                    .push(instructions::instruction_member_decorate(
                                        id,
                                        index as u32,
                                        spirv::Decoration::ColMajor,
                                        &[],
                                    ));
                                self.annotations
                                    .push(instructions::instruction_member_decorate(
                                        id,
                                        index as u32,
                                        spirv::Decoration::MatrixStride,
                                        &[width as u32 * vec_size],
                                    ));
                            }
                            if self.flags.contains(WriterFlags::DEBUG) {
                                if let Some(ref name) = member.name {
                                    self.debugs.push(instructions::instruction_member_name(
                                        id,
                                        index as u32,
                                        name,
                                    ));
                                }
                            }
                        }
                        instructions::instruction_type_struct(id, &member_ids)
                            .to_words(&mut self.logical_layout.declarations);
                        id
                    }
                    crate::TypeInner::AccelerationStructure | crate::TypeInner::RayQuery => {
                        return Err(Error::FeatureNotImplemented("ray queries"))
                    }
                    crate::TypeInner::BindingArray { .. } => {
                        return Err(Error::FeatureNotImplemented("binding arrays"))
                    }
                    _ => return Err(Error::Validation("unexpected module type")),
                },
            };
            self.lookup_type.insert(LookupType::Handle(handle), id);
            if self.flags.contains(WriterFlags::DEBUG) {
                if let Some(ref name) = ty.name {
                    self.debugs.push(instructions::instruction_name(id, name));
                }
            }
        }
        Ok(())
    }

    /// Fetch or create an `OpConstant` of unsigned integer type.
    pub(super) fn get_index_constant(
        &mut self,
        index: u32,
        types: &crate::Arena<crate::Type>,
    ) -> Result<Word, Error> {
        self.write_scalar_constant(&crate::ScalarValue::Uint(index as u64), 4, types)
    }

    pub(super) fn write_scalar_constant(
        &mut self,
        value: &crate::ScalarValue,
        width: crate::Bytes,
        types: &crate::Arena<crate::Type>,
    ) -> Result<Word, Error> {
        let key = CachedConstant::new(value, width);
        if let Some(&id) = self.cached_constants.get(&key) {
            return Ok(id);
        }
        let kind = value.scalar_kind();
        let type_id = self.get_type_id(types, LocalType::scalar(kind, width).into())?;
        let id = self.id_gen.next();
        let instruction = match *value {
            crate::ScalarValue::Bool(true) => {
                instructions::instruction_constant_true(type_id, id)
            }
            crate::ScalarValue::Bool(false) => {
                instructions::instruction_constant_false(type_id, id)
            }
            crate::ScalarValue::Sint(v) => match width {
                8 => {
                    let bits = v as u64;
                    instructions::instruction_constant(
                        type_id,
                        id,
                        &[bits as u32, (bits >> 32) as u32],
                    )
                }
                _ => instructions::instruction_constant(type_id, id, &[v as i32 as u32]),
            },
            crate::ScalarValue::Uint(v) => match width {
                8 => instructions::instruction_constant(
                    type_id,
                    id,
                    &[v as u32, (v >> 32) as u32],
                ),
                _ => instructions::instruction_constant(type_id, id, &[v as u32]),
            },
            crate::ScalarValue::Float(v) => match width {
                8 => {
                    let bits = v.to_bits();
                    instructions::instruction_constant(
                        type_id,
                        id,
                        &[bits as u32, (bits >> 32) as u32],
                    )
                }
                _ => instructions::instruction_constant(type_id, id, &[(v as f32).to_bits()]),
            },
        };
        instruction.to_words(&mut self.logical_layout.declarations);
        self.cached_constants.insert(key, id);
        Ok(id)
    }

    /// Fetch or create an `OpConstantNull` of the given type.
    pub(super) fn write_null_constant(&mut self, type_id: Word) -> Word {
        if let Some(&id) = self.cached_nulls.get(&type_id) {
            return id;
        }
        let id = self.id_gen.next();
        instructions::instruction_constant_null(type_id, id)
            .to_words(&mut self.logical_layout.declarations);
        self.cached_nulls.insert(type_id, id);
        id
    }

    fn write_constant_arena(&mut self, module: &crate::Module) -> Result<(), Error> {
        self.constant_ids.clear();
        self.constant_ids.resize(module.constants.len(), 0);
        for (handle, constant) in module.constants.iter() {
            let id = match constant.inner {
                crate::ConstantInner::Scalar { width, ref value } => {
                    self.write_scalar_constant(value, width, &module.types)?
                }
                crate::ConstantInner::Composite { ty, ref components } => {
                    let type_id = self.get_type_id(&module.types, LookupType::Handle(ty))?;
                    let mut constituent_ids = Vec::with_capacity(components.len());
                    for &component in components.iter() {
                        module.constants.try_get(component)?;
                        let component_id = self.constant_ids[component.index()];
                        if component_id == 0 {
                            return Err(Error::Validation(
                                "composite constant refers to a later constant",
                            ));
                        }
                        constituent_ids.push(component_id);
                    }
                    let id = self.id_gen.next();
                    instructions::instruction_constant_composite(type_id, id, &constituent_ids)
                        .to_words(&mut self.logical_layout.declarations);
                    id
                }
            };
            if self.flags.contains(WriterFlags::DEBUG) {
                if let Some(ref name) = constant.name {
                    self.debugs.push(instructions::instruction_name(id, name));
                }
            }
            self.constant_ids[handle.index()] = id;
        }
        Ok(())
    }

    fn write_global_variables(&mut self, module: &crate::Module) -> Result<bool, Error> {
        let mut uses_storage_buffer = false;
        self.global_variables.clear();
        for (_, var) in module.global_variables.iter() {
            let class = helpers::map_address_space(var.space);
            if class == spirv::StorageClass::StorageBuffer {
                uses_storage_buffer = true;
            }

            let ty = module.types.try_get(var.ty)?;
            let needs_block = match var.space {
                crate::AddressSpace::Uniform
                | crate::AddressSpace::Storage { .. }
                | crate::AddressSpace::PushConstant => true,
                _ => false,
            };
            let is_struct = match ty.inner {
                crate::TypeInner::Struct { .. } => true,
                _ => false,
            };

            let inner_type_id = self.get_type_id(&module.types, LookupType::Handle(var.ty))?;

            // Buffer-like variables must be structs decorated as blocks. A
            // bare type (notably a runtime-sized array, which `OpArrayLength`
            // can only measure through a struct member) gets wrapped in a
            // synthetic single-member struct.
            let (pointee_id, wrapped) = if needs_block && !is_struct {
                let wrapper_id = self.id_gen.next();
                self.annotations.push(instructions::instruction_decorate(
                    wrapper_id,
                    spirv::Decoration::Block,
                    &[],
                ));
                self.annotations
                    .push(instructions::instruction_member_decorate(
                        wrapper_id,
                        0,
                        spirv::Decoration::Offset,
                        &[0],
                    ));
                instructions::instruction_type_struct(wrapper_id, &[inner_type_id])
                    .to_words(&mut self.logical_layout.declarations);
                (wrapper_id, true)
            } else {
                if needs_block {
                    self.decorate_struct_as_block(inner_type_id);
                }
                (inner_type_id, false)
            };

            let pointer_type_id = if wrapped {
                let id = self.id_gen.next();
                instructions::instruction_type_pointer(id, class, pointee_id)
                    .to_words(&mut self.logical_layout.declarations);
                id
            } else {
                self.get_type_id(
                    &module.types,
                    LocalType::Pointer {
                        base: var.ty,
                        class,
                    }
                    .into(),
                )?
            };

            let init_id = match var.init {
                Some(constant) => {
                    module.constants.try_get(constant)?;
                    Some(self.constant_ids[constant.index()])
                }
                None => None,
            };

            let id = self.id_gen.next();
            instructions::instruction_variable(pointer_type_id, id, class, init_id)
                .to_words(&mut self.logical_layout.declarations);

            if let Some(ref binding) = var.binding {
                self.annotations.push(instructions::instruction_decorate(
                    id,
                    spirv::Decoration::DescriptorSet,
                    &[binding.group],
                ));
                self.annotations.push(instructions::instruction_decorate(
                    id,
                    spirv::Decoration::Binding,
                    &[binding.binding],
                ));
            }
            if let crate::AddressSpace::Storage { access } = var.space {
                if !access.contains(crate::StorageAccess::STORE) {
                    self.annotations.push(instructions::instruction_decorate(
                        id,
                        spirv::Decoration::NonWritable,
                        &[],
                    ));
                }
            }
            if self.flags.contains(WriterFlags::DEBUG) {
                if let Some(ref name) = var.name {
                    self.debugs.push(instructions::instruction_name(id, name));
                }
            }

            self.global_variables.push(GlobalVariable {
                id,
                handle_id: 0,
                wrapped,
            });
        }
        Ok(uses_storage_buffer)
    }

    fn decorate_struct_as_block(&mut self, type_id: Word) {
        // Avoid duplicate decorations when two buffers share a struct type.
        let already = self.annotations.iter().any(|a| {
            a.op == spirv::Op::Decorate
                && a.operands.first() == Some(&type_id)
                && a.operands.get(1) == Some(&(spirv::Decoration::Block as u32))
        });
        if !already {
            self.annotations.push(instructions::instruction_decorate(
                type_id,
                spirv::Decoration::Block,
                &[],
            ));
        }
    }

    pub(super) fn get_function_type(
        &mut self,
        lookup_function_type: LookupFunctionType,
    ) -> Word {
        match self
            .lookup_function_type
            .get(&lookup_function_type)
        {
            Some(&function_type_id) => function_type_id,
            None => {
                let id = self.id_gen.next();
                instructions::instruction_type_function(
                    id,
                    lookup_function_type.return_type_id,
                    &lookup_function_type.parameter_type_ids,
                )
                .to_words(&mut self.logical_layout.declarations);
                self.lookup_function_type.insert(lookup_function_type, id);
                id
            }
        }
    }

    fn write_function(
        &mut self,
        ir_handle: Handle<crate::Function>,
        ir_function: &crate::Function,
        module: &crate::Module,
        entry_point_context: Option<EntryPointContext>,
        mut prelude_body: Vec<Instruction>,
    ) -> Result<Word, Error> {
        self.cached.reset(ir_function.expressions.len());

        let mut function = Function::default();
        function.entry_point_context = entry_point_context;

        let return_type_id = match ir_function.result {
            Some(ref result) => self.get_type_id(&module.types, LookupType::Handle(result.ty))?,
            None => self.void_type,
        };

        let mut parameter_type_ids = Vec::with_capacity(ir_function.arguments.len());
        if function.entry_point_context.is_none() {
            for argument in ir_function.arguments.iter() {
                let parameter_type_id =
                    self.get_type_id(&module.types, LookupType::Handle(argument.ty))?;
                let id = self.id_gen.next();
                function
                    .parameters
                    .push(instructions::instruction_function_parameter(
                        parameter_type_id,
                        id,
                    ));
                parameter_type_ids.push(parameter_type_id);
            }
        }

        let lookup_function_type = LookupFunctionType {
            parameter_type_ids,
            return_type_id: if function.entry_point_context.is_some() {
                self.void_type
            } else {
                return_type_id
            },
        };
        let function_type_id = self.get_function_type(lookup_function_type);

        let function_id = self.id_gen.next();
        function.signature = Some(instructions::instruction_function(
            if function.entry_point_context.is_some() {
                self.void_type
            } else {
                return_type_id
            },
            function_id,
            spirv::FunctionControl::NONE,
            function_type_id,
        ));

        if self.flags.contains(WriterFlags::DEBUG) {
            if let Some(ref name) = ir_function.name {
                self.debugs
                    .push(instructions::instruction_name(function_id, name));
            }
        }

        // Function-scope variables all live in the entry block, regardless of
        // where the IR declares them.
        for (handle, variable) in ir_function.local_variables.iter() {
            let pointer_type_id = self.get_type_id(
                &module.types,
                LocalType::Pointer {
                    base: variable.ty,
                    class: spirv::StorageClass::Function,
                }
                .into(),
            )?;
            let id = self.id_gen.next();

            // Constant-foldable initializers ride on the `OpVariable` itself.
            let init_word = match variable.init {
                Some(init) => match ir_function.expressions.try_get(init)? {
                    &crate::Expression::Constant(constant) => {
                        module.constants.try_get(constant)?;
                        Some(self.constant_ids[constant.index()])
                    }
                    &crate::Expression::Literal(ref literal) => Some(self.write_scalar_constant(
                        &literal_to_scalar_value(literal),
                        literal.width(),
                        &module.types,
                    )?),
                    &crate::Expression::ZeroValue(ty) => {
                        let type_id = self.get_type_id(&module.types, LookupType::Handle(ty))?;
                        Some(self.write_null_constant(type_id))
                    }
                    _ => None,
                },
                None => None,
            };

            if self.flags.contains(WriterFlags::DEBUG) {
                if let Some(ref name) = variable.name {
                    self.debugs.push(instructions::instruction_name(id, name));
                }
            }

            function.variables.insert(
                handle,
                LocalVariable {
                    id,
                    instruction: instructions::instruction_variable(
                        pointer_type_id,
                        id,
                        spirv::StorageClass::Function,
                        init_word,
                    ),
                },
            );
        }

        // Load `Handle` globals referenced by this function into the prelude,
        // so image and sampler operations can use the loaded values directly.
        for handle_id in self.global_variables.iter_mut().map(|gv| &mut gv.handle_id) {
            *handle_id = 0;
        }
        for (_, expression) in ir_function.expressions.iter() {
            if let crate::Expression::GlobalVariable(gv_handle) = *expression {
                let var = module.global_variables.try_get(gv_handle)?;
                if var.space != crate::AddressSpace::Handle {
                    continue;
                }
                if self.global_variables[gv_handle.index()].handle_id != 0 {
                    continue;
                }
                let var_type_id = self.get_type_id(&module.types, LookupType::Handle(var.ty))?;
                let id = self.id_gen.next();
                let var_id = self.global_variables[gv_handle.index()].id;
                prelude_body.push(instructions::instruction_load(var_type_id, id, var_id, None));
                self.global_variables[gv_handle.index()].handle_id = id;
            }
        }

        let prelude_id = self.id_gen.next();
        let mut prelude = Block::new(prelude_id);
        prelude.body = prelude_body;

        // Local initializers that had to wait for runtime evaluation. Those
        // containing call results are deferred until their owning calls have
        // been made.
        let mut immediate_inits = Vec::new();
        for (handle, variable) in ir_function.local_variables.iter() {
            if let Some(init) = variable.init {
                if function.variables[&handle]
                    .instruction
                    .operands
                    .len()
                    > 1
                {
                    // the initializer rode along on OpVariable
                    continue;
                }
                let call_results = crate::proc::gather_call_results(ir_function, init);
                if call_results.is_empty() {
                    immediate_inits.push((handle, init));
                } else {
                    function.pending_inits.push(PendingLocalInit {
                        local: handle,
                        root: init,
                        call_results,
                    });
                }
            }
        }
        for (handle, init) in immediate_inits {
            let value_id =
                self.cache_expression_value(init, &mut prelude, module, ir_function, &mut function)?;
            let pointer_id = function.variables[&handle].id;
            prelude
                .body
                .push(instructions::instruction_store(pointer_id, value_id, None));
        }

        let main_id = self.id_gen.next();
        function.consume(prelude, instructions::instruction_branch(main_id));

        self.write_block(
            main_id,
            &ir_function.body,
            super::block::BlockExit::Return,
            super::block::LoopContext::default(),
            module,
            ir_function,
            &mut function,
        )?;

        function.to_words(&mut self.logical_layout.function_definitions);
        instructions::instruction_function_end()
            .to_words(&mut self.logical_layout.function_definitions);

        self.lookup_function.insert(ir_handle, function_id);
        Ok(function_id)
    }

    /// Declare an `Input` or `Output` interface variable for an entry point.
    fn write_ep_io_variable(
        &mut self,
        module: &crate::Module,
        stage: crate::ShaderStage,
        ty: Handle<crate::Type>,
        binding: &crate::Binding,
        class: spirv::StorageClass,
        debug_name: Option<&str>,
    ) -> Result<Word, Error> {
        let pointer_type_id = self.get_type_id(
            &module.types,
            LocalType::Pointer { base: ty, class }.into(),
        )?;
        let id = self.id_gen.next();
        instructions::instruction_variable(pointer_type_id, id, class, None)
            .to_words(&mut self.logical_layout.declarations);

        match *binding {
            crate::Binding::Location {
                location,
                interpolation,
            } => {
                self.annotations.push(instructions::instruction_decorate(
                    id,
                    spirv::Decoration::Location,
                    &[location],
                ));
                let interpolation = match interpolation {
                    Some(interpolation) => Some(interpolation),
                    // Integral fragment inputs must not be interpolated.
                    None
                        if class == spirv::StorageClass::Input
                            && stage == crate::ShaderStage::Fragment
                            && module.types[ty].inner.scalar_kind()
                                != Some(crate::ScalarKind::Float) =>
                    {
                        Some(crate::Interpolation::Flat)
                    }
                    None => None,
                };
                match interpolation {
                    Some(crate::Interpolation::Flat) => {
                        self.annotations.push(instructions::instruction_decorate(
                            id,
                            spirv::Decoration::Flat,
                            &[],
                        ));
                    }
                    Some(crate::Interpolation::Linear) => {
                        self.annotations.push(instructions::instruction_decorate(
                            id,
                            spirv::Decoration::NoPerspective,
                            &[],
                        ));
                    }
                    Some(crate::Interpolation::Centroid) => {
                        self.annotations.push(instructions::instruction_decorate(
                            id,
                            spirv::Decoration::Centroid,
                            &[],
                        ));
                    }
                    Some(crate::Interpolation::Sample) => {
                        self.require(spirv::Capability::SampleRateShading)?;
                        self.annotations.push(instructions::instruction_decorate(
                            id,
                            spirv::Decoration::Sample,
                            &[],
                        ));
                    }
                    Some(crate::Interpolation::Perspective) | None => {}
                }
            }
            crate::Binding::BuiltIn(built_in) => {
                if built_in == crate::BuiltIn::ClipDistance {
                    self.require(spirv::Capability::ClipDistance)?;
                }
                let spv_built_in = map_built_in(built_in, class);
                self.annotations.push(instructions::instruction_decorate(
                    id,
                    spirv::Decoration::BuiltIn,
                    &[spv_built_in as u32],
                ));
            }
        }

        if self.flags.contains(WriterFlags::DEBUG) {
            if let Some(name) = debug_name {
                self.debugs.push(instructions::instruction_name(id, name));
            }
        }
        Ok(id)
    }

    fn write_entry_point(
        &mut self,
        ep: &crate::EntryPoint,
        module: &crate::Module,
    ) -> Result<(), Error> {
        let ir_function = module.functions.try_get(ep.function)?;

        let mut interface_ids = Vec::new();
        let mut prelude_body = Vec::new();
        let mut argument_ids = Vec::new();

        for argument in ir_function.arguments.iter() {
            match argument.binding {
                Some(ref binding) => {
                    let var_id = self.write_ep_io_variable(
                        module,
                        ep.stage,
                        argument.ty,
                        binding,
                        spirv::StorageClass::Input,
                        argument.name.as_deref(),
                    )?;
                    interface_ids.push(var_id);
                    let type_id =
                        self.get_type_id(&module.types, LookupType::Handle(argument.ty))?;
                    let load_id = self.id_gen.next();
                    prelude_body.push(instructions::instruction_load(
                        type_id, load_id, var_id, None,
                    ));
                    argument_ids.push(load_id);
                }
                None => {
                    // A struct argument with per-member bindings is flattened
                    // into one interface variable per member, then recomposed.
                    let members = match module.types[argument.ty].inner {
                        crate::TypeInner::Struct { ref members, .. } => members,
                        _ => {
                            return Err(Error::Validation(
                                "entry point argument needs a binding",
                            ))
                        }
                    };
                    let mut member_ids = Vec::with_capacity(members.len());
                    for member in members.iter() {
                        let binding = member.binding.as_ref().ok_or(Error::Validation(
                            "entry point struct member needs a binding",
                        ))?;
                        let var_id = self.write_ep_io_variable(
                            module,
                            ep.stage,
                            member.ty,
                            binding,
                            spirv::StorageClass::Input,
                            member.name.as_deref(),
                        )?;
                        interface_ids.push(var_id);
                        let type_id =
                            self.get_type_id(&module.types, LookupType::Handle(member.ty))?;
                        let load_id = self.id_gen.next();
                        prelude_body.push(instructions::instruction_load(
                            type_id, load_id, var_id, None,
                        ));
                        member_ids.push(load_id);
                    }
                    let struct_type_id =
                        self.get_type_id(&module.types, LookupType::Handle(argument.ty))?;
                    let construct_id = self.id_gen.next();
                    prelude_body.push(instructions::instruction_composite_construct(
                        struct_type_id,
                        construct_id,
                        &member_ids,
                    ));
                    argument_ids.push(construct_id);
                }
            }
        }

        let mut results = Vec::new();
        let mut writes_frag_depth = false;
        if let Some(ref result) = ir_function.result {
            match result.binding {
                Some(ref binding) => {
                    let var_id = self.write_ep_io_variable(
                        module,
                        ep.stage,
                        result.ty,
                        binding,
                        spirv::StorageClass::Output,
                        None,
                    )?;
                    interface_ids.push(var_id);
                    let built_in = match *binding {
                        crate::Binding::BuiltIn(built_in) => Some(built_in),
                        _ => None,
                    };
                    writes_frag_depth |= built_in == Some(crate::BuiltIn::FragDepth);
                    let type_id =
                        self.get_type_id(&module.types, LookupType::Handle(result.ty))?;
                    results.push(ResultMember {
                        id: var_id,
                        type_id,
                        built_in,
                    });
                }
                None => {
                    let members = match module.types[result.ty].inner {
                        crate::TypeInner::Struct { ref members, .. } => members,
                        _ => {
                            return Err(Error::Validation(
                                "entry point result needs a binding",
                            ))
                        }
                    };
                    for member in members.iter() {
                        let binding = member.binding.as_ref().ok_or(Error::Validation(
                            "entry point struct member needs a binding",
                        ))?;
                        let var_id = self.write_ep_io_variable(
                            module,
                            ep.stage,
                            member.ty,
                            binding,
                            spirv::StorageClass::Output,
                            member.name.as_deref(),
                        )?;
                        interface_ids.push(var_id);
                        let built_in = match *binding {
                            crate::Binding::BuiltIn(built_in) => Some(built_in),
                            _ => None,
                        };
                        writes_frag_depth |= built_in == Some(crate::BuiltIn::FragDepth);
                        let type_id =
                            self.get_type_id(&module.types, LookupType::Handle(member.ty))?;
                        results.push(ResultMember {
                            id: var_id,
                            type_id,
                            built_in,
                        });
                    }
                }
            }
        }

        let context = EntryPointContext {
            argument_ids,
            results,
        };

        let function_id =
            self.write_function(ep.function, ir_function, module, Some(context), prelude_body)?;

        let execution_model = match ep.stage {
            crate::ShaderStage::Vertex => spirv::ExecutionModel::Vertex,
            crate::ShaderStage::Fragment => spirv::ExecutionModel::Fragment,
            crate::ShaderStage::Compute => spirv::ExecutionModel::GLCompute,
        };
        instructions::instruction_entry_point(
            execution_model,
            function_id,
            &ep.name,
            &interface_ids,
        )
        .to_words(&mut self.logical_layout.entry_points);

        match ep.stage {
            crate::ShaderStage::Vertex => {}
            crate::ShaderStage::Fragment => {
                instructions::instruction_execution_mode(
                    function_id,
                    spirv::ExecutionMode::OriginUpperLeft,
                    &[],
                )
                .to_words(&mut self.logical_layout.execution_modes);
                if writes_frag_depth {
                    instructions::instruction_execution_mode(
                        function_id,
                        spirv::ExecutionMode::DepthReplacing,
                        &[],
                    )
                    .to_words(&mut self.logical_layout.execution_modes);
                }
            }
            crate::ShaderStage::Compute => {
                instructions::instruction_execution_mode(
                    function_id,
                    spirv::ExecutionMode::LocalSize,
                    &ep.workgroup_size,
                )
                .to_words(&mut self.logical_layout.execution_modes);
            }
        }
        Ok(())
    }

    pub fn write(&mut self, module: &crate::Module, words: &mut Vec<Word>) -> Result<(), Error> {
        self.require(spirv::Capability::Shader)?;

        instructions::instruction_ext_inst_import(self.gl450_ext_inst_id, "GLSL.std.450")
            .to_words(&mut self.logical_layout.ext_inst_imports);

        instructions::instruction_memory_model(
            spirv::AddressingModel::Logical,
            spirv::MemoryModel::GLSL450,
        )
        .to_words(&mut self.logical_layout.memory_model);

        if self.flags.contains(WriterFlags::DEBUG) {
            self.debugs
                .push(instructions::instruction_source(
                    spirv::SourceLanguage::GLSL,
                    450,
                ));
        }

        instructions::instruction_type_void(self.void_type)
            .to_words(&mut self.logical_layout.declarations);

        self.write_type_declaration_arena(&module.types)?;
        self.write_constant_arena(module)?;
        let uses_storage_buffer = self.write_global_variables(module)?;
        if uses_storage_buffer && self.lang_version < (1, 3) {
            instructions::instruction_extension("SPV_KHR_storage_buffer_storage_class")
                .to_words(&mut self.logical_layout.extensions);
        }

        for (handle, ir_function) in module.functions.iter() {
            if module.is_entry_point_function(handle) {
                continue;
            }
            self.write_function(handle, ir_function, module, None, Vec::new())?;
        }

        for ep in module.entry_points.iter() {
            self.write_entry_point(ep, module)?;
        }

        // Capability declarations come out sorted so that a fresh writer over
        // the same IR produces byte-identical output.
        let mut capabilities: Vec<_> = self.capabilities.iter().cloned().collect();
        capabilities.sort_by_key(|&capability| capability as u32);
        for capability in capabilities {
            instructions::instruction_capability(capability)
                .to_words(&mut self.logical_layout.capabilities);
        }

        for debug in self.debugs.iter() {
            debug.to_words(&mut self.logical_layout.debugs);
        }
        for annotation in self.annotations.iter() {
            annotation.to_words(&mut self.logical_layout.annotations);
        }

        self.physical_layout.bound = self.id_gen.0 + 1;
        self.physical_layout.in_words(words);
        self.logical_layout.in_words(words);
        Ok(())
    }
}

fn is_extended_storage_format(format: crate::StorageFormat) -> bool {
    use crate::StorageFormat as Sf;
    match format {
        Sf::R32Uint
        | Sf::R32Sint
        | Sf::R32Float
        | Sf::Rgba8Unorm
        | Sf::Rgba8Snorm
        | Sf::Rgba8Uint
        | Sf::Rgba8Sint
        | Sf::Rgba16Uint
        | Sf::Rgba16Sint
        | Sf::Rgba16Float
        | Sf::Rgba32Uint
        | Sf::Rgba32Sint
        | Sf::Rgba32Float => false,
        _ => true,
    }
}

pub(super) fn literal_to_scalar_value(literal: &crate::Literal) -> crate::ScalarValue {
    match *literal {
        crate::Literal::F64(v) => crate::ScalarValue::Float(v),
        crate::Literal::F32(v) => crate::ScalarValue::Float(v as f64),
        crate::Literal::U32(v) => crate::ScalarValue::Uint(v as u64),
        crate::Literal::I32(v) => crate::ScalarValue::Sint(v as i64),
        crate::Literal::U64(v) => crate::ScalarValue::Uint(v),
        crate::Literal::I64(v) => crate::ScalarValue::Sint(v),
        crate::Literal::Bool(v) => crate::ScalarValue::Bool(v),
    }
}

pub(super) fn map_built_in(
    built_in: crate::BuiltIn,
    class: spirv::StorageClass,
) -> spirv::BuiltIn {
    use crate::BuiltIn as Bi;
    match built_in {
        Bi::BaseInstance => spirv::BuiltIn::BaseInstance,
        Bi::BaseVertex => spirv::BuiltIn::BaseVertex,
        Bi::ClipDistance => spirv::BuiltIn::ClipDistance,
        Bi::InstanceIndex => spirv::BuiltIn::InstanceIndex,
        Bi::PointSize => spirv::BuiltIn::PointSize,
        // One source-level attribute, two SPIR-V builtins: `Position` on the
        // vertex output, `FragCoord` on the fragment input.
        Bi::Position => {
            if class == spirv::StorageClass::Output {
                spirv::BuiltIn::Position
            } else {
                spirv::BuiltIn::FragCoord
            }
        }
        Bi::VertexIndex => spirv::BuiltIn::VertexIndex,
        Bi::FragDepth => spirv::BuiltIn::FragDepth,
        Bi::FrontFacing => spirv::BuiltIn::FrontFacing,
        Bi::SampleIndex => spirv::BuiltIn::SampleId,
        Bi::SampleMask => spirv::BuiltIn::SampleMask,
        Bi::GlobalInvocationId => spirv::BuiltIn::GlobalInvocationId,
        Bi::LocalInvocationId => spirv::BuiltIn::LocalInvocationId,
        Bi::LocalInvocationIndex => spirv::BuiltIn::LocalInvocationIndex,
        Bi::WorkGroupId => spirv::BuiltIn::WorkgroupId,
        Bi::NumWorkGroups => spirv::BuiltIn::NumWorkgroups,
    }
}
