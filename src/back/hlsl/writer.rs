use super::{
    help::HelperFlags, keywords, BindTarget, Error, Options, RegisterClass, ReflectionInfo,
};
use crate::{
    back::{self, binary_operation_str, vector_size_str},
    proc::{self, NameKey, Namer},
    FastHashMap, FastHashSet, Handle,
};
use std::fmt::Write;

const NUM_WORKGROUPS_NAME: &str = "_glaive_num_workgroups";
const NUM_WORKGROUPS_VALUE: &str = "_glaive_num_workgroups_value";
const NUM_WORKGROUPS_SPACE: u8 = 30;

struct FunctionCtx<'a> {
    ty: back::FunctionType,
    handle: Handle<crate::Function>,
    fun: &'a crate::Function,
}

impl<'a> FunctionCtx<'a> {
    fn resolution(
        &self,
        expr: Handle<crate::Expression>,
    ) -> Result<&'a proc::TypeResolution, Error> {
        self.fun
            .expression_types
            .get(expr.index())
            .ok_or_else(|| Error::Custom(format!("missing type for expression {:?}", expr)))
    }
}

struct PendingInit {
    local: Handle<crate::LocalVariable>,
    root: Handle<crate::Expression>,
    call_results: Vec<Handle<crate::Expression>>,
}

pub struct Writer<'a> {
    pub(super) out: String,
    pub(super) module: &'a crate::Module,
    pub(super) options: &'a Options,
    pub(super) namer: Namer,
    pub(super) names: FastHashMap<NameKey, String>,
    pub(super) helpers: HelperFlags,
    named_expressions: FastHashMap<Handle<crate::Expression>, String>,
    expr_uses: Vec<u32>,
    pending_inits: Vec<PendingInit>,
    /// Storage-struct globals lowered to single-element structured buffers,
    /// addressed as `name[0]`.
    indexed_globals: FastHashSet<Handle<crate::GlobalVariable>>,
    uses_num_workgroups: bool,
    /// Output-struct state of the entry point currently being written.
    ep_output: Option<(String, Vec<String>)>,
}

impl<'a> Writer<'a> {
    pub fn new(module: &'a crate::Module, options: &'a Options) -> Result<Self, Error> {
        if !super::SUPPORTED_SHADER_MODELS.contains(&options.shader_model) {
            return Err(Error::UnsupportedShaderModel(options.shader_model));
        }

        let mut namer = Namer::default();
        let mut names = FastHashMap::default();
        namer.reset(
            module,
            keywords::RESERVED,
            keywords::RESERVED_CASE_INSENSITIVE,
            &["_glaive_"],
            &mut names,
        );

        Ok(Writer {
            out: String::new(),
            module,
            options,
            namer,
            names,
            helpers: HelperFlags::empty(),
            named_expressions: FastHashMap::default(),
            expr_uses: Vec::new(),
            pending_inits: Vec::new(),
            indexed_globals: FastHashSet::default(),
            uses_num_workgroups: false,
            ep_output: None,
        })
    }

    pub fn finish(self) -> String {
        self.out
    }

    /// Scan the module for constructs that need polyfills or special
    /// resources.
    fn scan(&mut self) {
        use crate::Expression as Ex;
        let module = self.module;
        for (_, fun) in module.functions.iter() {
            for (_, expression) in fun.expressions.iter() {
                let scalar_kind = |h: Handle<crate::Expression>| {
                    fun.expression_types
                        .get(h.index())
                        .and_then(|res| res.inner_with(&module.types).scalar_kind())
                };
                match *expression {
                    Ex::Binary { op, left, .. } => {
                        let int = match scalar_kind(left) {
                            Some(crate::ScalarKind::Sint) | Some(crate::ScalarKind::Uint) => true,
                            _ => false,
                        };
                        if int {
                            match op {
                                crate::BinaryOperator::Divide => {
                                    self.helpers |= HelperFlags::INT_DIV
                                }
                                crate::BinaryOperator::Modulo => {
                                    self.helpers |= HelperFlags::INT_MOD
                                }
                                _ => {}
                            }
                        }
                    }
                    Ex::Unary {
                        op: crate::UnaryOperator::Negate,
                        expr,
                    } => {
                        if scalar_kind(expr) == Some(crate::ScalarKind::Sint) {
                            self.helpers |= HelperFlags::NEG_INT;
                        }
                    }
                    Ex::Math { fun: mf, arg, .. } => match mf {
                        crate::MathFunction::Abs => {
                            if scalar_kind(arg) == Some(crate::ScalarKind::Sint) {
                                self.helpers |= HelperFlags::ABS_INT;
                            }
                        }
                        crate::MathFunction::Modf => self.helpers |= HelperFlags::MODF,
                        crate::MathFunction::Frexp => self.helpers |= HelperFlags::FREXP,
                        crate::MathFunction::ExtractBits => {
                            self.helpers |= HelperFlags::EXTRACT_BITS
                        }
                        crate::MathFunction::InsertBits => {
                            self.helpers |= HelperFlags::INSERT_BITS
                        }
                        _ => {}
                    },
                    Ex::As {
                        expr,
                        kind,
                        convert: Some(_),
                    } => {
                        if scalar_kind(expr) == Some(crate::ScalarKind::Float) {
                            match kind {
                                crate::ScalarKind::Sint => self.helpers |= HelperFlags::F2I32,
                                crate::ScalarKind::Uint => self.helpers |= HelperFlags::F2U32,
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            for argument in fun.arguments.iter() {
                self.scan_binding(argument.binding.as_ref());
                if let crate::TypeInner::Struct { ref members, .. } =
                    module.types[argument.ty].inner
                {
                    for member in members.iter() {
                        self.scan_binding(member.binding.as_ref());
                    }
                }
            }
        }
    }

    fn scan_binding(&mut self, binding: Option<&crate::Binding>) {
        if let Some(&crate::Binding::BuiltIn(crate::BuiltIn::NumWorkGroups)) = binding {
            self.uses_num_workgroups = true;
        }
    }

    pub fn write(&mut self) -> Result<ReflectionInfo, Error> {
        self.scan();

        writeln!(
            self.out,
            "// language: HLSL, shader model {}",
            self.options.shader_model
        )?;
        writeln!(self.out, "// generated by glaive")?;
        writeln!(self.out)?;

        // Struct declarations come first so helpers and buffers can use them.
        for (handle, ty) in self.module.types.iter() {
            if let crate::TypeInner::Struct { ref members, .. } = ty.inner {
                self.write_struct(handle, members)?;
            }
        }

        let helpers_emitted = self.write_helpers()?;

        // Named module constants.
        for (handle, constant) in self.module.constants.iter() {
            if constant.name.is_some() {
                let name = self.names[&NameKey::Constant(handle)].clone();
                write!(self.out, "static const ")?;
                let inner = constant_inner_type(self.module, handle);
                match inner {
                    ConstantTypeRepr::Named(ty) => self.write_var_decl(ty, &name)?,
                    ConstantTypeRepr::Value(ref value_inner) => {
                        self.write_value_inner(value_inner)?;
                        write!(self.out, " {}", name)?;
                    }
                }
                write!(self.out, " = ")?;
                self.write_constant(handle)?;
                writeln!(self.out, ";")?;
            }
        }
        writeln!(self.out)?;

        let mut info = ReflectionInfo::default();
        info.helpers_emitted = helpers_emitted;

        if self.uses_num_workgroups {
            let target = BindTarget {
                space: NUM_WORKGROUPS_SPACE,
                register: 0,
            };
            self.write_register_suffix_line(
                &format!("cbuffer {} ", NUM_WORKGROUPS_NAME),
                RegisterClass::ConstantBuffer,
                target,
            )?;
            writeln!(self.out, " {{ uint3 {}; }}", NUM_WORKGROUPS_VALUE)?;
            info.num_workgroups_register = Some(target);
        }

        self.write_global_variables(&mut info)?;

        for (handle, fun) in self.module.functions.iter() {
            if self.module.is_entry_point_function(handle) {
                continue;
            }
            self.write_function(handle, fun)?;
        }

        for ep_index in 0..self.module.entry_points.len() {
            self.write_entry_point(ep_index)?;
            let ep = &self.module.entry_points[ep_index];
            let emitted = self.names[&NameKey::EntryPoint(ep_index as u16)].clone();
            info.entry_point_names.insert(ep.name.clone(), emitted);
        }

        Ok(info)
    }

    fn write_register_suffix_line(
        &mut self,
        prefix: &str,
        class: RegisterClass,
        target: BindTarget,
    ) -> Result<(), Error> {
        write!(self.out, "{}: register({}{}", prefix, class.prefix(), target.register)?;
        if self.options.shader_model.supports_spaces() && target.space != 0 {
            write!(self.out, ", space{}", target.space)?;
        }
        write!(self.out, ")")?;
        Ok(())
    }

    fn write_struct(
        &mut self,
        handle: Handle<crate::Type>,
        members: &[crate::StructMember],
    ) -> Result<(), Error> {
        let name = self.names[&NameKey::Type(handle)].clone();
        writeln!(self.out, "struct {} {{", name)?;
        for (index, member) in members.iter().enumerate() {
            let member_name = self.names[&NameKey::StructMember(handle, index as u32)].clone();
            write!(self.out, "{}", back::INDENT)?;
            if let crate::TypeInner::Matrix { .. } = self.module.types[member.ty].inner {
                write!(self.out, "row_major ")?;
            }
            self.write_var_decl(member.ty, &member_name)?;
            writeln!(self.out, ";")?;
        }
        writeln!(self.out, "}};")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn scalar_str(
        &self,
        kind: crate::ScalarKind,
        width: crate::Bytes,
    ) -> Result<&'static str, Error> {
        Ok(match (kind, width) {
            (crate::ScalarKind::Float, 4) => "float",
            (crate::ScalarKind::Float, 8) => "double",
            (crate::ScalarKind::Float, 2) => "half",
            (crate::ScalarKind::Sint, 4) => "int",
            (crate::ScalarKind::Sint, 8) => "int64_t",
            (crate::ScalarKind::Uint, 4) => "uint",
            (crate::ScalarKind::Uint, 8) => "uint64_t",
            (crate::ScalarKind::Bool, _) => "bool",
            (kind, width) => {
                return Err(Error::Unimplemented(format!(
                    "scalar {:?} of width {}",
                    kind, width
                )))
            }
        })
    }

    fn write_value_inner(&mut self, inner: &crate::TypeInner) -> Result<(), Error> {
        match *inner {
            crate::TypeInner::Scalar { kind, width }
            | crate::TypeInner::Atomic { kind, width } => {
                let s = self.scalar_str(kind, width)?;
                write!(self.out, "{}", s)?
            }
            crate::TypeInner::Vector { size, kind, width } => {
                let s = self.scalar_str(kind, width)?;
                write!(self.out, "{}{}", s, vector_size_str(size))?
            }
            crate::TypeInner::Matrix {
                columns,
                rows,
                width,
            } => {
                let s = self.scalar_str(crate::ScalarKind::Float, width)?;
                write!(
                    self.out,
                    "{}{}x{}",
                    s,
                    vector_size_str(columns),
                    vector_size_str(rows)
                )?
            }
            _ => {
                return Err(Error::Custom(format!(
                    "cannot write type {:?} as a value",
                    inner
                )))
            }
        }
        Ok(())
    }

    fn write_var_decl(&mut self, ty: Handle<crate::Type>, name: &str) -> Result<(), Error> {
        let mut base = ty;
        let mut sizes = Vec::new();
        while let crate::TypeInner::Array {
            base: inner_base,
            size,
            ..
        } = self.module.types[base].inner
        {
            sizes.push(size);
            base = inner_base;
        }
        match self.module.types[base].inner {
            crate::TypeInner::Struct { .. } => {
                let type_name = self.names[&NameKey::Type(base)].clone();
                write!(self.out, "{}", type_name)?;
            }
            ref other => {
                let other = other.clone();
                self.write_value_inner(&other)?;
            }
        }
        write!(self.out, " {}", name)?;
        for size in sizes {
            match size {
                crate::ArraySize::Constant(length) => write!(self.out, "[{}]", length)?,
                crate::ArraySize::Dynamic => {
                    return Err(Error::Unimplemented(String::from(
                        "runtime-sized array outside a storage buffer",
                    )))
                }
            }
        }
        Ok(())
    }

    fn write_global_variables(&mut self, info: &mut ReflectionInfo) -> Result<(), Error> {
        for (handle, var) in self.module.global_variables.iter() {
            let name = self.names[&NameKey::GlobalVariable(handle)].clone();
            match var.space {
                crate::AddressSpace::Uniform | crate::AddressSpace::PushConstant => {
                    let target = self
                        .options
                        .resolve_resource_binding(handle, var.binding.as_ref())?;
                    info.resource_registers.insert(handle, target);
                    let type_name = match self.module.types[var.ty].inner {
                        crate::TypeInner::Struct { .. } => {
                            self.names[&NameKey::Type(var.ty)].clone()
                        }
                        _ => {
                            return Err(Error::Custom(String::from(
                                "uniform globals must be structs",
                            )))
                        }
                    };
                    self.write_register_suffix_line(
                        &format!("cbuffer _{}_cbuffer ", type_name),
                        RegisterClass::ConstantBuffer,
                        target,
                    )?;
                    writeln!(self.out, " {{ {} {}; }}", type_name, name)?;
                }
                crate::AddressSpace::Storage { access } => {
                    let target = self
                        .options
                        .resolve_resource_binding(handle, var.binding.as_ref())?;
                    info.resource_registers.insert(handle, target);
                    let writable = access.contains(crate::StorageAccess::STORE);
                    let class = if writable {
                        RegisterClass::UnorderedAccess
                    } else {
                        RegisterClass::ShaderResource
                    };
                    let rw = if writable { "RW" } else { "" };
                    match self.module.types[var.ty].inner {
                        crate::TypeInner::Array { base, .. } => {
                            let mut prefix = format!("{}StructuredBuffer<", rw);
                            let mut tmp = std::mem::take(&mut self.out);
                            self.write_var_decl(base, "")?;
                            std::mem::swap(&mut self.out, &mut tmp);
                            prefix.push_str(tmp.trim_end());
                            prefix.push_str(&format!("> {} ", name));
                            self.write_register_suffix_line(&prefix, class, target)?;
                            writeln!(self.out, ";")?;
                        }
                        crate::TypeInner::Struct { ref members, .. } => {
                            let has_dynamic = members.iter().any(|member| {
                                match self.module.types[member.ty].inner {
                                    crate::TypeInner::Array {
                                        size: crate::ArraySize::Dynamic,
                                        ..
                                    } => true,
                                    _ => false,
                                }
                            });
                            if has_dynamic {
                                return Err(Error::Unimplemented(String::from(
                                    "storage struct with a runtime-sized member",
                                )));
                            }
                            let type_name = self.names[&NameKey::Type(var.ty)].clone();
                            let prefix =
                                format!("{}StructuredBuffer<{}> {} ", rw, type_name, name);
                            self.write_register_suffix_line(&prefix, class, target)?;
                            writeln!(self.out, ";")?;
                            self.indexed_globals.insert(handle);
                        }
                        ref other => {
                            let other = other.clone();
                            let mut prefix = format!("{}StructuredBuffer<", rw);
                            let mut tmp = std::mem::take(&mut self.out);
                            self.write_value_inner(&other)?;
                            std::mem::swap(&mut self.out, &mut tmp);
                            prefix.push_str(&tmp);
                            prefix.push_str(&format!("> {} ", name));
                            self.write_register_suffix_line(&prefix, class, target)?;
                            writeln!(self.out, ";")?;
                            self.indexed_globals.insert(handle);
                        }
                    }
                }
                crate::AddressSpace::Handle => {
                    match self.module.types[var.ty].inner {
                        crate::TypeInner::Sampler { comparison } => {
                            let target = self
                                .options
                                .resolve_resource_binding(handle, var.binding.as_ref())?;
                            info.resource_registers.insert(handle, target);
                            let ty_str = if comparison {
                                "SamplerComparisonState"
                            } else {
                                "SamplerState"
                            };
                            let prefix = format!("{} {} ", ty_str, name);
                            self.write_register_suffix_line(
                                &prefix,
                                RegisterClass::Sampler,
                                target,
                            )?;
                            writeln!(self.out, ";")?;
                        }
                        crate::TypeInner::Image {
                            dim,
                            arrayed,
                            class,
                        } => {
                            let target = self
                                .options
                                .resolve_resource_binding(handle, var.binding.as_ref())?;
                            info.resource_registers.insert(handle, target);
                            let register_class = match class {
                                crate::ImageClass::Storage { .. } => {
                                    RegisterClass::UnorderedAccess
                                }
                                _ => RegisterClass::ShaderResource,
                            };
                            let mut prefix = String::new();
                            write_texture_type(&mut prefix, dim, arrayed, class)?;
                            prefix.push(' ');
                            prefix.push_str(&name);
                            prefix.push(' ');
                            self.write_register_suffix_line(&prefix, register_class, target)?;
                            writeln!(self.out, ";")?;
                        }
                        _ => {
                            return Err(Error::Custom(String::from(
                                "unexpected handle global type",
                            )))
                        }
                    }
                }
                crate::AddressSpace::WorkGroup => {
                    write!(self.out, "groupshared ")?;
                    self.write_var_decl(var.ty, &name)?;
                    writeln!(self.out, ";")?;
                }
                crate::AddressSpace::Private => {
                    write!(self.out, "static ")?;
                    self.write_var_decl(var.ty, &name)?;
                    if let Some(init) = var.init {
                        write!(self.out, " = ")?;
                        self.write_constant(init)?;
                    }
                    writeln!(self.out, ";")?;
                }
                crate::AddressSpace::Function => {}
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn write_constant(&mut self, handle: Handle<crate::Constant>) -> Result<(), Error> {
        match self.module.constants[handle].inner {
            crate::ConstantInner::Scalar { ref value, width } => {
                let value = value.clone();
                self.write_scalar_value(&value, width)?
            }
            crate::ConstantInner::Composite { ty, ref components } => {
                let components = components.clone();
                let (open, close) = match self.module.types[ty].inner {
                    crate::TypeInner::Struct { .. } | crate::TypeInner::Array { .. } => {
                        ("{ ", " }")
                    }
                    ref other => {
                        let other = other.clone();
                        self.write_value_inner(&other)?;
                        ("(", ")")
                    }
                };
                write!(self.out, "{}", open)?;
                for (index, &component) in components.iter().enumerate() {
                    if index != 0 {
                        write!(self.out, ", ")?;
                    }
                    self.write_constant(component)?;
                }
                write!(self.out, "{}", close)?;
            }
        }
        Ok(())
    }

    fn write_scalar_value(
        &mut self,
        value: &crate::ScalarValue,
        width: crate::Bytes,
    ) -> Result<(), Error> {
        match *value {
            crate::ScalarValue::Sint(v) => write!(self.out, "{}", v)?,
            crate::ScalarValue::Uint(v) => write!(self.out, "{}u", v)?,
            crate::ScalarValue::Float(v) => {
                if width == 8 {
                    write!(self.out, "{:?}L", v)?
                } else {
                    write!(self.out, "{:?}", v)?
                }
            }
            crate::ScalarValue::Bool(v) => write!(self.out, "{}", v)?,
        }
        Ok(())
    }

    fn write_literal(&mut self, literal: &crate::Literal) -> Result<(), Error> {
        match *literal {
            crate::Literal::F64(v) => write!(self.out, "{:?}L", v)?,
            crate::Literal::F32(v) => write!(self.out, "{:?}", v)?,
            crate::Literal::U32(v) => write!(self.out, "{}u", v)?,
            crate::Literal::I32(v) => write!(self.out, "{}", v)?,
            crate::Literal::U64(v) => write!(self.out, "{}uL", v)?,
            crate::Literal::I64(v) => write!(self.out, "{}L", v)?,
            crate::Literal::Bool(v) => write!(self.out, "{}", v)?,
        }
        Ok(())
    }

    fn builtin_semantic(
        &self,
        built_in: crate::BuiltIn,
    ) -> Result<&'static str, Error> {
        use crate::BuiltIn as Bi;
        Ok(match built_in {
            Bi::Position => "SV_Position",
            Bi::VertexIndex => "SV_VertexID",
            Bi::InstanceIndex => "SV_InstanceID",
            Bi::ClipDistance => "SV_ClipDistance0",
            Bi::PointSize => "PSIZE",
            Bi::FragDepth => "SV_Depth",
            Bi::FrontFacing => "SV_IsFrontFace",
            Bi::SampleIndex => "SV_SampleIndex",
            Bi::SampleMask => "SV_Coverage",
            Bi::GlobalInvocationId => "SV_DispatchThreadID",
            Bi::LocalInvocationId => "SV_GroupThreadID",
            Bi::LocalInvocationIndex => "SV_GroupIndex",
            Bi::WorkGroupId => "SV_GroupID",
            Bi::BaseInstance | Bi::BaseVertex => {
                return Err(Error::Unimplemented(format!("builtin {:?}", built_in)))
            }
            Bi::NumWorkGroups => {
                return Err(Error::Custom(String::from(
                    "NumWorkGroups has no semantic; it is fed via a constant buffer",
                )))
            }
        })
    }

    fn location_semantic(
        &self,
        stage: crate::ShaderStage,
        output: bool,
        location: u32,
    ) -> String {
        match (stage, output) {
            (crate::ShaderStage::Fragment, true) => format!("SV_Target{}", location),
            _ => format!("TEXCOORD{}", location),
        }
    }

    fn interpolation_modifier(interpolation: crate::Interpolation) -> &'static str {
        match interpolation {
            crate::Interpolation::Perspective => "linear",
            crate::Interpolation::Linear => "noperspective",
            crate::Interpolation::Flat => "nointerpolation",
            crate::Interpolation::Centroid => "centroid",
            crate::Interpolation::Sample => "sample",
        }
    }

    fn write_semantic_binding(
        &mut self,
        binding: &crate::Binding,
        stage: crate::ShaderStage,
        output: bool,
    ) -> Result<(), Error> {
        match *binding {
            crate::Binding::BuiltIn(built_in) => {
                let semantic = self.builtin_semantic(built_in)?;
                write!(self.out, " : {}", semantic)?;
            }
            crate::Binding::Location { location, .. } => {
                let semantic = self.location_semantic(stage, output, location);
                write!(self.out, " : {}", semantic)?;
            }
        }
        Ok(())
    }

    fn write_function(
        &mut self,
        handle: Handle<crate::Function>,
        fun: &'a crate::Function,
    ) -> Result<(), Error> {
        self.named_expressions.clear();
        self.expr_uses = proc::count_expression_uses(fun);
        self.collect_pending_inits(fun);

        let name = self.names[&NameKey::Function(handle)].clone();
        match fun.result {
            Some(ref result) => self.write_var_decl(result.ty, &name)?,
            None => write!(self.out, "void {}", name)?,
        }
        write!(self.out, "(")?;
        for (index, argument) in fun.arguments.iter().enumerate() {
            if index != 0 {
                write!(self.out, ", ")?;
            }
            let arg_name =
                self.names[&NameKey::FunctionArgument(handle, index as u32)].clone();
            self.write_parameter_type(argument.ty, &arg_name)?;
        }
        writeln!(self.out, ") {{")?;

        let ctx = FunctionCtx {
            ty: back::FunctionType::Function(handle),
            handle,
            fun,
        };
        self.write_function_locals(&ctx)?;
        for statement in fun.body.iter() {
            self.write_stmt(statement, &ctx, back::Level(1))?;
        }
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        Ok(())
    }

    /// Write a function parameter declaration; textures and samplers keep
    /// their resource types.
    fn write_parameter_type(
        &mut self,
        ty: Handle<crate::Type>,
        name: &str,
    ) -> Result<(), Error> {
        match self.module.types[ty].inner {
            crate::TypeInner::Image {
                dim,
                arrayed,
                class,
            } => {
                let mut s = String::new();
                write_texture_type(&mut s, dim, arrayed, class)?;
                write!(self.out, "{} {}", s, name)?;
            }
            crate::TypeInner::Sampler { comparison } => {
                let ty_str = if comparison {
                    "SamplerComparisonState"
                } else {
                    "SamplerState"
                };
                write!(self.out, "{} {}", ty_str, name)?;
            }
            _ => self.write_var_decl(ty, name)?,
        }
        Ok(())
    }

    fn collect_pending_inits(&mut self, fun: &crate::Function) {
        self.pending_inits.clear();
        for (local_handle, local) in fun.local_variables.iter() {
            if let Some(init) = local.init {
                let call_results = proc::gather_call_results(fun, init);
                if !call_results.is_empty() {
                    self.pending_inits.push(PendingInit {
                        local: local_handle,
                        root: init,
                        call_results,
                    });
                }
            }
        }
    }

    fn write_function_locals(&mut self, ctx: &FunctionCtx<'a>) -> Result<(), Error> {
        for (local_handle, local) in ctx.fun.local_variables.iter() {
            let name = self.names[&NameKey::FunctionLocal(ctx.handle, local_handle)].clone();
            write!(self.out, "{}", back::INDENT)?;
            self.write_var_decl(local.ty, &name)?;
            match local.init {
                Some(init)
                    if !self
                        .pending_inits
                        .iter()
                        .any(|pending| pending.local == local_handle) =>
                {
                    write!(self.out, " = ")?;
                    self.write_expr(init, ctx)?;
                }
                _ => {
                    // Direct3D warns on reads of indeterminate locals.
                    if let crate::TypeInner::Struct { .. } = self.module.types[local.ty].inner {
                        let ty_name = self.names[&NameKey::Type(local.ty)].clone();
                        write!(self.out, " = ({})0", ty_name)?;
                    }
                }
            }
            writeln!(self.out, ";")?;
        }
        Ok(())
    }

    fn write_entry_point(&mut self, ep_index: usize) -> Result<(), Error> {
        let ep = &self.module.entry_points[ep_index];
        let stage = ep.stage;
        let fun_handle = ep.function;
        let fun = self.module.functions.try_get(fun_handle)?;
        let ep_name = self.names[&NameKey::EntryPoint(ep_index as u16)].clone();

        self.named_expressions.clear();
        self.expr_uses = proc::count_expression_uses(fun);
        self.collect_pending_inits(fun);
        self.ep_output = None;

        // Flattened input struct for struct-typed arguments.
        struct FlatInput {
            arg_index: u32,
            member_index: u32,
            field_name: String,
            from_num_workgroups: bool,
        }
        let mut flat_inputs: Vec<FlatInput> = Vec::new();
        let input_struct_name = format!("{}_Input", ep_name);
        let mut has_input_struct = false;

        for (arg_index, argument) in fun.arguments.iter().enumerate() {
            if argument.binding.is_none() {
                let members = match self.module.types[argument.ty].inner {
                    crate::TypeInner::Struct { ref members, .. } => members,
                    _ => {
                        return Err(Error::Custom(String::from(
                            "entry point argument needs a binding",
                        )))
                    }
                };
                for (member_index, member) in members.iter().enumerate() {
                    let binding = member.binding.as_ref().ok_or_else(|| {
                        Error::Custom(String::from("entry point struct member needs a binding"))
                    })?;
                    let from_nwg = *binding
                        == crate::Binding::BuiltIn(crate::BuiltIn::NumWorkGroups);
                    let field_name = self.names
                        [&NameKey::StructMember(argument.ty, member_index as u32)]
                        .clone();
                    flat_inputs.push(FlatInput {
                        arg_index: arg_index as u32,
                        member_index: member_index as u32,
                        field_name,
                        from_num_workgroups: from_nwg,
                    });
                    if !from_nwg {
                        has_input_struct = true;
                    }
                }
            }
        }

        if has_input_struct {
            writeln!(self.out, "struct {} {{", input_struct_name)?;
            for flat in flat_inputs.iter().filter(|f| !f.from_num_workgroups) {
                let argument = &fun.arguments[flat.arg_index as usize];
                let members = match self.module.types[argument.ty].inner {
                    crate::TypeInner::Struct { ref members, .. } => members,
                    _ => continue,
                };
                let member = &members[flat.member_index as usize];
                let member_ty = member.ty;
                let binding = member.binding.clone();
                write!(self.out, "{}", back::INDENT)?;
                if let Some(crate::Binding::Location {
                    interpolation: Some(interpolation),
                    ..
                }) = binding
                {
                    write!(
                        self.out,
                        "{} ",
                        Self::interpolation_modifier(interpolation)
                    )?;
                }
                let field_name = flat.field_name.clone();
                self.write_var_decl(member_ty, &field_name)?;
                if let Some(ref binding) = binding {
                    self.write_semantic_binding(binding, stage, false)?;
                }
                writeln!(self.out, ";")?;
            }
            writeln!(self.out, "}};")?;
            writeln!(self.out)?;
        }

        // Output struct for struct-typed results.
        let mut output_fields: Vec<String> = Vec::new();
        let output_struct_name = format!("{}_Output", ep_name);
        if let Some(ref result) = fun.result {
            if result.binding.is_none() {
                let members = match self.module.types[result.ty].inner {
                    crate::TypeInner::Struct { ref members, .. } => members.clone(),
                    _ => {
                        return Err(Error::Custom(String::from(
                            "entry point result needs a binding",
                        )))
                    }
                };
                writeln!(self.out, "struct {} {{", output_struct_name)?;
                for (member_index, member) in members.iter().enumerate() {
                    let binding = member.binding.clone().ok_or_else(|| {
                        Error::Custom(String::from("entry point struct member needs a binding"))
                    })?;
                    let field_name = self.names
                        [&NameKey::StructMember(result.ty, member_index as u32)]
                        .clone();
                    write!(self.out, "{}", back::INDENT)?;
                    if let crate::Binding::Location {
                        interpolation: Some(interpolation),
                        ..
                    } = binding
                    {
                        write!(
                            self.out,
                            "{} ",
                            Self::interpolation_modifier(interpolation)
                        )?;
                    }
                    self.write_var_decl(member.ty, &field_name)?;
                    self.write_semantic_binding(&binding, stage, true)?;
                    writeln!(self.out, ";")?;
                    output_fields.push(field_name);
                }
                writeln!(self.out, "}};")?;
                writeln!(self.out)?;
                self.ep_output = Some((output_struct_name.clone(), output_fields));
            }
        }

        if stage == crate::ShaderStage::Compute {
            let [x, y, z] = ep.workgroup_size;
            writeln!(self.out, "[numthreads({}, {}, {})]", x, y, z)?;
        }

        // Signature.
        match fun.result {
            Some(ref result) => match result.binding {
                Some(_) => self.write_var_decl(result.ty, &ep_name)?,
                None => write!(self.out, "{} {}", output_struct_name, ep_name)?,
            },
            None => write!(self.out, "void {}", ep_name)?,
        }
        write!(self.out, "(")?;
        let mut first_param = true;
        let mut lid_param: Option<String> = None;
        for (arg_index, argument) in fun.arguments.iter().enumerate() {
            match argument.binding {
                Some(crate::Binding::BuiltIn(crate::BuiltIn::NumWorkGroups)) => continue,
                Some(ref binding) => {
                    if !first_param {
                        write!(self.out, ", ")?;
                    }
                    first_param = false;
                    let arg_name = self.names
                        [&NameKey::FunctionArgument(fun_handle, arg_index as u32)]
                        .clone();
                    if let crate::Binding::BuiltIn(crate::BuiltIn::LocalInvocationIndex) =
                        *binding
                    {
                        lid_param = Some(arg_name.clone());
                    }
                    self.write_var_decl(argument.ty, &arg_name)?;
                    let binding = binding.clone();
                    self.write_semantic_binding(&binding, stage, false)?;
                }
                None => {}
            }
        }
        if has_input_struct {
            if !first_param {
                write!(self.out, ", ")?;
            }
            first_param = false;
            write!(self.out, "{} _input", input_struct_name)?;
        }
        let needs_zero_init = stage == crate::ShaderStage::Compute
            && self.options.zero_initialize_workgroup_memory
            && self
                .module
                .global_variables
                .iter()
                .any(|(_, var)| var.space == crate::AddressSpace::WorkGroup);
        let lid_name = match (needs_zero_init, lid_param) {
            (true, Some(name)) => Some(name),
            (true, None) => {
                if !first_param {
                    write!(self.out, ", ")?;
                }
                write!(self.out, "uint _glaive_lid : SV_GroupIndex")?;
                Some(String::from("_glaive_lid"))
            }
            (false, _) => None,
        };
        write!(self.out, ")")?;
        if let Some(ref result) = fun.result {
            if let Some(ref binding) = result.binding {
                let binding = binding.clone();
                self.write_semantic_binding(&binding, stage, true)?;
            }
        }
        writeln!(self.out, " {{")?;

        // Zero out workgroup memory; Direct3D leaves it undefined.
        if let Some(lid_name) = lid_name {
            writeln!(self.out, "{}if ({} == 0u) {{", back::INDENT, lid_name)?;
            let workgroup_vars: Vec<_> = self
                .module
                .global_variables
                .iter()
                .filter(|&(_, var)| var.space == crate::AddressSpace::WorkGroup)
                .map(|(handle, var)| (handle, var.ty))
                .collect();
            for (var_handle, var_ty) in workgroup_vars {
                let var_name = self.names[&NameKey::GlobalVariable(var_handle)].clone();
                self.write_workgroup_zero(&var_name, var_ty, back::Level(2))?;
            }
            writeln!(self.out, "{}}}", back::INDENT)?;
            writeln!(
                self.out,
                "{}GroupMemoryBarrierWithGroupSync();",
                back::INDENT
            )?;
        }

        // Reconstruct struct arguments from the flattened input.
        for (arg_index, argument) in fun.arguments.iter().enumerate() {
            if argument.binding.is_some() {
                if let Some(crate::Binding::BuiltIn(crate::BuiltIn::NumWorkGroups)) =
                    argument.binding
                {
                    let arg_name = self.names
                        [&NameKey::FunctionArgument(fun_handle, arg_index as u32)]
                        .clone();
                    write!(self.out, "{}", back::INDENT)?;
                    self.write_var_decl(argument.ty, &arg_name)?;
                    writeln!(self.out, " = {};", NUM_WORKGROUPS_VALUE)?;
                }
                continue;
            }
            let arg_name =
                self.names[&NameKey::FunctionArgument(fun_handle, arg_index as u32)].clone();
            write!(self.out, "{}", back::INDENT)?;
            self.write_var_decl(argument.ty, &arg_name)?;
            writeln!(self.out, ";")?;
            for flat in flat_inputs
                .iter()
                .filter(|f| f.arg_index == arg_index as u32)
            {
                if flat.from_num_workgroups {
                    writeln!(
                        self.out,
                        "{}{}.{} = {};",
                        back::INDENT,
                        arg_name,
                        flat.field_name,
                        NUM_WORKGROUPS_VALUE
                    )?;
                } else {
                    writeln!(
                        self.out,
                        "{}{}.{} = _input.{};",
                        back::INDENT,
                        arg_name,
                        flat.field_name,
                        flat.field_name
                    )?;
                }
            }
        }

        let ctx = FunctionCtx {
            ty: back::FunctionType::EntryPoint(ep_index as u16),
            handle: fun_handle,
            fun,
        };
        self.write_function_locals(&ctx)?;
        for statement in fun.body.iter() {
            self.write_stmt(statement, &ctx, back::Level(1))?;
        }
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn write_workgroup_zero(
        &mut self,
        name: &str,
        ty: Handle<crate::Type>,
        level: back::Level,
    ) -> Result<(), Error> {
        match self.module.types[ty].inner {
            crate::TypeInner::Array {
                base,
                size: crate::ArraySize::Constant(length),
                ..
            } => {
                let index = self.namer.call("_zero_index");
                writeln!(
                    self.out,
                    "{}for (uint {i} = 0u; {i} < {n}u; {i}++) {{",
                    level,
                    i = index,
                    n = length
                )?;
                let element = format!("{}[{}]", name, index);
                self.write_workgroup_zero(&element, base, level.next())?;
                writeln!(self.out, "{}}}", level)?;
            }
            crate::TypeInner::Struct { .. } => {
                let ty_name = self.names[&NameKey::Type(ty)].clone();
                writeln!(self.out, "{}{} = ({})0;", level, name, ty_name)?;
            }
            ref other => {
                let other = other.clone();
                write!(self.out, "{}{} = (", level, name)?;
                self.write_value_inner(&other)?;
                writeln!(self.out, ")0;")?;
            }
        }
        Ok(())
    }

    fn write_stmt(
        &mut self,
        statement: &crate::Statement,
        ctx: &FunctionCtx<'a>,
        level: back::Level,
    ) -> Result<(), Error> {
        use crate::Statement as St;
        match *statement {
            St::Emit(ref range) => {
                for handle in range.clone() {
                    let expression = &ctx.fun.expressions[handle];
                    // queries need statement-level out-parameter plumbing
                    match *expression {
                        crate::Expression::ImageQuery { image, query } => {
                            self.write_image_query_bake(handle, image, query, ctx, level)?;
                            continue;
                        }
                        crate::Expression::ArrayLength(pointer) => {
                            self.write_array_length_bake(handle, pointer, ctx, level)?;
                            continue;
                        }
                        crate::Expression::CallResult(_)
                        | crate::Expression::AtomicResult { .. }
                        | crate::Expression::WorkGroupUniformLoadResult { .. } => continue,
                        _ => {}
                    }
                    let min_ref_count = expression.bake_ref_count();
                    let count = self.expr_uses.get(handle.index()).cloned().unwrap_or(0);
                    if count >= min_ref_count && !expression.is_trivial() {
                        let resolution = ctx.resolution(handle)?;
                        if resolution
                            .inner_with(&self.module.types)
                            .pointer_space()
                            .is_some()
                        {
                            continue;
                        }
                        let name = format!("{}{}", back::BAKE_PREFIX, handle.index());
                        write!(self.out, "{}", level)?;
                        self.write_baked_decl(resolution, &name)?;
                        write!(self.out, " = ")?;
                        self.write_expr(handle, ctx)?;
                        writeln!(self.out, ";")?;
                        self.named_expressions.insert(handle, name);
                    }
                }
            }
            St::Block(ref block) => {
                writeln!(self.out, "{}{{", level)?;
                for statement in block.iter() {
                    self.write_stmt(statement, ctx, level.next())?;
                }
                writeln!(self.out, "{}}}", level)?;
            }
            St::If {
                condition,
                ref accept,
                ref reject,
            } => {
                write!(self.out, "{}if (", level)?;
                self.write_expr(condition, ctx)?;
                writeln!(self.out, ") {{")?;
                for statement in accept.iter() {
                    self.write_stmt(statement, ctx, level.next())?;
                }
                if !reject.is_empty() {
                    writeln!(self.out, "{}}} else {{", level)?;
                    for statement in reject.iter() {
                        self.write_stmt(statement, ctx, level.next())?;
                    }
                }
                writeln!(self.out, "{}}}", level)?;
            }
            St::Switch {
                selector,
                ref cases,
                ref default,
            } => {
                write!(self.out, "{}switch(", level)?;
                self.write_expr(selector, ctx)?;
                writeln!(self.out, ") {{")?;
                for case in cases.iter() {
                    for value in case.values.iter() {
                        writeln!(self.out, "{}case {}:", level.next(), value)?;
                    }
                    writeln!(self.out, "{}{{", level.next())?;
                    for statement in case.body.iter() {
                        self.write_stmt(statement, ctx, level.next().next())?;
                    }
                    if !case.fall_through && !block_ends_control_flow(&case.body) {
                        writeln!(self.out, "{}break;", level.next().next())?;
                    }
                    writeln!(self.out, "{}}}", level.next())?;
                }
                writeln!(self.out, "{}default:", level.next())?;
                writeln!(self.out, "{}{{", level.next())?;
                for statement in default.iter() {
                    self.write_stmt(statement, ctx, level.next().next())?;
                }
                writeln!(self.out, "{}}}", level.next())?;
                writeln!(self.out, "{}}}", level)?;
            }
            St::Loop {
                ref body,
                ref continuing,
                break_if,
            } => {
                let bound = if self.options.force_loop_bounding {
                    let name = self.namer.call("loop_bound");
                    writeln!(self.out, "{}uint {} = 4294967295u;", level, name)?;
                    Some(name)
                } else {
                    None
                };
                if continuing.is_empty() && break_if.is_none() && bound.is_none() {
                    writeln!(self.out, "{}while(true) {{", level)?;
                    for statement in body.iter() {
                        self.write_stmt(statement, ctx, level.next())?;
                    }
                    writeln!(self.out, "{}}}", level)?;
                } else {
                    let guard = self.namer.call("loop_init");
                    writeln!(self.out, "{}bool {} = true;", level, guard)?;
                    writeln!(self.out, "{}while(true) {{", level)?;
                    let l2 = level.next();
                    if let Some(ref bound) = bound {
                        writeln!(self.out, "{}if ({} == 0u) {{ break; }}", l2, bound)?;
                        writeln!(self.out, "{}{} -= 1u;", l2, bound)?;
                    }
                    writeln!(self.out, "{}if (!{}) {{", l2, guard)?;
                    for statement in continuing.iter() {
                        self.write_stmt(statement, ctx, l2.next())?;
                    }
                    if let Some(condition) = break_if {
                        write!(self.out, "{}if (", l2.next())?;
                        self.write_expr(condition, ctx)?;
                        writeln!(self.out, ") {{ break; }}")?;
                    }
                    writeln!(self.out, "{}}}", l2)?;
                    writeln!(self.out, "{}{} = false;", l2, guard)?;
                    for statement in body.iter() {
                        self.write_stmt(statement, ctx, l2)?;
                    }
                    writeln!(self.out, "{}}}", level)?;
                }
            }
            St::Break => writeln!(self.out, "{}break;", level)?,
            St::Continue => writeln!(self.out, "{}continue;", level)?,
            St::Return { value } => {
                if ctx.ty.is_entry_point() && self.ep_output.is_some() {
                    self.write_entry_point_return(value, ctx, level)?;
                } else {
                    match value {
                        Some(value) => {
                            write!(self.out, "{}return ", level)?;
                            self.write_expr(value, ctx)?;
                            writeln!(self.out, ";")?;
                        }
                        None => writeln!(self.out, "{}return;", level)?,
                    }
                }
            }
            St::Kill => writeln!(self.out, "{}discard;", level)?,
            St::Barrier(flags) => {
                let name = if flags.contains(crate::Barrier::STORAGE)
                    && flags.contains(crate::Barrier::WORK_GROUP)
                {
                    "AllMemoryBarrierWithGroupSync"
                } else if flags
                    .intersects(crate::Barrier::STORAGE | crate::Barrier::TEXTURE)
                {
                    "DeviceMemoryBarrierWithGroupSync"
                } else {
                    "GroupMemoryBarrierWithGroupSync"
                };
                writeln!(self.out, "{}{}();", level, name)?;
            }
            St::Store { pointer, value } => {
                write!(self.out, "{}", level)?;
                self.write_expr(pointer, ctx)?;
                write!(self.out, " = ")?;
                self.write_expr(value, ctx)?;
                writeln!(self.out, ";")?;
            }
            St::ImageStore {
                image,
                coordinate,
                array_index,
                value,
            } => {
                write!(self.out, "{}", level)?;
                self.write_expr(image, ctx)?;
                write!(self.out, "[")?;
                self.write_image_coordinate(coordinate, array_index, ctx)?;
                write!(self.out, "] = ")?;
                self.write_expr(value, ctx)?;
                writeln!(self.out, ";")?;
            }
            St::Atomic {
                pointer,
                ref fun,
                value,
                result,
            } => self.write_atomic_stmt(pointer, fun, value, result, ctx, level)?,
            St::WorkGroupUniformLoad { pointer, result } => {
                writeln!(
                    self.out,
                    "{}GroupMemoryBarrierWithGroupSync();",
                    level
                )?;
                let name = format!("{}{}", back::BAKE_PREFIX, result.index());
                let resolution = ctx.resolution(result)?;
                write!(self.out, "{}", level)?;
                self.write_baked_decl(resolution, &name)?;
                write!(self.out, " = ")?;
                self.write_expr(pointer, ctx)?;
                writeln!(self.out, ";")?;
                writeln!(
                    self.out,
                    "{}GroupMemoryBarrierWithGroupSync();",
                    level
                )?;
                self.named_expressions.insert(result, name);
            }
            St::Call {
                function,
                ref arguments,
                result,
            } => {
                write!(self.out, "{}", level)?;
                if let Some(expr) = result {
                    let name = format!("{}{}", back::BAKE_PREFIX, expr.index());
                    let resolution = ctx.resolution(expr)?;
                    self.write_baked_decl(resolution, &name)?;
                    write!(self.out, " = ")?;
                    self.named_expressions.insert(expr, name);
                }
                let fun_name = self.names[&NameKey::Function(function)].clone();
                write!(self.out, "{}(", fun_name)?;
                for (index, &argument) in arguments.iter().enumerate() {
                    if index != 0 {
                        write!(self.out, ", ")?;
                    }
                    self.write_expr(argument, ctx)?;
                }
                writeln!(self.out, ");")?;

                if let Some(expr) = result {
                    self.flush_pending_inits(expr, ctx, level)?;
                }
            }
            St::RayQuery { .. } => {
                return Err(Error::Unimplemented(String::from("ray queries")))
            }
        }
        Ok(())
    }

    fn flush_pending_inits(
        &mut self,
        just_finished: Handle<crate::Expression>,
        ctx: &FunctionCtx<'a>,
        level: back::Level,
    ) -> Result<(), Error> {
        let pending = std::mem::replace(&mut self.pending_inits, Vec::new());
        let (ready, waiting): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|p| p.call_results.last() == Some(&just_finished));
        self.pending_inits = waiting;
        for pending_init in ready {
            let local_name =
                self.names[&NameKey::FunctionLocal(ctx.handle, pending_init.local)].clone();
            let head = match pending_init.call_results.split_last() {
                Some((_, head)) => head,
                None => continue,
            };
            for &call_result in head {
                write!(self.out, "{}{} = ", level, local_name)?;
                self.write_expr(call_result, ctx)?;
                writeln!(self.out, ";")?;
            }
            write!(self.out, "{}{} = ", level, local_name)?;
            self.write_expr(pending_init.root, ctx)?;
            writeln!(self.out, ";")?;
        }
        Ok(())
    }

    fn write_entry_point_return(
        &mut self,
        value: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx<'a>,
        level: back::Level,
    ) -> Result<(), Error> {
        let value = match value {
            Some(value) => value,
            None => {
                writeln!(self.out, "{}return;", level)?;
                return Ok(());
            }
        };
        let (struct_name, fields) = self
            .ep_output
            .clone()
            .ok_or_else(|| Error::Custom(String::from("missing entry point output")))?;
        let tmp = format!("{}{}_res", back::BAKE_PREFIX, value.index());
        let resolution = ctx.resolution(value)?;
        write!(self.out, "{}", level)?;
        self.write_baked_decl(resolution, &tmp)?;
        write!(self.out, " = ")?;
        self.write_expr(value, ctx)?;
        writeln!(self.out, ";")?;

        let result_ty = resolution
            .handle()
            .ok_or_else(|| Error::Custom(String::from("entry point result must be a struct")))?;
        let output_var = self.namer.call("_output");
        writeln!(self.out, "{}{} {};", level, struct_name, output_var)?;
        for (index, field) in fields.iter().enumerate() {
            let member_name =
                self.names[&NameKey::StructMember(result_ty, index as u32)].clone();
            writeln!(
                self.out,
                "{}{}.{} = {}.{};",
                level, output_var, field, tmp, member_name
            )?;
        }
        writeln!(self.out, "{}return {};", level, output_var)?;
        Ok(())
    }

    fn write_baked_decl(
        &mut self,
        resolution: &proc::TypeResolution,
        name: &str,
    ) -> Result<(), Error> {
        match *resolution {
            proc::TypeResolution::Handle(ty) => self.write_var_decl(ty, name)?,
            proc::TypeResolution::Value(ref inner) => {
                let inner = inner.clone();
                self.write_value_inner(&inner)?;
                write!(self.out, " {}", name)?;
            }
        }
        Ok(())
    }

    fn write_atomic_stmt(
        &mut self,
        pointer: Handle<crate::Expression>,
        fun: &crate::AtomicFunction,
        value: Handle<crate::Expression>,
        result: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx<'a>,
        level: back::Level,
    ) -> Result<(), Error> {
        use crate::AtomicFunction as Af;

        let value_kind = ctx
            .resolution(value)?
            .inner_with(&self.module.types)
            .scalar_kind();
        let scalar = match value_kind {
            Some(crate::ScalarKind::Sint) => "int",
            _ => "uint",
        };

        if let Af::Exchange {
            compare: Some(compare),
        } = *fun
        {
            let old = match result {
                Some(result) => format!("{}{}_old", back::BAKE_PREFIX, result.index()),
                None => self.namer.call("_atomic_old"),
            };
            writeln!(self.out, "{}{} {};", level, scalar, old)?;
            write!(self.out, "{}InterlockedCompareExchange(", level)?;
            self.write_expr(pointer, ctx)?;
            write!(self.out, ", ")?;
            self.write_expr(compare, ctx)?;
            write!(self.out, ", ")?;
            self.write_expr(value, ctx)?;
            writeln!(self.out, ", {});", old)?;
            if let Some(result) = result {
                let resolution = ctx.resolution(result)?;
                let name = format!("{}{}", back::BAKE_PREFIX, result.index());
                write!(self.out, "{}", level)?;
                self.write_baked_decl(resolution, &name)?;
                write!(self.out, " = {{ {}, {} == ", old, old)?;
                self.write_expr(compare, ctx)?;
                writeln!(self.out, " }};")?;
                self.named_expressions.insert(result, name);
            }
            return Ok(());
        }

        let fun_str = match *fun {
            Af::Add | Af::Subtract => "InterlockedAdd",
            Af::And => "InterlockedAnd",
            Af::ExclusiveOr => "InterlockedXor",
            Af::InclusiveOr => "InterlockedOr",
            Af::Min => "InterlockedMin",
            Af::Max => "InterlockedMax",
            Af::Exchange { compare: None } => "InterlockedExchange",
            Af::Exchange { .. } => "InterlockedCompareExchange",
        };

        let result_name = match result {
            Some(result) => {
                let name = format!("{}{}", back::BAKE_PREFIX, result.index());
                writeln!(self.out, "{}{} {};", level, scalar, name)?;
                self.named_expressions.insert(result, name.clone());
                Some(name)
            }
            None => None,
        };

        write!(self.out, "{}{}(", level, fun_str)?;
        self.write_expr(pointer, ctx)?;
        write!(self.out, ", ")?;
        if let Af::Subtract = *fun {
            write!(self.out, "-(")?;
            self.write_expr(value, ctx)?;
            write!(self.out, ")")?;
        } else {
            self.write_expr(value, ctx)?;
        }
        if let Some(name) = result_name {
            write!(self.out, ", {}", name)?;
        }
        writeln!(self.out, ");")?;
        Ok(())
    }

    /// `GetDimensions` works through out-parameters, so image queries are
    /// emitted as statements with synthesized temporaries.
    fn write_image_query_bake(
        &mut self,
        handle: Handle<crate::Expression>,
        image: Handle<crate::Expression>,
        query: crate::ImageQuery,
        ctx: &FunctionCtx<'a>,
        level: back::Level,
    ) -> Result<(), Error> {
        let name = format!("{}{}", back::BAKE_PREFIX, handle.index());
        let (dim, arrayed, class) =
            match *ctx.resolution(image)?.inner_with(&self.module.types) {
                crate::TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => (dim, arrayed, class),
                _ => return Err(Error::Custom(String::from("image query of a non-image"))),
            };
        let multi = match class {
            crate::ImageClass::Sampled { multi, .. } | crate::ImageClass::Depth { multi } => multi,
            crate::ImageClass::Storage { .. } => false,
        };
        let is_storage = match class {
            crate::ImageClass::Storage { .. } => true,
            _ => false,
        };
        let dim_comps: u32 = match dim {
            crate::ImageDimension::D1 => 1,
            crate::ImageDimension::D2 | crate::ImageDimension::Cube => 2,
            crate::ImageDimension::D3 => 3,
        };
        // GetDimensions wants every out parameter wired up.
        let mut out_args: Vec<String> = Vec::new();
        for comp in 0..dim_comps {
            out_args.push(format!("{}_d{}", name, comp));
        }
        if arrayed {
            out_args.push(format!("{}_layers", name));
        }
        let has_mips = !is_storage && !multi;
        let mip_arg = if has_mips {
            let s = format!("{}_mips", name);
            Some(s)
        } else if multi {
            let s = format!("{}_samples", name);
            Some(s)
        } else {
            None
        };
        for arg in out_args.iter().chain(mip_arg.iter()) {
            writeln!(self.out, "{}uint {};", level, arg)?;
        }
        write!(self.out, "{}", level)?;
        self.write_expr(image, ctx)?;
        write!(self.out, ".GetDimensions(")?;
        if has_mips {
            // the queried mip level scales the reported extent
            match query {
                crate::ImageQuery::Size { level: Some(lod) } => {
                    self.write_expr(lod, ctx)?;
                    write!(self.out, ", ")?;
                }
                _ => write!(self.out, "0u, ")?,
            }
        }
        for (index, arg) in out_args.iter().enumerate() {
            if index != 0 {
                write!(self.out, ", ")?;
            }
            write!(self.out, "{}", arg)?;
        }
        if let Some(ref mip) = mip_arg {
            write!(self.out, ", {}", mip)?;
        }
        writeln!(self.out, ");")?;

        write!(self.out, "{}", level)?;
        match query {
            crate::ImageQuery::Size { .. } => {
                if dim_comps == 1 {
                    writeln!(self.out, "uint {} = {};", name, out_args[0])?;
                } else {
                    write!(self.out, "uint{} {} = uint{}(", dim_comps, name, dim_comps)?;
                    for (index, arg) in out_args[..dim_comps as usize].iter().enumerate() {
                        if index != 0 {
                            write!(self.out, ", ")?;
                        }
                        write!(self.out, "{}", arg)?;
                    }
                    writeln!(self.out, ");")?;
                }
            }
            crate::ImageQuery::NumLayers => {
                let layers = out_args
                    .last()
                    .cloned()
                    .unwrap_or_else(|| String::from("0u"));
                writeln!(self.out, "uint {} = {};", name, layers)?;
            }
            crate::ImageQuery::NumLevels | crate::ImageQuery::NumSamples => {
                let arg = mip_arg.unwrap_or_else(|| String::from("0u"));
                writeln!(self.out, "uint {} = {};", name, arg)?;
            }
        }
        self.named_expressions.insert(handle, name);
        Ok(())
    }

    fn write_array_length_bake(
        &mut self,
        handle: Handle<crate::Expression>,
        pointer: Handle<crate::Expression>,
        ctx: &FunctionCtx<'a>,
        level: back::Level,
    ) -> Result<(), Error> {
        let global = match ctx.fun.expressions[pointer] {
            crate::Expression::GlobalVariable(global) => global,
            _ => {
                return Err(Error::Unimplemented(String::from(
                    "array length of a nested pointer",
                )))
            }
        };
        let buffer_name = self.names[&NameKey::GlobalVariable(global)].clone();
        let name = format!("{}{}", back::BAKE_PREFIX, handle.index());
        writeln!(self.out, "{}uint {n}_count; uint {n}_stride;", level, n = name)?;
        writeln!(
            self.out,
            "{}{}.GetDimensions({n}_count, {n}_stride);",
            level,
            buffer_name,
            n = name
        )?;
        writeln!(self.out, "{}uint {n} = {n}_count;", level, n = name)?;
        self.named_expressions.insert(handle, name);
        Ok(())
    }

    fn write_image_coordinate(
        &mut self,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        match array_index {
            None => self.write_expr(coordinate, ctx)?,
            Some(array_index) => {
                let size = match *ctx
                    .resolution(coordinate)?
                    .inner_with(&self.module.types)
                {
                    crate::TypeInner::Scalar { .. } => 1,
                    crate::TypeInner::Vector { size, .. } => size as u8,
                    _ => {
                        return Err(Error::Custom(String::from(
                            "unexpected image coordinate type",
                        )))
                    }
                };
                write!(self.out, "uint{}(", size + 1)?;
                self.write_expr(coordinate, ctx)?;
                write!(self.out, ", ")?;
                self.write_expr(array_index, ctx)?;
                write!(self.out, ")")?;
            }
        }
        Ok(())
    }

    fn write_expr(
        &mut self,
        expr: Handle<crate::Expression>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        if let Some(name) = self.named_expressions.get(&expr) {
            write!(self.out, "{}", name)?;
            return Ok(());
        }

        use crate::Expression as Ex;
        match ctx.fun.expressions[expr] {
            Ex::Literal(ref literal) => {
                let literal = *literal;
                self.write_literal(&literal)?
            }
            Ex::Constant(handle) => {
                if self.module.constants[handle].name.is_some() {
                    let name = self.names[&NameKey::Constant(handle)].clone();
                    write!(self.out, "{}", name)?
                } else {
                    self.write_constant(handle)?
                }
            }
            Ex::ZeroValue(ty) => {
                match self.module.types[ty].inner {
                    crate::TypeInner::Struct { .. } => {
                        let name = self.names[&NameKey::Type(ty)].clone();
                        write!(self.out, "({})0", name)?;
                    }
                    ref other => {
                        let other = other.clone();
                        write!(self.out, "(")?;
                        self.write_value_inner(&other)?;
                        write!(self.out, ")0")?;
                    }
                }
            }
            Ex::Compose { ty, ref components } => {
                let components = components.clone();
                let (open, close) = match self.module.types[ty].inner {
                    crate::TypeInner::Struct { .. } | crate::TypeInner::Array { .. } => {
                        // initializer-list syntax
                        (String::from("{ "), " }")
                    }
                    ref other => {
                        let other = other.clone();
                        let mut tmp = std::mem::take(&mut self.out);
                        self.write_value_inner(&other)?;
                        std::mem::swap(&mut self.out, &mut tmp);
                        (format!("{}(", tmp), ")")
                    }
                };
                write!(self.out, "{}", open)?;
                for (index, &component) in components.iter().enumerate() {
                    if index != 0 {
                        write!(self.out, ", ")?;
                    }
                    self.write_expr(component, ctx)?;
                }
                write!(self.out, "{}", close)?;
            }
            Ex::Access { base, index } => {
                self.write_expr(base, ctx)?;
                write!(self.out, "[")?;
                // clamp dynamic indices into fixed arrays
                let clamp_limit = if self.options.restrict_indexing {
                    match *ctx.resolution(base)?.inner_with(&self.module.types) {
                        crate::TypeInner::Pointer { base: ptr_base, .. } => {
                            match self.module.types[ptr_base].inner {
                                crate::TypeInner::Array {
                                    size: crate::ArraySize::Constant(length),
                                    ..
                                } => Some(length.get()),
                                _ => None,
                            }
                        }
                        crate::TypeInner::Array {
                            size: crate::ArraySize::Constant(length),
                            ..
                        } => Some(length.get()),
                        _ => None,
                    }
                } else {
                    None
                };
                match clamp_limit {
                    Some(limit) => {
                        write!(self.out, "min(uint(")?;
                        self.write_expr(index, ctx)?;
                        write!(self.out, "), {}u)", limit - 1)?;
                    }
                    None => self.write_expr(index, ctx)?,
                }
                write!(self.out, "]")?;
            }
            Ex::AccessIndex { base, index } => {
                let module = self.module;
                let base_res = ctx.resolution(base)?;
                let base_inner = base_res.inner_with(&module.types);
                match *base_inner {
                    crate::TypeInner::Struct { .. } => {
                        let ty = base_res
                            .handle()
                            .ok_or_else(|| Error::Custom(String::from("unnamed struct")))?;
                        let member_name = self.names[&NameKey::StructMember(ty, index)].clone();
                        self.write_expr(base, ctx)?;
                        write!(self.out, ".{}", member_name)?;
                    }
                    crate::TypeInner::Vector { .. }
                    | crate::TypeInner::ValuePointer { size: Some(_), .. } => {
                        self.write_expr(base, ctx)?;
                        write!(self.out, ".{}", back::COMPONENTS[index as usize])?;
                    }
                    crate::TypeInner::Pointer { base: ptr_base, .. } => {
                        match module.types[ptr_base].inner {
                            crate::TypeInner::Struct { .. } => {
                                let member_name =
                                    self.names[&NameKey::StructMember(ptr_base, index)].clone();
                                self.write_expr(base, ctx)?;
                                write!(self.out, ".{}", member_name)?;
                            }
                            crate::TypeInner::Vector { .. } => {
                                self.write_expr(base, ctx)?;
                                write!(self.out, ".{}", back::COMPONENTS[index as usize])?;
                            }
                            _ => {
                                self.write_expr(base, ctx)?;
                                write!(self.out, "[{}]", index)?;
                            }
                        }
                    }
                    _ => {
                        self.write_expr(base, ctx)?;
                        write!(self.out, "[{}]", index)?;
                    }
                }
            }
            Ex::Splat { size, value } => {
                let inner = ctx
                    .resolution(expr)?
                    .inner_with(&self.module.types)
                    .clone();
                match inner {
                    crate::TypeInner::Vector { .. } => self.write_value_inner(&inner)?,
                    _ => write!(self.out, "float{}", size as u8)?,
                }
                write!(self.out, "(")?;
                self.write_expr(value, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Swizzle {
                size,
                vector,
                pattern,
            } => {
                self.write_expr(vector, ctx)?;
                write!(self.out, ".")?;
                for &sc in pattern[..size as usize].iter() {
                    write!(self.out, "{}", back::COMPONENTS[sc as usize])?;
                }
            }
            Ex::FunctionArgument(index) => {
                let name = self.names[&NameKey::FunctionArgument(ctx.handle, index)].clone();
                write!(self.out, "{}", name)?;
            }
            Ex::GlobalVariable(handle) => {
                let name = self.names[&NameKey::GlobalVariable(handle)].clone();
                write!(self.out, "{}", name)?;
                if self.indexed_globals.contains(&handle) {
                    write!(self.out, "[0]")?;
                }
            }
            Ex::LocalVariable(handle) => {
                let name = self.names[&NameKey::FunctionLocal(ctx.handle, handle)].clone();
                write!(self.out, "{}", name)?;
            }
            Ex::Load { pointer } => self.write_expr(pointer, ctx)?,
            Ex::ImageSample {
                image,
                sampler,
                gather,
                coordinate,
                array_index,
                offset,
                level,
                depth_ref,
            } => self.write_image_sample(
                image,
                sampler,
                gather,
                coordinate,
                array_index,
                offset,
                level,
                depth_ref,
                ctx,
            )?,
            Ex::ImageLoad {
                image,
                coordinate,
                array_index,
                index,
            } => self.write_image_load(image, coordinate, array_index, index, ctx)?,
            Ex::ImageQuery { .. } => {
                return Err(Error::Custom(String::from(
                    "image queries must be emitted as statements",
                )))
            }
            Ex::Unary { op, expr: operand } => {
                let kind = ctx
                    .resolution(operand)?
                    .inner_with(&self.module.types)
                    .scalar_kind();
                match op {
                    crate::UnaryOperator::Negate
                        if kind == Some(crate::ScalarKind::Sint) =>
                    {
                        write!(self.out, "_glaive_neg(")?;
                        self.write_expr(operand, ctx)?;
                        write!(self.out, ")")?;
                    }
                    crate::UnaryOperator::Negate => {
                        write!(self.out, "(-")?;
                        self.write_expr(operand, ctx)?;
                        write!(self.out, ")")?;
                    }
                    crate::UnaryOperator::Not => {
                        let op_str = match kind {
                            Some(crate::ScalarKind::Bool) => "!",
                            _ => "~",
                        };
                        write!(self.out, "({}", op_str)?;
                        self.write_expr(operand, ctx)?;
                        write!(self.out, ")")?;
                    }
                }
            }
            Ex::Binary { op, left, right } => {
                self.write_binary(op, left, right, ctx)?;
            }
            Ex::Select {
                condition,
                accept,
                reject,
            } => {
                write!(self.out, "(")?;
                self.write_expr(condition, ctx)?;
                write!(self.out, " ? ")?;
                self.write_expr(accept, ctx)?;
                write!(self.out, " : ")?;
                self.write_expr(reject, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Derivative { axis, expr: operand } => {
                let fun = match axis {
                    crate::DerivativeAxis::X => "ddx",
                    crate::DerivativeAxis::Y => "ddy",
                    crate::DerivativeAxis::Width => "fwidth",
                };
                write!(self.out, "{}(", fun)?;
                self.write_expr(operand, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Relational { fun, argument } => {
                let fun_str = match fun {
                    crate::RelationalFunction::All => "all",
                    crate::RelationalFunction::Any => "any",
                    crate::RelationalFunction::IsNan => "isnan",
                    crate::RelationalFunction::IsInf => "isinf",
                };
                write!(self.out, "{}(", fun_str)?;
                self.write_expr(argument, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Math {
                fun,
                arg,
                arg1,
                arg2,
                arg3,
            } => self.write_math_function(fun, arg, arg1, arg2, arg3, ctx)?,
            Ex::As {
                expr: operand,
                kind,
                convert,
            } => self.write_cast(expr, operand, kind, convert, ctx)?,
            Ex::ArrayLength(_) => {
                return Err(Error::Custom(String::from(
                    "array length must be emitted as a statement",
                )))
            }
            Ex::CallResult(_)
            | Ex::AtomicResult { .. }
            | Ex::WorkGroupUniformLoadResult { .. } => {
                return Err(Error::Custom(String::from(
                    "result expression used before the owning statement",
                )))
            }
        }
        Ok(())
    }

    fn write_binary(
        &mut self,
        op: crate::BinaryOperator,
        left: Handle<crate::Expression>,
        right: Handle<crate::Expression>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        use crate::BinaryOperator as Bo;
        use crate::TypeInner as Ti;

        let module = self.module;
        let left_inner = ctx.resolution(left)?.inner_with(&module.types);
        let right_inner = ctx.resolution(right)?.inner_with(&module.types);

        // Matrices are stored transposed, so multiplication runs through
        // `mul` with the arguments reversed.
        let uses_mul = match (op, left_inner, right_inner) {
            (Bo::Multiply, &Ti::Matrix { .. }, &Ti::Vector { .. })
            | (Bo::Multiply, &Ti::Vector { .. }, &Ti::Matrix { .. })
            | (Bo::Multiply, &Ti::Matrix { .. }, &Ti::Matrix { .. }) => true,
            _ => false,
        };
        if uses_mul {
            write!(self.out, "mul(")?;
            self.write_expr(right, ctx)?;
            write!(self.out, ", ")?;
            self.write_expr(left, ctx)?;
            write!(self.out, ")")?;
            return Ok(());
        }

        let kind = left_inner.scalar_kind();
        let is_int = match kind {
            Some(crate::ScalarKind::Sint) | Some(crate::ScalarKind::Uint) => true,
            _ => false,
        };
        if is_int {
            let helper = match op {
                Bo::Divide => Some("_glaive_div"),
                Bo::Modulo => Some("_glaive_mod"),
                _ => None,
            };
            if let Some(helper) = helper {
                write!(self.out, "{}(", helper)?;
                self.write_expr(left, ctx)?;
                write!(self.out, ", ")?;
                self.write_expr(right, ctx)?;
                write!(self.out, ")")?;
                return Ok(());
            }
        }

        write!(self.out, "(")?;
        self.write_expr(left, ctx)?;
        write!(self.out, " {} ", binary_operation_str(op))?;
        self.write_expr(right, ctx)?;
        write!(self.out, ")")?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn write_image_sample(
        &mut self,
        image: Handle<crate::Expression>,
        sampler: Handle<crate::Expression>,
        gather: Option<crate::SwizzleComponent>,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        offset: Option<Handle<crate::Constant>>,
        level: crate::SampleLevel,
        depth_ref: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        self.write_expr(image, ctx)?;
        let method = match (gather, depth_ref) {
            (Some(component), None) => match component {
                crate::SwizzleComponent::X => "GatherRed",
                crate::SwizzleComponent::Y => "GatherGreen",
                crate::SwizzleComponent::Z => "GatherBlue",
                crate::SwizzleComponent::W => "GatherAlpha",
            },
            (Some(_), Some(_)) => "GatherCmp",
            (None, Some(_)) => match level {
                crate::SampleLevel::Zero => "SampleCmpLevelZero",
                _ => "SampleCmp",
            },
            (None, None) => match level {
                crate::SampleLevel::Auto => "Sample",
                crate::SampleLevel::Zero | crate::SampleLevel::Exact(_) => "SampleLevel",
                crate::SampleLevel::Bias(_) => "SampleBias",
                crate::SampleLevel::Gradient { .. } => "SampleGrad",
            },
        };
        write!(self.out, ".{}(", method)?;
        self.write_expr(sampler, ctx)?;
        write!(self.out, ", ")?;

        match array_index {
            None => self.write_expr(coordinate, ctx)?,
            Some(array_index) => {
                let size = match *ctx
                    .resolution(coordinate)?
                    .inner_with(&self.module.types)
                {
                    crate::TypeInner::Scalar { .. } => 1,
                    crate::TypeInner::Vector { size, .. } => size as u8,
                    _ => {
                        return Err(Error::Custom(String::from(
                            "unexpected sample coordinate type",
                        )))
                    }
                };
                write!(self.out, "float{}(", size + 1)?;
                self.write_expr(coordinate, ctx)?;
                write!(self.out, ", float(")?;
                self.write_expr(array_index, ctx)?;
                write!(self.out, "))")?;
            }
        }

        if let Some(depth_ref) = depth_ref {
            write!(self.out, ", ")?;
            self.write_expr(depth_ref, ctx)?;
        }
        match level {
            crate::SampleLevel::Auto => {}
            crate::SampleLevel::Zero => {
                if depth_ref.is_none() && gather.is_none() {
                    write!(self.out, ", 0.0")?;
                }
            }
            crate::SampleLevel::Exact(lod) => {
                write!(self.out, ", ")?;
                self.write_expr(lod, ctx)?;
            }
            crate::SampleLevel::Bias(bias) => {
                write!(self.out, ", ")?;
                self.write_expr(bias, ctx)?;
            }
            crate::SampleLevel::Gradient { x, y } => {
                write!(self.out, ", ")?;
                self.write_expr(x, ctx)?;
                write!(self.out, ", ")?;
                self.write_expr(y, ctx)?;
            }
        }
        if let Some(constant) = offset {
            write!(self.out, ", ")?;
            self.write_constant(constant)?;
        }
        write!(self.out, ")")?;
        Ok(())
    }

    fn write_image_load(
        &mut self,
        image: Handle<crate::Expression>,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        index: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        let (class, multi) = match *ctx.resolution(image)?.inner_with(&self.module.types) {
            crate::TypeInner::Image { class, .. } => {
                let multi = match class {
                    crate::ImageClass::Sampled { multi, .. }
                    | crate::ImageClass::Depth { multi } => multi,
                    crate::ImageClass::Storage { .. } => false,
                };
                (class, multi)
            }
            _ => return Err(Error::Custom(String::from("image load of a non-image"))),
        };
        match class {
            crate::ImageClass::Storage { .. } => {
                self.write_expr(image, ctx)?;
                write!(self.out, "[")?;
                self.write_image_coordinate(coordinate, array_index, ctx)?;
                write!(self.out, "]")?;
            }
            _ if multi => {
                self.write_expr(image, ctx)?;
                write!(self.out, ".Load(")?;
                self.write_image_coordinate(coordinate, array_index, ctx)?;
                write!(self.out, ", ")?;
                match index {
                    Some(index) => self.write_expr(index, ctx)?,
                    None => write!(self.out, "0")?,
                }
                write!(self.out, ")")?;
            }
            _ => {
                // the mip level rides along as the last coordinate component
                let size = match *ctx
                    .resolution(coordinate)?
                    .inner_with(&self.module.types)
                {
                    crate::TypeInner::Scalar { .. } => 1,
                    crate::TypeInner::Vector { size, .. } => size as u8,
                    _ => {
                        return Err(Error::Custom(String::from(
                            "unexpected load coordinate type",
                        )))
                    }
                };
                let comps = size + array_index.is_some() as u8 + 1;
                self.write_expr(image, ctx)?;
                write!(self.out, ".Load(int{}(", comps)?;
                self.write_expr(coordinate, ctx)?;
                if let Some(array_index) = array_index {
                    write!(self.out, ", ")?;
                    self.write_expr(array_index, ctx)?;
                }
                write!(self.out, ", ")?;
                match index {
                    Some(index) => self.write_expr(index, ctx)?,
                    None => write!(self.out, "0")?,
                }
                write!(self.out, "))")?;
            }
        }
        Ok(())
    }

    fn write_math_function(
        &mut self,
        fun: crate::MathFunction,
        arg: Handle<crate::Expression>,
        arg1: Option<Handle<crate::Expression>>,
        arg2: Option<Handle<crate::Expression>>,
        arg3: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        use crate::MathFunction as Mf;
        let arg_kind = ctx
            .resolution(arg)?
            .inner_with(&self.module.types)
            .scalar_kind();
        let fun_name = match fun {
            Mf::Abs => {
                if arg_kind == Some(crate::ScalarKind::Sint) {
                    "_glaive_abs"
                } else {
                    "abs"
                }
            }
            Mf::Min => "min",
            Mf::Max => "max",
            Mf::Clamp => "clamp",
            Mf::Saturate => "saturate",
            Mf::Cos => "cos",
            Mf::Cosh => "cosh",
            Mf::Sin => "sin",
            Mf::Sinh => "sinh",
            Mf::Tan => "tan",
            Mf::Tanh => "tanh",
            Mf::Acos => "acos",
            Mf::Asin => "asin",
            Mf::Atan => "atan",
            Mf::Atan2 => "atan2",
            Mf::Asinh | Mf::Acosh | Mf::Atanh => {
                return self.write_inverse_hyperbolic(fun, arg, ctx)
            }
            Mf::Radians => "radians",
            Mf::Degrees => "degrees",
            Mf::Ceil => "ceil",
            Mf::Floor => "floor",
            Mf::Round => "round",
            Mf::Fract => "frac",
            Mf::Trunc => "trunc",
            Mf::Modf => "_glaive_modf",
            Mf::Frexp => "_glaive_frexp",
            Mf::Ldexp => "ldexp",
            Mf::Exp => "exp",
            Mf::Exp2 => "exp2",
            Mf::Log => "log",
            Mf::Log2 => "log2",
            Mf::Pow => "pow",
            Mf::Dot => "dot",
            Mf::Cross => "cross",
            Mf::Distance => "distance",
            Mf::Length => "length",
            Mf::Normalize => "normalize",
            Mf::FaceForward => "faceforward",
            Mf::Reflect => "reflect",
            Mf::Refract => "refract",
            Mf::Sign => "sign",
            Mf::Fma => "mad",
            Mf::Mix => "lerp",
            Mf::Step => "step",
            Mf::SmoothStep => "smoothstep",
            Mf::Sqrt => "sqrt",
            Mf::InverseSqrt => "rsqrt",
            Mf::Transpose => "transpose",
            Mf::Determinant => "determinant",
            Mf::CountOneBits => "countbits",
            Mf::ReverseBits => "reversebits",
            Mf::ExtractBits => "_glaive_extract_bits",
            Mf::InsertBits => "_glaive_insert_bits",
            Mf::FindLsb => "firstbitlow",
            Mf::FindMsb => "firstbithigh",
        };
        write!(self.out, "{}(", fun_name)?;
        self.write_expr(arg, ctx)?;
        for handle in [arg1, arg2, arg3].iter().filter_map(|&a| a) {
            write!(self.out, ", ")?;
            self.write_expr(handle, ctx)?;
        }
        write!(self.out, ")")?;
        Ok(())
    }

    /// HLSL has no inverse hyperbolics; expand through `log`.
    fn write_inverse_hyperbolic(
        &mut self,
        fun: crate::MathFunction,
        arg: Handle<crate::Expression>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        match fun {
            crate::MathFunction::Asinh => {
                write!(self.out, "log(")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, " + sqrt(")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, " * ")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, " + 1.0))")?;
            }
            crate::MathFunction::Acosh => {
                write!(self.out, "log(")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, " + sqrt(")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, " * ")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, " - 1.0))")?;
            }
            crate::MathFunction::Atanh => {
                write!(self.out, "(0.5 * log((1.0 + ")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, ") / (1.0 - ")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, ")))")?;
            }
            _ => {}
        }
        Ok(())
    }

    fn write_cast(
        &mut self,
        expr: Handle<crate::Expression>,
        operand: Handle<crate::Expression>,
        kind: crate::ScalarKind,
        convert: Option<crate::Bytes>,
        ctx: &FunctionCtx<'a>,
    ) -> Result<(), Error> {
        use crate::ScalarKind as Sk;
        let source_kind = ctx
            .resolution(operand)?
            .inner_with(&self.module.types)
            .scalar_kind()
            .ok_or_else(|| Error::Custom(String::from("cast operand has no scalar kind")))?;
        match convert {
            Some(_) => match (source_kind, kind) {
                // NaN must land on zero, and out-of-range values saturate
                (Sk::Float, Sk::Sint) => {
                    write!(self.out, "_glaive_f2i32(")?;
                    self.write_expr(operand, ctx)?;
                    write!(self.out, ")")?;
                }
                (Sk::Float, Sk::Uint) => {
                    write!(self.out, "_glaive_f2u32(")?;
                    self.write_expr(operand, ctx)?;
                    write!(self.out, ")")?;
                }
                _ => {
                    let inner = ctx
                        .resolution(expr)?
                        .inner_with(&self.module.types)
                        .clone();
                    self.write_value_inner(&inner)?;
                    write!(self.out, "(")?;
                    self.write_expr(operand, ctx)?;
                    write!(self.out, ")")?;
                }
            },
            None => {
                let fun = match kind {
                    Sk::Float => "asfloat",
                    Sk::Sint => "asint",
                    Sk::Uint => "asuint",
                    Sk::Bool => return Err(Error::UnsupportedConversion(source_kind, kind)),
                };
                if source_kind == kind {
                    self.write_expr(operand, ctx)?;
                    return Ok(());
                }
                write!(self.out, "{}(", fun)?;
                self.write_expr(operand, ctx)?;
                write!(self.out, ")")?;
            }
        }
        Ok(())
    }
}

enum ConstantTypeRepr {
    Named(Handle<crate::Type>),
    Value(crate::TypeInner),
}

fn constant_inner_type(module: &crate::Module, handle: Handle<crate::Constant>) -> ConstantTypeRepr {
    match module.constants[handle].inner {
        crate::ConstantInner::Scalar { ref value, width } => {
            ConstantTypeRepr::Value(crate::TypeInner::Scalar {
                kind: value.scalar_kind(),
                width,
            })
        }
        crate::ConstantInner::Composite { ty, .. } => ConstantTypeRepr::Named(ty),
    }
}

fn write_texture_type(
    out: &mut String,
    dim: crate::ImageDimension,
    arrayed: bool,
    class: crate::ImageClass,
) -> Result<(), Error> {
    use std::fmt::Write as _;
    let dim_str = match dim {
        crate::ImageDimension::D1 => "1D",
        crate::ImageDimension::D2 => "2D",
        crate::ImageDimension::D3 => "3D",
        crate::ImageDimension::Cube => "Cube",
    };
    match class {
        crate::ImageClass::Sampled { kind, multi } => {
            let component = match kind {
                crate::ScalarKind::Float => "float4",
                crate::ScalarKind::Sint => "int4",
                crate::ScalarKind::Uint => "uint4",
                crate::ScalarKind::Bool => {
                    return Err(Error::Custom(String::from("boolean textures")))
                }
            };
            write!(
                out,
                "Texture{}{}{}<{}>",
                dim_str,
                if multi { "MS" } else { "" },
                if arrayed { "Array" } else { "" },
                component
            )?;
        }
        crate::ImageClass::Depth { multi } => {
            write!(
                out,
                "Texture{}{}{}<float>",
                dim_str,
                if multi { "MS" } else { "" },
                if arrayed { "Array" } else { "" }
            )?;
        }
        crate::ImageClass::Storage { format, .. } => {
            let component = match crate::back::storage_format_kind(format) {
                crate::ScalarKind::Float => "float4",
                crate::ScalarKind::Sint => "int4",
                _ => "uint4",
            };
            write!(
                out,
                "RWTexture{}{}<{}>",
                dim_str,
                if arrayed { "Array" } else { "" },
                component
            )?;
        }
    }
    Ok(())
}

fn block_ends_control_flow(block: &crate::Block) -> bool {
    match block.last() {
        Some(&crate::Statement::Break)
        | Some(&crate::Statement::Continue)
        | Some(&crate::Statement::Return { .. })
        | Some(&crate::Statement::Kill) => true,
        _ => false,
    }
}
