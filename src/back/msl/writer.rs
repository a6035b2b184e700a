use super::{keywords, Error, LocationMode, Options, ResolvedBinding, TranslationInfo};
use crate::{
    back::{self, binary_operation_str, vector_size_str},
    proc::{self, NameKey, Namer},
    FastHashMap, Handle,
};
use std::fmt::Write;

bitflags::bitflags! {
    struct HelperFlags: u32 {
        const MODF = 1;
        const FREXP = 1 << 1;
        const INT_DIV = 1 << 2;
        const INT_MOD = 1 << 3;
        const ABS_INT = 1 << 4;
        const NEG_INT = 1 << 5;
        const F2I32 = 1 << 6;
        const F2U32 = 1 << 7;
    }
}

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
            .ok_or_else(|| Error::Validation(format!("missing type for expression {:?}", expr)))
    }
}

struct PendingInit {
    local: Handle<crate::LocalVariable>,
    root: Handle<crate::Expression>,
    call_results: Vec<Handle<crate::Expression>>,
}

pub struct Writer<W> {
    out: W,
    namer: Namer,
    names: FastHashMap<NameKey, String>,
    helpers: HelperFlags,
    named_expressions: FastHashMap<Handle<crate::Expression>, String>,
    expr_uses: Vec<u32>,
    pending_inits: Vec<PendingInit>,
    /// Globals used by each function, directly or through calls, in
    /// declaration order. Indexed by function arena position.
    fun_globals: Vec<Vec<Handle<crate::GlobalVariable>>>,
    /// Output-struct state of the entry point currently being written.
    ep_output: Option<(String, Vec<String>)>,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W) -> Self {
        Writer {
            out,
            namer: Namer::default(),
            names: FastHashMap::default(),
            helpers: HelperFlags::empty(),
            named_expressions: FastHashMap::default(),
            expr_uses: Vec::new(),
            pending_inits: Vec::new(),
            fun_globals: Vec::new(),
            ep_output: None,
        }
    }

    pub fn finish(self) -> W {
        self.out
    }

    /// Which globals does each function need, counting the ones its callees
    /// need? Metal has no module-scope resources, so they all travel through
    /// parameter lists.
    fn collect_global_usage(&mut self, module: &crate::Module) {
        self.fun_globals.clear();
        for (_, fun) in module.functions.iter() {
            let mut used = crate::FastHashSet::default();
            for (_, expression) in fun.expressions.iter() {
                if let crate::Expression::GlobalVariable(handle) = *expression {
                    used.insert(handle);
                }
            }
            collect_called_globals(&fun.body, &self.fun_globals, &mut used);
            let mut list: Vec<_> = used.into_iter().collect();
            list.sort();
            self.fun_globals.push(list);
        }
    }

    pub fn write(
        &mut self,
        module: &crate::Module,
        options: &Options,
    ) -> Result<TranslationInfo, Error> {
        self.names.clear();
        self.namer.reset(
            module,
            keywords::RESERVED,
            &[],
            &["_glaive_"],
            &mut self.names,
        );
        self.collect_global_usage(module);
        self.scan_helpers(module);

        writeln!(self.out, "#include <metal_stdlib>")?;
        writeln!(self.out, "#include <simd/simd.h>")?;
        writeln!(self.out)?;
        writeln!(self.out, "using namespace metal;")?;
        writeln!(self.out)?;

        for (handle, ty) in module.types.iter() {
            if let crate::TypeInner::Struct { ref members, .. } = ty.inner {
                self.put_struct(module, handle, members)?;
            }
        }

        self.put_helpers(module)?;

        for (handle, constant) in module.constants.iter() {
            if constant.name.is_some() {
                let name = self.names[&NameKey::Constant(handle)].clone();
                write!(self.out, "constant ")?;
                match constant.inner {
                    crate::ConstantInner::Scalar { ref value, width } => {
                        let inner = crate::TypeInner::Scalar {
                            kind: value.scalar_kind(),
                            width,
                        };
                        self.put_value_inner(&inner)?;
                        write!(self.out, " {}", name)?;
                    }
                    crate::ConstantInner::Composite { ty, .. } => {
                        self.put_var_decl(module, ty, &name)?;
                    }
                }
                write!(self.out, " = ")?;
                self.put_constant(module, handle)?;
                writeln!(self.out, ";")?;
            }
        }
        writeln!(self.out)?;

        for (handle, fun) in module.functions.iter() {
            if module.is_entry_point_function(handle) {
                continue;
            }
            self.put_function(module, options, handle, fun)?;
        }

        let mut info = TranslationInfo {
            entry_point_names: Vec::with_capacity(module.entry_points.len()),
        };
        for ep_index in 0..module.entry_points.len() {
            self.put_entry_point(module, options, ep_index)?;
            let name = self.names[&NameKey::EntryPoint(ep_index as u16)].clone();
            info.entry_point_names.push(name);
        }

        Ok(info)
    }

    fn scan_helpers(&mut self, module: &crate::Module) {
        for (_, fun) in module.functions.iter() {
            for (_, expression) in fun.expressions.iter() {
                match *expression {
                    crate::Expression::Math { fun: mf, arg, .. } => match mf {
                        crate::MathFunction::Modf => self.helpers |= HelperFlags::MODF,
                        crate::MathFunction::Frexp => self.helpers |= HelperFlags::FREXP,
                        crate::MathFunction::Abs => {
                            if expression_kind(module, fun, arg)
                                == Some(crate::ScalarKind::Sint)
                            {
                                self.helpers |= HelperFlags::ABS_INT;
                            }
                        }
                        _ => {}
                    },
                    crate::Expression::Binary { op, left, .. } => {
                        let int = match expression_kind(module, fun, left) {
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
                    crate::Expression::Unary {
                        op: crate::UnaryOperator::Negate,
                        expr,
                    } => {
                        if expression_kind(module, fun, expr) == Some(crate::ScalarKind::Sint) {
                            self.helpers |= HelperFlags::NEG_INT;
                        }
                    }
                    crate::Expression::As {
                        expr,
                        kind,
                        convert: Some(4),
                    } => {
                        if expression_kind(module, fun, expr) == Some(crate::ScalarKind::Float) {
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
        }
    }

    fn put_helpers(&mut self, module: &crate::Module) -> Result<(), Error> {
        if self.helpers.contains(HelperFlags::INT_DIV) {
            writeln!(
                self.out,
                "int _glaive_div(int a, int b) {{ return a / (((b == 0) || ((a == (-2147483647 - 1)) && (b == -1))) ? 1 : b); }}"
            )?;
            writeln!(
                self.out,
                "uint _glaive_div(uint a, uint b) {{ return a / ((b == 0u) ? 1u : b); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_div", "int", "int", true)?;
            write_vector_overloads(&mut self.out, "_glaive_div", "uint", "uint", true)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::INT_MOD) {
            writeln!(
                self.out,
                "int _glaive_mod(int a, int b) {{ return a % (((b == 0) || ((a == (-2147483647 - 1)) && (b == -1))) ? 1 : b); }}"
            )?;
            writeln!(
                self.out,
                "uint _glaive_mod(uint a, uint b) {{ return a % ((b == 0u) ? 1u : b); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_mod", "int", "int", true)?;
            write_vector_overloads(&mut self.out, "_glaive_mod", "uint", "uint", true)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::ABS_INT) {
            writeln!(
                self.out,
                "int _glaive_abs(int a) {{ return (a == (-2147483647 - 1)) ? a : abs(a); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_abs", "int", "int", false)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::NEG_INT) {
            writeln!(
                self.out,
                "int _glaive_neg(int a) {{ return (a == (-2147483647 - 1)) ? a : -a; }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_neg", "int", "int", false)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::F2I32) {
            // NaN lands on zero, everything else saturates
            writeln!(
                self.out,
                "int _glaive_f2i32(float v) {{ return int(clamp((v == v) ? v : 0.0, -2147483600.0, 2147483500.0)); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_f2i32", "int", "float", false)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::F2U32) {
            writeln!(
                self.out,
                "uint _glaive_f2u32(float v) {{ return uint(clamp((v == v) ? v : 0.0, 0.0, 4294967000.0)); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_f2u32", "uint", "float", false)?;
            writeln!(self.out)?;
        }
        for &(flag, target, intrinsic, helper) in &[
            (
                HelperFlags::MODF,
                crate::MathFunction::Modf,
                "modf",
                "_glaive_modf",
            ),
            (
                HelperFlags::FREXP,
                crate::MathFunction::Frexp,
                "frexp",
                "_glaive_frexp",
            ),
        ] {
            if !self.helpers.contains(flag) {
                continue;
            }
            let ty = match find_decompose_result_type(module, target) {
                Some(ty) => ty,
                None => continue,
            };
            let struct_name = self.names[&NameKey::Type(ty)].clone();
            let field0 = self.names[&NameKey::StructMember(ty, 0)].clone();
            let field1 = self.names[&NameKey::StructMember(ty, 1)].clone();
            writeln!(
                self.out,
                "{strct} {helper}(float x) {{ {strct} s; s.{f0} = {intrinsic}(x, s.{f1}); return s; }}",
                strct = struct_name,
                helper = helper,
                intrinsic = intrinsic,
                f0 = field0,
                f1 = field1,
            )?;
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn put_struct(
        &mut self,
        module: &crate::Module,
        handle: Handle<crate::Type>,
        members: &[crate::StructMember],
    ) -> Result<(), Error> {
        let name = self.names[&NameKey::Type(handle)].clone();
        writeln!(self.out, "struct {} {{", name)?;
        for (index, member) in members.iter().enumerate() {
            let member_name = self.names[&NameKey::StructMember(handle, index as u32)].clone();
            write!(self.out, "{}", back::INDENT)?;
            self.put_var_decl(module, member.ty, &member_name)?;
            writeln!(self.out, ";")?;
        }
        writeln!(self.out, "}};")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn scalar_str(kind: crate::ScalarKind, width: crate::Bytes) -> Result<&'static str, Error> {
        Ok(match (kind, width) {
            (crate::ScalarKind::Float, 4) => "float",
            (crate::ScalarKind::Float, 2) => "half",
            (crate::ScalarKind::Sint, 4) => "int",
            (crate::ScalarKind::Sint, 8) => "long",
            (crate::ScalarKind::Uint, 4) => "uint",
            (crate::ScalarKind::Uint, 8) => "ulong",
            (crate::ScalarKind::Bool, _) => "bool",
            (crate::ScalarKind::Float, 8) => {
                return Err(Error::FeatureNotImplemented(String::from(
                    "64-bit floats in MSL",
                )))
            }
            (kind, width) => {
                return Err(Error::FeatureNotImplemented(format!(
                    "scalar {:?} of width {}",
                    kind, width
                )))
            }
        })
    }

    fn put_value_inner(&mut self, inner: &crate::TypeInner) -> Result<(), Error> {
        match *inner {
            crate::TypeInner::Scalar { kind, width } => {
                let s = Self::scalar_str(kind, width)?;
                write!(self.out, "{}", s)?
            }
            crate::TypeInner::Atomic { kind, width } => {
                let _ = width;
                let s = match kind {
                    crate::ScalarKind::Sint => "atomic_int",
                    _ => "atomic_uint",
                };
                write!(self.out, "{}", s)?
            }
            crate::TypeInner::Vector { size, kind, width } => {
                let s = Self::scalar_str(kind, width)?;
                write!(self.out, "{}{}", s, vector_size_str(size))?
            }
            crate::TypeInner::Matrix {
                columns,
                rows,
                width,
            } => {
                let s = Self::scalar_str(crate::ScalarKind::Float, width)?;
                write!(
                    self.out,
                    "{}{}x{}",
                    s,
                    vector_size_str(columns),
                    vector_size_str(rows)
                )?
            }
            _ => {
                return Err(Error::Validation(format!(
                    "cannot write type {:?} as a value",
                    inner
                )))
            }
        }
        Ok(())
    }

    fn put_image_type(
        &mut self,
        dim: crate::ImageDimension,
        arrayed: bool,
        class: crate::ImageClass,
    ) -> Result<(), Error> {
        let dim_str = match dim {
            crate::ImageDimension::D1 => "1d",
            crate::ImageDimension::D2 => "2d",
            crate::ImageDimension::D3 => "3d",
            crate::ImageDimension::Cube => "cube",
        };
        match class {
            crate::ImageClass::Sampled { kind, multi } => {
                let component = Self::scalar_str(kind, 4)?;
                write!(
                    self.out,
                    "texture{}{}{}<{}>",
                    dim_str,
                    if multi { "_ms" } else { "" },
                    if arrayed { "_array" } else { "" },
                    component
                )?;
            }
            crate::ImageClass::Depth { multi } => {
                write!(
                    self.out,
                    "depth{}{}{}<float>",
                    dim_str,
                    if multi { "_ms" } else { "" },
                    if arrayed { "_array" } else { "" }
                )?;
            }
            crate::ImageClass::Storage { format, access } => {
                let component =
                    Self::scalar_str(crate::back::storage_format_kind(format), 4)?;
                let access_str = if access.contains(crate::StorageAccess::LOAD)
                    && access.contains(crate::StorageAccess::STORE)
                {
                    "read_write"
                } else if access.contains(crate::StorageAccess::STORE) {
                    "write"
                } else {
                    "read"
                };
                write!(
                    self.out,
                    "texture{}{}<{}, access::{}>",
                    dim_str,
                    if arrayed { "_array" } else { "" },
                    component,
                    access_str
                )?;
            }
        }
        Ok(())
    }

    fn put_var_decl(
        &mut self,
        module: &crate::Module,
        ty: Handle<crate::Type>,
        name: &str,
    ) -> Result<(), Error> {
        let mut base = ty;
        let mut sizes = Vec::new();
        while let crate::TypeInner::Array {
            base: inner_base,
            size,
            ..
        } = module.types[base].inner
        {
            sizes.push(size);
            base = inner_base;
        }
        match module.types[base].inner {
            crate::TypeInner::Struct { .. } => {
                let type_name = self.names[&NameKey::Type(base)].clone();
                write!(self.out, "{}", type_name)?;
            }
            crate::TypeInner::Image {
                dim,
                arrayed,
                class,
            } => self.put_image_type(dim, arrayed, class)?,
            crate::TypeInner::Sampler { .. } => write!(self.out, "sampler")?,
            ref other => {
                let other = other.clone();
                self.put_value_inner(&other)?;
            }
        }
        write!(self.out, " {}", name)?;
        for size in sizes {
            match size {
                crate::ArraySize::Constant(length) => write!(self.out, "[{}]", length)?,
                crate::ArraySize::Dynamic => write!(self.out, "[1]")?,
            }
        }
        Ok(())
    }

    /// Write the parameter passing a global into a function.
    fn put_global_parameter(
        &mut self,
        module: &crate::Module,
        handle: Handle<crate::GlobalVariable>,
    ) -> Result<(), Error> {
        let var = &module.global_variables[handle];
        let name = self.names[&NameKey::GlobalVariable(handle)].clone();
        match module.types[var.ty].inner {
            crate::TypeInner::Image {
                dim,
                arrayed,
                class,
            } => {
                self.put_image_type(dim, arrayed, class)?;
                write!(self.out, " {}", name)?;
            }
            crate::TypeInner::Sampler { .. } => {
                write!(self.out, "sampler {}", name)?;
            }
            _ => {
                let (qualifier, is_pointer) = address_space_qualifier(module, var)?;
                write!(self.out, "{} ", qualifier)?;
                match module.types[var.ty].inner {
                    // array buffers travel as element pointers
                    crate::TypeInner::Array { base, .. } if is_pointer => {
                        self.put_type_name(module, base)?;
                        write!(self.out, "* {}", name)?;
                    }
                    _ => {
                        self.put_type_name(module, var.ty)?;
                        write!(self.out, "& {}", name)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn put_type_name(
        &mut self,
        module: &crate::Module,
        ty: Handle<crate::Type>,
    ) -> Result<(), Error> {
        match module.types[ty].inner {
            crate::TypeInner::Struct { .. } => {
                let name = self.names[&NameKey::Type(ty)].clone();
                write!(self.out, "{}", name)?;
            }
            crate::TypeInner::Image {
                dim,
                arrayed,
                class,
            } => self.put_image_type(dim, arrayed, class)?,
            crate::TypeInner::Sampler { .. } => write!(self.out, "sampler")?,
            ref other => {
                let other = other.clone();
                self.put_value_inner(&other)?;
            }
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

    fn put_function(
        &mut self,
        module: &crate::Module,
        _options: &Options,
        handle: Handle<crate::Function>,
        fun: &crate::Function,
    ) -> Result<(), Error> {
        self.named_expressions.clear();
        self.expr_uses = proc::count_expression_uses(fun);
        self.collect_pending_inits(fun);

        let name = self.names[&NameKey::Function(handle)].clone();
        match fun.result {
            Some(ref result) => self.put_type_name(module, result.ty)?,
            None => write!(self.out, "void")?,
        }
        write!(self.out, " {}(", name)?;
        let mut first = true;
        for (index, argument) in fun.arguments.iter().enumerate() {
            if !first {
                write!(self.out, ", ")?;
            }
            first = false;
            let arg_name =
                self.names[&NameKey::FunctionArgument(handle, index as u32)].clone();
            self.put_var_decl(module, argument.ty, &arg_name)?;
        }
        let globals = self.fun_globals[handle.index()].clone();
        for &global in globals.iter() {
            if !first {
                write!(self.out, ", ")?;
            }
            first = false;
            self.put_global_parameter(module, global)?;
        }
        writeln!(self.out, ") {{")?;

        let ctx = FunctionCtx {
            ty: back::FunctionType::Function(handle),
            handle,
            fun,
        };
        self.put_locals(module, &ctx)?;
        for statement in fun.body.iter() {
            self.put_stmt(module, statement, &ctx, back::Level(1))?;
        }
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn put_locals(&mut self, module: &crate::Module, ctx: &FunctionCtx) -> Result<(), Error> {
        for (local_handle, local) in ctx.fun.local_variables.iter() {
            let name = self.names[&NameKey::FunctionLocal(ctx.handle, local_handle)].clone();
            write!(self.out, "{}", back::INDENT)?;
            self.put_var_decl(module, local.ty, &name)?;
            match local.init {
                Some(init)
                    if !self
                        .pending_inits
                        .iter()
                        .any(|pending| pending.local == local_handle) =>
                {
                    write!(self.out, " = ")?;
                    self.put_expr(module, init, ctx)?;
                }
                _ => write!(self.out, " = {{}}")?,
            }
            writeln!(self.out, ";")?;
        }
        Ok(())
    }

    fn put_entry_point(
        &mut self,
        module: &crate::Module,
        options: &Options,
        ep_index: usize,
    ) -> Result<(), Error> {
        let ep = &module.entry_points[ep_index];
        let stage = ep.stage;
        let fun_handle = ep.function;
        let fun = module.functions.try_get(fun_handle)?;
        let ep_name = self.names[&NameKey::EntryPoint(ep_index as u16)].clone();

        self.named_expressions.clear();
        self.expr_uses = proc::count_expression_uses(fun);
        self.collect_pending_inits(fun);
        self.ep_output = None;

        let input_mode = match stage {
            crate::ShaderStage::Vertex => LocationMode::VertexInput,
            crate::ShaderStage::Fragment => LocationMode::Intermediate,
            crate::ShaderStage::Compute => LocationMode::Uniform,
        };
        let output_mode = match stage {
            crate::ShaderStage::Vertex => LocationMode::Intermediate,
            crate::ShaderStage::Fragment => LocationMode::FragmentOutput,
            crate::ShaderStage::Compute => LocationMode::Uniform,
        };

        // The stage_in struct gathers every location-bound input.
        struct FlatInput {
            arg_index: u32,
            member_index: Option<u32>,
            field_name: String,
            built_in: bool,
        }
        let mut flat_inputs = Vec::new();
        for (arg_index, argument) in fun.arguments.iter().enumerate() {
            match argument.binding {
                Some(ref binding) => {
                    let built_in = match *binding {
                        crate::Binding::BuiltIn(_) => true,
                        _ => false,
                    };
                    let field_name = self.names
                        [&NameKey::FunctionArgument(fun_handle, arg_index as u32)]
                        .clone();
                    flat_inputs.push(FlatInput {
                        arg_index: arg_index as u32,
                        member_index: None,
                        field_name,
                        built_in,
                    });
                }
                None => {
                    let members = match module.types[argument.ty].inner {
                        crate::TypeInner::Struct { ref members, .. } => members,
                        _ => {
                            return Err(Error::Validation(String::from(
                                "entry point argument needs a binding",
                            )))
                        }
                    };
                    for (member_index, member) in members.iter().enumerate() {
                        let binding = member.binding.as_ref().ok_or_else(|| {
                            Error::Validation(String::from(
                                "entry point struct member needs a binding",
                            ))
                        })?;
                        let built_in = match *binding {
                            crate::Binding::BuiltIn(_) => true,
                            _ => false,
                        };
                        let field_name = self.names
                            [&NameKey::StructMember(argument.ty, member_index as u32)]
                            .clone();
                        flat_inputs.push(FlatInput {
                            arg_index: arg_index as u32,
                            member_index: Some(member_index as u32),
                            field_name,
                            built_in,
                        });
                    }
                }
            }
        }

        let has_stage_in = flat_inputs.iter().any(|flat| !flat.built_in)
            && stage != crate::ShaderStage::Compute;
        let input_struct_name = format!("{}Input", ep_name);
        if has_stage_in {
            writeln!(self.out, "struct {} {{", input_struct_name)?;
            for flat in flat_inputs.iter().filter(|flat| !flat.built_in) {
                let (ty, binding) = flat_io_info(module, fun, flat.arg_index, flat.member_index)?;
                write!(self.out, "{}", back::INDENT)?;
                let field_name = flat.field_name.clone();
                self.put_var_decl(module, ty, &field_name)?;
                let resolved = options.resolve_local_binding(&binding, input_mode)?;
                resolved.try_fmt_decorated(&mut self.out, ";")?;
                writeln!(self.out)?;
            }
            writeln!(self.out, "}};")?;
            writeln!(self.out)?;
        }

        // Output struct for struct results.
        let output_struct_name = format!("{}Output", ep_name);
        if let Some(ref result) = fun.result {
            if result.binding.is_none() {
                let members = match module.types[result.ty].inner {
                    crate::TypeInner::Struct { ref members, .. } => members.clone(),
                    _ => {
                        return Err(Error::Validation(String::from(
                            "entry point result needs a binding",
                        )))
                    }
                };
                let mut fields = Vec::new();
                writeln!(self.out, "struct {} {{", output_struct_name)?;
                for (member_index, member) in members.iter().enumerate() {
                    let binding = member.binding.clone().ok_or_else(|| {
                        Error::Validation(String::from(
                            "entry point struct member needs a binding",
                        ))
                    })?;
                    let field_name = self.names
                        [&NameKey::StructMember(result.ty, member_index as u32)]
                        .clone();
                    write!(self.out, "{}", back::INDENT)?;
                    self.put_var_decl(module, member.ty, &field_name)?;
                    let resolved = options.resolve_local_binding(&binding, output_mode)?;
                    resolved.try_fmt_decorated(&mut self.out, ";")?;
                    writeln!(self.out)?;
                    fields.push(field_name);
                }
                writeln!(self.out, "}};")?;
                writeln!(self.out)?;
                self.ep_output = Some((output_struct_name.clone(), fields));
            }
        }

        let stage_str = match stage {
            crate::ShaderStage::Vertex => "vertex",
            crate::ShaderStage::Fragment => "fragment",
            crate::ShaderStage::Compute => "kernel",
        };
        write!(self.out, "{} ", stage_str)?;
        match fun.result {
            Some(ref result) => match result.binding {
                Some(_) => self.put_type_name(module, result.ty)?,
                None => write!(self.out, "{}", output_struct_name)?,
            },
            None => write!(self.out, "void")?,
        }
        write!(self.out, " {}(", ep_name)?;

        let mut first = true;
        if has_stage_in {
            write!(self.out, "{} _input [[stage_in]]", input_struct_name)?;
            first = false;
        }
        // Builtin inputs ride as separate arguments.
        for flat in flat_inputs.iter().filter(|flat| flat.built_in) {
            let (ty, binding) = flat_io_info(module, fun, flat.arg_index, flat.member_index)?;
            if !first {
                write!(self.out, ", ")?;
            }
            first = false;
            let param_name = format!("{}_in", flat.field_name);
            self.put_var_decl(module, ty, &param_name)?;
            let resolved = options.resolve_local_binding(&binding, input_mode)?;
            resolved.try_fmt_decorated(&mut self.out, "")?;
        }
        // Resources.
        let globals = self.fun_globals[fun_handle.index()].clone();
        let mut inline_samplers = Vec::new();
        let mut body_globals = Vec::new();
        for &global in globals.iter() {
            let var = &module.global_variables[global];
            match var.space {
                crate::AddressSpace::Private | crate::AddressSpace::WorkGroup => {
                    body_globals.push(global);
                    continue;
                }
                _ => {}
            }
            let binding = var
                .binding
                .as_ref()
                .ok_or(Error::MissingBinding(global))?;
            let resolved = options.resolve_global_binding(stage, binding)?;
            if let ResolvedBinding::InlineSampler(ref inline) = resolved {
                inline_samplers.push((global, inline.clone()));
                continue;
            }
            if !first {
                write!(self.out, ", ")?;
            }
            first = false;
            self.put_global_parameter(module, global)?;
            resolved.try_fmt_decorated(&mut self.out, "")?;
        }
        writeln!(self.out, ") {{")?;

        // Inline samplers and module-scope variables live in function scope.
        for (global, inline) in inline_samplers {
            let name = self.names[&NameKey::GlobalVariable(global)].clone();
            write!(self.out, "{}constexpr sampler {}(", back::INDENT, name)?;
            let mut args = String::new();
            inline.write_arguments(&mut args)?;
            write!(self.out, "{}", args)?;
            writeln!(self.out, ");")?;
        }
        for global in body_globals {
            let var = &module.global_variables[global];
            let name = self.names[&NameKey::GlobalVariable(global)].clone();
            write!(self.out, "{}", back::INDENT)?;
            if var.space == crate::AddressSpace::WorkGroup {
                write!(self.out, "threadgroup ")?;
            }
            self.put_var_decl(module, var.ty, &name)?;
            if let Some(init) = var.init {
                write!(self.out, " = ")?;
                self.put_constant(module, init)?;
            } else if var.space == crate::AddressSpace::Private {
                write!(self.out, " = {{}}")?;
            }
            writeln!(self.out, ";")?;
        }

        // Reconstruct the IR-side arguments.
        for (arg_index, argument) in fun.arguments.iter().enumerate() {
            let arg_name =
                self.names[&NameKey::FunctionArgument(fun_handle, arg_index as u32)].clone();
            match argument.binding {
                Some(crate::Binding::BuiltIn(_)) => {
                    // the parameter was named `<name>_in` to leave room
                    write!(self.out, "{}", back::INDENT)?;
                    self.put_var_decl(module, argument.ty, &arg_name)?;
                    writeln!(self.out, " = {}_in;", arg_name)?;
                }
                Some(crate::Binding::Location { .. }) => {
                    // the value arrived inside the stage_in struct
                    write!(self.out, "{}", back::INDENT)?;
                    self.put_var_decl(module, argument.ty, &arg_name)?;
                    writeln!(self.out, " = _input.{};", arg_name)?;
                }
                None => {
                    write!(self.out, "{}", back::INDENT)?;
                    self.put_var_decl(module, argument.ty, &arg_name)?;
                    writeln!(self.out, ";")?;
                    for flat in flat_inputs
                        .iter()
                        .filter(|flat| flat.arg_index == arg_index as u32)
                    {
                        if flat.built_in {
                            writeln!(
                                self.out,
                                "{}{}.{} = {}_in;",
                                back::INDENT,
                                arg_name,
                                flat.field_name,
                                flat.field_name
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
            }
        }

        let ctx = FunctionCtx {
            ty: back::FunctionType::EntryPoint(ep_index as u16),
            handle: fun_handle,
            fun,
        };
        self.put_locals(module, &ctx)?;
        for statement in fun.body.iter() {
            self.put_stmt(module, statement, &ctx, back::Level(1))?;
        }
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn put_constant(
        &mut self,
        module: &crate::Module,
        handle: Handle<crate::Constant>,
    ) -> Result<(), Error> {
        match module.constants[handle].inner {
            crate::ConstantInner::Scalar { ref value, width } => {
                self.put_scalar_value(value, width)?
            }
            crate::ConstantInner::Composite { ty, ref components } => {
                match module.types[ty].inner {
                    crate::TypeInner::Struct { .. } | crate::TypeInner::Array { .. } => {
                        write!(self.out, "{{ ")?;
                        for (index, &component) in components.iter().enumerate() {
                            if index != 0 {
                                write!(self.out, ", ")?;
                            }
                            self.put_constant(module, component)?;
                        }
                        write!(self.out, " }}")?;
                    }
                    ref other => {
                        let other = other.clone();
                        self.put_value_inner(&other)?;
                        write!(self.out, "(")?;
                        for (index, &component) in components.iter().enumerate() {
                            if index != 0 {
                                write!(self.out, ", ")?;
                            }
                            self.put_constant(module, component)?;
                        }
                        write!(self.out, ")")?;
                    }
                }
            }
        }
        Ok(())
    }

    fn put_scalar_value(
        &mut self,
        value: &crate::ScalarValue,
        width: crate::Bytes,
    ) -> Result<(), Error> {
        let _ = width;
        match *value {
            crate::ScalarValue::Sint(v) => write!(self.out, "{}", v)?,
            crate::ScalarValue::Uint(v) => write!(self.out, "{}u", v)?,
            crate::ScalarValue::Float(v) => write!(self.out, "{:?}", v)?,
            crate::ScalarValue::Bool(v) => write!(self.out, "{}", v)?,
        }
        Ok(())
    }

    fn put_literal(&mut self, literal: &crate::Literal) -> Result<(), Error> {
        match *literal {
            crate::Literal::F64(v) => write!(self.out, "{:?}", v)?,
            crate::Literal::F32(v) => write!(self.out, "{:?}", v)?,
            crate::Literal::U32(v) => write!(self.out, "{}u", v)?,
            crate::Literal::I32(v) => write!(self.out, "{}", v)?,
            crate::Literal::U64(v) => write!(self.out, "{}uL", v)?,
            crate::Literal::I64(v) => write!(self.out, "{}L", v)?,
            crate::Literal::Bool(v) => write!(self.out, "{}", v)?,
        }
        Ok(())
    }

    fn put_stmt(
        &mut self,
        module: &crate::Module,
        statement: &crate::Statement,
        ctx: &FunctionCtx,
        level: back::Level,
    ) -> Result<(), Error> {
        use crate::Statement as St;
        match *statement {
            St::Emit(ref range) => {
                for handle in range.clone() {
                    let expression = &ctx.fun.expressions[handle];
                    match *expression {
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
                            .inner_with(&module.types)
                            .pointer_space()
                            .is_some()
                        {
                            continue;
                        }
                        let name = format!("{}{}", back::BAKE_PREFIX, handle.index());
                        write!(self.out, "{}", level)?;
                        self.put_baked_decl(module, resolution, &name)?;
                        write!(self.out, " = ")?;
                        self.put_expr(module, handle, ctx)?;
                        writeln!(self.out, ";")?;
                        self.named_expressions.insert(handle, name);
                    }
                }
            }
            St::Block(ref block) => {
                writeln!(self.out, "{}{{", level)?;
                for statement in block.iter() {
                    self.put_stmt(module, statement, ctx, level.next())?;
                }
                writeln!(self.out, "{}}}", level)?;
            }
            St::If {
                condition,
                ref accept,
                ref reject,
            } => {
                write!(self.out, "{}if (", level)?;
                self.put_expr(module, condition, ctx)?;
                writeln!(self.out, ") {{")?;
                for statement in accept.iter() {
                    self.put_stmt(module, statement, ctx, level.next())?;
                }
                if !reject.is_empty() {
                    writeln!(self.out, "{}}} else {{", level)?;
                    for statement in reject.iter() {
                        self.put_stmt(module, statement, ctx, level.next())?;
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
                self.put_expr(module, selector, ctx)?;
                writeln!(self.out, ") {{")?;
                for case in cases.iter() {
                    for value in case.values.iter() {
                        writeln!(self.out, "{}case {}:", level.next(), value)?;
                    }
                    writeln!(self.out, "{}{{", level.next())?;
                    for statement in case.body.iter() {
                        self.put_stmt(module, statement, ctx, level.next().next())?;
                    }
                    if !case.fall_through && !block_ends_control_flow(&case.body) {
                        writeln!(self.out, "{}break;", level.next().next())?;
                    }
                    writeln!(self.out, "{}}}", level.next())?;
                }
                writeln!(self.out, "{}default:", level.next())?;
                writeln!(self.out, "{}{{", level.next())?;
                for statement in default.iter() {
                    self.put_stmt(module, statement, ctx, level.next().next())?;
                }
                writeln!(self.out, "{}}}", level.next())?;
                writeln!(self.out, "{}}}", level)?;
            }
            St::Loop {
                ref body,
                ref continuing,
                break_if,
            } => {
                if continuing.is_empty() && break_if.is_none() {
                    writeln!(self.out, "{}while(true) {{", level)?;
                    for statement in body.iter() {
                        self.put_stmt(module, statement, ctx, level.next())?;
                    }
                    writeln!(self.out, "{}}}", level)?;
                } else {
                    let guard = self.namer.call("loop_init");
                    writeln!(self.out, "{}bool {} = true;", level, guard)?;
                    writeln!(self.out, "{}while(true) {{", level)?;
                    let l2 = level.next();
                    writeln!(self.out, "{}if (!{}) {{", l2, guard)?;
                    for statement in continuing.iter() {
                        self.put_stmt(module, statement, ctx, l2.next())?;
                    }
                    if let Some(condition) = break_if {
                        write!(self.out, "{}if (", l2.next())?;
                        self.put_expr(module, condition, ctx)?;
                        writeln!(self.out, ") {{ break; }}")?;
                    }
                    writeln!(self.out, "{}}}", l2)?;
                    writeln!(self.out, "{}{} = false;", l2, guard)?;
                    for statement in body.iter() {
                        self.put_stmt(module, statement, ctx, l2)?;
                    }
                    writeln!(self.out, "{}}}", level)?;
                }
            }
            St::Break => writeln!(self.out, "{}break;", level)?,
            St::Continue => writeln!(self.out, "{}continue;", level)?,
            St::Return { value } => {
                if ctx.ty.is_entry_point() && self.ep_output.is_some() {
                    self.put_entry_point_return(module, value, ctx, level)?;
                } else {
                    match value {
                        Some(value) => {
                            write!(self.out, "{}return ", level)?;
                            self.put_expr(module, value, ctx)?;
                            writeln!(self.out, ";")?;
                        }
                        None => writeln!(self.out, "{}return;", level)?,
                    }
                }
            }
            St::Kill => writeln!(self.out, "{}discard_fragment();", level)?,
            St::Barrier(flags) => {
                let mut parts = Vec::new();
                if flags.contains(crate::Barrier::STORAGE) {
                    parts.push("mem_flags::mem_device");
                }
                if flags.contains(crate::Barrier::WORK_GROUP) {
                    parts.push("mem_flags::mem_threadgroup");
                }
                if flags.contains(crate::Barrier::TEXTURE) {
                    parts.push("mem_flags::mem_texture");
                }
                if parts.is_empty() {
                    parts.push("mem_flags::mem_none");
                }
                writeln!(
                    self.out,
                    "{}threadgroup_barrier({});",
                    level,
                    parts.join(" | ")
                )?;
            }
            St::Store { pointer, value } => {
                write!(self.out, "{}", level)?;
                self.put_expr(module, pointer, ctx)?;
                write!(self.out, " = ")?;
                self.put_expr(module, value, ctx)?;
                writeln!(self.out, ";")?;
            }
            St::ImageStore {
                image,
                coordinate,
                array_index,
                value,
            } => {
                write!(self.out, "{}", level)?;
                self.put_expr(module, image, ctx)?;
                write!(self.out, ".write(")?;
                self.put_expr(module, value, ctx)?;
                write!(self.out, ", uint2(")?;
                self.put_expr(module, coordinate, ctx)?;
                write!(self.out, ")")?;
                if let Some(array_index) = array_index {
                    write!(self.out, ", ")?;
                    self.put_expr(module, array_index, ctx)?;
                }
                writeln!(self.out, ");")?;
            }
            St::Atomic {
                pointer,
                ref fun,
                value,
                result,
            } => self.put_atomic_stmt(module, pointer, fun, value, result, ctx, level)?,
            St::WorkGroupUniformLoad { pointer, result } => {
                writeln!(
                    self.out,
                    "{}threadgroup_barrier(mem_flags::mem_threadgroup);",
                    level
                )?;
                let name = format!("{}{}", back::BAKE_PREFIX, result.index());
                let resolution = ctx.resolution(result)?;
                write!(self.out, "{}", level)?;
                self.put_baked_decl(module, resolution, &name)?;
                write!(self.out, " = ")?;
                self.put_expr(module, pointer, ctx)?;
                writeln!(self.out, ";")?;
                writeln!(
                    self.out,
                    "{}threadgroup_barrier(mem_flags::mem_threadgroup);",
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
                    self.put_baked_decl(module, resolution, &name)?;
                    write!(self.out, " = ")?;
                    self.named_expressions.insert(expr, name);
                }
                let fun_name = self.names[&NameKey::Function(function)].clone();
                write!(self.out, "{}(", fun_name)?;
                let mut first = true;
                for &argument in arguments.iter() {
                    if !first {
                        write!(self.out, ", ")?;
                    }
                    first = false;
                    self.put_expr(module, argument, ctx)?;
                }
                let callee_globals = self.fun_globals[function.index()].clone();
                for &global in callee_globals.iter() {
                    if !first {
                        write!(self.out, ", ")?;
                    }
                    first = false;
                    let name = self.names[&NameKey::GlobalVariable(global)].clone();
                    write!(self.out, "{}", name)?;
                }
                writeln!(self.out, ");")?;

                if let Some(expr) = result {
                    self.flush_pending_inits(module, expr, ctx, level)?;
                }
            }
            St::RayQuery { .. } => {
                return Err(Error::FeatureNotImplemented(String::from("ray queries")))
            }
        }
        Ok(())
    }

    fn flush_pending_inits(
        &mut self,
        module: &crate::Module,
        just_finished: Handle<crate::Expression>,
        ctx: &FunctionCtx,
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
                self.put_expr(module, call_result, ctx)?;
                writeln!(self.out, ";")?;
            }
            write!(self.out, "{}{} = ", level, local_name)?;
            self.put_expr(module, pending_init.root, ctx)?;
            writeln!(self.out, ";")?;
        }
        Ok(())
    }

    fn put_entry_point_return(
        &mut self,
        module: &crate::Module,
        value: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx,
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
            .ok_or_else(|| Error::Validation(String::from("missing entry point output")))?;
        let tmp = format!("{}{}_res", back::BAKE_PREFIX, value.index());
        let resolution = ctx.resolution(value)?;
        write!(self.out, "{}", level)?;
        self.put_baked_decl(module, resolution, &tmp)?;
        write!(self.out, " = ")?;
        self.put_expr(module, value, ctx)?;
        writeln!(self.out, ";")?;

        let result_ty = resolution
            .handle()
            .ok_or_else(|| Error::Validation(String::from("entry point result must be a struct")))?;
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

    fn put_baked_decl(
        &mut self,
        module: &crate::Module,
        resolution: &proc::TypeResolution,
        name: &str,
    ) -> Result<(), Error> {
        match *resolution {
            proc::TypeResolution::Handle(ty) => self.put_var_decl(module, ty, name)?,
            proc::TypeResolution::Value(ref inner) => {
                let inner = inner.clone();
                self.put_value_inner(&inner)?;
                write!(self.out, " {}", name)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn put_atomic_stmt(
        &mut self,
        module: &crate::Module,
        pointer: Handle<crate::Expression>,
        fun: &crate::AtomicFunction,
        value: Handle<crate::Expression>,
        result: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx,
        level: back::Level,
    ) -> Result<(), Error> {
        use crate::AtomicFunction as Af;

        let value_kind = ctx
            .resolution(value)?
            .inner_with(&module.types)
            .scalar_kind();
        let scalar = match value_kind {
            Some(crate::ScalarKind::Sint) => "int",
            _ => "uint",
        };

        if let Af::Exchange {
            compare: Some(compare),
        } = *fun
        {
            let result = match result {
                Some(result) => result,
                None => {
                    return Err(Error::Validation(String::from(
                        "compare exchange without a result",
                    )))
                }
            };
            let old = format!("{}{}_old", back::BAKE_PREFIX, result.index());
            let ok = format!("{}{}_ok", back::BAKE_PREFIX, result.index());
            write!(self.out, "{}{} {} = ", level, scalar, old)?;
            self.put_expr(module, compare, ctx)?;
            writeln!(self.out, ";")?;
            write!(
                self.out,
                "{}bool {} = atomic_compare_exchange_weak_explicit(&",
                level, ok
            )?;
            self.put_expr(module, pointer, ctx)?;
            write!(self.out, ", &{}, ", old)?;
            self.put_expr(module, value, ctx)?;
            writeln!(
                self.out,
                ", memory_order_relaxed, memory_order_relaxed);"
            )?;
            let resolution = ctx.resolution(result)?;
            let name = format!("{}{}", back::BAKE_PREFIX, result.index());
            write!(self.out, "{}", level)?;
            self.put_baked_decl(module, resolution, &name)?;
            writeln!(self.out, " = {{ {}, {} }};", old, ok)?;
            self.named_expressions.insert(result, name);
            return Ok(());
        }

        let fun_str = match *fun {
            Af::Add | Af::Subtract => "atomic_fetch_add_explicit",
            Af::And => "atomic_fetch_and_explicit",
            Af::ExclusiveOr => "atomic_fetch_xor_explicit",
            Af::InclusiveOr => "atomic_fetch_or_explicit",
            Af::Min => "atomic_fetch_min_explicit",
            Af::Max => "atomic_fetch_max_explicit",
            Af::Exchange { compare: None } => "atomic_exchange_explicit",
            Af::Exchange { .. } => "atomic_compare_exchange_weak_explicit",
        };

        write!(self.out, "{}", level)?;
        if let Some(result) = result {
            let name = format!("{}{}", back::BAKE_PREFIX, result.index());
            write!(self.out, "{} {} = ", scalar, name)?;
            self.named_expressions.insert(result, name);
        }
        write!(self.out, "{}(&", fun_str)?;
        self.put_expr(module, pointer, ctx)?;
        write!(self.out, ", ")?;
        if let Af::Subtract = *fun {
            write!(self.out, "-(")?;
            self.put_expr(module, value, ctx)?;
            write!(self.out, ")")?;
        } else {
            self.put_expr(module, value, ctx)?;
        }
        writeln!(self.out, ", memory_order_relaxed);")?;
        Ok(())
    }

    fn put_expr(
        &mut self,
        module: &crate::Module,
        expr: Handle<crate::Expression>,
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        if let Some(name) = self.named_expressions.get(&expr) {
            write!(self.out, "{}", name)?;
            return Ok(());
        }

        use crate::Expression as Ex;
        match ctx.fun.expressions[expr] {
            Ex::Literal(ref literal) => {
                let literal = *literal;
                self.put_literal(&literal)?
            }
            Ex::Constant(handle) => {
                if module.constants[handle].name.is_some() {
                    let name = self.names[&NameKey::Constant(handle)].clone();
                    write!(self.out, "{}", name)?
                } else {
                    self.put_constant(module, handle)?
                }
            }
            Ex::ZeroValue(ty) => {
                match module.types[ty].inner {
                    crate::TypeInner::Struct { .. } | crate::TypeInner::Array { .. } => {
                        write!(self.out, "{{}}")?
                    }
                    ref other => {
                        let other = other.clone();
                        self.put_value_inner(&other)?;
                        write!(self.out, "(0)")?;
                    }
                }
            }
            Ex::Compose { ty, ref components } => {
                let components = components.clone();
                match module.types[ty].inner {
                    crate::TypeInner::Struct { .. } | crate::TypeInner::Array { .. } => {
                        match module.types[ty].inner {
                            crate::TypeInner::Struct { .. } => {
                                let name = self.names[&NameKey::Type(ty)].clone();
                                write!(self.out, "{} {{ ", name)?;
                            }
                            _ => write!(self.out, "{{ ")?,
                        }
                        for (index, &component) in components.iter().enumerate() {
                            if index != 0 {
                                write!(self.out, ", ")?;
                            }
                            self.put_expr(module, component, ctx)?;
                        }
                        write!(self.out, " }}")?;
                    }
                    ref other => {
                        let other = other.clone();
                        self.put_value_inner(&other)?;
                        write!(self.out, "(")?;
                        for (index, &component) in components.iter().enumerate() {
                            if index != 0 {
                                write!(self.out, ", ")?;
                            }
                            self.put_expr(module, component, ctx)?;
                        }
                        write!(self.out, ")")?;
                    }
                }
            }
            Ex::Access { base, index } => {
                self.put_expr(module, base, ctx)?;
                write!(self.out, "[")?;
                self.put_expr(module, index, ctx)?;
                write!(self.out, "]")?;
            }
            Ex::AccessIndex { base, index } => {
                let base_res = ctx.resolution(base)?;
                let base_inner = base_res.inner_with(&module.types);
                match *base_inner {
                    crate::TypeInner::Struct { .. } => {
                        let ty = base_res
                            .handle()
                            .ok_or_else(|| Error::Validation(String::from("unnamed struct")))?;
                        let member_name = self.names[&NameKey::StructMember(ty, index)].clone();
                        self.put_expr(module, base, ctx)?;
                        write!(self.out, ".{}", member_name)?;
                    }
                    crate::TypeInner::Vector { .. }
                    | crate::TypeInner::ValuePointer { size: Some(_), .. } => {
                        self.put_expr(module, base, ctx)?;
                        write!(self.out, ".{}", back::COMPONENTS[index as usize])?;
                    }
                    crate::TypeInner::Pointer { base: ptr_base, .. } => {
                        match module.types[ptr_base].inner {
                            crate::TypeInner::Struct { .. } => {
                                let member_name =
                                    self.names[&NameKey::StructMember(ptr_base, index)].clone();
                                self.put_expr(module, base, ctx)?;
                                write!(self.out, ".{}", member_name)?;
                            }
                            crate::TypeInner::Vector { .. } => {
                                self.put_expr(module, base, ctx)?;
                                write!(self.out, ".{}", back::COMPONENTS[index as usize])?;
                            }
                            _ => {
                                self.put_expr(module, base, ctx)?;
                                write!(self.out, "[{}]", index)?;
                            }
                        }
                    }
                    _ => {
                        self.put_expr(module, base, ctx)?;
                        write!(self.out, "[{}]", index)?;
                    }
                }
            }
            Ex::Splat { size, value } => {
                let inner = ctx.resolution(expr)?.inner_with(&module.types).clone();
                match inner {
                    crate::TypeInner::Vector { .. } => self.put_value_inner(&inner)?,
                    _ => write!(self.out, "float{}", size as u8)?,
                }
                write!(self.out, "(")?;
                self.put_expr(module, value, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Swizzle {
                size,
                vector,
                pattern,
            } => {
                self.put_expr(module, vector, ctx)?;
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
            }
            Ex::LocalVariable(handle) => {
                let name = self.names[&NameKey::FunctionLocal(ctx.handle, handle)].clone();
                write!(self.out, "{}", name)?;
            }
            Ex::Load { pointer } => self.put_expr(module, pointer, ctx)?,
            Ex::ImageSample {
                image,
                sampler,
                gather,
                coordinate,
                array_index,
                offset,
                level,
                depth_ref,
            } => self.put_image_sample(
                module,
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
            } => {
                self.put_expr(module, image, ctx)?;
                write!(self.out, ".read(uint2(")?;
                self.put_expr(module, coordinate, ctx)?;
                write!(self.out, ")")?;
                if let Some(array_index) = array_index {
                    write!(self.out, ", ")?;
                    self.put_expr(module, array_index, ctx)?;
                }
                if let Some(index) = index {
                    write!(self.out, ", ")?;
                    self.put_expr(module, index, ctx)?;
                }
                write!(self.out, ")")?;
            }
            Ex::ImageQuery { image, query } => self.put_image_query(module, image, query, ctx)?,
            Ex::Unary { op, expr: operand } => {
                let operand_kind = ctx
                    .resolution(operand)?
                    .inner_with(&module.types)
                    .scalar_kind();
                if op == crate::UnaryOperator::Negate
                    && operand_kind == Some(crate::ScalarKind::Sint)
                {
                    // negating INT_MIN overflows; run the guard
                    write!(self.out, "_glaive_neg(")?;
                    self.put_expr(module, operand, ctx)?;
                    write!(self.out, ")")?;
                } else {
                    let op_str = match op {
                        crate::UnaryOperator::Negate => "-",
                        crate::UnaryOperator::Not => match operand_kind {
                            Some(crate::ScalarKind::Bool) => "!",
                            _ => "~",
                        },
                    };
                    write!(self.out, "({}", op_str)?;
                    self.put_expr(module, operand, ctx)?;
                    write!(self.out, ")")?;
                }
            }
            Ex::Binary { op, left, right } => {
                // integer division and remainder run through the guards;
                // float modulo has no operator in MSL, `fmod` already has the
                // truncated semantics
                let left_kind = ctx
                    .resolution(left)?
                    .inner_with(&module.types)
                    .scalar_kind();
                let fun_name = match (op, left_kind) {
                    (crate::BinaryOperator::Divide, Some(crate::ScalarKind::Sint))
                    | (crate::BinaryOperator::Divide, Some(crate::ScalarKind::Uint)) => {
                        Some("_glaive_div")
                    }
                    (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Sint))
                    | (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Uint)) => {
                        Some("_glaive_mod")
                    }
                    (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Float)) => {
                        Some("fmod")
                    }
                    _ => None,
                };
                match fun_name {
                    Some(fun_name) => {
                        write!(self.out, "{}(", fun_name)?;
                        self.put_expr(module, left, ctx)?;
                        write!(self.out, ", ")?;
                        self.put_expr(module, right, ctx)?;
                        write!(self.out, ")")?;
                    }
                    None => {
                        write!(self.out, "(")?;
                        self.put_expr(module, left, ctx)?;
                        write!(self.out, " {} ", binary_operation_str(op))?;
                        self.put_expr(module, right, ctx)?;
                        write!(self.out, ")")?;
                    }
                }
            }
            Ex::Select {
                condition,
                accept,
                reject,
            } => {
                write!(self.out, "(")?;
                self.put_expr(module, condition, ctx)?;
                write!(self.out, " ? ")?;
                self.put_expr(module, accept, ctx)?;
                write!(self.out, " : ")?;
                self.put_expr(module, reject, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Derivative { axis, expr: operand } => {
                let fun = match axis {
                    crate::DerivativeAxis::X => "dfdx",
                    crate::DerivativeAxis::Y => "dfdy",
                    crate::DerivativeAxis::Width => "fwidth",
                };
                write!(self.out, "{}(", fun)?;
                self.put_expr(module, operand, ctx)?;
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
                self.put_expr(module, argument, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Math {
                fun,
                arg,
                arg1,
                arg2,
                arg3,
            } => self.put_math_function(module, fun, arg, arg1, arg2, arg3, ctx)?,
            Ex::As {
                expr: operand,
                kind,
                convert,
            } => {
                use crate::ScalarKind as Sk;
                let source_kind = ctx
                    .resolution(operand)?
                    .inner_with(&module.types)
                    .scalar_kind()
                    .ok_or_else(|| {
                        Error::Validation(String::from("cast operand has no scalar kind"))
                    })?;
                match convert {
                    Some(width) => {
                        // 32-bit float-to-int casts run the clamping guard,
                        // so NaN lands on zero
                        if source_kind == Sk::Float
                            && (kind == Sk::Sint || kind == Sk::Uint)
                            && width == 4
                        {
                            let fun_name = if kind == Sk::Sint {
                                "_glaive_f2i32"
                            } else {
                                "_glaive_f2u32"
                            };
                            write!(self.out, "{}(", fun_name)?;
                            self.put_expr(module, operand, ctx)?;
                            write!(self.out, ")")?;
                            return Ok(());
                        }
                        let inner = ctx.resolution(expr)?.inner_with(&module.types).clone();
                        self.put_value_inner(&inner)?;
                        write!(self.out, "(")?;
                        self.put_expr(module, operand, ctx)?;
                        write!(self.out, ")")?;
                    }
                    None => {
                        if source_kind == kind {
                            self.put_expr(module, operand, ctx)?;
                        } else if source_kind == Sk::Bool || kind == Sk::Bool {
                            return Err(Error::UnsupportedConversion(source_kind, kind));
                        } else {
                            write!(self.out, "as_type<")?;
                            let inner =
                                ctx.resolution(expr)?.inner_with(&module.types).clone();
                            self.put_value_inner(&inner)?;
                            write!(self.out, ">(")?;
                            self.put_expr(module, operand, ctx)?;
                            write!(self.out, ")")?;
                        }
                    }
                }
            }
            Ex::ArrayLength(_) => {
                return Err(Error::FeatureNotImplemented(String::from(
                    "runtime array length in MSL (requires a sizes buffer)",
                )))
            }
            Ex::CallResult(_)
            | Ex::AtomicResult { .. }
            | Ex::WorkGroupUniformLoadResult { .. } => {
                return Err(Error::Validation(String::from(
                    "result expression used before the owning statement",
                )))
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn put_image_sample(
        &mut self,
        module: &crate::Module,
        image: Handle<crate::Expression>,
        sampler: Handle<crate::Expression>,
        gather: Option<crate::SwizzleComponent>,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        offset: Option<Handle<crate::Constant>>,
        level: crate::SampleLevel,
        depth_ref: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        self.put_expr(module, image, ctx)?;
        let method = match (gather, depth_ref) {
            (Some(_), None) => "gather",
            (Some(_), Some(_)) => "gather_compare",
            (None, Some(_)) => "sample_compare",
            (None, None) => "sample",
        };
        write!(self.out, ".{}(", method)?;
        self.put_expr(module, sampler, ctx)?;
        write!(self.out, ", ")?;
        self.put_expr(module, coordinate, ctx)?;
        if let Some(array_index) = array_index {
            write!(self.out, ", ")?;
            self.put_expr(module, array_index, ctx)?;
        }
        if let Some(depth_ref) = depth_ref {
            write!(self.out, ", ")?;
            self.put_expr(module, depth_ref, ctx)?;
        }
        if gather.is_none() && depth_ref.is_none() {
            match level {
                crate::SampleLevel::Auto => {}
                crate::SampleLevel::Zero => write!(self.out, ", level(0.0)")?,
                crate::SampleLevel::Exact(lod) => {
                    write!(self.out, ", level(")?;
                    self.put_expr(module, lod, ctx)?;
                    write!(self.out, ")")?;
                }
                crate::SampleLevel::Bias(bias) => {
                    write!(self.out, ", bias(")?;
                    self.put_expr(module, bias, ctx)?;
                    write!(self.out, ")")?;
                }
                crate::SampleLevel::Gradient { x, y } => {
                    write!(self.out, ", gradient2d(")?;
                    self.put_expr(module, x, ctx)?;
                    write!(self.out, ", ")?;
                    self.put_expr(module, y, ctx)?;
                    write!(self.out, ")")?;
                }
            }
        }
        if let Some(constant) = offset {
            write!(self.out, ", ")?;
            self.put_constant(module, constant)?;
        }
        if let Some(component) = gather {
            if depth_ref.is_none() {
                if offset.is_none() {
                    write!(self.out, ", int2(0)")?;
                }
                let comp = match component {
                    crate::SwizzleComponent::X => "x",
                    crate::SwizzleComponent::Y => "y",
                    crate::SwizzleComponent::Z => "z",
                    crate::SwizzleComponent::W => "w",
                };
                write!(self.out, ", component::{}", comp)?;
            }
        }
        write!(self.out, ")")?;
        Ok(())
    }

    fn put_image_query(
        &mut self,
        module: &crate::Module,
        image: Handle<crate::Expression>,
        query: crate::ImageQuery,
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        let dim = match *ctx.resolution(image)?.inner_with(&module.types) {
            crate::TypeInner::Image { dim, .. } => dim,
            _ => return Err(Error::Validation(String::from("image query of a non-image"))),
        };
        match query {
            crate::ImageQuery::Size { level } => {
                let dim_comps = match dim {
                    crate::ImageDimension::D1 => 1,
                    crate::ImageDimension::D2 | crate::ImageDimension::Cube => 2,
                    crate::ImageDimension::D3 => 3,
                };
                let getters: &[&str] = &["get_width", "get_height", "get_depth"];
                if dim_comps == 1 {
                    write!(self.out, "uint(")?;
                } else {
                    write!(self.out, "uint{}(", dim_comps)?;
                }
                for (index, getter) in getters[..dim_comps].iter().enumerate() {
                    if index != 0 {
                        write!(self.out, ", ")?;
                    }
                    self.put_expr(module, image, ctx)?;
                    write!(self.out, ".{}(", getter)?;
                    if let Some(level) = level {
                        self.put_expr(module, level, ctx)?;
                    }
                    write!(self.out, ")")?;
                }
                write!(self.out, ")")?;
            }
            crate::ImageQuery::NumLevels => {
                self.put_expr(module, image, ctx)?;
                write!(self.out, ".get_num_mip_levels()")?;
            }
            crate::ImageQuery::NumLayers => {
                self.put_expr(module, image, ctx)?;
                write!(self.out, ".get_array_size()")?;
            }
            crate::ImageQuery::NumSamples => {
                self.put_expr(module, image, ctx)?;
                write!(self.out, ".get_num_samples()")?;
            }
        }
        Ok(())
    }

    fn put_math_function(
        &mut self,
        module: &crate::Module,
        fun: crate::MathFunction,
        arg: Handle<crate::Expression>,
        arg1: Option<Handle<crate::Expression>>,
        arg2: Option<Handle<crate::Expression>>,
        arg3: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        use crate::MathFunction as Mf;
        let fun_name = match fun {
            Mf::Abs => {
                // `abs(INT_MIN)` overflows; run the guard
                if ctx
                    .resolution(arg)?
                    .inner_with(&module.types)
                    .scalar_kind()
                    == Some(crate::ScalarKind::Sint)
                {
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
            Mf::Asinh => "asinh",
            Mf::Acosh => "acosh",
            Mf::Atanh => "atanh",
            Mf::Radians => "radians",
            Mf::Degrees => "degrees",
            Mf::Ceil => "ceil",
            Mf::Floor => "floor",
            Mf::Round => "rint",
            Mf::Fract => "fract",
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
            Mf::Fma => "fma",
            Mf::Mix => "mix",
            Mf::Step => "step",
            Mf::SmoothStep => "smoothstep",
            Mf::Sqrt => "sqrt",
            Mf::InverseSqrt => "rsqrt",
            Mf::Transpose => "transpose",
            Mf::Determinant => "determinant",
            Mf::CountOneBits => "popcount",
            Mf::ReverseBits => "reverse_bits",
            Mf::ExtractBits => "extract_bits",
            Mf::InsertBits => "insert_bits",
            Mf::FindLsb => {
                write!(self.out, "int(ctz(")?;
                self.put_expr(module, arg, ctx)?;
                write!(self.out, "))")?;
                return Ok(());
            }
            Mf::FindMsb => {
                write!(self.out, "int(31u - clz(")?;
                self.put_expr(module, arg, ctx)?;
                write!(self.out, "))")?;
                return Ok(());
            }
        };
        write!(self.out, "{}(", fun_name)?;
        self.put_expr(module, arg, ctx)?;
        for handle in [arg1, arg2, arg3].iter().filter_map(|&a| a) {
            write!(self.out, ", ")?;
            self.put_expr(module, handle, ctx)?;
        }
        write!(self.out, ")")?;
        Ok(())
    }
}

/// The address space qualifier for a global passed by reference, and whether
/// it becomes a pointer instead.
fn address_space_qualifier(
    module: &crate::Module,
    var: &crate::GlobalVariable,
) -> Result<(&'static str, bool), Error> {
    Ok(match var.space {
        crate::AddressSpace::Uniform | crate::AddressSpace::PushConstant => ("constant", false),
        crate::AddressSpace::Storage { access } => {
            let is_array = match module.types[var.ty].inner {
                crate::TypeInner::Array { .. } => true,
                _ => false,
            };
            if access.contains(crate::StorageAccess::STORE) {
                ("device", is_array)
            } else {
                ("const device", is_array)
            }
        }
        crate::AddressSpace::Private => ("thread", false),
        crate::AddressSpace::WorkGroup => ("threadgroup", false),
        crate::AddressSpace::Function | crate::AddressSpace::Handle => {
            return Err(Error::Validation(String::from(
                "unexpected address space for a global parameter",
            )))
        }
    })
}

fn flat_io_info<'a>(
    module: &'a crate::Module,
    fun: &'a crate::Function,
    arg_index: u32,
    member_index: Option<u32>,
) -> Result<(Handle<crate::Type>, crate::Binding), Error> {
    let argument = &fun.arguments[arg_index as usize];
    match member_index {
        None => {
            let binding = argument
                .binding
                .clone()
                .ok_or_else(|| Error::Validation(String::from("missing binding")))?;
            Ok((argument.ty, binding))
        }
        Some(member_index) => match module.types[argument.ty].inner {
            crate::TypeInner::Struct { ref members, .. } => {
                let member = &members[member_index as usize];
                let binding = member
                    .binding
                    .clone()
                    .ok_or_else(|| Error::Validation(String::from("missing binding")))?;
                Ok((member.ty, binding))
            }
            _ => Err(Error::Validation(String::from("expected a struct argument"))),
        },
    }
}

/// The resolved scalar kind of an expression, if any.
fn expression_kind(
    module: &crate::Module,
    fun: &crate::Function,
    expr: Handle<crate::Expression>,
) -> Option<crate::ScalarKind> {
    fun.expression_types
        .get(expr.index())
        .and_then(|res| res.inner_with(&module.types).scalar_kind())
}

/// Componentwise vector overloads delegating to the scalar form, which must
/// already be in scope.
fn write_vector_overloads<W: Write>(
    out: &mut W,
    name: &str,
    ret_prefix: &str,
    arg_prefix: &str,
    two_args: bool,
) -> Result<(), std::fmt::Error> {
    for size in 2..=4usize {
        let components = &["x", "y", "z", "w"][..size];
        let calls: Vec<String> = components
            .iter()
            .map(|c| {
                if two_args {
                    format!("{}(a.{}, b.{})", name, c, c)
                } else {
                    format!("{}(v.{})", name, c)
                }
            })
            .collect();
        if two_args {
            writeln!(
                out,
                "{ret}{size} {name}({arg}{size} a, {arg}{size} b) {{ return {ret}{size}({calls}); }}",
                ret = ret_prefix,
                size = size,
                name = name,
                arg = arg_prefix,
                calls = calls.join(", "),
            )?;
        } else {
            writeln!(
                out,
                "{ret}{size} {name}({arg}{size} v) {{ return {ret}{size}({calls}); }}",
                ret = ret_prefix,
                size = size,
                name = name,
                arg = arg_prefix,
                calls = calls.join(", "),
            )?;
        }
    }
    Ok(())
}

fn find_decompose_result_type(
    module: &crate::Module,
    target: crate::MathFunction,
) -> Option<Handle<crate::Type>> {
    for (_, fun) in module.functions.iter() {
        for (handle, expression) in fun.expressions.iter() {
            if let crate::Expression::Math { fun: mf, .. } = *expression {
                if mf == target {
                    if let Some(resolution) = fun.expression_types.get(handle.index()) {
                        return resolution.handle();
                    }
                }
            }
        }
    }
    None
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

/// Collect the globals used by the callees of every `Call` in a block tree.
fn collect_called_globals(
    block: &crate::Block,
    fun_globals: &[Vec<Handle<crate::GlobalVariable>>],
    used: &mut crate::FastHashSet<Handle<crate::GlobalVariable>>,
) {
    for statement in block.iter() {
        match *statement {
            crate::Statement::Call { function, .. } => {
                if let Some(globals) = fun_globals.get(function.index()) {
                    used.extend(globals.iter().cloned());
                }
            }
            crate::Statement::Block(ref b) => collect_called_globals(b, fun_globals, used),
            crate::Statement::If {
                ref accept,
                ref reject,
                ..
            } => {
                collect_called_globals(accept, fun_globals, used);
                collect_called_globals(reject, fun_globals, used);
            }
            crate::Statement::Switch {
                ref cases,
                ref default,
                ..
            } => {
                for case in cases.iter() {
                    collect_called_globals(&case.body, fun_globals, used);
                }
                collect_called_globals(default, fun_globals, used);
            }
            crate::Statement::Loop {
                ref body,
                ref continuing,
                ..
            } => {
                collect_called_globals(body, fun_globals, used);
                collect_called_globals(continuing, fun_globals, used);
            }
            _ => {}
        }
    }
}
