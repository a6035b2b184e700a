/*! OpenGL Shading Language (GLSL) backend

## Entry points

The output targets a single entry point selected by the options; it is always
emitted as `main`. Arguments and results are flattened into global `in`/`out`
variables (or `gl_*` builtins), one per binding.

## Combined samplers

The IR keeps textures and samplers separate, GLSL does not. Before writing,
the reachable code of the entry point is analyzed to find which
`(texture, sampler)` pairs are actually sampled together; each pair becomes a
single `sampler*` resource named `<texture>_<sampler>`, and every sample site
is rewritten to use the combined name. The binding of the combined resource
follows the texture's binding.
!*/

mod features;
mod keywords;

pub use features::Features;
use features::FeaturesManager;

use crate::{
    back::{self, binary_operation_str, vector_size_str},
    proc::{self, NameKey, Namer},
    FastHashMap, Handle,
};
use std::cmp::Ordering;
use std::fmt::{self, Error as FmtError, Write};
use thiserror::Error;

/// The GLSL version to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub enum Version {
    /// `core` desktop GLSL.
    Desktop(u16),
    /// `es` GLSL.
    Embedded(u16),
}

pub const SUPPORTED_CORE_VERSIONS: &[u16] = &[330, 400, 410, 420, 430, 440, 450, 460];
pub const SUPPORTED_ES_VERSIONS: &[u16] = &[300, 310, 320];

impl Version {
    fn is_es(&self) -> bool {
        match *self {
            Version::Desktop(_) => false,
            Version::Embedded(_) => true,
        }
    }

    fn is_supported(&self) -> bool {
        match *self {
            Version::Desktop(v) => SUPPORTED_CORE_VERSIONS.contains(&v),
            Version::Embedded(v) => SUPPORTED_ES_VERSIONS.contains(&v),
        }
    }

    /// Whether `layout(binding = ..)` is accepted on opaque uniforms.
    fn supports_explicit_binding(&self) -> bool {
        match *self {
            Version::Desktop(v) => v >= 420,
            Version::Embedded(v) => v >= 310,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (*self, *other) {
            (Version::Desktop(x), Version::Desktop(y)) => Some(x.cmp(&y)),
            (Version::Embedded(x), Version::Embedded(y)) => Some(x.cmp(&y)),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Version::Desktop(v) => write!(f, "{} core", v),
            Version::Embedded(v) => write!(f, "{} es", v),
        }
    }
}

/// Per-category base offsets added to IR bindings when emitting
/// `layout(binding = N)`.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct BindingBases {
    pub sampler: u32,
    pub texture: u32,
    pub uniform_buffer: u32,
    pub storage_buffer: u32,
}

#[derive(Debug, Clone)]
pub struct Options {
    /// The GLSL version to produce.
    pub version: Version,
    /// The stage of the entry point to translate.
    pub shader_stage: crate::ShaderStage,
    /// The name of the entry point to translate.
    pub entry_point: String,
    /// Base offsets per resource category.
    pub binding_bases: BindingBases,
    /// Emit `precision highp int;` in addition to the float default (ES only).
    pub force_highp: bool,
}

/// A texture/sampler pair, combined into one GLSL resource.
#[derive(Debug, Clone)]
pub struct TextureMapping {
    pub texture: Handle<crate::GlobalVariable>,
    /// `None` for textures only used with `texelFetch`-style access, which
    /// needs no sampler state.
    pub sampler: Option<Handle<crate::GlobalVariable>>,
}

/// Structured information about the translation, for the embedding layer.
#[derive(Debug, Default)]
pub struct ReflectionInfo {
    /// Mapping of combined resource names to the pairs they came from.
    pub texture_mapping: FastHashMap<String, TextureMapping>,
    /// Mapping of buffer globals to their block instance names.
    pub uniforms: FastHashMap<Handle<crate::GlobalVariable>, String>,
    /// The emitted name of the translated entry point (always `main`).
    pub entry_point_names: FastHashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    FmtError(#[from] FmtError),
    #[error(transparent)]
    Handle(#[from] crate::arena::BadHandle),
    #[error("target version {0} is not supported")]
    VersionNotSupported(Version),
    #[error("entry point '{0}' not found")]
    EntryPointNotFound(String),
    #[error("a resource is missing its binding")]
    MissingBinding(Handle<crate::GlobalVariable>),
    #[error("features {0:?} cannot be expressed in any supported GLSL version")]
    UnsupportedFeatures(Features),
    #[error("version {requested} is too low, the module requires {required}")]
    VersionTooLow { requested: Version, required: Version },
    #[error("cannot convert {0:?} to {1:?} without going through a value cast")]
    UnsupportedConversion(crate::ScalarKind, crate::ScalarKind),
    #[error("{0}")]
    Custom(String),
}

/// Polyfill helper functions needed by the module.
bitflags::bitflags! {
    struct HelperFlags: u32 {
        /// Truncated float modulo.
        const FLOAT_MOD = 1;
        /// `modf` returning a two-field struct.
        const MODF = 1 << 1;
        /// `frexp` returning a two-field struct.
        const FREXP = 1 << 2;
        /// Integer division with a zero / `INT_MIN / -1` guard.
        const INT_DIV = 1 << 3;
        /// Truncated integer remainder with the same guard.
        const INT_MOD = 1 << 4;
        /// `abs` guarded against `INT_MIN`.
        const ABS_INT = 1 << 5;
        /// Negation guarded against `INT_MIN`.
        const NEG_INT = 1 << 6;
        /// Float-to-int conversion with NaN-to-zero clamping.
        const F2I32 = 1 << 7;
        /// Float-to-uint conversion with NaN-to-zero clamping.
        const F2U32 = 1 << 8;
    }
}

/// How an entry-point interface value is addressed in the function body.
#[derive(Clone)]
enum IoName {
    /// A global `in`/`out` variable emitted by the writer.
    Variable(String),
    /// A builtin, possibly wrapped in a cast.
    BuiltIn(String),
}

impl IoName {
    fn as_str(&self) -> &str {
        match *self {
            IoName::Variable(ref s) => s,
            IoName::BuiltIn(ref s) => s,
        }
    }
}

struct FunctionCtx<'a> {
    ty: back::FunctionType,
    handle: Handle<crate::Function>,
    fun: &'a crate::Function,
}

impl<'a> FunctionCtx<'a> {
    fn resolution(&self, expr: Handle<crate::Expression>) -> Result<&'a proc::TypeResolution, Error> {
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

/// Translate a module's entry point into GLSL source.
pub fn write_string(
    module: &crate::Module,
    options: &Options,
) -> Result<(String, ReflectionInfo), Error> {
    let mut writer = Writer::new(module, options)?;
    let info = writer.write()?;
    Ok((writer.out, info))
}

pub struct Writer<'a> {
    module: &'a crate::Module,
    options: &'a Options,
    out: String,
    namer: Namer,
    names: FastHashMap<NameKey, String>,
    features: FeaturesManager,
    helpers: HelperFlags,
    ep_index: usize,
    /// Functions reachable from the entry point, in arena order, entry point
    /// excluded.
    reachable: Vec<Handle<crate::Function>>,
    /// Names of the combined texture/sampler resources.
    texture_names:
        FastHashMap<(Handle<crate::GlobalVariable>, Option<Handle<crate::GlobalVariable>>), String>,
    input_lookup: FastHashMap<(u32, Option<u32>), IoName>,
    output_lookup: FastHashMap<Option<u32>, IoName>,
    // per-function state
    named_expressions: FastHashMap<Handle<crate::Expression>, String>,
    expr_uses: Vec<u32>,
    pending_inits: Vec<PendingInit>,
}

impl<'a> Writer<'a> {
    pub fn new(module: &'a crate::Module, options: &'a Options) -> Result<Self, Error> {
        if !options.version.is_supported() {
            return Err(Error::VersionNotSupported(options.version));
        }

        let ep_index = module
            .entry_points
            .iter()
            .position(|ep| {
                ep.stage == options.shader_stage && ep.name == options.entry_point
            })
            .ok_or_else(|| Error::EntryPointNotFound(options.entry_point.clone()))?;

        let mut namer = Namer::default();
        let mut names = FastHashMap::default();
        namer.reset(
            module,
            keywords::RESERVED_KEYWORDS,
            &[],
            &["gl_", "_glaive_"],
            &mut names,
        );

        Ok(Writer {
            module,
            options,
            out: String::new(),
            namer,
            names,
            features: FeaturesManager::new(),
            helpers: HelperFlags::empty(),
            ep_index,
            reachable: Vec::new(),
            texture_names: FastHashMap::default(),
            input_lookup: FastHashMap::default(),
            output_lookup: FastHashMap::default(),
            named_expressions: FastHashMap::default(),
            expr_uses: Vec::new(),
            pending_inits: Vec::new(),
        })
    }

    fn entry_point(&self) -> &'a crate::EntryPoint {
        &self.module.entry_points[self.ep_index]
    }

    /// Find the functions reachable from the entry point, in arena order.
    ///
    /// GLSL has no use for the unreachable ones, and the texture/sampler
    /// pairing must only consider call sites that can actually execute.
    fn collect_reachable(&mut self) -> Result<(), Error> {
        use petgraph::{graphmap::DiGraphMap, visit::Dfs};

        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for (handle, fun) in self.module.functions.iter() {
            graph.add_node(handle.index());
            for statement in all_statements(&fun.body) {
                if let crate::Statement::Call { function, .. } = *statement {
                    graph.add_edge(handle.index(), function.index(), ());
                }
            }
        }

        let ep_function = self.entry_point().function;
        let mut reachable = crate::FastHashSet::default();
        let mut dfs = Dfs::new(&graph, ep_function.index());
        while let Some(index) = dfs.next(&graph) {
            reachable.insert(index);
        }

        self.reachable = self
            .module
            .functions
            .iter()
            .map(|(handle, _)| handle)
            .filter(|handle| reachable.contains(&handle.index()) && *handle != ep_function)
            .collect();
        Ok(())
    }

    /// Collect the set of texture/sampler pairs used together, walking every
    /// reachable function.
    fn collect_texture_mapping(&mut self) -> Result<(), Error> {
        let ep_function = self.entry_point().function;
        let mut pairs = Vec::new();
        for &handle in self.reachable.iter().chain(Some(&ep_function)) {
            let fun = &self.module.functions[handle];
            for (_, expression) in fun.expressions.iter() {
                let (image, sampler) = match *expression {
                    crate::Expression::ImageSample { image, sampler, .. } => {
                        (image, Some(sampler))
                    }
                    crate::Expression::ImageLoad { image, .. }
                    | crate::Expression::ImageQuery { image, .. } => (image, None),
                    _ => continue,
                };
                let image_var = global_expression(fun, image)?;
                // Storage images stay separate resources.
                if let crate::TypeInner::Image {
                    class: crate::ImageClass::Storage { .. },
                    ..
                } = self.module.types[self.module.global_variables[image_var].ty].inner
                {
                    continue;
                }
                let sampler_var = match sampler {
                    Some(sampler) => Some(global_expression(fun, sampler)?),
                    None => None,
                };
                let key = (image_var, sampler_var);
                if !pairs.contains(&key) {
                    pairs.push(key);
                }
            }
        }

        for (image_var, sampler_var) in pairs {
            let name = {
                let tex_name = &self.names[&NameKey::GlobalVariable(image_var)];
                match sampler_var {
                    Some(sampler_var) => {
                        let samp_name = &self.names[&NameKey::GlobalVariable(sampler_var)];
                        format!("{}_{}", tex_name, samp_name)
                    }
                    None => tex_name.clone(),
                }
            };
            let name = self.namer.call(&name);
            self.texture_names.insert((image_var, sampler_var), name);
        }
        Ok(())
    }

    /// Walk the module and request every feature it needs.
    fn collect_features(&mut self) -> Result<(), Error> {
        let stage = self.entry_point().stage;
        if stage == crate::ShaderStage::Compute {
            self.features
                .request(Features::COMPUTE_SHADER | Features::SHARED_STORAGE);
        }

        for (_, ty) in self.module.types.iter() {
            match ty.inner {
                crate::TypeInner::Scalar { width: 8, .. }
                | crate::TypeInner::Vector { width: 8, .. }
                | crate::TypeInner::Matrix { width: 8, .. } => {
                    self.features.request(Features::DOUBLE_TYPE)
                }
                crate::TypeInner::Atomic { .. } => {
                    self.features.request(Features::ATOMIC_FUNCTIONS)
                }
                crate::TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => {
                    match class {
                        crate::ImageClass::Sampled { multi: true, .. }
                        | crate::ImageClass::Depth { multi: true } => {
                            self.features.request(Features::MULTISAMPLED_TEXTURES);
                            if arrayed {
                                self.features
                                    .request(Features::MULTISAMPLED_TEXTURE_ARRAYS);
                            }
                        }
                        crate::ImageClass::Storage { .. } => {
                            self.features.request(Features::IMAGE_LOAD_STORE)
                        }
                        _ => {}
                    }
                    if arrayed {
                        match dim {
                            crate::ImageDimension::D2 => {}
                            crate::ImageDimension::Cube => {
                                self.features.request(Features::CUBE_TEXTURES_ARRAY)
                            }
                            _ => self.features.request(Features::NON_2D_TEXTURE_ARRAYS),
                        }
                    }
                }
                _ => {}
            }
        }

        for (_, var) in self.module.global_variables.iter() {
            match var.space {
                crate::AddressSpace::Storage { .. } => {
                    self.features.request(Features::BUFFER_STORAGE)
                }
                crate::AddressSpace::WorkGroup => {
                    self.features.request(Features::SHARED_STORAGE)
                }
                _ => {}
            }
        }

        let module = self.module;
        let ep_function = self.entry_point().function;
        for &handle in self.reachable.iter().chain(Some(&ep_function)) {
            let fun = &module.functions[handle];
            for (_, expression) in fun.expressions.iter() {
                match *expression {
                    crate::Expression::Math { fun: mf, arg, .. } => match mf {
                        crate::MathFunction::Fma => self.features.request(Features::FMA),
                        crate::MathFunction::CountOneBits
                        | crate::MathFunction::ReverseBits
                        | crate::MathFunction::ExtractBits
                        | crate::MathFunction::InsertBits
                        | crate::MathFunction::FindLsb
                        | crate::MathFunction::FindMsb => {
                            self.features.request(Features::INTEGER_FUNCTIONS)
                        }
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
                    crate::Expression::ImageQuery { query, .. } => match query {
                        crate::ImageQuery::NumLevels => {
                            self.features.request(Features::TEXTURE_LEVELS)
                        }
                        crate::ImageQuery::NumSamples => {
                            self.features.request(Features::TEXTURE_SAMPLES)
                        }
                        _ => {}
                    },
                    crate::Expression::Binary { op, left, .. } => {
                        match (op, expression_kind(module, fun, left)) {
                            (
                                crate::BinaryOperator::Modulo,
                                Some(crate::ScalarKind::Float),
                            ) => self.helpers |= HelperFlags::FLOAT_MOD,
                            (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Sint))
                            | (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Uint)) => {
                                self.helpers |= HelperFlags::INT_MOD
                            }
                            (crate::BinaryOperator::Divide, Some(crate::ScalarKind::Sint))
                            | (crate::BinaryOperator::Divide, Some(crate::ScalarKind::Uint)) => {
                                self.helpers |= HelperFlags::INT_DIV
                            }
                            _ => {}
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
            for argument in fun.arguments.iter() {
                if let Some(crate::Binding::Location {
                    interpolation: Some(crate::Interpolation::Sample),
                    ..
                }) = argument.binding
                {
                    self.features.request(Features::SAMPLE_QUALIFIER);
                }
            }
        }

        if stage == crate::ShaderStage::Vertex || stage == crate::ShaderStage::Fragment {
            self.features.request(Features::EXPLICIT_LOCATIONS);
        }

        self.features.check_availability(self.options.version)
    }

    pub fn write(&mut self) -> Result<ReflectionInfo, Error> {
        self.collect_reachable()?;
        self.collect_texture_mapping()?;
        self.collect_features()?;

        writeln!(self.out, "#version {}", self.options.version)?;
        let mut extensions = String::new();
        self.features
            .write_extensions(self.options.version, &mut extensions)?;
        self.out.push_str(&extensions);
        writeln!(self.out)?;

        if self.options.version.is_es() {
            writeln!(self.out, "precision highp float;")?;
            if self.options.force_highp {
                writeln!(self.out, "precision highp int;")?;
            }
            writeln!(self.out)?;
        }

        if self.entry_point().stage == crate::ShaderStage::Compute {
            let [x, y, z] = self.entry_point().workgroup_size;
            writeln!(
                self.out,
                "layout(local_size_x = {}, local_size_y = {}, local_size_z = {}) in;",
                x, y, z
            )?;
            writeln!(self.out)?;
        }

        // Struct declarations. Types used only as buffer blocks still get a
        // plain declaration; GLSL tolerates it and helper functions may pass
        // them by value.
        for (handle, ty) in self.module.types.iter() {
            if let crate::TypeInner::Struct { ref members, .. } = ty.inner {
                self.write_struct(handle, members)?;
            }
        }

        // Module constants.
        for (handle, constant) in self.module.constants.iter() {
            if constant.name.is_some() {
                write!(self.out, "const ")?;
                let ty = constant_type_string(self, handle)?;
                let name = self.names[&NameKey::Constant(handle)].clone();
                write!(self.out, "{} {} = ", ty, name)?;
                self.write_constant(handle)?;
                writeln!(self.out, ";")?;
            }
        }

        let mut reflection_uniforms = FastHashMap::default();
        self.write_global_variables(&mut reflection_uniforms)?;
        self.write_entry_point_io()?;
        self.write_helpers()?;

        // Prototypes keep the definitions order-independent.
        let reachable = self.reachable.clone();
        if !reachable.is_empty() {
            for &handle in reachable.iter() {
                self.write_function_header(handle)?;
                writeln!(self.out, ";")?;
            }
            writeln!(self.out)?;
        }

        for &handle in reachable.iter() {
            self.write_function(handle)?;
        }

        self.write_entry_point_function()?;

        let mut info = ReflectionInfo {
            texture_mapping: FastHashMap::default(),
            uniforms: reflection_uniforms,
            entry_point_names: FastHashMap::default(),
        };
        info.entry_point_names
            .insert(self.entry_point().name.clone(), String::from("main"));
        for (&(texture, sampler), name) in self.texture_names.iter() {
            info.texture_mapping
                .insert(name.clone(), TextureMapping { texture, sampler });
        }
        Ok(info)
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
            self.write_var_decl(member.ty, &member_name)?;
            writeln!(self.out, ";")?;
        }
        writeln!(self.out, "}};")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn scalar_string(
        &mut self,
        kind: crate::ScalarKind,
        width: crate::Bytes,
    ) -> Result<&'static str, Error> {
        Ok(match kind {
            crate::ScalarKind::Sint => "int",
            crate::ScalarKind::Uint => "uint",
            crate::ScalarKind::Bool => "bool",
            crate::ScalarKind::Float => match width {
                4 => "float",
                8 => "double",
                _ => {
                    return Err(Error::Custom(format!(
                        "cannot build float of width {}",
                        width
                    )))
                }
            },
        })
    }

    fn scalar_prefix(kind: crate::ScalarKind, width: crate::Bytes) -> &'static str {
        match kind {
            crate::ScalarKind::Sint => "i",
            crate::ScalarKind::Uint => "u",
            crate::ScalarKind::Bool => "b",
            crate::ScalarKind::Float => {
                if width == 8 {
                    "d"
                } else {
                    ""
                }
            }
        }
    }

    /// Write the value-type syntax of a type that is not behind a handle.
    fn write_value_inner(&mut self, inner: &crate::TypeInner) -> Result<(), Error> {
        match *inner {
            crate::TypeInner::Scalar { kind, width }
            | crate::TypeInner::Atomic { kind, width } => {
                let s = self.scalar_string(kind, width)?;
                write!(self.out, "{}", s)?
            }
            crate::TypeInner::Vector { size, kind, width } => write!(
                self.out,
                "{}vec{}",
                Self::scalar_prefix(kind, width),
                vector_size_str(size)
            )?,
            crate::TypeInner::Matrix {
                columns,
                rows,
                width,
            } => write!(
                self.out,
                "{}mat{}x{}",
                if width == 8 { "d" } else { "" },
                vector_size_str(columns),
                vector_size_str(rows)
            )?,
            _ => {
                return Err(Error::Custom(format!(
                    "cannot write type {:?} as a value",
                    inner
                )))
            }
        }
        Ok(())
    }

    /// Write `base name[dims]`, flattening nested arrays into suffixes.
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
                crate::ArraySize::Dynamic => write!(self.out, "[]")?,
            }
        }
        Ok(())
    }

    fn write_image_type(
        &mut self,
        dim: crate::ImageDimension,
        arrayed: bool,
        class: crate::ImageClass,
        comparison: bool,
    ) -> Result<(), Error> {
        let dim_str = match dim {
            crate::ImageDimension::D1 => "1D",
            crate::ImageDimension::D2 => "2D",
            crate::ImageDimension::D3 => "3D",
            crate::ImageDimension::Cube => "Cube",
        };
        match class {
            crate::ImageClass::Sampled { kind, multi } => write!(
                self.out,
                "{}sampler{}{}{}{}",
                Self::scalar_prefix(kind, 4),
                dim_str,
                if multi { "MS" } else { "" },
                if arrayed { "Array" } else { "" },
                if comparison { "Shadow" } else { "" },
            )?,
            crate::ImageClass::Depth { multi } => write!(
                self.out,
                "sampler{}{}{}{}",
                dim_str,
                if multi { "MS" } else { "" },
                if arrayed { "Array" } else { "" },
                if comparison { "Shadow" } else { "" },
            )?,
            crate::ImageClass::Storage { format, .. } => write!(
                self.out,
                "{}image{}{}",
                Self::scalar_prefix(back::storage_format_kind(format), 4),
                dim_str,
                if arrayed { "Array" } else { "" },
            )?,
        }
        Ok(())
    }

    fn write_global_variables(
        &mut self,
        reflection_uniforms: &mut FastHashMap<Handle<crate::GlobalVariable>, String>,
    ) -> Result<(), Error> {
        // Combined texture/sampler resources first.
        let mut entries: Vec<_> = self
            .texture_names
            .iter()
            .map(|(&key, name)| (key, name.clone()))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1));
        for ((texture, sampler), name) in entries {
            let var = &self.module.global_variables[texture];
            let (dim, arrayed, class) = match self.module.types[var.ty].inner {
                crate::TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => (dim, arrayed, class),
                _ => continue,
            };
            let comparison = match sampler {
                Some(sampler) => match self.module.types
                    [self.module.global_variables[sampler].ty]
                    .inner
                {
                    crate::TypeInner::Sampler { comparison } => comparison,
                    _ => false,
                },
                None => false,
            };
            if self.options.version.supports_explicit_binding() {
                if let Some(ref binding) = var.binding {
                    write!(
                        self.out,
                        "layout(binding = {}) ",
                        binding.binding + self.options.binding_bases.texture
                    )?;
                }
            }
            write!(self.out, "uniform ")?;
            self.write_image_type(dim, arrayed, class, comparison)?;
            writeln!(self.out, " {};", name)?;
        }

        for (handle, var) in self.module.global_variables.iter() {
            match self.module.types[var.ty].inner {
                // samplers are merged into the combined resources
                crate::TypeInner::Sampler { .. } => continue,
                crate::TypeInner::Image {
                    dim,
                    arrayed,
                    class: class @ crate::ImageClass::Storage { .. },
                } => {
                    let name = self.names[&NameKey::GlobalVariable(handle)].clone();
                    let (format, access) = match class {
                        crate::ImageClass::Storage { format, access } => (format, access),
                        _ => continue,
                    };
                    write!(self.out, "layout(")?;
                    if self.options.version.supports_explicit_binding() {
                        if let Some(ref binding) = var.binding {
                            write!(
                                self.out,
                                "binding = {}, ",
                                binding.binding + self.options.binding_bases.texture
                            )?;
                        }
                    }
                    write!(self.out, "{}) ", storage_format_str(format))?;
                    if !access.contains(crate::StorageAccess::STORE) {
                        write!(self.out, "readonly ")?;
                    }
                    if !access.contains(crate::StorageAccess::LOAD) {
                        write!(self.out, "writeonly ")?;
                    }
                    write!(self.out, "uniform ")?;
                    self.write_image_type(dim, arrayed, class, false)?;
                    writeln!(self.out, " {};", name)?;
                    continue;
                }
                crate::TypeInner::Image { .. } => continue,
                _ => {}
            }

            let name = self.names[&NameKey::GlobalVariable(handle)].clone();
            match var.space {
                crate::AddressSpace::Uniform => {
                    self.write_buffer_block(
                        handle,
                        var,
                        "uniform",
                        "std140",
                        self.options.binding_bases.uniform_buffer,
                        &name,
                    )?;
                    reflection_uniforms.insert(handle, name);
                }
                crate::AddressSpace::Storage { access } => {
                    write!(self.out, "layout(std430")?;
                    if let Some(ref binding) = var.binding {
                        write!(
                            self.out,
                            ", binding = {}",
                            binding.binding + self.options.binding_bases.storage_buffer
                        )?;
                    }
                    write!(self.out, ") ")?;
                    if !access.contains(crate::StorageAccess::STORE) {
                        write!(self.out, "readonly ")?;
                    }
                    write!(self.out, "buffer ")?;
                    self.write_block_members(var.ty, &name)?;
                    reflection_uniforms.insert(handle, name);
                }
                crate::AddressSpace::WorkGroup => {
                    write!(self.out, "shared ")?;
                    self.write_var_decl(var.ty, &name)?;
                    writeln!(self.out, ";")?;
                }
                crate::AddressSpace::Private => {
                    self.write_var_decl(var.ty, &name)?;
                    if let Some(init) = var.init {
                        write!(self.out, " = ")?;
                        self.write_constant(init)?;
                    }
                    writeln!(self.out, ";")?;
                }
                crate::AddressSpace::PushConstant => {
                    // No push constants in GL; a plain uniform block comes
                    // closest.
                    self.write_buffer_block(handle, var, "uniform", "std140", 0, &name)?;
                    reflection_uniforms.insert(handle, name);
                }
                crate::AddressSpace::Function | crate::AddressSpace::Handle => {}
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Write `layout(..) uniform _<Ty>_ubo { .. } name;`.
    fn write_buffer_block(
        &mut self,
        _handle: Handle<crate::GlobalVariable>,
        var: &crate::GlobalVariable,
        qualifier: &str,
        layout: &str,
        base: u32,
        name: &str,
    ) -> Result<String, Error> {
        write!(self.out, "layout({}", layout)?;
        if let Some(ref binding) = var.binding {
            write!(self.out, ", binding = {}", binding.binding + base)?;
        }
        write!(self.out, ") {} ", qualifier)?;
        let block_name = self.write_block_members(var.ty, name)?;
        Ok(block_name)
    }

    /// Write the `<BlockName> { members.. } instance;` part of a buffer
    /// block. The block name is the type name wrapped in a reserved spelling
    /// so that it can never collide with the struct declaration itself.
    fn write_block_members(
        &mut self,
        ty: Handle<crate::Type>,
        instance_name: &str,
    ) -> Result<String, Error> {
        let (members, block_name) = match self.module.types[ty].inner {
            crate::TypeInner::Struct { ref members, .. } => {
                let type_name = &self.names[&NameKey::Type(ty)];
                (members.clone(), format!("_{}_ubo", type_name))
            }
            _ => {
                return Err(Error::Custom(String::from(
                    "buffer globals must be structs",
                )))
            }
        };
        writeln!(self.out, "{} {{", block_name)?;
        for (index, member) in members.iter().enumerate() {
            let member_name = self.names[&NameKey::StructMember(ty, index as u32)].clone();
            write!(self.out, "{}", back::INDENT)?;
            self.write_var_decl(member.ty, &member_name)?;
            writeln!(self.out, ";")?;
        }
        writeln!(self.out, "}} {};", instance_name)?;
        Ok(block_name)
    }

    fn builtin_expression(
        built_in: crate::BuiltIn,
        output: bool,
    ) -> Result<String, Error> {
        use crate::BuiltIn as Bi;
        Ok(String::from(match built_in {
            Bi::Position => {
                if output {
                    "gl_Position"
                } else {
                    "gl_FragCoord"
                }
            }
            Bi::BaseInstance => "uint(gl_BaseInstance)",
            Bi::BaseVertex => "uint(gl_BaseVertex)",
            Bi::ClipDistance => "gl_ClipDistance",
            Bi::InstanceIndex => "uint(gl_InstanceID)",
            Bi::PointSize => "gl_PointSize",
            Bi::VertexIndex => "uint(gl_VertexID)",
            Bi::FragDepth => "gl_FragDepth",
            Bi::FrontFacing => "gl_FrontFacing",
            Bi::SampleIndex => "uint(gl_SampleID)",
            Bi::SampleMask => {
                if output {
                    "gl_SampleMask[0]"
                } else {
                    "gl_SampleMaskIn[0]"
                }
            }
            Bi::GlobalInvocationId => "gl_GlobalInvocationID",
            Bi::LocalInvocationId => "gl_LocalInvocationID",
            Bi::LocalInvocationIndex => "gl_LocalInvocationIndex",
            Bi::WorkGroupId => "gl_WorkGroupID",
            Bi::NumWorkGroups => "gl_NumWorkGroups",
        }))
    }

    fn interpolation_str(interpolation: crate::Interpolation) -> &'static str {
        match interpolation {
            crate::Interpolation::Perspective => "smooth",
            crate::Interpolation::Linear => "noperspective",
            crate::Interpolation::Flat => "flat",
            crate::Interpolation::Centroid => "centroid",
            crate::Interpolation::Sample => "sample",
        }
    }

    /// Flatten the entry point interface into global `in`/`out` variables.
    fn write_entry_point_io(&mut self) -> Result<(), Error> {
        let ep = self.entry_point();
        let stage = ep.stage;
        let fun_handle = ep.function;
        let fun = self.module.functions.try_get(fun_handle)?;

        let mut declarations = Vec::new();

        for (arg_index, argument) in fun.arguments.iter().enumerate() {
            match argument.binding {
                Some(ref binding) => {
                    let io = self.io_declaration(
                        stage,
                        false,
                        binding,
                        argument.ty,
                        argument.name.as_deref(),
                        &mut declarations,
                    )?;
                    self.input_lookup.insert((arg_index as u32, None), io);
                }
                None => {
                    let members = match self.module.types[argument.ty].inner {
                        crate::TypeInner::Struct { ref members, .. } => members.clone(),
                        _ => {
                            return Err(Error::Custom(String::from(
                                "entry point argument needs a binding",
                            )))
                        }
                    };
                    for (member_index, member) in members.iter().enumerate() {
                        let binding = member.binding.as_ref().ok_or_else(|| {
                            Error::Custom(String::from(
                                "entry point struct member needs a binding",
                            ))
                        })?;
                        let io = self.io_declaration(
                            stage,
                            false,
                            binding,
                            member.ty,
                            member.name.as_deref(),
                            &mut declarations,
                        )?;
                        self.input_lookup
                            .insert((arg_index as u32, Some(member_index as u32)), io);
                    }
                }
            }
        }

        if let Some(ref result) = fun.result {
            match result.binding {
                Some(ref binding) => {
                    let io = self.io_declaration(
                        stage,
                        true,
                        binding,
                        result.ty,
                        None,
                        &mut declarations,
                    )?;
                    self.output_lookup.insert(None, io);
                }
                None => {
                    let members = match self.module.types[result.ty].inner {
                        crate::TypeInner::Struct { ref members, .. } => members.clone(),
                        _ => {
                            return Err(Error::Custom(String::from(
                                "entry point result needs a binding",
                            )))
                        }
                    };
                    for (member_index, member) in members.iter().enumerate() {
                        let binding = member.binding.as_ref().ok_or_else(|| {
                            Error::Custom(String::from(
                                "entry point struct member needs a binding",
                            ))
                        })?;
                        let io = self.io_declaration(
                            stage,
                            true,
                            binding,
                            member.ty,
                            member.name.as_deref(),
                            &mut declarations,
                        )?;
                        self.output_lookup.insert(Some(member_index as u32), io);
                    }
                }
            }
        }

        for line in declarations {
            self.out.push_str(&line);
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// Produce one interface declaration, returning how the body refers to
    /// the value.
    fn io_declaration(
        &mut self,
        stage: crate::ShaderStage,
        output: bool,
        binding: &crate::Binding,
        ty: Handle<crate::Type>,
        name: Option<&str>,
        declarations: &mut Vec<String>,
    ) -> Result<IoName, Error> {
        match *binding {
            crate::Binding::BuiltIn(built_in) => {
                Ok(IoName::BuiltIn(Self::builtin_expression(built_in, output)?))
            }
            crate::Binding::Location {
                location,
                interpolation,
            } => {
                // Inter-stage varyings get a `v_` prefix, so a vertex output
                // can never collide with a same-named fragment input at link
                // time.
                let is_varying = match (stage, output) {
                    (crate::ShaderStage::Vertex, true)
                    | (crate::ShaderStage::Fragment, false) => true,
                    _ => false,
                };
                let base = match name {
                    Some(name) if is_varying => format!("v_{}", name),
                    Some(name) => String::from(name),
                    None if is_varying => format!("v_location{}", location),
                    None => format!("location{}", location),
                };
                let var_name = self.namer.call(&base);

                let mut decl = String::new();
                write!(decl, "layout(location = {}) ", location)?;
                if let Some(interpolation) = interpolation {
                    if is_varying {
                        write!(decl, "{} ", Self::interpolation_str(interpolation))?;
                    }
                }
                write!(decl, "{} ", if output { "out" } else { "in" })?;
                // interface variables are value types
                let mut tmp = std::mem::take(&mut self.out);
                self.write_var_decl(ty, &var_name)?;
                std::mem::swap(&mut self.out, &mut tmp);
                write!(decl, "{};\n", tmp)?;
                declarations.push(decl);
                Ok(IoName::Variable(var_name))
            }
        }
    }

    /// Write the on-demand helper functions.
    fn write_helpers(&mut self) -> Result<(), Error> {
        if self.helpers.contains(HelperFlags::FLOAT_MOD) {
            for ty in &["float", "vec2", "vec3", "vec4"] {
                writeln!(
                    self.out,
                    "{ty} _glaive_mod({ty} a, {ty} b) {{ return a - b * trunc(a / b); }}",
                    ty = ty
                )?;
            }
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::INT_DIV) {
            writeln!(
                self.out,
                "int _glaive_div(int a, int b) {{ return a / (((b == 0) || ((a == (-2147483647 - 1)) && (b == -1))) ? 1 : b); }}"
            )?;
            writeln!(
                self.out,
                "uint _glaive_div(uint a, uint b) {{ return a / ((b == 0u) ? 1u : b); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_div", "ivec", "ivec", true)?;
            write_vector_overloads(&mut self.out, "_glaive_div", "uvec", "uvec", true)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::INT_MOD) {
            // `%` on negative operands is undefined here, so the remainder is
            // reconstructed from the truncated division
            writeln!(
                self.out,
                "int _glaive_mod(int a, int b) {{ int d = (((b == 0) || ((a == (-2147483647 - 1)) && (b == -1))) ? 1 : b); return a - (a / d) * d; }}"
            )?;
            writeln!(
                self.out,
                "uint _glaive_mod(uint a, uint b) {{ return a % ((b == 0u) ? 1u : b); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_mod", "ivec", "ivec", true)?;
            write_vector_overloads(&mut self.out, "_glaive_mod", "uvec", "uvec", true)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::ABS_INT) {
            writeln!(
                self.out,
                "int _glaive_abs(int a) {{ return (a == (-2147483647 - 1)) ? a : abs(a); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_abs", "ivec", "ivec", false)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::NEG_INT) {
            writeln!(
                self.out,
                "int _glaive_neg(int a) {{ return (a == (-2147483647 - 1)) ? a : -a; }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_neg", "ivec", "ivec", false)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::F2I32) {
            // NaN lands on zero, everything else saturates
            writeln!(
                self.out,
                "int _glaive_f2i32(float v) {{ return int(clamp((v == v) ? v : 0.0, -2147483600.0, 2147483500.0)); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_f2i32", "ivec", "vec", false)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::F2U32) {
            writeln!(
                self.out,
                "uint _glaive_f2u32(float v) {{ return uint(clamp((v == v) ? v : 0.0, 0.0, 4294967000.0)); }}"
            )?;
            write_vector_overloads(&mut self.out, "_glaive_f2u32", "uvec", "vec", false)?;
            writeln!(self.out)?;
        }
        if self.helpers.contains(HelperFlags::MODF) {
            self.write_decompose_helper(crate::MathFunction::Modf)?;
        }
        if self.helpers.contains(HelperFlags::FREXP) {
            self.write_decompose_helper(crate::MathFunction::Frexp)?;
        }
        Ok(())
    }

    /// `modf`/`frexp` return a two-field struct in the IR, while the GLSL
    /// intrinsics use an out-parameter; wrap them.
    fn write_decompose_helper(&mut self, fun: crate::MathFunction) -> Result<(), Error> {
        let result_ty = self.find_decompose_result_type(fun);
        let (ty, intrinsic, helper) = match fun {
            crate::MathFunction::Modf => ("float", "modf", "_glaive_modf"),
            crate::MathFunction::Frexp => ("float", "frexp", "_glaive_frexp"),
            _ => return Ok(()),
        };
        let result_ty = match result_ty {
            Some(handle) => handle,
            None => return Ok(()),
        };
        let struct_name = self.names[&NameKey::Type(result_ty)].clone();
        let field0 = self.names[&NameKey::StructMember(result_ty, 0)].clone();
        let field1 = self.names[&NameKey::StructMember(result_ty, 1)].clone();
        writeln!(
            self.out,
            "{strct} {helper}({ty} x) {{ {strct} s; s.{f0} = {intrinsic}(x, s.{f1}); return s; }}",
            strct = struct_name,
            helper = helper,
            ty = ty,
            intrinsic = intrinsic,
            f0 = field0,
            f1 = field1,
        )?;
        writeln!(self.out)?;
        Ok(())
    }

    fn find_decompose_result_type(
        &self,
        target: crate::MathFunction,
    ) -> Option<Handle<crate::Type>> {
        for (_, fun) in self.module.functions.iter() {
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

    fn write_function_header(&mut self, handle: Handle<crate::Function>) -> Result<(), Error> {
        let fun = &self.module.functions[handle];
        let name = self.names[&NameKey::Function(handle)].clone();
        match fun.result {
            Some(ref result) => match self.module.types[result.ty].inner {
                // array returns use the `T[n] f()` spelling
                crate::TypeInner::Array { .. } => {
                    let mut tmp = std::mem::take(&mut self.out);
                    self.write_var_decl(result.ty, "")?;
                    std::mem::swap(&mut self.out, &mut tmp);
                    let decl = tmp.trim_end().to_string().replace(" [", "[");
                    write!(self.out, "{} {}", decl, name)?;
                }
                _ => self.write_var_decl(result.ty, &name)?,
            },
            None => write!(self.out, "void {}", name)?,
        }
        write!(self.out, "(")?;
        let arguments: Vec<_> = fun
            .arguments
            .iter()
            .enumerate()
            .map(|(i, arg)| (i as u32, arg.ty))
            .collect();
        for (index, (arg_index, ty)) in arguments.into_iter().enumerate() {
            if index != 0 {
                write!(self.out, ", ")?;
            }
            let arg_name = self.names[&NameKey::FunctionArgument(handle, arg_index)].clone();
            self.write_var_decl(ty, &arg_name)?;
        }
        write!(self.out, ")")?;
        Ok(())
    }

    fn write_function(&mut self, handle: Handle<crate::Function>) -> Result<(), Error> {
        let fun = &self.module.functions[handle];
        self.named_expressions.clear();
        self.expr_uses = proc::count_expression_uses(fun);
        self.collect_pending_inits(handle, fun);

        self.write_function_header(handle)?;
        writeln!(self.out, " {{")?;
        self.write_function_locals(handle, fun)?;
        let ctx = FunctionCtx {
            ty: back::FunctionType::Function(handle),
            handle,
            fun,
        };
        for statement in fun.body.iter() {
            self.write_stmt(statement, &ctx, back::Level(1))?;
        }
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn collect_pending_inits(&mut self, _handle: Handle<crate::Function>, fun: &crate::Function) {
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

    fn write_function_locals(
        &mut self,
        handle: Handle<crate::Function>,
        fun: &crate::Function,
    ) -> Result<(), Error> {
        let ctx = FunctionCtx {
            ty: back::FunctionType::Function(handle),
            handle,
            fun,
        };
        for (local_handle, local) in fun.local_variables.iter() {
            let name = self.names[&NameKey::FunctionLocal(handle, local_handle)].clone();
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
                    self.write_expr(init, &ctx)?;
                }
                _ => {}
            }
            writeln!(self.out, ";")?;
        }
        Ok(())
    }

    fn write_entry_point_function(&mut self) -> Result<(), Error> {
        let ep = self.entry_point();
        let fun_handle = ep.function;
        let fun = self.module.functions.try_get(fun_handle)?;
        self.named_expressions.clear();
        self.expr_uses = proc::count_expression_uses(fun);
        self.collect_pending_inits(fun_handle, fun);

        writeln!(self.out, "void main() {{")?;
        self.write_function_locals(fun_handle, fun)?;
        let ctx = FunctionCtx {
            ty: back::FunctionType::EntryPoint(self.ep_index as u16),
            handle: fun_handle,
            fun,
        };
        for statement in fun.body.iter() {
            self.write_stmt(statement, &ctx, back::Level(1))?;
        }
        writeln!(self.out, "}}")?;
        Ok(())
    }

    fn write_constant(&mut self, handle: Handle<crate::Constant>) -> Result<(), Error> {
        match self.module.constants[handle].inner {
            crate::ConstantInner::Scalar { ref value, width } => {
                self.write_scalar_value(value, width)?
            }
            crate::ConstantInner::Composite { ty, ref components } => {
                let components = components.clone();
                match self.module.types[ty].inner {
                    crate::TypeInner::Struct { .. } => {
                        let name = self.names[&NameKey::Type(ty)].clone();
                        write!(self.out, "{}(", name)?;
                    }
                    ref other => {
                        let other = other.clone();
                        match other {
                            crate::TypeInner::Array { .. } => {
                                // `T[n](..)` constructor
                                let mut tmp = std::mem::take(&mut self.out);
                                self.write_var_decl(ty, "")?;
                                std::mem::swap(&mut self.out, &mut tmp);
                                let decl = tmp.trim_end().trim_end_matches(' ').to_string();
                                // `write_var_decl` leaves " name[size]"; drop the space
                                let decl = decl.replace(" [", "[");
                                write!(self.out, "{}(", decl)?;
                            }
                            _ => {
                                self.write_value_inner(&other)?;
                                write!(self.out, "(")?;
                            }
                        }
                    }
                }
                for (index, &component) in components.iter().enumerate() {
                    if index != 0 {
                        write!(self.out, ", ")?;
                    }
                    self.write_constant(component)?;
                }
                write!(self.out, ")")?;
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
                    write!(self.out, "{:?}lf", v)?
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
            crate::Literal::F64(v) => write!(self.out, "{:?}lf", v)?,
            crate::Literal::F32(v) => write!(self.out, "{:?}", v)?,
            crate::Literal::U32(v) => write!(self.out, "{}u", v)?,
            crate::Literal::I32(v) => write!(self.out, "{}", v)?,
            crate::Literal::U64(v) => write!(self.out, "{}u", v)?,
            crate::Literal::I64(v) => write!(self.out, "{}", v)?,
            crate::Literal::Bool(v) => write!(self.out, "{}", v)?,
        }
        Ok(())
    }

    fn write_stmt(
        &mut self,
        statement: &crate::Statement,
        ctx: &FunctionCtx,
        level: back::Level,
    ) -> Result<(), Error> {
        use crate::Statement as St;
        match *statement {
            St::Emit(ref range) => {
                for handle in range.clone() {
                    let expression = &ctx.fun.expressions[handle];
                    let min_ref_count = expression.bake_ref_count();
                    let count = self.expr_uses.get(handle.index()).cloned().unwrap_or(0);
                    if count >= min_ref_count && !expression.is_trivial() {
                        let resolution = ctx.resolution(handle)?;
                        // result expressions are named by their statements
                        match *expression {
                            crate::Expression::CallResult(_)
                            | crate::Expression::AtomicResult { .. }
                            | crate::Expression::WorkGroupUniformLoadResult { .. } => continue,
                            _ => {}
                        }
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
                    for statement in case.body.iter() {
                        self.write_stmt(statement, ctx, level.next().next())?;
                    }
                    if !case.fall_through && !block_ends_control_flow(&case.body) {
                        writeln!(self.out, "{}break;", level.next().next())?;
                    }
                }
                writeln!(self.out, "{}default:", level.next())?;
                for statement in default.iter() {
                    self.write_stmt(statement, ctx, level.next().next())?;
                }
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
                        self.write_stmt(statement, ctx, level.next())?;
                    }
                    writeln!(self.out, "{}}}", level)?;
                } else {
                    // The continuing block must also run before a `continue`,
                    // so it is hoisted to the top behind a first-iteration
                    // guard.
                    let guard = self.namer.call("loop_init");
                    writeln!(self.out, "{}bool {} = true;", level, guard)?;
                    writeln!(self.out, "{}while(true) {{", level)?;
                    let l2 = level.next();
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
                if ctx.ty.is_entry_point() {
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
                if flags.contains(crate::Barrier::STORAGE) {
                    writeln!(self.out, "{}memoryBarrierBuffer();", level)?;
                }
                if flags.contains(crate::Barrier::WORK_GROUP) {
                    writeln!(self.out, "{}memoryBarrierShared();", level)?;
                }
                if flags.contains(crate::Barrier::TEXTURE) {
                    writeln!(self.out, "{}memoryBarrierImage();", level)?;
                }
                writeln!(self.out, "{}barrier();", level)?;
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
                write!(self.out, "{}imageStore(", level)?;
                self.write_expr(image, ctx)?;
                write!(self.out, ", ")?;
                self.write_image_coordinate(coordinate, array_index, ctx)?;
                write!(self.out, ", ")?;
                self.write_expr(value, ctx)?;
                writeln!(self.out, ");")?;
            }
            St::Atomic {
                pointer,
                ref fun,
                value,
                result,
            } => {
                self.write_atomic_stmt(pointer, fun, value, result, ctx, level)?;
            }
            St::WorkGroupUniformLoad { pointer, result } => {
                writeln!(self.out, "{}barrier();", level)?;
                let name = format!("{}{}", back::BAKE_PREFIX, result.index());
                let resolution = ctx.resolution(result)?;
                write!(self.out, "{}", level)?;
                self.write_baked_decl(resolution, &name)?;
                write!(self.out, " = ")?;
                self.write_expr(pointer, ctx)?;
                writeln!(self.out, ";")?;
                writeln!(self.out, "{}barrier();", level)?;
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
                return Err(Error::Custom(String::from(
                    "ray queries are not representable in GLSL",
                )))
            }
        }
        Ok(())
    }

    /// Write deferred local initializers whose call results are all in scope
    /// now, one store per call result with the last one carrying the full
    /// value.
    fn flush_pending_inits(
        &mut self,
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
                self.write_expr(call_result, ctx)?;
                writeln!(self.out, ";")?;
            }
            write!(self.out, "{}{} = ", level, local_name)?;
            self.write_expr(pending_init.root, ctx)?;
            writeln!(self.out, ";")?;
        }
        Ok(())
    }

    fn write_atomic_stmt(
        &mut self,
        pointer: Handle<crate::Expression>,
        fun: &crate::AtomicFunction,
        value: Handle<crate::Expression>,
        result: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx,
        level: back::Level,
    ) -> Result<(), Error> {
        use crate::AtomicFunction as Af;
        if let Af::Exchange {
            compare: Some(compare),
        } = *fun
        {
            // atomicCompSwap returns the old value; the IR result is the
            // (old, exchanged) pair.
            let result = match result {
                Some(result) => result,
                None => {
                    write!(self.out, "{}atomicCompSwap(", level)?;
                    self.write_expr(pointer, ctx)?;
                    write!(self.out, ", ")?;
                    self.write_expr(compare, ctx)?;
                    write!(self.out, ", ")?;
                    self.write_expr(value, ctx)?;
                    writeln!(self.out, ");")?;
                    return Ok(());
                }
            };
            let resolution = ctx.resolution(result)?;
            let struct_handle = resolution.handle().ok_or_else(|| {
                Error::Custom(String::from("compare exchange result must be a struct"))
            })?;
            let struct_name = self.names[&NameKey::Type(struct_handle)].clone();
            let old_name = format!("{}{}_old", back::BAKE_PREFIX, result.index());
            let value_kind = ctx
                .resolution(value)?
                .inner_with(&self.module.types)
                .scalar_kind();
            let old_ty = match value_kind {
                Some(crate::ScalarKind::Sint) => "int",
                _ => "uint",
            };
            write!(self.out, "{}{} {} = atomicCompSwap(", level, old_ty, old_name)?;
            self.write_expr(pointer, ctx)?;
            write!(self.out, ", ")?;
            self.write_expr(compare, ctx)?;
            write!(self.out, ", ")?;
            self.write_expr(value, ctx)?;
            writeln!(self.out, ");")?;

            let name = format!("{}{}", back::BAKE_PREFIX, result.index());
            write!(
                self.out,
                "{}{} {} = {}({}, {} == ",
                level, struct_name, name, struct_name, old_name, old_name
            )?;
            self.write_expr(compare, ctx)?;
            writeln!(self.out, ");")?;
            self.named_expressions.insert(result, name);
            return Ok(());
        }

        let fun_str = match *fun {
            Af::Add => "atomicAdd",
            Af::Subtract => "atomicAdd", // negated below
            Af::And => "atomicAnd",
            Af::ExclusiveOr => "atomicXor",
            Af::InclusiveOr => "atomicOr",
            Af::Min => "atomicMin",
            Af::Max => "atomicMax",
            Af::Exchange { compare: None } => "atomicExchange",
            Af::Exchange { .. } => "atomicCompSwap",
        };

        write!(self.out, "{}", level)?;
        if let Some(result) = result {
            let name = format!("{}{}", back::BAKE_PREFIX, result.index());
            let resolution = ctx.resolution(result)?;
            self.write_baked_decl(resolution, &name)?;
            write!(self.out, " = ")?;
            self.named_expressions.insert(result, name);
        }
        write!(self.out, "{}(", fun_str)?;
        self.write_expr(pointer, ctx)?;
        write!(self.out, ", ")?;
        if let Af::Subtract = *fun {
            write!(self.out, "-(")?;
            self.write_expr(value, ctx)?;
            write!(self.out, ")")?;
        } else {
            self.write_expr(value, ctx)?;
        }
        writeln!(self.out, ");")?;
        Ok(())
    }

    fn write_entry_point_return(
        &mut self,
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
        let fun = ctx.fun;
        let result = fun
            .result
            .as_ref()
            .ok_or_else(|| Error::Custom(String::from("entry point returns without a result")))?;
        match result.binding {
            Some(_) => {
                let io = self.output_lookup[&None].clone();
                write!(self.out, "{}{} = ", level, io.as_str())?;
                self.write_expr(value, ctx)?;
                writeln!(self.out, ";")?;
            }
            None => {
                // Bake the struct once, then scatter its members.
                let tmp = format!("{}{}_out", back::BAKE_PREFIX, value.index());
                let resolution = ctx.resolution(value)?;
                write!(self.out, "{}", level)?;
                self.write_baked_decl(resolution, &tmp)?;
                write!(self.out, " = ")?;
                self.write_expr(value, ctx)?;
                writeln!(self.out, ";")?;

                let ty = resolution.handle().ok_or_else(|| {
                    Error::Custom(String::from("entry point result must be a struct"))
                })?;
                let member_count = match self.module.types[ty].inner {
                    crate::TypeInner::Struct { ref members, .. } => members.len(),
                    _ => 0,
                };
                for index in 0..member_count {
                    let member_name =
                        self.names[&NameKey::StructMember(ty, index as u32)].clone();
                    let io = self.output_lookup[&Some(index as u32)].clone();
                    writeln!(
                        self.out,
                        "{}{} = {}.{};",
                        level,
                        io.as_str(),
                        tmp,
                        member_name
                    )?;
                }
            }
        }
        writeln!(self.out, "{}return;", level)?;
        Ok(())
    }

    /// Write the declaration of a baked temporary.
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

    fn write_image_coordinate(
        &mut self,
        coordinate: Handle<crate::Expression>,
        array_index: Option<Handle<crate::Expression>>,
        ctx: &FunctionCtx,
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
                write!(self.out, "ivec{}(", size + 1)?;
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
            Ex::ZeroValue(ty) => self.write_zero_value(ty)?,
            Ex::Compose { ty, ref components } => {
                let components = components.clone();
                match self.module.types[ty].inner {
                    crate::TypeInner::Struct { .. } => {
                        let name = self.names[&NameKey::Type(ty)].clone();
                        write!(self.out, "{}(", name)?;
                    }
                    crate::TypeInner::Array { .. } => {
                        let mut tmp = std::mem::take(&mut self.out);
                        self.write_var_decl(ty, "")?;
                        std::mem::swap(&mut self.out, &mut tmp);
                        let decl = tmp.trim_end().to_string().replace(" [", "[");
                        write!(self.out, "{}(", decl)?;
                    }
                    ref other => {
                        let other = other.clone();
                        self.write_value_inner(&other)?;
                        write!(self.out, "(")?;
                    }
                }
                for (index, &component) in components.iter().enumerate() {
                    if index != 0 {
                        write!(self.out, ", ")?;
                    }
                    self.write_expr(component, ctx)?;
                }
                write!(self.out, ")")?;
            }
            Ex::Access { base, index } => {
                self.write_expr(base, ctx)?;
                write!(self.out, "[")?;
                self.write_expr(index, ctx)?;
                write!(self.out, "]")?;
            }
            Ex::AccessIndex { base, index } => {
                // flattened entry point arguments resolve to interface names
                if let Ex::FunctionArgument(arg_index) = ctx.fun.expressions[base] {
                    if ctx.ty.is_entry_point() {
                        if let Some(io) = self.input_lookup.get(&(arg_index, Some(index))) {
                            write!(self.out, "{}", io.clone().as_str())?;
                            return Ok(());
                        }
                    }
                }
                let base_inner = ctx.resolution(base)?.inner_with(&self.module.types);
                match *base_inner {
                    crate::TypeInner::Struct { .. } => {
                        let ty = ctx
                            .resolution(base)?
                            .handle()
                            .ok_or_else(|| Error::Custom(String::from("unnamed struct")))?;
                        let member_name =
                            self.names[&NameKey::StructMember(ty, index)].clone();
                        self.write_expr(base, ctx)?;
                        write!(self.out, ".{}", member_name)?;
                    }
                    crate::TypeInner::Vector { .. }
                    | crate::TypeInner::ValuePointer {
                        size: Some(_), ..
                    } => {
                        self.write_expr(base, ctx)?;
                        write!(self.out, ".{}", back::COMPONENTS[index as usize])?;
                    }
                    crate::TypeInner::Pointer { base: ptr_base, .. } => {
                        match self.module.types[ptr_base].inner {
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
                    _ => write!(self.out, "vec{}", size as u8)?,
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
            Ex::FunctionArgument(index) => match ctx.ty {
                back::FunctionType::EntryPoint(_) => {
                    match self.input_lookup.get(&(index, None)) {
                        Some(io) => write!(self.out, "{}", io.clone().as_str())?,
                        None => {
                            // a flattened struct argument used whole:
                            // reconstruct it positionally
                            let ty = ctx.fun.arguments[index as usize].ty;
                            let name = self.names[&NameKey::Type(ty)].clone();
                            let member_count = match self.module.types[ty].inner {
                                crate::TypeInner::Struct { ref members, .. } => members.len(),
                                _ => 0,
                            };
                            write!(self.out, "{}(", name)?;
                            for member_index in 0..member_count {
                                if member_index != 0 {
                                    write!(self.out, ", ")?;
                                }
                                let io = self
                                    .input_lookup
                                    .get(&(index, Some(member_index as u32)))
                                    .cloned()
                                    .ok_or_else(|| {
                                        Error::Custom(String::from(
                                            "missing flattened input member",
                                        ))
                                    })?;
                                write!(self.out, "{}", io.as_str())?;
                            }
                            write!(self.out, ")")?;
                        }
                    }
                }
                back::FunctionType::Function(handle) => {
                    let name = self.names[&NameKey::FunctionArgument(handle, index)].clone();
                    write!(self.out, "{}", name)?;
                }
            },
            Ex::GlobalVariable(handle) => {
                let name = self.names[&NameKey::GlobalVariable(handle)].clone();
                write!(self.out, "{}", name)?;
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
            Ex::ImageQuery { image, query } => self.write_image_query(image, query, ctx)?,
            Ex::Unary { op, expr: operand } => {
                let operand_kind = ctx
                    .resolution(operand)?
                    .inner_with(&self.module.types)
                    .scalar_kind();
                if op == crate::UnaryOperator::Negate
                    && operand_kind == Some(crate::ScalarKind::Sint)
                {
                    // negating INT_MIN overflows; run the guard
                    write!(self.out, "_glaive_neg(")?;
                    self.write_expr(operand, ctx)?;
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
                    self.write_expr(operand, ctx)?;
                    write!(self.out, ")")?;
                }
            }
            Ex::Binary { op, left, right } => {
                // modulo matches the source language's truncated semantics
                // through a helper, and integer division and remainder are
                // guarded against zero divisors
                let left_kind = ctx
                    .resolution(left)?
                    .inner_with(&self.module.types)
                    .scalar_kind();
                let helper = match (op, left_kind) {
                    (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Float))
                    | (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Sint))
                    | (crate::BinaryOperator::Modulo, Some(crate::ScalarKind::Uint)) => {
                        Some("_glaive_mod")
                    }
                    (crate::BinaryOperator::Divide, Some(crate::ScalarKind::Sint))
                    | (crate::BinaryOperator::Divide, Some(crate::ScalarKind::Uint)) => {
                        Some("_glaive_div")
                    }
                    _ => None,
                };
                match helper {
                    Some(fun_name) => {
                        write!(self.out, "{}(", fun_name)?;
                        self.write_expr(left, ctx)?;
                        write!(self.out, ", ")?;
                        self.write_expr(right, ctx)?;
                        write!(self.out, ")")?;
                    }
                    None => {
                        write!(self.out, "(")?;
                        self.write_expr(left, ctx)?;
                        write!(self.out, " {} ", binary_operation_str(op))?;
                        self.write_expr(right, ctx)?;
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
                self.write_expr(condition, ctx)?;
                write!(self.out, " ? ")?;
                self.write_expr(accept, ctx)?;
                write!(self.out, " : ")?;
                self.write_expr(reject, ctx)?;
                write!(self.out, ")")?;
            }
            Ex::Derivative { axis, expr: operand } => {
                let fun = match axis {
                    crate::DerivativeAxis::X => "dFdx",
                    crate::DerivativeAxis::Y => "dFdy",
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
            Ex::ArrayLength(pointer) => {
                write!(self.out, "uint(")?;
                self.write_expr(pointer, ctx)?;
                write!(self.out, ".length())")?;
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

    fn write_zero_value(&mut self, ty: Handle<crate::Type>) -> Result<(), Error> {
        match self.module.types[ty].inner {
            crate::TypeInner::Scalar { kind, .. } | crate::TypeInner::Atomic { kind, .. } => {
                match kind {
                    crate::ScalarKind::Sint => write!(self.out, "0")?,
                    crate::ScalarKind::Uint => write!(self.out, "0u")?,
                    crate::ScalarKind::Float => write!(self.out, "0.0")?,
                    crate::ScalarKind::Bool => write!(self.out, "false")?,
                }
            }
            ref other => {
                let other = other.clone();
                match other {
                    crate::TypeInner::Vector { .. } | crate::TypeInner::Matrix { .. } => {
                        self.write_value_inner(&other)?;
                        write!(self.out, "(0)")?;
                    }
                    crate::TypeInner::Struct { ref members, .. } => {
                        let members = members.clone();
                        let name = self.names[&NameKey::Type(ty)].clone();
                        write!(self.out, "{}(", name)?;
                        for (index, member) in members.iter().enumerate() {
                            if index != 0 {
                                write!(self.out, ", ")?;
                            }
                            self.write_zero_value(member.ty)?;
                        }
                        write!(self.out, ")")?;
                    }
                    _ => {
                        return Err(Error::Custom(format!(
                            "cannot build zero value of {:?}",
                            other
                        )))
                    }
                }
            }
        }
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
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        let image_var = global_expression(ctx.fun, image)?;
        let sampler_var = global_expression(ctx.fun, sampler)?;
        let combined = self.texture_names[&(image_var, Some(sampler_var))].clone();

        let fun_name = if gather.is_some() {
            if offset.is_some() {
                "textureGatherOffset"
            } else {
                "textureGather"
            }
        } else {
            match level {
                crate::SampleLevel::Auto | crate::SampleLevel::Bias(_) => {
                    if offset.is_some() {
                        "textureOffset"
                    } else {
                        "texture"
                    }
                }
                crate::SampleLevel::Zero | crate::SampleLevel::Exact(_) => {
                    if offset.is_some() {
                        "textureLodOffset"
                    } else {
                        "textureLod"
                    }
                }
                crate::SampleLevel::Gradient { .. } => {
                    if offset.is_some() {
                        "textureGradOffset"
                    } else {
                        "textureGrad"
                    }
                }
            }
        };

        write!(self.out, "{}({}, ", fun_name, combined)?;

        // A depth reference rides along as the last coordinate component.
        let coord_size = match *ctx.resolution(coordinate)?.inner_with(&self.module.types) {
            crate::TypeInner::Scalar { .. } => 1u8,
            crate::TypeInner::Vector { size, .. } => size as u8,
            _ => {
                return Err(Error::Custom(String::from(
                    "unexpected sample coordinate type",
                )))
            }
        };
        let extra = array_index.is_some() as u8 + depth_ref.is_some() as u8;
        if extra != 0 {
            write!(self.out, "vec{}(", coord_size + extra)?;
            self.write_expr(coordinate, ctx)?;
            if let Some(array_index) = array_index {
                write!(self.out, ", float(")?;
                self.write_expr(array_index, ctx)?;
                write!(self.out, ")")?;
            }
            if let Some(depth_ref) = depth_ref {
                write!(self.out, ", ")?;
                self.write_expr(depth_ref, ctx)?;
            }
            write!(self.out, ")")?;
        } else {
            self.write_expr(coordinate, ctx)?;
        }

        match level {
            crate::SampleLevel::Auto => {}
            crate::SampleLevel::Zero => {
                if gather.is_none() {
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

        if let Some(component) = gather {
            if depth_ref.is_none() {
                write!(self.out, ", {}", component as u8)?;
            }
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
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        let image_var = global_expression(ctx.fun, image)?;
        let class = match self.module.types[self.module.global_variables[image_var].ty].inner {
            crate::TypeInner::Image { class, .. } => class,
            _ => return Err(Error::Custom(String::from("image load of a non-image"))),
        };
        match class {
            crate::ImageClass::Storage { .. } => {
                let name = self.names[&NameKey::GlobalVariable(image_var)].clone();
                write!(self.out, "imageLoad({}, ", name)?;
                self.write_image_coordinate(coordinate, array_index, ctx)?;
                write!(self.out, ")")?;
            }
            _ => {
                let combined = self.texture_names[&(image_var, None)].clone();
                write!(self.out, "texelFetch({}, ", combined)?;
                self.write_image_coordinate(coordinate, array_index, ctx)?;
                if let Some(index) = index {
                    write!(self.out, ", ")?;
                    self.write_expr(index, ctx)?;
                } else {
                    write!(self.out, ", 0")?;
                }
                write!(self.out, ")")?;
            }
        }
        Ok(())
    }

    fn write_image_query(
        &mut self,
        image: Handle<crate::Expression>,
        query: crate::ImageQuery,
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        let image_var = global_expression(ctx.fun, image)?;
        let (arrayed, class, dim) =
            match self.module.types[self.module.global_variables[image_var].ty].inner {
                crate::TypeInner::Image {
                    dim,
                    arrayed,
                    class,
                } => (arrayed, class, dim),
                _ => return Err(Error::Custom(String::from("image query of a non-image"))),
            };
        let is_storage = match class {
            crate::ImageClass::Storage { .. } => true,
            _ => false,
        };
        let name = if is_storage {
            self.names[&NameKey::GlobalVariable(image_var)].clone()
        } else {
            self.texture_names[&(image_var, None)].clone()
        };
        let components = match dim {
            crate::ImageDimension::D1 => 1,
            crate::ImageDimension::D2 | crate::ImageDimension::Cube => 2,
            crate::ImageDimension::D3 => 3,
        };
        match query {
            crate::ImageQuery::Size { level } => {
                if components == 1 {
                    write!(self.out, "uint(")?;
                } else {
                    write!(self.out, "uvec{}(", components)?;
                }
                if is_storage {
                    write!(self.out, "imageSize({})", name)?;
                } else {
                    write!(self.out, "textureSize({}, ", name)?;
                    match level {
                        Some(level) => self.write_expr(level, ctx)?,
                        None => write!(self.out, "0")?,
                    }
                    write!(self.out, ")")?;
                }
                if arrayed || components < 3 {
                    // strip the layer component / pad nothing: swizzle the
                    // queried vector down to the image dimensionality
                    match components {
                        1 => {}
                        2 => write!(self.out, ".xy")?,
                        _ => write!(self.out, ".xyz")?,
                    }
                }
                write!(self.out, ")")?;
            }
            crate::ImageQuery::NumLevels => {
                write!(self.out, "uint(textureQueryLevels({}))", name)?;
            }
            crate::ImageQuery::NumLayers => {
                let comp = match components {
                    1 => "y",
                    2 => "z",
                    _ => "w",
                };
                write!(self.out, "uint(textureSize({}, 0).{})", name, comp)?;
            }
            crate::ImageQuery::NumSamples => {
                write!(self.out, "uint(textureSamples({}))", name)?;
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
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        use crate::MathFunction as Mf;
        let fun_name = match fun {
            Mf::Abs => {
                // `abs(INT_MIN)` overflows; run the guard
                if ctx
                    .resolution(arg)?
                    .inner_with(&self.module.types)
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
            Mf::Saturate => {
                write!(self.out, "clamp(")?;
                self.write_expr(arg, ctx)?;
                write!(self.out, ", 0.0, 1.0)")?;
                return Ok(());
            }
            Mf::Cos => "cos",
            Mf::Cosh => "cosh",
            Mf::Sin => "sin",
            Mf::Sinh => "sinh",
            Mf::Tan => "tan",
            Mf::Tanh => "tanh",
            Mf::Acos => "acos",
            Mf::Asin => "asin",
            Mf::Atan => "atan",
            Mf::Atan2 => "atan",
            Mf::Asinh => "asinh",
            Mf::Acosh => "acosh",
            Mf::Atanh => "atanh",
            Mf::Radians => "radians",
            Mf::Degrees => "degrees",
            Mf::Ceil => "ceil",
            Mf::Floor => "floor",
            Mf::Round => "roundEven",
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
            Mf::InverseSqrt => "inversesqrt",
            Mf::Transpose => "transpose",
            Mf::Determinant => "determinant",
            Mf::CountOneBits => "bitCount",
            Mf::ReverseBits => "bitfieldReverse",
            Mf::ExtractBits => "bitfieldExtract",
            Mf::InsertBits => "bitfieldInsert",
            Mf::FindLsb => "findLSB",
            Mf::FindMsb => "findMSB",
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

    fn write_cast(
        &mut self,
        expr: Handle<crate::Expression>,
        operand: Handle<crate::Expression>,
        kind: crate::ScalarKind,
        convert: Option<crate::Bytes>,
        ctx: &FunctionCtx,
    ) -> Result<(), Error> {
        use crate::ScalarKind as Sk;
        let source_kind = ctx
            .resolution(operand)?
            .inner_with(&self.module.types)
            .scalar_kind()
            .ok_or_else(|| Error::Custom(String::from("cast operand has no scalar kind")))?;
        match convert {
            Some(width) => {
                // 32-bit float-to-int casts run the clamping guard, so NaN
                // lands on zero instead of whatever the driver felt like
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
                    self.write_expr(operand, ctx)?;
                    write!(self.out, ")")?;
                    return Ok(());
                }
                // value conversion through a constructor; this also covers
                // booleans, whose numeric conversion is well defined in GLSL
                let inner = ctx
                    .resolution(expr)?
                    .inner_with(&self.module.types)
                    .clone();
                self.write_value_inner(&inner)?;
                write!(self.out, "(")?;
                self.write_expr(operand, ctx)?;
                write!(self.out, ")")?;
            }
            None => {
                let fun = match (source_kind, kind) {
                    (Sk::Float, Sk::Sint) => "floatBitsToInt",
                    (Sk::Float, Sk::Uint) => "floatBitsToUint",
                    (Sk::Sint, Sk::Float) => "intBitsToFloat",
                    (Sk::Uint, Sk::Float) => "uintBitsToFloat",
                    (x, y) if x == y => {
                        self.write_expr(operand, ctx)?;
                        return Ok(());
                    }
                    (Sk::Sint, Sk::Uint) | (Sk::Uint, Sk::Sint) => {
                        // reinterpreting int kinds is a value cast in GLSL
                        let inner = ctx
                            .resolution(expr)?
                            .inner_with(&self.module.types)
                            .clone();
                        self.write_value_inner(&inner)?;
                        write!(self.out, "(")?;
                        self.write_expr(operand, ctx)?;
                        write!(self.out, ")")?;
                        return Ok(());
                    }
                    (x, y) => return Err(Error::UnsupportedConversion(x, y)),
                };
                write!(self.out, "{}(", fun)?;
                self.write_expr(operand, ctx)?;
                write!(self.out, ")")?;
            }
        }
        Ok(())
    }
}

/// Helper to turn a constant's type into declaration text without borrowing
/// the writer output.
fn constant_type_string(writer: &mut Writer, handle: Handle<crate::Constant>) -> Result<String, Error> {
    let inner = match writer.module.constants[handle].inner {
        crate::ConstantInner::Scalar { ref value, width } => crate::TypeInner::Scalar {
            kind: value.scalar_kind(),
            width,
        },
        crate::ConstantInner::Composite { ty, .. } => {
            match writer.module.types[ty].inner {
                crate::TypeInner::Struct { .. } => {
                    return Ok(writer.names[&NameKey::Type(ty)].clone())
                }
                ref other => other.clone(),
            }
        }
    };
    let mut tmp = std::mem::take(&mut writer.out);
    writer.write_value_inner(&inner)?;
    std::mem::swap(&mut writer.out, &mut tmp);
    Ok(tmp)
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
fn write_vector_overloads(
    out: &mut String,
    name: &str,
    ret_prefix: &str,
    arg_prefix: &str,
    two_args: bool,
) -> Result<(), FmtError> {
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

/// The global variable behind an image or sampler expression.
///
/// The combining analysis is intraprocedural: a texture or sampler flowing
/// through function arguments is not supported.
fn global_expression(
    fun: &crate::Function,
    expr: Handle<crate::Expression>,
) -> Result<Handle<crate::GlobalVariable>, Error> {
    match fun.expressions[expr] {
        crate::Expression::GlobalVariable(handle) => Ok(handle),
        _ => Err(Error::Custom(String::from(
            "images and samplers must be referenced as globals",
        ))),
    }
}

/// Whether a block is guaranteed to leave the enclosing switch, making a
/// trailing `break;` unreachable.
fn block_ends_control_flow(block: &crate::Block) -> bool {
    match block.last() {
        Some(&crate::Statement::Break)
        | Some(&crate::Statement::Continue)
        | Some(&crate::Statement::Return { .. })
        | Some(&crate::Statement::Kill) => true,
        _ => false,
    }
}

/// Iterate over every statement in a block tree.
fn all_statements(block: &crate::Block) -> Vec<&crate::Statement> {
    let mut out = Vec::new();
    collect_statements(block, &mut out);
    out
}

fn collect_statements<'a>(block: &'a crate::Block, out: &mut Vec<&'a crate::Statement>) {
    for statement in block.iter() {
        out.push(statement);
        match *statement {
            crate::Statement::Block(ref b) => collect_statements(b, out),
            crate::Statement::If {
                ref accept,
                ref reject,
                ..
            } => {
                collect_statements(accept, out);
                collect_statements(reject, out);
            }
            crate::Statement::Switch {
                ref cases,
                ref default,
                ..
            } => {
                for case in cases.iter() {
                    collect_statements(&case.body, out);
                }
                collect_statements(default, out);
            }
            crate::Statement::Loop {
                ref body,
                ref continuing,
                ..
            } => {
                collect_statements(body, out);
                collect_statements(continuing, out);
            }
            _ => {}
        }
    }
}

fn storage_format_str(format: crate::StorageFormat) -> &'static str {
    use crate::StorageFormat as Sf;
    match format {
        Sf::R8Unorm => "r8",
        Sf::R8Snorm => "r8_snorm",
        Sf::R8Uint => "r8ui",
        Sf::R8Sint => "r8i",
        Sf::R16Uint => "r16ui",
        Sf::R16Sint => "r16i",
        Sf::R16Float => "r16f",
        Sf::Rg8Unorm => "rg8",
        Sf::Rg8Snorm => "rg8_snorm",
        Sf::Rg8Uint => "rg8ui",
        Sf::Rg8Sint => "rg8i",
        Sf::R32Uint => "r32ui",
        Sf::R32Sint => "r32i",
        Sf::R32Float => "r32f",
        Sf::Rg16Uint => "rg16ui",
        Sf::Rg16Sint => "rg16i",
        Sf::Rg16Float => "rg16f",
        Sf::Rgba8Unorm => "rgba8",
        Sf::Rgba8Snorm => "rgba8_snorm",
        Sf::Rgba8Uint => "rgba8ui",
        Sf::Rgba8Sint => "rgba8i",
        Sf::Rgb10a2Unorm => "rgb10_a2",
        Sf::Rg11b10Float => "r11f_g11f_b10f",
        Sf::Rg32Uint => "rg32ui",
        Sf::Rg32Sint => "rg32i",
        Sf::Rg32Float => "rg32f",
        Sf::Rgba16Uint => "rgba16ui",
        Sf::Rgba16Sint => "rgba16i",
        Sf::Rgba16Float => "rgba16f",
        Sf::Rgba32Uint => "rgba32ui",
        Sf::Rgba32Sint => "rgba32i",
        Sf::Rgba32Float => "rgba32f",
    }
}
