/*! Standard Portable Intermediate Representation (SPIR-V) backend
!*/

mod block;
mod help;
mod helpers;
mod image;
mod instructions;
mod layout;
mod writer;

pub use spirv::Capability;

use crate::arena::Handle;

use spirv::Word;
use std::ops;
use thiserror::Error;

struct PhysicalLayout {
    magic_number: Word,
    version: Word,
    generator: Word,
    bound: Word,
    instruction_schema: Word,
}

#[derive(Default)]
struct LogicalLayout {
    capabilities: Vec<Word>,
    extensions: Vec<Word>,
    ext_inst_imports: Vec<Word>,
    memory_model: Vec<Word>,
    entry_points: Vec<Word>,
    execution_modes: Vec<Word>,
    debugs: Vec<Word>,
    annotations: Vec<Word>,
    declarations: Vec<Word>,
    function_declarations: Vec<Word>,
    function_definitions: Vec<Word>,
}

struct Instruction {
    op: spirv::Op,
    wc: u32,
    type_id: Option<Word>,
    result_id: Option<Word>,
    operands: Vec<Word>,
}

const BITS_PER_BYTE: crate::Bytes = 8;

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Handle(#[from] crate::arena::BadHandle),
    #[error("target SPIRV-{0}.{1} is not supported")]
    UnsupportedVersion(u8, u8),
    #[error("one of the required capabilities {0:?} is missing")]
    MissingCapabilities(Vec<Capability>),
    #[error("unimplemented {0}")]
    FeatureNotImplemented(&'static str),
    #[error("module is not validated properly: {0}")]
    Validation(&'static str),
}

#[derive(Default)]
struct IdGenerator(Word);

impl IdGenerator {
    fn next(&mut self) -> Word {
        self.0 += 1;
        self.0
    }
}

struct Block {
    label_id: Word,
    body: Vec<Instruction>,
    termination: Option<Instruction>,
}

impl Block {
    fn new(label_id: Word) -> Self {
        Block {
            label_id,
            body: Vec::new(),
            termination: None,
        }
    }
}

struct LocalVariable {
    id: Word,
    instruction: Instruction,
}

struct ResultMember {
    id: Word,
    type_id: Word,
    built_in: Option<crate::BuiltIn>,
}

struct EntryPointContext {
    argument_ids: Vec<Word>,
    results: Vec<ResultMember>,
}

/// A local variable initializer that contains call results, waiting for the
/// owning calls to be made.
///
/// The whole initializer tree is scanned for call results up front;
/// processing only the first one found would trigger a premature store and
/// lose the remaining results.
struct PendingLocalInit {
    local: Handle<crate::LocalVariable>,
    root: Handle<crate::Expression>,
    call_results: Vec<Handle<crate::Expression>>,
}

#[derive(Default)]
struct Function {
    signature: Option<Instruction>,
    parameters: Vec<Instruction>,
    variables: crate::FastHashMap<Handle<crate::LocalVariable>, LocalVariable>,
    blocks: Vec<Block>,
    entry_point_context: Option<EntryPointContext>,
    pending_inits: Vec<PendingLocalInit>,
}

impl Function {
    fn consume(&mut self, mut block: Block, termination: Instruction) {
        block.termination = Some(termination);
        self.blocks.push(block);
    }

    fn parameter_id(&self, index: u32) -> Word {
        match self.entry_point_context {
            Some(ref context) => context.argument_ids[index as usize],
            None => self.parameters[index as usize].result_id.unwrap(),
        }
    }

    fn to_words(&self, sink: &mut impl Extend<Word>) {
        self.signature.as_ref().unwrap().to_words(sink);
        for instruction in self.parameters.iter() {
            instruction.to_words(sink);
        }
        for (index, block) in self.blocks.iter().enumerate() {
            instructions::instruction_label(block.label_id).to_words(sink);
            if index == 0 {
                // All `OpVariable`s belong to the entry block, even when the
                // IR introduced the local inside a branch.
                let mut variables: Vec<_> = self.variables.iter().collect();
                variables.sort_by_key(|&(&handle, _)| handle);
                for (_, var) in variables {
                    var.instruction.to_words(sink);
                }
            }
            for instruction in block.body.iter() {
                instruction.to_words(sink);
            }
            block.termination.as_ref().unwrap().to_words(sink);
        }
    }
}

/// A SPIR-V type constructed during code generation.
///
/// In the process of writing SPIR-V, we need to synthesize various types for
/// intermediate results and such. However, it's inconvenient to use
/// `crate::Type` or `crate::TypeInner` for these, as the IR module is immutable
/// so we can't ever create a `Handle<Type>` to refer to them. So for local use
/// in the SPIR-V writer, we have this home-grown type enum that covers only the
/// cases we need (for example, it doesn't cover structs).
#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone)]
enum LocalType {
    /// A scalar, vector, or pointer to one of those.
    Value {
        /// If `None`, this represents a scalar type. If `Some`, this represents
        /// a vector type of the given size.
        vector_size: Option<crate::VectorSize>,
        kind: crate::ScalarKind,
        width: crate::Bytes,
        pointer_class: Option<spirv::StorageClass>,
    },
    /// A matrix of floating-point values.
    Matrix {
        columns: crate::VectorSize,
        rows: crate::VectorSize,
        width: crate::Bytes,
    },
    Pointer {
        base: Handle<crate::Type>,
        class: spirv::StorageClass,
    },
    Image {
        dim: crate::ImageDimension,
        arrayed: bool,
        class: crate::ImageClass,
    },
    SampledImage {
        image_type_id: Word,
    },
    Sampler,
}

#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone)]
enum LookupType {
    Handle(Handle<crate::Type>),
    Local(LocalType),
}

impl From<LocalType> for LookupType {
    fn from(local: LocalType) -> Self {
        Self::Local(local)
    }
}

#[derive(Debug, PartialEq, Clone, Hash, Eq)]
struct LookupFunctionType {
    parameter_type_ids: Vec<Word>,
    return_type_id: Word,
}

/// One of the `_glaive_*` guard functions: operations whose native opcode is
/// undefined on some inputs (division by zero, `INT_MIN` negation, NaN
/// conversion) get a tiny function wrapping the guarded sequence.
#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone)]
enum HelperOp {
    Div,
    Mod,
    Abs,
    Neg,
    F2I32,
    F2U32,
}

impl HelperOp {
    fn debug_name(self) -> &'static str {
        match self {
            HelperOp::Div => "_glaive_div",
            HelperOp::Mod => "_glaive_mod",
            HelperOp::Abs => "_glaive_abs",
            HelperOp::Neg => "_glaive_neg",
            HelperOp::F2I32 => "_glaive_f2i32",
            HelperOp::F2U32 => "_glaive_f2u32",
        }
    }
}

/// The shape a guard function is instantiated for.
#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone)]
struct HelperKey {
    op: HelperOp,
    /// Scalar kind of the result.
    kind: crate::ScalarKind,
    width: crate::Bytes,
    vector_size: Option<crate::VectorSize>,
}

/// A cached scalar constant, keyed by raw bits so that floats can be hashed.
#[derive(Debug, PartialEq, Hash, Eq, Copy, Clone)]
enum CachedConstant {
    Sint(i64, crate::Bytes),
    Uint(u64, crate::Bytes),
    Float(u64, crate::Bytes),
    Bool(bool),
}

impl CachedConstant {
    fn new(value: &crate::ScalarValue, width: crate::Bytes) -> Self {
        match *value {
            crate::ScalarValue::Sint(v) => CachedConstant::Sint(v, width),
            crate::ScalarValue::Uint(v) => CachedConstant::Uint(v, width),
            crate::ScalarValue::Float(v) => CachedConstant::Float(v.to_bits(), width),
            crate::ScalarValue::Bool(v) => CachedConstant::Bool(v),
        }
    }
}

#[derive(Default)]
struct CachedExpressions {
    ids: Vec<Word>,
}
impl CachedExpressions {
    fn reset(&mut self, length: usize) {
        self.ids.clear();
        self.ids.resize(length, 0);
    }
    fn contains(&self, h: Handle<crate::Expression>) -> bool {
        self.ids[h.index()] != 0
    }
}
impl ops::Index<Handle<crate::Expression>> for CachedExpressions {
    type Output = Word;
    fn index(&self, h: Handle<crate::Expression>) -> &Word {
        let id = &self.ids[h.index()];
        if *id == 0 {
            unreachable!("Expression {:?} is not cached!", h);
        }
        id
    }
}
impl ops::IndexMut<Handle<crate::Expression>> for CachedExpressions {
    fn index_mut(&mut self, h: Handle<crate::Expression>) -> &mut Word {
        let id = &mut self.ids[h.index()];
        if *id != 0 {
            unreachable!("Expression {:?} is already cached!", h);
        }
        id
    }
}

struct GlobalVariable {
    /// Actual ID of the variable.
    id: Word,
    /// For `AddressSpace::Handle` variables, this ID is recorded in the
    /// function prelude block (and reset before every function) as `OpLoad`
    /// of the variable. It is then used for all the global ops, such as
    /// `OpImageSample`.
    handle_id: Word,
    /// True for storage buffers whose bare runtime-sized array type got
    /// wrapped in a synthetic struct, so that `OpArrayLength` has a struct
    /// operand to work on. Access chains into such globals gain a leading
    /// zero index.
    wrapped: bool,
}

pub struct Writer {
    physical_layout: PhysicalLayout,
    logical_layout: LogicalLayout,
    lang_version: (u8, u8),
    id_gen: IdGenerator,
    capabilities: crate::FastHashSet<Capability>,
    allowed_caps: Option<crate::FastHashSet<Capability>>,
    debugs: Vec<Instruction>,
    annotations: Vec<Instruction>,
    flags: WriterFlags,
    void_type: Word,
    //TODO: convert most of these into vectors, addressable by handle indices
    lookup_type: crate::FastHashMap<LookupType, Word>,
    lookup_function: crate::FastHashMap<Handle<crate::Function>, Word>,
    lookup_function_type: crate::FastHashMap<LookupFunctionType, Word>,
    constant_ids: Vec<Word>,
    cached_constants: crate::FastHashMap<CachedConstant, Word>,
    cached_nulls: crate::FastHashMap<Word, Word>,
    cached_helpers: crate::FastHashMap<HelperKey, Word>,
    global_variables: Vec<GlobalVariable>,
    cached: CachedExpressions,
    gl450_ext_inst_id: Word,
}

bitflags::bitflags! {
    pub struct WriterFlags: u32 {
        /// Include debug labels for everything.
        const DEBUG = 0x1;
        /// Flip Y coordinate of `BuiltIn::Position` output.
        const ADJUST_COORDINATE_SPACE = 0x2;
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    /// (Major, Minor) target version of the SPIR-V.
    pub lang_version: (u8, u8),
    /// Configuration flags for the writer.
    pub flags: WriterFlags,
    /// Set of SPIR-V capabilities the target allows, if restricted.
    pub capabilities: Option<crate::FastHashSet<Capability>>,
}

impl Default for Options {
    fn default() -> Self {
        let mut flags = WriterFlags::ADJUST_COORDINATE_SPACE;
        if cfg!(debug_assertions) {
            flags |= WriterFlags::DEBUG;
        }
        Options {
            lang_version: (1, 0),
            flags,
            capabilities: None,
        }
    }
}

pub fn write_vec(module: &crate::Module, options: &Options) -> Result<Vec<u32>, Error> {
    let mut words = Vec::new();
    let mut w = Writer::new(options)?;
    w.write(module, &mut words)?;
    Ok(words)
}
