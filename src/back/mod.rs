//! Functions which export shader modules into binary and text formats.

#[cfg(feature = "glsl-out")]
pub mod glsl;
#[cfg(feature = "hlsl-out")]
pub mod hlsl;
#[cfg(feature = "msl-out")]
pub mod msl;
#[cfg(feature = "spv-out")]
pub mod spv;

/// Names of vector components.
#[allow(dead_code)]
pub(crate) const COMPONENTS: &[char] = &['x', 'y', 'z', 'w'];
/// Indent for backends.
#[allow(dead_code)]
pub(crate) const INDENT: &str = "    ";
/// Prefix used for baked expression temporaries.
#[allow(dead_code)]
pub(crate) const BAKE_PREFIX: &str = "_e";

/// Indentation level.
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub(crate) struct Level(pub usize);

#[allow(dead_code)]
impl Level {
    pub fn next(&self) -> Self {
        Level(self.0 + 1)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (0..self.0).try_for_each(|_| formatter.write_str(INDENT))
    }
}

/// Whether the function being emitted is a regular function or an entry point.
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub(crate) enum FunctionType {
    Function(crate::Handle<crate::Function>),
    EntryPoint(crate::proc::EntryPointIndex),
}

#[allow(dead_code)]
impl FunctionType {
    pub fn is_entry_point(&self) -> bool {
        match *self {
            FunctionType::Function(_) => false,
            FunctionType::EntryPoint(_) => true,
        }
    }
}

impl crate::Expression {
    /// How many references to this expression should be considered "plenty",
    /// making a text backend bake it into a named temporary.
    ///
    /// Image and derivative operations are order-sensitive, so they bake on
    /// first use.
    #[allow(dead_code)]
    pub(crate) fn bake_ref_count(&self) -> u32 {
        match *self {
            // these are costly or order-sensitive
            crate::Expression::ImageSample { .. }
            | crate::Expression::ImageLoad { .. }
            | crate::Expression::Derivative { .. } => 1,
            // the rest are fine to duplicate once
            _ => 2,
        }
    }

    /// Expressions that are trivial to reference and never need a temporary.
    #[allow(dead_code)]
    pub(crate) fn is_trivial(&self) -> bool {
        match *self {
            crate::Expression::Literal(_)
            | crate::Expression::Constant(_)
            | crate::Expression::ZeroValue(_)
            | crate::Expression::FunctionArgument(_)
            | crate::Expression::GlobalVariable(_)
            | crate::Expression::LocalVariable(_) => true,
            _ => false,
        }
    }
}

/// Textual forms of the binary operators shared by all text targets.
#[allow(dead_code)]
pub(crate) fn binary_operation_str(op: crate::BinaryOperator) -> &'static str {
    use crate::BinaryOperator as Bo;
    match op {
        Bo::Add => "+",
        Bo::Subtract => "-",
        Bo::Multiply => "*",
        Bo::Divide => "/",
        Bo::Modulo => "%",
        Bo::Equal => "==",
        Bo::NotEqual => "!=",
        Bo::Less => "<",
        Bo::LessEqual => "<=",
        Bo::Greater => ">",
        Bo::GreaterEqual => ">=",
        Bo::And => "&",
        Bo::ExclusiveOr => "^",
        Bo::InclusiveOr => "|",
        Bo::LogicalAnd => "&&",
        Bo::LogicalOr => "||",
        Bo::ShiftLeft => "<<",
        Bo::ShiftRight => ">>",
    }
}

/// Textual form of a vector size.
#[allow(dead_code)]
pub(crate) fn vector_size_str(size: crate::VectorSize) -> &'static str {
    match size {
        crate::VectorSize::Bi => "2",
        crate::VectorSize::Tri => "3",
        crate::VectorSize::Quad => "4",
    }
}

/// The scalar kind a storage format resolves to when loaded.
#[allow(dead_code)]
pub(crate) fn storage_format_kind(format: crate::StorageFormat) -> crate::ScalarKind {
    use crate::StorageFormat as Sf;
    match format {
        Sf::R8Uint
        | Sf::R16Uint
        | Sf::Rg8Uint
        | Sf::R32Uint
        | Sf::Rg16Uint
        | Sf::Rgba8Uint
        | Sf::Rg32Uint
        | Sf::Rgba16Uint
        | Sf::Rgba32Uint => crate::ScalarKind::Uint,
        Sf::R8Sint
        | Sf::R16Sint
        | Sf::Rg8Sint
        | Sf::R32Sint
        | Sf::Rg16Sint
        | Sf::Rgba8Sint
        | Sf::Rg32Sint
        | Sf::Rgba16Sint
        | Sf::Rgba32Sint => crate::ScalarKind::Sint,
        _ => crate::ScalarKind::Float,
    }
}
