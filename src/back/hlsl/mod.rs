/*! High-Level Shading Language (HLSL) backend

## Binding model

Each IR resource carries a `(group, binding)` pair. By default that maps to
`register(<class><binding>, space<group>)`; a user-supplied [`BindingMap`]
overrides the mapping per resource. The register class is derived from what
the resource is: `b` for constant buffers, `t` for shader resource views,
`u` for unordered access views, `s` for samplers.

## Entry points

All entry points of the module are written, under their IR names. Struct
arguments with per-member bindings are flattened into an `<entry>_Input`
struct with one semantic-annotated field per member; the body reconstructs
the original struct value before running the IR statements. Struct results
are handled symmetrically through an `<entry>_Output` struct.

## Storage buffers

A storage global that is a runtime-sized array lowers to a
`(RW)StructuredBuffer<T>`; a storage struct without a runtime-sized member
lowers to a single-element `(RW)StructuredBuffer` addressed as `name[0]`.
A struct with a trailing runtime-sized member has no structured-buffer
equivalent and is reported as unsupported.
!*/

mod help;
mod keywords;
mod writer;

use std::fmt::{self, Error as FmtError};
use thiserror::Error;

pub use writer::Writer;

/// A HLSL shader model version.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ShaderModel {
    pub major: u8,
    pub minor: u8,
}

pub const SUPPORTED_SHADER_MODELS: &[ShaderModel] = &[
    ShaderModel { major: 5, minor: 0 },
    ShaderModel { major: 5, minor: 1 },
    ShaderModel { major: 6, minor: 0 },
    ShaderModel { major: 6, minor: 1 },
    ShaderModel { major: 6, minor: 2 },
    ShaderModel { major: 6, minor: 3 },
    ShaderModel { major: 6, minor: 4 },
    ShaderModel { major: 6, minor: 5 },
    ShaderModel { major: 6, minor: 6 },
    ShaderModel { major: 6, minor: 7 },
];

impl Default for ShaderModel {
    fn default() -> Self {
        ShaderModel { major: 5, minor: 1 }
    }
}

impl fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl ShaderModel {
    /// Whether `register(.., spaceN)` syntax is available.
    fn supports_spaces(&self) -> bool {
        *self >= ShaderModel { major: 5, minor: 1 }
    }
}

/// The register class of a resource.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RegisterClass {
    /// `b` registers: constant buffers.
    ConstantBuffer,
    /// `t` registers: read-only views.
    ShaderResource,
    /// `u` registers: read-write views.
    UnorderedAccess,
    /// `s` registers: samplers.
    Sampler,
}

impl RegisterClass {
    fn prefix(self) -> char {
        match self {
            RegisterClass::ConstantBuffer => 'b',
            RegisterClass::ShaderResource => 't',
            RegisterClass::UnorderedAccess => 'u',
            RegisterClass::Sampler => 's',
        }
    }
}

/// The register a resource ends up in.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct BindTarget {
    pub space: u8,
    pub register: u32,
}

/// A `(group, binding)` to register mapping, ordered for deterministic
/// output.
pub type BindingMap = std::collections::BTreeMap<crate::ResourceBinding, BindTarget>;

#[derive(Debug, Clone)]
pub struct Options {
    /// The shader model to target.
    pub shader_model: ShaderModel,
    /// Optional overrides of the default `register = binding, space = group`
    /// allocation.
    pub binding_map: BindingMap,
    /// Don't fail on a resource without a binding, invent one instead.
    pub fake_missing_bindings: bool,
    /// Zero out workgroup memory at the top of compute entry points, as
    /// Direct3D does not do it for us.
    pub zero_initialize_workgroup_memory: bool,
    /// Clamp dynamic indices into fixed-size arrays.
    pub restrict_indexing: bool,
    /// Bound every loop with a decrementing counter, defeating driver
    /// hangs on loops the compiler cannot prove finite.
    pub force_loop_bounding: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            shader_model: ShaderModel::default(),
            binding_map: BindingMap::default(),
            fake_missing_bindings: false,
            zero_initialize_workgroup_memory: true,
            restrict_indexing: true,
            force_loop_bounding: false,
        }
    }
}

impl Options {
    fn resolve_resource_binding(
        &self,
        var_handle: crate::Handle<crate::GlobalVariable>,
        res_binding: Option<&crate::ResourceBinding>,
    ) -> Result<BindTarget, Error> {
        match res_binding {
            Some(res_binding) => match self.binding_map.get(res_binding) {
                Some(&target) => Ok(target),
                None => Ok(BindTarget {
                    space: res_binding.group as u8,
                    register: res_binding.binding,
                }),
            },
            None if self.fake_missing_bindings => Ok(BindTarget {
                space: 0,
                register: 0,
            }),
            None => Err(Error::MissingBinding(var_handle)),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    FmtError(#[from] FmtError),
    #[error(transparent)]
    Handle(#[from] crate::arena::BadHandle),
    #[error("shader model {0} is not supported")]
    UnsupportedShaderModel(ShaderModel),
    #[error("global {0:?} has no binding and faking bindings is off")]
    MissingBinding(crate::Handle<crate::GlobalVariable>),
    #[error("cannot bitcast {0:?} to {1:?}")]
    UnsupportedConversion(crate::ScalarKind, crate::ScalarKind),
    #[error("{0} is not supported by the target")]
    Unimplemented(String),
    #[error("{0}")]
    Custom(String),
}

/// Structured information about the translation, for the embedding layer.
#[derive(Debug, Default)]
pub struct ReflectionInfo {
    /// Mapping of IR entry point names to the emitted function names.
    pub entry_point_names: crate::FastHashMap<String, String>,
    /// The register each resource landed in.
    pub resource_registers: crate::FastHashMap<crate::Handle<crate::GlobalVariable>, BindTarget>,
    /// Names of the polyfill helper functions that were emitted.
    pub helpers_emitted: Vec<String>,
    /// The register of the dispatch-size constant buffer, when the module
    /// reads `NumWorkGroups`. The embedder must fill it at dispatch time.
    pub num_workgroups_register: Option<BindTarget>,
}

/// Translate a module into HLSL source.
pub fn write_string(
    module: &crate::Module,
    options: &Options,
) -> Result<(String, ReflectionInfo), Error> {
    let mut writer = Writer::new(module, options)?;
    let info = writer.write()?;
    Ok((writer.finish(), info))
}
