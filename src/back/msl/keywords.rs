//! Reserved identifiers of the Metal Shading Language.
//!
//! MSL is a C++14 dialect, so the C++ keyword set applies, plus the Metal
//! standard library names that live in the global namespace once
//! `using namespace metal;` is in effect. Regenerate from the language
//! specification when a new version is adopted; entries are never added at
//! runtime.

pub const RESERVED: &[&str] = &[
    // C++ keywords
    "alignas",
    "alignof",
    "and",
    "and_eq",
    "asm",
    "auto",
    "bitand",
    "bitor",
    "bool",
    "break",
    "case",
    "catch",
    "char",
    "char16_t",
    "char32_t",
    "class",
    "compl",
    "const",
    "constexpr",
    "const_cast",
    "continue",
    "decltype",
    "default",
    "delete",
    "do",
    "double",
    "dynamic_cast",
    "else",
    "enum",
    "explicit",
    "export",
    "extern",
    "false",
    "float",
    "for",
    "friend",
    "goto",
    "if",
    "inline",
    "int",
    "long",
    "mutable",
    "namespace",
    "new",
    "noexcept",
    "not",
    "not_eq",
    "nullptr",
    "operator",
    "or",
    "or_eq",
    "private",
    "protected",
    "public",
    "register",
    "reinterpret_cast",
    "return",
    "short",
    "signed",
    "sizeof",
    "static",
    "static_assert",
    "static_cast",
    "struct",
    "switch",
    "template",
    "this",
    "thread_local",
    "throw",
    "true",
    "try",
    "typedef",
    "typeid",
    "typename",
    "union",
    "unsigned",
    "using",
    "virtual",
    "void",
    "volatile",
    "wchar_t",
    "while",
    "xor",
    "xor_eq",
    // Metal address space and function qualifiers
    "device",
    "constant",
    "threadgroup",
    "threadgroup_imageblock",
    "kernel",
    "vertex",
    "fragment",
    "ray_data",
    "object_data",
    // Metal types
    "uint",
    "uchar",
    "ushort",
    "ulong",
    "half",
    "bool2",
    "bool3",
    "bool4",
    "char2",
    "char3",
    "char4",
    "uchar2",
    "uchar3",
    "uchar4",
    "short2",
    "short3",
    "short4",
    "ushort2",
    "ushort3",
    "ushort4",
    "int2",
    "int3",
    "int4",
    "uint2",
    "uint3",
    "uint4",
    "long2",
    "long3",
    "long4",
    "ulong2",
    "ulong3",
    "ulong4",
    "half2",
    "half3",
    "half4",
    "float2",
    "float3",
    "float4",
    "half2x2",
    "half2x3",
    "half2x4",
    "half3x2",
    "half3x3",
    "half3x4",
    "half4x2",
    "half4x3",
    "half4x4",
    "float2x2",
    "float2x3",
    "float2x4",
    "float3x2",
    "float3x3",
    "float3x4",
    "float4x2",
    "float4x3",
    "float4x4",
    "sampler",
    "texture1d",
    "texture1d_array",
    "texture2d",
    "texture2d_array",
    "texture2d_ms",
    "texture2d_ms_array",
    "texture3d",
    "texturecube",
    "texturecube_array",
    "depth2d",
    "depth2d_array",
    "depth2d_ms",
    "depth2d_ms_array",
    "depthcube",
    "depthcube_array",
    "atomic_int",
    "atomic_uint",
    "atomic_bool",
    "atomic_ulong",
    "atomic_float",
    "ptrdiff_t",
    "size_t",
    // Metal standard library functions
    "abs",
    "absdiff",
    "acos",
    "acosh",
    "all",
    "any",
    "asin",
    "asinh",
    "as_type",
    "atan",
    "atan2",
    "atanh",
    "atomic_compare_exchange_weak_explicit",
    "atomic_exchange_explicit",
    "atomic_fetch_add_explicit",
    "atomic_fetch_and_explicit",
    "atomic_fetch_max_explicit",
    "atomic_fetch_min_explicit",
    "atomic_fetch_or_explicit",
    "atomic_fetch_sub_explicit",
    "atomic_fetch_xor_explicit",
    "atomic_load_explicit",
    "atomic_store_explicit",
    "ceil",
    "clamp",
    "cos",
    "cosh",
    "cross",
    "determinant",
    "dfdx",
    "dfdy",
    "discard_fragment",
    "distance",
    "dot",
    "exp",
    "exp2",
    "extract_bits",
    "faceforward",
    "floor",
    "fma",
    "fmax",
    "fmin",
    "fmod",
    "fract",
    "frexp",
    "fwidth",
    "insert_bits",
    "isinf",
    "isnan",
    "ldexp",
    "length",
    "log",
    "log2",
    "main",
    "max",
    "metal",
    "min",
    "mix",
    "modf",
    "normalize",
    "popcount",
    "pow",
    "radians",
    "reflect",
    "refract",
    "reverse_bits",
    "rint",
    "round",
    "rsqrt",
    "saturate",
    "select",
    "sign",
    "simd",
    "sin",
    "sinh",
    "smoothstep",
    "sqrt",
    "step",
    "tan",
    "tanh",
    "threadgroup_barrier",
    "transpose",
    "trunc",
];
