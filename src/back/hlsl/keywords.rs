//! Reserved identifiers of the High-Level Shading Language.
//!
//! Collected from the keyword tables of the fxc and dxc compilers, plus the
//! intrinsic function names. The legacy effect-framework words are matched
//! case-insensitively by the compilers, so they get their own table.
//! Regenerate from the language documentation when a new shader model is
//! adopted; entries are never added at runtime.

pub const RESERVED: &[&str] = &[
    // keywords
    "AppendStructuredBuffer",
    "BlendState",
    "Buffer",
    "ByteAddressBuffer",
    "CompileShader",
    "ComputeShader",
    "ConsumeStructuredBuffer",
    "ConstantBuffer",
    "DepthStencilState",
    "DepthStencilView",
    "DomainShader",
    "GeometryShader",
    "Hullshader",
    "InputPatch",
    "LineStream",
    "OutputPatch",
    "PointStream",
    "RWBuffer",
    "RWByteAddressBuffer",
    "RWStructuredBuffer",
    "RWTexture1D",
    "RWTexture1DArray",
    "RWTexture2D",
    "RWTexture2DArray",
    "RWTexture3D",
    "RasterizerState",
    "RenderTargetView",
    "SamplerComparisonState",
    "SamplerState",
    "StructuredBuffer",
    "Texture1D",
    "Texture1DArray",
    "Texture2D",
    "Texture2DArray",
    "Texture2DMS",
    "Texture2DMSArray",
    "Texture3D",
    "TextureCube",
    "TextureCubeArray",
    "TriangleStream",
    "break",
    "case",
    "cbuffer",
    "centroid",
    "class",
    "column_major",
    "compile",
    "compile_fragment",
    "const",
    "continue",
    "default",
    "discard",
    "do",
    "else",
    "export",
    "extern",
    "for",
    "fxgroup",
    "globallycoherent",
    "groupshared",
    "if",
    "in",
    "inline",
    "inout",
    "interface",
    "line",
    "lineadj",
    "linear",
    "namespace",
    "nointerpolation",
    "noperspective",
    "out",
    "packoffset",
    "point",
    "precise",
    "register",
    "return",
    "row_major",
    "sample",
    "sampler_state",
    "shared",
    "snorm",
    "stateblock",
    "stateblock_state",
    "static",
    "struct",
    "switch",
    "tbuffer",
    "triangle",
    "triangleadj",
    "typedef",
    "uniform",
    "unorm",
    "unsigned",
    "volatile",
    "while",
    // scalar and vector types
    "bool",
    "int",
    "uint",
    "dword",
    "half",
    "float",
    "double",
    "min16float",
    "min10float",
    "min16int",
    "min12int",
    "min16uint",
    "int16_t",
    "int32_t",
    "int64_t",
    "uint16_t",
    "uint32_t",
    "uint64_t",
    "float16_t",
    "float32_t",
    "float64_t",
    "void",
    "bool1",
    "bool2",
    "bool3",
    "bool4",
    "int1",
    "int2",
    "int3",
    "int4",
    "uint1",
    "uint2",
    "uint3",
    "uint4",
    "half1",
    "half2",
    "half3",
    "half4",
    "float1",
    "float2",
    "float3",
    "float4",
    "double1",
    "double2",
    "double3",
    "double4",
    "float1x1",
    "float1x2",
    "float1x3",
    "float1x4",
    "float2x1",
    "float2x2",
    "float2x3",
    "float2x4",
    "float3x1",
    "float3x2",
    "float3x3",
    "float3x4",
    "float4x1",
    "float4x2",
    "float4x3",
    "float4x4",
    "double2x2",
    "double3x3",
    "double4x4",
    "int2x2",
    "int3x3",
    "int4x4",
    "uint2x2",
    "uint3x3",
    "uint4x4",
    // reserved for future use
    "auto",
    "catch",
    "char",
    "const_cast",
    "delete",
    "dynamic_cast",
    "enum",
    "explicit",
    "friend",
    "goto",
    "long",
    "mutable",
    "new",
    "operator",
    "private",
    "protected",
    "public",
    "reinterpret_cast",
    "short",
    "signed",
    "sizeof",
    "static_cast",
    "template",
    "this",
    "throw",
    "try",
    "typename",
    "union",
    "using",
    "virtual",
    // intrinsic functions
    "abort",
    "abs",
    "acos",
    "all",
    "any",
    "asdouble",
    "asfloat",
    "asin",
    "asint",
    "asuint",
    "atan",
    "atan2",
    "ceil",
    "clamp",
    "clip",
    "cos",
    "cosh",
    "countbits",
    "cross",
    "ddx",
    "ddx_coarse",
    "ddx_fine",
    "ddy",
    "ddy_coarse",
    "ddy_fine",
    "degrees",
    "determinant",
    "distance",
    "dot",
    "dst",
    "errorf",
    "exp",
    "exp2",
    "f16tof32",
    "f32tof16",
    "faceforward",
    "firstbithigh",
    "firstbitlow",
    "floor",
    "fma",
    "fmod",
    "frac",
    "frexp",
    "fwidth",
    "isfinite",
    "isinf",
    "isnan",
    "ldexp",
    "length",
    "lerp",
    "lit",
    "log",
    "log10",
    "log2",
    "mad",
    "max",
    "min",
    "modf",
    "msad4",
    "mul",
    "noise",
    "normalize",
    "pow",
    "printf",
    "radians",
    "rcp",
    "reflect",
    "refract",
    "reversebits",
    "round",
    "rsqrt",
    "saturate",
    "sign",
    "sin",
    "sincos",
    "sinh",
    "smoothstep",
    "sqrt",
    "step",
    "tan",
    "tanh",
    "transpose",
    "trunc",
    "AllMemoryBarrier",
    "AllMemoryBarrierWithGroupSync",
    "DeviceMemoryBarrier",
    "DeviceMemoryBarrierWithGroupSync",
    "GroupMemoryBarrier",
    "GroupMemoryBarrierWithGroupSync",
    "InterlockedAdd",
    "InterlockedAnd",
    "InterlockedCompareExchange",
    "InterlockedCompareStore",
    "InterlockedExchange",
    "InterlockedMax",
    "InterlockedMin",
    "InterlockedOr",
    "InterlockedXor",
    "CheckAccessFullyMapped",
    "D3DCOLORtoUBYTE4",
    "EvaluateAttributeAtSample",
    "EvaluateAttributeCentroid",
    "EvaluateAttributeSnapped",
    "GetRenderTargetSampleCount",
    "GetRenderTargetSamplePosition",
    "Process2DQuadTessFactorsAvg",
    "Process2DQuadTessFactorsMax",
    "Process2DQuadTessFactorsMin",
    "ProcessIsolineTessFactors",
    "ProcessQuadTessFactorsAvg",
    "ProcessQuadTessFactorsMax",
    "ProcessQuadTessFactorsMin",
    "ProcessTriTessFactorsAvg",
    "ProcessTriTessFactorsMax",
    "ProcessTriTessFactorsMin",
    "WaveActiveAllEqual",
    "WaveActiveAllTrue",
    "WaveActiveAnyTrue",
    "WaveActiveBallot",
    "WaveActiveBitAnd",
    "WaveActiveBitOr",
    "WaveActiveBitXor",
    "WaveActiveCountBits",
    "WaveActiveMax",
    "WaveActiveMin",
    "WaveActiveProduct",
    "WaveActiveSum",
    "WaveGetLaneCount",
    "WaveGetLaneIndex",
    "WaveIsFirstLane",
    "WavePrefixCountBits",
    "WavePrefixProduct",
    "WavePrefixSum",
    "WaveReadLaneAt",
    "WaveReadLaneFirst",
];

/// Words the compilers reserve regardless of case, inherited from the legacy
/// effect framework.
pub const RESERVED_CASE_INSENSITIVE: &[&str] = &[
    "asm",
    "asm_fragment",
    "decl",
    "pass",
    "technique",
    "technique10",
    "technique11",
    "texture",
    "texture1d",
    "texture1darray",
    "texture2d",
    "texture2darray",
    "texture2dms",
    "texture2dmsarray",
    "texture3d",
    "texturecube",
    "texturecubearray",
    "sampler",
    "sampler1d",
    "sampler2d",
    "sampler3d",
    "samplercube",
    "pixelshader",
    "vertexshader",
    "pixelfragment",
    "vertexfragment",
    "matrix",
    "vector",
    "string",
    "true",
    "false",
    "nil",
];
