//! Hand-built IR modules shared by the backend tests.
#![allow(dead_code)]

use glaive::proc::TypeResolution;
use glaive::*;
use std::num::NonZeroU32;

pub fn res(ty: Handle<Type>) -> TypeResolution {
    TypeResolution::Handle(ty)
}

pub struct Types {
    pub f32: Handle<Type>,
    pub u32: Handle<Type>,
    pub vec2f: Handle<Type>,
    pub vec4f: Handle<Type>,
    pub mat4f: Handle<Type>,
}

pub fn register_basic_types(types: &mut Arena<Type>) -> Types {
    let f32_handle = types.append(Type {
        name: None,
        inner: TypeInner::Scalar {
            kind: ScalarKind::Float,
            width: 4,
        },
    });
    let u32_handle = types.append(Type {
        name: None,
        inner: TypeInner::Scalar {
            kind: ScalarKind::Uint,
            width: 4,
        },
    });
    let vec2f = types.append(Type {
        name: None,
        inner: TypeInner::Vector {
            size: VectorSize::Bi,
            kind: ScalarKind::Float,
            width: 4,
        },
    });
    let vec4f = types.append(Type {
        name: None,
        inner: TypeInner::Vector {
            size: VectorSize::Quad,
            kind: ScalarKind::Float,
            width: 4,
        },
    });
    let mat4f = types.append(Type {
        name: None,
        inner: TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            width: 4,
        },
    });
    Types {
        f32: f32_handle,
        u32: u32_handle,
        vec2f,
        vec4f,
        mat4f,
    }
}

/// The "triangle vertex" module: a vertex entry point taking
/// `@builtin(vertex_index)` and returning `@builtin(position)`, reading a
/// 3-element array literal indexed by the vertex index.
pub fn triangle_module() -> Module {
    let mut module = Module::default();
    let t = register_basic_types(&mut module.types);
    let arr3f = module.types.append(Type {
        name: None,
        inner: TypeInner::Array {
            base: t.f32,
            size: ArraySize::Constant(NonZeroU32::new(3).unwrap()),
            stride: 4,
        },
    });

    let mut fun = Function {
        name: Some(String::from("vs_main")),
        arguments: vec![FunctionArgument {
            name: Some(String::from("idx")),
            ty: t.u32,
            binding: Some(Binding::BuiltIn(BuiltIn::VertexIndex)),
        }],
        result: Some(FunctionResult {
            ty: t.vec4f,
            binding: Some(Binding::BuiltIn(BuiltIn::Position)),
        }),
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_idx = fun.expressions.append(Expression::FunctionArgument(0));
    let e_zero = fun.expressions.append(Expression::Literal(Literal::F32(0.0)));
    let e_half = fun.expressions.append(Expression::Literal(Literal::F32(0.5)));
    let e_one = fun.expressions.append(Expression::Literal(Literal::F32(1.0)));
    let e_array = fun.expressions.append(Expression::Compose {
        ty: arr3f,
        components: vec![e_zero, e_half, e_one],
    });

    let positions = fun.local_variables.append(LocalVariable {
        name: Some(String::from("positions")),
        ty: arr3f,
        init: Some(e_array),
    });

    let e_local = fun
        .expressions
        .append(Expression::LocalVariable(positions));
    let e_access = fun.expressions.append(Expression::Access {
        base: e_local,
        index: e_idx,
    });
    let e_value = fun.expressions.append(Expression::Load { pointer: e_access });
    let e_result = fun.expressions.append(Expression::Compose {
        ty: t.vec4f,
        components: vec![e_value, e_zero, e_zero, e_one],
    });

    fun.expression_types = vec![
        res(t.u32),
        res(t.f32),
        res(t.f32),
        res(t.f32),
        res(arr3f),
        TypeResolution::Value(TypeInner::Pointer {
            base: arr3f,
            space: AddressSpace::Function,
        }),
        TypeResolution::Value(TypeInner::ValuePointer {
            size: None,
            kind: ScalarKind::Float,
            width: 4,
            space: AddressSpace::Function,
        }),
        res(t.f32),
        res(t.vec4f),
    ];

    fun.body = vec![
        Statement::Emit(Range::from_index_range(
            e_access.index()..e_result.index() + 1,
        )),
        Statement::Return {
            value: Some(e_result),
        },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("vs_main"),
        stage: ShaderStage::Vertex,
        workgroup_size: [0; 3],
        function: fun_handle,
    });
    module
}

/// A fragment entry point whose body is `if (flag) return A; else return B;`.
pub fn fragment_if_else_module() -> Module {
    let mut module = Module::default();
    let t = register_basic_types(&mut module.types);
    let bool_ty = module.types.append(Type {
        name: None,
        inner: TypeInner::Scalar {
            kind: ScalarKind::Bool,
            width: BOOL_WIDTH,
        },
    });

    let mut fun = Function {
        name: Some(String::from("fs_main")),
        arguments: vec![FunctionArgument {
            name: Some(String::from("factor")),
            ty: t.f32,
            binding: Some(Binding::Location {
                location: 0,
                interpolation: None,
            }),
        }],
        result: Some(FunctionResult {
            ty: t.vec4f,
            binding: Some(Binding::Location {
                location: 0,
                interpolation: None,
            }),
        }),
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_arg = fun.expressions.append(Expression::FunctionArgument(0));
    let e_half = fun.expressions.append(Expression::Literal(Literal::F32(0.5)));
    let e_cmp = fun.expressions.append(Expression::Binary {
        op: BinaryOperator::Greater,
        left: e_arg,
        right: e_half,
    });
    let e_red = fun.expressions.append(Expression::ZeroValue(t.vec4f));
    let e_one = fun.expressions.append(Expression::Literal(Literal::F32(1.0)));
    let e_white = fun.expressions.append(Expression::Splat {
        size: VectorSize::Quad,
        value: e_one,
    });

    fun.expression_types = vec![
        res(t.f32),
        res(t.f32),
        res(bool_ty),
        res(t.vec4f),
        res(t.f32),
        res(t.vec4f),
    ];

    fun.body = vec![
        Statement::Emit(Range::from_index_range(e_cmp.index()..e_cmp.index() + 1)),
        Statement::If {
            condition: e_cmp,
            accept: vec![
                Statement::Emit(Range::from_index_range(
                    e_white.index()..e_white.index() + 1,
                )),
                Statement::Return {
                    value: Some(e_white),
                },
            ],
            reject: vec![Statement::Return { value: Some(e_red) }],
        },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("fs_main"),
        stage: ShaderStage::Fragment,
        workgroup_size: [0; 3],
        function: fun_handle,
    });
    module
}

/// A fragment entry point sampling a texture and transforming the result by
/// a uniform matrix.
pub fn uniform_texture_module() -> Module {
    let mut module = Module::default();
    let t = register_basic_types(&mut module.types);
    let uniforms_ty = module.types.append(Type {
        name: Some(String::from("Uniforms")),
        inner: TypeInner::Struct {
            members: vec![StructMember {
                name: Some(String::from("mvp")),
                ty: t.mat4f,
                binding: None,
                offset: 0,
            }],
            span: 64,
        },
    });
    let tex_ty = module.types.append(Type {
        name: None,
        inner: TypeInner::Image {
            dim: ImageDimension::D2,
            arrayed: false,
            class: ImageClass::Sampled {
                kind: ScalarKind::Float,
                multi: false,
            },
        },
    });
    let sampler_ty = module.types.append(Type {
        name: None,
        inner: TypeInner::Sampler { comparison: false },
    });

    let g_uniforms = module.global_variables.append(GlobalVariable {
        name: Some(String::from("uniforms")),
        space: AddressSpace::Uniform,
        binding: Some(ResourceBinding {
            group: 0,
            binding: 0,
        }),
        ty: uniforms_ty,
        init: None,
    });
    let g_tex = module.global_variables.append(GlobalVariable {
        name: Some(String::from("tex")),
        space: AddressSpace::Handle,
        binding: Some(ResourceBinding {
            group: 0,
            binding: 1,
        }),
        ty: tex_ty,
        init: None,
    });
    let g_samp = module.global_variables.append(GlobalVariable {
        name: Some(String::from("samp")),
        space: AddressSpace::Handle,
        binding: Some(ResourceBinding {
            group: 0,
            binding: 2,
        }),
        ty: sampler_ty,
        init: None,
    });

    let mut fun = Function {
        name: Some(String::from("fs_main")),
        arguments: vec![FunctionArgument {
            name: Some(String::from("uv")),
            ty: t.vec2f,
            binding: Some(Binding::Location {
                location: 0,
                interpolation: None,
            }),
        }],
        result: Some(FunctionResult {
            ty: t.vec4f,
            binding: Some(Binding::Location {
                location: 0,
                interpolation: None,
            }),
        }),
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_uv = fun.expressions.append(Expression::FunctionArgument(0));
    let e_tex = fun.expressions.append(Expression::GlobalVariable(g_tex));
    let e_samp = fun.expressions.append(Expression::GlobalVariable(g_samp));
    let e_sample = fun.expressions.append(Expression::ImageSample {
        image: e_tex,
        sampler: e_samp,
        gather: None,
        coordinate: e_uv,
        array_index: None,
        offset: None,
        level: SampleLevel::Auto,
        depth_ref: None,
    });
    let e_glob = fun
        .expressions
        .append(Expression::GlobalVariable(g_uniforms));
    let e_mvp_ptr = fun.expressions.append(Expression::AccessIndex {
        base: e_glob,
        index: 0,
    });
    let e_mvp = fun.expressions.append(Expression::Load { pointer: e_mvp_ptr });
    let e_out = fun.expressions.append(Expression::Binary {
        op: BinaryOperator::Multiply,
        left: e_mvp,
        right: e_sample,
    });

    fun.expression_types = vec![
        res(t.vec2f),
        res(tex_ty),
        res(sampler_ty),
        res(t.vec4f),
        TypeResolution::Value(TypeInner::Pointer {
            base: uniforms_ty,
            space: AddressSpace::Uniform,
        }),
        TypeResolution::Value(TypeInner::Pointer {
            base: t.mat4f,
            space: AddressSpace::Uniform,
        }),
        res(t.mat4f),
        res(t.vec4f),
    ];

    fun.body = vec![
        Statement::Emit(Range::from_index_range(
            e_sample.index()..e_out.index() + 1,
        )),
        Statement::Return { value: Some(e_out) },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("fs_main"),
        stage: ShaderStage::Fragment,
        workgroup_size: [0; 3],
        function: fun_handle,
    });
    module
}

/// A compute entry point doing `atomicAdd(&counter, 1u)` on a storage
/// `atomic<u32>`.
pub fn compute_atomic_module() -> Module {
    let mut module = Module::default();
    let _t = register_basic_types(&mut module.types);
    let atomic_u32 = module.types.append(Type {
        name: None,
        inner: TypeInner::Atomic {
            kind: ScalarKind::Uint,
            width: 4,
        },
    });

    let g_counter = module.global_variables.append(GlobalVariable {
        name: Some(String::from("counter")),
        space: AddressSpace::Storage {
            access: StorageAccess::LOAD | StorageAccess::STORE,
        },
        binding: Some(ResourceBinding {
            group: 0,
            binding: 0,
        }),
        ty: atomic_u32,
        init: None,
    });

    let mut fun = Function {
        name: Some(String::from("cs_main")),
        arguments: Vec::new(),
        result: None,
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_counter = fun
        .expressions
        .append(Expression::GlobalVariable(g_counter));
    let e_value = fun.expressions.append(Expression::Literal(Literal::U32(1)));

    fun.expression_types = vec![
        TypeResolution::Value(TypeInner::Pointer {
            base: atomic_u32,
            space: AddressSpace::Storage {
                access: StorageAccess::LOAD | StorageAccess::STORE,
            },
        }),
        TypeResolution::Value(TypeInner::Scalar {
            kind: ScalarKind::Uint,
            width: 4,
        }),
    ];

    fun.body = vec![
        Statement::Atomic {
            pointer: e_counter,
            fun: AtomicFunction::Add,
            value: e_value,
            result: None,
        },
        Statement::Return { value: None },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("cs_main"),
        stage: ShaderStage::Compute,
        workgroup_size: [64, 1, 1],
        function: fun_handle,
    });
    module
}

/// A vertex entry point taking a struct argument with two locations.
pub fn vertex_struct_io_module() -> Module {
    let mut module = Module::default();
    let t = register_basic_types(&mut module.types);
    let input_ty = module.types.append(Type {
        name: Some(String::from("VertexInput")),
        inner: TypeInner::Struct {
            members: vec![
                StructMember {
                    name: Some(String::from("pos")),
                    ty: t.vec2f,
                    binding: Some(Binding::Location {
                        location: 0,
                        interpolation: None,
                    }),
                    offset: 0,
                },
                StructMember {
                    name: Some(String::from("col")),
                    ty: t.vec4f,
                    binding: Some(Binding::Location {
                        location: 1,
                        interpolation: None,
                    }),
                    offset: 8,
                },
            ],
            span: 24,
        },
    });

    let mut fun = Function {
        name: Some(String::from("vs_main")),
        arguments: vec![FunctionArgument {
            name: Some(String::from("input")),
            ty: input_ty,
            binding: None,
        }],
        result: Some(FunctionResult {
            ty: t.vec4f,
            binding: Some(Binding::BuiltIn(BuiltIn::Position)),
        }),
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_arg = fun.expressions.append(Expression::FunctionArgument(0));
    let e_pos = fun.expressions.append(Expression::AccessIndex {
        base: e_arg,
        index: 0,
    });
    let e_x = fun.expressions.append(Expression::AccessIndex {
        base: e_pos,
        index: 0,
    });
    let e_y = fun.expressions.append(Expression::AccessIndex {
        base: e_pos,
        index: 1,
    });
    let e_zero = fun.expressions.append(Expression::Literal(Literal::F32(0.0)));
    let e_one = fun.expressions.append(Expression::Literal(Literal::F32(1.0)));
    let e_out = fun.expressions.append(Expression::Compose {
        ty: t.vec4f,
        components: vec![e_x, e_y, e_zero, e_one],
    });

    fun.expression_types = vec![
        res(input_ty),
        res(t.vec2f),
        res(t.f32),
        res(t.f32),
        res(t.f32),
        res(t.f32),
        res(t.vec4f),
    ];

    fun.body = vec![
        Statement::Emit(Range::from_index_range(e_pos.index()..e_out.index() + 1)),
        Statement::Return { value: Some(e_out) },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("vs_main"),
        stage: ShaderStage::Vertex,
        workgroup_size: [0; 3],
        function: fun_handle,
    });
    module
}

/// `var count = span(a, b) + span(c, d);` where `span` is a user function:
/// two call results feeding one local initializer.
pub fn two_call_results_module() -> Module {
    let mut module = Module::default();
    let t = register_basic_types(&mut module.types);

    // fn span(from: f32, to: f32) -> f32 { return to - from; }
    let mut span = Function {
        name: Some(String::from("span")),
        arguments: vec![
            FunctionArgument {
                name: Some(String::from("from")),
                ty: t.f32,
                binding: None,
            },
            FunctionArgument {
                name: Some(String::from("to")),
                ty: t.f32,
                binding: None,
            },
        ],
        result: Some(FunctionResult {
            ty: t.f32,
            binding: None,
        }),
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };
    let s_from = span.expressions.append(Expression::FunctionArgument(0));
    let s_to = span.expressions.append(Expression::FunctionArgument(1));
    let s_diff = span.expressions.append(Expression::Binary {
        op: BinaryOperator::Subtract,
        left: s_to,
        right: s_from,
    });
    span.expression_types = vec![res(t.f32), res(t.f32), res(t.f32)];
    span.body = vec![
        Statement::Emit(Range::from_index_range(s_diff.index()..s_diff.index() + 1)),
        Statement::Return {
            value: Some(s_diff),
        },
    ];
    let span_handle = module.functions.append(span);

    let mut fun = Function {
        name: Some(String::from("cs_main")),
        arguments: Vec::new(),
        result: None,
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_a = fun.expressions.append(Expression::Literal(Literal::F32(1.0)));
    let e_b = fun.expressions.append(Expression::Literal(Literal::F32(4.0)));
    let e_c = fun.expressions.append(Expression::Literal(Literal::F32(2.0)));
    let e_d = fun.expressions.append(Expression::Literal(Literal::F32(8.0)));
    let e_call1 = fun.expressions.append(Expression::CallResult(span_handle));
    let e_call2 = fun.expressions.append(Expression::CallResult(span_handle));
    let e_sum = fun.expressions.append(Expression::Binary {
        op: BinaryOperator::Add,
        left: e_call1,
        right: e_call2,
    });

    let count = fun.local_variables.append(LocalVariable {
        name: Some(String::from("count")),
        ty: t.f32,
        init: Some(e_sum),
    });
    let _ = count;

    fun.expression_types = vec![
        res(t.f32),
        res(t.f32),
        res(t.f32),
        res(t.f32),
        res(t.f32),
        res(t.f32),
        res(t.f32),
    ];

    fun.body = vec![
        Statement::Call {
            function: span_handle,
            arguments: vec![e_a, e_b],
            result: Some(e_call1),
        },
        Statement::Call {
            function: span_handle,
            arguments: vec![e_c, e_d],
            result: Some(e_call2),
        },
        Statement::Return { value: None },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("cs_main"),
        stage: ShaderStage::Compute,
        workgroup_size: [1, 1, 1],
        function: fun_handle,
    });
    module
}

/// A compute entry point exercising integer arithmetic: an integer
/// vector-times-scalar multiply and a guarded vector division.
pub fn int_ops_module() -> Module {
    let mut module = Module::default();
    let i32_ty = module.types.append(Type {
        name: None,
        inner: TypeInner::Scalar {
            kind: ScalarKind::Sint,
            width: 4,
        },
    });
    let vec4i = module.types.append(Type {
        name: None,
        inner: TypeInner::Vector {
            size: VectorSize::Quad,
            kind: ScalarKind::Sint,
            width: 4,
        },
    });

    let mut fun = Function {
        name: Some(String::from("cs_main")),
        arguments: Vec::new(),
        result: None,
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_three = fun.expressions.append(Expression::Literal(Literal::I32(3)));
    let e_vec = fun.expressions.append(Expression::Splat {
        size: VectorSize::Quad,
        value: e_three,
    });
    let e_two = fun.expressions.append(Expression::Literal(Literal::I32(2)));
    let e_scaled = fun.expressions.append(Expression::Binary {
        op: BinaryOperator::Multiply,
        left: e_vec,
        right: e_two,
    });
    let e_ratio = fun.expressions.append(Expression::Binary {
        op: BinaryOperator::Divide,
        left: e_scaled,
        right: e_vec,
    });

    fun.local_variables.append(LocalVariable {
        name: Some(String::from("ratio")),
        ty: vec4i,
        init: Some(e_ratio),
    });

    fun.expression_types = vec![
        res(i32_ty),
        res(vec4i),
        res(i32_ty),
        res(vec4i),
        res(vec4i),
    ];
    fun.body = vec![
        Statement::Emit(Range::from_index_range(e_vec.index()..e_ratio.index() + 1)),
        Statement::Return { value: None },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("cs_main"),
        stage: ShaderStage::Compute,
        workgroup_size: [1, 1, 1],
        function: fun_handle,
    });
    module
}

/// A vertex entry point multiplying a vector by a scalar, to pin down the
/// `OpVectorTimesScalar` selection.
pub fn vector_times_scalar_module() -> Module {
    let mut module = Module::default();
    let t = register_basic_types(&mut module.types);

    let mut fun = Function {
        name: Some(String::from("vs_main")),
        arguments: Vec::new(),
        result: Some(FunctionResult {
            ty: t.vec4f,
            binding: Some(Binding::BuiltIn(BuiltIn::Position)),
        }),
        local_variables: Arena::new(),
        expressions: Arena::new(),
        expression_types: Vec::new(),
        body: Vec::new(),
    };

    let e_one = fun.expressions.append(Expression::Literal(Literal::F32(1.0)));
    let e_vec = fun.expressions.append(Expression::Splat {
        size: VectorSize::Quad,
        value: e_one,
    });
    let e_scale = fun.expressions.append(Expression::Literal(Literal::F32(0.5)));
    let e_scaled = fun.expressions.append(Expression::Binary {
        op: BinaryOperator::Multiply,
        left: e_vec,
        right: e_scale,
    });

    fun.expression_types = vec![res(t.f32), res(t.vec4f), res(t.f32), res(t.vec4f)];
    fun.body = vec![
        Statement::Emit(Range::from_index_range(e_vec.index()..e_scaled.index() + 1)),
        Statement::Return {
            value: Some(e_scaled),
        },
    ];

    let fun_handle = module.functions.append(fun);
    module.entry_points.push(EntryPoint {
        name: String::from("vs_main"),
        stage: ShaderStage::Vertex,
        workgroup_size: [0; 3],
        function: fun_handle,
    });
    module
}
