//! Module processing functionality shared by the back ends.

mod namer;

pub use namer::{EntryPointIndex, NameKey, Namer};

use crate::arena::{Arena, Handle};

#[cfg(feature = "deserialize")]
use serde::Deserialize;
#[cfg(feature = "serialize")]
use serde::Serialize;

/// The result of resolving an expression's type.
///
/// Most expressions have a type that is registered in the module's type
/// arena, but some intermediates (a vector lane, a pointer formed by an
/// access chain) have no handle of their own. Those are carried by value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
#[cfg_attr(feature = "deserialize", derive(Deserialize))]
pub enum TypeResolution {
    Handle(Handle<crate::Type>),
    Value(crate::TypeInner),
}

impl TypeResolution {
    pub fn handle(&self) -> Option<Handle<crate::Type>> {
        match *self {
            TypeResolution::Handle(handle) => Some(handle),
            TypeResolution::Value(_) => None,
        }
    }

    pub fn inner_with<'a>(&'a self, arena: &'a Arena<crate::Type>) -> &'a crate::TypeInner {
        match *self {
            TypeResolution::Handle(handle) => &arena[handle].inner,
            TypeResolution::Value(ref inner) => inner,
        }
    }
}

impl crate::ScalarKind {
    pub fn is_numeric(self) -> bool {
        match self {
            crate::ScalarKind::Sint | crate::ScalarKind::Uint | crate::ScalarKind::Float => true,
            crate::ScalarKind::Bool => false,
        }
    }
}

impl crate::Literal {
    pub fn scalar_kind(&self) -> crate::ScalarKind {
        match *self {
            crate::Literal::F64(_) | crate::Literal::F32(_) => crate::ScalarKind::Float,
            crate::Literal::U32(_) | crate::Literal::U64(_) => crate::ScalarKind::Uint,
            crate::Literal::I32(_) | crate::Literal::I64(_) => crate::ScalarKind::Sint,
            crate::Literal::Bool(_) => crate::ScalarKind::Bool,
        }
    }

    pub fn width(&self) -> crate::Bytes {
        match *self {
            crate::Literal::F64(_) | crate::Literal::U64(_) | crate::Literal::I64(_) => 8,
            crate::Literal::F32(_) | crate::Literal::U32(_) | crate::Literal::I32(_) => 4,
            crate::Literal::Bool(_) => crate::BOOL_WIDTH,
        }
    }

    pub fn ty_inner(&self) -> crate::TypeInner {
        crate::TypeInner::Scalar {
            kind: self.scalar_kind(),
            width: self.width(),
        }
    }
}

impl crate::ScalarValue {
    pub fn scalar_kind(&self) -> crate::ScalarKind {
        match *self {
            crate::ScalarValue::Sint(_) => crate::ScalarKind::Sint,
            crate::ScalarValue::Uint(_) => crate::ScalarKind::Uint,
            crate::ScalarValue::Float(_) => crate::ScalarKind::Float,
            crate::ScalarValue::Bool(_) => crate::ScalarKind::Bool,
        }
    }
}

impl crate::TypeInner {
    /// Returns the scalar kind, if the type is a scalar, vector, matrix or
    /// atomic.
    pub fn scalar_kind(&self) -> Option<crate::ScalarKind> {
        match *self {
            crate::TypeInner::Scalar { kind, .. }
            | crate::TypeInner::Vector { kind, .. }
            | crate::TypeInner::Atomic { kind, .. } => Some(kind),
            crate::TypeInner::ValuePointer { kind, .. } => Some(kind),
            crate::TypeInner::Matrix { .. } => Some(crate::ScalarKind::Float),
            _ => None,
        }
    }

    /// Returns the scalar width in bytes, if the type has one.
    pub fn scalar_width(&self) -> Option<crate::Bytes> {
        match *self {
            crate::TypeInner::Scalar { width, .. }
            | crate::TypeInner::Vector { width, .. }
            | crate::TypeInner::Matrix { width, .. }
            | crate::TypeInner::Atomic { width, .. }
            | crate::TypeInner::ValuePointer { width, .. } => Some(width),
            _ => None,
        }
    }

    /// Returns the address space the type points into, if it is a pointer.
    pub fn pointer_space(&self) -> Option<crate::AddressSpace> {
        match *self {
            crate::TypeInner::Pointer { space, .. } => Some(space),
            crate::TypeInner::ValuePointer { space, .. } => Some(space),
            _ => None,
        }
    }
}

impl crate::AddressSpace {
    pub fn access(self) -> crate::StorageAccess {
        match self {
            crate::AddressSpace::Function
            | crate::AddressSpace::Private
            | crate::AddressSpace::WorkGroup => {
                crate::StorageAccess::LOAD | crate::StorageAccess::STORE
            }
            crate::AddressSpace::Uniform | crate::AddressSpace::PushConstant => {
                crate::StorageAccess::LOAD
            }
            crate::AddressSpace::Storage { access } => access,
            crate::AddressSpace::Handle => crate::StorageAccess::LOAD,
        }
    }
}

impl crate::MathFunction {
    pub fn argument_count(&self) -> usize {
        match *self {
            Self::Atan2
            | Self::Min
            | Self::Max
            | Self::Pow
            | Self::Dot
            | Self::Cross
            | Self::Distance
            | Self::Step
            | Self::Ldexp
            | Self::Reflect => 2,
            Self::Clamp
            | Self::Mix
            | Self::SmoothStep
            | Self::Fma
            | Self::FaceForward
            | Self::Refract
            | Self::ExtractBits => 3,
            Self::InsertBits => 4,
            _ => 1,
        }
    }
}

impl crate::Module {
    /// Fetch the function an entry point refers to, checking the handle.
    pub fn entry_point_function(
        &self,
        ep: &crate::EntryPoint,
    ) -> Result<&crate::Function, crate::BadHandle> {
        self.functions.try_get(ep.function)
    }

    /// Returns true if the given function handle belongs to an entry point.
    pub fn is_entry_point_function(&self, handle: Handle<crate::Function>) -> bool {
        self.entry_points.iter().any(|ep| ep.function == handle)
    }
}

/// Walks every expression operand and statement of a function, counting how
/// many times each expression handle is referenced.
///
/// Text back ends use these counts to decide which handles of an
/// [`Emit`](crate::Statement::Emit) range deserve a named temporary.
pub fn count_expression_uses(fun: &crate::Function) -> Vec<u32> {
    let mut counts = vec![0u32; fun.expressions.len()];
    {
        let mut tick = |h: Handle<crate::Expression>| counts[h.index()] += 1;
        for (_, expr) in fun.expressions.iter() {
            use crate::Expression as Ex;
            match *expr {
                Ex::Literal(_)
                | Ex::Constant(_)
                | Ex::ZeroValue(_)
                | Ex::FunctionArgument(_)
                | Ex::GlobalVariable(_)
                | Ex::LocalVariable(_)
                | Ex::CallResult(_)
                | Ex::AtomicResult { .. }
                | Ex::WorkGroupUniformLoadResult { .. } => {}
                Ex::Compose { ref components, .. } => {
                    for &comp in components {
                        tick(comp);
                    }
                }
                Ex::Access { base, index } => {
                    tick(base);
                    tick(index);
                }
                Ex::AccessIndex { base, .. } => tick(base),
                Ex::Splat { value, .. } => tick(value),
                Ex::Swizzle { vector, .. } => tick(vector),
                Ex::Load { pointer } => tick(pointer),
                Ex::ImageSample {
                    image,
                    sampler,
                    coordinate,
                    array_index,
                    level,
                    depth_ref,
                    ..
                } => {
                    tick(image);
                    tick(sampler);
                    tick(coordinate);
                    if let Some(h) = array_index {
                        tick(h);
                    }
                    match level {
                        crate::SampleLevel::Auto | crate::SampleLevel::Zero => {}
                        crate::SampleLevel::Exact(h) | crate::SampleLevel::Bias(h) => tick(h),
                        crate::SampleLevel::Gradient { x, y } => {
                            tick(x);
                            tick(y);
                        }
                    }
                    if let Some(h) = depth_ref {
                        tick(h);
                    }
                }
                Ex::ImageLoad {
                    image,
                    coordinate,
                    array_index,
                    index,
                } => {
                    tick(image);
                    tick(coordinate);
                    if let Some(h) = array_index {
                        tick(h);
                    }
                    if let Some(h) = index {
                        tick(h);
                    }
                }
                Ex::ImageQuery { image, query } => {
                    tick(image);
                    if let crate::ImageQuery::Size { level: Some(h) } = query {
                        tick(h);
                    }
                }
                Ex::Unary { expr, .. } => tick(expr),
                Ex::Binary { left, right, .. } => {
                    tick(left);
                    tick(right);
                }
                Ex::Select {
                    condition,
                    accept,
                    reject,
                } => {
                    tick(condition);
                    tick(accept);
                    tick(reject);
                }
                Ex::Derivative { expr, .. } => tick(expr),
                Ex::Relational { argument, .. } => tick(argument),
                Ex::Math {
                    arg,
                    arg1,
                    arg2,
                    arg3,
                    ..
                } => {
                    tick(arg);
                    for h in [arg1, arg2, arg3].iter().filter_map(|&a| a) {
                        tick(h);
                    }
                }
                Ex::As { expr, .. } => tick(expr),
                Ex::ArrayLength(expr) => tick(expr),
            }
        }

        for (_, local) in fun.local_variables.iter() {
            if let Some(init) = local.init {
                tick(init);
            }
        }

        count_block_uses(&fun.body, &mut tick);
    }
    counts
}

fn count_block_uses<F: FnMut(Handle<crate::Expression>)>(block: &crate::Block, tick: &mut F) {
    use crate::Statement as St;
    for statement in block.iter() {
        match *statement {
            St::Emit(_) | St::Break | St::Continue | St::Kill | St::Barrier(_) => {}
            St::Block(ref b) => count_block_uses(b, tick),
            St::If {
                condition,
                ref accept,
                ref reject,
            } => {
                tick(condition);
                count_block_uses(accept, tick);
                count_block_uses(reject, tick);
            }
            St::Switch {
                selector,
                ref cases,
                ref default,
            } => {
                tick(selector);
                for case in cases {
                    count_block_uses(&case.body, tick);
                }
                count_block_uses(default, tick);
            }
            St::Loop {
                ref body,
                ref continuing,
                break_if,
            } => {
                count_block_uses(body, tick);
                count_block_uses(continuing, tick);
                if let Some(h) = break_if {
                    tick(h);
                }
            }
            St::Return { value } => {
                if let Some(h) = value {
                    tick(h);
                }
            }
            St::Store { pointer, value } => {
                tick(pointer);
                tick(value);
            }
            St::ImageStore {
                image,
                coordinate,
                array_index,
                value,
            } => {
                tick(image);
                tick(coordinate);
                if let Some(h) = array_index {
                    tick(h);
                }
                tick(value);
            }
            St::Atomic {
                pointer,
                ref fun,
                value,
                ..
            } => {
                tick(pointer);
                tick(value);
                if let crate::AtomicFunction::Exchange {
                    compare: Some(compare),
                } = *fun
                {
                    tick(compare);
                }
            }
            St::WorkGroupUniformLoad { pointer, .. } => tick(pointer),
            St::Call { ref arguments, .. } => {
                for &arg in arguments {
                    tick(arg);
                }
            }
            St::RayQuery { query, ref fun } => {
                tick(query);
                if let crate::RayQueryFunction::Initialize {
                    acceleration_structure,
                    descriptor,
                } = *fun
                {
                    tick(acceleration_structure);
                    tick(descriptor);
                }
            }
        }
    }
}

/// Collects, in arena order, every [`CallResult`](crate::Expression::CallResult)
/// handle referenced by the expression tree rooted at `root`.
///
/// Processing only the first result found would trigger a premature store and
/// lose the remaining ones, so the whole tree is scanned up front.
pub fn gather_call_results(
    fun: &crate::Function,
    root: Handle<crate::Expression>,
) -> Vec<Handle<crate::Expression>> {
    let mut results = Vec::new();
    gather_call_results_impl(fun, root, &mut results);
    results.sort();
    results.dedup();
    results
}

fn gather_call_results_impl(
    fun: &crate::Function,
    root: Handle<crate::Expression>,
    results: &mut Vec<Handle<crate::Expression>>,
) {
    use crate::Expression as Ex;
    match fun.expressions[root] {
        Ex::CallResult(_) => results.push(root),
        Ex::Compose { ref components, .. } => {
            for &comp in components {
                gather_call_results_impl(fun, comp, results);
            }
        }
        Ex::Access { base, index } => {
            gather_call_results_impl(fun, base, results);
            gather_call_results_impl(fun, index, results);
        }
        Ex::AccessIndex { base, .. } => gather_call_results_impl(fun, base, results),
        Ex::Splat { value, .. } => gather_call_results_impl(fun, value, results),
        Ex::Swizzle { vector, .. } => gather_call_results_impl(fun, vector, results),
        Ex::Load { pointer } => gather_call_results_impl(fun, pointer, results),
        Ex::Unary { expr, .. } => gather_call_results_impl(fun, expr, results),
        Ex::Binary { left, right, .. } => {
            gather_call_results_impl(fun, left, results);
            gather_call_results_impl(fun, right, results);
        }
        Ex::Select {
            condition,
            accept,
            reject,
        } => {
            gather_call_results_impl(fun, condition, results);
            gather_call_results_impl(fun, accept, results);
            gather_call_results_impl(fun, reject, results);
        }
        Ex::Derivative { expr, .. } => gather_call_results_impl(fun, expr, results),
        Ex::Relational { argument, .. } => gather_call_results_impl(fun, argument, results),
        Ex::Math {
            arg,
            arg1,
            arg2,
            arg3,
            ..
        } => {
            gather_call_results_impl(fun, arg, results);
            for h in [arg1, arg2, arg3].iter().filter_map(|&a| a) {
                gather_call_results_impl(fun, h, results);
            }
        }
        Ex::As { expr, .. } => gather_call_results_impl(fun, expr, results),
        Ex::ArrayLength(expr) => gather_call_results_impl(fun, expr, results),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::gather_call_results;
    use crate::{Arena, Expression, Function, Handle};

    fn dummy_function_handle() -> Handle<crate::Function> {
        Handle::DUMMY
    }

    #[test]
    fn gathers_all_call_results_in_order() {
        let mut expressions = Arena::new();
        let c1 = expressions.append(Expression::CallResult(dummy_function_handle()));
        let c2 = expressions.append(Expression::CallResult(dummy_function_handle()));
        let sum = expressions.append(Expression::Binary {
            op: crate::BinaryOperator::Add,
            left: c1,
            right: c2,
        });
        let fun = Function {
            name: None,
            arguments: Vec::new(),
            result: None,
            local_variables: Arena::new(),
            expressions,
            expression_types: Vec::new(),
            body: Vec::new(),
        };
        assert_eq!(gather_call_results(&fun, sum), vec![c1, c2]);
    }
}
