//! Generic dispatch: unify, compare, index
//!
//! The three operations every polymorphic call site goes through. Each is a
//! structural recursion over tag-scheme resolution; dynamic behavior per
//! primitive kind is confined to the `SpecialKind` boundary instead of being
//! spread through the traversal.
//!
//! Laws (exercised by the tests):
//! - `unify(a, b)` iff `compare(a, b) == Equal`
//! - `compare` is a total order; `unify` is reflexive (floats included - they
//!   unify by bit pattern and order by IEEE total order)
//! - `unify(a, b)` implies `index(a) == index(b)`
//!
//! These are ground runtime values, not logic variables, so no occurs check
//! exists anywhere here.

use crate::classify::{Shape, classify, resolve_layout};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use tabor_core::type_info::{SpecialKind, TypeInfo, TypeLayout};
use tabor_core::value::Value;

/// Result encoding shared with generated code.
pub const COMPARE_EQUAL: i64 = 0;
pub const COMPARE_LESS: i64 = 1;
pub const COMPARE_GREATER: i64 = 2;

/// Structural equality of two values of the same type.
///
/// Fails fast on the first differing functor or argument.
pub fn unify(type_info: &TypeInfo, a: &Value, b: &Value) -> bool {
    let resolved = resolve_layout(type_info);
    if let TypeLayout::Special(kind) = &resolved.ctor().layout {
        return unify_special(*kind, &resolved, a, b);
    }
    match (classify(&resolved, a), classify(&resolved, b)) {
        (Shape::Enum { index: ia, .. }, Shape::Enum { index: ib, .. }) => ia == ib,
        (
            Shape::Wrapper {
                value: va,
                arg_type,
                ..
            },
            Shape::Wrapper { value: vb, .. },
        ) => unify(&arg_type, &va, &vb),
        (
            Shape::Functor {
                ordinal: oa,
                args: args_a,
                ..
            },
            Shape::Functor {
                ordinal: ob,
                args: args_b,
                ..
            },
        ) => {
            oa == ob
                && args_a
                    .iter()
                    .zip(args_b.iter())
                    .all(|((va, ti), (vb, _))| unify(ti, va, vb))
        }
        (sa, sb) => panic!(
            "descriptor corruption: values of {} classified to different shapes ({:?} vs {:?})",
            resolved.ctor().display_name(),
            sa,
            sb
        ),
    }
}

fn unify_special(kind: SpecialKind, type_info: &TypeInfo, a: &Value, b: &Value) -> bool {
    match (kind, a, b) {
        (SpecialKind::Int, Value::Int(x), Value::Int(y)) => x == y,
        // Bit-pattern equality keeps unify reflexive over NaN and consistent
        // with the total-order compare below.
        (SpecialKind::Float, Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (SpecialKind::Char, Value::Char(x), Value::Char(y)) => x == y,
        (SpecialKind::String, Value::String(x), Value::String(y)) => x == y,
        (
            SpecialKind::Pred,
            Value::Closure { fn_ptr: fa, env: ea },
            Value::Closure { fn_ptr: fb, env: eb },
        ) => fa == fb && std::sync::Arc::ptr_eq(ea, eb),
        (SpecialKind::Univ, Value::Univ(ua), Value::Univ(ub)) => {
            ua.type_info.same_type(&ub.type_info)
                && unify(&ua.type_info, &ua.value, &ub.value)
        }
        (SpecialKind::Array, Value::Array(xs), Value::Array(ys)) => {
            let elem_ti = &type_info.args()[0];
            xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(x, y)| unify(elem_ti, x, y))
        }
        (SpecialKind::Void, ..) => panic!(
            "descriptor corruption: value of uninhabited type {}",
            type_info.ctor().display_name()
        ),
        (kind, a, b) => panic!(
            "descriptor corruption: {} values {:?} / {:?} do not match builtin kind {:?}",
            type_info.ctor().display_name(),
            a,
            b,
            kind
        ),
    }
}

/// Total order over two values of the same type.
///
/// Functors order by declared ordinal (declaration order), never by tag
/// value; equal functors order by arguments left to right.
pub fn compare(type_info: &TypeInfo, a: &Value, b: &Value) -> Ordering {
    let resolved = resolve_layout(type_info);
    if let TypeLayout::Special(kind) = &resolved.ctor().layout {
        return compare_special(*kind, &resolved, a, b);
    }
    match (classify(&resolved, a), classify(&resolved, b)) {
        (Shape::Enum { index: ia, .. }, Shape::Enum { index: ib, .. }) => ia.cmp(&ib),
        (
            Shape::Wrapper {
                value: va,
                arg_type,
                ..
            },
            Shape::Wrapper { value: vb, .. },
        ) => compare(&arg_type, &va, &vb),
        (
            Shape::Functor {
                ordinal: oa,
                args: args_a,
                ..
            },
            Shape::Functor {
                ordinal: ob,
                args: args_b,
                ..
            },
        ) => oa.cmp(&ob).then_with(|| {
            for ((va, ti), (vb, _)) in args_a.iter().zip(args_b.iter()) {
                let ord = compare(ti, va, vb);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }),
        (sa, sb) => panic!(
            "descriptor corruption: values of {} classified to different shapes ({:?} vs {:?})",
            resolved.ctor().display_name(),
            sa,
            sb
        ),
    }
}

fn compare_special(kind: SpecialKind, type_info: &TypeInfo, a: &Value, b: &Value) -> Ordering {
    match (kind, a, b) {
        (SpecialKind::Int, Value::Int(x), Value::Int(y)) => x.cmp(y),
        (SpecialKind::Float, Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        (SpecialKind::Char, Value::Char(x), Value::Char(y)) => x.cmp(y),
        (SpecialKind::String, Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        // Identity order: deterministic within a process, which is all the
        // call table needs.
        (
            SpecialKind::Pred,
            Value::Closure { fn_ptr: fa, env: ea },
            Value::Closure { fn_ptr: fb, env: eb },
        ) => fa
            .cmp(fb)
            .then_with(|| (ea.as_ptr() as usize).cmp(&(eb.as_ptr() as usize))),
        (SpecialKind::Univ, Value::Univ(ua), Value::Univ(ub)) => ua
            .type_info
            .cmp_type(&ub.type_info)
            .then_with(|| compare(&ua.type_info, &ua.value, &ub.value)),
        (SpecialKind::Array, Value::Array(xs), Value::Array(ys)) => {
            let elem_ti = &type_info.args()[0];
            xs.len().cmp(&ys.len()).then_with(|| {
                for (x, y) in xs.iter().zip(ys.iter()) {
                    let ord = compare(elem_ti, x, y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            })
        }
        (SpecialKind::Void, ..) => panic!(
            "descriptor corruption: value of uninhabited type {}",
            type_info.ctor().display_name()
        ),
        (kind, a, b) => panic!(
            "descriptor corruption: {} values {:?} / {:?} do not match builtin kind {:?}",
            type_info.ctor().display_name(),
            a,
            b,
            kind
        ),
    }
}

/// Stable dispatch index for a value: enum index, functor ordinal, or a
/// primitive hash. Values that unify always index equal.
pub fn index(type_info: &TypeInfo, value: &Value) -> i64 {
    let resolved = resolve_layout(type_info);
    if let TypeLayout::Special(kind) = &resolved.ctor().layout {
        return index_special(*kind, &resolved, value);
    }
    match classify(&resolved, value) {
        Shape::Enum { index, .. } => index as i64,
        // Wrappers are invisible to indexing, as to everything else.
        Shape::Wrapper {
            value, arg_type, ..
        } => index(&arg_type, &value),
        Shape::Functor { ordinal, .. } => ordinal as i64,
        Shape::Special(kind) => panic!(
            "descriptor corruption: classify produced {:?} for non-special layout of {}",
            kind,
            resolved.ctor().display_name()
        ),
    }
}

fn index_special(kind: SpecialKind, type_info: &TypeInfo, value: &Value) -> i64 {
    let mut hasher = std::hash::DefaultHasher::new();
    match (kind, value) {
        (SpecialKind::Int, Value::Int(x)) => return *x,
        (SpecialKind::Char, Value::Char(c)) => return *c as i64,
        (SpecialKind::Float, Value::Float(x)) => x.to_bits().hash(&mut hasher),
        (SpecialKind::String, Value::String(s)) => s.as_bytes().hash(&mut hasher),
        (SpecialKind::Pred, Value::Closure { fn_ptr, env }) => {
            fn_ptr.hash(&mut hasher);
            (env.as_ptr() as usize).hash(&mut hasher);
        }
        (SpecialKind::Univ, Value::Univ(u)) => {
            let ctor = u.type_info.ctor();
            ctor.module_name.hash(&mut hasher);
            ctor.type_name.hash(&mut hasher);
            ctor.arity.hash(&mut hasher);
            index(&u.type_info, &u.value).hash(&mut hasher);
        }
        (SpecialKind::Array, Value::Array(xs)) => {
            let elem_ti = &type_info.args()[0];
            xs.len().hash(&mut hasher);
            for x in xs.iter() {
                index(elem_ti, x).hash(&mut hasher);
            }
        }
        (SpecialKind::Void, _) => panic!(
            "descriptor corruption: value of uninhabited type {}",
            type_info.ctor().display_name()
        ),
        (kind, v) => panic!(
            "descriptor corruption: {} value {:?} does not match builtin kind {:?}",
            type_info.ctor().display_name(),
            v,
            kind
        ),
    }
    hasher.finish() as i64
}

// =============================================================================
// FFI entry points for generated code
// =============================================================================

/// Generic unify for erased-type call sites.
///
/// # Safety
/// All three pointers must be valid for the duration of the call;
/// `type_info` must describe the type of both values.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_unify(
    type_info: *const TypeInfo,
    a: *const Value,
    b: *const Value,
) -> bool {
    unsafe { unify(&*type_info, &*a, &*b) }
}

/// Generic compare for erased-type call sites.
///
/// Returns `COMPARE_EQUAL` (0), `COMPARE_LESS` (1) or `COMPARE_GREATER` (2),
/// the encoding generated code branches on.
///
/// # Safety
/// All three pointers must be valid for the duration of the call;
/// `type_info` must describe the type of both values.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_compare(
    type_info: *const TypeInfo,
    a: *const Value,
    b: *const Value,
) -> i64 {
    match unsafe { compare(&*type_info, &*a, &*b) } {
        Ordering::Equal => COMPARE_EQUAL,
        Ordering::Less => COMPARE_LESS,
        Ordering::Greater => COMPARE_GREATER,
    }
}

/// Generic index for erased-type call sites.
///
/// # Safety
/// Both pointers must be valid for the duration of the call; `type_info`
/// must describe the type of the value.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_index(type_info: *const TypeInfo, value: *const Value) -> i64 {
    unsafe { index(&*type_info, &*value) }
}
