//! Canonical ground terms
//!
//! A `Term` is the canonical, fully dereferenced form of an argument or
//! answer value: wrappers and aliases stripped, every constructor reduced to
//! its declaration-order ordinal, floats frozen to their bit pattern. Terms
//! are built once by the classify traversal and never mutated; the call
//! table keys its tries on them, so `Eq`/`Hash`/`Ord` must be total and
//! cheap.
//!
//! Two values canonicalize to equal terms exactly when generic unify accepts
//! them - that is what makes a trie path "the call" rather than "a call".

use crate::classify::{Shape, classify, resolve_layout};
use std::sync::Arc;
use tabor_core::type_info::{SpecialKind, TypeInfo, TypeLayout};
use tabor_core::value::Value;

/// Canonical ground term. Ordering is structural and total; float ordering
/// follows the bit pattern, which is consistent (if not numerically
/// meaningful) - trie keys only need determinism.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Int(i64),
    /// IEEE bit pattern, so NaN keys behave like any other key.
    Float(u64),
    Char(char),
    String(Arc<str>),
    /// Enumeration constructor index.
    Enum(u32),
    /// Constructor ordinal + canonical arguments. Wrappers never appear:
    /// a no-tag value canonicalizes to its argument.
    Functor(u32, Box<[Term]>),
    /// Closure identity: entry point + environment address.
    Closure(usize, usize),
    /// Self-describing box: type identity + canonical payload.
    Univ {
        module: Arc<str>,
        name: Arc<str>,
        arity: u16,
        term: Box<Term>,
    },
    Array(Box<[Term]>),
}

impl Term {
    /// Rebuild a value with the same structure as this term.
    ///
    /// Constructor ordinals cannot be mapped back to tags without the type,
    /// so functor terms rebuild with the ordinal as the primary tag; the
    /// tabling engine stores original argument values separately and only
    /// uses this for diagnostics and serialization round trips.
    pub fn to_value(&self) -> Value {
        match self {
            Term::Int(n) => Value::Int(*n),
            Term::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Term::Char(c) => Value::Char(*c),
            Term::String(s) => Value::String(Arc::clone(s)),
            Term::Enum(i) => Value::Enum(*i),
            Term::Functor(ordinal, args) => Value::functor(
                (*ordinal).min(u8::MAX as u32) as u8,
                args.iter().map(Term::to_value).collect(),
            ),
            Term::Closure(fn_ptr, _) => Value::Closure {
                fn_ptr: *fn_ptr,
                env: Arc::from(Vec::<Value>::new()),
            },
            Term::Univ { term, .. } => term.to_value(),
            Term::Array(elems) => Value::array(elems.iter().map(Term::to_value).collect()),
        }
    }
}

/// Canonicalize a value through the classify traversal.
///
/// Total for well-formed descriptors; corruption panics exactly as classify
/// does.
pub fn canonicalize(type_info: &TypeInfo, value: &Value) -> Term {
    let resolved = resolve_layout(type_info);
    if let TypeLayout::Special(kind) = &resolved.ctor().layout {
        return canonicalize_special(*kind, &resolved, value);
    }
    match classify(&resolved, value) {
        Shape::Enum { index, .. } => Term::Enum(index),
        Shape::Wrapper {
            value, arg_type, ..
        } => canonicalize(&arg_type, &value),
        Shape::Functor { ordinal, args, .. } => Term::Functor(
            ordinal,
            args.iter()
                .map(|(v, ti)| canonicalize(ti, v))
                .collect(),
        ),
        Shape::Special(kind) => panic!(
            "descriptor corruption: classify produced {:?} for non-special layout of {}",
            kind,
            resolved.ctor().display_name()
        ),
    }
}

fn canonicalize_special(kind: SpecialKind, type_info: &TypeInfo, value: &Value) -> Term {
    match (kind, value) {
        (SpecialKind::Int, Value::Int(n)) => Term::Int(*n),
        (SpecialKind::Float, Value::Float(x)) => Term::Float(x.to_bits()),
        (SpecialKind::Char, Value::Char(c)) => Term::Char(*c),
        (SpecialKind::String, Value::String(s)) => Term::String(Arc::clone(s)),
        (SpecialKind::Pred, Value::Closure { fn_ptr, env }) => {
            Term::Closure(*fn_ptr, env.as_ptr() as usize)
        }
        (SpecialKind::Univ, Value::Univ(u)) => {
            let ctor = u.type_info.ctor();
            Term::Univ {
                module: Arc::clone(&ctor.module_name),
                name: Arc::clone(&ctor.type_name),
                arity: ctor.arity,
                term: Box::new(canonicalize(&u.type_info, &u.value)),
            }
        }
        (SpecialKind::Array, Value::Array(xs)) => {
            let elem_ti = &type_info.args()[0];
            Term::Array(xs.iter().map(|x| canonicalize(elem_ti, x)).collect())
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
}
