//! Runtime values for Tabor
//!
//! `Value` is what compiled Tabor code computes with. Values are ground and
//! immutable; every composite payload sits behind an `Arc` so cloning is
//! O(1), which matters because the tabling engine copies argument and answer
//! tuples freely.
//!
//! A value does not know its own type. Classification goes through the type
//! descriptors in `type_info`: the value carries only what the tag scheme
//! needs (the primary tag, and a secondary tag word for constructors that
//! share a primary tag). Zero-cost wrappers (`NoTag` layouts) have no node
//! at all - the wrapped argument's representation IS the value.

use crate::type_info::TypeInfo;
use std::sync::Arc;

/// Constructor application for discriminated-union types.
///
/// Immutable after construction. Cycles are impossible by construction:
/// fields never mutate and the language has no mutation primitives for
/// constructor arguments, so `Arc` reference counts always reach zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctorData {
    /// Primary tag encoded in the value's representation.
    pub ptag: u8,
    /// Secondary tag word; meaningful only when the type descriptor marks
    /// `ptag` as shared, zero otherwise.
    pub stag: u32,
    /// Constructor arguments in declaration order.
    pub args: Box<[Value]>,
}

impl FunctorData {
    pub fn new(ptag: u8, args: Vec<Value>) -> Self {
        FunctorData {
            ptag,
            stag: 0,
            args: args.into_boxed_slice(),
        }
    }

    pub fn with_stag(ptag: u8, stag: u32, args: Vec<Value>) -> Self {
        FunctorData {
            ptag,
            stag,
            args: args.into_boxed_slice(),
        }
    }
}

/// The boxed "universal" value: a type info word and a data word.
#[derive(Debug, Clone)]
pub struct UnivData {
    pub type_info: TypeInfo,
    pub value: Value,
}

/// A Tabor runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Integer value
    Int(i64),

    /// Floating-point value (IEEE 754 double precision)
    Float(f64),

    /// Character value (Unicode scalar)
    Char(char),

    /// String (shared, immutable)
    String(Arc<str>),

    /// Nullary constructor of an enumeration type: the functor index.
    Enum(u32),

    /// Constructor application with the primary/secondary tag scheme.
    /// Uses Arc for O(1) cloning - essential for recursive data structures.
    Functor(Arc<FunctorData>),

    /// Predicate/function closure: entry point plus captured environment.
    /// Closures are compared by identity, never structurally.
    Closure {
        /// Entry function pointer (opaque to the runtime).
        fn_ptr: usize,
        /// Captured values from the creation site.
        env: Arc<[Value]>,
    },

    /// Self-describing boxed value.
    Univ(Arc<UnivData>),

    /// Array: size + elements.
    Array(Arc<[Value]>),
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::String(Arc::from(s))
    }

    pub fn functor(ptag: u8, args: Vec<Value>) -> Value {
        Value::Functor(Arc::new(FunctorData::new(ptag, args)))
    }

    pub fn functor_with_stag(ptag: u8, stag: u32, args: Vec<Value>) -> Value {
        Value::Functor(Arc::new(FunctorData::with_stag(ptag, stag, args)))
    }

    pub fn univ(type_info: TypeInfo, value: Value) -> Value {
        Value::Univ(Arc::new(UnivData { type_info, value }))
    }

    pub fn array(elems: Vec<Value>) -> Value {
        Value::Array(elems.into())
    }
}

// Structural equality except closures, which compare by identity (entry
// point plus environment allocation). Generic code should go through the
// dispatch engine instead; this impl exists for tests and collections.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Functor(a), Value::Functor(b)) => a == b,
            (
                Value::Closure { fn_ptr: fa, env: ea },
                Value::Closure { fn_ptr: fb, env: eb },
            ) => fa == fb && Arc::ptr_eq(ea, eb),
            (Value::Univ(a), Value::Univ(b)) => {
                a.type_info.same_type(&b.type_info) && a.value == b.value
            }
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

// Safety: Value has no interior mutability; all composite payloads are
// immutable Arc-shared data, and closures store their entry point as a plain
// usize. Independent top-level queries running on separate coroutines share
// table entries containing Values, so both bounds are required.
unsafe impl Send for Value {}
unsafe impl Sync for Value {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_functor_construction() {
        let v = Value::functor(2, vec![Value::Int(10), Value::Int(20)]);
        match v {
            Value::Functor(data) => {
                assert_eq!(data.ptag, 2);
                assert_eq!(data.stag, 0);
                assert_eq!(data.args.len(), 2);
                assert_eq!(data.args[0], Value::Int(10));
            }
            other => panic!("expected Functor, got {:?}", other),
        }
    }

    #[test]
    fn test_float_equality_is_bitwise() {
        // Reflexivity must hold for table keys, NaN included.
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn test_closure_equality_is_identity() {
        let env: Arc<[Value]> = Arc::from(vec![Value::Int(1)]);
        let a = Value::Closure {
            fn_ptr: 0x1000,
            env: Arc::clone(&env),
        };
        let b = Value::Closure {
            fn_ptr: 0x1000,
            env: Arc::clone(&env),
        };
        // Same entry point, same environment allocation.
        assert_eq!(a, b);

        let other_env: Arc<[Value]> = Arc::from(vec![Value::Int(1)]);
        let c = Value::Closure {
            fn_ptr: 0x1000,
            env: other_env,
        };
        // Structurally identical environment, different allocation.
        assert_ne!(a, c);
    }

    #[test]
    fn test_deep_functor_clone_is_o1() {
        // Regression test: deeply nested constructor values must clone in
        // O(1) via Arc, not by deep copy.
        let mut v = Value::functor(0, vec![]);
        for i in 0..100 {
            v = Value::functor((i % 4) as u8, vec![v.clone()]);
        }

        let start = std::time::Instant::now();
        for _ in 0..1000 {
            let _copy = v.clone();
        }
        let elapsed = start.elapsed();

        assert!(
            elapsed.as_millis() < 10,
            "clone took {:?} - should be O(1) with Arc",
            elapsed
        );
    }

    #[test]
    fn test_value_thread_safe_sharing() {
        use std::thread;

        let v = Value::functor(1, vec![Value::Int(1), Value::string("x")]);
        let shared = Arc::new(v);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let v = Arc::clone(&shared);
                thread::spawn(move || match &*v {
                    Value::Functor(data) => assert_eq!(data.args.len(), 2),
                    other => panic!("expected Functor, got {:?}", other),
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread panicked");
        }
    }
}
