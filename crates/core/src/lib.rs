//! Tabor Core: RTTI foundation for the Tabor runtime
//!
//! This crate provides the type-description primitives shared by everything
//! above it: the runtime `Value` representation, the type descriptors
//! (`TypeCtorInfo` / `TypeInfo` / `TypeLayout`) emitted by the compiler at
//! program load, and the thread-local error state used across the FFI
//! boundary.
//!
//! Key design principles:
//! - Value: ground, immutable, Arc-shared data the language talks about
//! - TypeCtorInfo/TypeInfo: one descriptor per type, created once, never
//!   mutated, process lifetime
//! - Offsets become fields: the compiler's descriptor header layout is kept
//!   as named ABI constants, but inside the runtime every access is a field
//!   access on a structured layout, not word arithmetic
//!
//! # Modules
//!
//! - `error`: Thread-local error handling for FFI safety
//! - `type_info`: Type descriptors, layouts, pseudo-type instantiation
//! - `value`: Core Value enum (Int, Float, Functor, Closure, Univ, ...)

pub mod error;
pub mod type_info;
pub mod value;

// Re-export key types and functions
pub use type_info::{
    EQUIV_CHAIN_LIMIT, FunctorDescriptor, MAX_TYPE_VAR, PseudoType, SpecialKind, TagEntry,
    TypeCtorInfo, TypeInfo, TypeLayout,
};

pub use value::{FunctorData, UnivData, Value};

// Error handling
pub use error::{
    clear_runtime_error, has_runtime_error, patch_tabor_clear_error as clear_error,
    patch_tabor_get_error as get_error, patch_tabor_has_error as has_error,
    patch_tabor_take_error as take_error, set_runtime_error, take_runtime_error,
};
