//! Builtin type constructors
//!
//! Descriptors for the primitive types the compiler treats as builtin. Each
//! is constructed once and shared for the life of the process, the same way
//! compiler-emitted descriptors are.

use std::sync::{Arc, OnceLock};
use tabor_core::type_info::{SpecialKind, TypeCtorInfo, TypeInfo};

const BUILTIN_MODULE: &str = "tabor_builtin";

macro_rules! builtin_ctor {
    ($fn_name:ident, $cell:ident, $name:expr, $arity:expr, $kind:expr) => {
        /// Shared descriptor for the builtin type.
        pub fn $fn_name() -> Arc<TypeCtorInfo> {
            static $cell: OnceLock<Arc<TypeCtorInfo>> = OnceLock::new();
            Arc::clone($cell.get_or_init(|| {
                TypeCtorInfo::special(BUILTIN_MODULE, $name, $arity, $kind)
            }))
        }
    };
}

builtin_ctor!(int_ctor, INT, "int", 0, SpecialKind::Int);
builtin_ctor!(float_ctor, FLOAT, "float", 0, SpecialKind::Float);
builtin_ctor!(char_ctor, CHAR, "character", 0, SpecialKind::Char);
builtin_ctor!(string_ctor, STRING, "string", 0, SpecialKind::String);
builtin_ctor!(pred_ctor, PRED, "pred", 0, SpecialKind::Pred);
builtin_ctor!(univ_ctor, UNIV, "univ", 0, SpecialKind::Univ);
builtin_ctor!(void_ctor, VOID, "void", 0, SpecialKind::Void);
builtin_ctor!(array_ctor, ARRAY, "array", 1, SpecialKind::Array);

/// `int` as an instantiated type.
pub fn int_type() -> TypeInfo {
    TypeInfo::new(int_ctor())
}

/// `float` as an instantiated type.
pub fn float_type() -> TypeInfo {
    TypeInfo::new(float_ctor())
}

/// `character` as an instantiated type.
pub fn char_type() -> TypeInfo {
    TypeInfo::new(char_ctor())
}

/// `string` as an instantiated type.
pub fn string_type() -> TypeInfo {
    TypeInfo::new(string_ctor())
}

/// `pred` as an instantiated type.
pub fn pred_type() -> TypeInfo {
    TypeInfo::new(pred_ctor())
}

/// `univ` as an instantiated type.
pub fn univ_type() -> TypeInfo {
    TypeInfo::new(univ_ctor())
}

/// `array(elem)` as an instantiated type.
pub fn array_type(elem: TypeInfo) -> TypeInfo {
    TypeInfo::with_args(array_ctor(), Box::new([elem]))
}
