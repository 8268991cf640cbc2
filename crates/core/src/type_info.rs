//! Type descriptors for Tabor runtime values
//!
//! Every monomorphic type instantiation that compiled code actually uses has
//! exactly one `TypeCtorInfo`, emitted by the compiler at program-load time
//! and never mutated afterwards. Generic operations (unify, compare, index)
//! and the tabling engine receive a `TypeInfo` - a type constructor applied
//! to fully-instantiated arguments - alongside each value whose static type
//! was erased at the call site.
//!
//! The compiler describes descriptors as a fixed-shape header followed by
//! layout-specific data. The header word offsets are a linked-program-wide
//! ABI; they are named here as constants so both sides agree on one layout.
//! Inside the runtime all offset arithmetic is replaced by field access on
//! the structured types below.

use std::fmt;
use std::sync::Arc;

// =============================================================================
// Descriptor header ABI
// =============================================================================
//
// Word offsets in the compiler-emitted descriptor header. The runtime decodes
// the header once at load time into a TypeCtorInfo; generated code may also
// read individual slots directly, so these must never be reordered.

/// Header word 0: number of type parameters.
pub const HEADER_WORD_ARITY: usize = 0;
/// Header word 1: unify-operation slot.
pub const HEADER_WORD_UNIFY: usize = 1;
/// Header word 2: index-operation slot.
pub const HEADER_WORD_INDEX: usize = 2;
/// Header word 3: compare-operation slot.
pub const HEADER_WORD_COMPARE: usize = 3;
/// Header word 4: layout data.
pub const HEADER_WORD_LAYOUT: usize = 4;
/// Header word 5: module name.
pub const HEADER_WORD_MODULE_NAME: usize = 5;
/// Header word 6: type name.
pub const HEADER_WORD_TYPE_NAME: usize = 6;

/// Highest allowed type variable number in a pseudo-type.
///
/// Variable numbers correspond to type-parameter positions (0-based here).
/// Anything above this bound in compiler-emitted data is corruption, not a
/// very polymorphic type.
pub const MAX_TYPE_VAR: u16 = 1024;

/// Bound on `Equivalence` dereferencing chains.
///
/// Alias chains in well-formed programs are short; a chain this long means
/// the descriptors form a cycle.
pub const EQUIV_CHAIN_LIMIT: usize = 64;

// =============================================================================
// Layout model
// =============================================================================

/// Builtin primitive kinds, handled directly by the dispatch engine rather
/// than by structural recursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKind {
    Int,
    Float,
    Char,
    String,
    /// Predicate/function closure. Identity semantics.
    Pred,
    /// Self-describing boxed value: type info word + data word.
    Univ,
    /// Uninhabited. Classifying a value at this kind is corruption.
    Void,
    /// Size + elements, element type is the single type parameter.
    Array,
}

impl SpecialKind {
    /// Stable name used in diagnostics and univ type identity.
    pub fn name(self) -> &'static str {
        match self {
            SpecialKind::Int => "int",
            SpecialKind::Float => "float",
            SpecialKind::Char => "character",
            SpecialKind::String => "string",
            SpecialKind::Pred => "pred",
            SpecialKind::Univ => "univ",
            SpecialKind::Void => "void",
            SpecialKind::Array => "array",
        }
    }
}

/// A possibly-polymorphic argument type, resolved against the call site's
/// `TypeInfo` arguments.
#[derive(Debug, Clone)]
pub enum PseudoType {
    /// Type parameter of the enclosing type constructor (0-based position).
    Var(u16),
    /// Constructor application over pseudo-types.
    Ctor(Arc<TypeCtorInfo>, Box<[PseudoType]>),
}

impl PseudoType {
    /// Shorthand for a monomorphic constructor application.
    pub fn ground(ctor: Arc<TypeCtorInfo>) -> PseudoType {
        PseudoType::Ctor(ctor, Box::new([]))
    }

    /// Resolve this pseudo-type against the type arguments of a call site.
    ///
    /// A variable out of range of `args` means the descriptor disagrees with
    /// the type constructor's declared arity - corruption, not a user error.
    pub fn instantiate(&self, args: &[TypeInfo]) -> TypeInfo {
        match self {
            PseudoType::Var(n) => match args.get(*n as usize) {
                Some(ti) => ti.clone(),
                None => panic!(
                    "descriptor corruption: type variable {} out of range (arity {})",
                    n,
                    args.len()
                ),
            },
            PseudoType::Ctor(ctor, ctor_args) => {
                let resolved: Box<[TypeInfo]> =
                    ctor_args.iter().map(|pt| pt.instantiate(args)).collect();
                TypeInfo::with_args(Arc::clone(ctor), resolved)
            }
        }
    }
}

/// One constructor of a discriminated-union (or no-tag) type.
#[derive(Debug, Clone)]
pub struct FunctorDescriptor {
    pub name: Arc<str>,
    /// Ordered argument types; arity is `args.len()`.
    pub args: Box<[PseudoType]>,
    /// Primary tag value encoded in the value's representation.
    pub ptag: u8,
    /// Secondary tag, present only when the primary tag is shared.
    pub stag: Option<u32>,
    /// Declaration-order position within the type's functor list.
    ///
    /// Generic compare orders by ordinal, never by tag value - tags may be
    /// reassigned for packing, declaration order may not.
    pub ordinal: u32,
}

impl FunctorDescriptor {
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// What a primary tag value means for a discriminated union.
#[derive(Debug, Clone)]
pub enum TagEntry {
    /// No functor uses this primary tag.
    Unused,
    /// Exactly one functor owns the tag; its index into `functors`.
    Direct(u32),
    /// Several functors share the tag; probed in declared order against the
    /// value's secondary tag word. The order is part of the ABI and must not
    /// be re-sorted.
    Shared(Box<[u32]>),
}

/// How values of a type are represented.
#[derive(Debug, Clone)]
pub enum TypeLayout {
    /// All constructors nullary; a value is the functor's index.
    Enumeration { functor_names: Box<[Arc<str>]> },
    /// General sum type with the primary/secondary tag scheme.
    DiscriminatedUnion {
        /// All functors, in declaration order (`functors[i].ordinal == i`).
        functors: Box<[FunctorDescriptor]>,
        /// Indexed by primary tag value.
        tag_map: Box<[TagEntry]>,
    },
    /// Single unary constructor represented as its argument (zero-cost
    /// wrapper; no functor node exists in the value).
    NoTag { functor: FunctorDescriptor },
    /// Transparent alias for another type.
    Equivalence { target: PseudoType },
    /// Builtin primitive.
    Special(SpecialKind),
}

// =============================================================================
// Type constructor info / type info
// =============================================================================

/// Per-type-constructor descriptor. One per distinct type constructor,
/// created at program load, immutable, process lifetime.
#[derive(Debug)]
pub struct TypeCtorInfo {
    /// Number of type parameters.
    pub arity: u16,
    pub module_name: Arc<str>,
    pub type_name: Arc<str>,
    pub layout: TypeLayout,
}

impl TypeCtorInfo {
    /// Build an enumeration descriptor.
    pub fn enumeration(module: &str, name: &str, functor_names: &[&str]) -> Arc<TypeCtorInfo> {
        Arc::new(TypeCtorInfo {
            arity: 0,
            module_name: module.into(),
            type_name: name.into(),
            layout: TypeLayout::Enumeration {
                functor_names: functor_names.iter().map(|n| Arc::from(*n)).collect(),
            },
        })
    }

    /// Build a discriminated-union descriptor from functors in declaration
    /// order, deriving the tag map.
    ///
    /// Panics on malformed shape (non-dense ordinals, secondary tags on
    /// unshared primaries, missing secondary tags on shared ones): these are
    /// compiler bugs surfacing as descriptor corruption.
    pub fn discriminated_union(
        module: &str,
        name: &str,
        arity: u16,
        functors: Vec<FunctorDescriptor>,
    ) -> Arc<TypeCtorInfo> {
        let max_ptag = functors.iter().map(|f| f.ptag).max().unwrap_or(0);
        let mut tag_map: Vec<TagEntry> = vec![TagEntry::Unused; max_ptag as usize + 1];
        for (i, f) in functors.iter().enumerate() {
            if f.ordinal as usize != i {
                panic!(
                    "descriptor corruption: functor {} of {}.{} has ordinal {} (expected {})",
                    f.name, module, name, f.ordinal, i
                );
            }
            let slot = &mut tag_map[f.ptag as usize];
            *slot = match std::mem::replace(slot, TagEntry::Unused) {
                TagEntry::Unused => TagEntry::Direct(i as u32),
                TagEntry::Direct(prev) => TagEntry::Shared(Box::new([prev, i as u32])),
                TagEntry::Shared(list) => {
                    let mut list = list.into_vec();
                    list.push(i as u32);
                    TagEntry::Shared(list.into_boxed_slice())
                }
            };
        }
        // Secondary tags are required exactly where a primary tag is shared.
        for entry in &tag_map {
            match entry {
                TagEntry::Direct(i) => {
                    if functors[*i as usize].stag.is_some() {
                        panic!(
                            "descriptor corruption: functor {} of {}.{} carries a secondary tag on an unshared primary tag",
                            functors[*i as usize].name, module, name
                        );
                    }
                }
                TagEntry::Shared(list) => {
                    for i in list.iter() {
                        if functors[*i as usize].stag.is_none() {
                            panic!(
                                "descriptor corruption: functor {} of {}.{} shares primary tag {} without a secondary tag",
                                functors[*i as usize].name,
                                module,
                                name,
                                functors[*i as usize].ptag
                            );
                        }
                    }
                }
                TagEntry::Unused => {}
            }
        }
        Arc::new(TypeCtorInfo {
            arity,
            module_name: module.into(),
            type_name: name.into(),
            layout: TypeLayout::DiscriminatedUnion {
                functors: functors.into_boxed_slice(),
                tag_map: tag_map.into_boxed_slice(),
            },
        })
    }

    /// Build a no-tag (zero-cost wrapper) descriptor.
    pub fn no_tag(
        module: &str,
        name: &str,
        arity: u16,
        functor_name: &str,
        arg: PseudoType,
    ) -> Arc<TypeCtorInfo> {
        Arc::new(TypeCtorInfo {
            arity,
            module_name: module.into(),
            type_name: name.into(),
            layout: TypeLayout::NoTag {
                functor: FunctorDescriptor {
                    name: functor_name.into(),
                    args: Box::new([arg]),
                    ptag: 0,
                    stag: None,
                    ordinal: 0,
                },
            },
        })
    }

    /// Build an equivalence (transparent alias) descriptor.
    pub fn equivalence(
        module: &str,
        name: &str,
        arity: u16,
        target: PseudoType,
    ) -> Arc<TypeCtorInfo> {
        Arc::new(TypeCtorInfo {
            arity,
            module_name: module.into(),
            type_name: name.into(),
            layout: TypeLayout::Equivalence { target },
        })
    }

    /// Build a builtin descriptor.
    pub fn special(module: &str, name: &str, arity: u16, kind: SpecialKind) -> Arc<TypeCtorInfo> {
        Arc::new(TypeCtorInfo {
            arity,
            module_name: module.into(),
            type_name: name.into(),
            layout: TypeLayout::Special(kind),
        })
    }

    /// "module.name/arity" form used in diagnostics.
    pub fn display_name(&self) -> String {
        format!("{}.{}/{}", self.module_name, self.type_name, self.arity)
    }
}

/// A type constructor applied to fully-instantiated arguments.
///
/// Cheap to clone; shared structurally. This is what erased-type call sites
/// pass alongside each value.
#[derive(Clone)]
pub struct TypeInfo {
    inner: Arc<TypeInfoData>,
}

struct TypeInfoData {
    ctor: Arc<TypeCtorInfo>,
    args: Box<[TypeInfo]>,
}

impl TypeInfo {
    /// Instantiate a nullary type constructor.
    pub fn new(ctor: Arc<TypeCtorInfo>) -> TypeInfo {
        TypeInfo::with_args(ctor, Box::new([]))
    }

    /// Instantiate a type constructor with the given type arguments.
    ///
    /// Arity mismatch is corruption: the call site and the descriptor were
    /// compiled against different versions of the type.
    pub fn with_args(ctor: Arc<TypeCtorInfo>, args: Box<[TypeInfo]>) -> TypeInfo {
        if args.len() != ctor.arity as usize {
            panic!(
                "descriptor corruption: {} applied to {} type arguments",
                ctor.display_name(),
                args.len()
            );
        }
        TypeInfo {
            inner: Arc::new(TypeInfoData { ctor, args }),
        }
    }

    pub fn ctor(&self) -> &Arc<TypeCtorInfo> {
        &self.inner.ctor
    }

    pub fn args(&self) -> &[TypeInfo] {
        &self.inner.args
    }

    /// Structural type identity: same constructor (by module/name/arity) and
    /// equal arguments. Used for univ values and table diagnostics.
    pub fn same_type(&self, other: &TypeInfo) -> bool {
        let (a, b) = (self.ctor(), other.ctor());
        if !Arc::ptr_eq(a, b)
            && (a.arity != b.arity
                || a.type_name != b.type_name
                || a.module_name != b.module_name)
        {
            return false;
        }
        self.args()
            .iter()
            .zip(other.args())
            .all(|(x, y)| x.same_type(y))
    }

    /// Deterministic ordering over types, for ordering univ values:
    /// module name, then type name, then arity, then arguments.
    pub fn cmp_type(&self, other: &TypeInfo) -> std::cmp::Ordering {
        let (a, b) = (self.ctor(), other.ctor());
        a.module_name
            .cmp(&b.module_name)
            .then_with(|| a.type_name.cmp(&b.type_name))
            .then_with(|| a.arity.cmp(&b.arity))
            .then_with(|| {
                for (x, y) in self.args().iter().zip(other.args()) {
                    let ord = x.cmp_type(y);
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            })
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.ctor().module_name, self.ctor().type_name)?;
        if !self.args().is_empty() {
            write!(f, "(")?;
            for (i, a) in self.args().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", a)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
