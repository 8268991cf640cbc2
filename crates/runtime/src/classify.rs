//! Tag scheme resolution
//!
//! Given a value and its type info, determine which functor produced the
//! value and expose its argument values with their instantiated argument
//! types. This is the leaf the whole generic dispatch engine stands on.
//!
//! Resolution is total over every layout the compiler can emit. Anything
//! that does not decode - an unknown primary tag, a secondary tag matching
//! no sharer, an equivalence chain that never bottoms out - is a mismatch
//! between generated code and the descriptors it was linked against, and is
//! fatal, never recoverable.

use std::sync::Arc;
use tabor_core::type_info::{EQUIV_CHAIN_LIMIT, SpecialKind, TagEntry, TypeInfo, TypeLayout};
use tabor_core::value::Value;

/// The resolved shape of one value.
#[derive(Debug)]
pub enum Shape {
    /// Builtin primitive; the dispatch engine handles these by kind.
    Special(SpecialKind),
    /// Nullary constructor of an enumeration.
    Enum { index: u32, name: Arc<str> },
    /// Zero-cost wrapper: the value IS the single argument's representation.
    Wrapper {
        name: Arc<str>,
        value: Value,
        arg_type: TypeInfo,
    },
    /// Constructor application of a discriminated union.
    Functor {
        /// Declaration-order position; drives generic compare.
        ordinal: u32,
        name: Arc<str>,
        args: Vec<(Value, TypeInfo)>,
    },
}

/// Dereference equivalence (alias) layouts until a concrete layout remains.
///
/// A chain longer than `EQUIV_CHAIN_LIMIT` cannot occur in well-formed
/// descriptors and means the aliases form a cycle.
pub fn resolve_layout(type_info: &TypeInfo) -> TypeInfo {
    let mut current = type_info.clone();
    for _ in 0..EQUIV_CHAIN_LIMIT {
        let next = match &current.ctor().layout {
            TypeLayout::Equivalence { target } => target.instantiate(current.args()),
            _ => return current,
        };
        current = next;
    }
    panic!(
        "descriptor corruption: equivalence cycle through {}",
        type_info.ctor().display_name()
    );
}

/// Classify a value against its (already layout-resolved or not) type info.
///
/// Pure and total; every failure path is descriptor corruption.
pub fn classify(type_info: &TypeInfo, value: &Value) -> Shape {
    let resolved = resolve_layout(type_info);
    let ctor = resolved.ctor();
    match &ctor.layout {
        TypeLayout::Special(kind) => Shape::Special(*kind),

        TypeLayout::Enumeration { functor_names } => match value {
            Value::Enum(index) => {
                let name = functor_names.get(*index as usize).unwrap_or_else(|| {
                    panic!(
                        "descriptor corruption: enum index {} out of range for {} ({} functors)",
                        index,
                        ctor.display_name(),
                        functor_names.len()
                    )
                });
                Shape::Enum {
                    index: *index,
                    name: Arc::clone(name),
                }
            }
            other => panic!(
                "descriptor corruption: {} is an enumeration but value is {:?}",
                ctor.display_name(),
                other
            ),
        },

        TypeLayout::NoTag { functor } => Shape::Wrapper {
            name: Arc::clone(&functor.name),
            value: value.clone(),
            arg_type: functor.args[0].instantiate(resolved.args()),
        },

        TypeLayout::DiscriminatedUnion { functors, tag_map } => {
            let data = match value {
                Value::Functor(data) => data,
                other => panic!(
                    "descriptor corruption: {} is a discriminated union but value is {:?}",
                    ctor.display_name(),
                    other
                ),
            };
            let entry = tag_map.get(data.ptag as usize).unwrap_or_else(|| {
                panic!(
                    "descriptor corruption: primary tag {} outside tag map of {}",
                    data.ptag,
                    ctor.display_name()
                )
            });
            let functor_index = match entry {
                TagEntry::Direct(i) => *i,
                // Sharers are probed in compiler-declared order; first match
                // wins. The order is part of the ABI.
                TagEntry::Shared(list) => *list
                    .iter()
                    .find(|i| functors[**i as usize].stag == Some(data.stag))
                    .unwrap_or_else(|| {
                        panic!(
                            "descriptor corruption: secondary tag {} matches no sharer of primary tag {} in {}",
                            data.stag,
                            data.ptag,
                            ctor.display_name()
                        )
                    }),
                TagEntry::Unused => panic!(
                    "descriptor corruption: primary tag {} unused in {}",
                    data.ptag,
                    ctor.display_name()
                ),
            };
            let functor = &functors[functor_index as usize];
            if data.args.len() != functor.arity() {
                panic!(
                    "descriptor corruption: functor {} of {} has arity {} but value carries {} arguments",
                    functor.name,
                    ctor.display_name(),
                    functor.arity(),
                    data.args.len()
                );
            }
            let args = data
                .args
                .iter()
                .zip(functor.args.iter())
                .map(|(v, pt)| (v.clone(), pt.instantiate(resolved.args())))
                .collect();
            Shape::Functor {
                ordinal: functor.ordinal,
                name: Arc::clone(&functor.name),
                args,
            }
        }

        // resolve_layout already stripped aliases; reaching one here means
        // the resolver itself is broken.
        TypeLayout::Equivalence { .. } => panic!(
            "descriptor corruption: unresolved equivalence layout in {}",
            ctor.display_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{int_ctor, int_type};
    use tabor_core::type_info::{FunctorDescriptor, PseudoType, TypeCtorInfo};

    fn color() -> TypeInfo {
        TypeInfo::new(TypeCtorInfo::enumeration(
            "demo",
            "color",
            &["red", "green", "blue"],
        ))
    }

    fn shape_tree() -> TypeInfo {
        // Two functors on distinct primary tags, one pair sharing a tag.
        let int_pt = PseudoType::ground(int_ctor());
        TypeInfo::new(TypeCtorInfo::discriminated_union(
            "demo",
            "shape",
            0,
            vec![
                FunctorDescriptor {
                    name: "dot".into(),
                    args: Box::new([]),
                    ptag: 0,
                    stag: None,
                    ordinal: 0,
                },
                FunctorDescriptor {
                    name: "circle".into(),
                    args: Box::new([int_pt.clone()]),
                    ptag: 1,
                    stag: Some(0),
                    ordinal: 1,
                },
                FunctorDescriptor {
                    name: "square".into(),
                    args: Box::new([int_pt.clone()]),
                    ptag: 1,
                    stag: Some(1),
                    ordinal: 2,
                },
            ],
        ))
    }

    #[test]
    fn test_classify_enum() {
        match classify(&color(), &Value::Enum(1)) {
            Shape::Enum { index, name } => {
                assert_eq!(index, 1);
                assert_eq!(&*name, "green");
            }
            other => panic!("expected Enum, got {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "descriptor corruption")]
    fn test_classify_enum_index_out_of_range() {
        classify(&color(), &Value::Enum(7));
    }

    #[test]
    fn test_classify_simple_functor() {
        let v = Value::functor(1, vec![Value::Int(5)]);
        // ptag 1 with stag 0 resolves to "circle" via the shared entry.
        match classify(&shape_tree(), &v) {
            Shape::Functor { ordinal, name, args } => {
                assert_eq!(ordinal, 1);
                assert_eq!(&*name, "circle");
                assert_eq!(args.len(), 1);
                assert_eq!(args[0].0, Value::Int(5));
                assert!(args[0].1.same_type(&int_type()));
            }
            other => panic!("expected Functor, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_shared_tag_probes_in_declared_order() {
        let v = Value::functor_with_stag(1, 1, vec![Value::Int(9)]);
        match classify(&shape_tree(), &v) {
            Shape::Functor { ordinal, name, .. } => {
                assert_eq!(ordinal, 2);
                assert_eq!(&*name, "square");
            }
            other => panic!("expected Functor, got {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "descriptor corruption")]
    fn test_classify_unknown_secondary_tag() {
        classify(&shape_tree(), &Value::functor_with_stag(1, 9, vec![Value::Int(0)]));
    }

    #[test]
    #[should_panic(expected = "descriptor corruption")]
    fn test_classify_primary_tag_outside_map() {
        classify(&shape_tree(), &Value::functor(5, vec![]));
    }

    #[test]
    fn test_classify_no_tag_exposes_argument() {
        let meters = TypeInfo::new(TypeCtorInfo::no_tag(
            "demo",
            "meters",
            0,
            "meters",
            PseudoType::ground(int_ctor()),
        ));
        match classify(&meters, &Value::Int(42)) {
            Shape::Wrapper { name, value, arg_type } => {
                assert_eq!(&*name, "meters");
                assert_eq!(value, Value::Int(42));
                assert!(arg_type.same_type(&int_type()));
            }
            other => panic!("expected Wrapper, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_layout_strips_alias_chain() {
        let step1 = TypeCtorInfo::equivalence(
            "demo",
            "step1",
            0,
            PseudoType::ground(int_ctor()),
        );
        let step2 = TypeCtorInfo::equivalence("demo", "step2", 0, PseudoType::ground(step1));
        let resolved = resolve_layout(&TypeInfo::new(step2));
        assert!(resolved.same_type(&int_type()));
    }

    #[test]
    #[should_panic(expected = "equivalence cycle")]
    fn test_overlong_equivalence_chain_is_fatal() {
        // Descriptors are immutable, so a literal cycle cannot be built from
        // safe code; the depth bound treats any chain past the limit as one.
        use tabor_core::type_info::EQUIV_CHAIN_LIMIT;

        let mut target = PseudoType::ground(int_ctor());
        for i in 0..=EQUIV_CHAIN_LIMIT {
            let alias = TypeCtorInfo::equivalence("demo", &format!("alias{}", i), 0, target);
            target = PseudoType::ground(alias);
        }
        let looped = match target {
            PseudoType::Ctor(ctor, _) => ctor,
            PseudoType::Var(_) => unreachable!(),
        };
        resolve_layout(&TypeInfo::new(looped));
    }
}
