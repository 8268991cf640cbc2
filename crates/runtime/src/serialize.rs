//! Serialization of canonical terms
//!
//! Provides a serializable representation of canonical `Term`s, enabling
//! answer and argument exchange with external systems.
//!
//! # Use Cases
//!
//! - **Answer export**: shipping a completed subgoal's answers to another
//!   process
//! - **IPC**: message passing between runtime instances
//! - **Storage**: snapshotting query results (the call table itself has no
//!   on-disk format; this is exchange only)
//!
//! # Why TypedTerm?
//!
//! Runtime `Term`s share their strings (`Arc<str>`) and carry closure
//! identities that are meaningless outside the process. `TypedTerm` uses
//! owned `String`s, refuses closures, and serializes deterministically:
//! equal terms always produce identical bytes, which matters for
//! content-addressed storage and reproducible snapshots.
//!
//! # Performance
//!
//! Uses bincode for fast, compact binary serialization.

use crate::term::Term;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error during serialization/deserialization
#[derive(Debug)]
pub enum SerializeError {
    /// Cannot serialize closures (code is not data)
    ClosureNotSerializable,
    /// Bincode encoding/decoding error (preserves original error for debugging)
    BincodeError(Box<bincode::Error>),
}

impl std::fmt::Display for SerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializeError::ClosureNotSerializable => {
                write!(f, "Closures cannot be serialized - code is not data")
            }
            SerializeError::BincodeError(e) => write!(f, "Bincode error: {}", e),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializeError::BincodeError(e) => Some(e.as_ref()),
            SerializeError::ClosureNotSerializable => None,
        }
    }
}

impl From<bincode::Error> for SerializeError {
    fn from(e: bincode::Error) -> Self {
        SerializeError::BincodeError(Box::new(e))
    }
}

/// Serializable representation of canonical terms
///
/// Mirrors `Term` with owned data. Closures have no portable form and are
/// rejected at conversion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypedTerm {
    Int(i64),
    /// IEEE bit pattern, as in `Term`
    Float(u64),
    Char(char),
    String(String),
    Enum(u32),
    Functor { ordinal: u32, args: Vec<TypedTerm> },
    Univ {
        module: String,
        name: String,
        arity: u16,
        term: Box<TypedTerm>,
    },
    Array(Vec<TypedTerm>),
}

impl TypedTerm {
    /// Convert from a runtime term.
    ///
    /// Returns an error if the term contains a closure identity.
    pub fn from_term(term: &Term) -> Result<Self, SerializeError> {
        Ok(match term {
            Term::Int(n) => TypedTerm::Int(*n),
            Term::Float(bits) => TypedTerm::Float(*bits),
            Term::Char(c) => TypedTerm::Char(*c),
            Term::String(s) => TypedTerm::String(s.to_string()),
            Term::Enum(i) => TypedTerm::Enum(*i),
            Term::Functor(ordinal, args) => TypedTerm::Functor {
                ordinal: *ordinal,
                args: args
                    .iter()
                    .map(TypedTerm::from_term)
                    .collect::<Result<_, _>>()?,
            },
            Term::Closure(..) => return Err(SerializeError::ClosureNotSerializable),
            Term::Univ {
                module,
                name,
                arity,
                term,
            } => TypedTerm::Univ {
                module: module.to_string(),
                name: name.to_string(),
                arity: *arity,
                term: Box::new(TypedTerm::from_term(term)?),
            },
            Term::Array(elems) => TypedTerm::Array(
                elems
                    .iter()
                    .map(TypedTerm::from_term)
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Convert back to a runtime term.
    pub fn to_term(&self) -> Term {
        match self {
            TypedTerm::Int(n) => Term::Int(*n),
            TypedTerm::Float(bits) => Term::Float(*bits),
            TypedTerm::Char(c) => Term::Char(*c),
            TypedTerm::String(s) => Term::String(Arc::from(s.as_str())),
            TypedTerm::Enum(i) => Term::Enum(*i),
            TypedTerm::Functor { ordinal, args } => Term::Functor(
                *ordinal,
                args.iter().map(TypedTerm::to_term).collect(),
            ),
            TypedTerm::Univ {
                module,
                name,
                arity,
                term,
            } => Term::Univ {
                module: Arc::from(module.as_str()),
                name: Arc::from(name.as_str()),
                arity: *arity,
                term: Box::new(term.to_term()),
            },
            TypedTerm::Array(elems) => {
                Term::Array(elems.iter().map(TypedTerm::to_term).collect())
            }
        }
    }

    /// Serialize to compact binary
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from compact binary
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializeError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
