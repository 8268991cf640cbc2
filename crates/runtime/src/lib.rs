//! Tabor Runtime: RTTI-driven generic dispatch and tabled evaluation
//!
//! The runtime support layer compiled Tabor programs link against. Two
//! halves:
//!
//! - **Generic dispatch**: every value carries no type at runtime; erased
//!   call sites pass a `TypeInfo` alongside each value and go through
//!   `unify` / `compare` / `index`, which recurse structurally through the
//!   tag scheme (`classify`).
//! - **Tabling**: procedures the compiler marks as tabled memoize their
//!   call/answer pairs in a `TableStore` trie; mutually recursive tabled
//!   calls coordinate through the generator/consumer scheduler until the
//!   minimal-model fixpoint.
//!
//! Generated code reaches this library through the `patch_tabor_*` C-ABI
//! entry points; Rust consumers (and the tests) use the safe functions the
//! entry points wrap.

pub mod builtin;
pub mod classify;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod report;
pub mod scheduler;
pub mod serialize;
pub mod subgoal;
pub mod table;
pub mod term;

// Re-export key types and functions
pub use tabor_core::type_info::{
    FunctorDescriptor, PseudoType, SpecialKind, TagEntry, TypeCtorInfo, TypeInfo, TypeLayout,
};
pub use tabor_core::value::{FunctorData, UnivData, Value};

pub use classify::{Shape, classify, resolve_layout};
pub use dispatch::{COMPARE_EQUAL, COMPARE_GREATER, COMPARE_LESS, compare, index, unify};
pub use term::{Term, canonicalize};

// Tabling
pub use scheduler::{
    AnswerStream, BodyFn, EngineId, ProcId, ProcRegistry, ResumeFn, SolveError, Step, TabledProc,
    global_procs, register_proc, solve,
};
pub use subgoal::{Consumer, Subgoal, SubgoalStatus};
pub use table::{TableError, TableStore, table_store};

// Serialization types (for persistence/exchange with external systems)
pub use serialize::{SerializeError, TypedTerm};

// Generic dispatch entry points (exported for LLVM linking)
pub use dispatch::{patch_tabor_compare, patch_tabor_index, patch_tabor_unify};

// Tabling entry points (exported for LLVM linking)
pub use scheduler::{
    patch_tabor_answer_next as answer_next, patch_tabor_answer_stream_free as answer_stream_free,
    patch_tabor_table_call as table_call,
};
pub use table::patch_tabor_table_reset as table_reset;

// Engine lifecycle (exported for LLVM linking)
pub use engine::{
    patch_tabor_engine_init as engine_init, patch_tabor_engine_run as engine_run,
    patch_tabor_engine_shutdown as engine_shutdown, patch_tabor_query_spawn as query_spawn,
    patch_tabor_wait_all_queries as wait_all_queries,
};
