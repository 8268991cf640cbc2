//! Call table: trie from canonical call arguments to subgoal records
//!
//! Each tabled procedure owns a trie; one edge is consumed per argument, so
//! every call with structurally-unify-equal arguments lands on the same
//! `Subgoal`. Lookup is reentrant-safe (nested tabled calls during one
//! evaluation go through the same store) and safe across concurrent
//! top-level queries: one mutex guards trie mutation, per-subgoal mutexes
//! guard record state.
//!
//! Lifecycle: stores start empty, grow monotonically, and are only emptied
//! by an explicit `reset` between independent top-level invocations.
//! Completed subgoals are a pinned cache - nothing evicts them.

use crate::scheduler::ProcId;
use crate::subgoal::Subgoal;
use crate::term::Term;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tabor_core::value::Value;

// Table statistics (for diagnostics and the at-exit report)
//
// Lock-free counters; process-wide across all stores. Reads are Relaxed -
// the numbers are observability, not synchronization.
pub static SUBGOALS_CREATED: AtomicU64 = AtomicU64::new(0);
pub static TABLE_LOOKUPS: AtomicU64 = AtomicU64::new(0);
pub static TABLE_HITS: AtomicU64 = AtomicU64::new(0);
pub static TRIE_NODES_CREATED: AtomicU64 = AtomicU64::new(0);

/// Default cap on distinct subgoals per store.
///
/// Exists to turn runaway tabled recursion into a reportable resource error
/// instead of unbounded memory growth. Override via TABOR_MAX_SUBGOALS.
const DEFAULT_MAX_SUBGOALS: usize = 1_000_000;

/// Recoverable table resource errors.
#[derive(Debug)]
pub enum TableError {
    /// The store reached its configured subgoal cap. The trie is unchanged.
    SubgoalLimit { limit: usize },
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::SubgoalLimit { limit } => {
                write!(f, "call table exhausted: subgoal limit {} reached", limit)
            }
        }
    }
}

impl std::error::Error for TableError {}

#[derive(Default)]
struct TrieNode {
    edges: HashMap<Term, TrieNode>,
    record: Option<Arc<Subgoal>>,
}

struct TableInner {
    roots: HashMap<ProcId, TrieNode>,
    /// Flat view of every record, for completion passes, diagnostics and
    /// reset. The trie owns the canonical paths; this is bookkeeping.
    subgoals: Vec<Arc<Subgoal>>,
}

/// A call table with an explicit init/reset lifecycle.
///
/// A process-wide default instance exists for generated code
/// (`table_store()`); embedders and tests can create independent stores.
pub struct TableStore {
    inner: Mutex<TableInner>,
    max_subgoals: usize,
}

impl TableStore {
    /// Create an empty store with the subgoal cap from the environment
    /// (TABOR_MAX_SUBGOALS), or the default.
    pub fn new() -> TableStore {
        TableStore::with_subgoal_limit(max_subgoals_from_env())
    }

    /// Create an empty store with an explicit subgoal cap.
    pub fn with_subgoal_limit(max_subgoals: usize) -> TableStore {
        TableStore {
            inner: Mutex::new(TableInner {
                roots: HashMap::new(),
                subgoals: Vec::new(),
            }),
            max_subgoals,
        }
    }

    /// Find or create the subgoal record for a call.
    ///
    /// Returns the record and whether this call created it. The cap is
    /// checked before any trie mutation, so a failed lookup leaves the
    /// store exactly as it was.
    pub fn lookup_or_create(
        &self,
        proc: ProcId,
        proc_name: &Arc<str>,
        args: &[Term],
        arg_values: &[Value],
    ) -> Result<(Arc<Subgoal>, bool), TableError> {
        TABLE_LOOKUPS.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();

        // Walk without mutating first: hits must not pay for the cap check.
        if let Some(existing) = lookup_existing(&inner.roots, proc, args) {
            TABLE_HITS.fetch_add(1, Ordering::Relaxed);
            return Ok((existing, false));
        }

        if inner.subgoals.len() >= self.max_subgoals {
            return Err(TableError::SubgoalLimit {
                limit: self.max_subgoals,
            });
        }

        let mut node = inner.roots.entry(proc).or_insert_with(|| {
            TRIE_NODES_CREATED.fetch_add(1, Ordering::Relaxed);
            TrieNode::default()
        });
        for term in args {
            node = node.edges.entry(term.clone()).or_insert_with(|| {
                TRIE_NODES_CREATED.fetch_add(1, Ordering::Relaxed);
                TrieNode::default()
            });
        }
        debug_assert!(node.record.is_none(), "trie leaf reached twice on miss");

        let subgoal = Subgoal::new(
            proc,
            Arc::clone(proc_name),
            args.to_vec().into_boxed_slice(),
            arg_values.to_vec().into_boxed_slice(),
        );
        node.record = Some(Arc::clone(&subgoal));
        inner.subgoals.push(Arc::clone(&subgoal));
        SUBGOALS_CREATED.fetch_add(1, Ordering::Relaxed);
        Ok((subgoal, true))
    }

    /// Number of distinct subgoals ever created in this store.
    pub fn subgoal_count(&self) -> usize {
        self.lock().subgoals.len()
    }

    /// Snapshot of all records (cheap Arc clones), for diagnostics and
    /// completion passes.
    pub fn subgoals(&self) -> Vec<Arc<Subgoal>> {
        self.lock().subgoals.clone()
    }

    /// Drop every subgoal and trie node. The only destruction point for
    /// completed subgoals during a process lifetime.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.roots.clear();
        inner.subgoals.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TableInner> {
        self.inner
            .lock()
            .expect("call table mutex poisoned - evaluation panicked mid-insert")
    }
}

impl Default for TableStore {
    fn default() -> Self {
        TableStore::new()
    }
}

fn lookup_existing(
    roots: &HashMap<ProcId, TrieNode>,
    proc: ProcId,
    args: &[Term],
) -> Option<Arc<Subgoal>> {
    let mut node = roots.get(&proc)?;
    for term in args {
        node = node.edges.get(term)?;
    }
    node.record.as_ref().map(Arc::clone)
}

fn max_subgoals_from_env() -> usize {
    match std::env::var("TABOR_MAX_SUBGOALS") {
        Ok(s) if s.is_empty() => DEFAULT_MAX_SUBGOALS,
        Ok(s) => match s.parse::<usize>() {
            Ok(0) | Err(_) => {
                eprintln!(
                    "Warning: TABOR_MAX_SUBGOALS='{}' is not a valid positive integer, using default {}",
                    s, DEFAULT_MAX_SUBGOALS
                );
                DEFAULT_MAX_SUBGOALS
            }
            Ok(n) => n,
        },
        Err(_) => DEFAULT_MAX_SUBGOALS,
    }
}

/// The process-wide table used by generated code.
pub fn table_store() -> &'static TableStore {
    static STORE: OnceLock<TableStore> = OnceLock::new();
    STORE.get_or_init(TableStore::new)
}

/// Reset the process-wide table between independent top-level invocations.
///
/// # Safety
/// Must not be called while any query is mid-evaluation; records reachable
/// from suspended work would be orphaned.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_table_reset() {
    table_store().reset();
}

// Public re-export with short name for internal use
pub use patch_tabor_table_reset as table_reset;

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> Arc<str> {
        Arc::from("p")
    }

    #[test]
    fn test_same_args_share_a_record() {
        let store = TableStore::new();
        let args = [Term::Int(1), Term::String(Arc::from("x"))];
        let vals = [Value::Int(1), Value::string("x")];

        let (first, created) = store
            .lookup_or_create(ProcId(0), &name(), &args, &vals)
            .unwrap();
        assert!(created);

        let (second, created) = store
            .lookup_or_create(ProcId(0), &name(), &args, &vals)
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.subgoal_count(), 1);
    }

    #[test]
    fn test_distinct_args_get_distinct_records() {
        let store = TableStore::new();
        let (a, _) = store
            .lookup_or_create(ProcId(0), &name(), &[Term::Int(1)], &[Value::Int(1)])
            .unwrap();
        let (b, _) = store
            .lookup_or_create(ProcId(0), &name(), &[Term::Int(2)], &[Value::Int(2)])
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.subgoal_count(), 2);
    }

    #[test]
    fn test_distinct_procs_do_not_collide() {
        let store = TableStore::new();
        let (a, _) = store
            .lookup_or_create(ProcId(0), &name(), &[Term::Int(1)], &[Value::Int(1)])
            .unwrap();
        let (b, _) = store
            .lookup_or_create(ProcId(1), &name(), &[Term::Int(1)], &[Value::Int(1)])
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_structural_term_paths() {
        // Structurally equal functor terms built separately share a path.
        let store = TableStore::new();
        let t1 = Term::Functor(1, Box::new([Term::Int(1), Term::Int(2)]));
        let t2 = Term::Functor(1, Box::new([Term::Int(1), Term::Int(2)]));
        let v = Value::functor(1, vec![Value::Int(1), Value::Int(2)]);

        let (a, _) = store
            .lookup_or_create(ProcId(0), &name(), &[t1], &[v.clone()])
            .unwrap();
        let (b, created) = store
            .lookup_or_create(ProcId(0), &name(), &[t2], &[v])
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_subgoal_limit_is_a_clean_error() {
        let store = TableStore::with_subgoal_limit(2);
        for i in 0..2 {
            store
                .lookup_or_create(ProcId(0), &name(), &[Term::Int(i)], &[Value::Int(i)])
                .unwrap();
        }
        let err = store
            .lookup_or_create(ProcId(0), &name(), &[Term::Int(99)], &[Value::Int(99)])
            .unwrap_err();
        assert!(matches!(err, TableError::SubgoalLimit { limit: 2 }));
        // The failed insert left nothing behind.
        assert_eq!(store.subgoal_count(), 2);
        // Hits on existing records still succeed at the cap.
        let (_, created) = store
            .lookup_or_create(ProcId(0), &name(), &[Term::Int(0)], &[Value::Int(0)])
            .unwrap();
        assert!(!created);
    }

    #[test]
    fn test_reset_empties_the_store() {
        let store = TableStore::new();
        store
            .lookup_or_create(ProcId(0), &name(), &[Term::Int(1)], &[Value::Int(1)])
            .unwrap();
        store.reset();
        assert_eq!(store.subgoal_count(), 0);
        let (_, created) = store
            .lookup_or_create(ProcId(0), &name(), &[Term::Int(1)], &[Value::Int(1)])
            .unwrap();
        assert!(created);
    }

    #[test]
    fn test_zero_arity_call_has_a_record() {
        let store = TableStore::new();
        let (a, created) = store
            .lookup_or_create(ProcId(3), &name(), &[], &[])
            .unwrap();
        assert!(created);
        let (b, created) = store
            .lookup_or_create(ProcId(3), &name(), &[], &[])
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
