//! Subgoal records: per-call tabling state
//!
//! One `Subgoal` exists per distinct tabled call (procedure + canonical
//! argument terms). It is created on first reach, mutated only under its own
//! mutex, and destroyed only by a table reset - completed subgoals keep
//! their answers for the life of the process so later calls replay them.
//!
//! Writer discipline: only the engine that owns the subgoal (its generator)
//! appends answers or advances the status; consumers read answers and move
//! their own cursor. Concurrent engines that reach a foreign-owned subgoal
//! never touch its state beyond observing status and answer count.

use crate::scheduler::{EngineId, ProcId, ResumeFn};
use crate::term::Term;
use std::sync::{Arc, Mutex, MutexGuard};
use tabor_core::value::Value;

/// Lifecycle of a tabled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgoalStatus {
    /// Created but no evaluation has reached it yet.
    Inactive,
    /// The first evaluation to reach the call is running its body.
    ActiveGenerator,
    /// The generator has exhausted its direct body steps; any further
    /// answers can only arrive through its suspended consumers.
    ActiveConsuming,
    /// Fixpoint reached; the answer list is final and replayed to all
    /// later calls.
    Complete,
}

/// A suspended evaluation waiting on a subgoal's answers.
///
/// The continuation is an explicit value: a resume function plus the saved
/// environment, re-entered once per answer in answer-list order. `home` is
/// the subgoal whose derivations the resumptions extend (not the subgoal
/// the consumer is attached to).
pub struct Consumer {
    pub home: Arc<Subgoal>,
    pub env: Box<[Value]>,
    pub resume: ResumeFn,
    /// Number of answers already delivered to this consumer.
    pub cursor: usize,
    /// Whether a resumption for this consumer is already queued. At most
    /// one is in flight, which is what keeps delivery in answer order.
    pub scheduled: bool,
}

pub(crate) struct SubgoalState {
    pub status: SubgoalStatus,
    /// Engine that owns the generator while the subgoal is active.
    pub owner: Option<EngineId>,
    /// Append-only, deduplicated, in production order.
    pub answers: Vec<Arc<[Value]>>,
    /// Currently-suspended consumers of this subgoal.
    pub consumers: Vec<Consumer>,
    /// Work items queued on behalf of this subgoal's own derivation.
    pub outstanding: usize,
}

/// One entry per distinct tabled call.
pub struct Subgoal {
    pub proc: ProcId,
    pub proc_name: Arc<str>,
    /// Canonical argument terms (the trie path that leads here).
    pub args: Box<[Term]>,
    /// The original argument values, for re-entering the body.
    pub arg_values: Box<[Value]>,
    state: Mutex<SubgoalState>,
}

impl std::fmt::Debug for Subgoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subgoal")
            .field("proc", &self.proc)
            .field("proc_name", &self.proc_name)
            .field("args", &self.args)
            .field("arg_values", &self.arg_values)
            .finish_non_exhaustive()
    }
}

impl Subgoal {
    pub fn new(
        proc: ProcId,
        proc_name: Arc<str>,
        args: Box<[Term]>,
        arg_values: Box<[Value]>,
    ) -> Arc<Subgoal> {
        Arc::new(Subgoal {
            proc,
            proc_name,
            args,
            arg_values,
            state: Mutex::new(SubgoalState {
                status: SubgoalStatus::Inactive,
                owner: None,
                answers: Vec::new(),
                consumers: Vec::new(),
                outstanding: 0,
            }),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SubgoalState> {
        self.state
            .lock()
            .expect("subgoal mutex poisoned - evaluation panicked mid-update")
    }

    pub fn status(&self) -> SubgoalStatus {
        self.lock().status
    }

    pub fn is_complete(&self) -> bool {
        self.status() == SubgoalStatus::Complete
    }

    /// Claim the generator role. Succeeds for exactly one caller; everyone
    /// else sees the subgoal as already active.
    pub fn begin_generator(&self, engine: EngineId) -> bool {
        let mut st = self.lock();
        if st.status == SubgoalStatus::Inactive {
            st.status = SubgoalStatus::ActiveGenerator;
            st.owner = Some(engine);
            true
        } else {
            false
        }
    }

    pub fn owner(&self) -> Option<EngineId> {
        self.lock().owner
    }

    /// Snapshot of the answer list (cheap: answers are Arc tuples).
    pub fn answers(&self) -> Vec<Arc<[Value]>> {
        self.lock().answers.clone()
    }

    pub fn answer_count(&self) -> usize {
        self.lock().answers.len()
    }

    /// Final transition. Consumers have delivered everything by the time
    /// this is called; their records are discarded here.
    pub(crate) fn complete(&self) {
        let mut st = self.lock();
        debug_assert!(
            st.consumers
                .iter()
                .all(|c| c.cursor == st.answers.len() && !c.scheduled),
            "completing {} with undelivered answers",
            self.proc_name
        );
        st.status = SubgoalStatus::Complete;
        st.owner = None;
        st.consumers.clear();
    }

    /// Abandon an in-progress evaluation after a resource error: the record
    /// survives (the trie stays consistent) but reverts to untouched so a
    /// later call re-evaluates from scratch.
    pub(crate) fn abandon(&self) {
        let mut st = self.lock();
        st.status = SubgoalStatus::Inactive;
        st.owner = None;
        st.answers.clear();
        st.consumers.clear();
        st.outstanding = 0;
    }

    /// "name(arg, arg, ...)" form for deadlock reports and diagnostics.
    pub fn display_call(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|t| format!("{:?}", t)).collect();
        format!("{}({})", self.proc_name, args.join(", "))
    }
}
