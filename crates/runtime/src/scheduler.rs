//! Generator/consumer scheduler for tabled evaluation
//!
//! The first evaluation to reach a tabled call becomes its **generator** and
//! runs the procedure body. Any evaluation that reaches the same call while
//! the generator is still active becomes a **consumer**: it does not re-run
//! the body, it suspends and is resumed once per answer, in the exact order
//! the generator produced them. The cycle of wake-ups continues until no new
//! answers appear anywhere - the minimal-model fixpoint - at which point
//! every subgoal involved flips to complete and later calls replay stored
//! answers directly.
//!
//! ## Suspension without stack switching
//!
//! A suspension is an explicit continuation value: a resume function plus
//! the environment saved when the call was made. Procedure bodies are
//! written (by the compiler) in this step form:
//!
//! - `Step::Answer(tuple)` delivers one answer for the current call
//! - `Step::Call { .. }` suspends on a nested tabled call; the scheduler
//!   re-enters the resume function once per answer, and each re-entry
//!   returns further steps
//!
//! A FIFO work queue drives everything, so a consumer can never race ahead
//! of the generator it depends on. There are no threads inside one
//! evaluation; the only blocking point is reaching a subgoal owned by a
//! *different* concurrent query, which waits cooperatively (and reports a
//! fatal scheduling deadlock if the wait stops making progress).

use crate::dispatch::unify;
use crate::subgoal::{Consumer, Subgoal, SubgoalStatus};
use crate::table::{TableStore, table_store};
use crate::term::{Term, canonicalize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tabor_core::error::set_runtime_error;
use tabor_core::type_info::TypeInfo;
use tabor_core::value::Value;

// Tabling statistics (for diagnostics and the at-exit report)
pub static ANSWERS_STORED: AtomicU64 = AtomicU64::new(0);
pub static DUPLICATES_SUPPRESSED: AtomicU64 = AtomicU64::new(0);
pub static CONSUMERS_SUSPENDED: AtomicU64 = AtomicU64::new(0);
pub static CONSUMERS_RESUMED: AtomicU64 = AtomicU64::new(0);

// Unique engine ids: one per top-level evaluation.
static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a registered tabled procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcId(pub u32);

/// Identifies one top-level evaluation (generator/consumer graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineId(pub u64);

/// A procedure body: argument values to initial steps.
pub type BodyFn = fn(&[Value]) -> Vec<Step>;

/// A suspended continuation: saved environment + one delivered answer to
/// further steps.
pub type ResumeFn = fn(&[Value], &[Value]) -> Vec<Step>;

/// One step of a tabled procedure body.
pub enum Step {
    /// Deliver an answer tuple for the current call.
    Answer(Vec<Value>),
    /// Suspend on a nested tabled call. `resume(env, answer)` runs once per
    /// answer of that call, in answer order.
    Call {
        proc: ProcId,
        args: Vec<Value>,
        env: Vec<Value>,
        resume: ResumeFn,
    },
}

/// A registered tabled procedure.
#[derive(Clone)]
pub struct TabledProc {
    pub name: Arc<str>,
    pub arg_types: Arc<[TypeInfo]>,
    pub answer_types: Arc<[TypeInfo]>,
    pub body: BodyFn,
}

/// Procedure registry: ProcId is the registration index. Generated code
/// registers its tabled procedures at init; ids are stable afterwards.
#[derive(Default, Clone)]
pub struct ProcRegistry {
    procs: Vec<TabledProc>,
}

impl ProcRegistry {
    pub fn new() -> ProcRegistry {
        ProcRegistry { procs: Vec::new() }
    }

    pub fn register(&mut self, proc: TabledProc) -> ProcId {
        let id = ProcId(self.procs.len() as u32);
        self.procs.push(proc);
        id
    }

    /// An unknown id means generated code and the registry disagree about
    /// what was linked - corruption, not a lookup failure.
    pub fn get(&self, id: ProcId) -> &TabledProc {
        self.procs.get(id.0 as usize).unwrap_or_else(|| {
            panic!(
                "descriptor corruption: unknown tabled procedure id {} ({} registered)",
                id.0,
                self.procs.len()
            )
        })
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}

/// The process-wide registry used by generated code.
pub fn global_procs() -> &'static Mutex<ProcRegistry> {
    static PROCS: OnceLock<Mutex<ProcRegistry>> = OnceLock::new();
    PROCS.get_or_init(|| Mutex::new(ProcRegistry::new()))
}

/// Register a tabled procedure in the process-wide registry.
pub fn register_proc(proc: TabledProc) -> ProcId {
    global_procs()
        .lock()
        .expect("procedure registry mutex poisoned")
        .register(proc)
}

/// Recoverable evaluation failures. Everything else in this module is
/// either ordinary finite failure (empty answer list) or fatal.
#[derive(Debug)]
pub enum SolveError {
    /// Table resource exhaustion; the evaluation was abandoned and its
    /// subgoals reverted so a later call can retry.
    Resource(String),
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveError::Resource(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SolveError {}

// =============================================================================
// The engine
// =============================================================================

enum Work {
    /// Run a fresh generator's body.
    Generate(Arc<Subgoal>),
    /// Process one step on behalf of `home`'s derivation.
    Step { home: Arc<Subgoal>, step: Step },
    /// Deliver the next undelivered answer to one consumer.
    Resume {
        subgoal: Arc<Subgoal>,
        consumer: usize,
    },
}

struct Engine<'a> {
    id: EngineId,
    store: &'a TableStore,
    procs: &'a ProcRegistry,
    queue: VecDeque<Work>,
    /// Subgoals whose generator this engine owns; all flip to Complete at
    /// fixpoint, or revert on a resource error.
    touched: Vec<Arc<Subgoal>>,
}

/// Evaluate one tabled call to completion and return its answers.
///
/// Either this call claims the generator role and drives the whole
/// dependency graph it discovers to its fixpoint, or the subgoal is already
/// complete (replay), or another engine owns it (cooperative wait).
pub fn solve(
    store: &TableStore,
    procs: &ProcRegistry,
    proc: ProcId,
    args: &[Value],
) -> Result<Vec<Arc<[Value]>>, SolveError> {
    let tp = procs.get(proc);
    let terms = canonical_args(tp, args);

    let (subgoal, _created) = store
        .lookup_or_create(proc, &tp.name, &terms, args)
        .map_err(|e| resource(e.to_string()))?;

    let engine_id = EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed));
    match claim_or_wait(&subgoal, engine_id) {
        Claim::Generator => {
            let mut engine = Engine {
                id: engine_id,
                store,
                procs,
                queue: VecDeque::new(),
                touched: vec![Arc::clone(&subgoal)],
            };
            engine.enqueue_generate(Arc::clone(&subgoal));
            match engine.run() {
                Ok(()) => {
                    engine.finish();
                    Ok(subgoal.answers())
                }
                Err(e) => {
                    engine.abandon();
                    Err(e)
                }
            }
        }
        Claim::Completed => Ok(subgoal.answers()),
        // Top-level solve starts a fresh engine, so the subgoal can never
        // already belong to it.
        Claim::Ours => unreachable!("fresh engine cannot own an active subgoal"),
    }
}

fn canonical_args(tp: &TabledProc, args: &[Value]) -> Vec<Term> {
    if args.len() != tp.arg_types.len() {
        panic!(
            "descriptor corruption: {} called with {} arguments (declared {})",
            tp.name,
            args.len(),
            tp.arg_types.len()
        );
    }
    args.iter()
        .zip(tp.arg_types.iter())
        .map(|(v, ti)| canonicalize(ti, v))
        .collect()
}

fn resource(msg: String) -> SolveError {
    set_runtime_error(msg.clone());
    SolveError::Resource(msg)
}

enum Claim {
    /// We are the generator.
    Generator,
    /// This engine already owns the subgoal's generator.
    Ours,
    /// The subgoal is complete; replay its answers.
    Completed,
}

/// Claim the generator role, or wait until the subgoal completes under its
/// foreign owner. A bounded no-progress pass count turns a mutually
/// suspended cross-engine cycle into a fatal scheduling failure.
fn claim_or_wait(subgoal: &Arc<Subgoal>, engine: EngineId) -> Claim {
    let limit = deadlock_passes();
    let mut passes = 0usize;
    let mut last = (subgoal.status(), subgoal.answer_count());
    loop {
        if subgoal.begin_generator(engine) {
            return Claim::Generator;
        }
        match subgoal.status() {
            SubgoalStatus::Complete => return Claim::Completed,
            _ => {
                if subgoal.owner() == Some(engine) {
                    return Claim::Ours;
                }
            }
        }
        // Foreign-owned (or just abandoned - the next loop claims it).
        may::coroutine::yield_now();
        std::thread::yield_now();
        let now = (subgoal.status(), subgoal.answer_count());
        if now == last {
            passes += 1;
            if passes >= limit {
                panic!(
                    "scheduling deadlock: no generator progress after {} passes waiting on {}",
                    limit,
                    subgoal.display_call()
                );
            }
        } else {
            passes = 0;
            last = now;
        }
    }
}

impl Engine<'_> {
    fn run(&mut self) -> Result<(), SolveError> {
        while let Some(work) = self.queue.pop_front() {
            match work {
                Work::Generate(subgoal) => {
                    let body = self.procs.get(subgoal.proc).body;
                    let steps = body(&subgoal.arg_values);
                    for step in steps {
                        self.enqueue_step(Arc::clone(&subgoal), step);
                    }
                    self.finish_work(&subgoal);
                }
                Work::Step { home, step } => {
                    let result = match step {
                        Step::Answer(tuple) => {
                            self.deliver_answer(&home, tuple);
                            Ok(())
                        }
                        Step::Call {
                            proc,
                            args,
                            env,
                            resume,
                        } => self.make_call(&home, proc, args, env, resume),
                    };
                    self.finish_work(&home);
                    result?;
                }
                Work::Resume { subgoal, consumer } => {
                    self.resume_consumer(&subgoal, consumer);
                }
            }
        }
        Ok(())
    }

    /// Queue empty: nothing can derive another answer, so every subgoal this
    /// engine generated is at its fixpoint.
    fn finish(&mut self) {
        for subgoal in &self.touched {
            subgoal.complete();
        }
    }

    /// Resource failure: abandon the evaluation, reverting every owned
    /// subgoal so a later call re-evaluates from scratch.
    fn abandon(&mut self) {
        self.queue.clear();
        for subgoal in &self.touched {
            subgoal.abandon();
        }
    }

    fn enqueue_generate(&mut self, subgoal: Arc<Subgoal>) {
        subgoal.lock().outstanding += 1;
        self.queue.push_back(Work::Generate(subgoal));
    }

    fn enqueue_step(&mut self, home: Arc<Subgoal>, step: Step) {
        home.lock().outstanding += 1;
        self.queue.push_back(Work::Step { home, step });
    }

    fn enqueue_resume(&mut self, subgoal: Arc<Subgoal>, consumer: usize, home: &Arc<Subgoal>) {
        home.lock().outstanding += 1;
        self.queue.push_back(Work::Resume { subgoal, consumer });
    }

    /// One queued item for `subgoal`'s derivation retired. When the count
    /// hits zero the generator has (for now) exhausted its direct steps:
    /// anything further must arrive through a suspended consumer.
    fn finish_work(&mut self, subgoal: &Arc<Subgoal>) {
        let mut st = subgoal.lock();
        debug_assert!(st.outstanding > 0, "outstanding underflow");
        st.outstanding -= 1;
        if st.outstanding == 0 && st.status == SubgoalStatus::ActiveGenerator {
            st.status = SubgoalStatus::ActiveConsuming;
        }
    }

    /// Append an answer unless an existing one unifies with it, then wake
    /// every consumer whose cursor is behind the new count.
    fn deliver_answer(&mut self, home: &Arc<Subgoal>, tuple: Vec<Value>) {
        let tp = self.procs.get(home.proc);
        if tuple.len() != tp.answer_types.len() {
            panic!(
                "descriptor corruption: {} produced an answer of width {} (declared {})",
                tp.name,
                tuple.len(),
                tp.answer_types.len()
            );
        }

        let mut wake = Vec::new();
        {
            let mut st = home.lock();
            let duplicate = st.answers.iter().any(|existing| {
                tp.answer_types
                    .iter()
                    .enumerate()
                    .all(|(i, ti)| unify(ti, &existing[i], &tuple[i]))
            });
            if duplicate {
                DUPLICATES_SUPPRESSED.fetch_add(1, Ordering::Relaxed);
                return;
            }
            st.answers.push(tuple.into());
            ANSWERS_STORED.fetch_add(1, Ordering::Relaxed);

            let count = st.answers.len();
            for (idx, c) in st.consumers.iter_mut().enumerate() {
                if !c.scheduled && c.cursor < count {
                    c.scheduled = true;
                    wake.push((idx, Arc::clone(&c.home)));
                }
            }
        }
        for (idx, consumer_home) in wake {
            self.enqueue_resume(Arc::clone(home), idx, &consumer_home);
        }
    }

    /// A nested tabled call on behalf of `home`.
    fn make_call(
        &mut self,
        home: &Arc<Subgoal>,
        proc: ProcId,
        args: Vec<Value>,
        env: Vec<Value>,
        resume: ResumeFn,
    ) -> Result<(), SolveError> {
        let callee = self.procs.get(proc);
        let terms = canonical_args(callee, &args);
        let (subgoal, _created) = self
            .store
            .lookup_or_create(proc, &callee.name, &terms, &args)
            .map_err(|e| resource(e.to_string()))?;

        match claim_or_wait(&subgoal, self.id) {
            Claim::Generator => {
                self.touched.push(Arc::clone(&subgoal));
                self.enqueue_generate(Arc::clone(&subgoal));
                self.attach_consumer(&subgoal, home, env, resume);
            }
            Claim::Ours => {
                // Reaching our own active subgoal again - possibly the
                // generator becoming (indirectly) its own consumer, which is
                // legal even with zero answers so far: it just suspends
                // until something else makes progress.
                self.attach_consumer(&subgoal, home, env, resume);
            }
            Claim::Completed => {
                // Replay: no suspension, no consumer record; the stored
                // answers feed the continuation directly, in order.
                for answer in subgoal.answers() {
                    let steps = resume(&env, &answer);
                    for step in steps {
                        self.enqueue_step(Arc::clone(home), step);
                    }
                }
            }
        }
        Ok(())
    }

    fn attach_consumer(
        &mut self,
        subgoal: &Arc<Subgoal>,
        home: &Arc<Subgoal>,
        env: Vec<Value>,
        resume: ResumeFn,
    ) {
        CONSUMERS_SUSPENDED.fetch_add(1, Ordering::Relaxed);
        let idx;
        let behind;
        {
            let mut st = subgoal.lock();
            idx = st.consumers.len();
            behind = !st.answers.is_empty();
            st.consumers.push(Consumer {
                home: Arc::clone(home),
                env: env.into_boxed_slice(),
                resume,
                cursor: 0,
                scheduled: behind,
            });
        }
        if behind {
            self.enqueue_resume(Arc::clone(subgoal), idx, home);
        }
    }

    /// Deliver exactly one answer to one consumer, then reschedule it if it
    /// is still behind. Sequential cursor + FIFO queue = answers observed in
    /// production order, each exactly once.
    fn resume_consumer(&mut self, subgoal: &Arc<Subgoal>, consumer: usize) {
        let home;
        let delivery;
        {
            let mut st = subgoal.lock();
            let count = st.answers.len();
            let cursor = st.consumers[consumer].cursor;
            debug_assert!(
                st.consumers[consumer].scheduled,
                "resumed an unscheduled consumer"
            );
            home = Arc::clone(&st.consumers[consumer].home);
            if cursor < count {
                let answer = Arc::clone(&st.answers[cursor]);
                let c = &mut st.consumers[consumer];
                c.cursor += 1;
                let still_behind = c.cursor < count;
                c.scheduled = still_behind;
                delivery = Some((c.resume, c.env.to_vec(), answer, still_behind));
            } else {
                st.consumers[consumer].scheduled = false;
                delivery = None;
            }
        }

        if let Some((resume, env, answer, still_behind)) = delivery {
            if still_behind {
                self.enqueue_resume(Arc::clone(subgoal), consumer, &home);
            }
            CONSUMERS_RESUMED.fetch_add(1, Ordering::Relaxed);
            let steps = resume(&env, &answer);
            for step in steps {
                self.enqueue_step(Arc::clone(&home), step);
            }
        }
        self.finish_work(&home);
    }
}

// =============================================================================
// Deadlock pass limit (TABOR_DEADLOCK_PASSES)
// =============================================================================

/// Default no-progress pass bound for cross-engine waits.
const DEFAULT_DEADLOCK_PASSES: usize = 200_000;

static DEADLOCK_PASSES: OnceLock<usize> = OnceLock::new();

/// Parse the pass bound from an optional string value.
/// Returns the default if the value is missing, zero, or invalid, with a
/// warning to stderr for invalid values.
fn parse_deadlock_passes(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => match val.parse::<usize>() {
            Ok(0) => {
                eprintln!(
                    "Warning: TABOR_DEADLOCK_PASSES=0 is invalid, using default {}",
                    DEFAULT_DEADLOCK_PASSES
                );
                DEFAULT_DEADLOCK_PASSES
            }
            Ok(n) => n,
            Err(_) => {
                eprintln!(
                    "Warning: TABOR_DEADLOCK_PASSES='{}' is not a valid number, using default {}",
                    val, DEFAULT_DEADLOCK_PASSES
                );
                DEFAULT_DEADLOCK_PASSES
            }
        },
        None => DEFAULT_DEADLOCK_PASSES,
    }
}

fn deadlock_passes() -> usize {
    *DEADLOCK_PASSES
        .get_or_init(|| parse_deadlock_passes(std::env::var("TABOR_DEADLOCK_PASSES").ok()))
}

// =============================================================================
// Answer streams: the per-call FFI entry point
// =============================================================================

/// The "request next answer / answer-or-exhausted" stream handed to
/// generated code for one tabled call.
pub struct AnswerStream {
    answers: Vec<Arc<[Value]>>,
    pos: usize,
}

impl AnswerStream {
    pub fn next_tuple(&mut self) -> Option<Arc<[Value]>> {
        let tuple = self.answers.get(self.pos)?;
        self.pos += 1;
        Some(Arc::clone(tuple))
    }

    pub fn remaining(&self) -> usize {
        self.answers.len() - self.pos
    }
}

/// Evaluate a tabled call against the process-wide table and registry.
///
/// Returns a stream handle, or null with the thread-local error set on a
/// resource failure. Descriptor corruption and scheduling deadlock abort.
///
/// # Safety
/// `args` must point to `nargs` valid `Value`s (or be null when `nargs` is
/// zero). The returned stream must be released with
/// `patch_tabor_answer_stream_free`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_table_call(
    proc: u32,
    args: *const Value,
    nargs: usize,
) -> *mut AnswerStream {
    let args = if nargs == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(args, nargs) }
    };
    let procs = global_procs()
        .lock()
        .expect("procedure registry mutex poisoned")
        .clone();
    match solve(table_store(), &procs, ProcId(proc), args) {
        Ok(answers) => Box::into_raw(Box::new(AnswerStream { answers, pos: 0 })),
        Err(e) => {
            set_runtime_error(e.to_string());
            std::ptr::null_mut()
        }
    }
}

/// Fetch the next answer from a stream.
///
/// Writes the answer tuple into `out` as an array value and returns true,
/// or returns false when the stream is exhausted (ordinary finite failure).
///
/// # Safety
/// `stream` must come from `patch_tabor_table_call` and not have been
/// freed; `out` must point to writable, possibly-uninitialized storage for
/// one `Value`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_answer_next(
    stream: *mut AnswerStream,
    out: *mut Value,
) -> bool {
    let stream = unsafe { &mut *stream };
    match stream.next_tuple() {
        Some(tuple) => {
            unsafe { std::ptr::write(out, Value::array(tuple.to_vec())) };
            true
        }
        None => false,
    }
}

/// Release a stream.
///
/// # Safety
/// `stream` must come from `patch_tabor_table_call`; null is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_answer_stream_free(stream: *mut AnswerStream) {
    if !stream.is_null() {
        drop(unsafe { Box::from_raw(stream) });
    }
}

// Public re-exports with short names for internal use
pub use patch_tabor_answer_next as answer_next;
pub use patch_tabor_answer_stream_free as answer_stream_free;
pub use patch_tabor_table_call as table_call;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::int_type;
    use std::sync::atomic::AtomicU32;

    fn as_int(v: &Value) -> i64 {
        match v {
            Value::Int(n) => *n,
            other => panic!("expected Int, got {:?}", other),
        }
    }

    fn int_proc(name: &str, arity: usize, answers: usize, body: BodyFn) -> TabledProc {
        TabledProc {
            name: Arc::from(name),
            arg_types: (0..arity).map(|_| int_type()).collect(),
            answer_types: (0..answers).map(|_| int_type()).collect(),
            body,
        }
    }

    fn answer_ints(answers: &[Arc<[Value]>]) -> Vec<i64> {
        answers.iter().map(|t| as_int(&t[0])).collect()
    }

    // -------------------------------------------------------------------------
    // Memoized fibonacci: direct recursion, body entered once per argument
    // -------------------------------------------------------------------------

    const FIB: ProcId = ProcId(0);
    static FIB_BODY_CALLS: AtomicU32 = AtomicU32::new(0);

    fn fib_body(args: &[Value]) -> Vec<Step> {
        FIB_BODY_CALLS.fetch_add(1, Ordering::SeqCst);
        let n = as_int(&args[0]);
        if n < 2 {
            vec![Step::Answer(vec![Value::Int(n)])]
        } else {
            vec![Step::Call {
                proc: FIB,
                args: vec![Value::Int(n - 1)],
                env: vec![Value::Int(n)],
                resume: fib_after_first,
            }]
        }
    }

    fn fib_after_first(env: &[Value], answer: &[Value]) -> Vec<Step> {
        let n = as_int(&env[0]);
        let f1 = as_int(&answer[0]);
        vec![Step::Call {
            proc: FIB,
            args: vec![Value::Int(n - 2)],
            env: vec![Value::Int(f1)],
            resume: fib_after_second,
        }]
    }

    fn fib_after_second(env: &[Value], answer: &[Value]) -> Vec<Step> {
        let f1 = as_int(&env[0]);
        let f2 = as_int(&answer[0]);
        vec![Step::Answer(vec![Value::Int(f1 + f2)])]
    }

    #[test]
    fn test_fib_memoization_runs_body_once_per_argument() {
        let mut procs = ProcRegistry::new();
        assert_eq!(procs.register(int_proc("fib", 1, 1, fib_body)), FIB);
        let store = TableStore::new();

        FIB_BODY_CALLS.store(0, Ordering::SeqCst);
        let first = solve(&store, &procs, FIB, &[Value::Int(10)]).unwrap();
        assert_eq!(answer_ints(&first), vec![55]);
        // Eleven distinct subgoals: fib(0) through fib(10).
        assert_eq!(FIB_BODY_CALLS.load(Ordering::SeqCst), 11);

        // Replay: same answer, no body re-entry.
        let second = solve(&store, &procs, FIB, &[Value::Int(10)]).unwrap();
        assert_eq!(answer_ints(&second), vec![55]);
        assert_eq!(FIB_BODY_CALLS.load(Ordering::SeqCst), 11);
    }

    // -------------------------------------------------------------------------
    // Transitive closure with direct left recursion over a cyclic graph
    // -------------------------------------------------------------------------

    const PATH: ProcId = ProcId(0);

    fn graph_edges(from: i64) -> &'static [i64] {
        match from {
            1 => &[2],
            2 => &[3, 4],
            3 => &[1],
            _ => &[],
        }
    }

    fn path_body(args: &[Value]) -> Vec<Step> {
        let x = as_int(&args[0]);
        let mut steps: Vec<Step> = graph_edges(x)
            .iter()
            .map(|y| Step::Answer(vec![Value::Int(*y)]))
            .collect();
        // path(X, Y) :- path(X, Z), edge(Z, Y): the generator immediately
        // becomes its own consumer, with zero answers so far.
        steps.push(Step::Call {
            proc: PATH,
            args: args.to_vec(),
            env: vec![],
            resume: path_extend,
        });
        steps
    }

    fn path_extend(_env: &[Value], answer: &[Value]) -> Vec<Step> {
        let z = as_int(&answer[0]);
        graph_edges(z)
            .iter()
            .map(|y| Step::Answer(vec![Value::Int(*y)]))
            .collect()
    }

    #[test]
    fn test_left_recursive_closure_over_cycle_terminates() {
        let mut procs = ProcRegistry::new();
        assert_eq!(procs.register(int_proc("path", 1, 1, path_body)), PATH);
        let store = TableStore::new();

        let answers = solve(&store, &procs, PATH, &[Value::Int(1)]).unwrap();
        let mut reachable = answer_ints(&answers);
        assert_eq!(reachable.len(), 4, "each node exactly once");
        reachable.sort_unstable();
        assert_eq!(reachable, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_replay_preserves_answer_order() {
        let mut procs = ProcRegistry::new();
        procs.register(int_proc("path", 1, 1, path_body));
        let store = TableStore::new();

        let first = answer_ints(&solve(&store, &procs, PATH, &[Value::Int(1)]).unwrap());
        let second = answer_ints(&solve(&store, &procs, PATH, &[Value::Int(1)]).unwrap());
        assert_eq!(first, second, "replay must preserve production order");
    }

    // -------------------------------------------------------------------------
    // Answer deduplication
    // -------------------------------------------------------------------------

    fn noisy_body(_args: &[Value]) -> Vec<Step> {
        vec![
            Step::Answer(vec![Value::Int(7)]),
            Step::Answer(vec![Value::Int(7)]),
            Step::Answer(vec![Value::Int(8)]),
            Step::Answer(vec![Value::Int(7)]),
        ]
    }

    #[test]
    fn test_duplicate_answers_are_suppressed() {
        let mut procs = ProcRegistry::new();
        let p = procs.register(int_proc("noisy", 0, 1, noisy_body));
        let store = TableStore::new();

        let answers = solve(&store, &procs, p, &[]).unwrap();
        assert_eq!(answer_ints(&answers), vec![7, 8]);
    }

    // -------------------------------------------------------------------------
    // Finite failure: empty minimal model is not an error
    // -------------------------------------------------------------------------

    fn barren_body(_args: &[Value]) -> Vec<Step> {
        vec![]
    }

    #[test]
    fn test_empty_model_completes_with_no_answers() {
        let mut procs = ProcRegistry::new();
        let p = procs.register(int_proc("barren", 0, 1, barren_body));
        let store = TableStore::new();

        let answers = solve(&store, &procs, p, &[]).unwrap();
        assert!(answers.is_empty());

        let subgoals = store.subgoals();
        assert_eq!(subgoals.len(), 1);
        assert_eq!(subgoals[0].status(), SubgoalStatus::Complete);
    }

    // -------------------------------------------------------------------------
    // Resource errors abandon cleanly
    // -------------------------------------------------------------------------

    const CHAIN: ProcId = ProcId(0);

    fn chain_body(args: &[Value]) -> Vec<Step> {
        let n = as_int(&args[0]);
        if n == 0 {
            vec![Step::Answer(vec![Value::Int(0)])]
        } else {
            vec![Step::Call {
                proc: CHAIN,
                args: vec![Value::Int(n - 1)],
                env: vec![],
                resume: chain_done,
            }]
        }
    }

    fn chain_done(_env: &[Value], answer: &[Value]) -> Vec<Step> {
        vec![Step::Answer(vec![Value::Int(as_int(&answer[0]))])]
    }

    #[test]
    fn test_table_exhaustion_is_recoverable() {
        let mut procs = ProcRegistry::new();
        assert_eq!(procs.register(int_proc("chain", 1, 1, chain_body)), CHAIN);
        // Room for two subgoals; chain(5) needs six.
        let store = TableStore::with_subgoal_limit(2);

        let err = solve(&store, &procs, CHAIN, &[Value::Int(5)]).unwrap_err();
        assert!(matches!(err, SolveError::Resource(_)));
        assert!(tabor_core::error::take_runtime_error().is_some());

        // Abandoned records reverted to untouched; the trie is consistent.
        for s in store.subgoals() {
            assert_eq!(s.status(), SubgoalStatus::Inactive);
            assert_eq!(s.answer_count(), 0);
        }

        // The abandoned records still occupy the cap; after a reset a query
        // that fits succeeds.
        store.reset();
        let answers = solve(&store, &procs, CHAIN, &[Value::Int(1)]).unwrap();
        assert_eq!(answer_ints(&answers), vec![0]);
    }

    // -------------------------------------------------------------------------
    // Answer stream protocol
    // -------------------------------------------------------------------------

    #[test]
    fn test_answer_stream_drains_in_order() {
        let mut stream = AnswerStream {
            answers: vec![
                Arc::from(vec![Value::Int(1)]),
                Arc::from(vec![Value::Int(2)]),
            ],
            pos: 0,
        };
        assert_eq!(stream.remaining(), 2);
        assert_eq!(as_int(&stream.next_tuple().unwrap()[0]), 1);
        assert_eq!(as_int(&stream.next_tuple().unwrap()[0]), 2);
        assert!(stream.next_tuple().is_none());
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn test_parse_deadlock_passes() {
        assert_eq!(parse_deadlock_passes(None), DEFAULT_DEADLOCK_PASSES);
        assert_eq!(parse_deadlock_passes(Some("500".into())), 500);
        assert_eq!(
            parse_deadlock_passes(Some("0".into())),
            DEFAULT_DEADLOCK_PASSES
        );
        assert_eq!(
            parse_deadlock_passes(Some("nope".into())),
            DEFAULT_DEADLOCK_PASSES
        );
    }
}
