//! Engine lifecycle - process-wide init and query management
//!
//! One tabled evaluation is single-engine and cooperative; what runs
//! concurrently are independent top-level queries, each with its own
//! generator/consumer graph, sharing the process-wide call table under its
//! locks. Queries run as May coroutines so a waiting engine yields instead
//! of blocking an OS thread.
//!
//! ## Panic Behavior
//!
//! Descriptor corruption and scheduling deadlocks panic by design (they are
//! linked-program invariant violations). Recoverable resource errors never
//! panic; they surface through the thread-local error state.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, Once, OnceLock};
use std::time::{Duration, Instant};

static ENGINE_INIT: Once = Once::new();
static ENGINE_START_TIME: OnceLock<Instant> = OnceLock::new();

// Query lifecycle tracking
//
// - ACTIVE_QUERIES: lock-free atomic counter for the hot path
//   (spawn/complete). Incremented on spawn, decremented on completion.
//
// - SHUTDOWN_CONDVAR/MUTEX: event-driven synchronization for the cold path
//   (waiting for all queries at shutdown). No polling, proper OS-level
//   blocking, and the mutex is never held while queries run.
pub static ACTIVE_QUERIES: AtomicUsize = AtomicUsize::new(0);
pub(crate) static SHUTDOWN_CONDVAR: Condvar = Condvar::new();
pub(crate) static SHUTDOWN_MUTEX: Mutex<()> = Mutex::new(());

// Query lifecycle statistics (for diagnostics)
//
// Lock-free counters:
// - TOTAL_QUERIES: monotonically increasing count of queries ever spawned
// - TOTAL_QUERIES_COMPLETED: monotonically increasing completion count
// - PEAK_QUERIES: high-water mark of concurrent queries
pub static TOTAL_QUERIES: AtomicU64 = AtomicU64::new(0);
pub static TOTAL_QUERIES_COMPLETED: AtomicU64 = AtomicU64::new(0);
pub static PEAK_QUERIES: AtomicUsize = AtomicUsize::new(0);

// Unique query ID generation
static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// Get elapsed time since the engine was initialized
pub fn engine_elapsed() -> Option<Duration> {
    ENGINE_START_TIME.get().map(|start| start.elapsed())
}

/// Default coroutine stack size: 128KB.
/// Query bodies recurse only through the step queue, so deep Tabor
/// recursion does not consume coroutine stack; 128KB covers the runtime's
/// own frames. Can be overridden via TABOR_STACK_SIZE.
const DEFAULT_STACK_SIZE: usize = 0x20000;

/// Parse stack size from an optional string value.
/// Returns the parsed size, or DEFAULT_STACK_SIZE if the value is missing,
/// zero, or invalid. Prints a warning to stderr for invalid values.
fn parse_stack_size(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => match val.parse::<usize>() {
            Ok(0) => {
                eprintln!(
                    "Warning: TABOR_STACK_SIZE=0 is invalid, using default {}",
                    DEFAULT_STACK_SIZE
                );
                DEFAULT_STACK_SIZE
            }
            Ok(size) => size,
            Err(_) => {
                eprintln!(
                    "Warning: TABOR_STACK_SIZE='{}' is not a valid number, using default {}",
                    val, DEFAULT_STACK_SIZE
                );
                DEFAULT_STACK_SIZE
            }
        },
        None => DEFAULT_STACK_SIZE,
    }
}

/// Default coroutine pool capacity.
/// May reuses completed coroutine stacks from this pool to avoid
/// allocations on spawn-heavy workloads.
const DEFAULT_POOL_CAPACITY: usize = 10000;

/// Initialize the engine.
///
/// # Safety
/// Safe to call multiple times (idempotent via Once). Configures May
/// coroutines and installs signal handlers; must run before the first
/// query is spawned.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_engine_init() {
    ENGINE_INIT.call_once(|| {
        // Stack size and pool capacity are env-tunable:
        // TABOR_STACK_SIZE (bytes), TABOR_POOL_CAPACITY (coroutines).
        let stack_size = parse_stack_size(std::env::var("TABOR_STACK_SIZE").ok());

        let pool_capacity = std::env::var("TABOR_POOL_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_POOL_CAPACITY);

        may::config()
            .set_stack_size(stack_size)
            .set_pool_capacity(pool_capacity);

        // Record engine start time (for at-exit reporting)
        ENGINE_START_TIME.get_or_init(Instant::now);

        // Install SIGINT handler for Ctrl-C. Without this, a long fixpoint
        // computation won't respond to Ctrl-C because signals are only
        // delivered at syscall boundaries, and the step loop may never
        // syscall.
        #[cfg(unix)]
        {
            use std::sync::atomic::AtomicBool;
            static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

            extern "C" fn sigint_handler(_: libc::c_int) {
                // Second SIGINT forces exit (user is insistent)
                if SIGINT_RECEIVED.swap(true, Ordering::SeqCst) {
                    unsafe { libc::_exit(130) }; // 128 + 2 (SIGINT)
                }
                std::process::exit(130);
            }

            unsafe {
                libc::signal(
                    libc::SIGINT,
                    sigint_handler as *const () as libc::sighandler_t,
                );
            }
        }

        // Install SIGQUIT handler for runtime diagnostics (kill -3)
        #[cfg(feature = "diagnostics")]
        crate::diagnostics::install_signal_handler();
    });
}

/// Run the engine: wait for all spawned queries to complete, then emit the
/// at-exit report when TABOR_REPORT is configured.
///
/// # Safety
/// Always safe to call; blocks the calling thread until all queries are
/// done.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_engine_run() {
    unsafe { patch_tabor_wait_all_queries() };

    #[cfg(feature = "diagnostics")]
    crate::report::emit_report();
}

/// Shutdown the engine.
///
/// # Safety
/// Safe to call. May doesn't require explicit shutdown, so this exists for
/// API symmetry with init.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_engine_shutdown() {
    // Nothing to tear down; tables are reset explicitly via
    // patch_tabor_table_reset when the embedder wants a clean slate.
}

/// Spawn an independent top-level query on a coroutine.
///
/// The entry function receives the opaque context pointer. Returns a unique
/// positive query id.
///
/// # Safety
/// - `entry` must be a valid function pointer safe to execute on any thread
/// - `ctx` must remain valid until the query completes; ownership is
///   transferred to the query
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_query_spawn(
    entry: extern "C" fn(*mut std::ffi::c_void),
    ctx: *mut std::ffi::c_void,
) -> i64 {
    let query_id = NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed);

    let new_count = ACTIVE_QUERIES.fetch_add(1, Ordering::Release) + 1;
    TOTAL_QUERIES.fetch_add(1, Ordering::Relaxed);

    // Update the high-water mark with a CAS loop (no locks on the hot path)
    let mut peak = PEAK_QUERIES.load(Ordering::Acquire);
    while new_count > peak {
        match PEAK_QUERIES.compare_exchange_weak(
            peak,
            new_count,
            Ordering::Release,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(current) => peak = current,
        }
    }

    // *mut is !Send; the caller guarantees thread safety, so carry the
    // address as usize.
    let ctx_addr = ctx as usize;

    unsafe {
        may::coroutine::spawn(move || {
            entry(ctx_addr as *mut std::ffi::c_void);

            // Decrement first, then signal if we were the last. AcqRel keeps
            // the invariant TOTAL = COMPLETED + ACTIVE + lost coherent for
            // external observers.
            let prev_count = ACTIVE_QUERIES.fetch_sub(1, Ordering::AcqRel);
            TOTAL_QUERIES_COMPLETED.fetch_add(1, Ordering::Release);
            if prev_count == 1 {
                // The mutex must be held when notifying to prevent missed
                // wakeups.
                let _guard = SHUTDOWN_MUTEX
                    .lock()
                    .expect("query_spawn: shutdown mutex poisoned");
                SHUTDOWN_CONDVAR.notify_all();
            }
        });
    }

    query_id as i64
}

/// Wait for all queries to complete.
///
/// # Safety
/// Always safe to call. Blocks until all spawned queries have completed,
/// using the condition variable - no polling overhead.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn patch_tabor_wait_all_queries() {
    let mut guard = SHUTDOWN_MUTEX
        .lock()
        .expect("wait_all_queries: shutdown mutex poisoned");

    while ACTIVE_QUERIES.load(Ordering::Acquire) > 0 {
        guard = SHUTDOWN_CONDVAR
            .wait(guard)
            .expect("wait_all_queries: condvar wait failed");
    }
}

// Public re-exports with short names for internal use
pub use patch_tabor_engine_init as engine_init;
pub use patch_tabor_engine_run as engine_run;
pub use patch_tabor_engine_shutdown as engine_shutdown;
pub use patch_tabor_query_spawn as query_spawn;
pub use patch_tabor_wait_all_queries as wait_all_queries;
