//! Runtime diagnostics for production debugging
//!
//! Provides a SIGQUIT (kill -3) handler that dumps engine and table
//! statistics to stderr, similar to JVM thread dumps. Useful for inspecting
//! a long-running fixpoint computation without stopping the process.
//!
//! ## Usage
//!
//! ```bash
//! kill -3 <pid>
//! ```
//!
//! The process dumps diagnostics to stderr and continues running.
//!
//! ## Signal Safety
//!
//! dump_diagnostics() does I/O and acquires locks, which is NOT safe inside
//! a signal handler. A dedicated thread waits on signal-hook's iterator API
//! instead, making all the I/O safe.

#![cfg(feature = "diagnostics")]

use crate::engine::{ACTIVE_QUERIES, PEAK_QUERIES, TOTAL_QUERIES, TOTAL_QUERIES_COMPLETED};
use crate::scheduler::{
    ANSWERS_STORED, CONSUMERS_RESUMED, CONSUMERS_SUSPENDED, DUPLICATES_SUPPRESSED,
};
use crate::table::{SUBGOALS_CREATED, TABLE_HITS, TABLE_LOOKUPS, table_store};
use std::sync::Once;
use std::sync::atomic::Ordering;

static SIGNAL_HANDLER_INIT: Once = Once::new();

/// Default cap on individual subgoals shown in the dump, to avoid
/// overwhelming stderr for programs with large tables.
const DEFAULT_SUBGOAL_DISPLAY_LIMIT: usize = 20;

fn subgoal_display_limit() -> usize {
    std::env::var("TABOR_SUBGOAL_DISPLAY_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_SUBGOAL_DISPLAY_LIMIT)
}

/// Install the SIGQUIT signal handler for diagnostics
///
/// Called automatically by engine_init; safe to call multiple times
/// (idempotent).
pub fn install_signal_handler() {
    SIGNAL_HANDLER_INIT.call_once(|| {
        #[cfg(unix)]
        {
            use signal_hook::consts::SIGQUIT;
            use signal_hook::iterator::Signals;

            let mut signals = match Signals::new([SIGQUIT]) {
                Ok(s) => s,
                Err(_) => return, // Silently fail if we can't register
            };

            std::thread::Builder::new()
                .name("tabor-diagnostics".to_string())
                .spawn(move || {
                    for sig in signals.forever() {
                        if sig == SIGQUIT {
                            dump_diagnostics();
                        }
                    }
                })
                .ok(); // Silently fail if thread spawn fails
        }

        #[cfg(not(unix))]
        {
            // Signal handling not supported; dump_diagnostics() can still
            // be called directly.
        }
    });
}

/// Dump runtime diagnostics to stderr
///
/// Callable directly from code or triggered via SIGQUIT. Output goes to
/// stderr to avoid mixing with program output.
pub fn dump_diagnostics() {
    use std::io::Write;

    let mut out = std::io::stderr().lock();

    let _ = writeln!(out, "\n=== Tabor Runtime Diagnostics ===");
    let _ = writeln!(out, "Timestamp: {:?}", std::time::SystemTime::now());

    let _ = writeln!(out, "\n[Queries]");
    let _ = writeln!(
        out,
        "  Active:    {}",
        ACTIVE_QUERIES.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        out,
        "  Spawned:   {} (total)",
        TOTAL_QUERIES.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        out,
        "  Completed: {} (total)",
        TOTAL_QUERIES_COMPLETED.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        out,
        "  Peak:      {} (high-water mark)",
        PEAK_QUERIES.load(Ordering::Relaxed)
    );

    let _ = writeln!(out, "\n[Call Table]");
    let _ = writeln!(
        out,
        "  Subgoals:  {}",
        SUBGOALS_CREATED.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        out,
        "  Lookups:   {} ({} hits)",
        TABLE_LOOKUPS.load(Ordering::Relaxed),
        TABLE_HITS.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        out,
        "  Answers:   {} stored, {} duplicates suppressed",
        ANSWERS_STORED.load(Ordering::Relaxed),
        DUPLICATES_SUPPRESSED.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        out,
        "  Consumers: {} suspended, {} resumptions",
        CONSUMERS_SUSPENDED.load(Ordering::Relaxed),
        CONSUMERS_RESUMED.load(Ordering::Relaxed)
    );

    let subgoals = table_store().subgoals();
    let limit = subgoal_display_limit();

    let _ = writeln!(out, "\n[Subgoal Details]");
    if subgoals.is_empty() {
        let _ = writeln!(out, "  (table is empty)");
    } else {
        let _ = writeln!(out, "  {} subgoal(s):", subgoals.len());
        for subgoal in subgoals.iter().take(limit) {
            let _ = writeln!(
                out,
                "    {:?} {} answers  {}",
                subgoal.status(),
                subgoal.answer_count(),
                subgoal.display_call()
            );
        }
        if subgoals.len() > limit {
            let _ = writeln!(out, "    ... and {} more", subgoals.len() - limit);
        }
    }

    let _ = writeln!(out, "=================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_signal_handler_idempotent() {
        install_signal_handler();
        install_signal_handler();
    }

    #[test]
    fn test_dump_diagnostics_does_not_panic() {
        // The dump touches the process-wide table; it must work whatever
        // state other tests left it in.
        dump_diagnostics();
    }
}
