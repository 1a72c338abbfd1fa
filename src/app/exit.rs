//! Exit code logic for the harvester process.
//!
//! Single responsibility: map the run summary to the process exit outcome.

use std::process::ExitCode;

use harvester_core::RunSummary;

/// Process outcome reported through the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every entity was collected.
    Success,
    /// Some entities were skipped or the run was interrupted.
    Partial,
    /// Nothing usable was collected, or a fatal error ended the run.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

/// Determines the process exit outcome from collected and skipped entity counts.
pub(crate) fn determine_exit_outcome(collected: usize, skipped: usize) -> ProcessExit {
    if skipped == 0 {
        ProcessExit::Success
    } else if collected > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

pub(crate) fn summary_exit_outcome(summary: &RunSummary) -> ProcessExit {
    let outcome =
        determine_exit_outcome(summary.collected_entities(), summary.skipped_entities());
    if summary.interrupted && outcome == ProcessExit::Success {
        ProcessExit::Partial
    } else {
        outcome
    }
}
