/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the GRES selection filter.
//!
//! Two error enums model the two failure layers:
//!
//! * [`RejectReason`] — why a single node (or a single request on that
//!   node) was judged infeasible by [`remove_unusable`](crate::gres::feasibility::remove_unusable).
//!   Carried only for diagnostics; the caller simply drops the node.
//! * [`GresError`] — top-level failure returned from
//!   [`select_and_set`](crate::gres::orchestrator::select_and_set) and from
//!   configuration loading.
//!
//! Every variant carries enough structured data (counts, ids) to log a
//! useful `tracing` event and to let a caller map it to a scheduler-visible
//! status without re-parsing a message string.

use thiserror::Error;

// ── Feasibility rejection reasons ─────────────────────────────────────────────

/// Detailed reason a node (or one of its GRES requests) failed the
/// feasibility filter.
///
/// Not an error in the `std::error::Error` sense — this is diagnostic detail
/// the filter accumulates internally; the public return value of
/// `remove_unusable` is just pass/fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// `max_cpus / cpus_per_gres` could not satisfy the largest requested
    /// per-node/socket/task count.
    InsufficientCpus {
        max_cpus: u32,
        cpus_per_gres: u32,
        required: u64,
    },

    /// `mem_per_gres` exceeds the node's available memory.
    InsufficientMemory { required_mb: u64, available_mb: u64 },

    /// The usable unit count on this node, after all caps, is below the
    /// minimum the job's counters require.
    InsufficientCount { total_cnt: u64, min_gres: u64 },

    /// `max_node_gres` collapsed to zero cores worth of capacity.
    NoCoresForGres,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InsufficientCpus {
                max_cpus,
                cpus_per_gres,
                required,
            } => write!(
                f,
                "{max_cpus} available cpus / {cpus_per_gres} cpus-per-gres cannot satisfy {required} gres"
            ),
            RejectReason::InsufficientMemory {
                required_mb,
                available_mb,
            } => write!(
                f,
                "gres requires {required_mb}MB but node only has {available_mb}MB available"
            ),
            RejectReason::InsufficientCount { total_cnt, min_gres } => write!(
                f,
                "only {total_cnt} usable gres but job requires at least {min_gres}"
            ),
            RejectReason::NoCoresForGres => {
                write!(f, "no allocated cores remain to host any gres unit")
            }
        }
    }
}

// ── Top-level errors ───────────────────────────────────────────────────────────

/// Top-level error type returned by
/// [`select_and_set`](crate::gres::orchestrator::select_and_set) and by
/// configuration loading.
///
/// | Variant | Meaning for the caller |
/// |---|---|
/// | `NoSockGresRecords` | nothing to select — caller passed an empty request list |
/// | `MissingTaskLayout` | a per-task request needs `tasks_per_node_socket` and none was built |
/// | `InvalidSharedRequest` | a shared-gres request combined counters that cannot coexist |
/// | `JobCounterUnsatisfiable` | `gres_per_job` could not be met even after the pass-2 rescue |
/// | `InvariantViolated` | topology counters required by a code path were missing |
/// | `Config` | the cluster policy-flags file could not be loaded |
#[derive(Debug, Error)]
pub enum GresError {
    /// `select_and_set` was called with no `sock_gres` records for a node.
    #[error("no gres requests supplied for node '{node}'")]
    NoSockGresRecords { node: String },

    /// A per-task request needs a task layout and none is available.
    #[error("node '{node}' has no task layout but gres_per_task is set")]
    MissingTaskLayout { node: String },

    /// A shared-GRES request's counters cannot be serviced (e.g. per-socket
    /// and per-task both unset, or neither node nor task granularity).
    #[error("node '{node}' gres kind {plugin_id}: shared gres request is invalid")]
    InvalidSharedRequest { node: String, plugin_id: u32 },

    /// `gres_per_job` remained unmet after the pass-2 rescue ran on every
    /// allocated node.
    #[error("gres_per_job for plugin {plugin_id} unmet: got {got}, needed {needed}")]
    JobCounterUnsatisfiable {
        plugin_id: u32,
        got: u64,
        needed: u64,
    },

    /// A required topology counter was absent where the algorithm assumes
    /// it is present (internal bug, not a malformed-input condition).
    #[error("internal invariant violated on node '{node}': {detail}")]
    InvariantViolated { node: String, detail: String },

    /// Cluster policy-flags configuration could not be loaded.
    #[error("failed to load gres policy configuration: {0}")]
    Config(#[from] anyhow::Error),
}
