/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Feasibility filter (`remove_unusable`).
//!
//! Decides whether one candidate node can host a job's GRES requests at
//! all, and — if so — tightens each request's `sock_gres` view (caps,
//! socket pruning) so the later pickers never have to re-derive those
//! bounds.
//!
//! The filter is all-or-nothing per node: on any reject this function
//! returns without mutating any `sock_gres` record, by computing every
//! outcome into a scratch structure first and only committing once every
//! request has passed.

use tracing::debug;

use crate::bitmap::Bitmap;
use crate::error::RejectReason;
use crate::gres::state::{GresJobRequest, SockGres};
use crate::topology::CoreLayout;

/// Node-level parameters the filter needs beyond each request's own
/// counters.
#[derive(Debug, Clone, Copy)]
pub struct FeasibilityInput {
    pub avail_mem: Option<u64>,
    pub max_cpus: u32,
    pub enforce_binding: bool,
    pub layout: CoreLayout,
    pub sock_per_node: Option<u32>,
    pub task_per_node: Option<u32>,
    pub cpus_per_task: u32,
    pub whole_node: bool,
}

/// Result of a feasible filter pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeasibilityTotals {
    pub avail_gpus: u8,
    pub near_gpus: u8,
}

/// Per-request computed mutation, applied only if every request passes.
struct Outcome {
    total_cnt: u64,
    max_node_gres: u64,
    cnt_by_sock: Option<Vec<u64>>,
    near_cnt: u64,
    is_sharing: bool,
}

/// Filters out a node whose `sock_gres` records cannot satisfy the job's
/// GRES requests, tightening the survivors' caps in the process.
///
/// Returns `Ok(totals)` if the node is usable, `Err(reason)` naming the
/// first constraint that failed (diagnostic only — the caller simply
/// drops the node).
pub fn remove_unusable(
    requests: &mut [(&GresJobRequest, &mut SockGres)],
    input: FeasibilityInput,
    core_bitmap: &Bitmap,
) -> Result<FeasibilityTotals, RejectReason> {
    let mut avail_cores_by_sock: Option<Vec<usize>> = None;
    let mut outcomes = Vec::with_capacity(requests.len());

    for (req, sock) in requests.iter() {
        let sock_per_node = input.sock_per_node.unwrap_or(0) as u64;
        let task_per_node = input.task_per_node.unwrap_or(0) as u64;

        let min_gres = [
            if input.whole_node {
                sock.total_cnt
            } else {
                req.gres_per_node
            },
            req.gres_per_socket.saturating_mul(sock_per_node),
            req.gres_per_task.saturating_mul(task_per_node),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        // Step 2: cpus-per-gres bound.
        let cpus_per_gres = if req.cpus_per_gres > 0 {
            req.cpus_per_gres
        } else if req.ntasks_per_gres > 0 {
            req.ntasks_per_gres * input.cpus_per_task.max(1)
        } else {
            req.def_cpus_per_gres
        };
        if cpus_per_gres > 0 {
            let required = [req.gres_per_node, req.gres_per_task, req.gres_per_socket]
                .into_iter()
                .max()
                .unwrap_or(0);
            let capacity = (input.max_cpus / cpus_per_gres) as u64;
            if required > 0 && capacity < required {
                return Err(RejectReason::InsufficientCpus {
                    max_cpus: input.max_cpus,
                    cpus_per_gres,
                    required,
                });
            }
        }

        let mut total_cnt = sock.total_cnt;
        let mut max_node_gres = 0u64;

        // Step 3: memory bound.
        let mem_per_gres = if req.mem_per_gres > 0 {
            req.mem_per_gres
        } else {
            req.def_mem_per_gres
        };
        if mem_per_gres > 0 {
            if let Some(avail_mem) = input.avail_mem {
                if mem_per_gres > avail_mem {
                    return Err(RejectReason::InsufficientMemory {
                        required_mb: mem_per_gres,
                        available_mb: avail_mem,
                    });
                }
                max_node_gres = avail_mem / mem_per_gres;
                total_cnt = total_cnt.min(max_node_gres);
            }
        }

        // Step 4/5: socket binding. `near_cnt` is the bound-respecting
        // count (sockets with no available cores excluded, any-pool
        // always counted) computed whether or not `enforce_binding` is
        // set; `cnt_by_sock`/`total_cnt` are only mutated when it is.
        let mut cnt_by_sock_out = None;
        let mut near_cnt = total_cnt;
        if sock.sock_cnt > 0 {
            let avail = avail_cores_by_sock
                .get_or_insert_with(|| input.layout.available_cores_by_socket(core_bitmap));
            let bound_respecting: u64 = sock
                .cnt_by_sock
                .iter()
                .enumerate()
                .map(|(s, &c)| if avail.get(s).copied().unwrap_or(0) > 0 { c } else { 0 })
                .sum();
            let any_pool = sock.total_cnt.saturating_sub(sock.cnt_by_sock.iter().sum::<u64>());
            near_cnt = total_cnt.min(bound_respecting + any_pool);

            if input.enforce_binding {
                let mut pruned = sock.cnt_by_sock.clone();
                for (s, cores) in avail.iter().enumerate() {
                    if *cores == 0 {
                        total_cnt = total_cnt.saturating_sub(pruned[s]);
                        pruned[s] = 0;
                    }
                }
                cnt_by_sock_out = Some(pruned);
            }
        }

        // Step 6: derive max_node_gres from per_node/per_job unless whole_node.
        if !input.whole_node {
            let candidate = if req.gres_per_node > 0 {
                req.gres_per_node
            } else {
                req.gres_per_job
            };
            if candidate > 0 && (max_node_gres == 0 || candidate < max_node_gres) {
                max_node_gres = candidate;
            }
        }

        // Step 7: cpus-per-gres vs. allocated core bitmap.
        if cpus_per_gres > 0 && !(req.ntasks_per_gres > 0 && input.whole_node) {
            let allocated_cores = core_bitmap.popcount() as u64;
            let cpus_per_core = if input.layout.cores_per_socket > 0 {
                (input.max_cpus as u64) / input.layout.total_cores().max(1) as u64
            } else {
                1
            }
            .max(1);
            let max_gres = (allocated_cores * cpus_per_core) / cpus_per_gres as u64;
            if max_gres == 0 {
                return Err(RejectReason::NoCoresForGres);
            }
            if max_node_gres == 0 || max_gres < max_node_gres {
                max_node_gres = max_gres;
            }
        }

        // Step 8: memory cap on total_cnt (re-applied in case step 6/7
        // widened it).
        if mem_per_gres > 0 {
            if let Some(avail_mem) = input.avail_mem {
                total_cnt = total_cnt.min(avail_mem / mem_per_gres);
            }
        }

        // Step 9: final admission check.
        if total_cnt < min_gres || (max_node_gres > 0 && max_node_gres < min_gres) {
            return Err(RejectReason::InsufficientCount { total_cnt, min_gres });
        }

        outcomes.push(Outcome {
            total_cnt,
            max_node_gres,
            cnt_by_sock: cnt_by_sock_out,
            near_cnt,
            is_sharing: sock.kind.is_sharing,
        });
    }

    // Commit: every request passed, now apply mutations.
    let mut totals = FeasibilityTotals::default();
    for ((_, sock), outcome) in requests.iter_mut().zip(outcomes.into_iter()) {
        sock.total_cnt = outcome.total_cnt;
        sock.max_node_gres = outcome.max_node_gres;
        if let Some(pruned) = outcome.cnt_by_sock {
            sock.cnt_by_sock = pruned;
        }
        if outcome.is_sharing {
            totals.avail_gpus = totals.avail_gpus.saturating_add(outcome.total_cnt.min(255) as u8);
            totals.near_gpus = totals.near_gpus.saturating_add(outcome.near_cnt.min(255) as u8);
        }
        debug!(
            total_cnt = sock.total_cnt,
            max_node_gres = sock.max_node_gres,
            "gres request passed feasibility filter"
        );
    }

    Ok(totals)
}
