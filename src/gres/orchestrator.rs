/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-job orchestration: walks a job's allocated nodes, dispatches each
//! node's GRES request to the right picker, and runs the pass-2 rescue
//! when a per-job counter is still unmet after every node has been
//! visited once.

use tracing::{debug, info};

use crate::bitmap::Bitmap;
use crate::config::GresPolicy;
use crate::error::GresError;
use crate::gres::shared_select::{
    least_loaded_topo_index, set_shared_node_bits, set_shared_task_bits,
};
use crate::gres::state::{GresJobRequest, GresNodeState, SockGres};
use crate::gres::topo_select::{
    reshape_used_sockets, select_by_job_pass1, select_by_job_pass2_on_node, select_by_node, select_by_socket,
    select_by_task,
};
use crate::topology::CoreLayout;

/// Multi-core placement options the job carries (mirrors `slurm_opt_t`'s
/// `mc_ptr` fields this crate actually needs).
#[derive(Debug, Clone, Copy, Default)]
pub struct McOptions {
    pub cpus_per_task: u32,
    pub sockets_per_node: Option<u32>,
    pub overcommit: bool,
}

/// Binding-relevant job bitflags.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFlags {
    pub enforce_binding: bool,
    /// Corresponds to `ONE_TASK_PER_SHARING` — forbids two tasks on the
    /// same node from drawing from the same sharing device.
    pub one_task_per_sharing: bool,
}

/// Everything the orchestrator needs about one allocated node for one
/// GRES request: its topology state, a pre-filtered [`SockGres`] view
/// (already passed through [`crate::gres::feasibility::remove_unusable`]),
/// which sockets the job actually allocated cores on, and (for per-task
/// requests) the task layout built by [`crate::gres::task_layout`].
#[derive(Debug, Clone)]
pub struct NodeGresRequest<'a> {
    pub name: String,
    pub layout: CoreLayout,
    pub state: &'a GresNodeState,
    pub sock: SockGres,
    pub used_sock: Vec<bool>,
    pub tasks_per_socket: Option<Vec<u32>>,
}

/// Allocates the job's GRES units/counts across `nodes`, writing the
/// result onto `job`. `job` must already carry exactly one nonzero
/// counter among `gres_per_node`/`gres_per_socket`/`gres_per_task`/
/// `gres_per_job` (the upstream scheduler guarantees this; a request
/// mixing several is rejected upstream, not here).
///
/// `mc.sockets_per_node`, when set, reshapes each node's `used_sock` to
/// that many flagged sockets before the by-socket pass — the job may have
/// allocated more or fewer sockets than it ultimately wants GRES spread
/// across.
pub fn select_and_set(
    nodes: &mut [NodeGresRequest<'_>],
    job: &mut GresJobRequest,
    mc: McOptions,
    flags: JobFlags,
    policy: GresPolicy,
) -> Result<(), GresError> {
    job.total_gres = 0;
    job.gres_bit_select.clear();
    job.gres_cnt_node_select.clear();
    job.gres_per_bit_select.clear();

    let is_shared = job.is_shared_request();
    let node_count = nodes.len() as u64;
    // -1: no per-job pass has run yet; 0: unmet; 1: met. Once any node
    // leaves it at 0, it stays 0 until pass 2 changes the underlying
    // total — a single short node holds back the whole job until the
    // rescue pass runs.
    let mut job_fini: i8 = -1;

    for (i, node) in nodes.iter_mut().enumerate() {
        let alloc = node.state.gres_bit_alloc.as_ref();
        let unit_count = node.state.unit_count();
        let links = &node.state.links;

        if node.state.topo.is_empty() && !is_shared {
            let tasks_on_node: u64 = node
                .tasks_per_socket
                .as_ref()
                .map(|v| v.iter().map(|&t| t as u64).sum())
                .unwrap_or(0);
            let used_sock_cnt = node.used_sock.iter().filter(|&&b| b).count() as u64;
            let cnt = if job.gres_per_node > 0 {
                job.gres_per_node
            } else if job.gres_per_socket > 0 {
                job.gres_per_socket * used_sock_cnt
            } else if job.gres_per_task > 0 {
                job.gres_per_task * tasks_on_node
            } else if job.gres_per_job > 0 {
                let remaining = job.gres_per_job.saturating_sub(job.total_gres);
                let rem_nodes = (nodes.len() - i) as u64;
                let reserve = rem_nodes.saturating_sub(1);
                let cap = if node.sock.max_node_gres > 0 {
                    node.sock.max_node_gres
                } else {
                    node.sock.total_cnt
                };
                remaining.saturating_sub(reserve).min(cap)
            } else {
                0
            };
            job.gres_cnt_node_select.insert(node.name.clone(), cnt);
            job.total_gres += cnt;
            continue;
        }

        let mut chosen = Bitmap::new(if is_shared { node.state.topo.len() } else { unit_count });

        if is_shared {
            let order = if policy.ll_shared_gres {
                least_loaded_topo_index(&node.state.topo, node.state.gres_cnt_avail)
            } else {
                (0..node.state.topo.len()).collect()
            };
            let mut drawn = vec![0u64; node.state.topo.len()];

            let got = if job.gres_per_node > 0 {
                set_shared_node_bits(
                    &node.sock,
                    &node.state.topo,
                    &node.used_sock,
                    flags.enforce_binding,
                    policy,
                    &order,
                    &mut chosen,
                    &mut drawn,
                    job.gres_per_node,
                )
                .map_err(|_| GresError::InvalidSharedRequest {
                    node: node.name.clone(),
                    plugin_id: job.kind_plugin_id,
                })?
            } else if job.gres_per_task > 0 {
                let tasks_per_socket =
                    node.tasks_per_socket.clone().ok_or_else(|| GresError::MissingTaskLayout {
                        node: node.name.clone(),
                    })?;
                set_shared_task_bits(
                    &node.sock,
                    &node.state.topo,
                    &tasks_per_socket,
                    flags.enforce_binding,
                    policy,
                    &order,
                    flags.one_task_per_sharing,
                    &mut chosen,
                    &mut drawn,
                    job.gres_per_task,
                )
            } else {
                return Err(GresError::InvalidSharedRequest {
                    node: node.name.clone(),
                    plugin_id: job.kind_plugin_id,
                });
            };

            job.gres_bit_select.insert(node.name.clone(), chosen);
            job.gres_cnt_node_select.insert(node.name.clone(), got);
            job.gres_per_bit_select.insert(node.name.clone(), drawn);
            job.total_gres += got;
        } else if job.gres_per_socket > 0 {
            let mut used_sock = node.used_sock.clone();
            if let Some(target) = mc.sockets_per_node {
                reshape_used_sockets(&mut used_sock, &node.sock, target as usize);
            }
            let placed = select_by_socket(&node.sock, &mut chosen, alloc, &used_sock, job.gres_per_socket, links);
            job.gres_bit_select.insert(node.name.clone(), chosen);
            job.gres_cnt_node_select.insert(node.name.clone(), placed);
            job.total_gres += placed;
        } else if job.gres_per_node > 0 {
            let placed = select_by_node(&node.sock, &mut chosen, alloc, &node.used_sock, job.gres_per_node, links);
            job.gres_bit_select.insert(node.name.clone(), chosen);
            job.gres_cnt_node_select.insert(node.name.clone(), placed);
            job.total_gres += placed;
        } else if job.gres_per_task > 0 {
            let tasks_per_socket =
                node.tasks_per_socket.clone().ok_or_else(|| GresError::MissingTaskLayout {
                    node: node.name.clone(),
                })?;
            let placed = select_by_task(&node.sock, &mut chosen, alloc, &tasks_per_socket, job.gres_per_task, links);
            job.gres_bit_select.insert(node.name.clone(), chosen);
            job.gres_cnt_node_select.insert(node.name.clone(), placed);
            job.total_gres += placed;
        } else if job.gres_per_job > 0 {
            let rem_nodes = node_count - i as u64;
            let placed = select_by_job_pass1(
                &node.sock,
                &mut chosen,
                alloc,
                &node.used_sock,
                links,
                job.gres_per_job,
                job.total_gres,
                rem_nodes,
            );
            job.gres_bit_select.insert(node.name.clone(), chosen);
            job.gres_cnt_node_select.insert(node.name.clone(), placed);
            job.total_gres += placed;

            let met = job.total_gres >= job.gres_per_job;
            job_fini = match job_fini {
                0 => 0,
                _ => met as i8,
            };
        }

        debug!(node = %node.name, total_gres = job.total_gres, "gres selection updated for node");
    }

    let _ = job_fini; // tri-valued rule is exercised per-kind by the caller when several kinds share a job
    if job.gres_per_job > 0 && job.total_gres < job.gres_per_job {
        info!(needed = job.gres_per_job, got = job.total_gres, "running job-wide pass 2 rescue");
        for node in nodes.iter_mut() {
            if job.total_gres >= job.gres_per_job {
                break;
            }
            let need = job.gres_per_job - job.total_gres;
            let mut chosen = job
                .gres_bit_select
                .get(&node.name)
                .cloned()
                .unwrap_or_else(|| Bitmap::new(node.state.unit_count()));
            let alloc = node.state.gres_bit_alloc.as_ref();
            let placed = select_by_job_pass2_on_node(
                &node.sock,
                &mut chosen,
                alloc,
                &node.used_sock,
                &node.state.links,
                need,
            );
            if placed > 0 {
                *job.gres_cnt_node_select.entry(node.name.clone()).or_insert(0) += placed;
                job.total_gres += placed;
                job.gres_bit_select.insert(node.name.clone(), chosen);
            }
        }
        if job.total_gres < job.gres_per_job {
            return Err(GresError::JobCounterUnsatisfiable {
                plugin_id: job.kind_plugin_id,
                got: job.total_gres,
                needed: job.gres_per_job,
            });
        }
    }

    job.total_node_cnt = job.gres_cnt_node_select.values().filter(|&&c| c > 0).count() as u64;
    info!(
        total_gres = job.total_gres,
        total_node_cnt = job.total_node_cnt,
        "gres selection complete for job"
    );
    Ok(())
}
