/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Shared-GRES (fractional) pickers.
//!
//! A sharing device's topology slots hold a capacity (`gres_cnt_avail`)
//! and a running allocation (`gres_cnt_alloc`); a shared request draws an
//! integer count from one or more slots rather than setting whole unit
//! bits. `drawn` accumulates how much this call has already taken from
//! each slot so repeated picker invocations within one `select_and_set`
//! call (e.g. one call per task) never over-draw a slot's capacity.

use tracing::warn;

use crate::bitmap::Bitmap;
use crate::config::GresPolicy;
use crate::error::GresError;
use crate::gres::state::{SockGres, SocketSel, TopoSlot};

/// Orders topology slots least-loaded first using integer-only arithmetic:
/// `(avail - alloc) * node_gres_cnt_avail / topo_gres_cnt_avail`, largest
/// first. Must stay integer — this ratio is a tie-breaking order, and a
/// floating-point reimplementation would not reproduce it bit-for-bit.
pub fn least_loaded_topo_index(topo: &[TopoSlot], node_gres_cnt_avail: u64) -> Vec<usize> {
    let ratio = |t: usize| -> u128 {
        let slot = &topo[t];
        if slot.gres_cnt_avail == 0 {
            return 0;
        }
        let free = slot.gres_cnt_avail.saturating_sub(slot.gres_cnt_alloc) as u128;
        (free * node_gres_cnt_avail as u128) / slot.gres_cnt_avail as u128
    };
    let mut idx: Vec<usize> = (0..topo.len()).collect();
    idx.sort_by(|&a, &b| ratio(b).cmp(&ratio(a)).then(a.cmp(&b)));
    idx
}

/// Draws up to `*need` units from `topo`, restricted to slots whose index
/// is set in `allowed` (socket or `ANY` pool), in `order`. Reduces `*need`
/// and records the draw in `drawn`; sets the corresponding bit in `chosen`.
#[allow(clippy::too_many_arguments)]
pub fn pick_shared_gres_topo(
    topo: &[TopoSlot],
    type_id: Option<u32>,
    use_busy_dev: bool,
    use_single_dev: bool,
    no_repeat: bool,
    allowed: &Bitmap,
    order: &[usize],
    chosen: &mut Bitmap,
    drawn: &mut [u64],
    need: &mut u64,
) {
    for &t in order {
        if *need == 0 {
            break;
        }
        let slot = match topo.get(t) {
            Some(s) => s,
            None => continue,
        };
        if let Some(want) = type_id {
            if slot.type_id != want {
                continue;
            }
        }
        if !allowed.test(t) {
            continue;
        }
        if no_repeat && chosen.test(t) {
            continue;
        }
        let already_busy = slot.gres_cnt_alloc > 0 || drawn[t] > 0;
        if use_busy_dev && !already_busy {
            continue;
        }
        let remaining = slot
            .gres_cnt_avail
            .saturating_sub(slot.gres_cnt_alloc)
            .saturating_sub(drawn[t]);
        if remaining == 0 {
            continue;
        }
        if use_single_dev && remaining < *need {
            continue;
        }
        let take = remaining.min(*need);
        chosen.set(t);
        drawn[t] += take;
        *need -= take;
    }
}

/// Three-pass socket-aware layout for one shared-GRES request: flagged
/// sockets, then `ANY`, then (unless `enforce_binding`) every other
/// socket.
#[allow(clippy::too_many_arguments)]
pub fn pick_shared_gres(
    sock: &SockGres,
    topo: &[TopoSlot],
    used_sock: &[bool],
    enforce_binding: bool,
    use_busy_dev: bool,
    use_single_dev: bool,
    no_repeat: bool,
    order: &[usize],
    chosen: &mut Bitmap,
    drawn: &mut [u64],
    mut need: u64,
) -> u64 {
    let total_before = need;
    let type_id = if sock.type_id != 0 { Some(sock.type_id) } else { None };

    for (s, &flagged) in used_sock.iter().enumerate() {
        if !flagged || need == 0 {
            continue;
        }
        pick_shared_gres_topo(
            topo,
            type_id,
            use_busy_dev,
            use_single_dev,
            no_repeat,
            sock.bits_for(SocketSel::Socket(s)),
            order,
            chosen,
            drawn,
            &mut need,
        );
    }
    if need > 0 {
        pick_shared_gres_topo(
            topo,
            type_id,
            use_busy_dev,
            use_single_dev,
            no_repeat,
            sock.bits_for(SocketSel::Any),
            order,
            chosen,
            drawn,
            &mut need,
        );
    }
    if need > 0 && !enforce_binding {
        for s in 0..used_sock.len() {
            if used_sock[s] || need == 0 {
                continue;
            }
            pick_shared_gres_topo(
                topo,
                type_id,
                use_busy_dev,
                use_single_dev,
                no_repeat,
                sock.bits_for(SocketSel::Socket(s)),
                order,
                chosen,
                drawn,
                &mut need,
            );
        }
    }
    total_before - need
}

/// Per-node shared request: one `use_single_dev` pass, then — only when
/// the cluster policy allows drawing from more than one sharing device —
/// a second pass without that restriction.
#[allow(clippy::too_many_arguments)]
pub fn set_shared_node_bits(
    sock: &SockGres,
    topo: &[TopoSlot],
    used_sock: &[bool],
    enforce_binding: bool,
    policy: GresPolicy,
    order: &[usize],
    chosen: &mut Bitmap,
    drawn: &mut [u64],
    need: u64,
) -> Result<u64, GresError> {
    let mut got = pick_shared_gres(
        sock, topo, used_sock, enforce_binding, false, true, false, order, chosen, drawn, need,
    );
    if got < need {
        if !policy.multiple_sharing_gres_pj {
            return Err(GresError::InvalidSharedRequest {
                node: String::new(),
                plugin_id: sock.kind.plugin_id,
            });
        }
        got += pick_shared_gres(
            sock,
            topo,
            used_sock,
            enforce_binding,
            false,
            false,
            false,
            order,
            chosen,
            drawn,
            need - got,
        );
    }
    Ok(got)
}

/// Per-task shared request. When the cluster does not allow multiple
/// sharing devices per job, all tasks on the node share one picker call
/// (`use_single_dev = true`) and `no_task_sharing` is logged as ignored —
/// there is only one device to share either way. When it does, each task
/// draws independently from its own socket, honoring `no_task_sharing` as
/// `no_repeat` so co-located tasks don't land on the same device.
#[allow(clippy::too_many_arguments)]
pub fn set_shared_task_bits(
    sock: &SockGres,
    topo: &[TopoSlot],
    tasks_per_socket: &[u32],
    enforce_binding: bool,
    policy: GresPolicy,
    order: &[usize],
    no_task_sharing: bool,
    chosen: &mut Bitmap,
    drawn: &mut [u64],
    gres_per_task: u64,
) -> u64 {
    let used_sock: Vec<bool> = tasks_per_socket.iter().map(|&t| t > 0).collect();

    if !policy.multiple_sharing_gres_pj {
        if no_task_sharing {
            warn!("no_task_sharing ignored: cluster policy disallows multiple sharing gres per job");
        }
        let total_need: u64 = tasks_per_socket.iter().map(|&t| t as u64).sum::<u64>() * gres_per_task;
        return pick_shared_gres(
            sock,
            topo,
            &used_sock,
            enforce_binding,
            false,
            true,
            false,
            order,
            chosen,
            drawn,
            total_need,
        );
    }

    let mut total = 0u64;
    for (s, &tasks) in tasks_per_socket.iter().enumerate() {
        let mut only_s = vec![false; used_sock.len()];
        if s < only_s.len() {
            only_s[s] = true;
        }
        for _ in 0..tasks {
            total += pick_shared_gres(
                sock,
                topo,
                &only_s,
                enforce_binding,
                false,
                false,
                no_task_sharing,
                order,
                chosen,
                drawn,
                gres_per_task,
            );
        }
    }
    total
}
