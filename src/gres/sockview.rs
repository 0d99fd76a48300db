/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Builds the transient `sock_gres` socket view from a node's GRES state.
//!
//! Not one of the algorithmic components on its own — the selection
//! pickers all assume `sock_gres` already exists. This is the glue that
//! materializes it from [`GresNodeState`] plus the node's core layout, so
//! the pipeline is runnable without an external collaborator.

use crate::bitmap::Bitmap;
use crate::gres::state::{GresNodeState, SockGres, TopoSlot};
use crate::topology::CoreLayout;

/// Builds a [`SockGres`] view for one (node, kind) pair.
///
/// `type_filter`, when `Some`, restricts the view to topology slots whose
/// `type_id` matches (mirrors the job request's typed-GRES constraint).
///
/// Shared (fractional) kinds are built by [`build_sock_gres_shared`]: their
/// `bits_by_sock`/`bits_any_sock` index topology *slots*, not member units,
/// since the shared pickers draw fractional counts per slot rather than
/// setting individual unit bits.
pub fn build_sock_gres(
    state: &GresNodeState,
    layout: CoreLayout,
    type_filter: Option<u32>,
) -> SockGres {
    if state.kind.is_sharing {
        return build_sock_gres_shared(state, layout, type_filter);
    }

    let unit_count = state.unit_count();
    let mut cnt_by_sock = vec![0u64; layout.sockets];
    let mut bits_by_sock: Vec<Bitmap> = (0..layout.sockets).map(|_| Bitmap::new(unit_count)).collect();
    let mut bits_any_sock = Bitmap::new(unit_count);
    let mut unit_to_topo = vec![0usize; unit_count];

    if state.topo.is_empty() {
        // No topology: every unit is "any socket" with no slot mapping.
        for i in 0..unit_count {
            bits_any_sock.set(i);
        }
    } else {
        for (t, slot) in state.topo.iter().enumerate() {
            if let Some(want) = type_filter {
                if slot.type_id != want {
                    continue;
                }
            }
            let socket = socket_for_slot(slot, &layout);
            for unit in slot.bitmap.iter_ones() {
                unit_to_topo[unit] = t;
                match socket {
                    Some(s) => {
                        bits_by_sock[s].set(unit);
                        cnt_by_sock[s] += 1;
                    }
                    None => bits_any_sock.set(unit),
                }
            }
        }
    }

    let total_cnt = cnt_by_sock.iter().sum::<u64>() + bits_any_sock.popcount() as u64;

    SockGres {
        kind: state.kind,
        type_id: type_filter.unwrap_or(0),
        total_cnt,
        max_node_gres: 0,
        sock_cnt: layout.sockets,
        cnt_by_sock,
        bits_by_sock,
        bits_any_sock,
        unit_to_topo: Some(unit_to_topo),
    }
}

/// Builds a [`SockGres`] view for a sharing kind: `bits_by_sock`/
/// `bits_any_sock` are bitmaps over topology-slot index (slot `t` is
/// "chosen" by setting bit `t`), not over member unit indices — a shared
/// slot draws a fractional count, so which unit its `bitmap` happens to set
/// is irrelevant to selection. `cnt_by_sock` sums each assigned slot's
/// `gres_cnt_avail` rather than counting bits, since one slot can carry
/// more than one fractional unit of capacity.
fn build_sock_gres_shared(state: &GresNodeState, layout: CoreLayout, type_filter: Option<u32>) -> SockGres {
    let slot_count = state.topo.len();
    let mut cnt_by_sock = vec![0u64; layout.sockets];
    let mut bits_by_sock: Vec<Bitmap> = (0..layout.sockets).map(|_| Bitmap::new(slot_count)).collect();
    let mut bits_any_sock = Bitmap::new(slot_count);

    for (t, slot) in state.topo.iter().enumerate() {
        if let Some(want) = type_filter {
            if slot.type_id != want {
                continue;
            }
        }
        match socket_for_slot(slot, &layout) {
            Some(s) => {
                bits_by_sock[s].set(t);
                cnt_by_sock[s] += slot.gres_cnt_avail;
            }
            None => bits_any_sock.set(t),
        }
    }

    let any_cnt: u64 = bits_any_sock.iter_ones().map(|t| state.topo[t].gres_cnt_avail).sum();
    let total_cnt = cnt_by_sock.iter().sum::<u64>() + any_cnt;

    SockGres {
        kind: state.kind,
        type_id: type_filter.unwrap_or(0),
        total_cnt,
        max_node_gres: 0,
        sock_cnt: layout.sockets,
        cnt_by_sock,
        bits_by_sock,
        bits_any_sock,
        unit_to_topo: None,
    }
}

/// A slot with no `core_bitmap`, or one spanning more than one socket, is
/// treated as having no single-socket affinity ("any"). A slot whose cores
/// fall entirely within one socket is affine to that socket.
fn socket_for_slot(slot: &TopoSlot, layout: &CoreLayout) -> Option<usize> {
    let cores = slot.core_bitmap.as_ref()?;
    let mut found: Option<usize> = None;
    for core in cores.iter_ones() {
        let s = layout.socket_of(core);
        match found {
            None => found = Some(s),
            Some(prev) if prev == s => {}
            Some(_) => return None,
        }
    }
    found
}
