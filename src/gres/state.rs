/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core data model: node GRES state, job GRES requests, and the transient
//! socket-view (`sock_gres`) the selection pickers operate on.
//!
//! # Design decisions vs. the original C data model
//!
//! | Concern | Original (`gres_node_state_t` / `sock_gres_t`) | This crate |
//! |---|---|---|
//! | `sock_gres` back-pointers | owning `gres_state_job` / `gres_state_node` fields | plain function parameters — no stored handle, never a cycle |
//! | Sentinel "any socket" | magic index constant | [`SocketSel::Any`] variant |
//! | `is_sharing` / `is_shared` | derived from a global plugin-id table | explicit `bool` fields on [`GresKind`] / [`GresJobRequest`] |
//! | Per-node output maps | parallel arrays indexed by node-list position | `BTreeMap<String, _>` keyed by node name, deterministic iteration |

use std::collections::BTreeMap;

use crate::bitmap::Bitmap;

/// Identity of one GRES kind (e.g. "gpu", "gpu:tesla").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GresKind {
    pub plugin_id: u32,
    /// True if this kind names a physical sharing device (as opposed to a
    /// request that draws fractional units *from* one).
    pub is_sharing: bool,
}

impl GresKind {
    pub fn new(plugin_id: u32, is_sharing: bool) -> Self {
        GresKind {
            plugin_id,
            is_sharing,
        }
    }
}

/// Selects which socket a pass targets, or the affinity-free fallback pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketSel {
    Socket(usize),
    Any,
}

/// Nonnegative integer link-count affinity between GRES units on one node.
#[derive(Debug, Clone, Default)]
pub struct LinkMatrix {
    /// `links[g][h]` — affinity between unit `g` and unit `h`.
    links: Vec<Vec<u32>>,
}

impl LinkMatrix {
    pub fn new(n: usize) -> Self {
        LinkMatrix {
            links: vec![vec![0; n]; n],
        }
    }

    pub fn from_rows(links: Vec<Vec<u32>>) -> Self {
        LinkMatrix { links }
    }

    pub fn is_defined(&self) -> bool {
        !self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn link(&self, g: usize, h: usize) -> u32 {
        self.links
            .get(g)
            .and_then(|row| row.get(h))
            .copied()
            .unwrap_or(0)
    }
}

/// One topology slot of a node's GRES kind: a sub-device or affinity group
/// with its own capacity, type, and (optionally) core/socket affinity.
#[derive(Debug, Clone)]
pub struct TopoSlot {
    pub gres_cnt_avail: u64,
    pub gres_cnt_alloc: u64,
    /// Unit indices belonging to this slot.
    pub bitmap: Bitmap,
    pub type_id: u32,
    /// Node cores this slot is affine to. `None` means "no socket
    /// affinity" (placeable on any socket). Mirrors the original's
    /// `topo_core_bitmap`; the distilled model does not name this field
    /// explicitly but every socket-aware picker needs it to place
    /// non-shared topology bits, so it is carried here.
    pub core_bitmap: Option<Bitmap>,
}

/// Read-only state of one (node, GRES kind) pair, as seen by this crate.
#[derive(Debug, Clone)]
pub struct GresNodeState {
    pub kind: GresKind,
    pub gres_cnt_avail: u64,
    pub gres_cnt_alloc: u64,
    pub gres_bit_alloc: Option<Bitmap>,
    pub topo: Vec<TopoSlot>,
    pub links: LinkMatrix,
}

impl GresNodeState {
    /// Number of addressable units for this (node, kind).
    ///
    /// Three redundant fallbacks, kept deliberately: topologies that omit
    /// `gres_bit_alloc` still need a unit count derived from the topology
    /// bitmap width, and topologies that additionally omit any bitmap fall
    /// back to the sum of per-slot capacities.
    pub fn unit_count(&self) -> usize {
        if let Some(bit_alloc) = &self.gres_bit_alloc {
            return bit_alloc.len();
        }
        if let Some(first) = self.topo.first() {
            if first.bitmap.len() > 0 {
                return first.bitmap.len();
            }
        }
        self.topo.iter().map(|t| t.gres_cnt_avail as usize).sum()
    }
}

/// One job's request for one GRES kind, plus the outputs this crate fills.
#[derive(Debug, Clone, Default)]
pub struct GresJobRequest {
    pub kind_plugin_id: u32,
    pub type_id: u32,

    pub gres_per_node: u64,
    pub gres_per_socket: u64,
    pub gres_per_task: u64,
    pub gres_per_job: u64,

    pub cpus_per_gres: u32,
    pub def_cpus_per_gres: u32,
    pub mem_per_gres: u64,
    pub def_mem_per_gres: u64,
    pub ntasks_per_gres: u32,

    /// Per-node chosen unit bitmaps (non-shared kinds).
    pub gres_bit_select: BTreeMap<String, Bitmap>,
    /// Per-node chosen unit counts.
    pub gres_cnt_node_select: BTreeMap<String, u64>,
    /// Per-node, per-topology-slot fractional counts (shared kinds only).
    pub gres_per_bit_select: BTreeMap<String, Vec<u64>>,

    pub total_gres: u64,
    pub total_node_cnt: u64,

    /// Set by the caller: true when this request draws fractional units
    /// from a sharing device (e.g. a "gpu:shared" request against a
    /// "gpu" sharing kind). Kept explicit rather than re-derived from a
    /// naming convention this crate has no visibility into.
    pub draws_from_sharing_device: bool,
}

impl GresJobRequest {
    pub fn is_shared_request(&self) -> bool {
        self.draws_from_sharing_device
    }

    pub fn with_shared(mut self, shared: bool) -> Self {
        self.draws_from_sharing_device = shared;
        self
    }
}

/// Transient per-(node, kind) socket view consumed by the selection
/// pickers. Built by [`crate::gres::sockview::build_sock_gres`] from a
/// [`GresNodeState`] and freed by the caller after orchestration.
#[derive(Debug, Clone)]
pub struct SockGres {
    pub kind: GresKind,
    pub type_id: u32,

    pub total_cnt: u64,
    /// 0 means unset (no cap derived yet).
    pub max_node_gres: u64,

    pub sock_cnt: usize,
    pub cnt_by_sock: Vec<u64>,
    pub bits_by_sock: Vec<Bitmap>,
    pub bits_any_sock: Bitmap,

    /// Topology-slot index for each unit in `bits_by_sock`/`bits_any_sock`,
    /// used by the shared-GRES pickers to map a chosen unit back to its
    /// slot. `None` for non-shared kinds (unit index == slot index isn't
    /// assumed there).
    pub unit_to_topo: Option<Vec<usize>>,
}

impl SockGres {
    pub fn bits_for(&self, sel: SocketSel) -> &Bitmap {
        match sel {
            SocketSel::Socket(s) => &self.bits_by_sock[s],
            SocketSel::Any => &self.bits_any_sock,
        }
    }

    pub fn cnt_for(&self, sel: SocketSel) -> u64 {
        match sel {
            SocketSel::Socket(s) => self.cnt_by_sock[s],
            SocketSel::Any => self.bits_any_sock.popcount() as u64,
        }
    }
}
