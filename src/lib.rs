/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Generic Resource (GRES) selection filter.
//!
//! Topology-aware GRES feasibility filtering and bit selection: given a
//! job's GRES requirements and a set of candidate nodes' CPU/GRES
//! topology, decides which nodes are feasible and exactly which GRES
//! units on each allocated node the job receives.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── bitmap.rs     – fixed-size GRES unit bitset
//! ├── topology.rs   – socket/core geometry helpers
//! ├── config.rs     – cluster-wide gres policy flags (YAML)
//! ├── error.rs      – RejectReason / GresError
//! └── gres/
//!     ├── state.rs          – data model (gres_ns, gres_js, sock_gres)
//!     ├── sockview.rs        – builds sock_gres from node state
//!     ├── feasibility.rs     – remove_unusable
//!     ├── task_layout.rs     – tasks_per_node_socket builder
//!     ├── topo_select.rs     – non-shared topology pickers
//!     ├── shared_select.rs   – shared (fractional) GRES pickers
//!     └── orchestrator.rs    – select_and_set
//! ```

pub mod bitmap;
pub mod config;
pub mod error;
pub mod gres;
pub mod topology;
