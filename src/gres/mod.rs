/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Generic Resource (GRES) selection filter.
//!
//! Submodules, leaves first:
//!
//! * [`state`] — data model (node/job GRES state, `sock_gres`).
//! * [`sockview`] — builds `sock_gres` from node state.
//! * [`feasibility`] — `remove_unusable`, the per-node admission filter.
//! * [`task_layout`] — `tasks_per_node_socket` builder for per-task requests.
//! * [`topo_select`] — non-shared topology pickers.
//! * [`shared_select`] — shared (fractional) GRES pickers.
//! * [`orchestrator`] — `select_and_set`, ties the above together per job.

pub mod feasibility;
pub mod orchestrator;
pub mod shared_select;
pub mod sockview;
pub mod state;
pub mod task_layout;
pub mod topo_select;
