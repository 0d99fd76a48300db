/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end scenarios pinning the documented selection behavior across
//! the feasibility filter, the topology pickers, and the orchestrator.

use gres_select::bitmap::Bitmap;
use gres_select::config::GresPolicy;
use gres_select::error::GresError;
use gres_select::gres::feasibility::{remove_unusable, FeasibilityInput};
use gres_select::gres::orchestrator::{select_and_set, JobFlags, McOptions, NodeGresRequest};
use gres_select::gres::sockview::build_sock_gres;
use gres_select::gres::state::{GresJobRequest, GresKind, GresNodeState, LinkMatrix, TopoSlot};
use gres_select::topology::CoreLayout;

fn bitmap_from(len: usize, set: &[usize]) -> Bitmap {
    let mut b = Bitmap::new(len);
    for &i in set {
        b.set(i);
    }
    b
}

/// Scenario 1: per-node, no topology — node with 4 GPUs, gres_per_node=2.
#[test]
fn scenario1_per_node_no_topology() {
    let state = GresNodeState {
        kind: GresKind::new(1, false),
        gres_cnt_avail: 4,
        gres_cnt_alloc: 0,
        gres_bit_alloc: None,
        topo: vec![],
        links: LinkMatrix::default(),
    };
    let layout = CoreLayout::new(1, 4);
    let sock = build_sock_gres(&state, layout, None);

    let mut job = GresJobRequest {
        gres_per_node: 2,
        ..Default::default()
    };
    let mut nodes = vec![NodeGresRequest {
        name: "node1".into(),
        layout,
        state: &state,
        sock,
        used_sock: vec![true],
        tasks_per_socket: None,
    }];

    select_and_set(&mut nodes, &mut job, McOptions::default(), JobFlags::default(), GresPolicy::defaults())
        .unwrap();

    assert_eq!(job.gres_cnt_node_select["node1"], 2);
    assert!(!job.gres_bit_select.contains_key("node1"));
}

/// Scenario 2: per-socket with binding — socket 0 has no available cores;
/// after the feasibility filter prunes it, selection must come from
/// socket 1 only.
#[test]
fn scenario2_per_socket_with_binding() {
    let layout = CoreLayout::new(2, 4);
    let state = GresNodeState {
        kind: GresKind::new(1, false),
        gres_cnt_avail: 4,
        gres_cnt_alloc: 0,
        gres_bit_alloc: Some(Bitmap::new(4)),
        topo: vec![
            TopoSlot {
                gres_cnt_avail: 2,
                gres_cnt_alloc: 0,
                bitmap: bitmap_from(4, &[0, 1]),
                type_id: 0,
                core_bitmap: Some(bitmap_from(8, &[0, 1, 2, 3])),
            },
            TopoSlot {
                gres_cnt_avail: 2,
                gres_cnt_alloc: 0,
                bitmap: bitmap_from(4, &[2, 3]),
                type_id: 0,
                core_bitmap: Some(bitmap_from(8, &[4, 5, 6, 7])),
            },
        ],
        links: LinkMatrix::default(),
    };
    let mut sock = build_sock_gres(&state, layout, None);

    let req = GresJobRequest {
        gres_per_socket: 1,
        ..Default::default()
    };
    // Only socket 1's cores (4..8) are allocated to the job.
    let mut core_bitmap = Bitmap::new(8);
    core_bitmap.set(4);
    core_bitmap.set(5);

    let input = FeasibilityInput {
        avail_mem: None,
        max_cpus: 8,
        enforce_binding: true,
        layout,
        sock_per_node: Some(2),
        task_per_node: None,
        cpus_per_task: 1,
        whole_node: false,
    };
    let mut reqs: Vec<(&GresJobRequest, &mut gres_select::gres::state::SockGres)> =
        vec![(&req, &mut sock)];
    remove_unusable(&mut reqs, input, &core_bitmap).expect("node should remain feasible");

    assert_eq!(sock.cnt_by_sock[0], 0, "socket 0 pruned: no available cores");
    assert_eq!(sock.cnt_by_sock[1], 2);

    let mut job = req;
    let mut nodes = vec![NodeGresRequest {
        name: "node1".into(),
        layout,
        state: &state,
        sock,
        used_sock: vec![false, true],
        tasks_per_socket: None,
    }];
    select_and_set(&mut nodes, &mut job, McOptions::default(), JobFlags::default(), GresPolicy::defaults())
        .unwrap();

    let chosen = &job.gres_bit_select["node1"];
    assert_eq!(chosen.popcount(), 1);
    assert!(chosen.test(2) || chosen.test(3), "chosen unit must come from socket 1");
    assert!(!chosen.test(0) && !chosen.test(1), "socket 0 units must not be chosen");
}

/// Scenario 4: shared per-task, two topology slots, no_task_sharing with
/// multiple_sharing_gres_pj set — each task must land on a distinct slot.
#[test]
fn scenario4_shared_per_task_no_repeat() {
    let layout = CoreLayout::new(1, 4);
    let state = GresNodeState {
        kind: GresKind::new(1, true),
        gres_cnt_avail: 8,
        gres_cnt_alloc: 0,
        gres_bit_alloc: None,
        topo: vec![
            TopoSlot {
                gres_cnt_avail: 4,
                gres_cnt_alloc: 0,
                bitmap: bitmap_from(2, &[0]),
                type_id: 0,
                core_bitmap: None,
            },
            TopoSlot {
                gres_cnt_avail: 4,
                gres_cnt_alloc: 0,
                bitmap: bitmap_from(2, &[1]),
                type_id: 0,
                core_bitmap: None,
            },
        ],
        links: LinkMatrix::default(),
    };
    let sock = build_sock_gres(&state, layout, None);

    let mut job = GresJobRequest {
        gres_per_task: 1,
        draws_from_sharing_device: true,
        ..Default::default()
    };
    let policy = GresPolicy {
        ll_shared_gres: false,
        multiple_sharing_gres_pj: true,
    };
    let flags = JobFlags {
        enforce_binding: false,
        one_task_per_sharing: true,
    };
    let mut nodes = vec![NodeGresRequest {
        name: "node1".into(),
        layout,
        state: &state,
        sock,
        used_sock: vec![true],
        tasks_per_socket: Some(vec![2]),
    }];

    select_and_set(&mut nodes, &mut job, McOptions::default(), flags, policy).unwrap();

    let drawn = &job.gres_per_bit_select["node1"];
    assert_eq!(drawn.iter().filter(|&&d| d > 0).count(), 2, "each task must use a distinct slot");
    assert_eq!(job.gres_cnt_node_select["node1"], 2);
}

/// Scenario 6: pass-2 rescue — two nodes where per-node placement alone
/// leaves gres_per_job short by one; pass 2 must close the gap.
#[test]
fn scenario6_pass2_rescue_closes_gap() {
    let layout = CoreLayout::new(1, 2);
    let state1 = GresNodeState {
        kind: GresKind::new(1, false),
        gres_cnt_avail: 2,
        gres_cnt_alloc: 0,
        gres_bit_alloc: Some(Bitmap::new(2)),
        topo: vec![TopoSlot {
            gres_cnt_avail: 2,
            gres_cnt_alloc: 0,
            bitmap: bitmap_from(2, &[0, 1]),
            type_id: 0,
            core_bitmap: None,
        }],
        links: LinkMatrix::default(),
    };
    let state2 = state1.clone();

    let sock1 = build_sock_gres(&state1, layout, None);
    let sock2 = build_sock_gres(&state2, layout, None);

    let mut job = GresJobRequest {
        gres_per_job: 3,
        ..Default::default()
    };
    let mut nodes = vec![
        NodeGresRequest {
            name: "n1".into(),
            layout,
            state: &state1,
            sock: sock1,
            used_sock: vec![true],
            tasks_per_socket: None,
        },
        NodeGresRequest {
            name: "n2".into(),
            layout,
            state: &state2,
            sock: sock2,
            used_sock: vec![true],
            tasks_per_socket: None,
        },
    ];

    select_and_set(&mut nodes, &mut job, McOptions::default(), JobFlags::default(), GresPolicy::defaults())
        .unwrap();

    assert_eq!(job.total_gres, 3);
    assert!(job.gres_cnt_node_select["n1"] + job.gres_cnt_node_select["n2"] == 3);
}

/// Unsatisfiable per-job counters surface a typed error, not a panic.
#[test]
fn job_counter_unsatisfiable_returns_typed_error() {
    let layout = CoreLayout::new(1, 1);
    let state = GresNodeState {
        kind: GresKind::new(1, false),
        gres_cnt_avail: 1,
        gres_cnt_alloc: 0,
        gres_bit_alloc: Some(Bitmap::new(1)),
        topo: vec![TopoSlot {
            gres_cnt_avail: 1,
            gres_cnt_alloc: 0,
            bitmap: bitmap_from(1, &[0]),
            type_id: 0,
            core_bitmap: None,
        }],
        links: LinkMatrix::default(),
    };
    let sock = build_sock_gres(&state, layout, None);

    let mut job = GresJobRequest {
        gres_per_job: 5,
        ..Default::default()
    };
    let mut nodes = vec![NodeGresRequest {
        name: "n1".into(),
        layout,
        state: &state,
        sock,
        used_sock: vec![true],
        tasks_per_socket: None,
    }];

    let result = select_and_set(&mut nodes, &mut job, McOptions::default(), JobFlags::default(), GresPolicy::defaults());
    assert!(matches!(result, Err(GresError::JobCounterUnsatisfiable { .. })));
}
