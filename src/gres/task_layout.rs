/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task layout builder — derives `tasks_per_node_socket` from a job's
//! allocated cores, for per-task GRES requests.

use tracing::warn;

use crate::bitmap::Bitmap;
use crate::topology::CoreLayout;

/// Per-node task-layout inputs.
#[derive(Debug, Clone, Copy)]
pub struct TaskLayoutInput {
    pub layout: CoreLayout,
    pub cpus_per_task: u32,
    pub ntasks_per_core: Option<u32>,
    pub ntasks_per_socket: Option<u32>,
    pub node_task_cap: u32,
    pub overcommit: bool,
}

/// Builds the per-socket task counts for one node, given the set of cores
/// allocated to the job on that node.
///
/// Returns `(tasks_per_socket, remainder)`: `remainder > 0` means fewer
/// tasks were placed than `node_task_cap` allowed for and overcommit could
/// not place the rest; the caller should log this as non-fatal.
pub fn build_task_layout(input: TaskLayoutInput, core_bitmap: &Bitmap) -> (Vec<u32>, u32) {
    let sockets = input.layout.sockets;
    let mut tasks_per_socket = vec![0u32; sockets];
    let mut placed: u32 = 0;
    let cpus_per_task = input.cpus_per_task.max(1);

    let mut cores: Vec<usize> = core_bitmap.iter_ones().collect();
    cores.sort_by_key(|&c| input.layout.socket_of(c));

    let mut i = 0;
    while i < cores.len() && placed < input.node_task_cap {
        let core = cores[i];
        let s = input.layout.socket_of(core);
        let cores_per_core_unit = input.layout.cores_per_socket.max(1);
        let tpc = input
            .ntasks_per_core
            .unwrap_or_else(|| (cores_per_core_unit as u32 / cpus_per_task.max(1)).max(1));

        let mut give = tpc;
        if let Some(cap) = input.ntasks_per_socket {
            let room = cap.saturating_sub(tasks_per_socket[s]);
            give = give.min(room);
        }
        give = give.min(input.node_task_cap - placed);

        if s < tasks_per_socket.len() {
            tasks_per_socket[s] += give;
        }
        placed += give;

        // If a task needs more CPUs than one core provides, skip ahead.
        if cpus_per_task > cores_per_core_unit as u32 {
            let skip = cpus_per_task.div_ceil(cores_per_core_unit as u32).saturating_sub(1);
            i += 1 + skip as usize;
        } else {
            i += 1;
        }
    }

    let mut remainder = input.node_task_cap.saturating_sub(placed);
    if remainder > 0 && input.overcommit {
        // Hand out one extra task per socket's first allocated core, round
        // robin, until the remainder is exhausted or no socket can take more.
        let mut progressed = true;
        while remainder > 0 && progressed {
            progressed = false;
            for s in 0..sockets {
                if remainder == 0 {
                    break;
                }
                if let Some(cap) = input.ntasks_per_socket {
                    if tasks_per_socket[s] >= cap {
                        continue;
                    }
                }
                tasks_per_socket[s] += 1;
                remainder -= 1;
                progressed = true;
            }
        }
    }

    if remainder > 0 {
        warn!(remainder, "task layout could not place all requested tasks on this node");
    }

    (tasks_per_socket, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_from(len: usize, set: &[usize]) -> Bitmap {
        let mut b = Bitmap::new(len);
        for &i in set {
            b.set(i);
        }
        b
    }

    #[test]
    fn one_task_per_core_no_oversubscription() {
        let input = TaskLayoutInput {
            layout: CoreLayout::new(2, 2),
            cpus_per_task: 1,
            ntasks_per_core: None,
            ntasks_per_socket: None,
            node_task_cap: 4,
            overcommit: false,
        };
        let cores = bitmap_from(4, &[0, 1, 2, 3]);
        let (tasks, rem) = build_task_layout(input, &cores);
        assert_eq!(tasks, vec![2, 2]);
        assert_eq!(rem, 0);
    }

    #[test]
    fn cpus_per_task_larger_than_core_skips_cores() {
        let input = TaskLayoutInput {
            layout: CoreLayout::new(1, 4),
            cpus_per_task: 2,
            ntasks_per_core: None,
            ntasks_per_socket: None,
            node_task_cap: 10,
            overcommit: false,
        };
        let cores = bitmap_from(4, &[0, 1, 2, 3]);
        let (tasks, _rem) = build_task_layout(input, &cores);
        // 4 cores / 2 cpus-per-task = 2 tasks placed, 1 each per core-pair
        assert_eq!(tasks, vec![2]);
    }

    #[test]
    fn overcommit_distributes_remainder_round_robin() {
        let input = TaskLayoutInput {
            layout: CoreLayout::new(2, 1),
            cpus_per_task: 1,
            ntasks_per_core: None,
            ntasks_per_socket: None,
            node_task_cap: 6,
            overcommit: true,
        };
        let cores = bitmap_from(2, &[0, 1]);
        let (tasks, rem) = build_task_layout(input, &cores);
        assert_eq!(tasks.iter().sum::<u32>(), 6);
        assert_eq!(rem, 0);
    }

    #[test]
    fn remainder_stays_positive_without_overcommit() {
        let input = TaskLayoutInput {
            layout: CoreLayout::new(1, 1),
            cpus_per_task: 1,
            ntasks_per_core: None,
            ntasks_per_socket: None,
            node_task_cap: 5,
            overcommit: false,
        };
        let cores = bitmap_from(1, &[0]);
        let (tasks, rem) = build_task_layout(input, &cores);
        assert_eq!(tasks, vec![1]);
        assert_eq!(rem, 4);
    }
}
