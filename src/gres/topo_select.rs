/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Topology-aware bit pickers for non-shared GRES requests.
//!
//! All five selection strategies (`by_socket`, `by_node`, `by_task`,
//! `by_job` pass 1 and pass 2) share [`pick_gres_topo`], a greedy
//! best-connectivity picker: when a link matrix is available it always
//! prefers the candidate with the highest link-affinity to units already
//! chosen, re-sorting after every pick since scores change as units are
//! added. This restart is intentional (see module docs on
//! [`prune_to_link_best`]) — selection outcomes under a fixed `links_cnt`
//! matrix are part of this crate's contract, not an implementation detail.

use crate::bitmap::Bitmap;
use crate::gres::state::{LinkMatrix, SockGres, SocketSel};

/// Greedily sets up to `need` unset bits of `bits` into `chosen`, skipping
/// anything already in `chosen` or `alloc`. When `links` is defined, each
/// pick maximizes link-affinity to bits already set in `chosen` (including
/// bits set before this call — callers seed pass-2 connectivity by setting
/// `chosen` ahead of time). Returns the number of bits newly set.
pub fn pick_gres_topo(
    bits: &Bitmap,
    chosen: &mut Bitmap,
    alloc: Option<&Bitmap>,
    need: u64,
    links: &LinkMatrix,
) -> u64 {
    if need == 0 {
        return 0;
    }
    let candidates: Vec<usize> = bits
        .iter_ones()
        .filter(|&i| !chosen.test(i) && !alloc.map_or(false, |a| a.test(i)))
        .collect();
    if candidates.is_empty() {
        return 0;
    }

    let mut picked = 0u64;
    if links.is_defined() {
        let mut work: Vec<(usize, u64)> = candidates
            .iter()
            .map(|&u| {
                let seed: u64 = chosen.iter_ones().map(|c| links.link(c, u) as u64).sum();
                (u, seed)
            })
            .collect();
        while picked < need && !work.is_empty() {
            work.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let (unit, _) = work.remove(0);
            chosen.set(unit);
            picked += 1;
            for (u, s) in work.iter_mut() {
                *s += links.link(unit, *u) as u64;
            }
        }
    } else {
        for &u in &candidates {
            if picked >= need {
                break;
            }
            chosen.set(u);
            picked += 1;
        }
    }
    picked
}

/// Tops up a selection from the affinity-free `ANY` pool.
pub fn pick_with_any_fallback(
    sock: &SockGres,
    chosen: &mut Bitmap,
    alloc: Option<&Bitmap>,
    need: u64,
    links: &LinkMatrix,
) -> u64 {
    pick_gres_topo(sock.bits_for(SocketSel::Any), chosen, alloc, need, links)
}

/// Adjusts `used_sock` so the number of flagged sockets equals `target`:
/// electing the sockets with the most free units when under target,
/// dropping the sockets with the fewest free units when over.
pub fn reshape_used_sockets(used_sock: &mut [bool], sock: &SockGres, target: usize) {
    let current = used_sock.iter().filter(|&&b| b).count();
    if current == target {
        return;
    }
    if current < target {
        let mut candidates: Vec<usize> = (0..used_sock.len()).filter(|&s| !used_sock[s]).collect();
        candidates.sort_by_key(|&s| std::cmp::Reverse(sock.cnt_by_sock.get(s).copied().unwrap_or(0)));
        for s in candidates {
            if used_sock.iter().filter(|&&b| b).count() >= target {
                break;
            }
            used_sock[s] = true;
        }
    } else {
        let mut candidates: Vec<usize> = (0..used_sock.len()).filter(|&s| used_sock[s]).collect();
        candidates.sort_by_key(|&s| sock.cnt_by_sock.get(s).copied().unwrap_or(0));
        for s in candidates {
            if used_sock.iter().filter(|&&b| b).count() <= target {
                break;
            }
            used_sock[s] = false;
        }
    }
}

/// `gres_per_socket`: one socket-restricted pass per flagged socket, each
/// topped up from `ANY` if short.
pub fn select_by_socket(
    sock: &SockGres,
    chosen: &mut Bitmap,
    alloc: Option<&Bitmap>,
    used_sock: &[bool],
    gres_per_socket: u64,
    links: &LinkMatrix,
) -> u64 {
    let mut total = 0u64;
    for (s, &flagged) in used_sock.iter().enumerate() {
        if !flagged {
            continue;
        }
        let got = pick_gres_topo(sock.bits_for(SocketSel::Socket(s)), chosen, alloc, gres_per_socket, links);
        total += got;
        if got < gres_per_socket {
            total += pick_with_any_fallback(sock, chosen, alloc, gres_per_socket - got, links);
        }
    }
    total
}

/// `gres_per_node`: one-per-allocated-socket, then more from allocated
/// sockets, then unallocated sockets — each stage topped up from `ANY`.
pub fn select_by_node(
    sock: &SockGres,
    chosen: &mut Bitmap,
    alloc: Option<&Bitmap>,
    used_sock: &[bool],
    gres_per_node: u64,
    links: &LinkMatrix,
) -> u64 {
    let allocated: Vec<usize> = (0..used_sock.len()).filter(|&s| used_sock[s]).collect();
    let mut placed = 0u64;

    for &s in &allocated {
        if placed >= gres_per_node {
            break;
        }
        placed += pick_gres_topo(sock.bits_for(SocketSel::Socket(s)), chosen, alloc, 1, links);
    }
    if placed < gres_per_node {
        placed += pick_with_any_fallback(sock, chosen, alloc, gres_per_node - placed, links);
    }
    if placed < gres_per_node {
        for &s in &allocated {
            if placed >= gres_per_node {
                break;
            }
            placed += pick_gres_topo(
                sock.bits_for(SocketSel::Socket(s)),
                chosen,
                alloc,
                gres_per_node - placed,
                links,
            );
        }
    }
    if placed < gres_per_node {
        placed += pick_with_any_fallback(sock, chosen, alloc, gres_per_node - placed, links);
    }
    if placed < gres_per_node {
        for s in 0..sock.sock_cnt {
            if allocated.contains(&s) {
                continue;
            }
            if placed >= gres_per_node {
                break;
            }
            placed += pick_gres_topo(
                sock.bits_for(SocketSel::Socket(s)),
                chosen,
                alloc,
                gres_per_node - placed,
                links,
            );
        }
    }
    placed
}

/// `gres_per_task`: distributes `tasks_per_socket[s] * gres_per_task`
/// across sockets with tasks, then `ANY`, then any remaining socket.
pub fn select_by_task(
    sock: &SockGres,
    chosen: &mut Bitmap,
    alloc: Option<&Bitmap>,
    tasks_per_socket: &[u32],
    gres_per_task: u64,
    links: &LinkMatrix,
) -> u64 {
    let gres_needed: u64 = tasks_per_socket.iter().map(|&t| t as u64).sum::<u64>() * gres_per_task;
    let mut placed = 0u64;

    for (s, &tasks) in tasks_per_socket.iter().enumerate() {
        if tasks == 0 || placed >= gres_needed {
            continue;
        }
        let want = (tasks as u64 * gres_per_task).min(gres_needed - placed);
        placed += pick_gres_topo(sock.bits_for(SocketSel::Socket(s)), chosen, alloc, want, links);
    }
    if placed < gres_needed {
        placed += pick_with_any_fallback(sock, chosen, alloc, gres_needed - placed, links);
    }
    if placed < gres_needed {
        for s in 0..tasks_per_socket.len() {
            if placed >= gres_needed {
                break;
            }
            placed += pick_gres_topo(
                sock.bits_for(SocketSel::Socket(s)),
                chosen,
                alloc,
                gres_needed - placed,
                links,
            );
        }
    }
    placed
}

/// `gres_per_job`, first pass: reserves at least one unit per remaining
/// node by capping this node's take at
/// `gres_per_job - total_gres_so_far - (rem_nodes - 1)`. When links are
/// usable and that cap exceeds 1, picks everything reachable and then
/// prunes back down with [`prune_to_link_best`].
pub fn select_by_job_pass1(
    sock: &SockGres,
    chosen: &mut Bitmap,
    alloc: Option<&Bitmap>,
    used_sock: &[bool],
    links: &LinkMatrix,
    gres_per_job: u64,
    total_gres_so_far: u64,
    rem_nodes: u64,
) -> u64 {
    let reserve = (rem_nodes.max(1) - 1) as i64;
    let max_gres = (gres_per_job as i64 - total_gres_so_far as i64 - reserve).max(0) as u64;
    if max_gres == 0 {
        return 0;
    }

    let want = if links.is_defined() && max_gres > 1 {
        u64::MAX
    } else {
        max_gres.max(1)
    };

    let allocated: Vec<usize> = (0..used_sock.len()).filter(|&s| used_sock[s]).collect();
    let mut placed = 0u64;
    for &s in &allocated {
        if placed >= want {
            break;
        }
        placed += pick_gres_topo(sock.bits_for(SocketSel::Socket(s)), chosen, alloc, want - placed, links);
    }
    if placed < want {
        placed += pick_with_any_fallback(sock, chosen, alloc, want - placed, links);
    }
    if placed == 0 {
        for s in 0..sock.sock_cnt {
            if allocated.contains(&s) {
                continue;
            }
            placed += pick_gres_topo(sock.bits_for(SocketSel::Socket(s)), chosen, alloc, want, links);
            if placed > 0 {
                break;
            }
        }
    }

    if (chosen.popcount() as u64) > max_gres {
        prune_to_link_best(chosen, links, max_gres);
    }
    chosen.popcount() as u64
}

/// Clears chosen bits down to `max_gres`, keeping the most mutually
/// connected subset: anchors on the pair with the single highest link
/// count among currently-chosen indices, then repeatedly drops the
/// chosen index least connected to that anchor.
pub fn prune_to_link_best(chosen: &mut Bitmap, links: &LinkMatrix, max_gres: u64) {
    loop {
        let idxs: Vec<usize> = chosen.iter_ones().collect();
        if idxs.len() as u64 <= max_gres {
            break;
        }

        let mut anchor = idxs[0];
        let mut best_link = 0u32;
        for &s in &idxs {
            for &g in &idxs {
                if s == g {
                    continue;
                }
                let l = links.link(s, g);
                if l > best_link {
                    best_link = l;
                    anchor = s;
                }
            }
        }

        let mut worst: Option<usize> = None;
        let mut worst_link = u32::MAX;
        for &x in &idxs {
            if x == anchor {
                continue;
            }
            let l = links.link(anchor, x);
            if l < worst_link {
                worst_link = l;
                worst = Some(x);
            }
        }

        match worst {
            Some(w) => chosen.clear(w),
            None => break,
        }
    }
}

/// `gres_per_job`, second pass: run once pass 1 left some node's job
/// counter unmet. Seeds connectivity scores from every unit already
/// chosen on this node (across the whole job, not just this call) before
/// picking more.
pub fn select_by_job_pass2_on_node(
    sock: &SockGres,
    chosen: &mut Bitmap,
    alloc: Option<&Bitmap>,
    used_sock: &[bool],
    links: &LinkMatrix,
    need: u64,
) -> u64 {
    let allocated: Vec<usize> = (0..used_sock.len()).filter(|&s| used_sock[s]).collect();
    let mut placed = 0u64;
    for &s in &allocated {
        if placed >= need {
            break;
        }
        placed += pick_gres_topo(sock.bits_for(SocketSel::Socket(s)), chosen, alloc, need - placed, links);
    }
    if placed < need {
        placed += pick_with_any_fallback(sock, chosen, alloc, need - placed, links);
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gres::state::GresKind;

    fn bitmap_from(len: usize, set: &[usize]) -> Bitmap {
        let mut b = Bitmap::new(len);
        for &i in set {
            b.set(i);
        }
        b
    }

    fn sock_all_any(unit_count: usize) -> SockGres {
        let mut any = Bitmap::new(unit_count);
        for i in 0..unit_count {
            any.set(i);
        }
        SockGres {
            kind: GresKind::new(1, false),
            type_id: 0,
            total_cnt: unit_count as u64,
            max_node_gres: 0,
            sock_cnt: 0,
            cnt_by_sock: vec![],
            bits_by_sock: vec![],
            bits_any_sock: any,
            unit_to_topo: None,
        }
    }

    #[test]
    fn pick_gres_topo_without_links_takes_natural_order() {
        let sock = sock_all_any(4);
        let mut chosen = Bitmap::new(4);
        let got = pick_gres_topo(&sock.bits_any_sock, &mut chosen, None, 2, &LinkMatrix::default());
        assert_eq!(got, 2);
        assert!(chosen.test(0) && chosen.test(1));
    }

    #[test]
    fn pick_gres_topo_skips_already_allocated() {
        let sock = sock_all_any(4);
        let mut chosen = Bitmap::new(4);
        let alloc = bitmap_from(4, &[0, 1]);
        let got = pick_gres_topo(&sock.bits_any_sock, &mut chosen, Some(&alloc), 2, &LinkMatrix::default());
        assert_eq!(got, 2);
        assert!(chosen.test(2) && chosen.test(3));
    }

    #[test]
    fn scenario_clique_prefers_highest_link_pair() {
        // 4-unit clique: links[0][1] = 4, all other pairs = 1.
        let mut rows = vec![vec![1u32; 4]; 4];
        for i in 0..4 {
            rows[i][i] = 0;
        }
        rows[0][1] = 4;
        rows[1][0] = 4;
        let links = LinkMatrix::from_rows(rows);

        let sock = sock_all_any(4);
        let mut chosen = Bitmap::new(4);
        let used_sock: Vec<bool> = vec![];
        let placed = select_by_job_pass1(&sock, &mut chosen, None, &used_sock, &links, 2, 0, 1);
        assert_eq!(placed, 2);
        assert!(chosen.test(0));
        assert!(chosen.test(1));
        assert!(!chosen.test(2));
        assert!(!chosen.test(3));
    }

    #[test]
    fn reshape_used_sockets_grows_to_target() {
        let mut used = vec![true, false, false];
        let sock = SockGres {
            kind: GresKind::new(1, false),
            type_id: 0,
            total_cnt: 6,
            max_node_gres: 0,
            sock_cnt: 3,
            cnt_by_sock: vec![1, 3, 2],
            bits_by_sock: (0..3).map(|_| Bitmap::new(6)).collect(),
            bits_any_sock: Bitmap::new(6),
            unit_to_topo: None,
        };
        reshape_used_sockets(&mut used, &sock, 2);
        assert_eq!(used, vec![true, true, false]);
    }

    #[test]
    fn reshape_used_sockets_shrinks_to_target() {
        let mut used = vec![true, true, true];
        let sock = SockGres {
            kind: GresKind::new(1, false),
            type_id: 0,
            total_cnt: 6,
            max_node_gres: 0,
            sock_cnt: 3,
            cnt_by_sock: vec![1, 3, 2],
            bits_by_sock: (0..3).map(|_| Bitmap::new(6)).collect(),
            bits_any_sock: Bitmap::new(6),
            unit_to_topo: None,
        };
        reshape_used_sockets(&mut used, &sock, 1);
        assert_eq!(used, vec![false, true, false]);
    }

    #[test]
    fn select_by_node_reserves_one_per_socket_first() {
        let mut bits0 = Bitmap::new(8);
        bits0.set(0);
        bits0.set(1);
        let mut bits1 = Bitmap::new(8);
        bits1.set(2);
        bits1.set(3);
        let sock = SockGres {
            kind: GresKind::new(1, false),
            type_id: 0,
            total_cnt: 4,
            max_node_gres: 0,
            sock_cnt: 2,
            cnt_by_sock: vec![2, 2],
            bits_by_sock: vec![bits0, bits1],
            bits_any_sock: Bitmap::new(8),
            unit_to_topo: None,
        };
        let mut chosen = Bitmap::new(8);
        let used = vec![true, true];
        let placed = select_by_node(&sock, &mut chosen, None, &used, 2, &LinkMatrix::default());
        assert_eq!(placed, 2);
        assert!(chosen.test(0));
        assert!(chosen.test(2));
    }
}
