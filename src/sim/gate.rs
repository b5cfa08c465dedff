//! Gate traversal
//!
//! Shared by the chassis and by enemies. Auto channels use the target fixed at
//! parse time; explicit channels pick uniformly among every other cluster with
//! the same digit on each traversal.

use glam::IVec2;
use rand::Rng;
use rand_pcg::Pcg32;

use super::geometry::{CARDINALS, WallMap};
use super::state::{GateChannel, GateLink, Wall};

/// Where a traversal lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Warp {
    pub pos: IVec2,
    /// Direction of travel on exit
    pub dir: IVec2,
    pub cluster: u32,
}

/// Cluster an entry through `link` leads to
pub fn destination_cluster(walls: &[Wall], link: GateLink, rng: &mut Pcg32) -> Option<u32> {
    match link.channel {
        GateChannel::Auto => link.target,
        GateChannel::Explicit(_) => {
            let mut candidates: Vec<u32> = walls
                .iter()
                .filter_map(|w| w.gate())
                .filter(|g| g.channel == link.channel && g.cluster != link.cluster)
                .map(|g| g.cluster)
                .collect();
            candidates.sort_unstable();
            candidates.dedup();
            match candidates.len() {
                0 => None,
                1 => Some(candidates[0]),
                n => Some(candidates[rng.random_range(0..n)]),
            }
        }
    }
}

/// Resolve the exit cell for an entry through `link` while moving `travel`.
///
/// Exit cells are free 4-neighbours of the destination cluster; the one whose
/// exit direction best matches `travel` wins, ties going to scan order.
pub fn resolve_warp(
    walls: &[Wall],
    map: &WallMap,
    link: GateLink,
    travel: IVec2,
    rng: &mut Pcg32,
    is_free: impl Fn(IVec2) -> bool,
) -> Option<Warp> {
    let target = destination_cluster(walls, link, rng)?;

    let mut best: Option<(i32, Warp)> = None;
    let cluster_cells = walls
        .iter()
        .filter(|w| w.gate().is_some_and(|g| g.cluster == target))
        .map(|w| IVec2::new(w.x, w.y));
    for cell in cluster_cells {
        for dir in CARDINALS {
            let exit = cell + dir;
            if map.is_blocked(exit) || !is_free(exit) {
                continue;
            }
            let score = dir.dot(travel);
            if best.is_none_or(|(s, _)| score > s) {
                best = Some((
                    score,
                    Warp {
                        pos: exit,
                        dir,
                        cluster: target,
                    },
                ));
            }
        }
    }
    best.map(|(_, warp)| warp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::layout::{parse_layout, tests::layout_with};
    use rand::SeedableRng;

    fn link_at(walls: &[Wall], x: i32, y: i32) -> GateLink {
        walls
            .iter()
            .find(|w| w.x == x && w.y == y)
            .and_then(|w| w.gate())
            .unwrap()
    }

    #[test]
    fn test_warp_prefers_travel_direction() {
        let parsed = parse_layout(&layout_with(&[(5, 5, 'G'), (20, 10, 'G')]));
        let map = WallMap::new(&parsed.walls);
        let mut rng = Pcg32::seed_from_u64(1);
        let warp = resolve_warp(
            &parsed.walls,
            &map,
            link_at(&parsed.walls, 5, 5),
            IVec2::X,
            &mut rng,
            |_| true,
        )
        .unwrap();
        assert_eq!(warp.pos, IVec2::new(21, 10));
        assert_eq!(warp.dir, IVec2::X);
    }

    #[test]
    fn test_warp_falls_back_to_any_free_neighbor() {
        let parsed = parse_layout(&layout_with(&[(5, 5, 'G'), (20, 10, 'G'), (21, 10, '#')]));
        let map = WallMap::new(&parsed.walls);
        let mut rng = Pcg32::seed_from_u64(1);
        let blocked_left = IVec2::new(19, 10);
        let warp = resolve_warp(
            &parsed.walls,
            &map,
            link_at(&parsed.walls, 5, 5),
            IVec2::X,
            &mut rng,
            |p| p != blocked_left,
        )
        .unwrap();
        assert!(warp.dir == IVec2::Y || warp.dir == IVec2::NEG_Y);
    }

    #[test]
    fn test_explicit_channel_never_crosses_digits() {
        let parsed = parse_layout(&layout_with(&[
            (5, 5, '3'),
            (30, 5, '3'),
            (12, 20, '3'),
            (5, 25, '5'),
            (30, 25, '5'),
        ]));
        let map = WallMap::new(&parsed.walls);
        let entry = link_at(&parsed.walls, 5, 5);
        let five = link_at(&parsed.walls, 5, 25).cluster;
        let mut rng = Pcg32::seed_from_u64(9);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let warp = resolve_warp(&parsed.walls, &map, entry, IVec2::X, &mut rng, |_| true).unwrap();
            assert_ne!(warp.cluster, entry.cluster);
            assert_ne!(warp.cluster, five);
            seen.insert(warp.cluster);
        }
        // both other "3" clusters are reachable
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_unlinked_gate_has_no_destination() {
        let parsed = parse_layout(&layout_with(&[(5, 5, '7')]));
        let map = WallMap::new(&parsed.walls);
        let mut rng = Pcg32::seed_from_u64(1);
        let link = link_at(&parsed.walls, 5, 5);
        assert!(resolve_warp(&parsed.walls, &map, link, IVec2::X, &mut rng, |_| true).is_none());
    }
}
