//! Property-based invariant tests for the chassis and the layout compiler.
//!
//! 1. A rebuild keeps every body segment at its index and only appends growth.
//! 2. Charge never exceeds the body length and the head stays out of walls.
//! 3. Any layout, however ragged, compiles to a closed boundary.
//! 4. Export then re-parse reproduces the same board.
//! 5. Substring sequence matching agrees with a naive scan.

use glam::IVec2;
use proptest::prelude::*;

use serpent_core::consts::*;
use serpent_core::sim::geometry::is_perimeter;
use serpent_core::sim::state::SegmentKind;
use serpent_core::sim::tick::{Growth, rebuild_chassis, sequence_matches};
use serpent_core::sim::{
    GameStatus, MatterType, Segment, TickInput, export_layout, new_run, parse_layout, process_game_tick,
};
use serpent_core::tuning::Tuning;

// ── Helpers ─────────────────────────────────────────────────────────────

fn matter_strategy() -> impl Strategy<Value = MatterType> {
    prop_oneof![
        Just(MatterType::Alpha),
        Just(MatterType::Beta),
        Just(MatterType::Gamma),
    ]
}

/// A straight chassis trailing left from (20, 10)
fn chassis_strategy() -> impl Strategy<Value = Vec<Segment>> {
    prop::collection::vec((matter_strategy(), any::<bool>()), 0..12).prop_map(|body| {
        let mut segments = vec![Segment::head(1, IVec2::new(20, 10), 0)];
        for (i, (variant, charged)) in body.into_iter().enumerate() {
            let mut s = Segment::empty_body(i as u32 + 2, IVec2::new(19 - i as i32, 10), variant, 0);
            s.charged = charged;
            segments.push(s);
        }
        segments
    })
}

fn layout_strategy() -> impl Strategy<Value = Vec<String>> {
    let cell = prop_oneof![
        6 => Just('.'),
        2 => Just('#'),
        1 => Just('T'),
        1 => Just('G'),
        1 => Just('3'),
        1 => Just('C'),
        1 => Just('?'),
    ];
    let row = prop::collection::vec(cell, 0..45).prop_map(|cells| cells.into_iter().collect::<String>());
    prop::collection::vec(row, 0..34)
}

fn direction_strategy() -> impl Strategy<Value = IVec2> {
    prop_oneof![
        Just(IVec2::ZERO),
        Just(IVec2::X),
        Just(IVec2::NEG_X),
        Just(IVec2::Y),
        Just(IVec2::NEG_Y),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Rebuild index stability
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn rebuild_keeps_indices(prev in chassis_strategy(), grow in prop::option::of(matter_strategy())) {
        let head = Segment::head(100, IVec2::new(21, 10), 5);
        let growth = grow.map(|variant| Growth { id: 101, variant });
        let next = rebuild_chassis(&prev, head, growth, 5);

        prop_assert_eq!(next.len(), prev.len() + usize::from(grow.is_some()));
        prop_assert_eq!(next[0].kind, SegmentKind::Head);
        for i in 1..prev.len() {
            prop_assert_eq!(next[i].id, prev[i].id);
            prop_assert_eq!(next[i].charged, prev[i].charged);
            prop_assert_eq!(next[i].variant, prev[i].variant);
            prop_assert_eq!(next[i].pos, prev[i - 1].pos);
        }
        if let Some(variant) = grow {
            let tail = &next[next.len() - 1];
            prop_assert!(!tail.charged);
            prop_assert_eq!(tail.variant, Some(variant));
            prop_assert_eq!(tail.pos, prev[prev.len() - 1].pos);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Charge bounds and wall exclusion over random play
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn random_play_keeps_chassis_sane(
        seed in any::<u64>(),
        level in 1u32..12,
        moves in prop::collection::vec(direction_strategy(), 1..200),
    ) {
        let mut state = new_run(seed, Tuning::default(), level, 0);
        let mut now = state.countdown_until;
        for direction in moves {
            now += state.effective_tick_rate(now);
            let out = process_game_tick(&state, &TickInput { direction, timestamp: now, ..Default::default() });
            state = out.state;

            prop_assert!(state.charged_count() as usize <= state.body().len());
            if state.status == GameStatus::Playing {
                prop_assert_eq!(state.segments[0].kind, SegmentKind::Head);
                prop_assert!(state.body().iter().all(|s| s.kind == SegmentKind::Body && s.variant.is_some()));
                let head = state.head_pos();
                prop_assert!(!state.walls.iter().any(|w| w.contains(head)), "head inside a wall at {:?}", head);
            } else {
                break;
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Boundary closure
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn any_layout_is_closed(rows in layout_strategy()) {
        let parsed = parse_layout(&rows);
        for y in 0..GRID_HEIGHT {
            for x in 0..GRID_WIDTH {
                let p = IVec2::new(x, y);
                if is_perimeter(p) {
                    prop_assert!(parsed.walls.iter().any(|w| w.contains(p)), "perimeter {:?} open", p);
                }
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Export / parse round trip
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn export_reparses_to_same_board(rows in layout_strategy()) {
        let first = parse_layout(&rows);
        let exported = export_layout(&first.walls, &first.enemies);
        let second = parse_layout(&exported);
        prop_assert_eq!(&export_layout(&second.walls, &second.enemies), &exported);
        prop_assert_eq!(second.enemies, first.enemies);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Sequence matching
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn sequence_match_is_contiguous_substring(
        charged in prop::collection::vec(matter_strategy(), 0..10),
        required in prop::collection::vec(matter_strategy(), 0..4),
    ) {
        let naive = required.is_empty()
            || (required.len() <= charged.len()
                && (0..=charged.len() - required.len()).any(|s| charged[s..s + required.len()] == required[..]));
        let found = sequence_matches(&charged, &required);
        prop_assert_eq!(found.is_some(), naive);
        if let Some(start) = found.filter(|_| !required.is_empty()) {
            prop_assert_eq!(&charged[start..start + required.len()], &required[..]);
        }
    }
}
