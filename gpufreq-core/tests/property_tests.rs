//! Property tests
//!
//! Table invariants, limiter order independence and target range checks
//! over generated inputs.

mod common;

use common::{FakeHardware, assert_buck_safe};
use gpufreq_core::{
    BUCK_DIFF_MAX, CentiMv, CurrentState, DvfsConfig, DvfsEngine, KickerId, LimitPriority,
    LimiterTable, OppSeed, OppTable, PMIC_STEP, Segment, SpringboardTable, VsramRule,
    volt_switch,
};
use proptest::prelude::*;

/// Generated seed tables that satisfy the VSRAM window
fn seed_table() -> impl Strategy<Value = Vec<OppSeed>> {
    (2usize..=16, 0u32..=3, 62u32..=72).prop_flat_map(|(len, margin_steps, base_steps)| {
        prop::collection::vec(1u32..=3, len).prop_map(move |vgpu_steps| {
            let mut vgpu = base_steps * 1_000;
            vgpu -= vgpu % PMIC_STEP;
            let mut freq = 300_000;
            let mut seeds: Vec<OppSeed> = vgpu_steps
                .iter()
                .map(|&steps| {
                    let seed = OppSeed {
                        freq_khz: freq,
                        vgpu,
                        aging_margin: margin_steps * PMIC_STEP,
                    };
                    freq += 40_000;
                    vgpu += steps * PMIC_STEP;
                    seed
                })
                .collect();
            seeds.reverse();
            seeds
        })
    })
}

fn limit_request() -> impl Strategy<Value = (usize, Option<usize>, Option<usize>, u8, bool)> {
    (
        0usize..KickerId::COUNT,
        prop::option::of(0usize..16),
        prop::option::of(0usize..16),
        1u8..=8,
        any::<bool>(),
    )
}

proptest! {
    #[test]
    fn prop_aging_toggle_is_exact(seeds in seed_table()) {
        let config = DvfsConfig::default();
        if let Ok(mut table) = OppTable::build(&seeds, VsramRule::TRACK_75000, None, &config) {
            let original = table.clone();
            table.apply_aging(true);
            table.apply_aging(false);
            prop_assert_eq!(table, original);
        }
    }

    #[test]
    fn prop_springboard_indices_are_safe(seeds in seed_table()) {
        let config = DvfsConfig::default();
        if let Ok(table) = OppTable::build(&seeds, VsramRule::TRACK_75000, None, &config) {
            let sb = SpringboardTable::build(&table, BUCK_DIFF_MAX);
            let points = table.points();
            for i in 0..table.len() {
                prop_assert!(sb.up(i) < table.len());
                prop_assert!(sb.down(i) < table.len());
                prop_assert!(points[sb.up(i)].vsram <= points[i].vgpu + BUCK_DIFF_MAX);
                prop_assert!(points[sb.down(i)].vgpu + BUCK_DIFF_MAX >= points[i].vsram);
            }
        }
    }

    #[test]
    fn prop_window_is_order_independent(
        requests in prop::collection::vec(limit_request(), 0..12),
        shift in 0usize..12,
    ) {
        let apply = |order: &[(usize, Option<usize>, Option<usize>, u8, bool)]| {
            let mut limiter = LimiterTable::new(0, 15);
            // last write per kicker wins, so keep one request per kicker
            for &(slot, upper, lower, prio, enabled) in order {
                let kicker = KickerId::ALL[slot];
                limiter.set_priority(kicker, LimitPriority(prio));
                limiter.update_limit(kicker, upper, lower);
                limiter.update_limit_enable(kicker, enabled, true);
            }
            limiter.resolve_window()
        };

        let mut unique = requests.clone();
        unique.sort_by_key(|request| request.0);
        unique.dedup_by_key(|request| request.0);

        let mut rotated = unique.clone();
        if !rotated.is_empty() {
            let by = shift % rotated.len();
            rotated.rotate_left(by);
        }
        let mut reversed = unique.clone();
        reversed.reverse();

        let window = apply(&unique);
        prop_assert_eq!(window, apply(&rotated));
        prop_assert_eq!(window, apply(&reversed));
        prop_assert!(window.upper_limited_idx <= window.lower_limited_idx);
    }

    #[test]
    fn prop_target_stays_in_segment(
        requests in prop::collection::vec((0u32..24, 0usize..KickerId::COUNT), 1..24),
        thermal_mw in 0u32..1_200,
    ) {
        let hw = FakeHardware::booted();
        let engine = DvfsEngine::builder(hw.clone())
            .segment(Segment::Mt8169B)
            .build()
            .unwrap();
        engine.set_thermal_power_limit(thermal_mw);

        for (idx, slot) in requests {
            let _ = engine.request_target(idx, KickerId::ALL[slot]);
            let state = engine.current_state();
            prop_assert!((2..=15).contains(&state.opp_idx));
            let window = engine.resolved_window();
            prop_assert!(state.opp_idx >= window.upper_limited_idx);
            prop_assert!(state.opp_idx <= window.lower_limited_idx);
        }
        assert_buck_safe(&hw);
    }

    #[test]
    fn prop_volt_switch_round_trip(
        from in 60_000u32..80_000,
        to in 60_000u32..80_000,
    ) {
        let rule = VsramRule::TRACK_75000;
        let config = DvfsConfig::default();
        let mut hw = FakeHardware::default();
        let mut state = CurrentState {
            vgpu: from,
            vsram: rule.vsram_from_vgpu(from),
            ..CurrentState::default()
        };

        volt_switch(&mut hw, &config, &mut state, to, rule.vsram_from_vgpu(to));
        volt_switch(&mut hw, &config, &mut state, from, rule.vsram_from_vgpu(from));
        prop_assert_eq!(state.vgpu, from);
        prop_assert_eq!(state.vsram, rule.vsram_from_vgpu(from));
    }
}

#[test]
fn test_signed_tables_build_for_every_segment() {
    let config = DvfsConfig::default();
    for segment in [Segment::Mt8169A, Segment::Mt8169B, Segment::Mt8169Lite] {
        let info = segment.info();
        let table = OppTable::build(segment.seeds(), info.vsram_rule, None, &config).unwrap();
        let vgpu: Vec<CentiMv> = table.points().iter().map(|opp| opp.vgpu).collect();
        assert!(vgpu.windows(2).all(|pair| pair[0] >= pair[1]));
    }
}
