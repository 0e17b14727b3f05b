//! DVFS engine
//!
//! [`DvfsEngine`] owns every table and the hardware backend. Three locks
//! guard it, always taken in this order:
//!
//! 1. `gpufreq`: tables, current state, overrides and the hardware
//! 2. `limit`: the limiter table
//! 3. `power`: the power domain reference count
//!
//! A target request holds `gpufreq` for the whole resolution and
//! transition, so two transitions never interleave.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::ops::RangeInclusive;

use gpufreq_api::sync::Mutex;
use gpufreq_api::{
    BudgetUpdate, CentiMv, CurrentState, Error, FreqKhz, GpuHardware, KickerId, LeakageModel,
    LimitPriority, Milliwatt, OperatingPoint, PowerBudget, ResolvedWindow, Result, SkipMask,
    SkipReason, VoltageSource,
};

use crate::config::DvfsConfig;
use crate::domain::{PowerChange, PowerDomain};
use crate::limiter::{LimiterEntry, LimiterTable};
use crate::opp::OppTable;
use crate::power::{FixedLeakage, PowerTable, dynamic_power};
use crate::segment::{OppSeed, Segment, SegmentInfo};
use crate::springboard::SpringboardTable;
use crate::stress::StressGenerator;
use crate::transition::{TransitionEngine, TransitionTarget, TransitionTrace, normalize_volt};

/// Override that pins the GPU and blocks target requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedOverride {
    /// Pinned to a signed-table index
    Opp(usize),
    /// Pinned to an arbitrary frequency and voltage
    FreqVolt {
        /// Fixed frequency
        freq_khz: FreqKhz,
        /// Fixed VGPU voltage
        vgpu: CentiMv,
    },
}

impl fmt::Display for FixedOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixedOverride::Opp(idx) => write!(f, "opp {}", idx),
            FixedOverride::FreqVolt { freq_khz, vgpu } => write!(f, "{} kHz @ {}", freq_khz, vgpu),
        }
    }
}

/// State guarded by the `gpufreq` lock
pub(crate) struct GpuFreqState<H> {
    pub(crate) hw: H,
    pub(crate) table: OppTable,
    pub(crate) springboard: SpringboardTable,
    pub(crate) power_table: PowerTable,
    pub(crate) state: CurrentState,
    pub(crate) dvfs_enabled: bool,
    pub(crate) fixed: Option<FixedOverride>,
    pub(crate) stress: StressGenerator,
    pub(crate) last_trace: Option<TransitionTrace>,
}

/// GPU DVFS engine
pub struct DvfsEngine<H: GpuHardware> {
    pub(crate) gpufreq: Mutex<GpuFreqState<H>>,
    pub(crate) limit: Mutex<LimiterTable>,
    pub(crate) power: Mutex<PowerDomain>,
    pub(crate) segment: SegmentInfo,
    pub(crate) config: DvfsConfig,
    budget: Option<Box<dyn PowerBudget>>,
    leakage: Box<dyn LeakageModel>,
}

/// Builder for [`DvfsEngine`]
pub struct DvfsEngineBuilder<'a, H: GpuHardware> {
    hw: H,
    segment: Segment,
    custom: Option<(SegmentInfo, &'a [OppSeed])>,
    config: DvfsConfig,
    voltage_source: Option<&'a dyn VoltageSource>,
    budget: Option<Box<dyn PowerBudget>>,
    leakage: Option<Box<dyn LeakageModel>>,
}

impl<'a, H: GpuHardware> DvfsEngineBuilder<'a, H> {
    /// Chip segment, default [`Segment::Mt8169A`]
    pub fn segment(mut self, segment: Segment) -> Self {
        self.segment = segment;
        self
    }

    /// Use a custom seed table and bounds instead of a segment's
    pub fn custom_table(mut self, info: SegmentInfo, seeds: &'a [OppSeed]) -> Self {
        self.custom = Some((info, seeds));
        self
    }

    /// Engine configuration
    pub fn config(mut self, config: DvfsConfig) -> Self {
        self.config = config;
        self
    }

    /// Source of per-frequency voltages consulted while building the table
    pub fn voltage_source(mut self, source: &'a dyn VoltageSource) -> Self {
        self.voltage_source = Some(source);
        self
    }

    /// Consumer notified after transitions and power changes
    pub fn power_budget(mut self, budget: Box<dyn PowerBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Leakage model, default [`FixedLeakage`] from the config
    pub fn leakage(mut self, leakage: Box<dyn LeakageModel>) -> Self {
        self.leakage = Some(leakage);
        self
    }

    /// Build the tables, read the hardware and move to the initial OPP
    pub fn build(self) -> Result<DvfsEngine<H>> {
        let DvfsEngineBuilder {
            mut hw,
            segment,
            custom,
            config,
            voltage_source,
            budget,
            leakage,
        } = self;

        config.validate()?;
        let (info, seeds) = custom.unwrap_or((segment.info(), segment.seeds()));
        if info.max_opp_idx > info.min_opp_idx || info.min_opp_idx >= seeds.len() {
            return Err(Error::InvalidConfig("segment bounds outside OPP table"));
        }

        let table = OppTable::build(seeds, info.vsram_rule, voltage_source, &config)?;
        let springboard = SpringboardTable::build(&table, config.buck_diff_max);
        let leakage = leakage.unwrap_or_else(|| Box::new(FixedLeakage(config.fixed_leakage_mw)));
        let power_table = PowerTable::build(&table, &config.power_ref, leakage.as_ref());

        let mut state = CurrentState::default();
        TransitionEngine::new(&mut hw, &config).read_back(&mut state);
        state.opp_idx = table.idx_by_freq(state.freq_khz, info.max_opp_idx..=info.min_opp_idx);

        let engine = DvfsEngine {
            gpufreq: Mutex::new(GpuFreqState {
                hw,
                table,
                springboard,
                power_table,
                state,
                dvfs_enabled: true,
                fixed: None,
                stress: StressGenerator::default(),
                last_trace: None,
            }),
            limit: Mutex::new(LimiterTable::new(info.max_opp_idx, info.min_opp_idx)),
            power: Mutex::new(PowerDomain::default()),
            segment: info,
            config,
            budget,
            leakage,
        };

        {
            let mut inner = engine.gpufreq.lock();
            let initial = (info.max_opp_idx + config.initial_opp_idx).min(info.min_opp_idx);
            if let Some(target) = TransitionTarget::from_table(&inner.table, initial) {
                engine.switch_locked(&mut inner, target);
            }
            gf_info!(
                "{} DVFS up: opp {} {} kHz vgpu {} vsram {}",
                info.name,
                inner.state.opp_idx,
                inner.state.freq_khz,
                inner.state.vgpu,
                inner.state.vsram
            );
        }

        Ok(engine)
    }
}

impl<H: GpuHardware> DvfsEngine<H> {
    /// Start building an engine around a hardware backend
    pub fn builder<'a>(hw: H) -> DvfsEngineBuilder<'a, H> {
        DvfsEngineBuilder {
            hw,
            segment: Segment::default(),
            custom: None,
            config: DvfsConfig::default(),
            voltage_source: None,
            budget: None,
            leakage: None,
        }
    }

    /// Segment parameters in use
    pub fn segment(&self) -> SegmentInfo {
        self.segment
    }

    /// Configuration in use
    pub fn config(&self) -> &DvfsConfig {
        &self.config
    }

    pub(crate) fn segment_range(&self) -> RangeInclusive<usize> {
        self.segment.max_opp_idx..=self.segment.min_opp_idx
    }

    // ---- limiter ----

    /// Store a kicker's index bounds
    ///
    /// Indices address the signed table and are clamped into the segment.
    /// The new window applies from the next target request.
    pub fn set_limit(&self, kicker: KickerId, upper_idx: Option<u32>, lower_idx: Option<u32>) {
        self.limit
            .lock()
            .update_limit(kicker, upper_idx.map(|idx| idx as usize), lower_idx.map(|idx| idx as usize));
    }

    /// Enable or disable a kicker's bounds
    pub fn set_limit_enable(&self, kicker: KickerId, upper_enabled: bool, lower_enabled: bool) {
        self.limit.lock().update_limit_enable(kicker, upper_enabled, lower_enabled);
    }

    /// Change a kicker's priority
    pub fn set_limit_priority(&self, kicker: KickerId, priority: LimitPriority) {
        self.limit.lock().set_priority(kicker, priority);
    }

    /// Window currently in effect
    pub fn resolved_window(&self) -> ResolvedWindow {
        self.limit.lock().window()
    }

    /// Copy of every limiter slot
    pub fn limit_entries(&self) -> Vec<LimiterEntry> {
        self.limit.lock().entries().to_vec()
    }

    /// Copy of the limiter table
    pub fn limiter(&self) -> LimiterTable {
        self.limit.lock().clone()
    }

    /// Store a throttling bound and re-target if the GPU sits outside it
    pub(crate) fn throttle_locked(
        &self,
        inner: &mut GpuFreqState<H>,
        kicker: KickerId,
        upper: Option<usize>,
        lower: Option<usize>,
    ) {
        let window = {
            let mut limit = self.limit.lock();
            if !limit.update_limit(kicker, upper, lower) {
                return;
            }
            limit.window()
        };

        let cur = inner.state.opp_idx;
        if window.clamp(cur) != cur {
            if let Err(reason) = self.resolve_and_switch(inner, cur, kicker) {
                gf_debug!("{} throttle at opp {} not applied: {}", kicker, cur, reason);
            }
        }
    }

    // ---- target resolution ----

    /// Request an OPP index on behalf of a kicker
    ///
    /// `POLICY` requests are relative to the segment's fastest index,
    /// `PTPOD` requests re-apply the current index, all others address the
    /// signed table. The target is clamped into the limiter window.
    pub fn request_target(&self, request_idx: u32, kicker: KickerId) -> core::result::Result<(), SkipReason> {
        let mut inner = self.gpufreq.lock();

        let mut raw_idx = match kicker {
            KickerId::Policy => (request_idx as usize).saturating_add(self.segment.max_opp_idx),
            KickerId::Ptpod => inner.state.opp_idx,
            _ => request_idx as usize,
        };

        if inner.stress.enabled() {
            let idx = inner.stress.next_idx(self.segment_range());
            self.limit.lock().update_limit(KickerId::Stress, Some(idx), Some(idx));
            gf_trace!("stress picks opp {}", idx);
            raw_idx = idx;
        }

        self.resolve_and_switch(&mut inner, raw_idx, kicker)
    }

    pub(crate) fn resolve_and_switch(
        &self,
        inner: &mut GpuFreqState<H>,
        raw_idx: usize,
        kicker: KickerId,
    ) -> core::result::Result<(), SkipReason> {
        let mut mask = SkipMask::empty();
        if !inner.dvfs_enabled {
            mask |= SkipMask::DVFS_DISABLED;
        }
        if !self.segment_range().contains(&raw_idx) {
            mask |= SkipMask::OUT_OF_RANGE;
        }
        if inner.fixed.is_some() {
            mask |= SkipMask::FIXED_OVERRIDE;
        }

        let window = self.limit.lock().window();
        let target_idx = window.clamp(raw_idx.clamp(self.segment.max_opp_idx, self.segment.min_opp_idx));
        let Some(target) = TransitionTarget::from_table(&inner.table, target_idx) else {
            gf_error!("resolved opp {} outside OPP table", target_idx);
            return Err(SkipReason::OutOfSegmentRange);
        };

        if target.freq_khz == inner.state.freq_khz && target.vgpu == inner.state.vgpu {
            mask |= SkipMask::NO_CHANGE;
        }

        if let Err(reason) = mask.into_result() {
            gf_trace!("{} request {} skipped, mask {:?}", kicker, raw_idx, mask);
            return Err(reason);
        }

        gf_debug!(
            "{} request {} -> opp {} ({} kHz, vgpu {})",
            kicker,
            raw_idx,
            target_idx,
            target.freq_khz,
            target.vgpu
        );
        self.switch_locked(inner, target);
        Ok(())
    }

    fn switch_locked(&self, inner: &mut GpuFreqState<H>, target: TransitionTarget) {
        let GpuFreqState {
            hw,
            table,
            springboard,
            state,
            last_trace,
            ..
        } = inner;

        let trace = TransitionEngine::new(hw, &self.config).run(state, target, table, springboard);
        gf_debug!(
            "{:?} transition via {:?}: now opp {} {} kHz vgpu {} vsram {}",
            trace.direction,
            trace.steps,
            state.opp_idx,
            state.freq_khz,
            state.vgpu,
            state.vsram
        );
        *last_trace = Some(trace);

        let powered = self.power.lock().is_powered();
        self.notify_budget(state, powered);
    }

    fn notify_budget(&self, state: &CurrentState, powered: bool) {
        if let Some(budget) = &self.budget {
            budget.on_gpu_update(BudgetUpdate {
                powered,
                freq_khz: state.freq_khz,
                vgpu: state.vgpu,
                power_mw: self.power_at(state.freq_khz, state.vgpu),
            });
        }
    }

    fn power_at(&self, freq_khz: FreqKhz, vgpu: CentiMv) -> Milliwatt {
        dynamic_power(freq_khz, vgpu, &self.config.power_ref).saturating_add(self.leakage.leakage_mw(vgpu))
    }

    /// Record of the last performed transition
    pub fn last_trace(&self) -> Option<TransitionTrace> {
        self.gpufreq.lock().last_trace.clone()
    }

    /// Snapshot of the current operating state
    pub fn current_state(&self) -> CurrentState {
        self.gpufreq.lock().state
    }

    // ---- table maintenance ----

    fn rebuild_derived(&self, inner: &mut GpuFreqState<H>) {
        inner.springboard = SpringboardTable::build(&inner.table, self.config.buck_diff_max);
        inner.power_table = PowerTable::build(&inner.table, &self.config.power_ref, self.leakage.as_ref());
    }

    fn reapply_current(&self, inner: &mut GpuFreqState<H>) {
        let cur = inner.state.opp_idx;
        if let Err(reason) = self.resolve_and_switch(inner, cur, KickerId::Ptpod) {
            gf_debug!("voltage update at opp {} deferred: {}", cur, reason);
        }
    }

    /// Apply or remove the aging margin
    ///
    /// Springboard and power tables are rebuilt and the current index is
    /// re-applied so the rails follow the new voltages.
    pub fn apply_aging(&self, enable: bool) {
        let mut inner = self.gpufreq.lock();
        if !inner.table.apply_aging(enable) {
            return;
        }
        self.rebuild_derived(&mut inner);
        gf_info!("aging margin {}", if enable { "applied" } else { "removed" });
        self.reapply_current(&mut inner);
    }

    /// Whether the aging margin is applied
    pub fn aging_applied(&self) -> bool {
        self.gpufreq.lock().table.aging_applied()
    }

    /// Replace the VGPU of every signed-table entry
    pub fn update_volt(&self, volts: &[CentiMv]) -> Result<()> {
        let mut inner = self.gpufreq.lock();
        inner.table.update_volt(volts, &self.config)?;
        self.rebuild_derived(&mut inner);
        gf_info!("OPP voltages updated ({} entries)", volts.len());
        self.reapply_current(&mut inner);
        Ok(())
    }

    /// Go back to the voltages the table was built with
    pub fn restore_default_volt(&self) {
        let mut inner = self.gpufreq.lock();
        inner.table.restore_default_volt();
        self.rebuild_derived(&mut inner);
        gf_info!("OPP voltages restored");
        self.reapply_current(&mut inner);
    }

    // ---- queries ----

    /// Number of OPPs usable by the segment
    pub fn dvfs_table_num(&self) -> usize {
        self.segment.min_opp_idx - self.segment.max_opp_idx + 1
    }

    fn segment_opp(&self, idx: usize) -> Option<OperatingPoint> {
        if idx >= self.dvfs_table_num() {
            return None;
        }
        self.gpufreq.lock().table.get(self.segment.max_opp_idx + idx).copied()
    }

    /// Frequency at a segment-relative index
    pub fn freq_by_idx(&self, idx: usize) -> Option<FreqKhz> {
        self.segment_opp(idx).map(|opp| opp.freq_khz)
    }

    /// VGPU at a segment-relative index
    pub fn volt_by_idx(&self, idx: usize) -> Option<CentiMv> {
        self.segment_opp(idx).map(|opp| opp.vgpu)
    }

    /// VSRAM at a segment-relative index
    pub fn vsram_by_idx(&self, idx: usize) -> Option<CentiMv> {
        self.segment_opp(idx).map(|opp| opp.vsram)
    }

    /// Total power at a segment-relative index
    pub fn power_by_idx(&self, idx: usize) -> Option<Milliwatt> {
        if idx >= self.dvfs_table_num() {
            return None;
        }
        self.gpufreq
            .lock()
            .power_table
            .get(self.segment.max_opp_idx + idx)
            .map(|entry| entry.power_mw)
    }

    /// Segment-relative index of the fastest OPP not above `freq_khz`
    ///
    /// Frequencies below the segment map to its slowest index.
    pub fn opp_idx_by_freq(&self, freq_khz: FreqKhz) -> usize {
        let idx = self.gpufreq.lock().table.idx_by_freq(freq_khz, self.segment_range());
        idx - self.segment.max_opp_idx
    }

    /// Total power at a signed-table index, zero when out of range
    pub fn power_estimate(&self, idx: u32) -> Milliwatt {
        self.gpufreq.lock().power_table.total_power(idx as usize)
    }

    /// Power at the segment's fastest OPP
    pub fn max_power(&self) -> Milliwatt {
        self.gpufreq.lock().power_table.total_power(self.segment.max_opp_idx)
    }

    /// Power at the segment's slowest OPP
    pub fn min_power(&self) -> Milliwatt {
        self.gpufreq.lock().power_table.total_power(self.segment.min_opp_idx)
    }

    /// Copy of the springboard table
    pub fn springboard(&self) -> SpringboardTable {
        self.gpufreq.lock().springboard.clone()
    }

    /// Copy of the signed OPP table
    pub fn opp_table(&self) -> Vec<OperatingPoint> {
        self.gpufreq.lock().table.points().to_vec()
    }

    // ---- overrides ----

    /// Move to a segment-relative index and stay there
    pub fn keep_opp(&self, idx: usize) -> Result<()> {
        let len = self.dvfs_table_num();
        if idx >= len {
            return Err(Error::IndexOutOfRange { index: idx, len });
        }
        let abs = self.segment.max_opp_idx + idx;

        let mut inner = self.gpufreq.lock();
        let target = TransitionTarget::from_table(&inner.table, abs)
            .ok_or(Error::IndexOutOfRange { index: idx, len })?;
        inner.fixed = Some(FixedOverride::Opp(abs));
        gf_info!("keeping opp {}", abs);
        self.switch_locked(&mut inner, target);
        Ok(())
    }

    /// Move to an arbitrary frequency and voltage and stay there
    ///
    /// VSRAM follows from the segment's rule; the pair must respect the
    /// VSRAM/VGPU window and VGPU must lie within the signed table's range.
    /// The rails are ramped there in differential-safe steps.
    pub fn fix_freq_volt(&self, freq_khz: FreqKhz, vgpu: CentiMv) -> Result<()> {
        if freq_khz == 0 {
            return Err(Error::InvalidConfig("fixed frequency must be non-zero"));
        }
        let vgpu = normalize_volt(vgpu, self.config.pmic_step);

        let mut inner = self.gpufreq.lock();
        let (min, max) = inner.table.vgpu_range().ok_or(Error::EmptyTable)?;
        if !(min..=max).contains(&vgpu) {
            return Err(Error::VoltageOutOfRange { volt: vgpu, min, max });
        }
        let vsram = inner.table.vsram_rule().vsram_from_vgpu(vgpu);
        match vsram.checked_sub(vgpu) {
            Some(diff) if diff >= self.config.buck_diff_min && diff <= self.config.buck_diff_max => {}
            _ => return Err(Error::InvalidConfig("fixed voltage violates VSRAM window")),
        }

        let idx = inner.table.idx_by_freq(freq_khz, self.segment_range());
        inner.fixed = Some(FixedOverride::FreqVolt { freq_khz, vgpu });
        gf_info!("fixing {} kHz at vgpu {}", freq_khz, vgpu);
        self.switch_locked(
            &mut inner,
            TransitionTarget {
                idx,
                freq_khz,
                vgpu,
                vsram,
            },
        );
        Ok(())
    }

    /// Release a fixed OPP or fixed frequency/voltage
    pub fn clear_override(&self) {
        let mut inner = self.gpufreq.lock();
        if inner.fixed.take().is_some() {
            gf_info!("override cleared");
        }
    }

    /// Active override
    pub fn fixed_override(&self) -> Option<FixedOverride> {
        self.gpufreq.lock().fixed
    }

    /// Enable or disable target requests
    pub fn set_dvfs_enabled(&self, enabled: bool) {
        self.gpufreq.lock().dvfs_enabled = enabled;
        gf_info!("DVFS {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Whether target requests are acted upon
    pub fn dvfs_enabled(&self) -> bool {
        self.gpufreq.lock().dvfs_enabled
    }

    /// Enable or disable random targets
    ///
    /// Disabling releases the `STRESS` limiter slot.
    pub fn set_stress_test(&self, enabled: bool, seed: u64) {
        let mut inner = self.gpufreq.lock();
        inner.stress.set(enabled, seed);
        if !enabled {
            self.limit.lock().update_limit(KickerId::Stress, None, None);
        }
        gf_info!("stress test {}", if enabled { "on" } else { "off" });
    }

    /// Whether stress testing is on
    pub fn stress_test_enabled(&self) -> bool {
        self.gpufreq.lock().stress.enabled()
    }

    // ---- power ----

    /// Take a power reference
    pub fn power_on(&self) {
        self.change_power(true);
    }

    /// Drop a power reference
    pub fn power_off(&self) {
        self.change_power(false);
    }

    fn change_power(&self, on: bool) {
        let mut inner = self.gpufreq.lock();
        let (change, count, powered) = {
            let mut domain = self.power.lock();
            let change = if on {
                domain.power_on(&mut inner.hw)
            } else {
                domain.power_off(&mut inner.hw)
            };
            (change, domain.count(), domain.is_powered())
        };
        inner.state.power_count = count;

        if change == PowerChange::Switched {
            self.notify_budget(&inner.state, powered);
        }
    }

    /// Copy of the power domain state
    pub fn power_domain(&self) -> PowerDomain {
        *self.power.lock()
    }
}
