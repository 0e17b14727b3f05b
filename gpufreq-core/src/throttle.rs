//! Throttling front-ends
//!
//! Thermal, peak power, battery and user limits translate their inputs into
//! limiter bounds. When the GPU already runs outside a new bound, a target
//! request is issued on the spot.

use gpufreq_api::{FreqKhz, GpuHardware, KickerId, Milliwatt};

use crate::engine::{DvfsEngine, GpuFreqState};

impl<H: GpuHardware> DvfsEngine<H> {
    fn power_cap_idx(&self, inner: &GpuFreqState<H>, limit_mw: Milliwatt) -> Option<usize> {
        if limit_mw == 0 {
            return None;
        }
        Some(
            inner
                .power_table
                .idx_within_budget(limit_mw, self.segment.max_opp_idx, self.segment.min_opp_idx),
        )
    }

    fn freq_cap_idx(&self, inner: &GpuFreqState<H>, freq_khz: FreqKhz) -> usize {
        inner.table.idx_by_freq(freq_khz, self.segment_range())
    }

    /// Slowest index still at or above `freq_khz`
    fn freq_floor_idx(&self, inner: &GpuFreqState<H>, freq_khz: FreqKhz) -> usize {
        self.segment_range()
            .rev()
            .find(|&idx| inner.table.get(idx).is_some_and(|opp| opp.freq_khz >= freq_khz))
            .unwrap_or(self.segment.max_opp_idx)
    }

    /// Cap GPU power for thermal reasons; 0 removes the cap
    pub fn set_thermal_power_limit(&self, limit_mw: Milliwatt) {
        let mut inner = self.gpufreq.lock();
        let upper = self.power_cap_idx(&inner, limit_mw);
        gf_debug!("thermal power limit {} mW -> upper {:?}", limit_mw, upper);
        self.throttle_locked(&mut inner, KickerId::Thermal, upper, None);
    }

    /// Cap GPU power for the peak power budget; 0 removes the cap
    pub fn set_pbm_power_limit(&self, limit_mw: Milliwatt) {
        let mut inner = self.gpufreq.lock();
        let upper = self.power_cap_idx(&inner, limit_mw);
        gf_debug!("PBM power limit {} mW -> upper {:?}", limit_mw, upper);
        self.throttle_locked(&mut inner, KickerId::Pbm, upper, None);
    }

    /// Battery over-current level; 0 removes the cap
    pub fn set_battery_oc_level(&self, level: u32) {
        let mut inner = self.gpufreq.lock();
        let upper = (level != 0).then(|| self.freq_cap_idx(&inner, self.config.battery.oc_limit_khz));
        self.throttle_locked(&mut inner, KickerId::BattOc, upper, None);
    }

    /// Battery percentage level; 0 removes the cap
    pub fn set_battery_percent_level(&self, level: u32) {
        let mut inner = self.gpufreq.lock();
        let upper =
            (level != 0).then(|| self.freq_cap_idx(&inner, self.config.battery.percent_limit_khz));
        self.throttle_locked(&mut inner, KickerId::BattPercent, upper, None);
    }

    /// Low battery voltage level
    ///
    /// The cap engages from the configured level upwards.
    pub fn set_low_battery_level(&self, level: u32) {
        let mut inner = self.gpufreq.lock();
        let battery = self.config.battery;
        let upper = (level != 0 && level >= battery.low_batt_level)
            .then(|| self.freq_cap_idx(&inner, battery.low_batt_limit_khz));
        self.throttle_locked(&mut inner, KickerId::BattLow, upper, None);
    }

    /// User frequency range through the `PROC` kicker
    ///
    /// `upper_freq` is the highest frequency allowed, `lower_freq` the
    /// lowest; `None` removes that side.
    pub fn set_user_limit(&self, upper_freq: Option<FreqKhz>, lower_freq: Option<FreqKhz>) {
        let mut inner = self.gpufreq.lock();
        let upper = upper_freq.map(|freq| self.freq_cap_idx(&inner, freq));
        let lower = lower_freq.map(|freq| self.freq_floor_idx(&inner, freq));
        self.throttle_locked(&mut inner, KickerId::Proc, upper, lower);
    }
}
