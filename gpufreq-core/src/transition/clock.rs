//! GPU PLL programming and glitch-free clock switching

use gpufreq_api::{ClockSource, CurrentState, FreqKhz, GpuHardware, PllSetting};

use crate::config::PllConfig;

/// Compute the PLL word for a frequency
///
/// The smallest post divider that keeps the VCO at or above its floor is
/// used, then `dds = ((freq / 100 * 2^posdiv) << shift) / fin`, rounded.
pub fn pll_setting(freq_khz: FreqKhz, pll: &PllConfig) -> PllSetting {
    let mut posdiv_power = 0u8;
    while posdiv_power < pll.max_posdiv_power
        && ((freq_khz as u64) << posdiv_power) < pll.vco_min_khz as u64
    {
        posdiv_power += 1;
    }

    let scaled = ((freq_khz as u64 / 100) << posdiv_power) << pll.dds_shift;
    let dds = (scaled / pll.fin_mhz as u64 + 5) / 10;

    PllSetting {
        posdiv_power,
        dds: dds as u32,
    }
}

/// Switch the GPU to a new frequency
///
/// The mux moves to the auxiliary source, the PLL is reprogrammed and given
/// time to lock, then the mux moves back. Failures are logged and `state`
/// is advanced regardless.
pub fn clock_switch<H: GpuHardware>(
    hw: &mut H,
    pll: &PllConfig,
    state: &mut CurrentState,
    freq_new: FreqKhz,
) {
    let setting = pll_setting(freq_new, pll);

    if let Err(err) = hw.select_clock_source(ClockSource::Sub) {
        gf_error!("failed to park GPU clock on sub source: {}", err);
    }
    if let Err(err) = hw.program_pll(freq_new, setting) {
        gf_error!("failed to program GPU PLL for {} kHz: {}", freq_new, err);
    }
    hw.delay_us(pll.settle_us);
    if let Err(err) = hw.select_clock_source(ClockSource::Main) {
        gf_error!("failed to return GPU clock to PLL: {}", err);
    }

    gf_trace!(
        "clock switch {} -> {} kHz (posdiv 2^{}, dds {:#x})",
        state.freq_khz,
        freq_new,
        setting.posdiv_power,
        setting.dds
    );
    state.freq_khz = freq_new;
}
