//! Hardware call ordering tests
//!
//! Uses a mocked backend to pin down the exact register-level sequence of
//! clock switches, rail writes and power bring-up.

use gpufreq_core::{
    CentiMv, ClockSource, CurrentState, DvfsConfig, FreqKhz, GpuHardware, HwError, PllConfig,
    PllSetting, PowerDomain, PowerStage, Rail, clock_switch, pll_setting, volt_switch,
};
use mockall::predicate::eq;
use mockall::{Sequence, mock};

mock! {
    pub Gpu {}

    impl GpuHardware for Gpu {
        fn set_rail_voltage(&mut self, rail: Rail, volt: CentiMv) -> Result<(), HwError>;
        fn read_rail_voltage(&mut self, rail: Rail) -> Result<CentiMv, HwError>;
        fn select_clock_source(&mut self, source: ClockSource) -> Result<(), HwError>;
        fn program_pll(&mut self, freq_khz: FreqKhz, setting: PllSetting) -> Result<(), HwError>;
        fn read_freq_khz(&mut self) -> Result<FreqKhz, HwError>;
        fn set_power_stage(&mut self, stage: PowerStage, on: bool) -> Result<(), HwError>;
        fn delay_us(&mut self, us: u32);
    }
}

fn state_at(freq_khz: FreqKhz, vgpu: CentiMv, vsram: CentiMv) -> CurrentState {
    CurrentState {
        opp_idx: 0,
        freq_khz,
        vgpu,
        vsram,
        power_count: 1,
    }
}

#[test]
fn test_clock_switch_parks_on_sub_source() {
    let pll = PllConfig::default();
    let mut seq = Sequence::new();
    let mut hw = MockGpu::new();

    hw.expect_select_clock_source()
        .with(eq(ClockSource::Sub))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    hw.expect_program_pll()
        .with(eq(600_000), eq(pll_setting(600_000, &pll)))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    hw.expect_delay_us()
        .with(eq(20))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    hw.expect_select_clock_source()
        .with(eq(ClockSource::Main))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let mut state = state_at(950_000, 80_000, 90_000);
    clock_switch(&mut hw, &pll, &mut state, 600_000);
    assert_eq!(state.freq_khz, 600_000);
}

#[test]
fn test_clock_switch_continues_after_pll_failure() {
    let pll = PllConfig::default();
    let mut seq = Sequence::new();
    let mut hw = MockGpu::new();

    hw.expect_select_clock_source()
        .with(eq(ClockSource::Sub))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    hw.expect_program_pll()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Err(HwError::Clock(-110)));
    hw.expect_delay_us().times(1).in_sequence(&mut seq).return_const(());
    hw.expect_select_clock_source()
        .with(eq(ClockSource::Main))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));

    let mut state = state_at(950_000, 80_000, 90_000);
    clock_switch(&mut hw, &pll, &mut state, 350_000);
    assert_eq!(state.freq_khz, 350_000);
}

#[test]
fn test_rising_volt_switch_writes_vsram_first() {
    let config = DvfsConfig {
        apply_settle_delay: true,
        ..DvfsConfig::default()
    };
    let mut seq = Sequence::new();
    let mut hw = MockGpu::new();

    hw.expect_set_rail_voltage()
        .with(eq(Rail::Vsram), eq(90_000))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    hw.expect_set_rail_voltage()
        .with(eq(Rail::Vgpu), eq(80_000))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    // VGPU: 17 steps at 0.5us rounds to 9us, plus 9us overhead
    hw.expect_delay_us()
        .with(eq(18))
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());

    let mut state = state_at(600_000, 70_000, 85_000);
    let settle = volt_switch(&mut hw, &config, &mut state, 80_000, 90_000).unwrap();
    assert_eq!(settle.vgpu_us, 18);
    assert_eq!(settle.vsram_us, 13);
    assert_eq!((state.vgpu, state.vsram), (80_000, 90_000));
}

#[test]
fn test_falling_volt_switch_writes_vgpu_first() {
    let config = DvfsConfig::default();
    let mut seq = Sequence::new();
    let mut hw = MockGpu::new();

    hw.expect_set_rail_voltage()
        .with(eq(Rail::Vgpu), eq(70_000))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    hw.expect_set_rail_voltage()
        .with(eq(Rail::Vsram), eq(85_000))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    // settle delay is off by default
    hw.expect_delay_us().never();

    let mut state = state_at(600_000, 80_000, 90_000);
    assert!(volt_switch(&mut hw, &config, &mut state, 70_000, 85_000).is_some());
    assert_eq!((state.vgpu, state.vsram), (70_000, 85_000));
}

#[test]
fn test_volt_switch_without_change_touches_nothing() {
    let mut hw = MockGpu::new();
    hw.expect_set_rail_voltage().never();
    hw.expect_delay_us().never();

    let mut state = state_at(600_000, 70_000, 85_000);
    assert!(volt_switch(&mut hw, &DvfsConfig::default(), &mut state, 70_000, 85_000).is_none());
}

#[test]
fn test_failed_rail_write_still_advances_state() {
    let mut hw = MockGpu::new();
    hw.expect_set_rail_voltage()
        .times(2)
        .returning(|_, _| Err(HwError::Regulator(-5)));

    let mut state = state_at(600_000, 70_000, 85_000);
    volt_switch(&mut hw, &DvfsConfig::default(), &mut state, 72_500, 85_000);
    assert_eq!(state.vgpu, 72_500);
}

#[test]
fn test_power_domain_sequence() {
    let mut seq = Sequence::new();
    let mut hw = MockGpu::new();

    for (stage, on) in [
        (PowerStage::Buck, true),
        (PowerStage::Mtcmos, true),
        (PowerStage::ClockGate, true),
        (PowerStage::ClockGate, false),
        (PowerStage::Mtcmos, false),
        (PowerStage::Buck, false),
    ] {
        hw.expect_set_power_stage()
            .with(eq(stage), eq(on))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
    }

    let mut domain = PowerDomain::default();
    domain.power_on(&mut hw);
    domain.power_off(&mut hw);
    assert!(!domain.is_powered());
}
