use std::time::{Duration, Instant};

use dispenser_core::mocks::{MockDisplay, MockEncoder, MockSensor, MockValve};
use dispenser_core::{ChannelController, DisplayMode, Indicator};
use rstest::rstest;

type Ctl = ChannelController<MockValve, MockEncoder, MockSensor, MockDisplay>;

struct Rig {
    ctl: Ctl,
    valve: MockValve,
    encoder: MockEncoder,
    sensor: MockSensor,
    display: MockDisplay,
    t0: Instant,
}

impl Rig {
    fn new(open: bool, flow: f32) -> Self {
        let valve = MockValve::new(open);
        let encoder = MockEncoder::default();
        let sensor = MockSensor::steady(flow, 20.0);
        let display = MockDisplay::default();
        let ctl = ChannelController::new(
            "left",
            valve.clone(),
            encoder.clone(),
            sensor.clone(),
            display.clone(),
        );
        Self {
            ctl,
            valve,
            encoder,
            sensor,
            display,
            t0: Instant::now(),
        }
    }

    fn at(&self, secs: f32) -> Instant {
        self.t0 + Duration::from_secs_f32(secs)
    }
}

#[rstest]
fn ten_one_second_ticks_at_six_lpm_dispense_one_litre() {
    let mut rig = Rig::new(true, 6.0);
    rig.ctl.restore_remaining(10.0);
    // first tick has no previous timestamp and subtracts nothing
    rig.ctl.tick(rig.at(0.0));
    assert_eq!(rig.ctl.remaining(), 10.0);
    for i in 1..=10 {
        rig.ctl.tick(rig.at(i as f32));
        assert!(rig.ctl.is_open());
    }
    assert!((rig.ctl.remaining() - 9.0).abs() < 1e-4, "{}", rig.ctl.remaining());
    assert!(rig.valve.open_now());
    assert!((rig.encoder.shown_value() - 9.0).abs() < 1e-4);
}

#[rstest]
fn integration_uses_mean_of_current_and_previous_flow() {
    let mut rig = Rig::new(true, 0.0);
    rig.ctl.restore_remaining(5.0);
    rig.ctl.tick(rig.at(0.0));
    rig.sensor.set(12.0, 20.0);
    rig.ctl.tick(rig.at(1.0));
    // (0 + 12) / 2 L/min for one second
    assert!((rig.ctl.remaining() - (5.0 - 0.1)).abs() < 1e-5);
}

#[rstest]
fn manual_override_is_absolute() {
    let mut rig = Rig::new(false, 6.0);
    rig.ctl.restore_remaining(3.0);
    rig.ctl.tick(rig.at(0.0));
    rig.encoder.turn_to(5.0);
    rig.ctl.tick(rig.at(1.0));
    assert_eq!(rig.ctl.remaining(), 5.0);
}

#[rstest]
fn override_wins_over_integration_in_the_same_tick() {
    let mut rig = Rig::new(true, 60.0);
    rig.ctl.restore_remaining(10.0);
    rig.ctl.tick(rig.at(0.0));
    rig.encoder.turn_to(4.0);
    rig.ctl.tick(rig.at(2.0));
    assert_eq!(rig.ctl.remaining(), 4.0);
}

#[rstest]
fn auto_shutoff_is_sticky() {
    let mut rig = Rig::new(true, 60.0);
    rig.ctl.restore_remaining(0.5);
    rig.ctl.tick(rig.at(0.0));
    assert!(rig.ctl.is_open());
    // 1 L/s for a second drains 0.5 L and then some
    rig.ctl.tick(rig.at(1.0));
    assert_eq!(rig.ctl.remaining(), 0.0);
    assert!(!rig.ctl.is_open());
    assert!(!rig.valve.open_now());
    assert_eq!(rig.encoder.shown_value(), 0.0);

    for i in 2..6 {
        rig.ctl.tick(rig.at(i as f32));
        assert_eq!(rig.ctl.remaining(), 0.0);
        assert!(!rig.ctl.is_open());
    }

    // pressing the button at zero does not reopen
    rig.encoder.press();
    rig.ctl.tick(rig.at(6.0));
    assert!(!rig.ctl.is_open());
    assert!(!rig.valve.open_now());

    // a new target allows opening again
    rig.encoder.turn_to(2.0);
    rig.ctl.tick(rig.at(7.0));
    rig.encoder.press();
    rig.ctl.tick(rig.at(7.01));
    assert!(rig.ctl.is_open());
}

#[rstest]
fn button_toggles_valve_and_display_mode() {
    let mut rig = Rig::new(false, 0.0);
    rig.ctl.restore_remaining(8.0);
    rig.encoder.press();
    rig.ctl.tick(rig.at(0.0));
    assert!(rig.ctl.is_open());
    assert!(rig.valve.open_now());
    assert_eq!(rig.encoder.indicator(), Some(Indicator::Open));
    assert_eq!(rig.display.state().mode, DisplayMode::Dispensing);

    rig.encoder.press();
    rig.ctl.tick(rig.at(0.1));
    assert!(!rig.ctl.is_open());
    assert_eq!(rig.encoder.indicator(), Some(Indicator::Closed));
    assert_eq!(rig.display.state().mode, DisplayMode::Idle);
}

#[rstest]
#[case(true, 3.0)]
#[case(false, 0.0)]
fn double_click_resets_everything(#[case] open: bool, #[case] flow: f32) {
    let mut rig = Rig::new(open, flow);
    rig.ctl.restore_remaining(20.0);
    rig.ctl.tick(rig.at(0.0));
    rig.encoder.double_click_now();
    rig.ctl.tick(rig.at(1.0));

    let st = rig.ctl.state();
    assert_eq!(st.remaining, 0.0);
    assert!(!st.open);
    assert_eq!(st.flow, 0.0);
    assert_eq!(st.temperature, 0.0);
    assert!(!rig.valve.open_now());
    assert_eq!(rig.valve.resets(), 1);
    assert_eq!(rig.encoder.resets(), 1);
    assert_eq!(rig.sensor.resets(), 1);
    assert_eq!(rig.display.state().resets, 1);
    assert_eq!(rig.display.state().volume, 0.0);
}

#[rstest]
fn double_click_supersedes_override_in_same_tick() {
    let mut rig = Rig::new(false, 0.0);
    rig.ctl.tick(rig.at(0.0));
    rig.encoder.turn_to(30.0);
    rig.encoder.double_click_now();
    rig.ctl.tick(rig.at(0.1));
    assert_eq!(rig.ctl.remaining(), 0.0);
}

#[rstest]
fn reset_is_idempotent() {
    let mut rig = Rig::new(true, 6.0);
    rig.ctl.restore_remaining(12.0);
    rig.ctl.tick(rig.at(0.0));
    rig.ctl.reset();
    let once = rig.ctl.state().clone();
    rig.ctl.reset();
    assert_eq!(rig.ctl.state(), &once);
    assert_eq!(once.remaining, 0.0);
    assert!(!once.open);
}

#[rstest]
fn write_phase_mirrors_state_to_display() {
    let mut rig = Rig::new(true, 6.0);
    rig.ctl.restore_remaining(4.0);
    rig.ctl.tick(rig.at(0.0));
    let d = rig.display.state();
    assert_eq!(d.volume, 4.0);
    assert_eq!(d.flow, 6.0);
    assert_eq!(d.temperature, 20.0);
    assert_eq!(d.mode, DisplayMode::Dispensing);
    assert_eq!(d.ticks, 1);
}

#[rstest]
fn negative_or_nan_flow_never_adds_volume() {
    let mut rig = Rig::new(true, -5.0);
    rig.ctl.restore_remaining(3.0);
    rig.ctl.tick(rig.at(0.0));
    rig.ctl.tick(rig.at(1.0));
    assert_eq!(rig.ctl.remaining(), 3.0);
    rig.sensor.set(f32::NAN, 20.0);
    rig.ctl.tick(rig.at(2.0));
    assert_eq!(rig.ctl.remaining(), 3.0);
}

#[rstest]
fn shutdown_closes_and_shows_safe() {
    let mut rig = Rig::new(true, 6.0);
    rig.ctl.restore_remaining(3.0);
    rig.ctl.tick(rig.at(0.0));
    rig.ctl.shutdown();
    assert!(!rig.valve.open_now());
    assert!(!rig.ctl.is_open());
    assert_eq!(rig.encoder.indicator(), Some(Indicator::Safe));
    assert_eq!(rig.ctl.remaining(), 3.0);
}

#[rstest]
fn restore_clamps_garbage_to_zero() {
    let mut rig = Rig::new(false, 0.0);
    rig.ctl.restore_remaining(f32::NAN);
    assert_eq!(rig.ctl.remaining(), 0.0);
    rig.ctl.restore_remaining(-3.0);
    assert_eq!(rig.ctl.remaining(), 0.0);
}

#[rstest]
#[case(0.3)]
#[case(0.9)]
#[case(6.0)]
fn low_flow_at_ten_ms_cadence_does_not_drift(#[case] lpm: f32) {
    let mut rig = Rig::new(true, lpm);
    rig.ctl.restore_remaining(70.0);
    for i in 0..=6000u64 {
        rig.ctl.tick(rig.t0 + Duration::from_millis(10 * i));
    }
    // one minute of flow
    let dispensed = 70.0 - rig.ctl.remaining();
    let expected = f64::from(lpm);
    let err = (dispensed - expected).abs() / expected;
    assert!(err < 1e-3, "dispensed {dispensed} L, expected {expected} L");
}
