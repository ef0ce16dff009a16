//! One channel assembled from the real adapters over simulated drivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dispenser_core::{
    ChannelController, DisplayCfg, EncoderCfg, EncoderInput, FlowSensor, LoopCalibration,
    LoopInputs, RelayValve, SensorCfg, SmootherKind, StatusDisplay,
};
use dispenser_hardware::{
    DisplayLog, RecordingDisplay, SharedBus, SimChannel, SimEncoderHandle, SimulatedCurrentLoop,
    SimulatedEncoder, SimulatedRelay,
};
use dispenser_traits::{Color, DisplayCommand, DisplayField};

type Ctl = ChannelController<
    RelayValve<SimulatedRelay>,
    EncoderInput<SimulatedEncoder>,
    FlowSensor<SharedBus<SimulatedCurrentLoop>>,
    StatusDisplay<RecordingDisplay>,
>;

const STEP: Duration = Duration::from_millis(10);

struct Stack {
    ctl: Ctl,
    knob: SimEncoderHandle,
    relay: Arc<AtomicBool>,
    screen: DisplayLog,
    now: Instant,
}

impl Stack {
    fn new() -> Self {
        let relay = SimulatedRelay::new();
        let energized = relay.handle();
        let encoder = SimulatedEncoder::new();
        let knob = encoder.handle();
        let adc = SimulatedCurrentLoop::new(42)
            .with_channel(0, SimChannel::new(6.0, 0.01, 0.0).gated_by(energized.clone()))
            .with_channel(1, SimChannel::new(19.0, 0.1, 0.0));
        let sensor_cfg = SensorCfg {
            flow_window: 3,
            temp_window: 3,
            smoother: SmootherKind::MovingAverage,
            flow: LoopCalibration::new(0.01, 0.0),
            temperature: LoopCalibration::new(0.1, 0.0),
            ..SensorCfg::default()
        };
        let sensor = FlowSensor::new(
            SharedBus::new(adc),
            LoopInputs {
                flow: 0,
                temperature: 1,
            },
            &sensor_cfg,
        )
        .unwrap();
        let sink = RecordingDisplay::new("left");
        let screen = sink.log();
        let ctl = ChannelController::new(
            "left",
            RelayValve::new(relay),
            EncoderInput::new(encoder, EncoderCfg::default()),
            sensor,
            StatusDisplay::new(sink, DisplayCfg::default()),
        );
        Self {
            ctl,
            knob,
            relay: energized,
            screen,
            now: Instant::now(),
        }
    }

    fn run_for(&mut self, d: Duration) {
        let end = self.now + d;
        while self.now < end {
            self.ctl.tick(self.now);
            self.now += STEP;
        }
    }
}

#[test]
fn set_open_drain_and_auto_close() {
    let mut s = Stack::new();
    s.run_for(Duration::from_millis(200));

    s.knob.rotate_to(1.0);
    s.run_for(Duration::from_millis(200));
    assert_eq!(s.ctl.remaining(), 1.0);
    assert!(!s.ctl.is_open());

    s.knob.click();
    s.run_for(Duration::from_millis(500));
    assert!(s.ctl.is_open());
    assert!(s.relay.load(Ordering::Relaxed));
    assert_eq!(s.knob.led(), Some(Color::Blue));

    s.run_for(Duration::from_secs(2));
    assert!((s.ctl.flow() - 6.0).abs() < 0.01);
    assert!(s.ctl.remaining() < 1.0);
    assert!(s.screen.commands().contains(&DisplayCommand::Color {
        field: DisplayField::Volume,
        color: Color::Red
    }));
    assert_eq!(s.screen.last_text(DisplayField::Flow).as_deref(), Some("06.00"));
    assert_eq!(s.screen.last_text(DisplayField::Temperature).as_deref(), Some("19.00 °C"));

    // 1 L at 6 L/min is ten seconds of flow
    s.run_for(Duration::from_secs(12));
    assert_eq!(s.ctl.remaining(), 0.0);
    assert!(!s.ctl.is_open());
    assert!(!s.relay.load(Ordering::Relaxed));
    assert_eq!(s.knob.led(), Some(Color::Green));
    assert_eq!(s.knob.value(), 0.0);
    assert_eq!(s.screen.last_text(DisplayField::Volume).as_deref(), Some("00.00"));
}

#[test]
fn holding_the_button_toggles_once() {
    let mut s = Stack::new();
    s.knob.rotate_to(20.0);
    s.run_for(Duration::from_millis(300));

    s.knob.hold(true);
    s.run_for(Duration::from_secs(2));
    assert!(s.ctl.is_open(), "one toggle while held");

    s.knob.hold(false);
    s.run_for(Duration::from_millis(300));
    assert!(s.ctl.is_open());

    s.knob.click();
    s.run_for(Duration::from_millis(500));
    assert!(!s.ctl.is_open());
}

#[test]
fn double_push_resets_the_channel() {
    let mut s = Stack::new();
    s.knob.rotate_to(12.0);
    s.run_for(Duration::from_millis(200));
    s.knob.click();
    s.run_for(Duration::from_millis(500));
    assert!(s.ctl.is_open());

    s.knob.double_push();
    s.run_for(Duration::from_millis(200));
    assert_eq!(s.ctl.remaining(), 0.0);
    assert!(!s.ctl.is_open());
    assert!(!s.relay.load(Ordering::Relaxed));
    assert_eq!(s.knob.value(), 0.0);
}
