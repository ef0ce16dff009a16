//! Subcommand bodies.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use dispenser_config::Config;
use dispenser_core::display::format_value;
use dispenser_core::error::{DispenserError, LoadError, Result};
use dispenser_core::util::clamp_range;
use dispenser_core::{ChannelSummary, Dispenser, PersistedRecord, RunSummary, TimingCfg};
use dispenser_traits::{AdcReceiver, MonotonicClock, Relay};
use eyre::WrapErr;
use serde_json::json;
use tracing::info;

use crate::cli::json_mode;
use crate::hw::{self, SimKnobs};

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn channel_json(c: &ChannelSummary) -> serde_json::Value {
    json!({ "remaining_l": c.remaining_l, "open": c.open })
}

fn print_summary(s: &RunSummary) {
    if json_mode() {
        println!(
            "{}",
            json!({
                "timestamp": unix_secs(),
                "ticks": s.ticks,
                "saves": s.saves,
                "duration_ms": u64::try_from(s.elapsed.as_millis()).unwrap_or(u64::MAX),
                "left": channel_json(&s.left),
                "right": channel_json(&s.right),
            })
        );
        return;
    }
    println!(
        "run complete: {} ticks, {} saves in {:.2} s",
        s.ticks,
        s.saves,
        s.elapsed.as_secs_f32()
    );
    for (name, c) in [("left", &s.left), ("right", &s.right)] {
        let valve = if c.open { "open" } else { "closed" };
        println!("{name:<6} {} L ({valve})", format_value(c.remaining_l as f32));
    }
}

/// Run the main loop until `shutdown` is raised or `max_ticks` cycles ran.
pub fn run(
    cfg: &Config,
    base: &Path,
    max_ticks: Option<u64>,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary> {
    let knobs = SimKnobs::from_env()?;
    let stack = hw::build_stack(cfg, base, &knobs)?;
    let timing: TimingCfg = (&cfg.timing).into();
    let store = hw::open_store(cfg, base);

    let mut dispenser = Dispenser::new(stack.left, stack.right, store, timing, MonotonicClock::new());
    dispenser.start();
    if knobs.press {
        for enc in &stack.encoders {
            enc.click();
        }
    }
    info!(
        max_ticks,
        flow_lpm = knobs.flow_lpm,
        noise = knobs.noise,
        "dispensing loop running"
    );
    let summary = dispenser.run(&shutdown, max_ticks);
    if shutdown.load(Ordering::Relaxed) {
        info!("stopped by signal");
    }
    print_summary(&summary);
    Ok(summary)
}

/// Print the persisted record and whether it was a default.
pub fn state(cfg: &Config, base: &Path) -> Result<()> {
    let mut store = hw::open_store(cfg, base);
    let loaded = store.load();
    if let Some(LoadError::Io(msg)) = &loaded.fallback {
        return Err(DispenserError::Persistence(msg.clone()))
            .wrap_err_with(|| format!("read {}", store.nvm().path().display()));
    }
    let reason = loaded.fallback.as_ref().map(ToString::to_string);
    if json_mode() {
        println!(
            "{}",
            json!({
                "left_l": loaded.record.left_l,
                "right_l": loaded.record.right_l,
                "default": loaded.used_default(),
                "reason": reason,
            })
        );
    } else {
        println!("left   {} L", format_value(loaded.record.left_l));
        println!("right  {} L", format_value(loaded.record.right_l));
        if let Some(r) = reason {
            println!("(default used: {r})");
        }
    }
    Ok(())
}

/// Write a record, clamping each volume to the encoder range.
pub fn set_state(cfg: &Config, base: &Path, left: f32, right: f32) -> Result<PersistedRecord> {
    for (name, v) in [("left", left), ("right", right)] {
        if !v.is_finite() {
            return Err(DispenserError::State(format!("--{name} must be a finite number")).into());
        }
    }
    let (min, max) = (cfg.encoder.min_l, cfg.encoder.max_l);
    let record = PersistedRecord::new(clamp_range(left, min, max), clamp_range(right, min, max));
    let mut store = hw::open_store(cfg, base);
    store.save(record)?;
    info!(left_l = record.left_l, right_l = record.right_l, "state written");
    if json_mode() {
        println!(
            "{}",
            json!({ "left_l": record.left_l, "right_l": record.right_l })
        );
    } else {
        println!(
            "state written: left {} L, right {} L",
            format_value(record.left_l),
            format_value(record.right_l)
        );
    }
    Ok(record)
}

/// Validate the calibration, read the stored record, and poll every device
/// once.
pub fn self_check(cfg: &Config, base: &Path) -> Result<()> {
    let knobs = SimKnobs::from_env()?;
    let mut stack = hw::build_stack(cfg, base, &knobs)?;

    let mut store = hw::open_store(cfg, base);
    match store.try_load() {
        Ok(_) | Err(LoadError::NoRecord) => {}
        Err(LoadError::Decode(e)) => {
            tracing::warn!(error = %e, "stored record is corrupt; next run starts from zero");
        }
        Err(LoadError::Io(msg)) => {
            return Err(DispenserError::Persistence(msg))
                .wrap_err_with(|| format!("read {}", store.nvm().path().display()));
        }
    }

    for (name, ch) in [("left", &cfg.channels.left), ("right", &cfg.channels.right)] {
        for input in [ch.flow_channel, ch.temp_channel] {
            stack
                .receiver
                .read_raw(input)
                .map_err(|e| DispenserError::Hardware(e.to_string()))
                .wrap_err_with(|| format!("{name} receiver input {input}"))?;
        }
    }
    for (name, ch) in [("left", &stack.left), ("right", &stack.right)] {
        ch.valve()
            .relay()
            .is_energized()
            .map_err(|e| DispenserError::Hardware(e.to_string()))
            .wrap_err_with(|| format!("{name} valve relay"))?;
    }
    // One tick polls the encoder, samples the sensor and refreshes the
    // display; driver faults there are logged by the adapters.
    let now = Instant::now();
    for ch in [&mut stack.left, &mut stack.right] {
        ch.tick(now);
        ch.shutdown();
    }

    if json_mode() {
        println!("{}", json!({ "ok": true }));
    } else {
        println!("self-check ok");
    }
    Ok(())
}
