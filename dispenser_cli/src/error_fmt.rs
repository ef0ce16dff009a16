//! Human-readable error descriptions and structured JSON error formatting.

use dispenser_core::error::{BuildError, DecodeError, DispenserError, LoadError};

/// Exit codes other than success. Clap exits with 2 on usage errors.
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_CONFIG: i32 = 3;
pub const EXIT_HARDWARE: i32 = 4;
pub const EXIT_PERSISTENCE: i32 = 5;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
        );
    }

    if let Some(de) = err.downcast_ref::<DispenserError>() {
        return match de {
            DispenserError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML, or a bad DISPENSER_SIM_* variable.\nHow to fix: Edit the config file, then rerun."
            ),
            DispenserError::Timeout => "What happened: A device did not answer in time.\nLikely causes: Bus wiring, power, or a wrong device address.\nHow to fix: Check the I2C wiring and the [channels] addresses in the config.".to_string(),
            DispenserError::Hardware(msg) | DispenserError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Incorrect pin numbers, missing GPIO permissions, or a disconnected device.\nHow to fix: Fix the [channels] values in the config; ensure the process may access GPIO."
            ),
            DispenserError::Persistence(msg) => format!(
                "What happened: Saved state could not be accessed ({msg}).\nLikely causes: The persistence path is not writable or its directory does not exist.\nHow to fix: Check persistence.path in the config and the file permissions."
            ),
            DispenserError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: An invalid value on the command line.\nHow to fix: Re-run with corrected arguments."
            ),
        };
    }

    if let Some(le) = err.downcast_ref::<LoadError>() {
        return format!(
            "What happened: {le}.\nLikely causes: Storage was written by another program or damaged.\nHow to fix: Write a fresh record with `dispenser set-state --left L --right R`."
        );
    }
    if let Some(de) = err.downcast_ref::<DecodeError>() {
        return format!(
            "What happened: Stored record is corrupt ({de}).\nLikely causes: Storage was written by another program or damaged.\nHow to fix: Write a fresh record with `dispenser set-state --left L --right R`."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,value'.".to_string();
    }

    if lower.contains("calibration csv") {
        return format!(
            "What happened: Calibration CSV could not be used ({msg}).\nLikely causes: Fewer than two rows, duplicate or unsorted raw values, or a missing file.\nHow to fix: Fix the CSV named in sensor.*.csv, or remove it to use gain/offset."
        );
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read ({msg}).\nLikely causes: Wrong --config path.\nHow to fix: Pass --config with an existing TOML file."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Details: {msg}"
    )
}

/// Stable exit codes per error family.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return EXIT_CONFIG;
    }
    if let Some(de) = err.downcast_ref::<DispenserError>() {
        return match de {
            DispenserError::Config(_) => EXIT_CONFIG,
            DispenserError::Hardware(_)
            | DispenserError::HardwareFault(_)
            | DispenserError::Timeout => EXIT_HARDWARE,
            DispenserError::Persistence(_) => EXIT_PERSISTENCE,
            DispenserError::State(_) => EXIT_ERROR,
        };
    }
    if err.downcast_ref::<LoadError>().is_some() || err.downcast_ref::<DecodeError>().is_some() {
        return EXIT_PERSISTENCE;
    }
    EXIT_ERROR
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<DispenserError>() {
        Some(DispenserError::Config(_)) => "Config",
        Some(DispenserError::Hardware(_)) => "Hardware",
        Some(DispenserError::HardwareFault(_)) => "HardwareFault",
        Some(DispenserError::Timeout) => "Timeout",
        Some(DispenserError::Persistence(_)) => "Persistence",
        Some(DispenserError::State(_)) => "State",
        None if err.downcast_ref::<BuildError>().is_some() => "Config",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
