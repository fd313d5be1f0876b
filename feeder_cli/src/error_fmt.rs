//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use feeder_core::error::{BuildError, FeederError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingInputs => {
                "What happened: No input lines were provided to the feeder.\nLikely causes: The pellet-well and poke inputs failed to initialize or were not wired into the builder.\nHow to fix: Ensure the inputs are created successfully and passed via with_inputs(...).".to_string()
            }
            BuildError::MissingMotor => {
                "What happened: No motor was provided to the feeder.\nLikely causes: The stepper driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the motor is created successfully and passed via with_motor(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(fe) = err.downcast_ref::<FeederError>() {
        return match fe {
            FeederError::Config(msg) => format!(
                "What happened: Configuration is invalid ({msg}).\nLikely causes: A typo, an unknown value, or an out-of-range number in the TOML.\nHow to fix: Edit the config file and try again; `feeder self-check` validates it without moving the motor."
            ),
            FeederError::Hardware(msg) | FeederError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Incorrect pin numbers, a loose cable, or insufficient GPIO permissions.\nHow to fix: Check the [pins] values in the config and that the process may access /dev/gpiomem."
            ),
            FeederError::EventLog(msg) => format!(
                "What happened: The event log could not be opened ({msg}).\nLikely causes: The directory does not exist, the disk is full, or the file is read-only.\nHow to fix: Point --events or [logging].events_csv at a writable location."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 1 generic, 2 configuration, 3 hardware, 4 event log.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use feeder_core::error::{BuildError, FeederError};
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    match err.downcast_ref::<FeederError>() {
        Some(FeederError::Config(_)) => 2,
        Some(FeederError::Hardware(_) | FeederError::HardwareFault(_)) => 3,
        Some(FeederError::EventLog(_)) => 4,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    use feeder_core::error::{BuildError, FeederError};
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<FeederError>() {
        Some(FeederError::Config(_)) => "Config",
        Some(FeederError::Hardware(_) | FeederError::HardwareFault(_)) => "Hardware",
        Some(FeederError::EventLog(_)) => "EventLog",
        Some(FeederError::Io(_)) => "Io",
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

#[cfg(test)]
mod tests {
    use super::*;
    use feeder_core::error::{BuildError, FeederError};

    #[test]
    fn config_errors_exit_with_two() {
        let err = eyre::Report::new(FeederError::Config("pins must be distinct".into()));
        assert_eq!(exit_code_for_error(&err), 2);
        assert!(humanize(&err).contains("pins must be distinct"));
    }

    #[test]
    fn build_errors_are_typed_in_json() {
        let err = eyre::Report::new(BuildError::InvalidConfig("max_poke_ms must be >= 1"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Build");
        assert_eq!(v["exit_code"], 2);
    }

    #[test]
    fn untyped_errors_fall_back_to_generic_text() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).starts_with("Something went wrong."));
    }
}
