//! Config validation
//!
//! Rules:
//! - estimator / cadence field ranges (`validator` derive)
//! - window lengths and max_lag finite
//! - okay_window_sec <= window_sec, max_lag <= window_sec
//! - max_lag covers at least one sample
//! - vehicle fingerprint non-empty, actuator delay >= 0
//! - sink names non-empty and unique
//! - channel / queue capacities > 0

use std::collections::HashSet;

use contracts::{ContractError, DaemonBlueprint};
use validator::{Validate, ValidationErrors};

/// Validate a DaemonBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    validate_vehicle(blueprint)?;
    validate_ranges("estimator", blueprint.estimator.validate())?;
    validate_ranges("cadence", blueprint.cadence.validate())?;
    validate_windows(blueprint)?;
    validate_ingestion(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// Map derive-level range failures onto the first offending field
fn validate_ranges(
    section: &str,
    result: Result<(), ValidationErrors>,
) -> Result<(), ContractError> {
    let Err(errors) = result else {
        return Ok(());
    };

    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().collect();
    fields.sort();

    match fields.first() {
        Some(field) => {
            let message = field_errors[*field]
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            Err(ContractError::config_validation(
                format!("{section}.{field}"),
                message,
            ))
        }
        None => Err(ContractError::config_validation(section, errors.to_string())),
    }
}

fn validate_vehicle(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    if blueprint.vehicle.fingerprint.trim().is_empty() {
        return Err(ContractError::config_validation(
            "vehicle.fingerprint",
            "fingerprint cannot be empty",
        ));
    }
    let delay = blueprint.vehicle.steer_actuator_delay;
    if !delay.is_finite() || delay < 0.0 {
        return Err(ContractError::config_validation(
            "vehicle.steer_actuator_delay",
            format!("steer_actuator_delay must be >= 0, got {delay}"),
        ));
    }
    Ok(())
}

/// Cross-field window checks
fn validate_windows(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    let estimator = &blueprint.estimator;

    for (field, value) in [
        ("window_sec", estimator.window_sec),
        ("okay_window_sec", estimator.okay_window_sec),
        ("min_recovery_buffer_sec", estimator.min_recovery_buffer_sec),
        ("max_lag", estimator.max_lag),
    ] {
        if !value.is_finite() {
            return Err(ContractError::config_validation(
                format!("estimator.{field}"),
                format!("{field} must be finite, got {value}"),
            ));
        }
    }

    if estimator.max_lag > estimator.window_sec {
        return Err(ContractError::config_validation(
            "estimator.max_lag / estimator.window_sec",
            format!(
                "max_lag ({}) must be <= window_sec ({})",
                estimator.max_lag, estimator.window_sec
            ),
        ));
    }

    if estimator.okay_window_sec > estimator.window_sec {
        return Err(ContractError::config_validation(
            "estimator.okay_window_sec / estimator.window_sec",
            format!(
                "okay_window_sec ({}) must be <= window_sec ({})",
                estimator.okay_window_sec, estimator.window_sec
            ),
        ));
    }

    let dt = blueprint.sample_period();
    if estimator.max_lag_samples(dt) < 1 {
        return Err(ContractError::config_validation(
            "estimator.max_lag",
            format!(
                "max_lag ({}) must cover at least one sample period ({dt})",
                estimator.max_lag
            ),
        ));
    }

    if estimator.okay_window_len(dt) < 1 {
        return Err(ContractError::config_validation(
            "estimator.okay_window_sec",
            format!(
                "okay_window_sec ({}) must cover at least one sample period ({dt})",
                estimator.okay_window_sec
            ),
        ));
    }

    Ok(())
}

fn validate_ingestion(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    if blueprint.ingestion.channel_capacity == 0 {
        return Err(ContractError::config_validation(
            "ingestion.channel_capacity",
            "channel_capacity must be > 0",
        ));
    }
    Ok(())
}

/// Validate sink config
fn validate_sinks(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", idx),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
