//! Warm-start from a previous session's persisted estimate.

use contracts::{ContractError, PersistedDelay};

/// Seed recovered from persisted state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoredLag {
    pub lag: f64,
    pub valid_blocks: usize,
}

/// Decode a persisted record and check it applies to this vehicle.
///
/// # Errors
/// `PersistenceUnavailable` if the record is malformed, was learned on a
/// different vehicle, or claims more valid blocks than the ring holds.
pub fn retrieve_initial_lag(
    raw: &[u8],
    vehicle_fingerprint: &str,
    block_count: usize,
) -> Result<RestoredLag, ContractError> {
    let persisted: PersistedDelay = serde_json::from_slice(raw).map_err(|e| {
        ContractError::persistence(PersistedDelay::PARAM_KEY, format!("malformed record: {e}"))
    })?;

    if persisted.vehicle_fingerprint != vehicle_fingerprint {
        return Err(ContractError::persistence(
            PersistedDelay::PARAM_KEY,
            format!(
                "car model mismatch: stored '{}', current '{}'",
                persisted.vehicle_fingerprint, vehicle_fingerprint
            ),
        ));
    }

    let live_delay = persisted.live_delay;
    if live_delay.valid_blocks > block_count {
        return Err(ContractError::persistence(
            PersistedDelay::PARAM_KEY,
            format!(
                "invalid number of valid blocks: {} > {}",
                live_delay.valid_blocks, block_count
            ),
        ));
    }
    if !live_delay.lateral_delay_estimate.is_finite() {
        return Err(ContractError::persistence(
            PersistedDelay::PARAM_KEY,
            "lateral_delay_estimate is not finite",
        ));
    }

    Ok(RestoredLag {
        lag: live_delay.lateral_delay_estimate,
        valid_blocks: live_delay.valid_blocks,
    })
}
