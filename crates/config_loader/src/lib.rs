//! # Config Loader
//!
//! Reads `lagd.toml` (or an equivalent `.json`) into a validated
//! [`DaemonBlueprint`]. Every section except `[vehicle]` has defaults, so
//! a minimal file names the car and nothing else.
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("lagd.toml")).unwrap();
//! println!("initial lag {:.3} s", blueprint.initial_lag());
//! ```

mod parser;
mod validator;

pub use contracts::DaemonBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse and validate a config file, choosing the format by extension
    pub fn load_from_path(path: &Path) -> Result<DaemonBlueprint, ContractError> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ContractError::config_parse(format!(
                    "{} has no extension; expected .toml or .json",
                    path.display()
                ))
            })
            .and_then(|ext| {
                ConfigFormat::from_extension(ext).ok_or_else(|| {
                    ContractError::config_parse(format!("unsupported config format: .{ext}"))
                })
            })?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<DaemonBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Re-check a blueprint changed after loading, e.g. by CLI overrides
    pub fn validate(blueprint: &DaemonBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &DaemonBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("cannot write blueprint as TOML: {e}")))
    }

    pub fn to_json(blueprint: &DaemonBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("cannot write blueprint as JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[vehicle]
fingerprint = "TESLA_MODEL_3"
steer_actuator_delay = 0.1

[estimator]
min_ncc = 0.9

[cadence]
debug = true

[params]
path = "/tmp/lagd-params"

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.vehicle.fingerprint, "TESLA_MODEL_3");
        assert_eq!(bp.estimator.min_ncc, 0.9);
        assert_eq!(bp.estimator.block_size, 100);
        assert!(bp.cadence.debug);
        assert_eq!(bp.cadence.persist_every_frames, 1200);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.vehicle, bp2.vehicle);
        assert_eq!(bp.estimator, bp2.estimator);
        assert_eq!(bp.sinks.len(), bp2.sinks.len());
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.cadence, bp2.cadence);
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lagd.toml");
        std::fs::write(&path, MINIMAL_TOML).unwrap();
        let bp = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(bp.sinks[0].name, "log_sink");

        let yaml = dir.path().join("lagd.yaml");
        std::fs::write(&yaml, MINIMAL_TOML).unwrap();
        let err = ConfigLoader::load_from_path(&yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../lagd.toml");
        let bp = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(bp.vehicle.fingerprint, "TOYOTA_COROLLA_TSS2");
        assert!(!bp.sinks.is_empty());
    }

    #[test]
    fn test_missing_extension_rejected() {
        let err = ConfigLoader::load_from_path(Path::new("lagd")).unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[vehicle]
fingerprint = "TESLA_MODEL_3"

[estimator]
okay_window_sec = 400.0
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("okay_window_sec"));
    }
}
