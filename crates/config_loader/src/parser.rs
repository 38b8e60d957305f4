//! Config parsing
//!
//! TOML is the primary format, JSON is accepted.

use contracts::{ContractError, SafetyConfig};

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (preferred)
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<SafetyConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<SafetyConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<SafetyConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SinkType;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.source.camera_id, "CAM_01");
        assert_eq!(config.tracker.confirm_hits, 5);
        assert_eq!(config.lane.violation_frames, 5);
        assert_eq!(config.lane.min_confidence, 0.65);
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[1].enqueue_timeout_ms, 50);
    }

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
[source]
camera_id = "CAM_03"

[lane]
boundaries = [0.33, 0.66]
headings_deg = [270.0, 270.0, 90.0]
violation_frames = 4
min_confidence = 0.8

[hazard]
t1 = 0.02

[[sinks]]
name = "remote"
sink_type = "network"
queue_capacity = 64
enqueue_timeout_ms = 20
[sinks.params]
addr = "127.0.0.1:9999"
format = "bincode"
"#;
        let config = parse_toml(content).unwrap();
        assert_eq!(config.source.camera_id, "CAM_03");
        assert_eq!(config.lane.lane_count(), 3);
        assert_eq!(config.lane.violation_frames, 4);
        // untouched fields keep their defaults
        assert_eq!(config.lane.recovery_frames, 10);
        assert_eq!(config.lane.min_confidence, 0.8);
        assert_eq!(config.hazard.t2, 0.1);
        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sinks[0].sink_type, SinkType::Network);
        assert!(config.sinks[0].enabled);
        assert_eq!(config.sinks[0].params["format"], "bincode");
        assert_eq!(
            config.sinks[0].enqueue_timeout(),
            std::time::Duration::from_millis(20)
        );
    }

    #[test]
    fn test_parse_json() {
        let content = r#"{
            "tracker": { "alpha": 0.5 },
            "sinks": [{ "name": "console", "sink_type": "log" }]
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.tracker.alpha, 0.5);
        assert_eq!(config.sinks[0].name, "console");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_sink_type_rejected() {
        let content = r#"
[[sinks]]
name = "x"
sink_type = "carrier_pigeon"
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
