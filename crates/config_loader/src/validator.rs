//! Config validation
//!
//! Two passes, first failure wins:
//! - `validator` derive checks (ranges, lengths) declared on the config types
//! - cross-field rules the derive cannot express:
//!   - hazard.t1 < hazard.t2
//!   - lane boundaries strictly increasing inside (0, 1)
//!   - one heading per lane
//!   - class sets non-empty, hazard classes disjoint from tracked classes
//!   - tracker match weights not both zero
//!   - emergency streak fits inside the track history
//!   - sink names unique, required sink params present

use std::collections::HashSet;

use contracts::{ContractError, SafetyConfig, SinkType};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Validate a parsed config
pub fn validate(config: &SafetyConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_hazard_thresholds(config)?;
    validate_lane_layout(config)?;
    validate_classes(config)?;
    validate_tracker_weights(config)?;
    validate_emergency_window(config)?;
    validate_sinks(config)?;
    Ok(())
}

/// Run the derive checks, reporting the first failure by field path
fn validate_fields(config: &SafetyConfig) -> Result<(), ContractError> {
    let Err(errors) = config.validate() else {
        return Ok(());
    };

    let mut flat = Vec::new();
    flatten("", &errors, &mut flat);
    let (field, message) = flat
        .into_iter()
        .next()
        .unwrap_or_else(|| (String::from("<root>"), errors.to_string()));
    Err(ContractError::config_validation(field, message))
}

fn flatten(prefix: &str, errors: &ValidationErrors, out: &mut Vec<(String, String)>) {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                out.extend(errs.iter().map(|e| (path.clone(), describe(e))));
            }
            ValidationErrorsKind::Struct(inner) => flatten(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    flatten(&format!("{path}[{idx}]"), inner, out);
                }
            }
        }
    }
}

fn describe(error: &ValidationError) -> String {
    if let Some(message) = &error.message {
        return message.to_string();
    }
    let value = error
        .params
        .get("value")
        .map(|v| v.to_string())
        .unwrap_or_default();
    let mut bounds: Vec<String> = ["min", "max", "exclusive_min", "exclusive_max"]
        .iter()
        .filter_map(|k| error.params.get(*k).map(|v| format!("{k} {v}")))
        .collect();
    bounds.sort();
    if bounds.is_empty() {
        format!("failed '{}' check (value {value})", error.code)
    } else {
        format!(
            "failed '{}' check (value {value}, {})",
            error.code,
            bounds.join(", ")
        )
    }
}

fn validate_hazard_thresholds(config: &SafetyConfig) -> Result<(), ContractError> {
    let hazard = &config.hazard;
    if hazard.t1 >= hazard.t2 {
        return Err(ContractError::config_validation(
            "hazard.t1 / hazard.t2",
            format!("t1 ({}) must be < t2 ({})", hazard.t1, hazard.t2),
        ));
    }
    Ok(())
}

fn validate_lane_layout(config: &SafetyConfig) -> Result<(), ContractError> {
    let lane = &config.lane;

    for (idx, b) in lane.boundaries.iter().enumerate() {
        if !(b.is_finite() && *b > 0.0 && *b < 1.0) {
            return Err(ContractError::config_validation(
                format!("lane.boundaries[{idx}]"),
                format!("boundary {b} must lie strictly inside (0, 1)"),
            ));
        }
    }
    if let Some(idx) = lane.boundaries.windows(2).position(|w| w[0] >= w[1]) {
        return Err(ContractError::config_validation(
            format!("lane.boundaries[{}]", idx + 1),
            "boundaries must be strictly increasing",
        ));
    }

    if lane.headings_deg.len() != lane.lane_count() {
        return Err(ContractError::config_validation(
            "lane.headings_deg",
            format!(
                "{} lanes need {} headings, got {}",
                lane.lane_count(),
                lane.lane_count(),
                lane.headings_deg.len()
            ),
        ));
    }
    if let Some(idx) = lane.headings_deg.iter().position(|h| !h.is_finite()) {
        return Err(ContractError::config_validation(
            format!("lane.headings_deg[{idx}]"),
            "heading must be finite",
        ));
    }
    Ok(())
}

fn validate_classes(config: &SafetyConfig) -> Result<(), ContractError> {
    let classes = &config.classes;
    for (field, set) in [
        ("classes.vehicle", &classes.vehicle),
        ("classes.emergency", &classes.emergency),
        ("classes.hazard", &classes.hazard),
    ] {
        if set.iter().all(|c| c.trim().is_empty()) {
            return Err(ContractError::config_validation(
                field,
                "class set cannot be empty",
            ));
        }
    }

    let hazards: HashSet<&str> = classes.hazard.iter().map(String::as_str).collect();
    for (field, set) in [
        ("classes.vehicle", &classes.vehicle),
        ("classes.emergency", &classes.emergency),
    ] {
        if let Some(overlap) = set.iter().find(|c| hazards.contains(c.as_str())) {
            return Err(ContractError::config_validation(
                field,
                format!("'{overlap}' is also a hazard class"),
            ));
        }
    }
    Ok(())
}

fn validate_tracker_weights(config: &SafetyConfig) -> Result<(), ContractError> {
    let tracker = &config.tracker;
    if tracker.iou_weight + tracker.distance_weight <= 0.0 {
        return Err(ContractError::config_validation(
            "tracker.iou_weight / tracker.distance_weight",
            "at least one match weight must be positive",
        ));
    }
    Ok(())
}

/// The streak is counted over the history ring, so a longer one never completes
fn validate_emergency_window(config: &SafetyConfig) -> Result<(), ContractError> {
    let streak = config.emergency.streak_frames;
    let history = config.tracker.history_len;
    if streak as usize > history {
        return Err(ContractError::config_validation(
            "emergency.streak_frames",
            format!("{streak} exceeds tracker.history_len ({history})"),
        ));
    }
    Ok(())
}

fn validate_sinks(config: &SafetyConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
        if sink.sink_type == SinkType::Network && !sink.params.contains_key("addr") {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].params.addr"),
                "network sink requires 'addr'",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SinkConfig;

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&SafetyConfig::default()).is_ok());
    }

    #[test]
    fn test_derive_range_reported_with_path() {
        let mut config = SafetyConfig::default();
        config.tracker.alpha = 1.5;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("alpha"), "got: {err}");
        assert_eq!(field_of(err), "tracker.alpha");
    }

    #[test]
    fn test_nested_sink_list_path() {
        let mut config = SafetyConfig::default();
        config.sinks[1].queue_capacity = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "sinks[1].queue_capacity");
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let mut config = SafetyConfig::default();
        config.hazard.t1 = 0.2;
        config.hazard.t2 = 0.1;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("must be < t2"), "got: {err}");
    }

    #[test]
    fn test_boundaries_must_increase_inside_frame() {
        let mut config = SafetyConfig::default();
        config.lane.boundaries = vec![0.6, 0.4];
        config.lane.headings_deg = vec![270.0, 90.0, 90.0];
        assert_eq!(field_of(validate(&config).unwrap_err()), "lane.boundaries[1]");

        config.lane.boundaries = vec![0.4, 1.0];
        assert_eq!(field_of(validate(&config).unwrap_err()), "lane.boundaries[1]");
    }

    #[test]
    fn test_heading_count_matches_lanes() {
        let mut config = SafetyConfig::default();
        config.lane.boundaries = vec![0.3, 0.6];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("3 lanes need 3 headings, got 2"), "got: {err}");
    }

    #[test]
    fn test_hazard_classes_disjoint() {
        let mut config = SafetyConfig::default();
        config.classes.vehicle.push("pothole".into());
        assert_eq!(field_of(validate(&config).unwrap_err()), "classes.vehicle");

        let mut config = SafetyConfig::default();
        config.classes.emergency.clear();
        assert_eq!(field_of(validate(&config).unwrap_err()), "classes.emergency");
    }

    #[test]
    fn test_emergency_streak_bounded_by_history() {
        let mut config = SafetyConfig::default();
        config.tracker.history_len = 4;
        config.emergency.streak_frames = 6;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("exceeds tracker.history_len (4)"), "got: {err}");
        assert_eq!(field_of(err), "emergency.streak_frames");

        config.emergency.streak_frames = 4;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_lane_confidence_and_enqueue_timeout_ranges() {
        let mut config = SafetyConfig::default();
        config.lane.min_confidence = 1.2;
        assert_eq!(field_of(validate(&config).unwrap_err()), "lane.min_confidence");

        let mut config = SafetyConfig::default();
        config.sinks[1].enqueue_timeout_ms = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "sinks[1].enqueue_timeout_ms"
        );
    }

    #[test]
    fn test_duplicate_sink_name() {
        let mut config = SafetyConfig::default();
        config.sinks.push(SinkConfig::new("console", SinkType::Log));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate sink name"), "got: {err}");
    }

    #[test]
    fn test_network_sink_needs_addr() {
        let mut config = SafetyConfig::default();
        config.sinks.push(SinkConfig::new("remote", SinkType::Network));
        assert_eq!(field_of(validate(&config).unwrap_err()), "sinks[2].params.addr");
    }
}
