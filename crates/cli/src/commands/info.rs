//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::ConfigLoader;
use contracts::SafetyConfig;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    camera_id: String,
    classes: ClassInfo,
    lanes: Vec<LaneInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rules: Option<RuleInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct ClassInfo {
    vehicle: Vec<String>,
    emergency: Vec<String>,
    hazard: Vec<String>,
}

#[derive(Serialize)]
struct LaneInfo {
    index: usize,
    x_from: f64,
    x_to: f64,
    heading_deg: f64,
}

#[derive(Serialize)]
struct RuleInfo {
    confirm_hits: u32,
    deviation_threshold_deg: f64,
    lane_min_confidence: f64,
    violation_frames: u32,
    recovery_frames: u32,
    lane_cooldown_frames: u64,
    emergency_min_confidence: f64,
    emergency_streak_frames: u32,
    hazard_min_area_fraction: f64,
    hazard_cooldown_frames: u64,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    enabled: bool,
    queue_capacity: usize,
    enqueue_timeout_ms: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = ?args.config, "Loading configuration info");

    if let Some(path) = &args.config {
        if !path.exists() {
            return Err(CliError::config_not_found(path.display().to_string()).into());
        }
    }

    let config = ConfigLoader::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

/// Lane extents from the effective boundaries
fn lanes(config: &SafetyConfig) -> Vec<LaneInfo> {
    let mut edges = vec![0.0];
    edges.extend(config.lane.effective_boundaries());
    edges.push(1.0);

    edges
        .windows(2)
        .zip(&config.lane.headings_deg)
        .enumerate()
        .map(|(index, (edge, heading))| LaneInfo {
            index,
            x_from: edge[0],
            x_to: edge[1],
            heading_deg: *heading,
        })
        .collect()
}

fn build_config_info(config: &SafetyConfig, args: &InfoArgs) -> ConfigInfo {
    let rules = args.rules.then(|| RuleInfo {
        confirm_hits: config.tracker.confirm_hits,
        deviation_threshold_deg: config.lane.deviation_threshold_deg,
        lane_min_confidence: config.lane.min_confidence,
        violation_frames: config.lane.violation_frames,
        recovery_frames: config.lane.recovery_frames,
        lane_cooldown_frames: config.lane.cooldown_frames,
        emergency_min_confidence: config.emergency.min_confidence,
        emergency_streak_frames: config.emergency.streak_frames,
        hazard_min_area_fraction: config.hazard.min_area_fraction,
        hazard_cooldown_frames: config.hazard.cooldown_frames,
    });

    let sinks = if args.sinks {
        config
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                enabled: s.enabled,
                queue_capacity: s.queue_capacity,
                enqueue_timeout_ms: s.enqueue_timeout_ms,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        camera_id: config.source.camera_id.clone(),
        classes: ClassInfo {
            vehicle: config.classes.vehicle.clone(),
            emergency: config.classes.emergency.clone(),
            hazard: config.classes.hazard.clone(),
        },
        lanes: lanes(config),
        rules,
        sinks,
    }
}

fn print_config_info(config: &SafetyConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Traffic Guard Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📷 Source");
    println!("   ├─ Version: {:?}", config.version);
    println!("   └─ Camera: {}", config.source.camera_id);

    println!("\n🏷️  Classes");
    println!("   ├─ Vehicle: {}", config.classes.vehicle.join(", "));
    println!("   ├─ Emergency: {}", config.classes.emergency.join(", "));
    println!("   └─ Hazard: {}", config.classes.hazard.join(", "));

    let lanes = lanes(config);
    println!("\n🛣️  Lanes ({})", lanes.len());
    for (i, lane) in lanes.iter().enumerate() {
        let prefix = if i == lanes.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {} #{}: x {:.2}..{:.2}, heading {}°",
            prefix, lane.index, lane.x_from, lane.x_to, lane.heading_deg
        );
    }

    if args.rules {
        println!("\n⚙️  Rules");
        println!("   ├─ Track confirmation: {} hits", config.tracker.confirm_hits);
        println!(
            "   ├─ Lane: >{}° at confidence ≥ {} for {} frames, recover after {}, cooldown {}",
            config.lane.deviation_threshold_deg,
            config.lane.min_confidence,
            config.lane.violation_frames,
            config.lane.recovery_frames,
            config.lane.cooldown_frames
        );
        println!(
            "   ├─ Emergency: confidence ≥ {} for {} frames",
            config.emergency.min_confidence, config.emergency.streak_frames
        );
        println!(
            "   └─ Hazard: area ≥ {}, cooldown {} frames",
            config.hazard.min_area_fraction, config.hazard.cooldown_frames
        );
    }

    if args.sinks {
        println!("\n💾 Sinks ({})", config.sinks.len());
        for (i, sink) in config.sinks.iter().enumerate() {
            let prefix = if i == config.sinks.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} ({:?}, queue {}){}",
                prefix,
                sink.name,
                sink.sink_type,
                sink.queue_capacity,
                if sink.enabled { "" } else { " [disabled]" }
            );
        }
    } else {
        println!("\n💾 Sinks: {} configured (use --sinks for details)", config.sinks.len());
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_extents_follow_boundaries() {
        let mut config = SafetyConfig::default();
        config.lane.boundaries = vec![0.25, 0.5, 0.75];
        config.lane.headings_deg = vec![270.0, 270.0, 90.0, 90.0];

        let lanes = lanes(&config);
        assert_eq!(lanes.len(), 4);
        assert_eq!(lanes[0].x_from, 0.0);
        assert_eq!(lanes[1].x_to, 0.5);
        assert_eq!(lanes[3].x_to, 1.0);
        assert_eq!(lanes[3].heading_deg, 90.0);
    }

    #[test]
    fn test_info_sections_are_opt_in() {
        let config = SafetyConfig::default();
        let args = InfoArgs {
            config: None,
            json: true,
            rules: false,
            sinks: false,
        };
        let info = build_config_info(&config, &args);
        assert!(info.rules.is_none());
        assert!(info.sinks.is_empty());

        let args = InfoArgs {
            rules: true,
            sinks: true,
            ..args
        };
        let info = build_config_info(&config, &args);
        assert!(info.rules.is_some());
        assert_eq!(info.sinks.len(), config.sinks.len());
    }
}
