//! Hazard-severity rule
//!
//! Hazards are not tracked. Sightings are grouped into spatial clusters; the
//! first sighting of a cluster is reported, later ones inside the cooldown
//! window are suppressed.

use contracts::{BBox, DedupKey, Detection, EventPayload, HazardConfig, Severity};
use tracing::{debug, info};

use crate::cooldown::CooldownLedger;
use crate::rule::Candidate;
use crate::EngineError;

/// Severity from relative box area
///
/// `< t1` is Low, `t1..=t2` is Medium, `> t2` is High.
pub fn severity_for_area(area_fraction: f64, t1: f64, t2: f64) -> Severity {
    if area_fraction < t1 {
        Severity::Low
    } else if area_fraction <= t2 {
        Severity::Medium
    } else {
        Severity::High
    }
}

#[derive(Debug, Clone)]
struct HazardCluster {
    id: u64,
    center: (f64, f64),
    last_seen: u64,
}

#[derive(Debug)]
pub struct HazardRule {
    config: HazardConfig,
    clusters: Vec<HazardCluster>,
    next_cluster_id: u64,
}

impl HazardRule {
    pub fn new(config: HazardConfig) -> Self {
        Self {
            config,
            clusters: Vec::new(),
            next_cluster_id: 1,
        }
    }

    pub fn severity(&self, area_fraction: f64) -> Severity {
        severity_for_area(area_fraction, self.config.t1, self.config.t2)
    }

    /// Evaluate the hazard detections of one frame
    ///
    /// # Errors
    /// A non-finite or negative area is an invariant violation.
    pub fn evaluate(
        &mut self,
        hazards: &[Detection],
        frame_index: u64,
        ledger: &mut CooldownLedger,
    ) -> Result<Vec<Candidate>, EngineError> {
        let mut out = Vec::new();

        for det in hazards {
            let area = det.bbox.area();
            if !area.is_finite() || area < 0.0 {
                return Err(EngineError::invariant(format!(
                    "hazard area {area} on frame {frame_index}"
                )));
            }
            if area < self.config.min_area_fraction {
                debug!(frame_index, area, "Hazard below minimum area");
                continue;
            }

            let cluster_id = self.assign_cluster(&det.bbox, frame_index);
            let key = DedupKey::hazard_cluster(cluster_id);
            if !ledger.try_acquire(key, frame_index, self.config.cooldown_frames) {
                continue;
            }

            let severity = self.severity(area);
            info!(cluster_id, class = %det.class_label, area, severity = %severity, "Hazard");
            out.push(Candidate {
                dedup_key: key,
                severity,
                payload: EventPayload {
                    class_label: det.class_label.clone(),
                    bbox: Some(det.bbox),
                    confidence: Some(det.confidence),
                    area_fraction: Some(area),
                    cluster_id: Some(cluster_id),
                    ..Default::default()
                },
            });
        }

        Ok(out)
    }

    /// Nearest cluster within the radius, or a new one
    fn assign_cluster(&mut self, bbox: &BBox, frame_index: u64) -> u64 {
        let center = bbox.center();
        let radius = self.config.cluster_radius;

        let nearest = self
            .clusters
            .iter_mut()
            .map(|c| {
                let d = ((c.center.0 - center.0).powi(2) + (c.center.1 - center.1).powi(2)).sqrt();
                (c, d)
            })
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some((cluster, _)) = nearest {
            cluster.last_seen = frame_index;
            return cluster.id;
        }

        let id = self.next_cluster_id;
        self.next_cluster_id += 1;
        self.clusters.push(HazardCluster {
            id,
            center,
            last_seen: frame_index,
        });
        debug!(cluster_id = id, cx = center.0, cy = center.1, "New hazard cluster");
        id
    }

    /// Drop clusters unseen for longer than the cooldown window
    pub fn expire(&mut self, frame_index: u64, ledger: &mut CooldownLedger) -> usize {
        let window = self.config.cooldown_frames;
        let before = self.clusters.len();
        self.clusters.retain(|c| {
            let keep = frame_index.saturating_sub(c.last_seen) <= window;
            if !keep {
                ledger.evict_cluster(c.id);
            }
            keep
        });
        before - self.clusters.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }
}
