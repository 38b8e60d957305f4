//! NetworkSink - remote-sync forwarder, UDP fire-and-forget
//!
//! Each event goes out as one datagram, either as the same JSON object the
//! event log holds or as a bincode-encoded [`WireEvent`]. A sink can be
//! narrowed to some event types and a severity floor so a remote station only
//! receives what it acts on.

use contracts::{
    BBox, ContractError, DedupKey, EventPayload, EventSink, EventType, SafetyEvent, Severity,
    Subject, TrackId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

const DEFAULT_MAX_PACKET_SIZE: usize = 65000;

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode of [`WireEvent`] (binary, compact)
    Bincode,
}

/// Flat, untagged datagram layout for the binary format
///
/// Bincode is not self-describing, so the subject is split into two optional
/// ids and every payload field is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub id: [u8; 16],
    pub event_type: EventType,
    pub track_id: Option<TrackId>,
    pub subject_track: Option<TrackId>,
    pub subject_cluster: Option<u64>,
    pub camera_id: String,
    pub frame_index: u64,
    pub timestamp: f64,
    pub time_fmt: String,
    pub severity: Severity,
    pub class_label: String,
    pub bbox: Option<BBox>,
    pub confidence: Option<f64>,
    pub heading_deg: Option<f64>,
    pub expected_heading_deg: Option<f64>,
    pub deviation_deg: Option<f64>,
    pub lane_index: Option<u64>,
    pub area_fraction: Option<f64>,
    pub cluster_id: Option<u64>,
    pub streak: Option<u32>,
}

impl From<&SafetyEvent> for WireEvent {
    fn from(event: &SafetyEvent) -> Self {
        let (subject_track, subject_cluster) = match event.dedup_key.subject {
            Subject::Track(id) => (Some(id), None),
            Subject::HazardCluster(id) => (None, Some(id)),
        };
        let payload = &event.payload;
        Self {
            id: *event.event_id.as_bytes(),
            event_type: event.event_type,
            track_id: event.track_id,
            subject_track,
            subject_cluster,
            camera_id: event.camera_id.clone(),
            frame_index: event.frame_index,
            timestamp: event.timestamp,
            time_fmt: event.time_fmt.clone(),
            severity: event.severity,
            class_label: payload.class_label.clone(),
            bbox: payload.bbox,
            confidence: payload.confidence,
            heading_deg: payload.heading_deg,
            expected_heading_deg: payload.expected_heading_deg,
            deviation_deg: payload.deviation_deg,
            lane_index: payload.lane_index.map(|i| i as u64),
            area_fraction: payload.area_fraction,
            cluster_id: payload.cluster_id,
            streak: payload.streak,
        }
    }
}

impl TryFrom<WireEvent> for SafetyEvent {
    type Error = ContractError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let subject = match (wire.subject_track, wire.subject_cluster) {
            (Some(id), None) => Subject::Track(id),
            (None, Some(id)) => Subject::HazardCluster(id),
            _ => {
                return Err(ContractError::Other(
                    "wire event must name exactly one subject".to_string(),
                ))
            }
        };
        let lane_index = wire
            .lane_index
            .map(usize::try_from)
            .transpose()
            .map_err(|e| ContractError::Other(format!("lane index out of range: {}", e)))?;

        Ok(SafetyEvent {
            event_id: Uuid::from_bytes(wire.id),
            event_type: wire.event_type,
            track_id: wire.track_id,
            camera_id: wire.camera_id,
            frame_index: wire.frame_index,
            timestamp: wire.timestamp,
            time_fmt: wire.time_fmt,
            severity: wire.severity,
            dedup_key: DedupKey {
                subject,
                event_type: wire.event_type,
            },
            payload: EventPayload {
                class_label: wire.class_label,
                bbox: wire.bbox,
                confidence: wire.confidence,
                heading_deg: wire.heading_deg,
                expected_heading_deg: wire.expected_heading_deg,
                deviation_deg: wire.deviation_deg,
                lane_index,
                area_fraction: wire.area_fraction,
                cluster_id: wire.cluster_id,
                streak: wire.streak,
            },
        })
    }
}

/// Decode one datagram produced by a `NetworkSink` in the given format
pub fn decode_datagram(format: NetworkFormat, data: &[u8]) -> Result<SafetyEvent, ContractError> {
    match format {
        NetworkFormat::Json => serde_json::from_slice(data)
            .map_err(|e| ContractError::Other(format!("json error: {}", e))),
        NetworkFormat::Bincode => {
            let wire: WireEvent = bincode::deserialize(data)
                .map_err(|e| ContractError::Other(format!("bincode error: {}", e)))?;
            SafetyEvent::try_from(wire)
        }
    }
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: NetworkFormat,
    /// Max datagram size; larger payloads are not sent
    pub max_packet_size: usize,
    /// Forward only these event types (all when `None`)
    pub event_types: Option<Vec<EventType>>,
    /// Forward only events at or above this severity
    pub min_severity: Option<Severity>,
}

impl NetworkSinkConfig {
    pub fn new(addr: SocketAddr, format: NetworkFormat) -> Self {
        Self {
            addr,
            format,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            event_types: None,
            min_severity: None,
        }
    }

    /// Create config from params map
    ///
    /// Recognized keys: `addr` (required), `format` (`json` | `bincode`),
    /// `max_packet_size`, `types` (comma-separated event types) and
    /// `min_severity` (`low` | `medium` | `high`).
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = params
            .get("max_packet_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_PACKET_SIZE);

        let event_types = params
            .get("types")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(parse_event_type)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        if matches!(&event_types, Some(types) if types.is_empty()) {
            return Err("'types' names no event type".to_string());
        }

        let min_severity = params
            .get("min_severity")
            .map(|s| parse_severity(s))
            .transpose()?;

        Ok(Self {
            addr,
            format,
            max_packet_size,
            event_types,
            min_severity,
        })
    }

    /// Whether this sink forwards the event at all
    pub fn accepts(&self, event: &SafetyEvent) -> bool {
        let type_ok = self
            .event_types
            .as_ref()
            .map_or(true, |types| types.contains(&event.event_type));
        let severity_ok = self.min_severity.map_or(true, |min| event.severity >= min);
        type_ok && severity_ok
    }
}

fn parse_event_type(name: &str) -> Result<EventType, String> {
    EventType::ALL
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("unknown event type '{}'", name))
}

fn parse_severity(name: &str) -> Result<Severity, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        other => Err(format!("unknown severity '{}'", other)),
    }
}

/// Sink that forwards events over UDP
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&config.addr).await?;

        debug!(
            sink = %name,
            target = %config.addr,
            format = ?config.format,
            types = ?config.event_types,
            min_severity = ?config.min_severity,
            "NetworkSink connected"
        );

        Ok(Self {
            name,
            config,
            socket: Some(socket),
        })
    }

    /// Create from params (for factory)
    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_write(&name, e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::SinkConnection {
                sink_name: name,
                message: e.to_string(),
            })
    }

    fn encode(&self, event: &SafetyEvent) -> Result<Vec<u8>, ContractError> {
        let data = match self.config.format {
            NetworkFormat::Json => {
                serde_json::to_vec(event).map_err(|e| format!("json error: {}", e))
            }
            NetworkFormat::Bincode => bincode::serialize(&WireEvent::from(event))
                .map_err(|e| format!("bincode error: {}", e)),
        }
        .map_err(|e| ContractError::sink_write(&self.name, e))?;

        if data.len() > self.config.max_packet_size {
            warn!(
                sink = %self.name,
                event_id = %event.event_id,
                size = data.len(),
                max = self.config.max_packet_size,
                "Datagram exceeds max packet size"
            );
            return Err(ContractError::sink_write(&self.name, "payload too large"));
        }
        Ok(data)
    }
}

impl EventSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, event),
        fields(sink = %self.name, event_type = %event.event_type, frame_index = event.frame_index)
    )]
    async fn write(&mut self, event: &SafetyEvent) -> Result<(), ContractError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket not connected"))?;

        if !self.config.accepts(event) {
            debug!(severity = %event.severity, "Filtered out by route");
            return Ok(());
        }

        let data = self.encode(event)?;
        match socket.send(&data).await {
            Ok(sent) => debug!(bytes = sent, "Sent"),
            // best effort; the event stays in the local log
            Err(e) => error!(error = %e, "UDP send failed"),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}
