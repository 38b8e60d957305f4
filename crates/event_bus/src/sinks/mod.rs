//! Sink implementations
//!
//! `LogSink` and `DashboardFeed` are called inline by the bus; `FileSink` and
//! `NetworkSink` do I/O and run behind a `SinkHandle`.

mod dashboard;
mod file;
mod log;
mod network;

pub use self::dashboard::{DashboardFeed, DashboardSnapshot};
pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{decode_datagram, NetworkFormat, NetworkSink, NetworkSinkConfig, WireEvent};
