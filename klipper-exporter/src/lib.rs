//! Prometheus exporter for Klipper printers, scraped through Moonraker.
//!
//! Each probe request names a Moonraker `target` and the `modules` to
//! collect. The exporter queries the matching Moonraker endpoints, maps the
//! replies to samples and returns them in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────────┐     ┌─────────────────┐
//! │ HTTP server │────>│  SnapshotCollector  │────>│    Moonraker    │
//! │  (/probe)   │<────│ (modules, discovery)│<────│   (REST API)    │
//! └─────────────┘     └─────────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! klipper-exporter --config config.json5
//! curl 'http://localhost:9101/probe?target=printer:7125&modules=printer_objects'
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod mapping;
pub mod module;
pub mod moonraker;
pub mod objects;
pub mod render;
pub mod snapshot;

pub use collector::{SharedCollector, SnapshotCollector};
pub use config::ExporterConfig;
pub use http::{HttpServer, ProbeSettings};
pub use module::{Module, ModuleSet};
pub use moonraker::MoonrakerClient;
