//! Mirroring engine: routing, configuration and per-event orchestration.
//!
//! The engine is transport-agnostic. A deployment supplies a
//! [`client::MessagingClient`] wrapping its platform session, builds a
//! [`routing::RoutingTable`] (usually via [`config`]), picks a
//! `relay_index` backend, and feeds inbound events to the
//! [`processor::EventProcessor`].

pub mod client;
pub mod config;
pub mod processor;
pub mod routing;

pub use client::{AlbumItem, ClientError, ClientResult, MessagingClient};
pub use config::{build_routing_table, load_config, parse_config, FilterSpec, RelayConfig};
pub use processor::{EventProcessor, GENERAL_TOPIC_ID};
pub use routing::{Direction, RoutingTable, SendMode};
