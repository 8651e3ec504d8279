//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │           NodeTransport          │      EventPublisher      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ HttpNodeTransport │ MemoryCluster                           │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector              │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use paritystore::adapters::{HttpNodeConfig, HttpNodeTransport};
//! use paritystore::domain::ports::{NodeId, NodeTransport};
//!
//! let transport = HttpNodeTransport::new(HttpNodeConfig::default())?;
//! let report = transport.status(&NodeId::new("http://10.0.0.5:8001")).await?;
//! ```

mod event_publisher;
mod http_node;
mod memory;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use http_node::{HttpNodeConfig, HttpNodeTransport};
pub use memory::MemoryCluster;
