//! NMOS node - IS-04 registration agent with IS-05 connection listings
//!
//! This library provides the node side of NMOS discovery and registration:
//! - Resource model (node, devices, senders, receivers) and wire envelopes
//! - Registry discovery over mDNS/DNS-SD
//! - Ordered publication, heartbeats and deregistration
//! - The node's own read-only HTTP API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Supervisor                        │
//! │   ctrl-c  │  Node API  │  mDNS advert  │  Manager   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Registration Manager                    │
//! │   Discover  →  Publish  →  Heartbeat  →  Deregister │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  NMOS Registry                       │
//! │   registration API  │  query API                    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod query;
pub mod registration;
pub mod resource;
pub mod supervisor;

pub use config::Config;
pub use discovery::{RegistryBrowser, RegistryCandidate, StaticBrowser, TxtRecords};
pub use error::{Error, Result};
pub use registration::{RegistrationManager, RegistrationSettings, RegistrationState};
pub use resource::{Device, Envelope, Node, Receiver, ResourceGraph, ResourceKind, Sender};
pub use supervisor::{Supervisor, SupervisorHandle};
