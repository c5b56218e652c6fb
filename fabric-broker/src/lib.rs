//! Typed wrapper over the shared key-value broker.
//!
//! Every other crate in this workspace talks to the broker only through [`BrokerClient`]; this
//! crate owns the trait, its error classification, its metrics, and the in-memory default
//! backend used in tests and single-node deployments.
pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;

pub use client::BrokerClient;
pub use client::SortedSetEntry;
pub use error::BrokerError;
pub use error::Result;
pub use memory::MemoryBroker;
pub use metrics::register_metrics;
