//! # Adapters Layer
//!
//! Concrete implementations of the ports.
//!
//! - `config` - static and TOML (`network` feature) configuration providers
//! - `time` - wall-clock time source
//! - `scheduler` - tokio timers and background tasks
//! - `cache` - bootstrap cache stores
//! - `transport` - in-memory, no-op and UDP (`network` feature) transports

pub mod cache;
pub mod config;
pub mod scheduler;
pub mod time;
pub mod transport;

pub use cache::{InMemoryCacheStore, NoOpCacheStore};
pub use config::{ConfigError, StaticConfigProvider};
#[cfg(feature = "network")]
pub use config::TomlConfigProvider;
pub use scheduler::TokioScheduler;
pub use time::SystemTimeSource;
pub use transport::{MemoryNetwork, MemoryTransport, NoOpTransport};
#[cfg(feature = "network")]
pub use transport::UdpTransport;
