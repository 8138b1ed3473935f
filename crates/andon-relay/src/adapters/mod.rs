//! Adapters for the relay's outbound ports.
//!
//! In-process implementations; a deployment with a database or a message
//! broker swaps these for its own.

pub mod channel_transport;
pub mod line_directory;
pub mod memory_store;
pub mod notifier;

pub use channel_transport::ChannelTransport;
pub use line_directory::StaticLineDirectory;
pub use memory_store::InMemoryAlarmStore;
pub use notifier::TracingNotifier;
