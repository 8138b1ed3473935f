//! Hexagonal ports.

pub mod inbound;
pub mod outbound;

pub use inbound::{AndonApi, FanoutApi};
pub use outbound::{
    AlarmStore, LineDirectory, StoreError, TransitionNotifier, TransitionRecord, Transport,
    TransportError,
};
