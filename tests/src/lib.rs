//! # Andon Relay Test Suite
//!
//! Cross-module scenarios that exercise the relay, the Andon service and the
//! adapters together.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (index lookup, fan-out, encoding)
//! └── src/integration/
//!     ├── support.rs    # Shared fixtures
//!     ├── fanout.rs     # Subscribe / publish / rate limit / batching
//!     ├── escalation.rs # Andon lifecycle and timer escalation
//!     └── health.rs     # Scoring, eviction, counter decay
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p andon-tests
//! cargo test -p andon-tests integration::escalation::
//! cargo bench -p andon-tests
//! ```
//!
//! Timer-driven scenarios run under `#[tokio::test(start_paused = true)]`, so
//! a two-minute escalation takes microseconds of wall time.

#![allow(dead_code)]

pub mod integration;
