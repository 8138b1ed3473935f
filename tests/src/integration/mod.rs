//! Integration scenarios.

pub mod escalation;
pub mod fanout;
pub mod health;
pub mod support;
