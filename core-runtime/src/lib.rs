//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every crate in the workspace:
//! - Logging and tracing setup ([`logging`])
//! - Client registration and application configuration ([`config`])
//! - Typed event bus ([`events`])
//!
//! Higher-level crates (`core-auth`, `core-transfer`, `core-service`) depend on
//! this crate for their event types and configuration; it depends only on the
//! bridge traits.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AppConfig, ClientRegistration, CollisionPolicy};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus};
