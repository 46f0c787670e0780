//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (mainly `core-service`). Host applications can depend on
//! `drive-fetch-workspace` and enable the documented features without wiring
//! each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "keyring"))]
pub use core_service::DriveFetchService;
