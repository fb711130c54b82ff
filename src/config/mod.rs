//! # Configuration Module
//!
//! This module centralizes the engine constants and the per-table settings
//! surface. Constants are grouped with their interdependencies documented so
//! that growth arithmetic and link-width limits cannot drift apart across
//! the storage and primitive layers.
//!
//! ## Module Organization
//!
//! - [`constants`]: engine defaults and limits
//! - [`settings`]: per-table [`Settings`] with validation

pub mod constants;
pub mod settings;

pub use constants::*;
pub use settings::Settings;
