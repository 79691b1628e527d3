//! Core domain + application logic for the Surprise Selfie relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the image
//! generation API live behind ports (traits) implemented in adapter crates.

pub mod archive;
pub mod compositor;
pub mod config;
pub mod domain;
pub mod errors;
pub mod generation;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod relay;

pub use errors::{Error, Result};
