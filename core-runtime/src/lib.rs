//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the decode engine:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge injection
//! - Event bus system
//!
//! ## Overview
//!
//! The runtime owns everything that is not specific to a single decode
//! operation: which host bridges are in use, where scratch files go, how
//! logs leave the process, and how progress reaches subscribers.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{ConversionEvent, CoreEvent, EventBus, EventStream, SourceEvent};
