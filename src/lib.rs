//! Uli - wake-word voice assistant with an animated pixel-art avatar
//!
//! This library provides the core functionality of the Uli widget:
//! - Widget state machine (status, avatar animation, action gating)
//! - Speech input (microphone capture, segmentation, recognition)
//! - Speech output (synthesis, speaker playback)
//! - Generation backend client
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Console UI                      │
//! │   listen │ stop │ speak │ text │ show │ quit        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ events
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Widget machine                     │
//! │   Idle │ Listening │ Thinking │ Speaking            │
//! └────────────────────┬────────────────────────────────┘
//!                      │ effects
//! ┌────────────────────▼────────────────────────────────┐
//! │   Speech in/out (cpal + HTTP)  │  Backend (HTTP)    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod daemon;
pub mod error;
pub mod speech;
pub mod widget;

pub use backend::{BackendClient, ResponseBackend};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use widget::{AvatarFrame, Effect, Notice, SessionId, Status, WidgetEvent, WidgetMachine};
