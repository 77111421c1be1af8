//! Sage Gateway - Directive interception for voice assistants
//!
//! Model replies carry two payloads: prose to be spoken and bracketed
//! directives to be executed against a smart-home backend. This library
//! separates them:
//! - Directive extraction over several tolerant grammars
//! - Capability checks against a static allow-list
//! - Fire-and-forget service calls to Home Assistant
//! - Sanitized text for speech synthesis
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Model output stream                  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ chunks
//! ┌────────────────────▼────────────────────────────────┐
//! │               Interception Node                      │
//! │   Buffer  │  Extract  │  Authorize  │  Sanitize      │
//! └──────────┬─────────────────────────┬────────────────┘
//!            │ cleaned text            │ detached tasks
//! ┌──────────▼──────────┐   ┌──────────▼────────────────┐
//! │   Speech pipeline   │   │   Home Assistant REST API  │
//! └─────────────────────┘   └───────────────────────────┘
//! ```

pub mod capabilities;
pub mod config;
pub mod directive;
pub mod dispatch;
pub mod error;
pub mod intercept;
pub mod sanitize;

pub use capabilities::Capabilities;
pub use config::Config;
pub use directive::{Directive, DirectiveExtractor, Grammar, ParamValue, parse_params};
pub use dispatch::{Dispatcher, HomeAssistantClient, ServiceCaller};
pub use error::{Error, Result};
pub use intercept::{InterceptionNode, NodeState, TurnOutcome};
pub use sanitize::Sanitizer;
