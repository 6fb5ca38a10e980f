//! Live multi-language subtitle relay.
//!
//! One speaker streams audio for an activity; viewers subscribed to a
//! target language receive translated subtitles in near-real time. The
//! crate is organized into:
//!
//! - `speech`: streaming speech recognition adapters (remote + mock)
//! - `translate`: text translation adapters (HTTP + mock)
//! - `pipeline`: per-activity session turning audio into subtitles
//! - `broadcast`: language-aware fan-out to viewer connections
//! - `access`: speaker tokens, viewer invite codes, viewer entry
//! - `activity`: the activity read-model the core consumes
//! - `ws` / `server`: WebSocket endpoints and the HTTP surface
//! - `config`: environment-derived configuration
//!
//! All hot-path queues are bounded and non-blocking: when a consumer
//! falls behind, events are dropped and logged rather than letting one
//! slow party stall the rest of the system.

pub mod access;
pub mod activity;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod speech;
pub mod subtitle;
pub mod translate;
pub mod ws;

pub use access::{AccessService, MemoryAccessStore};
pub use activity::{Activity, ActivityStatus, MemoryActivityStore};
pub use broadcast::SubtitleBroadcaster;
pub use config::Config;
pub use error::{AccessError, PipelineError};
pub use pipeline::TranslationPipeline;
pub use subtitle::{Subtitle, SubtitleForViewer};
