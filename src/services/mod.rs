//! Service layer
//!
//! Everything between the HTTP handlers and the transcoder processes lives
//! here. The web layer only ever talks to [`StreamSupervisor`] and
//! [`AuthStore`]; the rest are building blocks the supervisor owns.
//!
//! # Pieces
//!
//! - [`telemetry_parser`]: `key=value` progress lines to telemetry updates
//! - [`ffmpeg_command_builder`]: transcoder argv for one source
//! - [`process_handle`]: spawn, wait and the SIGTERM-then-kill protocol
//! - [`session`] and [`session_registry`]: per-device state and the keyed map
//! - [`supervisor`]: start/stop orchestration and the per-session loops
//! - [`idle_reaper`]: periodic reclamation of idle sessions and stale tokens
//! - [`bridge_client`]: outbound calls to the bridge API

pub mod auth_store;
pub mod bridge_client;
pub mod ffmpeg_command_builder;
pub mod idle_reaper;
pub mod process_handle;
pub mod session;
pub mod session_events;
pub mod session_registry;
pub mod supervisor;
pub mod telemetry_parser;

pub use auth_store::AuthStore;
pub use bridge_client::{BridgeApiClient, DisabledReporter, StatusReporter};
pub use ffmpeg_command_builder::{FFmpegCommandBuilder, SourceDescriptor};
pub use idle_reaper::{IdleReaper, SweepReport};
pub use process_handle::{ExitOutcome, ProcessHandle};
pub use session::Session;
pub use session_events::SessionEvents;
pub use session_registry::{SessionLookup, SessionRegistry};
pub use supervisor::{StartedStream, StreamSupervisor};
