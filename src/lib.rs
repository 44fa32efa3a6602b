//! Fieldwatch
//!
//! Client core for a live participant map: consumes a stream of
//! brotli-compressed, lightly obfuscated frames and keeps a reconciled view
//! of every tracked participant and the play boundary.
//!
//! ## Architecture
//!
//! ```text
//! Session  (session.rs)              ← socket events, timers, event sink
//!   ├── ConnectionManager  (connection.rs) ← phases, retry schedule, kill-switch
//!   ├── FrameDecoder       (frame.rs)      ← brotli + cipher.rs → DecodedBatch
//!   ├── Router             (router.rs)     ← control / settings / entity dispatch
//!   └── Synchronizer       (sync.rs)       ← entity states, damage timers
//!         └── MotionTracks (motion.rs)     ← marker glides
//! ```
//!
//! Everything below `Session` is synchronous and takes time as a
//! parameter.  The WebSocket driver (`Session::run`) and the
//! `fieldwatch-client` binary require the `transport` feature.

pub mod cipher;
pub mod connection;
pub mod error;
pub mod events;
pub mod frame;
pub mod motion;
pub mod protocol;
pub mod roster;
pub mod router;
pub mod session;
pub mod sync;
pub mod types;

pub use connection::{ConnectionManager, Phase, RetryPolicy};
pub use error::{ClientError, DecodeError};
pub use events::{DisableReason, EventSink, MapEvent};
pub use frame::FrameDecoder;
pub use protocol::{ControlCommand, DecodedBatch, Record};
pub use roster::{panel_entries, PanelEntry};
pub use router::Router;
pub use session::Session;
pub use sync::{EntityState, Synchronizer};
pub use types::{ClientConfig, EntityRecord, LatLng, Projection, SettingsRecord};
