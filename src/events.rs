//! Events delivered from the synchronizer to the rendering collaborator.
//!
//! The renderer (map markers, side panel, boundary circle, notice screen)
//! lives outside this crate and sees nothing but this stream.

use serde::Serialize;

use crate::sync::EntityState;
use crate::types::{LatLng, SettingsRecord};

/// Why the session was permanently disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    /// Literal `DISABLE` frame.
    Server,
    /// Settings record with the map switched off.
    Settings,
    /// Reconnect attempts used up.
    ExhaustedRetries,
}

impl std::fmt::Display for DisableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DisableReason::Server => "DISABLED_BY_SERVER",
            DisableReason::Settings => "DISABLED_BY_SERVER_SETTINGS",
            DisableReason::ExhaustedRetries => "FAILED",
        })
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MapEvent {
    /// First sighting of an entity.
    Created { state: EntityState },

    /// Known entity updated.  The renderer glides the marker from `from` to
    /// `to` over `duration_ms`, restarting any glide still in flight.
    Moved {
        state: EntityState,
        from: LatLng,
        to: LatLng,
        duration_ms: u64,
    },

    /// Entity removed; drop its marker and panel entry.
    Deleted { id: String },

    /// Damage window elapsed without a further hp loss.
    DamageCleared { id: String },

    /// New authoritative play boundary.
    BoundaryUpdated { settings: SettingsRecord },

    /// Session is over; show the fixed notice.  Emitted at most once.
    DisableSession { reason: DisableReason, notice: String },
}

/// Receiver of [`MapEvent`]s.
pub trait EventSink {
    fn emit(&mut self, event: MapEvent);
}

impl EventSink for Vec<MapEvent> {
    fn emit(&mut self, event: MapEvent) {
        self.push(event);
    }
}
