//! Core map types shared across all modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Linear interpolation towards `to`; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, to: LatLng, t: f64) -> LatLng {
        let t = t.clamp(0.0, 1.0);
        LatLng {
            lat: self.lat + (to.lat - self.lat) * t,
            lng: self.lng + (to.lng - self.lng) * t,
        }
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Maps the integer offsets carried by entity records back to absolute
/// coordinates.
///
/// Entity positions travel as `(absolute - epoch) * divisor`, so a record
/// value `raw` becomes `(raw + epoch * divisor) / divisor`.  Settings
/// coordinates are already absolute and are never projected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    pub epoch_lat: f64,
    pub epoch_lng: f64,
    pub divisor: f64,
}

impl Projection {
    pub fn unproject(&self, lat: f64, lng: f64) -> LatLng {
        LatLng {
            lat: (lat + self.epoch_lat * self.divisor) / self.divisor,
            lng: (lng + self.epoch_lng * self.divisor) / self.divisor,
        }
    }

    /// Inverse of [`Projection::unproject`]; used to build wire fixtures.
    pub fn project(&self, at: LatLng) -> (f64, f64) {
        (
            at.lat * self.divisor - self.epoch_lat * self.divisor,
            at.lng * self.divisor - self.epoch_lng * self.divisor,
        )
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            epoch_lat: 28.482948,
            epoch_lng: -97.768871,
            divisor: 6_000_000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Participant flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    Contestant,
    Hunter,
    HiddenFromMap,
    Eliminated,
    InGulagCurrently,
    OutOfGulag,
}

impl Flag {
    /// Wire id carried in a record's flag array.
    pub fn id(self) -> i64 {
        match self {
            Flag::Contestant => 1,
            Flag::Hunter => 2,
            Flag::HiddenFromMap => 3,
            Flag::Eliminated => 4,
            Flag::InGulagCurrently => 5,
            Flag::OutOfGulag => 6,
        }
    }
}

/// Raw flag ids as received.  Unknown ids are kept so nothing is lost.
pub type FlagSet = BTreeSet<i64>;

pub fn has_flag(flags: &FlagSet, flag: Flag) -> bool {
    flags.contains(&flag.id())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// The authoritative play-boundary circle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsRecord {
    pub map_enabled: bool,
    pub circle_paused: bool,
    pub radius_meters: f64,
    pub center_lat: f64,
    pub center_lng: f64,
}

/// One tracked participant at a point in time, as decoded from the wire.
///
/// `lat`/`lng` are still in wire units here; the router applies the
/// configured [`Projection`] before the record reaches the synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub id: String,
    pub display_name: Option<String>,
    pub flags: FlagSet,
    pub lat: f64,
    pub lng: f64,
    pub avatar_ref: Option<String>,
    pub battery: Option<f64>,
    pub hp: Option<f64>,
    pub time: Option<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Upper bound for every configured interval (one day).
pub const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint streaming compressed frames.
    pub endpoint: String,
    /// Reconnect attempts before the session is abandoned.
    pub max_retries: u32,
    /// Retry delay unit; delay is `base * (retry_count + jitter)`.
    pub retry_base_ms: u64,
    /// Inclusive jitter bounds, in retry units.
    pub jitter_min: u64,
    pub jitter_max: u64,
    /// How long an entity stays flagged after losing hp.
    pub damage_window_ms: u64,
    /// Marker glide duration between consecutive positions.
    pub animation_ms: u64,
    /// Ids hidden from the very start of the session.
    pub hidden_ids: Vec<String>,
    /// `None` treats entity coordinates as absolute.
    pub projection: Option<Projection>,
}

impl ClientConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ClientError;

        if self.endpoint.is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".into()));
        }
        if self.jitter_min > self.jitter_max {
            return Err(ClientError::Config(format!(
                "jitter_min ({}) exceeds jitter_max ({})",
                self.jitter_min, self.jitter_max
            )));
        }
        for (name, ms) in [
            ("damage_window_ms", self.damage_window_ms),
            ("animation_ms", self.animation_ms),
            ("retry_base_ms", self.retry_base_ms),
        ] {
            if ms > MAX_INTERVAL_MS {
                return Err(ClientError::Config(format!(
                    "{} ({}) exceeds {} ms",
                    name, ms, MAX_INTERVAL_MS
                )));
            }
        }
        if let Some(p) = &self.projection {
            if p.divisor == 0.0 || !p.divisor.is_finite() {
                return Err(ClientError::Config(format!(
                    "projection divisor must be finite and non-zero, got {}",
                    p.divisor
                )));
            }
        }
        Ok(())
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn damage_window(&self) -> Duration {
        Duration::from_millis(self.damage_window_ms)
    }

    pub fn animation_duration(&self) -> Duration {
        Duration::from_millis(self.animation_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://ws.iceposeidon.com/ws".into(),
            max_retries: 5,
            retry_base_ms: 1000,
            jitter_min: 1,
            jitter_max: 10,
            damage_window_ms: 10_000,
            animation_ms: 4_000,
            hidden_ids: Vec::new(),
            projection: Some(Projection::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn oversized_intervals_are_rejected() {
        let damage = ClientConfig {
            damage_window_ms: u64::MAX,
            ..Default::default()
        };
        assert!(damage.validate().is_err());

        let glide = ClientConfig {
            animation_ms: MAX_INTERVAL_MS + 1,
            ..Default::default()
        };
        assert!(glide.validate().is_err());

        let edge = ClientConfig {
            damage_window_ms: MAX_INTERVAL_MS,
            ..Default::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn inverted_jitter_is_rejected() {
        let cfg = ClientConfig {
            jitter_min: 9,
            jitter_max: 2,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn projection_round_trips() {
        let p = Projection::default();
        let at = LatLng::new(28.51, -97.7);
        let (lat, lng) = p.project(at);
        let back = p.unproject(lat, lng);
        assert!((back.lat - at.lat).abs() < 1e-9);
        assert!((back.lng - at.lng).abs() < 1e-9);
    }
}
