//! `Synchronizer`: live mirror of every tracked participant.
//!
//! Owns the last-known state per entity, the hidden set, damage timers and
//! marker glide tracks.  Everything is driven from the single event-loop
//! task, so nothing here locks.  Time is always passed in, never read.
//!
//! ## Lifecycle
//!
//! ```text
//! Synchronizer::new ──▶ apply / hide / delete / fire timers ... ──▶ teardown
//! ```
//!
//! After [`Synchronizer::teardown`] timers and glides are cancelled, the
//! roster is empty and further updates are discarded.  Entity states are
//! kept as they were so the final picture stays inspectable.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Serialize, Serializer};

use crate::events::MapEvent;
use crate::motion::MotionTracks;
use crate::types::{has_flag, ClientConfig, EntityRecord, Flag, FlagSet, LatLng, SettingsRecord};

// ---------------------------------------------------------------------------
// Entity state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub id: String,
    /// Falls back to the id when the record carries no name.
    pub display_name: String,
    pub flags: FlagSet,
    pub lat: f64,
    pub lng: f64,
    pub avatar_ref: Option<String>,
    pub hp: Option<f64>,
    pub battery: Option<f64>,
    pub time: Option<String>,
    /// Position before the most recent update.
    pub last_seen_lat: f64,
    pub last_seen_lng: f64,
    pub is_damaged: bool,
    /// Serialised as milliseconds left in the damage window.
    #[serde(rename = "damage_expires_in_ms", serialize_with = "serialize_remaining_ms")]
    pub damage_expires_at: Option<Instant>,
}

fn serialize_remaining_ms<S: Serializer>(at: &Option<Instant>, s: S) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => {
            let left = at.saturating_duration_since(Instant::now());
            s.serialize_some(&u64::try_from(left.as_millis()).unwrap_or(u64::MAX))
        }
        None => s.serialize_none(),
    }
}

impl EntityState {
    fn from_record(rec: EntityRecord) -> Self {
        let display_name = display_name_for(&rec);
        Self {
            display_name,
            flags: rec.flags,
            lat: rec.lat,
            lng: rec.lng,
            avatar_ref: rec.avatar_ref,
            hp: rec.hp,
            battery: rec.battery,
            time: rec.time,
            last_seen_lat: rec.lat,
            last_seen_lng: rec.lng,
            is_damaged: false,
            damage_expires_at: None,
            id: rec.id,
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        has_flag(&self.flags, flag)
    }
}

fn display_name_for(rec: &EntityRecord) -> String {
    match &rec.display_name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => rec.id.clone(),
    }
}

// ---------------------------------------------------------------------------
// Damage timers
// ---------------------------------------------------------------------------

/// One pending expiry per entity.  Arming an id replaces its previous
/// expiry, so a superseded timer can never fire.
#[derive(Debug, Default)]
pub struct DamageTimers {
    deadlines: HashMap<String, Instant>,
}

impl DamageTimers {
    pub fn arm(&mut self, id: &str, at: Instant) {
        self.deadlines.insert(id.to_string(), at);
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        self.deadlines.remove(id).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every id whose expiry is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<(Instant, String)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, id.clone()))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.deadlines.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Synchronizer {
    states: HashMap<String, EntityState>,
    /// Ids in first-seen order.
    order: Vec<String>,
    hidden: HashSet<String>,
    damage: DamageTimers,
    motion: MotionTracks,
    damage_window: Duration,
    boundary: Option<SettingsRecord>,
    torn_down: bool,
}

impl Synchronizer {
    pub fn new(damage_window: Duration, animation: Duration) -> Self {
        Self {
            states: HashMap::new(),
            order: Vec::new(),
            hidden: HashSet::new(),
            damage: DamageTimers::default(),
            motion: MotionTracks::new(animation),
            damage_window,
            boundary: None,
            torn_down: false,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let mut sync = Self::new(config.damage_window(), config.animation_duration());
        sync.hidden.extend(config.hidden_ids.iter().cloned());
        sync
    }

    // -----------------------------------------------------------------------
    // Entity updates
    // -----------------------------------------------------------------------

    /// Reconcile one record into the live view.
    ///
    /// Returns `None` for hidden ids and after teardown.
    pub fn apply_entity_update(&mut self, rec: EntityRecord, now: Instant) -> Option<MapEvent> {
        if self.torn_down {
            debug!("Discarding update for '{}' after teardown", rec.id);
            return None;
        }
        if self.hidden.contains(&rec.id) {
            return None;
        }

        let Some(state) = self.states.get_mut(&rec.id) else {
            let state = EntityState::from_record(rec);
            debug!("Entity '{}' created at {}", state.id, state.position());
            self.order.push(state.id.clone());
            self.states.insert(state.id.clone(), state.clone());
            return Some(MapEvent::Created { state });
        };

        let did_lose_hp = matches!((state.hp, rec.hp), (Some(prev), Some(next)) if next < prev);
        if did_lose_hp {
            state.is_damaged = true;
            state.damage_expires_at = now.checked_add(self.damage_window);
            match state.damage_expires_at {
                Some(expires) => self.damage.arm(&state.id, expires),
                None => {
                    warn!("Damage window {:?} out of range; '{}' stays damaged", self.damage_window, state.id);
                    self.damage.cancel(&state.id);
                }
            }
        } else if state.damage_expires_at.is_some_and(|at| at <= now) {
            // Window ran out but the timer has not been polled yet.
            state.is_damaged = false;
            state.damage_expires_at = None;
            self.damage.cancel(&state.id);
        }

        let settled = state.position();
        let to = LatLng::new(rec.lat, rec.lng);
        state.display_name = display_name_for(&rec);
        state.last_seen_lat = settled.lat;
        state.last_seen_lng = settled.lng;
        state.lat = rec.lat;
        state.lng = rec.lng;
        state.flags = rec.flags;
        state.avatar_ref = rec.avatar_ref;
        state.battery = rec.battery;
        state.hp = rec.hp;
        state.time = rec.time;

        let from = self.motion.start(&state.id, settled, to, now);
        Some(MapEvent::Moved {
            state: state.clone(),
            from,
            to,
            duration_ms: self.motion.duration().as_millis() as u64,
        })
    }

    /// Remove an entity.  Unknown ids are a no-op.
    pub fn delete_entity(&mut self, id: &str) -> Option<MapEvent> {
        self.states.remove(id)?;
        self.order.retain(|o| o != id);
        self.damage.cancel(id);
        self.motion.cancel(id);
        debug!("Entity '{}' deleted", id);
        Some(MapEvent::Deleted { id: id.to_string() })
    }

    /// Hide `id` for the rest of the session and delete it if present.
    pub fn hide(&mut self, id: &str) -> Option<MapEvent> {
        self.hidden.insert(id.to_string());
        self.delete_entity(id)
    }

    pub fn is_hidden(&self, id: &str) -> bool {
        self.hidden.contains(id)
    }

    // -----------------------------------------------------------------------
    // Boundary
    // -----------------------------------------------------------------------

    pub fn set_boundary(&mut self, settings: SettingsRecord) -> MapEvent {
        self.boundary = Some(settings.clone());
        MapEvent::BoundaryUpdated { settings }
    }

    pub fn boundary(&self) -> Option<&SettingsRecord> {
        self.boundary.as_ref()
    }

    // -----------------------------------------------------------------------
    // Timers & glides
    // -----------------------------------------------------------------------

    /// Earliest pending damage expiry, for the driver to sleep until.
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.damage.next_deadline()
    }

    /// Clear every damage flag whose window has elapsed by `now`.
    pub fn fire_damage_timers(&mut self, now: Instant) -> Vec<MapEvent> {
        self.damage
            .take_due(now)
            .into_iter()
            .filter_map(|id| {
                let state = self.states.get_mut(&id)?;
                state.is_damaged = false;
                state.damage_expires_at = None;
                debug!("Damage cleared for '{}'", id);
                Some(MapEvent::DamageCleared { id })
            })
            .collect()
    }

    /// Where the marker for `id` should be drawn at `now`.
    pub fn display_position(&self, id: &str, now: Instant) -> Option<LatLng> {
        let state = self.states.get(id)?;
        Some(
            self.motion
                .position(id, now)
                .unwrap_or_else(|| state.position()),
        )
    }

    /// One renderer frame: interpolated positions of every gliding marker.
    pub fn advance_animations(&mut self, now: Instant) -> Vec<(String, LatLng)> {
        self.motion.advance(now)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&EntityState> {
        self.states.get(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Panel roster: visible, non-eliminated entities in first-seen order.
    ///
    /// The iterator is lazy and cloneable, so callers can walk it again.
    pub fn visible_roster(&self) -> impl Iterator<Item = &EntityState> + Clone + '_ {
        let live = !self.torn_down;
        self.order
            .iter()
            .filter(move |_| live)
            .filter_map(|id| self.states.get(id))
            .filter(|s| !self.hidden.contains(&s.id) && !s.has_flag(Flag::Eliminated))
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Cancel all timers and glides and stop accepting updates.  Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.damage.clear();
        self.motion.clear();
        debug!("Synchronizer torn down with {} entities", self.states.len());
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn pending_timers(&self) -> usize {
        self.damage.len()
    }

    pub fn active_glides(&self) -> usize {
        self.motion.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
