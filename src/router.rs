//! Message router: dispatches one decoded batch.
//!
//! | Batch item              | Effect                                           |
//! |-------------------------|--------------------------------------------------|
//! | `DISABLE`               | disable session, tear down sync, notice once     |
//! | `HIDE:<id>`             | hide id for the session, delete if present       |
//! | settings                | boundary update; `map_enabled = false` disables  |
//! | entity (hidden id)      | dropped                                          |
//! | entity                  | projected, then applied to the synchronizer      |
//!
//! Records are processed in batch order.  A disable in the middle of a
//! batch stops the rest of that batch.

use std::time::Instant;

use log::{debug, info};

use crate::connection::ConnectionManager;
use crate::events::{DisableReason, MapEvent};
use crate::protocol::{ControlCommand, DecodedBatch, Record, DISABLED_NOTICE};
use crate::sync::Synchronizer;
use crate::types::{EntityRecord, Projection};

#[derive(Debug, Clone, Default)]
pub struct Router {
    projection: Option<Projection>,
}

impl Router {
    /// `projection = None` passes entity coordinates through untouched.
    pub fn new(projection: Option<Projection>) -> Self {
        Self { projection }
    }

    pub fn route(
        &self,
        batch: DecodedBatch,
        sync: &mut Synchronizer,
        conn: &mut ConnectionManager,
        now: Instant,
    ) -> Vec<MapEvent> {
        let mut events = Vec::new();
        if conn.is_disabled() {
            debug!("Session disabled; dropping batch");
            return events;
        }

        match batch {
            DecodedBatch::Control(ControlCommand::Disable) => {
                disable_session(DisableReason::Server, sync, conn, &mut events);
            }
            DecodedBatch::Control(ControlCommand::Hide { id }) => {
                info!("Hiding '{}' for the rest of the session", id);
                events.extend(sync.hide(&id));
            }
            DecodedBatch::Records(records) => {
                for record in records {
                    match record {
                        Record::Settings(settings) => {
                            let enabled = settings.map_enabled;
                            events.push(sync.set_boundary(settings));
                            if !enabled {
                                disable_session(DisableReason::Settings, sync, conn, &mut events);
                                break;
                            }
                        }
                        Record::Entity(rec) => {
                            if sync.is_hidden(&rec.id) {
                                continue;
                            }
                            events.extend(sync.apply_entity_update(self.project(rec), now));
                        }
                    }
                }
            }
        }
        events
    }

    fn project(&self, mut rec: EntityRecord) -> EntityRecord {
        if let Some(p) = &self.projection {
            let at = p.unproject(rec.lat, rec.lng);
            rec.lat = at.lat;
            rec.lng = at.lng;
        }
        rec
    }
}

/// Shared path for every disable trigger: only the first one tears down
/// and produces the notice.
pub fn disable_session(
    reason: DisableReason,
    sync: &mut Synchronizer,
    conn: &mut ConnectionManager,
    events: &mut Vec<MapEvent>,
) {
    if !conn.disable(reason) {
        return;
    }
    sync.teardown();
    events.push(MapEvent::DisableSession {
        reason,
        notice: DISABLED_NOTICE.to_string(),
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
