//! Marker glide tracks.
//!
//! Display-only state: a track interpolates between the position a marker
//! was showing and its new target.  Nothing here ever feeds back into
//! [`EntityState`](crate::sync::EntityState).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::LatLng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTrack {
    pub from: LatLng,
    pub to: LatLng,
    pub started_at: Instant,
    pub duration: Duration,
}

impl MotionTrack {
    /// Fraction of the glide completed at `now`, in `[0, 1]`.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn position_at(&self, now: Instant) -> LatLng {
        self.from.lerp(self.to, self.progress(now))
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// Tracks keyed by entity id.  Starting a track for an id cancels the one
/// already in flight; the new glide begins wherever the old one had got to.
#[derive(Debug, Default)]
pub struct MotionTracks {
    tracks: HashMap<String, MotionTrack>,
    duration: Duration,
}

impl MotionTracks {
    pub fn new(duration: Duration) -> Self {
        Self {
            tracks: HashMap::new(),
            duration,
        }
    }

    /// Start (or restart) a glide for `id` towards `to`.
    ///
    /// `settled` is where the marker rests when no glide is in flight.
    /// Returns the track's starting point.
    pub fn start(&mut self, id: &str, settled: LatLng, to: LatLng, now: Instant) -> LatLng {
        let from = self.position(id, now).unwrap_or(settled);
        self.tracks.insert(
            id.to_string(),
            MotionTrack {
                from,
                to,
                started_at: now,
                duration: self.duration,
            },
        );
        from
    }

    /// Interpolated position of an in-flight glide.
    pub fn position(&self, id: &str, now: Instant) -> Option<LatLng> {
        self.tracks.get(id).map(|t| t.position_at(now))
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        self.tracks.remove(id).is_some()
    }

    /// Sample every track at `now` and drop the ones that have arrived.
    /// Finished tracks are reported one last time at their target.
    pub fn advance(&mut self, now: Instant) -> Vec<(String, LatLng)> {
        let mut frame: Vec<(String, LatLng)> = self
            .tracks
            .iter()
            .map(|(id, t)| (id.clone(), t.position_at(now)))
            .collect();
        frame.sort_by(|a, b| a.0.cmp(&b.0));
        self.tracks.retain(|_, t| !t.is_finished(now));
        frame
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const GLIDE: Duration = Duration::from_secs(4);

    fn close(a: LatLng, b: LatLng) -> bool {
        (a.lat - b.lat).abs() < 1e-9 && (a.lng - b.lng).abs() < 1e-9
    }

    #[test]
    fn glide_interpolates_linearly() {
        let t0 = Instant::now();
        let mut m = MotionTracks::new(GLIDE);
        let from = m.start("a", LatLng::new(0.0, 0.0), LatLng::new(4.0, 8.0), t0);
        assert!(close(from, LatLng::new(0.0, 0.0)));

        let mid = m.position("a", t0 + Duration::from_secs(1)).unwrap();
        assert!(close(mid, LatLng::new(1.0, 2.0)));

        let end = m.position("a", t0 + Duration::from_secs(10)).unwrap();
        assert!(close(end, LatLng::new(4.0, 8.0)));
    }

    #[test]
    fn restart_begins_from_interpolated_position() {
        let t0 = Instant::now();
        let mut m = MotionTracks::new(GLIDE);
        m.start("a", LatLng::new(0.0, 0.0), LatLng::new(4.0, 0.0), t0);

        let t1 = t0 + Duration::from_secs(2);
        let from = m.start("a", LatLng::new(4.0, 0.0), LatLng::new(4.0, 4.0), t1);
        assert!(close(from, LatLng::new(2.0, 0.0)));
        assert_eq!(m.len(), 1);

        // Full duration again from the restart point.
        let half = m.position("a", t1 + Duration::from_secs(2)).unwrap();
        assert!(close(half, LatLng::new(3.0, 2.0)));
    }

    #[test]
    fn advance_reports_and_drops_finished_tracks() {
        let t0 = Instant::now();
        let mut m = MotionTracks::new(GLIDE);
        m.start("a", LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0), t0);
        m.start("b", LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0), t0 + Duration::from_secs(3));

        let frame = m.advance(t0 + Duration::from_secs(5));
        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].0, "a");
        assert!(close(frame[0].1, LatLng::new(1.0, 1.0)));
        assert_eq!(m.len(), 1);
        assert!(m.position("a", t0).is_none());
    }

    #[test]
    fn cancel_drops_track() {
        let t0 = Instant::now();
        let mut m = MotionTracks::new(GLIDE);
        m.start("a", LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0), t0);
        assert!(m.cancel("a"));
        assert!(!m.cancel("a"));
        assert!(m.is_empty());
    }

    #[test]
    fn zero_duration_snaps() {
        let t0 = Instant::now();
        let track = MotionTrack {
            from: LatLng::new(0.0, 0.0),
            to: LatLng::new(5.0, 5.0),
            started_at: t0,
            duration: Duration::ZERO,
        };
        assert!(track.is_finished(t0));
        assert!(close(track.position_at(t0), LatLng::new(5.0, 5.0)));
    }
}
