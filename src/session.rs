//! `Session`: wires decoder, router, synchronizer and connection manager
//! together and feeds the resulting events to an [`EventSink`].
//!
//! The `handle_*` methods are the whole behaviour and never touch a
//! socket, so they can be driven directly.  [`Session::run`] (behind the
//! `transport` feature) is the thin WebSocket loop on top:
//!
//! ```text
//! connect ──▶ handle_open ──▶ [frame ▶ handle_frame | timer ▶ fire_timers]* ──▶ handle_close
//!    ▲                                                                             │
//!    └──────────────────────────── sleep(retry delay) ◀─────────────────────────────┘
//! ```
//!
//! Damage timers are raced against every await in that loop, the connect
//! attempt and the retry sleep included.

use std::time::{Duration, Instant};

use log::debug;

use crate::connection::{CloseAction, ConnectionManager, Jitter, RandomJitter, RetryPolicy};
use crate::events::{DisableReason, EventSink, MapEvent};
use crate::frame::{DecoderStats, FrameDecoder};
use crate::protocol::DISABLED_NOTICE;
use crate::router::{disable_session, Router};
use crate::sync::Synchronizer;
use crate::types::ClientConfig;

pub struct Session<S: EventSink, J: Jitter = RandomJitter> {
    config: ClientConfig,
    conn: ConnectionManager,
    jitter: J,
    decoder: FrameDecoder,
    router: Router,
    sync: Synchronizer,
    sink: S,
}

impl<S: EventSink> Session<S> {
    pub fn new(config: ClientConfig, sink: S) -> Self {
        let jitter = RandomJitter::new(config.jitter_min..=config.jitter_max);
        Self::with_jitter(config, sink, jitter)
    }
}

impl<S: EventSink, J: Jitter> Session<S, J> {
    pub fn with_jitter(config: ClientConfig, sink: S, jitter: J) -> Self {
        Self {
            conn: ConnectionManager::new(RetryPolicy::from_config(&config)),
            jitter,
            decoder: FrameDecoder::new(),
            router: Router::new(config.projection),
            sync: Synchronizer::from_config(&config),
            sink,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    // -----------------------------------------------------------------------
    // Socket events
    // -----------------------------------------------------------------------

    pub fn handle_open(&mut self) -> bool {
        self.conn.on_open()
    }

    /// Decode, route and emit one binary frame.  Frames arriving outside
    /// the `Open` phase are dropped undecoded.
    pub fn handle_frame(&mut self, frame: &[u8], now: Instant) {
        if !self.conn.accepts_frames() {
            debug!("Dropping {}-byte frame in phase {:?}", frame.len(), self.conn.phase());
            return;
        }
        let batch = self.decoder.decode(frame);
        let events = self.router.route(batch, &mut self.sync, &mut self.conn, now);
        self.emit_all(events);
    }

    /// Socket closed or connect failed.  Returns the delay before the next
    /// attempt, or `None` when the session is over.
    pub fn handle_close(&mut self) -> Option<Duration> {
        match self.conn.on_close(&mut self.jitter) {
            CloseAction::Retry { delay, .. } => Some(delay),
            CloseAction::Disabled { first } => {
                if first {
                    self.sync.teardown();
                    self.sink.emit(MapEvent::DisableSession {
                        reason: DisableReason::ExhaustedRetries,
                        notice: DISABLED_NOTICE.to_string(),
                    });
                }
                None
            }
            CloseAction::Ignored => None,
        }
    }

    /// Retry delay elapsed.  Returns true if a reconnect should start.
    pub fn handle_retry_elapsed(&mut self) -> bool {
        self.conn.retry_elapsed()
    }

    /// Disable from outside the frame stream (operator shutdown).
    pub fn disable(&mut self, reason: DisableReason) {
        let mut events = Vec::new();
        disable_session(reason, &mut self.sync, &mut self.conn, &mut events);
        self.emit_all(events);
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    pub fn next_deadline(&self) -> Option<Instant> {
        self.sync.next_timer_deadline()
    }

    pub fn fire_timers(&mut self, now: Instant) {
        let events = self.sync.fire_damage_timers(now);
        self.emit_all(events);
    }

    fn emit_all(&mut self, events: Vec<MapEvent>) {
        for event in events {
            self.sink.emit(event);
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket driver
// ---------------------------------------------------------------------------

#[cfg(feature = "transport")]
impl<S: EventSink, J: Jitter> Session<S, J> {
    /// Connect and keep the session alive until it is disabled.
    ///
    /// Damage timers keep firing in every phase: while connecting, while
    /// the socket is open and while a retry is pending.
    pub async fn run(&mut self) {
        use tracing::Instrument;

        while !self.conn.is_disabled() {
            let span = tracing::info_span!("connection", attempt = self.conn.retry_count());
            self.connect_once().instrument(span).await;
            if self.conn.is_disabled() {
                break;
            }

            match self.handle_close() {
                Some(delay) => {
                    self.wait_firing_timers(delay).await;
                    self.handle_retry_elapsed();
                }
                None => break,
            }
        }
    }

    /// One socket lifetime: connect, pump frames and timers until the
    /// socket ends or the session is disabled.
    async fn connect_once(&mut self) {
        use futures::StreamExt;
        use tokio_tungstenite::{connect_async, tungstenite::Message};

        let endpoint = self.config.endpoint.clone();
        let connect = connect_async(endpoint.as_str());
        tokio::pin!(connect);
        let result = loop {
            tokio::select! {
                result = &mut connect => break result,
                at = sleep_until(self.sync.next_timer_deadline()) => self.fire_timers(at),
            }
        };
        let mut ws = match result {
            Ok((ws, _)) => ws,
            Err(e) => {
                log::warn!("Connect to {} failed: {}", endpoint, e);
                return;
            }
        };
        self.handle_open();

        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Binary(data))) => self.handle_frame(&data, Instant::now()),
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("Server closed connection: {:?}", frame);
                        return;
                    }
                    Some(Ok(other)) => debug!("Ignoring non-binary message ({} bytes)", other.len()),
                    Some(Err(e)) => {
                        log::warn!("WebSocket error: {}", e);
                        return;
                    }
                    None => return,
                },
                at = sleep_until(self.sync.next_timer_deadline()) => self.fire_timers(at),
            }
            if self.conn.is_disabled() {
                if let Err(e) = ws.close(None).await {
                    debug!("Close after disable failed: {}", e);
                }
                return;
            }
        }
    }

    /// Sleep for `delay`, firing damage timers that fall due meanwhile.
    async fn wait_firing_timers(&mut self, delay: Duration) {
        let until = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(until) => return,
                at = sleep_until(self.sync.next_timer_deadline()) => self.fire_timers(at),
            }
        }
    }
}

/// Resolves at `deadline` (never, for `None`) and yields the time to fire
/// timers at.
#[cfg(feature = "transport")]
async fn sleep_until(deadline: Option<Instant>) -> Instant {
    match deadline {
        Some(at) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
            Instant::now().max(at)
        }
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Phase;
    use crate::frame::{brotli_compress, encode_payload};
    use serde_json::json;

    struct Fixed(u64);

    impl Jitter for Fixed {
        fn next_jitter(&mut self) -> u64 {
            self.0
        }
    }

    fn session() -> Session<Vec<MapEvent>, Fixed> {
        let config = ClientConfig {
            projection: None,
            ..Default::default()
        };
        Session::with_jitter(config, Vec::new(), Fixed(1))
    }

    fn frame(text: &str) -> Vec<u8> {
        brotli_compress(text.as_bytes()).unwrap()
    }

    #[test]
    fn frames_before_open_are_dropped() {
        let mut s = session();
        s.handle_frame(&frame("DISABLE"), Instant::now());
        assert!(s.sink().is_empty());
        assert_eq!(s.decoder_stats().decoded, 0);
        assert!(!s.connection().is_disabled());
    }

    #[test]
    fn frame_flows_through_to_sink() {
        let mut s = session();
        s.handle_open();
        let payload = encode_payload(&[vec![json!("alice"), json!("Alice"), json!([1]), json!(1.0), json!(2.0)]]);
        s.handle_frame(&frame(&payload), Instant::now());
        assert!(matches!(&s.sink()[0], MapEvent::Created { state } if state.display_name == "Alice"));
    }

    #[test]
    fn corrupt_frame_is_counted_not_fatal() {
        let mut s = session();
        s.handle_open();
        s.handle_frame(b"garbage", Instant::now());
        assert_eq!(s.decoder_stats().dropped, 1);
        assert_eq!(s.connection().phase(), Phase::Open);
        assert!(s.sink().is_empty());
    }

    #[test]
    fn exhausted_retries_emit_notice_once() {
        let mut s = session();
        for _ in 0..5 {
            assert!(s.handle_close().is_some());
            assert!(s.handle_retry_elapsed());
        }
        assert_eq!(s.handle_close(), None);
        assert_eq!(s.handle_close(), None);

        let notices: Vec<_> = s
            .sink()
            .iter()
            .filter(|e| matches!(e, MapEvent::DisableSession { .. }))
            .collect();
        assert_eq!(notices.len(), 1);
        assert!(s.sync().is_torn_down());
    }

    #[test]
    fn timers_fire_through_session() {
        let t0 = Instant::now();
        let mut s = session();
        s.handle_open();
        let first = encode_payload(&[vec![json!("a"), json!(0), json!([]), json!(0.0), json!(0.0), json!(0), json!(50), json!(3)]]);
        let second = encode_payload(&[vec![json!("a"), json!(0), json!([]), json!(0.0), json!(0.0), json!(0), json!(50), json!(2)]]);
        s.handle_frame(&frame(&first), t0);
        s.handle_frame(&frame(&second), t0);

        let deadline = s.next_deadline().unwrap();
        assert_eq!(deadline, t0 + Duration::from_secs(10));
        s.fire_timers(deadline);
        assert_eq!(s.sink().last(), Some(&MapEvent::DamageCleared { id: "a".into() }));
    }

    #[test]
    fn inverted_jitter_config_still_retries() {
        let config = ClientConfig {
            jitter_min: 10,
            jitter_max: 1,
            ..Default::default()
        };
        let mut s = Session::new(config, Vec::new());
        let delay = s.handle_close().unwrap();
        assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(10));
    }

    #[test]
    fn operator_disable_is_idempotent() {
        let mut s = session();
        s.handle_open();
        s.disable(DisableReason::Server);
        s.disable(DisableReason::Server);
        assert_eq!(s.into_sink().len(), 1);
    }
}
