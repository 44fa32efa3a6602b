//! Connection lifecycle state machine.
//!
//! Pure state: no sockets, no clocks.  The session driver reports socket
//! events and executes the returned [`CloseAction`]; randomness comes in
//! through [`Jitter`] so retry delays are reproducible in tests.
//!
//! ```text
//!              open                 close (retries left)
//! ┌────────────┐ ──▶ ┌──────┐ ───────────────────────────▶ ┌──────────────┐
//! │ Connecting │     │ Open │                              │ RetryPending │
//! └────────────┘ ◀───┴──────┴───── delay elapsed ───────── └──────────────┘
//!       │   close (retries left) ──────────────────────────────▲
//!       │
//!       └─ any phase ── disable trigger / close with no retries left ──▶ Disabled (terminal)
//! ```
//!
//! Retry delay is linear with jitter: `base * (retry_count + jitter)`, with
//! `jitter` drawn from `jitter_min..=jitter_max` per attempt.  `retry_count`
//! is read for the delay, then incremented.  It is never reset by a
//! successful reconnect, so the ceiling bounds the whole session.

use std::ops::RangeInclusive;
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::events::DisableReason;
use crate::types::ClientConfig;

// ---------------------------------------------------------------------------
// Jitter
// ---------------------------------------------------------------------------

pub trait Jitter {
    /// Next jitter value, in retry units.
    fn next_jitter(&mut self) -> u64;
}

/// OS-seeded uniform jitter.  An inverted range is reordered.
#[derive(Debug)]
pub struct RandomJitter {
    rng: StdRng,
    range: RangeInclusive<u64>,
}

impl RandomJitter {
    pub fn new(range: RangeInclusive<u64>) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            range: ordered(range),
        }
    }

    pub fn seeded(range: RangeInclusive<u64>, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            range: ordered(range),
        }
    }
}

fn ordered(range: RangeInclusive<u64>) -> RangeInclusive<u64> {
    let (lo, hi) = range.into_inner();
    if lo > hi {
        warn!("Jitter range {}..={} is inverted; using {}..={}", lo, hi, hi, lo);
        hi..=lo
    } else {
        lo..=hi
    }
}

impl Jitter for RandomJitter {
    fn next_jitter(&mut self) -> u64 {
        self.rng.random_range(self.range.clone())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connecting,
    Open,
    RetryPending,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: config.retry_base(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: Duration::from_millis(1000),
        }
    }
}

/// What the driver must do after a socket close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Sleep `delay`, then call [`ConnectionManager::retry_elapsed`] and reconnect.
    Retry { delay: Duration, attempt: u32 },
    /// Retries exhausted.  `first` is true only for the transition itself.
    Disabled { first: bool },
    /// Close arrived in a phase where it means nothing (already disabled,
    /// or a duplicate close while a retry is pending).
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ConnectionManager {
    phase: Phase,
    retry_count: u32,
    policy: RetryPolicy,
    disabled_by: Option<DisableReason>,
}

impl ConnectionManager {
    /// Starts in `Connecting`: the first connect attempt is already under way.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            phase: Phase::Connecting,
            retry_count: 0,
            policy,
            disabled_by: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn disabled_by(&self) -> Option<DisableReason> {
        self.disabled_by
    }

    pub fn is_disabled(&self) -> bool {
        self.phase == Phase::Disabled
    }

    /// Frames are only decoded while the socket is open.
    pub fn accepts_frames(&self) -> bool {
        self.phase == Phase::Open
    }

    /// Socket established.  Returns false if the open is stale.
    pub fn on_open(&mut self) -> bool {
        if self.phase != Phase::Connecting {
            debug!("Ignoring socket open in phase {:?}", self.phase);
            return false;
        }
        info!("Connection open (retry_count={})", self.retry_count);
        self.phase = Phase::Open;
        true
    }

    /// Socket closed, or a connect attempt failed.
    pub fn on_close(&mut self, jitter: &mut impl Jitter) -> CloseAction {
        match self.phase {
            Phase::Disabled | Phase::RetryPending => return CloseAction::Ignored,
            Phase::Connecting | Phase::Open => {}
        }

        if self.retry_count >= self.policy.max_retries {
            warn!(
                "Connection closed with {} retries used – giving up",
                self.retry_count
            );
            let first = self.disable(DisableReason::ExhaustedRetries);
            return CloseAction::Disabled { first };
        }

        let units = u32::try_from(jitter.next_jitter())
            .unwrap_or(u32::MAX)
            .saturating_add(self.retry_count);
        let delay = self.policy.base.saturating_mul(units);
        self.retry_count += 1;
        self.phase = Phase::RetryPending;
        info!(
            "Connection closed – retry {}/{} in {:?}",
            self.retry_count, self.policy.max_retries, delay
        );
        CloseAction::Retry {
            delay,
            attempt: self.retry_count,
        }
    }

    /// Retry delay elapsed.  Returns true if a new connect should start.
    pub fn retry_elapsed(&mut self) -> bool {
        if self.phase != Phase::RetryPending {
            return false;
        }
        self.phase = Phase::Connecting;
        true
    }

    /// Enter `Disabled`.  Returns true only on the first call; every later
    /// trigger is a no-op, so the notice is presented exactly once.
    pub fn disable(&mut self, reason: DisableReason) -> bool {
        if self.phase == Phase::Disabled {
            debug!("Already disabled; ignoring {}", reason);
            return false;
        }
        info!("Session disabled: {}", reason);
        self.phase = Phase::Disabled;
        self.disabled_by = Some(reason);
        true
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
