//! Availability tracking for the backing store.
//!
//! ```text
//!   Disabled                 (no store configured, terminal)
//!
//!   Connecting ──ok──> Ready
//!       │                │
//!       └──conn error────┴──> Failed ──begin_reconnect──> Connecting
//! ```
//!
//! `begin_reconnect` is only used when a reconnect policy is configured;
//! otherwise `Failed` lasts for the lifetime of the cache.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Availability of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AvailabilityState {
    Disabled = 0,
    Connecting = 1,
    Ready = 2,
    Failed = 3,
}

impl AvailabilityState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AvailabilityState::Disabled,
            1 => AvailabilityState::Connecting,
            2 => AvailabilityState::Ready,
            _ => AvailabilityState::Failed,
        }
    }
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityState::Disabled => write!(f, "disabled"),
            AvailabilityState::Connecting => write!(f, "connecting"),
            AvailabilityState::Ready => write!(f, "ready"),
            AvailabilityState::Failed => write!(f, "failed"),
        }
    }
}

/// Tracks whether the backing store is currently usable.
///
/// Lock-free; shared by every clone of a [`Cache`](crate::Cache).
#[derive(Debug)]
pub struct AvailabilityMonitor {
    state: AtomicU8,
}

impl AvailabilityMonitor {
    /// Monitor for a cache with no store configured. Never leaves `Disabled`.
    pub fn disabled() -> Self {
        info!("Cache disabled: no backing store configured");
        Self {
            state: AtomicU8::new(AvailabilityState::Disabled as u8),
        }
    }

    /// Monitor for a cache about to perform its connection handshake.
    pub fn connecting() -> Self {
        info!("Cache connecting to backing store");
        Self {
            state: AtomicU8::new(AvailabilityState::Connecting as u8),
        }
    }

    pub fn state(&self) -> AvailabilityState {
        AvailabilityState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True only when the store is `Ready`.
    pub fn is_available(&self) -> bool {
        self.state() == AvailabilityState::Ready
    }

    /// `Connecting -> Ready`. Returns whether the transition happened.
    pub fn mark_ready(&self) -> bool {
        let moved = self.transition(AvailabilityState::Connecting, AvailabilityState::Ready);
        if moved {
            info!("✓ Cache backing store ready");
        }
        moved
    }

    /// `Connecting | Ready -> Failed`. Returns whether this call performed the
    /// transition, so exactly one caller observes the failure.
    pub fn mark_failed(&self, reason: &str) -> bool {
        let moved = self.transition(AvailabilityState::Ready, AvailabilityState::Failed)
            || self.transition(AvailabilityState::Connecting, AvailabilityState::Failed);
        if moved {
            error!("✗ Cache backing store failed, caching disabled: {}", reason);
        }
        moved
    }

    /// `Failed -> Connecting`, used by the background reconnect loop.
    pub fn begin_reconnect(&self) -> bool {
        let moved = self.transition(AvailabilityState::Failed, AvailabilityState::Connecting);
        if moved {
            info!("Cache reconnecting to backing store");
        }
        moved
    }

    fn transition(&self, from: AvailabilityState, to: AvailabilityState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
