//! One-shot start/stop guard.

use std::sync::atomic::{AtomicU8, Ordering};

/// Pool lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PoolState {
    Created = 0,
    Running = 1,
    Stopped = 2,
}

impl PoolState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PoolState::Created,
            1 => PoolState::Running,
            _ => PoolState::Stopped,
        }
    }
}

/// Atomic `Created -> Running -> Stopped` state.
///
/// Each transition succeeds for exactly one caller; everyone else gets `false`.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(PoolState::Created as u8))
    }

    pub(crate) fn state(&self) -> PoolState {
        PoolState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Created -> Running`. False if already started or stopped.
    pub(crate) fn begin_start(&self) -> bool {
        self.0
            .compare_exchange(
                PoolState::Created as u8,
                PoolState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Created | Running -> Stopped`. False if already stopped.
    ///
    /// Stopping a pool that never started is allowed; it can't be started afterwards.
    pub(crate) fn begin_stop(&self) -> bool {
        self.0.swap(PoolState::Stopped as u8, Ordering::AcqRel) != PoolState::Stopped as u8
    }
}
