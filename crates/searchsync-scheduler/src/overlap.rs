//! Keeps cron ticks from piling up.
//!
//! A queue pass can outlast the cron interval when a large job is draining.
//! The guard lets the next tick notice that and step aside.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What a tick does when the previous one is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Skip the tick
    #[default]
    Skip,
    /// Run alongside the previous tick
    Concurrent,
}

/// Running flag shared by all ticks of one cron job.
#[derive(Debug)]
pub struct OverlapGuard {
    is_running: Arc<AtomicBool>,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            is_running: Arc::new(AtomicBool::new(false)),
            policy,
        }
    }

    /// `None` when the tick should be skipped.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        match self.policy {
            OverlapPolicy::Skip => self
                .is_running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .ok()
                .map(|_| RunGuard {
                    flag: Arc::clone(&self.is_running),
                }),
            // Concurrent ticks never touch the shared flag
            OverlapPolicy::Concurrent => Some(RunGuard {
                flag: Arc::new(AtomicBool::new(true)),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// Clears the running flag on drop, panics included.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
