//! Refresh scheduler: decides when a full-state reload runs.
//!
//! Reloads are requested on start, when the terminal becomes visible or
//! regains focus, after the push channel reconnects, on demand, and on a
//! periodic tick. The periodic tick only reloads while the push channel is
//! down. At most one reload is in flight; extra triggers coalesce into it.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::{SyncMsg, SyncSender};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshTrigger {
    Initial,
    Visible,
    Focus,
    Periodic,
    Reconnected,
    Manual,
}

impl RefreshTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshTrigger::Initial => "initial load",
            RefreshTrigger::Visible => "became visible",
            RefreshTrigger::Focus => "focus regained",
            RefreshTrigger::Periodic => "periodic fallback",
            RefreshTrigger::Reconnected => "push reconnected",
            RefreshTrigger::Manual => "manual",
        }
    }
}

pub struct RefreshScheduler {
    period: Duration,
    in_flight: bool,
    visible: bool,
    stopped: bool,
    ticker: Option<AbortHandle>,
}

impl RefreshScheduler {
    pub fn new(period: Duration) -> Self {
        RefreshScheduler {
            period,
            in_flight: false,
            visible: true,
            stopped: false,
            ticker: None,
        }
    }

    /// Start the periodic tick. The first tick lands one period from now.
    pub fn start(&mut self, rt: &Handle, tx: &SyncSender) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.stopped = false;
        let period = self.period;
        let tx = tx.clone();
        let task = rt.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(SyncMsg::RefreshTick).is_err() {
                    break;
                }
            }
        });
        self.ticker = Some(task.abort_handle());
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// Claim the reload slot for `trigger`, or refuse it.
    pub fn should_reload(&mut self, trigger: RefreshTrigger, push_connected: bool) -> bool {
        if self.stopped || self.in_flight {
            return false;
        }
        if trigger == RefreshTrigger::Periodic && push_connected {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finished(&mut self) {
        self.in_flight = false;
    }

    /// Record visibility; returns `true` on a hidden → visible transition.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        let became_visible = visible && !self.visible;
        self.visible = visible;
        became_visible
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
