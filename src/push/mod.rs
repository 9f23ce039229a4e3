//! Push channel manager: one live SSE subscription per client instance,
//! typed event dispatch, and bounded exponential reconnect.
//!
//! State machine:
//!
//! ```text
//! Disconnected → Connecting → Connected
//!                    ↑             │ error / stream end
//!                    │             ▼
//!                    └── Reconnecting (attempt n, delay base·2^(n-1))
//! ```
//!
//! After `max_attempts` consecutive failures the channel stays
//! `Disconnected` for the rest of the session and the refresh scheduler is
//! the only consistency mechanism left.

pub mod sse;

use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::api::{ApiClient, Reply};
use crate::config::Timings;
use crate::sync::timers::TimerSlot;
use crate::sync::{SyncMsg, SyncSender};

use self::sse::{Inbound, SseParser, decode};

/// Connection state of the push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

impl PushState {
    pub fn label(&self) -> String {
        match self {
            PushState::Disconnected => "offline".to_string(),
            PushState::Connecting => "connecting".to_string(),
            PushState::Connected => "live".to_string(),
            PushState::Reconnecting { attempt } => format!("retry #{attempt}"),
        }
    }
}

/// What a subscription task reports back to the loop.
#[derive(Debug)]
pub enum PushSignal {
    Opened,
    Event(Inbound),
    /// A frame that could not be decoded; logged and dropped.
    Ignored(String),
    Failed(String),
    Unauthorized,
}

/// Reconnect delay policy: `base · 2^(attempt-1)` for attempts `1..=max_attempts`.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Backoff { base, max_attempts }
    }

    pub fn from_timings(timings: &Timings) -> Self {
        Backoff::new(
            Duration::from_millis(timings.reconnect_base_delay_ms),
            timings.reconnect_max_attempts,
        )
    }

    /// Delay before `attempt` (1-based), or `None` once the ceiling is passed.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1)?;
        self.base.checked_mul(factor)
    }
}

/// Result of feeding a failure into the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    Retry { attempt: u32, delay: Duration },
    GaveUp,
    /// The failure came from a subscription that was already replaced.
    Stale,
}

pub struct PushChannel {
    state: PushState,
    backoff: Backoff,
    attempts: u32,
    generation: u64,
    subscription: Option<AbortHandle>,
    retry: TimerSlot,
}

impl PushChannel {
    pub fn new(backoff: Backoff) -> Self {
        PushChannel {
            state: PushState::Disconnected,
            backoff,
            attempts: 0,
            generation: 0,
            subscription: None,
            retry: TimerSlot::default(),
        }
    }

    pub fn state(&self) -> PushState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == PushState::Connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Open a fresh subscription, tearing down any existing one first.
    pub fn connect(&mut self, api: &ApiClient, rt: &Handle, tx: &SyncSender) {
        self.close();
        self.generation += 1;
        self.state = PushState::Connecting;

        let generation = self.generation;
        let api = api.clone();
        let tx = tx.clone();
        let task = rt.spawn(async move {
            run_subscription(api, generation, tx).await;
        });
        self.subscription = Some(task.abort_handle());
    }

    /// Whether a signal belongs to the live subscription.
    pub fn accepts(&self, generation: u64) -> bool {
        self.subscription.is_some() && generation == self.generation
    }

    pub fn on_opened(&mut self, generation: u64) -> bool {
        if !self.accepts(generation) {
            return false;
        }
        self.state = PushState::Connected;
        self.attempts = 0;
        true
    }

    /// Close the failed subscription and decide whether to try again.
    pub fn on_failure(&mut self, generation: u64) -> FailureOutcome {
        if !self.accepts(generation) {
            return FailureOutcome::Stale;
        }
        self.close();
        self.next_attempt()
    }

    fn next_attempt(&mut self) -> FailureOutcome {
        match self.backoff.delay(self.attempts + 1) {
            Some(delay) => {
                self.attempts += 1;
                self.state = PushState::Reconnecting {
                    attempt: self.attempts,
                };
                FailureOutcome::Retry {
                    attempt: self.attempts,
                    delay,
                }
            }
            None => {
                self.state = PushState::Disconnected;
                FailureOutcome::GaveUp
            }
        }
    }

    /// Arm the reconnect timer for a [`FailureOutcome::Retry`].
    pub fn schedule_retry(&mut self, delay: Duration, rt: &Handle, tx: &SyncSender) {
        self.retry.arm(rt, delay, tx, |generation| SyncMsg::PushRetryDue {
            generation,
        });
    }

    /// Accept a fired reconnect timer. The caller then calls [`Self::connect`].
    pub fn on_retry_due(&mut self, generation: u64) -> bool {
        self.retry.fire(generation) && matches!(self.state, PushState::Reconnecting { .. })
    }

    /// Stop everything; used when the session expires or the client exits.
    pub fn shutdown(&mut self) {
        self.close();
        self.retry.cancel();
        self.state = PushState::Disconnected;
    }

    fn close(&mut self) {
        if let Some(handle) = self.subscription.take() {
            handle.abort();
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of one subscription: open, stream frames, report how it ended.
async fn run_subscription(api: ApiClient, generation: u64, tx: SyncSender) {
    let send = |signal: PushSignal| {
        let _ = tx.send(SyncMsg::Push { generation, signal });
    };

    let response = match api.subscribe().await {
        Ok(Reply::Body(response)) => response,
        Ok(Reply::Unauthorized) => return send(PushSignal::Unauthorized),
        Ok(Reply::Unusable(reason)) => return send(PushSignal::Failed(reason)),
        Err(err) => return send(PushSignal::Failed(format!("{err:#}"))),
    };
    send(PushSignal::Opened);

    let mut parser = SseParser::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => return send(PushSignal::Failed(format!("push stream read failed: {err}"))),
        };
        let frames = match parser.feed(&chunk) {
            Ok(frames) => frames,
            Err(err) => return send(PushSignal::Failed(format!("{err:#}"))),
        };
        for frame in frames {
            match decode(&frame) {
                Ok(Some(inbound)) => send(PushSignal::Event(inbound)),
                Ok(None) => {}
                Err(err) => send(PushSignal::Ignored(format!("{err:#}"))),
            }
        }
    }
    if let Some(frame) = parser.finish() {
        match decode(&frame) {
            Ok(Some(inbound)) => send(PushSignal::Event(inbound)),
            Ok(None) => {}
            Err(err) => send(PushSignal::Ignored(format!("{err:#}"))),
        }
    }
    send(PushSignal::Failed("push stream closed by server".to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_backoff() -> Backoff {
        Backoff::from_timings(&Timings::default())
    }

    #[test]
    fn backoff_doubles_from_base_and_stops_at_ceiling() {
        let backoff = default_backoff();
        let delays: Vec<u64> = (1..=11)
            .map_while(|attempt| backoff.delay(attempt))
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![3000, 6000, 12000, 24000, 48000, 96000, 192000, 384000, 768000, 1536000]
        );
        assert_eq!(backoff.delay(0), None);
        assert_eq!(backoff.delay(11), None);
    }

    #[test]
    fn consecutive_failures_walk_the_series_then_give_up() {
        let mut channel = PushChannel::new(default_backoff());
        let mut seen = Vec::new();
        loop {
            match channel.next_attempt() {
                FailureOutcome::Retry { attempt, delay } => {
                    assert_eq!(channel.state(), PushState::Reconnecting { attempt });
                    seen.push(delay.as_millis() as u64);
                }
                FailureOutcome::GaveUp => break,
                FailureOutcome::Stale => unreachable!(),
            }
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(&seen[..4], &[3000, 6000, 12000, 24000]);
        assert_eq!(channel.state(), PushState::Disconnected);
        assert_eq!(channel.next_attempt(), FailureOutcome::GaveUp);
    }

    #[test]
    fn signals_from_replaced_subscriptions_are_stale() {
        let mut channel = PushChannel::new(default_backoff());
        assert_eq!(channel.on_failure(0), FailureOutcome::Stale);
        assert!(!channel.on_opened(0));
        assert_eq!(channel.state(), PushState::Disconnected);
    }
}
