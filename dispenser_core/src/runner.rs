//! Main loop: ticks both channels at the control cadence and persists their
//! remaining volumes at the slower persist cadence.
//!
//! Scheduling is cooperative polling. `poll` compares the clock against each
//! cadence and does whatever is due; `run` repeats `poll`, sleeping briefly
//! between polls that had nothing to do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dispenser_traits::{Clock, Nvm};
use tracing::{info, warn};

use crate::channel::Channel;
use crate::config::TimingCfg;
use crate::persist::{Loaded, PersistedRecord, PersistenceStore};
use crate::ports::Indicator;
use crate::util::is_due;

/// What a single `poll` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    pub ticked: bool,
    pub saved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSummary {
    pub remaining_l: f64,
    pub open: bool,
}

/// Totals from `Dispenser::run`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub saves: u64,
    pub elapsed: Duration,
    pub left: ChannelSummary,
    pub right: ChannelSummary,
}

pub struct Dispenser<Ch, N, C> {
    left: Ch,
    right: Ch,
    store: PersistenceStore<N>,
    timing: TimingCfg,
    clock: C,
    last_control: Option<Instant>,
    last_persist: Option<Instant>,
    /// Last record known to be on storage.
    last_saved: Option<PersistedRecord>,
    started: bool,
}

impl<Ch, N, C> Dispenser<Ch, N, C>
where
    Ch: Channel,
    N: Nvm,
    C: Clock,
{
    pub fn new(left: Ch, right: Ch, store: PersistenceStore<N>, timing: TimingCfg, clock: C) -> Self {
        Self {
            left,
            right,
            store,
            timing,
            clock,
            last_control: None,
            last_persist: None,
            last_saved: None,
            started: false,
        }
    }

    /// Restore persisted volumes with the indicators showing busy, then
    /// switch them to closed. The first control tick and persist check
    /// happen one period after this.
    pub fn start(&mut self) -> Loaded {
        self.left.indicate(Indicator::Busy);
        self.right.indicate(Indicator::Busy);

        let loaded = self.store.load();
        self.left.restore_remaining(loaded.record.left_l);
        self.right.restore_remaining(loaded.record.right_l);
        if !loaded.used_default() {
            self.last_saved = Some(loaded.record);
        }

        self.left.indicate(Indicator::Closed);
        self.right.indicate(Indicator::Closed);

        let now = self.clock.now();
        self.last_control = Some(now);
        self.last_persist = Some(now);
        self.started = true;
        info!(
            left_l = loaded.record.left_l,
            right_l = loaded.record.right_l,
            "dispenser started"
        );
        loaded
    }

    /// Run whatever is due right now. Starts the dispenser first if needed,
    /// so the stored record is restored before anything can overwrite it.
    pub fn poll(&mut self) -> PollOutcome {
        if !self.started {
            self.start();
        }
        let now = self.clock.now();
        let mut out = PollOutcome::default();
        if is_due(now, self.last_control, self.timing.control_period) {
            self.left.tick(now);
            self.right.tick(now);
            self.last_control = Some(now);
            out.ticked = true;
        }
        if is_due(now, self.last_persist, self.timing.persist_period) {
            self.last_persist = Some(now);
            out.saved = self.flush();
        }
        out
    }

    /// Save both volumes if they differ from what storage already holds.
    /// Returns `true` when a write happened. A failed write is logged and
    /// retried at the next persist period.
    pub fn flush(&mut self) -> bool {
        let record = self.snapshot();
        if self.last_saved == Some(record) {
            return false;
        }
        match self.store.save(record) {
            Ok(()) => {
                self.last_saved = Some(record);
                true
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "saving state failed; will retry");
                false
            }
        }
    }

    /// Poll until `shutdown` is raised or `max_ticks` control cycles have
    /// run, then shut down. Starts the dispenser first if needed.
    pub fn run(&mut self, shutdown: &AtomicBool, max_ticks: Option<u64>) -> RunSummary {
        if !self.started {
            self.start();
        }
        let began = self.clock.now();
        let (mut ticks, mut saves) = (0u64, 0u64);
        while !shutdown.load(Ordering::Relaxed) && max_ticks.is_none_or(|max| ticks < max) {
            let out = self.poll();
            ticks += u64::from(out.ticked);
            saves += u64::from(out.saved);
            if !out.ticked {
                self.clock.sleep(self.timing.idle_sleep);
            }
        }
        if self.shutdown() {
            saves += 1;
        }
        let summary = RunSummary {
            ticks,
            saves,
            elapsed: self.clock.since(began),
            left: summarize(&self.left),
            right: summarize(&self.right),
        };
        info!(ticks, saves, "dispenser stopped");
        summary
    }

    /// Final save, then close both valves and show the safe indicator.
    /// Returns `true` if the final save wrote.
    pub fn shutdown(&mut self) -> bool {
        let saved = self.flush();
        self.left.shutdown();
        self.right.shutdown();
        saved
    }

    /// Current remaining volumes as a record.
    #[allow(clippy::cast_possible_truncation)]
    pub fn snapshot(&self) -> PersistedRecord {
        PersistedRecord::new(self.left.remaining() as f32, self.right.remaining() as f32)
    }

    pub fn left(&self) -> &Ch {
        &self.left
    }

    pub fn right(&self) -> &Ch {
        &self.right
    }

    pub fn store(&self) -> &PersistenceStore<N> {
        &self.store
    }
}

fn summarize<Ch: Channel>(ch: &Ch) -> ChannelSummary {
    ChannelSummary {
        remaining_l: ch.remaining(),
        open: ch.is_open(),
    }
}
