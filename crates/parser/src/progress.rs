//! Weighted multi-stage progress reporting
//!
//! A parse walks a fixed list of [`Stage`]s whose weights sum to 100.
//! Overall progress is the weight of every completed stage plus the current
//! stage's weight scaled by its own percentage.
//!
//! Observers subscribe before `parse()` is called. Intermediate
//! [`ProgressEvent::Progress`] updates are rate-limited; stage boundaries,
//! errors and the final completion event are always delivered.

use apicat_common::ParserError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Validate,
    ResolveExternal,
    Dereference,
    DetectCycles,
    ExtractEndpoints,
    ExtractSchemas,
    Hash,
    Finalize,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 9] = [
        Stage::Ingest,
        Stage::Validate,
        Stage::ResolveExternal,
        Stage::Dereference,
        Stage::DetectCycles,
        Stage::ExtractEndpoints,
        Stage::ExtractSchemas,
        Stage::Hash,
        Stage::Finalize,
    ];

    /// Share of overall progress
    pub fn weight(self) -> u32 {
        match self {
            Stage::Ingest => 10,
            Stage::Validate => 5,
            Stage::ResolveExternal => 25,
            Stage::Dereference => 15,
            Stage::DetectCycles => 10,
            Stage::ExtractEndpoints => 20,
            Stage::ExtractSchemas => 8,
            Stage::Hash => 5,
            Stage::Finalize => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Validate => "validate",
            Stage::ResolveExternal => "resolve_external",
            Stage::Dereference => "dereference",
            Stage::DetectCycles => "detect_cycles",
            Stage::ExtractEndpoints => "extract_endpoints",
            Stage::ExtractSchemas => "extract_schemas",
            Stage::Hash => "hash",
            Stage::Finalize => "finalize",
        }
    }

    pub fn total_weight() -> u32 {
        Stage::ALL.iter().map(|s| s.weight()).sum()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Notification delivered to observers
///
/// Percentages are in `0.0..=100.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStart {
        stage: Stage,
        overall: f64,
    },
    Progress {
        stage: Stage,
        stage_percent: f64,
        overall: f64,
    },
    StageComplete {
        stage: Stage,
        overall: f64,
    },
    Error {
        stage: Stage,
        error: ParserError,
    },
    Complete {
        overall: f64,
    },
}

/// Receives progress notifications
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: UnboundedSender<ProgressEvent>,
}

impl ProgressObserver for ChannelObserver {
    fn on_event(&self, event: &ProgressEvent) {
        // a dropped receiver just means nobody is listening any more
        let _ = self.sender.send(event.clone());
    }
}

/// Observer/receiver pair backed by an unbounded channel
pub fn channel() -> (ChannelObserver, UnboundedReceiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelObserver { sender }, receiver)
}

/// Tracks one parse run and fans events out to observers
pub struct ProgressTracker {
    observers: Vec<Arc<dyn ProgressObserver>>,
    min_interval: Duration,
    completed_weight: u32,
    current: Option<(Stage, f64)>,
    last_update: Option<Instant>,
    report_errors: bool,
}

impl ProgressTracker {
    pub fn new(observers: Vec<Arc<dyn ProgressObserver>>, min_interval: Duration) -> Self {
        Self {
            observers,
            min_interval,
            completed_weight: 0,
            current: None,
            last_update: None,
            report_errors: true,
        }
    }

    /// Stop delivering [`ProgressEvent::Error`] notifications
    pub fn without_errors(mut self) -> Self {
        self.report_errors = false;
        self
    }

    pub fn overall(&self) -> f64 {
        let current = self
            .current
            .map(|(stage, percent)| stage.weight() as f64 * percent / 100.0)
            .unwrap_or(0.0);
        let total = Stage::total_weight() as f64;
        ((self.completed_weight as f64 + current) / total * 100.0).min(100.0)
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.current.map(|(stage, _)| stage)
    }

    pub fn start(&mut self, stage: Stage) {
        self.current = Some((stage, 0.0));
        self.emit(ProgressEvent::StageStart {
            stage,
            overall: self.overall(),
        });
    }

    /// Report the current stage's own percentage (rate-limited)
    pub fn update(&mut self, percent: f64) {
        let Some((stage, _)) = self.current else {
            return;
        };
        let percent = percent.clamp(0.0, 100.0);
        self.current = Some((stage, percent));

        let now = Instant::now();
        if let Some(last) = self.last_update {
            if now.duration_since(last) < self.min_interval {
                return;
            }
        }
        self.last_update = Some(now);
        self.emit(ProgressEvent::Progress {
            stage,
            stage_percent: percent,
            overall: self.overall(),
        });
    }

    /// Close the current stage at 100%
    pub fn complete_stage(&mut self) {
        let Some((stage, _)) = self.current.take() else {
            return;
        };
        self.completed_weight += stage.weight();
        self.emit(ProgressEvent::StageComplete {
            stage,
            overall: self.overall(),
        });
    }

    /// Report a failure in the current stage
    pub fn error(&mut self, error: &ParserError) {
        if !self.report_errors {
            return;
        }
        let stage = self.current_stage().unwrap_or(Stage::Finalize);
        self.emit(ProgressEvent::Error {
            stage,
            error: error.clone(),
        });
    }

    /// Emit the final 100% event
    pub fn finish(&mut self) {
        self.current = None;
        self.completed_weight = Stage::total_weight();
        self.emit(ProgressEvent::Complete { overall: 100.0 });
    }

    fn emit(&self, event: ProgressEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}
