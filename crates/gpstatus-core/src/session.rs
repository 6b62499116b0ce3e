//! Evaluation session: the row view plus the stream state machine.
//!
//! ```text
//!            start(ok)                 Done payload
//!   Idle ───────────────▶ Streaming ───────────────▶ Completed(Done)
//!    │                     │  │  │   EOF/transport after open, idle timeout
//!    │ start("")           │  │  └──────────────────▶ Completed(ConnectionLost|IdleTimeout)
//!    ▼                     │  │   error payload
//!   Errored(Validation)    │  └─────────────────────▶ Errored(NotFound)
//!                          │      transport before open
//!                          └────────────────────────▶ Errored(ServiceUnavailable)
//! ```
//!
//! Every event is applied together with the ticket returned by
//! [`Session::start`]. Events from a superseded stream are ignored, so a
//! late chunk from a connection that is being torn down can never write into
//! the rows of the next evaluation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::grade::{self, GradeSummary};
use crate::payload::{self, FeedPayload, RowUpdate};
use crate::types::{EvaluationRow, RollNumber};

// ─── Phase ────────────────────────────────────────────────────────

/// User-visible failure kinds. At most one per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Empty roll number; nothing was sent.
    Validation,
    /// The service reported no records for the roll number.
    NotFound,
    /// The connection never opened.
    ServiceUnavailable,
}

impl FailureKind {
    pub fn message(self) -> &'static str {
        match self {
            Self::Validation => "Please enter a roll number.",
            Self::NotFound => "No records found for this roll number.",
            Self::ServiceUnavailable => "Service is currently unavailable. Please try again later.",
        }
    }
}

/// Why a stream that did open came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Completion payload received.
    Done,
    /// Transport error or EOF after the connection opened.
    ConnectionLost,
    /// No data for the configured idle window.
    IdleTimeout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Streaming {
        opened: bool,
    },
    Completed {
        reason: EndReason,
    },
    Errored {
        kind: FailureKind,
    },
    /// Stopped by the operator.
    Cancelled,
}

impl Phase {
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    pub fn failure(self) -> Option<FailureKind> {
        match self {
            Self::Errored { kind } => Some(kind),
            _ => None,
        }
    }
}

// ─── Events ───────────────────────────────────────────────────────

/// One input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Response headers accepted; the stream is open.
    Opened,
    /// Data of one SSE `message` frame.
    Message(String),
    /// The transport failed (before or after open).
    TransportError(String),
    /// Body ended without a completion payload.
    Ended,
    /// Nothing arrived within the idle window.
    Timeout,
}

/// What the driver must do with the connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    Close,
}

// ─── Session ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Session {
    roll: Option<RollNumber>,
    rows: BTreeMap<u64, EvaluationRow>,
    phase: Phase,
    student_name: Option<String>,
    /// Ticket of the current stream. Bumped by every accepted `start`.
    generation: u64,
    /// SSE message frames applied in this session.
    frames_received: usize,
    /// Frames skipped because their payload was malformed.
    skipped: usize,
    started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roll(&self) -> Option<&RollNumber> {
        self.roll.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.phase.is_streaming()
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.phase.failure()
    }

    pub fn student_name(&self) -> Option<&str> {
        self.student_name.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn frames_received(&self) -> usize {
        self.frames_received
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Rows ordered by row index.
    pub fn rows(&self) -> impl Iterator<Item = &EvaluationRow> {
        self.rows.values()
    }

    pub fn row(&self, row_index: u64) -> Option<&EvaluationRow> {
        self.rows.get(&row_index)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Grade over the current rows. Recomputed on every call.
    pub fn grade(&self) -> GradeSummary {
        GradeSummary::from_rows(self.rows.values())
    }

    pub fn all_evaluated(&self) -> bool {
        grade::all_evaluated(self.rows.values(), self.is_streaming())
    }

    /// The grade, once it is final.
    pub fn final_summary(&self) -> Option<GradeSummary> {
        self.all_evaluated().then(|| self.grade())
    }

    /// Begin a new evaluation and return its ticket.
    ///
    /// An empty roll number is rejected without touching the rows. It only
    /// marks the session as errored when no stream is in flight; an invalid
    /// request never supersedes a running evaluation.
    pub fn start(&mut self, raw_roll: &str, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let roll = match RollNumber::parse(raw_roll) {
            Ok(r) => r,
            Err(e) => {
                if !self.is_streaming() {
                    self.phase = Phase::Errored {
                        kind: FailureKind::Validation,
                    };
                }
                return Err(e);
            }
        };

        if self.is_streaming() {
            info!(
                previous = %self.roll.as_ref().map_or("", RollNumber::as_str),
                next = %roll,
                "superseding in-flight evaluation"
            );
        }

        self.generation += 1;
        self.roll = Some(roll);
        self.rows.clear();
        self.student_name = None;
        self.frames_received = 0;
        self.skipped = 0;
        self.started_at = Some(now);
        self.phase = Phase::Streaming { opened: false };

        Ok(self.generation)
    }

    /// Stop the current stream on operator request.
    pub fn cancel(&mut self, ticket: u64) {
        if ticket == self.generation && self.is_streaming() {
            self.phase = Phase::Cancelled;
        }
    }

    /// Apply one stream event. Events for a stale ticket, or arriving after
    /// the stream ended, leave the session untouched and ask for `Close`.
    pub fn apply(&mut self, ticket: u64, event: FeedEvent, now: DateTime<Utc>) -> Directive {
        let Phase::Streaming { opened } = self.phase else {
            debug!(ticket, "event after stream end ignored");
            return Directive::Close;
        };
        if ticket != self.generation {
            debug!(ticket, current = self.generation, "stale stream event ignored");
            return Directive::Close;
        }

        match event {
            FeedEvent::Opened => {
                self.phase = Phase::Streaming { opened: true };
                Directive::Continue
            }
            FeedEvent::Message(data) => self.apply_message(&data, now),
            FeedEvent::TransportError(detail) => {
                if opened {
                    warn!(%detail, "stream dropped after open");
                    self.end(EndReason::ConnectionLost);
                } else {
                    warn!(%detail, "evaluation service unreachable");
                    self.fail(FailureKind::ServiceUnavailable);
                }
                Directive::Close
            }
            FeedEvent::Ended => {
                if opened {
                    info!("stream ended without completion payload");
                    self.end(EndReason::ConnectionLost);
                } else {
                    self.fail(FailureKind::ServiceUnavailable);
                }
                Directive::Close
            }
            FeedEvent::Timeout => {
                if self.frames_received == 0 {
                    warn!("no data before idle timeout");
                    self.fail(FailureKind::ServiceUnavailable);
                } else {
                    warn!("stream idle timeout");
                    self.end(EndReason::IdleTimeout);
                }
                Directive::Close
            }
        }
    }

    fn apply_message(&mut self, data: &str, now: DateTime<Utc>) -> Directive {
        self.frames_received += 1;

        match payload::classify(data) {
            Ok(FeedPayload::NotFound { message }) => {
                info!(detail = message.as_deref().unwrap_or(""), "no records for roll number");
                self.fail(FailureKind::NotFound);
                Directive::Close
            }
            Ok(FeedPayload::Done) => {
                info!(rows = self.rows.len(), "stream complete");
                self.end(EndReason::Done);
                Directive::Close
            }
            Ok(FeedPayload::Row(update)) => {
                self.upsert(update, now);
                Directive::Continue
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed payload");
                self.skipped += 1;
                Directive::Continue
            }
        }
    }

    fn upsert(&mut self, update: RowUpdate, now: DateTime<Utc>) {
        let RowUpdate {
            row_id,
            status,
            result,
        } = update;

        let row = self
            .rows
            .entry(row_id)
            .or_insert_with(|| EvaluationRow::new(row_id, "", now));
        if let Some(status) = status {
            row.status = status;
        }
        row.updated_at = now;

        let Some(mut result) = result else {
            return;
        };

        // A verdict, once seen, survives a later result that lacks one.
        if result.verdict.is_none() {
            result.verdict = row.verdict().cloned();
        }

        if !result.full_name.is_empty() {
            match &self.student_name {
                None => self.student_name = Some(result.full_name.clone()),
                Some(name) if *name != result.full_name => {
                    warn!(
                        row_id,
                        recorded = %name,
                        received = %result.full_name,
                        "student name differs from first observed, keeping first"
                    );
                }
                Some(_) => {}
            }
        }

        row.result = Some(result);
    }

    fn end(&mut self, reason: EndReason) {
        self.phase = Phase::Completed { reason };
    }

    fn fail(&mut self, kind: FailureKind) {
        self.phase = Phase::Errored { kind };
    }
}
