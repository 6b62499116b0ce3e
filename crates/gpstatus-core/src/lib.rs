//! gpstatus-core: stream ingestion and grade projection for the guided
//! project evaluation feed.
//!
//! Pure library. Bytes from the evaluation service go in through
//! [`sse::SseDecoder`], frames are classified by [`payload::classify`], and
//! [`session::Session`] folds them into an ordered row view. The grade is a
//! projection over that view, see [`grade`].

pub mod error;
pub mod grade;
pub mod payload;
pub mod session;
pub mod sse;
pub mod types;

pub use error::CoreError;
pub use grade::{GradeSummary, all_evaluated, marks_for};
pub use payload::{FeedPayload, RowUpdate, classify};
pub use session::{Directive, EndReason, FailureKind, FeedEvent, Phase, Session};
pub use sse::{SseDecoder, SseFrame};
pub use types::{EvaluationResult, EvaluationRow, RollNumber, Verdict};
