//! Grade projection over the row view.
//!
//! Pure and total: any row collection, including an empty one, yields a
//! summary. Nothing here is stored; callers recompute on every render.

use serde::Serialize;

use crate::types::EvaluationRow;

/// Highest mark the table can award.
pub const MAX_MARKS: u8 = 8;

/// `(minimum passes, marks)`, highest threshold first.
pub const MARK_THRESHOLDS: [(usize, u8); 8] = [
    (24, 8),
    (22, 7),
    (18, 6),
    (15, 5),
    (12, 4),
    (10, 3),
    (8, 2),
    (5, 1),
];

/// Marks awarded for a number of passed projects.
#[must_use]
pub fn marks_for(pass_count: usize) -> u8 {
    MARK_THRESHOLDS
        .iter()
        .find(|(min, _)| pass_count >= *min)
        .map_or(0, |(_, marks)| *marks)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeSummary {
    pub total: usize,
    pub pass_count: usize,
    /// Rows not passed, FAIL and INVALID alike.
    pub fail_count: usize,
    pub marks: u8,
}

impl GradeSummary {
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a EvaluationRow>) -> Self {
        let mut total = 0;
        let mut pass_count = 0;
        for row in rows {
            total += 1;
            if row.is_pass() {
                pass_count += 1;
            }
        }
        Self {
            total,
            pass_count,
            fail_count: total - pass_count,
            marks: marks_for(pass_count),
        }
    }
}

/// Whether the final summary may be shown: the stream is over, there is at
/// least one row, and every row carries a verdict.
pub fn all_evaluated<'a>(rows: impl IntoIterator<Item = &'a EvaluationRow>, streaming: bool) -> bool {
    if streaming {
        return false;
    }
    let mut any = false;
    for row in rows {
        if !row.has_verdict() {
            return false;
        }
        any = true;
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EvaluationResult, Verdict};
    use chrono::Utc;

    fn row(idx: u64, verdict: Option<Verdict>) -> EvaluationRow {
        let mut r = EvaluationRow::new(idx, "Completed", Utc::now());
        r.result = Some(EvaluationResult {
            verdict,
            ..EvaluationResult::default()
        });
        r
    }

    #[test]
    fn marks_table_boundaries() {
        let expected = [
            (0, 0),
            (4, 0),
            (5, 1),
            (7, 1),
            (8, 2),
            (10, 3),
            (11, 3),
            (12, 4),
            (15, 5),
            (18, 6),
            (21, 6),
            (22, 7),
            (23, 7),
            (24, 8),
            (40, 8),
        ];
        for (passes, marks) in expected {
            assert_eq!(marks_for(passes), marks, "passes={passes}");
        }
    }

    #[test]
    fn marks_never_exceed_max() {
        assert_eq!(marks_for(usize::MAX), MAX_MARKS);
    }

    #[test]
    fn summary_counts_invalid_as_not_passed() {
        let rows = vec![
            row(0, Some(Verdict::Pass)),
            row(1, Some(Verdict::Fail)),
            row(2, Some(Verdict::Invalid)),
            row(3, None),
        ];
        let s = GradeSummary::from_rows(&rows);
        assert_eq!(s.total, 4);
        assert_eq!(s.pass_count, 1);
        assert_eq!(s.fail_count, 3);
        assert_eq!(s.marks, 0);
    }

    #[test]
    fn empty_rows() {
        let rows: Vec<EvaluationRow> = Vec::new();
        assert_eq!(GradeSummary::from_rows(&rows), GradeSummary::default());
        assert!(!all_evaluated(&rows, false));
    }

    #[test]
    fn all_evaluated_requires_every_verdict() {
        let rows = vec![row(0, Some(Verdict::Pass)), row(1, None)];
        assert!(!all_evaluated(&rows, false));

        let status_only = vec![EvaluationRow::new(0, "Queued", Utc::now())];
        assert!(!all_evaluated(&status_only, false));
    }

    #[test]
    fn all_evaluated_false_while_streaming() {
        let rows = vec![row(0, Some(Verdict::Fail))];
        assert!(all_evaluated(&rows, false));
        assert!(!all_evaluated(&rows, true));
    }
}
