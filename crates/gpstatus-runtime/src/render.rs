//! Text and JSON rendering of an evaluation session.

use gpstatus_core::grade::MAX_MARKS;
use gpstatus_core::{EndReason, EvaluationRow, FailureKind, GradeSummary, Phase, Session, Verdict};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";

/// Widest a reason cell may grow before it is truncated.
const REASON_MAX_WIDTH: usize = 60;
const PROGRESS_BAR_WIDTH: usize = 24;

/// Resolve --color flag to bool.
pub fn resolve_color(color: &str) -> bool {
    use std::io::IsTerminal;
    match color {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

fn paint(text: &str, code: &str, use_color: bool) -> String {
    if use_color {
        format!("{code}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Right-truncate to `max_len` characters, appending `…` if truncated.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}\u{2026}")
    }
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

fn verdict_color(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Pass => GREEN,
        Verdict::Fail => RED,
        Verdict::Invalid | Verdict::Other(_) => YELLOW,
    }
}

/// Plain cell texts for one row: `#`, project, status, verdict, reason.
fn row_cells(row: &EvaluationRow) -> [String; 5] {
    let result = row.result.as_ref();
    let project = result
        .map(|r| r.project.as_str())
        .filter(|p| !p.is_empty())
        .unwrap_or("-");
    let verdict = row.verdict().map_or("-", Verdict::as_str);
    let reason = result
        .map(|r| r.reason.as_str())
        .filter(|r| !r.is_empty())
        .unwrap_or("-");
    [
        (row.row_index + 1).to_string(),
        project.to_string(),
        row.status.clone(),
        verdict.to_string(),
        truncate(reason, REASON_MAX_WIDTH),
    ]
}

/// Results table, one line per row in row-index order. Empty when no rows.
pub fn format_rows(session: &Session, use_color: bool) -> String {
    let headers = ["#", "Project", "Status", "Verdict", "Reason"];
    let rows: Vec<(&EvaluationRow, [String; 5])> =
        session.rows().map(|r| (r, row_cells(r))).collect();
    if rows.is_empty() {
        return String::new();
    }

    let mut widths = headers.map(|h| h.chars().count());
    for (_, cells) in &rows {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    let header: Vec<String> = headers
        .iter()
        .zip(widths)
        .map(|(h, w)| pad(h, w))
        .collect();
    lines.push(paint(header.join("  ").trim_end(), BOLD, use_color));

    for (row, cells) in &rows {
        let mut out: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(c, w)| pad(c, w))
            .collect();
        if row.is_slow_validation() {
            out[2] = paint(&out[2], YELLOW, use_color);
        }
        if let Some(verdict) = row.verdict() {
            out[3] = paint(&out[3], verdict_color(verdict), use_color);
        }
        if row.result.as_ref().is_some_and(|r| !r.reason.is_empty()) {
            out[4] = paint(&out[4], RED, use_color);
        }
        lines.push(out.join("  ").trim_end().to_string());
    }

    lines.join("\n")
}

pub fn format_failure(kind: FailureKind, use_color: bool) -> String {
    let color = match kind {
        FailureKind::ServiceUnavailable => RED,
        FailureKind::Validation | FailureKind::NotFound => YELLOW,
    };
    paint(kind.message(), color, use_color)
}

/// `[██████░░░░]` scaled to marks out of [`MAX_MARKS`].
pub fn progress_bar(marks: u8) -> String {
    let filled = usize::from(marks.min(MAX_MARKS)) * PROGRESS_BAR_WIDTH / usize::from(MAX_MARKS);
    format!(
        "[{}{}]",
        "\u{2588}".repeat(filled),
        "\u{2591}".repeat(PROGRESS_BAR_WIDTH - filled)
    )
}

pub fn format_summary(summary: &GradeSummary, use_color: bool) -> String {
    let passed = paint(&summary.pass_count.to_string(), GREEN, use_color);
    let failed = paint(&summary.fail_count.to_string(), RED, use_color);
    let marks = paint(&format!("{} / {MAX_MARKS}", summary.marks), BLUE, use_color);
    format!(
        "{}\nTotal Projects Passed: {passed}\nTotal Projects Failed: {failed}\nFinal Marks: {marks}\n{}",
        paint("Final Evaluation Result", BOLD, use_color),
        progress_bar(summary.marks),
    )
}

/// One-line state note, or `None` when the table speaks for itself.
pub fn status_line(session: &Session) -> Option<&'static str> {
    match session.phase() {
        Phase::Streaming { opened: false } => Some("Connecting..."),
        Phase::Streaming { opened: true } => Some("Processing..."),
        Phase::Completed {
            reason: EndReason::ConnectionLost,
        } => Some("Stream ended before the evaluation finished."),
        Phase::Completed {
            reason: EndReason::IdleTimeout,
        } => Some("No update from the service in time; stopped waiting."),
        Phase::Cancelled => Some("Evaluation cancelled."),
        Phase::Idle | Phase::Completed { .. } | Phase::Errored { .. } => None,
    }
}

/// Everything the operator sees for a session: student, failure message,
/// table, state note and, when final, the summary.
pub fn format_session(session: &Session, use_color: bool) -> String {
    let mut blocks = Vec::new();

    if let Some(roll) = session.roll() {
        let mut line = format!("Roll number: {roll}");
        if let Some(name) = session.student_name() {
            line.push_str(&format!("   Student: {}", paint(name, BLUE, use_color)));
        }
        blocks.push(line);
    }

    if let Some(kind) = session.failure() {
        blocks.push(format_failure(kind, use_color));
    }

    let table = format_rows(session, use_color);
    if !table.is_empty() {
        blocks.push(table);
    }

    if let Some(note) = status_line(session) {
        blocks.push(paint(note, DIM, use_color));
    }

    if session.skipped() > 0 {
        blocks.push(paint(
            &format!("{} malformed update(s) skipped", session.skipped()),
            DIM,
            use_color,
        ));
    }

    if let Some(summary) = session.final_summary() {
        blocks.push(format_summary(&summary, use_color));
    }

    blocks.join("\n\n")
}

/// Machine-readable session, schema version 1.
pub fn session_to_json(session: &Session) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = session
        .rows()
        .map(|row| {
            serde_json::json!({
                "row_index": row.row_index,
                "status": row.status,
                "result": row.result,
                "updated_at": row.updated_at,
            })
        })
        .collect();

    serde_json::json!({
        "version": 1,
        "roll_number": session.roll(),
        "student": session.student_name(),
        "phase": session.phase(),
        "error": session.failure().map(FailureKind::message),
        "rows": rows,
        "summary": session.final_summary(),
        "skipped": session.skipped(),
        "started_at": session.started_at(),
    })
}
