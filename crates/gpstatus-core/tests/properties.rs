//! Property tests for the row fold and the marks table.

use std::collections::HashMap;

use chrono::Utc;
use gpstatus_core::{FeedEvent, Session, marks_for};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Event {
    row: u64,
    status: String,
    verdict: Option<&'static str>,
    name: Option<String>,
}

fn event_strategy() -> impl Strategy<Value = Event> {
    (
        0u64..6,
        "[A-Za-z]{1,8}",
        prop::option::of(prop::sample::select(vec!["PASS", "FAIL", "INVALID"])),
        prop::option::of("[A-Z][a-z]{0,5}"),
    )
        .prop_map(|(row, status, verdict, name)| Event {
            row,
            status,
            verdict,
            name,
        })
}

fn to_json(ev: &Event) -> String {
    let mut value = serde_json::json!({ "row_id": ev.row, "status": ev.status });
    if let Some(verdict) = ev.verdict {
        value["result"] = serde_json::json!({
            "project": format!("P{}", ev.row),
            "verdict": verdict,
            "reason": "",
            "full_name": ev.name.clone().unwrap_or_default(),
        });
    }
    value.to_string()
}

proptest! {
    #[test]
    fn last_write_wins_per_field(events in prop::collection::vec(event_strategy(), 0..40)) {
        let mut session = Session::new();
        let ticket = session.start("R1", Utc::now()).expect("start");
        session.apply(ticket, FeedEvent::Opened, Utc::now());

        let mut last_status: HashMap<u64, String> = HashMap::new();
        let mut last_verdict: HashMap<u64, &str> = HashMap::new();
        let mut first_name: Option<String> = None;

        for ev in &events {
            session.apply(ticket, FeedEvent::Message(to_json(ev)), Utc::now());
            last_status.insert(ev.row, ev.status.clone());
            if let Some(v) = ev.verdict {
                last_verdict.insert(ev.row, v);
                if first_name.is_none() {
                    first_name = ev.name.clone().filter(|n| !n.is_empty());
                }
            }
        }

        prop_assert_eq!(session.row_count(), last_status.len());
        for row in session.rows() {
            prop_assert_eq!(Some(&row.status), last_status.get(&row.row_index));
            prop_assert_eq!(
                row.verdict().map(|v| v.as_str()),
                last_verdict.get(&row.row_index).copied()
            );
        }
        prop_assert_eq!(session.student_name(), first_name.as_deref());

        let passes = last_verdict.values().filter(|v| **v == "PASS").count();
        prop_assert_eq!(session.grade().pass_count, passes);
        prop_assert!(!session.all_evaluated(), "never final while streaming");
    }

    #[test]
    fn marks_monotone(a in 0usize..64, b in 0usize..64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(marks_for(lo) <= marks_for(hi));
        prop_assert!(marks_for(hi) <= 8);
    }
}
