//! `gpstatus eval`: evaluate one roll number and exit.

use std::future::Future;
use std::io::{IsTerminal, Write};
use std::time::Duration;

use chrono::Utc;
use gpstatus_core::{FailureKind, Phase, Session};

use crate::cli::EvalOpts;
use crate::config::Settings;
use crate::driver::{interrupted, run_stream};
use crate::feed::FeedSource;
use crate::render::{format_session, resolve_color, session_to_json};

/// Run one evaluation until it ends or `interrupt` resolves.
pub async fn evaluate<F, I, U>(
    feed: &F,
    roll: &str,
    idle_timeout: Option<Duration>,
    interrupt: I,
    mut on_update: U,
) -> Session
where
    F: FeedSource,
    I: Future<Output = ()>,
    U: FnMut(&Session),
{
    let mut session = Session::new();
    let ticket = match session.start(roll, Utc::now()) {
        Ok(ticket) => ticket,
        Err(e) => {
            tracing::debug!(error = %e, "roll number rejected");
            return session;
        }
    };

    let cancelled = tokio::select! {
        _ = run_stream(feed, &mut session, ticket, idle_timeout, &mut on_update) => false,
        _ = interrupt => true,
    };
    if cancelled {
        session.cancel(ticket);
    }
    session
}

/// Process exit code for a finished session.
///
/// - 0: stream ended (complete or cut short)
/// - 1: no records for the roll number
/// - 2: service unavailable
/// - 3: interrupted (Ctrl-C)
/// - 4: empty roll number
pub fn exit_code(session: &Session) -> i32 {
    match session.phase() {
        Phase::Errored {
            kind: FailureKind::NotFound,
        } => 1,
        Phase::Errored {
            kind: FailureKind::ServiceUnavailable,
        } => 2,
        Phase::Cancelled => 3,
        Phase::Errored {
            kind: FailureKind::Validation,
        } => 4,
        Phase::Idle | Phase::Streaming { .. } | Phase::Completed { .. } => 0,
    }
}

fn redraw(session: &Session, use_color: bool) {
    // Clear screen + cursor home
    print!("\x1b[2J\x1b[H");
    println!("{}", format_session(session, use_color));
    let _ = std::io::stdout().flush();
}

/// Entry point for `gpstatus eval`. Returns the process exit code.
pub async fn cmd_eval<F: FeedSource>(
    feed: &F,
    settings: &Settings,
    opts: &EvalOpts,
) -> anyhow::Result<i32> {
    let use_color = !opts.json && resolve_color(&opts.color);
    let live = !opts.json && !opts.no_live && std::io::stdout().is_terminal();

    let session = evaluate(
        feed,
        &opts.roll_number,
        settings.idle_timeout,
        interrupted(),
        |s| {
            if live {
                redraw(s, use_color);
            }
        },
    )
    .await;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&session_to_json(&session))?);
    } else if live {
        redraw(&session, use_color);
    } else {
        println!("{}", format_session(&session, use_color));
    }

    Ok(exit_code(&session))
}
