//! `gpstatus interactive`: prompt for roll numbers and show results live.
//!
//! Entering a roll number while an evaluation is running replaces it: the
//! running stream is dropped (closing its connection) before the next one
//! starts. A blank entry while streaming only prints the validation message.

use std::cell::RefCell;
use std::io::{IsTerminal, Write};
use std::time::Duration;

use chrono::Utc;
use gpstatus_core::{FailureKind, Session};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::cli::InteractiveOpts;
use crate::config::Settings;
use crate::driver::{interrupted, run_stream};
use crate::feed::FeedSource;
use crate::render::{format_session, resolve_color};

const PROMPT: &str = "Roll number> ";

/// Output side of the prompt loop.
struct Screen<W> {
    out: W,
    use_color: bool,
    /// Redraw the whole screen on every update (terminal only).
    live: bool,
}

impl<W: Write> Screen<W> {
    fn update(&mut self, session: &Session) {
        if !self.live {
            return;
        }
        let _ = write!(
            self.out,
            "\x1b[2J\x1b[H{}\n\n",
            format_session(session, self.use_color)
        );
        self.prompt();
    }

    fn finish(&mut self, session: &Session) {
        if self.live {
            self.update(session);
        } else {
            let _ = writeln!(self.out, "{}\n", format_session(session, self.use_color));
        }
    }

    fn notice(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
        self.prompt();
    }

    fn prompt(&mut self) {
        if self.live {
            let _ = write!(self.out, "{PROMPT}");
        }
        let _ = self.out.flush();
    }
}

/// Prompt loop over `input`. Returns the writer once input is exhausted or
/// Ctrl-C is pressed at an idle prompt.
pub async fn run_interactive<F, R, W>(
    feed: &F,
    idle_timeout: Option<Duration>,
    input: R,
    out: W,
    use_color: bool,
    live: bool,
) -> anyhow::Result<W>
where
    F: FeedSource,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let screen = RefCell::new(Screen {
        out,
        use_color,
        live,
    });
    let mut lines = input.lines();
    let mut session = Session::new();
    let mut pending: Option<String> = None;
    let mut stdin_open = true;

    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => {
                if !stdin_open {
                    break;
                }
                screen.borrow_mut().prompt();
                tokio::select! {
                    line = lines.next_line() => match line? {
                        Some(line) => line,
                        None => break,
                    },
                    _ = interrupted() => break,
                }
            }
        };

        let ticket = match session.start(&line, Utc::now()) {
            Ok(ticket) => ticket,
            Err(_) => {
                screen
                    .borrow_mut()
                    .notice(FailureKind::Validation.message());
                continue;
            }
        };

        let mut cancelled = false;
        {
            let drive = run_stream(feed, &mut session, ticket, idle_timeout, |s| {
                screen.borrow_mut().update(s)
            });
            tokio::pin!(drive);

            loop {
                // Stream progress first, so queued input never starves it.
                tokio::select! {
                    biased;
                    _ = &mut drive => break,
                    line = lines.next_line(), if stdin_open => match line? {
                        Some(line) if line.trim().is_empty() => {
                            screen.borrow_mut().notice(FailureKind::Validation.message());
                        }
                        Some(line) => {
                            pending = Some(line);
                            break;
                        }
                        None => stdin_open = false,
                    },
                    _ = interrupted() => {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        if cancelled {
            session.cancel(ticket);
        }
        if pending.is_none() {
            screen.borrow_mut().finish(&session);
        }
    }

    Ok(screen.into_inner().out)
}

/// Entry point for `gpstatus interactive`.
pub async fn cmd_interactive<F: FeedSource>(
    feed: &F,
    settings: &Settings,
    opts: &InteractiveOpts,
) -> anyhow::Result<()> {
    let use_color = resolve_color(&opts.color);
    let live = std::io::stdout().is_terminal();
    let input = BufReader::new(tokio::io::stdin());

    run_interactive(
        feed,
        settings.idle_timeout,
        input,
        std::io::stdout(),
        use_color,
        live,
    )
    .await?;

    Ok(())
}
