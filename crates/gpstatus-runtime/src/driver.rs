//! Drives one session from one connection.
//!
//! The body stream is owned by the `run_stream` future. It is released when
//! the future returns (completion, error payload, transport failure, timeout)
//! and when the future is dropped by a caller that stops waiting for it.

use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use gpstatus_core::{Directive, FeedEvent, Phase, Session, SseDecoder};
use tracing::{debug, info};

use crate::feed::{FeedBody, FeedSource};

/// Run the stream identified by `ticket` until the session stops streaming.
///
/// `on_update` is called after every event that reached the session.
pub async fn run_stream<F, U>(
    feed: &F,
    session: &mut Session,
    ticket: u64,
    idle_timeout: Option<Duration>,
    mut on_update: U,
) -> Phase
where
    F: FeedSource,
    U: FnMut(&Session),
{
    let Some(roll) = session.roll().cloned() else {
        return session.phase();
    };

    let opened = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, feed.open(&roll)).await {
            Ok(result) => result,
            Err(_) => {
                session.apply(ticket, FeedEvent::Timeout, Utc::now());
                on_update(session);
                return session.phase();
            }
        },
        None => feed.open(&roll).await,
    };

    let mut body: FeedBody = match opened {
        Ok(body) => body,
        Err(e) => {
            session.apply(ticket, FeedEvent::TransportError(e.to_string()), Utc::now());
            on_update(session);
            return session.phase();
        }
    };

    if session.apply(ticket, FeedEvent::Opened, Utc::now()) == Directive::Close {
        return session.phase();
    }
    info!(%roll, ticket, "evaluation stream opened");
    on_update(session);

    let mut decoder = SseDecoder::new();
    'read: loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    session.apply(ticket, FeedEvent::Timeout, Utc::now());
                    on_update(session);
                    break;
                }
            },
            None => body.next().await,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                session.apply(ticket, FeedEvent::TransportError(e.to_string()), Utc::now());
                on_update(session);
                break;
            }
            None => {
                decoder.finish();
                session.apply(ticket, FeedEvent::Ended, Utc::now());
                on_update(session);
                break;
            }
        };

        for frame in decoder.feed(&chunk) {
            if !frame.is_message() {
                debug!(event = %frame.event, "ignoring named event");
                continue;
            }
            let directive = session.apply(ticket, FeedEvent::Message(frame.data), Utc::now());
            on_update(session);
            if directive == Directive::Close {
                break 'read;
            }
        }
    }

    drop(body);
    info!(%roll, ticket, phase = ?session.phase(), "evaluation stream closed");
    session.phase()
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        debug!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use bytes::Bytes;
    use futures::Stream;
    use futures::stream;
    use gpstatus_core::{EndReason, FailureKind, RollNumber, Verdict};

    use crate::feed::FeedError;

    /// Body wrapper that records when the connection is released.
    struct TrackedBody {
        inner: FeedBody,
        dropped: Arc<AtomicBool>,
    }

    impl Stream for TrackedBody {
        type Item = Result<Bytes, FeedError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.poll_next_unpin(cx)
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    enum Script {
        /// Connection refused.
        Refuse,
        /// Chunks, then EOF.
        Chunks(Vec<&'static str>),
        /// Chunks, then the connection stays open without data.
        ChunksThenStall(Vec<&'static str>),
        /// Chunks, then a read error.
        ChunksThenError(Vec<&'static str>),
    }

    struct ScriptedFeed {
        script: Script,
        opens: AtomicUsize,
        dropped: Arc<AtomicBool>,
    }

    impl ScriptedFeed {
        fn new(script: Script) -> Self {
            Self {
                script,
                opens: AtomicUsize::new(0),
                dropped: Arc::new(AtomicBool::new(false)),
            }
        }

        fn released(&self) -> bool {
            self.dropped.load(Ordering::SeqCst)
        }
    }

    fn ok_chunks(chunks: &[&'static str]) -> Vec<Result<Bytes, FeedError>> {
        chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect()
    }

    impl FeedSource for ScriptedFeed {
        async fn open(&self, _roll: &RollNumber) -> Result<FeedBody, FeedError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let inner: FeedBody = match &self.script {
                Script::Refuse => return Err(FeedError::Status(503)),
                Script::Chunks(c) => stream::iter(ok_chunks(c)).boxed(),
                Script::ChunksThenStall(c) => {
                    stream::iter(ok_chunks(c)).chain(stream::pending()).boxed()
                }
                Script::ChunksThenError(c) => {
                    let mut items = ok_chunks(c);
                    items.push(Err(FeedError::Body("connection reset".to_owned())));
                    stream::iter(items).boxed()
                }
            };
            Ok(TrackedBody {
                inner,
                dropped: Arc::clone(&self.dropped),
            }
            .boxed())
        }
    }

    fn started(roll: &str) -> (Session, u64) {
        let mut session = Session::new();
        let ticket = session.start(roll, Utc::now()).expect("start");
        (session, ticket)
    }

    #[tokio::test]
    async fn full_stream_to_done() {
        let feed = ScriptedFeed::new(Script::ChunksThenStall(vec![
            "data: {\"row_id\": 0, \"status\": \"Queued\"}\n\n",
            "data: {\"row_id\": 0, \"status\": \"Completed\", \"result\": {\"project\": \"P1\", \"verdict\": \"PASS\", ",
            "\"reason\": \"\", \"full_name\": \"Alice\"}}\n\n",
            "data: {\"done\": true}\n\n",
        ]));
        let (mut session, ticket) = started("21CS001");
        let mut updates = 0;

        let phase = run_stream(&feed, &mut session, ticket, None, |_| updates += 1).await;

        assert_eq!(
            phase,
            Phase::Completed {
                reason: EndReason::Done
            }
        );
        assert_eq!(updates, 4, "opened + three frames");
        assert!(feed.released(), "connection closed after done");
        assert_eq!(session.row(0).and_then(|r| r.verdict()), Some(&Verdict::Pass));
        assert_eq!(session.student_name(), Some("Alice"));
    }

    #[tokio::test]
    async fn refused_connection_is_service_unavailable() {
        let feed = ScriptedFeed::new(Script::Refuse);
        let (mut session, ticket) = started("21CS001");

        let phase = run_stream(&feed, &mut session, ticket, None, |_| {}).await;

        assert_eq!(
            phase,
            Phase::Errored {
                kind: FailureKind::ServiceUnavailable
            }
        );
    }

    #[tokio::test]
    async fn not_found_payload_closes() {
        let feed = ScriptedFeed::new(Script::ChunksThenStall(vec![
            "data: {\"error\": \"Roll number not found\"}\n\n",
        ]));
        let (mut session, ticket) = started("nope");

        let phase = run_stream(&feed, &mut session, ticket, None, |_| {}).await;

        assert_eq!(
            phase,
            Phase::Errored {
                kind: FailureKind::NotFound
            }
        );
        assert!(feed.released());
        assert_eq!(session.row_count(), 0);
    }

    #[tokio::test]
    async fn eof_without_done_keeps_rows() {
        let feed = ScriptedFeed::new(Script::Chunks(vec![
            "data: {\"row_id\": 0, \"status\": \"Evaluating\"}\n\n",
            "data: {\"row_id\": 1, \"status\": \"Queu",
        ]));
        let (mut session, ticket) = started("21CS001");

        let phase = run_stream(&feed, &mut session, ticket, None, |_| {}).await;

        assert_eq!(
            phase,
            Phase::Completed {
                reason: EndReason::ConnectionLost
            }
        );
        assert_eq!(session.row_count(), 1, "partial frame discarded");
        assert!(session.failure().is_none());
    }

    #[tokio::test]
    async fn read_error_after_open_is_not_service_down() {
        let feed = ScriptedFeed::new(Script::ChunksThenError(vec![
            "data: {\"row_id\": 0, \"status\": \"Queued\"}\n\n",
        ]));
        let (mut session, ticket) = started("21CS001");

        let phase = run_stream(&feed, &mut session, ticket, None, |_| {}).await;

        assert_eq!(
            phase,
            Phase::Completed {
                reason: EndReason::ConnectionLost
            }
        );
    }

    #[tokio::test]
    async fn idle_timeout_after_data() {
        let feed = ScriptedFeed::new(Script::ChunksThenStall(vec![
            "data: {\"row_id\": 0, \"status\": \"Queued\"}\n\n",
        ]));
        let (mut session, ticket) = started("21CS001");

        let phase = run_stream(
            &feed,
            &mut session,
            ticket,
            Some(Duration::from_millis(50)),
            |_| {},
        )
        .await;

        assert_eq!(
            phase,
            Phase::Completed {
                reason: EndReason::IdleTimeout
            }
        );
        assert!(feed.released());
    }

    #[tokio::test]
    async fn idle_timeout_without_data_is_service_unavailable() {
        let feed = ScriptedFeed::new(Script::ChunksThenStall(vec![": keep-alive\n\n"]));
        let (mut session, ticket) = started("21CS001");

        let phase = run_stream(
            &feed,
            &mut session,
            ticket,
            Some(Duration::from_millis(50)),
            |_| {},
        )
        .await;

        assert_eq!(
            phase,
            Phase::Errored {
                kind: FailureKind::ServiceUnavailable
            }
        );
    }

    #[tokio::test]
    async fn named_events_and_garbage_are_skipped() {
        let feed = ScriptedFeed::new(Script::Chunks(vec![
            "event: progress\ndata: {\"row_id\": 9, \"status\": \"x\"}\n\n",
            "data: not json\n\n",
            "data: {\"row_id\": 0, \"status\": \"Queued\"}\n\n",
            "data: {\"done\": true}\n\n",
        ]));
        let (mut session, ticket) = started("21CS001");

        run_stream(&feed, &mut session, ticket, None, |_| {}).await;

        assert_eq!(session.row_count(), 1);
        assert!(session.row(9).is_none());
        assert_eq!(session.skipped(), 1);
    }

    #[tokio::test]
    async fn stale_ticket_releases_immediately() {
        let feed = ScriptedFeed::new(Script::ChunksThenStall(vec![
            "data: {\"row_id\": 0, \"status\": \"Queued\"}\n\n",
        ]));
        let (mut session, old) = started("A");
        let current = session.start("B", Utc::now()).expect("start");

        let phase = run_stream(&feed, &mut session, old, None, |_| {}).await;

        assert_eq!(phase, Phase::Streaming { opened: false });
        assert!(feed.released());
        assert_eq!(session.row_count(), 0);
        assert_eq!(session.generation(), current);
    }

    #[tokio::test]
    async fn dropping_the_driver_closes_the_connection() {
        let feed = ScriptedFeed::new(Script::ChunksThenStall(vec![
            "data: {\"row_id\": 0, \"status\": \"Queued\"}\n\n",
        ]));
        let (mut session, ticket) = started("A");

        let superseded = tokio::select! {
            _ = run_stream(&feed, &mut session, ticket, None, |_| {}) => false,
            _ = tokio::time::sleep(Duration::from_millis(50)) => true,
        };

        assert!(superseded);
        assert!(feed.released(), "driver future dropped before next start");
        assert_eq!(session.row_count(), 1);
        let next = session.start("B", Utc::now()).expect("start");
        assert_eq!(next, ticket + 1);
        assert_eq!(feed.opens.load(Ordering::SeqCst), 1);
    }
}
