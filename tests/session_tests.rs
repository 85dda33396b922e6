//! Scraping session tests
//!
//! The controller runs against an in-memory page source that replays a
//! script of rendered pages, so no browser is needed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use livechat_ingest::config::{ScraperConfig, CHALLENGE_MARKER, NOT_FOUND_MARKER};
use livechat_ingest::error::{Error, Result, SessionError};
use livechat_ingest::pipeline::{IngestEvent, IngestQueue, IngestReceiver, Source};
use livechat_ingest::session::{PageSession, PageSource, SessionController, SessionState};

// ============================================================================
// Scripted page source
// ============================================================================

/// Pages are served in order; the last one repeats once the script runs out.
#[derive(Default)]
struct Script {
    pages: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    navigated: Mutex<Vec<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    reads: AtomicUsize,
    fail_acquire: bool,
    fail_reads_after: Option<usize>,
}

impl Script {
    fn new(pages: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        })
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn push_page(&self, page: String) {
        self.pages.lock().unwrap().push_back(page);
    }
}

struct ScriptedSource(Arc<Script>);

#[async_trait]
impl PageSource for ScriptedSource {
    async fn acquire(&self) -> Result<Arc<dyn PageSession>> {
        if self.0.fail_acquire {
            return Err(Error::generic("chrome executable not found"));
        }
        self.0.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedSession {
            script: Arc::clone(&self.0),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Holds `acquire` until the test opens the gate
struct GatedSource {
    inner: ScriptedSource,
    gate: tokio::sync::Notify,
}

#[async_trait]
impl PageSource for GatedSource {
    async fn acquire(&self) -> Result<Arc<dyn PageSession>> {
        self.gate.notified().await;
        self.inner.acquire().await
    }
}

struct ScriptedSession {
    script: Arc<Script>,
    closed: AtomicBool,
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.script.navigated.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn page_source(&self) -> Result<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::generic("session closed"));
        }
        let reads = self.script.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.script.fail_reads_after {
            if reads > limit {
                return Err(Error::cdp("target crashed"));
            }
        }
        let mut last = self.script.last.lock().unwrap();
        if let Some(page) = self.script.pages.lock().unwrap().pop_front() {
            *last = page;
        }
        Ok(last.clone())
    }

    /// Every call is counted, so a second release shows up in `released()`
    async fn release(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.script.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn entry(id: &str, name: &str, content: &str) -> String {
    format!(
        r#"<div data-chat-entry="{id}" class="chat-entry" data-chat-entry-user-id="7"><div class="chat-entry-inner"><span class="chat-entry-username" id="7">{name}</span><span>: </span><div class="chat-entry-content">{content}</div></div></div>"#
    )
}

/// A chatroom page, newest entry first
fn chat_page(ids: &[&str]) -> String {
    let entries: String = ids
        .iter()
        .map(|id| entry(id, "viewer", &format!("message {id}")))
        .collect();
    format!("<html><body><div id=\"chatroom\">{entries}</div></body></html>")
}

fn marker_page(marker: &str) -> String {
    format!("<html><body><h1>{marker}</h1></body></html>")
}

fn fast_config() -> ScraperConfig {
    ScraperConfig::builder()
        .url_template("http://chat.test/{channel}/chatroom")
        .poll_interval(Duration::from_millis(10))
        .settle_delay(Duration::ZERO)
        .captcha_interval(Duration::from_millis(10))
        .join_timeout(Duration::from_secs(1))
        .build()
}

fn controller(script: &Arc<Script>) -> (SessionController, IngestReceiver) {
    let (tx, rx) = IngestQueue::new();
    let source = Arc::new(ScriptedSource(Arc::clone(script)));
    (SessionController::new(fast_config(), source, tx), rx)
}

/// Drain events until `done` holds or two seconds pass
async fn collect_until<F>(rx: &mut IngestReceiver, events: &mut Vec<IngestEvent>, done: F)
where
    F: Fn(&[IngestEvent]) -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            events.extend(rx.drain_batch(usize::MAX));
            if done(events.as_slice()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached, events: {events:?}");
}

fn message_ids(events: &[IngestEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(IngestEvent::as_message)
        .map(|m| m.id().to_string())
        .collect()
}

fn statuses(events: &[IngestEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            IngestEvent::Status(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn has_error(events: &[IngestEvent]) -> bool {
    events.iter().any(|e| matches!(e, IngestEvent::Error(_)))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_polling_emits_new_messages_oldest_first() {
    let script = Script::new(vec![
        chat_page(&["m2", "m1"]),
        chat_page(&["m2", "m1"]),
        chat_page(&["m3", "m2", "m1"]),
    ]);
    let (scraper, mut rx) = controller(&script);

    let state = scraper.start("xqc").await.unwrap();
    assert_eq!(state, SessionState::Polling);
    assert_eq!(scraper.channel().as_deref(), Some("xqc"));
    assert_eq!(
        *script.navigated.lock().unwrap(),
        vec!["http://chat.test/xqc/chatroom".to_string()]
    );

    let mut events = Vec::new();
    collect_until(&mut rx, &mut events, |e| message_ids(e).len() >= 3).await;

    // let a few more ticks see the same page
    tokio::time::sleep(Duration::from_millis(50)).await;
    events.extend(rx.drain_batch(usize::MAX));

    assert_eq!(message_ids(&events), vec!["m1", "m2", "m3"]);
    assert!(events
        .iter()
        .filter_map(IngestEvent::as_message)
        .all(|m| m.source() == Source::Scrape && m.username() == "viewer"));
    assert_eq!(scraper.dedup_len(), 3);

    let status = statuses(&events);
    assert_eq!(status[0], "Starting scraper for channel 'xqc'...");
    assert_eq!(status[1], "Browser initialized.");
    assert_eq!(status[2], "Connected to xqc's chat. Polling for messages...");

    assert_eq!(scraper.stop().await, SessionState::Stopped);
    assert_eq!(script.released(), 1);
}

#[tokio::test]
async fn test_messages_added_while_polling() {
    let script = Script::new(vec![chat_page(&["a"])]);
    let (scraper, mut rx) = controller(&script);
    scraper.start("chan").await.unwrap();

    let mut events = Vec::new();
    collect_until(&mut rx, &mut events, |e| message_ids(e) == ["a"]).await;

    script.push_page(chat_page(&["c", "b", "a"]));
    collect_until(&mut rx, &mut events, |e| message_ids(e).len() == 3).await;
    assert_eq!(message_ids(&events), vec!["a", "b", "c"]);

    scraper.stop().await;
}

#[tokio::test]
async fn test_malformed_entry_is_a_warning() {
    let malformed = r#"<div data-chat-entry=""><div class="chat-entry-content">lost</div></div>"#;
    let mixed = format!(
        "<html><body>{}{}{}{}</body></html>",
        entry("m3", "viewer", "three"),
        malformed,
        entry("m2", "viewer", "two"),
        entry("m1", "viewer", "one"),
    );
    let script = Script::new(vec![chat_page(&[]), mixed, chat_page(&["m3", "m2", "m1"])]);
    let (scraper, mut rx) = controller(&script);
    scraper.start("chan").await.unwrap();

    let mut events = Vec::new();
    collect_until(&mut rx, &mut events, |e| message_ids(e).len() == 3).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    events.extend(rx.drain_batch(usize::MAX));

    assert_eq!(message_ids(&events), vec!["m1", "m2", "m3"]);
    let warnings = events
        .iter()
        .filter(|e| matches!(e, IngestEvent::Warning(_)))
        .count();
    assert_eq!(warnings, 1);
    assert_eq!(scraper.state(), SessionState::Polling);

    scraper.stop().await;
}

#[tokio::test]
async fn test_not_found_page_fails_start() {
    let script = Script::new(vec![marker_page(NOT_FOUND_MARKER)]);
    let (scraper, mut rx) = controller(&script);

    let err = scraper.start("ghost").await.unwrap_err();
    assert_eq!(err, SessionError::ResourceNotFound("ghost".to_string()));
    assert_eq!(scraper.state(), SessionState::Failed);
    assert_eq!(script.released(), 1);
    assert!(has_error(&rx.drain_batch(usize::MAX)));
}

#[tokio::test]
async fn test_channel_disappearing_while_polling() {
    let script = Script::new(vec![chat_page(&["m1"]), chat_page(&["m1"])]);
    let (scraper, mut rx) = controller(&script);
    scraper.start("chan").await.unwrap();

    script.push_page(marker_page(NOT_FOUND_MARKER));

    let mut state = scraper.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == SessionState::Failed),
    )
    .await
    .expect("controller should fail")
    .unwrap();

    assert_eq!(script.released(), 1);
    let reads = script.reads.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(script.reads.load(Ordering::SeqCst), reads, "no ticks after failure");

    let events = rx.drain_batch(usize::MAX);
    let errors: Vec<&IngestEvent> = events
        .iter()
        .filter(|e| matches!(e, IngestEvent::Error(_)))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], IngestEvent::Error(t) if t.contains("chan")));
}

#[tokio::test]
async fn test_read_failure_is_loop_fatal() {
    let script = Arc::new(Script {
        pages: Mutex::new(vec![chat_page(&["m1"])].into()),
        fail_reads_after: Some(3),
        ..Default::default()
    });
    let (scraper, mut rx) = controller(&script);
    scraper.start("chan").await.unwrap();

    let mut state = scraper.subscribe();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == SessionState::Failed),
    )
    .await
    .expect("controller should fail")
    .unwrap();

    assert_eq!(script.released(), 1);
    let events = rx.drain_batch(usize::MAX);
    assert!(events
        .iter()
        .any(|e| matches!(e, IngestEvent::Error(t) if t.contains("target crashed"))));

    // a failed run can be stopped without effect and restarted
    assert_eq!(scraper.stop().await, SessionState::Failed);
    assert_eq!(scraper.stop().await, SessionState::Failed);
    assert_eq!(script.released(), 1);
}

#[tokio::test]
async fn test_challenge_page_waits_then_polls() {
    let script = Script::new(vec![
        marker_page(CHALLENGE_MARKER),
        marker_page(CHALLENGE_MARKER),
        marker_page(CHALLENGE_MARKER),
        chat_page(&["m1"]),
    ]);
    let (scraper, mut rx) = controller(&script);

    assert_eq!(scraper.start("chan").await.unwrap(), SessionState::Polling);

    let mut events = Vec::new();
    collect_until(&mut rx, &mut events, |e| message_ids(e) == ["m1"]).await;

    let captcha = statuses(&events)
        .iter()
        .filter(|s| s.starts_with("CAPTCHA detected."))
        .count();
    assert_eq!(captcha, 1, "challenge announced once");

    scraper.stop().await;
}

#[tokio::test]
async fn test_stop_during_challenge_wait() {
    let script = Script::new(vec![marker_page(CHALLENGE_MARKER)]);
    let (scraper, _rx) = controller(&script);

    let mut state = scraper.subscribe();
    let starter = {
        let scraper = scraper.clone();
        tokio::spawn(async move { scraper.start("chan").await })
    };
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == SessionState::CaptchaWait),
    )
    .await
    .expect("controller should wait on the challenge")
    .unwrap();

    assert_eq!(scraper.stop().await, SessionState::Stopped);
    assert!(starter.await.unwrap().is_ok());
    assert_eq!(scraper.state(), SessionState::Stopped);
    assert_eq!(script.released(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_during_initialization_reaches_the_run() {
    let script = Script::new(vec![chat_page(&["m1"])]);
    let source = Arc::new(GatedSource {
        inner: ScriptedSource(Arc::clone(&script)),
        gate: tokio::sync::Notify::new(),
    });
    let (tx, _rx) = IngestQueue::new();
    let scraper = SessionController::new(fast_config(), source.clone(), tx);

    let mut state = scraper.subscribe();
    let starting = tokio::spawn({
        let scraper = scraper.clone();
        async move { scraper.start("chan").await }
    });
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == SessionState::Initializing),
    )
    .await
    .expect("start should begin initializing")
    .unwrap();

    assert_eq!(scraper.stop().await, SessionState::Stopped);
    source.gate.notify_one();

    let outcome = tokio::time::timeout(Duration::from_secs(2), starting)
        .await
        .expect("start should notice the stop")
        .unwrap();
    assert_eq!(outcome, Ok(SessionState::Stopped));
    assert_eq!(script.released(), 1);
    assert!(script.navigated.lock().unwrap().is_empty());
    assert_eq!(scraper.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let script = Script::new(vec![chat_page(&["m1"])]);
    let (scraper, mut rx) = controller(&script);

    assert_eq!(scraper.stop().await, SessionState::Idle);

    scraper.start("chan").await.unwrap();
    assert_eq!(scraper.stop().await, SessionState::Stopped);
    assert_eq!(script.released(), 1);
    assert_eq!(scraper.stop().await, SessionState::Stopped);
    assert_eq!(script.released(), 1);

    let status = statuses(&rx.drain_batch(usize::MAX));
    assert_eq!(status.first().map(String::as_str), Some("Scraper is not running."));
    assert_eq!(status.last().map(String::as_str), Some("Scraper is not running."));
    assert!(status.iter().any(|s| s == "Scraper stopped."));
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let script = Script::new(vec![chat_page(&["m1"])]);
    let (scraper, _rx) = controller(&script);
    scraper.start("chan").await.unwrap();

    let err = scraper.start("other").await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyRunning(_)));
    assert_eq!(scraper.state(), SessionState::Polling);
    assert_eq!(scraper.channel().as_deref(), Some("chan"));
    assert_eq!(script.acquired.load(Ordering::SeqCst), 1);

    scraper.stop().await;
}

#[tokio::test]
async fn test_restart_clears_dedup() {
    let script = Script::new(vec![chat_page(&["m1"])]);
    let (scraper, mut rx) = controller(&script);

    scraper.start("chan").await.unwrap();
    let mut events = Vec::new();
    collect_until(&mut rx, &mut events, |e| message_ids(e).len() == 1).await;
    scraper.stop().await;

    scraper.start("chan").await.unwrap();
    collect_until(&mut rx, &mut events, |e| message_ids(e).len() == 2).await;
    scraper.stop().await;

    assert_eq!(message_ids(&events), vec!["m1", "m1"]);
    assert_eq!(script.acquired.load(Ordering::SeqCst), 2);
    assert_eq!(script.released(), 2);
}

#[tokio::test]
async fn test_acquisition_failure() {
    let script = Arc::new(Script {
        fail_acquire: true,
        ..Default::default()
    });
    let (scraper, mut rx) = controller(&script);

    let err = scraper.start("chan").await.unwrap_err();
    assert!(matches!(err, SessionError::Acquisition(ref m) if m.contains("chrome")));
    assert_eq!(scraper.state(), SessionState::Failed);
    assert_eq!(script.released(), 0);
    assert!(has_error(&rx.drain_batch(usize::MAX)));
}

#[tokio::test]
async fn test_invalid_channel_rejected() {
    let script = Script::new(vec![chat_page(&["m1"])]);
    let (scraper, _rx) = controller(&script);

    let err = scraper.start("../admin").await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidChannel(_)));
    assert_eq!(scraper.state(), SessionState::Idle);
    assert_eq!(script.acquired.load(Ordering::SeqCst), 0);
}
