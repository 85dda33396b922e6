//! Scraping session controller
//!
//! Owns at most one remote page session at a time and drives it through the
//! [`SessionState`] lifecycle. `start()` runs the setup steps inline (acquire,
//! navigate, settle, wait out a challenge page) and then hands the session to
//! a dedicated poll task. Every wait selects against the run's stop signal, so
//! `stop()` interrupts setup and polling alike.
//!
//! The session handle lives in an `Option` slot; whoever takes it out
//! releases it. Racing releasers (a failing poll task, `stop()`, a `start()`
//! that noticed a stop) therefore release it exactly once.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use super::classify::{PageClassifier, PageCondition};
use super::source::{PageSession, PageSource};
use super::state::SessionState;
use crate::config::ScraperConfig;
use crate::error::SessionError;
use crate::extraction::MessageParser;
use crate::pipeline::{DedupWindow, IngestSender, Source};

fn channel_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid channel regex"))
}

/// Whether `channel` (after trimming) can be substituted into the target URL
pub fn is_valid_channel(channel: &str) -> bool {
    channel_pattern().is_match(channel.trim())
}

/// What one poll tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Messages emitted onto the queue
    pub emitted: usize,
    /// Parsed messages already in the dedup window
    pub duplicates: usize,
    /// Fragments reported as parse issues
    pub issues: usize,
    /// The page showed a challenge and was not parsed
    pub challenged: bool,
}

#[derive(Default)]
struct RunControl {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    config: ScraperConfig,
    source: Arc<dyn PageSource>,
    classifier: PageClassifier,
    events: IngestSender,
    dedup: Arc<DedupWindow>,
    state: watch::Sender<SessionState>,
    channel: Mutex<Option<String>>,
    session: Mutex<Option<Arc<dyn PageSession>>>,
    run: Mutex<RunControl>,
}

/// Handle to the scraping session; cheap to clone
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Controller acquiring sessions from `source`
    pub fn new(config: ScraperConfig, source: Arc<dyn PageSource>, events: IngestSender) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            inner: Arc::new(Inner {
                classifier: PageClassifier::from_config(&config),
                dedup: Arc::new(DedupWindow::new(config.dedup_capacity)),
                config,
                source,
                events,
                state,
                channel: Mutex::new(None),
                session: Mutex::new(None),
                run: Mutex::new(RunControl::default()),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Channel of the current or last run
    pub fn channel(&self) -> Option<String> {
        self.inner.channel.lock().clone()
    }

    /// Scraped ids currently remembered
    pub fn dedup_len(&self) -> usize {
        self.inner.dedup.len()
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    /// Start scraping `channel`.
    ///
    /// Returns once the poll task is running, or once setup ended because of
    /// a stop request. Setup failures are reported as error events and leave
    /// the controller `Failed`.
    #[instrument(skip(self))]
    pub async fn start(&self, channel: &str) -> Result<SessionState, SessionError> {
        let inner = &self.inner;

        let current = self.state();
        if current.is_active() {
            let err = SessionError::AlreadyRunning(current.to_string());
            inner.events.error(err.to_string());
            return Err(err);
        }

        let channel = channel.trim();
        if !is_valid_channel(channel) {
            let err = SessionError::InvalidChannel(channel.to_string());
            inner.events.error(err.to_string());
            return Err(err);
        }

        // a stop() that sees Initializing must find this run's stop channel
        let (stop_tx, mut stop_rx) = watch::channel(false);
        {
            let mut run = inner.run.lock();
            if !inner.transition(SessionState::Initializing) {
                drop(run);
                let err = SessionError::AlreadyRunning(self.state().to_string());
                inner.events.error(err.to_string());
                return Err(err);
            }
            run.stop_tx = Some(stop_tx);
            run.task = None;
        }
        inner.dedup.clear();
        *inner.channel.lock() = Some(channel.to_string());

        info!(channel, "Starting scraper");
        inner.events.status(format!("Starting scraper for channel '{channel}'..."));

        let session = match inner.source.acquire().await {
            Ok(session) => session,
            Err(e) => {
                let err = SessionError::Acquisition(e.to_string());
                inner.fail(&err).await;
                return Err(err);
            }
        };
        *inner.session.lock() = Some(Arc::clone(&session));
        if *stop_rx.borrow() {
            inner.release_session().await;
            return Ok(self.state());
        }
        inner.events.status("Browser initialized.");

        let url = inner.config.target_url(channel);
        if let Err(e) = session.navigate(&url).await {
            if *stop_rx.borrow() {
                return Ok(self.state());
            }
            let err = SessionError::Acquisition(format!("could not open {url}: {e}"));
            inner.fail(&err).await;
            return Err(err);
        }

        if !wait(inner.config.settle_delay, &mut stop_rx).await {
            return Ok(self.state());
        }

        match inner.wait_for_chat(session.as_ref(), channel, &mut stop_rx).await {
            Ok(true) => {}
            Ok(false) => return Ok(self.state()),
            Err(err) => {
                if *stop_rx.borrow() {
                    return Ok(self.state());
                }
                inner.fail(&err).await;
                return Err(err);
            }
        }

        {
            let mut run = inner.run.lock();
            if *stop_rx.borrow() || !inner.transition(SessionState::Polling) {
                return Ok(self.state());
            }
            let task_inner = Arc::clone(inner);
            run.task = Some(tokio::spawn(async move {
                task_inner.poll_loop(session, stop_rx).await;
            }));
        }

        inner
            .events
            .status(format!("Connected to {channel}'s chat. Polling for messages..."));
        Ok(SessionState::Polling)
    }

    /// Stop the current run and release the session.
    ///
    /// Idempotent. Always emits a final status event and returns the state
    /// the controller ended up in.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> SessionState {
        let inner = &self.inner;

        if !inner.transition(SessionState::Stopping) {
            inner.release_session().await;
            let state = self.state();
            debug!(%state, "Stop requested with no active run");
            if state == SessionState::Stopping {
                inner.events.status("Scraper is already stopping.");
            } else {
                inner.events.status("Scraper is not running.");
            }
            return state;
        }
        inner.events.status("Stopping scraper...");

        let task = {
            let mut run = inner.run.lock();
            if let Some(stop_tx) = &run.stop_tx {
                let _ = stop_tx.send(true);
            }
            run.task.take()
        };

        if let Some(mut task) = task {
            match tokio::time::timeout(inner.config.join_timeout, &mut task).await {
                Ok(Ok(())) => debug!("Poll task joined"),
                Ok(Err(e)) => warn!(error = %e, "Poll task ended abnormally"),
                Err(_) => {
                    task.abort();
                    warn!(
                        timeout_ms = inner.config.join_timeout.as_millis() as u64,
                        "Poll task did not stop in time, aborted"
                    );
                    inner.events.warning(format!(
                        "Scraper task did not stop within {:.1}s and was aborted.",
                        inner.config.join_timeout.as_secs_f64()
                    ));
                }
            }
        }

        inner.release_session().await;
        inner.transition(SessionState::Stopped);
        inner.events.status("Scraper stopped.");
        self.state()
    }
}

impl Inner {
    fn transition(&self, next: SessionState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                debug!(from = %state, to = %next, "Rejected session transition");
                false
            }
        });
        if let Some(from) = from {
            info!(%from, to = %next, "Session state changed");
        }
        changed
    }

    async fn release_session(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            match session.release().await {
                Ok(()) => debug!("Session released"),
                Err(e) => {
                    warn!(error = %e, "Failed to release session cleanly");
                    self.events.warning(format!("Browser did not close cleanly: {e}"));
                }
            }
        }
    }

    async fn fail(&self, err: &SessionError) {
        warn!(error = %err, "Scraper failed");
        self.events.error(err.to_string());
        self.transition(SessionState::Failed);
        self.release_session().await;
    }

    fn channel_name(&self) -> String {
        self.channel.lock().clone().unwrap_or_default()
    }

    /// `Ok(true)` once chat is visible, `Ok(false)` if stopped first
    async fn wait_for_chat(
        &self,
        session: &dyn PageSession,
        channel: &str,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<bool, SessionError> {
        let mut announced = false;
        loop {
            let page = session
                .page_source()
                .await
                .map_err(|e| SessionError::LoopFatal(e.to_string()))?;
            match self.classifier.classify(&page) {
                PageCondition::NotFound => {
                    return Err(SessionError::ResourceNotFound(channel.to_string()))
                }
                PageCondition::Ready => return Ok(true),
                PageCondition::Challenge => {
                    if !announced {
                        self.transition(SessionState::CaptchaWait);
                        self.events
                            .status("CAPTCHA detected. Waiting for it to be solved...");
                        announced = true;
                    }
                    if !wait(self.config.captcha_interval, stop_rx).await {
                        return Ok(false);
                    }
                }
            }
        }
    }

    async fn poll_loop(
        self: Arc<Self>,
        session: Arc<dyn PageSession>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        debug!("Poll loop started");
        loop {
            if *stop_rx.borrow() {
                break;
            }
            match self.tick(session.as_ref()).await {
                Ok(report) => trace!(?report, "Poll tick"),
                Err(err) => {
                    // a released session fails its reads; that is not an error
                    if *stop_rx.borrow() {
                        break;
                    }
                    self.fail(&err).await;
                    return;
                }
            }
            if !wait(self.config.poll_interval, &mut stop_rx).await {
                break;
            }
        }
        debug!("Poll loop stopped");
    }

    async fn tick(&self, session: &dyn PageSession) -> Result<TickReport, SessionError> {
        let page = session
            .page_source()
            .await
            .map_err(|e| SessionError::LoopFatal(e.to_string()))?;

        let mut report = TickReport::default();
        match self.classifier.classify(&page) {
            PageCondition::NotFound => {
                return Err(SessionError::ResourceNotFound(self.channel_name()))
            }
            PageCondition::Challenge => {
                self.events
                    .status("CAPTCHA detected again. Waiting for it to be solved...");
                report.challenged = true;
                return Ok(report);
            }
            PageCondition::Ready => {}
        }

        let parsed = MessageParser::parse(&page);
        report.issues = parsed.issues.len();
        for issue in &parsed.issues {
            self.events.warning(issue.to_string());
        }

        let mut messages = parsed.messages;
        if self.config.newest_first {
            messages.reverse();
        }
        for raw in messages {
            if self.dedup.insert_if_new(&raw.id) {
                self.events.message(raw.into_message(Source::Scrape));
                report.emitted += 1;
            } else {
                report.duplicates += 1;
            }
        }
        Ok(report)
    }
}

/// Sleep for `duration` unless the stop signal fires first; `false` on stop
async fn wait(duration: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    if *stop_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = stop_rx.changed() => false,
    }
}
