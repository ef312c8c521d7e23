//! # Acquisition Session
//!
//! Owns the device link, the recorder, the derived leads and the analysis
//! result, and is the only writer of any of them.
//!
//! Everything runs on one task. [`Session::next_message`] waits on three
//! queues and [`Session::update`] handles whatever arrives, polling them in
//! this order:
//!
//! 1. user commands from the front end
//! 2. inbound socket activity (frames are handled strictly in arrival order)
//! 3. the one-second recording timer
//!
//! A timer tick and a frame are never handled at the same time. When both are
//! ready the frame goes first, so an auto-stop flushes every sample that had
//! already arrived.
//!
//! The front end reads state through [`SessionEvent`]s and
//! [`SessionSnapshot`]s, never through references into the session.

use crate::analysis::{AnalysisResult, Analyzer, ResultsAssembler};
use crate::config::Config;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionObservers, ConnectionState};
use crate::error::RecordingError;
use crate::leads::{derive_leads, DerivedLeadSet};
use crate::observer::{EventSlot, Subscription};
use crate::protocol::parse_frames;
use crate::recorder::{Advance, FrameEffect, Lead, RecordingController, StopReason, StopSummary};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Inputs to the session loop
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Connect to this address, or to the stored one when `None`
    Connect(Option<String>),
    Disconnect,
    StartRecording,
    StopRecording,
    /// Move to the next lead; after Lead III this submits for analysis
    NextLead,
    /// Resubmit the recorded leads once all three are done
    Analyze,
    Status,
    Tick,
    Connection(ConnectionEvent),
    Shutdown,
}

/// What the front end is told
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RecordingStarted(Lead),
    Elapsed { lead: Lead, seconds: u32 },
    RecordingStopped(StopSummary),
    SegmentFlushed { lead: Lead, flushed: usize, total: usize },
    LeadAdvanced(Lead),
    ReadyForAnalysis { derived_len: usize },
    AnalysisCompleted(AnalysisResult),
    /// A user-visible error; session state did not change
    Rejected(String),
    Status(SessionSnapshot),
}

/// Point-in-time copy of the session state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub endpoint: Option<String>,
    pub current_lead: Lead,
    pub recording: bool,
    pub elapsed_seconds: u32,
    pub lead_samples: [usize; 3],
    pub display_window: Vec<i32>,
    pub derived_len: usize,
    pub finished: bool,
    pub result: Option<AnalysisResult>,
}

/// One-second repeating timer, first tick one period after start.
///
/// Dropping it cancels it.
pub struct RecordingTimer {
    interval: Interval,
}

impl RecordingTimer {
    pub const PERIOD: Duration = Duration::from_secs(1);

    pub fn start() -> Self {
        let mut interval = interval_at(Instant::now() + Self::PERIOD, Self::PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

async fn next_tick(timer: &mut Option<RecordingTimer>) {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

pub struct Session<A> {
    connection: ConnectionManager,
    recorder: RecordingController,
    derived: DerivedLeadSet,
    results: ResultsAssembler,
    analyzer: A,
    config: Config,
    config_path: Option<PathBuf>,
    timer: Option<RecordingTimer>,
    events: EventSlot<SessionEvent>,
}

impl<A: Analyzer> Session<A> {
    pub fn new(config: Config, analyzer: A) -> Self {
        Self {
            connection: ConnectionManager::new(),
            recorder: RecordingController::new(),
            derived: DerivedLeadSet::default(),
            results: ResultsAssembler::new(),
            analyzer,
            config,
            config_path: None,
            timer: None,
            events: EventSlot::new(),
        }
    }

    /// Persist the config (last device address) to `path` after each connect
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn subscribe(&mut self) -> Subscription<SessionEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription<SessionEvent>) -> bool {
        self.events.unsubscribe(subscription)
    }

    pub fn connection_observers(&mut self) -> &mut ConnectionObservers {
        self.connection.observers()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    pub fn derived_leads(&self) -> &DerivedLeadSet {
        &self.derived
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.results.result()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let leads = self.recorder.leads();
        SessionSnapshot {
            connection: self.connection.state(),
            endpoint: self.connection.link().endpoint().map(str::to_string),
            current_lead: self.recorder.current_lead(),
            recording: self.recorder.is_recording(),
            elapsed_seconds: self.recorder.elapsed_seconds(),
            lead_samples: Lead::ALL.map(|lead| leads.get(lead).len()),
            display_window: self.recorder.buffer().display_window().to_vec(),
            derived_len: self.derived.len(),
            finished: self.recorder.is_finished(),
            result: self.results.result().cloned(),
        }
    }

    /// Drive the session until `Shutdown` or until the command channel closes
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Message>) {
        log::info!("Session started");
        if self.config.enable_autoconnect && self.config.device_address.is_some() {
            self.update(Message::Connect(None)).await;
        }

        while let Some(message) = self.next_message(&mut commands).await {
            if !self.update(message).await {
                break;
            }
        }

        self.teardown();
        log::info!("Session ended");
    }

    /// Wait for the next thing to handle. `None` once `commands` is closed.
    ///
    /// A pending user command always wins, so a backlog of socket data cannot
    /// hold up a stop. The timer is polled last: while frames keep arriving a
    /// tick waits behind them, which delays auto-stop by at most the time it
    /// takes to drain the socket queue.
    pub async fn next_message(&mut self, commands: &mut mpsc::UnboundedReceiver<Message>) -> Option<Message> {
        tokio::select! {
            biased;
            command = commands.recv() => command,
            event = self.connection.next_event() => Some(Message::Connection(event)),
            _ = next_tick(&mut self.timer) => Some(Message::Tick),
        }
    }

    /// Handle one message. Returns `false` when the session should end.
    pub async fn update(&mut self, message: Message) -> bool {
        match message {
            Message::Connect(address) => self.connect(address).await,
            Message::Disconnect => self.connection.disconnect(),
            Message::StartRecording => match self.recorder.start(&mut self.connection) {
                Ok(()) => {
                    self.timer = Some(RecordingTimer::start());
                    self.refresh_derived();
                    self.publish(SessionEvent::RecordingStarted(self.recorder.current_lead()));
                }
                Err(e) => self.reject(e.to_string()),
            },
            Message::StopRecording => {
                let summary = self.recorder.stop(&mut self.connection, StopReason::Manual);
                self.on_stopped(summary);
            }
            Message::Tick => {
                let summary = self.recorder.tick(&mut self.connection);
                if summary.is_none() && self.recorder.is_recording() {
                    self.publish(SessionEvent::Elapsed {
                        lead: self.recorder.current_lead(),
                        seconds: self.recorder.elapsed_seconds(),
                    });
                }
                self.on_stopped(summary);
            }
            Message::NextLead => match self.recorder.advance() {
                Ok(Advance::NextLead(lead)) => self.publish(SessionEvent::LeadAdvanced(lead)),
                Ok(Advance::ReadyForAnalysis) => {
                    self.publish(SessionEvent::ReadyForAnalysis {
                        derived_len: self.derived.len(),
                    });
                    self.analyze().await;
                }
                Err(e) => self.reject(e.to_string()),
            },
            Message::Analyze => {
                if self.recorder.is_finished() {
                    self.analyze().await;
                } else {
                    self.reject(RecordingError::LeadsPending.to_string());
                }
            }
            Message::Status => self.publish(SessionEvent::Status(self.snapshot())),
            Message::Connection(ConnectionEvent::Data(text)) => self.on_data(&text),
            Message::Connection(ConnectionEvent::Dropped(e)) => {
                // The recording keeps running; its STOP will fail and be reported
                log::warn!("Device link dropped: {}", e);
            }
            Message::Shutdown => return false,
        }
        true
    }

    async fn connect(&mut self, address: Option<String>) {
        let Some(address) = address.or_else(|| self.config.device_address.clone()) else {
            self.reject("Please enter the device address".to_string());
            return;
        };
        let endpoint = self.config.endpoint_url(&address);

        // Failures are already on the connection's error slot
        if self.connection.connect(&endpoint).await.is_err() {
            return;
        }

        self.config.device_address = Some(address);
        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save_to(path) {
                log::error!("Failed to save config: {}", e);
            }
        }
    }

    fn on_data(&mut self, text: &str) {
        for frame in parse_frames(text) {
            if let FrameEffect::Flushed { lead, flushed } = self.recorder.handle_frame(&frame) {
                if flushed == 0 {
                    continue;
                }
                self.refresh_derived();
                self.publish(SessionEvent::SegmentFlushed {
                    lead,
                    flushed,
                    total: self.recorder.leads().get(lead).len(),
                });
            }
        }
    }

    fn on_stopped(&mut self, summary: Option<StopSummary>) {
        if let Some(summary) = summary {
            self.timer = None;
            self.refresh_derived();
            self.publish(SessionEvent::RecordingStopped(summary));
        }
    }

    async fn analyze(&mut self) {
        match self.results.submit(self.recorder.leads(), &self.analyzer).await {
            Ok(result) => {
                let result = result.clone();
                self.publish(SessionEvent::AnalysisCompleted(result));
            }
            Err(e) => self.reject(e.to_string()),
        }
    }

    /// Full recomputation whenever the three leads all hold samples
    fn refresh_derived(&mut self) {
        let leads = self.recorder.leads();
        self.derived = if leads.all_non_empty() {
            derive_leads(
                leads.samples(Lead::I),
                leads.samples(Lead::II),
                leads.samples(Lead::III),
            )
        } else {
            DerivedLeadSet::default()
        };
    }

    fn reject(&mut self, message: String) {
        log::warn!("{}", message);
        self.publish(SessionEvent::Rejected(message));
    }

    fn publish(&mut self, event: SessionEvent) {
        self.events.publish(event);
    }

    /// Cancel the timer and close the link
    pub fn teardown(&mut self) {
        self.timer = None;
        self.connection.disconnect();
    }
}
