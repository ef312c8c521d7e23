//! # Lead Recording Module
//!
//! Drives the sequential three-lead recording procedure.
//!
//! ## State Machine
//! ```text
//!            start (connected)
//!   Idle ─────────────────────────▶ Recording
//!    ▲                                 │
//!    └──── stop (manual, or elapsed ───┘
//!          reaches MAX_RECORDING_SECONDS)
//! ```
//!
//! While recording, frames from the device move samples through the
//! [`SampleBuffer`]: `BUFFER:FULL` and `DATA:END` flush the accumulator into
//! the current lead, `DATA:START` clears it. Flushes within one recording
//! append. Starting a recording resets the current lead to empty.
//!
//! ## Lead Sequence
//! Lead I → Lead II → Lead III → assembly phase. Advancing needs an idle
//! recorder and a non-empty current lead, and marks that lead complete.
//!
//! The controller owns no timer. Its owner ticks it once per second while
//! [`is_recording`](RecordingController::is_recording) holds.

use crate::buffer::SampleBuffer;
use crate::connection::CommandLink;
use crate::error::RecordingError;
use crate::protocol::{Command, Frame};
use std::fmt;

/// Recording window per lead
pub const MAX_RECORDING_SECONDS: u32 = 15;

/// One of the three directly captured limb leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lead {
    I,
    II,
    III,
}

impl Lead {
    pub const ALL: [Lead; 3] = [Lead::I, Lead::II, Lead::III];

    pub fn number(&self) -> u8 {
        match self {
            Lead::I => 1,
            Lead::II => 2,
            Lead::III => 3,
        }
    }

    pub fn from_number(number: u8) -> Option<Lead> {
        match number {
            1 => Some(Lead::I),
            2 => Some(Lead::II),
            3 => Some(Lead::III),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<Lead> {
        match self {
            Lead::I => Some(Lead::II),
            Lead::II => Some(Lead::III),
            Lead::III => None,
        }
    }

    fn index(&self) -> usize {
        usize::from(self.number() - 1)
    }
}

impl fmt::Display for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lead::I => write!(f, "I"),
            Lead::II => write!(f, "II"),
            Lead::III => write!(f, "III"),
        }
    }
}

/// Samples captured for one lead
#[derive(Debug, Clone, PartialEq)]
pub struct LeadRecording {
    lead: Lead,
    samples: Vec<i32>,
    complete: bool,
}

impl LeadRecording {
    pub fn new(lead: Lead) -> Self {
        Self {
            lead,
            samples: Vec::new(),
            complete: false,
        }
    }

    pub fn lead(&self) -> Lead {
        self.lead
    }

    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Append a flushed segment. Completed recordings are left untouched.
    fn append(&mut self, segment: &[i32]) -> bool {
        if self.complete {
            log::warn!("Lead {} is complete, ignoring {} samples", self.lead, segment.len());
            return false;
        }
        self.samples.extend_from_slice(segment);
        true
    }

    fn reset(&mut self) {
        if !self.complete {
            self.samples.clear();
        }
    }

    fn mark_complete(&mut self) {
        self.complete = true;
    }
}

/// The three lead recordings of a session
#[derive(Debug, Clone, PartialEq)]
pub struct LeadStore {
    leads: [LeadRecording; 3],
}

impl Default for LeadStore {
    fn default() -> Self {
        Self {
            leads: Lead::ALL.map(LeadRecording::new),
        }
    }
}

impl LeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, lead: Lead) -> &LeadRecording {
        &self.leads[lead.index()]
    }

    pub fn samples(&self, lead: Lead) -> &[i32] {
        self.get(lead).samples()
    }

    pub fn all_non_empty(&self) -> bool {
        self.leads.iter().all(|recording| !recording.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeadRecording> {
        self.leads.iter()
    }

    fn get_mut(&mut self, lead: Lead) -> &mut LeadRecording {
        &mut self.leads[lead.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Manual,
    Auto,
}

/// Result of a stop that actually ended a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    pub lead: Lead,
    pub reason: StopReason,
    /// Samples moved from the accumulator by this stop
    pub flushed: usize,
    /// Samples held by the lead afterwards
    pub total: usize,
}

/// Where an accepted advance leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NextLead(Lead),
    ReadyForAnalysis,
}

/// What a frame did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEffect {
    None,
    Buffered,
    Cleared,
    /// Samples were committed to the current lead
    Flushed { lead: Lead, flushed: usize },
}

pub struct RecordingController {
    state: RecordingState,
    current_lead: Lead,
    elapsed_seconds: u32,
    buffer: SampleBuffer,
    leads: LeadStore,
    finished: bool,
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingController {
    pub fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            current_lead: Lead::I,
            elapsed_seconds: 0,
            buffer: SampleBuffer::new(),
            leads: LeadStore::new(),
            finished: false,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn current_lead(&self) -> Lead {
        self.current_lead
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    /// All three leads are done and the session awaits analysis
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn leads(&self) -> &LeadStore {
        &self.leads
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// Begin capturing the current lead.
    ///
    /// Rejections leave every field untouched.
    pub fn start(&mut self, link: &mut impl CommandLink) -> Result<(), RecordingError> {
        if self.finished {
            return Err(RecordingError::SessionFinished);
        }
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        if !link.is_connected() {
            return Err(RecordingError::NotConnected);
        }

        log::info!("Recording Lead {}", self.current_lead);
        self.buffer.clear_display();
        self.buffer.flush();
        self.elapsed_seconds = 0;
        self.leads.get_mut(self.current_lead).reset();
        self.state = RecordingState::Recording;

        send(link, Command::SelectLead(self.current_lead));
        send(link, Command::Start);
        Ok(())
    }

    /// End the recording, whichever trigger fired. No-op while idle.
    pub fn stop(&mut self, link: &mut impl CommandLink, reason: StopReason) -> Option<StopSummary> {
        if !self.is_recording() {
            return None;
        }

        send(link, Command::Stop);
        self.state = RecordingState::Idle;
        let flushed = self.commit();
        let total = self.leads.get(self.current_lead).len();
        log::info!(
            "Stopped Lead {} ({:?}): {} samples flushed, {} total",
            self.current_lead,
            reason,
            flushed,
            total
        );

        Some(StopSummary {
            lead: self.current_lead,
            reason,
            flushed,
            total,
        })
    }

    /// One second of recording time. Stops at [`MAX_RECORDING_SECONDS`].
    pub fn tick(&mut self, link: &mut impl CommandLink) -> Option<StopSummary> {
        if !self.is_recording() {
            return None;
        }
        self.elapsed_seconds = (self.elapsed_seconds + 1).min(MAX_RECORDING_SECONDS);
        if self.elapsed_seconds >= MAX_RECORDING_SECONDS {
            return self.stop(link, StopReason::Auto);
        }
        None
    }

    pub fn handle_frame(&mut self, frame: &Frame) -> FrameEffect {
        if !self.is_recording() {
            // Trailing samples after a stop only reach the preview
            match frame {
                Frame::SampleLine(values) => self.buffer.push_display(values),
                Frame::SingleSample(value) => self.buffer.push_display(&[*value]),
                _ => {}
            }
            return FrameEffect::None;
        }

        match frame {
            Frame::Status(status) => {
                log::debug!("Device status: {}", status);
                FrameEffect::None
            }
            Frame::BufferFull | Frame::DataEnd => {
                let flushed = self.commit();
                FrameEffect::Flushed {
                    lead: self.current_lead,
                    flushed,
                }
            }
            Frame::DataStart => {
                self.buffer.on_data_start();
                FrameEffect::Cleared
            }
            Frame::SampleLine(values) => {
                self.buffer.on_sample_line(values);
                FrameEffect::Buffered
            }
            Frame::SingleSample(value) => {
                self.buffer.on_single_sample(*value);
                FrameEffect::Buffered
            }
        }
    }

    /// Move on from the current lead once it holds samples
    pub fn advance(&mut self) -> Result<Advance, RecordingError> {
        if self.finished {
            return Err(RecordingError::SessionFinished);
        }
        if self.is_recording() {
            return Err(RecordingError::StillRecording);
        }
        if self.leads.get(self.current_lead).is_empty() {
            return Err(RecordingError::IncompleteLead(self.current_lead));
        }

        self.leads.get_mut(self.current_lead).mark_complete();
        match self.current_lead.next() {
            Some(next) => {
                log::info!("Lead {} complete, moving to Lead {}", self.current_lead, next);
                self.current_lead = next;
                self.elapsed_seconds = 0;
                self.buffer.clear_display();
                Ok(Advance::NextLead(next))
            }
            None => {
                log::info!("All leads recorded");
                self.finished = true;
                Ok(Advance::ReadyForAnalysis)
            }
        }
    }

    /// Flush the accumulator into the current lead. Empty flushes change nothing.
    fn commit(&mut self) -> usize {
        let segment = self.buffer.flush();
        if segment.is_empty() {
            return 0;
        }
        if self.leads.get_mut(self.current_lead).append(&segment) {
            log::debug!("Lead {}: +{} samples", self.current_lead, segment.len());
            segment.len()
        } else {
            0
        }
    }
}

/// Commands are fire-and-forget here; the link reports its own failures
fn send(link: &mut impl CommandLink, command: Command) {
    if let Err(e) = link.send_command(command) {
        log::warn!("{} not delivered: {}", command, e);
    }
}
