//! # ECG Leads
//!
//! Records limb leads I, II and III from a networked ECG acquisition device,
//! derives the remaining nine leads, and submits the recording to a remote
//! rhythm classification service.
//!
//! [`session::Session`] ties the pieces together; the other modules can be
//! used on their own.

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod leads;
pub mod observer;
pub mod protocol;
pub mod recorder;
pub mod session;

pub use analysis::{AnalysisResult, Analyzer, HttpAnalyzer, ResultsAssembler};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
pub use leads::{derive_leads, DerivedLead, DerivedLeadSet};
pub use recorder::{Lead, RecordingController};
pub use session::{Message, Session, SessionEvent, SessionSnapshot};
