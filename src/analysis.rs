//! # Results Assembly
//!
//! Packages the recorded leads for the external ECG classification service
//! and keeps the verdict it returns.
//!
//! ## Request
//! ```json
//! { "signal_lead1": [..], "signal_lead2": [..] | null,
//!   "signal_lead3": [..] | null, "sampling_rate": 360 }
//! ```
//! Lead I is required. Empty leads II and III are sent as `null`.
//!
//! ## Response
//! ```json
//! { "prediction": "Normal", "confidence": 92.5, "risk_level": "Low Risk" }
//! ```
//! `risk_level` is optional. Without it the risk is derived from the
//! prediction and confidence.
//!
//! A failed call leaves the previous result in place.

use crate::error::AnalysisError;
use crate::recorder::{Lead, LeadStore};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Sampling rate reported to the analysis service, in Hz
pub const SAMPLING_RATE_HZ: u32 = 360;

/// Predictions that count as a normal rhythm, compared case-insensitively
const NORMAL_RHYTHM_LABELS: [&str; 2] = ["Normal", "Normal Sinus Rhythm"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub signal_lead1: Vec<i32>,
    pub signal_lead2: Option<Vec<i32>>,
    pub signal_lead3: Option<Vec<i32>>,
    pub sampling_rate: u32,
}

impl AnalysisRequest {
    pub fn from_leads(leads: &LeadStore) -> Result<Self, AnalysisError> {
        let lead_i = leads.samples(Lead::I);
        if lead_i.is_empty() {
            return Err(AnalysisError::MissingLeadOne);
        }
        let optional = |lead: Lead| {
            let samples = leads.samples(lead);
            (!samples.is_empty()).then(|| samples.to_vec())
        };

        Ok(Self {
            signal_lead1: lead_i.to_vec(),
            signal_lead2: optional(Lead::II),
            signal_lead3: optional(Lead::III),
            sampling_rate: SAMPLING_RATE_HZ,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    pub prediction: String,
    /// Percentage, 0–100
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
}

impl AnalysisVerdict {
    pub fn is_normal_rhythm(&self) -> bool {
        let prediction = self.prediction.trim();
        NORMAL_RHYTHM_LABELS
            .iter()
            .any(|label| prediction.eq_ignore_ascii_case(label))
    }

    /// The service's risk level, or one derived from prediction and confidence
    pub fn risk_level(&self) -> String {
        if let Some(level) = &self.risk_level {
            return level.clone();
        }
        let level = if !self.is_normal_rhythm() {
            "High Risk"
        } else if self.confidence > 80.0 {
            "Low Risk"
        } else if self.confidence > 50.0 {
            "Medium Risk"
        } else {
            "High Risk"
        };
        level.to_string()
    }
}

/// A verdict and when it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub verdict: AnalysisVerdict,
    pub received_at: DateTime<Local>,
}

/// The external classification service
#[async_trait]
pub trait Analyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisVerdict, AnalysisError>;
}

/// Posts requests as JSON to the configured URL
pub struct HttpAnalyzer {
    client: reqwest::Client,
    url: String,
}

impl HttpAnalyzer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisVerdict, AnalysisError> {
        log::info!(
            "Submitting {} lead I samples to {}",
            request.signal_lead1.len(),
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<AnalysisVerdict>()
            .await
            .map_err(|e| AnalysisError::Decode(e.to_string()))
    }
}

/// Holds the latest analysis result for the session
#[derive(Debug, Default)]
pub struct ResultsAssembler {
    result: Option<AnalysisResult>,
}

impl ResultsAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// Package `leads`, call `analyzer`, and keep the verdict on success
    pub async fn submit<A>(&mut self, leads: &LeadStore, analyzer: &A) -> Result<&AnalysisResult, AnalysisError>
    where
        A: Analyzer + ?Sized,
    {
        let request = AnalysisRequest::from_leads(leads)?;
        let verdict = analyzer.analyze(&request).await.map_err(|e| {
            log::error!("{}", e);
            e
        })?;

        log::info!(
            "Analysis: {} ({:.1}%, {})",
            verdict.prediction,
            verdict.confidence,
            verdict.risk_level()
        );
        Ok(&*self.result.insert(AnalysisResult {
            verdict,
            received_at: Local::now(),
        }))
    }
}
