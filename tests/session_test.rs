//! End-to-end session tests against a scripted websocket device

use async_trait::async_trait;
use ecg_leads::analysis::{AnalysisRequest, AnalysisVerdict, Analyzer, SAMPLING_RATE_HZ};
use ecg_leads::error::AnalysisError;
use ecg_leads::leads::DerivedLead;
use ecg_leads::recorder::StopReason;
use ecg_leads::{Config, ConnectionState, Lead, Message, Session, SessionEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Records every request; fails the first `failures` calls
#[derive(Clone, Default)]
struct FakeAnalyzer {
    requests: Arc<Mutex<Vec<AnalysisRequest>>>,
    failures: Arc<AtomicUsize>,
}

impl FakeAnalyzer {
    fn failing_once() -> Self {
        let analyzer = Self::default();
        analyzer.failures.store(1, Ordering::SeqCst);
        analyzer
    }

    fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisVerdict, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AnalysisError::Server {
                status: 503,
                message: "model loading".to_string(),
            });
        }
        Ok(AnalysisVerdict {
            prediction: "Normal".to_string(),
            confidence: 91.5,
            risk_level: None,
        })
    }
}

/// A device that streams `leads[n - 1]` after `LEAD:n` + `START`.
///
/// Returns the `host:port` address and every command the device received.
async fn ecg_device(leads: [Vec<i32>; 3]) -> (String, oneshot::Receiver<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (commands_tx, commands_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut lead = 1usize;
        let mut commands = Vec::new();

        while let Some(Ok(message)) = ws.next().await {
            let WsMessage::Text(text) = message else { continue };
            let command = text.as_str().to_owned();
            if let Some(n) = command.strip_prefix("LEAD:") {
                lead = n.parse().unwrap();
            } else if command == "START" {
                let samples = &leads[lead - 1];
                let (first, rest) = samples.split_at(samples.len() / 2);
                let first: Vec<String> = first.iter().map(i32::to_string).collect();
                let rest: Vec<String> = rest.iter().map(i32::to_string).collect();
                // One comma line then a buffer flush, then single samples
                ws.send(WsMessage::text(format!(
                    "STATUS:RECORDING\nDATA:START\n{}\nBUFFER:FULL",
                    first.join(",")
                )))
                .await
                .unwrap();
                ws.send(WsMessage::text(format!("{}\nDATA:END", rest.join("\n"))))
                    .await
                    .unwrap();
            } else if command == "STOP" {
                // Trailing sample after the stop must not be recorded
                ws.send(WsMessage::text("STATUS:STOPPED\n999")).await.unwrap();
            }
            commands.push(command);
        }
        let _ = commands_tx.send(commands);
    });

    (addr, commands_rx)
}

/// Handle messages until `done` holds
async fn pump_until<F>(session: &mut Session<FakeAnalyzer>, rx: &mut mpsc::UnboundedReceiver<Message>, done: F)
where
    F: Fn(&Session<FakeAnalyzer>) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(&*session) {
            let message = session.next_message(rx).await.unwrap();
            session.update(message).await;
        }
    })
    .await
    .expect("session did not reach the expected state");
}

fn lead_data() -> [Vec<i32>; 3] {
    [
        vec![100, 110, 120, 130],
        vec![200, 210, 220],
        vec![300, 310, 320, 330, 340],
    ]
}

async fn record_all_leads(
    session: &mut Session<FakeAnalyzer>,
    rx: &mut mpsc::UnboundedReceiver<Message>,
    leads: &[Vec<i32>; 3],
) {
    for lead in Lead::ALL {
        let expected = leads[usize::from(lead.number() - 1)].clone();
        assert!(session.update(Message::StartRecording).await);
        pump_until(session, rx, |s| s.recorder().leads().samples(lead).len() >= expected.len()).await;
        session.update(Message::StopRecording).await;
        assert_eq!(session.recorder().leads().samples(lead), expected.as_slice());
        session.update(Message::NextLead).await;
    }
}

#[tokio::test]
async fn test_three_lead_session() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let leads = lead_data();
    let (addr, commands) = ecg_device(leads.clone()).await;
    let analyzer = FakeAnalyzer::default();
    let (_tx, mut rx) = mpsc::unbounded_channel();

    let mut session = Session::new(Config::default(), analyzer.clone()).with_config_path(config_path.clone());
    let events = session.subscribe();

    session.update(Message::Connect(Some(addr.clone()))).await;
    assert_eq!(session.connection().state(), ConnectionState::Connected);
    assert_eq!(
        Config::load_from(&config_path).unwrap().device_address,
        Some(addr.clone())
    );

    record_all_leads(&mut session, &mut rx, &leads).await;

    assert!(session.recorder().is_finished());
    let derived = session.derived_leads();
    assert_eq!(derived.len(), 3);
    assert_eq!(derived.get(DerivedLead::AVR)[0], -150.0);
    assert_eq!(derived.get(DerivedLead::AVL)[2], 10.0);

    let result = session.result().expect("analysis result");
    assert_eq!(result.verdict.prediction, "Normal");
    assert_eq!(result.verdict.risk_level(), "Low Risk");

    let requests = analyzer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].signal_lead1, leads[0]);
    assert_eq!(requests[0].signal_lead2.as_ref(), Some(&leads[1]));
    assert_eq!(requests[0].signal_lead3.as_ref(), Some(&leads[2]));
    assert_eq!(requests[0].sampling_rate, SAMPLING_RATE_HZ);

    let events = events.drain();
    for expected in [
        SessionEvent::RecordingStarted(Lead::I),
        SessionEvent::LeadAdvanced(Lead::II),
        SessionEvent::LeadAdvanced(Lead::III),
        SessionEvent::ReadyForAnalysis { derived_len: 3 },
    ] {
        assert!(events.contains(&expected), "missing {:?}", expected);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::AnalysisCompleted(_))));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::RecordingStopped(summary) if summary.lead == Lead::III && summary.reason == StopReason::Manual
    )));

    session.update(Message::Disconnect).await;
    let commands = tokio::time::timeout(Duration::from_secs(5), commands)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        commands,
        vec!["LEAD:1", "START", "STOP", "LEAD:2", "START", "STOP", "LEAD:3", "START", "STOP"]
    );
}

#[tokio::test]
async fn test_retry_after_failed_analysis() {
    let leads = lead_data();
    let (addr, _commands) = ecg_device(leads.clone()).await;
    let analyzer = FakeAnalyzer::failing_once();
    let (_tx, mut rx) = mpsc::unbounded_channel();

    let mut session = Session::new(Config::default(), analyzer.clone());
    let events = session.subscribe();
    session.update(Message::Connect(Some(addr))).await;

    record_all_leads(&mut session, &mut rx, &leads).await;

    assert!(session.result().is_none());
    assert!(events
        .drain()
        .contains(&SessionEvent::Rejected("Analysis failed: service returned 503: model loading".to_string())));

    session.update(Message::Analyze).await;

    assert!(session.result().is_some());
    assert_eq!(analyzer.requests().len(), 2);
    assert!(matches!(
        events.try_recv(),
        Some(SessionEvent::AnalysisCompleted(_))
    ));
}

#[tokio::test]
async fn test_analyze_waits_for_all_three_leads() {
    let leads = lead_data();
    let (addr, _commands) = ecg_device(leads.clone()).await;
    let analyzer = FakeAnalyzer::default();
    let (_tx, mut rx) = mpsc::unbounded_channel();

    let mut session = Session::new(Config::default(), analyzer.clone());
    let events = session.subscribe();
    session.update(Message::Connect(Some(addr))).await;

    session.update(Message::StartRecording).await;
    pump_until(&mut session, &mut rx, |s| s.recorder().leads().samples(Lead::I).len() >= 4).await;
    session.update(Message::StopRecording).await;

    session.update(Message::Analyze).await;

    assert!(!session.recorder().is_finished());
    assert!(analyzer.requests().is_empty());
    assert!(session.result().is_none());
    assert_eq!(
        events.drain().last(),
        Some(&SessionEvent::Rejected(
            "Please record all three leads before analysis".to_string()
        ))
    );
}

#[tokio::test]
async fn test_device_drop_keeps_recorded_samples() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if matches!(&message, WsMessage::Text(text) if text.as_str() == "START") {
                ws.send(WsMessage::text("DATA:START\n1,2,3\nDATA:END")).await.unwrap();
                let _ = ws.close(None).await;
                return;
            }
        }
    });

    let (_tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new(Config::default(), FakeAnalyzer::default());
    let events = session.subscribe();
    let errors = session.connection_observers().error.subscribe();

    session.update(Message::Connect(Some(addr))).await;
    session.update(Message::StartRecording).await;
    pump_until(&mut session, &mut rx, |s| {
        s.connection().state() == ConnectionState::Disconnected
    })
    .await;

    assert!(session.recorder().is_recording());
    assert_eq!(session.recorder().leads().samples(Lead::I), &[1, 2, 3]);
    assert!(!errors.drain().is_empty());

    session.update(Message::StopRecording).await;
    assert!(!session.recorder().is_recording());
    assert!(!session.timer_running());
    assert_eq!(session.recorder().leads().samples(Lead::I), &[1, 2, 3]);

    session.update(Message::NextLead).await;
    session.update(Message::StartRecording).await;

    let events = events.drain();
    assert!(events.contains(&SessionEvent::LeadAdvanced(Lead::II)));
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Rejected("Please connect to a device first".to_string()))
    );
}

#[tokio::test]
async fn test_run_autoconnects_to_stored_device() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (accepted_tx, accepted_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = accepted_tx.send(());
        while let Some(Ok(_)) = ws.next().await {}
    });

    let config = Config {
        device_address: Some(addr),
        enable_autoconnect: true,
        ..Config::default()
    };
    let mut session = Session::new(config, FakeAnalyzer::default());
    let states = session.connection_observers().state.subscribe();

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(Message::Shutdown).unwrap();
    session.run(rx).await;

    assert!(accepted_rx.await.is_ok());
    assert_eq!(
        states.drain(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected
        ]
    );
}
