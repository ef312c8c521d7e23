//! ECG lead acquisition from the terminal.
//!
//! Reads one command per line from stdin and prints session events as they
//! arrive.

use clap::Parser;
use crossbeam_channel::select;
use ecg_leads::analysis::AnalysisResult;
use ecg_leads::buffer::SampleSliceExt;
use ecg_leads::observer::Subscription;
use ecg_leads::recorder::{StopReason, MAX_RECORDING_SECONDS};
use ecg_leads::{Config, ConnectionState, HttpAnalyzer, Message, Session, SessionEvent, SessionSnapshot};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "ecg-leads")]
#[command(version)]
#[command(about = "Record leads I, II and III from a networked ECG device", long_about = None)]
struct Cli {
    /// Device address: a host, host:port, or ws:// URL
    #[arg(short, long)]
    device: Option<String>,

    /// Rhythm analysis endpoint
    #[arg(long)]
    analysis_url: Option<String>,

    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

const HELP: &str = "\
Commands:
  connect [address]  connect to the device (stored address if omitted)
  disconnect         close the device link
  start              start recording the current lead
  stop               stop recording
  next               accept the current lead and move on
  analyze            submit the recorded leads for analysis
  status             show the session state
  quit               exit";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = match Config::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    };
    if let Some(url) = cli.analysis_url {
        config.analysis_url = url;
    }
    let connect_now = cli.device.is_some() && !config.enable_autoconnect;
    if let Some(device) = cli.device {
        config.device_address = Some(device);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let analyzer = HttpAnalyzer::new(config.analysis_url.clone());
        let mut session = Session::new(config, analyzer).with_config_path(config_path);

        let events = session.subscribe();
        let states = session.connection_observers().state.subscribe();
        let errors = session.connection_observers().error.subscribe();
        let printer = thread::spawn(move || print_events(events, states, errors));

        let (commands, rx) = mpsc::unbounded_channel();
        if connect_now {
            let _ = commands.send(Message::Connect(None));
        }
        read_commands(commands);

        println!("{}", HELP);
        session.run(rx).await;

        // Dropping the session closes the printer's channels
        if printer.join().is_err() {
            log::error!("Event printer panicked");
        }
    });

    ExitCode::SUCCESS
}

/// Forward stdin lines to the session until EOF or `quit`
fn read_commands(commands: mpsc::UnboundedSender<Message>) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(message) = parse_command(&line) else {
                if !line.trim().is_empty() {
                    eprintln!("Unknown command: {}\n{}", line.trim(), HELP);
                }
                continue;
            };
            let quit = message == Message::Shutdown;
            if commands.send(message).is_err() || quit {
                return;
            }
        }
        let _ = commands.send(Message::Shutdown);
    });
}

fn parse_command(line: &str) -> Option<Message> {
    let mut words = line.split_whitespace();
    let message = match words.next()? {
        "connect" => Message::Connect(words.next().map(str::to_string)),
        "disconnect" => Message::Disconnect,
        "start" => Message::StartRecording,
        "stop" => Message::StopRecording,
        "next" => Message::NextLead,
        "analyze" | "retry" => Message::Analyze,
        "status" => Message::Status,
        "quit" | "exit" => Message::Shutdown,
        _ => return None,
    };
    Some(message)
}

fn print_events(
    events: Subscription<SessionEvent>,
    states: Subscription<ConnectionState>,
    errors: Subscription<String>,
) {
    loop {
        select! {
            recv(events.receiver()) -> event => match event {
                Ok(event) => print_event(&event),
                Err(_) => return,
            },
            recv(states.receiver()) -> state => {
                if let Ok(state) = state {
                    println!("Device: {:?}", state);
                }
            },
            recv(errors.receiver()) -> error => {
                if let Ok(error) = error {
                    eprintln!("Error: {}", error);
                }
            },
        }
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::RecordingStarted(lead) => {
            println!("Recording Lead {} (up to {} s)", lead, MAX_RECORDING_SECONDS)
        }
        SessionEvent::Elapsed { lead, seconds } => {
            println!("Lead {}: {}/{} s", lead, seconds, MAX_RECORDING_SECONDS)
        }
        SessionEvent::RecordingStopped(summary) => {
            let how = match summary.reason {
                StopReason::Manual => "stopped",
                StopReason::Auto => "finished",
            };
            println!("Lead {} {}: {} samples", summary.lead, how, summary.total);
        }
        SessionEvent::SegmentFlushed { lead, flushed, total } => {
            log::debug!("Lead {}: +{} samples ({} total)", lead, flushed, total)
        }
        SessionEvent::LeadAdvanced(lead) => println!("Next: Lead {}", lead),
        SessionEvent::ReadyForAnalysis { derived_len } => {
            println!("All leads recorded, {} derived samples per lead. Analyzing...", derived_len)
        }
        SessionEvent::AnalysisCompleted(result) => print_result(result),
        SessionEvent::Rejected(message) => eprintln!("{}", message),
        SessionEvent::Status(snapshot) => print_status(snapshot),
    }
}

fn print_result(result: &AnalysisResult) {
    let verdict = &result.verdict;
    println!("Analysis at {}", result.received_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Prediction: {}", verdict.prediction);
    println!("  Confidence: {:.1}%", verdict.confidence);
    println!("  Risk level: {}", verdict.risk_level());
    if verdict.is_normal_rhythm() {
        println!("  Normal sinus rhythm");
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    println!(
        "Device: {:?} ({})",
        snapshot.connection,
        snapshot.endpoint.as_deref().unwrap_or("no endpoint")
    );
    println!(
        "Lead {}: {} ({} s)",
        snapshot.current_lead,
        if snapshot.recording { "recording" } else { "idle" },
        snapshot.elapsed_seconds
    );
    println!(
        "Samples: I={} II={} III={}, derived={}",
        snapshot.lead_samples[0], snapshot.lead_samples[1], snapshot.lead_samples[2], snapshot.derived_len
    );
    if let Some((min, max)) = snapshot.display_window.min_max_value() {
        println!("Preview range: {}..{}", min, max);
    }
    if let Some(result) = &snapshot.result {
        print_result(result);
    }
}
