use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use deliberation::{
    DeliberationEvent, DeliberationOrchestrator, EventBus, ScriptedGenerator, SessionStore,
    TopicTable, TurnGenerator, CONVICTION_NEUTRAL,
};
use jury_agents::config::{check_endpoint, RunnerConfig};
use jury_agents::llm::ChatCompletionsGenerator;
use jury_agents::panel::PanelFile;
use jury_agents::telemetry::{append_summary, join_sink, write_transcript, SessionSummary};
use tracing::{info, warn};

/// Run one jury deliberation session end to end.
#[derive(Debug, Parser)]
#[command(name = "jury-agents", version)]
struct Args {
    /// Deliberation rounds (overrides the panel file).
    #[arg(long)]
    rounds: Option<u32>,

    /// TOML panel file; the built-in panel is used when omitted.
    #[arg(long)]
    panel: Option<PathBuf>,

    /// Use the scripted generator instead of an LLM endpoint.
    #[arg(long)]
    offline: bool,

    /// Write the transcript as JSON lines to this path.
    #[arg(long)]
    transcript: Option<PathBuf>,

    /// Append a one-line session summary to this path.
    #[arg(long)]
    summary_log: Option<PathBuf>,

    /// Evidence ids to present during investigation.
    #[arg(long = "evidence")]
    evidence: Vec<String>,

    /// Note to pass before deliberation, as TARGET=TEXT. Repeatable.
    #[arg(long = "note")]
    notes: Vec<String>,
}

fn print_event(event: &DeliberationEvent) {
    match event {
        DeliberationEvent::RoundStarted {
            round,
            leader,
            responders,
            ..
        } => println!("\n== Round {round}: {leader} leads, {} respond ==", responders.join(", ")),
        DeliberationEvent::TurnCompleted {
            speaker,
            role,
            text,
            deltas,
            ..
        } => {
            println!("[{role}] {speaker}: {text}");
            let moved: Vec<String> = deltas
                .iter()
                .filter(|(_, d)| **d != 0)
                .map(|(id, d)| format!("{id} {d:+}"))
                .collect();
            if !moved.is_empty() {
                println!("    shifts: {}", moved.join(", "));
            }
        }
        DeliberationEvent::NoteReceived {
            target, remaining, ..
        } => println!("Note passed to {target} ({remaining} left)"),
        DeliberationEvent::PhaseChanged { from, to, .. } => println!("-- {from} -> {to} --"),
        DeliberationEvent::SessionReset { .. } => println!("-- session reset --"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut panel_file = match &args.panel {
        Some(path) => PanelFile::load(path)?,
        None => PanelFile::builtin(),
    };
    if let Some(rounds) = args.rounds {
        panel_file.config.total_rounds = rounds;
        panel_file.config.validate()?;
    }

    let generator: Arc<dyn TurnGenerator> = if args.offline {
        Arc::new(ScriptedGenerator::new())
    } else {
        let runner = RunnerConfig::default();
        if !check_endpoint(&runner.endpoint.url).await {
            bail!(
                "LLM endpoint {} is unreachable; set JURY_LLM_URL or pass --offline",
                runner.endpoint.url
            );
        }
        Arc::new(ChatCompletionsGenerator::new(runner, panel_file.cards())?)
    };
    info!(
        generator = generator.name(),
        jurors = panel_file.jurors.len(),
        rounds = panel_file.config.total_rounds,
        "Jury runner starting"
    );

    let bus = EventBus::new().shared();
    let mut rx = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let topics = TopicTable::default();
    let store = SessionStore::new().with_events(bus.clone());
    let orchestrator = DeliberationOrchestrator::with_config(
        panel_file.config.clone(),
        topics.clone(),
        generator,
    )
    .with_events(bus.clone());

    let id = store.create(panel_file.seat(&topics)).await;

    store.advance(&id, "case opened").await?;
    if !args.evidence.is_empty() {
        let evidence: Vec<&str> = args.evidence.iter().map(String::as_str).collect();
        store.unlock_resources(&id, &evidence).await?;
    }
    store.advance(&id, "evidence reviewed").await?;
    store.advance(&id, "jury retires").await?;

    let handle = store.get(&id).await?;
    let summary = {
        let mut session = handle.lock().await;
        for (i, raw) in args.notes.iter().enumerate() {
            let (target, text) = raw
                .split_once('=')
                .with_context(|| format!("Note must be TARGET=TEXT, got {raw:?}"))?;
            match orchestrator.submit_note(&mut session, target, text, &format!("cli-note-{i}")) {
                Ok(_) => {}
                Err(e) if e.is_note_rejection() => warn!(juror = target, error = %e, "Note rejected"),
                Err(e) => return Err(e.into()),
            }
        }

        orchestrator.deliberate(&mut session, None).await?;
        info!(status = %session.status_line(), "Deliberation finished");

        if let Some(path) = &args.transcript {
            write_transcript(&session, path)?;
        }
        SessionSummary::from_session(&session)
    };
    if let Some(path) = &args.summary_log {
        append_summary(&summary, path);
    }
    let convictions = store.collect_convictions(&id).await?;

    // Closing every sender lets the printer drain and exit.
    drop(orchestrator);
    drop(store);
    drop(bus);
    join_sink("event printer", printer).await;

    let (guilty, not_guilty) = summary.tally(CONVICTION_NEUTRAL);
    println!("\nVerdict tally: {guilty} guilty, {not_guilty} not guilty");
    for (juror, conviction) in convictions {
        println!("  {juror}: {conviction}");
    }

    Ok(())
}
