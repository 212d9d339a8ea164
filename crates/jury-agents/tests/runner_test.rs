//! Offline runner test - seats a panel from a file, runs a scripted session
//! and checks the transcript and summary sinks on disk.

use std::sync::Arc;

use deliberation::{
    DeliberationOrchestrator, Framing, ScriptedGenerator, SessionStore, TopicTable, TurnResponse,
};
use jury_agents::panel::PanelFile;
use jury_agents::telemetry::{append_summary, write_transcript, SessionSummary, TranscriptLine};

const PANEL: &str = r#"
[config]
total_rounds = 2
responders_per_round = 1

[[jurors]]
id = "skeptic"
name = "Iris"
initial_conviction = 20
influence_power = 1.0

[jurors.topic_affinity]
"外部攻击" = 10

[[jurors]]
id = "believer"
initial_conviction = 70

[jurors.topic_affinity]
"external_attack" = 10
"#;

#[tokio::test]
async fn test_offline_session_writes_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let file = PanelFile::from_toml_str(PANEL).unwrap();
    let topics = TopicTable::default();

    let generator = Arc::new(ScriptedGenerator::new().with_responses(vec![
        TurnResponse::new("Someone broke in.", &["外部攻击"], Framing::Positive),
        TurnResponse::new("Maybe.", &[], Framing::Neutral),
    ]));
    let orchestrator =
        DeliberationOrchestrator::with_config(file.config.clone(), topics.clone(), generator);
    let store = SessionStore::new();
    let id = store.create(file.seat(&topics)).await;
    for _ in 0..3 {
        store.advance(&id, "walk").await.unwrap();
    }

    let handle = store.get(&id).await.unwrap();
    let mut session = handle.lock().await;
    let outcomes = orchestrator.deliberate(&mut session, None).await.unwrap();
    assert_eq!(outcomes.len(), 2);

    // believer (polarity 20) vs skeptic (30): skeptic leads round one.
    // believer: 10 * 1.0 * 1.0 * (1 - 50/100) = 5
    assert_eq!(outcomes[0].leader(), Some("skeptic"));
    assert_eq!(session.panel().get("believer").unwrap().conviction(), 75);

    let transcript_path = dir.path().join("transcript.jsonl");
    let written = write_transcript(&session, &transcript_path).unwrap();
    assert_eq!(written, 4);

    let text = std::fs::read_to_string(&transcript_path).unwrap();
    let lines: Vec<TranscriptLine> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0].speaker_id, "skeptic");
    assert_eq!(lines[0].topics, vec!["external_attack".to_string()]);
    assert_eq!(lines[0].deltas["believer"], 5);

    let summary_path = dir.path().join("summaries.jsonl");
    let summary = SessionSummary::from_session(&session);
    append_summary(&summary, &summary_path);
    append_summary(&summary, &summary_path);
    let text = std::fs::read_to_string(&summary_path).unwrap();
    assert_eq!(text.lines().count(), 2);
    let parsed: SessionSummary = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(parsed.rounds, 2);
    assert_eq!(parsed.initial["believer"], 70);
    assert_eq!(parsed.r#final["believer"], 75);
}

#[test]
fn test_load_panel_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("panel.toml");
    std::fs::write(&path, PANEL).unwrap();

    let file = PanelFile::load(&path).unwrap();
    assert_eq!(file.jurors.len(), 2);
    assert_eq!(file.cards()["skeptic"].profile.name, "Iris");

    let missing = dir.path().join("missing.toml");
    assert!(PanelFile::load(&missing).is_err());
}
