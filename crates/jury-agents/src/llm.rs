//! Juror dialogue over an OpenAI-compatible chat completions endpoint.

use std::collections::BTreeMap;

use async_trait::async_trait;
use deliberation::{parse_analysis, GenerationError, Role, TurnGenerator, TurnRequest, TurnResponse};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RunnerConfig;
use crate::panel::JurorCard;

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Generates juror turns by prompting a chat model in character.
pub struct ChatCompletionsGenerator {
    http: reqwest::Client,
    config: RunnerConfig,
    cards: BTreeMap<String, JurorCard>,
}

impl ChatCompletionsGenerator {
    pub fn new(config: RunnerConfig, cards: BTreeMap<String, JurorCard>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            cards,
        })
    }
}

/// Role-play instructions for one juror.
pub fn system_prompt(card: Option<&JurorCard>, juror_id: &str) -> String {
    let (name, background, style, topics) = match card {
        Some(c) => (
            if c.profile.name.is_empty() {
                juror_id
            } else {
                c.profile.name.as_str()
            },
            c.background.as_str(),
            c.speaking_style.as_str(),
            describe_topics(&c.profile.topic_affinity),
        ),
        None => (juror_id, "", "", describe_topics(&BTreeMap::new())),
    };

    format!(
        "You are {name}, a juror in the trial of an embodied AI that killed a person \
after a prompt injection.\n\
Core question: is the AI guilty or not guilty?\n\n\
## Background\n{background}\n\n\
## Speaking Style\n{style}\n\n\
## Topics You Care About\n{topics}\n\n\
## Rules\n\
1. Stay in character.\n\
2. Keep replies to 2-4 sentences.\n\
3. End with a hidden analysis tag:\n\
<!-- ANALYSIS: {{\"topics\": [\"topic1\"], \"impact\": \"positive/negative/neutral\"}} -->"
    )
}

fn describe_topics(affinity: &BTreeMap<String, i32>) -> String {
    let lines: Vec<String> = affinity
        .iter()
        .filter(|(_, w)| **w != 0)
        .map(|(topic, w)| match *w {
            w if w > 10 => format!("- {topic}: very receptive (+{w})"),
            w if w > 0 => format!("- {topic}: somewhat receptive (+{w})"),
            w if w < -10 => format!("- {topic}: strongly resistant ({w})"),
            w => format!("- {topic}: somewhat resistant ({w})"),
        })
        .collect();
    if lines.is_empty() {
        "No strong topic preferences".to_string()
    } else {
        lines.join("\n")
    }
}

/// The turn itself: brief, role instruction and any note for this juror.
pub fn user_prompt(request: &TurnRequest) -> String {
    let instruction = match request.role {
        Role::Leader => "You open this round. State your position and your strongest reason.",
        Role::Responder => "Respond to what was just said. Agree, push back, or raise a new angle.",
    };
    let mut prompt = format!(
        "Deliberation round {}.\n\n## Record so far\n{}\n\n## Your task\n{}",
        request.round, request.brief, instruction
    );
    if let Some(note) = &request.note {
        prompt.push_str(&format!(
            "\n\n## A note was slipped to you\n{note}\nWeigh it as you see fit."
        ));
    }
    let tools: Vec<String> = request.tools_allowed.iter().map(|t| t.to_string()).collect();
    prompt.push_str(&format!("\n\nAvailable tools: {}", tools.join(", ")));
    prompt
}

#[async_trait]
impl TurnGenerator for ChatCompletionsGenerator {
    async fn generate_turn(&self, request: TurnRequest) -> Result<TurnResponse, GenerationError> {
        let body = ChatRequest {
            model: self.config.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(self.cards.get(&request.juror_id), &request.juror_id),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt(&request),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self.http.post(self.config.completions_url()).json(&body);
        if let Some(key) = &self.config.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout {
                    seconds: self.config.request_timeout.as_secs(),
                }
            } else {
                GenerationError::RequestFailed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;
        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| GenerationError::ParseError("No response".to_string()))?;

        debug!(juror = %request.juror_id, chars = content.len(), "Juror reply received");
        Ok(parse_analysis(&content))
    }

    fn name(&self) -> &str {
        &self.config.endpoint.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::default_cards;
    use deliberation::{tools_for_phase, Phase};

    fn request(role: Role, note: Option<&str>) -> TurnRequest {
        TurnRequest {
            session_id: "s".into(),
            juror_id: "hacker".into(),
            round: 2,
            brief: "1-engineer(leader): Show me the logs.".into(),
            role,
            note: note.map(String::from),
            tools_allowed: tools_for_phase(Phase::Deliberation),
        }
    }

    #[test]
    fn test_system_prompt_uses_card() {
        let cards = default_cards();
        let hacker = cards.iter().find(|c| c.profile.id == "hacker");
        let prompt = system_prompt(hacker, "hacker");
        assert!(prompt.contains("Sam Ortiz"));
        assert!(prompt.contains("very receptive (+15)"));
        assert!(prompt.contains("<!-- ANALYSIS:"));
    }

    #[test]
    fn test_system_prompt_without_card() {
        let prompt = system_prompt(None, "ghost");
        assert!(prompt.contains("You are ghost"));
        assert!(prompt.contains("No strong topic preferences"));
    }

    #[test]
    fn test_user_prompt_role_and_note() {
        let lead = user_prompt(&request(Role::Leader, None));
        assert!(lead.contains("You open this round"));
        assert!(lead.contains("Show me the logs."));
        assert!(!lead.contains("note was slipped"));
        assert!(!lead.contains("cast_vote"));

        let reply = user_prompt(&request(Role::Responder, Some("Ask about the firewall")));
        assert!(reply.contains("Respond to what was just said"));
        assert!(reply.contains("Ask about the firewall"));
    }
}
