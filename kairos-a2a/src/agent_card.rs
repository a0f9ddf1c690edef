//! `AgentCard` (spec §3/§4.6 "AgentCard publication"): the descriptive
//! record served at `/.well-known/agent-card.json`, plus `fetch` — the
//! discovery helper that retrieves and validates a remote agent's card.

use serde::{Deserialize, Serialize};

pub const AGENT_CARD_MEDIA_TYPE: &str = "application/vnd.a2a.card+json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub protocol_version: String,
    pub url: String,
    pub skills: Vec<AgentSkill>,
    pub supports_streaming: bool,
    pub supports_approvals: bool,
}

impl AgentCard {
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            protocol_version: "1.0".to_string(),
            url: url.into(),
            skills: Vec::new(),
            supports_streaming: true,
            supports_approvals: true,
        }
    }

    pub fn with_skill(mut self, skill: AgentSkill) -> Self {
        self.skills.push(skill);
        self
    }
}

/// Retrieves and parses the `AgentCard` served at `<base_url>/.well-known/
/// agent-card.json`, sending `Accept: application/vnd.a2a.card+json` (spec
/// §6 "`Fetch(baseURL)` sends `Accept: ...`; returns parsed card or error on
/// non-2xx").
pub async fn fetch(client: &reqwest::Client, base_url: &str) -> Result<AgentCard, FetchError> {
    let url = format!("{}/.well-known/agent-card.json", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, AGENT_CARD_MEDIA_TYPE)
        .send()
        .await
        .map_err(FetchError::Transport)?;

    if !response.status().is_success() {
        return Err(FetchError::Status(response.status().as_u16()));
    }
    response.json::<AgentCard>().await.map_err(FetchError::Decode)
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error fetching agent card: {0}")]
    Transport(reqwest::Error),
    #[error("agent card endpoint returned non-2xx status {0}")]
    Status(u16),
    #[error("failed to decode agent card: {0}")]
    Decode(reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_card_serializes_with_skills() {
        let card = AgentCard::new("kairos-demo", "a demo kairos agent", "https://example.test")
            .with_skill(AgentSkill { id: "search".to_string(), name: "Search".to_string(), description: "web search".to_string() });
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["skills"][0]["id"], "search");
        assert_eq!(json["protocol_version"], "1.0");
    }
}
