//! Client for the local conversational backend.
//!
//! Every call except `change_pet_type` absorbs transport and parse failures and
//! hands back a safe default, logging a warning. Changing the pet type alters
//! persisted identity, so its failures reach the caller.

use crate::error::{PetError, Result};
use crate::pet::{PetRecord, PetType};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Reply shown when the backend cannot be reached.
pub const FALLBACK_REPLY: &str = "I can't respond right now...";

/// One exchange from `GET /conversations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_input: String,
    pub pet_response: String,
    #[serde(default)]
    pub timestamp: String,
}

impl ConversationTurn {
    /// Accepts SQLite (`2024-01-01 10:00:00`) and ISO (`2024-01-01T10:00:00.5`) text.
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(self.timestamp.trim(), fmt).ok())
    }
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    response: String,
}

#[derive(Serialize)]
struct ChangeTypeRequest {
    pet_type: PetType,
}

// variant order matters for untagged matching
#[derive(Deserialize)]
#[serde(untagged)]
enum ChangeTypeReply {
    Failed { error: String },
    Rejected { detail: serde_json::Value },
    Updated(PetRecord),
    Acknowledged {
        #[allow(dead_code)]
        message: String,
    },
}

#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
}

impl AgentClient {
    /// No client-side timeout: callers that want one layer it on top.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /pet`. `None` when the backend is unreachable or answers garbage.
    pub async fn fetch_pet_info(&self) -> Option<PetRecord> {
        match self.get_json::<PetRecord>("/pet").await {
            Ok(pet) => Some(pet),
            Err(e) => {
                warn!(error = %e, "failed to get pet info");
                None
            }
        }
    }

    /// `POST /message`. Always yields something to show in the bubble.
    pub async fn send_message(&self, text: &str) -> String {
        let result = async {
            let resp = self
                .http
                .post(self.url("/message"))
                .json(&MessageRequest { message: text })
                .send()
                .await
                .map_err(unavailable)?
                .error_for_status()
                .map_err(unavailable)?;
            let body: MessageResponse = resp.json().await.map_err(unavailable)?;
            Ok::<_, PetError>(body.response)
        }
        .await;

        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "failed to send message");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// `GET /conversations`, in the order the backend returns them.
    pub async fn fetch_history(&self) -> Vec<ConversationTurn> {
        match self.get_json::<Vec<ConversationTurn>>("/conversations").await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, "failed to get conversation history");
                Vec::new()
            }
        }
    }

    /// `POST /pet/change-type`. Backend-reported errors come back verbatim.
    pub async fn change_pet_type(&self, pet_type: PetType) -> Result<PetRecord> {
        let resp = self
            .http
            .post(self.url("/pet/change-type"))
            .json(&ChangeTypeRequest { pet_type })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "failed to change pet type");
                unavailable(e)
            })?;

        let status = resp.status();
        let reply: ChangeTypeReply = resp.json().await.map_err(|e| {
            warn!(%status, error = %e, "unreadable change-type reply");
            unavailable(e)
        })?;

        match reply {
            ChangeTypeReply::Failed { error } => Err(PetError::BackendReportedError(error)),
            ChangeTypeReply::Rejected { detail } => Err(PetError::BackendReportedError(
                detail
                    .as_str()
                    .map_or_else(|| detail.to_string(), ToString::to_string),
            )),
            ChangeTypeReply::Updated(pet) => Ok(pet),
            ChangeTypeReply::Acknowledged { .. } => {
                debug!(%pet_type, "change-type acknowledged, refetching pet");
                self.fetch_pet_info().await.ok_or_else(|| {
                    PetError::RemoteUnavailable("pet record unavailable after type change".into())
                })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.http
            .get(self.url(path))
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json::<T>()
            .await
            .map_err(unavailable)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn unavailable(e: reqwest::Error) -> PetError {
    PetError::RemoteUnavailable(e.to_string())
}
