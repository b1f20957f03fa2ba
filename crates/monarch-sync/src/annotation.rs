//! HTTP client for importing stored observations into the annotation system.

use std::collections::HashSet;

use monarch_core::AnnotationTask;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API token invalid or expired")]
    Unauthorized,
    #[error("project {0} not found")]
    ProjectNotFound(String),
}

/// Builds the `Authorization` header for every request.
///
/// Chosen once at startup; the client never rewrites headers afterwards.
pub trait AuthStrategy: Send + Sync {
    fn header_value(&self) -> String;

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(AUTHORIZATION, self.header_value())
    }
}

/// `Authorization: Bearer <token>` (personal access tokens).
pub struct BearerToken(pub String);

impl AuthStrategy for BearerToken {
    fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

/// `Authorization: Token <key>` (legacy API keys).
pub struct LegacyToken(pub String);

impl AuthStrategy for LegacyToken {
    fn header_value(&self) -> String {
        format!("Token {}", self.0)
    }
}

/// Which [`AuthStrategy`] to build from a configured token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthScheme {
    #[default]
    Bearer,
    Token,
}

impl AuthScheme {
    pub fn strategy(self, token: String) -> Box<dyn AuthStrategy> {
        match self {
            Self::Bearer => Box::new(BearerToken(token)),
            Self::Token => Box::new(LegacyToken(token)),
        }
    }
}

/// Where the annotation project lives.
#[derive(Debug, Clone)]
pub struct AnnotationSettings {
    /// Base URL like `http://localhost:8080` (no trailing slash needed).
    pub base_url: String,
    pub project_id: String,
    pub timeout: std::time::Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInfo {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize)]
struct ImportEnvelope<'a> {
    data: &'a AnnotationTask,
}

/// HTTP client for one annotation project.
pub struct AnnotationClient {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    auth: Box<dyn AuthStrategy>,
}

impl AnnotationClient {
    pub fn new(settings: AnnotationSettings, auth: Box<dyn AuthStrategy>) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            project_id: settings.project_id,
            auth,
        })
    }

    fn project_url(&self, suffix: &str) -> String {
        format!("{}/api/projects/{}{}", self.base_url, self.project_id, suffix)
    }

    /// Verify the project is reachable and the token is accepted.
    pub async fn check_connection(&self) -> Result<ProjectInfo, SyncError> {
        let url = self.project_url("");
        let resp = self.auth.authorize(self.client.get(&url)).send().await?;
        match resp.status().as_u16() {
            401 => return Err(SyncError::Unauthorized),
            404 => return Err(SyncError::ProjectNotFound(self.project_id.clone())),
            _ => {}
        }
        let resp = ensure_success(resp).await?;
        let project: ProjectInfo = resp.json().await?;
        info!(
            project = project.id,
            title = project.title.as_deref().unwrap_or(""),
            "connected to annotation project"
        );
        Ok(project)
    }

    /// Observation ids already present as tasks in the project.
    pub async fn existing_task_ids(&self) -> Result<HashSet<String>, SyncError> {
        let url = self.project_url("/tasks");
        let resp = self.auth.authorize(self.client.get(&url)).send().await?;
        let resp = ensure_success(resp).await?;
        let body: serde_json::Value = resp.json().await?;
        let ids = task_observation_ids(&body);
        info!(count = ids.len(), "found existing annotation tasks");
        Ok(ids)
    }

    /// Import one observation as an annotation task.
    pub async fn import_task(&self, task: &AnnotationTask) -> Result<(), SyncError> {
        let url = self.project_url("/import");
        let body = [ImportEnvelope { data: task }];
        let resp = self
            .auth
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await?;
        ensure_success(resp).await?;
        info!(observation = %task.observation_id, "created annotation task");
        Ok(())
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SyncError::Server {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

/// Extract `data.observation_id` from a task listing.
///
/// Accepts a bare array or a paginated object with a `tasks` array.
fn task_observation_ids(body: &serde_json::Value) -> HashSet<String> {
    let tasks = body
        .as_array()
        .or_else(|| body.get("tasks").and_then(|t| t.as_array()));
    tasks
        .into_iter()
        .flatten()
        .filter_map(|task| task.get("data")?.get("observation_id"))
        .filter_map(|id| match id {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}
