//! Reflection text from a Supabase edge function.
//!
//! The result is stored opaquely in `EntryRecord::reflection`; nothing in the
//! sync engine parses it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::SessionProvider;
use crate::config::ClientConfig;
use crate::models::Mood;
use crate::util::{compact_text, normalize_text_option, supabase_base_url};

/// Local prompts offered when the service is unavailable
const FALLBACK_PROMPTS: [&str; 3] = [
    "What's on your mind right now?",
    "How has your day been going?",
    "What are you grateful for today?",
];

#[derive(Debug, Error)]
pub enum ReflectionError {
    #[error("Reflection service is not configured")]
    NotConfigured,
    #[error("Reflection request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Reflection service error: {0}")]
    Api(String),
    #[error("Invalid reflection payload: {0}")]
    InvalidPayload(String),
}

pub type ReflectionResult<T> = Result<T, ReflectionError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReflectionRequest {
    pub content: String,
    pub mood: Option<Mood>,
}

/// Free text or a few follow-up prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reflection {
    Text(String),
    Prompts(Vec<String>),
}

impl Reflection {
    /// Text form stored on the entry; prompts are one per line
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Prompts(prompts) => prompts.join("\n"),
        }
    }
}

/// Default follow-up prompts for when no reflection could be produced.
#[must_use]
pub fn fallback_prompts() -> Vec<String> {
    FALLBACK_PROMPTS.iter().map(ToString::to_string).collect()
}

#[async_trait]
pub trait ReflectionService: Send + Sync {
    async fn reflect(&self, request: &ReflectionRequest) -> ReflectionResult<Reflection>;
}

/// Calls `POST {supabase_url}/functions/v1/{name}`.
#[derive(Clone)]
pub struct EdgeFunctionReflectionService {
    function_url: String,
    anon_key: String,
    client: Client,
    sessions: Arc<dyn SessionProvider>,
}

impl EdgeFunctionReflectionService {
    pub fn new(
        supabase_url: &str,
        anon_key: impl Into<String>,
        function_name: &str,
        timeout: Duration,
        sessions: Arc<dyn SessionProvider>,
    ) -> ReflectionResult<Self> {
        let base_url = supabase_base_url(supabase_url).ok_or(ReflectionError::NotConfigured)?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() || function_name.trim().is_empty() {
            return Err(ReflectionError::NotConfigured);
        }

        Ok(Self {
            function_url: format!(
                "{base_url}/functions/v1/{}",
                urlencoding::encode(function_name.trim())
            ),
            anon_key,
            client: Client::builder().timeout(timeout).build()?,
            sessions,
        })
    }

    pub fn from_config(
        config: &ClientConfig,
        sessions: Arc<dyn SessionProvider>,
    ) -> ReflectionResult<Self> {
        let (Some(url), Some(anon_key)) = (&config.supabase_url, &config.supabase_anon_key) else {
            return Err(ReflectionError::NotConfigured);
        };
        Self::new(
            url,
            anon_key.clone(),
            &config.reflection_function,
            config.reflection_timeout(),
            sessions,
        )
    }
}

#[derive(Debug, Deserialize)]
struct ReflectionResponse {
    reflection: Option<String>,
    prompts: Option<Vec<String>>,
    error: Option<String>,
}

impl TryFrom<ReflectionResponse> for Reflection {
    type Error = ReflectionError;

    fn try_from(value: ReflectionResponse) -> ReflectionResult<Self> {
        if let Some(error) = normalize_text_option(value.error) {
            return Err(ReflectionError::Api(error));
        }
        if let Some(text) = normalize_text_option(value.reflection) {
            return Ok(Self::Text(text));
        }

        let prompts = value
            .prompts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|prompt| normalize_text_option(Some(prompt)))
            .collect::<Vec<_>>();
        if prompts.is_empty() {
            Err(ReflectionError::InvalidPayload(
                "response did not include reflection/prompts".to_string(),
            ))
        } else {
            Ok(Self::Prompts(prompts))
        }
    }
}

#[async_trait]
impl ReflectionService for EdgeFunctionReflectionService {
    async fn reflect(&self, request: &ReflectionRequest) -> ReflectionResult<Reflection> {
        let bearer = self
            .sessions
            .current_session()
            .map_or_else(|| self.anon_key.clone(), |session| session.access_token);

        let response = self
            .client
            .post(&self.function_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ReflectionError::Api(parse_api_error(status, &body)));
        }

        let payload = serde_json::from_str::<ReflectionResponse>(&body)
            .map_err(|error| ReflectionError::InvalidPayload(error.to_string()))?;
        payload.try_into()
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(ReflectionResponse {
        error: Some(message),
        ..
    }) = serde_json::from_str::<ReflectionResponse>(body)
    {
        return format!("{} ({})", message.trim(), status.as_u16());
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
