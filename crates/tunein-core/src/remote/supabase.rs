//! `RemoteStore` over Supabase's PostgREST endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};

use super::{PageRequest, RemoteError, RemotePage, RemoteResult, RemoteStore};
use crate::auth::{AuthSession, SessionProvider};
use crate::config::ClientConfig;
use crate::models::{EntryId, EntryRecord, Mood, SyncState};
use crate::util::{compact_text, normalize_text_option, supabase_base_url};
use crate::{Error, Result};

const PREFER_UPSERT: &str = "return=representation,resolution=merge-duplicates";

/// Entries table accessed through `{supabase_url}/rest/v1/{table}`.
///
/// Every query is filtered by the session user's id.
#[derive(Clone)]
pub struct SupabaseEntryStore {
    table_url: String,
    anon_key: String,
    client: Client,
    sessions: Arc<dyn SessionProvider>,
}

impl SupabaseEntryStore {
    pub fn new(
        supabase_url: &str,
        anon_key: impl Into<String>,
        table: &str,
        timeout: Duration,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self> {
        let base_url = supabase_base_url(supabase_url).ok_or_else(|| {
            Error::Config("supabase_url must include http:// or https://".to_string())
        })?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(Error::Config(
                "Supabase anon key must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            table_url: format!("{base_url}/rest/v1/{table}"),
            anon_key,
            client,
            sessions,
        })
    }

    pub fn from_config(config: &ClientConfig, sessions: Arc<dyn SessionProvider>) -> Result<Self> {
        let (Some(url), Some(anon_key)) = (&config.supabase_url, &config.supabase_anon_key) else {
            return Err(Error::Config(
                "SUPABASE_URL and SUPABASE_ANON_KEY are required for remote sync".to_string(),
            ));
        };
        Self::new(
            url,
            anon_key.clone(),
            &config.entries_table,
            config.remote_timeout(),
            sessions,
        )
    }

    fn session(&self) -> RemoteResult<AuthSession> {
        self.sessions
            .current_session()
            .ok_or_else(|| RemoteError::Unreachable("no active session".to_string()))
    }

    fn request(&self, method: Method, session: &AuthSession) -> RequestBuilder {
        self.client
            .request(method, &self.table_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .header(ACCEPT, "application/json")
    }

    async fn send(request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, parse_api_error(status, &body)))
    }
}

#[async_trait]
impl RemoteStore for SupabaseEntryStore {
    async fn fetch_page(&self, request: PageRequest) -> RemoteResult<RemotePage> {
        if request.limit == 0 {
            return Err(RemoteError::Rejected("page limit must be positive".to_string()));
        }
        let session = self.session()?;
        let user_filter = format!("eq.{}", session.user.id);
        let range = format!(
            "{}-{}",
            request.offset,
            request.offset.saturating_add(request.limit - 1)
        );

        tracing::debug!("Fetching remote entries {range}");
        let response = self
            .request(Method::GET, &session)
            .query(&[
                ("select", "*"),
                ("user_id", user_filter.as_str()),
                ("order", "timestamp.desc,id.desc"),
            ])
            .header("Range-Unit", "items")
            .header("Range", range)
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let total_count = content_range_total(response.headers());

        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            // Offset is past the last row
            return Ok(RemotePage {
                entries: Vec::new(),
                total_count: total_count.unwrap_or(request.offset),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, parse_api_error(status, &body)));
        }

        let rows = response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|error| RemoteError::Rejected(format!("invalid entries payload: {error}")))?;
        let entries = decode_rows(rows);
        let total_count =
            total_count.unwrap_or_else(|| request.offset.saturating_add(entries.len()));

        Ok(RemotePage {
            entries,
            total_count,
        })
    }

    async fn append(&self, entry: &EntryRecord) -> RemoteResult<EntryRecord> {
        let session = self.session()?;
        let row = NewEntryRow::new(entry, &session.user.id);

        tracing::debug!("Upserting remote entry {}", entry.id);
        let response = Self::send(
            self.request(Method::POST, &session)
                .query(&[("on_conflict", "id")])
                .header("Prefer", PREFER_UPSERT)
                .json(&[row]),
        )
        .await?;

        let rows = response
            .json::<Vec<EntryRow>>()
            .await
            .map_err(|error| RemoteError::Rejected(format!("invalid append payload: {error}")))?;
        rows.into_iter()
            .next()
            .map(EntryRow::into_record)
            .ok_or_else(|| RemoteError::Rejected("append returned no rows".to_string()))
    }

    async fn delete(&self, id: &EntryId) -> RemoteResult<()> {
        let session = self.session()?;
        let id_filter = format!("eq.{id}");
        let user_filter = format!("eq.{}", session.user.id);

        tracing::debug!("Deleting remote entry {id}");
        Self::send(
            self.request(Method::DELETE, &session)
                .query(&[("id", id_filter.as_str()), ("user_id", user_filter.as_str())])
                .header("Prefer", "return=minimal"),
        )
        .await?;
        Ok(())
    }

    async fn clear(&self) -> RemoteResult<()> {
        let session = self.session()?;
        let user_filter = format!("eq.{}", session.user.id);

        tracing::info!("Deleting all remote entries for user {}", session.user.id);
        Self::send(
            self.request(Method::DELETE, &session)
                .query(&[("user_id", user_filter.as_str())])
                .header("Prefer", "return=minimal"),
        )
        .await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct NewEntryRow<'a> {
    id: EntryId,
    user_id: &'a str,
    content: &'a str,
    mood: Option<&'static str>,
    reflection: Option<&'a str>,
    timestamp: i64,
}

impl<'a> NewEntryRow<'a> {
    fn new(entry: &'a EntryRecord, user_id: &'a str) -> Self {
        Self {
            id: entry.id,
            user_id,
            content: &entry.content,
            mood: entry.mood.map(Mood::label),
            reflection: entry.reflection.as_deref(),
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntryRow {
    id: EntryId,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    reflection: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    timestamp: i64,
}

impl EntryRow {
    fn into_record(self) -> EntryRecord {
        let mood = self.mood.as_deref().and_then(|label| {
            let mood = Mood::from_label(label);
            if mood.is_none() {
                tracing::warn!("Remote entry {} has unknown mood '{label}'", self.id);
            }
            mood
        });

        EntryRecord {
            id: self.id,
            content: self.content.unwrap_or_default(),
            mood,
            reflection: self.reflection,
            timestamp: self.timestamp,
            sync_state: SyncState::Synced,
        }
    }
}

/// Accept integer seconds, or fractional seconds from older rows.
#[allow(clippy::cast_possible_truncation)]
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|seconds| seconds.trunc() as i64))
        .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
}

fn decode_rows(rows: Vec<serde_json::Value>) -> Vec<EntryRecord> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<EntryRow>(row) {
            Ok(row) => Some(row.into_record()),
            Err(error) => {
                tracing::warn!("Skipping undecodable remote entry: {error}");
                None
            }
        })
        .collect()
}

/// Total row count from a PostgREST `Content-Range` header (`0-19/57`, `*/0`).
fn content_range_total(headers: &HeaderMap) -> Option<usize> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::Unreachable(format!("request failed: {error}"))
}

/// Auth, throttling and server faults are transient; other client errors are not.
fn classify_status(status: StatusCode, message: String) -> RemoteError {
    let transient = status.is_server_error()
        || matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        );
    if transient {
        RemoteError::Unreachable(message)
    } else {
        RemoteError::Rejected(message)
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match normalize_text_option(payload.details) {
                Some(details) => format!(
                    "{}: {} ({})",
                    message.trim(),
                    compact_text(&details),
                    status.as_u16()
                ),
                None => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticSessionProvider;
    use crate::models::EntryDraft;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    const USER_ID: &str = "user-123";

    fn store_for(url: &str, session: Option<AuthSession>) -> SupabaseEntryStore {
        SupabaseEntryStore::new(
            url,
            "anon-key",
            "entries",
            Duration::from_secs(5),
            Arc::new(StaticSessionProvider::new(session)),
        )
        .unwrap()
    }

    fn signed_in(url: &str) -> SupabaseEntryStore {
        store_for(url, Some(AuthSession::new("access-token", USER_ID)))
    }

    fn row_json(id: &str, timestamp: i64, mood: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "user_id": USER_ID,
            "content": "How was today?\n\nGood",
            "mood": mood,
            "reflection": null,
            "timestamp": timestamp,
            "created_at": "2024-05-01T10:00:00Z"
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_page_sends_filters_and_reads_total() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/entries")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("user_id".into(), format!("eq.{USER_ID}")),
                Matcher::UrlEncoded("order".into(), "timestamp.desc,id.desc".into()),
            ]))
            .match_header("apikey", "anon-key")
            .match_header("authorization", "Bearer access-token")
            .match_header("range", "20-39")
            .match_header("prefer", "count=exact")
            .with_status(206)
            .with_header("content-range", "20-21/22")
            .with_body(
                serde_json::json!([
                    row_json("01890a5d-ac96-774b-bcce-b302099a8057", 200, "😊 Happy"),
                    row_json("01890a5d-ac96-774b-bcce-b302099a8058", 100, "Grumpy"),
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let store = signed_in(&server.url());
        let page = store.fetch_page(PageRequest::new(20, 20)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(page.total_count, 22);
        assert!(!page.has_more(PageRequest::new(20, 20)));
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].mood, Some(Mood::Happy));
        assert_eq!(page.entries[1].mood, None);
        assert!(page.entries.iter().all(|entry| !entry.is_pending()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_page_skips_undecodable_rows() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/entries")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-range", "0-1/2")
            .with_body(
                serde_json::json!([
                    row_json("01890a5d-ac96-774b-bcce-b302099a8057", 200, "Calm"),
                    {"id": "not-a-uuid", "timestamp": 5},
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let page = signed_in(&server.url())
            .fetch_page(PageRequest::first(20))
            .await
            .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.total_count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_past_end_is_empty_page() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/rest/v1/entries")
            .match_query(Matcher::Any)
            .with_status(416)
            .with_header("content-range", "*/3")
            .create_async()
            .await;

        let page = signed_in(&server.url())
            .fetch_page(PageRequest::new(40, 20))
            .await
            .unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.total_count, 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn huge_offset_range_does_not_overflow() {
        let mut server = Server::new_async().await;
        let offset = usize::MAX - 1;
        let mock = server
            .mock("GET", "/rest/v1/entries")
            .match_query(Matcher::Any)
            .match_header("range", format!("{offset}-{}", usize::MAX).as_str())
            .with_status(416)
            .with_header("content-range", "*/3")
            .create_async()
            .await;

        let page = signed_in(&server.url())
            .fetch_page(PageRequest::new(offset, 20))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(page.entries.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn append_upserts_and_returns_echoed_row() {
        let mut server = Server::new_async().await;
        let entry = EntryRecord::from_draft(EntryDraft::new("Hello").with_mood(Mood::Sad));
        let echoed = serde_json::json!([{
            "id": entry.id.to_string(),
            "user_id": USER_ID,
            "content": "Hello",
            "mood": "Sad",
            "reflection": "Be gentle with yourself.",
            "timestamp": entry.timestamp,
        }]);

        let mock = server
            .mock("POST", "/rest/v1/entries")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "id".into()))
            .match_header("prefer", PREFER_UPSERT)
            .match_body(Matcher::PartialJson(serde_json::json!([{
                "id": entry.id.to_string(),
                "user_id": USER_ID,
                "mood": "Sad",
                "timestamp": entry.timestamp,
            }])))
            .with_status(201)
            .with_body(echoed.to_string())
            .create_async()
            .await;

        let stored = signed_in(&server.url()).append(&entry).await.unwrap();

        mock.assert_async().await;
        assert_eq!(stored.id, entry.id);
        assert_eq!(stored.sync_state, SyncState::Synced);
        assert_eq!(stored.reflection.as_deref(), Some("Be gentle with yourself."));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn validation_failure_is_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/rest/v1/entries")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":"23502","message":"null value in column \"content\"","details":null}"#)
            .create_async()
            .await;

        let entry = EntryRecord::from_draft(EntryDraft::new("x"));
        let error = signed_in(&server.url()).append(&entry).await.unwrap_err();
        assert_eq!(
            error,
            RemoteError::Rejected("null value in column \"content\" (400)".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_errors_and_expired_tokens_are_unreachable() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/rest/v1/entries")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let error = signed_in(&server.url()).delete(&EntryId::new()).await.unwrap_err();
        assert!(error.is_retryable());

        assert!(classify_status(StatusCode::UNAUTHORIZED, String::new()).is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(!classify_status(StatusCode::CONFLICT, String::new()).is_retryable());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_and_clear_are_scoped_to_user() {
        let mut server = Server::new_async().await;
        let id = EntryId::new();
        let delete = server
            .mock("DELETE", "/rest/v1/entries")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), format!("eq.{id}")),
                Matcher::UrlEncoded("user_id".into(), format!("eq.{USER_ID}")),
            ]))
            .with_status(204)
            .create_async()
            .await;
        let clear = server
            .mock("DELETE", "/rest/v1/entries")
            .match_query(Matcher::Exact(format!("user_id=eq.{USER_ID}")))
            .with_status(204)
            .create_async()
            .await;

        let store = signed_in(&server.url());
        store.delete(&id).await.unwrap();
        store.clear().await.unwrap();

        delete.assert_async().await;
        clear.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_session_is_unreachable() {
        let store = store_for("http://127.0.0.1:9", None);
        let error = store.fetch_page(PageRequest::first(20)).await.unwrap_err();
        assert_eq!(error, RemoteError::Unreachable("no active session".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connection_failure_is_unreachable() {
        let store = signed_in("http://127.0.0.1:9");
        let error = store.fetch_page(PageRequest::first(20)).await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[test]
    fn parses_content_range_variants() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, "0-19/57".parse().unwrap());
        assert_eq!(content_range_total(&headers), Some(57));
        headers.insert(CONTENT_RANGE, "*/0".parse().unwrap());
        assert_eq!(content_range_total(&headers), Some(0));
        headers.insert(CONTENT_RANGE, "0-19/*".parse().unwrap());
        assert_eq!(content_range_total(&headers), None);
    }

    #[test]
    fn fractional_timestamps_truncate_to_seconds() {
        let row: EntryRow = serde_json::from_value(serde_json::json!({
            "id": "01890a5d-ac96-774b-bcce-b302099a8057",
            "timestamp": 1_714_557_600.75,
        }))
        .unwrap();
        assert_eq!(row.timestamp, 1_714_557_600);
        assert_eq!(row.into_record().content, "");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = SupabaseEntryStore::new(
            "example.supabase.co",
            "anon",
            "entries",
            Duration::from_secs(1),
            Arc::new(StaticSessionProvider::default()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
