//! Content API connector
//!
//! Implements [`RemoteDataSource`] over the host [`HttpClient`].

use async_trait::async_trait;
use bridge_traits::{BridgeError, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_async::time::sleep;
use core_library::{Gig, RemoteDataSource, RemoteError, RemoteResult, Setlist, SetlistItem, Song};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{ContentApiError, Result};
use crate::types::{
    GigDto, ModifyLyricsRequest, SetlistDto, SetlistEntryDto, SetlistLookupResponse, SongDto,
    UpdateSetlistSongsRequest,
};

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

#[derive(Clone)]
pub struct ContentApiConfig {
    /// Root of the API, e.g. `https://api.example.com/v1`
    pub base_url: String,

    /// Sent as a bearer token when present
    pub api_token: Option<String>,

    /// Per-request timeout handed to the HTTP client
    pub request_timeout: Duration,

    /// Applied to reads only. Writes are attempted once.
    pub retry_policy: RetryPolicy,
}

impl ContentApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            request_timeout: Duration::from_secs(8),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err("base_url cannot be empty".to_string());
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(format!("base_url must be an http(s) URL, got '{base}'"));
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than zero".to_string());
        }
        if self.retry_policy.max_attempts == 0 {
            return Err("retry_policy.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for ContentApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentApiConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

/// Client of the band's content API.
///
/// ```ignore
/// let config = ContentApiConfig::new("https://api.example.com").with_api_token(token);
/// let client = ContentApiClient::new(http_client, config)?;
/// let songs = client.get_all_songs().await?;
/// ```
pub struct ContentApiClient {
    http_client: Arc<dyn HttpClient>,
    config: ContentApiConfig,
}

impl ContentApiClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: ContentApiConfig) -> Result<Self> {
        config.validate().map_err(ContentApiError::InvalidConfig)?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ContentApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        let request = HttpRequest::new(method, self.url(path))
            .accept_json()
            .timeout(self.config.request_timeout);
        match &self.config.api_token {
            Some(token) => request.bearer_token(token.clone()),
            None => request,
        }
    }

    /// Execute a read, retrying 429, 5xx and timeouts with backoff.
    ///
    /// Returns the final response whatever its status; only transport
    /// failures are errors.
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let policy = &self.config.retry_policy;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let last_attempt = attempt >= policy.max_attempts;

            match self.http_client.execute(request.clone()).await {
                Ok(response) if response.status == 429 || response.is_server_error() => {
                    if last_attempt {
                        warn!(status = response.status, attempt, "Request failed, giving up");
                        return Ok(response);
                    }
                    let delay = policy.delay_for(attempt);
                    warn!(
                        status = response.status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    sleep(delay).await;
                }
                Ok(response) => {
                    debug!(status = response.status, attempt, "Request completed");
                    return Ok(response);
                }
                Err(BridgeError::Timeout(msg)) if !last_attempt => {
                    let delay = policy.delay_for(attempt);
                    warn!(attempt, error = %msg, "Request timed out, retrying");
                    sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self
            .execute_with_retry(self.request(HttpMethod::Get, path))
            .await?;
        if response.status == 404 {
            return Ok(None);
        }
        parse_body(&response).map(Some)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<Option<T>> {
        let response = self.http_client.execute(request).await?;
        if response.status == 404 {
            return Ok(None);
        }
        parse_body(&response).map(Some)
    }
}

fn parse_body<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    if !response.is_success() {
        let body = String::from_utf8_lossy(&response.body);
        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
        return Err(ContentApiError::ApiError {
            status_code: response.status,
            message,
        });
    }
    serde_json::from_slice(&response.body)
        .map_err(|e| ContentApiError::ParseError(format!("Failed to parse response: {}", e)))
}

fn required<T>(value: Option<T>, path: &str) -> Result<T> {
    value.ok_or_else(|| ContentApiError::ApiError {
        status_code: 404,
        message: format!("{path} not found"),
    })
}

#[async_trait]
impl RemoteDataSource for ContentApiClient {
    #[instrument(skip(self))]
    async fn get_all_songs(&self) -> RemoteResult<Vec<Song>> {
        let songs: Vec<SongDto> = required(self.get_json("/songs").await?, "/songs")?;
        info!(count = songs.len(), "Fetched song catalog");
        Ok(songs.into_iter().map(Song::from).collect())
    }

    #[instrument(skip(self), fields(title = %title))]
    async fn get_setlist(&self, title: &str) -> RemoteResult<Option<Setlist>> {
        let path = format!("/setlists?title={}", urlencoding::encode(title));
        let found: Option<SetlistLookupResponse> = self.get_json(&path).await?;
        let setlist = found.and_then(SetlistLookupResponse::into_first).map(Setlist::from);
        debug!(found = setlist.is_some(), "Fetched setlist");
        Ok(setlist)
    }

    #[instrument(skip(self), fields(gig_id = %id))]
    async fn get_gig(&self, id: &str) -> RemoteResult<Option<Gig>> {
        let path = format!("/gigs/{}", urlencoding::encode(id));
        let gig: Option<GigDto> = self.get_json(&path).await?;
        Ok(gig.map(Gig::from))
    }

    #[instrument(skip(self))]
    async fn get_gigs(&self) -> RemoteResult<Vec<Gig>> {
        let gigs: Vec<GigDto> = required(self.get_json("/gigs").await?, "/gigs")?;
        Ok(gigs.into_iter().map(Gig::from).collect())
    }

    #[instrument(skip(self, items), fields(setlist_id = %setlist_id, items = items.len()))]
    async fn update_setlist_songs(
        &self,
        setlist_id: &str,
        items: &[SetlistItem],
    ) -> RemoteResult<Setlist> {
        let entries: Vec<SetlistEntryDto> = items.iter().map(SetlistEntryDto::from).collect();
        let path = format!("/setlists/{}/songs", urlencoding::encode(setlist_id));
        let request = self
            .request(HttpMethod::Put, &path)
            .json(&UpdateSetlistSongsRequest { songs: &entries })
            .map_err(ContentApiError::from)?;

        let updated: Option<SetlistDto> = self.send_json(request).await?;
        match updated {
            Some(dto) => {
                info!("Setlist updated remotely");
                Ok(dto.into())
            }
            None => Err(RemoteError::NotFound {
                entity_type: "Setlist".to_string(),
                id: setlist_id.to_string(),
            }),
        }
    }

    #[instrument(skip(self, lyrics), fields(song_id = %song_id))]
    async fn modify_lyrics(&self, song_id: &str, lyrics: &str) -> RemoteResult<Song> {
        let path = format!("/songs/{}/lyrics", urlencoding::encode(song_id));
        let request = self
            .request(HttpMethod::Patch, &path)
            .json(&ModifyLyricsRequest { lyrics })
            .map_err(ContentApiError::from)?;

        let updated: Option<SongDto> = self.send_json(request).await?;
        updated.map(Song::from).ok_or_else(|| RemoteError::NotFound {
            entity_type: "Song".to_string(),
            id: song_id.to_string(),
        })
    }
}
