//! Remote catalog
//!
//! Lists file metadata (`id`, `name`, `mimeType`) through `files.list`,
//! one page per transport call, following `nextPageToken` until the listing
//! is exhausted or the caller's limit is reached.
//!
//! # Example
//!
//! ```ignore
//! use provider_google_drive::CatalogClient;
//!
//! let client = CatalogClient::new(http_client);
//! let entries = client.list_files(&credential, 10, Some(100)).collect_all().await?;
//! ```

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::time::{Clock, SystemClock};
use core_auth::Credential;
use core_runtime::config::{DEFAULT_DRIVE_API_BASE, MAX_PAGE_SIZE};
use core_runtime::events::{CatalogEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{ApiError, Result};
use crate::types::{CatalogEntry, FilesListResponse};

/// Fields requested for each listing page
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType)";

/// Trashed files are never listed
const LIST_QUERY: &str = "trashed=false";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Drive `files.list` client.
#[derive(Clone)]
pub struct CatalogClient {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    retry_policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl CatalogClient {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
            retry_policy: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            event_bus: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Transport-level retries for throttling and server faults.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Judge credential expiry against `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Start a lazy listing. No request is sent until the first page is asked for.
    ///
    /// `page_size` is clamped to the API range `1..=1000`. `limit` caps the
    /// total number of entries produced.
    pub fn list_files(
        &self,
        credential: &Credential,
        page_size: u32,
        limit: Option<usize>,
    ) -> CatalogPager {
        CatalogPager {
            client: self.clone(),
            access_token: credential.usable_token(self.clock.now()).map(str::to_string),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            limit,
            next_page_token: None,
            produced: 0,
            pages: 0,
            exhausted: false,
        }
    }

    fn page_url(&self, page_size: u32, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/files?q={}&pageSize={}&fields={}",
            self.api_base,
            urlencoding::encode(LIST_QUERY),
            page_size,
            urlencoding::encode(LIST_FIELDS)
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }
        url
    }

    fn emit(&self, event: CatalogEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Catalog(event));
        }
    }
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("api_base", &self.api_base)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

/// Lazy, paginated listing produced by [`CatalogClient::list_files`].
pub struct CatalogPager {
    client: CatalogClient,
    access_token: Option<String>,
    page_size: u32,
    limit: Option<usize>,
    next_page_token: Option<String>,
    produced: usize,
    pages: usize,
    exhausted: bool,
}

impl CatalogPager {
    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once the listing is exhausted or the limit reached.
    /// An empty first page is `Ok(Some(vec![]))`, not an error.
    #[instrument(skip(self), fields(page = self.pages + 1))]
    pub async fn next_page(&mut self) -> Result<Option<Vec<CatalogEntry>>> {
        if self.exhausted || self.remaining() == Some(0) {
            return Ok(None);
        }

        let Some(access_token) = self.access_token.as_deref() else {
            warn!("Listing attempted with an expired credential");
            return Err(ApiError::Unauthorized(
                "credential expired before the request".to_string(),
            ));
        };

        let url = self
            .client
            .page_url(self.page_size, self.next_page_token.as_deref());
        let request = HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(access_token)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self
            .client
            .http_client
            .execute_with_retry(request, self.client.retry_policy.clone())
            .await?;

        if !response.is_success() {
            let error = ApiError::from_status(response.status, &response.headers, &response.body);
            warn!(status = response.status, error = %error, "Listing request failed");
            return Err(error);
        }

        let page: FilesListResponse = response
            .json()
            .map_err(|e| ApiError::Malformed(e.to_string()))?;

        let mut entries: Vec<CatalogEntry> = page.files.into_iter().map(CatalogEntry::from).collect();
        if let Some(remaining) = self.remaining() {
            entries.truncate(remaining);
        }

        self.pages += 1;
        self.produced += entries.len();
        self.next_page_token = page.next_page_token;
        self.exhausted = self.next_page_token.is_none() || self.remaining() == Some(0);

        debug!(
            entries = entries.len(),
            has_more = !self.exhausted,
            "Fetched catalog page"
        );
        self.client.emit(CatalogEvent::PageFetched {
            entries: entries.len(),
            has_more: !self.exhausted,
        });

        Ok(Some(entries))
    }

    /// Drain every remaining page, honouring the limit.
    pub async fn collect_all(mut self) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        while let Some(page) = self.next_page().await? {
            entries.extend(page);
        }

        info!(total = entries.len(), pages = self.pages, "Listing completed");
        self.client.emit(CatalogEvent::ListingCompleted {
            total: entries.len(),
        });
        Ok(entries)
    }

    pub fn has_more(&self) -> bool {
        !self.exhausted && self.remaining() != Some(0)
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn remaining(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.produced))
    }
}

impl std::fmt::Debug for CatalogPager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogPager")
            .field("page_size", &self.page_size)
            .field("limit", &self.limit)
            .field("produced", &self.produced)
            .field("pages", &self.pages)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
