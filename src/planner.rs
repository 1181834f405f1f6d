use crate::date_range::DateRange;
use crate::error::PlanError;
use crate::product::ProductDescriptor;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

pub const CATALOG_URL: &str = "https://www.mosdac.gov.in/gallery/getImage.php";

/// One planned retrieval. `sequence_index` is the 1-based position in the
/// plan, not the frame number the image may eventually get.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FetchItem {
    pub suffix: String,
    pub sequence_index: u32,
}

impl FetchItem {
    pub fn new(suffix: &str, sequence_index: u32) -> Self {
        FetchItem {
            suffix: suffix.to_string(),
            sequence_index,
        }
    }

    pub fn url(&self, base: &Url) -> Result<Url, url::ParseError> {
        base.join(self.suffix.trim_start_matches('/'))
    }
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Eq)]
pub struct DownloadPlan {
    items: Vec<FetchItem>,
}

impl DownloadPlan {
    pub fn new(items: Vec<FetchItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[FetchItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<FetchItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Body of the catalog query. The catalog walks backward from `st_date` in
/// half-hour steps and answers with up to `count` suffixes.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub prod: String,
    pub st_date: String,
    pub count: u32,
}

impl CatalogRequest {
    pub fn new(range: &DateRange, product: &ProductDescriptor) -> Self {
        Self {
            prod: product.pattern.clone(),
            st_date: range.end_date(),
            count: range.estimated_count(),
        }
    }
}

#[async_trait]
pub trait CatalogQuery: Send + Sync {
    /// Returns the raw comma separated suffix list.
    async fn query(&self, request: &CatalogRequest) -> Result<String, PlanError>;
}

pub struct HttpCatalog {
    client: reqwest::Client,
    url: Url,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl CatalogQuery for HttpCatalog {
    async fn query(&self, request: &CatalogRequest) -> Result<String, PlanError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlanError::Status(status.as_u16()));
        }

        // The answer is a one element array holding the whole list
        let body: Value = response.json().await?;
        body.get(0)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(PlanError::Malformed)
    }
}

pub struct UrlPlanner {
    catalog: Arc<dyn CatalogQuery>,
}

impl UrlPlanner {
    pub fn new(catalog: Arc<dyn CatalogQuery>) -> Self {
        Self { catalog }
    }

    /// Plans the items for `range`. A catalog failure yields an empty plan.
    pub async fn plan(&self, range: &DateRange, product: &ProductDescriptor) -> DownloadPlan {
        let request = CatalogRequest::new(range, product);
        debug!(
            "Catalog query: start marker {}, anchor {}, count {}, pattern {}",
            range.start_marker(),
            request.st_date,
            request.count,
            request.prod
        );

        let response = match self.catalog.query(&request).await {
            Ok(response) => response,
            Err(err) => {
                error!("{err}. Check your internet connection.");
                return DownloadPlan::default();
            }
        };
        debug!("Catalog answered with {} bytes", response.len());

        let plan = DownloadPlan::new(select_items(&response, &range.start_marker()));
        info!("Planned {} items", plan.len());
        plan
    }
}

/// Splits a catalog answer into items, discarding every suffix before the first
/// one that mentions `start_marker`. Without a match the whole list is kept.
pub fn select_items(response: &str, start_marker: &str) -> Vec<FetchItem> {
    let suffixes = response
        .split(',')
        .map(str::trim)
        .filter(|suffix| !suffix.is_empty())
        .collect::<Vec<_>>();

    let first = suffixes
        .iter()
        .position(|suffix| suffix.contains(start_marker))
        .unwrap_or(0);
    debug!("Index of start marker {start_marker}: {first}");

    suffixes[first..]
        .iter()
        .zip(1..)
        .map(|(suffix, index)| FetchItem::new(suffix, index))
        .collect()
}
