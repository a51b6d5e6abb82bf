//! Pagination exhauster
//!
//! Walks a paginated collection to its end by re-issuing the template request
//! with an advanced `offset` (or `after` cursor) until a page carries no
//! `next` link. Pages are fetched strictly one after another, every page goes
//! through the full retry loop, and any page failure discards the partial
//! result.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use remote::RequestDescriptor;

use crate::error::ApiError;
use crate::executor::Executor;

/// One page of an offset-paginated collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Option<Vec<T>>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    /// Link to the following page; absent on the last page
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorPage<T> {
    pub items: Option<Vec<T>>,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub cursors: Option<Cursors>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cursors {
    /// Opaque continuation token; only string cursors can be followed
    #[serde(default)]
    pub after: Option<serde_json::Value>,
}

impl Executor {
    /// Fetch every page of an offset-paginated collection.
    pub async fn execute_paging<T: DeserializeOwned>(
        &self,
        template: RequestDescriptor,
    ) -> Result<Vec<T>, ApiError> {
        let mut request = template;
        let mut results = Vec::new();
        let mut pages = 0u32;

        loop {
            let page: Page<T> = self.execute(request.clone()).await?;
            pages += 1;
            if let Some(items) = page.items {
                results.extend(items);
            }

            if page.next.is_none() {
                break;
            }
            if page.limit == 0 {
                return Err(ApiError::UnsupportedCursor(format!(
                    "page at offset {} has a next link but a limit of 0",
                    page.offset
                )));
            }
            let offset = page.offset.checked_add(page.limit).ok_or_else(|| {
                ApiError::UnsupportedCursor(format!(
                    "page at offset {} with limit {} overflows the next offset",
                    page.offset, page.limit
                ))
            })?;
            request.set_query("offset", offset);
        }

        debug!(pages, items = results.len(), path = request.path(), "pagination complete");
        Ok(results)
    }

    /// Fetch every page of a cursor-paginated collection.
    pub async fn execute_cursor_paging<T: DeserializeOwned>(
        &self,
        template: RequestDescriptor,
    ) -> Result<Vec<T>, ApiError> {
        let mut request = template;
        let mut results = Vec::new();
        let mut pages = 0u32;

        loop {
            let page: CursorPage<T> = self.execute(request.clone()).await?;
            pages += 1;
            if let Some(items) = page.items {
                results.extend(items);
            }

            if page.next.is_none() {
                break;
            }
            let after = match page.cursors.and_then(|c| c.after) {
                Some(serde_json::Value::String(after)) => after,
                Some(other) => {
                    return Err(ApiError::UnsupportedCursor(format!(
                        "only string cursors are supported, got {other}"
                    )));
                }
                None => {
                    return Err(ApiError::UnsupportedCursor(
                        "page has a next link but no after cursor".into(),
                    ));
                }
            };
            request.set_query("after", after);
        }

        debug!(pages, items = results.len(), path = request.path(), "cursor pagination complete");
        Ok(results)
    }
}
