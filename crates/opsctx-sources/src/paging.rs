use std::future::Future;

use crate::SourceError;

/// One page of records plus the continuation token for the next request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(records: Vec<T>) -> Self {
        Self {
            records,
            next_token: None,
        }
    }

    pub fn with_next(records: Vec<T>, next_token: impl Into<String>) -> Self {
        Self {
            records,
            next_token: Some(next_token.into()),
        }
    }
}

/// Fetches pages sequentially until the provider stops returning a
/// continuation token or `max_pages` requests have been made.
///
/// Reaching the ceiling is success with possibly truncated records. A failure
/// after the first page discards everything fetched so far and is reported as
/// [`SourceError::Pagination`].
#[tracing::instrument(level = "debug", skip(fetch_page))]
pub async fn collect_pages<T, F, Fut>(
    operation: &str,
    max_pages: usize,
    mut fetch_page: F,
) -> Result<Vec<T>, SourceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, SourceError>>,
{
    let ceiling = max_pages.max(1);
    let mut records = Vec::new();
    let mut token = None;
    for page_number in 1..=ceiling {
        let page = match fetch_page(token.take()).await {
            Ok(page) => page,
            Err(error) if page_number == 1 => return Err(error),
            Err(error) => {
                return Err(SourceError::Pagination {
                    page: page_number,
                    cause: Box::new(error),
                })
            }
        };
        records.extend(page.records);
        match page.next_token {
            Some(next) => token = Some(next),
            None => {
                tracing::debug!(
                    operation,
                    pages = page_number,
                    records = records.len(),
                    "pagination complete"
                );
                return Ok(records);
            }
        }
    }
    tracing::warn!(
        operation,
        max_pages = ceiling,
        records = records.len(),
        "page ceiling reached; results may be truncated"
    );
    Ok(records)
}

/// Continuation token for offset-based providers.
pub(crate) fn offset_token(offset: usize) -> String {
    offset.to_string()
}

/// Reads an offset token produced by [`offset_token`]; `None` starts at zero.
pub(crate) fn parse_offset_token(token: Option<&str>) -> usize {
    token
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(0)
}
