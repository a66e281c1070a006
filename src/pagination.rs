//! `?page=N&page_size=M` handling and the `{count, next, previous, results}` envelope.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, OriginalUri},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};

use crate::{config::Config, ApiQuery, AppError, AppResult};

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Which slice of a collection the caller asked for.
#[derive(Debug, Clone)]
pub struct Pagination {
    page: u32,
    page_size: u32,
    path: String,
}

impl Pagination {
    pub fn new(query: PageQuery, path: impl Into<String>, default_size: u32, max_size: u32) -> Self {
        let page_size = match query.page_size {
            None | Some(0) => default_size,
            Some(size) => size.min(max_size),
        };
        Self {
            page: query.page.unwrap_or(1),
            page_size: page_size.max(1),
            path: path.into(),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn last_page(&self, count: i64) -> u32 {
        let pages = (count.max(0) as u64).div_ceil(self.page_size as u64);
        pages.max(1) as u32
    }

    /// `(limit, offset)` for a collection of `count` rows. Page 1 always
    /// exists, even when empty; any other page past the end does not.
    pub fn window(&self, count: i64) -> AppResult<(i64, i64)> {
        if self.page == 0 || self.page > self.last_page(count) {
            return Err(AppError::NotFound);
        }
        let limit = self.page_size as i64;
        Ok((limit, (self.page - 1) as i64 * limit))
    }

    fn link(&self, page: u32) -> String {
        format!("{}?page={page}&page_size={}", self.path, self.page_size)
    }

    pub fn wrap<T>(&self, count: i64, results: Vec<T>) -> Page<T> {
        let last = self.last_page(count);
        Page {
            count,
            next: (self.page < last).then(|| self.link(self.page + 1)),
            previous: (self.page > 1).then(|| self.link(self.page - 1)),
            results,
        }
    }
}

impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
    Arc<Config>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ApiQuery(query) = ApiQuery::<PageQuery>::from_request_parts(parts, state).await?;
        let config = Arc::<Config>::from_ref(state);
        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.path().to_owned())
            .unwrap_or_else(|| parts.uri.path().to_owned());

        Ok(Self::new(query, path, config.default_page_size, config.max_page_size))
    }
}
