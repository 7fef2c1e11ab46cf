//! `page[number]` / `page[size]` query parsing and paginated response bodies.

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(rename = "page[number]")]
    pub number: Option<i64>,
    #[serde(rename = "page[size]")]
    pub size: Option<i64>,
}

/// A clamped page request. Numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page {
            number: self.number.unwrap_or(1).max(1),
            size: self
                .size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl Page {
    pub fn limit(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1).saturating_mul(self.size)
    }

    /// Number of the last page for `total` items. An empty collection still has page 1.
    pub fn last(&self, total: i64) -> i64 {
        ((total + self.size - 1) / self.size).max(1)
    }
}

#[derive(Debug, Serialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_: String,
    pub first: String,
    pub last: String,
    pub prev: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub total: i64,
    pub page_number: i64,
    pub page_size: i64,
    pub page_count: i64,
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub links: Links,
    pub meta: Meta,
}

impl<T> Paginated<T> {
    /// Wrap one page of `data` with links rooted at `public_url` + `path`.
    pub fn new(
        data: Vec<T>,
        page: Page,
        total: i64,
        public_url: &Url,
        path: &str,
    ) -> Result<Self, url::ParseError> {
        let base = Url::parse(&format!(
            "{}{}",
            public_url.as_str().trim_end_matches('/'),
            path
        ))?;
        let last = page.last(total);
        let link = |number: i64| page_link(&base, number, page.size);

        Ok(Self {
            data,
            links: Links {
                self_: link(page.number),
                first: link(1),
                last: link(last),
                prev: (page.number > 1).then(|| link((page.number - 1).min(last))),
                next: (page.number < last).then(|| link(page.number + 1)),
            },
            meta: Meta {
                total,
                page_number: page.number,
                page_size: page.size,
                page_count: last,
            },
        })
    }
}

fn page_link(base: &Url, number: i64, size: i64) -> String {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("page[number]", &number.to_string())
        .append_pair("page[size]", &size.to_string());
    url.to_string()
}
