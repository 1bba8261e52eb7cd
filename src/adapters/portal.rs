use crate::config::toml_config::PortalConfig;
use crate::domain::model::{Query, ResultsView, RowState};
use crate::domain::ports::Session;
use crate::utils::error::{AuthError, InspectError, SearchError, WatchError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

/// Regexes for the results table. Rows are `tr#testCenter_{i}`; a row's
/// availability markers are the `span` ids inside its `searchByDateApptCol` cells.
#[derive(Debug, Clone)]
struct ResultPatterns {
    cell_open: Regex,
    span: Regex,
    id_attr: Regex,
}

impl ResultPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            cell_open: Regex::new(
                r#"(?i)<td\b[^>]*\bclass\s*=\s*["'][^"']*\bsearchByDateApptCol\b[^"']*["'][^>]*>"#,
            )?,
            span: Regex::new(r"(?i)<span\b([^>]*)>")?,
            id_attr: Regex::new(r#"(?i)\bid\s*=\s*["']([^"']*)["']"#)?,
        })
    }

    fn count_rows(&self, html: &str) -> usize {
        html.matches("testCenter_").count()
    }

    fn parse_row(&self, html: &str, index: usize) -> Result<RowState, InspectError> {
        let malformed = |message: &str| InspectError::Malformed {
            index,
            message: message.to_string(),
        };

        let row_open = Regex::new(&format!(
            r#"(?i)<tr\b[^>]*\bid\s*=\s*["']testCenter_{}["'][^>]*>"#,
            index
        ))
        .map_err(|e| malformed(&e.to_string()))?;

        // Missing rows simply have nothing available.
        let Some(open) = row_open.find(html) else {
            return Ok(RowState::default());
        };
        let rest = &html[open.end()..];
        let row_end = find_ci(rest, "</tr>").ok_or_else(|| malformed("row is not closed"))?;
        let row = &rest[..row_end];

        let mut markers = Vec::new();
        let mut from = 0;
        while let Some(cell) = self.cell_open.find_at(row, from) {
            let cell_rest = &row[cell.end()..];
            let cell_end =
                find_ci(cell_rest, "</td>").ok_or_else(|| malformed("cell is not closed"))?;
            let cell_html = &cell_rest[..cell_end];

            for span in self.span.captures_iter(cell_html) {
                let id = self
                    .id_attr
                    .captures(&span[1])
                    .map(|c| c[1].to_string())
                    .unwrap_or_default();
                markers.push(id);
            }
            from = cell.end() + cell_end;
        }

        Ok(RowState { markers })
    }
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

/// Session against the portal's plain HTTP pages, with a cookie jar carrying the login.
pub struct PortalSession {
    client: Client,
    config: PortalConfig,
    patterns: ResultPatterns,
    authenticated: bool,
    results: Option<String>,
}

impl PortalSession {
    pub fn new(config: PortalConfig, timeout: Duration) -> Result<Self, WatchError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        let patterns = ResultPatterns::new().map_err(|e| WatchError::ConfigError {
            message: format!("results patterns: {}", e),
        })?;

        Ok(Self {
            client,
            config,
            patterns,
            authenticated: false,
            results: None,
        })
    }
}

#[async_trait]
impl Session for PortalSession {
    async fn authenticate(&mut self) -> Result<(), AuthError> {
        tracing::info!("Navigating to login page...");
        self.client.get(&self.config.login_url).send().await?;

        tracing::info!("Filling in login credentials...");
        let form = [
            (self.config.username_field(), self.config.username.as_str()),
            (self.config.password_field(), self.config.password.as_str()),
        ];
        let response = self
            .client
            .post(&self.config.login_url)
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected {
                message: format!("login returned {}", response.status()),
            });
        }

        tracing::info!("Waiting for test center search page...");
        let response = self.client.get(&self.config.search_url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() || !body.contains(self.config.ready_marker()) {
            return Err(AuthError::NotReady {
                message: format!(
                    "search page returned {} without '{}'",
                    status,
                    self.config.ready_marker()
                ),
            });
        }

        self.authenticated = true;
        tracing::info!("Search page loaded successfully.");
        Ok(())
    }

    async fn search_query(&mut self, query: &Query) -> Result<ResultsView, SearchError> {
        if !self.authenticated {
            return Err(SearchError::NotAuthenticated);
        }
        self.results = None;

        let params = [
            ("address", query.address.as_str()),
            ("month", query.month.name()),
            ("day", query.day.as_str()),
        ];
        let response = self
            .client
            .get(&self.config.search_url)
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Refused {
                address: query.address.clone(),
                message: format!("search returned {}", status),
            });
        }

        let body = response.text().await?;
        let rows = self.patterns.count_rows(&body);
        self.results = Some(body);
        Ok(ResultsView { rows })
    }

    async fn inspect_row(&mut self, index: usize) -> Result<RowState, InspectError> {
        let html = self.results.as_deref().ok_or(InspectError::NoResults)?;
        self.patterns.parse_row(html, index)
    }

    async fn close(&mut self) {
        tracing::info!("Closing portal session");
        self.authenticated = false;
        self.results = None;
    }
}
