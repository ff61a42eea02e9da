//! Source download: one CSV payload per link.
//!
//! `CsvFetcher` retries 429 / 5xx / network errors with exponential backoff
//! and gives up on other 4xx immediately. `fetch_all` skips sources that
//! still fail and only errors when none succeeded.

use std::thread;
use std::time::Duration;

use crate::exit_codes::EXIT_FETCH_NONE;
use crate::pipeline::{Stage, StageError};

// ── Constants ───────────────────────────────────────────────────────

const MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = concat!("amaster/", env!("CARGO_PKG_VERSION"));

/// A downloaded source.
#[derive(Debug, Clone)]
pub struct Payload {
    pub url: String,
    pub text: String,
}

// ── CsvFetcher ──────────────────────────────────────────────────────

pub struct CsvFetcher {
    http: reqwest::blocking::Client,
    backoff: Duration,
    max_retries: u32,
}

impl CsvFetcher {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, StageError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                StageError::new(Stage::Fetch, crate::exit_codes::EXIT_ERROR, format!("cannot build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            backoff: Duration::from_secs(1),
            max_retries: MAX_RETRIES,
        })
    }

    /// Initial backoff between retries; doubles per attempt.
    #[cfg(test)]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Download one source as text. Invalid UTF-8 is replaced, not rejected.
    pub fn fetch_text(&self, url: &str) -> Result<String, String> {
        let parsed = url::Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme '{}'", parsed.scheme()));
        }

        let mut backoff = self.backoff;

        for attempt in 0..=self.max_retries {
            match self.http.get(parsed.clone()).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 429 || status >= 500 {
                        if attempt == self.max_retries {
                            return Err(format!("HTTP {status} after {} attempts", self.max_retries + 1));
                        }
                        log::warn!(
                            "retry {}/{} in {:?} (HTTP {status}) for {url}",
                            attempt + 1,
                            self.max_retries,
                            backoff,
                        );
                        thread::sleep(backoff);
                        backoff *= 2;
                        continue;
                    }

                    if status >= 400 {
                        return Err(format!("HTTP {status}"));
                    }

                    let bytes = resp.bytes().map_err(|e| format!("cannot read body: {e}"))?;
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                Err(e) => {
                    if attempt == self.max_retries {
                        return Err(format!("network error after {} attempts: {e}", self.max_retries + 1));
                    }
                    log::warn!(
                        "retry {}/{} in {:?} ({e}) for {url}",
                        attempt + 1,
                        self.max_retries,
                        backoff,
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }

        Err(format!("gave up on {url}"))
    }

    /// Download every link, logging and skipping failures.
    pub fn fetch_all(&self, links: &[String]) -> Result<Vec<Payload>, StageError> {
        let mut payloads = Vec::with_capacity(links.len());

        for url in links {
            log::info!("downloading CSV from {url}");
            match self.fetch_text(url) {
                Ok(text) => payloads.push(Payload { url: url.clone(), text }),
                Err(e) => log::warn!("failed to download {url}: {e}"),
            }
        }

        if payloads.is_empty() {
            return Err(StageError::new(
                Stage::Fetch,
                EXIT_FETCH_NONE,
                format!("all {} source(s) failed to download", links.len()),
            ));
        }

        Ok(payloads)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
