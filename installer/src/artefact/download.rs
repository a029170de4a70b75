//! Artefact retrieval over HTTP(S) or from the local filesystem.
//!
//! Provides a trait-based abstraction for fetching artefact bytes, enabling
//! dependency injection for testing, and a retry loop with exponential
//! backoff for transient failures.

use crate::cancel::CancelToken;
use log::{debug, warn};
use std::io::Read;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Longest single sleep while backing off, so cancellation is noticed
/// promptly.
const BACKOFF_SLICE: Duration = Duration::from_millis(50);

/// Default network timeout for a single request.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Trait for fetching artefact bytes from a URL.
///
/// Abstractions allow tests to mock network behaviour without network
/// access.
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactFetcher {
    /// Fetch the full body at `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`]; [`FetchError::is_transient`] tells the
    /// caller whether retrying can help.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Errors arising from artefact retrieval.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// A connection-level failure (DNS, refused, reset, timeout).
    #[error("download failed for {url}: {reason}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered with a non-success status other than 404.
    #[error("download failed for {url}: HTTP {code}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        code: u16,
    },

    /// The requested artefact was not found (HTTP 404 or missing file).
    #[error("artefact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The URL cannot be fetched at all.
    #[error("malformed url {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Description of the problem.
        reason: String,
    },

    /// The run was cancelled before or between attempts.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The URL that was being fetched.
        url: String,
    },

    /// Reading a local artefact failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Local path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Return whether a retry may succeed.
    ///
    /// Connection failures, request timeouts, throttling and server errors
    /// are transient; 404, other client errors and malformed URLs are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { code, .. } => *code >= 500 || matches!(code, 408 | 429),
            Self::NotFound { .. } | Self::InvalidUrl { .. } | Self::Cancelled { .. } => false,
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            ),
        }
    }
}

/// Fetcher dispatching on URL scheme: `http`/`https` via `ureq`, `file://`
/// URLs and bare paths via the filesystem.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    timeout: Duration,
}

impl DefaultFetcher {
    /// Create a fetcher with the given per-request timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_TIMEOUT)
    }
}

impl ArtefactFetcher for DefaultFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match classify(url) {
            Location::Remote => download_bytes(http_agent(self.timeout), url),
            Location::Local(path) => read_local(url, path),
            Location::Unsupported(scheme) => Err(FetchError::InvalidUrl {
                url: url.to_owned(),
                reason: format!("unsupported scheme \"{scheme}\""),
            }),
        }
    }
}

enum Location<'a> {
    Remote,
    Local(PathBuf),
    Unsupported(&'a str),
}

fn classify(url: &str) -> Location<'_> {
    match url.split_once("://") {
        Some(("http" | "https", _)) => Location::Remote,
        Some(("file", path)) => Location::Local(PathBuf::from(path)),
        Some((scheme, _)) => Location::Unsupported(scheme),
        None => Location::Local(PathBuf::from(url)),
    }
}

fn read_local(url: &str, path: PathBuf) -> Result<Vec<u8>, FetchError> {
    std::fs::read(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            FetchError::NotFound {
                url: url.to_owned(),
            }
        } else {
            FetchError::Io { path, source }
        }
    })
}

/// Download a URL and return the body.
fn download_bytes(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = agent.get(url).call().map_err(|e| map_ureq_error(url, &e))?;
    let mut bytes = Vec::new();
    response
        .into_body()
        .as_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| FetchError::Transport {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
    debug!("downloaded {} bytes from {url}", bytes.len());
    Ok(bytes)
}

/// Shared `ureq` agent with request timeout configuration.
///
/// The agent is built on first use; later calls reuse it regardless of the
/// timeout they pass.
fn http_agent(timeout: Duration) -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(404) => FetchError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::StatusCode(code) => FetchError::Status {
            url: url.to_owned(),
            code: *code,
        },
        ureq::Error::BadUri(reason) => FetchError::InvalidUrl {
            url: url.to_owned(),
            reason: reason.clone(),
        },
        other => FetchError::Transport {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Bounded exponential backoff for transient fetch failures.
///
/// # Examples
///
/// ```
/// use keg::artefact::download::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(500));
/// assert_eq!(policy.delay_before(2), Duration::from_millis(500));
/// assert_eq!(policy.delay_before(3), Duration::from_millis(1000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Return the total number of attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Return the delay to wait before `attempt` (1-based).
    ///
    /// The first attempt is immediate; attempt `n > 1` waits
    /// `base * 2^(n - 2)`.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Fetch `url`, retrying transient failures according to `policy`.
///
/// `cancel` is checked before every attempt and throughout each backoff
/// delay; an attempt already in flight runs to completion.
///
/// # Errors
///
/// Returns [`FetchError::Cancelled`] once `cancel` fires, otherwise the first
/// permanent error, or the last transient error once the attempt budget is
/// exhausted.
pub fn fetch_with_retry(
    fetcher: &dyn ArtefactFetcher,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<Vec<u8>, FetchError> {
    let cancelled = || FetchError::Cancelled {
        url: url.to_owned(),
    };
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        match fetcher.fetch(url) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if err.is_transient() && attempt < policy.max_attempts() => {
                attempt += 1;
                let delay = policy.delay_before(attempt);
                warn!(
                    "attempt {}/{} failed: {err}; retrying in {}ms",
                    attempt - 1,
                    policy.max_attempts(),
                    delay.as_millis()
                );
                if !sleep_unless_cancelled(delay, cancel) {
                    return Err(cancelled());
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Sleep for `delay` in short slices, returning `false` as soon as `cancel`
/// fires.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancelToken) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        let slice = remaining.min(BACKOFF_SLICE);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    !cancel.is_cancelled()
}
