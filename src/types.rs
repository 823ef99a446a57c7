use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// HTTP method of a request.
///
/// Deserializes case-insensitively (`"get"`, `"GET"`) so config files can use
/// either spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(format!("invalid HTTP method: {other}")),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What the scheduler does when a request arrives while another request with
/// the same fingerprint is still pending or running.
///
/// - `Allow`: no deduplication, both requests execute (default).
/// - `RejectNew`: the new request fails with `DuplicateRejected`.
/// - `ReplaceOld`: the old request is cancelled (`Superseded`) and the new one
///   is admitted.
/// - `Link`: the new request waits on the old one and receives its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    #[serde(rename = "none")]
    Allow,
    RejectNew,
    ReplaceOld,
    Link,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy::Allow
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(DuplicatePolicy::Allow),
            "reject-new" => Ok(DuplicatePolicy::RejectNew),
            "replace-old" => Ok(DuplicatePolicy::ReplaceOld),
            "link" => Ok(DuplicatePolicy::Link),
            other => Err(format!(
                "invalid duplicate policy: {other} (expected \"none\", \"reject-new\", \"replace-old\" or \"link\")"
            )),
        }
    }
}

/// Backoff curve between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryTiming {
    /// Every retry waits the configured delay.
    Linear,
    /// Retry `n` waits `delay * 2^(n-1)`.
    Exponential,
}

impl Default for RetryTiming {
    fn default() -> Self {
        RetryTiming::Linear
    }
}

impl FromStr for RetryTiming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(RetryTiming::Linear),
            "exponential" => Ok(RetryTiming::Exponential),
            other => Err(format!(
                "invalid retry timing: {other} (expected \"linear\" or \"exponential\")"
            )),
        }
    }
}

/// Where cached responses live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Private to one service instance.
    Memory,
    /// Shared by every service in this process, gone on exit.
    Session,
    /// JSON file on disk (`<dir>/cache.json`), survives restarts.
    #[serde(alias = "local")]
    Durable,
}

impl Default for StorageKind {
    fn default() -> Self {
        StorageKind::Memory
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageKind::Memory => "memory",
            StorageKind::Session => "session",
            StorageKind::Durable => "durable",
        };
        f.write_str(name)
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "session" => Ok(StorageKind::Session),
            "durable" | "local" => Ok(StorageKind::Durable),
            other => Err(format!(
                "invalid cache storage: {other} (expected \"memory\", \"session\" or \"durable\")"
            )),
        }
    }
}
