//! Contract types shared by the live view core and host integrations.
//!
//! This crate is kept separate so the host-facing surface (mirror entry URIs,
//! lifecycle statuses, session summaries) cannot drift from what the core
//! validates. The core remains the authority on registry semantics.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub const QUERY_SOURCE_SESSION: &str = "sourceCircuitId";
pub const QUERY_PARENT_SESSION: &str = "parentCircuitId";
pub const QUERY_DIAGNOSTIC: &str = "debugView";

pub const MAX_SESSION_ID_LEN: usize = 256;

// Only used to resolve path-only request URIs; never contacted.
const RELATIVE_BASE: &str = "http://localhost/";

/// Lifecycle of one connection, as reported by the host.
///
/// Sessions move `Open -> Up -> (Down -> Up)* -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The realtime connection has been established.
    Open,
    /// The view tree has been initialized, or the connection was re-established.
    Up,
    /// The connection was lost but may still reconnect.
    Down,
    /// The connection is gone for good.
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Up => "up",
            SessionStatus::Down => "down",
            SessionStatus::Closed => "closed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = ErrorInfo;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(SessionStatus::Open),
            "up" => Ok(SessionStatus::Up),
            "down" => Ok(SessionStatus::Down),
            "closed" => Ok(SessionStatus::Closed),
            other => Err(ErrorInfo::new(
                "invalid_status",
                format!("unknown session status '{}'", other),
            )),
        }
    }
}

/// Coarse connection state shown on dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Reconnecting,
    Disconnected,
}

impl From<SessionStatus> for ConnectionStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Open | SessionStatus::Up => ConnectionStatus::Connected,
            SessionStatus::Down => ConnectionStatus::Reconnecting,
            SessionStatus::Closed => ConnectionStatus::Disconnected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKindTag {
    Regular,
    Observer,
}

/// Serializable view of one tracked session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub kind: SessionKindTag,
    pub status: SessionStatus,
    pub connection: ConnectionStatus,
    pub opened_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub diagnostic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl SessionSummary {
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.opened_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status a mirror entry endpoint should answer with.
    pub fn http_status(&self) -> u16 {
        match self.code.as_str() {
            "source_not_found" => 404,
            "internal_error" => 500,
            _ => 400,
        }
    }
}

/// Parameters of one request to the mirror entry path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorUri {
    pub source_session_id: String,
    #[serde(default)]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub diagnostic: bool,
}

impl MirrorUri {
    pub fn new(source_session_id: impl Into<String>) -> Self {
        Self {
            source_session_id: source_session_id.into(),
            parent_session_id: None,
            diagnostic: false,
        }
    }

    pub fn with_parent(mut self, parent_session_id: impl Into<String>) -> Self {
        self.parent_session_id = Some(parent_session_id.into());
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: bool) -> Self {
        self.diagnostic = diagnostic;
        self
    }

    /// Builds `<mirror_path>?sourceCircuitId=..[&parentCircuitId=..][&debugView=1]`.
    pub fn to_path_and_query(&self, mirror_path: &str) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair(QUERY_SOURCE_SESSION, &self.source_session_id);
        if let Some(parent) = &self.parent_session_id {
            query.append_pair(QUERY_PARENT_SESSION, parent);
        }
        if self.diagnostic {
            query.append_pair(QUERY_DIAGNOSTIC, "1");
        }
        format!("{}?{}", mirror_path, query.finish())
    }

    /// Parses a request URI (absolute, or path-and-query) aimed at `mirror_path`.
    pub fn parse(uri: &str, mirror_path: &str) -> Result<Self, ErrorInfo> {
        let parsed = parse_request_uri(uri)?;

        let path = parsed.path().trim_end_matches('/');
        let expected = mirror_path.trim_end_matches('/');
        if !path.eq_ignore_ascii_case(expected) {
            return Err(ErrorInfo::new(
                "not_mirror_path",
                format!("path '{}' is not the mirror path '{}'", path, expected),
            ));
        }

        let mut source = None;
        let mut parent = None;
        let mut diagnostic = false;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                QUERY_SOURCE_SESSION => source = Some(value.into_owned()),
                QUERY_PARENT_SESSION => {
                    if !value.trim().is_empty() {
                        parent = Some(value.into_owned());
                    }
                }
                QUERY_DIAGNOSTIC => diagnostic = parse_flag(&value)?,
                _ => {}
            }
        }

        let source = match source {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                return Err(ErrorInfo::new(
                    "missing_source",
                    format!("{} is required", QUERY_SOURCE_SESSION),
                ))
            }
        };
        validate_session_id(&source, QUERY_SOURCE_SESSION)?;
        if let Some(parent) = &parent {
            validate_session_id(parent, QUERY_PARENT_SESSION)?;
        }

        Ok(Self {
            source_session_id: source,
            parent_session_id: parent,
            diagnostic,
        })
    }
}

fn parse_request_uri(uri: &str) -> Result<Url, ErrorInfo> {
    let invalid = |err: url::ParseError| {
        ErrorInfo::new("invalid_uri", format!("request URI is invalid: {}", err))
    };
    match Url::parse(uri) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(RELATIVE_BASE).map_err(invalid)?;
            base.join(uri).map_err(invalid)
        }
        Err(err) => Err(invalid(err)),
    }
}

fn parse_flag(value: &str) -> Result<bool, ErrorInfo> {
    match value {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(ErrorInfo::new(
            "invalid_params",
            format!("{} must be 0 or 1, got '{}'", QUERY_DIAGNOSTIC, other),
        )),
    }
}

fn validate_session_id(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.len() > MAX_SESSION_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_params",
            format!(
                "{} must be {} characters or fewer",
                field, MAX_SESSION_ID_LEN
            ),
        ));
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ErrorInfo::new(
            "invalid_params",
            format!("{} contains invalid characters", field),
        ));
    }
    Ok(())
}
