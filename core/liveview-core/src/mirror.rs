//! Mirror entry contract.
//!
//! A request to the mirror path is checked against the live registry before
//! the host opens the observer's connection: the named source must exist and
//! must be a regular session. On success the host rewrites the new session's
//! location to the source's and serves the source document with the client
//! bootstrap script swapped for the mirror one.

use regex::{Captures, Regex};
use tracing::{debug, warn};

use liveview_protocol::{ErrorInfo, MirrorUri};

use crate::error::RegistryError;
use crate::options::LiveViewOptions;
use crate::sessions::SessionRegistry;

/// Accepted mirror request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPlan {
    pub request: MirrorUri,
    /// Location the observer session must open at.
    pub source_uri: Option<String>,
}

impl MirrorPlan {
    /// Stages the observer link for the session about to open as `predicted_id`.
    pub fn stage(&self, registry: &SessionRegistry, predicted_id: &str) -> Result<(), RegistryError> {
        registry.register_pending_observer(
            predicted_id,
            &self.request.source_session_id,
            self.request.parent_session_id.as_deref(),
            self.request.diagnostic,
        )
    }
}

/// Validates a mirror entry request. Errors carry the HTTP status to answer with.
pub fn plan_mirror(
    registry: &SessionRegistry,
    options: &LiveViewOptions,
    uri: &str,
) -> Result<MirrorPlan, ErrorInfo> {
    let request = MirrorUri::parse(uri, &options.mirror_path())?;

    let source = registry.lookup(&request.source_session_id).ok_or_else(|| {
        debug!(source_session_id = %request.source_session_id, "Mirror request for unknown session");
        ErrorInfo::new(
            "source_not_found",
            format!("session '{}' not found", request.source_session_id),
        )
    })?;
    if source.is_observer() {
        warn!(source_session_id = %source.id, "Mirror request targets an observer session");
        return Err(ErrorInfo::new(
            "source_is_observer",
            format!("session '{}' is a mirror and cannot be observed", source.id),
        ));
    }

    Ok(MirrorPlan {
        request,
        source_uri: source.uri,
    })
}

/// Replaces `<script src="…host_script">` references with `mirror_script`.
/// A leading `/` on the host script path is optional in the document.
pub fn rewrite_bootstrap(
    document: &str,
    host_script: &str,
    mirror_script: &str,
) -> Result<String, ErrorInfo> {
    let pattern = format!(
        r#"(?i)(<script\b[^>]*\bsrc\s*=\s*["'])/?{}(["'])"#,
        regex::escape(host_script.trim_start_matches('/'))
    );
    let re = Regex::new(&pattern).map_err(|err| {
        ErrorInfo::new(
            "internal_error",
            format!("invalid bootstrap pattern: {}", err),
        )
    })?;

    let mut replaced = 0;
    let rewritten = re.replace_all(document, |caps: &Captures| {
        replaced += 1;
        format!("{}{}{}", &caps[1], mirror_script, &caps[2])
    });
    if replaced == 0 {
        warn!(host_script = %host_script, "Bootstrap script reference not found in document");
    }
    Ok(rewritten.into_owned())
}
