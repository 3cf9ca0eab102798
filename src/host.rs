//! Browser tab host
//!
//! Before asking for the capture device the session resolves the tab it
//! will record in and attaches its page script there.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::SessionError;

/// URL schemes the page script can never be attached to
const RESTRICTED_SCHEMES: [&str; 6] = [
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "devtools://",
    "view-source:",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: i64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AttachError {
    pub message: String,
}

impl AttachError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait TabHost: Send + Sync {
    /// The focused tab of the current window, if any
    async fn active_tab(&self) -> Option<TabInfo>;

    /// Attach the page script to the tab
    async fn attach(&self, tab: &TabInfo) -> Result<(), AttachError>;
}

pub fn is_restricted_url(url: &str) -> bool {
    let url = url.trim_start().to_ascii_lowercase();
    RESTRICTED_SCHEMES
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Resolve and attach to the tab a new session records in
pub async fn prepare_tab(host: &dyn TabHost) -> Result<TabInfo, SessionError> {
    let tab = host.active_tab().await.ok_or(SessionError::NoActiveTab)?;

    if is_restricted_url(&tab.url) {
        warn!("Refusing to record on restricted page {}", tab.url);
        return Err(SessionError::RestrictedPage);
    }

    host.attach(&tab).await.map_err(|e| {
        warn!("Failed to attach to tab {}: {}", tab.id, e);
        if e.message.contains("Cannot access") {
            SessionError::RestrictedPage
        } else {
            SessionError::InitializationError(e.message)
        }
    })?;

    debug!("Attached to tab {} ({})", tab.id, tab.url);
    Ok(tab)
}
