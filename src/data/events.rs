//! Interaction event data structures

use serde::{Deserialize, Serialize};

/// A single logged UI interaction
///
/// Field names follow the page-side wire format so a raw dump of the log
/// reads the same as what the page reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Type of interaction
    #[serde(rename = "type")]
    pub kind: InteractionKind,

    /// Milliseconds since the Unix epoch, monotonic within a session
    pub timestamp: i64,

    /// Pointer X (click) or horizontal scroll offset (scroll)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,

    /// Pointer Y (click) or vertical scroll offset (scroll)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,

    /// Functional key name (key-down only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Element descriptor of the event target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Page the event happened on
    #[serde(default)]
    pub url: String,
}

impl InteractionEvent {
    pub fn click(timestamp: i64, x: i64, y: i64, target: String, url: String) -> Self {
        Self {
            kind: InteractionKind::Click,
            timestamp,
            x: Some(x),
            y: Some(y),
            key: None,
            target: Some(target),
            url,
        }
    }

    /// Scrolls always target the window; the position is the scroll offset
    pub fn scroll(timestamp: i64, x: i64, y: i64, url: String) -> Self {
        Self {
            kind: InteractionKind::Scroll,
            timestamp,
            x: Some(x),
            y: Some(y),
            key: None,
            target: Some("window".to_string()),
            url,
        }
    }

    pub fn key_down(timestamp: i64, key: FunctionalKey, target: String, url: String) -> Self {
        Self {
            kind: InteractionKind::KeyDown,
            timestamp,
            x: None,
            y: None,
            key: Some(key.as_str().to_string()),
            target: Some(target),
            url,
        }
    }
}

/// Type of interaction
///
/// Unknown type names are preserved so that a log received from an older
/// or newer page script still renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InteractionKind {
    Click,
    Scroll,
    KeyDown,
    Other(String),
}

impl InteractionKind {
    /// Wire name (lowercase)
    pub fn as_str(&self) -> &str {
        match self {
            InteractionKind::Click => "click",
            InteractionKind::Scroll => "scroll",
            InteractionKind::KeyDown => "keydown",
            InteractionKind::Other(name) => name,
        }
    }
}

impl From<String> for InteractionKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "click" => InteractionKind::Click,
            "scroll" => InteractionKind::Scroll,
            "keydown" => InteractionKind::KeyDown,
            _ => InteractionKind::Other(name),
        }
    }
}

impl From<InteractionKind> for String {
    fn from(kind: InteractionKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Navigation and editing keys whose presses are worth logging
///
/// Printable keys are never recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionalKey {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
}

impl FunctionalKey {
    pub const ALL: [FunctionalKey; 9] = [
        FunctionalKey::Enter,
        FunctionalKey::Tab,
        FunctionalKey::Escape,
        FunctionalKey::Backspace,
        FunctionalKey::Delete,
        FunctionalKey::ArrowUp,
        FunctionalKey::ArrowDown,
        FunctionalKey::ArrowLeft,
        FunctionalKey::ArrowRight,
    ];

    /// Match a DOM `KeyboardEvent.key` value against the allow-list
    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionalKey::Enter => "Enter",
            FunctionalKey::Tab => "Tab",
            FunctionalKey::Escape => "Escape",
            FunctionalKey::Backspace => "Backspace",
            FunctionalKey::Delete => "Delete",
            FunctionalKey::ArrowUp => "ArrowUp",
            FunctionalKey::ArrowDown => "ArrowDown",
            FunctionalKey::ArrowLeft => "ArrowLeft",
            FunctionalKey::ArrowRight => "ArrowRight",
        }
    }
}
