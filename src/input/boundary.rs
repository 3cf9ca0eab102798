//! Interaction capture boundary
//!
//! The page-side listeners (click, scroll and key-down in the capture
//! phase) and the on-page tracking indicator are process-wide singletons.
//! Installing them yields a [`TrackingGuard`]; dropping the guard removes
//! both, so every way out of an active session releases them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::data::{describe, ElementRef, FunctionalKey, InteractionEvent};

/// Page integration for interaction tracking
pub trait PageSurface: Send + Sync {
    /// Register the document-level capture-phase listeners
    fn install_listeners(&self) -> Result<()>;

    fn remove_listeners(&self);

    /// Show the persistent, non-interactive tracking indicator
    fn show_indicator(&self, label: &str);

    fn remove_indicator(&self);
}

/// A raw signal as reported by the page listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageSignal {
    /// Pointer click at viewport coordinates
    Click {
        x: i64,
        y: i64,
        target: ElementRef,
        #[serde(default)]
        url: String,
    },
    /// Window scrolled to the given offsets
    Scroll {
        x: i64,
        y: i64,
        #[serde(default)]
        url: String,
    },
    /// Key pressed, `key` is the DOM `KeyboardEvent.key`
    Keydown {
        key: String,
        target: ElementRef,
        #[serde(default)]
        url: String,
    },
}

/// Owner of the page listeners and indicator
pub struct InteractionCaptureBoundary {
    surface: Arc<dyn PageSurface>,
    tracking: Arc<AtomicBool>,
    indicator_label: String,
}

impl InteractionCaptureBoundary {
    pub fn new(surface: Arc<dyn PageSurface>, indicator_label: impl Into<String>) -> Self {
        Self {
            surface,
            tracking: Arc::new(AtomicBool::new(false)),
            indicator_label: indicator_label.into(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    /// Install listeners and show the indicator
    ///
    /// Returns `Ok(None)` if tracking is already installed; listeners are
    /// never registered twice.
    pub fn install(&self) -> Result<Option<TrackingGuard>> {
        if self.tracking.swap(true, Ordering::SeqCst) {
            debug!("Interaction tracking already installed");
            return Ok(None);
        }

        if let Err(e) = self.surface.install_listeners() {
            self.tracking.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.surface.show_indicator(&self.indicator_label);

        info!("Interaction tracking started");

        Ok(Some(TrackingGuard {
            surface: self.surface.clone(),
            tracking: self.tracking.clone(),
            origin: Instant::now(),
            origin_millis: chrono::Utc::now().timestamp_millis(),
        }))
    }
}

/// Scoped installation of the page listeners
pub struct TrackingGuard {
    surface: Arc<dyn PageSurface>,
    tracking: Arc<AtomicBool>,
    origin: Instant,
    origin_millis: i64,
}

impl std::fmt::Debug for TrackingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingGuard")
            .field("origin_millis", &self.origin_millis)
            .finish()
    }
}

impl TrackingGuard {
    /// Wall-clock anchored, monotonic timestamp in milliseconds
    fn now_millis(&self) -> i64 {
        self.origin_millis + self.origin.elapsed().as_millis() as i64
    }

    /// Turn a raw page signal into a log entry stamped with the current time
    pub fn translate(&self, signal: PageSignal) -> Option<InteractionEvent> {
        let timestamp = self.now_millis();
        translate_at(signal, timestamp)
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        self.surface.remove_indicator();
        self.surface.remove_listeners();
        self.tracking.store(false, Ordering::SeqCst);
        info!("Interaction tracking stopped");
    }
}

/// Key-downs outside the functional-key allow-list are dropped here
pub(crate) fn translate_at(signal: PageSignal, timestamp: i64) -> Option<InteractionEvent> {
    match signal {
        PageSignal::Click { x, y, target, url } => Some(InteractionEvent::click(
            timestamp,
            x,
            y,
            describe(&target),
            url,
        )),
        PageSignal::Scroll { x, y, url } => Some(InteractionEvent::scroll(timestamp, x, y, url)),
        PageSignal::Keydown { key, target, url } => {
            let key = FunctionalKey::parse(&key)?;
            Some(InteractionEvent::key_down(timestamp, key, describe(&target), url))
        }
    }
}
