//! Append-only interaction log with scroll throttling

use tracing::debug;

use super::{InteractionEvent, InteractionKind};

/// Minimum spacing between two accepted scroll events
pub const DEFAULT_SCROLL_THROTTLE_MS: i64 = 250;

/// Ordered log of interactions for one session
///
/// Events are kept in non-decreasing timestamp order. Once frozen the log
/// silently ignores further records, since page events may still be in
/// flight when the session stops.
#[derive(Debug)]
pub struct InteractionLog {
    events: Vec<InteractionEvent>,
    last_scroll_at: Option<i64>,
    scroll_throttle_ms: i64,
    frozen: bool,
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_THROTTLE_MS)
    }
}

impl InteractionLog {
    /// Create an empty log
    pub fn new(scroll_throttle_ms: i64) -> Self {
        Self {
            events: Vec::new(),
            last_scroll_at: None,
            scroll_throttle_ms,
            frozen: false,
        }
    }

    /// Record an event, returning whether it was kept
    pub fn record(&mut self, mut event: InteractionEvent) -> bool {
        if self.frozen {
            debug!("Ignoring {} event on frozen log", event.kind.as_str());
            return false;
        }

        if let Some(last) = self.events.last() {
            if event.timestamp < last.timestamp {
                event.timestamp = last.timestamp;
            }
        }

        if event.kind == InteractionKind::Scroll {
            if let Some(last_scroll) = self.last_scroll_at {
                if event.timestamp - last_scroll < self.scroll_throttle_ms {
                    return false;
                }
            }
            self.last_scroll_at = Some(event.timestamp);
        }

        self.events.push(event);
        true
    }

    /// Stop accepting events and return an ordered snapshot
    pub fn freeze(&mut self) -> Vec<InteractionEvent> {
        self.frozen = true;
        self.events.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn events(&self) -> &[InteractionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scroll(ts: i64) -> InteractionEvent {
        InteractionEvent::scroll(ts, 0, ts, "https://example.com".to_string())
    }

    fn click(ts: i64) -> InteractionEvent {
        InteractionEvent::click(ts, 1, 2, "div".to_string(), "https://example.com".to_string())
    }

    #[test]
    fn test_scroll_burst_keeps_one_entry() {
        let mut log = InteractionLog::default();
        for ts in (1_000..1_250).step_by(10) {
            log.record(scroll(ts));
        }
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].timestamp, 1_000);
    }

    #[test]
    fn test_scroll_accepted_after_window() {
        let mut log = InteractionLog::default();
        assert!(log.record(scroll(0)));
        assert!(!log.record(scroll(249)));
        assert!(log.record(scroll(250)));
        assert!(!log.record(scroll(400)));
        assert!(log.record(scroll(500)));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_clicks_are_not_throttled() {
        let mut log = InteractionLog::default();
        for _ in 0..5 {
            assert!(log.record(click(100)));
        }
        // A click between scrolls does not reset the scroll window
        assert!(log.record(scroll(100)));
        assert!(log.record(click(150)));
        assert!(!log.record(scroll(200)));
        assert_eq!(log.len(), 7);
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let mut log = InteractionLog::default();
        log.record(click(500));
        log.record(click(300));
        log.record(click(700));

        let stamps: Vec<i64> = log.events().iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![500, 500, 700]);
        assert!(log.len() <= 3);
    }

    #[test]
    fn test_freeze_ignores_late_events() {
        let mut log = InteractionLog::default();
        log.record(click(1));
        let snapshot = log.freeze();
        assert_eq!(snapshot.len(), 1);

        assert!(!log.record(click(2)));
        assert!(log.is_frozen());
        assert_eq!(log.len(), 1);
    }
}
