//! Status display collaborator.
//!
//! All calls are non-blocking and idempotent: rendering the same content twice
//! leaves the display unchanged.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::event::Counters;

pub trait StatusDisplay {
    fn render_status(&mut self, counts: &Counters);
    fn render_retrieval_countdown(&mut self, elapsed_ms: u64);
    fn render_jam_notice(&mut self);
    fn clear_transient_notice(&mut self);
    /// Persistent indicator that the event log could not be written.
    fn show_log_failure(&mut self);
}

/// Display that narrates to `tracing`. Default when no display is attached.
#[derive(Debug, Default)]
pub struct TracingDisplay {
    last_countdown_s: Option<u64>,
    log_failure_shown: bool,
}

impl StatusDisplay for TracingDisplay {
    fn render_status(&mut self, counts: &Counters) {
        tracing::debug!(
            left = counts.left,
            right = counts.right,
            pellets = counts.pellets,
            "status"
        );
        self.last_countdown_s = None;
    }

    fn render_retrieval_countdown(&mut self, elapsed_ms: u64) {
        let secs = elapsed_ms / 1000;
        if self.last_countdown_s != Some(secs) {
            self.last_countdown_s = Some(secs);
            tracing::trace!(elapsed_s = secs, "awaiting retrieval");
        }
    }

    fn render_jam_notice(&mut self) {
        tracing::debug!("clearing jam");
    }

    fn clear_transient_notice(&mut self) {}

    fn show_log_failure(&mut self) {
        if !self.log_failure_shown {
            self.log_failure_shown = true;
            tracing::warn!("event log unavailable");
        }
    }
}

/// Rendered content of a [`TextDisplay`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    pub status: String,
    pub notice: Option<String>,
    pub log_failure: bool,
    /// Number of renders that changed the content.
    pub redraws: u32,
}

/// In-memory text display. Clones share one screen, so a handle kept
/// outside the controller can inspect what was drawn.
#[derive(Debug, Clone, Default)]
pub struct TextDisplay {
    screen: Arc<Mutex<Screen>>,
}

impl TextDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Screen> {
        self.screen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut Screen)) {
        let mut screen = self.lock();
        let before = (screen.status.clone(), screen.notice.clone(), screen.log_failure);
        f(&mut screen);
        if before != (screen.status.clone(), screen.notice.clone(), screen.log_failure) {
            screen.redraws += 1;
        }
    }
}

impl StatusDisplay for TextDisplay {
    fn render_status(&mut self, counts: &Counters) {
        let text = format!(
            "L:{} R:{} Pellets:{}",
            counts.left, counts.right, counts.pellets
        );
        self.update(|s| {
            s.status = text;
            s.notice = None;
        });
    }

    fn render_retrieval_countdown(&mut self, elapsed_ms: u64) {
        let text = format!("Retrieval: {}s", elapsed_ms / 1000);
        self.update(|s| s.notice = Some(text));
    }

    fn render_jam_notice(&mut self) {
        self.update(|s| s.notice = Some("Clearing jam".to_string()));
    }

    fn clear_transient_notice(&mut self) {
        self.update(|s| s.notice = None);
    }

    fn show_log_failure(&mut self) {
        self.update(|s| s.log_failure = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_countdown_changes_nothing() {
        let mut d = TextDisplay::new();
        d.render_retrieval_countdown(12_345);
        let first = d.screen();
        for _ in 0..5 {
            d.render_retrieval_countdown(12_345);
        }
        assert_eq!(d.screen(), first);
        assert_eq!(first.redraws, 1);
    }

    #[test]
    fn countdown_redraws_once_per_second() {
        let mut d = TextDisplay::new();
        for ms in 0..3000 {
            d.render_retrieval_countdown(ms);
        }
        assert_eq!(d.screen().redraws, 3);
        assert_eq!(d.screen().notice.as_deref(), Some("Retrieval: 2s"));
    }

    #[test]
    fn jam_notice_clears() {
        let mut d = TextDisplay::new();
        d.render_jam_notice();
        d.clear_transient_notice();
        d.clear_transient_notice();
        let s = d.screen();
        assert_eq!(s.notice, None);
        assert_eq!(s.redraws, 2);
    }
}
