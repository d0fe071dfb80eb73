use crate::view::scheduler::Enablement;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pause switch for a view's polling loops.
///
/// A paused loop keeps ticking at its current period without fetching, so
/// resuming needs no extra wiring.
#[derive(Debug, Clone)]
pub struct AutoRefresh {
    active: Arc<AtomicBool>,
}

impl AutoRefresh {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Flips the switch and returns the new state.
    pub fn toggle(&self) -> bool {
        let active = !self.active.fetch_xor(true, Ordering::SeqCst);
        tracing::debug!(active, "Auto-refresh toggled");
        active
    }

    pub fn enablement(&self) -> Enablement {
        let active = Arc::clone(&self.active);
        Arc::new(move || active.load(Ordering::SeqCst))
    }
}

impl Default for AutoRefresh {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_flips_and_reports() {
        let refresh = AutoRefresh::default();
        assert!(refresh.is_active());

        assert!(!refresh.toggle());
        assert!(!refresh.is_active());

        assert!(refresh.toggle());
        assert!(refresh.is_active());
    }

    #[test]
    fn test_enablement_tracks_switch() {
        let refresh = AutoRefresh::new(false);
        let enabled = refresh.enablement();
        assert!(!enabled());

        refresh.clone().set(true);
        assert!(enabled());
    }
}
