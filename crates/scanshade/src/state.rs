use std::time::{Duration, Instant};

use programs::ProgramRegistry;

/// Mutable runtime state shared by the input router and the frame driver.
///
/// The router only changes the selection (and with it the reload flag); the
/// driver only clears the flag, counts frames and resets the epoch.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    active_index: usize,
    reload_requested: bool,
    frame_count: u64,
    epoch: Instant,
}

impl RuntimeState {
    /// Starts with a reload pending so the first iteration builds `index`.
    pub fn new(active_index: usize, now: Instant) -> Self {
        Self {
            active_index,
            reload_requested: true,
            frame_count: 0,
            epoch: now,
        }
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn reload_requested(&self) -> bool {
        self.reload_requested
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn select_next(&mut self, registry: &ProgramRegistry) {
        self.select(registry.next(self.active_index));
    }

    pub fn select_previous(&mut self, registry: &ProgramRegistry) {
        self.select(registry.previous(self.active_index));
    }

    fn select(&mut self, index: usize) {
        self.active_index = index;
        self.reload_requested = true;
    }

    pub fn complete_reload(&mut self, now: Instant) {
        self.reload_requested = false;
        self.epoch = now;
    }

    /// Time since the active program finished loading.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.epoch)
    }

    pub fn advance_frame(&mut self) -> u64 {
        self.frame_count += 1;
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use programs::ProgramDescriptor;
    use std::path::Path;

    fn registry(names: &[&str]) -> ProgramRegistry {
        ProgramRegistry::from_programs(
            names
                .iter()
                .map(|name| ProgramDescriptor::new(*name, Path::new("/programs")))
                .collect(),
        )
    }

    #[test]
    fn starts_with_a_pending_reload() {
        let state = RuntimeState::new(2, Instant::now());
        assert_eq!(state.active_index(), 2);
        assert!(state.reload_requested());
        assert_eq!(state.frame_count(), 0);
    }

    #[test]
    fn selection_wraps_and_requests_a_reload() {
        let registry = registry(&["a", "b", "c"]);
        let mut state = RuntimeState::new(0, Instant::now());
        state.complete_reload(Instant::now());

        state.select_previous(&registry);
        assert_eq!(state.active_index(), 2);
        assert!(state.reload_requested());

        state.complete_reload(Instant::now());
        state.select_next(&registry);
        assert_eq!(state.active_index(), 0);
        assert!(state.reload_requested());
    }

    #[test]
    fn elapsed_restarts_at_each_reload() {
        let start = Instant::now();
        let mut state = RuntimeState::new(0, start);
        assert_eq!(state.elapsed(start + Duration::from_secs(5)), Duration::from_secs(5));

        let reloaded = start + Duration::from_secs(10);
        state.complete_reload(reloaded);
        assert!(!state.reload_requested());
        assert_eq!(state.elapsed(reloaded), Duration::ZERO);
        assert_eq!(
            state.elapsed(reloaded + Duration::from_millis(16)),
            Duration::from_millis(16)
        );
        assert!(
            state.elapsed(reloaded + Duration::from_millis(33))
                > state.elapsed(reloaded + Duration::from_millis(16))
        );
        assert_eq!(state.elapsed(start), Duration::ZERO);
    }

    #[test]
    fn counts_frames() {
        let mut state = RuntimeState::new(0, Instant::now());
        assert_eq!(state.advance_frame(), 1);
        assert_eq!(state.advance_frame(), 2);
        assert_eq!(state.frame_count(), 2);
    }
}
