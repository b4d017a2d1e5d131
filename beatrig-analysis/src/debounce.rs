//! Hysteresis for noisy boolean detectors

/// Boolean that only changes after the opposite observation has held for
/// a stable interval.
#[derive(Debug, Clone)]
pub struct DebouncedFlag {
    debounce: f64,
    state: bool,
    on_since: Option<f64>,
    off_since: Option<f64>,
}

impl DebouncedFlag {
    /// Create a flag that flips after `debounce` seconds of stable input
    pub fn new(debounce: f64) -> Self {
        Self {
            debounce: debounce.max(0.0),
            state: false,
            on_since: None,
            off_since: None,
        }
    }

    /// Feed one observation taken at `now` (seconds) and return the stable value
    pub fn update(&mut self, observed: bool, now: f64) -> bool {
        if observed {
            self.off_since = None;
            let since = *self.on_since.get_or_insert(now);
            if !self.state && now - since >= self.debounce {
                self.state = true;
            }
        } else {
            self.on_since = None;
            let since = *self.off_since.get_or_insert(now);
            if self.state && now - since >= self.debounce {
                self.state = false;
            }
        }
        self.state
    }

    /// Current stable value
    pub fn state(&self) -> bool {
        self.state
    }

    /// Debounce interval in seconds
    pub fn debounce(&self) -> f64 {
        self.debounce
    }

    /// Forget all timers and return to `false`
    pub fn reset(&mut self) {
        self.state = false;
        self.on_since = None;
        self.off_since = None;
    }
}

impl Default for DebouncedFlag {
    fn default() -> Self {
        Self::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_sequence() {
        let mut flag = DebouncedFlag::new(0.2);

        // 0.15s of true is not enough
        for step in 0..4 {
            assert!(!flag.update(true, step as f64 * 0.05));
        }
        // 0.2s of continuous true flips it
        assert!(flag.update(true, 0.25));

        // A short false keeps the stable value
        assert!(flag.update(false, 0.3));
        assert!(flag.update(false, 0.4));
        assert!(!flag.update(false, 0.55));
    }

    #[test]
    fn test_flips_exactly_at_interval() {
        let mut flag = DebouncedFlag::new(1.0);
        assert!(!flag.update(true, 10.0));
        assert!(!flag.update(true, 10.999));
        assert!(flag.update(true, 11.0));
    }

    #[test]
    fn test_interruption_restarts_timer() {
        let mut flag = DebouncedFlag::new(0.5);
        flag.update(true, 0.0);
        flag.update(true, 0.4);
        // Interrupted before the interval elapsed
        flag.update(false, 0.45);
        assert!(!flag.update(true, 0.6));
        assert!(!flag.update(true, 1.0));
        assert!(flag.update(true, 1.1));
    }

    #[test]
    fn test_reset() {
        let mut flag = DebouncedFlag::new(0.0);
        assert!(flag.update(true, 0.0));
        flag.reset();
        assert!(!flag.state());
    }
}
