//! Randomized inter-item pauses

use std::time::Duration;

use rand::Rng;

use crate::config::PacingBounds;

/// Picks the pause between two dispatched items
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    multi_domain: PacingBounds,
    single_domain: PacingBounds,
}

impl Pacing {
    pub fn new(multi_domain: PacingBounds, single_domain: PacingBounds) -> Self {
        Self {
            multi_domain,
            single_domain,
        }
    }

    /// Bounds for a pool that does or does not rotate
    pub fn bounds(&self, rotates: bool) -> PacingBounds {
        if rotates {
            self.multi_domain
        } else {
            self.single_domain
        }
    }

    /// Random delay within the bounds for the pool
    pub fn delay(&self, rotates: bool) -> Duration {
        let PacingBounds { min_ms, max_ms } = self.bounds(rotates);
        let ms = if max_ms > min_ms {
            rand::thread_rng().gen_range(min_ms..=max_ms)
        } else {
            min_ms
        };
        Duration::from_millis(ms)
    }
}
