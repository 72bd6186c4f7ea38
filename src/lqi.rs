//! Link-quality estimation
//!
//! Each neighbor gets a fixed-capacity circular history of beacon
//! reception samples, one per refresh interval: `true` when a beacon
//! arrived within the interval, `false` when none did. The history reduces
//! to a 0-255 score where consecutive misses weigh more than isolated
//! ones, so a flapping link scores better than a dead one with the same
//! raw loss count.

/// Circular seen/missed history for one neighbor.
#[derive(Debug, Clone)]
pub struct LinkHistory {
    buffer: Vec<bool>,
    head: usize,
    full: bool,
}

/// Loss weight of a miss that directly follows an older miss.
const RUN_WEIGHT: u32 = 2;
/// Loss weight of an isolated miss, and the base weight of every sample.
const BASE_WEIGHT: u32 = 1;

impl LinkHistory {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "history needs at least two samples");
        Self {
            buffer: vec![false; capacity],
            head: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Record one refresh-interval sample.
    pub fn insert(&mut self, seen: bool) {
        self.buffer[self.head] = seen;
        self.head = (self.head + 1) % self.buffer.len();
        if self.head == 0 {
            self.full = true;
        }
    }

    /// Sample `age` intervals ago (0 = most recent). `None` while the
    /// buffer has not yet wrapped and the slot is unfilled.
    fn sample_back(&self, age: usize) -> Option<bool> {
        let cap = self.buffer.len();
        if self.full {
            Some(self.buffer[(self.head + cap - 1 - age) % cap])
        } else if age < self.head {
            Some(self.buffer[self.head - 1 - age])
        } else {
            None
        }
    }

    /// Reduce the history to a 0-255 quality score.
    ///
    /// Scan from the newest sample backward. A miss whose older neighbor
    /// sample is also a miss carries weight 2, any other miss weight 1;
    /// unfilled slots count as isolated misses so a young history starts
    /// from a pessimistic baseline. The oldest position never counts as a
    /// run continuation. Score = round((1 - loss/total) * 255).
    pub fn score(&self) -> u8 {
        let cap = self.buffer.len();
        let mut loss = 0u32;
        let mut total = 0u32;
        for age in 0..cap {
            let sample = self.sample_back(age);
            let continued = age + 1 < cap
                && sample == Some(false)
                && self.sample_back(age + 1) == Some(false);
            let weight = if continued { RUN_WEIGHT } else { BASE_WEIGHT };
            total += weight;
            if sample != Some(true) {
                loss += weight;
            }
        }
        ((1.0 - loss as f32 / total as f32) * 255.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(samples: &[bool]) -> LinkHistory {
        let mut h = LinkHistory::new(8);
        for &s in samples {
            h.insert(s);
        }
        h
    }

    #[test]
    fn test_all_seen_scores_max() {
        assert_eq!(history(&[true; 8]).score(), 255);
    }

    #[test]
    fn test_all_missed_scores_zero() {
        assert_eq!(history(&[false; 8]).score(), 0);
    }

    #[test]
    fn test_empty_history_scores_zero() {
        assert_eq!(LinkHistory::new(8).score(), 0);
    }

    #[test]
    fn test_score_grows_with_samples() {
        // Each additional seen sample displaces an unfilled pessimistic slot.
        let mut h = LinkHistory::new(8);
        let mut prev = h.score();
        for _ in 0..8 {
            h.insert(true);
            let score = h.score();
            assert!(score > prev);
            prev = score;
        }
        assert_eq!(prev, 255);
    }

    #[test]
    fn test_consecutive_misses_weigh_more() {
        // Same loss count: two adjacent misses vs two isolated ones.
        let grouped = history(&[true, true, false, false, true, true, true, true]);
        let spread = history(&[true, false, true, true, false, true, true, true]);
        assert!(grouped.score() < spread.score());
    }

    #[test]
    fn test_monotonicity_in_seen_run() {
        // More consecutive seen entries never lowers the score.
        let worse = history(&[true, true, true, false, false, true, true, true]);
        let better = history(&[true, true, true, true, false, true, true, true]);
        assert!(better.score() >= worse.score());
    }

    #[test]
    fn test_wraparound_indexing() {
        let mut h = LinkHistory::new(8);
        for _ in 0..8 {
            h.insert(false);
        }
        // Wrapped buffer, then a run of seen samples pushes the score up.
        for _ in 0..8 {
            h.insert(true);
        }
        assert_eq!(h.score(), 255);
    }
}
