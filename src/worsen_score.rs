//! Acceptance of worse solutions, driven by how often the search stagnates.

use smolprng::{Algorithm, PRNG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorsenMode {
    /// Probability is `score / total`.
    Observed,
    /// Probability is always zero, the counters are still kept.
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorsenScore {
    pub score: usize,
    pub total: usize,
    pub mode: WorsenMode,
}

impl WorsenScore {
    pub const fn new(mode: WorsenMode) -> Self {
        Self {
            score: 0,
            total: 0,
            mode,
        }
    }

    pub const fn from_flag(enabled: bool) -> Self {
        if enabled {
            Self::new(WorsenMode::Observed)
        } else {
            Self::new(WorsenMode::Disabled)
        }
    }

    pub fn get_probability(&self) -> f64 {
        match self.mode {
            WorsenMode::Disabled => 0.0,
            WorsenMode::Observed if self.total == 0 => 0.0,
            WorsenMode::Observed => self.score as f64 / self.total as f64,
        }
    }

    /// Called on every fixed point.
    pub fn increase_score(&mut self) {
        self.score += 1;
    }

    /// Called on every completed round.
    pub fn increase_total(&mut self) {
        self.total += 1;
    }

    /// Draws whether the next extension may accept a worse solution, i.e. skip the cutoff.
    pub fn accept_worse<T: Algorithm>(&self, prng: &mut PRNG<T>) -> bool {
        let probability = self.get_probability();
        if probability <= 0.0 {
            return false;
        }
        prng.gen_f64() > 1.0 - probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smolprng::JsfLarge;

    #[test]
    fn test_probability() {
        let mut worsen = WorsenScore::new(WorsenMode::Observed);
        assert_eq!(worsen.get_probability(), 0.0);

        worsen.increase_total();
        assert_eq!(worsen.get_probability(), 0.0);

        worsen.increase_score();
        worsen.increase_total();
        worsen.increase_total();
        worsen.increase_total();
        assert_eq!(worsen.get_probability(), 0.25);
    }

    #[test]
    fn test_disabled_probability() {
        let mut worsen = WorsenScore::from_flag(false);
        for _ in 0..5 {
            worsen.increase_score();
            worsen.increase_total();
        }
        assert_eq!(worsen.score, 5);
        assert_eq!(worsen.get_probability(), 0.0);

        let mut prng = PRNG {
            generator: JsfLarge::from(3u64),
        };
        assert!((0..100).all(|_| !worsen.accept_worse(&mut prng)));
    }

    #[test]
    fn test_accept_worse() {
        let mut prng = PRNG {
            generator: JsfLarge::from(11u64),
        };

        // always stagnating: every draw is above 1 - 1 = 0
        let mut worsen = WorsenScore::from_flag(true);
        worsen.increase_score();
        worsen.increase_total();
        assert_eq!(worsen.get_probability(), 1.0);
        let accepted = (0..200).filter(|_| worsen.accept_worse(&mut prng)).count();
        assert!(accepted > 190);

        // half the rounds stagnated, roughly half of the draws accept
        worsen.increase_total();
        let accepted = (0..2000).filter(|_| worsen.accept_worse(&mut prng)).count();
        assert!((800..1200).contains(&accepted), "{accepted}");
    }
}
