use crate::config_loader::Config;
use crate::error::{KsError, KsResult};
use crate::solver_adapter::{MipModel, SolveStatus};
use smolprng::{Algorithm, JsfLarge, PRNG};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wall clock time in seconds.
pub fn get_current_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn make_prng(seed: u64) -> PRNG<JsfLarge> {
    PRNG {
        generator: JsfLarge::from(seed),
    }
}

/// Draws `k` distinct indices out of `0..n`, returned in increasing order.
pub fn random_subset<T: Algorithm>(n: usize, k: usize, prng: &mut PRNG<T>) -> Vec<usize> {
    let k = k.min(n);
    let mut pool: Vec<usize> = (0..n).collect();

    // partial Fisher-Yates, the first k slots end up holding the sample
    for i in 0..k {
        let j = i + (prng.gen_u64() as usize) % (n - i);
        pool.swap(i, j);
    }

    pool.truncate(k);
    pool.sort_unstable();
    pool
}

/// The time budget of a search, owned by the engine.
///
/// `remaining` is the global budget, every solve is deducted from it and the search aborts once
/// it is exhausted. `per_solve` caps a single solve and never aborts anything.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBudget {
    pub remaining: Option<f64>,
    pub per_solve: Option<f64>,
    pub elapsed: f64,
}

impl TimeBudget {
    pub const fn unlimited() -> Self {
        Self {
            remaining: None,
            per_solve: None,
            elapsed: 0.0,
        }
    }

    pub const fn from_config(config: &Config) -> Self {
        Self {
            remaining: config.global_time_limit,
            per_solve: config.time_limit,
            elapsed: 0.0,
        }
    }

    /// Time limit to hand to the next solve.
    pub fn limit_for_next(&self) -> Option<f64> {
        match (self.remaining, self.per_solve) {
            (Some(r), Some(p)) => Some(r.min(p)),
            (r, p) => r.or(p),
        }
    }

    /// Deducts a finished solve from the budget.
    ///
    /// # Errors
    ///
    /// [`KsError::TimeLimit`] once the global budget reaches zero.
    pub fn consume(&mut self, seconds: f64) -> KsResult<()> {
        self.elapsed += seconds;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= seconds;
            if *remaining <= 0.0 {
                return Err(KsError::TimeLimit {
                    elapsed: self.elapsed,
                });
            }
        }
        Ok(())
    }

    /// Solves `model` under the budget: limits the solve, measures it and deducts it.
    pub fn optimize<M: MipModel>(&mut self, model: &mut M) -> KsResult<SolveStatus> {
        self.optimize_capped(model, None)
    }

    /// Like [`TimeBudget::optimize`], with an extra cap on this single solve.
    pub fn optimize_capped<M: MipModel>(
        &mut self,
        model: &mut M,
        cap: Option<f64>,
    ) -> KsResult<SolveStatus> {
        let limit = match (self.limit_for_next(), cap) {
            (Some(l), Some(c)) => Some(l.min(c)),
            (l, c) => l.or(c),
        };
        if let Some(limit) = limit {
            model.set_time_limit(Some(limit));
        }

        let start = Instant::now();
        let status = model.optimize()?;
        self.consume(start.elapsed().as_secs_f64())?;
        Ok(status)
    }
}
