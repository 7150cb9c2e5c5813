//! The kernel search engine.
//!
//! The LP relaxation (or the feature kernel) gives an initial kernel and a score for every
//! variable. The variables outside the kernel are split in buckets, and every bucket is tried in
//! turn: the kernel is extended with it and a restricted sub-model, where everything outside the
//! kernel is fixed to zero, is solved. Buckets that do not lead to a solution are reverted. The
//! whole pass over the buckets is repeated `ITERATIONS` times.

use crate::algorithm_selection::KernelMethods;
use crate::bucket_strategy::Bucket;
use crate::config_loader::Config;
use crate::error::{KsError, KsResult};
use crate::feature_kernel::init_feature_kernel;
use crate::kernel::{disable_variables, select_vars, unselect_vars, update_kernel, Kernel};
use crate::search_logger::SearchOutputLogger;
use crate::search_utils::{get_current_time, make_prng, TimeBudget};
use crate::solution::{DebugData, DebugIndex, DebugInfo, Solution};
use crate::solver_adapter::{solution_values, MipModel, SolveStatus};
use crate::variable_scoring::{
    lp_score, variable_score_factory, ScoreTable, ScoringSelection, Values,
};
use crate::worsen_score::WorsenScore;
use smolprng::{JsfLarge, PRNG};
use tracing::{debug, info};

/// Relative tolerance under which two round objectives count as the same value.
pub const FIXED_POINT_TOLERANCE: f64 = 1e-9;

/// Search phases, only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Init,
    BucketIteration,
    RoundComplete,
    Terminated,
}

/// true if two round objectives are equal up to [`FIXED_POINT_TOLERANCE`]
pub fn is_fixed_point(previous: Option<f64>, current: Option<f64>) -> bool {
    match (previous, current) {
        (Some(p), Some(c)) => (p - c).abs() <= FIXED_POINT_TOLERANCE * p.abs().max(c.abs()),
        (None, None) => true,
        _ => false,
    }
}

/// State of a kernel search run over a base model.
pub struct KernelSearch<'a, M: MipModel> {
    pub base: M,
    pub config: &'a Config,
    pub methods: KernelMethods,
    pub budget: TimeBudget,
    pub kernel: Kernel,
    pub buckets: Vec<Bucket>,
    pub lp_values: ScoreTable,
    pub scoring: ScoringSelection,
    pub incumbent: Option<Solution>,
    pub best: Option<Solution>,
    pub worsen: WorsenScore,
    pub debug_info: DebugInfo,
    pub iteration: usize,
    pub solves: usize,
    pub time_start: f64,
    pub prng: PRNG<JsfLarge>,
    pub solver_logger: SearchOutputLogger,
}

impl<'a, M: MipModel> KernelSearch<'a, M> {
    pub fn new(base: &M, config: &'a Config, methods: KernelMethods) -> Self {
        Self {
            base: base.clone(),
            config,
            methods,
            budget: TimeBudget::from_config(config),
            kernel: Kernel::new(),
            buckets: Vec::new(),
            lp_values: ScoreTable::new(),
            scoring: ScoringSelection::from_config(config),
            incumbent: None,
            best: None,
            worsen: WorsenScore::from_flag(config.worst_sol),
            debug_info: DebugInfo::new(),
            iteration: 0,
            solves: 0,
            time_start: get_current_time(),
            prng: make_prng(config.seed),
            solver_logger: SearchOutputLogger::new(if config.log { 2 } else { 0 }),
        }
    }

    fn instance_name(&self) -> &str {
        if self.config.instance.is_empty() {
            "model"
        } else {
            &self.config.instance
        }
    }

    /// Solves a sub-model under the budget.
    fn run(&mut self, model: &mut M) -> KsResult<SolveStatus> {
        self.solves += 1;
        self.budget.optimize(model)
    }

    /// The solution left behind by a solve, if any.
    fn extract_solution(model: &M, status: SolveStatus) -> Option<(f64, Vec<(String, f64)>)> {
        if !status.may_have_solution() {
            return None;
        }
        model
            .objective_value()
            .map(|value| (value, solution_values(model)))
    }

    /// LP relaxation: base kernel (nonzero variables) and value / reduced cost scores.
    fn lp_kernel(&mut self) -> KsResult<(Kernel, ScoreTable, M)> {
        let mut relaxed = self.base.relax();
        let status = self.run(&mut relaxed)?;
        if status != SolveStatus::Optimal {
            return Err(KsError::NoLpSolution(self.instance_name().to_string()));
        }

        let names = self.base.variable_names();
        let kernel = names
            .iter()
            .map(|name| (name, relaxed.variable_value(name).unwrap_or(0.0) != 0.0))
            .collect::<Kernel>();
        let values = names
            .iter()
            .map(|name| (name.as_str(), lp_score(&relaxed, name)))
            .collect::<ScoreTable>();

        Ok((kernel, values, relaxed))
    }

    /// Restricted solve over the initial kernel, warm started from the relaxation.
    fn initial_solution(&mut self, relaxed: &M) -> KsResult<Option<Solution>> {
        let mut model = self.base.clone();
        disable_variables(&mut model, &self.kernel, 0.0)?;

        if self.config.preload {
            for name in self.kernel.selected() {
                if let Some(value) = relaxed.variable_value(name) {
                    model.warm_start(name, value)?;
                }
            }
        }

        let status = self.run(&mut model)?;
        let solution = Self::extract_solution(&model, status)
            .map(|(value, vars)| Solution::new(value, vars));

        match &solution {
            Some(sol) => info!(value = sol.value, "initial solution"),
            None => info!(?status, "no initial solution, the buckets have to find one"),
        }
        Ok(solution)
    }

    fn build_buckets(&self, values: &dyn Values) -> KsResult<Vec<Bucket>> {
        (self.methods.bucket_builder)(
            &self.kernel,
            values,
            self.methods.bucket_sort,
            &self.config.bucket_sorter_conf,
            &self.config.bucket_conf,
        )
    }

    /// INIT: kernel, scores, initial incumbent and buckets.
    pub fn init(&mut self) -> KsResult<()> {
        info!(state = ?SearchState::Init, instance = self.instance_name(), "kernel search");

        if self.config.presolve {
            self.base = self.base.presolve()?;
        }

        let config = self.config;
        if let Some(feature_conf) = &config.feature_kernel {
            let (incumbent, kernel, values) =
                init_feature_kernel(&self.base, feature_conf, &mut self.budget)?;
            self.kernel = kernel;
            self.lp_values = values;
            self.kernel.check_not_ill()?;
            self.incumbent = incumbent;
        } else {
            let (kernel, values, relaxed) = self.lp_kernel()?;
            self.kernel = (self.methods.kernel_builder)(
                kernel,
                &values,
                self.methods.kernel_sort,
                &config.kernel_sorter_conf,
                &config.kernel_conf,
            )?;
            self.lp_values = values;

            // nothing else may be solved on an ill kernel
            self.kernel.check_not_ill()?;
            self.incumbent = self.initial_solution(&relaxed)?;
        }

        self.buckets = self.build_buckets(&self.lp_values)?;
        self.best = self.incumbent.clone();

        info!(
            kernel_size = self.kernel.selected_count(),
            buckets = self.buckets.len(),
            "kernel built"
        );
        Ok(())
    }

    /// Extends the kernel with one bucket, returns true if the sub-model gave a solution.
    pub fn extend(&mut self, index: usize, bucket: &[String]) -> KsResult<bool> {
        select_vars(&mut self.kernel, bucket)?;

        let mut model = self.base.clone();
        disable_variables(&mut model, &self.kernel, 0.0)?;
        model.add_at_least_one_nonzero(bucket)?;

        if let Some(incumbent) = &self.incumbent {
            if self.worsen.accept_worse(&mut self.prng) {
                debug!(iteration = self.iteration, bucket = index, "cutoff skipped");
            } else {
                model.set_cutoff(incumbent.value);
            }

            if self.config.preload {
                for (name, &value) in &incumbent.vars {
                    model.warm_start(name, value)?;
                }
            }
        }

        let status = self.run(&mut model)?;
        let found = Self::extract_solution(&model, status);
        debug!(
            iteration = self.iteration,
            bucket = index,
            ?status,
            value = found.as_ref().map(|(v, _)| *v),
            "bucket solved"
        );

        let Some((value, vars)) = found else {
            if !(self.config.kernel_growth && self.incumbent.is_none()) {
                unselect_vars(&mut self.kernel, bucket)?;
            }
            return Ok(false);
        };

        let sense = self.base.sense();
        let merged = match self.incumbent.take() {
            Some(mut sol) => {
                sol.update(value, vars);
                sol
            }
            None => Solution::new(value, vars),
        };
        let incumbent = self.incumbent.insert(merged);

        self.debug_info.add_data(
            DebugData {
                value,
                time: model.runtime(),
                nodes: model.node_count(),
                kernel_size: self.kernel.selected_count(),
                bucket_size: bucket.len(),
            },
            DebugIndex::new(self.iteration, index),
        );

        let improves = self
            .best
            .as_ref()
            .map_or(true, |best| incumbent.is_better_than(best, sense));
        if improves {
            self.best = Some(incumbent.clone());
        }

        if self.config.remove_unset {
            let removed = update_kernel(&mut self.kernel, bucket, incumbent, 0.0)?;
            debug!(removed, "unset bucket variables removed");
        }

        Ok(true)
    }

    /// One pass over the current buckets.
    fn run_buckets(&mut self) -> KsResult<()> {
        let buckets = std::mem::take(&mut self.buckets);
        for (index, bucket) in buckets.iter().enumerate() {
            let found = self.extend(index, bucket)?;
            self.solver_logger.generate_output_line(self, index, found);
        }
        self.buckets = buckets;
        Ok(())
    }

    /// Buckets of the next round. `None` once the kernel has absorbed so many variables that the
    /// remaining candidates cannot be split any more, the search then stops with what it has.
    fn next_buckets(&self) -> KsResult<Option<Vec<Bucket>>> {
        if self.kernel.selected_count() == self.kernel.len() {
            info!(
                iteration = self.iteration,
                kernel_size = self.kernel.selected_count(),
                "kernel covers the whole model, stopping early"
            );
            return Ok(None);
        }

        let values = variable_score_factory(
            self.scoring,
            &self.lp_values,
            self.incumbent.as_ref(),
            &self.kernel,
        );
        match self.build_buckets(&values) {
            Ok(buckets) if buckets.is_empty() => {
                info!(iteration = self.iteration, "no buckets left, stopping early");
                Ok(None)
            }
            Ok(buckets) => Ok(Some(buckets)),
            Err(KsError::BucketSizing { available, count }) => {
                info!(
                    iteration = self.iteration,
                    available,
                    count,
                    "candidates too few for the buckets, stopping early"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// ROUND_COMPLETE: fixed point bookkeeping and the buckets of the next round. Returns false
    /// when the search has to stop before the last round.
    fn complete_round(&mut self, previous: Option<f64>, last_round: bool) -> KsResult<bool> {
        let current = self.incumbent.as_ref().map(|s| s.value);
        let fixed_point = is_fixed_point(previous, current);

        if fixed_point {
            self.worsen.increase_score();
            info!(
                iteration = self.iteration,
                probability = self.worsen.get_probability(),
                "fixed point"
            );
        }
        self.worsen.increase_total();
        self.solver_logger.output_round(self, fixed_point);

        info!(
            state = ?SearchState::RoundComplete,
            iteration = self.iteration,
            value = current,
            kernel_size = self.kernel.selected_count(),
            "round complete"
        );

        if last_round {
            return Ok(true);
        }
        match self.next_buckets()? {
            Some(buckets) => {
                self.buckets = buckets;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs the whole search and returns the best solution seen, `None` if no sub-model ever
    /// produced one.
    ///
    /// # Errors
    ///
    /// [`KsError::NoLpSolution`], [`KsError::IllKernel`] and [`KsError::NoSamples`] when the
    /// search cannot start, [`KsError::TimeLimit`] when the global budget runs out.
    pub fn solve(&mut self) -> KsResult<Option<Solution>> {
        self.time_start = get_current_time();
        self.init()?;
        self.solver_logger.output_header(self);

        let rounds = self.config.iterations;
        for iteration in 0..rounds {
            self.iteration = iteration;
            info!(
                state = ?SearchState::BucketIteration,
                iteration,
                buckets = self.buckets.len(),
                "kernel search"
            );

            let previous = self.incumbent.as_ref().map(|s| s.value);
            self.run_buckets()?;
            if !self.complete_round(previous, iteration + 1 == rounds)? {
                break;
            }
        }

        self.solver_logger.generate_exit_line(self);
        info!(
            state = ?SearchState::Terminated,
            value = self.best.as_ref().map(|s| s.value),
            solves = self.solves,
            elapsed = self.budget.elapsed,
            "kernel search"
        );

        let mut best = self.best.clone();
        if self.config.debug.is_enabled() {
            if let Some(sol) = best.as_mut() {
                sol.debug = Some(self.debug_info.clone());
            }
        }
        Ok(best)
    }
}

/// Runs a kernel search on `base` with the given configuration and algorithms.
pub fn kernel_search<M: MipModel>(
    base: &M,
    config: &Config,
    methods: KernelMethods,
) -> KsResult<Option<Solution>> {
    KernelSearch::new(base, config, methods).solve()
}
