//! Feature kernel: builds the initial kernel out of random sub-model samples instead of the LP
//! relaxation.
//!
//! SAMPLING solves many restricted sub-models of random size, AGGREGATING turns them into a
//! data set, RANKED fits a tree ensemble on it and keeps the most important variables.

use crate::config_loader::{FeatureKernelConfig, KernelSizePolicy};
use crate::error::{KsError, KsResult};
use crate::importance::{feature_importances, ForestOptions};
use crate::kernel::Kernel;
use crate::search_utils::{make_prng, random_subset, TimeBudget};
use crate::solution::Solution;
use crate::solver_adapter::{MipModel, SolveStatus};
use crate::variable_scoring::{lp_score, ScoreTable};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smolprng::{Algorithm, PRNG};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKernelState {
    Sampling,
    Aggregating,
    Ranked,
    Done,
}

/// Outcome of a single sampled sub-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    /// relaxation feasible, integer sub-model infeasible
    Infeasible,
    Feasible,
    TimeOut,
}

impl TrialStatus {
    /// Numeric code used in the trial log and as the class label.
    pub const fn code(self) -> usize {
        match self {
            Self::Infeasible => 0,
            Self::Feasible => 1,
            Self::TimeOut => 2,
        }
    }
}

/// A sampled sub-model. `status` is `None` when not even the relaxation could be solved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub values: Vec<f64>,
    pub status: Option<TrialStatus>,
    pub size: usize,
}

pub type TrialCache = BTreeMap<usize, Trial>;

/// Adaptive size and time limit of the next sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSizer {
    pub size: f64,
    pub time: f64,
    max_time: f64,
    model_size: usize,
}

impl SampleSizer {
    pub fn new(model_size: usize, config: &FeatureKernelConfig) -> Self {
        let mut sizer = Self {
            size: config.initial_size * model_size as f64,
            time: config.min_time,
            max_time: config.max_time,
            model_size,
        };
        sizer.clamp();
        sizer
    }

    fn clamp(&mut self) {
        self.size = self.size.clamp(1.0, self.model_size.max(1) as f64);
    }

    pub fn current(&self) -> usize {
        (self.size.round() as usize).clamp(1, self.model_size.max(1))
    }

    /// Feasible samples shrink, infeasible ones grow, time outs first get more time.
    pub fn update(&mut self, outcome: Option<TrialStatus>) {
        match outcome {
            Some(TrialStatus::Feasible) => self.size *= 0.9,
            Some(TrialStatus::Infeasible) => self.size *= 1.1,
            Some(TrialStatus::TimeOut) if self.time < self.max_time => {
                self.time = (self.time * 2.0).min(self.max_time);
            }
            Some(TrialStatus::TimeOut) => self.size *= 0.9,
            None => self.size *= 2.0,
        }
        self.clamp();
    }
}

/// One value per variable, zero for the variables left out of the sample.
fn sample_values(names: &[String], kept: &[bool], score: impl Fn(&str) -> f64) -> Vec<f64> {
    names
        .iter()
        .zip(kept)
        .map(|(name, &k)| if k { score(name) } else { 0.0 })
        .collect()
}

/// Solves one random sub-model keeping `size` variables, the others are fixed to zero.
fn run_trial<M: MipModel, T: Algorithm>(
    base: &M,
    names: &[String],
    size: usize,
    time: f64,
    prng: &mut PRNG<T>,
    budget: &mut TimeBudget,
) -> KsResult<Trial> {
    let mut kept = vec![false; names.len()];
    for i in random_subset(names.len(), size, prng) {
        kept[i] = true;
    }

    let restrict = |model: &mut M| -> KsResult<()> {
        for (name, _) in names.iter().zip(&kept).filter(|(_, k)| !**k) {
            model.fix_variable(name, 0.0)?;
        }
        Ok(())
    };

    let mut relaxed = base.relax();
    restrict(&mut relaxed)?;
    let status = budget.optimize_capped(&mut relaxed, Some(time))?;

    let relaxed_values = sample_values(names, &kept, |name| lp_score(&relaxed, name));
    match status {
        SolveStatus::Optimal => {}
        SolveStatus::TimeLimit => {
            return Ok(Trial {
                values: relaxed_values,
                status: Some(TrialStatus::TimeOut),
                size,
            })
        }
        _ => {
            return Ok(Trial {
                values: relaxed_values,
                status: None,
                size,
            })
        }
    }

    let mut restricted = base.clone();
    restrict(&mut restricted)?;
    restricted.set_solution_limit(Some(1));
    let status = budget.optimize_capped(&mut restricted, Some(time))?;

    let found = status.may_have_solution() && restricted.objective_value().is_some();
    let trial = match status {
        _ if found => Trial {
            values: sample_values(names, &kept, |name| {
                restricted.variable_value(name).unwrap_or(0.0)
            }),
            status: Some(TrialStatus::Feasible),
            size,
        },
        SolveStatus::Infeasible | SolveStatus::Cutoff => Trial {
            values: relaxed_values,
            status: Some(TrialStatus::Infeasible),
            size,
        },
        // the backend could not decide in time
        _ => Trial {
            values: relaxed_values,
            status: Some(TrialStatus::TimeOut),
            size,
        },
    };
    Ok(trial)
}

pub fn load_cache(file_name: &Path) -> KsResult<TrialCache> {
    if !file_name.exists() {
        return Ok(TrialCache::new());
    }

    let file = File::open(file_name).map_err(|e| KsError::io(file_name, e))?;
    serde_json::from_reader(BufReader::new(GzDecoder::new(file))).map_err(|e| KsError::Parse {
        line: e.line(),
        message: format!("feature kernel cache {}: {e}", file_name.display()),
    })
}

pub fn save_cache(file_name: &Path, cache: &TrialCache) -> KsResult<()> {
    let file = File::create(file_name).map_err(|e| KsError::io(file_name, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, cache).map_err(|e| KsError::Parse {
        line: e.line(),
        message: format!("feature kernel cache {}: {e}", file_name.display()),
    })?;
    encoder
        .finish()
        .and_then(|mut w| w.flush())
        .map_err(|e| KsError::io(file_name, e))
}

/// Appends `trials` after the highest key of `cache`.
pub fn merge_trials(cache: &mut TrialCache, trials: Vec<Trial>) {
    let mut next = cache.keys().next_back().map_or(0, |k| k + 1);
    for trial in trials {
        cache.insert(next, trial);
        next += 1;
    }
}

/// One `trial,size,status` line per trial, the status is empty on total failure.
pub fn trial_log(cache: &TrialCache) -> String {
    let mut output = String::new();
    for (index, trial) in cache {
        let status = trial
            .status
            .map(|s| s.code().to_string())
            .unwrap_or_default();
        output.push_str(&format!("{index},{},{status}\n", trial.size));
    }
    output
}

/// Kernel size out of the sampled sizes, falls back to the smallest usable sample.
pub fn kernel_size(trials: &[&Trial], policy: KernelSizePolicy) -> Option<usize> {
    let sizes_of = |status: TrialStatus| {
        trials
            .iter()
            .filter(move |t| t.status == Some(status))
            .map(|t| t.size)
    };

    let size = match policy {
        KernelSizePolicy::MaxInfeasible => sizes_of(TrialStatus::Infeasible).max(),
        KernelSizePolicy::MinInfeasible => sizes_of(TrialStatus::Infeasible).min(),
        KernelSizePolicy::MaxFeasible => sizes_of(TrialStatus::Feasible).max(),
        KernelSizePolicy::MinFeasible => sizes_of(TrialStatus::Feasible).min(),
    };

    size.or_else(|| trials.iter().map(|t| t.size).min())
}

/// Data set (usable trial × variable) and class labels.
pub fn build_dataset(trials: &[&Trial], width: usize) -> (Array2<f64>, Vec<usize>) {
    let mut data = Array2::zeros((trials.len(), width));
    let mut labels = Vec::with_capacity(trials.len());

    for (i, trial) in trials.iter().enumerate() {
        for (j, &v) in trial.values.iter().enumerate() {
            data[[i, j]] = v;
        }
        labels.push(trial.status.map_or(0, TrialStatus::code));
    }

    (data, labels)
}

/// Ranks the variables and keeps the `size` most important ones, ties go to the model order.
fn rank_kernel(names: &[String], importance: &[f64], size: usize) -> (Kernel, ScoreTable) {
    let mut order: Vec<usize> = (0..names.len()).collect();
    order.sort_by(|&a, &b| importance[b].total_cmp(&importance[a]));

    let mut selected = vec![false; names.len()];
    for &i in order.iter().take(size) {
        selected[i] = true;
    }

    let kernel = names.iter().zip(selected).collect::<Kernel>();
    let values = names
        .iter()
        .zip(importance)
        .map(|(name, &v)| (name.as_str(), v))
        .collect::<ScoreTable>();
    (kernel, values)
}

/// Runs the feature kernel on `base`, returns no incumbent, the kernel and the importance
/// scores.
///
/// # Errors
///
/// [`KsError::NoSamples`] if no trial (cached or new) is usable, [`KsError::TimeLimit`] if the
/// global budget runs out while sampling.
pub fn init_feature_kernel<M: MipModel>(
    base: &M,
    config: &FeatureKernelConfig,
    budget: &mut TimeBudget,
) -> KsResult<(Option<Solution>, Kernel, ScoreTable)> {
    let names = base.variable_names();
    let n = names.len();

    let mut state = FeatureKernelState::Sampling;
    info!(?state, count = config.count, "feature kernel");

    let mut cache = match &config.cache_file {
        Some(file) => load_cache(Path::new(file))?,
        None => TrialCache::new(),
    };

    let mut prng = make_prng(config.seed);
    let mut sizer = SampleSizer::new(n, config);
    let mut trials = Vec::with_capacity(config.count);

    for index in 0..config.count {
        let size = sizer.current();
        let trial = run_trial(base, &names, size, sizer.time, &mut prng, budget)?;
        debug!(index, size, status = ?trial.status, time = sizer.time, "feature kernel trial");
        sizer.update(trial.status);
        trials.push(trial);
    }
    merge_trials(&mut cache, trials);

    if let Some(file) = &config.cache_file {
        save_cache(Path::new(file), &cache)?;
    }
    if let Some(file) = &config.log_file {
        std::fs::write(file, trial_log(&cache)).map_err(|e| KsError::io(file, e))?;
    }

    state = FeatureKernelState::Aggregating;
    info!(?state, trials = cache.len(), "feature kernel");

    let usable: Vec<&Trial> = cache
        .iter()
        .filter(|(index, trial)| {
            if trial.values.len() != n {
                warn!(index, width = trial.values.len(), "skipping cached trial of another model");
                return false;
            }
            trial.status.is_some()
        })
        .map(|(_, trial)| trial)
        .collect();

    if usable.is_empty() {
        return Err(KsError::NoSamples(cache.len()));
    }

    let (data, labels) = build_dataset(&usable, n);
    let options = ForestOptions::new(config.trees, config.seed);
    let mut importance = feature_importances(&data, &labels, &options).to_vec();

    // a single class gives no impurity to explain, fall back to the magnitudes
    if importance.iter().all(|&v| v == 0.0) {
        importance = data
            .columns()
            .into_iter()
            .map(|col| col.iter().map(|v| v.abs()).sum::<f64>() / usable.len() as f64)
            .collect();
    }

    let size = kernel_size(&usable, config.policy)
        .unwrap_or(1)
        .clamp(1, n.saturating_sub(1).max(1));

    state = FeatureKernelState::Ranked;
    info!(?state, kernel_size = size, "feature kernel");

    let (kernel, values) = rank_kernel(&names, &importance, size);

    state = FeatureKernelState::Done;
    info!(?state, "feature kernel");

    Ok((None, kernel, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mip_model::tests::knapsack;
    use crate::mip_model::MpsModel;
    use crate::mps_reader::parse_mps;
    use crate::solver_options::SolverOptions;

    fn config() -> FeatureKernelConfig {
        FeatureKernelConfig {
            count: 12,
            trees: 20,
            ..FeatureKernelConfig::default()
        }
    }

    fn trial(size: usize, status: Option<TrialStatus>) -> Trial {
        Trial {
            values: vec![0.0; 3],
            status,
            size,
        }
    }

    #[test]
    fn test_sample_sizing() {
        let conf = FeatureKernelConfig {
            min_time: 1.0,
            max_time: 4.0,
            initial_size: 0.5,
            ..FeatureKernelConfig::default()
        };
        let mut sizer = SampleSizer::new(100, &conf);
        assert_eq!(sizer.current(), 50);

        sizer.update(Some(TrialStatus::Feasible));
        assert_eq!(sizer.current(), 45);

        sizer.update(Some(TrialStatus::Infeasible));
        assert!((sizer.size - 49.5).abs() < 1e-9);

        // time outs double the time up to the maximum, then shrink the sample
        sizer.update(Some(TrialStatus::TimeOut));
        sizer.update(Some(TrialStatus::TimeOut));
        assert_eq!(sizer.time, 4.0);
        assert!((sizer.size - 49.5).abs() < 1e-9);
        sizer.update(Some(TrialStatus::TimeOut));
        assert!((sizer.size - 44.55).abs() < 1e-9);

        sizer.update(None);
        sizer.update(None);
        assert_eq!(sizer.current(), 100);

        for _ in 0..100 {
            sizer.update(Some(TrialStatus::Feasible));
        }
        assert_eq!(sizer.current(), 1);
    }

    #[test]
    fn test_kernel_size_policies() {
        let trials = [
            trial(10, Some(TrialStatus::Infeasible)),
            trial(15, Some(TrialStatus::Infeasible)),
            trial(40, Some(TrialStatus::Feasible)),
            trial(60, Some(TrialStatus::Feasible)),
            trial(5, Some(TrialStatus::TimeOut)),
        ];
        let refs: Vec<&Trial> = trials.iter().collect();

        assert_eq!(kernel_size(&refs, KernelSizePolicy::MaxInfeasible), Some(15));
        assert_eq!(kernel_size(&refs, KernelSizePolicy::MinInfeasible), Some(10));
        assert_eq!(kernel_size(&refs, KernelSizePolicy::MaxFeasible), Some(60));
        assert_eq!(kernel_size(&refs, KernelSizePolicy::MinFeasible), Some(40));

        // no feasible trial: smallest sample overall
        let refs: Vec<&Trial> = trials.iter().filter(|t| t.size < 40).collect();
        assert_eq!(kernel_size(&refs, KernelSizePolicy::MinFeasible), Some(5));
        assert_eq!(kernel_size(&[], KernelSizePolicy::MinFeasible), None);
    }

    #[test]
    fn test_merge_and_log() {
        let mut cache = TrialCache::new();
        merge_trials(&mut cache, vec![trial(3, Some(TrialStatus::Feasible))]);
        merge_trials(
            &mut cache,
            vec![trial(7, None), trial(2, Some(TrialStatus::TimeOut))],
        );

        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(trial_log(&cache), "0,3,1\n1,7,\n2,2,2\n");
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache.json.gz");
        assert!(load_cache(&file).unwrap().is_empty());

        let mut cache = TrialCache::new();
        merge_trials(
            &mut cache,
            vec![
                Trial {
                    values: vec![1.0, -0.5, 0.0],
                    status: Some(TrialStatus::Infeasible),
                    size: 2,
                },
                trial(1, None),
            ],
        );
        save_cache(&file, &cache).unwrap();
        assert_eq!(load_cache(&file).unwrap(), cache);

        std::fs::write(&file, b"not gzip").unwrap();
        assert!(load_cache(&file).is_err());
    }

    #[test]
    fn test_dataset_and_ranking() {
        let trials = [
            Trial {
                values: vec![1.0, 0.0, 2.0],
                status: Some(TrialStatus::Feasible),
                size: 2,
            },
            Trial {
                values: vec![0.0, 3.0, 0.0],
                status: Some(TrialStatus::TimeOut),
                size: 1,
            },
        ];
        let refs: Vec<&Trial> = trials.iter().collect();
        let (data, labels) = build_dataset(&refs, 3);
        assert_eq!(data.dim(), (2, 3));
        assert_eq!(data[[1, 1]], 3.0);
        assert_eq!(labels, [1, 2]);

        let names: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let (kernel, values) = rank_kernel(&names, &[0.2, 0.5, 0.2], 2);
        assert_eq!(kernel.selected().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(crate::variable_scoring::Values::get_value(&values, "b"), 0.5);
    }

    #[test]
    fn test_init_feature_kernel() {
        let base = knapsack();
        let dir = tempfile::tempdir().unwrap();
        let cache_file = dir.path().join("trials.gz");
        let log_file = dir.path().join("trials.csv");
        let conf = FeatureKernelConfig {
            cache_file: Some(cache_file.to_string_lossy().into_owned()),
            log_file: Some(log_file.to_string_lossy().into_owned()),
            ..config()
        };

        let mut budget = TimeBudget::unlimited();
        let (incumbent, kernel, values) = init_feature_kernel(&base, &conf, &mut budget).unwrap();

        assert!(incumbent.is_none());
        assert_eq!(kernel.len(), 4);
        assert!(kernel.check_not_ill().is_ok());
        assert!(kernel.selected_count() >= 1);
        assert_eq!(values.len(), 4);

        let log = std::fs::read_to_string(&log_file).unwrap();
        assert_eq!(log.lines().count(), 12);

        // a second run appends to the cache
        init_feature_kernel(&base, &conf, &mut budget).unwrap();
        assert_eq!(load_cache(&cache_file).unwrap().len(), 24);
    }

    #[test]
    fn test_init_feature_kernel_time_limit() {
        let base = knapsack();
        let mut budget = TimeBudget {
            remaining: Some(1.0e-9),
            per_solve: None,
            elapsed: 0.0,
        };
        let result = init_feature_kernel(&base, &config(), &mut budget);
        assert!(matches!(result, Err(KsError::TimeLimit { .. })));
    }

    #[test]
    fn test_no_usable_samples() {
        // x + y >= 5 over binaries, not even a relaxation is feasible
        let text = "NAME NOSAMPLE
ROWS
 N cost
 G need
COLUMNS
 MARKER 'MARKER' 'INTORG'
 x cost 1.0 need 1.0
 y cost 1.0 need 1.0
 MARKER 'MARKER' 'INTEND'
RHS
 rhs need 5.0
ENDATA
";
        let base = MpsModel::new(parse_mps(text).unwrap(), SolverOptions::new());
        let conf = FeatureKernelConfig {
            count: 4,
            ..config()
        };

        let mut budget = TimeBudget::unlimited();
        let result = init_feature_kernel(&base, &conf, &mut budget);
        assert!(matches!(result, Err(KsError::NoSamples(4))));
    }
}
