//! The reference backend: a MIP read from an MPS file, relaxations solved with clarabel and
//! integer sub-models solved by bounded enumeration.

use crate::error::{KsError, KsResult};
use crate::mps_reader::read_mps;
use crate::solver_adapter::{MipModel, Sense, SolveStatus};
use crate::solver_options::SolverOptions;
use crate::subproblemsolvers::clarabel_lp::solve_lp;
use crate::subproblemsolvers::enumerate_mip::{enumerate_solve, EnumerationInput};
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Absolute/relative tolerance used for row feasibility and zero checks.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// `min/max c·x + constant  s.t.  row_lower <= A x <= row_upper, lower <= x <= upper`
#[derive(Debug, Clone)]
pub struct MipProblem {
    pub name: String,
    pub sense: Sense,
    pub var_names: Vec<String>,
    pub objective: Vec<f64>,
    pub objective_constant: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub integer: Vec<bool>,
    pub row_names: Vec<String>,
    /// CSR, one row per constraint
    pub rows: CsMat<f64>,
    pub row_lower: Vec<f64>,
    pub row_upper: Vec<f64>,
}

impl MipProblem {
    pub fn num_vars(&self) -> usize {
        self.var_names.len()
    }

    pub fn num_rows(&self) -> usize {
        self.row_names.len()
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.objective
            .iter()
            .zip(x)
            .map(|(c, v)| c * v)
            .sum::<f64>()
            + self.objective_constant
    }

    pub fn row_activity(&self, x: &[f64]) -> Vec<f64> {
        self.rows
            .outer_iterator()
            .map(|row| row.iter().map(|(j, &a)| a * x[j]).sum())
            .collect()
    }

    /// Checks the rows only, bounds and integrality are the caller's business.
    pub fn rows_satisfied(&self, x: &[f64]) -> bool {
        let tol = |b: f64| FEASIBILITY_TOLERANCE * (1.0 + b.abs());
        self.row_activity(x)
            .iter()
            .zip(self.row_lower.iter().zip(&self.row_upper))
            .all(|(&act, (&lo, &hi))| act >= lo - tol(lo) && act <= hi + tol(hi))
    }

    /// Keeps only the rows flagged in `keep`.
    fn with_rows(&self, keep: &[bool]) -> Self {
        let kept: Vec<usize> = (0..self.num_rows()).filter(|&i| keep[i]).collect();
        let mut rows = TriMat::new((kept.len(), self.num_vars()));
        for (new_i, &i) in kept.iter().enumerate() {
            if let Some(row) = self.rows.outer_view(i) {
                for (j, &a) in row.iter() {
                    rows.add_triplet(new_i, j, a);
                }
            }
        }

        Self {
            row_names: kept.iter().map(|&i| self.row_names[i].clone()).collect(),
            row_lower: kept.iter().map(|&i| self.row_lower[i]).collect(),
            row_upper: kept.iter().map(|&i| self.row_upper[i]).collect(),
            rows: rows.to_csr(),
            ..self.clone()
        }
    }
}

/// Outcome of the last `optimize` call.
#[derive(Debug, Clone)]
struct LastSolution {
    values: Vec<f64>,
    objective: f64,
    reduced_costs: Option<Vec<f64>>,
}

/// A solver handle over a [`MipProblem`].
///
/// The problem data is shared between clones, all the modifications of the adapter (fixings,
/// bucket constraints, limits, starts) are owned by the handle.
#[derive(Debug, Clone)]
pub struct MpsModel {
    problem: Arc<MipProblem>,
    index: Arc<HashMap<String, usize>>,
    pub options: SolverOptions,
    lower: Vec<f64>,
    upper: Vec<f64>,
    relaxed: bool,
    groups: Vec<Vec<usize>>,
    cutoff: Option<f64>,
    time_limit: Option<f64>,
    solution_limit: Option<usize>,
    start: Vec<Option<f64>>,
    last: Option<LastSolution>,
    runtime: f64,
    nodes: f64,
}

impl MpsModel {
    pub fn new(problem: MipProblem, options: SolverOptions) -> Self {
        let index = problem
            .var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Self {
            lower: problem.lower.clone(),
            upper: problem.upper.clone(),
            start: vec![None; problem.num_vars()],
            time_limit: options.time_limit,
            problem: Arc::new(problem),
            index: Arc::new(index),
            options,
            relaxed: false,
            groups: Vec::new(),
            cutoff: None,
            solution_limit: None,
            last: None,
            runtime: 0.0,
            nodes: 0.0,
        }
    }

    pub fn load(file_name: &Path, options: SolverOptions) -> KsResult<Self> {
        Ok(Self::new(read_mps(file_name)?, options))
    }

    pub fn problem(&self) -> &MipProblem {
        &self.problem
    }

    fn var_index(&self, name: &str) -> KsResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| KsError::UnknownVariable(name.to_string()))
    }

    fn optimize_relaxation(&mut self) -> KsResult<SolveStatus> {
        let outcome = solve_lp(
            &self.problem,
            &self.lower,
            &self.upper,
            &self.options,
            self.time_limit,
        )?;
        self.nodes = 0.0;

        if outcome.status != SolveStatus::Optimal {
            return Ok(outcome.status);
        }

        let objective = self.problem.evaluate(&outcome.x);
        if let Some(cutoff) = self.cutoff {
            if !self.problem.sense.is_better(objective, cutoff) {
                return Ok(SolveStatus::Cutoff);
            }
        }

        self.last = Some(LastSolution {
            values: outcome.x,
            objective,
            reduced_costs: Some(outcome.reduced_costs),
        });
        Ok(SolveStatus::Optimal)
    }

    fn optimize_integer(&mut self) -> KsResult<SolveStatus> {
        let input = EnumerationInput {
            lower: &self.lower,
            upper: &self.upper,
            groups: &self.groups,
            cutoff: self.cutoff,
            solution_limit: self.solution_limit,
            time_limit: self.time_limit,
            start: &self.start,
            options: &self.options,
        };
        let outcome = enumerate_solve(&self.problem, &input)?;
        self.nodes = outcome.nodes as f64;

        if let Some((objective, values)) = outcome.best {
            self.last = Some(LastSolution {
                values,
                objective,
                reduced_costs: None,
            });
        }
        Ok(outcome.status)
    }
}

impl MipModel for MpsModel {
    fn relax(&self) -> Self {
        let mut relaxed = self.clone();
        relaxed.relaxed = true;
        relaxed.last = None;
        relaxed
    }

    /// Drops the rows that the variable bounds already imply.
    fn presolve(&self) -> KsResult<Self> {
        let problem = &self.problem;
        let keep: Vec<bool> = problem
            .rows
            .outer_iterator()
            .enumerate()
            .map(|(i, row)| {
                let (mut min_act, mut max_act) = (0.0, 0.0);
                for (j, &a) in row.iter() {
                    let (lo, hi) = (self.lower[j], self.upper[j]);
                    if a > 0.0 {
                        min_act += a * lo;
                        max_act += a * hi;
                    } else {
                        min_act += a * hi;
                        max_act += a * lo;
                    }
                }
                // NaN (inf - inf) compares false and keeps the row
                !(min_act >= problem.row_lower[i] && max_act <= problem.row_upper[i])
            })
            .collect();

        let removed = keep.iter().filter(|k| !**k).count();
        tracing::debug!(removed, rows = problem.num_rows(), "presolve");

        let mut presolved = self.clone();
        presolved.problem = Arc::new(problem.with_rows(&keep));
        presolved.last = None;
        Ok(presolved)
    }

    fn optimize(&mut self) -> KsResult<SolveStatus> {
        let start = Instant::now();
        self.last = None;

        let status = if self.relaxed {
            self.optimize_relaxation()
        } else {
            self.optimize_integer()
        };

        self.runtime = start.elapsed().as_secs_f64();
        status
    }

    fn fix_variable(&mut self, name: &str, value: f64) -> KsResult<()> {
        let i = self.var_index(name)?;
        self.lower[i] = value;
        self.upper[i] = value;
        Ok(())
    }

    fn add_at_least_one_nonzero(&mut self, names: &[String]) -> KsResult<()> {
        let group = names
            .iter()
            .map(|name| self.var_index(name))
            .collect::<KsResult<Vec<_>>>()?;
        self.groups.push(group);
        Ok(())
    }

    fn set_cutoff(&mut self, bound: f64) {
        self.cutoff = Some(bound);
    }

    fn set_time_limit(&mut self, seconds: Option<f64>) {
        self.time_limit = seconds;
    }

    fn set_solution_limit(&mut self, limit: Option<usize>) {
        self.solution_limit = limit;
    }

    fn warm_start(&mut self, name: &str, value: f64) -> KsResult<()> {
        let i = self.var_index(name)?;
        self.start[i] = Some(value);
        Ok(())
    }

    fn variable_names(&self) -> Vec<String> {
        self.problem.var_names.clone()
    }

    fn variable_value(&self, name: &str) -> Option<f64> {
        let i = *self.index.get(name)?;
        self.last.as_ref().map(|last| last.values[i])
    }

    fn reduced_cost(&self, name: &str) -> Option<f64> {
        let i = *self.index.get(name)?;
        self.last
            .as_ref()
            .and_then(|last| last.reduced_costs.as_ref())
            .map(|r| r[i])
    }

    fn objective_value(&self) -> Option<f64> {
        self.last.as_ref().map(|last| last.objective)
    }

    fn sense(&self) -> Sense {
        self.problem.sense
    }

    fn size(&self) -> usize {
        self.problem.num_vars()
    }

    fn runtime(&self) -> f64 {
        self.runtime
    }

    fn node_count(&self) -> f64 {
        self.nodes
    }
}
