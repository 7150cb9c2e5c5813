//! The contract between the kernel search and a MIP solver.
//!
//! The search never inspects solver internals, it only talks to a [`MipModel`]. Every restricted
//! sub-model is an owned handle, always derived by cloning the loaded base model, so no two logical
//! sub-models ever share mutable solver state.

use crate::error::KsResult;

/// Result of a single `optimize` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    TimeLimit,
    SolutionLimit,
    Cutoff,
    Other,
}

impl SolveStatus {
    /// Statuses that can leave a usable solution behind (the model still has to report one).
    pub const fn may_have_solution(&self) -> bool {
        matches!(self, Self::Optimal | Self::TimeLimit | Self::SolutionLimit)
    }
}

/// Optimization direction of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Minimize,
    Maximize,
}

impl Sense {
    /// true if `a` is strictly better than `b` in this direction
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match self {
            Self::Minimize => a < b,
            Self::Maximize => a > b,
        }
    }
}

/// A solver handle. `Clone` is the `copy(handle)` operation of the adapter.
pub trait MipModel: Clone {
    /// Returns a copy of the model with the integrality requirements dropped.
    fn relax(&self) -> Self;

    /// Returns a presolved copy of the model, backends without a presolver return a plain copy.
    fn presolve(&self) -> KsResult<Self> {
        Ok(self.clone())
    }

    /// Solves the model, blocking until the backend returns.
    fn optimize(&mut self) -> KsResult<SolveStatus>;

    /// Adds the constraint `name == value`.
    fn fix_variable(&mut self, name: &str, value: f64) -> KsResult<()>;

    /// Adds the constraint that at least one of the given variables is nonzero.
    fn add_at_least_one_nonzero(&mut self, names: &[String]) -> KsResult<()>;

    /// Rejects any solution that is not strictly better than `bound`.
    fn set_cutoff(&mut self, bound: f64);

    fn set_time_limit(&mut self, seconds: Option<f64>);

    fn set_solution_limit(&mut self, limit: Option<usize>);

    /// Hints a starting value for a variable.
    fn warm_start(&mut self, name: &str, value: f64) -> KsResult<()>;

    /// Names of all the variables, in model order.
    fn variable_names(&self) -> Vec<String>;

    /// Value of a variable in the last solution, `None` when there is no solution.
    fn variable_value(&self, name: &str) -> Option<f64>;

    /// Reduced cost of a variable in the last (relaxed) solution.
    fn reduced_cost(&self, name: &str) -> Option<f64>;

    fn objective_value(&self) -> Option<f64>;

    fn sense(&self) -> Sense;

    /// Number of variables.
    fn size(&self) -> usize;

    /// Runtime in seconds of the last `optimize` call.
    fn runtime(&self) -> f64;

    /// Nodes explored by the last `optimize` call.
    fn node_count(&self) -> f64;
}

/// Collects `(name, value)` pairs of the last solution of a model.
pub fn solution_values<M: MipModel>(model: &M) -> Vec<(String, f64)> {
    model
        .variable_names()
        .into_iter()
        .filter_map(|name| model.variable_value(&name).map(|value| (name, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sense_direction() {
        assert!(Sense::Minimize.is_better(1.0, 2.0));
        assert!(!Sense::Minimize.is_better(2.0, 2.0));
        assert!(Sense::Maximize.is_better(3.0, 2.0));
        assert!(!Sense::Maximize.is_better(1.0, 2.0));
    }

    #[test]
    fn test_usable_statuses() {
        assert!(SolveStatus::Optimal.may_have_solution());
        assert!(SolveStatus::SolutionLimit.may_have_solution());
        assert!(!SolveStatus::Cutoff.may_have_solution());
        assert!(!SolveStatus::Infeasible.may_have_solution());
    }
}
