//! Scores used purely to order variables.

use crate::config_loader::Config;
use crate::kernel::Kernel;
use crate::solution::Solution;
use crate::solver_adapter::MipModel;
use std::collections::HashMap;

/// Anything that can give a variable a score, missing variables score zero.
pub trait Values {
    fn get_value(&self, name: &str) -> f64;
}

impl Values for Solution {
    fn get_value(&self, name: &str) -> f64 {
        self.vars.get(name).copied().unwrap_or(0.0)
    }
}

/// A plain score table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    score: HashMap<String, f64>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.score.insert(name.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.score.len()
    }

    pub fn is_empty(&self) -> bool {
        self.score.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ScoreTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            score: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Values for ScoreTable {
    fn get_value(&self, name: &str) -> f64 {
        self.score.get(name).copied().unwrap_or(0.0)
    }
}

/// Score of a variable in a solved relaxation: its value, or its reduced cost when it sits at
/// zero.
pub fn lp_score<M: MipModel>(model: &M, name: &str) -> f64 {
    match model.variable_value(name) {
        Some(v) if v != 0.0 => v,
        _ => model.reduced_cost(name).unwrap_or(0.0),
    }
}

/// How the scores used to rebuild the buckets are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringSelection {
    /// LP value (or reduced cost when the value is zero), fixed for the whole run.
    ReducedCost,
    /// Values of the latest incumbent, LP scores for variables it does not assign.
    VariableRanking,
}

impl ScoringSelection {
    pub const fn from_config(config: &Config) -> Self {
        if config.variable_ranking {
            Self::VariableRanking
        } else {
            Self::ReducedCost
        }
    }
}

/// Builds the score table of the next round, kernel members always score zero.
pub fn variable_score_factory(
    selection: ScoringSelection,
    lp_values: &ScoreTable,
    incumbent: Option<&Solution>,
    kernel: &Kernel,
) -> ScoreTable {
    kernel
        .iter()
        .map(|(name, selected)| {
            if selected {
                return (name, 0.0);
            }

            let value = match (selection, incumbent) {
                (ScoringSelection::VariableRanking, Some(sol)) => sol
                    .get_value(name)
                    .unwrap_or_else(|| lp_values.get_value(name)),
                _ => lp_values.get_value(name),
            };
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Kernel, ScoreTable, Solution) {
        let kernel = [("a", true), ("b", false), ("c", false)]
            .into_iter()
            .collect::<Kernel>();
        let lp = [("a", 3.0), ("b", -1.5), ("c", 0.25)]
            .into_iter()
            .collect::<ScoreTable>();
        let incumbent = Solution::new(1.0, [("a", 1.0), ("b", 4.0)]);
        (kernel, lp, incumbent)
    }

    #[test]
    fn test_reduced_cost_scoring() {
        let (kernel, lp, incumbent) = setup();
        let scores =
            variable_score_factory(ScoringSelection::ReducedCost, &lp, Some(&incumbent), &kernel);

        assert_eq!(scores.get_value("a"), 0.0);
        assert_eq!(scores.get_value("b"), -1.5);
        assert_eq!(scores.get_value("c"), 0.25);
    }

    #[test]
    fn test_variable_ranking() {
        let (kernel, lp, incumbent) = setup();
        let scores = variable_score_factory(
            ScoringSelection::VariableRanking,
            &lp,
            Some(&incumbent),
            &kernel,
        );

        assert_eq!(scores.get_value("a"), 0.0);
        assert_eq!(scores.get_value("b"), 4.0);
        assert_eq!(scores.get_value("c"), 0.25);

        // without an incumbent the ranking falls back to the lp scores
        let scores = variable_score_factory(ScoringSelection::VariableRanking, &lp, None, &kernel);
        assert_eq!(scores.get_value("b"), -1.5);
    }

    #[test]
    fn test_missing_values() {
        let table = ScoreTable::new();
        assert_eq!(table.get_value("x"), 0.0);

        let sol = Solution::new(0.0, [("x", 2.0)]);
        assert_eq!(Values::get_value(&sol, "x"), 2.0);
        assert_eq!(Values::get_value(&sol, "y"), 0.0);
    }
}
