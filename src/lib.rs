//! Kernel Search: a heuristic for Mixed Integer Programs that solves a sequence of small
//! restricted sub-models instead of the full problem.

pub mod algorithm_selection;
pub mod bucket_strategy;
pub mod config_loader;
pub mod error;
pub mod feature_kernel;
pub mod importance;
pub mod kernel;
pub mod kernel_search;
pub mod kernel_strategy;
pub mod mip_model;
pub mod model_eval;
pub mod mps_reader;
pub mod search_logger;
pub mod search_utils;
pub mod solution;
pub mod solver_adapter;
pub mod solver_options;
pub mod sort_strategy;
pub mod subproblemsolvers;
pub mod variable_scoring;
pub mod worsen_score;
