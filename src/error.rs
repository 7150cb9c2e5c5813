//! Error types shared by the whole crate.
//!
//! Errors are split in three classes so callers can tell "bad input" from "no solution" from
//! "no time left", see [`ErrorClass`].

use std::path::PathBuf;

/// Coarse classification of a [`KsError`], this drives the exit code of the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The configuration or the input files are broken, nothing was solved.
    Config,
    /// The search cannot produce a solution for this instance with this setup.
    Value,
    /// A resource (the global time budget) ran out, the search was aborted.
    Runtime,
}

#[derive(Debug, thiserror::Error)]
pub enum KsError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Configuration Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("algorithm {0} is not available")]
    UnknownAlgorithm(String),

    #[error("algorithm {0} is already installed")]
    DuplicateAlgorithm(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Given Problem: {0} has no LP solution")]
    NoLpSolution(String),

    #[error("Ill kernel: kernel size {kernel_size} is equal to the model size")]
    IllKernel { kernel_size: usize },

    #[error("Feature kernel: none of the {0} sampled sub-problems produced a usable sample")]
    NoSamples(usize),

    #[error("Variable outside kernel [{available}] are not enough for {count} buckets")]
    BucketSizing { available: usize, count: usize },

    #[error("unknown variable {0}")]
    UnknownVariable(String),

    #[error("time limit reached: global budget exhausted after {elapsed:.3}s")]
    TimeLimit { elapsed: f64 },
}

impl KsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Config(_)
            | Self::Yaml(_)
            | Self::UnknownAlgorithm(_)
            | Self::DuplicateAlgorithm(_)
            | Self::Io { .. }
            | Self::Parse { .. } => ErrorClass::Config,
            Self::NoLpSolution(_)
            | Self::IllKernel { .. }
            | Self::NoSamples(_)
            | Self::BucketSizing { .. }
            | Self::UnknownVariable(_) => ErrorClass::Value,
            Self::TimeLimit { .. } => ErrorClass::Runtime,
        }
    }
}

pub type KsResult<T> = Result<T, KsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(KsError::IllKernel { kernel_size: 3 }.class(), ErrorClass::Value);
        assert_eq!(KsError::TimeLimit { elapsed: 1.0 }.class(), ErrorClass::Runtime);
        assert_eq!(KsError::Config("x".into()).class(), ErrorClass::Config);
    }

    #[test]
    fn test_error_messages() {
        let err = KsError::DuplicateAlgorithm("a".to_string());
        assert_eq!(err.to_string(), "algorithm a is already installed");

        let err = KsError::BucketSizing {
            available: 3,
            count: 5,
        };
        assert_eq!(
            err.to_string(),
            "Variable outside kernel [3] are not enough for 5 buckets"
        );
    }
}
