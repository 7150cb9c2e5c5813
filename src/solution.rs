//! Solutions of the (restricted) models and the per-bucket debug records of a run.

use crate::error::{KsError, KsResult};
use crate::solver_adapter::Sense;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

pub const DEBUG_CSV_HEADER: &str = "bucket,iteration,value,time,nodes,kernel_size,bucket_size";

/// Position of a sub-model solve inside the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DebugIndex {
    pub iteration: usize,
    pub bucket: usize,
}

impl DebugIndex {
    pub const fn new(iteration: usize, bucket: usize) -> Self {
        Self { iteration, bucket }
    }
}

/// What happened at a given [`DebugIndex`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugData {
    pub value: f64,
    pub time: f64,
    pub nodes: f64,
    pub kernel_size: usize,
    pub bucket_size: usize,
}

/// Append-only store of debug records, ordered by iteration then bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugInfo {
    store: BTreeMap<DebugIndex, DebugData>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data(&mut self, data: DebugData, index: DebugIndex) {
        self.store.insert(index, data);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DebugIndex, &DebugData)> {
        self.store.iter()
    }

    /// Records of one bucket position across all iterations, keyed by iteration.
    pub fn iteration_iter(&self, bucket: usize) -> impl Iterator<Item = (usize, &DebugData)> {
        self.store
            .iter()
            .filter(move |(index, _)| index.bucket == bucket)
            .map(|(index, data)| (index.iteration, data))
    }

    /// Records of one iteration, keyed by bucket.
    pub fn bucket_iter(&self, iteration: usize) -> impl Iterator<Item = (usize, &DebugData)> {
        self.store
            .iter()
            .filter(move |(index, _)| index.iteration == iteration)
            .map(|(index, data)| (index.bucket, data))
    }

    pub fn get_csv(&self) -> String {
        let mut out = String::from(DEBUG_CSV_HEADER);
        for (index, data) in &self.store {
            out.push('\n');
            out.push_str(&format!(
                "{},{},{},{},{},{},{}",
                index.bucket,
                index.iteration,
                data.value,
                data.time,
                data.nodes,
                data.kernel_size,
                data.bucket_size
            ));
        }
        out
    }

    /// Writes the records as CSV, gzip compressed if asked to.
    pub fn export_csv(&self, file_name: &Path, compress: bool) -> KsResult<()> {
        let file = File::create(file_name).map_err(|e| KsError::io(file_name, e))?;
        let csv = self.get_csv();

        let result = if compress {
            write_compressed(file, csv.as_bytes())
        } else {
            let mut file = file;
            file.write_all(csv.as_bytes())
        };

        result.map_err(|e| KsError::io(file_name, e))
    }

    pub fn parse_csv(text: &str) -> KsResult<Self> {
        let mut info = Self::new();
        let mut lines = text.lines().enumerate();

        match lines.next() {
            Some((_, header)) if header.trim() == DEBUG_CSV_HEADER => {}
            _ => {
                return Err(KsError::Parse {
                    line: 1,
                    message: "missing debug csv header".to_string(),
                })
            }
        }

        for (i, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let parse_err = |message: String| KsError::Parse {
                line: i + 1,
                message,
            };

            let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
            if tokens.len() != 7 {
                return Err(parse_err(format!("expected 7 fields found {}", tokens.len())));
            }

            let int = |s: &str| s.parse::<usize>().map_err(|e| parse_err(e.to_string()));
            let float = |s: &str| s.parse::<f64>().map_err(|e| parse_err(e.to_string()));

            let index = DebugIndex::new(int(tokens[1])?, int(tokens[0])?);
            let data = DebugData {
                value: float(tokens[2])?,
                time: float(tokens[3])?,
                nodes: float(tokens[4])?,
                kernel_size: int(tokens[5])?,
                bucket_size: int(tokens[6])?,
            };
            info.add_data(data, index);
        }

        Ok(info)
    }

    /// Reads back a file written by [`DebugInfo::export_csv`].
    pub fn read_csv(file_name: &Path, compressed: bool) -> KsResult<Self> {
        let file = File::open(file_name).map_err(|e| KsError::io(file_name, e))?;
        let mut text = String::new();

        let result = if compressed {
            GzDecoder::new(file).read_to_string(&mut text)
        } else {
            BufReader::new(file).read_to_string(&mut text)
        };
        result.map_err(|e| KsError::io(file_name, e))?;

        Self::parse_csv(&text)
    }
}

fn write_compressed(file: File, bytes: &[u8]) -> std::io::Result<()> {
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()?;
    Ok(())
}

/// An objective value and the value assigned to each variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub value: f64,
    pub vars: BTreeMap<String, f64>,
    pub debug: Option<DebugInfo>,
}

impl Solution {
    pub fn new<S: Into<String>>(value: f64, vars: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self {
            value,
            vars: vars.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            debug: None,
        }
    }

    pub fn get_value(&self, name: &str) -> Option<f64> {
        self.vars.get(name).copied()
    }

    /// Merges the assignment of a newly solved sub-model into this solution.
    pub fn update<S: Into<String>>(&mut self, value: f64, vars: impl IntoIterator<Item = (S, f64)>) {
        self.value = value;
        for (k, v) in vars {
            self.vars.insert(k.into(), v);
        }
    }

    pub fn is_better_than(&self, other: &Self, sense: Sense) -> bool {
        sense.is_better(self.value, other.value)
    }

    /// Writes one `name value` line per variable, the name always ends in `.sol`.
    pub fn save_as_sol_file(&self, file_name: &str) -> KsResult<PathBuf> {
        let path = sol_file_name(file_name);
        let mut file = File::create(&path).map_err(|e| KsError::io(&path, e))?;

        for (name, value) in &self.vars {
            writeln!(file, "{name} {value}").map_err(|e| KsError::io(&path, e))?;
        }

        Ok(path)
    }

    /// Reads a `.sol` file, the objective value is unknown and left at zero. Comment lines
    /// (`#`) and blank lines are skipped.
    pub fn from_sol_file(file_name: &Path) -> KsResult<Self> {
        let file = File::open(file_name).map_err(|e| KsError::io(file_name, e))?;
        let mut vars = BTreeMap::new();

        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| KsError::io(file_name, e))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let (Some(name), Some(value), None) = (tokens.next(), tokens.next(), tokens.next())
            else {
                return Err(KsError::Parse {
                    line: i + 1,
                    message: format!("expected `name value` found `{line}`"),
                });
            };

            let value = value.parse::<f64>().map_err(|e| KsError::Parse {
                line: i + 1,
                message: e.to_string(),
            })?;
            vars.insert(name.to_string(), value);
        }

        Ok(Self {
            value: 0.0,
            vars,
            debug: None,
        })
    }
}

/// Appends `.sol` to a file name that does not already end with it.
pub fn sol_file_name(file_name: &str) -> PathBuf {
    if file_name.ends_with(".sol") {
        PathBuf::from(file_name)
    } else {
        PathBuf::from(format!("{file_name}.sol"))
    }
}
