//! Reader for MPS files (free format, and fixed format files whose names have no spaces).
//!
//! Files ending in `.gz` are decompressed on the fly.

use crate::error::{KsError, KsResult};
use crate::mip_model::MipProblem;
use crate::solver_adapter::Sense;
use flate2::read::GzDecoder;
use sprs::TriMat;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Name,
    ObjSense,
    Rows,
    Columns,
    Rhs,
    Ranges,
    Bounds,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Le,
    Ge,
    Eq,
}

/// Everything collected while reading, turned into a [`MipProblem`] once the file is over.
#[derive(Default)]
struct MpsBuilder {
    name: String,
    maximize: bool,
    objective_row: Option<String>,
    free_rows: Vec<String>,
    row_names: Vec<String>,
    row_kinds: Vec<RowKind>,
    row_index: HashMap<String, usize>,
    var_names: Vec<String>,
    var_index: HashMap<String, usize>,
    objective: Vec<f64>,
    objective_constant: f64,
    integer: Vec<bool>,
    default_binary: Vec<bool>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<f64>,
    ranges: Vec<Option<f64>>,
    in_integer_block: bool,
}

fn parse_error(line: usize, message: impl Into<String>) -> KsError {
    KsError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_number(token: &str, line: usize) -> KsResult<f64> {
    token
        .parse::<f64>()
        .map_err(|_| parse_error(line, format!("expected a number found {token}")))
}

impl MpsBuilder {
    fn add_row(&mut self, kind: &str, name: &str, line: usize) -> KsResult<()> {
        let kind = match kind.to_ascii_uppercase().as_str() {
            "N" => {
                // the first free row is the objective, the others are ignored
                if self.objective_row.is_none() {
                    self.objective_row = Some(name.to_string());
                } else {
                    self.free_rows.push(name.to_string());
                }
                return Ok(());
            }
            "L" => RowKind::Le,
            "G" => RowKind::Ge,
            "E" => RowKind::Eq,
            other => return Err(parse_error(line, format!("unknown row type {other}"))),
        };

        self.row_index.insert(name.to_string(), self.row_names.len());
        self.row_names.push(name.to_string());
        self.row_kinds.push(kind);
        self.rhs.push(0.0);
        self.ranges.push(None);
        Ok(())
    }

    fn column(&mut self, name: &str) -> usize {
        if let Some(&j) = self.var_index.get(name) {
            return j;
        }

        let j = self.var_names.len();
        self.var_index.insert(name.to_string(), j);
        self.var_names.push(name.to_string());
        self.objective.push(0.0);
        self.integer.push(self.in_integer_block);
        self.default_binary.push(self.in_integer_block);
        self.lower.push(0.0);
        self.upper.push(f64::INFINITY);
        j
    }

    fn existing_column(&self, name: &str, line: usize) -> KsResult<usize> {
        self.var_index
            .get(name)
            .copied()
            .ok_or_else(|| parse_error(line, format!("unknown column {name}")))
    }

    /// `None` for the free rows that do not end up in the model.
    fn row(&self, name: &str, line: usize) -> KsResult<Option<usize>> {
        if let Some(&i) = self.row_index.get(name) {
            return Ok(Some(i));
        }
        if self.objective_row.as_deref() == Some(name) || self.free_rows.iter().any(|r| r == name)
        {
            return Ok(None);
        }
        Err(parse_error(line, format!("unknown row {name}")))
    }

    fn add_columns_line(&mut self, tokens: &[&str], line: usize) -> KsResult<()> {
        if tokens.len() >= 3 && tokens[1].trim_matches('\'') == "MARKER" {
            match tokens[2].trim_matches('\'') {
                "INTORG" => self.in_integer_block = true,
                "INTEND" => self.in_integer_block = false,
                other => return Err(parse_error(line, format!("unknown marker {other}"))),
            }
            return Ok(());
        }

        if tokens.len() != 3 && tokens.len() != 5 {
            return Err(parse_error(line, "malformed COLUMNS line"));
        }

        let j = self.column(tokens[0]);
        for pair in tokens[1..].chunks(2) {
            let value = parse_number(pair[1], line)?;
            if self.objective_row.as_deref() == Some(pair[0]) {
                self.objective[j] += value;
            } else if let Some(i) = self.row(pair[0], line)? {
                self.triplets.push((i, j, value));
            }
        }
        Ok(())
    }

    /// RHS and RANGES lines share the layout `[set] row value [row value]`.
    fn row_values<'t>(tokens: &'t [&'t str], line: usize) -> KsResult<&'t [&'t str]> {
        match tokens.len() {
            2 | 4 => Ok(tokens),
            3 | 5 => Ok(&tokens[1..]),
            _ => Err(parse_error(line, "malformed RHS/RANGES line")),
        }
    }

    fn add_rhs_line(&mut self, tokens: &[&str], line: usize) -> KsResult<()> {
        for pair in Self::row_values(tokens, line)?.chunks(2) {
            let value = parse_number(pair[1], line)?;
            if self.objective_row.as_deref() == Some(pair[0]) {
                self.objective_constant = -value;
            } else if let Some(i) = self.row(pair[0], line)? {
                self.rhs[i] = value;
            }
        }
        Ok(())
    }

    fn add_range_line(&mut self, tokens: &[&str], line: usize) -> KsResult<()> {
        for pair in Self::row_values(tokens, line)?.chunks(2) {
            let value = parse_number(pair[1], line)?;
            if let Some(i) = self.row(pair[0], line)? {
                self.ranges[i] = Some(value);
            }
        }
        Ok(())
    }

    fn add_bound_line(&mut self, tokens: &[&str], line: usize) -> KsResult<()> {
        let kind = tokens[0].to_ascii_uppercase();
        let with_value = matches!(kind.as_str(), "UP" | "LO" | "FX" | "LI" | "UI");

        // the bound set name is optional
        let (column, value) = match (with_value, tokens.len()) {
            (true, 4) => (tokens[2], Some(parse_number(tokens[3], line)?)),
            (true, 3) => (tokens[1], Some(parse_number(tokens[2], line)?)),
            (false, 3 | 4) => (tokens[2], None),
            (false, 2) => (tokens[1], None),
            _ => return Err(parse_error(line, "malformed BOUNDS line")),
        };

        let j = self.existing_column(column, line)?;
        self.default_binary[j] = false;
        let value = value.unwrap_or(0.0);

        match kind.as_str() {
            "UP" | "UI" => {
                self.upper[j] = value;
                if value < 0.0 && self.lower[j] == 0.0 {
                    self.lower[j] = f64::NEG_INFINITY;
                }
            }
            "LO" | "LI" => self.lower[j] = value,
            "FX" => {
                self.lower[j] = value;
                self.upper[j] = value;
            }
            "FR" => {
                self.lower[j] = f64::NEG_INFINITY;
                self.upper[j] = f64::INFINITY;
            }
            "MI" => self.lower[j] = f64::NEG_INFINITY,
            "PL" => self.upper[j] = f64::INFINITY,
            "BV" => {
                self.lower[j] = 0.0;
                self.upper[j] = 1.0;
            }
            other => return Err(parse_error(line, format!("unknown bound type {other}"))),
        }

        if matches!(kind.as_str(), "LI" | "UI" | "BV") {
            self.integer[j] = true;
        }
        Ok(())
    }

    fn build(self) -> MipProblem {
        let mut row_lower = Vec::with_capacity(self.row_names.len());
        let mut row_upper = Vec::with_capacity(self.row_names.len());

        for (i, kind) in self.row_kinds.iter().enumerate() {
            let rhs = self.rhs[i];
            let (lo, hi) = match (kind, self.ranges[i]) {
                (RowKind::Le, None) => (f64::NEG_INFINITY, rhs),
                (RowKind::Ge, None) => (rhs, f64::INFINITY),
                (RowKind::Eq, None) => (rhs, rhs),
                (RowKind::Le, Some(r)) => (rhs - r.abs(), rhs),
                (RowKind::Ge, Some(r)) => (rhs, rhs + r.abs()),
                (RowKind::Eq, Some(r)) if r >= 0.0 => (rhs, rhs + r),
                (RowKind::Eq, Some(r)) => (rhs + r, rhs),
            };
            row_lower.push(lo);
            row_upper.push(hi);
        }

        let mut rows = TriMat::new((self.row_names.len(), self.var_names.len()));
        for &(i, j, v) in &self.triplets {
            rows.add_triplet(i, j, v);
        }

        // integer columns without bounds are binaries
        let upper = self
            .upper
            .iter()
            .zip(&self.default_binary)
            .map(|(&u, &binary)| if binary { 1.0 } else { u })
            .collect();

        MipProblem {
            name: self.name,
            sense: if self.maximize {
                Sense::Maximize
            } else {
                Sense::Minimize
            },
            var_names: self.var_names,
            objective: self.objective,
            objective_constant: self.objective_constant,
            lower: self.lower,
            upper,
            integer: self.integer,
            row_names: self.row_names,
            rows: rows.to_csr(),
            row_lower,
            row_upper,
        }
    }
}

fn section_header(word: &str) -> Option<Section> {
    match word {
        "NAME" => Some(Section::Name),
        "OBJSENSE" => Some(Section::ObjSense),
        "ROWS" => Some(Section::Rows),
        "COLUMNS" => Some(Section::Columns),
        "RHS" => Some(Section::Rhs),
        "RANGES" => Some(Section::Ranges),
        "BOUNDS" => Some(Section::Bounds),
        "ENDATA" => Some(Section::End),
        _ => None,
    }
}

fn parse_sense(word: &str, line: usize) -> KsResult<bool> {
    match word.to_ascii_uppercase().as_str() {
        "MAX" | "MAXIMIZE" => Ok(true),
        "MIN" | "MINIMIZE" => Ok(false),
        other => Err(parse_error(line, format!("unknown objective sense {other}"))),
    }
}

/// Parses the text of an MPS file.
pub fn parse_mps(text: &str) -> KsResult<MipProblem> {
    let mut builder = MpsBuilder::default();
    let mut section = None;

    for (n, raw) in text.lines().enumerate() {
        let line = n + 1;
        if raw.trim().is_empty() || raw.starts_with('*') {
            continue;
        }

        let tokens: Vec<&str> = raw.split_whitespace().collect();

        // section headers start at the first column
        if !raw.starts_with(char::is_whitespace) {
            let header = section_header(tokens[0])
                .ok_or_else(|| parse_error(line, format!("unknown section {}", tokens[0])))?;
            match header {
                Section::Name => builder.name = tokens[1..].join(" "),
                Section::ObjSense if tokens.len() > 1 => {
                    builder.maximize = parse_sense(tokens[1], line)?;
                }
                Section::End => return Ok(builder.build()),
                _ => {}
            }
            section = Some(header);
            continue;
        }

        match section {
            Some(Section::ObjSense) => builder.maximize = parse_sense(tokens[0], line)?,
            Some(Section::Rows) if tokens.len() == 2 => {
                builder.add_row(tokens[0], tokens[1], line)?;
            }
            Some(Section::Columns) => builder.add_columns_line(&tokens, line)?,
            Some(Section::Rhs) => builder.add_rhs_line(&tokens, line)?,
            Some(Section::Ranges) => builder.add_range_line(&tokens, line)?,
            Some(Section::Bounds) if tokens.len() >= 2 => builder.add_bound_line(&tokens, line)?,
            _ => return Err(parse_error(line, "unexpected line")),
        }
    }

    Err(parse_error(text.lines().count(), "missing ENDATA"))
}

/// Reads an MPS file, gzip compressed if the name ends in `.gz`.
pub fn read_mps(file_name: &Path) -> KsResult<MipProblem> {
    let file = File::open(file_name).map_err(|e| KsError::io(file_name, e))?;

    let mut text = String::new();
    let compressed = file_name.extension().is_some_and(|ext| ext == "gz");
    let result = if compressed {
        GzDecoder::new(file).read_to_string(&mut text)
    } else {
        let mut file = file;
        file.read_to_string(&mut text)
    };
    result.map_err(|e| KsError::io(file_name, e))?;

    parse_mps(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mip_model::tests::KNAPSACK_MPS;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_parse_knapsack() {
        let problem = parse_mps(KNAPSACK_MPS).unwrap();

        assert_eq!(problem.name, "KNAP");
        assert_eq!(problem.sense, Sense::Maximize);
        assert_eq!(problem.var_names, ["a", "b", "c", "d"]);
        assert_eq!(problem.objective, [5.0, 4.0, 3.0, 2.0]);
        assert!(problem.integer.iter().all(|&i| i));
        assert_eq!(problem.upper, [1.0; 4]);
        assert_eq!(problem.row_names, ["weight"]);
        assert_eq!(problem.row_upper, [5.0]);
        assert_eq!(problem.row_lower, [f64::NEG_INFINITY]);
        assert_eq!(problem.row_activity(&[1.0, 1.0, 0.0, 0.0]), [5.0]);
    }

    #[test]
    fn test_ranges_bounds_and_constant() {
        let text = "NAME          FULL
ROWS
 N  COST
 E  BAL
 G  LIM1
 L  LIM2
 N  SPARE
COLUMNS
    X1        COST      1.0        LIM1      1.0
    X1        BAL       1.0        SPARE     7.0
    MARKER    'MARKER'  'INTORG'
    X2        COST      2.0        LIM2      1.0
    X3        COST      -1.0       BAL       1.0
    MARKER    'MARKER'  'INTEND'
    X4        COST      1.0        LIM1      1.0
RHS
    RHS       COST      -3.5       BAL       4.0
    RHS       LIM1      1.0        LIM2      6.0
RANGES
    RNG       BAL       -2.0       LIM1      3.0
    RNG       LIM2      2.5
BOUNDS
 UP BND       X1        4.0
 LO BND       X2        1.0
 MI BND       X4
 BV BND       X1
 FR BND       X3
ENDATA
";
        let problem = parse_mps(text).unwrap();

        assert_eq!(problem.sense, Sense::Minimize);
        assert_eq!(problem.objective_constant, 3.5);
        assert_eq!(problem.var_names, ["X1", "X2", "X3", "X4"]);
        assert_eq!(problem.integer, [true, true, true, false]);

        assert_eq!(problem.row_names, ["BAL", "LIM1", "LIM2"]);
        assert_eq!(problem.row_lower, [2.0, 1.0, 3.5]);
        assert_eq!(problem.row_upper, [4.0, 4.0, 6.0]);

        // BV overrides the earlier UP, X2 keeps the explicit LO and loses the binary default
        assert_eq!(problem.lower[0], 0.0);
        assert_eq!(problem.upper[0], 1.0);
        assert_eq!(problem.lower[1], 1.0);
        assert_eq!(problem.upper[1], f64::INFINITY);
        assert_eq!(problem.lower[2], f64::NEG_INFINITY);
        assert_eq!(problem.upper[2], f64::INFINITY);
        assert_eq!(problem.lower[3], f64::NEG_INFINITY);

        assert_eq!(problem.evaluate(&[1.0, 1.0, 1.0, 0.0]), 5.5);
        assert_eq!(problem.row_activity(&[1.0, 2.0, 3.0, 4.0]), [4.0, 5.0, 2.0]);
    }

    #[test]
    fn test_objsense_inline() {
        let problem = parse_mps("NAME X\nOBJSENSE MAXIMIZE\nROWS\n N obj\nCOLUMNS\n x obj 1\nENDATA\n")
            .unwrap();
        assert_eq!(problem.sense, Sense::Maximize);
        assert_eq!(problem.num_rows(), 0);
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_mps("NAME X\nROWS\n N obj\n Q bad\nENDATA\n").unwrap_err();
        assert!(matches!(err, KsError::Parse { line: 4, .. }));

        let err = parse_mps("NAME X\nROWS\n N obj\nCOLUMNS\n x nope 1\nENDATA\n").unwrap_err();
        assert!(err.to_string().contains("unknown row nope"));

        let err = parse_mps("NAME X\nROWS\n N obj\nCOLUMNS\n x obj one\nENDATA\n").unwrap_err();
        assert!(matches!(err, KsError::Parse { line: 5, .. }));

        let err = parse_mps("NAME X\nROWS\n N obj\n").unwrap_err();
        assert!(err.to_string().contains("missing ENDATA"));
    }

    #[test]
    fn test_read_files() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("knap.mps");
        std::fs::write(&plain, KNAPSACK_MPS).unwrap();
        assert_eq!(read_mps(&plain).unwrap().num_vars(), 4);

        let packed = dir.path().join("knap.mps.gz");
        let mut encoder = GzEncoder::new(File::create(&packed).unwrap(), Compression::default());
        encoder.write_all(KNAPSACK_MPS.as_bytes()).unwrap();
        encoder.finish().unwrap();
        assert_eq!(read_mps(&packed).unwrap().num_vars(), 4);

        let missing = dir.path().join("missing.mps");
        assert!(matches!(read_mps(&missing), Err(KsError::Io { .. })));
    }
}
