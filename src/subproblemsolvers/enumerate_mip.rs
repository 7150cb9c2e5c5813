use crate::error::KsResult;
use crate::mip_model::{MipProblem, FEASIBILITY_TOLERANCE};
use crate::solver_adapter::SolveStatus;
use crate::solver_options::SolverOptions;
use crate::subproblemsolvers::clarabel_lp::solve_lp;
use std::time::Instant;

/// Largest number of integer points a single solve is allowed to visit.
pub const MAX_ENUMERATION: u64 = 1 << 20;

const TIME_CHECK_INTERVAL: u64 = 256;

/// Everything a restricted integer solve needs on top of the problem data.
#[derive(Debug, Clone, Copy)]
pub struct EnumerationInput<'a> {
    pub lower: &'a [f64],
    pub upper: &'a [f64],
    pub groups: &'a [Vec<usize>],
    pub cutoff: Option<f64>,
    pub solution_limit: Option<usize>,
    pub time_limit: Option<f64>,
    pub start: &'a [Option<f64>],
    pub options: &'a SolverOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationOutcome {
    pub status: SolveStatus,
    pub best: Option<(f64, Vec<f64>)>,
    pub nodes: u64,
}

impl EnumerationOutcome {
    const fn empty(status: SolveStatus) -> Self {
        Self {
            status,
            best: None,
            nodes: 0,
        }
    }
}

/// An integer variable still free to move in `lo..=hi`.
#[derive(Debug, Clone, Copy)]
struct Digit {
    var: usize,
    lo: i64,
    hi: i64,
}

/// Why the enumeration stopped before visiting every point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Exhausted,
    SolutionLimit,
    TimeLimit,
}

struct Enumerator<'a> {
    problem: &'a MipProblem,
    input: &'a EnumerationInput<'a>,
    continuous: Vec<usize>,
    best: Option<(f64, Vec<f64>)>,
    found: usize,
    cut_off: bool,
    nodes: u64,
    started: Instant,
}

impl<'a> Enumerator<'a> {
    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn remaining_time(&self) -> Option<f64> {
        self.input.time_limit.map(|t| (t - self.elapsed()).max(0.0))
    }

    /// Completes the integer point `x` with the best continuous part, returns its objective.
    fn complete_point(&self, x: &mut [f64]) -> KsResult<Option<f64>> {
        if self.continuous.is_empty() {
            if !self.problem.rows_satisfied(x) {
                return Ok(None);
            }
            return Ok(Some(self.problem.evaluate(x)));
        }

        let mut lower = self.input.lower.to_vec();
        let mut upper = self.input.upper.to_vec();
        for j in (0..x.len()).filter(|j| self.problem.integer[*j]) {
            lower[j] = x[j];
            upper[j] = x[j];
        }

        let outcome = solve_lp(
            self.problem,
            &lower,
            &upper,
            self.input.options,
            self.remaining_time(),
        )?;
        if outcome.status != SolveStatus::Optimal {
            return Ok(None);
        }
        for &j in &self.continuous {
            x[j] = outcome.x[j];
        }
        Ok(Some(self.problem.evaluate(x)))
    }

    fn groups_satisfied(&self, x: &[f64]) -> bool {
        self.input
            .groups
            .iter()
            .all(|group| group.iter().any(|&j| x[j].abs() > FEASIBILITY_TOLERANCE))
    }

    /// Evaluates one integer point, returns true once the solution limit is reached.
    fn visit(&mut self, x: &mut [f64]) -> KsResult<bool> {
        self.nodes += 1;

        let Some(objective) = self.complete_point(x)? else {
            return Ok(false);
        };
        if !self.groups_satisfied(x) {
            return Ok(false);
        }

        let sense = self.problem.sense;
        if let Some(cutoff) = self.input.cutoff {
            if !sense.is_better(objective, cutoff) {
                self.cut_off = true;
                return Ok(false);
            }
        }

        self.found += 1;
        let improves = self
            .best
            .as_ref()
            .map_or(true, |(value, _)| sense.is_better(objective, *value));
        if improves {
            self.best = Some((objective, x.to_vec()));
        }

        Ok(matches!(self.input.solution_limit, Some(limit) if self.found >= limit))
    }

    fn out_of_time(&self) -> bool {
        self.nodes % TIME_CHECK_INTERVAL == 0
            && matches!(self.input.time_limit, Some(t) if self.elapsed() >= t)
    }
}

/// Builds the digits of the free integer variables, `Err(status)` when enumeration is not
/// possible (empty or unbounded domain, too many points).
fn integer_digits(problem: &MipProblem, input: &EnumerationInput) -> Result<Vec<Digit>, SolveStatus> {
    let mut digits = Vec::new();
    let mut points: u64 = 1;

    for j in (0..problem.num_vars()).filter(|&j| problem.integer[j]) {
        let lo = (input.lower[j] - FEASIBILITY_TOLERANCE).ceil();
        let hi = (input.upper[j] + FEASIBILITY_TOLERANCE).floor();
        if lo > hi {
            return Err(SolveStatus::Infeasible);
        }
        if !lo.is_finite() || !hi.is_finite() {
            return Err(SolveStatus::Other);
        }

        let (lo, hi) = (lo as i64, hi as i64);
        points = points.saturating_mul((hi - lo + 1) as u64);
        if points > MAX_ENUMERATION {
            return Err(SolveStatus::Other);
        }
        digits.push(Digit { var: j, lo, hi });
    }

    Ok(digits)
}

/// Maps the warm start onto the digits, when it assigns all of them within their domain.
fn start_point(digits: &[Digit], start: &[Option<f64>]) -> Option<Vec<i64>> {
    digits
        .iter()
        .map(|d| {
            let v = start[d.var]?.round() as i64;
            (d.lo..=d.hi).contains(&v).then_some(v)
        })
        .collect()
}

/// Solves a (restricted) MIP by visiting every integer point of its box, odometer style.
///
/// Continuous variables, if any, are solved as an LP at every point. The warm start, when it is
/// complete, is visited first. A point is accepted only if it is strictly better than the cutoff
/// and satisfies every at-least-one-nonzero group.
pub fn enumerate_solve(
    problem: &MipProblem,
    input: &EnumerationInput,
) -> KsResult<EnumerationOutcome> {
    let digits = match integer_digits(problem, input) {
        Ok(digits) => digits,
        Err(status) => {
            if status == SolveStatus::Other {
                tracing::warn!(
                    max = MAX_ENUMERATION,
                    "integer box too large (or unbounded) for enumeration"
                );
            }
            return Ok(EnumerationOutcome::empty(status));
        }
    };

    let continuous = (0..problem.num_vars())
        .filter(|&j| !problem.integer[j] && input.lower[j] < input.upper[j])
        .collect();

    let mut enumerator = Enumerator {
        problem,
        input,
        continuous,
        best: None,
        found: 0,
        cut_off: false,
        nodes: 0,
        started: Instant::now(),
    };

    // fixed variables sit at their value, free ones get overwritten point by point
    let mut x: Vec<f64> = input
        .lower
        .iter()
        .zip(input.upper)
        .map(|(&lo, &hi)| if lo.is_finite() { lo } else { hi.min(0.0) })
        .collect();
    for d in &digits {
        x[d.var] = d.lo as f64;
    }

    let mut stop = Stop::Exhausted;
    let start = start_point(&digits, input.start);

    if let Some(point) = &start {
        for (d, &v) in digits.iter().zip(point) {
            x[d.var] = v as f64;
        }
        if enumerator.visit(&mut x)? {
            stop = Stop::SolutionLimit;
        }
    }

    let mut current: Vec<i64> = digits.iter().map(|d| d.lo).collect();
    while stop == Stop::Exhausted {
        if start.as_ref() != Some(&current) {
            for (d, &v) in digits.iter().zip(&current) {
                x[d.var] = v as f64;
            }
            if enumerator.visit(&mut x)? {
                stop = Stop::SolutionLimit;
                break;
            }
            if enumerator.out_of_time() {
                stop = Stop::TimeLimit;
                break;
            }
        }

        // odometer increment, the first digit moves fastest
        let mut k = 0;
        loop {
            if k == digits.len() {
                break;
            }
            if current[k] < digits[k].hi {
                current[k] += 1;
                break;
            }
            current[k] = digits[k].lo;
            k += 1;
        }
        if k == digits.len() {
            break;
        }
    }

    let status = match (stop, enumerator.best.is_some()) {
        (Stop::SolutionLimit, _) => SolveStatus::SolutionLimit,
        (Stop::TimeLimit, _) => SolveStatus::TimeLimit,
        (Stop::Exhausted, true) => SolveStatus::Optimal,
        (Stop::Exhausted, false) if enumerator.cut_off => SolveStatus::Cutoff,
        (Stop::Exhausted, false) => SolveStatus::Infeasible,
    };

    Ok(EnumerationOutcome {
        status,
        best: enumerator.best,
        nodes: enumerator.nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mps_reader::parse_mps;

    static OPTIONS: SolverOptions = SolverOptions::new();

    fn input<'a>(
        problem: &'a MipProblem,
        groups: &'a [Vec<usize>],
        start: &'a [Option<f64>],
    ) -> EnumerationInput<'a> {
        EnumerationInput {
            lower: &problem.lower,
            upper: &problem.upper,
            groups,
            cutoff: None,
            solution_limit: None,
            time_limit: None,
            start,
            options: &OPTIONS,
        }
    }

    /// min -x - y + z  s.t.  x + y <= 1.5 + z,  z <= 0.5, x and y general integers in [0, 3]
    const MIXED_MPS: &str = "NAME MIXED
ROWS
 N obj
 L cap
COLUMNS
 MARKER 'MARKER' 'INTORG'
 x obj -1.0 cap 1.0
 y obj -1.0 cap 1.0
 MARKER 'MARKER' 'INTEND'
 z obj 1.0 cap -1.0
RHS
 rhs cap 1.5
BOUNDS
 UP bnd x 3
 UP bnd y 3
 UP bnd z 0.5
ENDATA
";

    #[test]
    fn test_general_integers_with_continuous() {
        let problem = parse_mps(MIXED_MPS).unwrap();
        let start = vec![None; 3];
        let outcome = enumerate_solve(&problem, &input(&problem, &[], &start)).unwrap();

        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.nodes, 16);

        // x + y = 2 needs z = 0.5, objective -1.5 beats -1 from x + y = 1
        let (value, x) = outcome.best.unwrap();
        assert!((value + 1.5).abs() < 1e-5, "{value}");
        assert!((x[0] + x[1] - 2.0).abs() < 1e-9);
        assert!((x[2] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_box_too_large() {
        let mut problem = parse_mps(MIXED_MPS).unwrap();
        problem.upper[0] = 1.0e7;
        let start = vec![None; 3];
        let outcome = enumerate_solve(&problem, &input(&problem, &[], &start)).unwrap();
        assert_eq!(outcome.status, SolveStatus::Other);
        assert_eq!(outcome.nodes, 0);
    }

    #[test]
    fn test_groups_and_empty_domain() {
        let problem = parse_mps(MIXED_MPS).unwrap();
        let start = vec![None; 3];

        // x must be nonzero, y = 0 forced by the bounds
        let mut upper = problem.upper.clone();
        upper[1] = 0.0;
        let groups = vec![vec![0]];
        let outcome = enumerate_solve(
            &problem,
            &EnumerationInput {
                upper: &upper,
                ..input(&problem, &groups, &start)
            },
        )
        .unwrap();
        let (value, x) = outcome.best.unwrap();
        assert_eq!(x[0], 2.0);
        assert!((value + 1.5).abs() < 1e-5);

        let lower = vec![0.2, 0.0, 0.0];
        let upper = vec![0.8, 3.0, 0.5];
        let outcome = enumerate_solve(
            &problem,
            &EnumerationInput {
                lower: &lower,
                upper: &upper,
                ..input(&problem, &[], &start)
            },
        )
        .unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
    }
}
