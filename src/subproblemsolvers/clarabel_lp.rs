use crate::error::KsResult;
use crate::mip_model::{MipProblem, FEASIBILITY_TOLERANCE};
use crate::solver_adapter::{Sense, SolveStatus};
use crate::solver_options::SolverOptions;
use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettings, DefaultSolver, IPSolver, NonnegativeConeT, SolverStatus, SupportedConeT,
    ZeroConeT,
};
use sprs::{CsMat, TriMat};

/// Primal values and reduced costs of an LP solve, both empty unless the status is optimal.
#[derive(Debug, Clone, PartialEq)]
pub struct LpOutcome {
    pub status: SolveStatus,
    pub x: Vec<f64>,
    pub reduced_costs: Vec<f64>,
}

impl LpOutcome {
    const fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            x: Vec::new(),
            reduced_costs: Vec::new(),
        }
    }
}

/// Constraint rows in clarabel form `a·x + s = b`, with a flag for the rows that come from the
/// problem (as opposed to variable bounds).
#[derive(Default)]
struct ConeRows {
    entries: Vec<Vec<(usize, f64)>>,
    rhs: Vec<f64>,
    structural: Vec<bool>,
}

impl ConeRows {
    fn push(&mut self, entries: Vec<(usize, f64)>, rhs: f64, structural: bool) {
        self.entries.push(entries);
        self.rhs.push(rhs);
        self.structural.push(structural);
    }

    fn len(&self) -> usize {
        self.rhs.len()
    }

    fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }
}

pub fn make_cb_form(p0: &CsMat<f64>) -> CscMatrix {
    let (t, y, u) = p0.to_csc().into_raw_storage();
    CscMatrix::new(p0.rows(), p0.cols(), t, y, u)
}

const fn map_status(status: SolverStatus) -> SolveStatus {
    match status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => SolveStatus::Optimal,
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            SolveStatus::Infeasible
        }
        SolverStatus::MaxTime => SolveStatus::TimeLimit,
        _ => SolveStatus::Other,
    }
}

/// Clarabel settings for one solve, a positive `mip_gap` loosens the relative gap tolerance.
fn lp_settings(options: &SolverOptions, time_limit: Option<f64>) -> DefaultSettings<f64> {
    let mut settings = DefaultSettings {
        verbose: options.verbose > 0,
        time_limit: time_limit.unwrap_or(f64::INFINITY),
        ..Default::default()
    };
    if options.mip_gap > 0.0 {
        settings.tol_gap_rel = options.mip_gap;
    }
    if let Some(threads) = options.threads {
        settings.max_threads = u32::try_from(threads).unwrap_or(u32::MAX);
    }
    settings
}

fn clean(v: f64) -> f64 {
    if v.abs() < FEASIBILITY_TOLERANCE {
        0.0
    } else {
        v
    }
}

/// Solves the LP relaxation of `problem` under the given variable bounds.
///
/// Equality rows and fixed variables go in a zero cone, every finite side of the other rows and
/// bounds in a nonnegative cone. The reduced cost of a variable is `c + Sᵀz` over the problem rows
/// only, reported in the direction of the problem.
pub fn solve_lp(
    problem: &MipProblem,
    lower: &[f64],
    upper: &[f64],
    options: &SolverOptions,
    time_limit: Option<f64>,
) -> KsResult<LpOutcome> {
    let n = problem.num_vars();
    let sign = match problem.sense {
        Sense::Minimize => 1.0,
        Sense::Maximize => -1.0,
    };
    let q: Vec<f64> = problem.objective.iter().map(|c| sign * c).collect();

    let mut equalities = ConeRows::default();
    let mut inequalities = ConeRows::default();

    for (i, row) in problem.rows.outer_iterator().enumerate() {
        let entries: Vec<(usize, f64)> = row.iter().map(|(j, &a)| (j, a)).collect();
        let (lo, hi) = (problem.row_lower[i], problem.row_upper[i]);

        if lo == hi {
            equalities.push(entries, hi, true);
            continue;
        }
        if hi.is_finite() {
            inequalities.push(entries.clone(), hi, true);
        }
        if lo.is_finite() {
            let negated = entries.into_iter().map(|(j, a)| (j, -a)).collect();
            inequalities.push(negated, -lo, true);
        }
    }

    for j in 0..n {
        let (lo, hi) = (lower[j], upper[j]);
        if lo > hi {
            return Ok(LpOutcome::failed(SolveStatus::Infeasible));
        }
        if lo == hi {
            equalities.push(vec![(j, 1.0)], lo, false);
            continue;
        }
        if hi.is_finite() {
            inequalities.push(vec![(j, 1.0)], hi, false);
        }
        if lo.is_finite() {
            inequalities.push(vec![(j, -1.0)], -lo, false);
        }
    }

    let m = equalities.len() + inequalities.len();
    if m == 0 {
        // nothing bounds the variables, only a constant objective has an optimum
        return Ok(if q.iter().all(|&c| c == 0.0) {
            LpOutcome {
                status: SolveStatus::Optimal,
                x: vec![0.0; n],
                reduced_costs: vec![0.0; n],
            }
        } else {
            LpOutcome::failed(SolveStatus::Other)
        });
    }

    let mut a = TriMat::new((m, n));
    let mut b = Vec::with_capacity(m);
    let mut structural = Vec::with_capacity(m);
    for block in [&equalities, &inequalities] {
        for ((entries, &rhs), &is_row) in block.entries.iter().zip(&block.rhs).zip(&block.structural)
        {
            let k = b.len();
            for &(j, v) in entries {
                a.add_triplet(k, j, v);
            }
            b.push(rhs);
            structural.push(is_row);
        }
    }
    let a_csc: CsMat<f64> = a.to_csc();

    let mut cones: Vec<SupportedConeT<f64>> = Vec::with_capacity(2);
    if !equalities.is_empty() {
        cones.push(ZeroConeT(equalities.len()));
    }
    if !inequalities.is_empty() {
        cones.push(NonnegativeConeT(inequalities.len()));
    }

    let p = make_cb_form(&CsMat::zero((n, n)));
    let settings = lp_settings(options, time_limit);
    let mut solver = DefaultSolver::new(&p, &q, &make_cb_form(&a_csc), &b, &cones, settings);
    solver.solve();

    let status = map_status(solver.solution.status);
    if status != SolveStatus::Optimal {
        return Ok(LpOutcome::failed(status));
    }

    let z = &solver.solution.z;
    let mut reduced = q;
    // the outer dimension of the csc matrix is the variable
    for (j, col) in a_csc.outer_iterator().enumerate() {
        for (k, &v) in col.iter() {
            if structural[k] {
                reduced[j] += v * z[k];
            }
        }
    }

    Ok(LpOutcome {
        status,
        x: solver.solution.x.iter().map(|&v| clean(v)).collect(),
        reduced_costs: reduced.into_iter().map(|r| clean(sign * r)).collect(),
    })
}
