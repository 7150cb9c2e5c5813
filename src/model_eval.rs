//! Checks a stored solution against a model.

use crate::error::KsResult;
use crate::solution::Solution;
use crate::solver_adapter::MipModel;

/// Fixes every variable of `base` to its value in `solution` (zero when the solution does not
/// assign it) and solves. Returns the objective value if the assignment is feasible.
///
/// # Errors
///
/// [`crate::error::KsError::UnknownVariable`] if the solution names a variable the model does
/// not have.
pub fn eval_model<M: MipModel>(base: &M, solution: &Solution) -> KsResult<Option<f64>> {
    let mut model = base.clone();

    for (name, &value) in &solution.vars {
        model.fix_variable(name, value)?;
    }
    for name in base.variable_names() {
        if solution.get_value(&name).is_none() {
            model.fix_variable(&name, 0.0)?;
        }
    }

    let status = model.optimize()?;
    tracing::debug!(?status, "solution evaluated");

    if !status.may_have_solution() {
        return Ok(None);
    }
    Ok(model.objective_value())
}
