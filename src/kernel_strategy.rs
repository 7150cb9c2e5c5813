//! Kernel builders: refine the kernel derived from the LP relaxation before the search starts.

use crate::config_loader::Params;
use crate::error::{KsError, KsResult};
use crate::kernel::Kernel;
use crate::sort_strategy::SortFn;
use crate::variable_scoring::Values;

/// Signature shared by every installed kernel builder.
pub type KernelFn = fn(Kernel, &dyn Values, SortFn, &Params, &Params) -> KsResult<Kernel>;

/// The LP kernel as is.
pub fn base_kernel_builder(
    base: Kernel,
    _values: &dyn Values,
    _sorter: SortFn,
    _sorter_conf: &Params,
    _conf: &Params,
) -> KsResult<Kernel> {
    Ok(base)
}

/// Keeps the `floor(len * percentage)` best scored kernel members and demotes the others.
///
/// The sorter returns the members weakest first, so the demoted ones are the head of its output.
pub fn percentage_better_kernel_builder(
    mut base: Kernel,
    values: &dyn Values,
    sorter: SortFn,
    sorter_conf: &Params,
    conf: &Params,
) -> KsResult<Kernel> {
    let percentage = conf.get_f64("percentage").unwrap_or(1.0);
    if !(0.0..=1.0).contains(&percentage) {
        return Err(KsError::Config(format!(
            "percentage should be in [0, 1] found {percentage}"
        )));
    }

    let members = sorter(&base, values, sorter_conf);
    let kept = (members.len() as f64 * percentage).floor() as usize;
    let demoted = members.len() - kept;

    for name in &members[..demoted] {
        base.set(name, false)?;
    }

    Ok(base)
}
