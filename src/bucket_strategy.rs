//! Bucket builders: partition the variables outside the kernel into an ordered list of groups.
//!
//! Every builder covers the whole candidate pool, with no gaps and no overlaps; a trailing
//! bucket holds whatever the requested sizes leave over.

use crate::config_loader::Params;
use crate::error::{KsError, KsResult};
use crate::kernel::Kernel;
use crate::sort_strategy::SortFn;
use crate::variable_scoring::Values;

pub type Bucket = Vec<String>;

/// Signature shared by every installed bucket builder.
pub type BucketFn = fn(&Kernel, &dyn Values, SortFn, &Params, &Params) -> KsResult<Vec<Bucket>>;

/// Cuts `variables` in consecutive slices of the given lengths, the rest goes in a last slice.
fn split_by_sizes(variables: Vec<String>, sizes: impl Iterator<Item = usize>) -> Vec<Bucket> {
    let length = variables.len();
    let mut buckets = Vec::new();
    let mut iter = variables.into_iter();
    let mut start = 0;

    for size in sizes {
        if start >= length {
            break;
        }
        let end = (start + size).min(length);
        buckets.push(iter.by_ref().take(end - start).collect());
        start = end;
    }

    if start < length {
        buckets.push(iter.collect());
    }

    buckets
}

/// Buckets of the same size, either `size` directly or `len / count`.
///
/// # Errors
///
/// [`KsError::BucketSizing`] if the candidates cannot fill the requested buckets.
pub fn fixed_size_bucket(
    kernel: &Kernel,
    values: &dyn Values,
    sorter: SortFn,
    sorter_conf: &Params,
    conf: &Params,
) -> KsResult<Vec<Bucket>> {
    let variables = sorter(kernel, values, sorter_conf);
    let length = variables.len();

    let count = conf.get_usize("count")?.unwrap_or(0);
    let size = if count > 0 {
        length / count
    } else {
        conf.get_usize("size")?.unwrap_or(1)
    };

    if size == 0 {
        return Err(KsError::BucketSizing {
            available: length,
            count,
        });
    }

    Ok(split_by_sizes(variables, std::iter::repeat(size)))
}

/// Buckets whose size halves at each step: with `count` buckets the unit is
/// `floor(len / (2^count - 1))` and bucket `i` holds `unit * 2^(count - 1 - i)` variables.
///
/// # Errors
///
/// [`KsError::BucketSizing`] if the unit would be zero.
pub fn decreasing_size_bucket(
    kernel: &Kernel,
    values: &dyn Values,
    sorter: SortFn,
    sorter_conf: &Params,
    conf: &Params,
) -> KsResult<Vec<Bucket>> {
    let variables = sorter(kernel, values, sorter_conf);
    let length = variables.len();

    let count = conf.get_usize("count")?.unwrap_or(1);
    if count == 0 || count >= usize::BITS as usize {
        return Err(KsError::Config(format!(
            "decreasing buckets need 1 <= count < {} found {count}",
            usize::BITS
        )));
    }

    let blocks = (1usize << count) - 1;
    let unit = length / blocks;
    if unit == 0 {
        return Err(KsError::BucketSizing {
            available: length,
            count,
        });
    }

    let sizes = (0..count).rev().map(|i| unit << i);
    Ok(split_by_sizes(variables, sizes))
}
