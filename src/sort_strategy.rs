//! Sorting strategies, they turn a kernel and a score table into an ordered list of names.
//!
//! All the sorts are stable: variables with the same score keep their kernel (model) order.

use crate::config_loader::Params;
use crate::kernel::Kernel;
use crate::variable_scoring::Values;
use std::f64::consts::PI;

/// Signature shared by every installed sorter.
pub type SortFn = fn(&Kernel, &dyn Values, &Params) -> Vec<String>;

/// Kernel members by ascending score, the weakest members come first.
pub fn kernel_sort(kernel: &Kernel, values: &dyn Values, _conf: &Params) -> Vec<String> {
    let mut scored: Vec<(&str, f64)> = kernel
        .selected()
        .map(|name| (name, values.get_value(name)))
        .collect();
    scored.sort_by(|(_, a), (_, b)| a.total_cmp(b));
    scored.into_iter().map(|(name, _)| name.to_string()).collect()
}

/// Variables outside the kernel by descending score, the most promising come first.
pub fn bucket_sort(kernel: &Kernel, values: &dyn Values, _conf: &Params) -> Vec<String> {
    let mut scored: Vec<(&str, f64)> = kernel
        .unselected()
        .map(|name| (name, values.get_value(name)))
        .collect();
    scored.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    scored.into_iter().map(|(name, _)| name.to_string()).collect()
}

/// Maps the k-th of n Chebyshev nodes onto a position of a list of length n, nodes are dense
/// near both ends of the list.
fn chebyshev_position(k: usize, n: usize) -> usize {
    let node = ((2 * k + 1) as f64 * PI / (2 * n) as f64).cos();
    let position = ((1.0 - node) / 2.0 * n as f64).floor() as usize;
    position.min(n - 1)
}

/// Diversified bucket order: takes the [`bucket_sort`] order and visits it alternating the
/// Chebyshev nodes of the top end and of the bottom end of the list, so consecutive buckets
/// mix strong and weak candidates.
pub fn cheb_sort(kernel: &Kernel, values: &dyn Values, conf: &Params) -> Vec<String> {
    let sorted = bucket_sort(kernel, values, conf);
    let n = sorted.len();
    if n < 3 {
        return sorted;
    }

    let mut taken = vec![false; n];
    let mut output = Vec::with_capacity(n);

    // 0, n-1, 1, n-2, ... alternates between the two ends
    for i in 0..n {
        let k = if i % 2 == 0 { i / 2 } else { n - 1 - i / 2 };

        // on a collision take the next free slot, this keeps the output a permutation
        let mut position = chebyshev_position(k, n);
        while taken[position] {
            position = (position + 1) % n;
        }

        taken[position] = true;
        output.push(sorted[position].clone());
    }

    output
}
