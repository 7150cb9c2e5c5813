//! Feature importances of a randomized tree ensemble (extremely randomized trees).
//!
//! Every tree is grown on the whole data set: at each node a few random features get a random
//! threshold each, and the split with the largest Gini impurity decrease wins. The importance of
//! a feature is the impurity decrease it produced, weighted by the node sizes, averaged over the
//! trees and normalized to sum to one.

use crate::search_utils::make_prng;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use smolprng::{Algorithm, PRNG};

#[derive(Debug, Clone, PartialEq)]
pub struct ForestOptions {
    pub trees: usize,
    pub seed: u64,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl ForestOptions {
    pub const fn new(trees: usize, seed: u64) -> Self {
        Self {
            trees,
            seed,
            max_depth: 32,
            min_samples_split: 2,
        }
    }
}

fn gini(labels: &[usize], samples: &[usize], classes: usize) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut counts = vec![0usize; classes];
    for &s in samples {
        counts[labels[s]] += 1;
    }

    let n = samples.len() as f64;
    1.0 - counts
        .iter()
        .map(|&c| (c as f64 / n).powi(2))
        .sum::<f64>()
}

/// One candidate split of a node.
struct Split {
    feature: usize,
    decrease: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

fn random_split<T: Algorithm>(
    column: ArrayView1<f64>,
    samples: &[usize],
    prng: &mut PRNG<T>,
) -> Option<(Vec<usize>, Vec<usize>)> {
    let (min, max) = samples
        .iter()
        .map(|&s| column[s])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if min >= max {
        return None;
    }

    let threshold = min + prng.gen_f64() * (max - min);
    let (left, right): (Vec<usize>, Vec<usize>) =
        samples.iter().copied().partition(|&s| column[s] <= threshold);

    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, right))
}

/// Grows one tree and returns the impurity decrease credited to every feature.
fn grow_tree<T: Algorithm>(
    data: &Array2<f64>,
    labels: &[usize],
    classes: usize,
    options: &ForestOptions,
    prng: &mut PRNG<T>,
) -> Array1<f64> {
    let (rows, features) = data.dim();
    let mut importance = Array1::zeros(features);
    let tries = ((features as f64).sqrt().ceil() as usize).max(1);

    // explicit stack of (samples, depth), no recursion on deep trees
    let mut stack = vec![((0..rows).collect::<Vec<usize>>(), 0usize)];

    while let Some((samples, depth)) = stack.pop() {
        let impurity = gini(labels, &samples, classes);
        if samples.len() < options.min_samples_split || depth >= options.max_depth || impurity == 0.0
        {
            continue;
        }

        let mut best: Option<Split> = None;
        for _ in 0..tries {
            let feature = prng.gen_u64() as usize % features;
            let Some((left, right)) = random_split(data.column(feature), &samples, prng) else {
                continue;
            };

            let n = samples.len() as f64;
            let weighted = (left.len() as f64 * gini(labels, &left, classes)
                + right.len() as f64 * gini(labels, &right, classes))
                / n;
            let decrease = impurity - weighted;

            if best.as_ref().map_or(true, |b| decrease > b.decrease) {
                best = Some(Split {
                    feature,
                    decrease,
                    left,
                    right,
                });
            }
        }

        let Some(split) = best else {
            continue;
        };

        importance[split.feature] += samples.len() as f64 / rows as f64 * split.decrease;
        stack.push((split.left, depth + 1));
        stack.push((split.right, depth + 1));
    }

    importance
}

/// Normalized feature importances of an ensemble fitted on `data` (samples × features) and
/// `labels`. All zeros if the labels have a single class or no feature varies.
pub fn feature_importances(
    data: &Array2<f64>,
    labels: &[usize],
    options: &ForestOptions,
) -> Array1<f64> {
    let (rows, features) = data.dim();
    if rows == 0 || features == 0 || options.trees == 0 {
        return Array1::zeros(features);
    }

    let classes = labels.iter().max().map_or(1, |&m| m + 1);

    // one seeded generator per tree keeps the result independent of the thread schedule
    let per_tree: Vec<Array1<f64>> = (0..options.trees)
        .into_par_iter()
        .map(|t| {
            let mut prng = make_prng(options.seed ^ (t as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            grow_tree(data, labels, classes, options, &mut prng)
        })
        .collect();

    let total = per_tree
        .iter()
        .fold(Array1::<f64>::zeros(features), |acc, imp| acc + imp);

    let sum = total.sum();
    if sum > 0.0 {
        total / sum
    } else {
        total
    }
}
