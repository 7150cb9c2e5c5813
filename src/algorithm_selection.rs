//! Name based registries of the pluggable algorithms.

use crate::bucket_strategy::{decreasing_size_bucket, fixed_size_bucket, BucketFn};
use crate::config_loader::Config;
use crate::error::{KsError, KsResult};
use crate::kernel_strategy::{base_kernel_builder, percentage_better_kernel_builder, KernelFn};
use crate::sort_strategy::{bucket_sort, cheb_sort, kernel_sort, SortFn};
use std::collections::HashMap;

/// A closed store of named algorithms with a default one.
#[derive(Debug, Clone)]
pub struct Selector<F: Copy> {
    store: HashMap<String, F>,
    default: F,
}

impl<F: Copy> Selector<F> {
    pub fn new(default: F) -> Self {
        Self {
            store: HashMap::new(),
            default,
        }
    }

    /// Installs a new algorithm, names are never overwritten.
    pub fn add_algorithm(&mut self, name: &str, function: F) -> KsResult<()> {
        if self.store.contains_key(name) {
            return Err(KsError::DuplicateAlgorithm(name.to_string()));
        }
        self.store.insert(name.to_string(), function);
        Ok(())
    }

    pub fn get_algorithm(&self, name: &str) -> Option<F> {
        self.store.get(name).copied()
    }

    pub const fn default_algorithm(&self) -> F {
        self.default
    }

    /// Like [`Selector::get_algorithm`] but an unknown name is an error.
    pub fn require(&self, name: &str) -> KsResult<F> {
        self.get_algorithm(name)
            .ok_or_else(|| KsError::UnknownAlgorithm(name.to_string()))
    }
}

fn with_algorithms<F: Copy>(default: F, algorithms: &[(&str, F)]) -> Selector<F> {
    let mut selector = Selector::new(default);
    for &(name, function) in algorithms {
        let installed = selector.add_algorithm(name, function);
        debug_assert!(installed.is_ok(), "built in algorithm {name} installed twice");
    }
    selector
}

pub fn bucket_builders() -> Selector<BucketFn> {
    with_algorithms(
        fixed_size_bucket as BucketFn,
        &[
            ("fixed", fixed_size_bucket as BucketFn),
            ("decrease", decreasing_size_bucket as BucketFn),
        ],
    )
}

pub fn kernel_builders() -> Selector<KernelFn> {
    with_algorithms(
        base_kernel_builder as KernelFn,
        &[
            ("base", base_kernel_builder as KernelFn),
            ("percentage", percentage_better_kernel_builder as KernelFn),
        ],
    )
}

pub fn kernel_sorters() -> Selector<SortFn> {
    with_algorithms(
        kernel_sort as SortFn,
        &[("base_kernel_sort", kernel_sort as SortFn)],
    )
}

pub fn bucket_sorters() -> Selector<SortFn> {
    with_algorithms(
        bucket_sort as SortFn,
        &[
            ("base_bucket_sort", bucket_sort as SortFn),
            ("cheb_bucket_sort", cheb_sort as SortFn),
        ],
    )
}

/// The set of algorithms a search runs with.
#[derive(Debug, Clone, Copy)]
pub struct KernelMethods {
    pub kernel_builder: KernelFn,
    pub bucket_builder: BucketFn,
    pub kernel_sort: SortFn,
    pub bucket_sort: SortFn,
}

impl Default for KernelMethods {
    fn default() -> Self {
        Self {
            kernel_builder: base_kernel_builder,
            bucket_builder: fixed_size_bucket,
            kernel_sort,
            bucket_sort,
        }
    }
}

impl KernelMethods {
    /// Resolves the algorithm names of a configuration against the built in registries.
    pub fn from_config(config: &Config) -> KsResult<Self> {
        Ok(Self {
            kernel_builder: kernel_builders().require(&config.kernel)?,
            bucket_builder: bucket_builders().require(&config.bucket)?,
            kernel_sort: kernel_sorters().require(&config.kernel_sorter)?,
            bucket_sort: bucket_sorters().require(&config.bucket_sorter)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_loader::parse_config;

    #[test]
    fn test_add_algorithm() {
        let mut selector = bucket_builders();
        assert!(selector.get_algorithm("test").is_none());

        selector
            .add_algorithm("test", decreasing_size_bucket)
            .unwrap();
        assert!(selector.get_algorithm("test").is_some());
    }

    #[test]
    fn test_duplicate_algorithm() {
        let mut selector = kernel_sorters();
        let err = selector
            .add_algorithm("base_kernel_sort", bucket_sort)
            .unwrap_err();
        assert_eq!(err.to_string(), "algorithm base_kernel_sort is already installed");

        let mut selector: Selector<fn() -> u8> = Selector::new(|| 0);
        selector.add_algorithm("a", || 1).unwrap();
        assert!(selector.add_algorithm("a", || 2).is_err());
        assert_eq!((selector.get_algorithm("a").unwrap())(), 1);
        assert_eq!((selector.default_algorithm())(), 0);
    }

    #[test]
    fn test_builtin_names() {
        assert!(bucket_builders().get_algorithm("fixed").is_some());
        assert!(bucket_builders().get_algorithm("decrease").is_some());
        assert!(kernel_builders().get_algorithm("percentage").is_some());
        assert!(bucket_sorters().get_algorithm("cheb_bucket_sort").is_some());
        assert!(kernel_sorters().get_algorithm("cheb_bucket_sort").is_none());
    }

    #[test]
    fn test_methods_from_config() {
        let conf = parse_config("BUCKET: decrease\nBUCKET_SORTER: cheb_bucket_sort\n").unwrap();
        assert!(KernelMethods::from_config(&conf).is_ok());

        let conf = parse_config("KERNEL: magic\n").unwrap();
        let err = KernelMethods::from_config(&conf).unwrap_err();
        assert!(matches!(err, KsError::UnknownAlgorithm(name) if name == "magic"));
    }
}
