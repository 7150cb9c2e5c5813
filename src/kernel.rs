//! The kernel: the table of variables currently active in the restricted sub-models.

use crate::error::{KsError, KsResult};
use crate::solution::Solution;
use crate::solver_adapter::MipModel;
use std::collections::HashMap;

/// Ordered map from variable name to its "selected" flag, kept in model order so that every
/// ordering derived from it is deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Kernel {
    names: Vec<String>,
    selected: Vec<bool>,
    index: HashMap<String, usize>,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a variable, or overwrites its flag if it is already present.
    pub fn insert(&mut self, name: &str, selected: bool) {
        if let Some(&i) = self.index.get(name) {
            self.selected[i] = selected;
            return;
        }

        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.selected.push(selected);
    }

    pub fn get(&self, name: &str) -> Option<bool> {
        self.index.get(name).map(|&i| self.selected[i])
    }

    /// Flips an existing entry, the kernel never gains variables this way.
    pub fn set(&mut self, name: &str, selected: bool) -> KsResult<()> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| KsError::UnknownVariable(name.to_string()))?;
        self.selected[i] = selected;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.names
            .iter()
            .zip(self.selected.iter())
            .map(|(name, &selected)| (name.as_str(), selected))
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, s)| *s).map(|(name, _)| name)
    }

    pub fn unselected(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, s)| !*s).map(|(name, _)| name)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.iter().filter(|&&s| s).count()
    }

    /// A kernel that spans the whole model leaves nothing to search.
    pub fn check_not_ill(&self) -> KsResult<()> {
        let kernel_size = self.selected_count();
        if kernel_size >= self.len() {
            return Err(KsError::IllKernel { kernel_size });
        }
        Ok(())
    }
}

impl<S: AsRef<str>> FromIterator<(S, bool)> for Kernel {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        let mut kernel = Self::new();
        for (name, selected) in iter {
            kernel.insert(name.as_ref(), selected);
        }
        kernel
    }
}

/// Marks all the bucket variables as selected.
pub fn select_vars(kernel: &mut Kernel, bucket: &[String]) -> KsResult<()> {
    for name in bucket {
        kernel.set(name, true)?;
    }
    Ok(())
}

/// Reverts a bucket out of the kernel.
pub fn unselect_vars(kernel: &mut Kernel, bucket: &[String]) -> KsResult<()> {
    for name in bucket {
        kernel.set(name, false)?;
    }
    Ok(())
}

/// Deselects the bucket variables whose value in `solution` equals `null_value`, variables
/// missing from the solution are left alone.
pub fn update_kernel(
    kernel: &mut Kernel,
    bucket: &[String],
    solution: &Solution,
    null_value: f64,
) -> KsResult<usize> {
    let mut removed = 0;
    for name in bucket {
        if solution.get_value(name) == Some(null_value) {
            kernel.set(name, false)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Restricts a model to the kernel by fixing every unselected variable to `value`.
pub fn disable_variables<M: MipModel>(model: &mut M, kernel: &Kernel, value: f64) -> KsResult<()> {
    for name in kernel.unselected() {
        model.fix_variable(name, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII_LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
    const ASCII_UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    fn ascii_letters() -> Vec<String> {
        ASCII_LOWERCASE
            .chars()
            .chain(ASCII_UPPERCASE.chars())
            .map(|c| c.to_string())
            .collect()
    }

    fn make_kernel() -> (Kernel, Vec<String>) {
        let kernel = ascii_letters()
            .into_iter()
            .enumerate()
            .map(|(i, l)| (l, i % 2 == 0))
            .collect::<Kernel>();

        let bucket = ASCII_LOWERCASE
            .chars()
            .enumerate()
            .filter(|(i, _)| i % 2 != 0)
            .map(|(_, c)| c.to_string())
            .collect();

        (kernel, bucket)
    }

    #[test]
    fn test_select_vars() {
        let (mut kernel, bucket) = make_kernel();
        select_vars(&mut kernel, &bucket).unwrap();

        for l in ASCII_LOWERCASE.chars() {
            assert_eq!(kernel.get(&l.to_string()), Some(true), "{l}");
        }

        for (i, l) in ASCII_UPPERCASE.chars().enumerate() {
            assert_eq!(kernel.get(&l.to_string()), Some(i % 2 == 0), "{l}");
        }
    }

    #[test]
    fn test_update_kernel() {
        let (mut kernel, bucket) = make_kernel();
        select_vars(&mut kernel, &bucket).unwrap();

        // the first 4 bucket variables settle at zero, the others do not
        let solution = Solution::new(
            12.0,
            bucket
                .iter()
                .enumerate()
                .map(|(i, l)| (l.clone(), if i < 4 { 0.0 } else { 1.0 })),
        );
        let removed = update_kernel(&mut kernel, &bucket, &solution, 0.0).unwrap();
        assert_eq!(removed, 4);

        for (i, name) in bucket.iter().enumerate() {
            assert_eq!(kernel.get(name), Some(i >= 4), "{name}");
        }

        // every variable outside the bucket is untouched
        for (i, name) in ascii_letters().iter().enumerate() {
            if !bucket.contains(name) {
                assert_eq!(kernel.get(name), Some(i % 2 == 0), "{name}");
            }
        }
    }

    #[test]
    fn test_unselect_vars() {
        let (mut kernel, bucket) = make_kernel();
        let before = kernel.clone();
        select_vars(&mut kernel, &bucket).unwrap();
        unselect_vars(&mut kernel, &bucket).unwrap();
        assert_eq!(kernel, before);
    }

    #[test]
    fn test_unknown_variable() {
        let (mut kernel, _) = make_kernel();
        let result = select_vars(&mut kernel, &["not-a-letter".to_string()]);
        assert!(matches!(result, Err(KsError::UnknownVariable(_))));
        assert_eq!(kernel.len(), 52);
    }

    #[test]
    fn test_ill_kernel() {
        let (mut kernel, _) = make_kernel();
        assert!(kernel.check_not_ill().is_ok());
        assert_eq!(kernel.selected_count(), 26);

        let all = ascii_letters();
        select_vars(&mut kernel, &all).unwrap();
        assert!(matches!(
            kernel.check_not_ill(),
            Err(KsError::IllKernel { kernel_size: 52 })
        ));
    }
}
