use crate::config_loader::Config;

/// Options handed to the solver backend when a model is loaded. The kernel search itself never
/// interprets them, [`MpsModel`](crate::mip_model::MpsModel) forwards them to every LP solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    pub threads: Option<usize>,
    pub mip_gap: f64,
    pub time_limit: Option<f64>,
    pub verbose: usize,
}

impl SolverOptions {
    pub const fn new() -> Self {
        Self {
            threads: None,
            mip_gap: 0.0,
            time_limit: None,
            verbose: 0,
        }
    }

    /// Builds the backend options out of a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let mut options = Self::new();
        options.set_threads(config.num_thread);
        options.mip_gap = config.mip_gap;
        options.time_limit = config.time_limit;
        options.verbose = usize::from(config.log);
        options
    }

    pub fn set_threads(&mut self, threads: Option<i64>) {
        // non positive values mean "let the backend decide"
        if let Some(t) = threads {
            self.threads = usize::try_from(t).ok().filter(|&t| t > 0);
        }
    }
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::config_loader::Config;
    use crate::solver_options::SolverOptions;

    #[test]
    fn test_threads_pass_through() {
        let mut options = SolverOptions::new();
        options.set_threads(Some(-1));
        assert_eq!(options.threads, None);

        options.set_threads(Some(4));
        assert_eq!(options.threads, Some(4));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.mip_gap = 0.01;
        config.log = true;
        config.num_thread = Some(2);

        let options = SolverOptions::from_config(&config);
        assert_eq!(options.threads, Some(2));
        assert_eq!(options.mip_gap, 0.01);
        assert_eq!(options.verbose, 1);
    }
}
