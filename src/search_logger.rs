use crate::kernel_search::KernelSearch;
use crate::search_utils::get_current_time;
use crate::solver_adapter::MipModel;

/// Console output of the kernel search
///
/// It has varying levels of output, where 0 means nothing is displayed to the screen, and each
/// additional level includes everything previous
///
/// 0 - Nothing
/// 1 - Header, one line per bucket, and Finish
/// 2 - Round summaries and fixed points
///
/// `LOG: true` in the configuration selects level 2.
pub struct SearchOutputLogger {
    pub output_level: usize,
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl SearchOutputLogger {
    pub const fn new(level: usize) -> Self {
        Self {
            output_level: level,
        }
    }

    pub fn output_header<M: MipModel>(&self, search: &KernelSearch<M>) {
        if self.output_level < 1 {
            return;
        }

        let version_number = env!("CARGO_PKG_VERSION");
        let num_variables = search.kernel.len();
        let kernel_size = search.kernel.selected_count();
        let num_buckets = search.buckets.len();
        let incumbent = format_value(search.incumbent.as_ref().map(|s| s.value));

        println!("Kernel Search: A Rust-based MIP heuristic");
        println!("Version number {version_number}");
        println!("Problem size: {num_variables}");
        println!("Initial kernel size: {kernel_size}");
        println!("Buckets: {num_buckets}");
        println!("Initial solution: {incumbent}");

        println!("------------------------------------------------------------------");
        println!("Iteration | Bucket | Status | Incumbent | Kernel Size | Time (s)");
    }

    pub fn generate_output_line<M: MipModel>(
        &self,
        search: &KernelSearch<M>,
        bucket: usize,
        improved: bool,
    ) {
        if self.output_level < 1 {
            return;
        }

        let iteration = search.iteration;
        let status = if improved { "found" } else { "fail" };
        let incumbent = format_value(search.incumbent.as_ref().map(|s| s.value));
        let kernel_size = search.kernel.selected_count();
        let time = get_current_time() - search.time_start;
        println!("{iteration} | {bucket} | {status} | {incumbent} | {kernel_size} | {time:.3}");
    }

    pub fn output_round<M: MipModel>(&self, search: &KernelSearch<M>, fixed_point: bool) {
        if self.output_level < 2 {
            return;
        }

        let iteration = search.iteration;
        let probability = search.worsen.get_probability();
        let best = format_value(search.best.as_ref().map(|s| s.value));
        if fixed_point {
            println!("Round {iteration}: fixed point reached, worsening probability {probability}");
        }
        println!("Round {iteration}: best solution {best}");
    }

    pub fn generate_exit_line<M: MipModel>(&self, search: &KernelSearch<M>) {
        if self.output_level < 1 {
            return;
        }

        let best = format_value(search.best.as_ref().map(|s| s.value));
        let rounds = search.iteration;
        let solves = search.solves;
        let current_time = get_current_time();
        let time_passed = current_time - search.time_start;
        println!("------------------------------------------------------------------");
        println!("Kernel Search Finished");
        println!("Best Solution Value: {best}");
        println!("Rounds: {rounds}");
        println!("Sub-models Solved: {solves}");
        println!("Time to Solve: {time_passed}");
        println!("------------------------------------------------------------------");
    }
}

#[cfg(test)]
mod tests {
    use crate::algorithm_selection::KernelMethods;
    use crate::config_loader::Config;
    use crate::kernel_search::KernelSearch;
    use crate::mip_model::tests::knapsack;
    use crate::search_logger::SearchOutputLogger;

    #[test]
    fn test_output_lines() {
        let model = knapsack();
        let config = Config {
            bucket_conf: crate::config_loader::Params::new().with("size", 1.0),
            ..Config::default()
        };
        let mut search = KernelSearch::new(&model, &config, KernelMethods::default());
        search.solve().unwrap();

        let solver_logger = SearchOutputLogger { output_level: 2 };
        solver_logger.output_header(&search);
        solver_logger.generate_output_line(&search, 0, true);
        solver_logger.output_round(&search, true);
        solver_logger.generate_exit_line(&search);

        assert_eq!(super::format_value(None), "-");
        assert_eq!(super::format_value(Some(9.0)), "9");
    }
}
