use clap::{ArgGroup, Parser};
use kernel_search::algorithm_selection::KernelMethods;
use kernel_search::config_loader::{check_file_parameters, load_config};
use kernel_search::error::{ErrorClass, KsError, KsResult};
use kernel_search::kernel_search::kernel_search;
use kernel_search::mip_model::MpsModel;
use kernel_search::model_eval::eval_model;
use kernel_search::solution::Solution;
use kernel_search::solver_options::SolverOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ks", version, about = "Kernel Search heuristic for MIP instances")]
#[command(group(ArgGroup::new("mode").required(true).args(["config", "eval"])))]
struct Cli {
    /// Instance MPS file (optionally gzip compressed)
    mps: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evaluate if the given solution file is feasible for the instance
    #[arg(short, long)]
    eval: Option<PathBuf>,
}

fn enable_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn run_kernel_search(mps: &Path, config: &Path) -> KsResult<()> {
    let mut conf = load_config(Some(config))?;
    let instance = mps.to_string_lossy().into_owned();
    if conf.instance.is_empty() {
        conf.instance = instance.clone();
    }

    let files = check_file_parameters(&conf, &instance)?;
    let methods = KernelMethods::from_config(&conf)?;
    let model = MpsModel::load(mps, SolverOptions::from_config(&conf))?;

    let Some(sol) = kernel_search(&model, &conf, methods)? else {
        println!("Cannot find a solution");
        return Ok(());
    };

    if let Some(sol_file) = &files.solution {
        let path = sol.save_as_sol_file(sol_file)?;
        tracing::info!(file = %path.display(), "solution saved");
    }

    println!("Solution: {}", sol.value);

    if let (Some(debug_file), Some(debug)) = (&files.debug, &sol.debug) {
        debug.export_csv(Path::new(debug_file), debug_file.ends_with(".gz"))?;
    }
    Ok(())
}

fn evaluate_solution(mps: &Path, solution: &Path) -> KsResult<()> {
    let model = MpsModel::load(mps, SolverOptions::new())?;
    let sol = Solution::from_sol_file(solution)?;

    match eval_model(&model, &sol)? {
        Some(value) => {
            println!(
                "Solution file {} is a valid solution for {}",
                solution.display(),
                mps.display()
            );
            println!("Objective value: {value}");
        }
        None => println!(
            "Solution file {} is NOT a valid solution for {}",
            solution.display(),
            mps.display()
        ),
    }
    Ok(())
}

fn exit_code(err: &KsError) -> ExitCode {
    match err.class() {
        ErrorClass::Value => ExitCode::SUCCESS,
        ErrorClass::Runtime => ExitCode::from(1),
        ErrorClass::Config => ExitCode::from(2),
    }
}

fn main() -> ExitCode {
    enable_tracing();
    let cli = Cli::parse();

    let result = match (&cli.config, &cli.eval) {
        (Some(config), _) => run_kernel_search(&cli.mps, config),
        (None, Some(solution)) => evaluate_solution(&cli.mps, solution),
        (None, None) => Err(KsError::Config("one of --config or --eval is required".into())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("{err}");
            exit_code(&err)
        }
    }
}
