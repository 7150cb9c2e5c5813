//! YAML configuration of a kernel search run.
//!
//! The configuration is loaded and validated once, then handed to the engine by reference and
//! never mutated again: the engine keeps its own copy of the time budget.

use crate::error::{KsError, KsResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Free form numeric parameters of a pluggable algorithm, e.g. `BUCKET_CONF: {size: 10}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, f64>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Reads a parameter that has to be a non negative integer.
    pub fn get_usize(&self, name: &str) -> KsResult<Option<usize>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(&v) if v >= 0.0 && v.fract() == 0.0 => Ok(Some(v as usize)),
            Some(v) => Err(KsError::Config(format!(
                "{name} should be a non negative integer found {v} instead"
            ))),
        }
    }
}

/// An output file setting: either an explicit name or a flag asking to derive one from the
/// instance name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OutputFile {
    Flag(bool),
    Name(String),
}

impl Default for OutputFile {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl OutputFile {
    /// true if a file will be written, whatever its final name
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Name(name) => !name.is_empty(),
        }
    }
}

/// How the feature kernel turns the sampled sub-model sizes into a kernel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KernelSizePolicy {
    MaxInfeasible,
    MinInfeasible,
    MaxFeasible,
    MinFeasible,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeatureKernelConfig {
    #[serde(rename = "COUNT")]
    pub count: usize,
    #[serde(rename = "MIN_TIME")]
    pub min_time: f64,
    #[serde(rename = "MAX_TIME")]
    pub max_time: f64,
    #[serde(rename = "POLICY")]
    pub policy: KernelSizePolicy,
    #[serde(rename = "CACHE_FILE")]
    pub cache_file: Option<String>,
    #[serde(rename = "LOG_FILE")]
    pub log_file: Option<String>,
    #[serde(rename = "INITIAL_SIZE")]
    pub initial_size: f64,
    #[serde(rename = "SEED")]
    pub seed: u64,
    #[serde(rename = "TREES")]
    pub trees: usize,
}

impl Default for FeatureKernelConfig {
    fn default() -> Self {
        Self {
            count: 10,
            min_time: 1.0,
            max_time: 10.0,
            policy: KernelSizePolicy::MinFeasible,
            cache_file: None,
            log_file: None,
            initial_size: 0.5,
            seed: 0,
            trees: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "GLOBAL_TIME_LIMIT")]
    pub global_time_limit: Option<f64>,
    #[serde(rename = "TIME_LIMIT")]
    pub time_limit: Option<f64>,
    #[serde(rename = "NUM_THREAD")]
    pub num_thread: Option<i64>,
    #[serde(rename = "MIP_GAP")]
    pub mip_gap: f64,
    #[serde(rename = "KERNEL")]
    pub kernel: String,
    #[serde(rename = "KERNEL_CONF")]
    pub kernel_conf: Params,
    #[serde(rename = "BUCKET")]
    pub bucket: String,
    #[serde(rename = "BUCKET_CONF")]
    pub bucket_conf: Params,
    #[serde(rename = "KERNEL_SORTER")]
    pub kernel_sorter: String,
    #[serde(rename = "KERNEL_SORTER_CONF")]
    pub kernel_sorter_conf: Params,
    #[serde(rename = "BUCKET_SORTER")]
    pub bucket_sorter: String,
    #[serde(rename = "BUCKET_SORTER_CONF")]
    pub bucket_sorter_conf: Params,
    #[serde(rename = "PRELOAD")]
    pub preload: bool,
    #[serde(rename = "ITERATIONS")]
    pub iterations: usize,
    #[serde(rename = "PRESOLVE")]
    pub presolve: bool,
    #[serde(rename = "LOG")]
    pub log: bool,
    #[serde(rename = "SEED")]
    pub seed: u64,
    #[serde(rename = "DEBUG")]
    pub debug: OutputFile,
    #[serde(rename = "SOLUTION_FILE")]
    pub solution_file: OutputFile,
    #[serde(rename = "INSTANCE")]
    pub instance: String,
    #[serde(rename = "FEATURE_KERNEL")]
    pub feature_kernel: Option<FeatureKernelConfig>,
    #[serde(rename = "VARIABLE_RANKING")]
    pub variable_ranking: bool,
    #[serde(rename = "WORST-SOL")]
    pub worst_sol: bool,
    #[serde(rename = "REMOVE-UNSET")]
    pub remove_unset: bool,
    #[serde(rename = "KERNEL-GROWTH")]
    pub kernel_growth: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global_time_limit: None,
            time_limit: None,
            num_thread: None,
            mip_gap: 0.0,
            kernel: "base".to_string(),
            kernel_conf: Params::new(),
            bucket: "fixed".to_string(),
            bucket_conf: Params::new().with("size", 10.0),
            kernel_sorter: "base_kernel_sort".to_string(),
            kernel_sorter_conf: Params::new(),
            bucket_sorter: "base_bucket_sort".to_string(),
            bucket_sorter_conf: Params::new(),
            preload: true,
            iterations: 1,
            presolve: false,
            log: false,
            seed: 0,
            debug: OutputFile::Name(String::new()),
            solution_file: OutputFile::Flag(false),
            instance: String::new(),
            feature_kernel: None,
            variable_ranking: false,
            worst_sol: false,
            remove_unset: false,
            kernel_growth: false,
        }
    }
}

/// Output file names once the instance name is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputFiles {
    pub debug: Option<String>,
    pub solution: Option<String>,
}

/// Validates the values that serde cannot check by type alone.
pub fn check_config(conf: &Config) -> KsResult<()> {
    if conf.time_limit.is_some() && conf.global_time_limit.is_some() {
        return Err(KsError::Config(
            "'TIME_LIMIT' and 'GLOBAL_TIME_LIMIT' cannot be set at the same time: only one of them is allowed in a given configuration".to_string(),
        ));
    }

    for (key, limit) in [
        ("TIME_LIMIT", conf.time_limit),
        ("GLOBAL_TIME_LIMIT", conf.global_time_limit),
    ] {
        if matches!(limit, Some(t) if t <= 0.0) {
            return Err(KsError::Config(format!("{key} should be positive")));
        }
    }

    if conf.mip_gap < 0.0 {
        return Err(KsError::Config("MIP_GAP should not be negative".to_string()));
    }

    if let Some(fk) = &conf.feature_kernel {
        if fk.count == 0 {
            return Err(KsError::Config(
                "FEATURE_KERNEL.COUNT should be positive".to_string(),
            ));
        }
        if fk.min_time <= 0.0 || fk.max_time < fk.min_time {
            return Err(KsError::Config(
                "FEATURE_KERNEL requires 0 < MIN_TIME <= MAX_TIME".to_string(),
            ));
        }
        if fk.initial_size <= 0.0 || fk.initial_size > 1.0 {
            return Err(KsError::Config(
                "FEATURE_KERNEL.INITIAL_SIZE should be in (0, 1]".to_string(),
            ));
        }
    }

    Ok(())
}

/// Parses and validates a configuration from its YAML text.
pub fn parse_config(text: &str) -> KsResult<Config> {
    if text.trim().is_empty() {
        return Ok(Config::default());
    }

    let mut conf: Config = serde_yaml::from_str(text)?;

    // the historical "-1" means unset
    conf.time_limit = conf.time_limit.filter(|t| *t >= 0.0);
    conf.global_time_limit = conf.global_time_limit.filter(|t| *t >= 0.0);
    conf.num_thread = conf.num_thread.filter(|t| *t >= 0);

    check_config(&conf)?;
    Ok(conf)
}

/// Loads the configuration from the given file, or the defaults if no file is given.
pub fn load_config(file_name: Option<&Path>) -> KsResult<Config> {
    let Some(file_name) = file_name else {
        return Ok(Config::default());
    };

    let text = std::fs::read_to_string(file_name).map_err(|e| KsError::io(file_name, e))?;
    parse_config(&text)
}

/// Strips the directory and the extension from an instance path.
pub fn get_base_name(instance: &str) -> String {
    Path::new(instance)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn resolve_output(
    key: &str,
    value: &OutputFile,
    instance: &str,
    suffix: &str,
) -> KsResult<Option<String>> {
    match value {
        OutputFile::Name(name) if name.is_empty() => Ok(None),
        OutputFile::Name(name) => Ok(Some(name.clone())),
        OutputFile::Flag(false) => Ok(None),
        OutputFile::Flag(true) => {
            if instance.is_empty() {
                return Err(KsError::Config(format!(
                    "cannot set {key} file name without an instance name in config file"
                )));
            }
            Ok(Some(format!("{}{suffix}", get_base_name(instance))))
        }
    }
}

/// Derives the debug and solution file names, `instance` overrides the `INSTANCE` key when
/// it is not empty.
pub fn check_file_parameters(conf: &Config, instance: &str) -> KsResult<OutputFiles> {
    let instance = if instance.is_empty() {
        conf.instance.as_str()
    } else {
        instance
    };

    Ok(OutputFiles {
        debug: resolve_output("debug", &conf.debug, instance, "-run.csv")?,
        solution: resolve_output("solution", &conf.solution_file, instance, "-sol.sol")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let conf = Config::default();
        assert!(check_config(&conf).is_ok());
        assert_eq!(conf.bucket_conf.get_usize("size").unwrap(), Some(10));
        assert_eq!(parse_config("").unwrap(), conf);
    }

    #[test]
    fn test_correct_config() {
        let conf = parse_config(
            "TIME_LIMIT: 1245\nNUM_THREAD: 4\nMIP_GAP: 1.0e-10\nBUCKET: Some name\nWORST-SOL: true\n",
        )
        .unwrap();

        assert_eq!(conf.time_limit, Some(1245.0));
        assert_eq!(conf.num_thread, Some(4));
        assert_eq!(conf.bucket, "Some name");
        assert!(conf.worst_sol);
        assert!(conf.preload);
    }

    #[test]
    fn test_broken_config() {
        let result = parse_config("TIME_LIMIT: 1245\nBUCKET: [4.5]\n");
        assert!(matches!(result, Err(KsError::Yaml(_))));

        let result = parse_config("ITERATIONS: many\n");
        assert!(matches!(result, Err(KsError::Yaml(_))));

        let result = parse_config("PRELOAD: yes please\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_conflicting_time_limits() {
        let result = parse_config("TIME_LIMIT: 10\nGLOBAL_TIME_LIMIT: 20\n");
        assert!(matches!(result, Err(KsError::Config(_))));

        // -1 keeps its historical meaning of "unset"
        let conf = parse_config("TIME_LIMIT: -1\nGLOBAL_TIME_LIMIT: 20\n").unwrap();
        assert_eq!(conf.time_limit, None);
        assert_eq!(conf.global_time_limit, Some(20.0));
    }

    #[test]
    fn test_feature_kernel_section() {
        let conf = parse_config(
            "FEATURE_KERNEL:\n  COUNT: 25\n  MIN_TIME: 0.5\n  MAX_TIME: 4\n  POLICY: max-infeasible\n  LOG_FILE: trials.csv\n",
        )
        .unwrap();

        let fk = conf.feature_kernel.unwrap();
        assert_eq!(fk.count, 25);
        assert_eq!(fk.policy, KernelSizePolicy::MaxInfeasible);
        assert_eq!(fk.log_file.as_deref(), Some("trials.csv"));
        assert_eq!(fk.cache_file, None);

        let result = parse_config("FEATURE_KERNEL:\n  MIN_TIME: 5\n  MAX_TIME: 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_params() {
        let conf = parse_config("BUCKET_CONF:\n  count: 4\nKERNEL_CONF:\n  percentage: 0.25\n")
            .unwrap();
        assert_eq!(conf.bucket_conf.get_usize("count").unwrap(), Some(4));
        assert_eq!(conf.bucket_conf.get_usize("size").unwrap(), None);
        assert_eq!(conf.kernel_conf.get_f64("percentage"), Some(0.25));

        let params = Params::new().with("count", 2.5);
        assert!(params.get_usize("count").is_err());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ITERATIONS: 3\nBUCKET: decrease\nBUCKET_CONF: {{count: 3}}").unwrap();

        let conf = load_config(Some(file.path())).unwrap();
        assert_eq!(conf.iterations, 3);
        assert_eq!(conf.bucket, "decrease");

        assert_eq!(load_config(None).unwrap(), Config::default());
    }

    #[test]
    fn test_get_base_name() {
        assert_eq!(get_base_name("instance.mps"), "instance");
        assert_eq!(get_base_name("instance"), "instance");
        assert_eq!(get_base_name("instance-dir/instance.mps"), "instance");
        assert_eq!(get_base_name("instance-dir/instance"), "instance");
    }

    #[test]
    fn test_file_parameters() {
        let mut conf = Config::default();
        conf.debug = OutputFile::Name("test-run.csv".to_string());
        conf.solution_file = OutputFile::Name("test-sol.sol".to_string());
        let files = check_file_parameters(&conf, "").unwrap();
        assert_eq!(files.debug.as_deref(), Some("test-run.csv"));
        assert_eq!(files.solution.as_deref(), Some("test-sol.sol"));

        conf.debug = OutputFile::Flag(true);
        conf.solution_file = OutputFile::Flag(true);
        let files = check_file_parameters(&conf, "name.mps").unwrap();
        assert_eq!(files.debug.as_deref(), Some("name-run.csv"));
        assert_eq!(files.solution.as_deref(), Some("name-sol.sol"));

        conf.solution_file = OutputFile::Flag(false);
        let files = check_file_parameters(&conf, "name.mps").unwrap();
        assert_eq!(files.solution, None);
    }

    #[test]
    fn test_file_parameters_without_instance() {
        let mut conf = Config::default();
        conf.solution_file = OutputFile::Flag(true);
        let err = check_file_parameters(&conf, "").unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot set solution file name without an instance name"));

        let result = parse_config("SOLUTION_FILE: 56\n");
        assert!(result.is_err());
    }
}
