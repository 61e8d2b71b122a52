use anyhow::{ensure, Context, Result};
use eigenface_core::SolverConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration: defaults, then an optional TOML file named by
/// `EIGENFACE_CONFIG`, then `EIGENFACE_*` environment variables. Command-line
/// flags are applied on top by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the trained model (manifest.json + arrays.bin).
    pub model_dir: PathBuf,
    /// Dataset root: one sub-directory of images per person.
    pub dataset_dir: PathBuf,
    /// Face images are resized to `image_width × image_height`.
    pub image_width: u32,
    pub image_height: u32,
    /// Number of eigenfaces to keep.
    pub components: usize,
    /// Maximum eigenspace distance accepted as a match.
    pub threshold: f64,
    /// Number of ranked candidates to report.
    pub top_n: usize,
    pub solver: SolverConfig,
    /// Fail training on any eigensolver warning.
    pub strict: bool,
}

/// Optional keys of the TOML config file. Solver knobs live in a `[solver]`
/// table whose missing keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    dataset_dir: Option<PathBuf>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    components: Option<usize>,
    threshold: Option<f64>,
    top_n: Option<usize>,
    solver: Option<SolverConfig>,
    strict: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: default_data_dir().join("model"),
            dataset_dir: PathBuf::from("dataset"),
            image_width: 100,
            image_height: 100,
            components: 10,
            threshold: 15.0,
            top_n: 3,
            solver: SolverConfig::default(),
            strict: false,
        }
    }
}

impl Config {
    /// Load `EIGENFACE_CONFIG` (if set) and environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("EIGENFACE_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make training or recognition meaningless.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.image_width > 0 && self.image_height > 0,
            "image size {}x{} has a zero dimension",
            self.image_width,
            self.image_height
        );
        ensure!(self.components >= 1, "components must be at least 1");
        ensure!(
            self.threshold.is_finite() && self.threshold >= 0.0,
            "threshold must be a non-negative number, got {}",
            self.threshold
        );
        ensure!(
            self.solver.tolerance.is_finite() && self.solver.tolerance > 0.0,
            "solver tolerance must be a positive number, got {}",
            self.solver.tolerance
        );
        ensure!(
            self.solver.max_iterations >= 1,
            "solver max_iterations must be at least 1"
        );
        ensure!(
            self.solver.rank_tolerance.is_finite() && self.solver.rank_tolerance >= 0.0,
            "solver rank_tolerance must be a non-negative number, got {}",
            self.solver.rank_tolerance
        );
        Ok(())
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        self.apply_toml(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.dataset_dir {
            self.dataset_dir = v;
        }
        if let Some(v) = file.image_width {
            self.image_width = v;
        }
        if let Some(v) = file.image_height {
            self.image_height = v;
        }
        if let Some(v) = file.components {
            self.components = v;
        }
        if let Some(v) = file.threshold {
            self.threshold = v;
        }
        if let Some(v) = file.top_n {
            self.top_n = v;
        }
        if let Some(v) = file.solver {
            self.solver = v;
        }
        if let Some(v) = file.strict {
            self.strict = v;
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("EIGENFACE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("EIGENFACE_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(v);
        }
        self.image_width = env_parse("EIGENFACE_IMAGE_WIDTH", self.image_width);
        self.image_height = env_parse("EIGENFACE_IMAGE_HEIGHT", self.image_height);
        self.components = env_parse("EIGENFACE_COMPONENTS", self.components);
        self.threshold = env_parse("EIGENFACE_THRESHOLD", self.threshold);
        self.top_n = env_parse("EIGENFACE_TOP_N", self.top_n);
        self.solver.tolerance = env_parse("EIGENFACE_SOLVER_TOLERANCE", self.solver.tolerance);
        self.solver.max_iterations =
            env_parse("EIGENFACE_SOLVER_MAX_ITERATIONS", self.solver.max_iterations);
        self.solver.rank_tolerance =
            env_parse("EIGENFACE_SOLVER_RANK_TOLERANCE", self.solver.rank_tolerance);
        self.strict = std::env::var("EIGENFACE_STRICT")
            .map(|v| v != "0")
            .unwrap_or(self.strict);
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("eigenface")
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_overrides_defaults() {
        let mut config = Config::default();
        config
            .apply_toml(
                r#"
                model_dir = "/srv/faces/model"
                components = 25
                threshold = 12.5

                [solver]
                max_iterations = 5000
                rank_tolerance = 1e-8
                "#,
            )
            .unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/srv/faces/model"));
        assert_eq!(config.components, 25);
        assert_eq!(config.threshold, 12.5);
        assert_eq!(config.solver.max_iterations, 5000);
        assert_eq!(config.solver.rank_tolerance, 1e-8);
        assert_eq!(config.solver.tolerance, SolverConfig::default().tolerance);
        assert_eq!(config.top_n, 3);
    }

    #[test]
    fn test_solver_table_rejects_unknown_keys() {
        let mut config = Config::default();
        assert!(config.apply_toml("[solver]\nmax_iter = 5").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_solver_knobs() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.apply_toml("[solver]\nmax_iterations = 0").unwrap();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.solver.tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.solver.tolerance = -1e-3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.components = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_rejects_unknown_keys() {
        let mut config = Config::default();
        assert!(config.apply_toml("treshold = 3.0").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!((config.image_width, config.image_height), (100, 100));
        assert_eq!(config.threshold, 15.0);
        assert!(!config.strict);
    }
}
