//! Configuration file management for spotter.
//!
//! Provides a TOML-based config file at `~/.config/spotter/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use spotter_core::orchestrator::OrchestratorConfig;
use spotter_core::service::ServiceConfig;
use spotter_evidence::RerankConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub corpus: CorpusSection,
    pub model: ModelSection,
    #[serde(default)]
    pub limits: LimitsSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CorpusSection {
    /// Path to the science chunk file (JSON array of chunks).
    #[serde(default)]
    pub science: Option<String>,
    /// Path to the plan-template chunk file.
    #[serde(default)]
    pub plans: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSection {
    /// Command that reads a prompt on stdin and writes a completion to stdout.
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Context chunks handed to generation.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_max_repairs")]
    pub max_repairs: u32,
    #[serde(default = "default_grounding_threshold")]
    pub grounding_threshold: f64,
    /// Wall-clock budget for one request end to end.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            max_repairs: default_max_repairs(),
            grounding_threshold: default_grounding_threshold(),
            deadline_secs: default_deadline_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_model_timeout_secs() -> u64 {
    120
}

fn default_top_n() -> usize {
    6
}

fn default_max_repairs() -> u32 {
    2
}

fn default_grounding_threshold() -> f64 {
    0.95
}

fn default_deadline_secs() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    4
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the spotter config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/spotter` or `~/.config/spotter`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("spotter");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("spotter")
}

/// Return the path to the spotter config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Return the default path to the bounds file.
pub fn bounds_path() -> PathBuf {
    config_dir().join("bounds.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. A missing file is `None`; a file that
/// exists but cannot be read or parsed is an error, never silently ignored.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file at {}", path.display()));
        }
    };
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // Set permissions to 0600 (owner read/write only) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Starter bounds
// -----------------------------------------------------------------------

/// Bounds file written by `spotter init`. Reviewers tune it per deployment.
pub const STARTER_BOUNDS: &str = r#"# Safety bounds for generated plans. Hard caps reject a plan; volume
# ranges only flag it. A missing table leaves that dimension unconstrained.

[volume.strength]
quads = { min = 3, max = 12 }
hamstrings = { min = 3, max = 12 }
chest = { min = 3, max = 14 }
back = { min = 3, max = 14 }
shoulders = { min = 2, max = 12 }

[volume.hypertrophy]
quads = { min = 6, max = 20 }
hamstrings = { min = 6, max = 18 }
chest = { min = 8, max = 22 }
back = { min = 8, max = 22 }
shoulders = { min = 6, max = 20 }

[intensity.max_pct_1rm]
novice = 85.0
intermediate = 92.5
advanced = 100.0

[frequency]
high_intensity_pct = 85.0
default_min_rest_days = 1

[nutrition]
protein_g_per_kg = { min = 1.6, max = 2.2 }
fat_g_per_kg = { min = 0.6, max = 1.2 }
carb_g_per_kg = { min = 3.0, max = 7.0 }
kcal_tolerance_pct = 10.0

[contraindications.shoulder_impingement]
disallowed = ["overhead press", "upright row"]
substitutes = ["landmine press", "incline press"]

[contraindications.low_back_pain]
disallowed = ["deficit deadlift", "good morning"]
substitutes = ["trap bar deadlift", "hip thrust"]
"#;

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct SpotterConfig {
    pub science_path: Option<PathBuf>,
    pub plans_path: Option<PathBuf>,
    pub model_program: String,
    pub model_args: Vec<String>,
    pub model_timeout: Duration,
    pub service: ServiceConfig,
}

impl SpotterConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Model command: `cli_model` > `SPOTTER_MODEL` env > `config_file.model.program` > error
    /// - Corpus paths: `SPOTTER_SCIENCE_CORPUS` / `SPOTTER_PLANS_CORPUS` env > config file > none
    /// - Limits: config file > defaults
    ///
    /// A config file that exists but does not parse is an error; only a
    /// missing file falls through to env vars and defaults.
    pub fn resolve(cli_model: Option<&str>) -> Result<Self> {
        let file_config = load_config()?;

        // Model command resolution.
        let (model_program, model_args, timeout_secs) = if let Some(program) = cli_model {
            (program.to_string(), vec![], default_model_timeout_secs())
        } else if let Ok(program) = std::env::var("SPOTTER_MODEL") {
            (program, vec![], default_model_timeout_secs())
        } else if let Some(ref cfg) = file_config {
            (
                cfg.model.program.clone(),
                cfg.model.args.clone(),
                cfg.model.timeout_secs,
            )
        } else {
            bail!(
                "model command not configured; set SPOTTER_MODEL or run `spotter init` to create a config file"
            );
        };

        // Corpus path resolution.
        let science_path = std::env::var("SPOTTER_SCIENCE_CORPUS")
            .ok()
            .or_else(|| file_config.as_ref().and_then(|c| c.corpus.science.clone()))
            .map(PathBuf::from);
        let plans_path = std::env::var("SPOTTER_PLANS_CORPUS")
            .ok()
            .or_else(|| file_config.as_ref().and_then(|c| c.corpus.plans.clone()))
            .map(PathBuf::from);

        // Limits into the service config.
        let limits = file_config
            .map(|c| c.limits)
            .unwrap_or_default();
        let service = ServiceConfig {
            rerank: RerankConfig {
                top_n: limits.top_n,
                ..RerankConfig::default()
            },
            orchestrator: OrchestratorConfig {
                max_repairs: limits.max_repairs,
                grounding_threshold: limits.grounding_threshold,
                ..OrchestratorConfig::default()
            },
            max_concurrent: limits.max_concurrent,
            deadline: Duration::from_secs(limits.deadline_secs),
            ..ServiceConfig::default()
        };

        Ok(Self {
            science_path,
            plans_path,
            model_program,
            model_args,
            model_timeout: Duration::from_secs(timeout_secs),
            service,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    #[test]
    fn starter_bounds_parse_cleanly() {
        let bounds = spotter_core::bounds::BoundsConfig::from_toml_str(STARTER_BOUNDS).unwrap();
        assert!(!bounds.volume.is_empty());
        assert_eq!(bounds.intensity.max_pct_1rm.len(), 3);
        assert!(bounds.nutrition.protein_g_per_kg.is_some());
        assert_eq!(bounds.contraindications.len(), 2);
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("spotter");
        let path = dir.join("config.toml");

        // Write directly so the test does not depend on the real home dir.
        let original = ConfigFile {
            corpus: CorpusSection {
                science: Some("/data/science.json".to_string()),
                plans: None,
            },
            model: ModelSection {
                program: "llama-run".to_string(),
                args: vec!["--quiet".to_string()],
                timeout_secs: 90,
            },
            limits: LimitsSection::default(),
        };

        std::fs::create_dir_all(&dir).unwrap();
        let contents = toml::to_string_pretty(&original).unwrap();
        std::fs::write(&path, &contents).unwrap();

        let loaded_contents = std::fs::read_to_string(&path).unwrap();
        let loaded: ConfigFile = toml::from_str(&loaded_contents).unwrap();

        assert_eq!(loaded.corpus.science, original.corpus.science);
        assert_eq!(loaded.model.program, original.model.program);
        assert_eq!(loaded.model.args, original.model.args);
        assert_eq!(loaded.model.timeout_secs, 90);
    }

    #[test]
    fn limits_default_when_section_missing() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            [model]
            program = "llama-run"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.limits.top_n, 6);
        assert_eq!(cfg.limits.max_repairs, 2);
        assert_eq!(cfg.limits.grounding_threshold, 0.95);
        assert_eq!(cfg.model.timeout_secs, 120);
        assert!(cfg.corpus.science.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();

        // Test the permission-setting logic directly on a temp file.
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("test.toml");
        std::fs::write(&file, "test").unwrap();

        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&file, perms).unwrap();

        let meta = std::fs::metadata(&file).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();

        // Even if the env var is set, the CLI flag wins.
        unsafe { std::env::set_var("SPOTTER_MODEL", "env-model") };

        let config = SpotterConfig::resolve(Some("cli-model")).unwrap();
        assert_eq!(config.model_program, "cli-model");

        unsafe { std::env::remove_var("SPOTTER_MODEL") };
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();

        unsafe { std::env::set_var("SPOTTER_MODEL", "env-model") };
        unsafe { std::env::set_var("SPOTTER_SCIENCE_CORPUS", "/env/science.json") };

        let config = SpotterConfig::resolve(None).unwrap();
        assert_eq!(config.model_program, "env-model");
        assert_eq!(
            config.science_path.as_deref(),
            Some(std::path::Path::new("/env/science.json"))
        );

        unsafe { std::env::remove_var("SPOTTER_MODEL") };
        unsafe { std::env::remove_var("SPOTTER_SCIENCE_CORPUS") };
    }

    #[test]
    fn resolve_errors_when_no_model_configured() {
        let _lock = lock_env();

        unsafe { std::env::remove_var("SPOTTER_MODEL") };
        // Point HOME and XDG_CONFIG_HOME at a temp dir so load_config() cannot
        // find a real config file.
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_home = std::env::var("HOME").ok();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("HOME", tmp.path()) };
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };

        let result = SpotterConfig::resolve(None);

        // Restore env before asserting, to avoid poisoning the mutex on failure.
        match orig_home {
            Some(h) => unsafe { std::env::set_var("HOME", h) },
            None => unsafe { std::env::remove_var("HOME") },
        }
        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        assert!(result.is_err(), "should error when no model configured");
        let msg = result.unwrap_err().to_string();
        assert!(
            msg.contains("model command not configured"),
            "unexpected error: {msg}"
        );
    }

    #[test]
    fn resolve_surfaces_a_broken_config_file() {
        let _lock = lock_env();

        // Point the config dir at a temp dir holding unparseable TOML. A
        // broken file must fail loudly, not fall through to defaults.
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("spotter");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "not toml [").unwrap();

        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let result = SpotterConfig::resolve(Some("cli-model"));

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let msg = result.unwrap_err().to_string();
        assert!(
            msg.contains("failed to parse config file"),
            "unexpected error: {msg}"
        );
    }

    #[test]
    fn resolve_limits_feed_the_service_config() {
        let _lock = lock_env();

        unsafe { std::env::remove_var("SPOTTER_SCIENCE_CORPUS") };
        unsafe { std::env::remove_var("SPOTTER_PLANS_CORPUS") };
        // Point the config dir at an empty temp dir so the defaults apply.
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let config = SpotterConfig::resolve(Some("cli-model"));

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        let config = config.unwrap();
        assert_eq!(config.service.rerank.top_n, 6);
        assert_eq!(config.service.orchestrator.max_repairs, 2);
        assert_eq!(config.service.max_concurrent, 4);
        assert_eq!(config.model_timeout, Duration::from_secs(120));
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("spotter/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }

    #[test]
    fn bounds_path_sits_next_to_the_config() {
        let path = bounds_path();
        assert!(
            path.ends_with("spotter/bounds.toml"),
            "unexpected bounds path: {}",
            path.display()
        );
    }
}
