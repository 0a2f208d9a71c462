use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use permitgate::config::Config;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::output::LogFormat;

const LOCAL_ENV_PATH: &str = "config/local.env";

/// What happened while reading `config/local.env`. The file is read before
/// the tracing subscriber exists, so the outcome is logged afterwards.
#[derive(Debug)]
pub enum LocalEnv {
    Absent,
    Loaded {
        path: PathBuf,
        applied: usize,
        skipped_lines: Vec<usize>,
    },
    Unreadable {
        path: PathBuf,
        err: io::Error,
    },
}

impl LocalEnv {
    pub fn log(&self) {
        match self {
            LocalEnv::Absent => {}
            LocalEnv::Loaded {
                path,
                applied,
                skipped_lines,
            } => {
                for line in skipped_lines {
                    warn!(path = %path.display(), line, "invalid local.env entry; skipped");
                }
                info!(path = %path.display(), applied, "Loaded environment overrides from local.env");
            }
            LocalEnv::Unreadable { path, err } => {
                warn!(path = %path.display(), ?err, "failed to read local.env overrides");
            }
        }
    }
}

pub fn load_local_env_overrides() -> LocalEnv {
    apply_local_env(Path::new(LOCAL_ENV_PATH))
}

fn apply_local_env(path: &Path) -> LocalEnv {
    if !path.exists() {
        return LocalEnv::Absent;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            let parsed = parse_env_lines(&contents);
            let mut applied = 0;
            for (key, value) in parsed.entries {
                if env::var(&key).is_ok() {
                    continue;
                }
                env::set_var(key, value);
                applied += 1;
            }
            LocalEnv::Loaded {
                path: path.to_path_buf(),
                applied,
                skipped_lines: parsed.skipped_lines,
            }
        }
        Err(err) => LocalEnv::Unreadable {
            path: path.to_path_buf(),
            err,
        },
    }
}

#[derive(Debug, Default, PartialEq)]
struct EnvLines {
    entries: Vec<(String, String)>,
    skipped_lines: Vec<usize>,
}

fn parse_env_lines(contents: &str) -> EnvLines {
    let mut parsed = EnvLines::default();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            parsed.skipped_lines.push(idx + 1);
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            parsed.skipped_lines.push(idx + 1);
            continue;
        }
        parsed
            .entries
            .push((key.to_string(), unquote(value.trim())));
    }
    parsed
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].replace("\\\"", "\"")
    } else {
        value.to_string()
    }
}

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    match format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_thread_names(true),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_thread_names(true),
            )
            .try_init(),
    }
    .context("failed to install tracing subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

pub fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        return Ok(path.clone());
    }
    // Priority: ./config/config.yaml > ~/.config/permitgate/config.yaml
    let local_config = PathBuf::from("config/config.yaml");
    if local_config.exists() {
        return Ok(local_config);
    }
    let mut path = dirs::config_dir().context("Failed to get config directory")?;
    path.push("permitgate");
    path.push("config.yaml");
    Ok(path)
}

pub fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = resolve_config_path(config_path)?;

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config = Config::from_yaml(&content).context("Failed to parse config file")?;
        info!("Loaded configuration from: {}", config_path.display());
        config
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        Config::default()
    };
    config.apply_env_overrides();

    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}
