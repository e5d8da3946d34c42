use crate::cli;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Tool binary spec: a bare name for PATH lookup, or a path.
    pub tool_binary: String,
    /// Model file override; when `None` the model is looked up next to the tool.
    pub model_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SoundgradeConfigFile {
    tool_binary: Option<String>,
    model_file: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        return home.join(".soundgrade").join("config.toml");
    }
    PathBuf::from(".soundgrade").join("config.toml")
}

/// Resolves each setting from the first non-empty of: CLI flag, config file,
/// environment variable, platform default. Paths from the config file are
/// relative to the config directory; paths from the CLI or environment are
/// relative to the working directory.
pub fn load_settings(cli: &cli::Cli) -> Result<Settings> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let file_cfg = load_config_file(&config_path).with_context(|| {
        format!(
            "failed to read config file {}",
            config_path.to_string_lossy()
        )
    })?;

    let env_tool = std::env::var("SOUNDGRADE_TOOL").ok();
    let tool_binary = if let Some(spec) = non_empty(cli.tool.as_deref()) {
        resolve_executable_spec(spec, &cwd)
    } else if let Some(spec) = non_empty(file_cfg.tool_binary.as_deref()) {
        resolve_executable_spec(spec, &config_dir)
    } else if let Some(spec) = non_empty(env_tool.as_deref()) {
        resolve_executable_spec(spec, &cwd)
    } else {
        default_tool_binary().to_owned()
    };

    let env_model = std::env::var("SOUNDGRADE_MODEL").ok();
    let model_file = if let Some(p) = cli.model.clone() {
        Some(resolve_path(p, &cwd))
    } else if let Some(s) = non_empty(file_cfg.model_file.as_deref()) {
        Some(resolve_path(PathBuf::from(s), &config_dir))
    } else if let Some(s) = non_empty(env_model.as_deref()) {
        Some(resolve_path(PathBuf::from(s), &cwd))
    } else {
        None
    };

    Ok(Settings {
        tool_binary,
        model_file,
    })
}

fn load_config_file(path: &Path) -> Result<SoundgradeConfigFile> {
    if !path.exists() {
        return Ok(SoundgradeConfigFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    let cfg: SoundgradeConfigFile = toml::from_str(&content)?;
    Ok(cfg)
}

fn resolve_path(path: PathBuf, base_dir: &Path) -> PathBuf {
    let expanded = expand_tilde(path);
    if expanded.is_relative() {
        return base_dir.join(expanded);
    }
    expanded
}

fn resolve_executable_spec(spec: &str, base_dir: &Path) -> String {
    if looks_like_path(spec) {
        let resolved = resolve_path(PathBuf::from(spec), base_dir);
        return resolved.to_string_lossy().to_string();
    }
    spec.to_owned()
}

fn looks_like_path(value: &str) -> bool {
    value.contains('/')
        || value.contains('\\')
        || value.starts_with("./")
        || value.starts_with("../")
        || value.starts_with(".\\")
        || value.starts_with("..\\")
}

fn expand_tilde(path: PathBuf) -> PathBuf {
    let home = dirs::home_dir();
    let Some(home) = home else { return path };

    let mut components = path.components();
    let Some(first) = components.next() else {
        return path;
    };
    if first.as_os_str() != "~" {
        return path;
    }

    let mut out = home;
    out.extend(components);
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed)
}

#[cfg(windows)]
fn default_tool_binary() -> &'static str {
    "visqol.exe"
}

#[cfg(not(windows))]
fn default_tool_binary() -> &'static str {
    "visqol"
}
