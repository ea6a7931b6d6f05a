// afadmin - administration CLI for airfocus teams
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://app.airfocus.com";

const USERGROUP_PREFIX: &str = "usergroup_";

/// Contents of one `key = value` config file.
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub verify_ssl: Option<bool>,
    /// User-group names the public API does not expose, keyed by group id.
    pub usergroup_names: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a writable config directory for the current user")]
    MissingConfigDir,
    #[error("API key is required; set it with `afadmin configure --apikey <key>`")]
    MissingApiKey,
    #[error("invalid boolean `{value}` for `{key}` on line {line}")]
    InvalidBool {
        key: String,
        value: String,
        line: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub api_key: String,
    pub base_url: String,
    pub verify_tls: bool,
    pub usergroup_names: BTreeMap<String, String>,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join("afadmin.conf")),
        Scope::User => {
            if let Ok(custom) = env::var("AFADMIN_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("afadmin").join("config"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn load_scope(scope: Scope, cwd: &Path) -> Result<Config> {
    Ok(read_if_exists(&config_path(scope, cwd)?)?.unwrap_or_default())
}

pub fn save(scope: Scope, config: &Config, cwd: &Path) -> Result<PathBuf> {
    let path = config_path(scope, cwd)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    fs::write(&path, config.to_string()).with_context(|| format!("writing {:?}", path))?;
    Ok(path)
}

pub fn resolve(
    cwd: &Path,
    api_key_override: Option<String>,
    base_url_override: Option<String>,
    no_verify_ssl: bool,
) -> Result<EffectiveConfig> {
    let mut merged = load(cwd)?;

    if let Some(key) = api_key_override {
        merged.api_key = Some(key);
    }
    if let Some(url) = base_url_override {
        merged.base_url = Some(url);
    }

    let api_key = merged
        .api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(ConfigError::MissingApiKey)?;

    let base_url = merged
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    Ok(EffectiveConfig {
        api_key,
        base_url,
        verify_tls: !no_verify_ssl && merged.verify_ssl.unwrap_or(true),
        usergroup_names: merged.usergroup_names,
    })
}

/// Parses `key = value` lines; `#` comments and blank lines are skipped.
pub fn parse(contents: &str) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().to_string();

        match key {
            "apikey" => config.api_key = Some(value),
            "base_url" | "baseurl" => config.base_url = Some(value),
            "verify_ssl" => config.verify_ssl = Some(parse_bool(key, &value, idx + 1)?),
            _ => {
                if let Some(group_id) = key.strip_prefix(USERGROUP_PREFIX) {
                    config
                        .usergroup_names
                        .insert(group_id.to_string(), value);
                } else {
                    tracing::debug!(key, line = idx + 1, "ignoring unknown config key");
                }
            }
        }
    }

    Ok(config)
}

/// The `key = value` file form written by `save`.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(key) = &self.api_key {
            writeln!(f, "apikey = {key}")?;
        }
        if let Some(url) = &self.base_url {
            writeln!(f, "base_url = {url}")?;
        }
        if let Some(verify) = self.verify_ssl {
            writeln!(f, "verify_ssl = {verify}")?;
        }
        if !self.usergroup_names.is_empty() {
            f.write_str("\n# user groups not exposed by the API\n")?;
            for (id, name) in &self.usergroup_names {
                writeln!(f, "{USERGROUP_PREFIX}{id} = {name}")?;
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str, line: usize) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
            line,
        }),
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = parse(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    let mut usergroup_names = user.usergroup_names;
    usergroup_names.extend(local.usergroup_names);
    Config {
        api_key: local.api_key.or(user.api_key),
        base_url: local.base_url.or(user.base_url),
        verify_ssl: local.verify_ssl.or(user.verify_ssl),
        usergroup_names,
    }
}
