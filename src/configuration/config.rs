#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::BackendName;
use crate::domain::models::ProtocolName;
use crate::domain::models::UnknownPartPolicy;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    AgentURL,
    Backend,
    BackendHealthCheckTimeout,
    ConfigFile,
    FallbackSurface,
    GeminiToken,
    GeminiURL,
    Host,
    Model,
    Port,
    Protocol,
    Temperature,
    UnknownParts,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        let default_backend = BackendName::Gemini.to_string();
        let default_protocol = ProtocolName::A2ui.to_string();
        let default_unknown_parts = UnknownPartPolicy::Reject.to_string();

        let config_path = dirs::config_dir()
            .unwrap_or_else(|| return path::PathBuf::from("."))
            .join("genui/config.toml")
            .to_string_lossy()
            .to_string();

        let res = match key {
            ConfigKey::Backend => &default_backend,
            ConfigKey::BackendHealthCheckTimeout => "1000",
            ConfigKey::FallbackSurface => "true",
            ConfigKey::GeminiToken => "",
            ConfigKey::GeminiURL => "https://generativelanguage.googleapis.com",
            ConfigKey::Host => "127.0.0.1",
            ConfigKey::Model => "gemini-2.5-pro",
            ConfigKey::Port => "10002",
            ConfigKey::Protocol => &default_protocol,
            ConfigKey::Temperature => "0.3",
            ConfigKey::UnknownParts => &default_unknown_parts,

            // Special
            ConfigKey::AgentURL => "",
            ConfigKey::ConfigFile => &config_path,
        };

        return res.to_string();
    }

    /// Public URL advertised in the agent card. Derived from the port unless
    /// set explicitly.
    pub fn agent_url() -> String {
        let agent_url = Config::get(ConfigKey::AgentURL);
        if !agent_url.is_empty() {
            return agent_url;
        }

        return format!("http://localhost:{}/a2a", Config::get(ConfigKey::Port));
    }

    fn possible_values(cmd: &Command, key: ConfigKey) -> Vec<String> {
        let key_str = key.to_string();
        let arg = match cmd
            .get_arguments()
            .find(|e| return e.get_long() == Some(key_str.as_str()))
        {
            Some(arg) => arg,
            None => return vec![],
        };

        return arg
            .get_possible_values()
            .iter()
            .map(|e| return e.get_name().to_string())
            .collect::<Vec<String>>();
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Some(arg_config_file) =
                matches.get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                let val = match doc.get(&key.to_string()) {
                    Some(val) => val,
                    None => continue,
                };

                // Use clap value parsers to do validation.
                let possible_values = Config::possible_values(&cmd, key);
                let val_str = if let Some(val_int) = val.as_integer() {
                    val_int.to_string()
                } else if let Some(val_float) = val.as_float() {
                    val_float.to_string()
                } else if let Some(val_bool) = val.as_bool() {
                    val_bool.to_string()
                } else if let Some(val_str) = val.as_str() {
                    val_str.to_string()
                } else {
                    bail!(format!("config.toml has an unsupported value for key '{key}'"));
                };

                if val_str.is_empty() {
                    continue;
                }
                if !possible_values.is_empty() && !possible_values.contains(&val_str) {
                    bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                }
                Config::set(key, &val_str);
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        tracing::debug!(
            host = Config::get(ConfigKey::Host),
            port = Config::get(ConfigKey::Port),
            backend = Config::get(ConfigKey::Backend),
            model = Config::get(ConfigKey::Model),
            protocol = Config::get(ConfigKey::Protocol),
            unknown_parts = Config::get(ConfigKey::UnknownParts),
            fallback_surface = Config::get(ConfigKey::FallbackSurface),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let key_str = key.to_string();
                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key_str.as_str()))?;

                let mut description = arg
                    .get_help()
                    .map(|e| return e.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                let possible_values = Config::possible_values(&cmd, key);
                if !possible_values.is_empty() {
                    description = format!(
                        "{description} [possible values: {}]",
                        possible_values.join(", ")
                    );
                }

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok()
                    || val.parse::<f64>().is_ok()
                    || val.parse::<bool>().is_ok()
                {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
