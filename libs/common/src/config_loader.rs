//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`<SERVICE>_` prefix, `__` separates nested keys)
//! 2. Explicit config file passed on the command line
//! 3. `config/<service>.yaml` / `config/<service>.toml`
//! 4. Serialized `Default` of the target type

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loading errors
#[derive(Debug, Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError(err.to_string())
    }
}

/// Build the figment for `service_name` without extracting it
pub fn layered_figment<T>(service_name: &str, explicit_file: Option<&Path>) -> Result<Figment, ConfigError>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()))
        .merge(Yaml::file(format!("config/{}.yaml", service_name)))
        .merge(Toml::file(format!("config/{}.toml", service_name)));

    if let Some(path) = explicit_file {
        if !path.exists() {
            return Err(ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("Config file: {}", path.display());
        figment = merge_file(figment, path)?;
    }

    let prefix = format!("{}_", service_name.to_uppercase());
    debug!("Config env prefix: {}", prefix);
    Ok(figment.merge(Env::prefixed(&prefix).split("__")))
}

/// Load configuration for a service
pub fn load_config<T>(service_name: &str, explicit_file: Option<&Path>) -> Result<T, ConfigError>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    let figment = layered_figment::<T>(service_name, explicit_file)?;
    Ok(figment.extract()?)
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment, ConfigError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConfigError("Config file must have an extension".to_string()))?;

    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        _ => Err(ConfigError(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        port: u16,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "sample".to_string(),
                port: 8000,
            }
        }
    }

    #[test]
    fn test_defaults_when_no_sources() {
        let loaded: Sample = load_config("config_loader_test_none", None).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "port: 9100").unwrap();

        let loaded: Sample = load_config("config_loader_test_file", Some(file.path())).unwrap();
        assert_eq!(loaded.port, 9100);
        assert_eq!(loaded.name, "sample");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result: Result<Sample, _> =
            load_config("config_loader_test_missing", Some(Path::new("/nope/none.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result: Result<Sample, _> =
            load_config("config_loader_test_ini", Some(file.path()));
        assert!(result.unwrap_err().0.contains("Unsupported"));
    }
}
