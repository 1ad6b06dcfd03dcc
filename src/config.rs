//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `MACROSCRUB_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`; a missing file just means
//!    defaults)
//! 2. **Environment variables** - Variables prefixed with `MACROSCRUB_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `MACROSCRUB_WINDOW__WIDTH=800` sets the `window.width` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding (loopback by default)
//! - **Uploads**: `max_upload_bytes` - request body ceiling for workbook uploads
//! - **Browser**: `open_browser`, `browser_delay_ms` - headless-mode browser launch
//! - **Window**: `window.*` - native window geometry for `desktop` builds

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MACROSCRUB_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Loaded from YAML and environment variables; every field has a default, so
/// the binary runs with no config file at all.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to. Loopback by default; this is a local
    /// tool, not a network service.
    pub host: String,
    /// HTTP server port to bind to (0 picks an ephemeral port)
    pub port: u16,
    /// Maximum accepted upload body size in bytes
    pub max_upload_bytes: usize,
    /// Open the system browser after startup (headless builds only)
    pub open_browser: bool,
    /// Delay before opening the browser, giving the listener time to come up
    pub browser_delay_ms: u64,
    /// Native window geometry (`desktop` builds only)
    pub window: WindowConfig,
}

/// Native window geometry and behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in logical pixels
    pub width: f64,
    /// Initial height in logical pixels
    pub height: f64,
    /// Minimum width the window can be resized to
    pub min_width: f64,
    /// Minimum height the window can be resized to
    pub min_height: f64,
    /// Whether the window can be resized
    pub resizable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            max_upload_bytes: 5 * 1024 * 1024,
            open_browser: true,
            browser_delay_ms: 1500,
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Macro Remover".to_string(),
            width: 600.0,
            height: 700.0,
            min_width: 450.0,
            min_height: 550.0,
            resizable: true,
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config
            .validate()
            .map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values.
            // MACROSCRUB_CONFIG names the file itself (handled by clap) and
            // is not a Config field, so it must not reach serde.
            .merge(Env::prefixed("MACROSCRUB_").ignore(&["config"]).split("__"))
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_upload_bytes == 0 {
            return Err(Error::BadRequest {
                message: "Config validation: max_upload_bytes must be greater than zero"
                    .to_string(),
            });
        }
        if self.window.min_width > self.window.width
            || self.window.min_height > self.window.height
        {
            return Err(Error::BadRequest {
                message: format!(
                    "Config validation: window minimum size ({}x{}) cannot exceed initial size ({}x{})",
                    self.window.min_width,
                    self.window.min_height,
                    self.window.width,
                    self.window.height
                ),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_config_file() {
        Jail::expect_with(|jail| {
            // No file created; figment falls back to defaults.
            let _ = jail;
            let args = Args {
                config: "missing.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 5001);
            assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
            assert!(config.open_browser);
            assert_eq!(config.window.width, 600.0);

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9000
window:
  title: Custom Title
"#,
            )?;

            jail.set_env("MACROSCRUB_HOST", "0.0.0.0");
            jail.set_env("MACROSCRUB_MAX_UPLOAD_BYTES", "1048576");
            jail.set_env("MACROSCRUB_WINDOW__WIDTH", "800.0");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;

            // Env vars should override
            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.max_upload_bytes, 1024 * 1024);
            assert_eq!(config.window.width, 800.0);

            // YAML values should be preserved
            assert_eq!(config.port, 9000);
            assert_eq!(config.window.title, "Custom Title");

            Ok(())
        });
    }

    #[test]
    fn test_config_env_var_for_file_path_is_not_a_field() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "from-env.yaml",
                r#"
port: 9100
"#,
            )?;

            // Selects the config file; must not be treated as a Config field.
            jail.set_env("MACROSCRUB_CONFIG", "from-env.yaml");

            let args = Args {
                config: "from-env.yaml".to_string(),
                validate: false,
            };

            let config = Config::load(&args)?;
            assert_eq!(config.port, 9100);

            Ok(())
        });
    }

    #[test]
    fn test_config_validation_zero_upload_limit() {
        let config = Config {
            max_upload_bytes: 0,
            ..Config::default()
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_upload_bytes"));
    }

    #[test]
    fn test_config_validation_window_minimum_exceeds_size() {
        let mut config = Config::default();
        config.window.min_width = 1000.0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("window minimum size"));
    }

    #[test]
    fn test_bind_address() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "127.0.0.1:5001");
    }
}
