//! Configuration management for the ticket gate.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The binary loads a `.env` file first and lets command-line flags override
//! individual values.

use crate::camera::{MAX_FRAME_INTERVAL, clamp_frame_interval};
use crate::error::ConfigError;
use crate::types::{MountPoint, Secret};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Verification and generation service
    pub api: ApiConfig,
    /// Shared access secret
    pub secret: Secret,
    /// Camera scanner
    pub scanner: ScannerConfig,
    /// Issuing desk
    pub issuer: IssuerConfig,
}

/// Remote service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL (`QR_API_URL`)
    pub url: String,
    /// Request timeout (`QR_API_TIMEOUT_SECS`)
    pub timeout: Duration,
}

/// Scanner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    /// Surface the camera binds to (`SCANNER_MOUNT_POINT`)
    pub mount_point: MountPoint,
    /// Frames decoded per second (`SCANNER_FPS`)
    pub fps: f64,
    /// Optional repeat-suppression window (`SCANNER_DUPLICATE_WINDOW_MS`)
    pub duplicate_window: Option<Duration>,
}

/// Issuing desk configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerConfig {
    /// QR rendering service (`QR_IMAGE_SERVICE_URL`)
    pub image_service_url: String,
    /// Rendered image edge in pixels (`QR_IMAGE_SIZE`)
    pub image_size: u32,
    /// Where packages are written (`QR_EXPORT_DIR`)
    pub export_dir: PathBuf,
}

impl ScannerConfig {
    /// Time between frames
    ///
    /// Out-of-range rates are clamped; [`Config::validate`] rejects them.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.fps.recip())
            .map_or(MAX_FRAME_INTERVAL, clamp_frame_interval)
    }

    fn fps_in_range(&self) -> bool {
        self.fps.is_finite()
            && self.fps > 0.0
            && Duration::try_from_secs_f64(self.fps.recip())
                .is_ok_and(|interval| clamp_frame_interval(interval) == interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                url: "http://localhost:3000".to_string(),
                timeout: Duration::from_secs(10),
            },
            secret: Secret::from("0000"),
            scanner: ScannerConfig {
                mount_point: MountPoint::default(),
                fps: 1.0,
                duplicate_window: None,
            },
            issuer: IssuerConfig {
                image_service_url: "https://api.qrserver.com/v1/create-qr-code/".to_string(),
                image_size: 150,
                export_dir: PathBuf::from("."),
            },
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not
    /// parse. The result is not validated; see [`Config::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a numeric variable does not
    /// parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            api: ApiConfig {
                url: lookup("QR_API_URL").unwrap_or(defaults.api.url),
                timeout: parse(&lookup, "QR_API_TIMEOUT_SECS")?
                    .map_or(defaults.api.timeout, Duration::from_secs),
            },
            secret: lookup("ACCESS_SECRET").map_or(defaults.secret, Secret::from),
            scanner: ScannerConfig {
                mount_point: lookup("SCANNER_MOUNT_POINT")
                    .map_or(defaults.scanner.mount_point, MountPoint::new),
                fps: parse(&lookup, "SCANNER_FPS")?.unwrap_or(defaults.scanner.fps),
                duplicate_window: parse(&lookup, "SCANNER_DUPLICATE_WINDOW_MS")?
                    .map(Duration::from_millis),
            },
            issuer: IssuerConfig {
                image_service_url: lookup("QR_IMAGE_SERVICE_URL")
                    .unwrap_or(defaults.issuer.image_service_url),
                image_size: parse(&lookup, "QR_IMAGE_SIZE")?
                    .unwrap_or(defaults.issuer.image_size),
                export_dir: lookup("QR_EXPORT_DIR")
                    .map_or(defaults.issuer.export_dir, PathBuf::from),
            },
        })
    }

    /// Reject values the scanner and clients cannot run with
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidFps`]: FPS outside one frame a minute to 1000 a second
    /// - [`ConfigError::EmptySecret`]: empty access secret
    /// - [`ConfigError::EmptyApiUrl`]: empty service URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scanner.fps_in_range() {
            return Err(ConfigError::InvalidFps(self.scanner.fps));
        }
        if self.secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if self.api.url.trim().is_empty() {
            return Err(ConfigError::EmptyApiUrl);
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.api.url, "http://localhost:3000");
        assert_eq!(config.api.timeout, Duration::from_secs(10));
        assert!(config.secret.matches("0000"));
        assert_eq!(config.scanner.mount_point, MountPoint::new("reader"));
        assert_eq!(config.scanner.frame_interval(), Duration::from_secs(1));
        assert_eq!(config.scanner.duplicate_window, None);
        assert_eq!(config.issuer.image_size, 150);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("QR_API_URL", "https://ledger.example"),
            ("SCANNER_FPS", "4"),
            ("SCANNER_DUPLICATE_WINDOW_MS", "2500"),
            ("ACCESS_SECRET", "s3cret"),
        ])
        .unwrap();

        assert_eq!(config.api.url, "https://ledger.example");
        assert_eq!(config.scanner.frame_interval(), Duration::from_millis(250));
        assert_eq!(config.scanner.duplicate_window, Some(Duration::from_millis(2500)));
        assert!(config.secret.matches("s3cret"));
    }

    #[test]
    fn test_unparseable_number_is_reported() {
        let error = load(&[("QR_IMAGE_SIZE", "large")]).unwrap_err();
        assert_eq!(
            error,
            ConfigError::InvalidValue {
                var: "QR_IMAGE_SIZE",
                value: "large".to_string(),
            }
        );
    }

    #[test]
    fn test_extreme_frame_rates_are_rejected_and_never_panic() {
        for fps in [1e10, 1e-30, 1001.0, 0.01, f64::INFINITY, -1.0] {
            let mut config = Config::default();
            config.scanner.fps = fps;

            assert_eq!(config.validate(), Err(ConfigError::InvalidFps(fps)), "fps {fps}");
            let interval = config.scanner.frame_interval();
            assert!(interval >= Duration::from_millis(1), "fps {fps}");
            assert!(interval <= Duration::from_secs(60), "fps {fps}");
        }
    }

    #[test]
    fn test_frame_rate_bounds_are_accepted() {
        let mut config = Config::default();

        config.scanner.fps = 1000.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.scanner.frame_interval(), Duration::from_millis(1));

        config.scanner.fps = 0.02;
        assert!(config.validate().is_ok());
        assert_eq!(config.scanner.frame_interval(), Duration::from_secs(50));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = load(&[("SCANNER_FPS", "0")]).unwrap();
        assert_eq!(config.validate(), Err(ConfigError::InvalidFps(0.0)));

        config.scanner.fps = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFps(_))));

        config.scanner.fps = 2.0;
        config.secret = Secret::from("");
        assert_eq!(config.validate(), Err(ConfigError::EmptySecret));

        config.secret = Secret::from("0000");
        config.api.url = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyApiUrl));
    }
}
