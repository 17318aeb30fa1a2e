use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::scoring::catalog::import::{self, CatalogImportError};
use crate::scoring::catalog::MetricCatalog;
use crate::scoring::grade::{GradeBand, GradeScale, GradeScaleError};
use crate::scoring::rules::DEFAULT_WINDOW_YEARS;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub scoring: ScoringConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            scoring: ScoringConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Catalog source, grade table, and window used by the scoring engine.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Institution-supplied catalog; the seeded standard catalog when absent.
    pub catalog_csv: Option<PathBuf>,
    pub grade_scale: GradeScale,
    pub window_years: u8,
    pub default_target_grade: GradeBand,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            catalog_csv: None,
            grade_scale: GradeScale::naac_default(),
            window_years: DEFAULT_WINDOW_YEARS,
            default_target_grade: GradeBand::A,
        }
    }
}

impl ScoringConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let catalog_csv = env::var("NAAC_CATALOG_CSV")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let grade_scale = match env::var("NAAC_GRADE_SCALE") {
            Ok(raw) if !raw.trim().is_empty() => GradeScale::parse(&raw)
                .map_err(|source| ConfigError::InvalidGradeScale { source })?,
            _ => GradeScale::naac_default(),
        };

        let window_years = match env::var("NAAC_WINDOW_YEARS") {
            Ok(raw) => raw
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|years| *years > 0)
                .ok_or(ConfigError::InvalidWindow(raw))?,
            Err(_) => DEFAULT_WINDOW_YEARS,
        };

        let default_target_grade = match env::var("NAAC_DEFAULT_TARGET_GRADE") {
            Ok(raw) => GradeBand::parse(&raw).ok_or(ConfigError::InvalidTargetGrade(raw))?,
            Err(_) => GradeBand::A,
        };

        Ok(Self {
            catalog_csv,
            grade_scale,
            window_years,
            default_target_grade,
        })
    }

    pub fn load_catalog(&self) -> Result<MetricCatalog, CatalogImportError> {
        match &self.catalog_csv {
            Some(path) => import::from_path(path),
            None => Ok(MetricCatalog::standard()),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidGradeScale { source: GradeScaleError },
    InvalidWindow(String),
    InvalidTargetGrade(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidGradeScale { source } => {
                write!(f, "NAAC_GRADE_SCALE is invalid: {}", source)
            }
            ConfigError::InvalidWindow(raw) => {
                write!(f, "NAAC_WINDOW_YEARS must be a positive whole number (found '{}')", raw)
            }
            ConfigError::InvalidTargetGrade(raw) => {
                write!(f, "NAAC_DEFAULT_TARGET_GRADE '{}' is not a NAAC grade band", raw)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidGradeScale { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidWindow(_)
            | ConfigError::InvalidTargetGrade(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("NAAC_CATALOG_CSV");
        env::remove_var("NAAC_GRADE_SCALE");
        env::remove_var("NAAC_WINDOW_YEARS");
        env::remove_var("NAAC_DEFAULT_TARGET_GRADE");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.scoring.window_years, 5);
        assert_eq!(config.scoring.grade_scale, GradeScale::naac_default());
        assert_eq!(config.scoring.default_target_grade, GradeBand::A);
        assert!(config.scoring.catalog_csv.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_scoring_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("NAAC_GRADE_SCALE", "90:A++,75:A+,60:A,0:D");
        env::set_var("NAAC_WINDOW_YEARS", "3");
        env::set_var("NAAC_DEFAULT_TARGET_GRADE", "b++");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.scoring.window_years, 3);
        assert_eq!(config.scoring.default_target_grade, GradeBand::BPlusPlus);
        assert_eq!(config.scoring.grade_scale.thresholds().len(), 4);
        reset_env();
    }

    #[test]
    fn rejects_malformed_scoring_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("NAAC_GRADE_SCALE", "75:A+,90:A++,0:D");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidGradeScale { .. })
        ));

        reset_env();
        env::set_var("NAAC_WINDOW_YEARS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidWindow(_))
        ));
        reset_env();
    }
}
