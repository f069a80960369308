use crate::error::{ErrorContext, Result};
use crate::types::{Config, MapTheme, ReconMapError};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use toml::value::Table;

/// Load configuration from an optional TOML file, then apply environment overrides.
///
/// A missing file is not an error: defaults are used instead.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = config_path.filter(|p| Path::new(p).exists()) {
        let contents = fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path))?;
        apply_toml(&mut config, &contents)?;
    }

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

pub fn apply_toml(config: &mut Config, contents: &str) -> Result<()> {
    let toml_config: toml::Value = toml::from_str(contents).with_context(|| "Failed to parse config file".to_string())?;
    let Some(table) = toml_config.as_table() else {
        return Ok(());
    };

    if let Some(http) = section(table, "http") {
        if let Some(secs) = float(http, "timeout_secs") {
            config.timeout = seconds(secs, "http.timeout_secs")?;
        }
        if let Some(agent) = http.get("user_agent").and_then(|v| v.as_str()) {
            config.user_agent = agent.to_string();
        }
        if let Some(proxy) = http.get("proxy").and_then(|v| v.as_str()) {
            config.proxy = Some(proxy.to_string());
        }
    }

    if let Some(enumeration) = section(table, "enumeration") {
        if let Some(sources) = enumeration.get("sources").and_then(|v| v.as_array()) {
            config.enumeration.sources = sources
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect();
        }
        if let Some(attempts) = integer(enumeration, "max_attempts")? {
            config.enumeration.max_attempts = attempts;
        }
        if let Some(ms) = integer(enumeration, "retry_base_delay_ms")? {
            config.enumeration.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(threshold) = integer(enumeration, "secondary_threshold")? {
            config.enumeration.secondary_threshold = threshold;
        }
        if let Some(threshold) = integer(enumeration, "tertiary_threshold")? {
            config.enumeration.tertiary_threshold = threshold;
        }
        if let Some(include) = enumeration.get("include_apex").and_then(|v| v.as_bool()) {
            config.enumeration.include_apex = include;
        }
    }

    if let Some(resolver) = section(table, "resolver") {
        if let Some(concurrency) = integer(resolver, "concurrency")? {
            config.resolver.concurrency = concurrency;
        }
        if let Some(secs) = float(resolver, "timeout_secs") {
            config.resolver.timeout = seconds(secs, "resolver.timeout_secs")?;
        }
        if let Some(nameservers) = resolver.get("nameservers").and_then(|v| v.as_array()) {
            config.resolver.nameservers = nameservers
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect();
        }
        if let Some(system) = resolver.get("use_system_resolver").and_then(|v| v.as_bool()) {
            config.resolver.use_system_resolver = system;
        }
    }

    if let Some(geolocation) = section(table, "geolocation") {
        if let Some(endpoint) = geolocation.get("endpoint").and_then(|v| v.as_str()) {
            config.geolocation.endpoint = endpoint.to_string();
        }
        if let Some(size) = integer(geolocation, "batch_size")? {
            config.geolocation.batch_size = size;
        }
        if let Some(ms) = integer(geolocation, "inter_batch_delay_ms")? {
            config.geolocation.inter_batch_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = float(geolocation, "timeout_secs") {
            config.geolocation.timeout = seconds(secs, "geolocation.timeout_secs")?;
        }
    }

    if let Some(output) = section(table, "output") {
        if let Some(map) = output.get("map_file").and_then(|v| v.as_str()) {
            // an empty path turns the map off
            config.output.map_file = Some(map.to_string()).filter(|m| !m.is_empty());
        }
        if let Some(theme) = output.get("theme").and_then(|v| v.as_str()) {
            config.output.theme = match theme {
                "dark" => MapTheme::Dark,
                "light" => MapTheme::Light,
                other => return Err(ReconMapError::ConfigError(format!("Unknown map theme {}", other))),
            };
        }
        if let Some(csv) = output.get("csv_file").and_then(|v| v.as_str()) {
            config.output.csv_file = Some(csv.to_string());
        }
        if let Some(json) = output.get("json_file").and_then(|v| v.as_str()) {
            config.output.json_file = Some(json.to_string());
        }
    }

    if let Some(limits) = section(table, "rate_limits") {
        for provider in limits.keys() {
            // 0 disables limiting for the provider
            let limit = integer::<u32>(limits, provider)?.filter(|n| *n > 0);
            config.rate_limits.insert(provider.clone(), limit);
        }
    }

    Ok(())
}

fn section<'a>(table: &'a Table, name: &str) -> Option<&'a Table> {
    table.get(name).and_then(|v| v.as_table())
}

/// Read an integer key, rejecting values that do not fit the target type.
fn integer<T>(table: &Table, key: &str) -> Result<Option<T>>
where
    T: TryFrom<i64>,
    T::Error: std::fmt::Display,
{
    table
        .get(key)
        .and_then(|v| v.as_integer())
        .map(|n| T::try_from(n).with_context(|| format!("Invalid value {} for {}", n, key)))
        .transpose()
}

fn float(table: &Table, key: &str) -> Option<f64> {
    table
        .get(key)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|n| n as f64)))
}

/// Convert user-supplied seconds into a `Duration`, rejecting negative and non-finite values.
pub fn seconds(secs: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid {}", what))
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(threads) = env::var("RECONMAP_THREADS") {
        config.resolver.concurrency = threads
            .trim()
            .parse()
            .with_context(|| "Invalid RECONMAP_THREADS".to_string())?;
    }
    if let Ok(timeout) = env::var("RECONMAP_TIMEOUT") {
        let secs: f64 = timeout
            .trim()
            .parse()
            .with_context(|| "Invalid RECONMAP_TIMEOUT".to_string())?;
        config.resolver.timeout = seconds(secs, "RECONMAP_TIMEOUT")?;
    }
    if let Ok(proxy) = env::var("RECONMAP_PROXY") {
        config.proxy = Some(proxy);
    }
    if let Ok(endpoint) = env::var("RECONMAP_GEO_ENDPOINT") {
        config.geolocation.endpoint = endpoint;
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.timeout.is_zero() {
        return Err(ReconMapError::ConfigError("HTTP timeout must be greater than 0".to_string()));
    }
    if config.resolver.concurrency == 0 {
        return Err(ReconMapError::ConfigError("Resolver concurrency must be greater than 0".to_string()));
    }
    if config.resolver.timeout.is_zero() {
        return Err(ReconMapError::ConfigError("Resolver timeout must be greater than 0".to_string()));
    }
    if config.geolocation.batch_size == 0 {
        return Err(ReconMapError::ConfigError("Geolocation batch size must be greater than 0".to_string()));
    }
    if config.enumeration.sources.is_empty() {
        return Err(ReconMapError::ConfigError("No valid sources configured".to_string()));
    }
    url::Url::parse(&config.geolocation.endpoint)
        .with_context(|| format!("Invalid geolocation endpoint {}", config.geolocation.endpoint))?;
    if let Some(proxy) = &config.proxy {
        url::Url::parse(proxy).with_context(|| format!("Invalid proxy URL {}", proxy))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Some("/nonexistent/reconmap.toml")).unwrap();
        assert_eq!(config.resolver.concurrency, 50);
        assert_eq!(config.geolocation.batch_size, 100);
        assert_eq!(config.enumeration.secondary_threshold, 10);
        assert_eq!(config.enumeration.tertiary_threshold, 5);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[http]
timeout_secs = 15
user_agent = "reconmap-test"

[enumeration]
sources = ["crtsh", "hackertarget"]
secondary_threshold = 25
retry_base_delay_ms = 500
include_apex = false

[resolver]
concurrency = 120
timeout_secs = 1.5
nameservers = ["9.9.9.9:53"]

[geolocation]
batch_size = 50
inter_batch_delay_ms = 4000

[rate_limits]
ip-api = 15
crtsh = 0
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.user_agent, "reconmap-test");
        assert_eq!(config.enumeration.sources, vec!["crtsh", "hackertarget"]);
        assert_eq!(config.enumeration.secondary_threshold, 25);
        assert_eq!(config.enumeration.retry_base_delay, Duration::from_millis(500));
        assert!(!config.enumeration.include_apex);
        assert_eq!(config.resolver.concurrency, 120);
        assert_eq!(config.resolver.timeout, Duration::from_millis(1500));
        assert_eq!(config.resolver.nameservers, vec!["9.9.9.9:53"]);
        assert_eq!(config.geolocation.batch_size, 50);
        assert_eq!(config.geolocation.inter_batch_delay, Duration::from_secs(4));
        assert_eq!(config.rate_limits.get("ip-api"), Some(&Some(15)));
        assert_eq!(config.rate_limits.get("crtsh"), Some(&None));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let mut config = Config::default();
        let err = apply_toml(&mut config, "[resolver\nconcurrency = ").unwrap_err();
        assert!(matches!(err, ReconMapError::ConfigError(_)));
    }

    #[test]
    fn test_out_of_range_integers_are_rejected() {
        let mut config = Config::default();
        let err = apply_toml(&mut config, "[enumeration]\nmax_attempts = 5000000000\n").unwrap_err();
        assert!(matches!(err, ReconMapError::ConfigError(_)));
        assert_eq!(config.enumeration.max_attempts, 3);

        let err = apply_toml(&mut config, "[resolver]\nconcurrency = -1\n").unwrap_err();
        assert!(matches!(err, ReconMapError::ConfigError(_)));
        assert_eq!(config.resolver.concurrency, 50);

        let err = apply_toml(&mut config, "[rate_limits]\nip-api = 4294967296\n").unwrap_err();
        assert!(matches!(err, ReconMapError::ConfigError(_)));
    }

    #[test]
    fn test_output_section() {
        let mut config = Config::default();
        apply_toml(&mut config, "[output]\nmap_file = \"\"\ntheme = \"light\"\ncsv_file = \"hosts.csv\"\n").unwrap();
        assert!(config.output.map_file.is_none());
        assert_eq!(config.output.theme, MapTheme::Light);
        assert_eq!(config.output.csv_file.as_deref(), Some("hosts.csv"));

        let err = apply_toml(&mut config, "[output]\ntheme = \"sepia\"\n").unwrap_err();
        assert!(matches!(err, ReconMapError::ConfigError(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(validate_config(&config).is_ok());

        config.resolver.concurrency = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.geolocation.batch_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.geolocation.endpoint = "not a url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_seconds_rejects_negative() {
        assert!(seconds(-1.0, "timeout").is_err());
        assert_eq!(seconds(0.25, "timeout").unwrap(), Duration::from_millis(250));
    }
}
