//! Server configuration: defaults, optional JSON file overlay, and
//! range validation. Mirrors `config.py`'s whitelist-and-normalize
//! approach: unknown keys are ignored, out-of-range values fall back to
//! their default with a warning rather than aborting startup, and
//! `server_host`/`server_port` are accepted (for forward compatibility
//! with older config files) but always ignored — the TCP endpoint is a
//! fixed constant.

use std::fs;
use std::path::Path;

use serde_json::Value;

/// The registry/relay protocol's fixed TCP endpoint. Never configurable.
pub const TCP_HOST: &str = "0.0.0.0";
pub const TCP_PORT: u16 = 8088;

#[derive(Debug, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARNING" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_tracing_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub max_connections: usize,
    pub connection_timeout: f64,
    pub buffer_size: usize,
    pub max_packet_size: u32,
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_file_path: String,
    pub log_max_size: u64,
    pub log_backup_count: u32,
    pub debug: bool,
    pub verbose_logging: bool,
    pub allow_anonymous_connections: bool,
    pub thread_pool_size: usize,
    pub packet_queue_size: usize,
    pub maintenance_interval: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            http_port: 8080,
            max_connections: 100,
            connection_timeout: 30.0,
            buffer_size: 4096,
            max_packet_size: 1024 * 1024,
            log_level: LogLevel::Info,
            log_to_file: false,
            log_file_path: "server.log".to_string(),
            log_max_size: 10 * 1024 * 1024,
            log_backup_count: 5,
            debug: false,
            verbose_logging: false,
            allow_anonymous_connections: true,
            thread_pool_size: 10,
            packet_queue_size: 100,
            maintenance_interval: 30.0,
        }
    }
}

/// Reads a JSON number-or-string field as an integer, falling back to
/// `default` (and logging a warning) if the key is absent or the wrong
/// shape. Mirrors `config.py`'s `int(self.x)`-in-a-`try/except` coercion.
fn coerce_u64(obj: &serde_json::Map<String, Value>, key: &str, default: u64) -> u64 {
    match obj.get(key) {
        None => default,
        Some(Value::Number(n)) => n.as_u64().unwrap_or_else(|| {
            tracing::warn!(key, "config value is not a non-negative integer, using default");
            default
        }),
        Some(Value::String(s)) => s.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %s, "config value is not a valid integer, using default");
            default
        }),
        Some(_) => {
            tracing::warn!(key, "config value has the wrong type, using default");
            default
        }
    }
}

fn coerce_f64(obj: &serde_json::Map<String, Value>, key: &str, default: f64) -> f64 {
    match obj.get(key) {
        None => default,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.parse().unwrap_or(default),
        Some(_) => default,
    }
}

fn coerce_bool(obj: &serde_json::Map<String, Value>, key: &str, default: bool) -> bool {
    match obj.get(key) {
        None => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
        Some(_) => default,
    }
}

fn coerce_string(obj: &serde_json::Map<String, Value>, key: &str, default: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

impl Config {
    /// Loads and overlays a JSON config file, falling back to defaults if
    /// the file is missing or malformed. `server_host`/`server_port` keys
    /// are accepted and silently ignored.
    pub fn from_file(path: &Path) -> Self {
        let mut cfg = Config::default();

        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file not found, using defaults");
                return cfg;
            }
        };

        let value: Value = match serde_json::from_str(&contents) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "error parsing config file, using defaults");
                return cfg;
            }
        };

        let obj = match value.as_object() {
            Some(o) => o,
            None => {
                tracing::warn!(path = %path.display(), "config file must contain a JSON object, using defaults");
                return cfg;
            }
        };

        cfg.http_port = coerce_u64(obj, "http_port", cfg.http_port as u64) as u16;
        cfg.max_connections = coerce_u64(obj, "max_connections", cfg.max_connections as u64) as usize;
        cfg.connection_timeout = coerce_f64(obj, "connection_timeout", cfg.connection_timeout);
        cfg.buffer_size = coerce_u64(obj, "buffer_size", cfg.buffer_size as u64) as usize;
        cfg.max_packet_size = coerce_u64(obj, "max_packet_size", cfg.max_packet_size as u64) as u32;
        cfg.log_to_file = coerce_bool(obj, "log_to_file", cfg.log_to_file);
        cfg.log_file_path = coerce_string(obj, "log_file_path", &cfg.log_file_path);
        cfg.log_max_size = coerce_u64(obj, "log_max_size", cfg.log_max_size);
        cfg.log_backup_count = coerce_u64(obj, "log_backup_count", cfg.log_backup_count as u64) as u32;
        cfg.debug = coerce_bool(obj, "debug", cfg.debug);
        cfg.verbose_logging = coerce_bool(obj, "verbose_logging", cfg.verbose_logging);
        cfg.allow_anonymous_connections =
            coerce_bool(obj, "allow_anonymous_connections", cfg.allow_anonymous_connections);
        cfg.thread_pool_size = coerce_u64(obj, "thread_pool_size", cfg.thread_pool_size as u64) as usize;
        cfg.packet_queue_size = coerce_u64(obj, "packet_queue_size", cfg.packet_queue_size as u64) as usize;
        cfg.maintenance_interval = coerce_f64(obj, "maintenance_interval", cfg.maintenance_interval);

        if let Some(Value::String(level)) = obj.get("log_level") {
            match LogLevel::parse(level) {
                Some(parsed) => cfg.log_level = parsed,
                None => tracing::warn!(value = %level, "invalid log_level in config, using INFO"),
            }
        }

        if obj.contains_key("server_host") || obj.contains_key("server_port") {
            tracing::info!("config file sets server_host/server_port; ignored, endpoint is fixed");
        }

        cfg.normalize();
        cfg
    }

    /// Clamps `log_level` the way the original does: `DEBUG` is only
    /// honored when `debug` is also set, otherwise it downgrades to INFO.
    fn normalize(&mut self) {
        if self.log_level == LogLevel::Debug && !self.debug {
            self.log_level = LogLevel::Info;
        }
    }

    /// Range-validates the loaded configuration, resetting any
    /// out-of-range field to its default and logging a warning rather
    /// than refusing to start. Returns `false` only for a field the
    /// original treats as a hard startup-abort condition.
    pub fn validate(&mut self) -> bool {
        let defaults = Config::default();

        if !(1..=65535).contains(&self.http_port) {
            tracing::error!(http_port = self.http_port, "invalid http_port");
            return false;
        }
        if self.max_connections < 1 {
            tracing::warn!("max_connections below 1, using default");
            self.max_connections = defaults.max_connections;
        }
        if self.thread_pool_size < 1 {
            tracing::warn!("thread_pool_size below 1, using default");
            self.thread_pool_size = defaults.thread_pool_size;
        }
        if self.packet_queue_size < 1 {
            tracing::warn!("packet_queue_size below 1, using default");
            self.packet_queue_size = defaults.packet_queue_size;
        }
        if self.buffer_size < 512 {
            tracing::warn!(buffer_size = self.buffer_size, "buffer_size too small, using default");
            self.buffer_size = defaults.buffer_size;
        }
        if self.max_packet_size < 1024 {
            tracing::warn!(max_packet_size = self.max_packet_size, "max_packet_size too small, using default");
            self.max_packet_size = defaults.max_packet_size;
        }
        if self.connection_timeout < 0.0 {
            tracing::warn!("connection_timeout negative, using default");
            self.connection_timeout = defaults.connection_timeout;
        }
        if self.maintenance_interval <= 0.0 {
            tracing::warn!("maintenance_interval non-positive, using default");
            self.maintenance_interval = defaults.maintenance_interval;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(contents: &str) -> Config {
        let mut file = tempfile_with(contents);
        let mut cfg = Config::from_file(file.path());
        cfg.validate();
        file.flush().unwrap();
        cfg
    }

    fn tempfile_with(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::from_file(Path::new("/nonexistent/path/to/config.json"));
        assert_eq!(cfg.http_port, Config::default().http_port);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = load(r#"{"http_port": 9090, "totally_unknown_key": 1}"#);
        assert_eq!(cfg.http_port, 9090);
    }

    #[test]
    fn numeric_string_is_coerced_for_integer_fields() {
        let cfg = load(r#"{"max_connections": "42"}"#);
        assert_eq!(cfg.max_connections, 42);
    }

    #[test]
    fn debug_level_requires_the_debug_flag_to_take_effect() {
        let cfg = load(r#"{"log_level": "DEBUG"}"#);
        assert_eq!(cfg.log_level, LogLevel::Info);

        let cfg = load(r#"{"log_level": "DEBUG", "debug": true}"#);
        assert_eq!(cfg.log_level, LogLevel::Debug);
    }

    #[test]
    fn out_of_range_buffer_size_resets_to_default_rather_than_aborting() {
        let mut cfg = load(r#"{"buffer_size": 10}"#);
        assert!(cfg.validate());
        assert_eq!(cfg.buffer_size, Config::default().buffer_size);
    }

    #[test]
    fn server_host_and_port_keys_are_accepted_and_ignored() {
        let cfg = load(r#"{"server_host": "127.0.0.1", "server_port": 9999}"#);
        assert_eq!(TCP_HOST, "0.0.0.0");
        assert_eq!(TCP_PORT, 8088);
        // the fixed endpoint constants above are untouched by config;
        // loading must not fail just because these keys are present.
        assert_eq!(cfg.http_port, Config::default().http_port);
    }

    #[test]
    fn invalid_http_port_fails_validation() {
        let mut cfg = Config::default();
        cfg.http_port = 0;
        assert!(!cfg.validate());
    }

    #[test]
    fn malformed_json_falls_back_to_defaults() {
        let cfg = load("not valid json");
        assert_eq!(cfg.max_connections, Config::default().max_connections);
    }
}
