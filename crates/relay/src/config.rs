// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The database pool reads its own tuning variables in
// `db::pool`.

use std::net::SocketAddr;

const DEV_JWT_SECRET: &str = "flock_local_development_jwt_secret_must_be_32_chars";
pub(crate) const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// HMAC secret shared with the API that issues access tokens.
    pub jwt_secret: String,
    /// Shared secret that authenticates the service identity on the sockets.
    pub socket_secret: Option<String>,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `flock_relay=debug`).
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Frames buffered per connection before broadcasts to it start failing.
    pub outbound_queue_capacity: usize,
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `FLOCK_RELAY_HOST` | `127.0.0.1` |
    /// | `FLOCK_RELAY_PORT` | `8000` |
    /// | `FLOCK_RELAY_JWT_SECRET` | dev-only placeholder |
    /// | `FLOCK_RELAY_SOCKET_SECRET` | *(none, service identity disabled)* |
    /// | `FLOCK_RELAY_DATABASE_URL` | *(none)* |
    /// | `FLOCK_RELAY_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `FLOCK_RELAY_LOG_FILTER` | `info` |
    /// | `FLOCK_RELAY_LOG_FORMAT` | `text` |
    /// | `FLOCK_RELAY_OUTBOUND_QUEUE` | `64` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("FLOCK_RELAY_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let port: u16 = env("FLOCK_RELAY_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8000);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], port)));

        let jwt_secret = env("FLOCK_RELAY_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.into());

        // An empty secret would let an empty credential through as the service.
        let socket_secret = env("FLOCK_RELAY_SOCKET_SECRET").ok().filter(|v| !v.is_empty());

        let database_url = env("FLOCK_RELAY_DATABASE_URL").ok();
        let cors_origins = env("FLOCK_RELAY_CORS_ORIGINS").ok();

        let log_filter = env("FLOCK_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());
        let log_format = match env("FLOCK_RELAY_LOG_FORMAT").ok().as_deref() {
            Some(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let outbound_queue_capacity = env("FLOCK_RELAY_OUTBOUND_QUEUE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAPACITY);

        Self {
            listen_addr,
            jwt_secret,
            socket_secret,
            database_url,
            cors_origins,
            log_filter,
            log_format,
            outbound_queue_capacity,
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_no_env_vars() {
        let cfg = RelayConfig::from_env_fn(env_from_map(HashMap::new()));
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8000");
        assert!(cfg.is_dev_jwt_secret());
        assert!(cfg.socket_secret.is_none());
        assert!(cfg.database_url.is_none());
        assert!(cfg.cors_origins.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert_eq!(cfg.outbound_queue_capacity, 64);
    }

    #[test]
    fn custom_host_and_port() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_HOST", "0.0.0.0");
        m.insert("FLOCK_RELAY_PORT", "9090");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.to_string(), "0.0.0.0:9090");
    }

    #[test]
    fn invalid_port_uses_default() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_PORT", "not_a_number");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.listen_addr.port(), 8000);
    }

    #[test]
    fn custom_jwt_secret_is_not_dev() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_JWT_SECRET", "production_secret_at_least_32_chars!!");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert!(!cfg.is_dev_jwt_secret());
    }

    #[test]
    fn socket_secret_from_env() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_SOCKET_SECRET", "in-app-service-secret");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.socket_secret.as_deref(), Some("in-app-service-secret"));
    }

    #[test]
    fn empty_socket_secret_is_treated_as_unset() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_SOCKET_SECRET", "");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert!(cfg.socket_secret.is_none());
    }

    #[test]
    fn json_log_format_is_case_insensitive() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_LOG_FORMAT", "JSON");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn zero_outbound_queue_uses_default() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_OUTBOUND_QUEUE", "0");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.outbound_queue_capacity, 64);
    }

    #[test]
    fn database_url_from_env() {
        let mut m = HashMap::new();
        m.insert("FLOCK_RELAY_DATABASE_URL", "postgres://u:p@host/flock");
        let cfg = RelayConfig::from_env_fn(env_from_map(m));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://u:p@host/flock"));
    }
}
