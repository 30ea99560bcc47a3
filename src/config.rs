//! Environment configuration. Loaded once at startup from the process
//! environment (plus `.env` via dotenvy in main).

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Deployed frontend origin, allowed for CORS and the realtime channel.
    pub client_url: Option<String>,
    /// Production narrows CORS to the client origin and marks cookies Secure.
    pub production: bool,
    pub media_bucket: String,
    /// Public base URL under which stored media objects are reachable.
    pub media_public_url: String,
    /// Snowflake machine id for this instance.
    pub machine_id: u64,
}

/// Local frontend dev servers (vite, CRA), always allowed outside production.
const DEV_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{0} is invalid: {1}")]
    Invalid(&'static str, String),
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| ConfigError::Invalid("PORT", format!("{e}")))?,
            Err(_) => 5000,
        };
        let machine_id = match std::env::var("MACHINE_ID") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| ConfigError::Invalid("MACHINE_ID", format!("{e}")))?,
            Err(_) => 0,
        };
        Ok(Config {
            port,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("SECRET_KEY")?,
            client_url: std::env::var("CLIENT_URL").ok().filter(|s| !s.is_empty()),
            production: std::env::var("APP_ENV").as_deref() == Ok("production"),
            media_bucket: required("MEDIA_BUCKET")?,
            media_public_url: required("MEDIA_PUBLIC_URL")?,
            machine_id,
        })
    }

    /// CORS allow-list. Production allows only the deployed client origin;
    /// otherwise local dev origins plus the client origin when configured.
    pub fn allowed_origins(&self) -> Vec<String> {
        if self.production {
            self.client_url.iter().cloned().collect()
        } else {
            DEV_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .chain(self.client_url.clone())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            port: 5000,
            database_url: "postgres://localhost/app".to_string(),
            jwt_secret: "secret".to_string(),
            client_url: Some("https://app.example.com".to_string()),
            production: false,
            media_bucket: "media".to_string(),
            media_public_url: "https://cdn.example.com".to_string(),
            machine_id: 0,
        }
    }

    #[test]
    fn dev_allows_local_origins_and_client() {
        let cfg = base_config();
        let origins = cfg.allowed_origins();
        assert!(origins.contains(&"http://localhost:5173".to_string()));
        assert!(origins.contains(&"http://localhost:3000".to_string()));
        assert!(origins.contains(&"https://app.example.com".to_string()));
    }

    #[test]
    fn production_allows_only_client_origin() {
        let cfg = Config {
            production: true,
            ..base_config()
        };
        assert_eq!(cfg.allowed_origins(), vec!["https://app.example.com".to_string()]);
    }

    #[test]
    fn production_without_client_url_allows_nothing() {
        let cfg = Config {
            production: true,
            client_url: None,
            ..base_config()
        };
        assert!(cfg.allowed_origins().is_empty());
    }
}
