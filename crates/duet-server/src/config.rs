use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    /// Origin put in front of signed media URLs.
    pub public_url: String,
    pub jwt_secret: String,
    pub media_secret: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("DUET_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DUET_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }
        let media_secret = lookup("DUET_MEDIA_SECRET")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| jwt_secret.clone());

        let port: u16 = var("DUET_PORT", "3000")
            .parse()
            .context("DUET_PORT must be a port number")?;
        let max_upload_mb: usize = var("DUET_MAX_UPLOAD_MB", "50")
            .parse()
            .context("DUET_MAX_UPLOAD_MB must be a whole number")?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .context("DUET_MAX_UPLOAD_MB is too large")?;

        Ok(Self {
            host: var("DUET_HOST", "0.0.0.0"),
            port,
            db_path: var("DUET_DB_PATH", "duet.db").into(),
            media_dir: var("DUET_MEDIA_DIR", "./media").into(),
            public_url: var("DUET_PUBLIC_URL", "http://localhost:3000"),
            jwt_secret,
            media_secret,
            max_upload_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DUET_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("duet.db"));
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.media_secret, "s3cret");
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn test_rejects_placeholder_secret() {
        assert!(config(&[]).is_err());
        assert!(config(&[("DUET_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DUET_JWT_SECRET", "s3cret"),
            ("DUET_MEDIA_SECRET", "other"),
            ("DUET_PORT", "8080"),
            ("DUET_MAX_UPLOAD_MB", "1"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.media_secret, "other");
        assert_eq!(config.max_upload_bytes, 1024 * 1024);
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(config(&[("DUET_JWT_SECRET", "s3cret"), ("DUET_PORT", "nope")]).is_err());
    }

    #[test]
    fn test_rejects_oversized_upload_limit() {
        let huge = usize::MAX.to_string();
        assert!(config(&[("DUET_JWT_SECRET", "s3cret"), ("DUET_MAX_UPLOAD_MB", huge.as_str())]).is_err());
    }
}
