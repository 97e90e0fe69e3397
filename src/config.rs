use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::models::ChatModel;

/// Backend base URL used when neither the runtime nor the build environment
/// provides `API_BASE`.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LOG_FILTER: &str = "rag_chat_client=info,rag_chat=info";

const BUILD_API_BASE: Option<&str> = option_env!("API_BASE");

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub request_timeout: Duration,
    pub model: ChatModel,
    /// Overrides the credential file location under the user config dir.
    pub credentials_path: Option<PathBuf>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> ClientResult<Self> {
        Self::from_vars(|name| env::var(name).ok(), BUILD_API_BASE)
    }

    /// Build from a variable lookup. `API_BASE` precedence is the looked-up
    /// value, then `build_api_base`, then [`DEFAULT_API_BASE`]; blank values
    /// count as unset.
    pub fn from_vars(
        lookup: impl Fn(&str) -> Option<String>,
        build_api_base: Option<&str>,
    ) -> ClientResult<Self> {
        let api_base = lookup("API_BASE")
            .filter(|base| !base.trim().is_empty())
            .or_else(|| {
                build_api_base
                    .filter(|base| !base.trim().is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    ClientError::Config(format!("REQUEST_TIMEOUT_SECS must be a number, got {raw:?}"))
                })?;
                if secs == 0 {
                    return Err(ClientError::Config(
                        "REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let model = match lookup("RAG_CHAT_MODEL") {
            Some(raw) => raw.parse()?,
            None => ChatModel::default(),
        };

        Ok(Self {
            api_base: normalize_base(&api_base),
            request_timeout,
            model,
            credentials_path: lookup("RAG_CHAT_CREDENTIALS").map(PathBuf::from),
            log_level: lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    pub fn with_api_base(mut self, api_base: impl AsRef<str>) -> Self {
        self.api_base = normalize_base(api_base.as_ref());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Location of the persisted credential file
    pub fn credentials_file(&self) -> ClientResult<PathBuf> {
        if let Some(path) = &self.credentials_path {
            return Ok(path.clone());
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ClientError::Config("could not determine config directory".to_string()))?;
        Ok(config_dir.join("rag-chat").join("credentials.json"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            model: ChatModel::default(),
            credentials_path: None,
            log_level: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_paths() {
        let config = Config::default().with_api_base("http://127.0.0.1:9000/");
        assert_eq!(config.endpoint("/ask"), "http://127.0.0.1:9000/ask");
        assert_eq!(
            config.endpoint("api/rag-chat"),
            "http://127.0.0.1:9000/api/rag-chat"
        );
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.model, ChatModel::Gpt35Turbo);
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_api_base_precedence() {
        let config = Config::from_vars(
            vars(&[("API_BASE", "http://runtime:9000/")]),
            Some("http://build:8001"),
        )
        .unwrap();
        assert_eq!(config.api_base, "http://runtime:9000");

        let config = Config::from_vars(vars(&[]), Some("http://build:8001")).unwrap();
        assert_eq!(config.api_base, "http://build:8001");

        let config = Config::from_vars(vars(&[]), None).unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_blank_api_base_is_ignored() {
        let config =
            Config::from_vars(vars(&[("API_BASE", "   ")]), Some("http://build:8001")).unwrap();
        assert_eq!(config.api_base, "http://build:8001");

        let config = Config::from_vars(vars(&[("API_BASE", "")]), None).unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_vars_are_parsed() {
        let config = Config::from_vars(
            vars(&[
                ("REQUEST_TIMEOUT_SECS", " 15 "),
                ("RAG_CHAT_MODEL", "gpt-4o"),
                ("RAG_CHAT_CREDENTIALS", "/tmp/creds.json"),
                ("RUST_LOG", "debug"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.model, ChatModel::Gpt4o);
        assert_eq!(config.credentials_path, Some(PathBuf::from("/tmp/creds.json")));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        let err = Config::from_vars(vars(&[("REQUEST_TIMEOUT_SECS", "soon")]), None).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = Config::from_vars(vars(&[("REQUEST_TIMEOUT_SECS", "0")]), None).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let err = Config::from_vars(vars(&[("RAG_CHAT_MODEL", "llama")]), None).unwrap_err();
        assert!(matches!(err, ClientError::UnknownModel(_)));
    }

    #[test]
    fn test_credentials_override() {
        let config = Config {
            credentials_path: Some(PathBuf::from("/tmp/keys.json")),
            ..Config::default()
        };
        assert_eq!(
            config.credentials_file().unwrap(),
            PathBuf::from("/tmp/keys.json")
        );
    }
}
