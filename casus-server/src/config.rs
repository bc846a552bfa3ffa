use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_WORKERS_AI_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_WORKERS_AI_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    WorkersAi {
        base_url: String,
        account_id: String,
        api_token: String,
    },
    OpenAi {
        api_key: String,
        base_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub backend: BackendConfig,
    pub model: String,
    pub max_tokens: u32,
    /// Most recent messages forwarded upstream; `None` forwards everything.
    pub max_messages: Option<usize>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let bind_addr: SocketAddr = get("CASUS_BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .context("CASUS_BIND_ADDR is not a socket address")?;
        let static_dir = PathBuf::from(get("CASUS_STATIC_DIR").unwrap_or_else(|| "static".to_string()));

        let backend_name = get("CASUS_BACKEND").unwrap_or_else(|| "workers-ai".to_string());
        let (backend, default_model) = match backend_name.trim().to_lowercase().as_str() {
            "workers-ai" => (
                BackendConfig::WorkersAi {
                    base_url: get("CASUS_WORKERS_AI_BASE")
                        .unwrap_or_else(|| DEFAULT_WORKERS_AI_BASE.to_string()),
                    account_id: require("CLOUDFLARE_ACCOUNT_ID")?,
                    api_token: require("CLOUDFLARE_API_TOKEN")?,
                },
                DEFAULT_WORKERS_AI_MODEL,
            ),
            "openai" => (
                BackendConfig::OpenAi {
                    api_key: require("OPENAI_API_KEY")?,
                    base_url: get("OPENAI_BASE_URL"),
                },
                DEFAULT_OPENAI_MODEL,
            ),
            other => bail!("unknown CASUS_BACKEND '{other}', expected workers-ai or openai"),
        };

        let model = get("CASUS_MODEL").unwrap_or_else(|| default_model.to_string());
        let max_tokens: u32 = match get("CASUS_MAX_TOKENS") {
            Some(v) => v.trim().parse().context("CASUS_MAX_TOKENS must be a positive integer")?,
            None => 1024,
        };
        let max_messages = match get("CASUS_MAX_MESSAGES") {
            Some(v) => Some(
                v.trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .context("CASUS_MAX_MESSAGES must be a positive integer")?,
            ),
            None => None,
        };

        Ok(Self {
            bind_addr,
            static_dir,
            backend,
            model,
            max_tokens,
            max_messages,
        })
    }
}
