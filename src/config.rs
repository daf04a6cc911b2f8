//! Process configuration.
//!
//! The binary builds one [`AppConfig`] at start-up from CLI flags and environment variables
//! (flags win) and hands it to the server. Nothing below this module inspects the process
//! environment.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

pub const DEFAULT_HTTP_PORT: u16 = 7878;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

pub const HELP: &str = "advisorhub server\n\nUSAGE:\n  advisorhub_server [OPTIONS]\n\nOPTIONS:\n  --http-port N            HTTP API port (env: ADVISORHUB_HTTP_PORT, default 7878)\n  --database-url URL       postgres:// endpoint; omit for the in-memory store (env: ADVISORHUB_DATABASE_URL)\n  --database-user U        database user override (env: ADVISORHUB_DATABASE_USER)\n  --database-password P    database password override (env: ADVISORHUB_DATABASE_PASSWORD)\n  --environment TAG        local | development | staging | production (env: ADVISORHUB_ENV, default production)\n  --seed-demo              load demo firms and contacts into an empty store (env: ADVISORHUB_SEED_DEMO)\n  --session-ttl-secs N     session lifetime in seconds (env: ADVISORHUB_SESSION_TTL_SECS, default 3600)\n  -h, --help               print this help\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Local,
    Development,
    Staging,
    #[default]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Administrative advisor provisioning and demo seeding are off in production.
    pub fn allows_provisioning(&self) -> bool { *self != Environment::Production }

    /// Plain-HTTP local runs cannot carry `Secure` cookies.
    pub fn secure_cookies(&self) -> bool { *self != Environment::Local }
}

impl FromStr for Environment {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "preview" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow!("unknown environment '{}'", other)),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("user", &self.user).field("password", &"<redacted>").finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// `postgres://...` endpoint. `None` selects the in-memory store.
    pub endpoint: Option<String>,
    /// Overrides any user/password embedded in the endpoint.
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub http_port: u16,
    pub store: StoreConfig,
    pub environment: Environment,
    pub session_ttl: Duration,
    pub seed_demo: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            store: StoreConfig::default(),
            environment: Environment::default(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            seed_demo: false,
        }
    }
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AppConfig {
    /// Build from CLI arguments and an environment lookup. Flags override variables, which
    /// override defaults. Malformed values are errors rather than silently ignored.
    pub fn from_sources<F>(args: &[String], env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();

        if let Some(port) = arg_value(args, "--http-port").or_else(|| env("ADVISORHUB_HTTP_PORT")) {
            cfg.http_port = port.trim().parse().map_err(|_| anyhow!("invalid http port '{}'", port))?;
        }
        if let Some(tag) = arg_value(args, "--environment").or_else(|| env("ADVISORHUB_ENV")) {
            cfg.environment = tag.parse()?;
        }
        if let Some(ttl) = arg_value(args, "--session-ttl-secs").or_else(|| env("ADVISORHUB_SESSION_TTL_SECS")) {
            let secs: u64 = ttl.trim().parse().map_err(|_| anyhow!("invalid session ttl '{}'", ttl))?;
            cfg.session_ttl = Duration::from_secs(secs);
        }
        cfg.seed_demo = if has_flag(args, "--seed-demo") {
            true
        } else {
            env("ADVISORHUB_SEED_DEMO").and_then(|v| parse_bool(&v)).unwrap_or(false)
        };

        cfg.store.endpoint = arg_value(args, "--database-url")
            .or_else(|| env("ADVISORHUB_DATABASE_URL"))
            .filter(|s| !s.trim().is_empty());
        let user = arg_value(args, "--database-user").or_else(|| env("ADVISORHUB_DATABASE_USER"));
        let password = arg_value(args, "--database-password").or_else(|| env("ADVISORHUB_DATABASE_PASSWORD"));
        cfg.store.credentials = match (user, password) {
            (Some(user), Some(password)) => Some(Credentials { user, password }),
            (Some(user), None) => Some(Credentials { user, password: String::new() }),
            (None, Some(_)) => return Err(anyhow!("database password given without a database user")),
            (None, None) => None,
        };
        Ok(cfg)
    }
}
