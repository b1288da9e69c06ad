//! Plugin launch configuration
//!
//! Terraform configures a plugin process through its environment (go-plugin
//! contract). Everything is read through a lookup function so tests do not
//! have to touch the process environment.

use crate::error::{Error, Result};

/// Magic cookie Terraform sets before launching a provider
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// go-plugin core protocol version
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Terraform plugin protocol version served
pub const PROTOCOL_VERSION: u32 = 6;

/// Registry address used for TF_REATTACH_PROVIDERS in debug mode
pub const DEFAULT_PROVIDER_ADDRESS: &str = "registry.terraform.io/hashicorp/wodata";

/// Plugin server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// Value of the magic cookie, if Terraform set one
    pub magic_cookie: Option<String>,

    /// Protocol versions offered by the client (PLUGIN_PROTOCOL_VERSIONS)
    pub protocol_versions: Option<Vec<u32>>,

    /// Inclusive port range to listen on (PLUGIN_MIN_PORT / PLUGIN_MAX_PORT)
    pub port_range: Option<(u16, u16)>,

    /// Run unmanaged and print reattach settings instead of the handshake
    pub debug: bool,

    /// Provider source address for reattach output
    pub provider_address: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            magic_cookie: None,
            protocol_versions: None,
            port_range: None,
            debug: false,
            provider_address: DEFAULT_PROVIDER_ADDRESS.to_string(),
        }
    }
}

impl ServeConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let protocol_versions = match lookup("PLUGIN_PROTOCOL_VERSIONS") {
            Some(raw) if !raw.trim().is_empty() => Some(parse_versions(&raw)?),
            _ => None,
        };

        let port_range = match (lookup("PLUGIN_MIN_PORT"), lookup("PLUGIN_MAX_PORT")) {
            (Some(min), Some(max)) => {
                let min = parse_port("PLUGIN_MIN_PORT", &min)?;
                let max = parse_port("PLUGIN_MAX_PORT", &max)?;
                if min > max {
                    return Err(Error::InvalidConfig(format!(
                        "PLUGIN_MIN_PORT {} is greater than PLUGIN_MAX_PORT {}",
                        min, max
                    )));
                }
                Some((min, max))
            }
            _ => None,
        };

        Ok(Self {
            magic_cookie: lookup(MAGIC_COOKIE_KEY),
            protocol_versions,
            port_range,
            ..Default::default()
        })
    }

    /// Whether the process was launched by Terraform
    pub fn launched_by_terraform(&self) -> bool {
        self.magic_cookie.as_deref() == Some(MAGIC_COOKIE_VALUE)
    }

    /// Pick the protocol version to serve
    pub fn negotiate_protocol(&self) -> Result<u32> {
        match &self.protocol_versions {
            None => Ok(PROTOCOL_VERSION),
            Some(offered) if offered.contains(&PROTOCOL_VERSION) => Ok(PROTOCOL_VERSION),
            Some(offered) => Err(Error::IncompatibleProtocol {
                offered: offered
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
                supported: PROTOCOL_VERSION,
            }),
        }
    }
}

fn parse_versions(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(|v| {
            v.trim().parse::<u32>().map_err(|_| {
                Error::InvalidConfig(format!("invalid PLUGIN_PROTOCOL_VERSIONS entry '{}'", v))
            })
        })
        .collect()
}

fn parse_port(key: &str, raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| Error::InvalidConfig(format!("invalid {} '{}'", key, raw)))
}

/// Tracing filter directive for the provider process.
///
/// `RUST_LOG` wins; otherwise Terraform's `TF_LOG_PROVIDER` / `TF_LOG` levels
/// are translated.
pub fn log_filter(lookup: impl Fn(&str) -> Option<String>) -> String {
    if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.is_empty()) {
        return filter;
    }

    let tf_level = lookup("TF_LOG_PROVIDER")
        .filter(|l| !l.is_empty())
        .or_else(|| lookup("TF_LOG").filter(|l| !l.is_empty()));

    let level = match tf_level.map(|l| l.to_ascii_uppercase()).as_deref() {
        Some("TRACE") | Some("JSON") => "trace",
        Some("DEBUG") => "debug",
        Some("WARN") => "warn",
        Some("ERROR") => "error",
        Some("OFF") => "off",
        _ => "info",
    };
    level.to_string()
}
