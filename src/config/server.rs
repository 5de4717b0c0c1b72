use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::auth::session::REFRESH_LEEWAY_SECS;
use crate::error::{Error, Result};

const LOCAL_COOKIE_NAME: &str = "roster-auth-token";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    Hosted,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Hosted => write!(f, "hosted"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(ProviderKind::Local),
            "hosted" => Ok(ProviderKind::Hosted),
            other => Err(Error::Config(format!(
                "unknown provider '{other}' (expected 'local' or 'hosted')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub provider: ProviderKind,
    /// Base URL of the hosted provider (e.g., "https://abcd.supabase.co").
    pub provider_url: Option<String>,
    /// Public (anon) API key sent with every hosted provider request.
    pub anon_key: Option<String>,
    /// Overrides the derived session cookie name.
    pub cookie_name: Option<String>,
    /// Mark session cookies `Secure`. Enable when served over HTTPS.
    pub secure_cookies: bool,
    /// Lifetime of access tokens issued by the local provider.
    pub access_token_ttl_secs: i64,
    pub http_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("roster.db")
    }

    /// Loads a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Session cookie name: the explicit override, else `sb-<project-ref>-auth-token`
    /// for a hosted provider, else a fixed local name.
    #[must_use]
    pub fn session_cookie_name(&self) -> String {
        if let Some(name) = &self.cookie_name {
            return name.clone();
        }

        match (self.provider, self.provider_url.as_deref().and_then(project_ref)) {
            (ProviderKind::Hosted, Some(project)) => format!("sb-{project}-auth-token"),
            _ => LOCAL_COOKIE_NAME.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.cookie_name {
            if name.is_empty() || name.contains(|c: char| c.is_whitespace() || ";=,".contains(c)) {
                return Err(Error::Config(format!("invalid cookie name '{name}'")));
            }
        }

        if self.access_token_ttl_secs <= REFRESH_LEEWAY_SECS {
            return Err(Error::Config(format!(
                "access_token_ttl_secs must be greater than {REFRESH_LEEWAY_SECS}"
            )));
        }

        if self.provider == ProviderKind::Hosted {
            let url = self
                .provider_url
                .as_deref()
                .and_then(|url| Url::parse(url).ok());
            if !url.is_some_and(|url| matches!(url.scheme(), "http" | "https")) {
                return Err(Error::Config(
                    "hosted provider requires provider_url (http:// or https://)".into(),
                ));
            }
            if self.anon_key.as_deref().unwrap_or_default().is_empty() {
                return Err(Error::Config("hosted provider requires anon_key".into()));
            }
        }

        Ok(())
    }
}

/// First label of the URL host, e.g. "abcd" for "https://abcd.supabase.co".
/// IPv6 hosts have no usable label.
fn project_ref(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str().filter(|host| !host.starts_with('['))?;
    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            provider: ProviderKind::Local,
            provider_url: None,
            anon_key: None,
            cookie_name: None,
            secure_cookies: false,
            access_token_ttl_secs: 3600,
            http_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hosted(url: &str) -> ServerConfig {
        ServerConfig {
            provider: ProviderKind::Hosted,
            provider_url: Some(url.to_string()),
            anon_key: Some("anon".to_string()),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_cookie_name_derivation() {
        assert_eq!(
            ServerConfig::default().session_cookie_name(),
            "roster-auth-token"
        );
        assert_eq!(
            hosted("https://abcd.supabase.co").session_cookie_name(),
            "sb-abcd-auth-token"
        );
        assert_eq!(
            hosted("http://127.0.0.1:54321").session_cookie_name(),
            "sb-127-auth-token"
        );

        let overridden = ServerConfig {
            cookie_name: Some("custom".into()),
            ..hosted("https://abcd.supabase.co")
        };
        assert_eq!(overridden.session_cookie_name(), "custom");
    }

    #[test]
    fn test_validate_hosted_requires_url_and_key() {
        assert!(hosted("https://abcd.supabase.co").validate().is_ok());
        assert!(hosted("abcd.supabase.co").validate().is_err());

        let keyless = ServerConfig {
            anon_key: None,
            ..hosted("https://abcd.supabase.co")
        };
        assert!(keyless.validate().is_err());

        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_project_ref_uses_first_host_label() {
        assert_eq!(project_ref("https://abcd.supabase.co/").as_deref(), Some("abcd"));
        assert_eq!(
            project_ref("https://user:pw@abcd.supabase.co:443/rest").as_deref(),
            Some("abcd")
        );
        assert_eq!(project_ref("http://127.0.0.1:54321").as_deref(), Some("127"));
        assert_eq!(project_ref("http://[::1]:54321"), None);
        assert_eq!(project_ref("not a url"), None);

        assert_eq!(
            hosted("http://[::1]:54321").session_cookie_name(),
            "roster-auth-token"
        );
    }

    #[test]
    fn test_validate_requires_ttl_above_refresh_leeway() {
        let short = ServerConfig {
            access_token_ttl_secs: REFRESH_LEEWAY_SECS,
            ..ServerConfig::default()
        };
        assert!(matches!(short.validate(), Err(Error::Config(msg)) if msg.contains("access_token_ttl_secs")));

        let enough = ServerConfig {
            access_token_ttl_secs: REFRESH_LEEWAY_SECS + 1,
            ..ServerConfig::default()
        };
        assert!(enough.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_cookie_name() {
        let config = ServerConfig {
            cookie_name: Some("a b".into()),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("roster.toml");
        std::fs::write(
            &path,
            "port = 9000\nprovider = \"hosted\"\nprovider_url = \"https://x.supabase.co\"\n",
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.provider, ProviderKind::Hosted);
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("roster.toml");
        std::fs::write(&path, "provider = \"cloud\"\n").unwrap();

        assert!(matches!(
            ServerConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert_eq!("hosted".parse::<ProviderKind>().unwrap(), ProviderKind::Hosted);
        assert!("cloud".parse::<ProviderKind>().is_err());
    }
}
