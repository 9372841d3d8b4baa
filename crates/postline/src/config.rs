//! Session configuration.

use crate::error::{Error, Result};
use postline_smtp::{AuthMechanism, TlsVerification};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    /// No encryption (port 25). **Not recommended outside trusted networks.**
    #[default]
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 587).
    StartTls,
    /// TLS from the start (port 465).
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Implicit => 465,
        }
    }
}

/// SASL mechanism to authenticate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    /// AUTH LOGIN
    Login,
    /// AUTH PLAIN
    Plain,
}

impl AuthKind {
    /// The matching SMTP mechanism.
    #[must_use]
    pub const fn mechanism(self) -> AuthMechanism {
        match self {
            Self::Login => AuthMechanism::Login,
            Self::Plain => AuthMechanism::Plain,
        }
    }
}

impl FromStr for AuthKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "login" => Ok(Self::Login),
            "plain" => Ok(Self::Plain),
            other => Err(Error::Config(format!("unknown AUTH type: {other:?}"))),
        }
    }
}

/// Login credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username (often the full email address).
    pub username: String,
    /// Password.
    pub password: String,
    /// Mechanism.
    pub kind: AuthKind,
}

impl Credentials {
    /// Creates credentials for the given mechanism.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>, kind: AuthKind) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            kind,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("kind", &self.kind)
            .finish()
    }
}

/// SMTP session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay hostname.
    pub host: String,
    /// Relay port; `None` picks the default for `security`.
    pub port: Option<u16>,
    /// Security mode.
    pub security: Security,
    /// Deadline for each single read, write, connect or handshake.
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    /// Credentials; `None` skips AUTH.
    pub credentials: Option<Credentials>,
    /// EHLO/HELO argument; `None` uses the local hostname.
    pub node_name: Option<String>,
    /// Server certificate policy.
    pub tls_verification: TlsVerification,
    /// Log the SMTP conversation at `debug` instead of `trace`.
    pub transcript: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Config {
    /// Creates a plaintext configuration on port 25.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::None,
            timeout: DEFAULT_TIMEOUT,
            credentials: None,
            node_name: None,
            tls_verification: TlsVerification::Full,
            transcript: false,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Port actually connected to.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.security.default_port())
    }

    /// Name announced in EHLO/HELO.
    ///
    /// Falls back to the local hostname, then to `localhost`.
    #[must_use]
    pub fn node_name(&self) -> String {
        self.node_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|name| name.into_string().ok())
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Checks that a session can be opened with this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("No SMTP host!".into()));
        }
        if self.port() == 0 {
            return Err(Error::Config("Invalid SMTP port!".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("Invalid timeout!".into()));
        }
        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() {
                return Err(Error::Config("No AUTH username!".into()));
            }
        }
        Ok(())
    }
}

/// Builder for session configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: Config::new(host),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.config.security = security;
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Enables AUTH with the given credentials.
    #[must_use]
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        kind: AuthKind,
    ) -> Self {
        self.config.credentials = Some(Credentials::new(username, password, kind));
        self
    }

    /// Sets the EHLO/HELO name.
    #[must_use]
    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.config.node_name = Some(node_name.into());
        self
    }

    /// Sets the certificate policy.
    #[must_use]
    pub const fn tls_verification(mut self, verification: TlsVerification) -> Self {
        self.config.tls_verification = verification;
        self
    }

    /// Enables verbose wire logging.
    #[must_use]
    pub const fn transcript(mut self, transcript: bool) -> Self {
        self.config.transcript = transcript;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
