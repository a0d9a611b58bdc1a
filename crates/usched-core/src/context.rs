//! Endpoint and credential configuration for an engine session.

use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::traits::EngineError;

/// Hostname limit, including the terminator the engine reserves.
pub const HOSTNAME_MAX: usize = 256;
/// Port limit: five digits plus terminator.
pub const PORT_MAX: usize = 6;
/// Username limit.
pub const USERNAME_MAX: usize = 32;
/// Password limit.
pub const PASSWORD_MAX: usize = 128;

/// Which configuration field a value is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Hostname,
    Port,
    Username,
    Password,
}

impl ConfigField {
    /// Every field, in engine order.
    pub const ALL: [Self; 4] = [Self::Hostname, Self::Port, Self::Username, Self::Password];

    /// Buffer size the engine allots to this field.
    #[must_use]
    pub const fn limit(self) -> usize {
        match self {
            Self::Hostname => HOSTNAME_MAX,
            Self::Port => PORT_MAX,
            Self::Username => USERNAME_MAX,
            Self::Password => PASSWORD_MAX,
        }
    }

    /// Environment variable consulted by [`SessionConfig::from_env`].
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Hostname => "USCHED_HOSTNAME",
            Self::Port => "USCHED_PORT",
            Self::Username => "USCHED_USERNAME",
            Self::Password => "USCHED_PASSWORD",
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::Port => "port",
            Self::Username => "username",
            Self::Password => "password",
        }
    }
}

/// Remote endpoint and credentials.
///
/// Unset fields leave the engine on its local defaults. Values must be
/// strictly shorter than the field limit, as the engine stores them in
/// fixed buffers with a terminator.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

impl SessionConfig {
    /// Empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file and validate every field.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), remote = config.is_remote(), "Configuration loaded");
        Ok(config)
    }

    /// Build from `USCHED_*` environment variables.
    ///
    /// Variables that are not valid Unicode are ignored.
    ///
    /// # Errors
    /// Returns error if a variable holds an over-long value.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?))),
        )
    }

    /// Build from `(name, value)` pairs, keeping the `USCHED_*` ones.
    ///
    /// # Errors
    /// Returns error if a recognized variable holds an over-long value.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::new();
        for (key, value) in vars {
            let Some(field) = ConfigField::ALL
                .into_iter()
                .find(|field| field.env_var() == key.as_ref())
            else {
                continue;
            };
            tracing::debug!(var = field.env_var(), "Configuration from environment");
            config.set(field, value)?;
        }
        Ok(config)
    }

    /// Set one field after checking its length.
    ///
    /// # Errors
    /// Returns a config error if the value does not fit.
    pub fn set(&mut self, field: ConfigField, value: impl Into<String>) -> Result<(), EngineError> {
        let value = value.into();
        check(field, &value)?;
        *self.slot(field) = Some(value);
        Ok(())
    }

    /// Current value of a field.
    #[must_use]
    pub fn get(&self, field: ConfigField) -> Option<&str> {
        match field {
            ConfigField::Hostname => self.hostname.as_deref(),
            ConfigField::Port => self.port.as_deref(),
            ConfigField::Username => self.username.as_deref(),
            ConfigField::Password => self.password.as_deref(),
        }
    }

    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.get(ConfigField::Hostname)
    }

    #[must_use]
    pub fn port(&self) -> Option<&str> {
        self.get(ConfigField::Port)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.get(ConfigField::Username)
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.get(ConfigField::Password)
    }

    /// Whether a remote endpoint was configured.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        self.hostname.is_some()
    }

    /// Check every field; used after deserializing.
    ///
    /// # Errors
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        for field in [
            ConfigField::Hostname,
            ConfigField::Port,
            ConfigField::Username,
            ConfigField::Password,
        ] {
            if let Some(value) = self.get(field) {
                check(field, value)?;
            }
        }
        Ok(())
    }

    fn slot(&mut self, field: ConfigField) -> &mut Option<String> {
        match field {
            ConfigField::Hostname => &mut self.hostname,
            ConfigField::Port => &mut self.port,
            ConfigField::Username => &mut self.username,
            ConfigField::Password => &mut self.password,
        }
    }
}

fn check(field: ConfigField, value: &str) -> Result<(), EngineError> {
    if value.len() >= field.limit() {
        return Err(EngineError::Config(format!(
            "{} must be shorter than {} bytes",
            field.name(),
            field.limit()
        )));
    }
    if value.as_bytes().contains(&0) {
        return Err(EngineError::Config(format!(
            "{} contains a NUL byte",
            field.name()
        )));
    }
    Ok(())
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_limits_exclude_terminator() {
        let mut config = SessionConfig::new();
        assert!(config.set(ConfigField::Port, "65535").is_ok());
        assert!(config.set(ConfigField::Port, "123456").is_err());
        assert_eq!(config.port(), Some("65535"));

        assert!(config.set(ConfigField::Username, "u".repeat(31)).is_ok());
        assert!(matches!(
            config.set(ConfigField::Username, "u".repeat(32)),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_rejected_value_leaves_previous() {
        let mut config = SessionConfig::new();
        config.set(ConfigField::Hostname, "sched.local").unwrap();
        assert!(config.set(ConfigField::Hostname, "h".repeat(300)).is_err());
        assert_eq!(config.hostname(), Some("sched.local"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = SessionConfig::new();
        config.set(ConfigField::Password, "hunter2").unwrap();
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_vars_pick_usched_settings() {
        let config = SessionConfig::from_vars([
            ("PATH", "/usr/bin"),
            ("USCHED_HOSTNAME", "sched.example.net"),
            ("USCHED_PORT", "7600"),
            ("USCHED_PASSWORD", "hunter2"),
        ])
        .unwrap();

        assert_eq!(config.hostname(), Some("sched.example.net"));
        assert_eq!(config.port(), Some("7600"));
        assert_eq!(config.username(), None);
        assert!(config.is_remote());
    }

    #[test]
    fn test_vars_reject_overlong_value() {
        let err = SessionConfig::from_vars([("USCHED_PORT", "76000000")]).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        let expected = SessionConfig::from_vars(std::env::vars()).unwrap_or_default();
        assert_eq!(SessionConfig::from_env().unwrap_or_default(), expected);
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hostname": "127.0.0.1", "port": "7600"}}"#).unwrap();
        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.hostname(), Some("127.0.0.1"));
        assert!(config.is_remote());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"port": "7600000"}}"#).unwrap();
        assert!(SessionConfig::from_file(bad.path()).is_err());
    }
}
