use std::collections::BTreeMap;

pub const HOST_NAME: &str = "HostName";
pub const USER_NAME: &str = "UserName";
pub const PORT_NUMBER: &str = "PortNumber";
pub const PROTOCOL: &str = "Protocol";
pub const PROXY_METHOD: &str = "ProxyMethod";
pub const PROXY_HOST: &str = "ProxyHost";
pub const PROXY_PORT: &str = "ProxyPort";
pub const PROXY_USERNAME: &str = "ProxyUsername";
pub const PUBLIC_KEY_FILE: &str = "PublicKeyFile";
pub const REMOTE_COMMAND: &str = "RemoteCommand";

pub const DEFAULT_PORT: &str = "22";

/// Names starting with this (case-insensitive) mark disabled or template entries.
const DISABLED_PREFIX: &str = "xxx";

/// All sessions of one export, keyed by session name.
pub type Sessions = BTreeMap<String, Session>;

/// One connection profile. Every property found in the export is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    properties: BTreeMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Property value with surrounding whitespace removed, `None` when absent or blank.
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn host(&self) -> Option<&str> {
        self.get_trimmed(HOST_NAME)
    }

    pub fn user(&self) -> Option<&str> {
        self.get_trimmed(USER_NAME)
    }

    pub fn port(&self) -> &str {
        self.get_trimmed(PORT_NUMBER).unwrap_or(DEFAULT_PORT)
    }

    pub fn has_default_port(&self) -> bool {
        self.port() == DEFAULT_PORT
    }

    pub fn key_file(&self) -> Option<&str> {
        self.get_trimmed(PUBLIC_KEY_FILE)
    }

    pub fn remote_command(&self) -> Option<&str> {
        self.get_trimmed(REMOTE_COMMAND)
    }
}

impl<K, V> FromIterator<(K, V)> for Session
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Whether a session can be offered in the menu: it needs a host and must not be disabled.
pub fn is_usable(name: &str, session: &Session) -> bool {
    let disabled = name
        .get(..DISABLED_PREFIX.len())
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(DISABLED_PREFIX));
    session.host().is_some() && !disabled
}

pub fn usable_sessions(sessions: &Sessions) -> Sessions {
    sessions
        .iter()
        .filter(|(name, session)| is_usable(name, session))
        .map(|(name, session)| (name.clone(), session.clone()))
        .collect()
}
