use serde::{Deserialize, Serialize};

/// Transport security a discovered server expects on its advertised port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Security {
    #[serde(rename = "ssl")]
    Ssl,
    #[serde(rename = "starttls")]
    Starttls,
    #[serde(rename = "none")]
    NoSecurity,
}

impl Security {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Security::Ssl => "ssl",
            Security::Starttls => "starttls",
            Security::NoSecurity => "none",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ssl" => Some(Security::Ssl),
            "starttls" => Some(Security::Starttls),
            "none" => Some(Security::NoSecurity),
            _ => None,
        }
    }
}

/// How a client should derive the login username for a discovered server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsernameFormat {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "localPart")]
    LocalPart,
}

impl UsernameFormat {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            UsernameFormat::Email => "email",
            UsernameFormat::LocalPart => "localPart",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "email" => Some(UsernameFormat::Email),
            "localPart" => Some(UsernameFormat::LocalPart),
            _ => None,
        }
    }
}

/// Which strategy produced a [`ServerConfig`]. Carries a fixed priority: lower
/// numbers are more authoritative and win ties during dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "ispdb")]
    Ispdb,
    #[serde(rename = "autoconfig")]
    Autoconfig,
    #[serde(rename = "mx")]
    Mx,
    #[serde(rename = "guess")]
    Guess,
}

impl Source {
    /// The fixed priority associated with this source: 1 (most trusted) to 4
    /// (least trusted, a bare TCP-connect guess).
    pub fn priority(&self) -> i32 {
        match self {
            Source::Ispdb => 1,
            Source::Autoconfig => 2,
            Source::Mx => 3,
            Source::Guess => 4,
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Source::Ispdb => "ispdb",
            Source::Autoconfig => "autoconfig",
            Source::Mx => "mx",
            Source::Guess => "guess",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ispdb" => Some(Source::Ispdb),
            "autoconfig" => Some(Source::Autoconfig),
            "mx" => Some(Source::Mx),
            "guess" => Some(Source::Guess),
            _ => None,
        }
    }
}

/// One candidate (or verified) mail server configuration for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub security: Security,
    pub username_format: UsernameFormat,
    pub source: Source,
    pub priority: i32,
}

impl ServerConfig {
    pub fn new(hostname: impl Into<String>, port: u16, security: Security, username_format: UsernameFormat, source: Source) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            security,
            username_format,
            source,
            priority: source.priority(),
        }
    }

    /// Dedup key: case-insensitive hostname plus port, per §4.9's dedup rule.
    pub fn dedup_key(&self) -> (String, u16) {
        (self.hostname.to_ascii_lowercase(), self.port)
    }
}
