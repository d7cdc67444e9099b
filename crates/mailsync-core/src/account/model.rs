//! Account model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }

    /// Default IMAP port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Tls => 993,
        }
    }

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tls => "tls",
            Self::StartTls => "starttls",
        }
    }

    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "none" => Self::None,
            "starttls" => Self::StartTls,
            _ => Self::Tls,
        }
    }
}

impl std::str::FromStr for Security {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "plain" => Ok(Self::None),
            "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(format!("unknown security mode: {other}")),
        }
    }
}

/// Server address of a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security.
    pub security: Security,
}

/// Stored mail account.
///
/// The password is held only in protected form; see
/// [`Vault`](super::Vault).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Display name for the account.
    pub name: String,
    /// Email address, also used as the login name.
    pub email: String,
    /// IMAP server.
    pub endpoint: Endpoint,
    /// Password protected by the vault.
    #[serde(skip_serializing)]
    pub protected_password: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the last sync pass completed, if ever.
    pub last_sync: Option<DateTime<Utc>>,
}

/// Fields for creating an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port.
    pub port: u16,
    /// Transport security.
    pub security: Security,
}

impl NewAccount {
    /// Create account fields with the default port for `security`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        host: impl Into<String>,
        security: Security,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            host: host.into(),
            port: security.default_port(),
            security,
        }
    }

    /// The server this account talks to.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            security: self.security,
        }
    }
}

/// Partial update of an account. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New email address.
    pub email: Option<String>,
    /// New server hostname.
    pub host: Option<String>,
    /// New server port.
    pub port: Option<u16>,
    /// New transport security.
    pub security: Option<Security>,
}

impl AccountUpdate {
    /// Applies the update to a copy of the account's editable fields.
    #[must_use]
    pub fn apply(&self, account: &Account) -> NewAccount {
        NewAccount {
            name: self.name.clone().unwrap_or_else(|| account.name.clone()),
            email: self.email.clone().unwrap_or_else(|| account.email.clone()),
            host: self
                .host
                .clone()
                .unwrap_or_else(|| account.endpoint.host.clone()),
            port: self.port.unwrap_or(account.endpoint.port),
            security: self.security.unwrap_or(account.endpoint.security),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_security_parse_and_ports() {
        assert_eq!("SSL".parse::<Security>().unwrap(), Security::Tls);
        assert_eq!("starttls".parse::<Security>().unwrap(), Security::StartTls);
        assert!("bogus".parse::<Security>().is_err());
        assert_eq!(Security::Tls.default_port(), 993);
        assert_eq!(Security::StartTls.default_port(), 143);
    }

    #[test]
    fn test_security_db_round_trip() {
        for security in [Security::None, Security::Tls, Security::StartTls] {
            assert_eq!(Security::from_db(security.as_str()), security);
        }
        assert_eq!(Security::from_db("garbage"), Security::Tls);
    }

    #[test]
    fn test_update_apply_keeps_unset_fields() {
        let account = Account {
            id: AccountId::new(1),
            name: "Work".to_string(),
            email: "me@work.example".to_string(),
            endpoint: Endpoint {
                host: "imap.work.example".to_string(),
                port: 993,
                security: Security::Tls,
            },
            protected_password: String::new(),
            created_at: Utc::now(),
            last_sync: None,
        };
        let update = AccountUpdate {
            port: Some(1993),
            ..AccountUpdate::default()
        };
        let fields = update.apply(&account);
        assert_eq!(fields.name, "Work");
        assert_eq!(fields.host, "imap.work.example");
        assert_eq!(fields.port, 1993);
    }
}
