use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Point-in-time view of one live SMTP connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub uuid: String,
    pub remote_addr: String,
    pub from: String,
    pub to: Vec<String>,
    pub authenticated: bool,
    pub username: String,
}

impl ConnectionInfo {
    #[must_use]
    pub fn new(uuid: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            remote_addr: remote_addr.into(),
            ..Self::default()
        }
    }
}

impl Display for ConnectionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "UUID:      {}", self.uuid)?;
        writeln!(f, "Remote:    {}", self.remote_addr)?;
        writeln!(f, "From:      {}", self.from)?;
        writeln!(f, "To:        {}", self.to.join(", "))?;
        if self.authenticated {
            writeln!(f, "Auth:      {}", self.username)
        } else {
            writeln!(f, "Auth:      -")
        }
    }
}
