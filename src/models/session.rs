/*
Session-side models: the credentials we log in with and what we persist
about the current Garmin session.
*/

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Garmin Connect login. Loaded once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }
}

// The password must never reach a log line.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Written to the token directory after a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArtifact {
    pub display_name: String,
    pub logged_in_at: DateTime<Utc>,
}

/// Snapshot of the session cache, reported by `/health`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionStatus {
    pub active: bool,
    pub age_seconds: Option<u64>,
}
