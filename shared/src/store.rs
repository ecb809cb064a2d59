//! Cookie-style persistence for the two identifiers the widget remembers.
//!
//! The browser widget kept the user id and conversation id in cookies with an
//! expiry. `CookieStore` gives the same contract; `FileCookieStore` persists it
//! as JSON so repeat runs reuse the identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Cookie holding the anonymous user identity.
pub const USER_ID_COOKIE: &str = "user-id";
/// Cookie holding the active conversation id.
pub const CONVERSATION_ID_COOKIE: &str = "conversation-id";

/// Lifetime of the user identity cookie.
pub fn user_id_ttl() -> Duration {
    Duration::days(365)
}

/// Lifetime of the conversation id cookie.
pub fn conversation_id_ttl() -> Duration {
    Duration::days(1)
}

/// Key/value storage with per-entry expiry. Last writer wins.
pub trait CookieStore: Send + Sync {
    /// Current value, or `None` when absent or expired.
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str, ttl: Duration);
    fn remove(&self, name: &str);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCookie {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredCookie {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Cookie jar that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    cookies: Mutex<HashMap<String, StoredCookie>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies
            .get(name)
            .filter(|c| c.is_live(Utc::now()))
            .map(|c| c.value.clone())
    }

    fn set(&self, name: &str, value: &str, ttl: Duration) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
    }

    fn remove(&self, name: &str) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.remove(name);
    }
}

/// Cookie jar persisted to a JSON file.
#[derive(Debug)]
pub struct FileCookieStore {
    path: PathBuf,
    cookies: Mutex<HashMap<String, StoredCookie>>,
}

impl FileCookieStore {
    /// Open the jar at `path`, dropping anything already expired.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut cookies: HashMap<String, StoredCookie> = match std::fs::read_to_string(&path) {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(Error::Config(format!(
                    "Failed to read cookie jar {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let now = Utc::now();
        cookies.retain(|_, c| c.is_live(now));

        Ok(Self {
            path,
            cookies: Mutex::new(cookies),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cookies: &HashMap<String, StoredCookie>) {
        if let Err(e) = write_jar(&self.path, cookies) {
            warn!("Failed to persist cookie jar {}: {}", self.path.display(), e);
        }
    }
}

fn write_jar(path: &Path, cookies: &HashMap<String, StoredCookie>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cookies)?;
    std::fs::write(path, json)
}

impl CookieStore for FileCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies
            .get(name)
            .filter(|c| c.is_live(Utc::now()))
            .map(|c| c.value.clone())
    }

    fn set(&self, name: &str, value: &str, ttl: Duration) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        self.persist(&cookies);
    }

    fn remove(&self, name: &str) {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        if cookies.remove(name).is_some() {
            self.persist(&cookies);
        }
    }
}
