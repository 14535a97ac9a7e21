//! Authorization header computation.
//!
//! Tokens are read through the [`CredentialStore`] port. Both stores are
//! queried on every call so a token refreshed between retries is observed.

use std::{
    collections::HashMap,
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, RwLock},
};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Candidate token keys, highest priority first.
pub const DEFAULT_TOKEN_KEYS: [&str; 4] = ["auth_token", "access_token", "token", "jwt"];
/// Key holding the hosting application's session init-data.
pub const TWA_INIT_DATA_KEY: &str = "twa_init_data";

/// How outgoing requests are authenticated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthStrategy {
    /// `Authorization: Bearer <token>`.
    #[default]
    Jwt,
    /// `Authorization: TWA <initData>`.
    Twa,
    /// No authorization header.
    None,
}

impl AuthStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::Twa => "twa",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jwt" => Ok(Self::Jwt),
            "twa" => Ok(Self::Twa),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown auth strategy '{other}' (expected jwt, twa or none)"
            )),
        }
    }
}

/// Read-only key-value store holding credentials.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}

/// Credential store backed by a JSON object file.
///
/// The file is re-read on every lookup. A missing or malformed file, or a
/// non-string value, reads as absent.
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let parsed: serde_json::Value = serde_json::from_str(&content).ok()?;
        parsed.get(key)?.as_str().map(str::to_owned)
    }
}

/// Computes the authorization header for a given strategy.
#[derive(Clone)]
pub struct AuthResolver {
    persistent: Arc<dyn CredentialStore>,
    session: Arc<dyn CredentialStore>,
    token_keys: Vec<String>,
}

impl fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResolver")
            .field("token_keys", &self.token_keys)
            .field("stores", &"<redacted>")
            .finish()
    }
}

impl Default for AuthResolver {
    fn default() -> Self {
        Self::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryCredentialStore::new()),
        )
    }
}

impl AuthResolver {
    /// Creates a resolver over a persistent and a session-scoped store.
    pub fn new(persistent: Arc<dyn CredentialStore>, session: Arc<dyn CredentialStore>) -> Self {
        Self {
            persistent,
            session,
            token_keys: DEFAULT_TOKEN_KEYS.iter().map(|key| (*key).to_owned()).collect(),
        }
    }

    /// Replaces the bearer-token lookup order.
    pub fn with_token_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.token_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn token_keys(&self) -> &[String] {
        &self.token_keys
    }

    /// Finds the bearer token.
    ///
    /// Every key is tried in the persistent store first, then every key in
    /// the session store. The first non-blank value wins.
    pub fn bearer_token(&self) -> Option<String> {
        [&self.persistent, &self.session]
            .into_iter()
            .flat_map(|store| self.token_keys.iter().map(move |key| store.get(key)))
            .find_map(non_blank)
    }

    /// Session init-data, session store first.
    pub fn init_data(&self) -> Option<String> {
        non_blank(self.session.get(TWA_INIT_DATA_KEY))
            .or_else(|| non_blank(self.persistent.get(TWA_INIT_DATA_KEY)))
    }

    /// Headers to attach to one attempt. Never fails: a missing credential
    /// just leaves the header out.
    pub fn compute_headers(&self, strategy: AuthStrategy) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let authorization = match strategy {
            AuthStrategy::Jwt => self.bearer_token().map(|token| format!("Bearer {token}")),
            AuthStrategy::Twa => self.init_data().map(|data| format!("TWA {data}")),
            AuthStrategy::None => None,
        };

        if let Some(authorization) = authorization {
            match HeaderValue::from_str(&authorization) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        strategy = %strategy,
                        "stored credential is not a valid header value; sending without auth"
                    );
                }
            }
        }
        headers
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::header::AUTHORIZATION;

    use super::{AuthResolver, AuthStrategy, FileCredentialStore, MemoryCredentialStore};
    use crate::auth::CredentialStore;

    fn resolver(persistent: MemoryCredentialStore, session: MemoryCredentialStore) -> AuthResolver {
        AuthResolver::new(Arc::new(persistent), Arc::new(session))
    }

    #[test]
    fn first_populated_key_in_priority_order_wins() {
        let persistent = MemoryCredentialStore::new().with_value("C", "token-c");
        let auth = resolver(persistent, MemoryCredentialStore::new())
            .with_token_keys(["A", "B", "C", "D"]);

        let headers = auth.compute_headers(AuthStrategy::Jwt);
        assert_eq!(headers[AUTHORIZATION], "Bearer token-c");
    }

    #[test]
    fn earlier_key_beats_later_key_and_blank_values_are_skipped() {
        let persistent = MemoryCredentialStore::new()
            .with_value("A", "   ")
            .with_value("B", "token-b")
            .with_value("D", "token-d");
        let auth = resolver(persistent, MemoryCredentialStore::new())
            .with_token_keys(["A", "B", "C", "D"]);

        assert_eq!(auth.bearer_token().as_deref(), Some("token-b"));
    }

    #[test]
    fn session_store_is_consulted_after_persistent_store() {
        let session = MemoryCredentialStore::new().with_value("auth_token", "from-session");
        let auth = resolver(MemoryCredentialStore::new(), session);
        assert_eq!(auth.bearer_token().as_deref(), Some("from-session"));

        let persistent = MemoryCredentialStore::new().with_value("jwt", "from-persistent");
        let session = MemoryCredentialStore::new().with_value("auth_token", "from-session");
        let auth = resolver(persistent, session);
        assert_eq!(auth.bearer_token().as_deref(), Some("from-persistent"));
    }

    #[test]
    fn missing_token_omits_header() {
        let auth = AuthResolver::default();
        assert!(auth.compute_headers(AuthStrategy::Jwt).is_empty());
    }

    #[test]
    fn twa_strategy_uses_init_data() {
        let session = MemoryCredentialStore::new().with_value("twa_init_data", "query_id=1&hash=ab");
        let auth = resolver(MemoryCredentialStore::new(), session);
        let headers = auth.compute_headers(AuthStrategy::Twa);
        assert_eq!(headers[AUTHORIZATION], "TWA query_id=1&hash=ab");
    }

    #[test]
    fn none_strategy_never_emits_header() {
        let persistent = MemoryCredentialStore::new().with_value("auth_token", "secret");
        let auth = resolver(persistent, MemoryCredentialStore::new());
        assert!(auth.compute_headers(AuthStrategy::None).is_empty());
    }

    #[test]
    fn invalid_header_value_is_skipped() {
        let persistent = MemoryCredentialStore::new().with_value("auth_token", "bad\ntoken");
        let auth = resolver(persistent, MemoryCredentialStore::new());
        assert!(auth.compute_headers(AuthStrategy::Jwt).is_empty());
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("JWT".parse::<AuthStrategy>(), Ok(AuthStrategy::Jwt));
        assert_eq!(" twa ".parse::<AuthStrategy>(), Ok(AuthStrategy::Twa));
        assert_eq!("none".parse::<AuthStrategy>(), Ok(AuthStrategy::None));
        assert!("basic".parse::<AuthStrategy>().is_err());
        assert_eq!(AuthStrategy::Twa.to_string(), "twa");
    }

    #[test]
    fn file_store_reads_fresh_values() {
        let path = std::env::temp_dir().join(format!(
            "analytics-http-credentials-{}.json",
            std::process::id()
        ));
        let store = FileCredentialStore::new(&path);
        assert_eq!(store.get("auth_token"), None);

        std::fs::write(&path, r#"{"auth_token": "first"}"#).expect("must write file");
        assert_eq!(store.get("auth_token").as_deref(), Some("first"));

        std::fs::write(&path, r#"{"auth_token": "second", "count": 3}"#)
            .expect("must write file");
        assert_eq!(store.get("auth_token").as_deref(), Some("second"));
        assert_eq!(store.get("count"), None);

        let _ = std::fs::remove_file(&path);
    }
}
