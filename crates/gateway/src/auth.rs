use std::sync::atomic::{AtomicBool, Ordering};

use {
    argon2::{
        Argon2,
        password_hash::{
            PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
        },
    },
    secrecy::ExposeSecret,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    sqlx::SqlitePool,
};

// ── Types ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Password,
    Passkey,
    ApiKey,
    Loopback,
}

/// A verified identity after successful authentication.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub method: AuthMethod,
}

/// A registered passkey entry (for listing in the UI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasskeyEntry {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// An API key entry (for listing in the UI — never exposes the full key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub id: i64,
    pub label: String,
    pub key_prefix: String,
    pub created_at: String,
}

/// An environment variable entry (for listing in the UI — never exposes the value).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVarEntry {
    pub id: i64,
    pub key: String,
    pub created_at: String,
    pub updated_at: String,
}

// ── Credential store ─────────────────────────────────────────────────────────

/// Single-user credential store backed by SQLite.
pub struct CredentialStore {
    pool: SqlitePool,
    setup_complete: AtomicBool,
    /// When true, auth has been explicitly disabled via "remove all auth".
    /// The middleware and status endpoint treat this as "no auth configured".
    auth_disabled: AtomicBool,
}

impl CredentialStore {
    /// Open a database at the given path, reset all auth, and close it.
    pub async fn reset_from_db_path(db_path: &std::path::Path) -> anyhow::Result<()> {
        let db_url = format!("sqlite:{}", db_path.display());
        let pool = SqlitePool::connect(&db_url).await?;
        let store = Self::new(pool).await?;
        store.reset_all().await
    }

    /// Create a new store and initialize tables.
    /// Reads `auth.disabled` from the discovered config file.
    pub async fn new(pool: SqlitePool) -> anyhow::Result<Self> {
        let config = moltis_config::discover_and_load();
        Self::with_config(pool, &config.auth).await
    }

    /// Create a new store with explicit auth config (avoids reading from disk).
    pub async fn with_config(
        pool: SqlitePool,
        auth_config: &moltis_config::AuthConfig,
    ) -> anyhow::Result<Self> {
        let store = Self {
            pool,
            setup_complete: AtomicBool::new(false),
            auth_disabled: AtomicBool::new(false),
        };
        store.init().await?;
        let has = store.has_password().await?;
        store.setup_complete.store(has, Ordering::Relaxed);
        store
            .auth_disabled
            .store(auth_config.disabled, Ordering::Relaxed);
        Ok(store)
    }

    async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS auth_password (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS passkeys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                credential_id BLOB NOT NULL UNIQUE,
                name TEXT NOT NULL,
                passkey_data BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL,
                key_hash TEXT NOT NULL,
                key_prefix TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                revoked_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS auth_sessions (
                token TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                expires_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS env_variables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Setup ────────────────────────────────────────────────────────────

    /// Whether initial setup (password creation) has been completed.
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.load(Ordering::Relaxed)
    }

    /// Whether authentication has been explicitly disabled via reset.
    pub fn is_auth_disabled(&self) -> bool {
        self.auth_disabled.load(Ordering::Relaxed)
    }

    /// Clear the auth-disabled flag (e.g. after completing localhost setup without a password).
    pub fn clear_auth_disabled(&self) {
        self.auth_disabled.store(false, Ordering::Relaxed);
        let _ = self.persist_auth_disabled(false);
    }

    fn persist_auth_disabled(&self, disabled: bool) -> anyhow::Result<()> {
        moltis_config::update_config(|c| c.auth.disabled = disabled)?;
        Ok(())
    }

    /// Whether a password has been set.
    pub async fn has_password(&self) -> anyhow::Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM auth_password WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // ── Password ─────────────────────────────────────────────────────────

    /// Set the initial password (first-run setup). Fails if already set.
    pub async fn set_initial_password(&self, password: &str) -> anyhow::Result<()> {
        if self.is_setup_complete() {
            anyhow::bail!("password already set");
        }
        let hash = hash_password(password)?;
        sqlx::query("INSERT INTO auth_password (id, password_hash) VALUES (1, ?)")
            .bind(&hash)
            .execute(&self.pool)
            .await?;
        self.setup_complete.store(true, Ordering::Relaxed);
        self.auth_disabled.store(false, Ordering::Relaxed);
        self.persist_auth_disabled(false)?;
        Ok(())
    }

    /// Verify a password against the stored hash.
    pub async fn verify_password(&self, password: &str) -> anyhow::Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM auth_password WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        let Some((hash,)) = row else {
            return Ok(false);
        };
        Ok(verify_password(password, &hash))
    }

    /// Change the password (requires correct current password).
    pub async fn change_password(&self, current: &str, new_password: &str) -> anyhow::Result<()> {
        if !self.verify_password(current).await? {
            anyhow::bail!("current password is incorrect");
        }
        let hash = hash_password(new_password)?;
        sqlx::query(
            "UPDATE auth_password SET password_hash = ?, updated_at = datetime('now') WHERE id = 1",
        )
        .bind(&hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Create a new session token (30-day expiry).
    pub async fn create_session(&self) -> anyhow::Result<String> {
        let token = generate_token();
        sqlx::query(
            "INSERT INTO auth_sessions (token, expires_at) VALUES (?, datetime('now', '+30 days'))",
        )
        .bind(&token)
        .execute(&self.pool)
        .await?;
        Ok(token)
    }

    /// Validate a session token. Returns true if valid and not expired.
    pub async fn validate_session(&self, token: &str) -> anyhow::Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT token FROM auth_sessions WHERE token = ? AND expires_at > datetime('now')",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Delete a session (logout).
    pub async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clean up expired sessions.
    pub async fn cleanup_expired_sessions(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= datetime('now')")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ── API Keys ─────────────────────────────────────────────────────────

    /// Generate a new API key. Returns (id, raw_key). The raw key is only
    /// shown once — we store only its SHA-256 hash.
    pub async fn create_api_key(&self, label: &str) -> anyhow::Result<(i64, String)> {
        let raw_key = format!("mk_{}", generate_token());
        let prefix = &raw_key[..raw_key.len().min(11)]; // "mk_" + 8 chars
        let hash = sha256_hex(&raw_key);

        let result =
            sqlx::query("INSERT INTO api_keys (label, key_hash, key_prefix) VALUES (?, ?, ?)")
                .bind(label)
                .bind(&hash)
                .bind(prefix)
                .execute(&self.pool)
                .await?;
        Ok((result.last_insert_rowid(), raw_key))
    }

    /// List all API keys (active and revoked).
    pub async fn list_api_keys(&self) -> anyhow::Result<Vec<ApiKeyEntry>> {
        let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
            "SELECT id, label, key_prefix, strftime('%Y-%m-%dT%H:%M:%SZ', created_at) FROM api_keys WHERE revoked_at IS NULL ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, label, key_prefix, created_at)| ApiKeyEntry {
                id,
                label,
                key_prefix,
                created_at,
            })
            .collect())
    }

    /// Revoke an API key by id.
    pub async fn revoke_api_key(&self, key_id: i64) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE api_keys SET revoked_at = datetime('now') WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(key_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Verify a raw API key. Returns true if it matches a non-revoked key.
    pub async fn verify_api_key(&self, raw_key: &str) -> anyhow::Result<bool> {
        let hash = sha256_hex(raw_key);
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM api_keys WHERE key_hash = ? AND revoked_at IS NULL")
                .bind(&hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    // ── Environment Variables ─────────────────────────────────────────────

    /// List all environment variables (names only, no values).
    pub async fn list_env_vars(&self) -> anyhow::Result<Vec<EnvVarEntry>> {
        let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
            "SELECT id, key, strftime('%Y-%m-%dT%H:%M:%SZ', created_at), strftime('%Y-%m-%dT%H:%M:%SZ', updated_at) FROM env_variables ORDER BY key ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, key, created_at, updated_at)| EnvVarEntry {
                id,
                key,
                created_at,
                updated_at,
            })
            .collect())
    }

    /// Set (upsert) an environment variable.
    pub async fn set_env_var(&self, key: &str, value: &str) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO env_variables (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Delete an environment variable by id.
    pub async fn delete_env_var(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM env_variables WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get all environment variable key-value pairs (internal use for sandbox injection).
    pub async fn get_all_env_values(&self) -> anyhow::Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM env_variables ORDER BY key ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    // ── Reset (remove all auth) ─────────────────────────────────────────

    /// Remove all authentication data: password, sessions, passkeys, API keys.
    /// After this, `is_setup_complete()` returns false and the middleware
    /// passes all requests through (no auth required).
    pub async fn reset_all(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM auth_password")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM auth_sessions")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM passkeys")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM api_keys")
            .execute(&self.pool)
            .await?;
        self.setup_complete.store(false, Ordering::Relaxed);
        self.auth_disabled.store(true, Ordering::Relaxed);
        self.persist_auth_disabled(true)?;
        Ok(())
    }

    // ── Passkeys ─────────────────────────────────────────────────────────

    /// Store a new passkey credential.
    pub async fn store_passkey(
        &self,
        credential_id: &[u8],
        name: &str,
        passkey_data: &[u8],
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO passkeys (credential_id, name, passkey_data) VALUES (?, ?, ?)",
        )
        .bind(credential_id)
        .bind(name)
        .bind(passkey_data)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// List all registered passkeys.
    pub async fn list_passkeys(&self) -> anyhow::Result<Vec<PasskeyEntry>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, name, strftime('%Y-%m-%dT%H:%M:%SZ', created_at) FROM passkeys ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, created_at)| PasskeyEntry {
                id,
                name,
                created_at,
            })
            .collect())
    }

    /// Remove a passkey by id.
    pub async fn remove_passkey(&self, passkey_id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM passkeys WHERE id = ?")
            .bind(passkey_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rename a passkey.
    pub async fn rename_passkey(&self, passkey_id: i64, name: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE passkeys SET name = ? WHERE id = ?")
            .bind(name)
            .bind(passkey_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Load all passkey data blobs (for WebAuthn authentication).
    pub async fn load_all_passkey_data(&self) -> anyhow::Result<Vec<(i64, Vec<u8>)>> {
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as("SELECT id, passkey_data FROM passkeys")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Check if any passkeys are registered (for login page UI).
    pub async fn has_passkeys(&self) -> anyhow::Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM passkeys LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

// ── EnvVarProvider impl ─────────────────────────────────────────────────────

#[async_trait::async_trait]
impl moltis_tools::exec::EnvVarProvider for CredentialStore {
    async fn get_env_vars(&self) -> Vec<(String, secrecy::Secret<String>)> {
        self.get_all_env_values()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, secrecy::Secret::new(v)))
            .collect()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

pub fn is_loopback(ip: &str) -> bool {
    ip == "127.0.0.1" || ip.starts_with("127.") || ip == "::1" || ip.starts_with("::ffff:127.")
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash_str: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash_str) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn generate_token() -> String {
    use {base64::Engine, rand::RngCore};

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ── Legacy compat ────────────────────────────────────────────────────────────

/// Result of an authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub ok: bool,
    pub reason: Option<String>,
}

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

/// Authenticate an incoming WebSocket connect request against legacy env-var auth.
pub fn authorize_connect(
    auth: &ResolvedAuth,
    provided_token: Option<&str>,
    provided_password: Option<&str>,
    _remote_ip: Option<&str>,
) -> AuthResult {
    match auth.mode {
        AuthMode::Token => {
            let Some(ref expected) = auth.token else {
                return AuthResult {
                    ok: true,
                    reason: None,
                };
            };
            match provided_token {
                Some(t) if safe_equal(t, expected.expose_secret()) => AuthResult {
                    ok: true,
                    reason: None,
                },
                Some(_) => AuthResult {
                    ok: false,
                    reason: Some("invalid token".into()),
                },
                None => AuthResult {
                    ok: false,
                    reason: Some("token required".into()),
                },
            }
        },
        AuthMode::Password => {
            let Some(ref expected) = auth.password else {
                return AuthResult {
                    ok: true,
                    reason: None,
                };
            };
            match provided_password {
                Some(p) if safe_equal(p, expected.expose_secret()) => AuthResult {
                    ok: true,
                    reason: None,
                },
                Some(_) => AuthResult {
                    ok: false,
                    reason: Some("invalid password".into()),
                },
                None => AuthResult {
                    ok: false,
                    reason: Some("password required".into()),
                },
            }
        },
    }
}

/// Legacy resolved auth from environment vars (kept for migration).
#[derive(Clone)]
pub struct ResolvedAuth {
    pub mode: AuthMode,
    pub token: Option<secrecy::Secret<String>>,
    pub password: Option<secrecy::Secret<String>>,
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAuth")
            .field("mode", &self.mode)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Token,
    Password,
}

/// Resolve auth config from environment / config values.
pub fn resolve_auth(token: Option<String>, password: Option<String>) -> ResolvedAuth {
    let mode = if password.is_some() {
        AuthMode::Password
    } else {
        AuthMode::Token
    };
    ResolvedAuth {
        mode,
        token: token.map(secrecy::Secret::new),
        password: password.map(secrecy::Secret::new),
    }
}
