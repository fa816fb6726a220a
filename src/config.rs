use serde::{Deserialize, Serialize};

/// Default access token lifetime (1 hour).
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60;

/// Default refresh token lifetime (10 days).
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 10 * 24 * 60 * 60;

/// Default bcrypt work factor.
pub const DEFAULT_PASSWORD_HASH_COST: u32 = 10;

/// Accepted bcrypt work factor range.
pub const PASSWORD_HASH_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Default maximum request body size (16 KiB).
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 16 * 1024;

/// Credential and session settings.
///
/// Built once at startup and handed to the token codec, the user store and
/// the session manager; nothing in the core reads the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub access_token_secret: String,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    /// HMAC secret for refresh tokens, distinct from the access secret
    pub refresh_token_secret: String,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    /// bcrypt work factor for password hashes
    #[serde(default = "default_hash_cost")]
    pub password_hash_cost: u32,
    /// Whether session cookies carry the `Secure` attribute
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_access_ttl() -> u64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECS
}

fn default_refresh_ttl() -> u64 {
    DEFAULT_REFRESH_TOKEN_TTL_SECS
}

fn default_hash_cost() -> u32 {
    DEFAULT_PASSWORD_HASH_COST
}

fn default_secure_cookies() -> bool {
    true
}

impl AuthConfig {
    /// Create a config with the given secrets and default lifetimes.
    pub fn new(access_token_secret: impl Into<String>, refresh_token_secret: impl Into<String>) -> Self {
        Self {
            access_token_secret: access_token_secret.into(),
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_secret: refresh_token_secret.into(),
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_TTL_SECS,
            password_hash_cost: DEFAULT_PASSWORD_HASH_COST,
            secure_cookies: true,
        }
    }

    pub fn with_access_ttl(mut self, secs: u64) -> Self {
        self.access_token_ttl_secs = secs;
        self
    }

    pub fn with_refresh_ttl(mut self, secs: u64) -> Self {
        self.refresh_token_ttl_secs = secs;
        self
    }

    pub fn with_password_hash_cost(mut self, cost: u32) -> Self {
        self.password_hash_cost = cost;
        self
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Check the settings for combinations that would weaken or break the
    /// session lifecycle.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_token_secret.is_empty() {
            anyhow::bail!("access token secret must not be empty");
        }
        if self.refresh_token_secret.is_empty() {
            anyhow::bail!("refresh token secret must not be empty");
        }
        if self.access_token_secret == self.refresh_token_secret {
            anyhow::bail!("access and refresh token secrets must differ");
        }
        if self.access_token_ttl_secs == 0 || self.refresh_token_ttl_secs == 0 {
            anyhow::bail!("token lifetimes must be greater than zero");
        }
        if self.refresh_token_ttl_secs < self.access_token_ttl_secs {
            anyhow::bail!(
                "refresh token lifetime ({}s) is shorter than access token lifetime ({}s)",
                self.refresh_token_ttl_secs,
                self.access_token_ttl_secs
            );
        }
        if !PASSWORD_HASH_COST_RANGE.contains(&self.password_hash_cost) {
            anyhow::bail!(
                "password hash cost must be between {} and {}",
                PASSWORD_HASH_COST_RANGE.start(),
                PASSWORD_HASH_COST_RANGE.end()
            );
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8000`
    pub bind: String,
    /// Browser origin allowed to send credentialed requests
    #[serde(default)]
    pub cors_origin: Option<String>,
    /// Maximum accepted request body size
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            cors_origin: None,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

/// Parse a token lifetime such as `"3600"`, `"15m"` or `"10d"` into seconds.
///
/// Accepted units: `s`, `m`, `h`, `d`, `w`. A bare number is seconds.
pub fn parse_ttl(input: &str) -> anyhow::Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("empty duration");
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration `{}`", input))?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        other => anyhow::bail!("unknown duration unit `{}` in `{}`", other, input),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("duration `{}` is too large", input))
}
