use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Margin subtracted from the provider expiry so tokens are renewed before they lapse.
const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Access tokens shared by all requests, keyed by shop.
///
/// Concurrent refreshes of the same shop may race; the last stored token wins.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: DashMap<String, CachedToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token of `shop`, if it is still valid at `now`.
    pub fn get(&self, shop: &str, now: DateTime<Utc>) -> Option<String> {
        let cached = self.tokens.get(shop)?;
        (now < cached.expires_at).then(|| cached.token.clone())
    }

    /// Store a token whose provider-side expiry is `provider_expiry`.
    pub fn store(&self, shop: &str, token: String, provider_expiry: DateTime<Utc>) {
        let expires_at = provider_expiry - Duration::minutes(REFRESH_MARGIN_MINUTES);
        self.tokens
            .insert(shop.to_string(), CachedToken { token, expires_at });
    }

    pub fn invalidate(&self, shop: &str) {
        self.tokens.remove(shop);
    }
}
