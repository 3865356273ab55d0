//! Token caching for Firestore authentication.
//!
//! Thread-safe, async-aware token cache with a refresh margin and a
//! single-flight refresh path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Refresh token 60 seconds before expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Conservative TTL when expiry is unknown. OAuth tokens are typically
/// valid for 60 minutes.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore/Datastore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            auth,
            cache: RwLock::new(None),
        }
    }

    /// Get a valid access token, refreshing if needed.
    pub async fn get_token(&self) -> StoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.as_ref() {
                if token.is_valid() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        // Take the write lock for the refresh; concurrent callers queue here
        // instead of stampeding the token endpoint.
        let mut cache = self.cache.write().await;
        if let Some(token) = cache.as_ref() {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        match self.auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                debug!("Refreshed Firestore access token");
                let access_token = token.as_str().to_string();
                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at: Instant::now() + TOKEN_DEFAULT_TTL,
                });
                Ok(access_token)
            }
            Err(e) => {
                // Fall back to a still-usable token if refresh failed.
                if let Some(token) = cache.as_ref() {
                    if token.is_usable() {
                        warn!("Token refresh failed, reusing existing token: {}", e);
                        return Ok(token.access_token.clone());
                    }
                }
                Err(StoreError::auth_error(format!("Token refresh failed: {}", e)))
            }
        }
    }

    /// Drop the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}
