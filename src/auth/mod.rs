//! Authentication module for the Estatehub server
//!
//! Access/refresh JWTs in httpOnly cookies, the refresh token encrypted at
//! rest on the user row, Google sign-in, request extractors and the
//! per-client rate limiter.

pub mod crypto;
pub mod extractor;
pub mod google;
pub mod handlers;
pub mod rate_limit;
pub mod service;
pub mod tokens;

pub use extractor::{AdminUser, AuthenticatedUser};
pub use rate_limit::{Bucket, RateLimitConfig, RateLimiter};
pub use service::{AuthService, AuthSession};
pub use tokens::{AccessClaims, RefreshClaims, TokenKeys};
