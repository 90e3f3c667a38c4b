//! Opaque session tokens and the cookie that carries them.

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};

pub const SESSION_COOKIE: &str = "session_token";

const TOKEN_BYTES: usize = 32;

/// 256 bits from the OS RNG, URL-safe base64.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// A session is usable strictly before its expiry instant.
pub fn is_live(expires_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    now < expires_at
}

pub fn session_cookie(token: String, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(same_site(secure))
        .path("/")
        .max_age(ttl)
        .build()
}

/// Removal cookie; attributes must match the ones used when setting.
pub fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(secure)
        .same_site(same_site(secure))
        .path("/")
        .build()
}

// Browsers drop SameSite=None cookies that are not Secure.
fn same_site(secure: bool) -> SameSite {
    if secure {
        SameSite::None
    } else {
        SameSite::Lax
    }
}
