//! Transport policy for carrying session tokens in cookies.

use chrono::Duration;

use crate::TokenPair;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    /// Lenient parse: `none` and `strict` (any case) are honored, anything
    /// else falls back to `Lax`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => SameSite::None,
            "strict" => SameSite::Strict,
            _ => SameSite::Lax,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::Strict => "Strict",
            SameSite::None => "None",
        }
    }
}

/// Attributes applied to both session cookies.
///
/// Cookies are always `HttpOnly` with `Path=/`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
}

impl CookiePolicy {
    pub fn new(secure: bool, same_site: SameSite, domain: Option<String>) -> Self {
        Self {
            secure,
            same_site,
            domain: domain.filter(|d| !d.trim().is_empty()),
        }
    }

    /// `Set-Cookie` values for a freshly issued pair, access first.
    ///
    /// Each cookie lives as long as the token it carries.
    pub fn issue(&self, pair: &TokenPair, access_ttl: Duration, refresh_ttl: Duration) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE, &pair.access_token, max_age(access_ttl), None),
            self.build(REFRESH_COOKIE, &pair.refresh_token, max_age(refresh_ttl), None),
        ]
    }

    /// `Set-Cookie` values that make the client drop both cookies.
    pub fn clear(&self) -> [String; 2] {
        const EPOCH: &str = "Thu, 01 Jan 1970 00:00:00 GMT";
        [
            self.build(ACCESS_COOKIE, "", 0, Some(EPOCH)),
            self.build(REFRESH_COOKIE, "", 0, Some(EPOCH)),
        ]
    }

    fn build(&self, name: &str, value: &str, max_age: i64, expires: Option<&str>) -> String {
        let mut cookie = format!(
            "{name}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite={}",
            self.same_site.as_str()
        );
        if let Some(expires) = expires {
            cookie.push_str("; Expires=");
            cookie.push_str(expires);
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie
    }
}

fn max_age(ttl: Duration) -> i64 {
    ttl.num_seconds().max(0)
}

/// Value of cookie `name` in a `Cookie` request header, if present and
/// non-empty.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k.trim() == name && !v.trim().is_empty()).then(|| v.trim())
    })
}
