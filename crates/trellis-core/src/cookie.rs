//! Request cookies and `Set-Cookie` construction.

use std::fmt;
use std::time::{Duration, SystemTime};

use http::header::{HeaderMap, COOKIE};

/// Cookies parsed from every `Cookie` header of a request.
///
/// When a name repeats, the first occurrence wins on [`get`](Cookies::get).
///
/// # Example
///
/// ```rust
/// use trellis_core::Cookies;
///
/// let cookies = Cookies::parse("session=abc123; theme=\"dark\"");
/// assert_eq!(cookies.get("session"), Some("abc123"));
/// assert_eq!(cookies.get("theme"), Some("dark"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    pairs: Vec<(String, String)>,
}

impl Cookies {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one `Cookie` header value.
    #[must_use]
    pub fn parse(header_value: &str) -> Self {
        let mut cookies = Self::new();
        cookies.extend_from(header_value);
        cookies
    }

    /// Parses every `Cookie` header in `headers`. Non-UTF-8 values are skipped.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = Self::new();
        for value in headers.get_all(COOKIE) {
            if let Ok(value) = value.to_str() {
                cookies.extend_from(value);
            }
        }
        cookies
    }

    fn extend_from(&mut self, header_value: &str) {
        let pairs = header_value
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                (name.trim().to_string(), value.to_string())
            });
        self.pairs.extend(pairs);
    }

    /// Returns a cookie value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if a cookie with `name` was sent.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns an iterator over all cookies.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// Sent on cross-site requests too; browsers require `Secure` with it.
    None,
    /// Sent on same-site requests and top-level cross-site navigations.
    Lax,
    /// Sent on same-site requests only.
    Strict,
}

impl SameSite {
    /// Returns the attribute value as written in `Set-Cookie`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Lax => "Lax",
            Self::Strict => "Strict",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cookie to send back in a `Set-Cookie` response header.
///
/// Domain and path are optional here; [`RequestContext::set_cookie`]
/// fills them from the request when left unset. Rendering goes through
/// [`Display`](fmt::Display).
///
/// [`RequestContext::set_cookie`]: crate::RequestContext::set_cookie
///
/// # Example
///
/// ```rust
/// use trellis_core::{SameSite, SetCookie};
///
/// let cookie = SetCookie::new("session", "a b")
///     .http_only(true)
///     .same_site(SameSite::Strict)
///     .max_age_secs(3600)
///     .path("/");
///
/// assert_eq!(
///     cookie.to_string(),
///     "session=a+b; Path=/; Max-Age=3600; HttpOnly; SameSite=Strict"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    attrs: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Attributes {
    domain: Option<String>,
    path: Option<String>,
    expires: Option<SystemTime>,
    max_age: Option<u64>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl SetCookie {
    /// Creates a session cookie. The value is query-escaped when rendered.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attrs: Attributes::default(),
        }
    }

    /// Creates an empty cookie that tells the client to drop `name`.
    #[must_use]
    pub fn remove(name: impl Into<String>) -> Self {
        Self::new(name, "")
            .max_age_secs(0)
            .expires(SystemTime::UNIX_EPOCH)
    }

    /// Sets the Domain attribute.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.attrs.domain = Some(domain.into());
        self
    }

    /// Sets the Path attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.attrs.path = Some(path.into());
        self
    }

    /// Sets the Expires attribute.
    #[must_use]
    pub fn expires(mut self, at: SystemTime) -> Self {
        self.attrs.expires = Some(at);
        self
    }

    /// Sets Max-Age from a duration, truncated to whole seconds.
    #[must_use]
    pub fn max_age(self, lifetime: Duration) -> Self {
        self.max_age_secs(lifetime.as_secs())
    }

    /// Sets Max-Age in seconds. Zero expires the cookie at once.
    #[must_use]
    pub fn max_age_secs(mut self, seconds: u64) -> Self {
        self.attrs.max_age = Some(seconds);
        self
    }

    /// Toggles the Secure flag.
    #[must_use]
    pub fn secure(mut self, on: bool) -> Self {
        self.attrs.secure = on;
        self
    }

    /// Toggles the `HttpOnly` flag.
    #[must_use]
    pub fn http_only(mut self, on: bool) -> Self {
        self.attrs.http_only = on;
        self
    }

    /// Sets the `SameSite` attribute.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.attrs.same_site = Some(same_site);
        self
    }

    /// Returns the cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw (unescaped) value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the Domain attribute.
    #[must_use]
    pub fn get_domain(&self) -> Option<&str> {
        self.attrs.domain.as_deref()
    }

    /// Returns the Path attribute.
    #[must_use]
    pub fn get_path(&self) -> Option<&str> {
        self.attrs.path.as_deref()
    }

    /// Returns the `SameSite` attribute.
    #[must_use]
    pub fn get_same_site(&self) -> Option<SameSite> {
        self.attrs.same_site
    }

    /// Renders the `Set-Cookie` header value.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.attrs;
        write!(f, "{}={}", self.name, query_escape(&self.value))?;
        if let Some(domain) = &a.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &a.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(at) = a.expires {
            write!(f, "; Expires={}", httpdate::fmt_http_date(at))?;
        }
        if let Some(secs) = a.max_age {
            write!(f, "; Max-Age={secs}")?;
        }
        if a.secure {
            f.write_str("; Secure")?;
        }
        if a.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = a.same_site {
            write!(f, "; SameSite={same_site}")?;
        }
        Ok(())
    }
}

/// Strips an optional numeric port and IPv6 brackets from a `Host` value.
///
/// ```rust
/// use trellis_core::cookie::split_host;
///
/// assert_eq!(split_host("example.com:8080"), "example.com");
/// assert_eq!(split_host("[::1]:443"), "::1");
/// assert_eq!(split_host("example.com:abc"), "example.com:abc");
/// ```
#[must_use]
pub fn split_host(host_port: &str) -> &str {
    let mut host = host_port;
    if let Some(colon) = host.rfind(':') {
        if host[colon + 1..].bytes().all(|b| b.is_ascii_digit()) {
            host = &host[..colon];
        }
    }
    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        host = inner;
    }
    host
}

/// Escapes `value` for use in a query string: unreserved characters stay,
/// space becomes `+`, everything else is percent-encoded.
#[must_use]
pub fn query_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
