//! HTTP basic authentication gate.
//!
//! Checked by the dispatcher before routing. Logins are matched
//! case-insensitively; passwords are matched exactly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::Request;
use trellis_core::{Error, Gatekeeper};

/// Default realm message.
pub const DEFAULT_REALM: &str = "Access to the staging site";

/// Default realm charset.
pub const DEFAULT_CHARSET: &str = "UTF-8";

type AccessFn = Arc<dyn Fn(&Request<Bytes>) -> bool + Send + Sync>;
type AuditFn = Arc<dyn Fn(&Request<Bytes>, &str, bool) + Send + Sync>;

/// A login/password table checked against the `Authorization` header.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use http::Request;
/// use trellis_core::Gatekeeper;
/// use trellis_server::BasicAuth;
///
/// let auth = BasicAuth::new().user("Admin", "secret");
///
/// // "admin:secret"
/// let request = Request::get("/")
///     .header("authorization", "Basic YWRtaW46c2VjcmV0")
///     .body(Bytes::new())
///     .unwrap();
/// assert!(auth.check(&request).is_ok());
/// ```
#[derive(Clone)]
pub struct BasicAuth {
    users: HashMap<String, String>,
    realm: String,
    charset: String,
    check_access: Option<AccessFn>,
    audit: Option<AuditFn>,
}

impl Default for BasicAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicAuth {
    /// Creates a gate with no users and the default realm.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            realm: DEFAULT_REALM.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            check_access: None,
            audit: None,
        }
    }

    /// Adds a user. The login is stored lowercase.
    #[must_use]
    pub fn user(mut self, login: &str, password: impl Into<String>) -> Self {
        self.users.insert(login.to_lowercase(), password.into());
        self
    }

    /// Replaces the user table.
    #[must_use]
    pub fn users<I, L, P>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = (L, P)>,
        L: AsRef<str>,
        P: Into<String>,
    {
        self.users = users
            .into_iter()
            .map(|(login, password)| (login.as_ref().to_lowercase(), password.into()))
            .collect();
        self
    }

    /// Sets the realm message and charset of the challenge.
    #[must_use]
    pub fn realm(mut self, message: impl Into<String>, charset: impl Into<String>) -> Self {
        self.realm = message.into();
        self.charset = charset.into();
        self
    }

    /// Limits the gate to requests for which `predicate` returns true.
    #[must_use]
    pub fn check_access<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request<Bytes>) -> bool + Send + Sync + 'static,
    {
        self.check_access = Some(Arc::new(predicate));
        self
    }

    /// Calls `hook` with the request, the login presented (possibly empty)
    /// and the outcome of every check.
    #[must_use]
    pub fn audit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request<Bytes>, &str, bool) + Send + Sync + 'static,
    {
        self.audit = Some(Arc::new(hook));
        self
    }

    /// Returns the realm message.
    #[must_use]
    pub fn realm_message(&self) -> &str {
        &self.realm
    }

    /// Returns the `WWW-Authenticate` challenge.
    #[must_use]
    pub fn challenge(&self) -> String {
        format!(r#"Basic realm="{}", charset="{}""#, self.realm, self.charset)
    }

    /// Returns the number of users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl Gatekeeper for BasicAuth {
    fn should_check(&self, request: &Request<Bytes>) -> bool {
        self.check_access
            .as_ref()
            .map_or(true, |predicate| predicate(request))
    }

    fn check(&self, request: &Request<Bytes>) -> Result<(), Error> {
        let credentials = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_credentials);

        let (login, allowed) = match &credentials {
            Some((login, password)) => (
                login.as_str(),
                !login.is_empty() && self.users.get(login) == Some(password),
            ),
            None => ("", false),
        };

        if let Some(audit) = &self.audit {
            audit(request, login, allowed);
        }

        if allowed {
            Ok(())
        } else {
            tracing::debug!(login, "basic auth rejected");
            Err(Error::AuthDenied {
                challenge: self.challenge(),
            })
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("users", &self.users.len())
            .field("realm", &self.realm)
            .field("charset", &self.charset)
            .finish_non_exhaustive()
    }
}

/// Decodes `Basic <base64(login:password)>`. The login is lowercased.
fn parse_credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_lowercase(), password.to_string()))
}
