//! Per-request context.
//!
//! A [`RequestContext`] is built by the dispatcher for every matched
//! request and handed mutably to each stage of the chain. It owns:
//!
//! - the request parts, path parameters, query and form arguments, cookies
//! - a typed scratch bag keyed by string
//! - the `stopped` / `aborted` / `skip-main` flags
//! - a cancellation token derived from the server's base token
//! - a [`TaskGroup`] whose token derives from the request token
//! - a [`Logger`] and the debug trail of invoked handler names
//! - the response being built
//!
//! The scratch bag is unsynchronized: only the task that owns the context
//! writes to it. Forked sub-tasks are `'static` and cannot borrow it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use trellis_router::Params;
use trellis_telemetry::{Level, Logger};
use uuid::Uuid;

use crate::cookie::{split_host, Cookies, SameSite, SetCookie};
use crate::error::Error;
use crate::tasks::TaskGroup;

/// A unique identifier for each request, using UUID v7.
///
/// # Example
///
/// ```
/// use trellis_core::RequestId;
///
/// let a = RequestId::new();
/// let b = RequestId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new time-ordered request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Default)]
struct ResponseParts {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

/// Per-request state shared by every stage of a handler chain.
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: Params,
    query: Params,
    form: Params,
    cookies: Cookies,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
    stopped: bool,
    aborted: bool,
    skip_main: bool,
    token: CancellationToken,
    tasks: TaskGroup,
    logger: Logger,
    called: Vec<String>,
    same_site: Option<SameSite>,
    response: ResponseParts,
}

impl RequestContext {
    /// Builds the context for `request`.
    ///
    /// `params` are the path parameters of the matched route. The request
    /// token is a child of `parent`, so cancelling `parent` reaches every
    /// in-flight request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextInit`] if the query string or an urlencoded
    /// form body cannot be decoded.
    pub fn new(
        request: Request<Bytes>,
        params: Params,
        parent: &CancellationToken,
    ) -> Result<Self, Error> {
        let (parts, body) = request.into_parts();

        let query = match parts.uri.query() {
            Some(raw) => decode_pairs(raw.as_bytes())
                .map_err(|e| Error::context_init(format!("invalid query string: {e}")))?,
            None => Params::new(),
        };

        let is_form = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(FORM_CONTENT_TYPE));
        let form = if is_form {
            decode_pairs(&body)
                .map_err(|e| Error::context_init(format!("invalid form body: {e}")))?
        } else {
            Params::new()
        };

        let cookies = Cookies::from_headers(&parts.headers);
        Ok(Self::assemble(
            parts.method,
            parts.uri,
            parts.headers,
            body,
            params,
            query,
            form,
            cookies,
            parent,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        params: Params,
        query: Params,
        form: Params,
        cookies: Cookies,
        parent: &CancellationToken,
    ) -> Self {
        let request_id = RequestId::new();
        let token = parent.child_token();
        let tasks = TaskGroup::new(&token);
        let logger = Logger::new(Level::Info)
            .with_field("request_id", request_id.to_string())
            .with_field("method", method.as_str())
            .with_field("path", uri.path());

        Self {
            request_id,
            method,
            uri,
            headers,
            body,
            params,
            query,
            form,
            cookies,
            data: HashMap::new(),
            stopped: false,
            aborted: false,
            skip_main: false,
            token,
            tasks,
            logger,
            called: Vec::new(),
            same_site: None,
            response: ResponseParts::default(),
        }
    }

    /// Returns a builder for contexts used in tests and tools.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Creates a `GET /` context with no parameters, for tests.
    ///
    /// ```
    /// use trellis_core::RequestContext;
    ///
    /// let ctx = RequestContext::mock();
    /// assert_eq!(ctx.path(), "/");
    /// assert!(!ctx.is_stopped());
    /// ```
    #[must_use]
    pub fn mock() -> Self {
        Self::assemble(
            Method::GET,
            Uri::from_static("/"),
            HeaderMap::new(),
            Bytes::new(),
            Params::new(),
            Params::new(),
            Params::new(),
            Cookies::new(),
            &CancellationToken::new(),
        )
    }

    // ------------------------------------------------------------------
    // Request accessors
    // ------------------------------------------------------------------

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns true if the request method equals `method`.
    #[must_use]
    pub fn is_method(&self, method: &Method) -> bool {
        self.method == *method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a request header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `Host` header, falling back to the URI authority.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// Returns the raw request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the path parameters of the matched route.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the decoded query arguments.
    #[must_use]
    pub fn query(&self) -> &Params {
        &self.query
    }

    /// Returns the decoded urlencoded form arguments.
    #[must_use]
    pub fn form(&self) -> &Params {
        &self.form
    }

    /// Returns the request cookies.
    #[must_use]
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// Returns one request cookie.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name)
    }

    /// Looks `key` up in the path parameters, then the query, then the form,
    /// and returns the first non-empty value.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        [&self.params, &self.query, &self.form]
            .into_iter()
            .filter_map(|source| source.get(key))
            .find(|value| !value.is_empty())
    }

    /// Like [`param`](Self::param) but coerced to a boolean.
    ///
    /// Missing, `""`, `"0"`, `"f"` and `"false"` (any case) are false.
    #[must_use]
    pub fn param_bool(&self, key: &str) -> bool {
        let value = self.param(key).unwrap_or_default();
        !(value.is_empty()
            || value == "0"
            || value.eq_ignore_ascii_case("f")
            || value.eq_ignore_ascii_case("false"))
    }

    /// Like [`param`](Self::param) but parsed into `T`.
    #[must_use]
    pub fn param_parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.param(key).and_then(|v| v.parse().ok())
    }

    /// Collapses the form arguments into a JSON object: a single value stays
    /// a string, repeated names become arrays.
    #[must_use]
    pub fn squeeze_params(&self) -> serde_json::Map<String, Value> {
        let mut out = serde_json::Map::new();
        for (key, value) in self.form.iter() {
            match out.get_mut(key) {
                None => {
                    out.insert(key.to_string(), Value::from(value));
                }
                Some(Value::Array(values)) => values.push(Value::from(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::from(value)]);
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Scratch values
    // ------------------------------------------------------------------

    /// Stores a request-scoped value under `key`.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if it has type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref())
    }

    /// Returns a mutable reference to the value under `key` if it has type `T`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Removes the value under `key`. Returns true if something was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    // ------------------------------------------------------------------
    // Control flags
    // ------------------------------------------------------------------

    /// Skips the remaining stages. Pending sub-tasks are still joined and
    /// the terminal handler still runs.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.logger.add_debug("is_stopped", true);
    }

    /// Skips every remaining stage, including join and terminal, and
    /// cancels the request token.
    pub fn abort(&mut self) {
        self.aborted = true;
        self.token.cancel();
        self.logger.add_debug("is_aborted", true);
    }

    /// Skips the main handler; before and after stages still run.
    pub fn skip_main(&mut self) {
        self.skip_main = true;
        self.logger.add_debug("is_skipped_main", true);
    }

    /// Returns true once [`stop`](Self::stop) or [`abort`](Self::abort) was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped || self.aborted
    }

    /// Returns true once [`abort`](Self::abort) was called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Returns true once [`skip_main`](Self::skip_main) was called.
    #[must_use]
    pub fn is_main_skipped(&self) -> bool {
        self.skip_main
    }

    // ------------------------------------------------------------------
    // Lifetime and sub-tasks
    // ------------------------------------------------------------------

    /// Returns the request's cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns true once the request token is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the fork-join group.
    #[must_use]
    pub fn tasks(&self) -> &TaskGroup {
        &self.tasks
    }

    /// Returns the token shared by forked sub-tasks.
    #[must_use]
    pub fn task_token(&self) -> CancellationToken {
        self.tasks.token()
    }

    /// Forks a sub-task, waiting for a slot when the limit is reached.
    pub async fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.tasks.spawn(task).await;
    }

    /// Forks a sub-task only if a slot is free.
    pub fn try_spawn<F>(&mut self, task: F) -> bool
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.tasks.try_spawn(task)
    }

    /// Caps concurrently running sub-tasks.
    ///
    /// # Errors
    ///
    /// Fails while forked sub-tasks are still unjoined.
    pub fn set_task_limit(&mut self, limit: Option<usize>) -> Result<(), Error> {
        self.tasks.set_limit(limit)
    }

    /// Waits for every forked sub-task and returns the first failure.
    pub async fn wait_tasks(&mut self) -> Result<(), Error> {
        self.tasks.wait().await
    }

    // ------------------------------------------------------------------
    // Logging
    // ------------------------------------------------------------------

    /// Returns the request logger.
    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Returns the request logger mutably.
    pub fn logger_mut(&mut self) -> &mut Logger {
        &mut self.logger
    }

    /// Replaces the request logger.
    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    /// Sets the request logger's threshold.
    pub fn set_log_level(&mut self, level: Level) {
        self.logger.set_level(level);
    }

    /// Appends `name` to the handler trail when the logger is at debug.
    pub(crate) fn record_handler(&mut self, name: &str) {
        if self.logger.is_debug() {
            self.called.push(name.to_string());
        }
    }

    /// Returns the names of invoked handlers, in order. `None` unless the
    /// logger is at debug.
    #[must_use]
    pub fn called_handlers(&self) -> Option<&[String]> {
        self.logger.is_debug().then_some(self.called.as_slice())
    }

    // ------------------------------------------------------------------
    // Response
    // ------------------------------------------------------------------

    /// Returns the response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.response.status = status;
    }

    /// Returns the response headers.
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    /// Returns the response headers mutably.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response.headers
    }

    /// Sets a response header, replacing earlier values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::with_source("invalid header name", e))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::with_source("invalid header value", e))?;
        self.response.headers.insert(name, value);
        Ok(())
    }

    /// Appends bytes to the response body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response.body.extend_from_slice(bytes);
    }

    /// Appends text to the response body.
    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Returns the response body written so far.
    #[must_use]
    pub fn response_body(&self) -> &[u8] {
        &self.response.body
    }

    /// Replaces the body with `value` serialized as JSON.
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::with_source("failed to serialize response", e))?;
        self.response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.response.body.clear();
        self.response.body.extend_from_slice(&body);
        Ok(())
    }

    /// Sets a redirect status and `Location` header.
    pub fn redirect(&mut self, location: &str, status: StatusCode) -> Result<(), Error> {
        let value = HeaderValue::from_str(location)
            .map_err(|e| Error::with_source("invalid redirect location", e))?;
        self.response.headers.insert(LOCATION, value);
        self.response.status = status;
        Ok(())
    }

    /// Sets the default `SameSite` attribute for cookies set afterwards.
    pub fn set_same_site(&mut self, same_site: SameSite) {
        self.same_site = Some(same_site);
    }

    /// Adds a `Set-Cookie` header.
    ///
    /// An unset path becomes `/`; an unset domain becomes the request host
    /// without its port; an unset `SameSite` takes the context default.
    pub fn set_cookie(&mut self, mut cookie: SetCookie) -> Result<(), Error> {
        if cookie.get_path().map_or(true, str::is_empty) {
            cookie = cookie.path("/");
        }
        if cookie.get_domain().map_or(true, str::is_empty) {
            if let Some(host) = self.host().map(split_host).filter(|h| !h.is_empty()) {
                cookie = cookie.domain(host.to_string());
            }
        }
        if cookie.get_same_site().is_none() {
            if let Some(same_site) = self.same_site {
                cookie = cookie.same_site(same_site);
            }
        }
        let value = HeaderValue::from_str(&cookie.to_header_value())
            .map_err(|e| Error::with_source("invalid cookie", e))?;
        self.response.headers.append(SET_COOKIE, value);
        Ok(())
    }

    /// Moves the response out, leaving an empty `200 OK` behind.
    pub fn take_response(&mut self) -> Response<Bytes> {
        let parts = std::mem::take(&mut self.response);
        let mut response = Response::new(parts.body.freeze());
        *response.status_mut() = parts.status;
        *response.headers_mut() = parts.headers;
        response
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("params", &self.params)
            .field("data_keys", &self.data.keys().collect::<Vec<_>>())
            .field("stopped", &self.stopped)
            .field("aborted", &self.aborted)
            .field("skip_main", &self.skip_main)
            .finish_non_exhaustive()
    }
}

fn decode_pairs(raw: &[u8]) -> Result<Params, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(raw)?;
    Ok(pairs.into_iter().collect())
}

/// Builder for [`RequestContext`].
///
/// # Example
///
/// ```
/// use trellis_core::RequestContext;
///
/// let ctx = RequestContext::builder()
///     .uri("/users/7?verbose=true")
///     .param("id", "7")
///     .build()
///     .unwrap();
///
/// assert_eq!(ctx.param("id"), Some("7"));
/// assert!(ctx.param_bool("verbose"));
/// ```
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    method: Option<Method>,
    uri: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
    params: Params,
    parent: Option<CancellationToken>,
    level: Option<Level>,
}

impl RequestContextBuilder {
    /// Sets the method. Defaults to GET.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the URI. Defaults to `/`.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a path parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push(name, value);
        self
    }

    /// Derives the request token from `parent`.
    #[must_use]
    pub fn parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets the logger threshold.
    #[must_use]
    pub fn log_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextInit`] for an invalid URI or header, or when
    /// [`RequestContext::new`] fails.
    pub fn build(self) -> Result<RequestContext, Error> {
        let mut request = Request::builder()
            .method(self.method.unwrap_or(Method::GET))
            .uri(self.uri.as_deref().unwrap_or("/"));
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let request = request
            .body(self.body)
            .map_err(|e| Error::context_init(e.to_string()))?;

        let parent = self.parent.unwrap_or_default();
        let mut ctx = RequestContext::new(request, self.params, &parent)?;
        if let Some(level) = self.level {
            ctx.set_log_level(level);
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_for(uri: &str) -> RequestContext {
        RequestContext::builder().uri(uri).build().unwrap()
    }

    #[test]
    fn test_request_id_unique() {
        assert_ne!(RequestContext::mock().request_id(), RequestContext::mock().request_id());
    }

    #[test]
    fn test_param_lookup_order() {
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .uri("/items/9?id=from-query&q=search")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("id=from-form&q=ignored&only=form")
            .param("id", "9")
            .build()
            .unwrap();

        assert_eq!(ctx.param("id"), Some("9"));
        assert_eq!(ctx.param("q"), Some("search"));
        assert_eq!(ctx.param("only"), Some("form"));
        assert_eq!(ctx.param("missing"), None);
    }

    #[test]
    fn test_param_skips_empty_values() {
        let ctx = RequestContext::builder()
            .uri("/?name=")
            .param("name", "")
            .build()
            .unwrap();
        assert_eq!(ctx.param("name"), None);
    }

    #[test]
    fn test_param_bool() {
        let ctx = ctx_for("/?a=0&b=F&c=FALSE&d=&e=yes&f=1&g=true");

        for key in ["a", "b", "c", "d", "missing"] {
            assert!(!ctx.param_bool(key), "{key} should be false");
        }
        for key in ["e", "f", "g"] {
            assert!(ctx.param_bool(key), "{key} should be true");
        }
    }

    #[test]
    fn test_param_parse() {
        let ctx = ctx_for("/?page=3&bad=x");
        assert_eq!(ctx.param_parse::<u32>("page"), Some(3));
        assert_eq!(ctx.param_parse::<u32>("bad"), None);
    }

    #[test]
    fn test_query_is_decoded() {
        let ctx = ctx_for("/?name=tennis+player&tag=a%26b");
        assert_eq!(ctx.query().get("name"), Some("tennis player"));
        assert_eq!(ctx.query().get("tag"), Some("a&b"));
    }

    #[test]
    fn test_form_ignored_without_content_type() {
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .body("a=1")
            .build()
            .unwrap();
        assert!(ctx.form().is_empty());
    }

    #[test]
    fn test_squeeze_params() {
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .header("content-type", "application/x-www-form-urlencoded")
            .body("tag=a&one=1&tag=b&tag=c")
            .build()
            .unwrap();
        let squeezed = ctx.squeeze_params();

        assert_eq!(squeezed["one"], Value::from("1"));
        assert_eq!(squeezed["tag"], serde_json::json!(["a", "b", "c"]));
    }

    #[test]
    fn test_scratch_values() {
        let mut ctx = RequestContext::mock();
        ctx.set("user", String::from("alice"));
        ctx.set("count", 3_u32);

        assert_eq!(ctx.get::<String>("user").map(String::as_str), Some("alice"));
        assert_eq!(ctx.get::<u64>("count"), None);
        *ctx.get_mut::<u32>("count").unwrap() += 1;
        assert_eq!(ctx.get::<u32>("count"), Some(&4));
        assert!(ctx.remove("user"));
        assert!(!ctx.remove("user"));
    }

    #[test]
    fn test_flags() {
        let mut ctx = RequestContext::mock();
        assert!(!ctx.is_stopped());

        ctx.skip_main();
        assert!(ctx.is_main_skipped());
        assert!(!ctx.is_stopped());

        ctx.stop();
        assert!(ctx.is_stopped());
        assert!(!ctx.is_aborted());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_abort_cancels_request_and_task_tokens() {
        let mut ctx = RequestContext::mock();
        let task_token = ctx.task_token();
        ctx.abort();

        assert!(ctx.is_stopped());
        assert!(ctx.is_aborted());
        assert!(ctx.is_cancelled());
        assert!(task_token.is_cancelled());
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let ctx = RequestContext::builder().parent(parent.clone()).build().unwrap();
        parent.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_drop_cancels_request_token() {
        let ctx = RequestContext::mock();
        let token = ctx.cancellation().clone();
        drop(ctx);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_debug_flag_fields() {
        let mut ctx = RequestContext::builder().log_level(Level::Debug).build().unwrap();
        ctx.stop();
        assert_eq!(ctx.logger().field("is_stopped"), Some(&Value::Bool(true)));

        let mut quiet = RequestContext::mock();
        quiet.stop();
        assert!(quiet.logger().field("is_stopped").is_none());
    }

    #[test]
    fn test_handler_trail_only_in_debug() {
        let mut ctx = RequestContext::mock();
        ctx.record_handler("auth");
        assert!(ctx.called_handlers().is_none());

        ctx.set_log_level(Level::Debug);
        ctx.record_handler("auth");
        ctx.record_handler("main");
        assert_eq!(
            ctx.called_handlers().unwrap(),
            &["auth".to_string(), "main".to_string()]
        );
    }

    #[test]
    fn test_set_cookie_defaults() {
        let mut ctx = RequestContext::builder()
            .header("host", "shop.example.com:8443")
            .build()
            .unwrap();
        ctx.set_same_site(SameSite::Lax);
        ctx.set_cookie(SetCookie::new("cart", "a b")).unwrap();

        let header = ctx.response_headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert_eq!(
            header,
            "cart=a+b; Domain=shop.example.com; Path=/; SameSite=Lax"
        );
    }

    #[test]
    fn test_set_cookie_keeps_explicit_values() {
        let mut ctx = RequestContext::builder().header("host", "a.com").build().unwrap();
        ctx.set_cookie(SetCookie::new("k", "v").domain("b.com").path("/x"))
            .unwrap();
        ctx.set_cookie(SetCookie::new("k2", "v")).unwrap();

        let values: Vec<_> = ctx
            .response_headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["k=v; Domain=b.com; Path=/x", "k2=v; Domain=a.com; Path=/"]);
    }

    #[test]
    fn test_cookies_parsed() {
        let ctx = RequestContext::builder()
            .header("cookie", "session=abc; theme=dark")
            .build()
            .unwrap();
        assert_eq!(ctx.cookie("session"), Some("abc"));
        assert_eq!(ctx.cookies().len(), 2);
    }

    #[test]
    fn test_response_building() {
        let mut ctx = RequestContext::mock();
        ctx.set_status(StatusCode::CREATED);
        ctx.set_header("x-trace", "1").unwrap();
        ctx.write_str("hello ");
        ctx.write(b"world");
        assert!(ctx.set_header("bad header", "x").is_err());

        let response = ctx.take_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-trace"], "1");
        assert_eq!(response.body().as_ref(), b"hello world");
        assert_eq!(ctx.status(), StatusCode::OK);
    }

    #[test]
    fn test_json_and_redirect() {
        let mut ctx = RequestContext::mock();
        ctx.write_str("stale");
        ctx.json(&serde_json::json!({"ok": true})).unwrap();
        assert_eq!(ctx.response_body(), br#"{"ok":true}"#);
        assert_eq!(ctx.response_headers()[CONTENT_TYPE], "application/json");

        ctx.redirect("/login", StatusCode::FOUND).unwrap();
        assert_eq!(ctx.status(), StatusCode::FOUND);
        assert_eq!(ctx.response_headers()[LOCATION], "/login");
    }

    #[test]
    fn test_invalid_uri_is_context_init_error() {
        let err = RequestContext::builder().uri("not a uri").build().unwrap_err();
        assert!(matches!(err, Error::ContextInit(_)));
    }

    #[test]
    fn test_host_falls_back_to_authority() {
        let ctx = ctx_for("http://api.example.com:9000/x");
        assert_eq!(ctx.host(), Some("api.example.com:9000"));
    }

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut ctx = RequestContext::mock();
        ctx.set_task_limit(Some(2)).unwrap();
        ctx.spawn(async { Ok(()) }).await;
        assert!(ctx.try_spawn(async { Err(Error::handler("late")) }));

        let err = ctx.wait_tasks().await.unwrap_err();
        assert_eq!(err.to_string(), "sub-task failed: late");
        assert!(ctx.tasks().is_empty());
    }
}
