//! Static file serving.
//!
//! [`StaticFiles`] maps a request path onto a directory and answers with
//! the file, a redirect, a directory listing or an error response. It
//! evaluates the conditional request headers in the order RFC 7232
//! section 6 prescribes:
//!
//! 1. `If-Match`, falling back to `If-Unmodified-Since` (412 on failure)
//! 2. `If-None-Match`, falling back to `If-Modified-Since` (304 on failure)
//! 3. `If-Range`, which drops the `Range` header when it does not hold
//!
//! Only single byte ranges are answered with `206`; multi-range requests
//! receive the whole file.
//!
//! [`StaticFileHandler`] wraps it as a [`MainHandler`] that strips a URL
//! prefix before resolving the file.
//!
//! # Security
//!
//! - `..` components are rejected after percent-decoding
//! - hidden files (leading `.`) are rejected unless enabled
//! - resolved paths must stay below the canonical root

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::Metadata;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{HeaderMap, Method, Response, StatusCode};
use thiserror::Error;
use trellis_core::{BoxFuture, Error, MainHandler, RequestContext};

/// Default index file served for directories.
pub const DEFAULT_INDEX: &str = "index.html";

/// Errors that can occur when serving static files.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// The requested file was not found.
    #[error("404 page not found")]
    NotFound(String),

    /// The path is forbidden (traversal, hidden file, escaped root).
    #[error("403 Forbidden")]
    Forbidden(String),

    /// Only GET and HEAD are served.
    #[error("405 Method Not Allowed")]
    MethodNotAllowed,

    /// The `Range` header could not be satisfied.
    #[error("{reason}")]
    InvalidRange {
        /// Why the range was rejected.
        reason: &'static str,
        /// Size of the selected file.
        size: u64,
    },

    /// I/O error while reading the file or directory.
    #[error("500 Internal Server Error")]
    Io(#[from] std::io::Error),
}

impl StaticFileError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the plain-text response for this error.
    #[must_use]
    pub fn to_response(&self) -> Response<Bytes> {
        let mut response = Response::new(Bytes::from(self.to_string()));
        *response.status_mut() = self.status_code();

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        match self {
            Self::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            }
            Self::InvalidRange { size, .. } => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
            }
            _ => {}
        }
        response
    }
}

/// Static file server configuration.
///
/// # Example
///
/// ```rust
/// use trellis_server::StaticFiles;
///
/// let files = StaticFiles::new("./public")
///     .cache_control("max-age=3600")
///     .directory_listing(false);
/// assert_eq!(files.index_file(), Some("index.html"));
/// ```
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: Option<String>,
    cache_control: Option<String>,
    etag_enabled: bool,
    last_modified_enabled: bool,
    directory_listing: bool,
    serve_hidden: bool,
    follow_symlinks: bool,
    mime_types: HashMap<String, String>,
}

impl StaticFiles {
    /// Creates a server for the directory at `root`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index_file: Some(DEFAULT_INDEX.to_string()),
            cache_control: None,
            etag_enabled: true,
            last_modified_enabled: true,
            directory_listing: true,
            serve_hidden: false,
            follow_symlinks: true,
            mime_types: HashMap::new(),
        }
    }

    /// Sets the file served for directory requests.
    #[must_use]
    pub fn index<S: Into<String>>(mut self, index: S) -> Self {
        self.index_file = Some(index.into());
        self
    }

    /// Disables the index file.
    #[must_use]
    pub fn no_index(mut self) -> Self {
        self.index_file = None;
        self
    }

    /// Sets the `Cache-Control` value.
    #[must_use]
    pub fn cache_control<S: Into<String>>(mut self, value: S) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Enables or disables `ETag` headers.
    #[must_use]
    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag_enabled = enabled;
        self
    }

    /// Enables or disables `Last-Modified` headers.
    #[must_use]
    pub fn last_modified(mut self, enabled: bool) -> Self {
        self.last_modified_enabled = enabled;
        self
    }

    /// Enables or disables listings for directories without an index.
    #[must_use]
    pub fn directory_listing(mut self, enabled: bool) -> Self {
        self.directory_listing = enabled;
        self
    }

    /// Enables or disables serving hidden files.
    #[must_use]
    pub fn serve_hidden(mut self, enabled: bool) -> Self {
        self.serve_hidden = enabled;
        self
    }

    /// Enables or disables following symlinks.
    #[must_use]
    pub fn follow_symlinks(mut self, enabled: bool) -> Self {
        self.follow_symlinks = enabled;
        self
    }

    /// Maps a file extension to a MIME type.
    #[must_use]
    pub fn mime_type<S1: Into<String>, S2: Into<String>>(
        mut self,
        extension: S1,
        mime_type: S2,
    ) -> Self {
        self.mime_types
            .insert(extension.into().to_lowercase(), mime_type.into());
        self
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the index file name.
    #[must_use]
    pub fn index_file(&self) -> Option<&str> {
        self.index_file.as_deref()
    }

    /// Serves `request_path`, relative to the root.
    ///
    /// Redirects, `304` and `412` are successful outcomes; client and I/O
    /// failures come back as [`StaticFileError`], which
    /// [`to_response`](StaticFileError::to_response) turns into a response.
    pub fn serve(
        &self,
        request_path: &str,
        method: &Method,
        headers: &HeaderMap,
    ) -> Result<Response<Bytes>, StaticFileError> {
        if method != Method::GET && method != Method::HEAD {
            return Err(StaticFileError::MethodNotAllowed);
        }

        if let Some(index) = &self.index_file {
            if request_path.ends_with(&format!("/{index}")) {
                return Ok(redirect("./"));
            }
        }

        let file_path = self.resolve_path(request_path)?;
        let metadata = std::fs::metadata(&file_path)
            .map_err(|e| open_error(e, request_path))?;

        if metadata.is_dir() {
            if !request_path.ends_with('/') {
                return Ok(redirect(&format!("{}/", base_name(request_path))));
            }
            if let Some(index) = &self.index_file {
                let index_path = file_path.join(index);
                if let Ok(index_meta) = std::fs::metadata(&index_path) {
                    if index_meta.is_file() {
                        return self.serve_file(&index_path, &index_meta, method, headers);
                    }
                }
            }
            if !self.directory_listing {
                return Err(StaticFileError::Forbidden(request_path.to_string()));
            }
            return self.list_directory(&file_path, &metadata, method, headers);
        }

        if request_path.ends_with('/') {
            return Ok(redirect(&format!("../{}", base_name(request_path))));
        }

        self.serve_file(&file_path, &metadata, method, headers)
    }

    fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let decoded = percent_decode(request_path)
            .ok_or_else(|| StaticFileError::NotFound(request_path.to_string()))?;
        let relative = decoded.trim_matches('/');

        for component in Path::new(relative).components() {
            match component {
                Component::ParentDir => {
                    return Err(StaticFileError::Forbidden(
                        "directory traversal not allowed".to_string(),
                    ));
                }
                Component::Normal(name) => {
                    let hidden = name.to_str().map_or(false, |n| n.starts_with('.'));
                    if hidden && !self.serve_hidden {
                        return Err(StaticFileError::Forbidden(
                            "hidden files not allowed".to_string(),
                        ));
                    }
                }
                _ => {}
            }
        }

        let full_path = self.root.join(relative);

        let resolved = if self.follow_symlinks {
            full_path
                .canonicalize()
                .map_err(|e| open_error(e, request_path))?
        } else {
            if full_path.is_symlink() {
                return Err(StaticFileError::Forbidden("symlinks not allowed".to_string()));
            }
            full_path
        };

        if self.follow_symlinks {
            let root = self.root.canonicalize()?;
            if !resolved.starts_with(&root) {
                return Err(StaticFileError::Forbidden(
                    "path escapes root directory".to_string(),
                ));
            }
        }

        Ok(resolved)
    }

    fn serve_file(
        &self,
        path: &Path,
        metadata: &Metadata,
        method: &Method,
        headers: &HeaderMap,
    ) -> Result<Response<Bytes>, StaticFileError> {
        let size = metadata.len();
        let modified = modified_time(metadata);
        let etag = if self.etag_enabled {
            modified.map(|m| generate_etag(m, size))
        } else {
            None
        };

        let mut out = self.base_headers(etag.as_deref(), modified);

        let range_header = match check_preconditions(method, headers, etag.as_deref(), modified) {
            Precondition::Failed => {
                return Ok(with_headers(StatusCode::PRECONDITION_FAILED, out, Bytes::new()));
            }
            Precondition::NotModified => return Ok(not_modified(out)),
            Precondition::Proceed(range) => range,
        };

        let range = match range_header {
            Some(value) => parse_range(value, size)?,
            None => None,
        };

        insert(&mut out, header::CONTENT_TYPE, &self.detect_mime_type(path));
        out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        let (status, start, length) = match range {
            Some(range) => {
                insert(&mut out, header::CONTENT_RANGE, &range.content_range(size));
                (StatusCode::PARTIAL_CONTENT, range.start, range.length)
            }
            None => (StatusCode::OK, 0, size),
        };
        insert(&mut out, header::CONTENT_LENGTH, &length.to_string());

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            read_file_range(path, start, length)?
        };

        Ok(with_headers(status, out, body))
    }

    fn list_directory(
        &self,
        dir: &Path,
        metadata: &Metadata,
        method: &Method,
        headers: &HeaderMap,
    ) -> Result<Response<Bytes>, StaticFileError> {
        let modified = modified_time(metadata);
        let mut out = self.base_headers(None, modified);

        if check_if_modified_since(method, headers, modified) == Condition::False {
            return Ok(not_modified(out));
        }

        let mut entries: Vec<(String, bool)> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let is_dir = entry.file_type().ok()?.is_dir();
                Some((name, is_dir))
            })
            .filter(|(name, _)| self.serve_hidden || !name.starts_with('.'))
            .collect();
        entries.sort();

        let mut body = String::from("<pre>\n");
        for (name, is_dir) in entries {
            let name = if is_dir { format!("{name}/") } else { name };
            let _ = writeln!(
                body,
                r#"<a href="{}">{}</a>"#,
                escape_href(&name),
                escape_html(&name)
            );
        }
        body.push_str("</pre>\n");

        out.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        insert(&mut out, header::CONTENT_LENGTH, &body.len().to_string());

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(body)
        };
        Ok(with_headers(StatusCode::OK, out, body))
    }

    fn base_headers(&self, etag: Option<&str>, modified: Option<SystemTime>) -> HeaderMap {
        let mut out = HeaderMap::new();
        if let Some(etag) = etag {
            insert(&mut out, header::ETAG, etag);
        }
        if self.last_modified_enabled {
            if let Some(modified) = modified {
                insert(&mut out, header::LAST_MODIFIED, &httpdate::fmt_http_date(modified));
            }
        }
        if let Some(cache_control) = &self.cache_control {
            insert(&mut out, header::CACHE_CONTROL, cache_control);
        }
        out
    }

    fn detect_mime_type(&self, path: &Path) -> String {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        if let Some(mime) = self.mime_types.get(&extension) {
            return mime.clone();
        }

        match extension.as_str() {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "text/javascript; charset=utf-8",
            "json" | "map" => "application/json",
            "xml" => "application/xml",
            "txt" => "text/plain; charset=utf-8",
            "csv" => "text/csv; charset=utf-8",
            "md" => "text/markdown; charset=utf-8",

            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "ico" => "image/x-icon",
            "avif" => "image/avif",

            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "otf" => "font/otf",

            "pdf" => "application/pdf",
            "zip" => "application/zip",
            "gz" | "gzip" => "application/gzip",
            "tar" => "application/x-tar",

            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "ogg" => "audio/ogg",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "m3u8" => "application/vnd.apple.mpegurl",
            "ts" => "video/mp2t",

            "wasm" => "application/wasm",
            "manifest" | "webmanifest" => "application/manifest+json",

            _ => "application/octet-stream",
        }
        .to_string()
    }
}

/// Serves a [`StaticFiles`] directory under a URL prefix.
///
/// The prefix is stripped from the request path before the file is
/// resolved: with prefix `/assets`, `/assets/css/site.css` is served from
/// `<root>/css/site.css`.
#[derive(Debug, Clone)]
pub struct StaticFileHandler {
    name: String,
    url_prefix: String,
    files: Arc<StaticFiles>,
}

impl StaticFileHandler {
    /// Creates a handler serving `files` under `url_prefix`.
    #[must_use]
    pub fn new(files: StaticFiles, url_prefix: &str) -> Self {
        let url_prefix = url_prefix.trim_matches('/').to_string();
        Self {
            name: format!("static for '/{url_prefix}'"),
            url_prefix,
            files: Arc::new(files),
        }
    }

    /// Returns the prefix without surrounding slashes.
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Returns the file configuration.
    #[must_use]
    pub fn files(&self) -> &StaticFiles {
        &self.files
    }

    /// Maps an incoming URL path to the path inside the root.
    #[must_use]
    pub fn internal_path(&self, path: &str) -> String {
        let trimmed = path.trim_start_matches('/');
        let rest = trimmed.strip_prefix(&self.url_prefix).unwrap_or(trimmed);
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        }
    }
}

impl MainHandler for StaticFileHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let income = ctx.path().to_string();
            let internal = self.internal_path(&income);
            ctx.logger_mut().add_debug("url_path_income", income);
            ctx.logger_mut().add_debug("url_path_internal", internal.clone());

            let files = Arc::clone(&self.files);
            let method = ctx.method().clone();
            let headers = ctx.headers().clone();
            let served =
                tokio::task::spawn_blocking(move || files.serve(&internal, &method, &headers))
                    .await
                .map_err(|e| Error::with_source("static file task failed", e))?;

            let (response, failure) = match served {
                Ok(response) => (response, None),
                Err(e @ StaticFileError::Io(_)) => {
                    let response = e.to_response();
                    (response, Some(Error::with_source("static file i/o failed", e)))
                }
                Err(e) => {
                    ctx.logger().debug(format_args!("static file rejected: {e:?}"));
                    (e.to_response(), None)
                }
            };

            let (parts, body) = response.into_parts();
            ctx.set_status(parts.status);
            ctx.response_headers_mut().extend(parts.headers);
            ctx.write(&body);

            failure.map_or(Ok(()), Err)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    None,
    True,
    False,
}

#[derive(Debug, PartialEq, Eq)]
enum Precondition<'h> {
    Failed,
    NotModified,
    Proceed(Option<&'h str>),
}

fn check_preconditions<'h>(
    method: &Method,
    headers: &'h HeaderMap,
    etag: Option<&str>,
    modified: Option<SystemTime>,
) -> Precondition<'h> {
    let mut condition = check_if_match(headers, etag);
    if condition == Condition::None {
        condition = check_if_unmodified_since(headers, modified);
    }
    if condition == Condition::False {
        return Precondition::Failed;
    }

    match check_if_none_match(headers, etag) {
        Condition::False => {
            if method == Method::GET || method == Method::HEAD {
                return Precondition::NotModified;
            }
            return Precondition::Failed;
        }
        Condition::None => {
            if check_if_modified_since(method, headers, modified) == Condition::False {
                return Precondition::NotModified;
            }
        }
        Condition::True => {}
    }

    let range = header_str(headers, header::RANGE)
        .filter(|_| check_if_range(method, headers, etag, modified) != Condition::False);
    Precondition::Proceed(range)
}

fn check_if_match(headers: &HeaderMap, etag: Option<&str>) -> Condition {
    let Some(mut rest) = header_str(headers, header::IF_MATCH) else {
        return Condition::None;
    };
    loop {
        rest = rest.trim_start_matches([' ', '\t', ',']);
        if rest.is_empty() {
            break;
        }
        if rest.starts_with('*') {
            return Condition::True;
        }
        let Some((tag, remain)) = scan_etag(rest) else {
            break;
        };
        if etag.map_or(false, |current| strong_match(tag, current)) {
            return Condition::True;
        }
        rest = remain;
    }
    Condition::False
}

fn check_if_unmodified_since(headers: &HeaderMap, modified: Option<SystemTime>) -> Condition {
    let (Some(value), Some(modified)) = (header_str(headers, header::IF_UNMODIFIED_SINCE), modified)
    else {
        return Condition::None;
    };
    match not_after(modified, value) {
        Some(true) => Condition::True,
        Some(false) => Condition::False,
        None => Condition::None,
    }
}

fn check_if_none_match(headers: &HeaderMap, etag: Option<&str>) -> Condition {
    let Some(mut rest) = header_str(headers, header::IF_NONE_MATCH) else {
        return Condition::None;
    };
    loop {
        rest = rest.trim_start_matches([' ', '\t', ',']);
        if rest.is_empty() {
            break;
        }
        if rest.starts_with('*') {
            return Condition::False;
        }
        let Some((tag, remain)) = scan_etag(rest) else {
            break;
        };
        if etag.map_or(false, |current| weak_match(tag, current)) {
            return Condition::False;
        }
        rest = remain;
    }
    Condition::True
}

fn check_if_modified_since(
    method: &Method,
    headers: &HeaderMap,
    modified: Option<SystemTime>,
) -> Condition {
    if method != Method::GET && method != Method::HEAD {
        return Condition::None;
    }
    let (Some(value), Some(modified)) = (header_str(headers, header::IF_MODIFIED_SINCE), modified)
    else {
        return Condition::None;
    };
    match not_after(modified, value) {
        Some(true) => Condition::False,
        Some(false) => Condition::True,
        None => Condition::None,
    }
}

fn check_if_range(
    method: &Method,
    headers: &HeaderMap,
    etag: Option<&str>,
    modified: Option<SystemTime>,
) -> Condition {
    if method != Method::GET && method != Method::HEAD {
        return Condition::None;
    }
    let Some(value) = header_str(headers, header::IF_RANGE) else {
        return Condition::None;
    };

    if let Some((tag, _)) = scan_etag(value) {
        return if etag.map_or(false, |current| strong_match(tag, current)) {
            Condition::True
        } else {
            Condition::False
        };
    }

    let matches = modified
        .and_then(unix_secs)
        .zip(httpdate::parse_http_date(value).ok().and_then(unix_secs))
        .map_or(false, |(modified, since)| modified == since);
    if matches {
        Condition::True
    } else {
        Condition::False
    }
}

/// Whether `modified`, truncated to seconds, is not after the date in
/// `value`. `None` when the date does not parse.
fn not_after(modified: SystemTime, value: &str) -> Option<bool> {
    let since = unix_secs(httpdate::parse_http_date(value).ok()?)?;
    Some(unix_secs(modified)? <= since)
}

/// Splits the first entity tag off `s`: `"xyz"` or `W/"xyz"`.
fn scan_etag(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_matches([' ', '\t']);
    let start = if s.starts_with("W/") { 2 } else { 0 };
    let quoted = &s[start..];
    if quoted.len() < 2 || !quoted.starts_with('"') {
        return None;
    }
    for (i, c) in quoted.bytes().enumerate().skip(1) {
        match c {
            b'"' => {
                let end = start + i + 1;
                return Some((&s[..end], &s[end..]));
            }
            0x21 | 0x23..=0x7E | 0x80..=0xFF => {}
            _ => return None,
        }
    }
    None
}

fn strong_match(a: &str, b: &str) -> bool {
    a == b && a.starts_with('"')
}

fn weak_match(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

/// A satisfiable byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ByteRange {
    start: u64,
    length: u64,
}

impl ByteRange {
    fn content_range(self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.start + self.length - 1, size)
    }
}

/// Parses a `Range` header against a file of `size` bytes.
///
/// `Ok(None)` means the whole file should be sent, which is the answer for
/// multi-range requests.
fn parse_range(value: &str, size: u64) -> Result<Option<ByteRange>, StaticFileError> {
    let invalid = StaticFileError::InvalidRange {
        reason: "invalid range",
        size,
    };
    let no_overlap = StaticFileError::InvalidRange {
        reason: "invalid range: failed to overlap",
        size,
    };

    let Some(spec) = value.strip_prefix("bytes=") else {
        return Err(invalid);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = spec.split_once('-') else {
        return Err(invalid);
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let Ok(suffix) = end.parse::<u64>() else {
            return Err(invalid);
        };
        if suffix == 0 || size == 0 {
            return Err(no_overlap);
        }
        let suffix = suffix.min(size);
        return Ok(Some(ByteRange {
            start: size - suffix,
            length: suffix,
        }));
    }

    let Ok(start) = start.parse::<u64>() else {
        return Err(invalid);
    };
    if start >= size {
        return Err(no_overlap);
    }
    let last = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return Err(invalid),
        }
    };
    Ok(Some(ByteRange {
        start,
        length: last - start + 1,
    }))
}

fn read_file_range(path: &Path, start: u64, length: u64) -> Result<Bytes, StaticFileError> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(start))?;

    let mut buffer = Vec::new();
    file.take(length).read_to_end(&mut buffer)?;
    Ok(Bytes::from(buffer))
}

fn generate_etag(modified: SystemTime, size: u64) -> String {
    format!("\"{:x}-{:x}\"", unix_secs(modified).unwrap_or_default(), size)
}

/// Modification time, unless it is missing or the Unix epoch.
fn modified_time(metadata: &Metadata) -> Option<SystemTime> {
    metadata
        .modified()
        .ok()
        .filter(|m| unix_secs(*m).map_or(false, |secs| secs > 0))
}

fn unix_secs(time: SystemTime) -> Option<u64> {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn insert(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn with_headers(status: StatusCode, headers: HeaderMap, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// A 304 keeps only the validators; `Last-Modified` goes when an `ETag`
/// is present.
fn not_modified(mut headers: HeaderMap) -> Response<Bytes> {
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);
    if headers.contains_key(header::ETAG) {
        headers.remove(header::LAST_MODIFIED);
    }
    with_headers(StatusCode::NOT_MODIFIED, headers, Bytes::new())
}

fn redirect(location: &str) -> Response<Bytes> {
    let mut headers = HeaderMap::new();
    insert(&mut headers, header::LOCATION, location);
    with_headers(StatusCode::MOVED_PERMANENTLY, headers, Bytes::new())
}

fn open_error(err: std::io::Error, request_path: &str) -> StaticFileError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        StaticFileError::Forbidden(request_path.to_string())
    } else {
        StaticFileError::NotFound(request_path.to_string())
    }
}

fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

fn percent_decode(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn escape_href(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~/".contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
