//! Static resources: lookup capability, a filesystem provider, and the
//! file/directory/range serving built on top of it.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use html_escape::{encode_double_quoted_attribute, encode_text};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;
use tracing::debug;

use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// What a lookup found at a path.
pub enum Resource {
    File {
        body: Box<dyn ReadSeek>,
        len: u64,
        mime: String,
        modified: Option<SystemTime>,
    },
    Directory {
        name: String,
        entries: Vec<DirEntry>,
    },
    NotFound,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Source of static content addressed by request path.
pub trait StaticResource: Send + Sync {
    fn lookup(&self, path: &str) -> io::Result<Resource>;
}

/// Serves files below a root directory.
///
/// Paths containing `..` or any hidden (`.`-prefixed) component are reported
/// as not found; permission failures are reported as forbidden.
#[derive(Debug, Clone)]
pub struct StaticDir {
    root: PathBuf,
}

impl StaticDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut full = self.root.clone();

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(name)), None) => {
                    if segment.starts_with('.') {
                        return None;
                    }
                    full.push(name);
                }
                _ => return None,
            }
        }

        Some(full)
    }
}

impl StaticResource for StaticDir {
    fn lookup(&self, path: &str) -> io::Result<Resource> {
        let Some(full) = self.resolve(path) else {
            return Ok(Resource::NotFound);
        };

        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            Err(e) => return classify(e),
        };

        if meta.is_dir() {
            let reader = match fs::read_dir(&full) {
                Ok(reader) => reader,
                Err(e) => return classify(e),
            };

            let mut entries: Vec<DirEntry> = reader
                .filter_map(Result::ok)
                .filter_map(|entry| {
                    let name = entry.file_name().to_str()?.to_string();
                    if name.starts_with('.') {
                        return None;
                    }
                    let meta = entry.metadata().ok()?;
                    Some(DirEntry {
                        name,
                        is_dir: meta.is_dir(),
                    })
                })
                .collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));

            let name = full
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("/")
                .to_string();

            return Ok(Resource::Directory { name, entries });
        }

        let file = match File::open(&full) {
            Ok(file) => file,
            Err(e) => return classify(e),
        };

        Ok(Resource::File {
            body: Box::new(file),
            len: meta.len(),
            mime: mime_guess::from_path(&full).first_or_octet_stream().to_string(),
            modified: meta.modified().ok(),
        })
    }
}

fn classify(e: io::Error) -> io::Result<Resource> {
    match e.kind() {
        io::ErrorKind::NotFound => Ok(Resource::NotFound),
        io::ErrorKind::PermissionDenied => Ok(Resource::Forbidden),
        _ => Err(e),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range header has no unit separator")]
    MissingSeparator,
    #[error("malformed range: {0}")]
    Malformed(String),
    #[error("range not satisfiable for {len} bytes")]
    Unsatisfiable { len: u64 },
}

/// Parses a single `Range` value into an inclusive `(start, end)` pair
/// against a resource of `len` bytes.
///
/// Accepts `bytes=a-b`, `bytes=a-` and the suffix form `bytes=-n`. An end
/// past the resource is clamped to its last byte.
///
/// # Example
///
/// ```
/// # use trellis::http::static_files::parse_range;
/// assert_eq!(parse_range("bytes=0-4", 10), Ok((0, 4)));
/// assert_eq!(parse_range("bytes=6-", 10), Ok((6, 9)));
/// assert_eq!(parse_range("bytes=-3", 10), Ok((7, 9)));
/// assert!(parse_range("0-4", 10).is_err());
/// ```
pub fn parse_range(header: &str, len: u64) -> Result<(u64, u64), RangeError> {
    let idx = header.rfind('=').ok_or(RangeError::MissingSeparator)?;
    let range_set = header[idx + 1..].trim();

    let (from, to) = range_set
        .split_once('-')
        .ok_or_else(|| RangeError::Malformed(range_set.to_string()))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<u64>()
            .map_err(|_| RangeError::Malformed(range_set.to_string()))
    };

    if len == 0 {
        return Err(RangeError::Unsatisfiable { len });
    }

    let (start, end) = match (from.trim().is_empty(), to.trim().is_empty()) {
        (true, true) => return Err(RangeError::Malformed(range_set.to_string())),
        (true, false) => {
            let suffix = parse(to)?;
            if suffix == 0 {
                return Err(RangeError::Unsatisfiable { len });
            }
            (len.saturating_sub(suffix), len - 1)
        }
        (false, true) => (parse(from)?, len - 1),
        (false, false) => (parse(from)?, parse(to)?.min(len - 1)),
    };

    if start >= len || start > end {
        return Err(RangeError::Unsatisfiable { len });
    }

    Ok((start, end))
}

/// Serves files and directory listings from a [`StaticResource`].
#[derive(Clone)]
pub struct StaticFiles {
    resources: Arc<dyn StaticResource>,
    body_buffer_size: usize,
    chunk_size: usize,
}

impl StaticFiles {
    pub fn new(resources: Arc<dyn StaticResource>) -> Self {
        Self {
            resources,
            body_buffer_size: 1024 * 1024,
            chunk_size: 64 * 1024,
        }
    }

    /// Files larger than `body_buffer_size` are streamed in `chunk_size`
    /// pieces; ranges are capped at `body_buffer_size` bytes.
    pub fn with_buffer_sizes(mut self, body_buffer_size: usize, chunk_size: usize) -> Self {
        self.body_buffer_size = body_buffer_size.max(1);
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn serve(&self, req: &Request, res: &mut Response, path: &str) -> io::Result<()> {
        match self.resources.lookup(path)? {
            Resource::NotFound => res.send_error(StatusCode::NotFound),
            Resource::Forbidden => res.send_error(StatusCode::Forbidden),
            Resource::Directory { name, entries } => {
                if !path.ends_with('/') {
                    return res.redirect(&format!("{path}/"), true);
                }
                let page = directory_index(&name, &entries);
                res.send(page.as_bytes(), None, "text/html", StatusCode::Ok)
            }
            Resource::File {
                body,
                len,
                mime,
                modified,
            } => self.serve_file(req, res, body, len, &mime, modified),
        }
    }

    /// Serves a file as an attachment named `filename`. A blank name does
    /// nothing; anything other than a regular file is a 404.
    pub fn download(
        &self,
        req: &Request,
        res: &mut Response,
        path: &str,
        filename: &str,
    ) -> io::Result<()> {
        if filename.trim().is_empty() {
            return Ok(());
        }

        match self.resources.lookup(path)? {
            Resource::File {
                body,
                len,
                mime,
                modified,
            } => {
                res.set_header(
                    "Content-Disposition",
                    &format!("attachment; filename={}", filename.trim()),
                );
                self.serve_file(req, res, body, len, &mime, modified)
            }
            _ => res.send_error(StatusCode::NotFound),
        }
    }

    fn serve_file(
        &self,
        req: &Request,
        res: &mut Response,
        mut body: Box<dyn ReadSeek>,
        len: u64,
        mime: &str,
        modified: Option<SystemTime>,
    ) -> io::Result<()> {
        if let Some(range) = req.header("Range") {
            let (start, end) = match parse_range(range, len) {
                Ok(bounds) => bounds,
                Err(e) => {
                    debug!(range = %range, error = %e, "rejecting range");
                    return res.send_error(StatusCode::RangeNotSatisfiable);
                }
            };
            let end = end.min(start + self.body_buffer_size as u64 - 1);

            let mut buf = vec![0u8; (end - start + 1) as usize];
            body.seek(SeekFrom::Start(start))?;
            body.read_exact(&mut buf)?;

            res.set_header("Content-Range", &format!("bytes {start}-{end}/{len}"));
            return res.send(&buf, modified, mime, StatusCode::PartialContent);
        }

        if len > self.body_buffer_size as u64 {
            res.start_chunked(modified, mime, StatusCode::Ok);

            let mut buf = vec![0u8; self.chunk_size];
            loop {
                let n = body.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                res.send_chunk(&buf[..n]);
            }

            res.finish();
            return Ok(());
        }

        let mut buf = Vec::with_capacity(len as usize);
        body.read_to_end(&mut buf)?;
        res.send(&buf, modified, mime, StatusCode::Ok)
    }
}

fn directory_index(name: &str, entries: &[DirEntry]) -> String {
    let mut page = format!(
        "<!DOCTYPE html>\n<html>\n <head>\n  <title>Index of {0}</title>\n </head>\n <body>\n<h1>Index of {0}</h1>\n<ul>",
        encode_text(name)
    );

    if entries.is_empty() {
        page.push_str("<h3>There's no file in this directory</h3>");
    }

    for entry in entries {
        let mut href = utf8_percent_encode(&entry.name, HREF).to_string();
        let mut display = entry.name.clone();
        if entry.is_dir {
            href.push('/');
            display.push('/');
        }
        page.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>",
            encode_double_quoted_attribute(&href),
            encode_text(&display)
        ));
    }

    page.push_str("</ul></body></html>");
    page
}

/// Characters that cannot appear literally in a relative link to a single entry.
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');
