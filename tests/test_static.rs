use std::io::{self, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

use trellis::http::request::{Method, Request, RequestBuilder};
use trellis::http::response::{Framing, Response, StatusCode};
use trellis::http::static_files::{
    parse_range, DirEntry, RangeError, Resource, StaticDir, StaticFiles, StaticResource,
};

struct Fixture {
    root: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!("trellis-static-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("hello.txt"), "0123456789").unwrap();
        std::fs::write(root.join("sub/nested.html"), "<p>nested</p>").unwrap();
        std::fs::write(root.join(".secret"), "hidden").unwrap();
        std::fs::write(root.join("big.bin"), vec![7u8; 300]).unwrap();
        Self { root }
    }

    fn files(&self) -> StaticFiles {
        StaticFiles::new(Arc::new(StaticDir::new(&self.root)))
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn get(target: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .target(target)
        .build()
        .unwrap()
}

fn get_range(target: &str, range: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .target(target)
        .header("Range", range)
        .build()
        .unwrap()
}

fn body(res: &Response) -> Vec<u8> {
    let out = res.output();
    let split = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    out[split + 4..].to_vec()
}

#[test]
fn test_serves_whole_file() {
    let fixture = Fixture::new("whole");
    let mut res = Response::new("HTTP/1.1");
    fixture.files().serve(&get("/hello.txt"), &mut res, "/hello.txt").unwrap();

    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.header("Content-Length"), Some("10"));
    assert_eq!(res.header("Content-Type"), Some("text/plain;charset=utf-8"));
    assert!(res.header("Last-Modified").is_some());
    assert_eq!(body(&res), b"0123456789");
}

#[test]
fn test_range_request_returns_partial_content() {
    let fixture = Fixture::new("range");
    let mut res = Response::new("HTTP/1.1");
    let req = get_range("/hello.txt", "bytes=0-4");
    fixture.files().serve(&req, &mut res, "/hello.txt").unwrap();

    assert_eq!(res.status(), StatusCode::PartialContent);
    assert_eq!(res.header("Content-Range"), Some("bytes 0-4/10"));
    assert_eq!(res.header("Content-Length"), Some("5"));
    assert_eq!(body(&res), b"01234");
}

#[test]
fn test_suffix_range() {
    let fixture = Fixture::new("suffix");
    let mut res = Response::new("HTTP/1.1");
    let req = get_range("/hello.txt", "bytes=-3");
    fixture.files().serve(&req, &mut res, "/hello.txt").unwrap();

    assert_eq!(res.header("Content-Range"), Some("bytes 7-9/10"));
    assert_eq!(body(&res), b"789");
}

#[test]
fn test_range_is_capped_at_buffer_size() {
    let fixture = Fixture::new("capped");
    let files = fixture.files().with_buffer_sizes(4, 2);
    let mut res = Response::new("HTTP/1.1");
    let req = get_range("/hello.txt", "bytes=2-");
    files.serve(&req, &mut res, "/hello.txt").unwrap();

    assert_eq!(res.status(), StatusCode::PartialContent);
    assert_eq!(res.header("Content-Range"), Some("bytes 2-5/10"));
    assert_eq!(body(&res), b"2345");
}

#[test]
fn test_unsatisfiable_range() {
    let fixture = Fixture::new("unsatisfiable");
    let mut res = Response::new("HTTP/1.1");
    let req = get_range("/hello.txt", "bytes=20-30");
    fixture.files().serve(&req, &mut res, "/hello.txt").unwrap();

    assert_eq!(res.status(), StatusCode::RangeNotSatisfiable);
    assert!(res.is_closing());
}

#[test]
fn test_directory_without_slash_redirects() {
    let fixture = Fixture::new("redirect");
    let mut res = Response::new("HTTP/1.1");
    fixture.files().serve(&get("/sub"), &mut res, "/sub").unwrap();

    assert_eq!(res.status(), StatusCode::MovedPermanently);
    assert_eq!(res.header("Location"), Some("/sub/"));
}

#[test]
fn test_directory_listing() {
    let fixture = Fixture::new("listing");
    let mut res = Response::new("HTTP/1.1");
    fixture.files().serve(&get("/"), &mut res, "/").unwrap();

    let page = String::from_utf8(body(&res)).unwrap();
    assert_eq!(res.header("Content-Type"), Some("text/html;charset=utf-8"));
    assert!(page.contains("<a href=\"hello.txt\">hello.txt</a>"));
    assert!(page.contains("<a href=\"sub/\">sub/</a>"));
    assert!(!page.contains(".secret"));
}

#[test]
fn test_empty_directory_listing() {
    let fixture = Fixture::new("empty");
    std::fs::create_dir_all(fixture.root.join("void")).unwrap();

    let mut res = Response::new("HTTP/1.1");
    fixture.files().serve(&get("/void/"), &mut res, "/void/").unwrap();

    let page = String::from_utf8(body(&res)).unwrap();
    assert!(page.contains("There's no file in this directory"));
}

#[test]
fn test_hidden_and_traversal_paths_are_not_found() {
    let fixture = Fixture::new("hidden");

    for path in ["/.secret", "/../etc/passwd", "/sub/../hello.txt", "/missing.txt"] {
        let mut res = Response::new("HTTP/1.1");
        fixture.files().serve(&get("/"), &mut res, path).unwrap();
        assert_eq!(res.status(), StatusCode::NotFound, "{path}");
    }
}

#[test]
fn test_large_file_is_chunked() {
    let fixture = Fixture::new("chunked");
    let files = fixture.files().with_buffer_sizes(100, 128);
    let mut res = Response::new("HTTP/1.1");
    files.serve(&get("/big.bin"), &mut res, "/big.bin").unwrap();

    assert_eq!(res.framing(), Framing::Chunked);
    assert_eq!(res.body_len(), 300);
    assert!(res.header("Content-Length").is_none());

    let raw = body(&res);
    // 128 + 128 + 44 byte chunks, then the terminator.
    assert!(raw.starts_with(b"80\r\n"));
    let mut tail = b"2c\r\n".to_vec();
    tail.extend(vec![7u8; 44]);
    tail.extend_from_slice(b"\r\n0\r\n\r\n");
    assert!(raw.ends_with(&tail));
}

#[test]
fn test_download_sets_content_disposition() {
    let fixture = Fixture::new("download");
    let mut res = Response::new("HTTP/1.1");
    fixture
        .files()
        .download(&get("/"), &mut res, "/hello.txt", " report.txt ")
        .unwrap();

    assert_eq!(
        res.header("Content-Disposition"),
        Some("attachment; filename=report.txt")
    );
    assert_eq!(body(&res), b"0123456789");
}

#[test]
fn test_download_of_directory_or_blank_name() {
    let fixture = Fixture::new("download-dir");

    let mut res = Response::new("HTTP/1.1");
    fixture.files().download(&get("/"), &mut res, "/sub", "sub.zip").unwrap();
    assert_eq!(res.status(), StatusCode::NotFound);

    let mut res = Response::new("HTTP/1.1");
    fixture.files().download(&get("/"), &mut res, "/hello.txt", "  ").unwrap();
    assert!(res.output().is_empty());
}

struct Embedded;

impl StaticResource for Embedded {
    fn lookup(&self, path: &str) -> io::Result<Resource> {
        Ok(match path {
            "/app.js" => Resource::File {
                body: Box::new(Cursor::new(b"console.log(1)".to_vec())),
                len: 14,
                mime: "text/javascript".to_string(),
                modified: None,
            },
            "/assets/" => Resource::Directory {
                name: "assets".to_string(),
                entries: vec![DirEntry {
                    name: "<logo>.svg".to_string(),
                    is_dir: false,
                }],
            },
            "/locked" => Resource::Forbidden,
            _ => Resource::NotFound,
        })
    }
}

#[test]
fn test_custom_resource_provider() {
    let files = StaticFiles::new(Arc::new(Embedded));

    let mut res = Response::new("HTTP/1.1");
    files.serve(&get("/app.js"), &mut res, "/app.js").unwrap();
    assert_eq!(res.header("Content-Type"), Some("text/javascript;charset=utf-8"));
    assert_eq!(body(&res), b"console.log(1)");

    let mut res = Response::new("HTTP/1.1");
    files.serve(&get("/locked"), &mut res, "/locked").unwrap();
    assert_eq!(res.status(), StatusCode::Forbidden);

    let mut res = Response::new("HTTP/1.1");
    files.serve(&get("/assets/"), &mut res, "/assets/").unwrap();
    let page = String::from_utf8(body(&res)).unwrap();
    assert!(page.contains("Index of assets"));
    assert!(page.contains("&lt;logo&gt;.svg"));
}

#[test]
fn test_parse_range_forms() {
    assert_eq!(parse_range("bytes=0-4", 10), Ok((0, 4)));
    assert_eq!(parse_range("bytes=5-", 10), Ok((5, 9)));
    assert_eq!(parse_range("bytes=-4", 10), Ok((6, 9)));
    assert_eq!(parse_range("bytes=-40", 10), Ok((0, 9)));
    assert_eq!(parse_range("bytes=3-100", 10), Ok((3, 9)));
}

#[test]
fn test_parse_range_errors() {
    assert_eq!(parse_range("0-4", 10), Err(RangeError::MissingSeparator));
    assert!(matches!(parse_range("bytes=abc", 10), Err(RangeError::Malformed(_))));
    assert!(matches!(parse_range("bytes=-", 10), Err(RangeError::Malformed(_))));
    assert!(matches!(parse_range("bytes=x-2", 10), Err(RangeError::Malformed(_))));
    assert_eq!(parse_range("bytes=10-12", 10), Err(RangeError::Unsatisfiable { len: 10 }));
    assert_eq!(parse_range("bytes=5-2", 10), Err(RangeError::Unsatisfiable { len: 10 }));
    assert_eq!(parse_range("bytes=0-0", 0), Err(RangeError::Unsatisfiable { len: 0 }));
}

struct OddNames;

impl StaticResource for OddNames {
    fn lookup(&self, _path: &str) -> io::Result<Resource> {
        Ok(Resource::Directory {
            name: "odd & co".to_string(),
            entries: vec![
                DirEntry {
                    name: "a b#1?.txt".to_string(),
                    is_dir: false,
                },
                DirEntry {
                    name: "100%".to_string(),
                    is_dir: true,
                },
            ],
        })
    }
}

#[test]
fn test_listing_links_are_percent_encoded() {
    let files = StaticFiles::new(Arc::new(OddNames));
    let mut res = Response::new("HTTP/1.1");
    files.serve(&get("/odd/"), &mut res, "/odd/").unwrap();

    let page = String::from_utf8(body(&res)).unwrap();
    assert!(page.contains("<title>Index of odd &amp; co</title>"));
    assert!(page.contains("<a href=\"a%20b%231%3F.txt\">a b#1?.txt</a>"));
    assert!(page.contains("<a href=\"100%25/\">100%/</a>"));
}

#[test]
fn test_mime_is_guessed_from_extension() {
    let fixture = Fixture::new("mime");
    std::fs::write(fixture.root.join("page.html"), "<p>hi</p>").unwrap();
    std::fs::write(fixture.root.join("blob.unknownext"), "??").unwrap();

    let mut res = Response::new("HTTP/1.1");
    fixture.files().serve(&get("/page.html"), &mut res, "/page.html").unwrap();
    assert_eq!(res.header("Content-Type"), Some("text/html;charset=utf-8"));

    let mut res = Response::new("HTTP/1.1");
    fixture
        .files()
        .serve(&get("/blob.unknownext"), &mut res, "/blob.unknownext")
        .unwrap();
    assert_eq!(res.header("Content-Type"), Some("application/octet-stream;charset=utf-8"));
}
