use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use flate2::read::GzDecoder;
use trellis::http::encoding::Gzip;
use trellis::http::response::{Framing, Response, StatusCode};

fn text(res: &Response) -> String {
    String::from_utf8_lossy(res.output()).into_owned()
}

fn body_of(res: &Response) -> &[u8] {
    let out = res.output();
    let split = out
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header block terminator");
    &out[split + 4..]
}

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::Created.as_u16(), 201);
    assert_eq!(StatusCode::NoContent.as_u16(), 204);
    assert_eq!(StatusCode::PartialContent.as_u16(), 206);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::RangeNotSatisfiable.as_u16(), 416);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    assert_eq!(StatusCode::HttpVersionNotSupported.as_u16(), 505);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NoContent.reason_phrase(), "No Content");
    assert_eq!(StatusCode::UriTooLong.reason_phrase(), "URI Too Long");
    assert_eq!(
        StatusCode::MethodNotAllowed.reason_phrase(),
        "Method Not Allowed"
    );
    assert_eq!(
        StatusCode::HttpVersionNotSupported.reason_phrase(),
        "HTTP Version Not Supported"
    );
}

#[test]
fn test_status_code_unknown_values() {
    assert_eq!(StatusCode::from_u16(404), StatusCode::NotFound);
    assert_eq!(StatusCode::from_u16(299), StatusCode::Other(299));
    assert_eq!(StatusCode::Other(299).reason_phrase(), "Unknown Status");
    assert!(StatusCode::Other(451).is_error());
    assert!(!StatusCode::Found.is_error());
}

#[test]
fn test_send_text_writes_fixed_length_response() {
    let mut res = Response::new("HTTP/1.1");
    res.send_text("  about \n").unwrap();

    let out = text(&res);
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.contains("Content-Length: 5\r\n"));
    assert!(out.contains("Content-Type: text/plain;charset=utf-8\r\n"));
    assert!(out.ends_with("\r\n\r\nabout"));
    assert_eq!(res.framing(), Framing::Fixed);
    assert_eq!(res.body_len(), 5);
    assert!(res.headers_sent());
}

#[test]
fn test_standard_headers_follow_user_headers_in_order() {
    let mut res = Response::new("HTTP/1.1").with_keep_alive(7, Duration::from_secs(10));
    res.set_header("X-Custom", "1");
    res.send_text("ok").unwrap();

    let out = text(&res);
    let position = |name: &str| {
        out.find(&format!("\r\n{name}: "))
            .unwrap_or_else(|| panic!("missing {name}"))
    };

    let order = [
        "X-Custom",
        "Last-Modified",
        "Content-Length",
        "Content-Type",
        "Server",
        "Date",
        "Connection",
        "Accept-Ranges",
        "Keep-Alive",
    ];
    for pair in order.windows(2) {
        assert!(position(pair[0]) < position(pair[1]), "{pair:?}");
    }
    assert!(out.contains("Keep-Alive: timeout=10, max=7\r\n"));
    assert!(out.contains("Connection: keep-alive\r\n"));
}

#[test]
fn test_header_block_is_written_once() {
    let mut res = Response::new("HTTP/1.1");
    res.send_text("first").unwrap();
    res.send_text("second").unwrap();

    let out = text(&res);
    assert_eq!(out.matches("HTTP/1.1 200 OK").count(), 1);
    assert!(out.contains("Content-Length: 5\r\n"));
    assert_eq!(body_of(&res), b"first");
    assert_eq!(res.body_len(), 5);
}

#[test]
fn test_send_after_chunked_head_writes_a_chunk() {
    let mut res = Response::new("HTTP/1.1");
    res.start_chunked(None, "text/plain", StatusCode::Ok);
    res.send(b"more", None, "text/html", StatusCode::NotFound).unwrap();
    res.finish();

    let out = text(&res);
    assert_eq!(res.status(), StatusCode::Ok);
    assert!(!out.contains("Content-Length"));
    assert!(out.ends_with("\r\n\r\n4\r\nmore\r\n0\r\n\r\n"));
}

#[test]
fn test_blank_text_discards_body() {
    let mut res = Response::new("HTTP/1.1");
    res.send_text("   ").unwrap();

    assert!(res.discards_body());
    assert!(text(&res).contains("Content-Type: text/plain\r\n"));
    assert!(body_of(&res).is_empty());
}

#[test]
fn test_discarded_body_still_advertises_length() {
    let mut res = Response::new("HTTP/1.1");
    res.set_discard_body(true);
    res.send(b"hello world", None, "text/html", StatusCode::Ok)
        .unwrap();

    let out = text(&res);
    assert!(out.contains("Content-Length: 11\r\n"));
    assert!(out.contains("Content-Type: text/html\r\n"));
    assert!(body_of(&res).is_empty());
}

#[test]
fn test_send_error_closes_except_for_not_found() {
    let mut missing = Response::new("HTTP/1.1");
    missing.send_error(StatusCode::NotFound).unwrap();
    assert!(!missing.is_closing());
    assert!(text(&missing).ends_with("Not Found"));

    let mut failed = Response::new("HTTP/1.1");
    failed
        .send_error_with(StatusCode::InternalServerError, "boom")
        .unwrap();
    let out = text(&failed);
    assert!(failed.is_closing());
    assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(out.contains("Connection: close\r\n"));
    assert!(!out.contains("Keep-Alive"));
    assert!(!out.contains("Last-Modified"));
    assert!(out.ends_with("boom"));
}

#[test]
fn test_redirect_sets_location() {
    let mut temporary = Response::new("HTTP/1.1");
    temporary.redirect("/elsewhere", false).unwrap();
    assert_eq!(temporary.status(), StatusCode::TemporaryRedirect);
    assert_eq!(temporary.header("Location"), Some("/elsewhere"));

    let mut permanent = Response::new("HTTP/1.1");
    permanent.redirect("https://example.com/", true).unwrap();
    assert!(text(&permanent).starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
}

#[test]
fn test_chunked_body() {
    let mut res = Response::new("HTTP/1.1");
    res.start_chunked(None, "text/plain", StatusCode::Ok);
    res.send_chunk(b"hello");
    res.send_chunk(b"");
    res.send_chunk(b" world, this is chunked");
    res.finish();

    let out = text(&res);
    assert_eq!(res.framing(), Framing::Chunked);
    assert!(out.contains("Transfer-Encoding: chunked\r\n"));
    assert!(!out.contains("Content-Length"));
    assert!(out.ends_with("\r\n\r\n5\r\nhello\r\n17\r\n world, this is chunked\r\n0\r\n\r\n"));
}

#[test]
fn test_not_ready_response_writes_nothing() {
    let mut res = Response::new("HTTP/1.1").with_ready(false);
    res.send_text("ignored").unwrap();
    res.send_chunk(b"ignored");
    res.finish();

    assert!(res.output().is_empty());
    assert!(!res.headers_sent());
}

#[test]
fn test_expose_headers_narrows_header_block() {
    let mut res = Response::new("HTTP/1.1");
    res.set_header("Access-Control-Expose-Headers", " content-length ,X-Visible");
    res.set_header("X-Visible", "yes");
    res.set_header("X-Hidden", "no");
    res.send_text("ok").unwrap();

    assert_eq!(res.header("X-Visible"), Some("yes"));
    assert_eq!(res.header("Content-Length"), Some("2"));
    assert!(res.header("X-Hidden").is_none());
    assert!(res.header("Server").is_none());
    assert!(!text(&res).contains("X-Hidden"));
}

#[test]
fn test_expose_headers_wildcard_keeps_everything() {
    let mut res = Response::new("HTTP/1.1");
    res.set_header("Access-Control-Expose-Headers", "*");
    res.set_header("X-Hidden", "still here");
    res.send_text("ok").unwrap();

    assert!(res.header("X-Hidden").is_some());
    assert!(res.header("Server").is_some());
}

#[test]
fn test_reset_allows_a_fresh_response() {
    let mut res = Response::new("HTTP/1.1");
    res.set_closing(true);
    res.send_text("partial").unwrap();
    res.reset();

    assert!(res.output().is_empty());
    assert!(!res.headers_sent());
    assert!(res.is_closing());
    assert_eq!(res.status(), StatusCode::Ok);

    res.send_error_with(StatusCode::InternalServerError, "fresh")
        .unwrap();
    assert!(text(&res).starts_with("HTTP/1.1 500"));
}

#[test]
fn test_take_output_drains_buffer() {
    let mut res = Response::new("HTTP/1.0");
    res.send_text("x").unwrap();

    let bytes = res.take_output();
    assert!(bytes.starts_with(b"HTTP/1.0 200 OK\r\n"));
    assert!(res.output().is_empty());
}

#[test]
fn test_custom_server_name() {
    let mut res = Response::new("HTTP/1.1").with_server_name("Edge/2");
    res.send_text("ok").unwrap();

    assert_eq!(res.header("Server"), Some("Edge/2"));
}

#[test]
fn test_body_over_threshold_is_compressed() {
    let mut res = Response::new("HTTP/1.1")
        .with_compress_threshold(16)
        .with_compressor(Some(Arc::new(Gzip)));
    let payload = "compress me ".repeat(50);
    res.send(payload.as_bytes(), None, "text/html", StatusCode::Ok)
        .unwrap();

    assert_eq!(res.header("Content-Encoding"), Some("gzip"));

    let body = body_of(&res).to_vec();
    let advertised: usize = res.header("Content-Length").unwrap().parse().unwrap();
    assert_eq!(advertised, body.len());
    assert!(body.len() < payload.len());

    let mut decoded = String::new();
    GzDecoder::new(body.as_slice())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, payload);
}

#[test]
fn test_body_under_threshold_is_not_compressed() {
    let mut res = Response::new("HTTP/1.1")
        .with_compress_threshold(1024)
        .with_compressor(Some(Arc::new(Gzip)));
    res.send_text("tiny").unwrap();

    assert!(res.header("Content-Encoding").is_none());
    assert_eq!(body_of(&res), b"tiny");
}
