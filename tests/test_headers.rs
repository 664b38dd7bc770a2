use trellis::http::headers::Headers;

#[test]
fn test_set_same_key_twice_keeps_one_entry() {
    let mut headers = Headers::new();
    headers.set("X-Trace", "first");
    headers.set("x-trace", "second");

    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get("X-TRACE"), Some("second"));
}

#[test]
fn test_overwrite_keeps_original_position_and_casing() {
    let mut headers = Headers::new();
    headers.set("Content-Type", "text/plain");
    headers.set("Server", "trellis");
    headers.set("content-type", "text/html");

    let keys: Vec<&str> = headers.keys().collect();
    assert_eq!(keys, vec!["Content-Type", "Server"]);
    assert_eq!(headers.get("Content-Type"), Some("text/html"));
}

#[test]
fn test_blank_keys_and_values_are_ignored() {
    let mut headers = Headers::new();
    headers.set("", "value");
    headers.set("   ", "value");
    headers.set("X-Empty", "");
    headers.set("X-Blank", "   ");

    assert!(headers.is_empty());
}

#[test]
fn test_keys_and_values_are_trimmed() {
    let mut headers = Headers::new();
    headers.set("  Host ", "  example.com  ");

    let header = headers.iter().next().unwrap();
    assert_eq!(header.key, "Host");
    assert_eq!(header.value, "example.com");
}

#[test]
fn test_write_always_ends_with_blank_line() {
    let empty = Headers::new();
    let mut out = Vec::new();
    empty.write(&mut out);
    assert_eq!(out, b"\r\n");

    let mut headers = Headers::new();
    headers.set("Host", "example.com");
    headers.set("Accept", "*/*");
    let mut out = Vec::new();
    headers.write(&mut out);
    assert_eq!(out, b"Host: example.com\r\nAccept: */*\r\n\r\n");
}

#[test]
fn test_remove_and_contains() {
    let mut headers = Headers::new();
    headers.set("Vary", "Origin");

    assert!(headers.contains("vary"));
    assert_eq!(headers.remove("VARY"), Some("Origin".to_string()));
    assert!(!headers.contains("Vary"));
    assert_eq!(headers.remove("Vary"), None);
}

#[test]
fn test_retain_filters_entries() {
    let mut headers = Headers::new();
    headers.set("Date", "now");
    headers.set("Server", "trellis");
    headers.set("X-Custom", "1");

    headers.retain(|h| h.key.starts_with('X') || h.key == "Date");

    let keys: Vec<&str> = headers.keys().collect();
    assert_eq!(keys, vec!["Date", "X-Custom"]);
}

#[test]
fn test_clear_and_values() {
    let mut headers = Headers::new();
    headers.set("A", "1");
    headers.set("B", "2");

    let values: Vec<&str> = headers.values().collect();
    assert_eq!(values, vec!["1", "2"]);

    headers.clear();
    assert_eq!(headers.len(), 0);
}
