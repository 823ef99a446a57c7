// tests/fingerprint.rs

use std::time::Duration;

use serde_json::json;

use fetchq::request::{fingerprint, resolve_url, Body, RequestSpec};
use fetchq::types::Method;

#[test]
fn query_order_does_not_matter() {
    let a = RequestSpec::get("http://api.test/search")
        .query("q", "rust")
        .query("page", "1");
    let b = RequestSpec::get("http://api.test/search")
        .query("page", "1")
        .query("q", "rust");
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn json_key_order_does_not_matter() {
    let a = RequestSpec::post("http://api.test/items").json(json!({"x": 1, "y": {"b": 2, "a": 1}}));
    let b = RequestSpec::post("http://api.test/items").json(json!({"y": {"a": 1, "b": 2}, "x": 1}));
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn headers_and_timeout_are_ignored() {
    let a = RequestSpec::get("http://api.test/me").header("authorization", "Bearer one");
    let b = RequestSpec::get("http://api.test/me")
        .header("authorization", "Bearer two")
        .timeout(Duration::from_secs(3));
    assert_eq!(fingerprint(&a), fingerprint(&b));
}

#[test]
fn method_url_query_and_body_all_count() {
    let base = RequestSpec::get("http://api.test/a");
    let id = fingerprint(&base);

    assert_ne!(id, fingerprint(&RequestSpec::new(Method::Delete, "http://api.test/a")));
    assert_ne!(id, fingerprint(&RequestSpec::get("http://api.test/b")));
    assert_ne!(id, fingerprint(&base.clone().query("a", "1")));
    assert_ne!(id, fingerprint(&base.clone().text("payload")));
}

#[test]
fn body_kinds_do_not_collide() {
    let url = "http://api.test/echo";
    let text = RequestSpec::post(url).body(Body::Text("1".into()));
    let json = RequestSpec::post(url).body(Body::Json(json!(1)));
    let bytes = RequestSpec::post(url).body(Body::Bytes(b"1".to_vec()));
    let empty = RequestSpec::post(url);

    let ids = [&text, &json, &bytes, &empty].map(fingerprint);
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            assert_ne!(ids[i], ids[j], "body kinds {i} and {j} collided");
        }
    }
}

#[test]
fn repeated_query_keys_are_distinguished() {
    let one = RequestSpec::get("http://api.test/t").query("tag", "a");
    let two = RequestSpec::get("http://api.test/t")
        .query("tag", "a")
        .query("tag", "b");
    assert_ne!(fingerprint(&one), fingerprint(&two));
}

#[test]
fn fingerprint_is_hex_blake3() {
    let id = fingerprint(&RequestSpec::get("http://api.test/"));
    assert_eq!(id.len(), 64);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn resolve_url_joins_slashes_once() {
    assert_eq!(resolve_url(Some("http://h/api"), "users"), "http://h/api/users");
    assert_eq!(resolve_url(Some("http://h/api/"), "/users"), "http://h/api/users");
    assert_eq!(resolve_url(Some("http://h/api/"), "users"), "http://h/api/users");
    assert_eq!(resolve_url(Some("http://h/api"), "/users"), "http://h/api/users");
    assert_eq!(resolve_url(Some("http://h/api"), "https://x/y"), "https://x/y");
    assert_eq!(resolve_url(None, "users"), "users");
}
