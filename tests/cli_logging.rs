// tests/cli_logging.rs

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::Level;

use fetchq::cli::{CliArgs, LogLevel};
use fetchq::config::resolve_config_path;
use fetchq::errors::{RequestError, TransportError};
use fetchq::logging::{parse_level_str, resolve_level};
use fetchq::request::RequestSpec;
use fetchq::service::RequestService;
use fetchq::transport::Response;
use fetchq::{format_result_line, run_requests, RunSummary};
use fetchq_test_utils::builders::{ConfigFileBuilder, RequestEntryBuilder};
use fetchq_test_utils::{init_tracing, with_timeout, FakeTransport};

#[test]
fn cli_defaults() {
    let args = CliArgs::try_parse_from(["fetchq"]).unwrap();
    assert!(args.config.is_none());
    assert!(args.max_concurrent.is_none());
    assert!(args.log_level.is_none());
    assert!(!args.dry_run);
}

#[test]
fn cli_flags_parse() {
    let args = CliArgs::try_parse_from([
        "fetchq",
        "--config",
        "batch.toml",
        "--log-level",
        "debug",
        "--max-concurrent",
        "3",
        "--dry-run",
    ])
    .unwrap();
    assert_eq!(args.config.as_deref(), Some("batch.toml"));
    assert_eq!(args.max_concurrent.map(|n| n.get()), Some(3));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(args.dry_run);
}

#[test]
fn cli_rejects_unknown_level() {
    assert!(CliArgs::try_parse_from(["fetchq", "--log-level", "loud"]).is_err());
}

#[test]
fn cli_rejects_zero_concurrency() {
    assert!(CliArgs::try_parse_from(["fetchq", "--max-concurrent", "0"]).is_err());
}

#[test]
fn config_path_flag_beats_env_which_beats_default() {
    assert_eq!(
        resolve_config_path(Some("a.toml"), Some("b.toml")),
        PathBuf::from("a.toml")
    );
    assert_eq!(resolve_config_path(None, Some("b.toml")), PathBuf::from("b.toml"));
    assert_eq!(resolve_config_path(Some("  "), None), PathBuf::from("Fetchq.toml"));
    assert_eq!(resolve_config_path(None, None), PathBuf::from("Fetchq.toml"));
}

#[test]
fn cli_flag_beats_env_which_beats_default() {
    assert_eq!(resolve_level(Some(LogLevel::Trace), Some("error")), Level::TRACE);
    assert_eq!(resolve_level(None, Some("warn")), Level::WARN);
    assert_eq!(resolve_level(None, Some(" DEBUG ")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some("chatty")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
}

#[test]
fn level_strings() {
    assert_eq!(parse_level_str("warning"), Some(Level::WARN));
    assert_eq!(parse_level_str("Error"), Some(Level::ERROR));
    assert_eq!(parse_level_str(""), None);
}

#[test]
fn result_lines_show_status_or_error() {
    let spec = RequestSpec::get("http://api.test/a");
    let id = "0123456789abcdef0123";

    let ok = format_result_line(&spec, id, &Ok(Response::new(204).with_body("xy")));
    assert_eq!(ok, "ok   GET http://api.test/a status=204 bytes=2 id=0123456789ab");

    let err = format_result_line(
        &spec,
        id,
        &Err(RequestError::Transport(TransportError::Timeout)),
    );
    assert!(err.starts_with("err  GET http://api.test/a id=0123456789ab: "));
}

#[tokio::test]
async fn run_requests_tallies_every_planned_request() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.respond_status("http://api.test/broken", 500, 1);

    let cfg = ConfigFileBuilder::new()
        .base_url("http://api.test")
        .max_concurrent(2)
        .with_request(RequestEntryBuilder::new("/one").build())
        .with_request(RequestEntryBuilder::new("/broken").priority(9).build())
        .with_request(RequestEntryBuilder::new("https://elsewhere.test/two").build())
        .build();

    let service = Arc::new(RequestService::new(transport.clone(), cfg.service));
    let summary = with_timeout(run_requests(service, cfg.requests)).await;

    assert_eq!(
        summary,
        RunSummary {
            succeeded: 2,
            failed: 1
        }
    );
    assert_eq!(summary.total(), 3);
    assert!(!summary.all_succeeded());

    let mut urls = transport.call_urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://api.test/broken".to_string(),
            "http://api.test/one".to_string(),
            "https://elsewhere.test/two".to_string(),
        ]
    );
}
