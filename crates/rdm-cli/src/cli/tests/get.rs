//! Tests for get and stream.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_get_defaults() {
    match parse(&["rdm", "get", "https://example.com/a.iso"]) {
        CliCommand::Get(args) => {
            assert_eq!(args.url, "https://example.com/a.iso");
            assert!(args.output.is_none());
            assert!(!args.overwrite);
            assert!(args.sessions.is_none());
            assert!(args.chunk_size.is_none());
            assert!(args.limit.is_none());
            assert!(args.sha256.is_none());
        }
        _ => panic!("expected Get"),
    }
}

#[test]
fn cli_parse_get_all_flags() {
    match parse(&[
        "rdm",
        "get",
        "https://example.com/a.iso",
        "-o",
        "/tmp/a.iso",
        "--overwrite",
        "-n",
        "8",
        "--chunk-size",
        "512K",
        "--limit",
        "2M",
        "--sha256",
        "abcd",
    ]) {
        CliCommand::Get(args) => {
            assert_eq!(args.output, Some(PathBuf::from("/tmp/a.iso")));
            assert!(args.overwrite);
            assert_eq!(args.sessions, Some(8));
            assert_eq!(args.chunk_size, Some(512 * 1024));
            assert_eq!(args.limit, Some(2 * 1024 * 1024));
            assert_eq!(args.sha256.as_deref(), Some("abcd"));
        }
        _ => panic!("expected Get"),
    }
}

#[test]
fn cli_parse_get_rejects_bad_size() {
    assert!(Cli::try_parse_from(["rdm", "get", "http://x/y", "--limit", "fast"]).is_err());
}

#[test]
fn cli_parse_stream_span() {
    match parse(&[
        "rdm", "stream", "http://x/y", "--start", "1K", "--end", "4096",
    ]) {
        CliCommand::Stream(args) => {
            assert!(args.output.is_none());
            assert!(!args.continue_);
            assert_eq!(args.start, Some(1024));
            assert_eq!(args.end, Some(4096));
        }
        _ => panic!("expected Stream"),
    }
}

#[test]
fn cli_parse_stream_continue() {
    match parse(&["rdm", "stream", "http://x/y", "-c", "-o", "part.bin"]) {
        CliCommand::Stream(args) => {
            assert!(args.continue_);
            assert_eq!(args.output, Some(PathBuf::from("part.bin")));
            assert!(args.start.is_none());
        }
        _ => panic!("expected Stream"),
    }
}
