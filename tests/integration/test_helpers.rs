//! Shared helpers for integration tests.
//!
//! Integration tests drive the full client against scripted `sh` workers:
//! real subprocesses that print a ready line and then replay canned NDJSON
//! responses. Because every connection starts a fresh id space, the scripts
//! can hard-code correlation ids (the first request is always id 1).

use std::path::PathBuf;

use taskpipe::ClientConfig;

/// Build a client configuration whose "worker" is `sh -c <script>`.
///
/// The supervisor appends the fixed `--workspace … --mode server` contract
/// after the script argument; `sh -c` absorbs those as positional
/// parameters, so scripts can ignore them.
pub fn scripted_worker(script: &str) -> ClientConfig {
    let mut config = ClientConfig::new(PathBuf::from("/bin/sh"), std::env::temp_dir());
    config.worker_args = vec!["-c".to_owned(), script.to_owned()];
    config.startup_timeout_seconds = 5;
    config
}
