// Library root
// -----------
// This crate exposes the library surface behind the `protecodesc` CLI. The
// binary (`main.rs`) only parses arguments, installs logging and the Ctrl-C
// handler, and hands over to `cli::run`.
//
// Module responsibilities:
// - `api`: the Protecode SC REST client (upload with SHA1 dedup, result,
//   rescan, delete, listings).
// - `endpoint`, `transport`, `retry`, `classify`: request addressing, the
//   HTTP engine seam, retry with backoff, status classification.
// - `poll`: waits for a result to leave the busy state.
// - `config`, `credentials`, `session`: local settings and login handling.
// - `ui`, `archive`, `cli`: prompts and rendering, directory packaging, the
//   command-line surface.
pub mod api;
pub mod archive;
pub mod cancel;
pub mod classify;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod models;
pub mod poll;
pub mod retry;
pub mod session;
pub mod transport;
pub mod ui;

pub use api::ScanClient;
pub use error::ClientError;
