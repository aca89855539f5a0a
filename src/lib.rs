// Library surface for the binary, headless/integration tests and `serve`.
pub mod app;
pub mod app_dirs;
pub mod backend;
pub mod config;
pub mod cue;
pub mod error;
pub mod logging;
pub mod pacing;
pub mod quiz;
pub mod runtime;
pub mod server;
pub mod session;
pub mod ui;
