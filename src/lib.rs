//! Client for evaluating NWP simulation output against observations through a
//! remote Evaluation Service.
/// Application directory resolution.
pub mod app_dirs;
/// Persisted client settings.
pub mod config;
/// Shared HTTP agent and response helpers.
pub(crate) mod http_client;
/// Logging setup for console and file output.
pub mod logging;
/// Evaluation Service access over HTTP.
pub mod service;
/// Evaluation session state and controller.
pub mod session;
