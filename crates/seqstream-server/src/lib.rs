//! SeqStream Server
//!
//! HTTP surface for the analysis pipeline:
//! - `POST /upload` stores a FASTA/FASTQ file and returns its session id
//! - `GET /ws/:file_id` runs the session and streams its events
//! - `GET /health` and `GET /metrics` for operations

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;
pub mod websocket;

pub use cli::Cli;
pub use config::{HttpConfig, ServerConfig};
pub use routes::{create_router, UploadResponse};
pub use state::{sweep_stale_uploads, AppState};
pub use websocket::WebSocketSink;
