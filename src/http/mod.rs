//! HTTP boundary
//!
//! - `/health`, `/version`
//! - `/v1/download`: validated conversion options, no work done
//! - `/v1/direct-download`: runs a conversion and streams the MP3
//! - `/v1/info`: video metadata

pub mod handlers;
pub mod routes;

pub use routes::create_router;
