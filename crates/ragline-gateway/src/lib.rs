//! HTTP trigger gateway: `POST /ingest`, `POST /query`, `GET /jobs/{id}` and `GET /health`.

mod error;
mod handlers;
mod router;
mod server;

pub use error::{ApiError, GatewayError};
pub use router::build_router;
pub use server::{AppState, GatewayServer};
