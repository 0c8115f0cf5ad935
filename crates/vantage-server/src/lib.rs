//! HTTP surface for the Vantage service.
//!
//! Routes: `/track` (POST JSON + GET image beacon), `/auth/login`,
//! `/visitors` and `/visitors/{id}` (Bearer-token protected), and
//! `/health`. CORS is open so tracking snippets work from any origin.

pub mod auth;
pub mod error;
pub mod extract;
pub mod health;
pub mod server;
pub mod track;
pub mod visitors;

pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
