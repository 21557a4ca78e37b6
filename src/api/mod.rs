//! API Module
//!
//! HTTP handlers and routing for the cache admin REST API.
//!
//! # Endpoints
//! - `PUT /entries` - Store a rendered response
//! - `GET /entries?key=` - Read an entry by its key string
//! - `DELETE /entries?key=` - Invalidate one entry
//! - `DELETE /entries/all` - Invalidate every entry
//! - `GET /keys` - List stored keys
//! - `POST /invalidate` - Invalidate entries related to a resource
//! - `POST /purge` - Purge expired entries now
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
