//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a JSON value
//! - `GET /get/:key` - Retrieve a value by key (`?decrypt=true` hints an encrypted record)
//! - `DELETE /del/:key` - Delete a key
//! - `DELETE /clear` - Remove every key in the namespace
//! - `GET /keys` - List live logical keys
//! - `GET /stats` - Storage usage for the namespace
//! - `GET /metrics` - Hit/miss counters
//! - `POST /cleanup` - Sweep expired entries now
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
