//! Integration tests against the public library API.
//!
//! Exercises the read path, retention and the HTTP surface end-to-end
//! with in-memory doubles in place of the store and external services.

mod mock_store;
mod read_path;
mod retention_flow;
mod http;
