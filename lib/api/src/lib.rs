//! # matchx API
//!
//! REST surface for the matchx matching engine. JSON responses use a
//! uniform envelope: `{"success": true, "count": n, "results": [..]}` on
//! success and `{"success": false, "error": ".."}` on failure.

pub mod rest;

pub use rest::{AppState, RestApi};
