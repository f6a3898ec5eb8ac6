//! Avi NLU server — library crate for the intent recognition REST server.
//!
//! Re-exports all modules so the binary (`main.rs`) and external crates
//! (e.g. `avi-e2e-tests`) can access `AppState`, `build_router` and the
//! recognition `Dispatcher`.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod routes;
pub mod state;
