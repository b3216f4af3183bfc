#![doc = "The `authforge` library crate."]
#![doc = ""]
#![doc = "Session authentication core: signed access/refresh tokens, a revocation"]
#![doc = "ledger consulted on every verification, the session manager tying the two"]
#![doc = "together, and role/ownership guards. `main.rs` wires these into an actix-web"]
#![doc = "server together with a user directory."]

pub mod auth;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod models;
pub mod routes;

pub use crate::error::AppError;
