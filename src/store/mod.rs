//! Persistence layer — libSQL-backed storage for organizations, users and
//! verification codes.

mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::RegistrationStore;
