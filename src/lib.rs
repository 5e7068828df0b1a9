//! Karzoun sign-up — the multi-step workspace registration flow.

pub mod backend;
pub mod config;
pub mod error;
pub mod registration;
pub mod store;
