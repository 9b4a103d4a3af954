//! Request handlers.

pub mod access;
pub mod auth;
pub mod batch;
