// Library exports for Quill
// This allows integration tests and the binary to share the app modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod markdown;
pub mod routes;
pub mod state;
pub mod uploads;
pub mod views;
