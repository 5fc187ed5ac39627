pub mod access;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod media;
pub mod middleware;
pub mod pipeline;
pub mod state;
