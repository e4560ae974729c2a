//! # valor
//!
//! The Valor sheet server: a clap CLI and an axum HTTP API over one
//! `valor-core` session.

pub mod api;
pub mod cli;
pub mod config;
