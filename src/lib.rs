//! AutoSource car valuation service.
//!
//! Estimates a price band for a used or new car from a market base price,
//! exposed over HTTP to the storefront.
//!
//! # Modules
//!
//! - `api`: API-layer namespace.
//! - `core`: Valuation domain namespace.
//! - `circuit_breaker`: Fail-fast guard for the remote lookup.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Valuation input, base price and result types.
//! - `services`: Market data backends (REST gateway, Postgres).
//! - `valuation`: The valuation engine and its base price port.

pub mod api;
pub mod core;

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod valuation;
