//! Health Insurance Proposal API Library
//!
//! Core of the proposal workflow: proposal-number allocation, the lifecycle
//! state machine, required-document derivation, and the stores and HTTP
//! handlers that expose them.
//!
//! # Modules
//!
//! - `api`: API-layer re-exports.
//! - `core`: Domain logic and shared models/errors.
//! - `data`: Storage contracts and backends.
//! - `circuit_breaker`: Circuit breaker for store calls.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema.
//! - `db_storage`: PostgreSQL proposal and plan store.
//! - `documents`: Required-document checklist.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and router.
//! - `lifecycle`: Status transitions and communications.
//! - `models`: Core data models.
//! - `proposal_number`: Proposal number formats and allocation.
//! - `services`: Proposal operations over the stores.
//! - `store`: Store traits, in-memory store and guarded wrapper.

pub mod api;
pub mod core;
pub mod data;

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod documents;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod proposal_number;
pub mod services;
pub mod store;
