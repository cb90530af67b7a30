//! VMHud Core - routing matrix model shared by the backend and front-ends
//!
//! This crate provides:
//! - The immutable [`MatrixSnapshot`] captured on every changed poll tick
//! - Bus/strip identifiers and engine topology ([`Bus`], [`EngineKind`], [`Topology`])
//! - The engine's parameter naming convention ([`params`])
//! - Display-name fallback policy ([`fallback`])
//! - YAML configuration schema and loader ([`config`])

pub mod config;
pub mod fallback;
pub mod params;
pub mod types;

pub use types::*;
