//! VMHud backend: engine synchronization core
//!
//! Keeps a routing-matrix view in sync with a running Voicemeeter engine and
//! turns user actions into parameter writes.
//!
//! ## Architecture
//!
//! ```text
//!  UI thread ──commands──► CommandIntake ──immediate──────────┐
//!                              │                              ▼
//!                              └─queue─► PendingWrites ─► flush thread ─► SharedRemote ─► engine
//!                                                                            ▲
//!  poll thread: ConnectionMachine ─► SnapshotBuilder ─► SnapshotStore ───────┘ (reads)
//!                                                            │
//!                                    subscribers ◄── publish on change
//! ```
//!
//! - [`gateway`]: the remote API contract, the native DLL binding and a
//!   simulated engine
//! - [`connection`]: login, retry with backoff, reconnect, logout
//! - [`snapshot`]: dirty-flag throttled reads into a [`MatrixSnapshot`]
//! - [`diff`]: decides whether a new snapshot differs from the last one
//! - [`publisher`]: current snapshot plus subscriber fan-out
//! - [`commands`] / [`pending`]: immediate and coalesced writes
//! - [`worker`]: the periodic threads
//! - [`Backend`]: all of the above behind one handle
//!
//! ## Usage
//!
//! ```ignore
//! use vmhud_backend::Backend;
//! use vmhud_core::config::HudConfig;
//!
//! let backend = Backend::from_config(&HudConfig::default());
//! let updates = backend.subscribe();
//! backend.start();
//!
//! backend.set_route(0, 5, true);
//! if let Ok(snapshot) = updates.recv() {
//!     println!("{} strips", snapshot.strips().len());
//! }
//! backend.stop();
//! ```
//!
//! [`MatrixSnapshot`]: vmhud_core::MatrixSnapshot

mod backend;
pub mod commands;
pub mod connection;
pub mod diff;
pub mod error;
pub mod gateway;
pub mod pending;
pub mod publisher;
pub mod snapshot;
pub mod worker;

pub use backend::Backend;
pub use commands::CommandIntake;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{NativeRemote, RemoteApi, SharedRemote, SimulatedEngine, UnavailableRemote};
pub use publisher::Subscription;
