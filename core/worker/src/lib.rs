//! Harbor worker.
//!
//! An offline layer that sits between an application and the network:
//! - Routes intercepted requests: same-origin GETs network-first,
//!   cross-origin GETs cache-first, everything else untouched
//! - Manages versioned cache partitions across install and activation
//! - Accepts control messages from the foreground application
//! - Replays deferred mutations when connectivity returns
//!
//! The host side is a [`DispatchTable`] mapping event kinds to handlers and
//! a [`WorkerHost`] that drives each handler's future to completion.

pub mod config;
pub mod control;
pub mod dispatch;
pub mod host;
pub mod lifecycle;
pub mod router;
pub mod strategy;
pub mod worker;

pub use config::{StoreConfig, WorkerConfig};
pub use control::{ControlEnvelope, ControlMessage, ControlOutcome};
pub use dispatch::{DispatchTable, Event, EventKind, EventOutcome, WaitUntil};
pub use host::WorkerHost;
pub use lifecycle::{Registration, WorkerState, WorkerVersion};
pub use router::{Route, Router};
pub use strategy::{CacheFirst, NetworkFirst, Strategy};
pub use worker::{FetchDisposition, InstallReport, Worker};
