//! Realtime Delivery Module
//!
//! Connection lifecycle and live message delivery.
//!
//! # Architecture
//!
//! - **`connection`** - `ConnectionHandle`, the server-side face of one socket
//! - **`registry`** - user → live connection map, the only shared map here
//! - **`pool`** - bounded job queue drained by a fixed set of delivery workers
//! - **`batch`** - size/timer driven batching of deliveries per recipient
//! - **`monitor`** - per-connection inactivity timer
//! - **`session`** - one connection's read loop, writer and teardown
//! - **`hub`** - wiring for the websocket route
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs
//! ├── connection.rs
//! ├── registry.rs
//! ├── pool.rs
//! ├── batch.rs
//! ├── monitor.rs
//! ├── session.rs
//! └── hub.rs
//! ```
//!
//! # Data Flow
//!
//! ```text
//! inbound frame -> ChatSession -> ChatService (validate, save)
//!     -> DeliveryWorkerPool::submit -> worker / BatchScheduler
//!     -> ConnectionRegistry::lookup -> ConnectionHandle -> writer task -> socket
//! ```
//!
//! Live delivery is best effort. A message reaches the pool only after it has
//! been saved, so anything skipped or dropped here is still in the history.

pub mod connection;
pub mod registry;
pub mod pool;
pub mod batch;
pub mod monitor;
pub mod session;
pub mod hub;

pub use connection::{ConnectionHandle, ConnectionId, Frame, TransportError};
pub use registry::ConnectionRegistry;
pub use pool::{DeliveryConfig, DeliveryMode, DeliveryWorkerPool, Job, StatsSnapshot, SubmitError};
pub use batch::{split_by_recipient, Batch, BatchScheduler};
pub use monitor::{InactivityMonitor, MonitorState};
pub use session::{ChatSession, SessionEnd, SessionSettings};
pub use hub::RealtimeHub;
