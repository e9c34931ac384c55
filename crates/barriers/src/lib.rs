//! # Barriers
//!
//! Gating layer of the dispatch queue.
//!
//! - [`StoreQueueMetrics`]: live pending count per consumer, fed by the store
//! - [`ConnectivityBarrier`]: open while the device has a usable connection
//! - [`BatchingBarrier`]: open once enough Dispatches are pending
//! - [`BarrierRegistry`]: resolves the barriers of a consumer and AND-combines them
//! - Connectivity sources: [`ManualConnectivity`], [`AlwaysConnected`], [`TcpProbeConnectivity`]

mod batching;
mod connectivity;
mod monitor;
mod queue_metrics;
mod registry;

pub use batching::{BatchingBarrier, BatchingBarrierFactory};
pub use connectivity::{ConnectivityBarrier, ConnectivityBarrierFactory};
pub use monitor::{connectivity_from_config, AlwaysConnected, ManualConnectivity, TcpProbeConnectivity};
pub use queue_metrics::StoreQueueMetrics;
pub use registry::{default_factories, BarrierRegistry};
