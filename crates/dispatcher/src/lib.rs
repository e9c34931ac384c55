//! # Dispatcher
//!
//! 队列消费模块。
//!
//! 负责：
//! - 每个 consumer 一个 drain loop，按 barrier 组合状态拉取批次
//! - 处理部分确认，in-flight 的 Dispatch 不会被重复投递
//! - 内置 log / file / collect 三种 dispatcher

pub mod coordinator;
mod drain;
pub mod dispatchers;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod transport;

pub use contracts::Dispatcher;
pub use coordinator::{CoordinatorOptions, DrainCoordinator};
pub use dispatchers::{CollectDispatcher, FileDispatcher, FileDispatcherConfig, LogDispatcher};
pub use error::DispatcherError;
pub use factory::{create_dispatcher, create_dispatchers};
pub use metrics::{DrainMetrics, MetricsSnapshot};
pub use transport::{UdpTransport, UdpTransportConfig};
