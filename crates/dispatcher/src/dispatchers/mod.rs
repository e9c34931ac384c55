//! Dispatcher implementations
//!
//! Contains LogDispatcher, FileDispatcher, and CollectDispatcher.

mod collect;
mod file;
mod log;

pub use self::collect::CollectDispatcher;
pub use self::file::{FileDispatcher, FileDispatcherConfig};
pub use self::log::LogDispatcher;
