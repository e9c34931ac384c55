//! Barrier contracts
//!
//! A Barrier is a named Open/Closed gate that must be satisfied before a consumer
//! may drain its queue. Which consumers a barrier gates is described by its scopes.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Connectivity, ConsumerInfo, QueueMetrics, StateStream};

/// Barrier configuration document
pub type BarrierConfiguration = serde_json::Map<String, Value>;

/// Which consumer(s) a barrier applies to
///
/// Serialized as a plain string: `"all"` or the consumer id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BarrierScope {
    /// Every consumer
    All,
    /// One named consumer
    Consumer(String),
}

impl BarrierScope {
    /// Serialized form of [`BarrierScope::All`]
    pub const ALL: &'static str = "all";

    /// Scope for a single consumer
    pub fn consumer(id: impl Into<String>) -> Self {
        Self::Consumer(id.into())
    }

    /// Whether this scope covers `consumer_id`
    pub fn matches(&self, consumer_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Consumer(id) => id == consumer_id,
        }
    }
}

impl From<String> for BarrierScope {
    fn from(value: String) -> Self {
        if value == Self::ALL {
            Self::All
        } else {
            Self::Consumer(value)
        }
    }
}

impl From<&str> for BarrierScope {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<BarrierScope> for String {
    fn from(scope: BarrierScope) -> Self {
        match scope {
            BarrierScope::All => BarrierScope::ALL.to_string(),
            BarrierScope::Consumer(id) => id,
        }
    }
}

impl fmt::Display for BarrierScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(Self::ALL),
            Self::Consumer(id) => f.write_str(id),
        }
    }
}

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierState {
    Open,
    Closed,
}

impl BarrierState {
    /// `Open` when `open` is true
    pub fn from_open(open: bool) -> Self {
        if open {
            Self::Open
        } else {
            Self::Closed
        }
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// A named Open/Closed gate
pub trait Barrier: Send + Sync {
    /// Barrier id (unique within a registry)
    fn id(&self) -> &str;

    /// State of this barrier for `consumer_id`
    ///
    /// The stream stays silent until the barrier has enough information to decide.
    fn on_state(&self, consumer_id: &str) -> StateStream<BarrierState>;

    /// Apply a new configuration
    ///
    /// Barriers without settings ignore it.
    fn update_configuration(&self, _configuration: &BarrierConfiguration) {}
}

/// Everything a factory may need to build its barrier
#[derive(Clone)]
pub struct BarrierContext {
    /// Live pending counts per consumer
    pub queue_metrics: Arc<dyn QueueMetrics>,

    /// Device connectivity
    pub connectivity: Arc<dyn Connectivity>,

    /// Currently enabled consumers
    pub consumers: StateStream<Vec<ConsumerInfo>>,
}

/// Builds a configurable barrier
pub trait BarrierFactory: Send + Sync {
    /// Id of the barrier this factory creates
    fn id(&self) -> &str;

    /// Scopes used when no configuration assigns any
    fn default_scopes(&self) -> HashSet<BarrierScope> {
        HashSet::from([BarrierScope::All])
    }

    /// Create the barrier with its initial configuration
    fn create(
        &self,
        context: &BarrierContext,
        configuration: &BarrierConfiguration,
    ) -> Arc<dyn Barrier>;
}

/// A barrier together with the consumers it gates
#[derive(Clone)]
pub struct ScopedBarrier {
    pub barrier: Arc<dyn Barrier>,
    pub scopes: HashSet<BarrierScope>,
}

impl ScopedBarrier {
    pub fn new(barrier: Arc<dyn Barrier>, scopes: HashSet<BarrierScope>) -> Self {
        Self { barrier, scopes }
    }

    /// Whether this barrier gates `consumer_id`
    pub fn applies_to(&self, consumer_id: &str) -> bool {
        self.scopes.iter().any(|scope| scope.matches(consumer_id))
    }
}

impl PartialEq for ScopedBarrier {
    /// Same barrier instance with the same scopes
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.barrier) as *const (),
            Arc::as_ptr(&other.barrier) as *const (),
        ) && self.scopes == other.scopes
    }
}

impl fmt::Debug for ScopedBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedBarrier")
            .field("barrier", &self.barrier.id())
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Settings for one barrier, as delivered by configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarrierSettings {
    /// Scopes override; `None` falls back to the factory default
    #[serde(default)]
    pub scopes: Option<HashSet<BarrierScope>>,

    /// Barrier-specific configuration
    #[serde(default)]
    pub configuration: BarrierConfiguration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_serde_uses_plain_strings() {
        let scopes = vec![BarrierScope::All, BarrierScope::consumer("collect")];
        let json = serde_json::to_string(&scopes).unwrap();
        assert_eq!(json, r#"["all","collect"]"#);

        let back: Vec<BarrierScope> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scopes);
    }

    #[test]
    fn test_scope_matching() {
        assert!(BarrierScope::All.matches("anything"));
        assert!(BarrierScope::consumer("collect").matches("collect"));
        assert!(!BarrierScope::consumer("collect").matches("logger"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings: BarrierSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.scopes.is_none());
        assert!(settings.configuration.is_empty());
    }
}
