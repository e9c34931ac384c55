//! ConnectivityBarrier - opens while a usable connection exists

use std::collections::HashSet;
use std::sync::Arc;

use contracts::{
    Barrier, BarrierConfiguration, BarrierContext, BarrierFactory, BarrierScope, BarrierState,
    ConnectionType, Connectivity, ConnectivityStatus, StateCell, StateStream, COLLECT_CONSUMER_ID,
};

/// Gate on device connectivity
///
/// `Unknown` and `NotConnected` keep the barrier closed. With `wifi_only` set, only
/// Wi-Fi and Ethernet connections open it. The state is the same for every consumer.
pub struct ConnectivityBarrier {
    connectivity: Arc<dyn Connectivity>,
    wifi_only: StateCell<bool>,
}

impl ConnectivityBarrier {
    pub const ID: &'static str = "ConnectivityBarrier";
    pub const KEY_WIFI_ONLY: &'static str = "wifi_only";

    pub fn new(connectivity: Arc<dyn Connectivity>, wifi_only: bool) -> Self {
        Self {
            connectivity,
            wifi_only: StateCell::new(wifi_only),
        }
    }

    pub fn wifi_only(&self) -> bool {
        self.wifi_only.get().unwrap_or(false)
    }
}

impl Barrier for ConnectivityBarrier {
    fn id(&self) -> &str {
        Self::ID
    }

    fn on_state(&self, _consumer_id: &str) -> StateStream<BarrierState> {
        self.connectivity
            .status()
            .combine(self.wifi_only.subscribe(), |status, wifi_only| {
                BarrierState::from_open(is_usable(*status, *wifi_only))
            })
    }

    fn update_configuration(&self, configuration: &BarrierConfiguration) {
        self.wifi_only.set(wifi_only_from(configuration));
    }
}

fn is_usable(status: ConnectivityStatus, wifi_only: bool) -> bool {
    match status {
        ConnectivityStatus::Connected(kind) if wifi_only => {
            matches!(kind, ConnectionType::Wifi | ConnectionType::Ethernet)
        }
        ConnectivityStatus::Connected(_) => true,
        ConnectivityStatus::NotConnected | ConnectivityStatus::Unknown => false,
    }
}

fn wifi_only_from(configuration: &BarrierConfiguration) -> bool {
    configuration
        .get(ConnectivityBarrier::KEY_WIFI_ONLY)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

/// Creates [`ConnectivityBarrier`]s
///
/// Gates only the collect dispatcher unless configured otherwise.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityBarrierFactory {
    default_scopes: Option<HashSet<BarrierScope>>,
}

impl ConnectivityBarrierFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_scopes(scopes: HashSet<BarrierScope>) -> Self {
        Self {
            default_scopes: Some(scopes),
        }
    }
}

impl BarrierFactory for ConnectivityBarrierFactory {
    fn id(&self) -> &str {
        ConnectivityBarrier::ID
    }

    fn default_scopes(&self) -> HashSet<BarrierScope> {
        self.default_scopes
            .clone()
            .unwrap_or_else(|| HashSet::from([BarrierScope::consumer(COLLECT_CONSUMER_ID)]))
    }

    fn create(
        &self,
        context: &BarrierContext,
        configuration: &BarrierConfiguration,
    ) -> Arc<dyn Barrier> {
        Arc::new(ConnectivityBarrier::new(
            Arc::clone(&context.connectivity),
            wifi_only_from(configuration),
        ))
    }
}
