//! BarrierRegistry - which barriers gate which consumer
//!
//! Holds the barriers created from factories (configurable) plus additional barriers
//! registered at runtime, resolves their scopes and AND-combines their states per
//! consumer. One registry belongs to one SDK instance.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use contracts::{
    Barrier, BarrierConfiguration, BarrierContext, BarrierFactory, BarrierScope, BarrierSettings,
    BarrierState, ScopedBarrier, StateCell, StateStream,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::{BatchingBarrierFactory, ConnectivityBarrierFactory};

/// Factories installed in every registry
pub fn default_factories() -> Vec<Arc<dyn BarrierFactory>> {
    vec![
        Arc::new(ConnectivityBarrierFactory::new()),
        Arc::new(BatchingBarrierFactory::new()),
    ]
}

struct Installed {
    factory: Arc<dyn BarrierFactory>,
    barrier: Arc<dyn Barrier>,
}

struct RegistryState {
    installed: Vec<Installed>,
    additional: Vec<ScopedBarrier>,
    settings: HashMap<String, BarrierSettings>,
}

pub struct BarrierRegistry {
    context: BarrierContext,
    state: Mutex<RegistryState>,
    scoped: StateCell<Vec<ScopedBarrier>>,
}

impl BarrierRegistry {
    /// Registry with the default factories
    pub fn new(context: BarrierContext, settings: HashMap<String, BarrierSettings>) -> Self {
        Self::with_factories(context, Vec::new(), settings)
    }

    /// Registry with `factories`, plus any default factory whose id they don't cover
    pub fn with_factories(
        context: BarrierContext,
        factories: Vec<Arc<dyn BarrierFactory>>,
        settings: HashMap<String, BarrierSettings>,
    ) -> Self {
        let registry = Self {
            context,
            state: Mutex::new(RegistryState {
                installed: Vec::new(),
                additional: Vec::new(),
                settings,
            }),
            scoped: StateCell::new(Vec::new()),
        };

        let mut to_install = factories;
        for default in default_factories() {
            if !to_install.iter().any(|f| f.id() == default.id()) {
                to_install.push(default);
            }
        }
        registry.add_default_barriers(to_install);
        registry
    }

    // ===== Factories =====

    /// Installed factories
    pub fn default_barriers(&self) -> Vec<Arc<dyn BarrierFactory>> {
        self.lock()
            .installed
            .iter()
            .map(|installed| Arc::clone(&installed.factory))
            .collect()
    }

    /// Install `factory`, replacing any barrier with the same id
    pub fn add_default_barrier(&self, factory: Arc<dyn BarrierFactory>) {
        self.add_default_barriers(vec![factory]);
    }

    pub fn add_default_barriers(&self, factories: Vec<Arc<dyn BarrierFactory>>) {
        {
            let mut state = self.lock();
            for factory in factories {
                let configuration = state
                    .settings
                    .get(factory.id())
                    .map(|settings| settings.configuration.clone())
                    .unwrap_or_default();
                let barrier = factory.create(&self.context, &configuration);
                info!(barrier = factory.id(), "barrier installed");

                let installed = Installed { factory, barrier };
                match state
                    .installed
                    .iter_mut()
                    .find(|existing| existing.factory.id() == installed.factory.id())
                {
                    Some(existing) => *existing = installed,
                    None => state.installed.push(installed),
                }
            }
        }
        self.publish();
    }

    // ===== Additional barriers =====

    /// Gate `scopes` with `barrier`, replacing an additional barrier with the same id
    ///
    /// Additional barriers receive no configuration updates.
    pub fn register_scoped_barrier(&self, barrier: Arc<dyn Barrier>, scopes: HashSet<BarrierScope>) {
        {
            let mut state = self.lock();
            let scoped = ScopedBarrier::new(barrier, scopes);
            match state
                .additional
                .iter_mut()
                .find(|existing| existing.barrier.id() == scoped.barrier.id())
            {
                Some(existing) => *existing = scoped,
                None => state.additional.push(scoped),
            }
        }
        self.publish();
    }

    /// Remove the additional barrier `barrier_id`
    pub fn unregister_scoped_barrier(&self, barrier_id: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let before = state.additional.len();
            state.additional.retain(|scoped| scoped.barrier.id() != barrier_id);
            state.additional.len() != before
        };
        if removed {
            self.publish();
        }
        removed
    }

    /// Remove every additional barrier
    pub fn clear_additional_barriers(&self) {
        self.lock().additional.clear();
        self.publish();
    }

    // ===== Settings =====

    /// Apply new settings
    ///
    /// Every installed barrier receives its configuration (empty when absent), and
    /// scopes are re-resolved.
    pub fn update_settings(&self, settings: HashMap<String, BarrierSettings>) {
        {
            let mut state = self.lock();
            let empty = BarrierConfiguration::new();
            for installed in &state.installed {
                let configuration = settings
                    .get(installed.barrier.id())
                    .map(|s| &s.configuration)
                    .unwrap_or(&empty);
                installed.barrier.update_configuration(configuration);
            }
            state.settings = settings;
        }
        debug!("barrier settings updated");
        self.publish();
    }

    // ===== Resolution =====

    /// Every barrier with its resolved scopes
    pub fn scoped_barriers(&self) -> Vec<ScopedBarrier> {
        self.scoped.get().unwrap_or_default()
    }

    /// Barriers gating `consumer_id`
    pub fn barriers_for(&self, consumer_id: &str) -> Vec<ScopedBarrier> {
        self.scoped_barriers()
            .into_iter()
            .filter(|scoped| scoped.applies_to(consumer_id))
            .collect()
    }

    /// Combined state of every barrier gating `consumer_id`
    ///
    /// Open only while every relevant barrier reports Open; Closed until each of
    /// them has emitted. Open when no barrier applies. Follows registry changes.
    ///
    /// Must be called inside a tokio runtime.
    pub fn on_barriers_state(&self, consumer_id: &str) -> StateStream<BarrierState> {
        let cell = StateCell::empty();
        let output = cell.subscribe();
        let barriers = self.scoped.subscribe();
        tokio::spawn(combine_for_consumer(
            consumer_id.to_string(),
            barriers,
            cell,
        ));
        output
    }

    fn publish(&self) {
        let scoped = {
            let state = self.lock();
            resolve(&state)
        };
        self.scoped.set(scoped);
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Installed barriers with configured → factory default → `{All}` scopes, then additional ones
fn resolve(state: &RegistryState) -> Vec<ScopedBarrier> {
    let installed = state.installed.iter().map(|installed| {
        let scopes = match state
            .settings
            .get(installed.barrier.id())
            .and_then(|settings| settings.scopes.clone())
        {
            Some(configured) => configured,
            None => {
                let defaults = installed.factory.default_scopes();
                if defaults.is_empty() {
                    HashSet::from([BarrierScope::All])
                } else {
                    defaults
                }
            }
        };
        ScopedBarrier::new(Arc::clone(&installed.barrier), scopes)
    });

    installed.chain(state.additional.iter().cloned()).collect()
}

/// Follow the barrier list and AND-combine the states relevant to `consumer`
async fn combine_for_consumer(
    consumer: String,
    mut barriers: StateStream<Vec<ScopedBarrier>>,
    cell: StateCell<BarrierState>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<(u64, usize, BarrierState)>();
    let mut feeds: JoinSet<()> = JoinSet::new();
    let mut states: Vec<Option<BarrierState>> = Vec::new();
    let mut generation = 0u64;
    let mut list_done = false;

    loop {
        tokio::select! {
            _ = cell.closed() => break,
            next = barriers.next(), if !list_done => match next {
                Some(list) => {
                    // Dropping the previous set aborts its feeds
                    feeds = JoinSet::new();
                    generation += 1;

                    let relevant: Vec<_> = list
                        .into_iter()
                        .filter(|scoped| scoped.applies_to(&consumer))
                        .collect();
                    states = vec![None; relevant.len()];

                    for (index, scoped) in relevant.into_iter().enumerate() {
                        let mut stream = scoped.barrier.on_state(&consumer);
                        let tx = tx.clone();
                        let current = generation;
                        feeds.spawn(async move {
                            while let Some(state) = stream.next().await {
                                if tx.send((current, index, state)).is_err() {
                                    break;
                                }
                            }
                        });
                    }

                    cell.set(all_open(&states));
                }
                None => list_done = true,
            },
            Some((from, index, state)) = rx.recv() => {
                if from == generation {
                    states[index] = Some(state);
                    cell.set(all_open(&states));
                }
            }
        }
    }
}

fn all_open(states: &[Option<BarrierState>]) -> BarrierState {
    BarrierState::from_open(
        states
            .iter()
            .all(|state| matches!(state, Some(BarrierState::Open))),
    )
}
