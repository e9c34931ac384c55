//! 配置校验模块
//!
//! 校验规则：
//! - dispatcher name 唯一且非空
//! - dispatch_limit >= 1
//! - max_queue_size 为 -1 (无上限) 或 > 0
//! - expiration_secs > 0, max_in_flight > 0
//! - barrier id 唯一, scopes 只能引用 "all" 或已配置的 dispatcher
//! - 内置 barrier 的配置类型正确 (batch_size 为整数, wifi_only 为布尔)
//! - collect dispatcher 必须配置 addr
//! - probe 模式的间隔与超时 > 0

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{BarrierScope, ConnectivityMode, ContractError, DispatcherKind, SdkBlueprint};

/// 校验 SdkBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SdkBlueprint) -> Result<(), ContractError> {
    validate_store(blueprint)?;
    validate_coordinator(blueprint)?;
    validate_connectivity(blueprint)?;
    validate_barriers(blueprint)?;
    validate_dispatchers(blueprint)?;
    Ok(())
}

/// 校验存储配置
fn validate_store(blueprint: &SdkBlueprint) -> Result<(), ContractError> {
    let store = &blueprint.store;

    if store.max_queue_size == 0 || store.max_queue_size < -1 {
        return Err(ContractError::config_validation(
            "store.max_queue_size",
            format!(
                "max_queue_size must be -1 (unbounded) or > 0, got {}",
                store.max_queue_size
            ),
        ));
    }

    if store.expiration_secs == 0 {
        return Err(ContractError::config_validation(
            "store.expiration_secs",
            "expiration_secs must be > 0",
        ));
    }

    Ok(())
}

fn validate_coordinator(blueprint: &SdkBlueprint) -> Result<(), ContractError> {
    if blueprint.coordinator.max_in_flight == 0 {
        return Err(ContractError::config_validation(
            "coordinator.max_in_flight",
            "max_in_flight must be > 0",
        ));
    }
    Ok(())
}

/// 校验连接探测配置
fn validate_connectivity(blueprint: &SdkBlueprint) -> Result<(), ContractError> {
    let connectivity = &blueprint.connectivity;
    if connectivity.mode != ConnectivityMode::Probe {
        return Ok(());
    }

    if connectivity.probe_host.is_empty() {
        return Err(ContractError::config_validation(
            "connectivity.probe_host",
            "probe_host cannot be empty in probe mode",
        ));
    }
    if connectivity.interval_ms == 0 || connectivity.timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "connectivity.interval_ms / connectivity.timeout_ms",
            format!(
                "interval_ms ({}) and timeout_ms ({}) must be > 0",
                connectivity.interval_ms, connectivity.timeout_ms
            ),
        ));
    }
    Ok(())
}

/// 校验 barrier id 唯一性
fn validate_barriers(blueprint: &SdkBlueprint) -> Result<(), ContractError> {
    let dispatcher_names: HashSet<&str> = blueprint.dispatcher_names().into_iter().collect();
    let mut seen = HashSet::new();
    for (idx, barrier) in blueprint.barriers.iter().enumerate() {
        if barrier.id.is_empty() {
            return Err(ContractError::config_validation(
                format!("barriers[{}].id", idx),
                "barrier id cannot be empty",
            ));
        }
        if !seen.insert(&barrier.id) {
            return Err(ContractError::config_validation(
                format!("barriers[id={}]", barrier.id),
                "duplicate barrier id",
            ));
        }

        for scope in barrier.scopes.iter().flatten() {
            if let BarrierScope::Consumer(name) = scope {
                if !dispatcher_names.contains(name.as_str()) {
                    return Err(ContractError::config_validation(
                        format!("barriers[{}].scopes", barrier.id),
                        format!("scope '{name}' is neither 'all' nor a configured dispatcher"),
                    ));
                }
            }
        }

        validate_barrier_configuration(&barrier.id, &barrier.configuration)?;
    }
    Ok(())
}

/// 校验内置 barrier 的配置项类型
fn validate_barrier_configuration(
    id: &str,
    configuration: &contracts::BarrierConfiguration,
) -> Result<(), ContractError> {
    match id {
        "BatchingBarrier" => match configuration.get("batch_size") {
            None => Ok(()),
            Some(value) if value.is_i64() || value.is_null() => Ok(()),
            Some(value) => Err(ContractError::config_validation(
                format!("barriers[{id}].configuration.batch_size"),
                format!("batch_size must be an integer, got {value}"),
            )),
        },
        "ConnectivityBarrier" => match configuration.get("wifi_only") {
            None => Ok(()),
            Some(value) if value.is_boolean() => Ok(()),
            Some(value) => Err(ContractError::config_validation(
                format!("barriers[{id}].configuration.wifi_only"),
                format!("wifi_only must be a boolean, got {value}"),
            )),
        },
        _ => Ok(()),
    }
}

/// 校验 dispatcher 配置
fn validate_dispatchers(blueprint: &SdkBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, dispatcher) in blueprint.dispatchers.iter().enumerate() {
        if dispatcher.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("dispatchers[{}].name", idx),
                "dispatcher name cannot be empty",
            ));
        }
        if !seen.insert(&dispatcher.name) {
            return Err(ContractError::config_validation(
                format!("dispatchers[name={}]", dispatcher.name),
                "duplicate dispatcher name",
            ));
        }
        if dispatcher.dispatch_limit == 0 {
            return Err(ContractError::config_validation(
                format!("dispatchers[{}].dispatch_limit", dispatcher.name),
                "dispatch_limit must be >= 1",
            ));
        }

        if dispatcher.kind == DispatcherKind::Collect {
            let addr = dispatcher.params.get("addr").ok_or_else(|| {
                ContractError::config_validation(
                    format!("dispatchers[{}].params.addr", dispatcher.name),
                    "collect dispatcher requires 'addr'",
                )
            })?;
            addr.parse::<SocketAddr>().map_err(|e| {
                ContractError::config_validation(
                    format!("dispatchers[{}].params.addr", dispatcher.name),
                    format!("invalid address '{addr}': {e}"),
                )
            })?;
        }
    }
    Ok(())
}
