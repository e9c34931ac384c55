//! Dispatcher factory - builds dispatchers from configuration

use std::sync::Arc;

use contracts::{Dispatcher, DispatcherConfig, DispatcherKind};
use tracing::instrument;

use crate::dispatchers::{CollectDispatcher, FileDispatcher, LogDispatcher};
use crate::error::DispatcherError;
use crate::transport::UdpTransport;

/// Create a Dispatcher from configuration
#[instrument(
    name = "dispatcher_create",
    skip(config),
    fields(dispatcher = %config.name, kind = ?config.kind)
)]
pub async fn create_dispatcher(
    config: &DispatcherConfig,
) -> Result<Arc<dyn Dispatcher>, DispatcherError> {
    match config.kind {
        DispatcherKind::Log => Ok(Arc::new(LogDispatcher::new(
            &config.name,
            config.dispatch_limit,
        ))),
        DispatcherKind::File => {
            let dispatcher =
                FileDispatcher::from_params(&config.name, config.dispatch_limit, &config.params)
                    .map_err(|e| DispatcherError::creation(&config.name, e.to_string()))?;
            Ok(Arc::new(dispatcher))
        }
        DispatcherKind::Collect => {
            let transport = UdpTransport::from_params(&config.params)
                .await
                .map_err(|e| DispatcherError::creation(&config.name, e.to_string()))?;
            Ok(Arc::new(CollectDispatcher::new(
                &config.name,
                config.dispatch_limit,
                transport,
            )))
        }
    }
}

/// Create every configured Dispatcher, failing on the first error
#[instrument(name = "dispatcher_create_all", skip(configs), fields(count = configs.len()))]
pub async fn create_dispatchers(
    configs: &[DispatcherConfig],
) -> Result<Vec<Arc<dyn Dispatcher>>, DispatcherError> {
    let mut dispatchers = Vec::with_capacity(configs.len());
    for config in configs {
        dispatchers.push(create_dispatcher(config).await?);
    }
    Ok(dispatchers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(name: &str, kind: DispatcherKind, params: &[(&str, &str)]) -> DispatcherConfig {
        DispatcherConfig {
            name: name.to_string(),
            kind,
            dispatch_limit: 5,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn test_create_dispatchers_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let base_path = dir.path().to_string_lossy().to_string();
        let configs = vec![
            config("logger", DispatcherKind::Log, &[]),
            config("archive", DispatcherKind::File, &[("base_path", &base_path)]),
            config("collect", DispatcherKind::Collect, &[("addr", "127.0.0.1:19997")]),
        ];

        let dispatchers = create_dispatchers(&configs).await.unwrap();
        let ids: Vec<_> = dispatchers.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["logger", "archive", "collect"]);
        assert!(dispatchers.iter().all(|d| d.dispatch_limit() == 5));
    }

    #[tokio::test]
    async fn test_collect_without_addr_fails() {
        let err = create_dispatcher(&config("collect", DispatcherKind::Collect, &[]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DispatcherError::Creation { name, .. } if name == "collect"));
    }
}
