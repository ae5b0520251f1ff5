//! Wiring from a validated [`SpoolConfig`] to a running engine.

use std::sync::Arc;

use filespool_core::network::{normalize_listen_addr, with_default_port};
use filespool_core::{AllowList, DirSink, DirSource, Receiver, Sender, SpoolError};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SpoolConfig;

/// Run receiver mode until `stop` is cancelled, then drain sessions.
///
/// Configuration problems are reported before anything is bound.
pub async fn run_receiver(config: &SpoolConfig, stop: CancellationToken) -> Result<(), SpoolError> {
    config.validate_receiver()?;
    let acceptor = config.tls_settings().acceptor()?;
    let allow = AllowList::new(
        config
            .receiver
            .allow
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty()),
    );
    let sink = DirSink::create(&config.receiver.target).await?;

    let listen = normalize_listen_addr(&config.receiver.listen);
    info!("starting listener on {listen}");
    info!("spooling data to {}", sink.path().display());
    info!("allowed client names: {:?}", allow.names());

    let mut receiver = Receiver::new(listen, Arc::new(sink))
        .with_tls(acceptor, allow)
        .with_timings(config.to_receiver_timings())
        .with_max_record_size(config.limits.max_record_size);
    let addr = receiver.open().await?;
    info!("listening on {addr}");

    let shutdown = receiver.shutdown_handle();
    let forward = tokio::spawn(async move {
        stop.cancelled().await;
        shutdown.cancel();
    });

    let served = receiver.serve().await;
    forward.abort();
    served
}

/// Run sender mode until `stop` is cancelled, then disconnect.
pub async fn run_sender(config: &SpoolConfig, stop: CancellationToken) -> Result<(), SpoolError> {
    config.validate_sender()?;
    let connector = config.tls_settings().connector()?;
    let source = DirSource::open(&config.sender.source).await?;

    let connect = with_default_port(&config.sender.connect);
    info!("starting sender to {connect}");
    info!("reading data from {}", source.path().display());

    let mut sender = Sender::new(connect, Arc::new(source))
        .with_tls(connector)
        .with_timings(config.to_sender_timings())
        .with_max_record_size(config.limits.max_record_size);

    let shutdown = sender.stop_handle();
    let forward = tokio::spawn(async move {
        stop.cancelled().await;
        shutdown.cancel();
    });

    sender.run().await;
    forward.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receiver_rejects_incomplete_config_before_binding() {
        let config = SpoolConfig::default();
        let err = run_receiver(&config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpoolError::Config(_)));
    }

    #[tokio::test]
    async fn receiver_reports_missing_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SpoolConfig::default();
        config.receiver.target = dir.path().join("in").display().to_string();
        config.receiver.allow = vec!["alice".into()];
        config.tls.cert = dir.path().join("none.crt").display().to_string();
        config.tls.key = dir.path().join("none.key").display().to_string();
        config.tls.ca = dir.path().join("ca.crt").display().to_string();

        let err = run_receiver(&config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpoolError::Config(_)));
        // Nothing was created on the way to the failure.
        assert!(!dir.path().join("in").exists());
    }

    #[tokio::test]
    async fn sender_rejects_incomplete_config() {
        let mut config = SpoolConfig::default();
        config.sender.connect = "localhost".into();
        let err = run_sender(&config, CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            SpoolError::Config(msg) => assert!(msg.contains("--source")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
