use crate::config::Config;
use crate::http_server::HttpServer;
use crate::static_model::StaticModelService;
use crate::tcp_server::TcpDeviceServer;

use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let model = Arc::new(StaticModelService::new(&config.model));
    tracing::info!(
        "Serving {} canned face(s), class {}",
        config.model.faces.len(),
        config.model.predicted_class
    );

    let tcp_server = TcpDeviceServer::bind(
        model.clone(),
        &config.tcp.get_address(),
        config.model.read_timeout(),
    )
    .await?;
    let http_server = HttpServer::new(model, &config.http.get_address()).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let tcp_handle = tokio::spawn(tcp_server.run(shutdown_tx.subscribe()));
    let http_handle = http_server.run(shutdown_tx.subscribe())?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    tcp_handle.await??;
    http_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
