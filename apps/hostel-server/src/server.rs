//! TCP accept loop.

use std::future::Future;

use tokio::net::TcpListener;

use crate::chat::Service;

/// Accept connections on `listener` until `shutdown` resolves, serving each
/// on its own task. Accept errors are logged and do not stop the loop.
pub async fn serve<F>(listener: TcpListener, service: Service, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(%err, "accept error");
                        continue;
                    }
                };
                if let Err(err) = stream.set_nodelay(true) {
                    tracing::debug!(%peer, %err, "failed to set TCP_NODELAY");
                }
                tracing::debug!(%peer, "new connection");

                let service = service.clone();
                tokio::spawn(async move {
                    service.handle_client(stream).await;
                    tracing::debug!(%peer, "connection closed");
                });
            }
        }
    }
}
