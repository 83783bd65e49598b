use std::future::Future;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Escalado de apagado.
///
/// La primera señal cancela `token` para que el loop de audio vacíe su
/// buffer. Si el apagado ya estaba en curso (p. ej. por el comando `kill`),
/// o cuando llega una segunda señal, la función retorna y el llamador debe
/// salir sin esperar.
pub async fn escalate<S, F>(token: CancellationToken, mut next_signal: S)
where
    S: FnMut() -> F,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            info!("⚠️ Apagado en curso, una señal más fuerza la salida");
        }
        _ = next_signal() => {
            info!("⚠️ Señal de apagado recibida, vaciando audio...");
            token.cancel();
        }
    }

    next_signal().await;
    warn!("⚠️ Segunda señal de apagado, saliendo sin esperar");
}

/// Ctrl+C o SIGTERM
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("No se pudo escuchar Ctrl+C: {}", e);
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
                warn!("No se pudo escuchar SIGTERM: {}", e);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};
    use tokio::{sync::Notify, time::timeout};

    type Signal = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    fn source(signals: &Arc<Notify>) -> impl FnMut() -> Signal + Send + 'static {
        let signals = signals.clone();
        move || {
            let signals = signals.clone();
            Box::pin(async move { signals.notified().await })
        }
    }

    #[tokio::test]
    async fn test_first_signal_cancels_second_forces() {
        let token = CancellationToken::new();
        let signals = Arc::new(Notify::new());
        let watcher = tokio::spawn(escalate(token.clone(), source(&signals)));

        signals.notify_one();
        timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert!(!watcher.is_finished());

        signals.notify_one();
        timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_signal_forces_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let signals = Arc::new(Notify::new());
        let watcher = tokio::spawn(escalate(token, source(&signals)));

        signals.notify_one();
        timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
    }
}
