//! Development server with live reload support

use std::{path::Path, sync::Arc, time::Duration};

use assetpipe_pipeline::{ReloadKind, ReloadSink};
use axum::{
    Router,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tower_http::{cors::CorsLayer, services::ServeDir};

/// Server state containing the reload broadcaster.
#[derive(Clone)]
pub struct ServerState {
    /// Broadcast channel for live reload events.
    pub reload_tx: broadcast::Sender<ReloadKind>,
}

impl ServerState {
    /// Create a new server state.
    pub fn new() -> Self {
        let (reload_tx, _) = broadcast::channel(16);
        Self { reload_tx }
    }

    /// Subscribe to reload events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadKind> {
        self.reload_tx.subscribe()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadSink for ServerState {
    fn notify(&self, kind: ReloadKind) {
        tracing::debug!(%kind, clients = self.reload_tx.receiver_count(), "live reload");
        // no connected clients is not an error
        let _ = self.reload_tx.send(kind);
    }
}

/// Create the development server router.
pub fn create_router(build_dir: &Path, state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/__livereload", get(livereload_handler))
        .fallback_service(ServeDir::new(build_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Server-Sent Events handler for live reload.
async fn livereload_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        // lagged receivers skip the missed events
        msg.ok().map(|kind| Ok(Event::default().data(kind.as_str())))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Live reload client injected into markup in watch mode.
pub const LIVERELOAD_SCRIPT: &str = r#"<script>
(function() {
    const source = new EventSource('/__livereload');
    source.onmessage = function(event) {
        if (event.data === 'reload') {
            window.location.reload();
        } else if (event.data === 'css-reload') {
            document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {
                const href = link.href.split('?')[0];
                link.href = href + '?v=' + Date.now();
            });
        }
    };
    source.onerror = function() {
        console.log('[livereload] Connection lost, retrying...');
    };
})();
</script>
"#;

#[cfg(test)]
mod tests {
    use assetpipe_pipeline::LIVERELOAD_MARKER;

    use super::*;

    #[test]
    fn test_script_carries_marker() {
        assert!(LIVERELOAD_SCRIPT.contains(LIVERELOAD_MARKER));
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let state = ServerState::new();
        let mut rx = state.subscribe();

        state.notify(ReloadKind::CssReload);
        state.notify(ReloadKind::Reload);

        assert_eq!(rx.recv().await.unwrap(), ReloadKind::CssReload);
        assert_eq!(rx.recv().await.unwrap(), ReloadKind::Reload);
    }

    #[test]
    fn test_notify_without_clients() {
        ServerState::new().notify(ReloadKind::Reload);
    }
}
