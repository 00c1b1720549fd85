//! Watch command - initial build, file watcher and dev server with live reload

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use assetpipe_pipeline::{Pipeline, TaskName, WatchRules};
use color_eyre::eyre::{Result, WrapErr};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind};
use tokio::{net::TcpListener, sync::mpsc};

use super::{load_pipeline, print_build_report};
use crate::server::{LIVERELOAD_SCRIPT, ServerState, create_router};

/// Run the watch command.
///
/// The initial build, the watcher and the server run concurrently until the
/// process is terminated.
pub async fn run(config_path: &Path, port: Option<u16>, open_browser: bool) -> Result<()> {
    let pipeline = load_pipeline(config_path)?;
    let server = pipeline.config().server.clone();
    let port = port.unwrap_or(server.port);
    let open_browser = open_browser || server.open;
    tracing::info!(?config_path, port, "Starting watch mode");

    let rules =
        WatchRules::from_registry(&pipeline.config().registry).wrap_err("Invalid watch glob")?;
    if rules.is_empty() {
        tracing::warn!("No category has a watch glob, changes will not trigger rebuilds");
    } else {
        tracing::debug!(rules = rules.len(), "Loaded watch rules");
    }

    let state = Arc::new(ServerState::new());
    let pipeline = Arc::new(
        pipeline
            .with_reload(state.clone())
            .with_livereload(LIVERELOAD_SCRIPT),
    );
    let source_root = pipeline.source_root();
    let build_root = pipeline.build_root();

    // Initial build
    let initial = pipeline.clone();
    tokio::task::spawn_blocking(move || {
        tracing::info!("Running initial build...");
        print_build_report(&initial.build());
    });

    // Setup file watcher
    let (tx, rx) = mpsc::channel::<TaskName>(64);
    let watcher = spawn_watcher(&source_root, rules, tx)?;

    // Re-run tasks one at a time, in arrival order
    tokio::spawn(rerun_loop(pipeline.clone(), rx));

    // Start server
    let app = create_router(&build_root, state);
    let addr = format!("{}:{port}", server.host);

    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    println!();
    println!("  Dev server running at http://{addr}");
    println!("  Watching {}", source_root.display());
    println!("  Press Ctrl+C to stop");
    println!();

    if open_browser {
        if let Err(e) = open::that(format!("http://{addr}")) {
            tracing::warn!(error = %e, "Failed to open browser");
        }
    }

    // Keep watcher alive
    let _watcher = watcher;

    axum::serve(listener, app).await.wrap_err("Server error")?;

    Ok(())
}

fn spawn_watcher(
    source_root: &Path,
    rules: WatchRules,
    tx: mpsc::Sender<TaskName>,
) -> Result<RecommendedWatcher> {
    let root: PathBuf = source_root.to_path_buf();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "Watch error");
                    return;
                }
            };

            // Only trigger on write/create/remove events
            if !matches!(
                event.kind,
                EventKind::Modify(ModifyKind::Data(_)) | EventKind::Create(_) | EventKind::Remove(_)
            ) {
                return;
            }

            for path in &event.paths {
                let Ok(relative) = path.strip_prefix(&root) else {
                    continue;
                };
                for task in rules.tasks_for(relative) {
                    tracing::debug!(path = %relative.display(), %task, "change detected");
                    let _ = tx.blocking_send(task);
                }
            }
        },
        notify::Config::default(),
    )
    .wrap_err("Failed to create file watcher")?;

    if source_root.exists() {
        watcher
            .watch(source_root, RecursiveMode::Recursive)
            .wrap_err("Failed to watch source directory")?;
        tracing::debug!(dir = %source_root.display(), "Watching source directory");
    } else {
        tracing::warn!(dir = %source_root.display(), "Source directory does not exist, not watching");
    }

    Ok(watcher)
}

async fn rerun_loop(pipeline: Arc<Pipeline>, mut rx: mpsc::Receiver<TaskName>) {
    while let Some(task) = rx.recv().await {
        let runner = pipeline.clone();
        match tokio::task::spawn_blocking(move || runner.run_task(task)).await {
            Ok(Ok(report)) => {
                println!(
                    "  ✓ {task}: {} written, {} failed in {}ms",
                    report.written, report.failed, report.duration_ms
                );
            }
            Ok(Err(e)) => {
                tracing::error!(%task, error = %e, "Task aborted");
                eprintln!("  ✗ {task}: {e}");
            }
            Err(e) => tracing::error!(%task, error = %e, "Task panicked"),
        }
    }
}
