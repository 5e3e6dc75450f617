use console::Term;
use orgpulse::CacheStore;
use orgpulse::sync::WatermarkStore;

/// Set up the Ctrl+C handler.
///
/// The first Ctrl+C flushes the cache snapshot and watermarks, then exits
/// with status 130. A second Ctrl+C while flushing exits immediately.
pub(crate) fn setup_shutdown_handler(cache: CacheStore, watermarks: WatermarkStore) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }

        let is_tty = Term::stderr().is_term();
        if is_tty {
            eprintln!("\n\nInterrupted, saving cache...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Interrupted, saving cache");
        }

        tokio::select! {
            () = flush_all(&cache, &watermarks) => {}
            _ = tokio::signal::ctrl_c() => {
                if is_tty {
                    eprintln!("Force quit!");
                }
            }
        }
        std::process::exit(130);
    });
}

/// Flush the cache and the watermarks, logging failures.
pub(crate) async fn flush_all(cache: &CacheStore, watermarks: &WatermarkStore) {
    match cache.flush().await {
        Ok(true) => tracing::debug!("Cache saved"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to save cache"),
    }
    if let Err(e) = watermarks.flush().await {
        tracing::warn!(error = %e, "Failed to save watermarks");
    }
}
