//! Signal handling for sync runs.
//!
//! The first SIGINT or SIGTERM cancels the returned token: the pipeline stops
//! pulling new posts, lets in-flight ones finish, and still writes the
//! registry. A second signal exits immediately with status 130.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let received = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Could not listen for SIGTERM: {}", e);
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            {
                let terminate = async {
                    match sigterm.as_mut() {
                        Some(s) => {
                            s.recv().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if res.is_err() {
                            return;
                        }
                    }
                    _ = terminate => {}
                }
            }

            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }

            if received.fetch_add(1, Ordering::SeqCst) == 0 {
                tracing::info!("Interrupted: finishing in-flight posts, then saving the registry");
                tracing::info!("Interrupt again to exit without saving");
                handler_token.cancel();
            } else {
                tracing::warn!("Forced exit, progress since the last checkpoint is lost");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });

    token
}
