//! Terminates a node once the process receives CTRL-C or SIGHUP.
use std::sync::Arc;

use tokio::signal::unix::SignalKind;

use crate::node::Node;

/// Installs a signal handler for the given node.
///
/// Note that this is called by the [Builder](crate::builder::Builder) unless disabled.
pub fn install(node: Arc<Node>) {
    crate::spawn!(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sig_hup = match tokio::signal::unix::signal(SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(error) => {
                log::error!("Cannot install SIGHUP handler: {}", error);
                if ctrl_c.await.is_ok() {
                    log::info!("Received CTRL-C. Shutting down...");
                    node.terminate();
                }
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {
                log::info!("Received CTRL-C. Shutting down...");
                node.terminate();
            },
            _ = sig_hup.recv() => {
                log::info!("Received SIGHUP. Shutting down...");
                node.terminate();
            }
        }
    });
}
