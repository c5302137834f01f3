use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::cluster::ClusterState;
use crate::config::ServerConfig;
use crate::error::Error;
use crate::kernel::KernelRoutes;
use crate::reconciler::Reconciler;
use crate::speaker::{BgpSpeaker, PathStream};
use crate::syncer::{Injection, RouteSyncer};

/// Owns the speaker, kernel and cluster handles and runs the
/// reconcile loop, the best-path watcher and the kernel route syncer
pub struct Controller {
    config: Arc<ServerConfig>,
    speaker: Arc<dyn BgpSpeaker>,
    reconciler: Arc<Reconciler>,
    syncer: Arc<RouteSyncer>,
}

impl Controller {
    pub fn new(
        config: ServerConfig,
        speaker: Arc<dyn BgpSpeaker>,
        kernel: Arc<dyn KernelRoutes>,
        cluster: Arc<dyn ClusterState>,
    ) -> Self {
        let config = Arc::new(config);
        let syncer = Arc::new(RouteSyncer::new(
            Arc::clone(&kernel),
            &config.external_interface,
        ));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&speaker),
            kernel,
            cluster,
            Arc::clone(&config),
        ));
        Self {
            config,
            speaker,
            reconciler,
            syncer,
        }
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    pub fn syncer(&self) -> Arc<RouteSyncer> {
        Arc::clone(&self.syncer)
    }

    /// Start the BGP instance and configure every neighbor session
    pub async fn start_speaker(&self) -> Result<(), Error> {
        let global = self.config.global();
        let peers = self.config.peers()?;
        info!("Starting BGP {}", global);
        self.speaker.start_bgp(&global).await?;
        for peer in &peers {
            debug!("Adding {}", peer);
            self.speaker.add_peer(peer).await?;
        }
        Ok(())
    }

    /// Run until `shutdown` flips to true (or its sender is dropped)
    ///
    /// Fails only when the speaker can't be started.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        info!(
            "Starting speaker controller [router-id={}, AS{} -> AS{}, neighbors={}/{}]",
            self.config.router_id,
            self.config.cluster_as,
            self.config.neighbor_as,
            self.config.neighbors.len(),
            self.config.neighbors_v6.len(),
        );
        self.start_speaker().await?;

        let reconcile = tokio::spawn(
            self.reconciler()
                .run(self.config.announce_period(), shutdown.clone()),
        );
        let sync = tokio::spawn(
            self.syncer()
                .run(self.config.sync_period(), shutdown.clone()),
        );
        let watcher = tokio::spawn(watch_best_paths(
            Arc::clone(&self.speaker),
            self.syncer(),
            self.config.sync_period(),
            shutdown,
        ));

        let (reconcile, sync, watcher) = tokio::join!(reconcile, sync, watcher);
        let results = [("reconciler", reconcile), ("syncer", sync), ("watcher", watcher)];
        for (task, result) in &results {
            if let Err(err) = result {
                error!("Task {} ended abnormally: {}", task, err);
            }
        }
        info!("Speaker controller stopped");
        Ok(())
    }
}

fn is_shutdown(
    changed: Result<(), watch::error::RecvError>,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *shutdown.borrow()
}

/// Feed best-path updates to the route syncer, one at a time and in order
///
/// A failed subscription or a closed stream is retried every `retry`
/// until shutdown.
pub async fn watch_best_paths(
    speaker: Arc<dyn BgpSpeaker>,
    syncer: Arc<RouteSyncer>,
    retry: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match speaker.watch_best_paths().await {
            Ok(updates) => {
                if consume_best_paths(updates, &syncer, &mut shutdown).await {
                    info!("Shutting down best path watcher");
                    return;
                }
                warn!("Best path stream closed, resubscribing in {:?}", retry);
            }
            Err(err) => error!("Failed to watch best paths, retrying in {:?}: {}", retry, err),
        }
        tokio::select! {
            _ = sleep(retry) => (),
            changed = shutdown.changed() => {
                if is_shutdown(changed, &shutdown) {
                    info!("Shutting down best path watcher");
                    return;
                }
            }
        }
    }
}

/// Inject updates until the stream ends (false) or shutdown (true)
async fn consume_best_paths(
    mut updates: PathStream,
    syncer: &RouteSyncer,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            update = updates.next() => {
                let path = match update {
                    Some(path) => path,
                    None => return false,
                };
                debug!("Best path update: {}", path);
                match syncer.inject(&path).await {
                    Ok(Injection::Ignored) => (),
                    Ok(injection) => debug!("{}", injection),
                    Err(err) => error!("Failed to inject {}: {}", path, err),
                }
            }
            changed = shutdown.changed() => {
                if is_shutdown(changed, shutdown) {
                    return true;
                }
            }
        }
    }
}
