//! # Rebar
//!
//! The host side of the Rebar fluid network: configuration loading, logging and
//! the lifecycle of a running network.
#![warn(clippy::all, clippy::pedantic, missing_docs, clippy::unwrap_used)]
#![allow(
    clippy::single_call_fn,
    clippy::multiple_inherent_impl,
    clippy::missing_errors_doc,
    clippy::needless_pass_by_value
)]

use std::{path::Path, sync::Arc};

use rebar_fluid::{ConfigError, FluidConfig, FluidManager, FluidWorld, TickDriver};
use thiserror::Error;
use tokio::{
    runtime::{Handle, TryCurrentError},
    select,
    sync::broadcast::error::RecvError,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

pub mod logger;

/// Errors that can occur while loading the plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The configuration could not be loaded.
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),
    /// Loading was attempted outside of a tokio runtime.
    #[error("no tokio runtime: {0}")]
    Runtime(#[from] TryCurrentError),
}

/// A running fluid network and the world it lives in.
pub struct RebarPlugin {
    /// Cancelled when the plugin stops.
    pub cancel_token: CancellationToken,
    manager: Arc<FluidManager>,
    world: Arc<FluidWorld>,
    handle: Handle,
    tasks: TaskTracker,
}

impl RebarPlugin {
    /// Creates the plugin with segment tickers running on `handle`.
    #[must_use]
    pub fn new(config: FluidConfig, handle: Handle) -> Self {
        let world = Arc::new(FluidWorld::new());
        let manager = FluidManager::new(
            config,
            world.clone(),
            TickDriver::Runtime(handle.clone()),
            Vec::new(),
        );

        Self {
            cancel_token: CancellationToken::new(),
            manager,
            world,
            handle,
            tasks: TaskTracker::new(),
        }
    }

    /// Loads (or creates) the config at `path` and creates the plugin on the
    /// current runtime.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let config = FluidConfig::load_or_create(path)?;
        let handle = Handle::try_current()?;
        Ok(Self::new(config, handle))
    }

    /// The fluid network.
    #[must_use]
    pub fn manager(&self) -> &Arc<FluidManager> {
        &self.manager
    }

    /// The blocks the network talks to.
    #[must_use]
    pub fn world(&self) -> &Arc<FluidWorld> {
        &self.world
    }

    /// Starts logging network changes. Segment tickers already run from the moment
    /// their segment exists.
    pub fn start(&self) {
        let config = self.manager.config();
        log::info!(
            "Started Rebar fluid network, ticking every {} host ticks",
            config.tick_interval
        );

        let mut events = self.manager.subscribe();
        let cancel_token = self.cancel_token.clone();
        self.tasks.spawn_on(
            async move {
                loop {
                    select! {
                        () = cancel_token.cancelled() => {
                            break;
                        }
                        event = events.recv() => match event {
                            Ok(event) => log::debug!("{event:?}"),
                            Err(RecvError::Lagged(skipped)) => {
                                log::warn!("Network event log fell behind, skipped {skipped} events");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            },
            &self.handle,
        );
    }

    /// Stops the plugin's own tasks.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Stops everything, including every segment ticker, and waits for it all to
    /// finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.tasks.close();
        self.tasks.wait().await;
        self.manager.shutdown().await;
        log::info!("Stopped Rebar fluid network");
    }
}
