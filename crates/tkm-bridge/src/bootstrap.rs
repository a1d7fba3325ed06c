//! Startup state machine and the resulting runtime.
//!
//! Bootstrap walks a fixed sequence of states:
//!
//! ```text
//! Disconnected → Connected → Reset → LimitsKnown → Ready
//! ```
//!
//! 1. `Disconnected → Connected`: connect the control channel. Failure
//!    aborts startup; nothing was opened, nothing to tear down.
//! 2. `Connected → Reset`: stand up the event listener, then instruct the
//!    key manager to drop stale state from a previous run. Failure tears
//!    down the listener and the control channel, in that order.
//! 3. `Reset → LimitsKnown`: query the per-category capacities. Failure
//!    tears down the listener and the control channel, in that order.
//! 4. `LimitsKnown → Ready`: build the [`TkmContext`] and gate the control
//!    client by the advertised request ceiling. Pure local allocation;
//!    cannot fail.
//!
//! Teardown of a partially started bootstrap is always the mirror image of
//! the states reached: each stage's resource is owned by exactly one value,
//! and every failure arm funnels through the same unwind path, so a failed
//! startup can never leave a dangling listener or an open control channel.
//! The daemon either reaches `Ready` or observes a single
//! [`BootstrapError`] with everything closed behind it.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tkm_core::TkmContext;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::protocol::client::{ControlClient, SharedControlClient};
use crate::protocol::error::ProtocolError;
use crate::protocol::listener::{EventHandler, EventListener, EventListenerHandle};

/// Fatal initialization failures.
///
/// Any of these aborts startup entirely; the daemon never runs
/// half-initialized. The surrounding daemon may retry the whole bootstrap
/// sequence, but no variant is retried from inside.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The key manager's control socket could not be connected.
    #[error("failed to connect key manager control socket {path}")]
    ConnectionFailed {
        /// Configured control socket path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: ProtocolError,
    },

    /// The event socket could not be bound.
    #[error("failed to bind event socket {path}")]
    ListenerFailed {
        /// Configured event socket path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: ProtocolError,
    },

    /// The key manager rejected or failed the reset command.
    #[error("key manager reset failed")]
    ResetFailed(#[source] ProtocolError),

    /// The key manager rejected or failed the limits query.
    #[error("key manager limits query failed")]
    LimitsQueryFailed(#[source] ProtocolError),
}

/// Everything a bootstrapped daemon holds onto.
///
/// Dropping or [`shutdown`](Runtime::shutdown)ing the runtime is the only
/// way the context, listener, and control channel go away, and shutdown
/// runs in the reverse of bootstrap's resource order: context first (so
/// leaked handles are reported while the channels still exist), then the
/// event listener (so a late push never references freed handles), then
/// the control channel.
#[derive(Debug)]
pub struct Runtime {
    context: Arc<TkmContext>,
    listener: EventListenerHandle,
    control: SharedControlClient,
}

impl Runtime {
    /// The shared resource context for negotiation workflows.
    #[must_use]
    pub fn context(&self) -> &Arc<TkmContext> {
        &self.context
    }

    /// The gated control-channel client.
    #[must_use]
    pub const fn control(&self) -> &SharedControlClient {
        &self.control
    }

    /// Tear everything down in reverse bootstrap order.
    ///
    /// Quiescence is the caller's job: no new negotiations may be admitted
    /// once shutdown starts. Handles still allocated are logged as leaks by
    /// the context, never allowed to block shutdown.
    pub async fn shutdown(self) {
        let Self {
            context,
            listener,
            control,
        } = self;

        match Arc::into_inner(context) {
            Some(context) => drop(context),
            None => warn!(
                "resource context still referenced at shutdown; handle leak accounting deferred"
            ),
        }
        listener.shutdown().await;
        if let Err(e) = control.close().await {
            warn!("control channel close failed during shutdown: {e}");
        }
        info!("key manager bridge shut down");
    }
}

/// Run the bootstrap sequence against the configured sockets.
///
/// `handler` receives key manager pushes for the lifetime of the returned
/// [`Runtime`].
///
/// # Errors
///
/// Returns a [`BootstrapError`] naming the failed transition; whatever was
/// already opened has been torn down in reverse order.
pub async fn bootstrap(
    config: &BridgeConfig,
    handler: Arc<dyn EventHandler>,
) -> Result<Runtime, BootstrapError> {
    // Disconnected → Connected
    let mut client = ControlClient::connect(&config.control_socket)
        .await
        .map_err(|source| BootstrapError::ConnectionFailed {
            path: config.control_socket.clone(),
            source,
        })?;
    info!(socket = %config.control_socket.display(), "connected to key manager");

    let listener = match EventListener::bind(&config.event_socket) {
        Ok(listener) => listener,
        Err(source) => {
            unwind_client(client).await;
            return Err(BootstrapError::ListenerFailed {
                path: config.event_socket.clone(),
                source,
            });
        }
    };
    info!(socket = %config.event_socket.display(), "serving key manager events");
    let listener = listener.serve(handler);

    // Connected → Reset
    if let Err(source) = client.reset().await {
        unwind(listener, client).await;
        return Err(BootstrapError::ResetFailed(source));
    }
    debug!("key manager state reset");

    // Reset → LimitsKnown
    let limits = match client.limits().await {
        Ok(limits) => limits,
        Err(source) => {
            unwind(listener, client).await;
            return Err(BootstrapError::LimitsQueryFailed(source));
        }
    };
    info!(
        max_requests = limits.max_requests,
        nonce = limits.nonce,
        dh = limits.dh,
        cipher = limits.cipher,
        auth = limits.auth,
        ike_sa = limits.ike_sa,
        esp_sa = limits.esp_sa,
        "key manager limits received"
    );

    // LimitsKnown → Ready: pure local allocation, cannot fail.
    Ok(Runtime {
        context: Arc::new(TkmContext::new(limits)),
        control: SharedControlClient::new(client, &limits),
        listener,
    })
}

/// Reverse-order teardown for failures after the listener came up.
async fn unwind(listener: EventListenerHandle, client: ControlClient) {
    listener.shutdown().await;
    unwind_client(client).await;
}

async fn unwind_client(client: ControlClient) {
    if let Err(e) = client.close().await {
        warn!("control channel close failed during bootstrap unwind: {e}");
    }
}
