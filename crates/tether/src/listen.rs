// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tether listen` command implementation.
//!
//! Connects the real-time transport, optionally announces presence and
//! watches resources, and logs everything that happens until a shutdown
//! signal arrives. The offline queue drains periodically in the background
//! for the whole session.

use tether_core::TetherError;
use tether_realtime::{PresenceChange, PresenceUser};
use tracing::{error, info, warn};

use crate::runtime::Runtime;
use crate::shutdown;

/// Arguments of `tether listen`.
#[derive(Debug, Clone, Default)]
pub struct ListenArgs {
    pub resources: Vec<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

pub async fn run_listen(runtime: Runtime, args: ListenArgs) -> Result<(), TetherError> {
    let cancel = shutdown::install_signal_handler();

    let subscriptions = vec![
        runtime.transport.on_connected(|_| info!("connected")),
        runtime.transport.on_disconnected(|event| {
            if event.manual {
                info!("connection closed");
            } else {
                warn!(code = event.code, reason = %event.reason, "connection lost");
            }
        }),
        runtime
            .transport
            .on_error(|failure| warn!(error = %failure, "transport error")),
        runtime.presence.on_change(|change| match change {
            PresenceChange::Updated(record) => info!(
                user_id = %record.user_id,
                name = %record.name,
                status = %record.status,
                page = record.current_page.as_deref().unwrap_or("-"),
                "presence"
            ),
            PresenceChange::Removed(user_id) => info!(user_id = %user_id, "presence removed"),
        }),
        runtime
            .queue
            .on_event(|event| info!(event = event.name(), id = %event.request().id, "queue")),
    ];
    let watches: Vec<_> = args
        .resources
        .iter()
        .map(|resource| {
            runtime.sync.subscribe(resource, |update| {
                info!(
                    resource = %update.resource,
                    action = %update.action,
                    data = %update.data,
                    "data update"
                );
            })
        })
        .collect();

    if let Some(user_id) = args.user_id {
        let name = args.user_name.unwrap_or_else(|| user_id.clone());
        runtime
            .presence
            .set_current_user(PresenceUser::new(user_id, name));
    }

    runtime.start();
    let connected = tokio::select! {
        result = runtime.transport.connect() => Some(result),
        _ = cancel.cancelled() => None,
    };
    let outcome = match connected {
        Some(Ok(())) => {
            info!(resources = args.resources.len(), "listening, press Ctrl+C to stop");
            cancel.cancelled().await;
            Ok(())
        }
        Some(Err(e)) => {
            error!(error = %e, "could not connect");
            Err(e)
        }
        None => Ok(()),
    };

    drop(watches);
    drop(subscriptions);
    runtime.shutdown().await;
    outcome
}
