// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plugin side of the pipe.
//!
//! A gatherer plugin is a standalone binary whose `main` hands its
//! [`Gatherer`] to [`serve`]:
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() {
//!     if let Err(e) = trento_plugin::serve(MyGatherer).await {
//!         eprintln!("plugin failed: {}", e);
//!         std::process::exit(1);
//!     }
//! }
//! ```
//!
//! Every request runs on its own task with its own cancellable context, so a
//! `Cancel` frame only stops the call it names.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use trento_core::{Context, FactGatheringError, Gatherer};
use trento_protocol::plugin_proto::{
    CancelRequest, GATHERER_CAPABILITY, GatherRequest, GatherResponse, Handshake, HandshakeAck,
    MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, PROTOCOL_VERSION,
};
use trento_protocol::{Frame, FrameError, MessageType, read_frame, write_frame};

use crate::convert;
use crate::error::{PluginError, Result};

const NOT_A_PLUGIN_MESSAGE: &str = "This binary is a trento gatherer plugin. \
It is not meant to be executed directly: copy it into the agent plugins directory \
and the agent will load it on startup.";

/// Whether the process was started by the agent.
pub fn has_magic_cookie() -> bool {
    std::env::var(MAGIC_COOKIE_KEY).is_ok_and(|value| value == MAGIC_COOKIE_VALUE)
}

/// Serve `gatherer` over stdin/stdout until the agent shuts the plugin down.
///
/// Started without the magic cookie, the process prints an explanation and
/// exits with status 1.
pub async fn serve<G>(gatherer: G) -> Result<()>
where
    G: Gatherer + 'static,
{
    if !has_magic_cookie() {
        eprintln!("{}", NOT_A_PLUGIN_MESSAGE);
        std::process::exit(1);
    }
    serve_connection(Arc::new(gatherer), tokio::io::stdin(), tokio::io::stdout()).await
}

/// Run the plugin protocol over an arbitrary pipe.
pub async fn serve_connection<G, R, W>(gatherer: Arc<G>, mut reader: R, writer: W) -> Result<()>
where
    G: Gatherer + ?Sized + 'static,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));

    let hello: Handshake = read_frame(&mut reader)
        .await?
        .decode_as(MessageType::Handshake)?;
    if hello.protocol_version != PROTOCOL_VERSION {
        return Err(PluginError::ProtocolVersion(hello.protocol_version));
    }
    if hello.magic_cookie_key != MAGIC_COOKIE_KEY || hello.magic_cookie_value != MAGIC_COOKIE_VALUE
    {
        return Err(PluginError::MagicCookie);
    }
    let ack = HandshakeAck {
        protocol_version: PROTOCOL_VERSION,
        capabilities: vec![GATHERER_CAPABILITY.to_string()],
    };
    send(&writer, &Frame::new(MessageType::HandshakeAck, &ack)?).await?;

    let root = Context::background();
    let inflight: Arc<Mutex<HashMap<u64, Context>>> = Arc::default();
    let mut tasks = JoinSet::new();

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => break,
            Err(e) => return Err(e.into()),
        };

        match frame.message_type {
            MessageType::Request => {
                let request: GatherRequest = frame.decode()?;
                let ctx = root.with_cancel();
                inflight.lock().await.insert(request.id, ctx.clone());

                let gatherer = gatherer.clone();
                let writer = writer.clone();
                let inflight = inflight.clone();
                tasks.spawn(async move {
                    let id = request.id;
                    let response = handle_request(gatherer.as_ref(), &ctx, request).await;
                    inflight.lock().await.remove(&id);
                    match Frame::new(MessageType::Response, &response) {
                        Ok(frame) => {
                            if let Err(e) = send(&writer, &frame).await {
                                warn!(id, error = %e, "failed to write response");
                            }
                        }
                        Err(e) => warn!(id, error = %e, "failed to encode response"),
                    }
                });
            }
            MessageType::Cancel => {
                let cancel: CancelRequest = frame.decode()?;
                if let Some(ctx) = inflight.lock().await.remove(&cancel.id) {
                    debug!(id = cancel.id, "cancelling request");
                    ctx.cancel();
                }
            }
            MessageType::Shutdown => {
                debug!("shutdown requested");
                break;
            }
            other => warn!(message_type = ?other, "ignoring unexpected frame"),
        }
    }

    root.cancel();
    while tasks.join_next().await.is_some() {}
    Ok(())
}

async fn handle_request<G>(gatherer: &G, ctx: &Context, request: GatherRequest) -> GatherResponse
where
    G: Gatherer + ?Sized,
{
    let id = request.id;
    if request.capability != GATHERER_CAPABILITY {
        let error = FactGatheringError::plugin_rpc()
            .wrap(format!("unknown capability '{}'", request.capability));
        return GatherResponse {
            id,
            facts: Vec::new(),
            error: Some(convert::error_to_proto(&error)),
        };
    }

    let requests: Vec<_> = request
        .requests
        .into_iter()
        .map(convert::request_from_proto)
        .collect();

    match gatherer.gather(ctx, &requests).await {
        Ok(facts) => GatherResponse {
            id,
            facts: facts.iter().map(convert::fact_to_proto).collect(),
            error: None,
        },
        Err(e) => GatherResponse {
            id,
            facts: Vec::new(),
            error: Some(convert::error_to_proto(&e)),
        },
    }
}

async fn send<W>(writer: &Mutex<W>, frame: &Frame) -> std::result::Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = writer.lock().await;
    write_frame(&mut *writer, frame).await
}
