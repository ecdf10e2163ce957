// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent side of the plugin pipe.
//!
//! After the handshake, a [`PluginClient`] owns both ends of a plugin's
//! stdio. Requests are written under a mutex; a background reader task
//! routes every response to its caller by request id, so concurrent gathers
//! on one plugin are multiplexed over the same pipe.
//!
//! When the pipe closes (the plugin exited or crashed), every pending call
//! fails with [`PluginError::Closed`], and so does every later call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use trento_core::{Context, ContextError, Fact, FactRequest};
use trento_protocol::plugin_proto::{
    CancelRequest, GATHERER_CAPABILITY, GatherRequest, GatherResponse, Handshake, HandshakeAck,
    MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, PROTOCOL_VERSION, Shutdown,
};
use trento_protocol::{Frame, FrameError, MessageType, read_frame, write_frame};

use crate::convert;
use crate::error::{PluginError, Result};

type Writer = Box<dyn AsyncWrite + Unpin + Send>;

/// Send the hello and validate the plugin's answer.
pub async fn handshake<R, W>(reader: &mut R, writer: &mut W) -> Result<HandshakeAck>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = Handshake {
        protocol_version: PROTOCOL_VERSION,
        magic_cookie_key: MAGIC_COOKIE_KEY.to_string(),
        magic_cookie_value: MAGIC_COOKIE_VALUE.to_string(),
    };
    write_frame(writer, &Frame::new(MessageType::Handshake, &hello)?).await?;

    let ack: HandshakeAck = read_frame(reader)
        .await?
        .decode_as(MessageType::HandshakeAck)?;

    if ack.protocol_version != PROTOCOL_VERSION {
        return Err(PluginError::ProtocolVersion(ack.protocol_version));
    }
    if !ack.capabilities.iter().any(|c| c == GATHERER_CAPABILITY) {
        return Err(PluginError::MissingCapability(
            GATHERER_CAPABILITY.to_string(),
        ));
    }
    Ok(ack)
}

#[derive(Default)]
struct Pending {
    closed: bool,
    calls: HashMap<u64, oneshot::Sender<GatherResponse>>,
}

pub struct PluginClient {
    name: String,
    writer: Mutex<Writer>,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl PluginClient {
    /// Take over an already handshaken pipe and start routing responses.
    pub fn start<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let pending = Arc::new(Mutex::new(Pending::default()));
        let reader = tokio::spawn(read_responses(name.clone(), reader, pending.clone()));

        Self {
            name,
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed
    }

    /// Run one `Gather` call on the plugin.
    ///
    /// If `ctx` is done first, the plugin is told to cancel the call and the
    /// context error is returned without waiting for it.
    pub async fn gather(&self, ctx: &Context, requests: &[FactRequest]) -> Result<Vec<Fact>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(PluginError::Closed);
            }
            pending.calls.insert(id, tx);
        }

        let request = GatherRequest {
            id,
            capability: GATHERER_CAPABILITY.to_string(),
            requests: requests.iter().map(convert::request_to_proto).collect(),
        };
        if let Err(e) = self.send(MessageType::Request, &request).await {
            self.pending.lock().await.calls.remove(&id);
            return Err(e);
        }
        debug!(plugin = %self.name, id, requests = requests.len(), "gather request sent");

        tokio::select! {
            _ = ctx.done() => {
                self.pending.lock().await.calls.remove(&id);
                if let Err(e) = self.send(MessageType::Cancel, &CancelRequest { id }).await {
                    debug!(plugin = %self.name, id, error = %e, "failed to send cancel");
                }
                Err(ctx.err().unwrap_or(ContextError::Cancelled).into())
            }
            response = rx => {
                let response = response.map_err(|_| PluginError::Closed)?;
                match response.error {
                    Some(error) => Err(PluginError::Gatherer(convert::error_from_proto(error))),
                    None => Ok(response.facts.into_iter().map(convert::fact_from_proto).collect()),
                }
            }
        }
    }

    /// Ask the plugin to exit. Errors mean the pipe is already gone.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(MessageType::Shutdown, &Shutdown {}).await
    }

    async fn send<M: prost::Message>(&self, message_type: MessageType, msg: &M) -> Result<()> {
        let frame = Frame::new(message_type, msg)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame).await?;
        Ok(())
    }
}

impl Drop for PluginClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_responses<R>(name: String, mut reader: R, pending: Arc<Mutex<Pending>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                debug!(plugin = %name, "plugin pipe closed");
                break;
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "failed to read from plugin");
                break;
            }
        };

        let response: GatherResponse = match frame.decode_as(MessageType::Response) {
            Ok(response) => response,
            Err(e) => {
                warn!(plugin = %name, error = %e, "unexpected frame from plugin");
                continue;
            }
        };

        let caller = pending.lock().await.calls.remove(&response.id);
        match caller {
            Some(caller) => {
                let _ = caller.send(response);
            }
            None => debug!(plugin = %name, id = response.id, "response for unknown or cancelled call"),
        }
    }

    // Dropping the senders fails every waiting caller.
    let mut pending = pending.lock().await;
    pending.closed = true;
    pending.calls.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::serve_connection;
    use async_trait::async_trait;
    use std::time::Duration;
    use trento_core::{FactGatheringError, FactValue, Gatherer};

    /// Echoes arguments; `slow` sleeps until cancelled, `fail` fails the batch.
    struct Echo;

    #[async_trait]
    impl Gatherer for Echo {
        async fn gather(
            &self,
            ctx: &Context,
            requests: &[FactRequest],
        ) -> std::result::Result<Vec<Fact>, FactGatheringError> {
            if requests.iter().any(|r| r.argument == "fail") {
                return Err(FactGatheringError::new("echo-error", "failed on purpose"));
            }
            if requests.iter().any(|r| r.argument == "slow") {
                tokio::select! {
                    _ = ctx.done() => return Err(FactGatheringError::new("echo-cancelled", "cancelled")),
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                }
            }
            Ok(requests
                .iter()
                .map(|r| Fact::with_value(r, FactValue::parse_str(&r.argument)))
                .collect())
        }
    }

    async fn connected() -> PluginClient {
        let (agent, plugin) = tokio::io::duplex(64 * 1024);
        let (plugin_read, plugin_write) = tokio::io::split(plugin);
        tokio::spawn(serve_connection(Arc::new(Echo), plugin_read, plugin_write));

        let (mut read, mut write) = tokio::io::split(agent);
        let ack = handshake(&mut read, &mut write).await.unwrap();
        assert_eq!(ack.capabilities, vec![GATHERER_CAPABILITY.to_string()]);
        PluginClient::start("echo", read, write)
    }

    fn request(argument: &str) -> FactRequest {
        FactRequest::new(format!("fact-{}", argument), "check", "echo", argument)
    }

    #[tokio::test]
    async fn test_gather_round_trip() {
        let client = connected().await;
        let facts = client
            .gather(&Context::background(), &[request("42"), request("text")])
            .await
            .unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].value, Ok(FactValue::Int(42)));
        assert_eq!(facts[1].value, Ok(FactValue::from("text")));
    }

    #[tokio::test]
    async fn test_remote_batch_error() {
        let client = connected().await;
        let err = client
            .gather(&Context::background(), &[request("fail")])
            .await
            .unwrap_err();
        match err {
            PluginError::Gatherer(e) => assert_eq!(e.kind, "echo-error"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_multiplexed() {
        let client = Arc::new(connected().await);
        let ctx = Context::background();

        let slow_ctx = ctx.with_cancel();
        let slow = {
            let client = client.clone();
            let slow_ctx = slow_ctx.clone();
            tokio::spawn(async move { client.gather(&slow_ctx, &[request("slow")]).await })
        };

        // A fast call completes while the slow one is still in flight.
        let fast = client.gather(&ctx, &[request("true")]).await.unwrap();
        assert_eq!(fast[0].value, Ok(FactValue::Bool(true)));

        slow_ctx.cancel();
        let err = slow.await.unwrap().unwrap_err();
        assert!(matches!(err, PluginError::Context(ContextError::Cancelled)));

        // The pipe is still usable after a cancelled call.
        let again = client.gather(&ctx, &[request("7")]).await.unwrap();
        assert_eq!(again[0].value, Ok(FactValue::Int(7)));
    }

    #[tokio::test]
    async fn test_closed_pipe_fails_calls() {
        let (agent, plugin) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(agent);
        let client = PluginClient::start("gone", read, write);
        drop(plugin);

        let err = client
            .gather(&Context::background(), &[request("1")])
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Closed | PluginError::Frame(_)));

        // Once the reader noticed, later calls fail up front.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(client.is_closed().await);
        assert!(matches!(
            client.gather(&Context::background(), &[]).await,
            Err(PluginError::Closed)
        ));
    }
}
