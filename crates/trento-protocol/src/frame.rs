// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for the plugin pipes.
//!
//! Both directions of a plugin's stdio carry a sequence of frames:
//! - 4 bytes: payload length (big-endian)
//! - 2 bytes: message type
//! - N bytes: protobuf payload

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame header size (4 bytes length + 2 bytes type)
pub const HEADER_SIZE: usize = 6;

/// Message types for the plugin protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    /// Agent hello carrying protocol version and magic cookie
    Handshake = 1,
    /// Plugin answer to the hello
    HandshakeAck = 2,
    /// Gather call
    Request = 3,
    /// Gather result
    Response = 4,
    /// Abort an in-flight call
    Cancel = 5,
    /// Ask the plugin to exit
    Shutdown = 6,
}

impl TryFrom<u16> for MessageType {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, <Self as TryFrom<u16>>::Error> {
        match value {
            1 => Ok(MessageType::Handshake),
            2 => Ok(MessageType::HandshakeAck),
            3 => Ok(MessageType::Request),
            4 => Ok(MessageType::Response),
            5 => Ok(MessageType::Cancel),
            6 => Ok(MessageType::Shutdown),
            _ => Err(FrameError::InvalidMessageType(value)),
        }
    }
}

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("invalid message type: {0}")]
    InvalidMessageType(u16),

    #[error("unexpected message type: expected {expected:?}, got {actual:?}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,
}

/// A framed message with type and payload
#[derive(Debug, Clone)]
pub struct Frame {
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given type and message
    pub fn new<M: Message>(message_type: MessageType, msg: &M) -> Result<Self, FrameError> {
        let payload = msg.encode_to_vec();
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge(payload.len()));
        }
        Ok(Self {
            message_type,
            payload: Bytes::from(payload),
        })
    }

    /// Decode the payload as a protobuf message
    pub fn decode<M: Message + Default>(&self) -> Result<M, FrameError> {
        Ok(M::decode(self.payload.clone())?)
    }

    /// Decode the payload, requiring a specific message type first.
    pub fn decode_as<M: Message + Default>(&self, expected: MessageType) -> Result<M, FrameError> {
        if self.message_type != expected {
            return Err(FrameError::UnexpectedMessageType {
                expected,
                actual: self.message_type,
            });
        }
        self.decode()
    }

    /// Encode the frame to bytes for wire transmission
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_u16(self.message_type as u16);
        buf.put(self.payload.clone());
        buf.freeze()
    }
}

/// Write a frame to an async writer and flush it.
///
/// Pipes to child processes are buffered, so a frame that is not flushed
/// may never reach the other side.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    let encoded = frame.encode();
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a frame from an async reader
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let message_type = MessageType::try_from(u16::from_be_bytes([header[4], header[5]]))?;

    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Frame {
        message_type,
        payload: Bytes::from(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_proto::{CancelRequest, GatherRequest, Handshake};

    #[test]
    fn test_message_type_round_trip() {
        for &mt in &[
            MessageType::Handshake,
            MessageType::HandshakeAck,
            MessageType::Request,
            MessageType::Response,
            MessageType::Cancel,
            MessageType::Shutdown,
        ] {
            let decoded = MessageType::try_from(mt as u16).unwrap();
            assert_eq!(mt, decoded);
        }
    }

    #[test]
    fn test_message_type_invalid_conversion() {
        assert!(MessageType::try_from(0u16).is_err());
        assert!(MessageType::try_from(7u16).is_err());
        assert!(MessageType::try_from(u16::MAX).is_err());
    }

    #[test]
    fn test_frame_encode_structure() {
        let msg = CancelRequest { id: 42 };
        let frame = Frame::new(MessageType::Cancel, &msg).unwrap();
        let encoded = frame.encode();

        let length = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        assert_eq!(length, frame.payload.len());

        let msg_type = u16::from_be_bytes([encoded[4], encoded[5]]);
        assert_eq!(msg_type, MessageType::Cancel as u16);
        assert_eq!(encoded.len(), HEADER_SIZE + frame.payload.len());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let mut bytes = BytesMut::new();
        bytes.put_u32((MAX_FRAME_SIZE + 1) as u32);
        bytes.put_u16(MessageType::Request as u16);
        writer.write_all(&bytes).await.unwrap();

        match read_frame(&mut reader).await.unwrap_err() {
            FrameError::FrameTooLarge(size) => assert_eq!(size, MAX_FRAME_SIZE + 1),
            other => panic!("Expected FrameTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_as_rejects_other_type() {
        let frame = Frame::new(MessageType::Cancel, &CancelRequest { id: 1 }).unwrap();
        let err = frame
            .decode_as::<GatherRequest>(MessageType::Request)
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnexpectedMessageType {
                expected: MessageType::Request,
                actual: MessageType::Cancel
            }
        ));
    }

    #[tokio::test]
    async fn test_read_write_frame() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let msg = Handshake {
            protocol_version: 1,
            magic_cookie_key: "TRENTO_PLUGIN".to_string(),
            magic_cookie_value: "gatherer".to_string(),
        };
        let frame = Frame::new(MessageType::Handshake, &msg).unwrap();

        write_frame(&mut writer, &frame).await.unwrap();
        let read = read_frame(&mut reader).await.unwrap();

        assert_eq!(read.message_type, MessageType::Handshake);
        let decoded: Handshake = read.decode().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_read_frame_connection_closed() {
        let (_, mut reader) = tokio::io::duplex(1024);
        match read_frame(&mut reader).await.unwrap_err() {
            FrameError::ConnectionClosed => {}
            e => panic!("Expected ConnectionClosed, got: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_truncated_payload_is_connection_closed() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let mut bytes = BytesMut::new();
        bytes.put_u32(50);
        bytes.put_u16(MessageType::Request as u16);
        bytes.put(&[1u8; 5][..]);
        writer.write_all(&bytes).await.unwrap();
        drop(writer);

        assert!(matches!(
            read_frame(&mut reader).await.unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }
}
