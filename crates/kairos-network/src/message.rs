//! Wire message records and payload codecs.
//!
//! A frame on the wire is `base64(bincode(WireMessage)) ‖ 0xff`; see
//! [`crate::FrameCodec`]. Payload layouts that are part of the external
//! contract (status heights, time-sync records) are encoded by hand in
//! little-endian so they stay byte-exact.

use crate::{NetworkError, NetworkResult};
use bytes::{Buf, BufMut};
use kairos_types::Hash;
use serde::{Deserialize, Serialize};

/// Wire-visible message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageCode {
    /// Peer height announcement.
    Status = 0x00,
    /// Freshly produced block, re-broadcast eligible.
    NewBlock = 0x01,
    /// Hash-only block announcement.
    NewBlockHash = 0x02,
    /// Block body reply, never re-broadcast.
    Block = 0x03,
    /// Full transaction gossip.
    Transaction = 0x04,
    /// Hash-only transaction announcement.
    NewPooledTxHashes = 0x05,
    /// Request a block body by hash.
    GetBlockBodies = 0x06,
    /// Request a pooled transaction by hash.
    GetPooledTransaction = 0x07,
    /// Ask a peer for its sync status.
    SyncStatusReq = 0x08,
    /// Sync status reply.
    SyncStatus = 0x09,
    /// Request the block at a height.
    SyncGetBlocks = 0x0a,
    /// Block reply for a sync request.
    SyncBlock = 0x0b,
    /// Clock offset probe.
    TimeSyncReq = 0x0c,
    /// Clock offset reply.
    TimeSyncRsp = 0x0d,
    /// Keep-alive.
    Ping = 0x0e,
    /// Keep-alive reply.
    Pong = 0x0f,
}

impl TryFrom<u16> for MessageCode {
    type Error = NetworkError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageCode::Status),
            0x01 => Ok(MessageCode::NewBlock),
            0x02 => Ok(MessageCode::NewBlockHash),
            0x03 => Ok(MessageCode::Block),
            0x04 => Ok(MessageCode::Transaction),
            0x05 => Ok(MessageCode::NewPooledTxHashes),
            0x06 => Ok(MessageCode::GetBlockBodies),
            0x07 => Ok(MessageCode::GetPooledTransaction),
            0x08 => Ok(MessageCode::SyncStatusReq),
            0x09 => Ok(MessageCode::SyncStatus),
            0x0a => Ok(MessageCode::SyncGetBlocks),
            0x0b => Ok(MessageCode::SyncBlock),
            0x0c => Ok(MessageCode::TimeSyncReq),
            0x0d => Ok(MessageCode::TimeSyncRsp),
            0x0e => Ok(MessageCode::Ping),
            0x0f => Ok(MessageCode::Pong),
            other => Err(NetworkError::InvalidFrame(format!(
                "unknown message code {other:#06x}"
            ))),
        }
    }
}

/// The framed message record.
///
/// `receive_at` is zero on the sending side; the reader overwrites it with
/// the local logical clock when the frame terminator is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Message code, see [`MessageCode`].
    pub code: u16,
    /// Payload length in bytes. Redundant with `payload.len()`.
    pub size: u32,
    /// Message payload.
    pub payload: Vec<u8>,
    /// Local receive stamp in logical ms.
    pub receive_at: i64,
}

impl WireMessage {
    /// Build an outbound message.
    pub fn new(code: MessageCode, payload: Vec<u8>) -> Self {
        Self {
            code: code as u16,
            size: payload.len() as u32,
            payload,
            receive_at: 0,
        }
    }

    /// Build an outbound message with an empty payload.
    pub fn empty(code: MessageCode) -> Self {
        Self::new(code, Vec::new())
    }

    /// Typed message code.
    pub fn message_code(&self) -> NetworkResult<MessageCode> {
        MessageCode::try_from(self.code)
    }
}

/// Encode a height as the status payload: 8 bytes little-endian.
pub fn encode_height(height: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    buf.put_u64_le(height as u64);
    buf
}

/// Decode a status payload back into a height.
pub fn decode_height(payload: &[u8]) -> NetworkResult<i64> {
    if payload.len() < 8 {
        return Err(NetworkError::InvalidFrame(format!(
            "status payload too short: {}",
            payload.len()
        )));
    }
    let mut buf = payload;
    Ok(buf.get_u64_le() as i64)
}

/// Sync status reply: the sender's tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusMsg {
    /// Sender's latest height, -1 before initialization.
    pub latest_height: i64,
    /// Sender's latest block hash.
    pub latest_hash: Hash,
}

/// Encode a sync status reply.
pub fn encode_sync_status(msg: &SyncStatusMsg) -> NetworkResult<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| NetworkError::Codec(e.to_string()))
}

/// Decode a sync status reply.
pub fn decode_sync_status(payload: &[u8]) -> NetworkResult<SyncStatusMsg> {
    bincode::deserialize(payload).map_err(|e| NetworkError::Codec(e.to_string()))
}

/// Serialized length of a [`TimeSyncMsg`].
pub const TIME_SYNC_MSG_LEN: usize = 36;

/// Cristian-style clock probe: four stamps plus a status code.
///
/// All fields little-endian on the wire, 36 bytes total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSyncMsg {
    /// 0 for a healthy exchange; nonzero marks a rejected probe.
    pub code: i32,
    /// Requester's logical clock at send.
    pub req_time: i64,
    /// Responder's logical clock at request receipt.
    pub rec_req_time: i64,
    /// Responder's logical clock at reply send.
    pub rsp_time: i64,
    /// Requester's logical clock at reply receipt.
    pub rec_rsp_time: i64,
}

impl TimeSyncMsg {
    /// Encode to the fixed 36-byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TIME_SYNC_MSG_LEN);
        buf.put_i32_le(self.code);
        buf.put_i64_le(self.req_time);
        buf.put_i64_le(self.rec_req_time);
        buf.put_i64_le(self.rsp_time);
        buf.put_i64_le(self.rec_rsp_time);
        buf
    }

    /// Decode from the fixed 36-byte layout.
    pub fn from_bytes(payload: &[u8]) -> NetworkResult<Self> {
        if payload.len() < TIME_SYNC_MSG_LEN {
            return Err(NetworkError::InvalidFrame(format!(
                "time sync payload too short: {}",
                payload.len()
            )));
        }
        let mut buf = payload;
        Ok(Self {
            code: buf.get_i32_le(),
            req_time: buf.get_i64_le(),
            rec_req_time: buf.get_i64_le(),
            rsp_time: buf.get_i64_le(),
            rec_rsp_time: buf.get_i64_le(),
        })
    }
}
