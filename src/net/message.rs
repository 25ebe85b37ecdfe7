//! RPC frame types and length-prefixed framing.
//!
//! Each frame on the wire is a 4-byte little-endian length followed by a
//! postcard-encoded [`Request`] or [`Response`]. Collections inside frames
//! use bounded types so decode cost is capped independently of the outer
//! frame limit.

use super::serde_safe::{
    BoundedMap, BoundedVec, MAX_BATCH_ENVELOPES, MAX_META_SOURCES, MAX_NODES,
    MAX_RANGES_PER_NODE,
};
use super::types::MESSAGE_SIZE_LIMIT;
use crate::rpc::{ErrorCode, RpcError};
use crate::types::{Envelope, MetaInfo, Range, ReadRequest, SetRangesRequest};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub type EnvelopeBatch = BoundedVec<Envelope, MAX_BATCH_ENVELOPES>;
pub type MetaMap = BoundedMap<String, MetaInfo, MAX_META_SOURCES>;
pub type RangeList = BoundedVec<Range, MAX_RANGES_PER_NODE>;
pub type RangeAssignments = BoundedMap<String, RangeList, MAX_NODES>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    Send {
        local_only: bool,
        envelopes: EnvelopeBatch,
    },
    Read(ReadRequest),
    Meta {
        local_only: bool,
    },
    AddRange(Range),
    RemoveRange(Range),
    ListRanges,
    SetRanges(RangeAssignments),
}

impl Request {
    pub fn command(&self) -> &'static str {
        match self {
            Request::Send { .. } => "send",
            Request::Read(_) => "read",
            Request::Meta { .. } => "meta",
            Request::AddRange(_) => "addrange",
            Request::RemoveRange(_) => "removerange",
            Request::ListRanges => "listranges",
            Request::SetRanges(_) => "setranges",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Send,
    Read(EnvelopeBatch),
    Meta(MetaMap),
    Ranges(RangeList),
    RangesUpdated,
    Error { code: ErrorCode, message: String },
}

impl Response {
    pub fn command(&self) -> &'static str {
        match self {
            Response::Send => "send",
            Response::Read(_) => "read",
            Response::Meta(_) => "meta",
            Response::Ranges(_) => "ranges",
            Response::RangesUpdated => "rangesupdated",
            Response::Error { .. } => "error",
        }
    }
}

impl From<&RpcError> for Response {
    fn from(err: &RpcError) -> Self {
        Response::Error {
            code: err.code(),
            message: err.message().to_string(),
        }
    }
}

impl From<RangeAssignments> for SetRangesRequest {
    fn from(assignments: RangeAssignments) -> Self {
        let ranges = assignments
            .into_inner()
            .into_iter()
            .map(|(addr, list)| (addr, list.into_inner()))
            .collect();
        Self { ranges }
    }
}

impl TryFrom<SetRangesRequest> for RangeAssignments {
    type Error = RpcError;

    fn try_from(req: SetRangesRequest) -> Result<Self, RpcError> {
        let mut assignments = HashMap::with_capacity(req.ranges.len());
        for (addr, ranges) in req.ranges {
            let list = RangeList::new(ranges).ok_or_else(|| {
                RpcError::InvalidArgument(format!(
                    "more than {} ranges for {}",
                    MAX_RANGES_PER_NODE, addr
                ))
            })?;
            assignments.insert(addr, list);
        }
        RangeAssignments::new(assignments)
            .ok_or_else(|| RpcError::InvalidArgument(format!("more than {} nodes", MAX_NODES)))
    }
}

/// Encode `msg` and write it as one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = postcard::to_allocvec(msg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if bytes.len() > MESSAGE_SIZE_LIMIT {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", bytes.len()),
        ));
    }

    writer.write_all(&(bytes.len() as u32).to_le_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}

/// Read one length-prefixed frame and decode it.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MESSAGE_SIZE_LIMIT {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    postcard::from_bytes(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip() {
        let req = Request::Read(ReadRequest {
            source_id: "app-1".into(),
            start_time: 1,
            end_time: 2,
            limit: 10,
            ..ReadRequest::default()
        });

        let mut buf = Vec::new();
        write_frame(&mut buf, &req).await.unwrap();

        let decoded: Request = read_frame(&mut buf.as_slice()).await.unwrap();
        match decoded {
            Request::Read(r) => {
                assert_eq!(r.source_id, "app-1");
                assert_eq!(r.limit, 10);
            }
            other => panic!("unexpected frame: {}", other.command()),
        }
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);

        let err = read_frame::<_, Request>(&mut buf.as_slice())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn error_frames_carry_code_and_message() {
        let err = RpcError::Unavailable("no route".into());
        match Response::from(&err) {
            Response::Error { code, message } => {
                assert_eq!(code, ErrorCode::Unavailable);
                assert_eq!(message, "no route");
            }
            other => panic!("unexpected frame: {}", other.command()),
        }
    }

    #[test]
    fn set_ranges_converts_both_ways() {
        let mut req = SetRangesRequest::default();
        req.ranges
            .insert("node-0".into(), vec![Range::new(0, 10), Range::new(20, 30)]);

        let assignments = RangeAssignments::try_from(req.clone()).unwrap();
        let back = SetRangesRequest::from(assignments);
        assert_eq!(back, req);
    }
}
