//! Validation and defaulting boundary in front of the local store.
//!
//! Any read that reaches the store has already been normalized here: the
//! time window is concrete, the limit is positive and capped, the name
//! filter is compiled, and the wildcard type has been stripped. The store
//! itself stays protocol-agnostic.

use crate::rpc::{EgressClient, RpcError};
use crate::store::StoreReader;
use crate::types::{
    EnvelopeType, MetaRequest, MetaResponse, ReadRequest, ReadResponse, now_nanos,
};
use regex::Regex;
use std::sync::Arc;

/// Largest allowed read limit.
pub const MAX_LIMIT: i64 = 1000;

/// Limit applied when the request leaves it at zero.
pub const DEFAULT_LIMIT: i64 = 100;

pub struct LocalStoreReader<S> {
    store: Arc<S>,
}

impl<S> LocalStoreReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: StoreReader> EgressClient for LocalStoreReader<S> {
    async fn read(&self, req: ReadRequest) -> Result<ReadResponse, RpcError> {
        if req.end_time != 0 && req.start_time > req.end_time {
            return Err(RpcError::InvalidArgument(
                "StartTime must be before EndTime".into(),
            ));
        }
        if req.limit > MAX_LIMIT {
            return Err(RpcError::InvalidArgument("Limit must be 1000 or less".into()));
        }
        if req.limit < 0 {
            return Err(RpcError::InvalidArgument(
                "Limit must be greater than zero".into(),
            ));
        }

        let end_time = if req.end_time == 0 {
            now_nanos()
        } else {
            req.end_time
        };
        let limit = if req.limit == 0 { DEFAULT_LIMIT } else { req.limit };

        let name_filter = if req.name_filter.is_empty() {
            None
        } else {
            Some(Regex::new(&req.name_filter).map_err(|_| {
                RpcError::InvalidArgument(
                    "Name filter must be a valid regular expression".into(),
                )
            })?)
        };

        let types: Vec<EnvelopeType> = req
            .envelope_types
            .iter()
            .copied()
            .filter(|t| *t != EnvelopeType::Any)
            .collect();
        let types = if types.is_empty() { None } else { Some(types) };

        let envelopes = self.store.get(
            &req.source_id,
            req.start_time,
            end_time,
            types.as_deref(),
            name_filter.as_ref(),
            limit as usize,
            req.descending,
        );

        Ok(ReadResponse { envelopes })
    }

    async fn meta(&self, _req: MetaRequest) -> Result<MetaResponse, RpcError> {
        Ok(MetaResponse {
            meta: self.store.meta(),
        })
    }
}
