//! Handler for inline `data:` URIs.

use std::sync::OnceLock;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use regex::Regex;

use crate::domain::entities::{LoadedFrom, NetworkPolicy, Request};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{HandlerOutput, RequestHandler};

use super::has_scheme;

fn data_uri_regex() -> &'static Regex {
    static DATA_URI: OnceLock<Regex> = OnceLock::new();
    DATA_URI.get_or_init(|| {
        Regex::new(r"(?s)^(?i:data):([^,]*?)(;base64)?,(.*)$").expect("Invalid regex")
    })
}

/// Decodes the payload of a `data:[<mediatype>][;base64],<data>` URI.
///
/// # Errors
/// Returns `LoadError::Decode` for malformed URIs or invalid base64.
pub fn decode_data_uri(uri: &str) -> LoadResult<Bytes> {
    let captures = data_uri_regex()
        .captures(uri)
        .ok_or_else(|| LoadError::decode("malformed data URI"))?;
    let payload = captures.get(3).map_or("", |m| m.as_str());

    if captures.get(2).is_some() {
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(cleaned)
            .map(Bytes::from)
            .map_err(|e| LoadError::decode(format!("invalid base64 payload: {e}")))
    } else {
        Ok(Bytes::from(percent_decode(payload)))
    }
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut escaped = [0u8; 1];
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(digits) = bytes.get(i + 1..i + 3)
            && hex::decode_to_slice(digits, &mut escaped).is_ok()
        {
            out.push(escaped[0]);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

/// Serves images embedded in the URI itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataUriRequestHandler;

#[async_trait]
impl RequestHandler for DataUriRequestHandler {
    fn name(&self) -> &'static str {
        "data"
    }

    fn can_handle(&self, request: &Request) -> bool {
        has_scheme(&request.uri, "data:")
    }

    async fn load(&self, request: &Request, _policy: NetworkPolicy) -> LoadResult<HandlerOutput> {
        let bytes = decode_data_uri(&request.uri)?;
        Ok(HandlerOutput::bytes(bytes, LoadedFrom::Memory))
    }
}
