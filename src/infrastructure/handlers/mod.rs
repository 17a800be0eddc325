//! Request handlers for the supported URI schemes.

mod data_uri;
mod file;
mod network;

pub use data_uri::{DataUriRequestHandler, decode_data_uri};
pub use file::FileRequestHandler;
pub use network::{NETWORK_RETRY_COUNT, NetworkRequestHandler};

/// Case-insensitive scheme prefix check that requires something after the prefix.
pub(crate) fn has_scheme(uri: &str, scheme: &str) -> bool {
    uri.len() > scheme.len()
        && uri
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}
