use std::time::Duration;

use crate::resolver::Candidate;

use super::method::Connect;

/// Tries each candidate in order and stops at the first accepted connection.
/// Connection errors never escape: they only move on to the next candidate.
pub fn probe(
    connector: &dyn Connect,
    port: u16,
    candidates: &[Candidate],
    timeout: Duration,
) -> bool {
    candidates.iter().any(|candidate| {
        let addr = candidate.socket_addr(port);
        match connector.connect(&addr, timeout) {
            Ok(()) => true,
            Err(e) => {
                log::trace!("Connect to `{}` failed: {}", addr, e);
                false
            }
        }
    })
}
