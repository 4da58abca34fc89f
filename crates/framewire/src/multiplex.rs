//! Concurrent fan-out of one payload to many sessions.

use std::sync::Arc;

use framewire_core::envelope::Payload;

use crate::session::Session;

/// Send `payload` to every session concurrently. Per-peer failures are
/// already logged (and the session closed) by [`Session::send`]; a failed
/// slot reports 0 and never aborts the fan-out. Results come back in the
/// order the sessions were given.
pub async fn multi_send(sessions: &[Arc<Session>], payload: &Payload) -> Vec<u64> {
    let tasks: Vec<_> = sessions
        .iter()
        .map(|session| {
            let session = session.clone();
            let payload = payload.clone();
            tokio::spawn(async move { session.send(&payload).await })
        })
        .collect();

    futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| {
            joined.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "fan-out worker failed");
                0
            })
        })
        .collect()
}
