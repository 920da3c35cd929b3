//! Readiness probing for the program under test.

use std::{future::Future, pin::pin, time::Duration};

use tokio::net::TcpStream;

use crate::error::WaitError;

/// Delay between failed connection attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `addr` until a TCP connection is accepted.
///
/// Each test connection is closed as soon as it is established. Gives up when
/// `limit` elapses or `cancelled` resolves, whichever happens first.
///
/// # Errors
///
/// Returns a [`WaitError`] carrying the last connection error if the port
/// never accepted a connection.
pub async fn wait_for_port<F>(addr: &str, limit: Duration, cancelled: F) -> Result<(), WaitError>
where
    F: Future<Output = ()>,
{
    let mut deadline = pin!(tokio::time::sleep(limit));
    let mut cancelled = pin!(cancelled);

    let mut last = None;
    loop {
        let attempt = async {
            let result = TcpStream::connect(addr).await.map(drop);
            if result.is_err() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            result
        };

        tokio::select! {
            biased;

            () = &mut cancelled => return Err(WaitError::Cancelled { last }),
            () = &mut deadline => return Err(WaitError::TimedOut { limit, last }),
            result = attempt => match result {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::trace!("{addr} not ready: {err}");
                    last = Some(err);
                }
            },
        }
    }
}
