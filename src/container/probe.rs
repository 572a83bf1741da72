//! TCP readiness probe.

use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Succeeds once a TCP connection to `host:port` can be opened within
/// `connect_timeout`.
///
/// The connection is closed immediately; a successful connect is taken as
/// the service accepting traffic. A connect that hangs past the timeout is
/// reported as [`io::ErrorKind::TimedOut`].
pub async fn probe_tcp(host: &str, port: u16, connect_timeout: Duration) -> io::Result<()> {
    debug!("Check whether {}:{} is ready", host, port);
    let result = match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await
    {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect timed out after {:?}", connect_timeout),
        )),
    };

    match result {
        Ok(stream) => {
            drop(stream);
            debug!("{}:{} is ready", host, port);
            Ok(())
        }
        Err(e) => {
            debug!("{}:{} is not ready: {}", host, port, e);
            Err(e)
        }
    }
}
