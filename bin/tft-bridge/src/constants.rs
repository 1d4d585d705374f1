use std::time::Duration;

/// Overlay address used when the config names none.
pub(crate) const DEFAULT_LISTEN_ADDR: &str = "/ip4/0.0.0.0/tcp/4001";

/// How long the overlay may take to stop after the bridge loops exited.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
