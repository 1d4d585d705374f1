//! Constants of the signer overlay.

use std::time::Duration;

use libp2p::StreamProtocol;

/// Protocol of the `Sign` and `SignMint` RPCs.
pub const SIGNER_PROTOCOL: StreamProtocol = StreamProtocol::new("/p2p/rpc/signer");

/// Protocol of the `ID` RPC.
pub const SOL_ID_PROTOCOL: StreamProtocol = StreamProtocol::new("/p2p/rpc/sol-id");

/// Protocol version announced through identify.
pub const IDENTIFY_PROTOCOL: &str = "/tft-bridge/1.0.0";

/// Default timeout for idle connections.
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout of a single outbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout of the connection upgrade (pnet, noise, yamux).
pub const TRANSPORT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(20);

/// Capacity of the command channel between handles and the swarm task.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;
