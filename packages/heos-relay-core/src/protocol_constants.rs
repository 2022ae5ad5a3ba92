//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the HEOS CLI protocol, SSDP, or by the wire
//! contract between the relay and its clients. Tunable values live in
//! [`crate::state::Config`].

// ─────────────────────────────────────────────────────────────────────────────
// HEOS CLI Protocol
// ─────────────────────────────────────────────────────────────────────────────

/// TCP port every HEOS device listens on for CLI connections.
pub const HEOS_CLI_PORT: u16 = 1255;

/// Scheme prefix of every command line written upstream.
pub const HEOS_COMMAND_PREFIX: &str = "heos://";

/// Line terminator for commands written upstream.
pub const HEOS_LINE_TERMINATOR: &str = "\r\n";

/// Maximum length of a single response line from a HEOS device.
///
/// Browse responses for large containers are the longest records observed;
/// anything beyond this is treated as a framing error.
pub const MAX_HEOS_LINE_BYTES: usize = 1024 * 1024;

/// Fixed page size used when translating a browse `startItem` into a `range`.
pub const BROWSE_PAGE_SIZE: u32 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// SSDP Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Standard SSDP multicast address and port.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// SSDP search target advertised by HEOS devices.
pub const HEOS_SEARCH_TARGET: &str = "urn:schemas-denon-com:device:ACT-Denon:1";

/// MX value (seconds) sent in the M-SEARCH request.
pub const SSDP_MX_SECS: u64 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Supervision
// ─────────────────────────────────────────────────────────────────────────────

/// Backoff delays between initial connection attempts (milliseconds).
///
/// Once these are exhausted the upstream is reported as failed and the
/// supervisor falls back to [`UPSTREAM_SLOW_RETRY_SECS`].
pub const UPSTREAM_RETRY_DELAYS_MS: [u64; 4] = [500, 1000, 2000, 5000];

/// Interval between connection attempts after the upstream has failed.
pub const UPSTREAM_SLOW_RETRY_SECS: u64 = 30;

/// Timeout for establishing the TCP connection to a HEOS device.
pub const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Client Reconciliation
// ─────────────────────────────────────────────────────────────────────────────

/// Difference between an incoming `cur_pos` sample and the locally
/// extrapolated position that forces a hard resync (milliseconds).
pub const POSITION_RESYNC_THRESHOLD_MS: f64 = 10_000.0;

/// Key under which the last selected player is persisted client-side.
pub const ACTIVE_PLAYER_KEY: &str = "activePlayerPid";

/// File name of the client-local state file inside the data directory.
pub const CLIENT_STATE_FILE: &str = "client-state.json";

/// `aid` value for "play now" when adding an item to a player's queue.
pub const ADD_TO_QUEUE_PLAY_NOW: u8 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Service Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "heos-relay";

/// Path of the streaming endpoint.
pub const STREAM_PATH: &str = "/sse";
