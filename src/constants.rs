//! Protocol constants for the Overlay Coordinator
//!
//! Defaults, limits and wire-level sizes shared by the coordinator
//! and the thin peer client.

/// Service name used in banners and the status API
pub const SERVICE_NAME: &str = "Overlay Coordinator";

/// Coordinator version
pub const VERSION: &str = "0.1.0-alpha";

// ═══════════════════════════════════════════════════════════════
// Network defaults
// ═══════════════════════════════════════════════════════════════

/// Default coordinator port
pub const DEFAULT_COORDINATOR_PORT: u16 = 5000;

/// Idle sessions are reclaimed after this many seconds
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Grace period for in-flight sessions on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Largest accepted frame (one JSON envelope per line)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Pause after a failed accept() before retrying
pub const ACCEPT_BACKOFF_MS: u64 = 100;

// ═══════════════════════════════════════════════════════════════
// Envelope
// ═══════════════════════════════════════════════════════════════

/// AES-GCM nonce, 96 bits
pub const NONCE_SIZE: usize = 12;

/// AES-GCM tag, 128 bits
pub const TAG_SIZE: usize = 16;

/// Random per-process prefix of every nonce; the remaining 4 bytes count
pub const NONCE_SALT_SIZE: usize = 8;

// ═══════════════════════════════════════════════════════════════
// Query / classifier defaults
// ═══════════════════════════════════════════════════════════════

/// `num_peers` when a query omits it
pub const DEFAULT_NUM_PEERS: usize = 1;

/// Expected share of anomalous traffic in the baseline
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

/// Feature defaults when a message carries none
pub const DEFAULT_FEATURE_SIZE: f64 = 0.0;
pub const DEFAULT_FEATURE_FREQUENCY: f64 = 1.0;

/// Text of the decoy response
pub const HONEYPOT_NOTICE: &str = "Suspicious activity logged";

/// Diversions buffered for an in-process honeypot consumer before dropping
pub const HONEYPOT_QUEUE_CAPACITY: usize = 1024;

// ═══════════════════════════════════════════════════════════════
// Peer client
// ═══════════════════════════════════════════════════════════════

/// Attribute report interval
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;

/// Upper bound for the back-off after a honeypot reply
pub const MAX_REPORT_BACKOFF_SECS: u64 = 320;

/// Print the startup banner
pub fn print_banner() {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                 OVERLAY COORDINATOR                        ║");
    println!("║                                                            ║");
    println!("║  attributes • queries • honeypot diversion                 ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!("  v{}", VERSION);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_layout() {
        assert!(NONCE_SALT_SIZE + 4 == NONCE_SIZE);
    }
}
