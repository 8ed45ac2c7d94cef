//! ID generation utilities
//!
//! Tool calls recovered from free-form model output carry no identifier of
//! their own, so one is minted here.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique tool call ID
///
/// Format: `call-{timestamp_ms}-{random_hex}`
/// Example: `call-1738300800123-a1b2c3d4`
pub fn generate_tool_call_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("call-{}-{:08x}", timestamp, random)
}
