//! `Sec-MS-GEC` request signing and clock skew tracking.
//!
//! The service only accepts a token computed from the current time rounded
//! down to a 5-minute window. When the local clock drifts far enough the
//! handshake is rejected with 403, and the `Date` header of that response is
//! used to correct the clock before retrying.

use std::fmt;
use std::sync::Arc;

use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::TRUSTED_CLIENT_TOKEN;
use crate::core::tts::base::{TTSError, TTSResult};

/// Seconds between 1601-01-01 (Windows file time epoch) and the Unix epoch.
pub const WIN_EPOCH: u64 = 11_644_473_600;

/// Width of the token window in seconds.
const TOKEN_WINDOW_SECONDS: u64 = 300;

/// 100 ns ticks per second.
const TICKS_PER_SECOND: u128 = 10_000_000;

// =============================================================================
// Clock
// =============================================================================

/// Source of wall-clock time, in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn unix_timestamp(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_timestamp(&self) -> f64 {
        OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
    }
}

// =============================================================================
// Drm
// =============================================================================

/// Token generator plus the clock skew it has learned from the service.
///
/// One instance is shared (behind an `Arc`) by every connection of a client,
/// so a correction made after one rejected handshake applies to all later
/// connections.
pub struct Drm {
    clock: Arc<dyn Clock>,
    clock_skew_seconds: Mutex<f64>,
}

impl fmt::Debug for Drm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drm")
            .field("clock_skew_seconds", &self.clock_skew_seconds())
            .finish()
    }
}

impl Default for Drm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drm {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            clock_skew_seconds: Mutex::new(0.0),
        }
    }

    pub fn clock_skew_seconds(&self) -> f64 {
        *self.clock_skew_seconds.lock()
    }

    fn adj_clock_skew_seconds(&self, skew_seconds: f64) {
        *self.clock_skew_seconds.lock() += skew_seconds;
    }

    /// Current Unix time in seconds, corrected by the learned skew.
    pub fn now(&self) -> f64 {
        self.clock.unix_timestamp() + self.clock_skew_seconds()
    }

    /// Generates the `Sec-MS-GEC` token for the current 5-minute window.
    pub fn generate_sec_ms_gec(&self) -> String {
        let seconds = (self.now() + WIN_EPOCH as f64).floor().max(0.0) as u64;
        let seconds = seconds - seconds % TOKEN_WINDOW_SECONDS;
        let ticks = u128::from(seconds) * TICKS_PER_SECOND;

        let digest = Sha256::digest(format!("{ticks}{TRUSTED_CLIENT_TOKEN}").as_bytes());
        hex::encode_upper(digest)
    }

    /// Adjusts the clock skew from the `Date` header of a rejected request.
    pub fn correct_skew(&self, server_date: Option<&str>) -> TTSResult<()> {
        let server_date = server_date
            .ok_or_else(|| TTSError::SkewAdjustment("No server date in headers.".to_string()))?;
        let server_time = parse_rfc2616_date(server_date).ok_or_else(|| {
            TTSError::SkewAdjustment(format!("Failed to parse server date: {server_date}"))
        })?;

        let client_time = self.now();
        self.adj_clock_skew_seconds(server_time - client_time);
        warn!(
            server_date,
            adjustment_seconds = server_time - client_time,
            "Corrected clock skew after rejected request"
        );
        Ok(())
    }

    /// Random per-connection identifier, 32 uppercase hex characters.
    pub fn generate_muid() -> String {
        Uuid::new_v4().simple().to_string().to_uppercase()
    }

    /// Adds the `muid` cookie to `headers`.
    ///
    /// Fails if a cookie is already present.
    pub fn headers_with_muid(mut headers: HeaderMap) -> TTSResult<HeaderMap> {
        if headers.contains_key(COOKIE) {
            return Err(TTSError::InvalidConfiguration(
                "Cookie already exists in headers".to_string(),
            ));
        }

        let cookie = format!("muid={};", Self::generate_muid());
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| TTSError::InvalidConfiguration(format!("Invalid cookie value: {e}")))?;
        headers.insert(COOKIE, value);
        Ok(headers)
    }
}

/// Parses an HTTP date (`Sat, 01 Jan 2022 00:00:00 GMT`) into Unix seconds.
pub fn parse_rfc2616_date(date: &str) -> Option<f64> {
    let date = date.trim();
    if let Ok(parsed) = OffsetDateTime::parse(date, &Rfc2822) {
        return Some(parsed.unix_timestamp() as f64);
    }

    let http_date = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    match PrimitiveDateTime::parse(date, http_date) {
        Ok(parsed) => Some(parsed.assume_utc().unix_timestamp() as f64),
        Err(e) => {
            debug!("Unparseable server date {date:?}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FixedClock(f64);

    impl Clock for FixedClock {
        fn unix_timestamp(&self) -> f64 {
            self.0
        }
    }

    fn drm_at(timestamp: f64) -> Drm {
        Drm::with_clock(Arc::new(FixedClock(timestamp)))
    }

    #[test]
    fn test_token_is_uppercase_sha256_hex() {
        let token = drm_at(1_699_999_800.0).generate_sec_ms_gec();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_token_matches_reference_computation() {
        // 1_700_000_000 + WIN_EPOCH rounds down to 13_344_473_400 seconds.
        let expected_input = format!("{}{}", 133_444_734_000_000_000u128, TRUSTED_CLIENT_TOKEN);
        let expected = hex::encode_upper(Sha256::digest(expected_input.as_bytes()));
        assert_eq!(drm_at(1_700_000_000.0).generate_sec_ms_gec(), expected);
    }

    #[test]
    fn test_token_is_stable_within_window() {
        assert_eq!(
            drm_at(1_699_999_800.0).generate_sec_ms_gec(),
            drm_at(1_700_000_099.9).generate_sec_ms_gec()
        );
        assert_ne!(
            drm_at(1_699_999_800.0).generate_sec_ms_gec(),
            drm_at(1_700_000_100.0).generate_sec_ms_gec()
        );
    }

    #[test]
    fn test_correct_skew_changes_token() {
        let drm = drm_at(1_760_000_000.0);
        let before = drm.generate_sec_ms_gec();

        drm.correct_skew(Some("Sat, 01 Jan 2022 00:00:00 GMT")).unwrap();

        assert_eq!(drm.now(), 1_640_995_200.0);
        assert_eq!(drm.clock_skew_seconds(), 1_640_995_200.0 - 1_760_000_000.0);
        assert_ne!(drm.generate_sec_ms_gec(), before);
    }

    #[test]
    fn test_correct_skew_accumulates() {
        let drm = drm_at(1_640_995_100.0);
        drm.correct_skew(Some("Sat, 01 Jan 2022 00:00:00 GMT")).unwrap();
        drm.correct_skew(Some("Sat, 01 Jan 2022 00:01:00 GMT")).unwrap();
        assert_eq!(drm.clock_skew_seconds(), 160.0);
    }

    #[test]
    fn test_correct_skew_errors() {
        let drm = drm_at(1_700_000_000.0);
        assert!(matches!(
            drm.correct_skew(None),
            Err(TTSError::SkewAdjustment(_))
        ));
        assert!(matches!(
            drm.correct_skew(Some("yesterday-ish")),
            Err(TTSError::SkewAdjustment(_))
        ));
        assert_eq!(drm.clock_skew_seconds(), 0.0);
    }

    #[test]
    fn test_parse_rfc2616_date() {
        assert_eq!(
            parse_rfc2616_date("Sat, 01 Jan 2022 00:00:00 GMT"),
            Some(1_640_995_200.0)
        );
        assert_eq!(parse_rfc2616_date("not a date"), None);
    }

    #[test]
    fn test_generate_muid() {
        let muid = Drm::generate_muid();
        assert_eq!(muid.len(), 32);
        assert!(muid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_ne!(muid, Drm::generate_muid());
    }

    #[test]
    fn test_headers_with_muid() {
        let headers = Drm::headers_with_muid(HeaderMap::new()).unwrap();
        let cookie = headers.get(COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("muid="));
        assert!(cookie.ends_with(';'));
        assert_eq!(cookie.len(), "muid=;".len() + 32);
    }

    #[test]
    fn test_headers_with_muid_rejects_existing_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session=abc"));
        assert!(matches!(
            Drm::headers_with_muid(headers),
            Err(TTSError::InvalidConfiguration(_))
        ));
    }
}
