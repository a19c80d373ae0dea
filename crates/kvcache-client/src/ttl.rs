//! # Expiration Types
//!
//! Write-time expiration policy and read-time remaining lifetime.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Expiration policy applied by a write.
///
/// Every write names one of these explicitly, so a write never drops an
/// expiration the caller did not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Clear any expiration; the key lives until deleted
    #[default]
    Persist,
    /// Leave the key's current expiration untouched (`KEEPTTL`)
    Keep,
    /// Expire after the given duration
    Expire(Duration),
}

impl Ttl {
    /// Build an expiring policy from whole seconds
    pub const fn secs(secs: u64) -> Self {
        Self::Expire(Duration::from_secs(secs))
    }

    /// Normalise `Expire(0)` to `Persist`, matching the store convention
    /// that a zero expiration means "no expiration".
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Expire(d) if d.is_zero() => Self::Persist,
            other => other,
        }
    }

    /// Expiration in milliseconds, rounding sub-millisecond durations up to 1ms
    pub(crate) fn expire_millis(self) -> Option<u64> {
        match self.normalized() {
            Self::Expire(d) => Some(duration_millis(d)),
            Self::Persist | Self::Keep => None,
        }
    }

    /// Append the `SET` expiry arguments for this policy.
    ///
    /// Whole-second durations go out as `EX`, anything else as `PX`.
    #[cfg(feature = "redis")]
    pub(crate) fn write_set_args(self, cmd: &mut redis::Cmd) {
        match self.normalized() {
            Self::Persist => {}
            Self::Keep => {
                cmd.arg("KEEPTTL");
            }
            Self::Expire(d) if d.subsec_nanos() == 0 => {
                cmd.arg("EX").arg(d.as_secs());
            }
            Self::Expire(d) => {
                cmd.arg("PX").arg(duration_millis(d));
            }
        }
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        Self::Expire(d).normalized()
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Persist, Self::from)
    }
}

pub(crate) fn duration_millis(d: Duration) -> u64 {
    let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 && !d.is_zero() { 1 } else { ms }
}

/// Remaining lifetime of a key as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "ttl_ms", rename_all = "snake_case")]
pub enum KeyTtl {
    /// The key does not exist
    Missing,
    /// The key exists and has no expiration
    Persistent,
    /// The key expires after this duration
    #[serde(with = "millis")]
    Expiring(Duration),
}

impl KeyTtl {
    /// Decode a `PTTL` reply: `-2` missing, `-1` persistent, otherwise milliseconds
    pub const fn from_pttl(reply: i64) -> Self {
        match reply {
            -2 => Self::Missing,
            r if r < 0 => Self::Persistent,
            #[allow(clippy::cast_sign_loss)]
            r => Self::Expiring(Duration::from_millis(r as u64)),
        }
    }

    pub const fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Expiring(d) => Some(*d),
            Self::Missing | Self::Persistent => None,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(super::duration_millis(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_means_persist() {
        assert_eq!(Ttl::from(Duration::ZERO), Ttl::Persist);
        assert_eq!(Ttl::Expire(Duration::ZERO).normalized(), Ttl::Persist);
        assert_eq!(Ttl::from(None), Ttl::Persist);
        assert_eq!(Ttl::from(Some(Duration::from_secs(5))), Ttl::secs(5));
    }

    #[test]
    fn test_keep_is_distinct_from_persist() {
        assert_ne!(Ttl::Keep, Ttl::Persist);
        assert_eq!(Ttl::Keep.expire_millis(), None);
        assert_eq!(Ttl::Persist.expire_millis(), None);
    }

    #[test]
    fn test_sub_millisecond_rounds_up() {
        assert_eq!(Ttl::Expire(Duration::from_micros(10)).expire_millis(), Some(1));
        assert_eq!(Ttl::Expire(Duration::from_millis(1500)).expire_millis(), Some(1500));
    }

    #[cfg(feature = "redis")]
    #[test]
    fn test_set_args() {
        let packed = |ttl: Ttl| {
            let mut cmd = redis::cmd("SET");
            cmd.arg("k").arg("v");
            ttl.write_set_args(&mut cmd);
            String::from_utf8_lossy(&cmd.get_packed_command()).to_string()
        };

        assert!(packed(Ttl::secs(60)).contains("EX\r\n$2\r\n60"));
        assert!(packed(Ttl::Expire(Duration::from_millis(1500))).contains("PX\r\n$4\r\n1500"));
        assert!(packed(Ttl::Keep).contains("KEEPTTL"));
        assert!(packed(Ttl::Persist).ends_with("$1\r\nv\r\n"));
    }

    #[test]
    fn test_pttl_sentinels() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_pttl(4_200),
            KeyTtl::Expiring(Duration::from_millis(4_200))
        );
        assert_eq!(KeyTtl::Persistent.remaining(), None);
    }

    #[test]
    fn test_key_ttl_json_shape() {
        let json = serde_json::to_value(KeyTtl::Expiring(Duration::from_secs(2))).unwrap();
        assert_eq!(json, serde_json::json!({"state": "expiring", "ttl_ms": 2000}));

        let json = serde_json::to_value(KeyTtl::Missing).unwrap();
        assert_eq!(json, serde_json::json!({"state": "missing"}));
    }
}
