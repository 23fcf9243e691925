//! # cfsec-types: Core types for `CFSec`
//!
//! This crate contains shared types used across the `CFSec` persistence core:
//! - Identity keys ([`IdentityKey`]), the 256-bit primary/foreign key type
//! - Temporal types ([`Timestamp`])
//! - Optimistic-concurrency tokens ([`Revision`])
//! - Audit trail types ([`AuditAction`], [`AuditStamp`], [`AuditEnvelope`])

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Identity Key - Copy (fixed 32-byte value)
// ============================================================================

/// Length of identity keys in bytes (256-bit hash).
pub const KEY_LENGTH: usize = 32;

/// Process-wide counter mixed into generated keys.
static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A 256-bit opaque identifier used as every entity's primary key and as
/// foreign-key references.
///
/// The all-zero value is the null sentinel ([`IdentityKey::NULL`]). Equality,
/// ordering and hashing are byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey([u8; KEY_LENGTH]);

impl IdentityKey {
    /// The null sentinel (all zeros). Freshly constructed records carry it.
    pub const NULL: IdentityKey = IdentityKey([0u8; KEY_LENGTH]);

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Returns true if this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; KEY_LENGTH]
    }

    /// Generates a fresh key.
    ///
    /// The key is the BLAKE3 digest of OS randomness, the wall clock and a
    /// process-wide counter. The result is never [`IdentityKey::NULL`].
    pub fn generate() -> Self {
        let mut seed = [0u8; KEY_LENGTH];
        if let Err(err) = getrandom::fill(&mut seed) {
            tracing::warn!(
                error = %err,
                "OS randomness unavailable; key seeded from clock and counter"
            );
        }
        Self::from_seed(&seed)
    }

    fn from_seed(seed: &[u8; KEY_LENGTH]) -> Self {
        loop {
            let mut hasher = blake3::Hasher::new();
            hasher.update(seed);
            hasher.update(&Timestamp::now().as_nanos().to_le_bytes());
            hasher.update(&KEY_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());

            let key = Self(*hasher.finalize().as_bytes());
            if !key.is_null() {
                return key;
            }
        }
    }

    /// Derives a key deterministically from a name.
    ///
    /// Used for well-known rows (seed data, test fixtures) whose key must be
    /// stable across processes.
    pub fn derive(context: &str, name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(context.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(name.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Returns `None` for the null sentinel, `Some(self)` otherwise.
    pub fn non_null(self) -> Option<Self> {
        if self.is_null() { None } else { Some(self) }
    }
}

impl Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return write!(f, "IdentityKey(NULL)");
        }
        write!(
            f,
            "IdentityKey({:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5], self.0[6], self.0[7]
        )
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Default for IdentityKey {
    fn default() -> Self {
        Self::NULL
    }
}

impl From<[u8; KEY_LENGTH]> for IdentityKey {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<IdentityKey> for [u8; KEY_LENGTH] {
    fn from(key: IdentityKey) -> Self {
        key.0
    }
}

impl AsRef<[u8]> for IdentityKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Error returned when parsing an [`IdentityKey`] from hex.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("identity key must be {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },
}

impl FromStr for IdentityKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expected = KEY_LENGTH * 2;
        if s.len() != expected {
            return Err(KeyParseError::InvalidLength {
                expected,
                actual: s.len(),
            });
        }

        let mut bytes = [0u8; KEY_LENGTH];
        let mut chars = s.char_indices();
        for byte in &mut bytes {
            let mut next_nibble = || -> Result<u8, KeyParseError> {
                let (position, character) = chars.next().ok_or(KeyParseError::InvalidLength {
                    expected,
                    actual: s.len(),
                })?;
                character
                    .to_digit(16)
                    .map(|d| d as u8)
                    .ok_or(KeyParseError::InvalidCharacter {
                        character,
                        position,
                    })
            };
            let high = next_nibble()?;
            let low = next_nibble()?;
            *byte = (high << 4) | low;
        }

        Ok(Self(bytes))
    }
}

impl Serialize for IdentityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Timestamp - Copy (8-byte value with monotonic guarantee)
// ============================================================================

/// Wall-clock timestamp with monotonic guarantee within the system.
///
/// Audit columns need real-world time; monotonicity prevents two audited
/// actions on the same row from sharing a stamp when the clock is adjusted.
///
/// Stored as nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from nanoseconds since Unix epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Returns the timestamp as nanoseconds since Unix epoch.
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp as seconds since Unix epoch (truncates nanoseconds).
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Creates a timestamp for the current time.
    ///
    /// A clock set before the Unix epoch reads as the epoch.
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self(nanos)
    }

    /// Creates a timestamp ensuring monotonicity: `max(now, last + 1ns)`.
    pub fn now_monotonic(last: Option<Timestamp>) -> Self {
        let now = Self::now();
        match last {
            Some(prev) if now.0 <= prev.0 => Timestamp(prev.0.saturating_add(1)),
            _ => now,
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = self.0 % 1_000_000_000;
        write!(f, "{secs}.{nanos:09}")
    }
}

impl From<u64> for Timestamp {
    fn from(nanos: u64) -> Self {
        Self(nanos)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================================================
// Revision - Copy (optimistic-concurrency token)
// ============================================================================

/// Monotonic per-row revision counter.
///
/// Storage assigns [`Revision::INITIAL`] on insert and advances the counter by
/// exactly one on every successful update. Callers submit the revision they
/// read; a mismatch means their view is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(u32);

impl Revision {
    /// Revision of a freshly inserted row.
    pub const INITIAL: Revision = Revision(1);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the revision that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Revision {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// ============================================================================
// Audit Types
// ============================================================================

/// The kind of audited action that produced a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    /// Returns the single-letter audit code stored with history rows.
    pub fn code(&self) -> char {
        match self {
            AuditAction::Create => 'C',
            AuditAction::Update => 'U',
            AuditAction::Delete => 'D',
        }
    }

    /// Parses an audit code.
    ///
    /// Returns `None` if the code is not a known action.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'C' => Some(AuditAction::Create),
            'U' => Some(AuditAction::Update),
            'D' => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The audit quad carried by every live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_by: IdentityKey,
    pub created_at: Timestamp,
    pub updated_by: IdentityKey,
    pub updated_at: Timestamp,
}

impl AuditStamp {
    /// Stamp for a newly created row: created and updated fields are identical.
    pub fn created(by: IdentityKey, at: Timestamp) -> Self {
        Self {
            created_by: by,
            created_at: at,
            updated_by: by,
            updated_at: at,
        }
    }

    /// Returns a copy with the updated pair replaced.
    pub fn touched(self, by: IdentityKey, at: Timestamp) -> Self {
        Self {
            updated_by: by,
            updated_at: at,
            ..self
        }
    }
}

/// Who, where and when of one audited action.
///
/// Combined with the row's revision and identity key this forms the
/// composite key of a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEnvelope {
    pub cluster_id: IdentityKey,
    pub stamp: Timestamp,
    pub action: AuditAction,
    pub session_id: IdentityKey,
}
