use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Sortable base32 alphabet: ascii order matches digit order.
const S32: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

const TID_LEN: usize = 13;
const CLOCK_BITS: u32 = 10;
const CLOCK_MASK: u64 = (1 << CLOCK_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << 53) - 1;

/// Time-ordered identifier.
///
/// Layout (most significant first): one zero bit, 53 bits of microseconds
/// since the UNIX epoch, 10 bits of clock id. The string form is 13
/// characters of sortable base32, so lexicographic order of the strings
/// equals chronological order of the identifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tid(u64);

impl Tid {
    /// Build a TID from a microsecond timestamp and a clock id.
    pub fn new(timestamp_us: u64, clock_id: u16) -> Self {
        Self(((timestamp_us & TIMESTAMP_MASK) << CLOCK_BITS) | (clock_id as u64 & CLOCK_MASK))
    }

    /// Mint the next TID from the process-wide clock.
    pub fn next() -> Self {
        static CLOCK: OnceLock<TidClock> = OnceLock::new();
        CLOCK.get_or_init(TidClock::random).next()
    }

    /// Microseconds since the UNIX epoch.
    pub fn timestamp(&self) -> u64 {
        self.0 >> CLOCK_BITS
    }

    pub fn clock_id(&self) -> u16 {
        (self.0 & CLOCK_MASK) as u16
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Strict chronological precedence.
    pub fn older_than(&self, other: &Tid) -> bool {
        self.0 < other.0
    }

    pub fn newer_than(&self, other: &Tid) -> bool {
        self.0 > other.0
    }

    /// Comparator sorting oldest first.
    pub fn oldest_first(a: &Tid, b: &Tid) -> Ordering {
        a.cmp(b)
    }

    /// Comparator sorting newest first.
    pub fn newest_first(a: &Tid, b: &Tid) -> Ordering {
        b.cmp(a)
    }

    fn encode(&self) -> String {
        let mut out = [0u8; TID_LEN];
        let mut n = self.0;
        for slot in out.iter_mut().rev() {
            *slot = S32[(n & 31) as usize];
            n >>= 5;
        }
        out.iter().map(|&b| b as char).collect()
    }

    fn decode(s: &str) -> Result<Self, TypeError> {
        if s.len() != TID_LEN {
            return Err(TypeError::InvalidTid(format!(
                "expected {TID_LEN} characters, got {}",
                s.len()
            )));
        }
        let mut value: u64 = 0;
        for (i, byte) in s.bytes().enumerate() {
            let digit = S32
                .iter()
                .position(|&c| c == byte)
                .ok_or_else(|| TypeError::InvalidTid(format!("invalid character in {s:?}")))?
                as u64;
            // The leading character only carries three bits; the top bit must stay clear.
            if i == 0 && digit >= 8 {
                return Err(TypeError::InvalidTid(format!("out of range: {s:?}")));
            }
            value = (value << 5) | digit;
        }
        Ok(Self(value))
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({})", self.encode())
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Tid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Tid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Tid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Monotonic TID source.
///
/// Uses the wall clock in microseconds. When the clock has not advanced (or
/// went backwards) since the last TID, the previous timestamp is bumped by
/// one microsecond, so every returned TID is strictly newer than the last.
/// Safe for concurrent use via an internal [`Mutex`].
pub struct TidClock {
    clock_id: u16,
    last_us: Mutex<u64>,
}

impl TidClock {
    pub fn new(clock_id: u16) -> Self {
        Self {
            clock_id: clock_id & CLOCK_MASK as u16,
            last_us: Mutex::new(0),
        }
    }

    /// A clock with a random 10-bit clock id.
    pub fn random() -> Self {
        Self::new(rand::random::<u16>())
    }

    pub fn clock_id(&self) -> u16 {
        self.clock_id
    }

    /// Generate a TID strictly newer than any previously returned by this clock.
    pub fn next(&self) -> Tid {
        let wall = Self::wall_clock_us();
        let mut last = self.last_us.lock().expect("tid clock mutex poisoned");
        let timestamp = if wall > *last { wall } else { *last + 1 };
        *last = timestamp;
        Tid::new(timestamp, self.clock_id)
    }

    fn wall_clock_us() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl fmt::Debug for TidClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TidClock")
            .field("clock_id", &self.clock_id)
            .finish()
    }
}
