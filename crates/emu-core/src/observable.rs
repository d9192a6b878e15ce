//! State inspection for debuggers and tests.
//!
//! Queries never affect emulation state: reading `sync` must not advance
//! the head, and reading `via2.ifr` must not clear a flag.

use std::collections::BTreeMap;
use std::fmt;

/// One observed value. Registers print in hex, counters in decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U64(u64),
}

impl Value {
    /// Widen any numeric value; flags read as 0 or 1.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        match self {
            Value::Bool(v) => u64::from(v),
            Value::U8(v) => u64::from(v),
            Value::U16(v) => u64::from(v),
            Value::U64(v) => v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v:#04X}"),
            Value::U16(v) => write!(f, "{v:#06X}"),
            Value::U64(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from!(bool => Bool, u8 => U8, u16 => U16, u64 => U64);

/// A component whose state can be inspected by path.
pub trait Observable {
    /// Query a property such as `track` or `via2.ifr`. `None` for unknown
    /// paths.
    fn query(&self, path: &str) -> Option<Value>;

    /// Every path accepted by [`query`](Self::query).
    fn query_paths(&self) -> &'static [&'static str];

    /// All paths and their current values, ordered by path.
    fn snapshot(&self) -> BTreeMap<&'static str, Value> {
        self.query_paths()
            .iter()
            .filter_map(|&path| self.query(path).map(|value| (path, value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        flag: bool,
        count: u64,
    }

    impl Observable for Pair {
        fn query(&self, path: &str) -> Option<Value> {
            match path {
                "flag" => Some(self.flag.into()),
                "count" => Some(self.count.into()),
                _ => None,
            }
        }

        fn query_paths(&self) -> &'static [&'static str] {
            &["flag", "count", "missing"]
        }
    }

    #[test]
    fn display_uses_hex_for_registers() {
        assert_eq!(Value::U8(0x1C).to_string(), "0x1C");
        assert_eq!(Value::U16(0xC000).to_string(), "0xC000");
        assert_eq!(Value::U64(42).to_string(), "42");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(true).as_u64(), 1);
    }

    #[test]
    fn snapshot_skips_unanswered_paths() {
        let snapshot = Pair {
            flag: false,
            count: 7,
        }
        .snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["count"], Value::U64(7));
        assert_eq!(snapshot["flag"], Value::Bool(false));
    }
}
