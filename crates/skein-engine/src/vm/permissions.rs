//! Permission flags gating creation of concurrency primitives
//!
//! | Flag           | Name            | Legacy alias  | Gates                                   |
//! |----------------|-----------------|---------------|-----------------------------------------|
//! | `CONCURRENCY`  | `concurrency`   | `sync`        | launch, channels, select, wait groups, timers |
//! | `CREATE_MUTEX` | `create-mutex`  | `createMutex` | `sync.newMutex`                         |
//! | `TRUSTED`      | `trusted`       |               | `sync.newWorker`; implies every flag    |
//!
//! Permissions are granted to a program and checked when a primitive is
//! created, never on later use of the primitive.

/// Permission flags (bitflags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permission(u8);

impl Permission {
    /// Nothing granted
    pub const NONE: Self = Self(0x00);
    /// Launch tasks, create channels, wait groups, tickers and timers
    pub const CONCURRENCY: Self = Self(0x01);
    /// Create mutexes
    pub const CREATE_MUTEX: Self = Self(0x02);
    /// Elevated access; implies every other permission
    pub const TRUSTED: Self = Self(0x80);

    /// Every flag
    pub const ALL: Self = Self(0x83);

    /// Create from raw bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Get raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check if all flags of `other` are present
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of permissions
    pub const fn union(&self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check whether this set allows `required`
    ///
    /// `TRUSTED` implies every other permission, but nothing implies
    /// `TRUSTED` except itself.
    pub const fn allows(&self, required: Self) -> bool {
        self.contains(required) || (required.0 != Self::TRUSTED.0 && self.contains(Self::TRUSTED))
    }

    /// Parse a single permission name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "concurrency" | "sync" => Some(Self::CONCURRENCY),
            "create-mutex" | "createMutex" => Some(Self::CREATE_MUTEX),
            "trusted" => Some(Self::TRUSTED),
            _ => None,
        }
    }

    /// Parse a space or comma separated list of names
    ///
    /// Returns the first unknown name on failure.
    pub fn parse_list(list: &str) -> Result<Self, String> {
        list.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .try_fold(Self::NONE, |acc, name| {
                Self::from_name(name)
                    .map(|p| acc.union(p))
                    .ok_or_else(|| name.to_string())
            })
    }

    /// Canonical name of a single flag
    pub fn name(&self) -> &'static str {
        match *self {
            Self::NONE => "none",
            Self::CONCURRENCY => "concurrency",
            Self::CREATE_MUTEX => "create-mutex",
            Self::TRUSTED => "trusted",
            _ => "mixed",
        }
    }
}

impl std::ops::BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}
