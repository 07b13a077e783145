//! Notification kinds reported for a watched path
//!
//! Bit values match the kqueue `NOTE_*` vnode flags, so the kqueue backend
//! passes them through untouched. Other backends translate.

use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

bitflags! {
    /// Set of change kinds armed for, or reported on, a watched path
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Notification: u32 {
        /// The target was unlinked
        const DELETE = 0x0000_0001;
        /// The target's contents (or a directory's entries) changed
        const WRITE = 0x0000_0002;
        /// The target grew
        const EXTEND = 0x0000_0004;
        /// Attributes (mode, owner, times) changed
        const ATTRIB = 0x0000_0008;
        /// Link count changed
        const LINK = 0x0000_0010;
        /// The target was renamed
        const RENAME = 0x0000_0020;
        /// Access was revoked or the volume unmounted
        const REVOKE = 0x0000_0040;
        /// An advisory lock was released (Apple only)
        const FUNLOCK = 0x0000_0100;
        /// A lease downgrade was requested (Apple only)
        const LEASE_DOWNGRADE = 0x0000_0200;
        /// A lease release was requested (Apple only)
        const LEASE_RELEASE = 0x0000_0400;
    }
}

/// Kind names, in bit order
const KINDS: [(Notification, &str); 10] = [
    (Notification::DELETE, "delete"),
    (Notification::WRITE, "write"),
    (Notification::EXTEND, "extend"),
    (Notification::ATTRIB, "attrib"),
    (Notification::LINK, "link"),
    (Notification::RENAME, "rename"),
    (Notification::REVOKE, "revoke"),
    (Notification::FUNLOCK, "funlock"),
    (Notification::LEASE_DOWNGRADE, "lease-downgrade"),
    (Notification::LEASE_RELEASE, "lease-release"),
];

impl Notification {
    /// Kinds only some kernels can report
    pub const PLATFORM_LIMITED: Self = Self::FUNLOCK
        .union(Self::LEASE_DOWNGRADE)
        .union(Self::LEASE_RELEASE);

    /// Everything except `LINK` and the platform-limited kinds
    pub const DEFAULT: Self = Self::DELETE
        .union(Self::WRITE)
        .union(Self::EXTEND)
        .union(Self::ATTRIB)
        .union(Self::RENAME)
        .union(Self::REVOKE);

    /// Every kind the current platform can report
    ///
    /// Note that the bitflags-generated `all()` includes the platform-limited
    /// kinds regardless of target; arm `SUPPORTED` instead.
    #[cfg(target_vendor = "apple")]
    pub const SUPPORTED: Self = Self::all();

    /// Every kind the current platform can report
    ///
    /// Note that the bitflags-generated `all()` includes the platform-limited
    /// kinds regardless of target; arm `SUPPORTED` instead.
    #[cfg(not(target_vendor = "apple"))]
    pub const SUPPORTED: Self = Self::all().difference(Self::PLATFORM_LIMITED);

    /// True if every kind in the set can be armed on this platform
    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    /// Kinds in the set that this platform cannot arm
    pub fn unsupported(self) -> Self {
        self.difference(Self::SUPPORTED)
    }

    /// Parse a list of kind names or presets into one set
    ///
    /// Accepts the names printed by `Display` plus the presets `default`
    /// and `all` (the supported set).
    pub fn parse_list<I, S>(names: I) -> Result<Self, ParseNotificationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .try_fold(Self::empty(), |set, name| -> Result<Self, ParseNotificationError> {
                Ok(set | name.as_ref().parse::<Self>()?)
            })
    }

    /// Look up one lowercase kind name or preset
    ///
    /// Distinct from the bitflags-generated `from_name`, which only knows the
    /// uppercase constant names.
    pub fn from_kind_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::DEFAULT),
            "all" => Some(Self::SUPPORTED),
            "none" => Some(Self::empty()),
            _ => KINDS
                .iter()
                .find(|(_, kind_name)| *kind_name == name)
                .map(|(kind, _)| *kind),
        }
    }
}

impl Default for Notification {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = KINDS
            .iter()
            .filter(|(kind, _)| self.contains(*kind))
            .map(|(_, name)| *name)
            .peekable();

        if names.peek().is_none() {
            return f.write_str("none");
        }

        for (i, name) in names.enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// Error returned when a kind name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown notification kind `{0}`")]
pub struct ParseNotificationError(pub String);

impl FromStr for Notification {
    type Err = ParseNotificationError;

    /// Parses `write`, `write|extend` or `write, extend`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(|c: char| c == '|' || c == ',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .try_fold(Self::empty(), |set, part| -> Result<Self, Self::Err> {
                let kind = Self::from_kind_name(&part.to_ascii_lowercase())
                    .ok_or_else(|| ParseNotificationError(part.to_string()))?;
                Ok(set | kind)
            })
    }
}
