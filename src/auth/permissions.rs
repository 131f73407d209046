//! Space permissions
//!
//! A permission string is a set of single-character verb flags stored per
//! (space, user) pair. Only the flags below are recognised.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("unknown permission flag '{0}'")]
    UnknownFlag(char),
}

/// A single verb flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read messages in a space
    Read,
    /// Post messages to a space
    Write,
    /// Delete (moderate) messages in a space
    Delete,
}

impl Permission {
    pub const ALL: [Permission; 3] = [Permission::Read, Permission::Write, Permission::Delete];

    pub fn from_char(c: char) -> Result<Self, PermissionError> {
        match c {
            'r' => Ok(Permission::Read),
            'w' => Ok(Permission::Write),
            'd' => Ok(Permission::Delete),
            other => Err(PermissionError::UnknownFlag(other)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Delete => 'd',
        }
    }

    fn bit(self) -> u8 {
        match self {
            Permission::Read => 0b001,
            Permission::Write => 0b010,
            Permission::Delete => 0b100,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A set of permission flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PermissionSet {
    bits: u8,
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn all() -> Self {
        Permission::ALL.into_iter().collect()
    }

    /// Parse a permission string such as `"rw"`. Duplicates are allowed.
    pub fn parse(s: &str) -> Result<Self, PermissionError> {
        s.chars().map(Permission::from_char).collect()
    }

    pub fn insert(&mut self, permission: Permission) {
        self.bits |= permission.bit();
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.bits & permission.bit() != 0
    }

    /// True if every flag in `required` is present in `self`
    pub fn satisfies(&self, required: PermissionSet) -> bool {
        self.bits & required.bits == required.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        let mut set = PermissionSet::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for permission in self.iter() {
            write!(f, "{}", permission)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let set = PermissionSet::parse("dr").unwrap();
        assert!(set.contains(Permission::Read));
        assert!(!set.contains(Permission::Write));
        assert!(set.contains(Permission::Delete));
        // Canonical order
        assert_eq!(set.to_string(), "rd");
    }

    #[test]
    fn test_parse_rejects_unknown_flag() {
        assert_eq!(PermissionSet::parse("rx"), Err(PermissionError::UnknownFlag('x')));
    }

    #[test]
    fn test_empty_string_is_empty_set() {
        assert!(PermissionSet::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_satisfies() {
        let granted = PermissionSet::parse("r").unwrap();
        assert!(granted.satisfies(PermissionSet::parse("r").unwrap()));
        assert!(!granted.satisfies(PermissionSet::parse("w").unwrap()));
        assert!(!granted.satisfies(PermissionSet::parse("rwd").unwrap()));
        assert!(PermissionSet::all().satisfies(PermissionSet::parse("rwd").unwrap()));
        assert!(!PermissionSet::empty().satisfies(PermissionSet::parse("r").unwrap()));
    }
}
