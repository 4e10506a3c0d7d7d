//! Message flags.

use std::fmt;

/// A system flag or a user keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Recent`, set by the server only.
    Recent,
    /// Keyword such as `$Forwarded`, as sent.
    Keyword(String),
}

const SYSTEM: [(Flag, &str); 6] = [
    (Flag::Seen, "\\Seen"),
    (Flag::Answered, "\\Answered"),
    (Flag::Flagged, "\\Flagged"),
    (Flag::Deleted, "\\Deleted"),
    (Flag::Draft, "\\Draft"),
    (Flag::Recent, "\\Recent"),
];

impl Flag {
    /// System flags match case-insensitively; anything else is a keyword.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        SYSTEM
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(atom))
            .map_or_else(|| Self::Keyword(atom.to_string()), |(flag, _)| flag.clone())
    }

    /// Wire spelling.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Keyword(keyword) => keyword,
            system => SYSTEM
                .iter()
                .find(|(flag, _)| flag == system)
                .map_or("", |(_, name)| name),
        }
    }

    /// True for flags APPEND may not set.
    #[must_use]
    pub const fn is_server_managed(&self) -> bool {
        matches!(self, Self::Recent)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags of one message, without duplicates, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags(Vec<Flag>);

impl Flags {
    /// No flags.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Drops repeats from `flags`.
    #[must_use]
    pub fn from_vec(flags: Vec<Flag>) -> Self {
        flags.into_iter().collect()
    }

    /// Adds `flag` unless present.
    pub fn insert(&mut self, flag: Flag) {
        if !self.contains(&flag) {
            self.0.push(flag);
        }
    }

    /// Removes `flag` if present.
    pub fn remove(&mut self, flag: &Flag) {
        self.0.retain(|f| f != flag);
    }

    /// Whether `flag` is set.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    /// The subset a client may pass to APPEND.
    #[must_use]
    pub fn settable(&self) -> Self {
        self.iter()
            .filter(|flag| !flag.is_server_managed())
            .cloned()
            .collect()
    }

    /// Iterates in first-seen order.
    pub fn iter(&self) -> std::slice::Iter<'_, Flag> {
        self.0.iter()
    }

    /// Count of distinct flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No flags set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = Self::new();
        iter.into_iter().for_each(|flag| flags.insert(flag));
        flags
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Flags {
    type Item = &'a Flag;
    type IntoIter = std::slice::Iter<'a, Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_flags_ignore_case() {
        assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
        assert_eq!(Flag::parse("\\recent"), Flag::Recent);
        assert_eq!(Flag::parse("$Important"), Flag::Keyword("$Important".into()));
        assert_eq!(Flag::Answered.as_str(), "\\Answered");
        assert_eq!(Flag::Keyword("$Label1".into()).to_string(), "$Label1");
    }

    #[test]
    fn set_semantics() {
        let mut flags = Flags::from_vec(vec![Flag::Seen, Flag::Draft, Flag::Seen]);
        assert_eq!(flags.len(), 2);
        flags.insert(Flag::Draft);
        assert_eq!(flags.len(), 2);
        flags.remove(&Flag::Seen);
        assert!(!flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Draft));
    }

    #[test]
    fn recent_cannot_be_appended() {
        let flags = Flags::from_vec(vec![
            Flag::Seen,
            Flag::Recent,
            Flag::Keyword("$Forwarded".into()),
        ]);
        let settable = flags.settable();
        assert_eq!(settable.len(), 2);
        assert!(!settable.contains(&Flag::Recent));
        assert!(settable.contains(&Flag::Keyword("$Forwarded".into())));
    }
}
