//! UID sets for UID FETCH and UID SEARCH.

use super::Uid;

/// A set of UIDs in IMAP `sequence-set` syntax.
///
/// Contiguous runs are collapsed into ranges, so `[1, 2, 3, 7]` renders
/// as `1:3,7`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// Every message in the mailbox (`1:*`).
    All,
    /// Inclusive ranges, sorted and non-overlapping.
    Ranges(Vec<(Uid, Uid)>),
}

impl UidSet {
    /// Creates a set holding one UID.
    #[must_use]
    pub fn single(uid: Uid) -> Self {
        Self::Ranges(vec![(uid, uid)])
    }

    /// Builds a set from arbitrary UIDs. Returns `None` if `uids` is empty.
    #[must_use]
    pub fn from_uids(uids: &[Uid]) -> Option<Self> {
        let mut sorted = uids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut ranges: Vec<(Uid, Uid)> = Vec::new();
        for uid in sorted {
            match ranges.last_mut() {
                Some((_, end)) if end.get().checked_add(1) == Some(uid.get()) => *end = uid,
                _ => ranges.push((uid, uid)),
            }
        }

        if ranges.is_empty() {
            None
        } else {
            Some(Self::Ranges(ranges))
        }
    }
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "1:*"),
            Self::Ranges(ranges) => {
                for (i, (start, end)) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if start == end {
                        write!(f, "{start}")?;
                    } else {
                        write!(f, "{start}:{end}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn uids(values: &[u32]) -> Vec<Uid> {
        values.iter().map(|v| Uid::new(*v).unwrap()).collect()
    }

    #[test]
    fn collapses_runs() {
        let set = UidSet::from_uids(&uids(&[7, 1, 2, 3, 9, 10])).unwrap();
        assert_eq!(set.to_string(), "1:3,7,9:10");
    }

    #[test]
    fn dedups_input() {
        let set = UidSet::from_uids(&uids(&[4, 4, 4])).unwrap();
        assert_eq!(set.to_string(), "4");
    }

    #[test]
    fn empty_input_is_none() {
        assert!(UidSet::from_uids(&[]).is_none());
    }

    #[test]
    fn all_renders_star_range() {
        assert_eq!(UidSet::All.to_string(), "1:*");
    }
}
