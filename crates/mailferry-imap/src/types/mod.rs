//! Protocol data types.

mod codes;
mod flags;
mod mailbox;
mod sequence;

use std::fmt;
use std::num::NonZeroU32;

pub use codes::{Capability, ResponseCode};
pub use flags::{Flag, Flags};
pub use mailbox::{ListResponse, Mailbox, MailboxAttribute, MailboxStatus, decode_modified_utf7};
pub use sequence::UidSet;

/// Tag of a command and of its completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Wraps `tag`.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! nonzero_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub NonZeroU32);

        impl $name {
            /// `None` for 0, which the protocol never assigns.
            #[must_use]
            pub const fn new(n: u32) -> Option<Self> {
                match NonZeroU32::new(n) {
                    Some(n) => Some(Self(n)),
                    None => None,
                }
            }

            /// The numeric value.
            #[must_use]
            pub const fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

nonzero_id! {
    /// Message UID, stable within one mailbox for one [`UidValidity`].
    Uid
}

nonzero_id! {
    /// Mailbox UIDVALIDITY. A change invalidates every UID seen before.
    UidValidity
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_an_id() {
        assert!(Uid::new(0).is_none());
        assert!(UidValidity::new(0).is_none());
        assert_eq!(Uid::new(123).unwrap().get(), 123);
    }

    #[test]
    fn uids_order_numerically() {
        assert!(Uid::new(5).unwrap() < Uid::new(40).unwrap());
        assert_eq!(Uid::new(40).unwrap().to_string(), "40");
    }
}
