//! Command tags.

/// Hands out `A0001`, `A0002`, ... for one connection.
///
/// The counter wraps at `u32::MAX`; commands are never pipelined, so a tag
/// only has to differ from the previous one.
#[derive(Debug, Clone, Default)]
pub struct TagGenerator {
    issued: u32,
}

impl TagGenerator {
    /// Returns the next tag.
    pub fn next_tag(&mut self) -> String {
        self.issued = self.issued.wrapping_add(1);
        format!("A{:04}", self.issued)
    }
}
