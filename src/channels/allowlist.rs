//! Sender allowlist.

use std::collections::HashSet;

/// Set of sender IDs authorized to talk to a channel.
///
/// Membership is an exact string match. An empty allowlist is the distinct
/// "allow everyone" state, not "allow no one".
///
/// # Example
///
/// ```
/// use clawgate::channels::Allowlist;
///
/// let open = Allowlist::default();
/// assert!(open.is_allowed("anyone"));
///
/// let closed = Allowlist::new(vec!["u1".to_string()]);
/// assert!(closed.is_allowed("u1"));
/// assert!(!closed.is_allowed("u2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    ids: HashSet<String>,
}

impl Allowlist {
    /// Builds an allowlist from configured sender IDs.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// True iff the allowlist is empty or contains `sender_id`.
    pub fn is_allowed(&self, sender_id: &str) -> bool {
        self.ids.is_empty() || self.ids.contains(sender_id)
    }

    /// True when every sender is allowed.
    pub fn is_open(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of explicitly allowed senders.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Same as [`Allowlist::is_open`].
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl From<Vec<String>> for Allowlist {
    fn from(ids: Vec<String>) -> Self {
        Self::new(ids)
    }
}

impl From<&[String]> for Allowlist {
    fn from(ids: &[String]) -> Self {
        Self::new(ids.iter().cloned())
    }
}
