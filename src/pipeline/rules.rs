//! Blocklist matching.
//!
//! A sender is blocked when any blocklist fragment occurs anywhere in the
//! lower-cased `From` header text. Full addresses (`johnny@gmail.com`) and
//! fragments (`@gmail`, `johnny`) are both valid entries. There is no glob or
//! regex syntax, and display names take part in the match.

/// Return the first blocklist entry contained in `sender`, if any.
pub fn matching_entry<'a, S: AsRef<str>>(sender: &str, blocklist: &'a [S]) -> Option<&'a str> {
    let sender = sender.to_lowercase();
    blocklist
        .iter()
        .map(|entry| entry.as_ref())
        .filter(|entry| !entry.is_empty())
        .find(|entry| sender.contains(&entry.to_lowercase()))
}

/// Whether `sender` matches any blocklist entry.
pub fn matches<S: AsRef<str>>(sender: &str, blocklist: &[S]) -> bool {
    matching_entry(sender, blocklist).is_some()
}
