/// Separator between the two participant ids of a conversation id.
/// User ids issued by the identity provider never contain it.
pub const SEPARATOR: &str = "__";

/// Canonical conversation id for an unordered pair of users.
///
/// The ids are sorted lexicographically and joined with [`SEPARATOR`], so
/// `build_conversation_id(a, b) == build_conversation_id(b, a)`.
pub fn build_conversation_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}{SEPARATOR}{second}")
}

/// Split a conversation id back into its participant pair.
///
/// Returns `None` unless the id holds exactly one separator with two
/// distinct, non-empty halves.
pub fn split_conversation_id(id: &str) -> Option<(&str, &str)> {
    let (a, b) = id.split_once(SEPARATOR)?;
    if a.is_empty() || b.is_empty() || a == b || b.contains(SEPARATOR) {
        return None;
    }
    Some((a, b))
}

/// The other participant of `id`, as seen from `uid`.
pub fn counterpart<'a>(id: &'a str, uid: &str) -> Option<&'a str> {
    let (a, b) = split_conversation_id(id)?;
    if a == uid {
        Some(b)
    } else if b == uid {
        Some(a)
    } else {
        None
    }
}
