//! Small helpers for working with dotted destination paths.

/// Join a parent destination path and a child segment. An empty parent
/// yields the bare segment, so root registrations don't grow a leading dot.
pub(crate) fn join_path(parent: &str, segment: &str) -> String {
    match parent.is_empty() {
        true => segment.to_owned(),
        false => format!("{parent}.{segment}"),
    }
}

/// The segments of a dotted destination path, left to right.
pub(crate) fn segments(path: &str) -> impl DoubleEndedIterator<Item = &str> {
    path.split('.').filter(|segment| !segment.is_empty())
}
