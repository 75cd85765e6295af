/// Lines appended to a growing log between two full-text snapshots.
///
/// The feed is assumed to only grow, so this is a line-count suffix rather
/// than a content diff. A snapshot that is not longer than its predecessor
/// yields nothing, even when its head was trimmed away.
pub fn appended_lines<'a>(previous_text: &str, new_text: &'a str) -> Vec<&'a str> {
    if previous_text == new_text {
        return Vec::new();
    }

    let previous_line_count = previous_text.lines().count();
    let new_lines = new_text.lines().collect::<Vec<&str>>();

    if new_lines.len() <= previous_line_count {
        tracing::trace!(
            previous_line_count,
            new_line_count = new_lines.len(),
            "Snapshot did not grow; nothing appended"
        );
        return Vec::new();
    }

    new_lines.into_iter().skip(previous_line_count).collect()
}

#[cfg(test)]
mod tests {
    use super::appended_lines;

    #[test]
    fn identical_snapshots_yield_nothing() {
        let text = "[ALFA] Player1 (Leopard 2A6)\n[BRAVO] Player2 (T-90M)\n";

        assert!(appended_lines(text, text).is_empty());
        assert!(appended_lines("", "").is_empty());
    }

    #[test]
    fn empty_previous_yields_every_line() {
        let text = "first\nsecond\nthird";

        assert_eq!(appended_lines("", text), vec!["first", "second", "third"]);
    }

    #[test]
    fn yields_only_the_appended_suffix_in_order() {
        let previous = "first\nsecond\n";
        let current = "first\nsecond\nthird\nfourth\n";

        assert_eq!(appended_lines(previous, current), vec!["third", "fourth"]);
    }

    #[test]
    fn changed_content_with_same_line_count_yields_nothing() {
        assert!(appended_lines("first\nsecond", "first\nsecond!").is_empty());
    }

    #[test]
    fn trimmed_snapshot_yields_nothing() {
        assert!(appended_lines("a\nb\nc", "c").is_empty());
        assert!(appended_lines("first\nsecond\nthird", "new first").is_empty());
    }
}
