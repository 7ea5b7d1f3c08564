/// Normalizes untrusted display text taken from pages and feeds.
///
/// Drops control characters (including ANSI escape introducers) and collapses
/// every run of whitespace into a single space, trimming both ends. Titles in
/// the wild are frequently wrapped across lines or padded with tabs.
///
/// # Examples
///
/// ```
/// use feedfinder::util::clean_text;
///
/// assert_eq!(clean_text("  My\n\tBlog  "), "My Blog");
/// assert_eq!(clean_text("Evil\x1b Feed"), "Evil Feed");
/// ```
pub fn clean_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
