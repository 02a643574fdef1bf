use std::collections::HashSet;

use ammonia::Builder;

/// Reduce comment content to plain text using the ammonia library.
///
/// Every tag is stripped; <script> and <style> lose their content as well. Comments are
/// stored and served as plain text (clients escape on render), so the entities ammonia
/// writes for the remaining text are decoded back. `Tom & Jerry: 1 < 2` round-trips
/// unchanged.
/// The result is trimmed; an empty string means nothing displayable was left.
pub fn clean_html(input: &str) -> String {
    let cleaned = Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(input)
        .to_string();

    decode_text_entities(&cleaned).trim().to_string()
}

/// Reverses the escaping html5ever applies to text nodes. `&amp;` goes last so an
/// escaped entity such as `&amp;lt;` decodes to the literal `&lt;` only once.
fn decode_text_entities(escaped: &str) -> String {
    escaped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
