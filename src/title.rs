//! Tile titles.
//!
//! A section's explicit name wins. Without one, the title comes from the
//! summary HTML: the first `<h1>`..`<h6>` element, else the first `<p>`,
//! with tags stripped, common entities decoded and whitespace collapsed.
//! Titles longer than [`MAX_TITLE_CHARS`] are cut at a word boundary and
//! end in [`ELLIPSIS`].

/// Longest title a tile shows, in characters.
pub const MAX_TITLE_CHARS: usize = 40;

/// Appended to truncated titles.
pub const ELLIPSIS: &str = "...";

/// Title for a section tile.
pub fn derive_title(name: &str, summary: &str, number: u32) -> String {
    let name = collapse_whitespace(name);
    let text = if !name.is_empty() {
        name
    } else {
        summary_text(summary).unwrap_or_default()
    };
    if text.is_empty() {
        return format!("Section {number}");
    }
    truncate(&text, MAX_TITLE_CHARS)
}

/// Text of the first heading, else the first non-blank paragraph.
pub fn summary_text(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let heading = (1..=6)
        .filter_map(|level| {
            let tag = format!("h{level}");
            find_element(html, &lower, &tag)
        })
        .min_by_key(|(start, _)| *start)
        .map(|(_, text)| text);
    heading.or_else(|| {
        let mut from = 0;
        while let Some((start, text)) = find_element(&html[from..], &lower[from..], "p") {
            if !text.is_empty() {
                return Some(text);
            }
            from += start + 2;
        }
        None
    })
}

/// First `<tag ...>...</tag>` in `html`, as (byte offset, cleaned text).
///
/// `lower` is the ASCII-lowercased copy of `html`; byte offsets match
/// because lowercasing ASCII never changes lengths.
fn find_element(html: &str, lower: &str, tag: &str) -> Option<(usize, String)> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut search = 0;
    while let Some(found) = lower[search..].find(&open) {
        let start = search + found;
        let after = start + open.len();
        // `<p` must not match `<pre>` or `<param>`
        match lower.as_bytes().get(after) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {}
            _ => {
                search = after;
                continue;
            }
        }
        let body_start = after + lower[after..].find('>')? + 1;
        let body_end = body_start + lower[body_start..].find(&close)?;
        let text = clean_text(&html[body_start..body_end]);
        return Some((start, text));
    }
    None
}

/// Strip tags, decode entities, collapse whitespace.
pub fn clean_text(html: &str) -> String {
    collapse_whitespace(&decode_entities(&strip_tags(html)))
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Tags separate words: `a<br>b` reads as "a b"
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    const ENTITIES: [(&str, &str); 7] = [
        ("&nbsp;", " "),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&amp;", "&"),
    ];
    let mut out = text.to_string();
    for (entity, replacement) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max` characters including the ellipsis.
///
/// Prefers the last word boundary that fits; a single overlong word is cut
/// hard.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(ELLIPSIS.len());
    let hard: String = text.chars().take(budget).collect();
    let next_is_space = text.chars().nth(budget).is_some_and(char::is_whitespace);
    let cut = if next_is_space {
        hard.trim_end()
    } else {
        match hard.rfind(' ') {
            Some(i) if i > 0 => hard[..i].trim_end(),
            _ => hard.as_str(),
        }
    };
    format!("{cut}{ELLIPSIS}")
}
