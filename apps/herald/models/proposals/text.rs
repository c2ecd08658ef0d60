use lazy_static::lazy_static;
use regex::Regex;

/// Labels that commonly open the body of a governance proposal.
const SECTION_KEYWORDS: &str = r"(?:Abstract|Summary|Overview|TL;?DR|Introduction|Description|Proposal|Background|Context|Rationale|Motivation|Purpose)";

/// Summaries are capped at 277 characters so the trailing ellipsis lands the
/// text at 280.
const MAX_SUMMARY_CHARS: usize = 277;
/// A space is only used as the break point when it falls past this offset.
const MIN_BREAK_OFFSET: usize = 200;

lazy_static! {
    static ref SECTION_HEADER_LINE: Regex =
        Regex::new(&format!(r"(?im)^#{{1,6}}\s*{SECTION_KEYWORDS}\s*:?\s*$")).unwrap();
    static ref SECTION_LABEL_PREFIX: Regex =
        Regex::new(&format!(r"(?im)^{SECTION_KEYWORDS}\s*:\s*")).unwrap();
    static ref HEADER_MARKERS: Regex = Regex::new(r"#{1,6}\s+").unwrap();
    static ref EMPHASIS: Regex = Regex::new(r"\*{1,2}([^*]+)\*{1,2}").unwrap();
    static ref HTML_TAGS: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref MARKDOWN_LINKS: Regex = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n\s*\n").unwrap();
    static ref NEWLINE_RUNS: Regex = Regex::new(r"\n+").unwrap();
    static ref SPACE_RUNS: Regex = Regex::new(r"\s+").unwrap();
}

/// Recovers a prefixed form of the title, e.g. "WIP-42: Upgrade Guardians",
/// when the description opens with one. The API title often omits the
/// numbering prefix that the description carries. Falls back to `base_title`
/// when no prefixed form is found.
pub fn reconstruct_title(base_title: &str, description: &str) -> String {
    let pattern = format!(r"(?i)^([A-Z0-9\-\s]+:\s*{})", regex::escape(base_title));
    match Regex::new(&pattern) {
        Ok(re) => re
            .captures(description)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_else(|| base_title.to_string()),
        Err(_) => base_title.to_string(),
    }
}

/// Distills a proposal description into a single paragraph for the
/// announcement embed: drops the title and section labels, strips markdown
/// and HTML, collapses whitespace, then truncates. The ellipsis is appended
/// even when nothing was cut.
pub fn extract_summary(description: &str, title: &str) -> String {
    let text = description.trim().to_string();

    // The description usually repeats the title on its first line.
    let text = if text.starts_with(title) {
        drop_leading_chars(&text, title.chars().count())
    } else {
        text
    };
    let text = if text.to_lowercase().starts_with(&title.to_lowercase()) {
        drop_leading_chars(&text, title.chars().count())
    } else {
        text
    };

    // Any remaining line that still mentions the title is noise.
    let title_lower = title.to_lowercase();
    let text = text
        .split('\n')
        .filter(|line| !line.to_lowercase().contains(&title_lower))
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();

    let text = SECTION_HEADER_LINE.replace_all(text, "");
    let text = SECTION_LABEL_PREFIX.replace_all(&text, "");
    let text = HEADER_MARKERS.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "$1");
    let text = HTML_TAGS.replace_all(&text, "");
    let text = MARKDOWN_LINKS.replace_all(&text, "$1");
    let text = BLANK_LINES.replace_all(&text, "\n");
    let text = NEWLINE_RUNS.replace_all(&text, " ");
    let text = SPACE_RUNS.replace_all(&text, " ");

    truncate_with_ellipsis(text.trim())
}

/// Drops the first `count` characters and trims surrounding whitespace.
fn drop_leading_chars(text: &str, count: usize) -> String {
    text.chars().skip(count).collect::<String>().trim().to_string()
}

/// Keeps at most [`MAX_SUMMARY_CHARS`] characters, preferring to break at the
/// last space when that space falls past [`MIN_BREAK_OFFSET`].
fn truncate_with_ellipsis(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MAX_SUMMARY_CHARS {
        return format!("{text}...");
    }

    let window = &chars[..MAX_SUMMARY_CHARS];
    let cut = match window.iter().rposition(|&c| c == ' ') {
        Some(pos) if pos > MIN_BREAK_OFFSET => pos,
        _ => MAX_SUMMARY_CHARS,
    };
    let mut out: String = window[..cut].iter().collect();
    out.push_str("...");
    out
}
