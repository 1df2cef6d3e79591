//! Markup and whitespace normalization applied to decoded text.

use once_cell::sync::Lazy;
use regex::Regex;

static LINE_BREAK_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[nl\]").expect("line break token pattern"));
static HYPHEN_JOIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-[ \t]*\n[ \t]*").expect("hyphen join pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("space run pattern"));
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("paragraph pattern"));

const COLOURS: [(char, &str); 3] = [('R', "red"), ('G', "green"), ('B', "blue")];

/// Colour and emphasis rewrites, applied in order before line handling.
static MARKUP_RULES: Lazy<Vec<(Regex, String)>> = Lazy::new(|| {
    let mut rules = vec![(
        Regex::new(r"@([^@]*)@").expect("emphasis pattern"),
        "<b>$1</b>".to_string(),
    )];
    for (letter, class) in COLOURS {
        rules.push((
            Regex::new(&format!(r"(?s)\^{letter}([^\^]*?)\^K")).expect("colour span pattern"),
            format!(r#"<span class="{class}">$1</span>"#),
        ));
    }
    for (letter, class) in COLOURS {
        rules.push((
            Regex::new(&format!(r"(?m)^\^{letter}\^(.*)$")).expect("colour line pattern"),
            format!(r#"<span class="{class}">$1</span>"#),
        ));
    }
    rules
});

/// Unifies line endings and expands the explicit `[nl]` token.
pub fn unify_line_breaks(text: &str) -> String {
    let unix = text.replace("\r\n", "\n").replace('\r', "\n");
    LINE_BREAK_TOKEN.replace_all(&unix, "\n").into_owned()
}

/// Removes a trailing hyphen together with the line break it splits a word across.
pub fn join_hyphenated(text: &str) -> String {
    HYPHEN_JOIN.replace_all(text, "").into_owned()
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Normalization for question, answer and advice text.
pub fn normalize_inline(text: &str) -> String {
    collapse_whitespace(&join_hyphenated(&unify_line_breaks(text)))
}

/// Full display normalization for comment and regulation bodies.
pub fn normalize_markup(text: &str) -> String {
    let mut text = unify_line_breaks(text);
    for (pattern, replacement) in MARKUP_RULES.iter() {
        text = pattern.replace_all(&text, replacement.as_str()).into_owned();
    }
    let text = join_hyphenated(&text);

    PARAGRAPH_BREAK
        .split(&text)
        .map(|paragraph| {
            let single_line = paragraph.replace('\n', " ");
            SPACES.replace_all(&single_line, " ").trim().to_string()
        })
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphenated_words_are_rejoined() {
        assert_eq!(join_hyphenated("pedes-\n  trian"), "pedestrian");
        assert_eq!(join_hyphenated("a - b"), "a - b");
    }

    #[test]
    fn inline_text_collapses_all_whitespace() {
        assert_eq!(normalize_inline("  What  is\r\n X?\t"), "What is X?");
        assert_eq!(normalize_inline("cross-[nl]ing"), "crossing");
    }

    #[test]
    fn emphasis_and_colour_spans() {
        assert_eq!(normalize_markup("@Stop@ here"), "<b>Stop</b> here");
        assert_eq!(
            normalize_markup("a ^Rred^K b ^Ggreen^K"),
            r#"a <span class="red">red</span> b <span class="green">green</span>"#
        );
    }

    #[test]
    fn colour_line_prefixes_cover_the_line() {
        assert_eq!(
            normalize_markup("^B^Whole line\nnext"),
            r#"<span class="blue">Whole line</span> next"#
        );
    }

    #[test]
    fn soft_breaks_collapse_and_paragraphs_survive() {
        assert_eq!(
            normalize_markup("first  line\nsame para\n\n  second\n\n\n third"),
            "first line same para\nsecond\nthird"
        );
    }
}
