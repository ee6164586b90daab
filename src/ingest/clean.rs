// src/ingest/clean.rs
//! Article text cleanup ahead of chunking.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Phrases that mark newsletter/legal boilerplate. Each match is removed
/// together with the rest of its line.
const BOILERPLATE: &[&str] = &[
    r"subscribe to.*newsletter",
    r"sign up for.*alerts",
    r"click here to",
    r"read more at",
    r"follow us on",
    r"share this article",
    r"copyright \d{4}",
    r"all rights reserved",
    r"terms of (use|service)",
    r"privacy policy",
    r"cookie (policy|settings)",
];

const HEADLINE_MAX_CHARS: usize = 200;

struct Patterns {
    tags: Regex,
    urls: Regex,
    control: Regex,
    blanks: Regex,
    newlines: Regex,
    ws_lines: Regex,
    boilerplate: Regex,
}

fn patterns() -> &'static Patterns {
    static RE: OnceCell<Patterns> = OnceCell::new();
    RE.get_or_init(|| {
        let joined = BOILERPLATE.join("|");
        Patterns {
            tags: Regex::new(r"<[^>]+>").expect("tags regex"),
            urls: Regex::new(r"https?://\S+").expect("url regex"),
            control: Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\x{9F}]").expect("control regex"),
            blanks: Regex::new(r"[ \t]+").expect("blanks regex"),
            newlines: Regex::new(r"\n{3,}").expect("newlines regex"),
            ws_lines: Regex::new(r"(?m)^[ \t]+$").expect("ws-lines regex"),
            boilerplate: Regex::new(&format!(r"(?i)(?:{joined})[^\n]*"))
                .expect("boilerplate regex"),
        }
    })
}

/// Clean raw article text: decode entities, strip tags, URLs and control
/// characters, fold blanks, drop boilerplate lines. Never fails; empty in,
/// empty out.
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let p = patterns();

    let out = html_escape::decode_html_entities(text).to_string();
    let out = p.tags.replace_all(&out, " ");
    let out = p.urls.replace_all(&out, "");
    let out = p.control.replace_all(&out, "");
    let out = p.blanks.replace_all(&out, " ");
    let out = p.newlines.replace_all(&out, "\n\n");
    let out = p.ws_lines.replace_all(&out, "");
    let out = p.boilerplate.replace_all(&out, "");

    out.trim().to_string()
}

/// First line of `text`, capped at 200 chars (with `...` appended when cut).
pub fn extract_headline(text: &str) -> String {
    let first = text.split('\n').next().unwrap_or_default().trim();
    if first.chars().count() > HEADLINE_MAX_CHARS {
        let mut cut: String = first.chars().take(HEADLINE_MAX_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        first.to_string()
    }
}
