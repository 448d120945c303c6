use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static KEYWORD_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:size|aspect_ratio|比例)\s*[:=\s：]?\s*([0-9]+[:/x][0-9]+)\b")
        .expect("keyword directive pattern is valid")
});

static BARE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([0-9]+)[:/x]([0-9]+)\b").expect("bare directive pattern is valid")
});

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern is valid"));

/// Upper bound (exclusive) for either side of a bare `WxH` token.
const MAX_BARE_DIMENSION: u32 = 5000;

/// A size directive found in free text: the byte span to strip and the token to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub span: Range<usize>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub prompt: String,
    pub size: Option<String>,
}

/// Last labelled directive such as `size: 16:9`, `aspect_ratio=3/2` or `比例：9:16`.
pub fn find_keyword_directive(text: &str) -> Option<Directive> {
    KEYWORD_DIRECTIVE.captures_iter(text).last().and_then(|caps| {
        let whole = caps.get(0)?;
        let value = caps.get(1)?;
        Some(Directive {
            span: whole.range(),
            value: value.as_str().to_string(),
        })
    })
}

/// Last unlabelled `W:H`, `W/H` or `WxH` token whose sides are both in `1..5000`.
pub fn find_bare_directive(text: &str) -> Option<Directive> {
    BARE_DIRECTIVE
        .captures_iter(text)
        .filter(|caps| {
            let side_ok = |idx| {
                caps.get(idx)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .map_or(false, |n| n > 0 && n < MAX_BARE_DIMENSION)
            };
            side_ok(1) && side_ok(2)
        })
        .last()
        .and_then(|caps| {
            let whole = caps.get(0)?;
            Some(Directive {
                span: whole.range(),
                value: whole.as_str().to_string(),
            })
        })
}

fn strip_directive(text: &str, directive: &Directive) -> String {
    let mut remaining = String::with_capacity(text.len());
    remaining.push_str(&text[..directive.span.start]);
    remaining.push_str(&text[directive.span.end..]);
    WHITESPACE_RUN.replace_all(&remaining, " ").trim().to_string()
}

/// Pulls a size directive out of a chat message. The keyword pass wins over the
/// bare pass; within a pass the last occurrence wins. Text without a directive
/// is returned untouched.
pub fn extract(text: &str) -> Extraction {
    match find_keyword_directive(text).or_else(|| find_bare_directive(text)) {
        Some(directive) => Extraction {
            prompt: strip_directive(text, &directive),
            size: Some(directive.value),
        },
        None => Extraction {
            prompt: text.to_string(),
            size: None,
        },
    }
}
