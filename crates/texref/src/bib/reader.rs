//! Minimal field reader for BibTeX records.
//!
//! Understands `@type{key, name = {value}, name = "value", name = bare}` with
//! nested braces. Anything fancier (`#` concatenation, `@string` expansion)
//! is kept as raw text. Only `title` and `author` are extracted. Common
//! accent macros (`{\"o}`, `\'e`, `\c{c}`, `\ss`, ...) become Unicode.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::{BibRecord, RecordError, RecordSource};

static RECORD_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*@([A-Za-z]+)[ \t]*\{").expect("valid record head pattern")
});

/// `\"o`, `\'{e}`, `` \`a `` ...
static SYMBOL_ACCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\(["'`^~])\{?([A-Za-z])\}?"#).expect("valid accent pattern")
});

/// `\c{c}`, `\v s` ...
static LETTER_ACCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\([cv])(?:\{([A-Za-z])\}|\s+([A-Za-z]))").expect("valid accent pattern")
});

/// `\ss`, `\o`, `\aa` ...
static SPECIAL_LETTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(ss|ae|AE|oe|OE|aa|AA|o|O|l|L)\b\s?").expect("valid letter pattern")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct BracedFieldReader;

impl BracedFieldReader {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSource for BracedFieldReader {
    fn read_records(&self, _path: &Path, content: &str) -> Vec<Result<BibRecord, RecordError>> {
        let heads: Vec<(usize, usize, String)> = RECORD_HEAD
            .captures_iter(content)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let entry_type = caps.get(1)?;
                Some((entry_type.start() - 1, whole.end(), entry_type.as_str().to_string()))
            })
            .collect();

        let mut records = Vec::with_capacity(heads.len());
        for (i, (at, body_start, entry_type)) in heads.iter().enumerate() {
            // A record may not run into the next record head
            let region_end = heads.get(i + 1).map(|h| h.0).unwrap_or(content.len());
            records.push(read_record(content, *at, *body_start, region_end, entry_type));
        }
        records
    }
}

fn read_record(
    content: &str,
    at: usize,
    body_start: usize,
    region_end: usize,
    entry_type: &str,
) -> Result<BibRecord, RecordError> {
    let head_line = line_of(content, at);
    let region = &content[body_start..region_end];

    let body_len = match closing_brace(region) {
        Some(len) => len,
        None => {
            return Err(RecordError {
                line: head_line,
                reason: "unbalanced braces".to_string(),
            })
        }
    };
    let body = &region[..body_len];

    // Key: everything before the first `,` (or `=` for @string definitions)
    let key_end = body.find([',', '=']).unwrap_or(body.len());
    let raw_key = &body[..key_end];
    let key = raw_key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(RecordError {
            line: head_line,
            reason: "missing citation key".to_string(),
        });
    }
    let key_offset = body_start + (raw_key.len() - raw_key.trim_start().len());

    let mut record = BibRecord {
        entry_type: entry_type.to_string(),
        key: key.to_string(),
        line: line_of(content, key_offset),
        column: column_of(content, key_offset),
        ..BibRecord::default()
    };

    if body[key_end..].starts_with(',') {
        for (name, value) in fields(&body[key_end + 1..]) {
            match name.as_str() {
                "title" => record.title = Some(clean(&value)),
                "author" => {
                    record.authors = clean(&value)
                        .split(" and ")
                        .map(|a| a.trim().to_string())
                        .filter(|a| !a.is_empty())
                        .collect();
                }
                _ => {}
            }
        }
    }

    Ok(record)
}

/// Byte length of `region` up to (not including) the brace closing the record.
fn closing_brace(region: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut escaped = false;
    for (i, c) in region.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// `name = value` pairs of a record body, names lowercased.
fn fields(body: &str) -> Vec<(String, String)> {
    let chars: Vec<char> = body.chars().collect();
    let mut fields = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == ',') {
            i += 1;
        }
        let name_start = i;
        while i < chars.len() && chars[i] != '=' && chars[i] != ',' {
            i += 1;
        }
        if i >= chars.len() || chars[i] == ',' {
            continue;
        }
        let name: String = chars[name_start..i].iter().collect();
        i += 1; // '='
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        let mut depth = 0usize;
        let mut in_quotes = false;
        while i < chars.len() {
            let c = chars[i];
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '"' if depth == 0 => in_quotes = !in_quotes,
                ',' if depth == 0 && !in_quotes => break,
                _ => {}
            }
            value.push(c);
            i += 1;
        }
        fields.push((name.trim().to_lowercase(), value.trim().to_string()));
    }
    fields
}

/// Convert accents, strip delimiters and grouping braces, collapse whitespace.
fn clean(value: &str) -> String {
    let value = to_unicode(value);
    let stripped: String = value.chars().filter(|c| *c != '{' && *c != '}' && *c != '"').collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace the accent macros we know; anything else is left untouched.
fn to_unicode(value: &str) -> String {
    let value = SYMBOL_ACCENT.replace_all(value, |caps: &regex::Captures| {
        accent_or_raw(&caps[0], &caps[1], &caps[2])
    });
    let value = LETTER_ACCENT.replace_all(&value, |caps: &regex::Captures| {
        let letter = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        accent_or_raw(&caps[0], &caps[1], letter)
    });
    SPECIAL_LETTER
        .replace_all(&value, |caps: &regex::Captures| {
            match &caps[1] {
                "ss" => "ß",
                "ae" => "æ",
                "AE" => "Æ",
                "oe" => "œ",
                "OE" => "Œ",
                "aa" => "å",
                "AA" => "Å",
                "o" => "ø",
                "O" => "Ø",
                "l" => "ł",
                _ => "Ł",
            }
            .to_string()
        })
        .into_owned()
}

fn accent_or_raw(raw: &str, accent: &str, letter: &str) -> String {
    let accent = accent.chars().next();
    let letter = letter.chars().next();
    match (accent, letter) {
        (Some(accent), Some(letter)) => accented(accent, letter)
            .map(String::from)
            .unwrap_or_else(|| raw.to_string()),
        _ => raw.to_string(),
    }
}

fn accented(accent: char, letter: char) -> Option<char> {
    let (plain, marked) = match accent {
        '"' => ("aeiouyAEIOU", "äëïöüÿÄËÏÖÜ"),
        '\'' => ("aeiouyAEIOUYcnsz", "áéíóúýÁÉÍÓÚÝćńśź"),
        '`' => ("aeiouAEIOU", "àèìòùÀÈÌÒÙ"),
        '^' => ("aeiouAEIOU", "âêîôûÂÊÎÔÛ"),
        '~' => ("anoANO", "ãñõÃÑÕ"),
        'c' => ("cCsS", "çÇşŞ"),
        'v' => ("cCsSzZrReE", "čČšŠžŽřŘěĚ"),
        _ => return None,
    };
    let index = plain.chars().position(|c| c == letter)?;
    marked.chars().nth(index)
}

fn line_of(content: &str, offset: usize) -> u32 {
    content[..offset].matches('\n').count() as u32 + 1
}

fn column_of(content: &str, offset: usize) -> u32 {
    let line_start = content[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    (offset - line_start) as u32
}
