//! Text preparation for SSML requests.
//!
//! Input text is cleaned of control characters, XML-escaped, then split into
//! chunks that fit one request. Split points never land inside a UTF-8
//! sequence or inside an `&...;` entity produced by escaping.

use crate::core::tts::base::{TTSError, TTSResult};

/// Replaces control characters the service rejects with a space.
///
/// Tab, line feed and carriage return are kept.
pub fn remove_incompatible_characters(text: &str) -> String {
    text.chars()
        .map(|c| match c as u32 {
            0x00..=0x08 | 0x0B..=0x0C | 0x0E..=0x1F => ' ',
            _ => c,
        })
        .collect()
}

/// Escapes `&`, `<` and `>`. Quotes are left as they are.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Reverses [`escape`].
pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Splits `text` into trimmed, non-empty chunks of at most `byte_length`
/// bytes.
///
/// The returned iterator is lazy. Calling this function again starts over.
pub fn split_text_by_byte_length(text: &str, byte_length: usize) -> TextChunks<'_> {
    TextChunks {
        remaining: text,
        byte_length,
        failed: false,
    }
}

/// Iterator returned by [`split_text_by_byte_length`].
#[derive(Debug, Clone)]
pub struct TextChunks<'a> {
    remaining: &'a str,
    byte_length: usize,
    failed: bool,
}

impl<'a> Iterator for TextChunks<'a> {
    type Item = TTSResult<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            // A delimiter left at the front must not become a zero split point.
            self.remaining = self.remaining.trim_start();

            if self.remaining.len() <= self.byte_length {
                let chunk = self.remaining.trim();
                self.remaining = "";
                return (!chunk.is_empty()).then_some(Ok(chunk));
            }

            let bytes = self.remaining.as_bytes();
            let split_at = find_last_newline_or_space_within_limit(bytes, self.byte_length)
                .unwrap_or_else(|| find_safe_utf8_split_point(&bytes[..self.byte_length]));
            let split_at = adjust_split_point_for_xml_entity(bytes, split_at);

            if split_at == 0 {
                self.failed = true;
                return Some(Err(TTSError::InvalidConfiguration(format!(
                    "Maximum byte length ({}) is too small or text contains an entity or character that cannot be split",
                    self.byte_length
                ))));
            }

            // Every candidate split point is a char boundary: an ASCII
            // delimiter, the end of a valid UTF-8 prefix, or an '&'.
            let (head, tail) = self.remaining.split_at(split_at);
            self.remaining = tail;

            let chunk = head.trim();
            if !chunk.is_empty() {
                return Some(Ok(chunk));
            }
        }
    }
}

fn find_last_newline_or_space_within_limit(bytes: &[u8], limit: usize) -> Option<usize> {
    let window = &bytes[..limit];
    window
        .iter()
        .rposition(|&b| b == b'\n')
        .or_else(|| window.iter().rposition(|&b| b == b' '))
}

/// Largest index whose prefix decodes as complete UTF-8.
fn find_safe_utf8_split_point(segment: &[u8]) -> usize {
    let mut split_at = segment.len();
    while split_at > 0 {
        if std::str::from_utf8(&segment[..split_at]).is_ok() {
            return split_at;
        }
        split_at -= 1;
    }
    split_at
}

/// Moves the split point back to an `&` that is not closed by `;` before it.
fn adjust_split_point_for_xml_entity(bytes: &[u8], mut split_at: usize) -> usize {
    while split_at > 0 {
        let prefix = &bytes[..split_at];
        let Some(ampersand) = prefix.iter().rposition(|&b| b == b'&') else {
            break;
        };
        if prefix[ampersand..].contains(&b';') {
            break;
        }
        split_at = ampersand;
    }
    split_at
}
