//! SRT rendering.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\n+").expect("valid regex"));

/// One subtitle cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitle {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub content: String,
}

impl Subtitle {
    pub fn new(index: usize, start: Duration, end: Duration, content: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            content: content.into(),
        }
    }

    /// Renders this cue as an SRT block ending with a blank line.
    pub fn to_srt(&self, eol: &str) -> String {
        let content = make_legal_content(&self.content).replace('\n', eol);
        format!(
            "{}{eol}{} --> {}{eol}{}{eol}{eol}",
            self.index,
            timedelta_to_srt_timestamp(self.start),
            timedelta_to_srt_timestamp(self.end),
            content
        )
    }
}

/// Formats a duration as `HH:MM:SS,mmm`.
pub fn timedelta_to_srt_timestamp(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Removes blank lines, which would end the cue early.
pub fn make_legal_content(content: &str) -> String {
    if !content.is_empty() && !content.starts_with('\n') && !content.contains("\n\n") {
        return content.to_string();
    }
    MULTI_NEWLINE
        .replace_all(content, "\n")
        .trim_matches('\n')
        .to_string()
}

/// Sorts cues by start time and renders them.
///
/// With `reindex`, cues are renumbered from `start_index` in sorted order.
pub fn compose(subtitles: &[Subtitle], reindex: bool, start_index: usize, eol: &str) -> String {
    let mut sorted: Vec<&Subtitle> = subtitles.iter().collect();
    sorted.sort_by_key(|subtitle| subtitle.start);

    sorted
        .into_iter()
        .enumerate()
        .map(|(position, subtitle)| {
            if reindex {
                Subtitle {
                    index: start_index + position,
                    ..subtitle.clone()
                }
                .to_srt(eol)
            } else {
                subtitle.to_srt(eol)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(timedelta_to_srt_timestamp(ms(0)), "00:00:00,000");
        assert_eq!(timedelta_to_srt_timestamp(ms(3_723_045)), "01:02:03,045");
        assert_eq!(
            timedelta_to_srt_timestamp(Duration::from_micros(1_500_999)),
            "00:00:01,500"
        );
    }

    #[test]
    fn test_make_legal_content() {
        assert_eq!(make_legal_content("Hello"), "Hello");
        assert_eq!(make_legal_content("one\ntwo"), "one\ntwo");
        assert_eq!(make_legal_content("\none\n\n\ntwo\n"), "one\ntwo");
    }

    #[test]
    fn test_compose_sorts_and_reindexes() {
        let subtitles = vec![
            Subtitle::new(1, ms(2000), ms(3000), "second"),
            Subtitle::new(2, ms(0), ms(1000), "first"),
        ];

        let srt = compose(&subtitles, true, 1, "\n");

        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,000\nfirst\n\n2\n00:00:02,000 --> 00:00:03,000\nsecond\n\n"
        );
    }

    #[test]
    fn test_compose_keeps_indices_and_uses_eol() {
        let subtitles = vec![Subtitle::new(7, ms(0), ms(500), "a\nb")];

        let srt = compose(&subtitles, false, 1, "\r\n");

        assert_eq!(srt, "7\r\n00:00:00,000 --> 00:00:00,500\r\na\r\nb\r\n\r\n");
    }
}
