//! Parser for `git blame --incremental` output.
//!
//! Every hunk starts with a header line
//!
//! ```text
//! <sha> <source line> <result line> <line count>
//! ```
//!
//! The first time a commit appears, the header is followed by `key value` lines
//! describing it (`author`, `author-mail`, `author-time`, `author-tz`, `summary`, ...).
//! Every hunk ends with a `filename` line.

use std::collections::HashMap;

use blamestream_protocol::{Author, Hunk};
use chrono::{DateTime, FixedOffset, Offset, Utc};

use super::BlameError;

#[derive(Debug, Clone, Default)]
struct CommitInfo {
    author_name: String,
    author_email: String,
    author_time: Option<i64>,
    author_tz: Option<FixedOffset>,
    summary: String,
}

#[derive(Debug)]
struct PendingHunk {
    commit: String,
    start_line: u32,
    end_line: u32,
}

/// Line-by-line parser. Commit metadata is cached for the lifetime of the parser so
/// later hunks of an already-seen commit can be completed.
#[derive(Debug, Default)]
pub struct IncrementalParser {
    commits: HashMap<String, CommitInfo>,
    pending: Option<PendingHunk>,
}

impl IncrementalParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its newline). Returns a hunk when `line` completes one.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<Hunk>, BlameError> {
        let Some(pending) = self.pending.take() else {
            if line.is_empty() {
                return Ok(None);
            }
            self.pending = Some(parse_header(line)?);
            return Ok(None);
        };

        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        if key == "filename" {
            return self.complete(pending, value).map(Some);
        }

        let info = self.commits.entry(pending.commit.clone()).or_default();
        match key {
            "author" => info.author_name = value.to_string(),
            "author-mail" => {
                info.author_email = value
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            }
            "author-time" => {
                let time = value
                    .parse()
                    .map_err(|_| BlameError::Parse(format!("invalid author-time: {value:?}")))?;
                info.author_time = Some(time);
            }
            "author-tz" => info.author_tz = Some(parse_tz(value)?),
            "summary" => info.summary = value.to_string(),
            // committer*, previous, boundary and future keys carry nothing we emit
            _ => {}
        }
        self.pending = Some(pending);
        Ok(None)
    }

    /// Check that the input did not stop in the middle of a hunk.
    pub fn finish(&self) -> Result<(), BlameError> {
        match &self.pending {
            Some(pending) => Err(BlameError::Parse(format!(
                "output ended inside hunk for commit {}",
                pending.commit
            ))),
            None => Ok(()),
        }
    }

    fn complete(&mut self, pending: PendingHunk, filename: &str) -> Result<Hunk, BlameError> {
        let info = self.commits.get(&pending.commit).ok_or_else(|| {
            BlameError::Parse(format!("no metadata for commit {}", pending.commit))
        })?;
        let time = info.author_time.ok_or_else(|| {
            BlameError::Parse(format!("missing author-time for commit {}", pending.commit))
        })?;
        let tz = info.author_tz.unwrap_or_else(|| Utc.fix());
        let date = DateTime::from_timestamp(time, 0)
            .ok_or_else(|| BlameError::Parse(format!("author-time out of range: {time}")))?
            .with_timezone(&tz);

        Ok(Hunk {
            start_line: pending.start_line,
            end_line: pending.end_line,
            commit_id: pending.commit,
            author: Author {
                name: info.author_name.clone(),
                email: info.author_email.clone(),
                date,
            },
            message: info.summary.clone(),
            filename: unquote_path(filename),
        })
    }
}

fn parse_header(line: &str) -> Result<PendingHunk, BlameError> {
    let malformed = || BlameError::Parse(format!("invalid hunk header: {line:?}"));

    let mut parts = line.split(' ');
    let commit = parts.next().ok_or_else(malformed)?;
    if !matches!(commit.len(), 40 | 64) || !commit.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    let _source_line: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
    let final_line: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
    let lines: u32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
    if parts.next().is_some() || final_line == 0 || lines == 0 {
        return Err(malformed());
    }
    let end_line = final_line.checked_add(lines).ok_or_else(malformed)?;

    Ok(PendingHunk {
        commit: commit.to_string(),
        start_line: final_line,
        end_line,
    })
}

/// Parse a `+hhmm` / `-hhmm` timezone.
fn parse_tz(value: &str) -> Result<FixedOffset, BlameError> {
    let invalid = || BlameError::Parse(format!("invalid author-tz: {value:?}"));

    let (sign, digits) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Undo git's C-style quoting of unusual path names (`core.quotePath`).
fn unquote_path(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let mut out = Vec::with_capacity(inner.len());
    let mut bytes = inner.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(b'r') => out.push(b'\r'),
            Some(b'a') => out.push(0x07),
            Some(b'b') => out.push(0x08),
            Some(b'f') => out.push(0x0c),
            Some(b'v') => out.push(0x0b),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(&o @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(o - b'0');
                            bytes.next();
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            Some(other) => out.push(other),
            None => out.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA_A: &str = "1111111111111111111111111111111111111111";
    const SHA_B: &str = "2222222222222222222222222222222222222222";

    fn feed(parser: &mut IncrementalParser, text: &str) -> Vec<Hunk> {
        text.lines()
            .filter_map(|line| parser.feed_line(line).unwrap())
            .collect()
    }

    fn sample() -> String {
        format!(
            "{SHA_A} 5 5 2\n\
             author Ada Lovelace\n\
             author-mail <ada@example.com>\n\
             author-time 1600000000\n\
             author-tz +0200\n\
             committer Ada Lovelace\n\
             committer-mail <ada@example.com>\n\
             committer-time 1600000000\n\
             committer-tz +0200\n\
             summary Tighten the router\n\
             previous {SHA_B} mux.go\n\
             filename mux.go\n\
             {SHA_B} 1 1 4\n\
             author Charles Babbage\n\
             author-mail <cb@example.com>\n\
             author-time 1500000000\n\
             author-tz -0130\n\
             summary Initial import\n\
             boundary\n\
             filename old/mux.go\n\
             {SHA_A} 9 7 1\n\
             filename mux.go\n"
        )
    }

    #[test]
    fn test_parses_hunks_in_output_order() {
        let mut parser = IncrementalParser::new();
        let hunks = feed(&mut parser, &sample());
        parser.finish().unwrap();

        assert_eq!(hunks.len(), 3);

        assert_eq!(hunks[0].commit_id, SHA_A);
        assert_eq!((hunks[0].start_line, hunks[0].end_line), (5, 7));
        assert_eq!(hunks[0].author.name, "Ada Lovelace");
        assert_eq!(hunks[0].author.email, "ada@example.com");
        assert_eq!(
            hunks[0].author.date.to_rfc3339(),
            "2020-09-13T14:26:40+02:00"
        );
        assert_eq!(hunks[0].message, "Tighten the router");
        assert_eq!(hunks[0].filename, "mux.go");

        assert_eq!(hunks[1].commit_id, SHA_B);
        assert_eq!((hunks[1].start_line, hunks[1].end_line), (1, 5));
        assert_eq!(hunks[1].author.date.offset().local_minus_utc(), -5400);
        assert_eq!(hunks[1].filename, "old/mux.go");
    }

    #[test]
    fn test_reuses_metadata_for_repeated_commit() {
        let mut parser = IncrementalParser::new();
        let hunks = feed(&mut parser, &sample());

        let repeated = &hunks[2];
        assert_eq!(repeated.commit_id, SHA_A);
        assert_eq!((repeated.start_line, repeated.end_line), (7, 8));
        assert_eq!(repeated.author, hunks[0].author);
        assert_eq!(repeated.message, hunks[0].message);
    }

    #[test]
    fn test_rejects_malformed_header() {
        let mut parser = IncrementalParser::new();
        let bad_headers = vec![
            "not-a-sha 1 1 1".to_string(),
            format!("{SHA_A} 1 1"),
            format!("{SHA_A} 1 x 1"),
            format!("{SHA_A} 1 0 1"),
            format!("{SHA_A} 1 1 1 extra"),
            format!("{SHA_A} 1 {} 2", u32::MAX),
        ];
        for bad in &bad_headers {
            assert!(
                matches!(parser.feed_line(bad), Err(BlameError::Parse(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_missing_metadata_is_an_error() {
        let mut parser = IncrementalParser::new();
        parser.feed_line(&format!("{SHA_A} 1 1 1")).unwrap();
        let err = parser.feed_line("filename a.txt").unwrap_err();
        assert!(matches!(err, BlameError::Parse(_)));

        let mut parser = IncrementalParser::new();
        parser.feed_line(&format!("{SHA_B} 1 1 1")).unwrap();
        parser.feed_line("author Ada").unwrap();
        let err = parser.feed_line("filename a.txt").unwrap_err();
        assert!(err.to_string().contains("author-time"));
    }

    #[test]
    fn test_truncated_output_is_an_error() {
        let mut parser = IncrementalParser::new();
        parser.feed_line(&format!("{SHA_A} 1 1 1")).unwrap();
        parser.feed_line("author Ada").unwrap();
        assert!(matches!(parser.finish(), Err(BlameError::Parse(_))));
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(parse_tz("0200").is_err());
        assert!(parse_tz("+02").is_err());
        assert_eq!(parse_tz("-0000").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_tz("+0530").unwrap().local_minus_utc(), 19800);
    }

    #[test]
    fn test_unquote_path() {
        assert_eq!(unquote_path("plain.go"), "plain.go");
        assert_eq!(unquote_path(r#""with \"quote\".go""#), "with \"quote\".go");
        assert_eq!(unquote_path(r#""tab\there""#), "tab\there");
        assert_eq!(unquote_path(r#""caf\303\251.txt""#), "café.txt");
    }
}
