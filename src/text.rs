//! On-wire patch serialization: the `@@ -start1,len1 +start2,len2 @@` header
//! format plus URL-encoded diff bodies (component I).

use crate::diff::{Diff, Op};
use crate::patch::Patch;
use thiserror::Error;

/// A patch text failed to parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A line that should have been a `@@ ... @@` header wasn't one.
    #[error("invalid patch header: {0:?}")]
    BadHeader(String),
    /// A body line didn't start with one of `+`, `-`, ` `.
    #[error("invalid patch mode at line {0:?}")]
    BadLine(String),
    /// Percent-decoding a diff body failed, or it decoded to invalid UTF-8.
    #[error("invalid percent-encoding in line {0:?}")]
    BadEncoding(String),
}

/// Renders `patches` in the on-wire format: one `@@ -start1,len1 +start2,len2
/// @@` header per patch, followed by one line per diff (`+`/`-`/` ` prefix,
/// URL-encoded text).
pub fn patch_to_text(patches: &[Patch]) -> String {
    let mut out = String::new();
    for patch in patches {
        out.push_str(&header(patch));
        out.push('\n');
        for diff in &patch.diffs {
            let prefix = match diff.op {
                Op::Insert => '+',
                Op::Delete => '-',
                Op::Equal => ' ',
            };
            out.push(prefix);
            out.push_str(&url_encode(&diff.text));
            out.push('\n');
        }
    }
    out
}

fn header(patch: &Patch) -> String {
    let coords1 = coords(patch.start1, patch.length1);
    let coords2 = coords(patch.start2, patch.length2);
    format!("@@ -{} +{} @@", coords1, coords2)
}

/// A single-line span is rendered as a bare start (1-based); anything else
/// carries an explicit `,length`. A zero-length span is rendered as
/// `start,0` with `start` backed up by one, matching the reference format.
fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        n => format!("{},{}", start + 1, n),
    }
}

/// Parses the output of [`patch_to_text`] back into patches.
pub fn patch_from_text(text: &str) -> Result<Vec<Patch>, ParseError> {
    let mut patches = Vec::new();
    if text.is_empty() {
        return Ok(patches);
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut i = 0usize;

    while i < lines.len() {
        if lines[i].is_empty() {
            i += 1;
            continue;
        }

        let (start1, length1, start2, length2) = parse_header(lines[i])?;
        i += 1;

        let mut patch = Patch {
            diffs: Vec::new(),
            start1,
            start2,
            length1,
            length2,
        };

        let mut consumed1 = 0usize;
        let mut consumed2 = 0usize;

        while i < lines.len() {
            let line = lines[i];
            if line.is_empty() {
                i += 1;
                continue;
            }
            let mut chars = line.chars();
            let sign = match chars.next() {
                Some(c) => c,
                None => {
                    i += 1;
                    continue;
                }
            };
            if sign == '@' {
                break;
            }

            let body = &line[sign.len_utf8()..];
            let decoded =
                url_decode(body).map_err(|_| ParseError::BadEncoding(line.to_string()))?;

            match sign {
                '+' => {
                    consumed2 += decoded.len();
                    patch.diffs.push(Diff::new(Op::Insert, decoded));
                }
                '-' => {
                    consumed1 += decoded.len();
                    patch.diffs.push(Diff::new(Op::Delete, decoded));
                }
                ' ' => {
                    consumed1 += decoded.len();
                    consumed2 += decoded.len();
                    patch.diffs.push(Diff::new(Op::Equal, decoded));
                }
                _ => return Err(ParseError::BadLine(line.to_string())),
            }
            i += 1;
        }

        let _ = (consumed1, consumed2);
        patches.push(patch);
    }

    Ok(patches)
}

fn parse_header(line: &str) -> Result<(usize, usize, usize, usize), ParseError> {
    let bad = || ParseError::BadHeader(line.to_string());

    let rest = line.strip_prefix("@@ -").ok_or_else(bad)?;
    let rest = rest.strip_suffix(" @@").ok_or_else(bad)?;
    let mut halves = rest.splitn(2, " +");
    let left = halves.next().ok_or_else(bad)?;
    let right = halves.next().ok_or_else(bad)?;

    let (start1, length1) = parse_coords(left).ok_or_else(bad)?;
    let (start2, length2) = parse_coords(right).ok_or_else(bad)?;

    Ok((start1, length1, start2, length2))
}

fn parse_coords(s: &str) -> Option<(usize, usize)> {
    match s.split_once(',') {
        Some((start, len)) => {
            let len: usize = len.parse().ok()?;
            let start: usize = start.parse().ok()?;
            let start = if len == 0 { start } else { start - 1 };
            Some((start, len))
        }
        None => {
            let start: usize = s.parse().ok()?;
            Some((start.saturating_sub(1), 1))
        }
    }
}

/// Percent-encodes like `application/x-www-form-urlencoded`, except that a
/// fixed set of 16 punctuation characters that are safe (and common) in diff
/// text are left unescaped: `! ~ * ' ( ) ; / ? : @ & = + $ , #`.
fn url_encode(text: &str) -> String {
    const SAFE_EXTRA: &[u8] = b"!~*'();/?:@&=+$,#";
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        let is_unreserved = b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~');
        if is_unreserved || SAFE_EXTRA.contains(&b) {
            out.push(b as char);
        } else if b == b' ' {
            out.push_str("%20");
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Reverses [`url_encode`] (and anything else using standard
/// percent-encoding, including `%`-escaped safe characters).
fn url_decode(text: &str) -> Result<String, ()> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if i + 2 >= bytes.len() {
                    return Err(());
                }
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).map_err(|_| ())?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| ())?;
                out.push(byte);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[test]
    fn round_trip_simple_patch() {
        let config = Config::default();
        let patches = crate::patch::patch_make_texts(&config, "hello world", "hello there world");
        let text = patch_to_text(&patches);
        let parsed = patch_from_text(&text).unwrap();
        assert_eq!(parsed, patches);
    }

    #[test]
    fn empty_text_parses_to_no_patches() {
        assert_eq!(patch_from_text("").unwrap(), Vec::<Patch>::new());
    }

    #[test]
    fn header_format_matches_s6() {
        let patch = Patch {
            diffs: vec![
                Diff::new(Op::Equal, "the ".to_string()),
                Diff::new(Op::Delete, "quick".to_string()),
                Diff::new(Op::Insert, "slow".to_string()),
                Diff::new(Op::Equal, " fox".to_string()),
            ],
            start1: 0,
            start2: 0,
            length1: 13,
            length2: 12,
        };
        let text = patch_to_text(&[patch]);
        assert!(text.starts_with("@@ -1,13 +1,12 @@\n"));
        assert!(text.contains("-quick"));
        assert!(text.contains("+slow"));
    }

    #[test]
    fn url_encode_leaves_safe_punctuation_unescaped() {
        let encoded = url_encode("a/b?c:d e");
        assert_eq!(encoded, "a/b?c:d%20e");
    }

    #[test]
    fn url_decode_reverses_encode() {
        let original = "100% sure? yes/no #maybe";
        let decoded = url_decode(&url_encode(original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn bad_header_is_rejected() {
        assert_eq!(
            patch_from_text("not a header\n"),
            Err(ParseError::BadHeader("not a header".to_string()))
        );
    }

    #[test]
    fn empty_body_line_is_silently_skipped() {
        // An empty line inside a patch body advances the cursor without
        // being treated as an implicit header or error.
        let text = "@@ -1,3 +1,3 @@\n abc\n\n";
        let parsed = patch_from_text(text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].diffs.len(), 1);
    }

    #[test]
    fn zero_length_coords_round_trip() {
        let patch = Patch {
            diffs: vec![Diff::new(Op::Insert, "x".to_string())],
            start1: 5,
            start2: 5,
            length1: 0,
            length2: 1,
        };
        let text = patch_to_text(&[patch.clone()]);
        assert!(text.starts_with("@@ -5,0 +6 @@\n"));
        let parsed = patch_from_text(&text).unwrap();
        assert_eq!(parsed[0].start1, patch.start1);
        assert_eq!(parsed[0].length1, patch.length1);
    }
}
