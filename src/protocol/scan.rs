use crate::core::errors::PlatformError;
use tracing::debug;

/// Cursor-based span extraction for the venue's two wire shapes.
///
/// The venue emits a restricted JSON subset: flat `{ "k": v, ... }` objects
/// and flat `[ v1, v2, ... ]` arrays whose values are quoted strings or bare
/// numbers, never nested containers. The scanner walks that text once and
/// hands out borrowed spans, so filling a schema never allocates for lookup.
pub struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    /// Unconsumed tail of the input.
    pub fn rest(&self) -> &'a str {
        self.rest
    }

    /// Next `(name, value)` pair from a `{ "name": value, ... }` shape.
    ///
    /// Skips leading commas, whitespace and braces. A quote toggles the
    /// in-string flag; structural characters are ignored while it is set.
    /// The first unquoted `:` after the entry start separates name from
    /// value; the entry ends at the first unquoted `,` or at the end of the
    /// input/`}`. Both spans come back trimmed of quotes and whitespace.
    ///
    /// `Ok(None)` is the end of input; `Err` is malformed text (a
    /// terminator before any entry content, or an entry with no separator).
    pub fn next_named(&mut self) -> Result<Option<(&'a str, &'a str)>, PlatformError> {
        let input = self.rest;
        let s = input.as_bytes();

        let mut p = 0;
        while p < s.len() && s[p] == b',' {
            p += 1;
        }

        let mut open_quote = false;
        let mut start: Option<usize> = None;
        let mut sep: Option<usize> = None;
        let mut stop: Option<usize> = None;

        while p < s.len() {
            let c = s[p];
            if start.is_none() && (c.is_ascii_whitespace() || c == b'{' || c == b'}') {
                p += 1;
                continue;
            }
            let begin = *start.get_or_insert(p);
            if c == b'"' {
                open_quote = !open_quote;
            }
            if open_quote {
                p += 1;
                continue;
            }
            if sep.is_none() && p > begin && c == b':' {
                sep = Some(p);
            }
            if c == b',' || p + 1 == s.len() || s[p + 1] == b'}' {
                stop = Some(p);
                break;
            }
            p += 1;
        }

        let (Some(start), Some(stop)) = (start, stop) else {
            return Ok(None); // end of input
        };
        if stop < start {
            debug!("failed to parse >>>{input}<<<");
            return Err(PlatformError::MalformedFrame(
                "entry terminator before entry start".into(),
            ));
        }
        let Some(sep) = sep else {
            debug!("failed to parse >>>{input}<<<");
            return Err(PlatformError::MalformedFrame(
                "entry without name/value separator".into(),
            ));
        };

        self.rest = &input[(stop + 1).min(input.len())..];

        let (mut a, mut b) = (start, stop);
        if s[a] == b'"' {
            a += 1;
        }
        if s[b] == b'"' {
            b -= 1;
        }

        // name span: strip the closing quote and padding before the separator
        let mut ne = sep - 1;
        while ne > a && (s[ne] == b'"' || s[ne].is_ascii_whitespace()) {
            ne -= 1;
        }
        let name = &input[a..=ne];

        // value span: strip quotes and padding on both sides
        let mut vs = sep + 1;
        while vs < b && (s[vs] == b'"' || s[vs].is_ascii_whitespace()) {
            vs += 1;
        }
        let mut ve = b;
        while ve > vs && (s[ve] == b'"' || s[ve].is_ascii_whitespace() || s[ve] == b',') {
            ve -= 1;
        }
        let value = &input[vs..=ve];

        Ok(Some((name, value)))
    }

    /// Next value span from a `[ v1, v2, ... ]` shape.
    ///
    /// Same quote tracking as [`next_named`](Self::next_named), but there is
    /// no separator; the span runs between structural delimiters. On
    /// `Ok(None)` the cursor is left untouched so the caller can still see
    /// the closing `]` of the segment.
    pub fn next_positional(&mut self) -> Result<Option<&'a str>, PlatformError> {
        let input = self.rest;
        let s = input.as_bytes();

        let mut p = 0;
        while p < s.len() && s[p] == b',' {
            p += 1;
        }

        let mut open_quote = false;
        let mut start: Option<usize> = None;
        let mut stop: Option<usize> = None;

        while p < s.len() {
            let c = s[p];
            if start.is_none() && (c.is_ascii_whitespace() || c == b'[' || c == b']') {
                p += 1;
                continue;
            }
            start.get_or_insert(p);
            if c == b'"' {
                open_quote = !open_quote;
            }
            if open_quote {
                p += 1;
                continue;
            }
            if c == b',' || p + 1 == s.len() || s[p + 1] == b']' {
                stop = Some(p);
                break;
            }
            p += 1;
        }

        let (Some(start), Some(stop)) = (start, stop) else {
            return Ok(None); // end of input, cursor kept
        };
        if stop < start {
            debug!("failed to parse >>>{input}<<<");
            return Err(PlatformError::MalformedFrame(
                "value terminator before value start".into(),
            ));
        }

        self.rest = &input[(stop + 1).min(input.len())..];

        let (mut a, mut b) = (start, stop);
        if s[a] == b'"' {
            a += 1;
        }
        while b > a && (s[b] == b'"' || s[b].is_ascii_whitespace() || s[b] == b',') {
            b -= 1;
        }

        Ok(Some(&input[a..=b]))
    }
}
