//! Header and body canonicalization, per RFC 6376 section 3.4 (reused
//! unmodified by RFC 8617 for AMS and AS hashing).

use crate::hash::LimitHasher;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Type {
    Simple,
    Relaxed,
}

impl Type {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Relaxed => "relaxed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "simple" => Some(Self::Simple),
            "relaxed" => Some(Self::Relaxed),
            _ => None,
        }
    }

    pub(crate) fn canon_body(&self, body: &[u8], hasher: &mut LimitHasher) {
        match self {
            Self::Simple => body_simple(body, hasher),
            Self::Relaxed => body_relaxed(body, hasher),
        }
    }

    pub(crate) fn canon_header_into(&self, key: &str, value: &[u8], out: &mut Vec<u8>) {
        match self {
            Self::Simple => canonicalize_header_simple(key, value, out),
            Self::Relaxed => canonicalize_header_relaxed(key, value, out),
        }
    }
}

/// Parses the `c=` tag value into (header, body) canonicalization types.
/// Absent tag defaults to simple/simple; a bare name sets the header
/// canonicalization and defaults body to simple, per RFC 6376 section 3.5.
pub fn parse_pair(value: Option<&str>) -> Result<(Type, Type), crate::ArcError> {
    use Type::{Relaxed, Simple};
    match value {
        None => Ok((Simple, Simple)),
        Some(s) => match s {
            "simple/simple" => Ok((Simple, Simple)),
            "relaxed/simple" => Ok((Relaxed, Simple)),
            "simple/relaxed" => Ok((Simple, Relaxed)),
            "relaxed/relaxed" => Ok((Relaxed, Relaxed)),
            "relaxed" => Ok((Relaxed, Simple)),
            "simple" => Ok((Simple, Simple)),
            v => Err(crate::ArcError::UnsupportedCanonicalization(v.to_owned())),
        },
    }
}

fn do_body_simple(mut body: &[u8]) -> &[u8] {
    if body.is_empty() {
        return b"\r\n";
    }
    while body.ends_with(b"\r\n\r\n") {
        body = &body[..body.len() - 2];
    }
    body
}

fn body_simple(body: &[u8], hasher: &mut LimitHasher) {
    hasher.hash(do_body_simple(body));
}

struct IterLines<'h> {
    haystack: &'h [u8],
    inner: memchr::memmem::FindIter<'h, 'h>,
    start: usize,
    done: bool,
}

impl<'h> Iterator for IterLines<'h> {
    type Item = &'h [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(idx) => {
                let line = &self.haystack[self.start..idx + 2];
                self.start = idx + 2;
                Some(line)
            }
            None => {
                self.done = true;
                let line = &self.haystack[self.start..];
                if line.is_empty() {
                    None
                } else {
                    Some(line)
                }
            }
        }
    }
}

fn iter_lines(haystack: &[u8]) -> IterLines<'_> {
    IterLines {
        haystack,
        inner: memchr::memmem::find_iter(haystack, b"\r\n"),
        start: 0,
        done: false,
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.3>
fn body_relaxed(mut body: &[u8], hasher: &mut LimitHasher) {
    if body.is_empty() {
        return;
    }

    while body.ends_with(b"\r\n\r\n") {
        body = &body[..body.len() - 2];
    }

    for mut line in iter_lines(body) {
        line = trim_ws_end(line);

        let mut prior = 0;
        for idx in memchr::memchr2_iter(b' ', b'\t', line) {
            if prior > 0 && idx == prior {
                prior = idx + 1;
                continue;
            }
            hasher.hash(&line[prior..idx]);
            hasher.hash(b" ");
            prior = idx + 1;
        }
        hasher.hash(&line[prior..]);
        hasher.hash(b"\r\n");
    }
}

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.1>
fn canonicalize_header_simple(key: &str, value: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

/// <https://datatracker.ietf.org/doc/html/rfc6376#section-3.4.2>
fn canonicalize_header_relaxed(key: &str, value: &[u8], out: &mut Vec<u8>) {
    let key = key.to_lowercase();
    let key = key.trim_end();

    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b":");

    let value = trim_ws_start(trim_ws_end(value));
    let mut space_run = false;
    for &c in value {
        match c {
            b'\r' | b'\n' => {}
            b' ' | b'\t' => {
                if space_run {
                    continue;
                }
                space_run = true;
                out.push(b' ');
            }
            _ => {
                space_run = false;
                out.push(c);
            }
        }
    }

    out.extend_from_slice(b"\r\n");
}

fn trim_ws_start(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.first() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => line = &line[1..],
            _ => break,
        }
    }
    line
}

fn trim_ws_end(mut line: &[u8]) -> &[u8] {
    while let Some(c) = line.last() {
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => line = &line[..line.len() - 1],
            _ => break,
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashImpl;

    fn header_relaxed(key: &str, value: &[u8]) -> Vec<u8> {
        let mut result = vec![];
        canonicalize_header_relaxed(key, value, &mut result);
        result
    }

    #[test]
    fn test_canonicalize_header_relaxed() {
        assert_eq!(header_relaxed("SUBJect", b" AbC\r\n"), b"subject:AbC\r\n");
        assert_eq!(
            header_relaxed("Subject \t", b"\t Your Name\t \r\n"),
            b"subject:Your Name\r\n"
        );
        assert_eq!(
            header_relaxed("Subject \t", b"\t Kimi \t \r\n No \t\r\n Na Wa\r\n"),
            b"subject:Kimi No Na Wa\r\n"
        );
    }

    fn body_relaxed(data: &[u8]) -> Vec<u8> {
        let mut hasher = LimitHasher::new(HashImpl::copy_data(), usize::MAX);
        super::body_relaxed(data, &mut hasher);
        hasher.finalize_bytes()
    }

    fn body_simple(data: &[u8]) -> Vec<u8> {
        let mut hasher = LimitHasher::new(HashImpl::copy_data(), usize::MAX);
        super::body_simple(data, &mut hasher);
        hasher.finalize_bytes()
    }

    #[test]
    fn test_canonicalize_body_relaxed() {
        assert_eq!(body_relaxed(b"\r\n"), b"\r\n");
        assert_eq!(body_relaxed(b"hey        \r\n"), b"hey\r\n");
        assert_eq!(body_relaxed(b" C \r\nD \t E\r\n\r\n\r\n"), b" C\r\nD E\r\n");
    }

    #[test]
    fn test_canonicalize_body_relaxed_idempotent() {
        let once = body_relaxed(b" C \r\nD \t E\r\n\r\n\r\n");
        let twice = body_relaxed(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonicalize_body_simple() {
        assert_eq!(body_simple(b"\r\n"), b"\r\n");
        assert_eq!(body_simple(b"hey        \r\n"), b"hey        \r\n");
        assert_eq!(body_simple(b" C \r\nD \t E\r\n\r\n\r\n"), b" C \r\nD \t E\r\n");
    }

    #[test]
    fn test_canonicalize_body_simple_trailing_empty_lines() {
        assert_eq!(body_simple(b"hey\r\n\r\n\r\n\r\n"), b"hey\r\n");
    }
}
