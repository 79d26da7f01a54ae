//! Parse HTTP response header blocks.

/// `Content-Range` value: `bytes a-b/total`, `bytes a-b/*` or `bytes */total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First and last (inclusive) byte of the body, absent for `*`.
    pub span: Option<(u64, u64)>,
    /// Full resource length, absent for `*`.
    pub total: Option<u64>,
}

/// Status line and the headers the downloader cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u32,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    pub accept_ranges: bool,
    pub location: Option<String>,
}

impl ResponseHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Interim block that curl follows with another one (1xx, or a redirect).
    pub(crate) fn is_interim(&self) -> bool {
        (100..200).contains(&self.status)
            || ((300..400).contains(&self.status) && self.location.is_some())
    }
}

/// `HTTP/1.1 206 Partial Content` / `HTTP/2 200` -> status code.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    let proto = parts.next()?;
    if !proto.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    let span = match span.trim() {
        "*" => None,
        s => {
            let (a, b) = s.split_once('-')?;
            Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
        }
    };
    Some(ContentRange { span, total })
}

/// Parse one header block (status line first).
pub(crate) fn parse_headers(lines: &[String]) -> ResponseHead {
    let mut head = ResponseHead::default();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(code) = parse_status_line(line) {
            head.status = code;
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                head.content_length = value.parse().ok();
            } else if name.eq_ignore_ascii_case("content-range") {
                head.content_range = parse_content_range(value);
            } else if name.eq_ignore_ascii_case("accept-ranges") {
                head.accept_ranges = value.eq_ignore_ascii_case("bytes");
            } else if name.eq_ignore_ascii_case("location") {
                head.location = Some(value.to_string());
            }
        }
    }
    head
}
