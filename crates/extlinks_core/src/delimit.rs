use std::ops::Range;

/// Upper bound on innermost-first rewriting passes; deeper nesting stays as text.
pub const MAX_DELIMIT_PASSES: usize = 10;

const LITERAL_TAGS: [&str; 2] = ["nowiki", "pre"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    Text,
    /// A literal block (`<nowiki>`, `<pre>`) kept verbatim.
    Escaped,
    /// A `|` acting as a template separator.
    Pipe,
    /// The `{{` opening a delimited invocation. `name` is the trimmed name range.
    Open { name: Range<usize> },
    /// The `}}` closing a delimited invocation.
    Close { name: Range<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn new(kind: SpanKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }

    pub fn is_pipe(&self) -> bool {
        self.kind == SpanKind::Pipe
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, SpanKind::Open { .. })
    }

    pub fn is_close(&self) -> bool {
        matches!(self.kind, SpanKind::Close { .. })
    }
}

/// Template markup split into an ordered list of tagged spans.
///
/// Spans cover the source contiguously and in order, so every span maps back
/// to the exact bytes it was produced from.
#[derive(Debug, Clone)]
pub struct Delimited<'a> {
    source: &'a str,
    spans: Vec<Span>,
    passes: usize,
}

impl<'a> Delimited<'a> {
    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Number of innermost-first passes that ran.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn slice(&self, span: &Span) -> &'a str {
        &self.source[span.start..span.end]
    }

    /// Name carried by an `Open` or `Close` span.
    pub fn name(&self, span: &Span) -> Option<&'a str> {
        match &span.kind {
            SpanKind::Open { name } | SpanKind::Close { name } => {
                Some(&self.source[name.clone()])
            }
            _ => None,
        }
    }

    /// The escape table: literal blocks in encounter order, one entry per region.
    pub fn escapes(&self) -> impl Iterator<Item = (usize, &'a str)> + '_ {
        self.spans
            .iter()
            .filter(|span| span.kind == SpanKind::Escaped)
            .enumerate()
            .map(|(index, span)| (index, self.slice(span)))
    }

    /// True when a literal `{{` survived every pass.
    pub fn has_residue(&self) -> bool {
        self.spans
            .iter()
            .filter(|span| span.kind == SpanKind::Text)
            .any(|span| self.slice(span).contains("{{"))
    }

    pub fn is_blank(&self, span: &Span) -> bool {
        span.kind == SpanKind::Text && self.slice(span).trim().is_empty()
    }

    /// Index of the `Close` span paired with the `Open` span at `open`.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        if !self.spans.get(open)?.is_open() {
            return None;
        }
        let mut depth = 0usize;
        for (index, span) in self.spans.iter().enumerate().skip(open) {
            if span.is_open() {
                depth += 1;
            } else if span.is_close() {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Whole-text inverse: tags back to braces, pipe markers back to pipes.
    pub fn undelimit(&self) -> String {
        undelimit_spans(self.source, &self.spans)
    }

    /// Scoped inverse over the span indices in `range`: every child invocation
    /// inside it collapses into a single `Text` span, separators included.
    /// Spans outside child invocations are returned unchanged.
    pub fn undelimit_nested(&self, range: Range<usize>) -> Vec<Span> {
        let end = range.end.min(self.spans.len());
        let mut out = Vec::with_capacity(end.saturating_sub(range.start));
        let mut index = range.start;
        while index < end {
            let span = &self.spans[index];
            if span.is_open()
                && let Some(close) = self.matching_close(index)
                && close < end
            {
                push_text(&mut out, span.start, self.spans[close].end);
                index = close + 1;
                continue;
            }
            out.push(span.clone());
            index += 1;
        }
        out
    }

    /// Conventional tagged rendering, e.g. `<start T>T<pipe>a<end T>`.
    pub fn to_tagged(&self) -> String {
        let mut out = String::with_capacity(self.source.len() + self.spans.len() * 4);
        for span in &self.spans {
            match &span.kind {
                SpanKind::Text | SpanKind::Escaped => out.push_str(self.slice(span)),
                SpanKind::Pipe => out.push_str("<pipe>"),
                SpanKind::Open { name } => {
                    out.push_str("<start ");
                    out.push_str(&self.source[name.clone()]);
                    out.push('>');
                }
                SpanKind::Close { name } => {
                    out.push_str("<end ");
                    out.push_str(&self.source[name.clone()]);
                    out.push('>');
                }
            }
        }
        out
    }
}

/// Render spans of `source` back to plain wikitext.
pub fn undelimit_spans(source: &str, spans: &[Span]) -> String {
    let mut out = String::with_capacity(source.len());
    for span in spans {
        match span.kind {
            SpanKind::Text | SpanKind::Escaped => out.push_str(&source[span.start..span.end]),
            SpanKind::Pipe => out.push('|'),
            SpanKind::Open { .. } => out.push_str("{{"),
            SpanKind::Close { .. } => out.push_str("}}"),
        }
    }
    out
}

/// Rewrite template markup into tagged spans.
///
/// Literal blocks are fenced off first, every `|` becomes a separator except
/// the first one inside a wikilink, then innermost invocations are tagged pass
/// by pass until no `{{` remains or [`MAX_DELIMIT_PASSES`] is reached.
pub fn delimit(text: &str) -> Delimited<'_> {
    let bytes = text.as_bytes();
    let mut units = Vec::with_capacity(bytes.len());
    let mut cursor = 0usize;
    for region in literal_regions(text) {
        push_text_units(bytes, cursor..region.start, &mut units);
        units.push(Unit::Token(Span::new(
            SpanKind::Escaped,
            region.start,
            region.end,
        )));
        cursor = region.end;
    }
    push_text_units(bytes, cursor..bytes.len(), &mut units);

    restore_wikilink_pipes(bytes, &mut units);

    let mut passes = 0usize;
    while passes < MAX_DELIMIT_PASSES && has_double_open(bytes, &units) {
        units = delimit_pass(text, &units);
        passes += 1;
    }

    Delimited {
        source: text,
        spans: compress(units),
        passes,
    }
}

/// Byte ranges of `<nowiki>...</nowiki>` and `<pre>...</pre>` blocks.
///
/// Tag names match case-insensitively, whitespace is allowed inside the tag
/// brackets, and each block ends at its nearest closing tag.
pub fn literal_regions(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while let Some(offset) = text[cursor..].find('<') {
        let start = cursor + offset;
        if let Some((tag, body_start)) = parse_literal_open(bytes, start)
            && let Some(end) = find_literal_close(bytes, body_start, tag)
        {
            out.push(start..end);
            cursor = end;
        } else {
            cursor = start + 1;
        }
    }
    out
}

fn parse_literal_open(bytes: &[u8], at: usize) -> Option<(&'static str, usize)> {
    let name_start = skip_whitespace(bytes, at + 1);
    for tag in LITERAL_TAGS {
        if let Some(name_end) = match_tag_name(bytes, name_start, tag) {
            let close = skip_whitespace(bytes, name_end);
            if bytes.get(close) == Some(&b'>') {
                return Some((tag, close + 1));
            }
        }
    }
    None
}

fn find_literal_close(bytes: &[u8], from: usize, tag: &str) -> Option<usize> {
    let mut cursor = from;
    while cursor < bytes.len() {
        if bytes[cursor] == b'<' {
            let slash = skip_whitespace(bytes, cursor + 1);
            if bytes.get(slash) == Some(&b'/') {
                let name_start = skip_whitespace(bytes, slash + 1);
                if let Some(name_end) = match_tag_name(bytes, name_start, tag) {
                    let close = skip_whitespace(bytes, name_end);
                    if bytes.get(close) == Some(&b'>') {
                        return Some(close + 1);
                    }
                }
            }
        }
        cursor += 1;
    }
    None
}

fn match_tag_name(bytes: &[u8], at: usize, tag: &str) -> Option<usize> {
    let end = at + tag.len();
    let candidate = bytes.get(at..end)?;
    candidate
        .eq_ignore_ascii_case(tag.as_bytes())
        .then_some(end)
}

fn skip_whitespace(bytes: &[u8], mut at: usize) -> usize {
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}

/// Working representation while passes run: single source bytes, or tokens
/// already recognised.
#[derive(Debug, Clone)]
enum Unit {
    Byte(usize),
    Token(Span),
}

impl Unit {
    fn start(&self) -> usize {
        match self {
            Self::Byte(at) => *at,
            Self::Token(span) => span.start,
        }
    }

    fn end(&self) -> usize {
        match self {
            Self::Byte(at) => at + 1,
            Self::Token(span) => span.end,
        }
    }
}

fn push_text_units(bytes: &[u8], range: Range<usize>, units: &mut Vec<Unit>) {
    for at in range {
        if bytes[at] == b'|' {
            units.push(Unit::Token(Span::new(SpanKind::Pipe, at, at + 1)));
        } else {
            units.push(Unit::Byte(at));
        }
    }
}

fn byte_at(bytes: &[u8], units: &[Unit], index: usize) -> Option<u8> {
    match units.get(index)? {
        Unit::Byte(at) => Some(bytes[*at]),
        Unit::Token(_) => None,
    }
}

/// After each `[[`, the first separator reached before any `]` is a link
/// label separator, not a template one. At least one unit must sit between
/// the brackets and that pipe.
fn restore_wikilink_pipes(bytes: &[u8], units: &mut [Unit]) {
    let mut in_link = false;
    let mut has_target = false;
    let mut index = 0usize;
    while index < units.len() {
        let restore = match &units[index] {
            Unit::Byte(at) => {
                if bytes[*at] == b'[' && byte_at(bytes, units, index + 1) == Some(b'[') {
                    in_link = true;
                    has_target = false;
                    index += 2;
                    continue;
                }
                if bytes[*at] == b']' {
                    in_link = false;
                } else if in_link {
                    has_target = true;
                }
                None
            }
            Unit::Token(span) if span.is_pipe() && in_link && has_target => Some(span.start),
            Unit::Token(_) => {
                if in_link {
                    has_target = true;
                }
                None
            }
        };
        if let Some(at) = restore {
            units[index] = Unit::Byte(at);
            in_link = false;
        }
        index += 1;
    }
}

fn has_double_open(bytes: &[u8], units: &[Unit]) -> bool {
    (0..units.len()).any(|index| {
        byte_at(bytes, units, index) == Some(b'{') && byte_at(bytes, units, index + 1) == Some(b'{')
    })
}

struct InvocationMatch {
    name: Range<usize>,
    /// Unit index of the first `}` of the closing pair.
    close: usize,
}

/// One left-to-right pass tagging every innermost `{{ name (| body)? }}`.
fn delimit_pass(text: &str, units: &[Unit]) -> Vec<Unit> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(units.len());
    let mut index = 0usize;
    while index < units.len() {
        if byte_at(bytes, units, index) == Some(b'{')
            && byte_at(bytes, units, index + 1) == Some(b'{')
            && let Some(found) = match_invocation(text, units, index)
        {
            let open_at = units[index].start();
            let close_at = units[found.close].start();
            out.push(Unit::Token(Span::new(
                SpanKind::Open {
                    name: found.name.clone(),
                },
                open_at,
                open_at + 2,
            )));
            out.extend_from_slice(&units[index + 2..found.close]);
            out.push(Unit::Token(Span::new(
                SpanKind::Close { name: found.name },
                close_at,
                close_at + 2,
            )));
            index = found.close + 2;
            continue;
        }
        out.push(units[index].clone());
        index += 1;
    }
    out
}

fn match_invocation(text: &str, units: &[Unit], open: usize) -> Option<InvocationMatch> {
    let bytes = text.as_bytes();
    let name_first = open + 2;
    let mut cursor = name_first;
    while cursor < units.len() && is_name_unit(bytes, &units[cursor]) {
        cursor += 1;
    }
    if cursor == name_first {
        return None;
    }
    let name_raw = units[name_first].start()..units[cursor - 1].end();

    if matches!(units.get(cursor), Some(Unit::Token(span)) if span.is_pipe()) {
        cursor += 1;
        while cursor < units.len() && !is_brace_unit(bytes, &units[cursor]) {
            cursor += 1;
        }
    }

    if byte_at(bytes, units, cursor) == Some(b'}') && byte_at(bytes, units, cursor + 1) == Some(b'}')
    {
        Some(InvocationMatch {
            name: trim_range(text, name_raw),
            close: cursor,
        })
    } else {
        None
    }
}

fn is_name_unit(bytes: &[u8], unit: &Unit) -> bool {
    match unit {
        Unit::Byte(at) => !matches!(bytes[*at], b'<' | b'{' | b'}'),
        Unit::Token(span) => span.kind == SpanKind::Escaped,
    }
}

fn is_brace_unit(bytes: &[u8], unit: &Unit) -> bool {
    matches!(unit, Unit::Byte(at) if matches!(bytes[*at], b'{' | b'}'))
}

/// Narrow `range` of `text` to exclude surrounding whitespace.
pub(crate) fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let raw = &text[range.clone()];
    let leading = raw.len() - raw.trim_start().len();
    let start = range.start + leading;
    start..start + raw.trim().len()
}

fn compress(units: Vec<Unit>) -> Vec<Span> {
    let mut spans = Vec::new();
    for unit in units {
        match unit {
            Unit::Byte(at) => push_text(&mut spans, at, at + 1),
            Unit::Token(span) => spans.push(span),
        }
    }
    spans
}

fn push_text(spans: &mut Vec<Span>, start: usize, end: usize) {
    if let Some(last) = spans.last_mut()
        && last.kind == SpanKind::Text
        && last.end == start
    {
        last.end = end;
        return;
    }
    spans.push(Span::new(SpanKind::Text, start, end));
}
