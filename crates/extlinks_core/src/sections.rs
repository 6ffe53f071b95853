const HIDDEN_TEXT_OPEN: &str = "⌊⌊⌊⌊";
const HIDDEN_TEXT_CLOSE: &str = "⌋⌋⌋⌋";
const MAX_HEADING_LEVEL: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heading<'a> {
    /// Length of the leading `=` run.
    pub leading: usize,
    /// Length of the trailing `=` run.
    pub trailing: usize,
    /// Text between the runs, untrimmed.
    pub text: &'a str,
}

impl Heading<'_> {
    pub fn level(&self) -> usize {
        self.leading.min(self.trailing)
    }

    pub fn title(&self) -> &str {
        self.text.trim()
    }
}

/// Split `text` into sections starting at heading lines.
///
/// The first section is the lead (possibly absent when the text opens with a
/// heading). Concatenating the result reproduces `text` exactly.
pub fn split_to_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut start = 0usize;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        if offset > start && parse_heading(line).is_some() {
            sections.push(&text[start..offset]);
            start = offset;
        }
        offset += line.len();
    }
    if start < text.len() || sections.is_empty() {
        sections.push(&text[start..]);
    }
    sections
}

/// Parse one line as a heading: 1 to 6 `=` on each side, optionally followed
/// by a comment, a `<br />` tag, or hidden-text markup, then whitespace.
pub fn parse_heading(line: &str) -> Option<Heading<'_>> {
    let core = strip_heading_suffix(line.trim_end());
    let leading = core.bytes().take_while(|byte| *byte == b'=').count();
    let trailing = core.bytes().rev().take_while(|byte| *byte == b'=').count();
    if leading == 0 || trailing == 0 || leading + trailing >= core.len() {
        return None;
    }
    if leading > MAX_HEADING_LEVEL || trailing > MAX_HEADING_LEVEL {
        return None;
    }
    Some(Heading {
        leading,
        trailing,
        text: &core[leading..core.len() - trailing],
    })
}

/// `== External links ==` and its variants, at levels 2 to 6.
pub fn is_external_links_heading(line: &str) -> bool {
    let Some(heading) = parse_heading(line) else {
        return false;
    };
    if !(2..=MAX_HEADING_LEVEL).contains(&heading.leading)
        || !(2..=MAX_HEADING_LEVEL).contains(&heading.trailing)
    {
        return false;
    }
    let title = heading.text.trim_matches(' ');
    title.eq_ignore_ascii_case("external links") || title.eq_ignore_ascii_case("external link")
}

pub fn is_external_links_section(section: &str) -> bool {
    section.lines().any(is_external_links_heading)
}

fn strip_heading_suffix(line: &str) -> &str {
    if line.ends_with("-->")
        && let Some(open) = line.find("<!--")
    {
        let before = line[..open].trim_end_matches(' ');
        if before.ends_with('=') {
            return before;
        }
    }

    if line.ends_with('>')
        && let Some(open) = line.rfind('<')
        && is_line_break_tag(&line[open..])
        && line[..open].ends_with('=')
    {
        return &line[..open];
    }

    if let Some(stripped) = line.strip_suffix(HIDDEN_TEXT_CLOSE)
        && let Some(open) = stripped.rfind(HIDDEN_TEXT_OPEN)
    {
        let digits = &stripped[open + HIDDEN_TEXT_OPEN.len()..];
        let before = stripped[..open].trim_end_matches(' ');
        if (1..=4).contains(&digits.len())
            && digits.bytes().all(|byte| byte.is_ascii_digit())
            && before.ends_with('=')
        {
            return before;
        }
    }

    line
}

/// `<br/>`, `< br / >`, `<BR />` and friends.
fn is_line_break_tag(tag: &str) -> bool {
    let Some(inner) = tag
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    else {
        return false;
    };
    let inner = inner.trim_start_matches(' ');
    match inner.get(..2) {
        Some(name) if name.eq_ignore_ascii_case("br") => inner[2..].trim_matches(' ') == "/",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_external_links_heading, is_external_links_section, parse_heading, split_to_sections,
    };

    #[test]
    fn sections_concatenate_back_to_the_text() {
        let text = "Lead line\n\n== History ==\nBody\n=== Detail ===\nMore\n== External links ==\n* x\n";
        let sections = split_to_sections(text);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0], "Lead line\n\n");
        assert_eq!(sections[3], "== External links ==\n* x\n");
        assert_eq!(sections.concat(), text);
    }

    #[test]
    fn text_opening_with_a_heading_has_no_lead() {
        let sections = split_to_sections("== A ==\nx\n== B ==\ny");
        assert_eq!(sections, vec!["== A ==\nx\n", "== B ==\ny"]);
        assert_eq!(split_to_sections(""), vec![""]);
    }

    #[test]
    fn parse_heading_reads_levels_and_title() {
        let heading = parse_heading("=== See also ===\n").expect("heading");
        assert_eq!(heading.level(), 3);
        assert_eq!(heading.title(), "See also");
        assert!(parse_heading("=======x=======").is_none());
        assert!(parse_heading("==").is_none());
        assert!(parse_heading("plain = text").is_none());
    }

    #[test]
    fn external_links_heading_variants() {
        for line in [
            "==External links==",
            "== External links ==",
            "== external link ==",
            "====== External links ======",
            "== External links == <!-- keep -->",
            "== External links ==<br />",
            "== External links ==< BR / >",
            "== External links == ⌊⌊⌊⌊12⌋⌋⌋⌋",
            "== External links ==  \r",
        ] {
            assert!(is_external_links_heading(line), "{line}");
        }
    }

    #[test]
    fn external_links_heading_rejections() {
        for line in [
            "= External links =",
            "======= External links =======",
            "== External links and sources ==",
            "== External links == trailing",
            "== External links == ⌊⌊⌊⌊12345⌋⌋⌋⌋",
            "==\tExternal links ==",
            "External links",
        ] {
            assert!(!is_external_links_heading(line), "{line}");
        }
    }

    #[test]
    fn section_detection_checks_every_line() {
        assert!(is_external_links_section("== External links ==\n* a\n"));
        assert!(!is_external_links_section("== References ==\nExternal links\n"));
    }
}
