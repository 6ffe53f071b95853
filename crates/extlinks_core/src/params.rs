use std::ops::Range;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::delimit::{Delimited, trim_range};

/// Ordered parameter mapping.
///
/// Keys keep the position of their first occurrence; a repeated key replaces
/// the stored value, so the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    entries: Vec<(String, String)>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`, returning the replaced value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(name, _)| *name == key) {
            return Some(std::mem::replace(existing, value));
        }
        self.entries.push((key, value));
        None
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ParameterMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One top-level argument of a delimited invocation, as byte ranges of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Offset of the separating `|`.
    pub pipe: usize,
    /// End of the raw segment (next separator, closing braces, or end of body).
    pub end: usize,
    /// Trimmed explicit name, for `name=value` segments.
    pub name: Option<Range<usize>>,
    /// Trimmed value.
    pub value: Range<usize>,
    /// 1-based position among unnamed arguments.
    pub ordinal: Option<usize>,
}

impl Argument {
    /// Key under which the argument is addressed: its name or its ordinal.
    pub fn key(&self, source: &str) -> String {
        match (&self.name, self.ordinal) {
            (Some(name), _) => source[name.clone()].to_string(),
            (None, Some(ordinal)) => ordinal.to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn value<'s>(&self, source: &'s str) -> &'s str {
        &source[self.value.clone()]
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// Offset just past the last non-whitespace byte of the segment.
    pub fn content_end(&self) -> usize {
        let name_end = self.name.as_ref().map_or(0, |name| name.end);
        self.value.end.max(name_end).max(self.pipe + 1)
    }
}

/// Top-level arguments of a delimited invocation.
///
/// When the text is a single invocation its wrapper is stripped; child
/// invocations are flattened so their separators never split the parent's
/// argument list. Whatever precedes the first separator (the template name)
/// is not an argument.
pub fn arguments(delimited: &Delimited<'_>) -> Vec<Argument> {
    let source = delimited.source();
    let body = template_body(delimited);
    let spans = delimited.undelimit_nested(body);

    let mut out = Vec::new();
    let mut unnamed = 0usize;
    let mut pending: Option<usize> = None;
    let body_end = spans.last().map_or(0, |span| span.end);

    for span in spans.iter().filter(|span| span.is_pipe()) {
        if let Some(pipe) = pending.replace(span.start) {
            out.push(classify(source, pipe, span.start, &mut unnamed));
        }
    }
    if let Some(pipe) = pending {
        out.push(classify(source, pipe, body_end, &mut unnamed));
    }
    out
}

/// Extract the parameter mapping of one delimited invocation.
///
/// Unnamed arguments are keyed `"1"`, `"2"`, ... counting only unnamed
/// segments; a repeated key keeps its last value. Malformed input yields an
/// empty or partial map.
pub fn extract_parameters(delimited: &Delimited<'_>) -> ParameterMap {
    let source = delimited.source();
    let mut parameters = ParameterMap::new();
    for argument in arguments(delimited) {
        parameters.insert(argument.key(source), argument.value(source));
    }
    parameters
}

/// Span indices of the invocation body when the text is exactly one
/// invocation (surrounding whitespace aside), otherwise every span.
fn template_body(delimited: &Delimited<'_>) -> Range<usize> {
    let spans = delimited.spans();
    let first = spans.iter().position(|span| !delimited.is_blank(span));
    let last = spans.iter().rposition(|span| !delimited.is_blank(span));
    if let (Some(first), Some(last)) = (first, last)
        && spans[first].is_open()
        && delimited.matching_close(first) == Some(last)
    {
        return first + 1..last;
    }
    0..spans.len()
}

fn classify(source: &str, pipe: usize, end: usize, unnamed: &mut usize) -> Argument {
    let segment = trim_range(source, pipe + 1..end);
    let text = &source[segment.clone()];
    match text.find('=') {
        Some(equals) if equals > 0 => {
            let equals = segment.start + equals;
            Argument {
                pipe,
                end,
                name: Some(trim_range(source, segment.start..equals)),
                value: trim_range(source, equals + 1..segment.end),
                ordinal: None,
            }
        }
        _ => {
            *unnamed += 1;
            Argument {
                pipe,
                end,
                name: None,
                value: segment,
                ordinal: Some(*unnamed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ParameterMap, arguments, extract_parameters};
    use crate::delimit::delimit;

    fn extract(text: &str) -> Vec<(String, String)> {
        extract_parameters(&delimit(text))
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn unnamed_parameters_are_numbered_in_order() {
        assert_eq!(
            extract("{{T|a|b|c}}"),
            pairs(&[("1", "a"), ("2", "b"), ("3", "c")])
        );
    }

    #[test]
    fn ordinals_count_only_unnamed_segments() {
        assert_eq!(
            extract("{{T|a|name=b|c}}"),
            pairs(&[("1", "a"), ("name", "b"), ("2", "c")])
        );
    }

    #[test]
    fn last_duplicate_wins_and_keeps_first_position() {
        assert_eq!(extract("{{T|id=1|id=2}}"), pairs(&[("id", "2")]));
        assert_eq!(
            extract("{{T|a|x=1|1=b}}"),
            pairs(&[("1", "b"), ("x", "1")])
        );
    }

    #[test]
    fn whitespace_around_separators_and_names_is_trimmed() {
        assert_eq!(
            extract("{{ T \n | first name = Ada \n|  b  \n| c=\n}}"),
            pairs(&[("first name", "Ada"), ("1", "b"), ("c", "")])
        );
    }

    #[test]
    fn value_keeps_everything_after_the_first_equals() {
        assert_eq!(
            extract("{{T|url=https://x.test/?a=b|=lead}}"),
            pairs(&[("url", "https://x.test/?a=b"), ("1", "=lead")])
        );
    }

    #[test]
    fn empty_segments_still_take_an_ordinal() {
        assert_eq!(
            extract("{{T|a||b}}"),
            pairs(&[("1", "a"), ("2", ""), ("3", "b")])
        );
    }

    #[test]
    fn literal_blocks_are_kept_untouched() {
        assert_eq!(
            extract("{{T|<nowiki>{{X}}</nowiki>}}"),
            pairs(&[("1", "<nowiki>{{X}}</nowiki>")])
        );
    }

    #[test]
    fn nested_templates_are_flattened_into_the_value() {
        assert_eq!(
            extract("{{T|date={{Date|2020|1}}|{{X}}|y}}"),
            pairs(&[("date", "{{Date|2020|1}}"), ("1", "{{X}}"), ("2", "y")])
        );
    }

    #[test]
    fn sibling_children_with_the_same_name_stay_separate() {
        assert_eq!(
            extract("{{T|x={{B|1}}|y={{B|2}}}}"),
            pairs(&[("x", "{{B|1}}"), ("y", "{{B|2}}")])
        );
    }

    #[test]
    fn wikilink_labels_do_not_split_values() {
        assert_eq!(
            extract("{{T|title=[[Foo|Bar]]}}"),
            pairs(&[("title", "[[Foo|Bar]]")])
        );
    }

    #[test]
    fn bare_invocation_has_no_parameters() {
        assert!(extract("{{T}}").is_empty());
        assert!(extract("").is_empty());
        assert!(extract("no template here").is_empty());
    }

    #[test]
    fn residue_beyond_the_pass_limit_still_extracts() {
        let mut text = String::from("core");
        for level in 0..12 {
            text = format!("{{{{L{level}|{text}}}}}");
        }
        let delimited = delimit(&text);
        let parameters = extract_parameters(&delimited);
        assert!(!parameters.is_empty());
        assert!(arguments(&delimited).iter().all(|argument| argument.ordinal.is_some()));
    }

    #[test]
    fn argument_ranges_point_into_the_source() {
        let text = "{{T| a = 1 |b}}";
        let delimited = delimit(text);
        let found = arguments(&delimited);
        assert_eq!(found.len(), 2);
        assert_eq!(&text[found[0].name.clone().expect("name")], "a");
        assert_eq!(found[0].value(text), "1");
        assert_eq!(found[0].key(text), "a");
        assert_eq!(found[1].key(text), "1");
        assert_eq!(found[1].end, text.len() - 2);
    }

    #[test]
    fn parameter_map_serializes_in_order() {
        let mut map = ParameterMap::new();
        map.insert("z", "1");
        map.insert("a", "2");
        assert_eq!(map.insert("z", "3"), Some("1".to_string()));
        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, r#"{"z":"3","a":"2"}"#);
    }
}
