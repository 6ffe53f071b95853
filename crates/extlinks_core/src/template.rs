use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::delimit::{Delimited, delimit, trim_range};
use crate::params::{Argument, arguments};

/// Which occurrence of a repeated named parameter survives deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    KeepFirst,
    #[default]
    KeepLast,
}

impl DuplicatePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepFirst => "keep-first",
            Self::KeepLast => "keep-last",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RenameRule {
    pub from: String,
    pub to: String,
}

impl RenameRule {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Canonical form used to compare template names: underscores as spaces,
/// collapsed whitespace, no `Template:` prefix, first letter uppercased.
pub fn canonical_template_name(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let bare = match collapsed.split_once(':') {
        Some((prefix, rest)) if prefix.trim().eq_ignore_ascii_case("template") => rest.trim(),
        _ => collapsed.as_str(),
    };
    let mut chars = bare.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Byte ranges of every outermost invocation of one of `names` in `text`.
///
/// An invocation nested inside another match is part of that match and is
/// not reported separately.
pub fn find_invocations<S: AsRef<str>>(text: &str, names: &[S]) -> Vec<Range<usize>> {
    let wanted = names
        .iter()
        .map(|name| canonical_template_name(name.as_ref()))
        .collect::<Vec<_>>();
    let delimited = delimit(text);
    let spans = delimited.spans();

    let mut out: Vec<Range<usize>> = Vec::new();
    for (index, span) in spans.iter().enumerate() {
        if !span.is_open() {
            continue;
        }
        let Some(name) = delimited.name(span) else {
            continue;
        };
        if !wanted.contains(&canonical_template_name(name)) {
            continue;
        }
        if out.last().is_some_and(|last| last.end > span.start) {
            continue;
        }
        if let Some(close) = delimited.matching_close(index) {
            out.push(span.start..spans[close].end);
        }
    }
    out
}

/// Number of arguments, empty ones included.
pub fn argument_count(invocation: &str) -> usize {
    arguments(&delimit(invocation)).len()
}

/// Value of the first argument addressed by `name` (explicit name or ordinal).
pub fn parameter_value(invocation: &str, name: &str) -> Option<String> {
    let delimited = delimit(invocation);
    arguments(&delimited)
        .into_iter()
        .find(|argument| argument.key(invocation) == name)
        .map(|argument| argument.value(invocation).to_string())
}

/// Set `name` to `value`, replacing the first matching argument's value or
/// appending `|name=value` after the last argument.
pub fn set_parameter(invocation: &str, name: &str, value: &str) -> String {
    let delimited = delimit(invocation);
    let found = arguments(&delimited);
    if let Some(argument) = found
        .iter()
        .find(|argument| argument.key(invocation) == name)
    {
        if !argument.is_named() && value.contains('=') {
            return splice(invocation, argument.value.clone(), &format!("{name}={value}"));
        }
        return splice(invocation, argument.value.clone(), value);
    }

    match append_offset(&delimited, &found) {
        Some(at) => splice(invocation, at..at, &format!("|{name}={value}")),
        None => invocation.to_string(),
    }
}

/// Remove every argument addressed by `name`, separator included.
pub fn remove_parameter(invocation: &str, name: &str) -> String {
    let delimited = delimit(invocation);
    let mut out = invocation.to_string();
    for argument in arguments(&delimited)
        .iter()
        .rev()
        .filter(|argument| argument.key(invocation) == name)
    {
        out.replace_range(argument.pipe..argument.end, "");
    }
    out
}

pub fn remove_parameters<S: AsRef<str>>(invocation: &str, names: &[S]) -> String {
    names.iter().fold(invocation.to_string(), |current, name| {
        remove_parameter(&current, name.as_ref())
    })
}

/// Rename explicitly named arguments, one rule at a time and in order.
///
/// Positional arguments are left alone since naming one would renumber the
/// ones after it. A rule whose target name is already present is skipped.
pub fn rename_parameters(invocation: &str, rules: &[RenameRule]) -> String {
    rules.iter().fold(invocation.to_string(), |current, rule| {
        rename_parameter(&current, &rule.from, &rule.to)
    })
}

pub fn rename_parameter(invocation: &str, from: &str, to: &str) -> String {
    if from == to {
        return invocation.to_string();
    }
    let delimited = delimit(invocation);
    let found = arguments(&delimited);
    if found.iter().any(|argument| argument.key(invocation) == to) {
        return invocation.to_string();
    }

    let mut out = invocation.to_string();
    for argument in found.iter().rev() {
        if let Some(name) = &argument.name
            && &invocation[name.clone()] == from
        {
            out.replace_range(name.clone(), to);
        }
    }
    out
}

/// Drop repeated named arguments, keeping one occurrence per name.
///
/// Empty occurrences lose to non-empty ones; among the rest `policy` picks
/// the survivor. Positional collisions are left to the extractor, where the
/// last occurrence wins.
pub fn remove_duplicate_parameters(invocation: &str, policy: DuplicatePolicy) -> String {
    let delimited = delimit(invocation);
    let found = arguments(&delimited);
    let named = found
        .iter()
        .filter(|argument| argument.is_named())
        .collect::<Vec<_>>();

    let mut seen: Vec<String> = Vec::new();
    let mut dropped: Vec<&Argument> = Vec::new();
    for argument in &named {
        let key = argument.key(invocation);
        if seen.contains(&key) {
            continue;
        }
        let group = named
            .iter()
            .copied()
            .filter(|other| other.key(invocation) == key)
            .collect::<Vec<_>>();
        seen.push(key);
        if group.len() < 2 {
            continue;
        }
        let keep = survivor(&group, invocation, policy);
        dropped.extend(
            group
                .into_iter()
                .enumerate()
                .filter(|(index, _)| *index != keep)
                .map(|(_, argument)| argument),
        );
    }

    dropped.sort_by_key(|argument| std::cmp::Reverse(argument.pipe));
    let mut out = invocation.to_string();
    for argument in dropped {
        out.replace_range(argument.pipe..argument.end, "");
    }
    out
}

fn survivor(group: &[&Argument], source: &str, policy: DuplicatePolicy) -> usize {
    let filled = group
        .iter()
        .enumerate()
        .filter(|(_, argument)| !argument.value(source).is_empty())
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    let candidates = if filled.is_empty() {
        (0..group.len()).collect()
    } else {
        filled
    };
    let picked = match policy {
        DuplicatePolicy::KeepFirst => candidates.first(),
        DuplicatePolicy::KeepLast => candidates.last(),
    };
    picked.copied().unwrap_or(0)
}

/// Where a new argument goes: after the last argument's content, or right
/// after the template name of a bare invocation.
fn append_offset(delimited: &Delimited<'_>, found: &[Argument]) -> Option<usize> {
    if let Some(last) = found.last() {
        return Some(last.content_end());
    }
    let spans = delimited.spans();
    let first = spans.iter().position(|span| !delimited.is_blank(span))?;
    let close = delimited.matching_close(first)?;
    let inner = trim_range(delimited.source(), spans[first].end..spans[close].start);
    Some(inner.end)
}

fn splice(text: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..range.start]);
    out.push_str(replacement);
    out.push_str(&text[range.end..]);
    out
}
