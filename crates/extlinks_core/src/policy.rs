use crate::config::TaskConfig;
use crate::params::ParameterMap;
use crate::template::{
    parameter_value, remove_parameter, remove_parameters, rename_parameters, set_parameter,
};

/// Build the replacement invocation for one extracted parameter mapping.
///
/// Empty values are dropped, spacing around separators is collapsed, the
/// delete set is removed, page-name defaults are removed when they repeat the
/// title, and the rename rules run last.
pub fn rewrite_invocation(task: &TaskConfig, parameters: &ParameterMap, title: &str) -> String {
    let mut invocation = format!("{{{{{}}}}}", task.target_template);
    for (key, value) in parameters.iter().filter(|(_, value)| !value.is_empty()) {
        invocation = set_parameter(&invocation, key, value);
    }
    invocation = collapse_pipe_spacing(&invocation);
    invocation = remove_parameters(&invocation, &task.remove_parameters);

    let base = strip_disambiguator(title);
    for name in &task.pagename_parameters {
        if parameter_value(&invocation, name).as_deref() == Some(base) {
            invocation = remove_parameter(&invocation, name);
        }
    }

    rename_parameters(&invocation, &task.rename)
}

/// Drop a trailing ` (disambiguator)` from a page title.
///
/// The parenthetical must be non-empty, contain no `)` and sit at the very
/// end, preceded by at least one space.
pub fn strip_disambiguator(title: &str) -> &str {
    let Some(body) = title.strip_suffix(')') else {
        return title;
    };
    let tail_start = body.rfind(')').map_or(0, |at| at + 1);
    for (offset, _) in body[tail_start..].match_indices('(') {
        let open = tail_start + offset;
        let before = &body[..open];
        let base = before.trim_end_matches(' ');
        if base.len() < before.len() && open + 1 < body.len() {
            return base;
        }
    }
    title
}

/// Remove spaces on either side of every `|`.
pub fn collapse_pipe_spacing(text: &str) -> String {
    let pieces = text.split('|').collect::<Vec<_>>();
    let last = pieces.len().saturating_sub(1);
    let mut out = String::with_capacity(text.len());
    for (index, piece) in pieces.into_iter().enumerate() {
        let mut piece = piece;
        if index > 0 {
            out.push('|');
            piece = piece.trim_start_matches(' ');
        }
        if index < last {
            piece = piece.trim_end_matches(' ');
        }
        out.push_str(piece);
    }
    out
}

pub fn edit_summary(task: &TaskConfig) -> String {
    let mut summary = format!(
        "Remove {{{{{}}}}} parameter(s) migrated to Wikidata",
        task.target_template
    );
    if let Some(oldid) = task.request_oldid() {
        summary.push_str(&format!(" per [[Special:Permalink/{oldid}#Requests|request]]"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::{collapse_pipe_spacing, edit_summary, rewrite_invocation, strip_disambiguator};
    use crate::config::TaskConfig;
    use crate::delimit::delimit;
    use crate::params::extract_parameters;

    fn rewrite(invocation: &str, title: &str) -> String {
        let task = TaskConfig::default();
        let parameters = extract_parameters(&delimit(invocation));
        rewrite_invocation(&task, &parameters, title)
    }

    #[test]
    fn disambiguators_are_stripped_only_at_the_end() {
        assert_eq!(strip_disambiguator("Example Page (band)"), "Example Page");
        assert_eq!(strip_disambiguator("Example Page  (2004 film)"), "Example Page");
        assert_eq!(strip_disambiguator("Example Page"), "Example Page");
        assert_eq!(strip_disambiguator("Example(band)"), "Example(band)");
        assert_eq!(strip_disambiguator("Example ()"), "Example ()");
        assert_eq!(strip_disambiguator("Example (a) b"), "Example (a) b");
        assert_eq!(strip_disambiguator("Example (a (b)"), "Example");
    }

    #[test]
    fn pipe_spacing_collapses_on_both_sides() {
        assert_eq!(collapse_pipe_spacing("{{T | a = 1 |b}}"), "{{T|a = 1|b}}");
        assert_eq!(collapse_pipe_spacing("no pipes "), "no pipes ");
    }

    #[test]
    fn removes_id_and_pagename_default() {
        assert_eq!(
            rewrite("{{Template name|1=12345|2=Example Page|other=kept}}", "Example Page"),
            "{{Template name|other=kept}}"
        );
    }

    #[test]
    fn pagename_default_ignores_the_disambiguator() {
        assert_eq!(
            rewrite("{{Template name|id=1|name=Example Page}}", "Example Page (film)"),
            "{{Template name}}"
        );
    }

    #[test]
    fn differing_name_is_renamed_not_removed() {
        assert_eq!(
            rewrite("{{template name|12345|Other Title}}", "Example Page"),
            "{{Template name|name=Other Title}}"
        );
    }

    #[test]
    fn empty_values_are_dropped() {
        assert_eq!(
            rewrite("{{Template name|id=|name=|extra = x }}", "Page"),
            "{{Template name|extra=x}}"
        );
    }

    #[test]
    fn nested_values_survive_intact() {
        assert_eq!(
            rewrite("{{Template name|1=5|title={{Lang|fr|Titre}}}}", "Page"),
            "{{Template name|title={{Lang|fr|Titre}}}}"
        );
    }

    #[test]
    fn summary_links_the_request_when_configured() {
        let task = TaskConfig::default();
        assert_eq!(
            edit_summary(&task),
            "Remove {{Template name}} parameter(s) migrated to Wikidata per [[Special:Permalink/999999999#Requests|request]]"
        );
        let bare = TaskConfig {
            request_oldid: None,
            ..TaskConfig::default()
        };
        assert_eq!(
            edit_summary(&bare),
            "Remove {{Template name}} parameter(s) migrated to Wikidata"
        );
    }
}
