use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ExtlinksConfig, TaskConfig};
use crate::delimit::delimit;
use crate::namespace::{MAIN_NAMESPACE, is_main_namespace};
use crate::params::extract_parameters;
use crate::policy::{edit_summary, rewrite_invocation};
use crate::sections::{is_external_links_section, split_to_sections};
use crate::template::{argument_count, find_invocations, remove_duplicate_parameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotMainNamespace,
    NoExternalLinksSection,
    InvocationCount,
    Unchanged,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotMainNamespace => "not-main-namespace",
            Self::NoExternalLinksSection => "no-external-links-section",
            Self::InvocationCount => "invocation-count",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Outcome of processing one article. When `skip` is set, `text` is the
/// original article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleEdit {
    pub text: String,
    pub summary: String,
    pub skip: bool,
    pub skip_reason: Option<SkipReason>,
    /// Qualifying invocations found in the external links section.
    pub invocations: usize,
}

impl ArticleEdit {
    fn skipped(article: &str, summary: String, reason: SkipReason, invocations: usize) -> Self {
        Self {
            text: article.to_string(),
            summary,
            skip: true,
            skip_reason: Some(reason),
            invocations,
        }
    }
}

/// Rewrite the target template in the last "External links" section.
///
/// The edit is committed only when that section holds exactly one invocation
/// with arguments and the trimmed result differs from the trimmed original.
pub fn process_article(
    config: &ExtlinksConfig,
    article: &str,
    title: &str,
    namespace_id: i32,
) -> ArticleEdit {
    let task = &config.task;
    let summary = edit_summary(task);

    if namespace_id != MAIN_NAMESPACE || !is_main_namespace(title, &config.wiki.custom_namespaces)
    {
        debug!(title, namespace_id, "skipping page outside the main namespace");
        return ArticleEdit::skipped(article, summary, SkipReason::NotMainNamespace, 0);
    }

    let mut sections = split_to_sections(article)
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let Some(index) = sections
        .iter()
        .rposition(|section| is_external_links_section(section))
    else {
        debug!(title, "no external links section");
        return ArticleEdit::skipped(article, summary, SkipReason::NoExternalLinksSection, 0);
    };
    debug!(title, section = index, "located external links section");

    let (invocations, rewritten) = rewrite_section(task, &sections[index], title);
    sections[index] = rewritten;

    if invocations != 1 {
        debug!(title, invocations, "expected exactly one qualifying invocation");
        return ArticleEdit::skipped(article, summary, SkipReason::InvocationCount, invocations);
    }

    let joined = sections.concat();
    let updated = joined.trim();
    if updated == article.trim() {
        debug!(title, "invocation already canonical");
        return ArticleEdit::skipped(article, summary, SkipReason::Unchanged, invocations);
    }

    info!(title, "rewrote external links invocation");
    ArticleEdit {
        text: updated.to_string(),
        summary,
        skip: false,
        skip_reason: None,
        invocations,
    }
}

/// Returns the number of qualifying invocations and the rewritten section.
fn rewrite_section(task: &TaskConfig, section: &str, title: &str) -> (usize, String) {
    let names = task.template_names();
    let mut qualifying = 0usize;
    let mut out = section.to_string();

    for range in find_invocations(section, &names).into_iter().rev() {
        let original = &section[range.clone()];
        if argument_count(original) == 0 {
            continue;
        }
        qualifying += 1;

        let deduplicated = remove_duplicate_parameters(original, task.duplicate_policy);
        let parameters = extract_parameters(&delimit(&deduplicated));
        let replacement = rewrite_invocation(task, &parameters, title);
        debug!(original, replacement = %replacement, "rewrote invocation");
        if replacement != original {
            out.replace_range(range, &replacement);
        }
    }

    (qualifying, out)
}
