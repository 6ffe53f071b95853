use crate::config::CustomNamespace;

pub const MAIN_NAMESPACE: i32 = 0;

/// Canonical MediaWiki namespaces and their common aliases.
const STANDARD_NAMESPACES: &[(&str, i32)] = &[
    ("Media", -2),
    ("Special", -1),
    ("Talk", 1),
    ("User", 2),
    ("User talk", 3),
    ("Wikipedia", 4),
    ("Project", 4),
    ("WP", 4),
    ("Wikipedia talk", 5),
    ("Project talk", 5),
    ("WT", 5),
    ("File", 6),
    ("Image", 6),
    ("File talk", 7),
    ("Image talk", 7),
    ("MediaWiki", 8),
    ("MediaWiki talk", 9),
    ("Template", 10),
    ("Template talk", 11),
    ("Help", 12),
    ("Help talk", 13),
    ("Category", 14),
    ("Category talk", 15),
    ("Portal", 100),
    ("Portal talk", 101),
    ("Draft", 118),
    ("Draft talk", 119),
    ("TimedText", 710),
    ("TimedText talk", 711),
    ("Module", 828),
    ("Module talk", 829),
];

/// Namespace id implied by the title's prefix; unknown prefixes are part of
/// a main-namespace title.
pub fn namespace_id(title: &str, custom: &[CustomNamespace]) -> i32 {
    let Some((prefix, _)) = title.split_once(':') else {
        return MAIN_NAMESPACE;
    };
    namespace_id_for_name(prefix, custom).unwrap_or(MAIN_NAMESPACE)
}

pub fn is_main_namespace(title: &str, custom: &[CustomNamespace]) -> bool {
    namespace_id(title, custom) == MAIN_NAMESPACE
}

/// Look up a namespace by name or alias, ignoring case, `_` and extra spaces.
pub fn namespace_id_for_name(name: &str, custom: &[CustomNamespace]) -> Option<i32> {
    let wanted = normalize_name(name);
    if wanted.is_empty() {
        return None;
    }
    STANDARD_NAMESPACES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(&wanted))
        .map(|(_, id)| *id)
        .or_else(|| {
            custom
                .iter()
                .find(|namespace| normalize_name(&namespace.name).eq_ignore_ascii_case(&wanted))
                .map(|namespace| namespace.id)
        })
}

fn normalize_name(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
