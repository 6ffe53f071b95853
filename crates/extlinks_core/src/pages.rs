use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::CustomNamespace;
use crate::namespace::{MAIN_NAMESPACE, namespace_id_for_name};
use crate::runtime::ResolvedPaths;

pub const MAIN_FOLDER: &str = "Main";

/// A local page under `wiki_content/`.
#[derive(Debug, Clone, Serialize)]
pub struct PageFile {
    #[serde(skip)]
    pub path: PathBuf,
    pub relative_path: String,
    pub title: String,
    pub namespace_id: i32,
}

/// Every `.wiki` file under the content directory, sorted by relative path.
pub fn scan_pages(paths: &ResolvedPaths, custom: &[CustomNamespace]) -> Result<Vec<PageFile>> {
    let mut pages = Vec::new();
    if !paths.wiki_content_dir.exists() {
        return Ok(pages);
    }

    for entry in WalkDir::new(&paths.wiki_content_dir).follow_links(false) {
        let entry = entry
            .with_context(|| format!("failed to walk {}", paths.wiki_content_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("wiki") {
            continue;
        }
        validate_scoped_path(paths, path)?;
        let relative = path
            .strip_prefix(&paths.wiki_content_dir)
            .with_context(|| {
                format!(
                    "failed to derive relative path from {} for {}",
                    paths.wiki_content_dir.display(),
                    path.display()
                )
            })?;
        let relative = normalize_separators(&relative.to_string_lossy());
        let title = content_path_to_title(&relative, custom);
        let namespace_id = folder_namespace_id(&relative, custom);
        pages.push(PageFile {
            path: path.to_path_buf(),
            relative_path: relative,
            title,
            namespace_id,
        });
    }

    pages.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    Ok(pages)
}

/// Title for a path relative to `wiki_content/`: `Main/` is the main
/// namespace, other folders become a `Folder:` prefix.
pub fn content_path_to_title(content_rel_path: &str, custom: &[CustomNamespace]) -> String {
    let normalized = normalize_separators(content_rel_path);
    let segments = normalized
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    let Some((folder, rest)) = segments.split_first() else {
        return String::new();
    };
    let filename = rest.last().copied().unwrap_or(*folder);
    let name = decode_segment(filename.strip_suffix(".wiki").unwrap_or(filename));
    if rest.is_empty() || *folder == MAIN_FOLDER {
        return name;
    }
    let prefix = custom
        .iter()
        .find(|namespace| namespace.folder() == *folder)
        .map_or(*folder, |namespace| namespace.name.as_str());
    format!("{prefix}:{name}")
}

fn folder_namespace_id(content_rel_path: &str, custom: &[CustomNamespace]) -> i32 {
    let Some((folder, rest)) = content_rel_path.split_once('/') else {
        return MAIN_NAMESPACE;
    };
    if folder == MAIN_FOLDER || rest.is_empty() {
        return MAIN_NAMESPACE;
    }
    custom
        .iter()
        .find(|namespace| namespace.folder() == folder)
        .map(|namespace| namespace.id)
        .or_else(|| namespace_id_for_name(folder, custom))
        .unwrap_or(MAIN_NAMESPACE)
}

pub fn read_page(page: &PageFile) -> Result<String> {
    fs::read_to_string(&page.path).with_context(|| format!("failed to read {}", page.path.display()))
}

pub fn write_page(paths: &ResolvedPaths, page: &PageFile, content: &str) -> Result<()> {
    validate_scoped_path(paths, &page.path)?;
    fs::write(&page.path, content)
        .with_context(|| format!("failed to write {}", page.path.display()))
}

/// Reject paths that leave the content directory.
pub fn validate_scoped_path(paths: &ResolvedPaths, candidate: &Path) -> Result<()> {
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        paths.project_root.join(candidate)
    };
    let normalized = normalize_pathbuf(&absolute);
    let allowed = normalize_pathbuf(&paths.wiki_content_dir);
    if normalized.starts_with(&allowed) {
        return Ok(());
    }
    bail!(
        "path escapes the content directory: {}\nallowed root: {}",
        display_path(&normalized),
        display_path(&allowed)
    )
}

fn decode_segment(value: &str) -> String {
    value
        .replace("___", "/")
        .replace("--", ":")
        .replace('_', " ")
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn display_path(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::tempdir;

    use super::{content_path_to_title, read_page, scan_pages, validate_scoped_path, write_page};
    use crate::config::CustomNamespace;
    use crate::runtime::{ResolvedPaths, ValueSource};

    fn paths(root: &Path) -> ResolvedPaths {
        let project_root = root.to_path_buf();
        ResolvedPaths {
            wiki_content_dir: project_root.join("wiki_content"),
            state_dir: project_root.join(".extlinks"),
            config_path: project_root.join(".extlinks").join("config.toml"),
            project_root,
            root_source: ValueSource::Flag,
            config_source: ValueSource::Default,
        }
    }

    fn lore() -> Vec<CustomNamespace> {
        vec![CustomNamespace {
            name: "Lore".to_string(),
            id: 3000,
            folder: Some("LoreFiles".to_string()),
        }]
    }

    #[test]
    fn titles_decode_from_paths() {
        assert_eq!(content_path_to_title("Main/Example_Page.wiki", &[]), "Example Page");
        assert_eq!(
            content_path_to_title("Main/AC___DC--Live_(album).wiki", &[]),
            "AC/DC:Live (album)"
        );
        assert_eq!(
            content_path_to_title("Category\\Films.wiki", &[]),
            "Category:Films"
        );
        assert_eq!(
            content_path_to_title("LoreFiles/Origins.wiki", &lore()),
            "Lore:Origins"
        );
        assert_eq!(content_path_to_title("Loose.wiki", &[]), "Loose");
    }

    #[test]
    fn scan_pages_walks_wiki_files_with_namespaces() {
        let temp = tempdir().expect("tempdir");
        let paths = paths(temp.path());
        let main = paths.wiki_content_dir.join("Main");
        let category = paths.wiki_content_dir.join("Category");
        let lore_dir = paths.wiki_content_dir.join("LoreFiles");
        for dir in [&main, &category, &lore_dir] {
            fs::create_dir_all(dir).expect("create dir");
        }
        fs::write(main.join("Beta.wiki"), "b").expect("write");
        fs::write(main.join("Alpha.wiki"), "a").expect("write");
        fs::write(main.join("notes.txt"), "skip").expect("write");
        fs::write(category.join("Films.wiki"), "c").expect("write");
        fs::write(lore_dir.join("Origins.wiki"), "l").expect("write");

        let pages = scan_pages(&paths, &lore()).expect("scan");
        let summary = pages
            .iter()
            .map(|page| (page.title.as_str(), page.namespace_id))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("Category:Films", 14),
                ("Lore:Origins", 3000),
                ("Alpha", 0),
                ("Beta", 0),
            ]
        );
        assert_eq!(pages[2].relative_path, "Main/Alpha.wiki");
        assert_eq!(read_page(&pages[2]).expect("read"), "a");
    }

    #[test]
    fn scan_pages_tolerates_missing_content_dir() {
        let temp = tempdir().expect("tempdir");
        let pages = scan_pages(&paths(temp.path()), &[]).expect("scan");
        assert!(pages.is_empty());
    }

    #[test]
    fn write_page_replaces_content() {
        let temp = tempdir().expect("tempdir");
        let paths = paths(temp.path());
        let main = paths.wiki_content_dir.join("Main");
        fs::create_dir_all(&main).expect("create dir");
        fs::write(main.join("Page.wiki"), "old").expect("write");

        let pages = scan_pages(&paths, &[]).expect("scan");
        write_page(&paths, &pages[0], "new").expect("write page");
        assert_eq!(fs::read_to_string(main.join("Page.wiki")).expect("read"), "new");
    }

    #[test]
    fn scoped_paths_stay_inside_content_dir() {
        let paths = paths(Path::new("/repo"));
        validate_scoped_path(&paths, Path::new("wiki_content/Main/A.wiki")).expect("inside");
        let err = validate_scoped_path(&paths, &PathBuf::from("wiki_content/../secrets.txt"))
            .expect_err("must fail");
        assert!(err.to_string().contains("path escapes the content directory"));
    }
}
