// Corpus layout: one directory per vulnerability class, one pattern file per document


use fancy_regex::Regex;
use itertools::Itertools;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::IngestError;
use crate::config::CorpusConfig;

static CLASS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("class label pattern is valid"));

/// Whether `label` is an acceptable vulnerability class, e.g. `SQL_INJECTION`
#[inline]
pub fn is_valid_class_label(label: &str) -> bool {
    CLASS_LABEL.is_match(label).unwrap_or(false)
}

/// A pattern file read from disk, before it is assigned an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFile {
    pub path: PathBuf,
    pub vulnerability_class: String,
    pub pattern_name: String,
    /// Path relative to the corpus root, `/`-separated
    pub source_ref: String,
    pub text: String,
    pub title: Option<String>,
}

/// Everything found under a corpus root, in traversal order
#[derive(Debug, Clone, Default)]
pub struct CorpusScan {
    pub files: Vec<PatternFile>,
    pub categories: usize,
    pub skipped: Vec<PathBuf>,
}

/// Resolves category directory names to vulnerability class labels
#[derive(Debug, Clone, Copy)]
pub struct ClassMapper<'a> {
    config: &'a CorpusConfig,
}

impl<'a> ClassMapper<'a> {
    #[inline]
    pub fn new(config: &'a CorpusConfig) -> Self {
        Self { config }
    }

    /// Map a directory name to its class.
    ///
    /// An explicit `[corpus.classes]` entry wins. Otherwise the name is
    /// upper-cased with `-` and spaces turned into `_`, unless strict mode
    /// requires every directory to be mapped.
    #[inline]
    pub fn class_for(&self, directory: &str) -> Result<String, IngestError> {
        let label = match self.config.classes.get(directory) {
            Some(label) => label.clone(),
            None if self.config.strict_classes => {
                return Err(IngestError::InvalidCategory {
                    directory: directory.to_string(),
                    reason: "no entry in [corpus.classes]".to_string(),
                });
            }
            None => directory.trim().to_uppercase().replace(['-', ' '], "_"),
        };

        if !is_valid_class_label(&label) {
            return Err(IngestError::InvalidCategory {
                directory: directory.to_string(),
                reason: format!("class label {label:?} must match [A-Z][A-Z0-9_]*"),
            });
        }

        Ok(label)
    }
}

/// Walk `root` and read every pattern file.
///
/// Directories and files are visited in name order so id assignment is
/// reproducible. Any read failure aborts the scan.
#[inline]
pub fn scan_corpus(root: &Path, config: &CorpusConfig) -> Result<CorpusScan, IngestError> {
    let mapper = ClassMapper::new(config);
    let mut scan = CorpusScan::default();

    for category_path in sorted_entries(root)? {
        let Some(directory) = visible_name(&category_path) else {
            scan.skipped.push(category_path);
            continue;
        };

        if !category_path.is_dir() {
            debug!("Skipping non-directory corpus entry {}", category_path.display());
            scan.skipped.push(category_path);
            continue;
        }

        let vulnerability_class = mapper.class_for(&directory)?;
        scan.categories += 1;
        debug!("Scanning category {} as {}", directory, vulnerability_class);

        for file_path in sorted_entries(&category_path)? {
            let is_pattern = visible_name(&file_path).is_some()
                && file_path.is_file()
                && has_extension(&file_path, &config.extension);

            if !is_pattern {
                debug!("Skipping non-document entry {}", file_path.display());
                scan.skipped.push(file_path);
                continue;
            }

            scan.files.push(read_pattern_file(
                &file_path,
                &directory,
                &vulnerability_class,
            )?);
        }
    }

    if scan.files.is_empty() {
        warn!("No pattern documents found under {}", root.display());
    }

    Ok(scan)
}

/// First heading of a Markdown document, as plain text
#[inline]
pub fn extract_title(text: &str) -> Option<String> {
    let mut in_heading = false;
    let mut title = String::new();

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::Heading { level, .. })
                if matches!(level, HeadingLevel::H1 | HeadingLevel::H2 | HeadingLevel::H3) =>
            {
                in_heading = true;
            }
            Event::End(TagEnd::Heading(_)) if in_heading => {
                let title = title.trim();
                return (!title.is_empty()).then(|| title.to_string());
            }
            Event::Text(fragment) | Event::Code(fragment) if in_heading => {
                title.push_str(&fragment);
            }
            _ => {}
        }
    }

    None
}

fn read_pattern_file(
    path: &Path,
    directory: &str,
    vulnerability_class: &str,
) -> Result<PatternFile, IngestError> {
    let text = fs::read_to_string(path).map_err(|source| IngestError::CorpusRead {
        path: path.to_path_buf(),
        source,
    })?;

    let pattern_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_uppercase())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(PatternFile {
        path: path.to_path_buf(),
        vulnerability_class: vulnerability_class.to_string(),
        pattern_name,
        source_ref: format!("{directory}/{file_name}"),
        title: extract_title(&text),
        text,
    })
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let read_error = |source| IngestError::CorpusRead {
        path: dir.to_path_buf(),
        source,
    };

    let entries = fs::read_dir(dir)
        .map_err(read_error)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?;

    Ok(entries
        .into_iter()
        .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
        .collect())
}

/// File name of a non-hidden entry
fn visible_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
