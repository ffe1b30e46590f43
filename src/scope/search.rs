//! Search scopes and textual usage search.

use regex::Regex;
use std::path::{Path, PathBuf};

use crate::config::RefactorSettings;
use crate::error::Result;
use crate::lang::{Java, Language};
use crate::span::{Span, TextRange};
use crate::storage::SourceStorage;

use super::index::ProgramIndex;
use super::reference::{Occurrence, OccurrenceKind};

/// Where usage queries look.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchScope {
    /// Also report occurrences inside comments.
    pub search_in_comments: bool,
    /// Also report occurrences inside non-source files.
    pub search_in_non_source_files: bool,
    /// Restrict the search to these files.
    pub files: Option<Vec<PathBuf>>,
}

impl SearchScope {
    /// Code references only.
    pub fn code_only() -> Self {
        Self::default()
    }

    /// Uses the search defaults of the workspace settings.
    pub fn from_settings(settings: &RefactorSettings) -> Self {
        Self {
            search_in_comments: settings.search_in_comments,
            search_in_non_source_files: settings.search_in_non_source_files,
            files: None,
        }
    }

    pub fn with_comments(mut self, enabled: bool) -> Self {
        self.search_in_comments = enabled;
        self
    }

    pub fn with_non_source_files(mut self, enabled: bool) -> Self {
        self.search_in_non_source_files = enabled;
        self
    }

    /// Restricts the search to the given files.
    pub fn restrict_to(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.files = Some(files.into_iter().collect());
        self
    }

    /// Returns true if `file` is inside the scope.
    pub fn includes(&self, file: &Path) -> bool {
        match &self.files {
            Some(files) => files.iter().any(|f| f == file),
            None => true,
        }
    }
}

/// Finds textual occurrences of names outside code.
pub struct UsageSearch<'a> {
    index: &'a ProgramIndex,
    storage: &'a dyn SourceStorage,
    settings: &'a RefactorSettings,
}

impl<'a> UsageSearch<'a> {
    pub fn new(
        index: &'a ProgramIndex,
        storage: &'a dyn SourceStorage,
        settings: &'a RefactorSettings,
    ) -> Self {
        Self {
            index,
            storage,
            settings,
        }
    }

    /// Occurrences of `comment_needle` in comments and of `text_needle` in
    /// non-source files, as enabled by `scope`.
    pub fn occurrences(
        &self,
        comment_needle: &str,
        text_needle: &str,
        scope: &SearchScope,
    ) -> Result<Vec<Occurrence>> {
        let mut found = Vec::new();
        if scope.search_in_comments {
            found.extend(self.comment_occurrences(comment_needle, scope)?);
        }
        if scope.search_in_non_source_files {
            found.extend(self.non_source_occurrences(text_needle, scope)?);
        }
        Ok(found)
    }

    /// Whole-word occurrences of `needle` inside comments of indexed files.
    pub fn comment_occurrences(&self, needle: &str, scope: &SearchScope) -> Result<Vec<Occurrence>> {
        let pattern = word_pattern(needle)?;
        let mut found = Vec::new();

        for (path, info) in self.index.files() {
            if info.comments.is_empty() || !scope.includes(path) {
                continue;
            }
            let text = self.storage.read(path)?;
            for comment in &info.comments {
                let body = comment.slice(&text);
                for m in find_words(&pattern, body) {
                    let range = TextRange::new(comment.start + m.start, comment.start + m.end);
                    found.push(Occurrence {
                        span: Span::new(path.clone(), range),
                        kind: OccurrenceKind::Comment,
                        text: range.slice(&text).to_string(),
                    });
                }
            }
        }
        Ok(found)
    }

    /// Whole-name occurrences of `needle` inside non-source files.
    pub fn non_source_occurrences(
        &self,
        needle: &str,
        scope: &SearchScope,
    ) -> Result<Vec<Occurrence>> {
        let pattern = word_pattern(needle)?;
        let mut found = Vec::new();

        for path in self.storage.files()? {
            if Java.matches_path(&path) || !self.settings.is_non_source(&path) || !scope.includes(&path) {
                continue;
            }
            let text = match self.storage.read(&path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!("skipping unreadable file {}: {}", path.display(), e);
                    continue;
                }
            };
            for range in find_words(&pattern, &text) {
                found.push(Occurrence {
                    span: Span::new(path.clone(), range),
                    kind: OccurrenceKind::NonSource,
                    text: range.slice(&text).to_string(),
                });
            }
        }
        Ok(found)
    }
}

fn word_pattern(needle: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(r"\b{}\b", regex::escape(needle)))?)
}

/// Matches of `pattern` that are not part of a longer dotted name on the left.
fn find_words(pattern: &Regex, text: &str) -> Vec<TextRange> {
    pattern
        .find_iter(text)
        .filter(|m| !text[..m.start()].ends_with('.'))
        .map(|m| TextRange::new(m.start(), m.end()))
        .collect()
}
