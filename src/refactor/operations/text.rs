//! Helpers for editing Java declarations as text.

use regex::Regex;
use std::sync::LazyLock;

use crate::lang::java;
use crate::scope::{Declaration, FileInfo, Visibility};
use crate::span::{indentation_at, line_end, line_start, TextRange};

pub(crate) const INDENT: &str = "    ";

static VISIBILITY_WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(public|protected|private)\b").ok());

static MODIFIER_WORD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(^|[^@\w])(abstract|static|final|synchronized|native|transient|volatile|strictfp|default|sealed)\b").ok()
});

/// First non-whitespace offset at or after `offset`.
pub(crate) fn skip_whitespace(text: &str, offset: usize) -> usize {
    let rest = &text[offset.min(text.len())..];
    offset + (rest.len() - rest.trim_start().len())
}

/// Where the declaration proper starts once its modifiers are skipped: the
/// type keyword, type parameters, type or constructor name.
pub(crate) fn head_start(text: &str, decl: &Declaration) -> usize {
    skip_whitespace(text, decl.modifiers.map_or(decl.range.start, |m| m.end))
}

/// The visibility keyword inside the modifiers of `decl`.
pub(crate) fn visibility_keyword(text: &str, decl: &Declaration) -> Option<TextRange> {
    let modifiers = decl.modifiers?;
    let pattern = VISIBILITY_WORD.as_ref()?;
    pattern
        .find(modifiers.slice(text))
        .map(|m| TextRange::new(modifiers.start + m.start(), modifiers.start + m.end()))
}

/// Insertion adding `keyword` (e.g. `static`) to the modifiers of `decl`:
/// right after the visibility keyword, else in front of the declaration.
pub(crate) fn modifier_insertion(text: &str, decl: &Declaration, keyword: &str) -> (usize, String) {
    match visibility_keyword(text, decl) {
        Some(vis) => (vis.end, format!(" {}", keyword)),
        None => (head_start(text, decl), format!("{} ", keyword)),
    }
}

/// Edit giving `decl` the requested visibility, or `None` if it already has it.
pub(crate) fn visibility_edit(
    text: &str,
    decl: &Declaration,
    visibility: Visibility,
) -> Option<(TextRange, String)> {
    let current = visibility_keyword(text, decl);
    match (current, visibility.keyword()) {
        (Some(range), Some(keyword)) => {
            (range.slice(text) != keyword).then(|| (range, keyword.to_string()))
        }
        (Some(range), None) => {
            let end = skip_whitespace(text, range.end);
            Some((TextRange::new(range.start, end), String::new()))
        }
        (None, Some(keyword)) => {
            let at = first_keyword_modifier(text, decl).unwrap_or_else(|| head_start(text, decl));
            Some((TextRange::empty(at), format!("{} ", keyword)))
        }
        (None, None) => None,
    }
}

fn first_keyword_modifier(text: &str, decl: &Declaration) -> Option<usize> {
    let modifiers = decl.modifiers?;
    let pattern = MODIFIER_WORD.as_ref()?;
    let caps = pattern.captures(modifiers.slice(text))?;
    caps.get(2).map(|m| modifiers.start + m.start())
}

/// The lines occupied by a member declaration, including attached leading
/// comments and the trailing newline.
pub(crate) fn member_extent(text: &str, decl: &Declaration, info: Option<&FileInfo>) -> TextRange {
    let mut start = decl.range.start;
    if let Some(info) = info {
        loop {
            let attached = info.comments.iter().find(|c| {
                c.end <= start && text[c.end..start].trim().is_empty()
            });
            match attached {
                Some(comment) => start = comment.start,
                None => break,
            }
        }
    }
    let line = line_start(text, start);
    if text[line..start].trim().is_empty() {
        start = line;
    }

    let mut end = decl.range.end;
    let eol = line_end(text, end);
    if text[end..eol].trim().is_empty() {
        end = eol;
    }
    TextRange::new(start, end)
}

/// Re-indents every line of `block` from `from` to `to`.
pub(crate) fn reindent(block: &str, from: &str, to: &str) -> String {
    let mut out = String::with_capacity(block.len());
    for line in block.split_inclusive('\n') {
        if line.trim().is_empty() {
            out.push_str(if line.ends_with('\n') { "\n" } else { "" });
            continue;
        }
        let stripped = line.strip_prefix(from).unwrap_or_else(|| line.trim_start_matches([' ', '\t']));
        out.push_str(to);
        out.push_str(stripped);
    }
    out
}

/// Where a new member goes in a type body, and the text wrapping it.
pub(crate) struct BodyInsertion {
    pub offset: usize,
    /// Indentation for members of the body.
    pub indent: String,
    pub prefix: String,
    pub suffix: String,
}

/// Insertion point at the end of a type body, just before its closing brace.
pub(crate) fn body_end_insertion(text: &str, body: TextRange) -> BodyInsertion {
    let brace = body.end.saturating_sub(1);
    let brace_line = line_start(text, brace);
    let closing_indent = indentation_at(text, brace).to_string();
    let indent = format!("{}{}", closing_indent, INDENT);
    if text[brace_line..brace].trim().is_empty() {
        let empty = text[body.start + 1..brace].trim().is_empty();
        BodyInsertion {
            offset: brace_line,
            indent,
            prefix: if empty { String::new() } else { "\n".to_string() },
            suffix: String::new(),
        }
    } else {
        BodyInsertion {
            offset: brace,
            indent,
            prefix: "\n".to_string(),
            suffix: closing_indent,
        }
    }
}

impl BodyInsertion {
    /// Wraps a member already indented with `self.indent`.
    ///
    /// Every member after the first is separated from the previous one by
    /// a blank line.
    pub fn wrap(&mut self, member: &str) -> String {
        let mut member = member.to_string();
        if !member.ends_with('\n') {
            member.push('\n');
        }
        let wrapped = format!("{}{}{}", self.prefix, member, self.suffix);
        self.prefix = "\n".to_string();
        wrapped
    }
}

/// A variable name derived from a type name: `Counter` becomes `counter`.
pub(crate) fn variable_name_for(type_name: &str) -> String {
    let mut chars = type_name.chars();
    let name = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
        None => return "value".to_string(),
    };
    if java::is_identifier(&name) {
        name
    } else {
        format!("a{}", type_name)
    }
}

/// Joins a package or outer name and a simple name.
pub(crate) fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// The part of a dotted name before its last segment.
pub(crate) fn parent_name(qualified: &str) -> &str {
    qualified.rsplit_once('.').map_or("", |(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::DeclarationKind;

    fn method(text: &str, modifiers: Option<TextRange>) -> Declaration {
        let mut decl = Declaration::new(
            "run",
            DeclarationKind::Method,
            "A.java",
            TextRange::new(0, text.len()),
            TextRange::new(0, 0),
        );
        decl.modifiers = modifiers;
        decl
    }

    #[test]
    fn test_modifier_insertion() {
        let text = "public void run() {}";
        let decl = method(text, Some(TextRange::new(0, 6)));
        assert_eq!(modifier_insertion(text, &decl, "static"), (6, " static".to_string()));

        let text = "void run() {}";
        let decl = method(text, None);
        assert_eq!(modifier_insertion(text, &decl, "static"), (0, "static ".to_string()));

        let text = "@Override\n    final void run() {}";
        let decl = method(text, Some(TextRange::new(0, 19)));
        assert_eq!(modifier_insertion(text, &decl, "static"), (20, "static ".to_string()));
    }

    #[test]
    fn test_visibility_edit() {
        let text = "public static int x;";
        let decl = method(text, Some(TextRange::new(0, 13)));
        assert_eq!(
            visibility_edit(text, &decl, Visibility::Private),
            Some((TextRange::new(0, 6), "private".to_string()))
        );
        assert_eq!(
            visibility_edit(text, &decl, Visibility::PackagePrivate),
            Some((TextRange::new(0, 7), String::new()))
        );
        assert_eq!(visibility_edit(text, &decl, Visibility::Public), None);

        let text = "@Deprecated static int x;";
        let decl = method(text, Some(TextRange::new(0, 18)));
        assert_eq!(
            visibility_edit(text, &decl, Visibility::Public),
            Some((TextRange::empty(12), "public ".to_string()))
        );
    }

    #[test]
    fn test_member_extent_includes_doc_comment() {
        let text = "class A {\n    /** Doc. */\n    static int x;\n}\n";
        let start = text.find("static").unwrap();
        let end = text.find(';').unwrap() + 1;
        let mut decl = method(text, None);
        decl.range = TextRange::new(start, end);
        let comment_start = text.find("/**").unwrap();
        let info = FileInfo {
            comments: vec![TextRange::new(comment_start, comment_start + 11)],
            ..FileInfo::default()
        };

        let extent = member_extent(text, &decl, Some(&info));
        assert_eq!(extent.slice(text), "    /** Doc. */\n    static int x;\n");
    }

    #[test]
    fn test_reindent_and_body_insertion() {
        assert_eq!(reindent("  a\n\n    b\n", "  ", "    "), "    a\n\n      b\n");

        let text = "class A {}";
        let mut ins = body_end_insertion(text, TextRange::new(8, 10));
        assert_eq!(ins.offset, 9);
        assert_eq!(ins.wrap("    int x;"), "\n    int x;\n");

        let text = "class A {\n    int y;\n}\n";
        let mut ins = body_end_insertion(text, TextRange::new(8, 22));
        assert_eq!(ins.offset, 21);
        assert_eq!(ins.indent, "    ");
        assert_eq!(ins.wrap("    int x;"), "\n    int x;\n");
    }

    #[test]
    fn test_insertion_into_empty_body() {
        let text = "class A {\n}\n";
        let mut ins = body_end_insertion(text, TextRange::new(8, 11));
        assert_eq!(ins.offset, 10);
        assert_eq!(ins.wrap("    int x;"), "    int x;\n");
        assert_eq!(ins.wrap("    int y;"), "\n    int y;\n");
    }

    #[test]
    fn test_names() {
        assert_eq!(variable_name_for("Counter"), "counter");
        assert_eq!(variable_name_for("Class"), "aClass");
        assert_eq!(qualify("", "A"), "A");
        assert_eq!(qualify("com.x", "A"), "com.x.A");
        assert_eq!(parent_name("com.x.A"), "com.x");
        assert_eq!(parent_name("A"), "");
    }
}
