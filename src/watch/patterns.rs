// src/watch/patterns.rs

//! Rule target matching and glob expansion.
//!
//! Rule targets are shell-style globs (`*`, `?`, `[seq]`, `[!seq]`). Each
//! target compiles to two anchored regexes:
//!
//! - *recursive*: `*` and `?` may cross `/`, so `docs/*.pdf` also hits
//!   `docs/2024/q1/report.pdf`;
//! - *direct*: `*` and `?` stop at `/`, so only `docs/report.pdf` hits.
//!
//! A rule without `match_recursive` ignores recursive-only hits.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use regex::Regex;

use crate::errors::{Result, TriggerError};
use crate::fs::FileSystem;

/// Outcome of matching one path against one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternHit {
    pub direct: bool,
    pub recursive: bool,
}

impl PatternHit {
    pub fn any(&self) -> bool {
        self.direct || self.recursive
    }

    /// Whether a rule with the given `match_recursive` flag accepts the hit.
    pub fn accepted_by(&self, match_recursive: bool) -> bool {
        self.direct || (match_recursive && self.recursive)
    }
}

/// A target pattern compiled for both matching modes.
#[derive(Clone)]
pub struct PathMatcher {
    pattern: String,
    literal_prefix: String,
    direct: Regex,
    recursive: Regex,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl PathMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let compile = |re: String| {
            Regex::new(&re).map_err(|source| TriggerError::PatternError {
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(Self {
            pattern: pattern.to_string(),
            literal_prefix: literal_prefix(pattern).to_string(),
            direct: compile(translate(pattern, false))?,
            recursive: compile(translate(pattern, true))?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Everything before the first wildcard. A path that does not start
    /// with it can never match.
    pub fn literal_prefix(&self) -> &str {
        &self.literal_prefix
    }

    pub fn matches(&self, path: &str) -> PatternHit {
        if !path.starts_with(&self.literal_prefix) {
            return PatternHit::default();
        }
        PatternHit {
            direct: self.direct.is_match(path),
            recursive: self.recursive.is_match(path),
        }
    }
}

/// One-shot helper: compile `pattern` and match `path` against it.
pub fn matches(pattern: &str, path: &str) -> Result<PatternHit> {
    Ok(PathMatcher::new(pattern)?.matches(path))
}

pub fn has_magic(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?', '[']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

/// Translate a shell glob into an anchored regex, `fnmatch` style.
fn translate(pattern: &str, recursive: bool) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let (any, one) = if recursive {
        (".*", ".")
    } else {
        ("[^/]*", "[^/]")
    };

    let mut out = String::from("^(?s:");
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                // Collapse runs; `**` means the same as `*` here.
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                out.push_str(any);
            }
            '?' => out.push_str(one),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i..end]));
                    i = end + 1;
                }
                None => out.push_str("\\["),
            },
            other => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    out.push_str(")\\z");
    out
}

/// Index of the `]` closing a class that starts at `start`, if any. A `]`
/// directly after `[` or `[!` is a literal member.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    (j < chars.len()).then_some(j)
}

fn translate_class(body: &[char]) -> String {
    let (negated, body) = match body.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, body),
    };

    let mut out = String::from("[");
    if negated {
        out.push('^');
    }
    for (k, &c) in body.iter().enumerate() {
        let is_range = c == '-' && k > 0 && k + 1 < body.len();
        if !is_range && matches!(c, '\\' | '[' | ']' | '&' | '~' | '-' | '^') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(']');
    out
}

/// Expand `pattern` (relative, `/`-separated) below `root` the way a shell
/// would: each wildcard component is matched against directory entries,
/// hidden entries only when the component itself starts with a dot.
///
/// Only existing paths are returned, sorted.
pub fn expand_glob(fs: &dyn FileSystem, root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let mut candidates = vec![root.to_path_buf()];

    for component in pattern.split('/').filter(|c| !c.is_empty() && *c != ".") {
        let mut next = Vec::new();
        if has_magic(component) {
            let escaped = component.replace('{', "[{]").replace('}', "[}]");
            let matcher = GlobBuilder::new(&escaped)
                .literal_separator(true)
                .backslash_escape(false)
                .build()
                .map_err(|e| TriggerError::ConfigError(format!("invalid glob '{pattern}': {e}")))?
                .compile_matcher();
            let allow_hidden = component.starts_with('.');

            for dir in &candidates {
                // Vanished or non-directory parents simply yield nothing.
                let Ok(entries) = fs.read_dir(dir) else {
                    continue;
                };
                for entry in entries {
                    let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    if name.starts_with('.') && !allow_hidden {
                        continue;
                    }
                    if matcher.is_match(name) {
                        next.push(entry);
                    }
                }
            }
        } else {
            next.extend(candidates.iter().map(|dir| dir.join(component)));
        }
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }

    candidates.retain(|p| p != root && fs.exists(p));
    candidates.sort();
    candidates.dedup();
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn translate_anchors_and_escapes() {
        assert_eq!(translate("a.txt", true), "^(?s:a\\.txt)\\z");
        assert_eq!(translate("*.csv", false), "^(?s:[^/]*\\.csv)\\z");
        assert_eq!(translate("[!a-c]x", true), "^(?s:[^a-c]x)\\z");
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        let hit = matches("/d/[abc", "/d/[abc").unwrap();
        assert!(hit.direct && hit.recursive);
    }

    #[test]
    fn bracket_with_leading_close_is_member() {
        assert!(matches("/d/[]x]", "/d/]").unwrap().direct);
        assert!(matches("/d/[]x]", "/d/x").unwrap().direct);
    }

    #[test]
    fn question_mark_does_not_cross_separator_directly() {
        let hit = matches("/d/a?b", "/d/a/b").unwrap();
        assert!(!hit.direct);
        assert!(hit.recursive);
    }

    #[test]
    fn expand_glob_skips_hidden_entries_unless_asked() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/out/a.txt", "");
        fs.add_file("/w/out/.b.txt", "");
        fs.add_file("/w/other/c.txt", "");

        let root = Path::new("/w");
        assert_eq!(
            expand_glob(&fs, root, "out/*.txt").unwrap(),
            vec![PathBuf::from("/w/out/a.txt")]
        );
        assert_eq!(
            expand_glob(&fs, root, "out/.*.txt").unwrap(),
            vec![PathBuf::from("/w/out/.b.txt")]
        );
        assert_eq!(
            expand_glob(&fs, root, "*/*.txt").unwrap(),
            vec![PathBuf::from("/w/other/c.txt"), PathBuf::from("/w/out/a.txt")]
        );
    }

    #[test]
    fn expand_glob_without_magic_requires_existence() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/x.txt", "");
        let root = Path::new("/w");
        assert_eq!(
            expand_glob(&fs, root, "x.txt").unwrap(),
            vec![PathBuf::from("/w/x.txt")]
        );
        assert!(expand_glob(&fs, root, "missing.txt").unwrap().is_empty());
    }
}
