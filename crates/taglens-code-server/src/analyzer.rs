use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use taglens_core::{RefResponse, Result, SymbolInfo, SymbolResponse, TagLensError};
use tokio::process::Command;
use tracing::{debug, warn};

/// Hard cap on any single indexer invocation.
const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// One line of `ctags --output-format=json`. `end` and `typeref` are absent
/// for prototypes and typedef aliases, which is what drives the chase below.
#[derive(Debug, Clone, Deserialize)]
pub struct CtagsEntry {
    pub name: String,
    pub kind: String,
    pub line: Option<u32>,
    pub end: Option<u32>,
    pub typeref: Option<String>,
}

/// Front-end over the `.tsj` tag index of a single repository. Stateless
/// apart from the two immutable directory paths, so handlers may query it
/// concurrently.
pub struct CodeAnalyzer {
    code_dir: PathBuf,
    binary_dir: PathBuf,
}

impl CodeAnalyzer {
    pub fn new(code_dir: impl AsRef<Path>, binary_dir: impl AsRef<Path>) -> Result<Self> {
        let code_dir = std::fs::canonicalize(code_dir.as_ref())?;
        Ok(Self {
            code_dir,
            binary_dir: binary_dir.as_ref().to_path_buf(),
        })
    }

    pub fn code_dir(&self) -> &Path {
        &self.code_dir
    }

    fn binary(&self, name: &str) -> PathBuf {
        self.binary_dir.join(name)
    }

    async fn run_tool(&self, name: &str, args: &[&str], envs: &[(&str, String)]) -> Result<String> {
        let mut cmd = Command::new(self.binary(name));
        cmd.args(args)
            .current_dir(&self.code_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let output = tokio::time::timeout(TOOL_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                TagLensError::ExternalTool(format!(
                    "{name} timed out after {}s",
                    TOOL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| TagLensError::ExternalTool(format!("failed to spawn {name}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TagLensError::ExternalTool(format!(
                "{name} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Inclusive 1-based slice of a repo-relative file, joined with `\n`.
    pub fn code_content(&self, file: &str, line: u32, end: u32) -> Result<String> {
        let path = self.code_dir.join(file);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| TagLensError::ExternalTool(format!("failed to read {file}: {e}")))?;

        let lines: Vec<&str> = text.split('\n').collect();
        if line < 1 || end < line || end as usize > lines.len() {
            return Err(TagLensError::InvalidRange(format!(
                "invalid line range {line}-{end} for file {file}"
            )));
        }

        Ok(lines[line as usize - 1..end as usize].join("\n"))
    }

    async fn ctags_entries(&self, file: &str) -> Result<Vec<CtagsEntry>> {
        let output = self
            .run_tool(
                "ctags",
                &["--fields=+ne-P", "--output-format=json", "-o", "-", file],
                &[],
            )
            .await?;
        Ok(parse_ctags_lines(&output))
    }

    /// Resolve a symbol to its definitions, chasing typerefs to the
    /// underlying type when a tag has no body of its own.
    pub async fn symbol_info(&self, symbol: &str) -> SymbolResponse {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return SymbolResponse::failed("symbol not found");
        }

        let output = match self
            .run_tool("readtags", &["-t", ".tsj/tags", &symbol], &[])
            .await
        {
            Ok(output) => output,
            Err(err) => {
                return SymbolResponse::failed(format!("readtags command failed: {err}"));
            }
        };

        let trimmed = output.trim();
        if trimmed.is_empty() {
            return SymbolResponse::failed("symbol not found");
        }

        let mut res_list = Vec::new();
        for tag_line in trimmed.lines() {
            let fields: Vec<&str> = tag_line.split_whitespace().collect();
            if fields.len() < 2 {
                debug!(tag_line, "skipping malformed tag line");
                continue;
            }
            let file = fields[1];

            let entries = match self.ctags_entries(file).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(file, %err, "ctags failed for tag file");
                    continue;
                }
            };

            if let Some(info) =
                resolve_in_entries(&entries, &symbol, file, |line, end| {
                    self.code_content(file, line, end)
                })
            {
                res_list.push(info);
            }
        }

        SymbolResponse::success(res_list)
    }

    /// Enumerate the bodies of every function that references `symbol`,
    /// deduplicated by exact text.
    pub async fn find_all_refs(&self, symbol: &str) -> RefResponse {
        let repo = self.code_dir.to_string_lossy().into_owned();
        let db_path = self.code_dir.join(".tsj").to_string_lossy().into_owned();
        let envs = [("GTAGSROOT", repo), ("GTAGSDBPATH", db_path)];

        let output = match self.run_tool("global", &["-xsr", symbol], &envs).await {
            Ok(output) => output,
            Err(err) => return RefResponse::failed(format!("global command failed: {err}")),
        };

        let mut callers = Vec::new();
        let mut seen = HashSet::new();
        for ref_line in output.trim().lines() {
            // cscope-style output: <callee> <line> <file> <source...>
            let fields: Vec<&str> = ref_line.split_whitespace().collect();
            if fields.len() < 4 {
                continue;
            }
            let Ok(line_num) = fields[1].parse::<u32>() else {
                continue;
            };
            let file = fields[2];

            let body = match self.enclosing_function(file, line_num).await {
                Ok(Some(body)) => body,
                Ok(None) => continue,
                Err(err) => {
                    debug!(file, line_num, %err, "skipping reference site");
                    continue;
                }
            };

            if !body.is_empty() && seen.insert(body.clone()) {
                callers.push(body);
            }
        }

        RefResponse {
            callers,
            error: None,
        }
    }

    /// The body of the function that strictly contains `line_num` in `file`,
    /// if any. A reference on the definition line itself is not a caller.
    async fn enclosing_function(&self, file: &str, line_num: u32) -> Result<Option<String>> {
        let entries = self.ctags_entries(file).await?;
        for entry in &entries {
            if entry.kind != "function" {
                continue;
            }
            let (Some(line), Some(end)) = (entry.line, entry.end) else {
                continue;
            };
            if line < line_num && line_num < end {
                return self.code_content(file, line, end).map(Some);
            }
        }
        Ok(None)
    }
}

/// `struct foo` queries resolve the bare tag name; `a -> b` style queries
/// keep the second token. The arrow rule runs last and wins.
pub fn normalize_symbol(raw: &str) -> String {
    let mut symbol = raw.to_string();
    if symbol.split_whitespace().next() == Some("struct") {
        if let Some(second) = symbol.split_whitespace().nth(1) {
            symbol = second.to_string();
        }
    }
    if symbol.contains("->") {
        if let Some(second) = symbol.split_whitespace().nth(1) {
            symbol = second.to_string();
        }
    }
    symbol
}

pub fn parse_ctags_lines(output: &str) -> Vec<CtagsEntry> {
    output
        .trim()
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<CtagsEntry>(line).ok())
        .collect()
}

/// Scan `entries` for a definition of `symbol`. A matching entry without an
/// `end` but with a `typeref` of the form `<category>:<target>` redirects
/// the scan to `target` from the top. Visited names bound the walk on
/// typeref cycles; the step budget of `2 × len(entries)` stays as a second
/// line of defense.
pub fn resolve_in_entries(
    entries: &[CtagsEntry],
    symbol: &str,
    file: &str,
    mut snippet: impl FnMut(u32, u32) -> Result<String>,
) -> Option<SymbolInfo> {
    let mut want = symbol.to_string();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(want.clone());

    let max_steps = entries.len().saturating_mul(2);
    let mut steps = 0usize;
    let mut i = 0usize;

    while i < entries.len() {
        steps += 1;
        if steps > max_steps {
            warn!(symbol, file, "typeref scan exceeded step budget");
            return None;
        }

        let entry = &entries[i];
        if entry.name != want {
            i += 1;
            continue;
        }

        if entry.end.is_none() {
            if let Some(target) = entry
                .typeref
                .as_deref()
                .and_then(|t| t.split_once(':'))
                .map(|(_, target)| target)
            {
                if !visited.insert(target.to_string()) {
                    debug!(symbol, target, "typeref cycle detected");
                    return None;
                }
                want = target.to_string();
                i = 0;
                continue;
            }
            // A prototype with neither body nor typeref cannot resolve.
            i += 1;
            continue;
        }

        let (Some(line), Some(end)) = (entry.line, entry.end) else {
            i += 1;
            continue;
        };
        match snippet(line, end) {
            Ok(content) => {
                return Some(SymbolInfo {
                    name: entry.name.clone(),
                    kind: entry.kind.clone(),
                    line,
                    end,
                    content,
                    file: file.to_string(),
                    typeref: entry.typeref.clone(),
                });
            }
            Err(err) => {
                debug!(symbol, file, %err, "snippet extraction failed");
                i += 1;
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry(name: &str, kind: &str, line: Option<u32>, end: Option<u32>, typeref: Option<&str>) -> CtagsEntry {
        CtagsEntry {
            name: name.to_string(),
            kind: kind.to_string(),
            line,
            end,
            typeref: typeref.map(str::to_string),
        }
    }

    #[test]
    fn normalize_strips_struct_keyword() {
        assert_eq!(normalize_symbol("struct foo"), "foo");
        assert_eq!(normalize_symbol("foo"), "foo");
        // Only a whole first token counts.
        assert_eq!(normalize_symbol("structure"), "structure");
    }

    #[test]
    fn normalize_arrow_rule_takes_second_token() {
        assert_eq!(normalize_symbol("p ->field"), "->field");
        assert_eq!(normalize_symbol("p->field"), "p->field");
    }

    #[test]
    fn normalize_arrow_rule_wins_over_struct_rule() {
        assert_eq!(normalize_symbol("struct a->b c"), "a->b");
    }

    #[test]
    fn parse_skips_garbage_lines() {
        let output = concat!(
            r#"{"_type": "tag", "name": "foo", "path": "a.c", "line": 1, "kind": "function", "end": 3}"#,
            "\n",
            "ctags: warning: something\n",
            r#"{"_type": "tag", "name": "T", "path": "a.c", "line": 5, "kind": "typedef", "typeref": "struct:U"}"#,
            "\n",
        );
        let entries = parse_ctags_lines(output);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "foo");
        assert_eq!(entries[1].typeref.as_deref(), Some("struct:U"));
        assert!(entries[1].end.is_none());
    }

    #[test]
    fn resolve_direct_match() {
        let entries = vec![entry("foo", "function", Some(1), Some(3), None)];
        let info = resolve_in_entries(&entries, "foo", "a.c", |line, end| {
            Ok(format!("lines {line}-{end}"))
        })
        .unwrap();
        assert_eq!(info.name, "foo");
        assert_eq!(info.content, "lines 1-3");
        assert_eq!(info.file, "a.c");
    }

    #[test]
    fn resolve_chases_typeref_to_underlying_type() {
        let entries = vec![
            entry("T", "typedef", Some(5), None, Some("struct:U")),
            entry("U", "struct", Some(10), Some(20), None),
        ];
        let info = resolve_in_entries(&entries, "T", "x.c", |line, end| {
            Ok(format!("{line}..{end}"))
        })
        .unwrap();
        assert_eq!(info.name, "U");
        assert_eq!(info.line, 10);
        assert_eq!(info.end, 20);
    }

    #[test]
    fn resolve_terminates_on_typeref_cycle() {
        let entries = vec![
            entry("A", "typedef", Some(1), None, Some("struct:B")),
            entry("B", "typedef", Some(2), None, Some("struct:A")),
        ];
        assert!(resolve_in_entries(&entries, "A", "x.c", |_, _| Ok(String::new())).is_none());
    }

    #[test]
    fn resolve_skips_prototype_without_typeref() {
        let entries = vec![
            entry("foo", "prototype", Some(1), None, None),
            entry("foo", "function", Some(4), Some(9), None),
        ];
        let info =
            resolve_in_entries(&entries, "foo", "a.c", |line, end| Ok(format!("{line}-{end}")))
                .unwrap();
        assert_eq!(info.line, 4);
        assert_eq!(info.end, 9);
    }

    #[test]
    fn resolve_continues_after_snippet_failure() {
        let entries = vec![
            entry("foo", "function", Some(0), Some(2), None),
            entry("foo", "function", Some(3), Some(4), None),
        ];
        let info = resolve_in_entries(&entries, "foo", "a.c", |line, end| {
            if line < 1 {
                Err(TagLensError::InvalidRange("bad".into()))
            } else {
                Ok(format!("{line}-{end}"))
            }
        })
        .unwrap();
        assert_eq!(info.content, "3-4");
    }

    #[test]
    fn code_content_respects_inclusive_range() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.c"), "one\ntwo\nthree\n").unwrap();
        let analyzer = CodeAnalyzer::new(dir.path(), dir.path()).unwrap();

        assert_eq!(analyzer.code_content("a.c", 1, 2).unwrap(), "one\ntwo");
        assert_eq!(analyzer.code_content("a.c", 2, 3).unwrap(), "two\nthree");
        assert!(analyzer.code_content("a.c", 0, 1).is_err());
        assert!(analyzer.code_content("a.c", 3, 2).is_err());
        // split('\n') leaves a trailing empty slot after the final newline.
        assert_eq!(analyzer.code_content("a.c", 3, 4).unwrap(), "three\n");
        assert!(analyzer.code_content("a.c", 3, 5).is_err());
    }
}
