use std::fs;
use std::path::{Path, PathBuf};

fn collect_files(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, ext, out);
        } else if path.extension().and_then(|s| s.to_str()) == Some(ext) {
            out.push(path);
        }
    }
}

fn line_number(content: &str, byte_idx: usize) -> usize {
    content[..byte_idx].bytes().filter(|b| *b == b'\n').count() + 1
}

/// First string literal passed to a `sqlx::query*` call starting at `call_idx`.
fn sql_literal_at(content: &str, call_idx: usize) -> Option<(usize, String)> {
    let open = call_idx + content[call_idx..].find('(')?;
    let rest = content[open + 1..].trim_start();
    let start = content.len() - rest.len();

    if let Some(raw) = rest.strip_prefix('r') {
        let hashes = raw.len() - raw.trim_start_matches('#').len();
        let body = raw[hashes..].strip_prefix('"')?;
        let end_marker = format!("\"{}", "#".repeat(hashes));
        let end = body.find(&end_marker)?;
        return Some((start, body[..end].to_string()));
    }

    let body = rest.strip_prefix('"')?;
    let mut escaped = false;
    for (i, ch) in body.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some((start, body[..i].to_string())),
            _ => {}
        }
    }
    None
}

fn source_queries() -> Vec<(PathBuf, usize, String)> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut files = Vec::new();
    collect_files(&root, "rs", &mut files);

    let mut queries = Vec::new();
    for file in files {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        let mut pos = 0;
        while let Some(rel) = content[pos..].find("sqlx::query") {
            let idx = pos + rel;
            if let Some((at, sql)) = sql_literal_at(&content, idx) {
                queries.push((file.clone(), line_number(&content, at), sql));
            }
            pos = idx + "sqlx::query".len();
        }
    }
    queries
}

#[test]
fn queries_use_postgres_placeholders() {
    let queries = source_queries();
    assert!(!queries.is_empty(), "no sqlx queries found under src/");

    let violations: Vec<String> = queries
        .iter()
        .filter(|(_, _, sql)| sql.contains('?'))
        .map(|(file, line, _)| format!("{}:{} uses a '?' placeholder", file.display(), line))
        .collect();

    assert!(violations.is_empty(), "Non-postgres placeholders:\n{}", violations.join("\n"));
}

#[test]
fn balance_is_only_changed_by_relative_updates() {
    // An absolute `SET saldo = $n` would let a stale read overwrite a concurrent credit.
    let violations: Vec<String> = source_queries()
        .iter()
        .filter(|(_, _, sql)| {
            let lower = sql.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
            lower.contains("set saldo = $")
        })
        .map(|(file, line, _)| format!("{}:{} assigns saldo directly", file.display(), line))
        .collect();

    assert!(violations.is_empty(), "Absolute balance writes:\n{}", violations.join("\n"));
}

#[test]
fn money_columns_are_bigint() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let mut files = Vec::new();
    collect_files(&root, "sql", &mut files);
    assert!(!files.is_empty(), "no migrations found");

    let money = ["saldo", "amount", "original_amount", "bonus", "min_topup"];
    let mut violations = Vec::new();
    for file in files {
        let content = fs::read_to_string(&file).unwrap();
        for (i, line) in content.lines().enumerate() {
            let mut words = line.split_whitespace();
            let (Some(column), Some(ty)) = (words.next(), words.next()) else {
                continue;
            };
            if money.contains(&column.to_lowercase().as_str()) && !ty.eq_ignore_ascii_case("BIGINT") {
                violations.push(format!("{}:{} declares {} as {}", file.display(), i + 1, column, ty));
            }
        }
    }

    assert!(violations.is_empty(), "Money columns must be BIGINT:\n{}", violations.join("\n"));
}
