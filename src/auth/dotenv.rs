//! Tiny `KEY=VALUE` reader for `stateDir/.env`, used only to pull `EMAIL` and
//! `PASSWORD` for the auto-login handler. No quoting, no interpolation, no
//! multiline values — two keys don't warrant a dependency.

use std::collections::HashMap;
use std::path::Path;

pub async fn read(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(parse(&contents))
}

fn parse(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let mut value = value.trim();
            if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
                || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
            {
                value = &value[1..value.len() - 1];
            }
            vars.insert(key, value.to_string());
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs() {
        let vars = parse("EMAIL=a@example.com\nPASSWORD=hunter2\n");
        assert_eq!(vars.get("EMAIL"), Some(&"a@example.com".to_string()));
        assert_eq!(vars.get("PASSWORD"), Some(&"hunter2".to_string()));
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let vars = parse("# comment\n\nEMAIL=a@example.com\n");
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn strips_surrounding_quotes() {
        let vars = parse("PASSWORD=\"hunter2\"\n");
        assert_eq!(vars.get("PASSWORD"), Some(&"hunter2".to_string()));
    }
}
