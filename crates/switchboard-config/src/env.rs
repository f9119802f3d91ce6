use std::sync::OnceLock;

use regex::Regex;

/// Expand `{{ env.NAME }}` placeholders in raw config text
///
/// `{{ env.NAME | default("value") }}` falls back to `value` when `NAME` is
/// unset. Comment lines are copied through untouched so commented-out
/// secrets never have to exist in the environment.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut expanded = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            expanded.push_str(line);
            continue;
        }

        let mut cursor = 0;
        for captures in placeholder().captures_iter(line) {
            let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
                continue;
            };

            expanded.push_str(&line[cursor..whole.start()]);
            expanded.push_str(&resolve(key.as_str(), captures.get(2).map(|m| m.as_str()))?);
            cursor = whole.end();
        }
        expanded.push_str(&line[cursor..]);
    }

    Ok(expanded)
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\)\s*)?\}\}"#).expect("placeholder regex")
    })
}

fn resolve(key: &str, fallback: Option<&str>) -> Result<String, String> {
    let Some(name) = key.strip_prefix("env.").filter(|name| !name.is_empty() && !name.contains('.')) else {
        return Err(format!("unsupported placeholder `{key}`, expected `env.NAME`"));
    };

    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(_) => fallback
            .map(str::to_owned)
            .ok_or_else(|| format!("environment variable `{name}` is not set")),
    }
}
