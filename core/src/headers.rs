//! Request header normalization and response header parsing.

/// Merge caller headers over defaults.
///
/// Names are trimmed and lower-cased before comparison, and the merged list
/// uses those normalized names. A caller value always wins over a default
/// for the same logical header. Caller entries come first, in their order,
/// followed by the defaults the caller did not override.
pub fn merge_headers(
    caller: &[(String, String)],
    defaults: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::with_capacity(caller.len() + defaults.len());
    for (name, value) in caller {
        upsert(&mut merged, normalize_name(name), value.clone());
    }
    for (name, value) in defaults {
        let name = normalize_name(name);
        if !merged.iter().any(|(existing, _)| *existing == name) {
            merged.push((name, value.clone()));
        }
    }
    merged
}

/// Parse a raw `name: value` header block into a list.
///
/// Lines are split on runs of CR/LF and each line on the first `": "`.
/// Names are lower-cased; a later duplicate overwrites an earlier one.
pub fn parse_response_headers(raw: &str) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for line in raw.trim().split(['\r', '\n']).filter(|l| !l.is_empty()) {
        let (name, value) = match line.split_once(": ") {
            Some((name, value)) => (name, value),
            None => (line, ""),
        };
        upsert(&mut headers, name.to_ascii_lowercase(), value.to_string());
    }
    headers
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    let name = name.trim();
    headers
        .iter()
        .find(|(existing, _)| existing.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn upsert(headers: &mut Vec<(String, String)>, name: String, value: String) {
    match headers.iter_mut().find(|(existing, _)| *existing == name) {
        Some((_, existing)) => *existing = value,
        None => headers.push((name, value)),
    }
}
