/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_word_start_byte(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

/// Label names need at least two chars, `[a-zA-Z_][a-zA-Z0-9_]+`.
pub(super) fn is_valid_label_name(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && is_word_start_byte(b[0]) && b[1..].iter().all(|c| is_word_byte(*c))
}

/// Consume a `$N`, `${N`, `$N}` or `${N}` placeholder at the start of `b`,
/// returning its length.
fn template_len(b: &[u8]) -> Option<usize> {
    if b.first() != Some(&b'$') {
        return None;
    }
    let mut i = 1;
    if b.get(i) == Some(&b'{') {
        i += 1;
    }
    let digits_start = i;
    while b.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if b.get(i) == Some(&b'}') {
        i += 1;
    }
    Some(i)
}

/// Metric name templates are identifiers which may contain placeholders.
pub(super) fn is_valid_name_template(s: &str) -> bool {
    let b = s.as_bytes();
    if b.is_empty() {
        return false;
    }

    let mut i = 0;
    while i < b.len() {
        if let Some(n) = template_len(&b[i..]) {
            i += n;
            continue;
        }
        let legal = if i == 0 {
            is_word_start_byte(b[i])
        } else {
            is_word_byte(b[i])
        };
        if !legal {
            return false;
        }
        i += 1;
    }
    true
}

/// StatsD identifier segment, `[a-zA-Z_](-?[a-zA-Z0-9_])+`.
fn is_statsd_identifier(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 2 || !is_word_start_byte(b[0]) {
        return false;
    }

    let mut i = 1;
    while i < b.len() {
        if b[i] == b'-' {
            i += 1;
        }
        if !b.get(i).is_some_and(|c| is_word_byte(*c)) {
            return false;
        }
        i += 1;
    }
    true
}

/// Glob sources are at least two dot separated segments, each one being
/// `*` or a StatsD identifier.
pub(super) fn is_valid_glob(s: &str) -> bool {
    let mut count = 0;
    for seg in s.split('.') {
        if seg != "*" && !is_statsd_identifier(seg) {
            return false;
        }
        count += 1;
    }
    count >= 2
}

/// Translate a validated glob into an anchored regex source.
pub(super) fn glob_to_regex(glob: &str) -> String {
    let mut re = String::with_capacity(glob.len() * 2 + 2);
    re.push('^');
    for c in glob.chars() {
        match c {
            '.' => re.push_str("\\."),
            '*' => re.push_str("([^.]*)"),
            _ => re.push(c),
        }
    }
    re.push('$');
    re
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_name() {
        assert!(is_valid_label_name("job"));
        assert!(is_valid_label_name("_x"));
        assert!(is_valid_label_name("a1"));
        assert!(!is_valid_label_name("a"));
        assert!(!is_valid_label_name("1a"));
        assert!(!is_valid_label_name("a-b"));
        assert!(!is_valid_label_name(""));
    }

    #[test]
    fn name_template() {
        assert!(is_valid_name_template("app_$1_latency"));
        assert!(is_valid_name_template("${1}_total"));
        assert!(is_valid_name_template("x"));
        assert!(is_valid_name_template("a${12}b$3"));
        assert!(!is_valid_name_template(""));
        assert!(!is_valid_name_template("1abc"));
        assert!(!is_valid_name_template("a.b"));
        assert!(!is_valid_name_template("a$b"));
        assert!(!is_valid_name_template("a-b"));
    }

    #[test]
    fn statsd_identifier() {
        assert!(is_statsd_identifier("ab"));
        assert!(is_statsd_identifier("web-1"));
        assert!(is_statsd_identifier("a-b-c"));
        assert!(!is_statsd_identifier("a"));
        assert!(!is_statsd_identifier("a-"));
        assert!(!is_statsd_identifier("a--b"));
        assert!(!is_statsd_identifier("-ab"));
        assert!(!is_statsd_identifier("1ab"));
    }

    #[test]
    fn glob() {
        assert!(is_valid_glob("app.*.latency"));
        assert!(is_valid_glob("*.*"));
        assert!(is_valid_glob("client-a.*"));
        assert!(!is_valid_glob("app"));
        assert!(!is_valid_glob("app..x"));
        assert!(!is_valid_glob("app.x*"));
        assert!(!is_valid_glob("app.*."));
        assert!(!is_valid_glob(""));
    }

    #[test]
    fn translate() {
        assert_eq!(glob_to_regex("app.*.latency"), "^app\\.([^.]*)\\.latency$");
        assert_eq!(glob_to_regex("*.*"), "^([^.]*)\\.([^.]*)$");
    }
}
