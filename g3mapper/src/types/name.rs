/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

fn is_legal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Make a metric or label name safe for the sink.
///
/// Every char outside `[a-zA-Z0-9_]` is replaced by `_`, and a leading digit
/// gets a `_` prefix.
pub fn escape_metric_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 1);
    if name.as_bytes().first().is_some_and(|b| b.is_ascii_digit()) {
        escaped.push('_');
    }
    for c in name.chars() {
        if is_legal_char(c) {
            escaped.push(c);
        } else {
            escaped.push('_');
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape() {
        assert_eq!(escape_metric_name("foo"), "foo");
        assert_eq!(escape_metric_name("foo.bar-baz"), "foo_bar_baz");
        assert_eq!(escape_metric_name("9lives"), "_9lives");
        assert_eq!(escape_metric_name("a b/c"), "a_b_c");
        assert_eq!(escape_metric_name(""), "");
    }

    #[test]
    fn escape_multibyte() {
        // one replacement per char, not per byte
        assert_eq!(escape_metric_name("t\u{e9}st"), "t_st");
    }
}
