/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use regex::Captures;

/// Expand `$N` and `${N}` placeholders against the capture groups.
///
/// A `$N` placeholder ends at the first non digit char, so `$1_total` is
/// group 1 followed by `_total`. `${name}` refers to a named group and `$$`
/// is a literal `$`. Missing groups expand to the empty string, any other
/// `$` is kept as is.
pub(super) fn expand(template: &str, caps: &Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(p) = memchr::memchr(b'$', rest.as_bytes()) {
        out.push_str(&rest[..p]);
        let after = &rest[p + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        if let Some(braced) = after.strip_prefix('{')
            && let Some(end) = memchr::memchr(b'}', braced.as_bytes())
        {
            let group = &braced[..end];
            if !group.is_empty() {
                push_group(&mut out, caps, group);
                rest = &braced[end + 1..];
                continue;
            }
        }

        let digits = after.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 {
            push_group(&mut out, caps, &after[..digits]);
            rest = &after[digits..];
        } else {
            out.push('$');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

fn push_group(out: &mut String, caps: &Captures<'_>, group: &str) {
    let m = match group.parse::<usize>() {
        Ok(i) => caps.get(i),
        Err(_) => caps.name(group),
    };
    if let Some(m) = m {
        out.push_str(m.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn numbered() {
        let re = Regex::new(r"^app\.([^.]*)\.latency$").unwrap();
        let caps = re.captures("app.checkout.latency").unwrap();
        assert_eq!(expand("app_$1_latency", &caps), "app_checkout_latency");
        assert_eq!(expand("app_${1}_latency", &caps), "app_checkout_latency");
        assert_eq!(expand("$0", &caps), "app.checkout.latency");
        assert_eq!(expand("x$2y", &caps), "xy");
        assert_eq!(expand("static", &caps), "static");
    }

    #[test]
    fn literal_dollar() {
        let re = Regex::new(r"^(a)$").unwrap();
        let caps = re.captures("a").unwrap();
        assert_eq!(expand("$$1", &caps), "$1");
        assert_eq!(expand("cost$", &caps), "cost$");
        assert_eq!(expand("$x$1", &caps), "$xa");
        assert_eq!(expand("${}$1", &caps), "${}a");
    }

    #[test]
    fn named() {
        let re = Regex::new(r"^(?P<svc>[a-z]+)\.(\d+)$").unwrap();
        let caps = re.captures("web.42").unwrap();
        assert_eq!(expand("${svc}_$2", &caps), "web_42");
        assert_eq!(expand("${missing}", &caps), "");
    }
}
