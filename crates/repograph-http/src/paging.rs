// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `Link` header pagination.

/// Extract the `page` query parameter of the `rel="next"` link.
pub fn next_page(link_header: &str) -> Option<String> {
    link_header
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let target = pieces.next()?.trim();
            let is_next = pieces.any(|p| p.trim() == r#"rel="next""#);
            is_next.then_some(target)
        })
        .find_map(|target| {
            let url = target.strip_prefix('<')?.strip_suffix('>')?;
            let (_, query) = url.split_once('?')?;
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "page")
                .map(|(_, value)| value.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_page_present() {
        let header = r#"<https://api.github.com/repositories/1/commits?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/1/commits?per_page=100&page=9>; rel="last""#;
        assert_eq!(next_page(header).as_deref(), Some("2"));
    }

    #[test]
    fn test_next_page_absent_on_last_page() {
        let header = r#"<https://api.github.com/repositories/1/commits?per_page=100&page=1>; rel="first", <https://api.github.com/repositories/1/commits?per_page=100&page=8>; rel="prev""#;
        assert_eq!(next_page(header), None);
    }

    #[test]
    fn test_next_page_garbage() {
        assert_eq!(next_page(""), None);
        assert_eq!(next_page("not a link"), None);
    }
}
