use std::borrow::Cow;

/// Percent-encodes each path segment, keeping the separators.
pub fn quote_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<Cow<str>>>()
        .join("/")
}

pub fn http_url(host_port: &str, path: &str, query: &str) -> String {
    format!("http://{}{}{}", host_port, quote_path(path), query)
}

/// Quotes the path part of a non-file URL, leaving scheme and authority alone.
pub fn quote_url(url: &str) -> String {
    let rest_start = match url.find("://") {
        Some(pos) => pos + 3,
        None => return url.to_string(),
    };

    match url[rest_start..].find('/') {
        Some(pos) => {
            let split = rest_start + pos;
            format!("{}{}", &url[..split], quote_path(&url[split..]))
        }
        None => url.to_string(),
    }
}

pub fn is_url(s: &str) -> bool {
    match s.find("://") {
        Some(pos) if pos > 0 => s[..pos].chars().all(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote_path("/a b/c&d.flac"), "/a%20b/c%26d.flac");
        assert_eq!(
            http_url("host:9790", "/uprcl/m/x y.jpg", "?embed=1"),
            "http://host:9790/uprcl/m/x%20y.jpg?embed=1"
        );
        assert_eq!(
            quote_url("http://radio.example:8000/live stream"),
            "http://radio.example:8000/live%20stream"
        );
        assert!(is_url("http://x/y"));
        assert!(!is_url("/music/a.flac"));
        assert!(!is_url("../a://b"));
    }
}
