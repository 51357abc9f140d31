use std::path::Path;

use crate::document::dirname;
use crate::http_util::is_url;

#[derive(Debug, Clone, PartialEq)]
pub enum M3uEntry {
    Url(String),
    Path(String),
}

/// Resolves "." and ".." segments without touching the filesystem.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    format!("/{}", parts.join("/"))
}

/// Parses playlist text. Relative paths are resolved against `base_dir`.
pub fn parse_m3u(text: &str, base_dir: &str) -> Vec<M3uEntry> {
    let text = text.trim_start_matches('\u{feff}');

    text.lines()
        .map(|line| line.trim_matches(|c| c == ' ' || c == '\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            if is_url(line) {
                M3uEntry::Url(line.to_string())
            } else if line.starts_with('/') {
                M3uEntry::Path(normalize_path(line))
            } else {
                M3uEntry::Path(normalize_path(&format!("{}/{}", base_dir, line)))
            }
        })
        .collect()
}

pub fn read_m3u(path: &str) -> std::io::Result<Vec<M3uEntry>> {
    let bytes = std::fs::read(Path::new(path))?;
    let text = String::from_utf8_lossy(&bytes);

    Ok(parse_m3u(&text, dirname(path)))
}

#[test]
fn test_parse_m3u() {
    let data = "\u{feff}#EXTM3U\r
#EXTINF:123,Some Title\r
01 - First.flac\r
../Other/02.flac\r
/abs/./path/03.flac\r
\r
http://radio.example/live\r
";

    assert_eq!(
        parse_m3u(data, "/music/Lists"),
        vec![
            M3uEntry::Path("/music/Lists/01 - First.flac".to_string()),
            M3uEntry::Path("/music/Other/02.flac".to_string()),
            M3uEntry::Path("/abs/path/03.flac".to_string()),
            M3uEntry::Url("http://radio.example/live".to_string()),
        ]
    );
}

#[test]
fn test_read_m3u() {
    let dir = tempfile::tempdir().unwrap();
    let path = format!("{}/list.m3u", dir.path().display());
    std::fs::write(&path, "a.flac\n").unwrap();

    assert_eq!(
        read_m3u(&path).unwrap(),
        vec![M3uEntry::Path(format!("{}/a.flac", dir.path().display()))]
    );
    assert!(read_m3u("/nonexistent/list.m3u").is_err());
}
