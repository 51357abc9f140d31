use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::config::Config;
use crate::document::{dirname, Document};
use crate::http_util;

const ART_EXTENSIONS: &[&str] = &["jpg", "png"];
const FOLDER_ART_BASES: &[&str] = &["cover", "folder"];

/// Strips characters which can't appear in a file name derived from a tag.
pub fn tag2fn(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '"' | '*' | '/' | ':' | '<' | '>' | '?' | '\\' | '|'))
        .collect()
}

fn find_art<'a>(names: &'a [String], bases: &[String]) -> Option<&'a String> {
    names.iter().find(|name| {
        let lower = name.to_lowercase();
        bases.iter().any(|base| {
            ART_EXTENSIONS
                .iter()
                .any(|ext| lower == format!("{}.{}", base, ext))
        })
    })
}

/// Filesystem-convention cover art lookup. Folder listings are read once
/// per folder and kept for the lifetime of the generation.
pub struct ArtFinder {
    host_port: String,
    path_prefix: String,
    folder_cache: Mutex<HashMap<String, Vec<String>>>,
}

impl ArtFinder {
    pub fn new(config: &Config) -> ArtFinder {
        ArtFinder {
            host_port: config.http_host_port.clone(),
            path_prefix: config.path_prefix.clone(),
            folder_cache: Mutex::new(HashMap::new()),
        }
    }

    fn url_for(&self, path: &str, query: &str) -> String {
        http_util::http_url(
            &self.host_port,
            &format!("{}{}", self.path_prefix, path),
            query,
        )
    }

    fn existing_image(&self, base: &str) -> Option<String> {
        for ext in ART_EXTENSIONS {
            let candidate = format!("{}.{}", base, ext);
            if Path::new(&candidate).is_file() {
                return Some(self.url_for(&candidate, ""));
            }
        }

        None
    }

    pub fn embedded_art_uri(&self, doc: &Document) -> Option<String> {
        let ext = match doc.embedded_image() {
            Some("jpg") => "jpg",
            Some("png") => "png",
            _ => return None,
        };

        let path = doc.path()?;
        Some(self.url_for(&format!("{}.{}", path, ext), "?embed=1"))
    }

    /// Same-basename image next to the file, then the embedded picture.
    fn track_art_uri(&self, doc: &Document, path: &str) -> Option<String> {
        let base = match path.rfind('.') {
            Some(pos) if pos > path.rfind('/').unwrap_or(0) => &path[..pos],
            _ => path,
        };

        self.existing_image(base)
            .or_else(|| self.embedded_art_uri(doc))
    }

    fn group_art_uri(&self, doc: &Document, path: &str) -> Option<String> {
        let group = doc.group()?;
        let base = format!("{}/{}", dirname(path), tag2fn(group));
        self.existing_image(&base)
    }

    fn folder_listing(&self, folder: &str) -> Vec<String> {
        if let Ok(cache) = self.folder_cache.lock() {
            if let Some(names) = cache.get(folder) {
                return names.clone();
            }
        }

        let mut names: Vec<String> = match fs::read_dir(folder) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| {
                    let lower = name.to_lowercase();
                    ART_EXTENSIONS
                        .iter()
                        .any(|ext| lower.ends_with(&format!(".{}", ext)))
                })
                .collect(),
            Err(e) => {
                debug!("can't list '{}': {}", folder, e);
                Vec::new()
            }
        };
        names.sort();

        if let Ok(mut cache) = self.folder_cache.lock() {
            cache.insert(folder.to_string(), names.clone());
        }

        names
    }

    /// Folder-level image among the conventional names, matched without
    /// regard to case. With an album title, `<album>.jpg`/`.png` also match.
    pub fn folder_art_uri(&self, doc: &Document, album: Option<&str>) -> Option<String> {
        let folder = doc.folder()?;
        let names = self.folder_listing(&folder);

        let conventional: Vec<String> = FOLDER_ART_BASES.iter().map(|b| b.to_string()).collect();

        let found = find_art(&names, &conventional).or_else(|| {
            let album = tag2fn(album?).to_lowercase();
            if album.is_empty() {
                None
            } else {
                find_art(&names, std::slice::from_ref(&album))
            }
        })?;

        Some(self.url_for(&format!("{}{}", folder, found), ""))
    }

    /// Art for a document. Track-specific art comes first unless
    /// `prefer_folder` is set, in which case it is the last resort.
    pub fn doc_art_uri(&self, doc: &Document, prefer_folder: bool, album: Option<&str>) -> Option<String> {
        let path = doc.path()?;

        if !prefer_folder {
            if let Some(uri) = self.track_art_uri(doc, path) {
                return Some(uri);
            }
        }

        if let Some(uri) = self.group_art_uri(doc, path) {
            return Some(uri);
        }

        if let Some(uri) = self.folder_art_uri(doc, album) {
            return Some(uri);
        }

        if prefer_folder {
            return self.track_art_uri(doc, path);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn track(path: &str) -> Document {
        Document {
            url: format!("file://{}", path),
            mtype: "audio/flac".to_string(),
            ..Default::default()
        }
    }

    fn finder() -> ArtFinder {
        ArtFinder::new(&Config {
            http_host_port: "h:1".to_string(),
            path_prefix: "/p".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_tag2fn() {
        assert_eq!(tag2fn("AC/DC: \"Live\"?"), "ACDC Live");
    }

    #[test]
    fn test_no_art() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("{}/01.flac", dir.path().display());
        assert_eq!(finder().doc_art_uri(&track(&path), false, None), None);
        assert_eq!(finder().doc_art_uri(&track(&path), true, None), None);
    }

    #[test]
    fn test_preference_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().display().to_string();
        File::create(format!("{}/01.jpg", base)).unwrap();
        File::create(format!("{}/Cover.PNG", base)).unwrap();

        let doc = track(&format!("{}/01.flac", base));
        let finder = finder();

        assert_eq!(
            finder.doc_art_uri(&doc, false, None),
            Some(format!("http://h:1{}", http_util::quote_path(&format!("/p{}/01.jpg", base))))
        );
        assert_eq!(
            finder.doc_art_uri(&doc, true, None),
            Some(format!("http://h:1{}", http_util::quote_path(&format!("/p{}/Cover.PNG", base))))
        );
    }

    #[test]
    fn test_album_named_and_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().display().to_string();
        File::create(format!("{}/Bar.jpg", base)).unwrap();

        let mut doc = track(&format!("{}/01.flac", base));
        let finder = finder();

        assert!(finder.folder_art_uri(&doc, None).is_none());
        assert!(finder
            .folder_art_uri(&doc, Some("bar"))
            .unwrap()
            .ends_with("/Bar.jpg"));

        doc.embdimg = Some("png".to_string());
        assert!(finder
            .doc_art_uri(&doc, false, None)
            .unwrap()
            .ends_with("/01.flac.png?embed=1"));
    }

    #[test]
    fn test_group_art() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().display().to_string();
        File::create(format!("{}/Op 1.png", base)).unwrap();

        let mut doc = track(&format!("{}/01.flac", base));
        doc.group = Some("Op 1".to_string());

        assert!(finder()
            .doc_art_uri(&doc, true, None)
            .unwrap()
            .ends_with("/Op%201.png"));
    }
}
