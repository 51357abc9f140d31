use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::art::ArtFinder;
use crate::config::Config;
use crate::document::{basename, dirname, Document, MediaType};
use crate::http_util;

pub const CONTAINER_CLASS: &str = "object.container";
pub const ALBUM_CLASS: &str = "object.container.album.musicAlbum";
pub const PLAYLIST_CLASS: &str = "object.container.playlistContainer";
pub const TRACK_CLASS: &str = "object.item.audioItem.musicTrack";

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Container,
    Item,
}

/// One record of a browse result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub id: String,
    pub pid: String,
    pub kind: EntryKind,
    pub title: String,
    pub upnp_class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub art_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Entry {
    fn new(id: &str, pid: &str, kind: EntryKind, title: &str, upnp_class: &str) -> Entry {
        Entry {
            id: id.to_string(),
            pid: pid.to_string(),
            kind,
            title: title.to_string(),
            upnp_class: upnp_class.to_string(),
            album: None,
            artist: None,
            date: None,
            genre: None,
            track_number: None,
            art_uri: None,
            uri: None,
            mime: None,
            duration: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind == EntryKind::Container
    }

    pub fn track_number_value(&self) -> i64 {
        self.track_number
            .as_ref()
            .and_then(|n| n.parse::<i64>().ok())
            .unwrap_or(0)
    }
}

/// Plain container entry.
pub fn direntry(id: &str, pid: &str, title: &str) -> Entry {
    Entry::new(id, pid, EntryKind::Container, title, CONTAINER_CLASS)
}

pub fn album_direntry(
    id: &str,
    pid: &str,
    title: &str,
    art_uri: Option<String>,
    date: Option<String>,
    artist: Option<String>,
) -> Entry {
    let mut entry = Entry::new(id, pid, EntryKind::Container, title, ALBUM_CLASS);
    entry.art_uri = art_uri;
    entry.date = date;
    entry.artist = artist;
    entry
}

/// The result of one browse request: the whole sorted list, or an unsorted
/// slice of a larger one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Listing {
    Full(Vec<Entry>),
    Slice {
        offset: usize,
        total: usize,
        entries: Vec<Entry>,
    },
}

impl Listing {
    pub fn entries(&self) -> &[Entry] {
        match self {
            Listing::Full(entries) => entries,
            Listing::Slice { entries, .. } => entries,
        }
    }

    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            Listing::Full(entries) => entries,
            Listing::Slice { entries, .. } => entries,
        }
    }
}

/// Turns documents into wire-ready entries.
pub trait EntryFormatter: Send + Sync {
    fn track_entry(&self, id: &str, pid: &str, doc: &Document) -> Option<Entry>;
}

pub struct DocumentFormatter {
    host_port: String,
    path_prefix: String,
    art: Arc<ArtFinder>,
}

impl DocumentFormatter {
    pub fn new(config: &Config, art: Arc<ArtFinder>) -> DocumentFormatter {
        DocumentFormatter {
            host_port: config.http_host_port.clone(),
            path_prefix: config.path_prefix.clone(),
            art,
        }
    }
}

impl EntryFormatter for DocumentFormatter {
    fn track_entry(&self, id: &str, pid: &str, doc: &Document) -> Option<Entry> {
        let media_type = doc.media_type();
        if !media_type.is_browsable() {
            return None;
        }

        let url_path = match doc.url.find("://") {
            Some(pos) => &doc.url[pos + 3..],
            None => doc.url.as_str(),
        };

        let title = match doc.title() {
            Some(t) => t.to_string(),
            None => basename(url_path).to_string(),
        };

        let mut entry = match media_type {
            MediaType::Directory => Entry::new(id, pid, EntryKind::Container, &title, CONTAINER_CLASS),
            _ => Entry::new(id, pid, EntryKind::Item, &title, TRACK_CLASS),
        };

        entry.album = doc.album().map(|s| s.to_string());
        entry.artist = doc.artist().or_else(|| doc.albumartist()).map(|s| s.to_string());
        entry.date = doc.field("date").map(|s| s.to_string());
        entry.genre = doc.field("genre").map(|s| s.to_string());
        entry.duration = doc.field("duration").map(|s| s.to_string());
        entry.mime = Some(doc.mtype.clone());

        entry.track_number = doc
            .field("tracknumber")
            .and_then(|n| n.split('/').next())
            .map(|n| n.trim().to_string());

        entry.art_uri = match doc.field("albumarturi") {
            Some(uri) => Some(uri.to_string()),
            None => self.art.doc_art_uri(doc, false, doc.album()),
        };

        entry.uri = Some(match doc.path() {
            Some(path) => http_util::http_url(
                &self.host_port,
                &format!("{}{}", self.path_prefix, path),
                "",
            ),
            None => http_util::quote_url(&doc.url),
        });

        for field in &["composer", "conductor", "comment"] {
            if let Some(value) = doc.field(field) {
                entry.extra.insert(field.to_string(), value.to_string());
            }
        }

        Some(entry)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SortContext {
    /// Tracks by album, directory, track number, file name.
    Default,
    /// Same, with the track title as primary key.
    Items,
}

fn uri_of(e: &Entry) -> &str {
    e.uri.as_deref().unwrap_or("")
}

pub fn compare_entries(a: &Entry, b: &Entry, context: SortContext) -> Ordering {
    match (a.is_container(), b.is_container()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (true, true) => return a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        (false, false) => {}
    }

    let primary = match context {
        SortContext::Items => a.title.cmp(&b.title),
        SortContext::Default => Ordering::Equal,
    };

    primary
        .then_with(|| {
            a.album
                .as_deref()
                .unwrap_or("")
                .cmp(b.album.as_deref().unwrap_or(""))
        })
        .then_with(|| dirname(uri_of(a)).cmp(dirname(uri_of(b))))
        .then_with(|| a.track_number_value().cmp(&b.track_number_value()))
        .then_with(|| basename(uri_of(a)).cmp(basename(uri_of(b))))
}

pub fn sort_entries(entries: &mut Vec<Entry>, context: SortContext) {
    entries.sort_by(|a, b| compare_entries(a, b, context));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, album: &str, uri: &str, tno: &str) -> Entry {
        let mut e = Entry::new("i", "p", EntryKind::Item, title, TRACK_CLASS);
        e.album = Some(album.to_string());
        e.uri = Some(uri.to_string());
        e.track_number = Some(tno.to_string());
        e
    }

    #[test]
    fn test_sort_default() {
        let mut entries = vec![
            item("Z", "B", "http://h/m/B/01.flac", "1"),
            item("Y", "A", "http://h/m/A/10.flac", "10"),
            direntry("d2", "p", "beta"),
            item("X", "A", "http://h/m/A/02.flac", "2"),
            direntry("d1", "p", "Alpha"),
        ];
        sort_entries(&mut entries, SortContext::Default);

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "beta", "X", "Y", "Z"]);
    }

    #[test]
    fn test_sort_items() {
        let mut entries = vec![
            item("b", "A", "http://h/m/A/01.flac", "1"),
            item("a", "B", "http://h/m/B/02.flac", "2"),
            item("a", "A", "http://h/m/A/03.flac", "3"),
        ];
        sort_entries(&mut entries, SortContext::Items);

        let keys: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.title.as_str(), e.album.as_deref().unwrap()))
            .collect();
        assert_eq!(keys, vec![("a", "A"), ("a", "B"), ("b", "A")]);
    }

    #[test]
    fn test_track_entry() {
        let config = Config::default();
        let formatter = DocumentFormatter::new(&config, Arc::new(ArtFinder::new(&config)));

        let doc = Document {
            url: "file:///nonexistent/m/01 a.flac".to_string(),
            mtype: "audio/flac".to_string(),
            albumartist: Some("AA".to_string()),
            tracknumber: Some("3/12".to_string()),
            composer: Some("C".to_string()),
            ..Default::default()
        };

        let e = formatter.track_entry("id", "pid", &doc).unwrap();
        assert_eq!(e.kind, EntryKind::Item);
        assert_eq!(e.title, "01 a.flac");
        assert_eq!(e.artist.as_deref(), Some("AA"));
        assert_eq!(e.track_number.as_deref(), Some("3"));
        assert_eq!(
            e.uri.as_deref(),
            Some("http://127.0.0.1:9790/uprcl/nonexistent/m/01%20a.flac")
        );
        assert_eq!(e.extra.get("composer").map(|s| s.as_str()), Some("C"));
        assert_eq!(e.art_uri, None);

        let other = Document {
            url: "file:///m/notes.txt".to_string(),
            mtype: "text/plain".to_string(),
            ..Default::default()
        };
        assert!(formatter.track_entry("id", "pid", &other).is_none());

        let json = serde_json::to_value(&direntry("a", "b", "c")).unwrap();
        assert_eq!(json["kind"], "container");
        assert!(json.get("album").is_none());
    }
}
