use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BuildError;

pub const DIRECTORY_MTYPE: &str = "inode/directory";
pub const PLAYLIST_MTYPE: &str = "audio/x-mpegurl";

const AUDIO_MTYPES: &[&str] = &[
    "audio/mpeg",
    "audio/flac",
    "application/flac",
    "audio/x-flac",
    "application/x-flac",
    "application/ogg",
    "audio/aac",
    "audio/mp4",
    "video/mp4",
    "audio/x-aiff",
    "audio/x-musepack",
    "audio/ape",
    "audio/x-wav",
    "audio/x-wavpack",
];

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MediaType {
    Audio,
    Directory,
    Playlist,
    Other,
}

impl MediaType {
    pub fn from_mtype(mtype: &str) -> MediaType {
        match mtype {
            DIRECTORY_MTYPE => MediaType::Directory,
            PLAYLIST_MTYPE => MediaType::Playlist,
            m if AUDIO_MTYPES.contains(&m) => MediaType::Audio,
            _ => MediaType::Other,
        }
    }

    /// Types which show up in the browsing trees at all.
    pub fn is_browsable(self) -> bool {
        self != MediaType::Other
    }
}

/// One flat record from the document source. Field presence is significant:
/// an empty string coming from the source is normalized to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    pub url: String,
    pub mtype: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub albumartist: Option<String>,
    pub date: Option<String>,
    pub dmtime: Option<String>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub conductor: Option<String>,
    pub comment: Option<String>,
    pub label: Option<String>,
    pub lyricist: Option<String>,
    pub orchestra: Option<String>,
    pub performer: Option<String>,
    pub group: Option<String>,
    pub discnumber: Option<String>,
    pub tracknumber: Option<String>,
    pub duration: Option<String>,
    pub albumarturi: Option<String>,
    pub filename: Option<String>,
    /// Embedded image format ("jpg" or "png") when the file carries one.
    pub embdimg: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    match value {
        Some(s) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

impl Document {
    pub fn media_type(&self) -> MediaType {
        MediaType::from_mtype(&self.mtype)
    }

    /// Field access by document field name, used for configured facets.
    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "title" => &self.title,
            "album" => &self.album,
            "artist" => &self.artist,
            "albumartist" => &self.albumartist,
            "date" => &self.date,
            "dmtime" => &self.dmtime,
            "genre" => &self.genre,
            "composer" => &self.composer,
            "conductor" => &self.conductor,
            "comment" => &self.comment,
            "label" => &self.label,
            "lyricist" => &self.lyricist,
            "orchestra" => &self.orchestra,
            "performer" => &self.performer,
            "group" => &self.group,
            "discnumber" => &self.discnumber,
            "tracknumber" => &self.tracknumber,
            "duration" => &self.duration,
            "albumarturi" => &self.albumarturi,
            "filename" => &self.filename,
            "embdimg" => &self.embdimg,
            _ => {
                return self
                    .extra
                    .get(name)
                    .map(|s| s.as_str())
                    .filter(|s| !s.trim().is_empty())
            }
        };

        non_empty(value)
    }

    pub fn title(&self) -> Option<&str> {
        non_empty(&self.title)
    }

    pub fn album(&self) -> Option<&str> {
        non_empty(&self.album)
    }

    pub fn artist(&self) -> Option<&str> {
        non_empty(&self.artist)
    }

    pub fn albumartist(&self) -> Option<&str> {
        non_empty(&self.albumartist)
    }

    pub fn group(&self) -> Option<&str> {
        non_empty(&self.group)
    }

    pub fn discnumber(&self) -> Option<&str> {
        non_empty(&self.discnumber)
    }

    pub fn embedded_image(&self) -> Option<&str> {
        non_empty(&self.embdimg)
    }

    /// Filesystem path for `file://` URLs, without any trailing slash
    /// (except for "/" itself).
    pub fn path(&self) -> Option<&str> {
        let path = self.url.strip_prefix("file://")?;
        if path.is_empty() {
            return None;
        }

        let trimmed = path.trim_end_matches('/');
        Some(if trimmed.is_empty() { "/" } else { trimmed })
    }

    /// The folder holding the document, always with a trailing slash. For a
    /// directory document this is the directory itself.
    pub fn folder(&self) -> Option<String> {
        let path = self.path()?;

        let folder = if self.media_type() == MediaType::Directory {
            path
        } else {
            dirname(path)
        };

        if folder.ends_with('/') {
            Some(folder.to_string())
        } else {
            Some(format!("{}/", folder))
        }
    }

    /// Normalized track number: the numerator of "n/total", 1 when missing
    /// or unparsable.
    pub fn track_number(&self) -> i64 {
        non_empty(&self.tracknumber)
            .and_then(|n| n.split('/').next())
            .and_then(|n| n.trim().parse::<i64>().ok())
            .unwrap_or(1)
    }
}

/// Directory part of a path, ignoring a trailing slash.
pub fn dirname(path: &str) -> &str {
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    match path.rfind('/') {
        Some(0) => "/",
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Last path element, ignoring a trailing slash.
pub fn basename(path: &str) -> &str {
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    match path.rfind('/') {
        Some(pos) if path.len() > 1 => &path[pos + 1..],
        _ => path,
    }
}

/// Keep the `YYYY` or `YYYY-MM-DD` prefix of a date, or reject it.
pub fn parse_date(date: &str) -> Option<String> {
    let date = date.trim();
    let date = date.get(..10).unwrap_or(date);

    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() > 3 || parts.len() == 2 {
        return None;
    }

    let year = parts[0];
    if year.len() != 4 || year == "0000" || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    if parts[1..]
        .iter()
        .any(|p| p.len() != 2 || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }

    Some(date.to_string())
}

/// Numbers and booleans become strings, nulls are dropped.
fn stringify_scalars(value: &mut Value) {
    let map = match value {
        Value::Object(map) => map,
        _ => return,
    };

    let nulls: Vec<String> = map
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| k.clone())
        .collect();
    for key in nulls {
        map.remove(&key);
    }

    for v in map.values_mut() {
        let s = match v {
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        *v = Value::String(s);
    }
}

/// Converts raw records one by one. Records which still don't fit are
/// logged and left out.
pub fn documents_from_values(values: Vec<Value>) -> Vec<Document> {
    let total = values.len();
    let mut docs = Vec::with_capacity(total);

    for (i, mut value) in values.into_iter().enumerate() {
        stringify_scalars(&mut value);

        match serde_json::from_value::<Document>(value) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!("skipping document {}: {}", i, e),
        }
    }

    if docs.len() != total {
        info!("{} of {} documents skipped", total - docs.len(), total);
    }

    docs
}

/// Supplies the document snapshot a generation is built from.
pub trait DocumentSource {
    fn documents(&self) -> Result<Vec<Document>, BuildError>;

    /// Receives synthetic album records when album mirroring is enabled.
    fn mirror_albums(&self, _albums: &[Document]) -> Result<(), BuildError> {
        Ok(())
    }
}

/// Documents stored as a JSON array in a file.
pub struct JsonDocumentSource {
    path: PathBuf,
}

impl JsonDocumentSource {
    pub fn new(path: &Path) -> JsonDocumentSource {
        JsonDocumentSource {
            path: path.to_path_buf(),
        }
    }
}

impl DocumentSource for JsonDocumentSource {
    fn documents(&self) -> Result<Vec<Document>, BuildError> {
        info!("reading documents from '{}'", self.path.to_string_lossy());

        let file = File::open(&self.path)?;
        let values: Vec<Value> = serde_json::from_reader(BufReader::new(file))?;

        Ok(documents_from_values(values))
    }
}

/// A fixed in-memory list, mostly for embedding and tests.
pub struct MemoryDocumentSource {
    docs: Vec<Document>,
    mirrored: Mutex<Vec<Document>>,
}

impl MemoryDocumentSource {
    pub fn new(docs: Vec<Document>) -> MemoryDocumentSource {
        MemoryDocumentSource {
            docs,
            mirrored: Mutex::new(Vec::new()),
        }
    }

    pub fn mirrored(&self) -> Vec<Document> {
        match self.mirrored.lock() {
            Ok(m) => m.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl DocumentSource for MemoryDocumentSource {
    fn documents(&self) -> Result<Vec<Document>, BuildError> {
        Ok(self.docs.clone())
    }

    fn mirror_albums(&self, albums: &[Document]) -> Result<(), BuildError> {
        match self.mirrored.lock() {
            Ok(mut m) => {
                *m = albums.to_vec();
                Ok(())
            }
            Err(_) => Err(BuildError::Source("mirror lock poisoned".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(url: &str) -> Document {
        Document {
            url: url.to_string(),
            mtype: "audio/flac".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_paths() {
        let doc = track("file:///music/Foo/01.flac");
        assert_eq!(doc.path(), Some("/music/Foo/01.flac"));
        assert_eq!(doc.folder().as_deref(), Some("/music/Foo/"));

        let dir = Document {
            url: "file:///music/Foo/".to_string(),
            mtype: DIRECTORY_MTYPE.to_string(),
            ..Default::default()
        };
        assert_eq!(dir.path(), Some("/music/Foo"));
        assert_eq!(dir.folder().as_deref(), Some("/music/Foo/"));

        assert_eq!(track("http://host/stream.mp3").path(), None);
        assert_eq!(dirname("/music/Foo/"), "/music");
        assert_eq!(dirname("/music"), "/");
        assert_eq!(basename("/music/Foo/"), "Foo");
        assert_eq!(basename("/"), "/");
    }

    #[test]
    fn test_track_number() {
        let mut doc = track("file:///a/b.flac");
        assert_eq!(doc.track_number(), 1);
        doc.tracknumber = Some("7/12".to_string());
        assert_eq!(doc.track_number(), 7);
        doc.tracknumber = Some("x".to_string());
        assert_eq!(doc.track_number(), 1);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("1999"), Some("1999".to_string()));
        assert_eq!(parse_date("1999-05-04T10:00"), Some("1999-05-04".to_string()));
        assert_eq!(parse_date("1999-05"), None);
        assert_eq!(parse_date("0000"), None);
        assert_eq!(parse_date("99"), None);
        assert_eq!(parse_date("1999-ab-cd"), None);
        assert_eq!(parse_date("1999-5-04"), None);
        assert_eq!(parse_date("1999-05-4x"), None);
    }

    #[test]
    fn test_field_presence() {
        let mut doc = track("file:///a/b.flac");
        doc.genre = Some("  ".to_string());
        doc.extra.insert("mood".to_string(), "calm".to_string());
        assert_eq!(doc.field("genre"), None);
        assert_eq!(doc.field("mood"), Some("calm"));
        assert_eq!(MediaType::from_mtype("text/plain"), MediaType::Other);
        assert!(MediaType::from_mtype(PLAYLIST_MTYPE).is_browsable());
    }

    #[test]
    fn test_deserialize() {
        let docs: Vec<Document> = serde_json::from_str(
            r#"[{"url": "file:///m/a.mp3", "mtype": "audio/mpeg", "title": "A", "mood": "calm"}]"#,
        )
        .unwrap();
        assert_eq!(docs[0].title(), Some("A"));
        assert_eq!(docs[0].field("mood"), Some("calm"));
    }

    #[test]
    fn test_json_source_skips_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        std::fs::write(
            &path,
            r#"[
{"url": "file:///m/a.flac", "mtype": "audio/flac", "title": "A"},
{"url": "file:///m/b.flac", "mtype": "audio/flac", "bitrate": 320, "tracknumber": 3, "embdimg": null},
{"url": "file:///m/c.flac", "mtype": "audio/flac", "title": ["C", "D"]},
"not a document"
]"#,
        )
        .unwrap();

        let docs = JsonDocumentSource::new(&path).documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title(), Some("A"));
        assert_eq!(docs[1].field("bitrate"), Some("320"));
        assert_eq!(docs[1].track_number(), 3);
        assert_eq!(docs[1].embedded_image(), None);
    }

    #[test]
    fn test_json_source_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(JsonDocumentSource::new(&path).documents().is_err());
        assert!(JsonDocumentSource::new(&dir.path().join("missing.json"))
            .documents()
            .is_err());
    }
}
