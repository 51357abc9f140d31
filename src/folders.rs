use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::art::ArtFinder;
use crate::document::{basename, dirname, Document, MediaType};
use crate::entry::{direntry, sort_entries, Entry, EntryFormatter, SortContext, PLAYLIST_CLASS};
use crate::error::BrowseError;
use crate::m3u::{self, M3uEntry};

/// Upper bound on parent hops when rebuilding a folder path.
pub const MAX_DIR_DEPTH: usize = 200;

pub const TAG_VIEW_MARKER: &str = "$tagview.0";

/// Whether what follows a folder index opens its tag view.
pub fn is_tag_view(remain: &str) -> bool {
    match remain.strip_prefix(TAG_VIEW_MARKER) {
        Some(rest) => rest.is_empty() || rest.starts_with('$'),
        None => false,
    }
}

/// What a name inside a folder refers to: a sub-folder, a document, or both
/// (directory and playlist documents).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DirEntry {
    pub dir: Option<usize>,
    pub doc: Option<usize>,
}

#[derive(Debug)]
struct Dir {
    name: String,
    parent: usize,
    doc: Option<usize>,
    children: Vec<(String, DirEntry)>,
    positions: HashMap<String, usize>,
}

impl Dir {
    fn new(name: &str, parent: usize, doc: Option<usize>) -> Dir {
        Dir {
            name: name.to_string(),
            parent,
            doc,
            children: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn get(&self, name: &str) -> Option<DirEntry> {
        self.positions.get(name).map(|pos| self.children[*pos].1)
    }

    fn set(&mut self, name: &str, entry: DirEntry) {
        match self.positions.get(name) {
            Some(pos) => self.children[*pos].1 = entry,
            None => {
                self.positions.insert(name.to_string(), self.children.len());
                self.children.push((name.to_string(), entry));
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FolderObjKind {
    Dir,
    Item,
}

/// A parsed `[folders]` object id.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderObjId {
    pub kind: FolderObjKind,
    pub idx: usize,
    /// Whatever follows the index, e.g. `$tagview.0$hctags`.
    pub remain: Option<String>,
}

/// The filesystem-shaped tree implied by document URLs. Entry 0 is the
/// root: its children are the top directories, named by full path.
pub struct FolderIndex {
    id_prefix: String,
    docs: Arc<Vec<Document>>,
    more_docs: Vec<Document>,
    dirs: Vec<Dir>,
    playlists: Vec<usize>,
    /// Real path of documents filed under a group folder.
    grouped: HashMap<String, usize>,
    art: Arc<ArtFinder>,
}

fn strip_root<'p>(path: &'p str, root: &str) -> Option<&'p str> {
    let rest = if root == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(root)?.strip_prefix('/')?
    };

    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Deepest directory holding every given path.
fn common_root<'a, I>(paths: I) -> Option<String>
where
    I: Iterator<Item = &'a str>,
{
    let mut common: Option<Vec<&str>> = None;

    for path in paths {
        let segments: Vec<&str> = dirname(path).split('/').filter(|s| !s.is_empty()).collect();

        common = Some(match common {
            None => segments,
            Some(c) => c
                .iter()
                .zip(segments.iter())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| *a)
                .collect(),
        });
    }

    common.map(|c| format!("/{}", c.join("/")))
}

impl FolderIndex {
    pub fn build(
        id_prefix: &str,
        docs: Arc<Vec<Document>>,
        topdirs: &[String],
        art: Arc<ArtFinder>,
    ) -> FolderIndex {
        let start_instant = Instant::now();

        let mut folders = FolderIndex {
            id_prefix: format!("{}$folders", id_prefix),
            docs,
            more_docs: Vec::new(),
            dirs: vec![Dir::new("", 0, None)],
            playlists: Vec::new(),
            grouped: HashMap::new(),
            art,
        };

        let roots: Vec<String> = if topdirs.is_empty() {
            let docs = folders.docs.clone();
            common_root(
                docs.iter()
                    .filter(|d| d.media_type().is_browsable())
                    .filter_map(|d| d.path()),
            )
            .into_iter()
            .collect()
        } else {
            topdirs.to_vec()
        };

        for root in &roots {
            debug!("root '{}'", root);
            folders.create_dir(0, None, root);
        }

        let docs = folders.docs.clone();
        for (docidx, doc) in docs.iter().enumerate() {
            if !doc.media_type().is_browsable() {
                continue;
            }

            let (mut fathidx, segments) = match folders.path_beyond_roots(doc) {
                Some(r) => r,
                None => continue,
            };

            if let (Some(_), Some(path)) = (doc.group(), doc.path()) {
                folders.grouped.insert(path.to_string(), docidx);
            }

            for (i, elt) in segments.iter().enumerate() {
                let last = i == segments.len() - 1;

                if let Some(existing) = folders.dirs[fathidx].get(elt) {
                    if last {
                        folders.dirs[fathidx].set(
                            elt,
                            DirEntry {
                                dir: existing.dir,
                                doc: Some(docidx),
                            },
                        );
                        if let Some(d) = existing.dir {
                            folders.dirs[d].doc = Some(docidx);
                        }
                    }

                    match existing.dir {
                        Some(d) => fathidx = d,
                        None => break,
                    }
                } else if !last {
                    fathidx = folders.create_dir(fathidx, None, elt);
                } else {
                    match doc.media_type() {
                        MediaType::Directory => {
                            folders.create_dir(fathidx, Some(docidx), elt);
                        }
                        MediaType::Playlist => {
                            let idx = folders.create_dir(fathidx, Some(docidx), elt);
                            folders.playlists.push(idx);
                        }
                        _ => folders.dirs[fathidx].set(
                            elt,
                            DirEntry {
                                dir: None,
                                doc: Some(docidx),
                            },
                        ),
                    }
                }
            }
        }

        folders.init_playlists();

        info!(
            "done in {}ms: {} folders, {} playlists",
            start_instant.elapsed().as_millis(),
            folders.dirs.len(),
            folders.playlists.len()
        );

        folders
    }

    fn create_dir(&mut self, fathidx: usize, docidx: Option<usize>, name: &str) -> usize {
        let idx = self.dirs.len();
        self.dirs.push(Dir::new(name, fathidx, docidx));
        self.dirs[fathidx].set(name, DirEntry { dir: Some(idx), doc: docidx });
        idx
    }

    /// The top directory entry a path belongs to, with the remaining path
    /// split in segments.
    fn path_segments(&self, path: &str) -> Option<(usize, Vec<String>)> {
        let (rest, root_entry) = self.dirs[0]
            .children
            .iter()
            .filter_map(|(root, entry)| strip_root(path, root).map(|rest| (rest, root, entry)))
            .max_by_key(|(_, root, _)| root.len())
            .map(|(rest, _, entry)| (rest, *entry))?;

        let segments = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Some((root_entry.dir?, segments))
    }

    /// Like `path_segments`, with the document's group inserted as a virtual
    /// folder before the file name.
    fn path_beyond_roots(&self, doc: &Document) -> Option<(usize, Vec<String>)> {
        let (idx, mut segments) = self.path_segments(doc.path()?)?;

        if let Some(group) = doc.group() {
            let pos = segments.len() - 1;
            segments.insert(pos, group.to_string());
        }

        Some((idx, segments))
    }

    fn init_playlists(&mut self) {
        let playlists = self.playlists.clone();

        for diridx in playlists {
            let pldoc = match self.dirs[diridx].doc.and_then(|d| self.docs.get(d)) {
                Some(d) => d.clone(),
                None => continue,
            };

            let plpath = match pldoc.path() {
                Some(p) => p,
                None => continue,
            };

            let entries = match m3u::read_m3u(plpath) {
                Ok(e) => e,
                Err(e) => {
                    warn!("can't read playlist '{}': {}", plpath, e);
                    continue;
                }
            };

            for entry in entries {
                match entry {
                    M3uEntry::Url(url) => {
                        let doc = Self::doc_for_url(&url);
                        let title = doc.title.clone().unwrap_or_default();
                        self.more_docs.push(doc);
                        let docidx = self.docs.len() + self.more_docs.len() - 1;
                        self.dirs[diridx].set(&title, DirEntry { dir: None, doc: Some(docidx) });
                    }
                    M3uEntry::Path(path) => match self.stat(&path) {
                        (_, Some(docidx)) if docidx < self.docs.len() => {
                            self.dirs[diridx]
                                .set(basename(&path), DirEntry { dir: None, doc: Some(docidx) });
                        }
                        _ => debug!("no track for playlist '{}' entry '{}'", plpath, path),
                    },
                }
            }
        }
    }

    /// Synthetic document for a playlist URL entry.
    fn doc_for_url(url: &str) -> Document {
        Document {
            url: url.to_string(),
            mtype: "audio/mpeg".to_string(),
            title: Some(basename(url).to_string()),
            ..Default::default()
        }
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    /// Ingested documents plus synthetic playlist ones.
    pub fn doc(&self, docidx: usize) -> Option<&Document> {
        if docidx < self.docs.len() {
            self.docs.get(docidx)
        } else {
            self.more_docs.get(docidx - self.docs.len())
        }
    }

    pub fn is_playlist(&self, idx: usize) -> bool {
        self.playlists.contains(&idx)
    }

    /// Walks the tree by path. Grouped documents are found by their real
    /// path too. Misses give `(None, None)`.
    pub fn stat(&self, path: &str) -> (Option<usize>, Option<usize>) {
        let found = match self.path_segments(path) {
            Some((idx, segments)) => self.walk(idx, &segments),
            None => (None, None),
        };

        if found != (None, None) {
            return found;
        }

        match self.grouped.get(path).and_then(|d| self.docs.get(*d)) {
            Some(doc) => self.stat_doc(doc),
            None => found,
        }
    }

    /// Same as `stat`, following the virtual group folder of the document.
    fn stat_doc(&self, doc: &Document) -> (Option<usize>, Option<usize>) {
        match self.path_beyond_roots(doc) {
            Some((idx, segments)) => self.walk(idx, &segments),
            None => (None, None),
        }
    }

    fn walk(&self, start: usize, segments: &[String]) -> (Option<usize>, Option<usize>) {
        let mut result = (Some(start), None);

        for elt in segments {
            let fathidx = match result.0 {
                Some(i) => i,
                None => return (None, None),
            };

            match self.dirs[fathidx].get(elt) {
                Some(entry) => result = (entry.dir, entry.doc),
                None => return (None, None),
            }
        }

        result
    }

    /// Path of a folder with a trailing slash. Anything unexpected on the
    /// way up gives "/".
    pub fn dirpath(&self, idx: usize) -> String {
        if idx == 0 || idx >= self.dirs.len() {
            return "/".to_string();
        }

        let mut elements: Vec<&str> = Vec::new();
        let mut current = idx;

        while current != 0 {
            if elements.len() >= MAX_DIR_DEPTH {
                warn!("dirpath for {} exceeds {} levels", idx, MAX_DIR_DEPTH);
                return "/".to_string();
            }

            let dir = &self.dirs[current];
            let parent = match self.dirs.get(dir.parent) {
                Some(p) => p,
                None => return "/".to_string(),
            };

            match parent.get(&dir.name) {
                Some(DirEntry { dir: Some(d), .. }) if d == current => {}
                _ => {
                    warn!("dirpath for {}: parent {} has no entry", idx, dir.parent);
                    return "/".to_string();
                }
            }

            elements.push(&dir.name);
            current = dir.parent;
        }

        let mut path = String::new();
        for elt in elements.iter().rev() {
            path += elt.trim_end_matches('/');
            path += "/";
        }

        path
    }

    /// Non-empty children in insertion order.
    pub fn browse(&self, idx: usize) -> Vec<(&str, DirEntry)> {
        let dir = match self.dirs.get(idx) {
            Some(d) => d,
            None => return Vec::new(),
        };

        dir.children
            .iter()
            .filter(|(_, entry)| match entry.dir {
                Some(d) => self.dirs.get(d).map_or(false, |d| !d.children.is_empty()),
                None => true,
            })
            .map(|(name, entry)| (name.as_str(), *entry))
            .collect()
    }

    pub fn cover_art(&self, doc: &Document, prefer_folder: bool) -> Option<String> {
        self.art.doc_art_uri(doc, prefer_folder, doc.album())
    }

    /// Art of the first child document having any.
    fn dir_art(&self, idx: usize) -> Option<String> {
        let dir = self.dirs.get(idx)?;

        dir.children
            .iter()
            .filter_map(|(_, entry)| entry.doc)
            .filter(|d| *d < self.docs.len())
            .filter_map(|d| self.docs.get(d))
            .find_map(|doc| self.cover_art(doc, true))
    }

    pub fn parse_objid(&self, objid: &str) -> Result<FolderObjId, BrowseError> {
        let rest = objid
            .strip_prefix(self.id_prefix.as_str())
            .ok_or_else(|| BrowseError::malformed(format!("not a folder id: {}", objid)))?;

        if rest.is_empty() {
            return Ok(FolderObjId {
                kind: FolderObjKind::Dir,
                idx: 0,
                remain: None,
            });
        }

        let kind = if rest.starts_with("$d") {
            FolderObjKind::Dir
        } else if rest.starts_with("$i") {
            FolderObjKind::Item
        } else {
            return Err(BrowseError::malformed(format!("bad folder id: {}", objid)));
        };

        let (number, remain) = match rest[2..].find('$') {
            Some(pos) => (&rest[2..2 + pos], Some(rest[2 + pos..].to_string())),
            None => (&rest[2..], None),
        };

        let idx: usize = number
            .parse()
            .map_err(|_| BrowseError::malformed(format!("bad folder index: {}", objid)))?;

        let valid = match kind {
            FolderObjKind::Dir => idx < self.dirs.len(),
            FolderObjKind::Item => self.doc(idx).is_some(),
        };

        if !valid {
            return Err(BrowseError::malformed(format!("folder index out of range: {}", objid)));
        }

        Ok(FolderObjId { kind, idx, remain })
    }

    /// Children of a folder as entries, prefixed by the tag view entry when
    /// `tag_view` is set.
    pub fn folder_entries(
        &self,
        pid: &str,
        idx: usize,
        formatter: &dyn EntryFormatter,
        tag_view: bool,
    ) -> Vec<Entry> {
        let mut idx = idx;

        if idx == 0 && self.dirs[0].children.len() == 1 {
            if let Some(d) = self.dirs[0].children[0].1.dir {
                idx = d;
            }
        }

        let mut entries = Vec::new();
        let mut show_top_art = true;

        for (name, entry) in self.browse(idx) {
            match entry.dir {
                Some(d) => {
                    show_top_art = false;
                    let id = format!("{}$d{}", self.id_prefix, d);
                    let mut e = direntry(&id, pid, basename(name));
                    e.art_uri = self.dir_art(d);
                    if self.is_playlist(d) {
                        e.upnp_class = PLAYLIST_CLASS.to_string();
                    }
                    entries.push(e);
                }
                None => {
                    let docidx = match entry.doc {
                        Some(d) => d,
                        None => continue,
                    };
                    let doc = match self.doc(docidx) {
                        Some(d) => d,
                        None => continue,
                    };
                    let id = format!("{}$i{}", self.id_prefix, docidx);
                    if let Some(e) = formatter.track_entry(&id, pid, doc) {
                        entries.push(e);
                    }
                }
            }
        }

        if !self.is_playlist(idx) {
            sort_entries(&mut entries, SortContext::Default);
        }

        if tag_view && pid != self.id_prefix {
            let mut e = direntry(&format!("{}{}", pid, TAG_VIEW_MARKER), pid, ">> Tag View");
            if show_top_art {
                e.art_uri = self.dir_art(idx);
            }
            entries.insert(0, e);
        }

        entries
    }

    /// The entry for one item, for metadata requests.
    pub fn item_entry(&self, pid: &str, docidx: usize, formatter: &dyn EntryFormatter) -> Vec<Entry> {
        let id = format!("{}$i{}", self.id_prefix, docidx);

        self.doc(docidx)
            .and_then(|doc| formatter.track_entry(&id, pid, doc))
            .into_iter()
            .collect()
    }
}
