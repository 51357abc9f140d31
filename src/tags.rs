use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::Value;

use crate::cache::{Clock, CountCache, HiddenFolders};
use crate::config::Facet;
use crate::document::{basename, Document};
use crate::entry::{album_direntry, direntry, sort_entries, Entry, EntryFormatter, Listing, SortContext};
use crate::error::BrowseError;
use crate::folders::is_tag_view;
use crate::index::Index;
use crate::query::{like_prefix, QueryOptions};

pub type Result<T> = std::result::Result<T, BrowseError>;

/// Below this many tracks a sliced request gets the whole sorted list.
pub const PAGINATION_THRESHOLD: i64 = 1000;

/// How long visiting ">> Hide Contents" hides the sibling tag tree.
pub const HIDE_WINDOW_MS: i64 = 2000;

pub const SHOW_COMPLETE_ALBUM: &str = "showca";
const COMPLETE_ALBUM_TITLE: &str = ">> Complete Album";
const HIDE_CONTENTS: &str = "hchide";
const FOLDER_TAGS: &str = "hctags";

const ALBUM_SELECT: &str = "SELECT albums.album_id, albums.albtitle, albums.albarturi, albums.albdate, artist.value
    FROM albums LEFT JOIN artist ON artist.artist_id = albums.artist_id";

const TRACK_SELECT: &str = "SELECT tracks.docidx FROM tracks";

/// `i<docidx>` path element.
pub fn parse_item(elt: &str) -> Option<usize> {
    let digits = elt.strip_prefix('i')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_id(elt: &str, objid: &str) -> Result<i64> {
    elt.parse::<i64>()
        .map_err(|_| BrowseError::malformed(format!("expected a number at '{}' in {}", elt, objid)))
}

fn parent_id(objid: &str) -> &str {
    match objid.rfind('$') {
        Some(pos) => &objid[..pos],
        None => objid,
    }
}

fn id_values(ids: &[i64]) -> (String, Vec<Value>) {
    let placeholders = vec!["?"; ids.len()].join(",");
    (placeholders, ids.iter().map(|id| Value::Integer(*id)).collect())
}

/// Path-driven views over the tag tables of one generation.
pub struct TagBrowser {
    index: Mutex<Index>,
    id_prefix: String,
    facets: Vec<Facet>,
    docs: Arc<Vec<Document>>,
    formatter: Arc<dyn EntryFormatter>,
    counts: Box<dyn CountCache>,
    clock: Arc<dyn Clock>,
    hidden: HiddenFolders,
}

impl TagBrowser {
    pub fn new(
        index: Index,
        object_prefix: &str,
        facets: Vec<Facet>,
        docs: Arc<Vec<Document>>,
        formatter: Arc<dyn EntryFormatter>,
        counts: Box<dyn CountCache>,
        clock: Arc<dyn Clock>,
    ) -> TagBrowser {
        TagBrowser {
            index: Mutex::new(index),
            id_prefix: format!("{}$", object_prefix),
            facets,
            docs,
            formatter,
            counts,
            clock,
            hidden: HiddenFolders::new(HIDE_WINDOW_MS),
        }
    }

    fn lock(&self) -> MutexGuard<Index> {
        // the index is read-only once built
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn facet(&self, name: &str, objid: &str) -> Result<&Facet> {
        self.facets
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| BrowseError::malformed(format!("unknown tag '{}' in {}", name, objid)))
    }

    fn track_entries(&self, pid: &str, docids: &[i64]) -> Vec<Entry> {
        docids
            .iter()
            .filter_map(|docidx| {
                let doc = self.docs.get(*docidx as usize)?;
                self.formatter
                    .track_entry(&format!("{}$i{}", pid, docidx), pid, doc)
            })
            .collect()
    }

    /// Single item entry for metadata requests.
    pub fn item_entry(&self, objid: &str, docidx: usize) -> Vec<Entry> {
        self.docs
            .get(docidx)
            .and_then(|doc| self.formatter.track_entry(objid, parent_id(objid), doc))
            .into_iter()
            .collect()
    }

    fn folder_selection(folder: Option<&str>) -> QueryOptions {
        let mut sel = QueryOptions::new();
        if let Some(folder) = folder {
            sel.filter_path(folder);
        }
        sel
    }

    fn facet_value_count(&self, index: &Index, facet: &Facet, sel: &QueryOptions) -> Result<i64> {
        let t = facet.table;
        let mut opts = QueryOptions::new();
        if !sel.is_empty() {
            opts.filter_values(
                &format!("{}_tracks.docidx IN ({})", t, sel.docidx_subquery()),
                sel.values().to_vec(),
            );
        }

        Ok(opts.get_total(
            index.connection(),
            &format!("SELECT COUNT(DISTINCT {0}_id) FROM {0}_tracks", t),
        )?)
    }

    /// Facets which still have more than one value inside the selection.
    fn subtree_tags(&self, index: &Index, sel: &QueryOptions) -> Result<Vec<&Facet>> {
        let mut result = Vec::new();

        for facet in &self.facets {
            let count = self.facet_value_count(index, facet, sel)?;
            trace!("{} values for {}", count, facet.name);
            if count > 1 {
                result.push(facet);
            }
        }

        Ok(result)
    }

    fn docids(&self, index: &Index, sel: &QueryOptions) -> Result<Vec<i64>> {
        let mut opts = sel.clone();
        opts.order_string("tracks.trackno, tracks.docidx");
        Ok(opts.query_ids(index.connection(), TRACK_SELECT)?)
    }

    /// Displayed albums (merged where applicable) of the selected tracks.
    fn subtree_albums(&self, index: &Index, sel: &QueryOptions) -> Result<Vec<i64>> {
        let mut opts = sel.clone();
        opts.order_string("tracks.album_id");
        let raw = opts.query_ids(index.connection(), "SELECT DISTINCT tracks.album_id FROM tracks")?;
        Ok(index.display_album_ids(&raw)?)
    }

    fn album_entries(&self, index: &Index, pid: &str, opts: &QueryOptions) -> Result<Vec<Entry>> {
        let mut opts = opts.clone();
        opts.order_string("albums.albtitle, albums.album_id");

        let rows = opts.query_map(index.connection(), ALBUM_SELECT, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        Ok(rows
            .into_iter()
            .map(|(id, title, art, date, artist)| {
                album_direntry(&format!("{}${}", pid, id), pid, &title, art, date, artist)
            })
            .collect())
    }

    fn album_entries_for_ids(&self, index: &Index, pid: &str, ids: &[i64]) -> Result<Vec<Entry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (placeholders, values) = id_values(ids);
        let mut opts = QueryOptions::new();
        opts.filter_values(&format!("albums.album_id IN ({})", placeholders), values);

        self.album_entries(index, pid, &opts)
    }

    /// Tracks of a possibly merged album, disc after disc, renumbered so
    /// that track numbers strictly increase.
    fn tracks_for_album(&self, index: &Index, albid: i64, pid: &str) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();

        for raw in index.album_members(albid)? {
            let mut opts = QueryOptions::new();
            opts.filter_value("tracks.album_id = ?", raw);
            opts.order_string("tracks.trackno, tracks.docidx");

            let docids = opts.query_ids(index.connection(), TRACK_SELECT)?;
            let mut disc = self.track_entries(pid, &docids);
            sort_entries(&mut disc, SortContext::Default);
            entries.extend(disc);
        }

        let mut last: Option<i64> = None;
        for entry in entries.iter_mut() {
            let mut number = match entry.track_number_value() {
                n if n > 0 => n,
                _ => 1,
            };
            if let Some(prev) = last {
                if number <= prev {
                    number = prev + 1;
                }
            }
            last = Some(number);
            entry.track_number = Some(number.to_string());
        }

        Ok(entries)
    }

    fn album_track_count(&self, index: &Index, albid: i64) -> Result<usize> {
        let raw = index.album_members(albid)?;
        let (placeholders, values) = id_values(&raw);

        let mut opts = QueryOptions::new();
        opts.filter_values(&format!("tracks.album_id IN ({})", placeholders), values);

        Ok(opts.get_total(index.connection(), "SELECT COUNT(*) FROM tracks")? as usize)
    }

    /// Entries of the tag root `pid`, optionally restricted to a folder.
    pub fn root_entries(&self, pid: &str, folder: Option<&str>) -> Result<Vec<Entry>> {
        let index = self.lock();
        self.root_entries_locked(&index, pid, folder)
    }

    fn root_entries_locked(&self, index: &Index, pid: &str, folder: Option<&str>) -> Result<Vec<Entry>> {
        let nalbs: i64 = match folder {
            Some(folder) => index.connection().query_row(
                "SELECT COUNT(DISTINCT albalb) FROM albums WHERE albfolder LIKE ? ESCAPE '\\'",
                [like_prefix(folder)],
                |row| row.get(0),
            )?,
            None => index.album_count()?,
        };

        let sel = Self::folder_selection(folder);
        let nitems = sel.get_total(index.connection(), "SELECT COUNT(*) FROM tracks")?;

        let mut entries = vec![
            direntry(&format!("{}$albums", pid), pid, &format!("{} albums", nalbs)),
            direntry(&format!("{}$items", pid), pid, &format!("{} items", nitems)),
        ];

        for facet in self.subtree_tags(index, &sel)? {
            entries.push(direntry(
                &format!("{}$={}", pid, facet.name),
                pid,
                &facet.display,
            ));
        }

        Ok(entries)
    }

    /// Browses an id of the tag trees (`<prefix>$=...`, `$albums...`,
    /// `$items...`).
    pub fn browse(&self, objid: &str, offset: usize, count: usize) -> Result<Listing> {
        let rest = objid
            .strip_prefix(self.id_prefix.as_str())
            .ok_or_else(|| BrowseError::malformed(format!("not a tag id: {}", objid)))?;

        let qpath: Vec<&str> = rest.split('$').collect();

        let index = self.lock();
        self.dobrowse(&index, objid, &qpath, None, offset, count)
    }

    /// Albums shown at the top level, as a container of the `$albums` tree.
    pub fn album_entry(&self, albid: i64) -> Result<Option<Entry>> {
        let index = self.lock();
        let pid = format!("{}albums", self.id_prefix);

        let mut opts = QueryOptions::new();
        opts.filter_value("albums.album_id = ?", albid);
        opts.filter("albums.albalb = albums.album_id");

        Ok(self.album_entries(&index, &pid, &opts)?.into_iter().next())
    }

    fn dobrowse(
        &self,
        index: &Index,
        pid: &str,
        qpath: &[&str],
        folder: Option<&str>,
        offset: usize,
        count: usize,
    ) -> Result<Listing> {
        debug!(
            "browse pid={} qpath={:?} folder={:?} offset={} count={}",
            pid,
            qpath,
            folder,
            offset,
            count
        );

        let first = match qpath.first() {
            Some(f) => *f,
            None => return Err(BrowseError::malformed(pid)),
        };

        // item leaves have no children, but their parent must list them
        if qpath.len() > 1 {
            if let Some(docidx) = qpath.last().and_then(|e| parse_item(e)) {
                return self.item_leaf(index, pid, &qpath[..qpath.len() - 1], folder, docidx);
            }
        }

        match first {
            "items" if qpath.len() == 1 => {
                self.paged_track_entries(index, pid, Self::folder_selection(folder), offset, count)
            }
            "albums" => self.albums_browse(index, pid, qpath, folder).map(Listing::Full),
            f if f.starts_with('=') => self.tags_browse(index, pid, qpath, folder).map(Listing::Full),
            _ => Err(BrowseError::malformed(format!("bad tag path start in {}", pid))),
        }
    }

    fn item_leaf(
        &self,
        index: &Index,
        pid: &str,
        parent: &[&str],
        folder: Option<&str>,
        docidx: usize,
    ) -> Result<Listing> {
        let listed = if parent.len() == 1 && parent[0] == "items" {
            let mut sel = Self::folder_selection(folder);
            sel.filter_value("tracks.docidx = ?", docidx as i64);
            sel.get_total(index.connection(), "SELECT COUNT(*) FROM tracks")? > 0
        } else {
            self.dobrowse(index, parent_id(pid), parent, folder, 0, 0)?
                .entries()
                .iter()
                .any(|e| e.id == pid)
        };

        if listed {
            Ok(Listing::Full(Vec::new()))
        } else {
            Err(BrowseError::malformed(format!("{} is not listed by its parent", pid)))
        }
    }

    fn paged_track_entries(
        &self,
        index: &Index,
        pid: &str,
        sel: QueryOptions,
        offset: usize,
        count: usize,
    ) -> Result<Listing> {
        if offset != 0 || count != 0 {
            let count_select = "SELECT COUNT(*) FROM tracks";
            let key = sel.cache_key(count_select);

            let total = match self.counts.get(&key) {
                Some(t) => t,
                None => {
                    let t = sel.get_total(index.connection(), count_select)?;
                    self.counts.set(&key, t);
                    t
                }
            };

            if total >= PAGINATION_THRESHOLD {
                let mut opts = sel;
                opts.order_string("tracks.docidx");
                if count != 0 {
                    opts.limit(count as i64);
                }
                if offset != 0 {
                    opts.offset(offset as i64);
                }

                let docids = opts.query_ids(index.connection(), TRACK_SELECT)?;

                return Ok(Listing::Slice {
                    offset,
                    total: total as usize,
                    entries: self.track_entries(pid, &docids),
                });
            }
        }

        let docids = sel.query_ids(index.connection(), TRACK_SELECT)?;
        let mut entries = self.track_entries(pid, &docids);
        sort_entries(&mut entries, SortContext::Items);

        Ok(Listing::Full(entries))
    }

    /// The `$albums` tree: all albums, then one album's tracks.
    fn albums_browse(&self, index: &Index, pid: &str, qpath: &[&str], folder: Option<&str>) -> Result<Vec<Entry>> {
        match qpath.len() {
            1 => {
                let mut opts = QueryOptions::new();
                match folder {
                    Some(folder) => opts.filter_value(
                        "albums.album_id IN
                        (SELECT DISTINCT albalb FROM albums WHERE albfolder LIKE ? ESCAPE '\\')",
                        like_prefix(folder),
                    ),
                    None => opts.filter("albums.albalb = albums.album_id"),
                }
                self.album_entries(index, pid, &opts)
            }
            2 => self.tracks_for_album(index, parse_id(qpath[1], pid)?, pid),
            3 if qpath[2] == SHOW_COMPLETE_ALBUM => {
                self.tracks_for_album(index, parse_id(qpath[1], pid)?, pid)
            }
            _ => Err(BrowseError::malformed(format!("bad album path {}", pid))),
        }
    }

    /// Walks `=tag$value` pairs, narrowing the selection.
    fn tags_browse(&self, index: &Index, pid: &str, qpath: &[&str], folder: Option<&str>) -> Result<Vec<Entry>> {
        let mut sel = Self::folder_selection(folder);

        let mut i = 0;
        while i < qpath.len() {
            let elt = qpath[i];

            match elt {
                "albums" => return self.tags_browse_albums(index, pid, qpath, i, &sel),
                "items" => return self.tags_browse_items(index, pid, qpath, i, &sel),
                _ => {}
            }

            let name = elt
                .strip_prefix('=')
                .ok_or_else(|| BrowseError::malformed(format!("unexpected '{}' in {}", elt, pid)))?;
            let facet = self.facet(name, pid)?;

            if i == qpath.len() - 1 {
                return self.tag_values(index, pid, facet, &sel);
            }

            let value_id = parse_id(qpath[i + 1], pid)?;
            sel.filter_tag(facet.table, value_id);
            i += 2;
        }

        self.selection_entries(index, pid, &sel)
    }

    /// Distinct values of a facet among the selected tracks.
    fn tag_values(&self, index: &Index, pid: &str, facet: &Facet, sel: &QueryOptions) -> Result<Vec<Entry>> {
        let t = facet.table;

        let mut opts = QueryOptions::new();
        if !sel.is_empty() {
            opts.filter_values(
                &format!("{}_tracks.docidx IN ({})", t, sel.docidx_subquery()),
                sel.values().to_vec(),
            );
        }
        opts.group_string(&format!("{}.{}_id", t, t));
        opts.order_string(&format!("{}.value", t));

        let rows = opts.query_map(
            index.connection(),
            &format!(
                "SELECT {0}.{0}_id, {0}.value FROM {0}_tracks
                INNER JOIN {0} ON {0}.{0}_id = {0}_tracks.{0}_id",
                t
            ),
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )?;

        Ok(rows
            .into_iter()
            .map(|(id, value)| direntry(&format!("{}${}", pid, id), pid, &value))
            .collect())
    }

    /// Content of a node where the path ends on a value: album shortcuts,
    /// then either the facets still worth narrowing or the tracks.
    fn selection_entries(&self, index: &Index, pid: &str, sel: &QueryOptions) -> Result<Vec<Entry>> {
        let docids = self.docids(index, sel)?;
        let albids = self.subtree_albums(index, sel)?;
        let subqs = self.subtree_tags(index, sel)?;

        let mut entries = Vec::new();
        let mut display_tracks = true;

        if albids.len() > 1 {
            entries.push(direntry(
                &format!("{}$albums", pid),
                pid,
                &format!("{} albums", albids.len()),
            ));
        } else if let Some(albid) = albids.first() {
            let id = format!("{}$albums${}${}", pid, albid, SHOW_COMPLETE_ALBUM);

            if self.album_track_count(index, *albid)? != docids.len() {
                entries.push(direntry(&id, pid, COMPLETE_ALBUM_TITLE));
            } else {
                display_tracks = false;
                if let Some(mut album) = self
                    .album_entries_for_ids(index, pid, &[*albid])?
                    .into_iter()
                    .next()
                {
                    album.id = id;
                    entries.push(album);
                }
            }
        }

        if !subqs.is_empty() {
            entries.push(direntry(
                &format!("{}$items", pid),
                pid,
                &format!("{} items", docids.len()),
            ));
            for facet in subqs {
                entries.push(direntry(
                    &format!("{}$={}", pid, facet.name),
                    pid,
                    &facet.display,
                ));
            }
        } else if display_tracks {
            let mut tracks = self.track_entries(pid, &docids);
            sort_entries(&mut tracks, SortContext::Items);
            entries.extend(tracks);
        }

        Ok(entries)
    }

    /// `albums` inside a tag path: the album list, one album restricted to
    /// the selection, or the complete album.
    fn tags_browse_albums(
        &self,
        index: &Index,
        pid: &str,
        qpath: &[&str],
        i: usize,
        sel: &QueryOptions,
    ) -> Result<Vec<Entry>> {
        let qlen = qpath.len();

        if i == qlen - 1 {
            let albids = self.subtree_albums(index, sel)?;
            self.album_entries_for_ids(index, pid, &albids)
        } else if i == qlen - 2 {
            let albid = parse_id(qpath[qlen - 1], pid)?;
            let raw = index.album_members(albid)?;
            let (placeholders, values) = id_values(&raw);

            let mut opts = sel.clone();
            opts.filter_values(&format!("tracks.album_id IN ({})", placeholders), values);
            let docids = opts.query_ids(index.connection(), TRACK_SELECT)?;

            let mut entries = self.track_entries(pid, &docids);
            sort_entries(&mut entries, SortContext::Default);

            if self.album_track_count(index, albid)? != entries.len() {
                let id = format!("{}${}", pid, SHOW_COMPLETE_ALBUM);
                entries.insert(0, direntry(&id, pid, COMPLETE_ALBUM_TITLE));
            }

            Ok(entries)
        } else if i == qlen - 3 && qpath[qlen - 1] == SHOW_COMPLETE_ALBUM {
            let albid = parse_id(qpath[qlen - 2], pid)?;
            self.tracks_for_album(index, albid, pid)
        } else {
            Err(BrowseError::malformed(format!("bad album path {}", pid)))
        }
    }

    /// `items` inside a tag path: every selected track.
    fn tags_browse_items(
        &self,
        index: &Index,
        pid: &str,
        qpath: &[&str],
        i: usize,
        sel: &QueryOptions,
    ) -> Result<Vec<Entry>> {
        if i != qpath.len() - 1 {
            return Err(BrowseError::malformed(format!("bad items path {}", pid)));
        }

        let docids = sel.query_ids(index.connection(), TRACK_SELECT)?;
        let albids = self.subtree_albums(index, sel)?;

        let mut entries = Vec::new();

        if let [albid] = albids.as_slice() {
            if self.album_track_count(index, *albid)? != docids.len() {
                let base = pid.strip_suffix("$items").unwrap_or(pid);
                let id = format!("{}$albums${}${}", base, albid, SHOW_COMPLETE_ALBUM);
                entries.push(direntry(&id, pid, COMPLETE_ALBUM_TITLE));
            }
        }

        let mut tracks = self.track_entries(pid, &docids);
        sort_entries(&mut tracks, SortContext::Items);
        entries.extend(tracks);

        Ok(entries)
    }

    /// The tag view of a folder: `remain` is what follows the folder id,
    /// starting with `$tagview.0`.
    pub fn browse_folder(&self, pid: &str, remain: &str, folder: &str) -> Result<Vec<Entry>> {
        debug!("browse folder pid={} remain={} folder={}", pid, remain, folder);

        if !is_tag_view(remain) {
            return Err(BrowseError::malformed(pid));
        }

        let l: Vec<&str> = remain.split('$').collect();

        match l.len() {
            0 | 1 => Err(BrowseError::malformed(pid)),
            2 => Ok(vec![
                direntry(&format!("{}${}", pid, HIDE_CONTENTS), pid, ">> Hide Contents"),
                direntry(&format!("{}${}", pid, FOLDER_TAGS), pid, basename(folder)),
            ]),
            3 => {
                let ppid = parent_id(pid);
                let now = self.clock.now_millis();

                match l[2] {
                    HIDE_CONTENTS => {
                        self.hidden.hide(ppid, now);
                        Ok(Vec::new())
                    }
                    FOLDER_TAGS => {
                        if self.hidden.is_hidden(ppid, now) {
                            return Ok(Vec::new());
                        }
                        self.root_entries(pid, Some(folder))
                    }
                    _ => Err(BrowseError::malformed(pid)),
                }
            }
            _ => {
                if l[2] != FOLDER_TAGS {
                    return Err(BrowseError::malformed(pid));
                }

                let index = self.lock();
                Ok(self
                    .dobrowse(&index, pid, &l[3..], Some(folder), 0, 0)?
                    .into_entries())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::art::ArtFinder;
    use crate::cache::{count_cache, ManualClock};
    use crate::config::Config;
    use crate::entry::DocumentFormatter;
    use crate::scan;

    fn track(path: &str, album: &str, genre: &str, artist: &str, tno: &str) -> Document {
        Document {
            url: format!("file://{}", path),
            mtype: "audio/flac".to_string(),
            album: Some(album.to_string()),
            genre: Some(genre.to_string()),
            artist: Some(artist.to_string()),
            tracknumber: Some(tno.to_string()),
            title: Some(format!("T {}", path)),
            ..Default::default()
        }
    }

    fn browser_with_clock(docs: Vec<Document>, clock: Arc<ManualClock>) -> TagBrowser {
        let config = Config::default();
        let art = Arc::new(ArtFinder::new(&config));
        let index = Index::create().unwrap();
        scan::build(&index, &docs, &config, &art).unwrap();

        TagBrowser::new(
            index,
            &config.object_prefix,
            config.facets(),
            Arc::new(docs),
            Arc::new(DocumentFormatter::new(&config, art)),
            count_cache(config.count_cache_size),
            clock,
        )
    }

    fn browser(docs: Vec<Document>) -> TagBrowser {
        browser_with_clock(docs, Arc::new(ManualClock::new(0)))
    }

    fn sample() -> Vec<Document> {
        vec![
            track("/m/A/01.flac", "A", "Jazz", "X", "1"),
            track("/m/A/02.flac", "A", "Jazz", "X", "2"),
            track("/m/B/01.flac", "B", "Rock", "X", "1"),
            track("/m/C/01.flac", "C", "Rock", "Y", "1"),
            track("/m/C/02.flac", "C", "Jazz", "Y", "2"),
        ]
    }

    fn titles(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.title.as_str()).collect()
    }

    fn children(b: &TagBrowser, id: &str) -> Vec<Entry> {
        b.browse(id, 0, 0).unwrap().into_entries()
    }

    fn value_id(b: &TagBrowser, tag: &str, value: &str) -> String {
        let list = children(b, &format!("0$uprcl$={}", tag));
        list.into_iter().find(|e| e.title == value).unwrap().id
    }

    #[test]
    fn test_root_entries() {
        let b = browser(sample());
        let entries = b.root_entries("0$uprcl", None).unwrap();
        assert_eq!(titles(&entries), vec!["3 albums", "5 items", "Artist", "Genre"]);
        assert_eq!(entries[2].id, "0$uprcl$=Artist");
    }

    #[test]
    fn test_values_and_narrowing() {
        let b = browser(sample());

        let genres = children(&b, "0$uprcl$=Genre");
        assert_eq!(titles(&genres), vec!["Jazz", "Rock"]);

        let jazz = value_id(&b, "Genre", "Jazz");
        let entries = children(&b, &jazz);
        assert_eq!(titles(&entries), vec!["2 albums", "3 items", "Artist"]);
        assert!(entries.iter().all(|e| !e.id.ends_with("=Genre")));

        let artists = children(&b, &format!("{}$=Artist", jazz));
        assert_eq!(titles(&artists), vec!["X", "Y"]);

        // Jazz + X: one album, complete, no facet left
        let x = &artists[0].id;
        let entries = children(&b, x);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "A");
        assert!(entries[0].id.ends_with("$showca"));

        let album = children(&b, &entries[0].id);
        assert_eq!(album.len(), 2);

        let all: Vec<String> = children(&b, &format!("{}$items", jazz))
            .into_iter()
            .map(|e| e.uri.unwrap())
            .collect();
        let x_items: Vec<String> = children(&b, &format!("{}$items", x))
            .into_iter()
            .filter(|e| !e.is_container())
            .map(|e| e.uri.unwrap())
            .collect();
        assert!(x_items.iter().all(|u| all.contains(u)));
        assert_eq!(x_items.len(), 2);
    }

    #[test]
    fn test_complete_album_shortcut() {
        let b = browser(sample());

        // Y + Jazz: album C, one track of two
        let y = value_id(&b, "Artist", "Y");
        let jazz_under_y = children(&b, &format!("{}$=Genre", y))
            .into_iter()
            .find(|e| e.title == "Jazz")
            .unwrap();

        let entries = children(&b, &jazz_under_y.id);
        assert_eq!(entries[0].title, COMPLETE_ALBUM_TITLE);
        assert_eq!(entries.len(), 2);

        let complete = children(&b, &entries[0].id);
        assert_eq!(complete.len(), 2);

        let items = children(&b, &format!("{}$items", jazz_under_y.id));
        assert_eq!(items[0].title, COMPLETE_ALBUM_TITLE);
        assert!(items[0].id.contains("$albums$"));
        assert_eq!(children(&b, &items[0].id).len(), 2);

        let albums = children(&b, &format!("{}$albums", jazz_under_y.id));
        assert_eq!(titles(&albums), vec!["C"]);
        let filtered = children(&b, &albums[0].id);
        assert_eq!(filtered[0].title, COMPLETE_ALBUM_TITLE);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_merged_album_renumbered() {
        let docs = vec![
            track("/m/Foo/d1/01.flac", "Bar", "Jazz", "X", "1"),
            track("/m/Foo/d1/02.flac", "Bar", "Jazz", "X", "2"),
            Document {
                discnumber: Some("2".to_string()),
                ..track("/m/Foo/d2/01.flac", "Bar", "Jazz", "X", "1")
            },
            Document {
                discnumber: Some("1".to_string()),
                ..track("/m/Foo/d1/03.flac", "Bar", "Jazz", "X", "3")
            },
        ];
        // the first two carry no disc tag and land in their own album
        let b = browser(docs);

        let albums = children(&b, "0$uprcl$albums");
        assert_eq!(albums.len(), 2);

        let mut seen = 0;
        for album in &albums {
            let tracks = children(&b, &album.id);
            let numbers: Vec<i64> = tracks.iter().map(|t| t.track_number_value()).collect();
            assert!(numbers.windows(2).all(|w| w[0] < w[1]), "{:?}", numbers);
            seen += tracks.len();
        }
        assert_eq!(seen, 4);
    }

    #[test]
    fn test_merged_discs_track_union() {
        let mut docs = Vec::new();
        for (disc, name) in &[("1", "d1"), ("2", "d2")] {
            for n in 1..=3 {
                docs.push(Document {
                    discnumber: Some(disc.to_string()),
                    ..track(&format!("/m/Foo/{}/0{}.flac", name, n), "Bar", "Jazz", "X", &n.to_string())
                });
            }
        }
        let b = browser(docs);

        let albums = children(&b, "0$uprcl$albums");
        assert_eq!(titles(&albums), vec!["Bar"]);

        let tracks = children(&b, &albums[0].id);
        let numbers: Vec<i64> = tracks.iter().map(|t| t.track_number_value()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        assert!(tracks[0].uri.as_deref().unwrap().contains("/d1/"));
        assert!(tracks[5].uri.as_deref().unwrap().contains("/d2/"));
    }

    #[test]
    fn test_malformed_paths() {
        let b = browser(sample());

        for id in &[
            "0$uprcl$bogus",
            "0$uprcl$=Nope",
            "0$uprcl$=Genre$abc",
            "0$uprcl$=Genre$1$stray",
            "0$uprcl$albums$x",
            "0$uprcl$albums$1$2$3",
            "0$uprcl$=Genre$1$albums$2$nope",
            "1$other",
        ] {
            match b.browse(id, 0, 0) {
                Err(BrowseError::Malformed(_)) => {}
                other => panic!("{} gave {:?}", id, other),
            }
        }

        // an empty selection is fine
        assert_eq!(children(&b, "0$uprcl$items").len(), 5);
    }

    #[test]
    fn test_item_leaves() {
        let b = browser(sample());
        let jazz = value_id(&b, "Genre", "Jazz");
        let items = children(&b, &format!("{}$items", jazz));
        for item in items.iter().filter(|e| !e.is_container()) {
            assert!(children(&b, &item.id).is_empty());
            let docidx = parse_item(item.id.rsplit('$').next().unwrap()).unwrap();
            assert_eq!(b.item_entry(&item.id, docidx)[0].id, item.id);
        }

        assert!(children(&b, "0$uprcl$items$i0").is_empty());
        assert!(b.browse("0$uprcl$items$i999", 0, 0).is_err());
        assert!(b.browse("0$uprcl$bogus$i0", 0, 0).is_err());
        assert!(b.browse("0$uprcl$=Nope$1$i0", 0, 0).is_err());
        assert!(b.browse("0$uprcl$albums$99999$i0", 0, 0).is_err());

        // an item outside the listed selection
        let rock = value_id(&b, "Genre", "Rock");
        let rock_items = children(&b, &format!("{}$items", rock));
        let rock_item = rock_items.iter().find(|e| !e.is_container()).unwrap();
        let docidx = rock_item.id.rsplit('$').next().unwrap();
        assert!(b.browse(&format!("{}$items${}", jazz, docidx), 0, 0).is_err());
    }

    #[test]
    fn test_pagination() {
        let docs: Vec<Document> = (0..1200)
            .map(|i| track(&format!("/m/A{}/{:04}.flac", i % 7, i), "A", "Jazz", "X", "1"))
            .collect();
        let b = browser(docs);

        match b.browse("0$uprcl$items", 100, 50).unwrap() {
            Listing::Slice { offset, total, entries } => {
                assert_eq!(offset, 100);
                assert_eq!(total, 1200);
                assert_eq!(entries.len(), 50);
                assert_eq!(entries[0].id, "0$uprcl$items$i100");
            }
            other => panic!("expected a slice, got {} entries", other.entries().len()),
        }

        // second call served from the count cache, same answer
        assert_eq!(
            b.browse("0$uprcl$items", 100, 50).unwrap(),
            b.browse("0$uprcl$items", 100, 50).unwrap()
        );

        let small = browser(sample());
        match small.browse("0$uprcl$items", 2, 2).unwrap() {
            Listing::Full(entries) => assert_eq!(entries.len(), 5),
            _ => panic!("expected the full list"),
        }
    }

    #[test]
    fn test_folder_tag_view() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let b = browser_with_clock(sample(), clock.clone());
        let pid = "0$uprcl$folders$d3$tagview.0";

        let top = b.browse_folder(pid, "$tagview.0", "/m/C/").unwrap();
        assert_eq!(titles(&top), vec![">> Hide Contents", "C"]);

        let tags = b
            .browse_folder(&top[1].id, "$tagview.0$hctags", "/m/C/")
            .unwrap();
        assert_eq!(titles(&tags), vec!["1 albums", "2 items", "Genre"]);

        let items = b
            .browse_folder(&tags[1].id, "$tagview.0$hctags$items", "/m/C/")
            .unwrap();
        assert_eq!(items.len(), 2);

        let inside = format!("{}$i3", tags[1].id);
        assert!(b
            .browse_folder(&inside, "$tagview.0$hctags$items$i3", "/m/C/")
            .unwrap()
            .is_empty());
        let outside = format!("{}$i0", tags[1].id);
        assert!(b
            .browse_folder(&outside, "$tagview.0$hctags$items$i0", "/m/C/")
            .is_err());
        assert!(b.browse_folder(pid, "$tagview.0xyz", "/m/C/").is_err());

        assert!(b
            .browse_folder(&top[0].id, "$tagview.0$hchide", "/m/C/")
            .unwrap()
            .is_empty());
        assert!(b
            .browse_folder(&top[1].id, "$tagview.0$hctags", "/m/C/")
            .unwrap()
            .is_empty());

        clock.advance(HIDE_WINDOW_MS);
        assert_eq!(
            b.browse_folder(&top[1].id, "$tagview.0$hctags", "/m/C/")
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn test_album_entry() {
        let b = browser(sample());
        let albums = children(&b, "0$uprcl$albums");
        let id: i64 = albums[0].id.rsplit('$').next().unwrap().parse().unwrap();

        let entry = b.album_entry(id).unwrap().unwrap();
        assert_eq!(entry.id, albums[0].id);
        assert_eq!(entry.artist.as_deref(), Some("X"));
        assert!(b.album_entry(9999).unwrap().is_none());
    }
}
