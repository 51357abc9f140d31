#[macro_use]
extern crate log;

pub mod art;
pub mod cache;
pub mod config;
pub mod document;
pub mod entry;
pub mod error;
pub mod folders;
pub mod http_util;
pub mod index;
pub mod logger;
pub mod m3u;
pub mod query;
pub mod scan;
mod schema;
pub mod tags;

use std::sync::{Arc, RwLock};
use std::time::Instant;

pub use crate::cache::{Clock, ManualClock, SystemClock};
pub use crate::config::Config;
pub use crate::document::{Document, DocumentSource, JsonDocumentSource, MemoryDocumentSource};
pub use crate::entry::{Entry, EntryKind, Listing};
pub use crate::error::{BrowseError, BuildError};
pub use crate::scan::ScanStat;

use crate::art::ArtFinder;
use crate::cache::count_cache;
use crate::entry::{direntry, DocumentFormatter, EntryFormatter};
use crate::folders::{is_tag_view, FolderIndex, FolderObjKind};
use crate::index::Index;
use crate::tags::{parse_item, TagBrowser};

pub const TAGINDEX_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BrowseFlag {
    Children,
    Meta,
}

/// Everything built from one document snapshot. Read-only once published.
pub struct Generation {
    docs: Arc<Vec<Document>>,
    folders: FolderIndex,
    tags: TagBrowser,
    formatter: Arc<dyn EntryFormatter>,
}

impl Generation {
    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn folders(&self) -> &FolderIndex {
        &self.folders
    }

    pub fn tags(&self) -> &TagBrowser {
        &self.tags
    }
}

pub struct MediaIndex {
    config: Config,
    clock: Arc<dyn Clock>,
    generation: RwLock<Option<Arc<Generation>>>,
}

impl MediaIndex {
    pub fn new(config: Config) -> MediaIndex {
        MediaIndex::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> MediaIndex {
        MediaIndex {
            config,
            clock,
            generation: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The generation currently serving requests.
    pub fn generation(&self) -> Result<Arc<Generation>, BrowseError> {
        let current = match self.generation.read() {
            Ok(g) => g.clone(),
            Err(e) => e.into_inner().clone(),
        };

        current.ok_or(BrowseError::NotReady)
    }

    /// Builds a new generation from the source and swaps it in. On error the
    /// previous generation keeps serving.
    pub fn rebuild(&self, source: &dyn DocumentSource) -> Result<ScanStat, BuildError> {
        let start_instant = Instant::now();

        let docs = Arc::new(source.documents()?);
        info!("building generation from {} documents", docs.len());

        let art = Arc::new(ArtFinder::new(&self.config));
        let formatter: Arc<dyn EntryFormatter> =
            Arc::new(DocumentFormatter::new(&self.config, art.clone()));

        let index = Index::create()?;

        let stat = scan::build(&index, &docs, &self.config, &art)?;

        if self.config.mirror_albums {
            let albums = scan::album_documents(&index)?;
            debug!("mirroring {} albums", albums.len());
            source.mirror_albums(&albums)?;
        }

        let folders = FolderIndex::build(
            &self.config.object_prefix,
            docs.clone(),
            &self.config.topdirs(),
            art,
        );

        let tags = TagBrowser::new(
            index,
            &self.config.object_prefix,
            self.config.facets(),
            docs.clone(),
            formatter.clone(),
            count_cache(self.config.count_cache_size),
            self.clock.clone(),
        );

        let generation = Arc::new(Generation {
            docs,
            folders,
            tags,
            formatter,
        });

        match self.generation.write() {
            Ok(mut g) => *g = Some(generation),
            Err(e) => *e.into_inner() = Some(generation),
        }

        info!(
            "generation ready in {}ms",
            start_instant.elapsed().as_millis()
        );

        Ok(stat)
    }

    /// Resolves an object id. `offset` and `count` only matter for the
    /// top-level item list; a count of 0 means everything.
    pub fn browse(
        &self,
        objid: &str,
        flag: BrowseFlag,
        offset: usize,
        count: usize,
    ) -> Result<Listing, BrowseError> {
        let generation = self.generation()?;

        debug!("browse {} {:?} offset={} count={}", objid, flag, offset, count);

        match flag {
            BrowseFlag::Meta => self.browse_meta(&generation, objid).map(Listing::Full),
            BrowseFlag::Children => self.browse_children(&generation, objid, offset, count),
        }
    }

    /// Album container for an album id, e.g. one mirrored to the source.
    pub fn album_entry(&self, album_id: i64) -> Result<Option<Entry>, BrowseError> {
        self.generation()?.tags.album_entry(album_id)
    }

    fn root_entries(&self, generation: &Generation) -> Result<Vec<Entry>, BrowseError> {
        let prefix = &self.config.object_prefix;

        let mut entries = vec![direntry(generation.folders.id_prefix(), prefix, "[folders]")];
        entries.extend(generation.tags.root_entries(prefix, None)?);

        Ok(entries)
    }

    fn browse_children(
        &self,
        generation: &Generation,
        objid: &str,
        offset: usize,
        count: usize,
    ) -> Result<Listing, BrowseError> {
        let prefix = &self.config.object_prefix;
        let folders = &generation.folders;

        if objid == prefix {
            return self.root_entries(generation).map(Listing::Full);
        }

        if objid.starts_with(folders.id_prefix()) {
            let id = folders.parse_objid(objid)?;

            return match (id.kind, id.remain) {
                (FolderObjKind::Item, _) => Ok(Listing::Full(Vec::new())),
                (FolderObjKind::Dir, None) => Ok(Listing::Full(folders.folder_entries(
                    objid,
                    id.idx,
                    generation.formatter.as_ref(),
                    self.config.show_tag_view,
                ))),
                (FolderObjKind::Dir, Some(remain)) if is_tag_view(&remain) => {
                    let folder = folders.dirpath(id.idx);
                    generation
                        .tags
                        .browse_folder(objid, &remain, &folder)
                        .map(Listing::Full)
                }
                _ => Err(BrowseError::malformed(format!("bad folder id {}", objid))),
            };
        }

        generation.tags.browse(objid, offset, count)
    }

    fn browse_meta(&self, generation: &Generation, objid: &str) -> Result<Vec<Entry>, BrowseError> {
        let last = objid.rsplit('$').next().unwrap_or(objid);

        let docidx = parse_item(last)
            .ok_or_else(|| BrowseError::malformed(format!("metadata is only served for items: {}", objid)))?;

        let folders = &generation.folders;

        if objid.starts_with(folders.id_prefix()) {
            let id = folders.parse_objid(objid)?;
            if id.kind == FolderObjKind::Item {
                return Ok(folders.item_entry(
                    folders.id_prefix(),
                    docidx,
                    generation.formatter.as_ref(),
                ));
            }
        }

        if docidx >= generation.docs.len() {
            return Err(BrowseError::malformed(format!("no such item: {}", objid)));
        }

        Ok(generation.tags.item_entry(objid, docidx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn track(url: &str, album: &str, disc: Option<&str>) -> Document {
        Document {
            url: url.to_string(),
            mtype: "audio/flac".to_string(),
            album: Some(album.to_string()),
            discnumber: disc.map(|d| d.to_string()),
            artist: Some("Someone".to_string()),
            genre: Some(if url.contains("Other") { "Rock" } else { "Jazz" }.to_string()),
            ..Default::default()
        }
    }

    fn scenario_a() -> Vec<Document> {
        vec![
            Document {
                url: "file:///music/Foo".to_string(),
                mtype: document::DIRECTORY_MTYPE.to_string(),
                ..Default::default()
            },
            track("file:///music/Foo/01.flac", "Bar", Some("1")),
            track("file:///music/Foo/02.flac", "Bar", Some("2")),
            track("file:///music/Other/01.flac", "Bar", None),
        ]
    }

    fn built(docs: Vec<Document>) -> MediaIndex {
        let index = MediaIndex::with_clock(Config::default(), Arc::new(ManualClock::new(0)));
        index.rebuild(&MemoryDocumentSource::new(docs)).unwrap();
        index
    }

    fn children(index: &MediaIndex, id: &str) -> Vec<Entry> {
        index
            .browse(id, BrowseFlag::Children, 0, 0)
            .unwrap()
            .into_entries()
    }

    #[test]
    fn test_not_ready() {
        let index = MediaIndex::new(Config::default());
        match index.browse("0$uprcl", BrowseFlag::Children, 0, 0) {
            Err(BrowseError::NotReady) => {}
            other => panic!("expected NotReady, got {:?}", other),
        }
    }

    #[test]
    fn test_scenario_a() {
        let index = built(scenario_a());

        let root = children(&index, "0$uprcl");
        let titles: Vec<&str> = root.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["[folders]", "2 albums", "3 items", "Genre"]);

        let albums = children(&index, "0$uprcl$albums");
        assert_eq!(albums.len(), 2);
        assert!(albums.iter().all(|a| a.title == "Bar"));

        let mut sizes: Vec<usize> = albums
            .iter()
            .map(|a| children(&index, &a.id).len())
            .collect();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_non_sequential_discs_stay_apart() {
        let index = built(vec![
            track("file:///music/Foo/01.flac", "Bar", Some("1")),
            track("file:///music/Foo/02.flac", "Bar", Some("3")),
        ]);

        let albums = children(&index, "0$uprcl$albums");
        assert_eq!(albums.len(), 2);
        for album in &albums {
            assert_eq!(children(&index, &album.id).len(), 1);
        }
    }

    #[test]
    fn test_stat_finds_every_document() {
        let docs = scenario_a();
        let index = built(docs.clone());
        let generation = index.generation().unwrap();

        for (docidx, doc) in docs.iter().enumerate() {
            let (_, found) = generation.folders().stat(doc.path().unwrap());
            assert_eq!(found, Some(docidx), "{}", doc.url);
        }
        assert_eq!(generation.folders().stat("/music/Nope/01.flac"), (None, None));
    }

    fn walk(index: &MediaIndex, id: &str, depth: usize, seen: &mut HashSet<String>, items: &mut Vec<String>) {
        if depth > 12 || !seen.insert(id.to_string()) {
            return;
        }

        for entry in children(index, id) {
            assert_eq!(entry.pid, id);
            if entry.id.ends_with("$hchide") {
                continue;
            }
            if entry.is_container() {
                walk(index, &entry.id, depth + 1, seen, items);
            } else {
                assert!(children(index, &entry.id).is_empty());
                items.push(entry.id);
            }
        }
    }

    #[test]
    fn test_round_trip_and_idempotence() {
        let index = built(scenario_a());

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        walk(&index, "0$uprcl", 0, &mut seen, &mut items);

        assert!(seen.iter().any(|id| id.contains("$tagview.0$hctags")));
        assert!(items.iter().any(|id| id.starts_with("0$uprcl$folders$i")));
        assert!(items.iter().any(|id| id.starts_with("0$uprcl$=Genre")));

        for id in &items {
            let meta = index.browse(id, BrowseFlag::Meta, 0, 0).unwrap().into_entries();
            assert_eq!(meta.len(), 1, "{}", id);
            assert_eq!(&meta[0].id, id);
        }

        for id in seen.iter().filter(|id| !id.contains("$hchide") && !id.ends_with("$hctags")) {
            assert_eq!(
                index.browse(id, BrowseFlag::Children, 0, 0).unwrap(),
                index.browse(id, BrowseFlag::Children, 0, 0).unwrap(),
                "{}",
                id
            );
        }
    }

    #[test]
    fn test_malformed_ids() {
        let index = built(scenario_a());

        for id in &[
            "0$uprcl$folders$d999",
            "0$uprcl$folders$x1",
            "0$uprcl$folders$d1$tagview.0xyz",
            "0$uprcl$folders$d1$tagview.0$hctags$items$i999",
            "0$uprcl$=Genre$x",
            "0$uprcl$=Genre$x$i0",
            "9$elsewhere",
        ] {
            match index.browse(id, BrowseFlag::Children, 0, 0) {
                Err(BrowseError::Malformed(_)) => {}
                other => panic!("{} gave {:?}", id, other),
            }
        }

        assert!(index.browse("0$uprcl$albums", BrowseFlag::Meta, 0, 0).is_err());
    }

    #[test]
    fn test_generation_swap() {
        let index = built(scenario_a());
        let old = index.generation().unwrap();

        index
            .rebuild(&MemoryDocumentSource::new(vec![track(
                "file:///music/New/01.flac",
                "Fresh",
                None,
            )]))
            .unwrap();

        assert_eq!(old.docs().len(), 4);
        assert_eq!(old.tags().root_entries("0$uprcl", None).unwrap()[1].title, "3 items");

        let albums = children(&index, "0$uprcl$albums");
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].title, "Fresh");
    }

    #[test]
    fn test_failed_rebuild_keeps_serving() {
        struct Broken;
        impl DocumentSource for Broken {
            fn documents(&self) -> Result<Vec<Document>, BuildError> {
                Err(BuildError::Source("gone".to_string()))
            }
        }

        let index = built(scenario_a());
        assert!(index.rebuild(&Broken).is_err());
        assert_eq!(children(&index, "0$uprcl$albums").len(), 2);
    }

    #[test]
    fn test_mirror_albums() {
        let config = Config {
            mirror_albums: true,
            ..Default::default()
        };
        let index = MediaIndex::new(config);
        let source = MemoryDocumentSource::new(scenario_a());
        index.rebuild(&source).unwrap();

        let mirrored = source.mirrored();
        assert_eq!(mirrored.len(), 2);

        for album in &mirrored {
            let albid: i64 = album.field("albid").unwrap().parse().unwrap();
            let entry = index.album_entry(albid).unwrap().unwrap();
            assert_eq!(entry.title, "Bar");
            assert_eq!(entry.artist.as_deref(), Some("Someone"));
        }
    }
}
