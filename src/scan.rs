use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use regex::Regex;

use crate::art::ArtFinder;
use crate::config::Config;
use crate::document::{basename, dirname, parse_date, Document, MediaType, DIRECTORY_MTYPE};
use crate::error::BuildError;
use crate::index::{Album, Index, Track, VARIOUS_ARTISTS};

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanStat {
    pub documents: usize,
    pub tracks: usize,
    pub albums: usize,
    pub merged: usize,
    pub skipped: usize,
}

/// Album identity as derived from one document.
#[derive(Debug, PartialEq)]
struct AlbumKey {
    title: String,
    folder: String,
    disc: Option<i64>,
}

struct Scan<'a> {
    index: &'a Index,
    config: &'a Config,
    art: &'a ArtFinder,
    docs: &'a [Document],
    title_disc: Regex,
    folder_disc: Regex,
    /// Artist ids common to every track seen so far, per album.
    album_artists: HashMap<i64, BTreeSet<i64>>,
    stat: ScanStat,
}

/// Fills a fresh index from the document list: tracks, albums, tag values,
/// then album artists, album art and multi-disc merges.
pub fn build(index: &Index, docs: &[Document], config: &Config, art: &ArtFinder) -> Result<ScanStat> {
    let start_instant = Instant::now();

    let mut scan = Scan::new(index, config, art, docs)?;

    index.connection().execute_batch("BEGIN TRANSACTION;")?;

    let result = scan.ingest().and_then(|_| scan.finish());

    match result {
        Ok(()) => index.connection().execute_batch("COMMIT;")?,
        Err(e) => {
            index.connection().execute_batch("ROLLBACK;")?;
            return Err(e);
        }
    }

    scan.stat.albums = index.album_count()? as usize;

    info!(
        "done in {}ms: {:?}",
        start_instant.elapsed().as_millis(),
        scan.stat
    );

    Ok(scan.stat)
}

/// Splits a multi-valued tag.
pub fn split_values(value: &str) -> Vec<&str> {
    value
        .split('|')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect()
}

fn is_sequential(discs: &[i64]) -> bool {
    match discs.first() {
        Some(first) if *first > 0 => discs.windows(2).all(|w| w[1] == w[0] + 1),
        _ => false,
    }
}

impl<'a> Scan<'a> {
    fn new(
        index: &'a Index,
        config: &'a Config,
        art: &'a ArtFinder,
        docs: &'a [Document],
    ) -> Result<Scan<'a>> {
        let title_disc =
            Regex::new(r"(?i)^(.*?)(?:\s*\[disc\s*(\d+)\]|\s*\(disc\s*(\d+)\)|(?:,\s*|\s+)disc\s*(\d+))$")
                .map_err(|e| BuildError::Source(e.to_string()))?;
        let folder_disc =
            Regex::new(r"(?i)^(?:cd|disc)\s*(\d+)").map_err(|e| BuildError::Source(e.to_string()))?;

        Ok(Scan {
            index,
            config,
            art,
            docs,
            title_disc,
            folder_disc,
            album_artists: HashMap::new(),
            stat: ScanStat::default(),
        })
    }

    fn album_key(&self, doc: &Document, folder: &str) -> AlbumKey {
        let mut title = match doc.album() {
            Some(a) => a.trim().to_string(),
            None => basename(folder).to_string(),
        };

        let mut disc = doc
            .discnumber()
            .and_then(|d| d.split('/').next())
            .and_then(|d| d.trim().parse::<i64>().ok())
            .filter(|d| *d > 0);

        let mut stripped: Option<String> = None;

        if let Some(caps) = self.title_disc.captures(&title) {
            let title_disc = (2..=4)
                .filter_map(|i| caps.get(i))
                .next()
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .filter(|d| *d > 0);

            if let Some(n) = title_disc {
                if disc.is_none() {
                    disc = Some(n);
                }
                if disc == Some(n) {
                    stripped = caps.get(1).map(|m| m.as_str().trim_end().to_string());
                }
            }
        }

        if let Some(s) = stripped {
            if !s.is_empty() {
                title = s;
            }
        }

        if disc.is_none() {
            disc = self
                .folder_disc
                .captures(basename(folder))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .filter(|d| *d > 0);
        }

        AlbumKey {
            title,
            folder: folder.to_string(),
            disc,
        }
    }

    fn ingest(&mut self) -> Result<()> {
        let docs = self.docs;

        for (docidx, doc) in docs.iter().enumerate() {
            self.stat.documents += 1;

            if doc.media_type() != MediaType::Audio {
                continue;
            }

            self.index.connection().execute_batch("SAVEPOINT document;")?;

            match self.process_document(docidx as i64, doc) {
                Ok(Some((album_id, artists))) => {
                    self.index.connection().execute_batch("RELEASE document;")?;

                    self.album_artists
                        .entry(album_id)
                        .and_modify(|common| {
                            *common = common.intersection(&artists).cloned().collect()
                        })
                        .or_insert(artists);

                    self.stat.tracks += 1;
                }
                Ok(None) => {
                    self.index
                        .connection()
                        .execute_batch("ROLLBACK TO document; RELEASE document;")?;
                    self.stat.skipped += 1;
                }
                Err(e) => {
                    self.index
                        .connection()
                        .execute_batch("ROLLBACK TO document; RELEASE document;")?;
                    warn!("skipping document {} '{}': {}", docidx, doc.url, e);
                    self.stat.skipped += 1;
                }
            }
        }

        Ok(())
    }

    /// Inserts one audio document. Returns its raw album and the artist ids
    /// it contributes, or `None` when the document can't be indexed.
    fn process_document(&mut self, docidx: i64, doc: &Document) -> Result<Option<(i64, BTreeSet<i64>)>> {
        let path = match doc.path() {
            Some(p) => p,
            None => {
                warn!("document {} has no local path: '{}'", docidx, doc.url);
                return Ok(None);
            }
        };

        let folder = match doc.folder() {
            Some(f) => f,
            None => return Ok(None),
        };

        let track_artist_source = doc.albumartist().or_else(|| doc.artist());

        let mut artist_ids: Vec<i64> = Vec::new();
        if let Some(value) = track_artist_source {
            for v in split_values(value) {
                let id = self.index.tag_value_id("artist", v)?;
                if !artist_ids.contains(&id) {
                    artist_ids.push(id);
                }
            }
        }

        let album_id = self.album_for_document(doc, &folder)?;

        let title = match doc.title() {
            Some(t) => t.to_string(),
            None => basename(path).to_string(),
        };

        self.index.create_track(&Track {
            docidx,
            album_id,
            artist_id: artist_ids.first().cloned(),
            trackno: doc.track_number(),
            title,
            path: path.to_string(),
        })?;

        for id in &artist_ids {
            self.index.add_track_tag("artist", docidx, *id)?;
        }

        for (table, field) in self.config.populated_tables() {
            if table == "artist" {
                continue;
            }

            if field == "date" {
                let date = doc
                    .field("date")
                    .or_else(|| doc.field("dmtime"))
                    .and_then(parse_date);

                if let Some(date) = date {
                    let id = self.index.tag_value_id(table, &date)?;
                    self.index.add_track_tag(table, docidx, id)?;
                }
                continue;
            }

            if let Some(value) = doc.field(field) {
                for v in split_values(value) {
                    let id = self.index.tag_value_id(table, v)?;
                    self.index.add_track_tag(table, docidx, id)?;
                }
            }
        }

        Ok(Some((album_id, artist_ids.into_iter().collect())))
    }

    fn album_for_document(&mut self, doc: &Document, folder: &str) -> Result<i64> {
        let key = self.album_key(doc, folder);

        if let Some(album) = self.index.find_album(&key.title, &key.folder, key.disc)? {
            return Ok(album.album_id);
        }

        let artist_id = match doc.albumartist().and_then(|a| split_values(a).into_iter().next()) {
            Some(a) => Some(self.index.tag_value_id("artist", a)?),
            None => None,
        };

        let album = self.index.create_album(&Album {
            album_id: 0,
            artist_id,
            title: key.title,
            folder: key.folder,
            date: doc.field("date").and_then(parse_date),
            art_uri: None,
            albalb: None,
            albtdisc: key.disc,
            albdisc: None,
        })?;

        Ok(album.album_id)
    }

    fn finish(&mut self) -> Result<()> {
        self.set_album_artists()?;
        self.set_album_art()?;
        self.merge_albums()?;
        Ok(())
    }

    /// Albums without an explicit album artist get the lowest artist id
    /// shared by all their tracks, or "Various Artists".
    fn set_album_artists(&mut self) -> Result<()> {
        let mut various: Option<i64> = None;

        for album_id in self.index.albums_without_artist()? {
            let common = self
                .album_artists
                .get(&album_id)
                .and_then(|set| set.iter().next().cloned());

            let artist_id = match common {
                Some(id) => id,
                None => match various {
                    Some(id) => id,
                    None => {
                        let id = self.index.tag_value_id("artist", VARIOUS_ARTISTS)?;
                        various = Some(id);
                        id
                    }
                },
            };

            self.index.set_album_artist(album_id, artist_id)?;
        }

        Ok(())
    }

    /// First track in path order with any art gives the album its cover.
    fn set_album_art(&mut self) -> Result<()> {
        for album_id in self.index.album_ids()? {
            let album = match self.index.album(album_id)? {
                Some(a) => a,
                None => continue,
            };

            for track in self.index.album_tracks(album_id)? {
                let doc = match self.docs.get(track.docidx as usize) {
                    Some(d) => d,
                    None => continue,
                };

                let uri = match doc.field("albumarturi") {
                    Some(u) => Some(u.to_string()),
                    None => self.art.doc_art_uri(doc, true, Some(&album.title)),
                };

                if let Some(uri) = uri {
                    self.index.set_album_art(album_id, &uri)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Groups disc albums by title and artist within one folder or sibling
    /// folders. A sequential run of discs becomes one parent album.
    fn merge_albums(&mut self) -> Result<()> {
        let mut merged: HashSet<i64> = HashSet::new();

        for candidate in self.index.merge_candidates()? {
            if merged.contains(&candidate.album_id) {
                continue;
            }

            let candidate = match self.index.album(candidate.album_id)? {
                Some(a) if a.albalb.is_none() && a.albtdisc.is_some() => a,
                _ => continue,
            };

            let parent_folder = dirname(&candidate.folder).to_string();

            let group: Vec<Album> = self
                .index
                .disc_group(&candidate.title, candidate.artist_id)?
                .into_iter()
                .filter(|a| a.folder == candidate.folder || dirname(&a.folder) == parent_folder)
                .collect();

            let ids: Vec<i64> = group.iter().map(|a| a.album_id).collect();

            if group.len() > 1 {
                let mut discs: Vec<i64> = group.iter().filter_map(|a| a.albtdisc).collect();
                discs.sort();

                if !is_sequential(&discs) {
                    debug!(
                        "not merging '{}', disc numbers {:?} not sequential",
                        candidate.title,
                        discs
                    );
                    self.index.clear_album_disc(&ids)?;
                    continue;
                }

                let parent = self.index.create_parent_album(&group[0])?;
                self.index.set_album_parent(&ids, parent.album_id)?;

                debug!(
                    "merged '{}' discs {:?} into album {}",
                    candidate.title,
                    discs,
                    parent.album_id
                );

                merged.extend(ids);
                self.stat.merged += 1;
            } else {
                self.index.clear_album_disc(&[candidate.album_id])?;
            }
        }

        self.index.finalize_albums()?;

        Ok(())
    }
}

/// Synthetic directory records for the top-level albums, handed back to
/// the document source when album mirroring is enabled.
pub fn album_documents(index: &Index) -> Result<Vec<Document>> {
    let mut docs = Vec::new();

    for album in index.top_albums()? {
        let artist = match album.artist_id {
            Some(id) => index.tag_value("artist", id)?.map(|v| v.value),
            None => None,
        };

        let mut doc = Document {
            url: format!("file://{}", album.folder),
            mtype: DIRECTORY_MTYPE.to_string(),
            title: Some(album.title.clone()),
            album: Some(album.title.clone()),
            albumartist: artist,
            date: album.date.clone(),
            albumarturi: album.art_uri.clone(),
            ..Default::default()
        };
        doc.extra
            .insert("albid".to_string(), album.album_id.to_string());

        docs.push(doc);
    }

    Ok(docs)
}
