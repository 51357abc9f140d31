use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, Row};

use crate::config::ALL_TAGS;
use crate::schema;

pub const VARIOUS_ARTISTS: &str = "Various Artists";

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub album_id: i64,
    pub artist_id: Option<i64>,
    pub title: String,
    pub folder: String,
    pub date: Option<String>,
    pub art_uri: Option<String>,
    pub albalb: Option<i64>,
    pub albtdisc: Option<i64>,
    pub albdisc: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub docidx: i64,
    pub album_id: i64,
    pub artist_id: Option<i64>,
    pub trackno: i64,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    pub id: i64,
    pub value: String,
}

/// The relational model of one index generation, held in an in-memory
/// SQLite database.
pub struct Index {
    conn: Connection,
}

const ALBUM_COLUMNS: &str =
    "albums.album_id, albums.artist_id, albums.albtitle, albums.albfolder, albums.albdate,
    albums.albarturi, albums.albalb, albums.albtdisc, albums.albdisc";

fn check_table(table: &str) -> Result<()> {
    if ALL_TAGS.iter().any(|(_, t, _)| *t == table) {
        Ok(())
    } else {
        Err(rusqlite::Error::InvalidParameterName(table.to_string()))
    }
}

impl Index {
    /// Opens a fresh in-memory database with the album/track tables and one
    /// value table per known tag.
    pub fn create() -> Result<Index> {
        let conn = Connection::open_in_memory()?;

        let mut schema_text = schema::INDEX_SCHEMA.to_string();
        for (_, table, _) in ALL_TAGS {
            schema_text += &schema::tag_table_schema(table);
        }

        trace!("creating schema for {} tags", ALL_TAGS.len());
        conn.execute_batch(&schema_text)?;

        Ok(Index { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn _get_tag_value(row: &Row) -> Result<TagValue> {
        Ok(TagValue {
            id: row.get(0)?,
            value: row.get(1)?,
        })
    }

    pub fn tag_value(&self, table: &str, id: i64) -> Result<Option<TagValue>> {
        check_table(table)?;

        self.conn
            .query_row(
                &format!("SELECT {0}_id, value FROM {0} WHERE {0}_id = ?", table),
                [id],
                |row| Self::_get_tag_value(row),
            )
            .optional()
    }

    pub fn tag_value_by_name(&self, table: &str, value: &str) -> Result<Option<TagValue>> {
        check_table(table)?;

        self.conn
            .query_row(
                &format!("SELECT {0}_id, value FROM {0} WHERE value = ?", table),
                [value],
                |row| Self::_get_tag_value(row),
            )
            .optional()
    }

    pub fn create_tag_value(&self, table: &str, value: &str) -> Result<TagValue> {
        check_table(table)?;

        self.conn
            .execute(&format!("INSERT INTO {} (value) VALUES (?)", table), [value])?;

        let result = TagValue {
            id: self.conn.last_insert_rowid(),
            value: value.to_string(),
        };

        trace!("create {} {:?}", table, result);

        Ok(result)
    }

    /// Lookup-or-create, keeping values unique per table.
    pub fn tag_value_id(&self, table: &str, value: &str) -> Result<i64> {
        Ok(match self.tag_value_by_name(table, value)? {
            Some(v) => v,
            None => self.create_tag_value(table, value)?,
        }
        .id)
    }

    pub fn add_track_tag(&self, table: &str, docidx: i64, value_id: i64) -> Result<()> {
        check_table(table)?;

        self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {0}_tracks (docidx, {0}_id) VALUES (?, ?)",
                table
            ),
            params![docidx, value_id],
        )?;

        Ok(())
    }

    pub fn track_tag_values(&self, table: &str, docidx: i64) -> Result<Vec<TagValue>> {
        check_table(table)?;

        let mut st = self.conn.prepare(&format!(
            "SELECT {0}.{0}_id, {0}.value
            FROM {0}_tracks
            INNER JOIN {0} ON {0}.{0}_id = {0}_tracks.{0}_id
            WHERE {0}_tracks.docidx = ?
            ORDER BY {0}.{0}_id",
            table
        ))?;

        let rows = st.query_map([docidx], |row| Self::_get_tag_value(row))?;
        rows.collect()
    }

    fn _get_album(row: &Row) -> Result<Album> {
        Ok(Album {
            album_id: row.get(0)?,
            artist_id: row.get(1)?,
            title: row.get(2)?,
            folder: row.get(3)?,
            date: row.get(4)?,
            art_uri: row.get(5)?,
            albalb: row.get(6)?,
            albtdisc: row.get(7)?,
            albdisc: row.get(8)?,
        })
    }

    fn albums_where(&self, clause: &str, values: &[rusqlite::types::Value]) -> Result<Vec<Album>> {
        let mut st = self.conn.prepare(&format!(
            "SELECT {} FROM albums {} ",
            ALBUM_COLUMNS, clause
        ))?;

        let rows = st.query_map(params_from_iter(values.iter()), |row| Self::_get_album(row))?;
        rows.collect()
    }

    pub fn album(&self, album_id: i64) -> Result<Option<Album>> {
        trace!("get album album_id={}", album_id);

        self.conn
            .query_row(
                &format!("SELECT {} FROM albums WHERE album_id = ?", ALBUM_COLUMNS),
                [album_id],
                |row| Self::_get_album(row),
            )
            .optional()
    }

    /// Album (or disc) previously created for the same title and folder. The
    /// disc number only narrows the lookup when it is known.
    pub fn find_album(&self, title: &str, folder: &str, disc: Option<i64>) -> Result<Option<Album>> {
        trace!(
            "find album title='{}' folder='{}' disc={:?}",
            title,
            folder,
            disc
        );

        let mut st = self.conn.prepare(match disc {
            Some(_) => {
                "SELECT album_id FROM albums
                WHERE albtitle = ? AND albfolder = ? AND albtdisc = ?
                ORDER BY album_id LIMIT 1"
            }
            None => {
                "SELECT album_id FROM albums
                WHERE albtitle = ? AND albfolder = ?
                ORDER BY album_id LIMIT 1"
            }
        })?;

        let album_id: Option<i64> = match disc {
            Some(d) => st
                .query_row(params![title, folder, d], |row| row.get(0))
                .optional()?,
            None => st
                .query_row(params![title, folder], |row| row.get(0))
                .optional()?,
        };

        match album_id {
            Some(id) => self.album(id),
            None => Ok(None),
        }
    }

    pub fn create_album(&self, album: &Album) -> Result<Album> {
        self.conn.execute(
            "INSERT INTO albums (artist_id, albtitle, albfolder, albdate, albarturi, albalb, albtdisc, albdisc)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                album.artist_id,
                album.title,
                album.folder,
                album.date,
                album.art_uri,
                album.albalb,
                album.albtdisc,
                album.albdisc,
            ],
        )?;

        let result = self
            .album(self.conn.last_insert_rowid())?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?;

        debug!("create {:?}", result);

        Ok(result)
    }

    pub fn set_album_artist(&self, album_id: i64, artist_id: i64) -> Result<()> {
        trace!("set album album_id={} artist_id={}", album_id, artist_id);

        self.conn.execute(
            "UPDATE albums SET artist_id = ? WHERE album_id = ?",
            params![artist_id, album_id],
        )?;
        Ok(())
    }

    pub fn set_album_art(&self, album_id: i64, art_uri: &str) -> Result<()> {
        trace!("set album album_id={} art_uri={}", album_id, art_uri);

        self.conn.execute(
            "UPDATE albums SET albarturi = ? WHERE album_id = ?",
            params![art_uri, album_id],
        )?;
        Ok(())
    }

    pub fn albums_without_artist(&self) -> Result<Vec<i64>> {
        let mut st = self
            .conn
            .prepare("SELECT album_id FROM albums WHERE artist_id IS NULL ORDER BY album_id")?;

        let rows = st.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    pub fn album_ids(&self) -> Result<Vec<i64>> {
        let mut st = self
            .conn
            .prepare("SELECT album_id FROM albums ORDER BY album_id")?;

        let rows = st.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    /// Discs waiting for a merge decision.
    pub fn merge_candidates(&self) -> Result<Vec<Album>> {
        self.albums_where(
            "WHERE albalb IS NULL AND albtdisc IS NOT NULL ORDER BY album_id",
            &[],
        )
    }

    /// Undecided discs sharing a title and album artist, lowest disc first.
    pub fn disc_group(&self, title: &str, artist_id: Option<i64>) -> Result<Vec<Album>> {
        match artist_id {
            Some(id) => self.albums_where(
                "WHERE albtitle = ? AND artist_id = ? AND albalb IS NULL AND albtdisc IS NOT NULL
                ORDER BY albtdisc, album_id",
                &[title.to_string().into(), id.into()],
            ),
            None => self.albums_where(
                "WHERE albtitle = ? AND artist_id IS NULL AND albalb IS NULL AND albtdisc IS NOT NULL
                ORDER BY albtdisc, album_id",
                &[title.to_string().into()],
            ),
        }
    }

    pub fn clear_album_disc(&self, album_ids: &[i64]) -> Result<()> {
        trace!("clear disc album_ids={:?}", album_ids);

        let mut st = self
            .conn
            .prepare("UPDATE albums SET albtdisc = NULL WHERE album_id = ?")?;

        for id in album_ids {
            st.execute([id])?;
        }

        Ok(())
    }

    /// Synthetic parent for a multi-disc album: a copy of one member without
    /// its identity and disc number.
    pub fn create_parent_album(&self, member: &Album) -> Result<Album> {
        let parent = self.create_album(&Album {
            album_id: 0,
            albalb: None,
            albtdisc: None,
            albdisc: None,
            ..member.clone()
        })?;

        self.conn.execute(
            "UPDATE albums SET albalb = album_id WHERE album_id = ?",
            [parent.album_id],
        )?;

        Ok(parent)
    }

    /// Points the members at their parent, moving the pending disc number to
    /// the resolved one.
    pub fn set_album_parent(&self, album_ids: &[i64], parent_id: i64) -> Result<()> {
        trace!("set parent album_ids={:?} parent_id={}", album_ids, parent_id);

        let mut st = self.conn.prepare(
            "UPDATE albums SET albalb = ?, albdisc = albtdisc, albtdisc = NULL
            WHERE album_id = ?",
        )?;

        for id in album_ids {
            st.execute(params![parent_id, id])?;
        }

        Ok(())
    }

    /// Everything not merged becomes its own top-level album.
    pub fn finalize_albums(&self) -> Result<usize> {
        self.conn
            .execute("UPDATE albums SET albtdisc = NULL WHERE albtdisc IS NOT NULL", [])?;

        self.conn
            .execute("UPDATE albums SET albalb = album_id WHERE albalb IS NULL", [])
    }

    /// Albums shown in album lists: merged parents and standalone albums.
    pub fn top_albums(&self) -> Result<Vec<Album>> {
        self.albums_where("WHERE albalb = album_id ORDER BY albtitle, album_id", &[])
    }

    /// Raw album ids behind a possibly merged album, in disc order.
    pub fn album_members(&self, album_id: i64) -> Result<Vec<i64>> {
        let mut st = self.conn.prepare(
            "SELECT album_id FROM albums
            WHERE albalb = ? AND album_id != ?
            ORDER BY albdisc, album_id",
        )?;

        let rows: Vec<i64> = st
            .query_map([album_id, album_id], |row| row.get(0))?
            .collect::<Result<_>>()?;

        if rows.is_empty() {
            Ok(vec![album_id])
        } else {
            Ok(rows)
        }
    }

    /// Maps raw album ids to the id shown in album lists, deduplicated.
    pub fn display_album_ids(&self, raw_ids: &[i64]) -> Result<Vec<i64>> {
        let mut st = self
            .conn
            .prepare("SELECT album_id, albalb FROM albums WHERE album_id = ?")?;

        let mut result: Vec<i64> = Vec::new();

        for raw_id in raw_ids {
            let row: Option<(i64, Option<i64>)> = st
                .query_row([raw_id], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;

            if let Some((id, albalb)) = row {
                let id = albalb.unwrap_or(id);
                if !result.contains(&id) {
                    result.push(id);
                }
            }
        }

        Ok(result)
    }

    fn _get_track(row: &Row) -> Result<Track> {
        Ok(Track {
            docidx: row.get(0)?,
            album_id: row.get(1)?,
            artist_id: row.get(2)?,
            trackno: row.get(3)?,
            title: row.get(4)?,
            path: row.get(5)?,
        })
    }

    pub fn track(&self, docidx: i64) -> Result<Option<Track>> {
        trace!("get track docidx={}", docidx);

        self.conn
            .query_row(
                "SELECT docidx, album_id, artist_id, trackno, title, path
                FROM tracks
                WHERE docidx = ?",
                [docidx],
                |row| Self::_get_track(row),
            )
            .optional()
    }

    pub fn create_track(&self, track: &Track) -> Result<Track> {
        self.conn.execute(
            "INSERT INTO tracks (docidx, album_id, artist_id, trackno, title, path)
            VALUES (?, ?, ?, ?, ?, ?)",
            params![
                track.docidx,
                track.album_id,
                track.artist_id,
                track.trackno,
                track.title,
                track.path,
            ],
        )?;

        trace!("create {:?}", track);

        Ok(track.clone())
    }

    /// Tracks of one raw album in path order.
    pub fn album_tracks(&self, album_id: i64) -> Result<Vec<Track>> {
        let mut st = self.conn.prepare(
            "SELECT docidx, album_id, artist_id, trackno, title, path
            FROM tracks
            WHERE album_id = ?
            ORDER BY path, docidx",
        )?;

        let rows = st.query_map([album_id], |row| Self::_get_track(row))?;
        rows.collect()
    }

    pub fn track_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))
    }

    pub fn album_count(&self) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM albums WHERE albalb = album_id",
            [],
            |row| row.get(0),
        )
    }
}
