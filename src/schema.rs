// albalb: merge parent. NULL while building, then the parent id for disc
// members and album_id itself for everything displayed as an album.
// albtdisc: disc number pending merge, NULL once merging is done.
// albdisc: disc number kept on merged members for ordering.
pub const INDEX_SCHEMA: &str = "
CREATE TABLE albums (
    album_id INTEGER PRIMARY KEY,
    artist_id INTEGER,
    albtitle TEXT NOT NULL,
    albfolder TEXT NOT NULL,
    albdate TEXT,
    albarturi TEXT,
    albalb INTEGER,
    albtdisc INTEGER,
    albdisc INTEGER);

CREATE INDEX albums_key ON albums (albtitle, albfolder);
CREATE INDEX albums_albalb ON albums (albalb);

CREATE TABLE tracks (
    docidx INTEGER PRIMARY KEY,
    album_id INTEGER NOT NULL,
    artist_id INTEGER,
    trackno INTEGER NOT NULL,
    title TEXT NOT NULL,
    path TEXT NOT NULL,
    FOREIGN KEY(album_id) REFERENCES albums(album_id));

CREATE INDEX tracks_album_id ON tracks (album_id);
CREATE INDEX tracks_path ON tracks (path);
";

/// Value table plus track junction for one tag.
pub fn tag_table_schema(table: &str) -> String {
    format!(
        "
CREATE TABLE {table} (
    {table}_id INTEGER PRIMARY KEY,
    value TEXT NOT NULL UNIQUE);

CREATE TABLE {table}_tracks (
    docidx INTEGER NOT NULL,
    {table}_id INTEGER NOT NULL,
    PRIMARY KEY(docidx, {table}_id),
    FOREIGN KEY(docidx) REFERENCES tracks(docidx),
    FOREIGN KEY({table}_id) REFERENCES {table}({table}_id));

CREATE INDEX {table}_tracks_value ON {table}_tracks ({table}_id);
",
        table = table
    )
}
