use std::error::Error as StdError;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

/// Every facet the index knows how to build: (facet name, table name,
/// document field). Table names double as SQL identifiers, so they must stay
/// plain lowercase words.
pub const ALL_TAGS: &[(&str, &str, &str)] = &[
    ("AlbumArtist", "albumartist", "albumartist"),
    ("All Artists", "allartists", "artist"),
    ("Artist", "artist", "artist"),
    ("Comment", "comment", "comment"),
    ("Composer", "composer", "composer"),
    ("Conductor", "conductor", "conductor"),
    ("Date", "date", "date"),
    ("Genre", "genre", "genre"),
    ("Group", "cgroup", "group"),
    ("Label", "label", "label"),
    ("Lyricist", "lyricist", "lyricist"),
    ("Orchestra", "orchestra", "orchestra"),
    ("Performer", "performer", "performer"),
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexTag {
    pub name: String,
    #[serde(default)]
    pub display: Option<String>,
}

impl IndexTag {
    fn new(name: &str) -> IndexTag {
        IndexTag {
            name: name.to_string(),
            display: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Object id prefix for everything this index emits, without trailing '$'.
    pub object_prefix: String,
    pub topdirs: Vec<String>,
    pub index_tags: Vec<IndexTag>,
    pub item_tags: Vec<String>,
    pub http_host_port: String,
    pub path_prefix: String,
    pub show_tag_view: bool,
    pub count_cache_size: usize,
    pub mirror_albums: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            object_prefix: "0$uprcl".to_string(),
            topdirs: Vec::new(),
            index_tags: vec![
                IndexTag::new("Artist"),
                IndexTag::new("Date"),
                IndexTag::new("Genre"),
                IndexTag::new("Composer"),
            ],
            item_tags: Vec::new(),
            http_host_port: "127.0.0.1:9790".to_string(),
            path_prefix: "/uprcl".to_string(),
            show_tag_view: true,
            count_cache_size: 20,
            mirror_albums: false,
        }
    }
}

/// A configured browse axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Facet {
    pub name: String,
    pub display: String,
    pub table: &'static str,
    pub field: &'static str,
}

fn lookup_tag(name: &str) -> Option<(&'static str, &'static str)> {
    ALL_TAGS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, table, field)| (*table, *field))
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        info!("using config '{}'", path.to_string_lossy());

        let file = File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;

        Ok(config)
    }

    pub fn topdirs(&self) -> Vec<String> {
        self.topdirs
            .iter()
            .map(|d| {
                let expanded = shellexpand::tilde(d).into_owned();
                let trimmed = expanded.trim_end_matches('/');
                if trimmed.is_empty() {
                    "/".to_string()
                } else {
                    trimmed.to_string()
                }
            })
            .collect()
    }

    /// Browse axes in configured order. A "none" entry disables all of them.
    pub fn facets(&self) -> Vec<Facet> {
        let mut facets = Vec::new();

        for tag in &self.index_tags {
            if tag.name.eq_ignore_ascii_case("none") {
                return Vec::new();
            }

            match lookup_tag(&tag.name) {
                Some((table, field)) => facets.push(Facet {
                    name: tag.name.clone(),
                    display: match &tag.display {
                        Some(d) if !d.is_empty() => d.clone(),
                        _ => tag.name.clone(),
                    },
                    table,
                    field,
                }),
                None => warn!("unknown index tag '{}', ignoring", tag.name),
            }
        }

        facets
    }

    /// (table, field) pairs populated at build time: browse axes plus item
    /// tags, each table once.
    pub fn populated_tables(&self) -> Vec<(&'static str, &'static str)> {
        let mut tables: Vec<(&'static str, &'static str)> = Vec::new();

        let names = self
            .facets()
            .into_iter()
            .map(|f| f.name)
            .chain(self.item_tags.iter().cloned());

        for name in names {
            match lookup_tag(&name) {
                Some(t) => {
                    if !tables.contains(&t) {
                        tables.push(t);
                    }
                }
                None => warn!("unknown item tag '{}', ignoring", name),
            }
        }

        tables
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> ConfigError {
        ConfigError::Json(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "can't read config: {}", e),
            ConfigError::Json(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl StdError for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_facets() {
        let config = Config::default();
        let names: Vec<String> = config.facets().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Artist", "Date", "Genre", "Composer"]);
    }

    #[test]
    fn test_facets_from_json() {
        let config: Config = serde_json::from_str(
            r#"{
                "index_tags": [{"name": "Genre", "display": "Style"}, {"name": "Bogus"}],
                "item_tags": ["Conductor", "Genre"]
            }"#,
        )
        .unwrap();

        let facets = config.facets();
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].display, "Style");
        assert_eq!(facets[0].table, "genre");
        assert_eq!(
            config.populated_tables(),
            vec![("genre", "genre"), ("conductor", "conductor")]
        );
        assert_eq!(config.object_prefix, "0$uprcl");
    }

    #[test]
    fn test_none_disables_facets() {
        let config = Config {
            index_tags: vec![IndexTag::new("Artist"), IndexTag::new("None")],
            ..Default::default()
        };
        assert!(config.facets().is_empty());
    }

    #[test]
    fn test_topdirs_trimmed() {
        let config = Config {
            topdirs: vec!["/music/".to_string(), "/".to_string()],
            ..Default::default()
        };
        assert_eq!(config.topdirs(), vec!["/music".to_string(), "/".to_string()]);
    }
}
