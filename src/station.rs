//! Station records and the station directory.
//!
//! A [`Station`] names one playable radio source with one or more candidate
//! stream URLs. Stations are immutable once constructed; the playback engine
//! shares them behind an [`Arc`].
//!
//! The [`Directory`] holds the list of stations that user interfaces offer.
//! It loads from a local JSON or TOML file, or from a remote JSON directory
//! that uses radio-browser style records.

use std::{collections::HashSet, fmt, fs, path::Path, sync::Arc};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{Error, Result},
    http,
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Station {
    #[serde(alias = "stationuuid")]
    pub id: String,

    pub name: String,

    /// Primary stream URL.
    #[serde(default)]
    pub url: String,

    /// Server-confirmed redirect target of `url`, preferred when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_resolved: Option<String>,

    #[serde(
        default,
        rename = "alternateStreams",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub alternate_streams: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(
        default,
        deserialize_with = "list_or_comma_separated",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<String>,
}

impl Station {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_resolved(mut self, url: impl Into<String>) -> Self {
        self.url_resolved = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_alternates<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_streams = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Stream URLs in order of preference: resolved, primary, alternates.
    /// Blank entries are skipped; duplicates are not removed here.
    pub fn stream_urls(&self) -> impl Iterator<Item = &str> {
        self.url_resolved
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.url.as_str()))
            .chain(self.alternate_streams.iter().map(String::as_str))
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Whether at least one non-empty candidate URL exists.
    #[must_use]
    pub fn has_candidates(&self) -> bool {
        self.stream_urls().next().is_some()
    }

    /// Case-insensitive match against name, tags, genre, country and language.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        let contains = |field: &str| field.to_lowercase().contains(&query);
        contains(self.name.as_str())
            || self.tags.iter().any(|tag| contains(tag.as_str()))
            || [&self.genre, &self.country, &self.language]
                .into_iter()
                .flatten()
                .any(|field| contains(field.as_str()))
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Accepts `["a", "b"]` as well as radio-browser's `"a,b"`.
fn list_or_comma_separated<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        Text(String),
    }

    let tags = match Option::<Tags>::deserialize(deserializer)? {
        Some(Tags::List(list)) => list,
        Some(Tags::Text(text)) => text.split(',').map(ToOwned::to_owned).collect(),
        None => Vec::new(),
    };

    Ok(tags
        .into_iter()
        .map(|tag| tag.trim().to_owned())
        .filter(|tag| !tag.is_empty())
        .collect())
}

/// The stations on offer.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    stations: Vec<Arc<Station>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    List(Vec<Station>),
    Wrapped { stations: Vec<Station> },
}

#[derive(Deserialize)]
struct TomlDocument {
    #[serde(default, rename = "station")]
    stations: Vec<Station>,
}

impl Directory {
    /// Builds a directory, skipping stations without a usable stream URL and
    /// stations whose id was already seen.
    #[must_use]
    pub fn new(stations: impl IntoIterator<Item = Station>) -> Self {
        let mut seen = HashSet::new();
        let stations = stations
            .into_iter()
            .filter(|station| {
                if station.id.trim().is_empty() {
                    warn!("skipping station \"{station}\" without an id");
                    return false;
                }
                if !station.has_candidates() {
                    warn!("skipping station \"{station}\" without stream urls");
                    return false;
                }
                if !seen.insert(station.id.clone()) {
                    warn!("skipping duplicate station id {}", station.id);
                    return false;
                }
                true
            })
            .map(Arc::new)
            .collect();

        Self { stations }
    }

    /// Loads stations from a `.json` or `.toml` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unsupported
    /// extension, or does not parse.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let directory = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents)?,
            Some("toml") => Self::from_toml(&contents)?,
            _ => {
                return Err(Error::unimplemented(format!(
                    "unsupported station file {}",
                    path.display()
                )))
            }
        };

        info!(
            "loaded {} stations from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    /// Parses a JSON array of stations or an object with a `stations` array.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe stations.
    pub fn from_json(contents: &str) -> Result<Self> {
        let document: JsonDocument = serde_json::from_str(contents)?;
        let stations = match document {
            JsonDocument::List(stations) | JsonDocument::Wrapped { stations } => stations,
        };
        Ok(Self::new(stations))
    }

    /// Parses `[[station]]` tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML does not describe stations.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let document: TomlDocument = toml::from_str(contents)?;
        Ok(Self::new(document.stations))
    }

    /// Fetches a JSON station directory over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error on network failures, non-success status codes or
    /// unparsable responses.
    pub async fn fetch(client: &http::Client, url: url::Url) -> Result<Self> {
        debug!("fetching station directory from {url}");
        let response = client
            .execute(client.get(url))
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Self::from_json(&body)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Station>> {
        self.stations
            .iter()
            .find(|station| station.id == id)
            .cloned()
    }

    /// Looks up a station by id, then by exact name, then by the first
    /// station whose name contains `needle`.
    #[must_use]
    pub fn find(&self, needle: &str) -> Option<Arc<Station>> {
        let needle = needle.trim();
        if let Some(station) = self.get(needle) {
            return Some(station);
        }

        let lower = needle.to_lowercase();
        self.stations
            .iter()
            .find(|station| station.name.to_lowercase() == lower)
            .or_else(|| {
                self.stations
                    .iter()
                    .find(|station| station.name.to_lowercase().contains(&lower))
            })
            .cloned()
    }

    pub fn search<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a Arc<Station>> + 'a {
        self.stations
            .iter()
            .filter(move |station| station.matches(query))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_radio_browser_records() {
        let json = r#"[
            {
                "stationuuid": "9617a958-0601-11e8-ae97-52543be04c81",
                "name": "Radio Maria",
                "url": "http://dreamsiteradiocp.com:8014/stream",
                "url_resolved": "https://dreamsiteradiocp.com/proxy/maria?mp=/stream",
                "favicon": "https://radiomaria.org/favicon.ico",
                "tags": "catholic, religious,talk",
                "country": "Italy",
                "language": "italian"
            }
        ]"#;

        let directory = Directory::from_json(json).unwrap();
        let station = directory
            .get("9617a958-0601-11e8-ae97-52543be04c81")
            .unwrap();
        assert_eq!(station.name, "Radio Maria");
        assert_eq!(station.tags, vec!["catholic", "religious", "talk"]);
        assert_eq!(
            station.stream_urls().collect::<Vec<_>>(),
            vec![
                "https://dreamsiteradiocp.com/proxy/maria?mp=/stream",
                "http://dreamsiteradiocp.com:8014/stream",
            ]
        );
    }

    #[test]
    fn parses_wrapped_json_with_alternates() {
        let json = r#"{ "stations": [
            { "id": "chant", "name": "Gregorian Chant", "url": "https://a.example/chant",
              "alternateStreams": ["https://b.example/chant", ""], "tags": ["chant"] }
        ] }"#;

        let directory = Directory::from_json(json).unwrap();
        let station = directory.get("chant").unwrap();
        assert_eq!(station.alternate_streams.len(), 2);
        assert_eq!(station.stream_urls().count(), 2);
    }

    #[test]
    fn parses_toml() {
        let toml = r#"
            [[station]]
            id = "sufi"
            name = "Sufi Radio"
            url = "https://sufi.example/live"
            genre = "devotional"

            [[station]]
            id = "empty"
            name = "Nothing Here"
        "#;

        let directory = Directory::from_toml(toml).unwrap();
        assert_eq!(directory.len(), 1);
        assert!(directory.get("sufi").is_some());
        assert!(directory.get("empty").is_none());
    }

    #[test]
    fn skips_duplicates_and_blank_ids() {
        let directory = Directory::new([
            Station::new("a", "First", "https://one.example/"),
            Station::new("a", "Second", "https://two.example/"),
            Station::new(" ", "Blank", "https://three.example/"),
        ]);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("a").unwrap().name, "First");
    }

    #[test]
    fn candidates_invariant() {
        assert!(!Station::new("x", "X", "  ").has_candidates());
        assert!(Station::new("x", "X", "")
            .with_alternates(["https://alt.example/"])
            .has_candidates());
    }

    #[test]
    fn find_and_search() {
        let mut bhajan = Station::new("bhajan", "Bhajan FM", "https://b.example/");
        bhajan.language = Some("Hindi".to_owned());
        let directory = Directory::new([
            bhajan,
            Station::new("psalm", "Psalms Daily", "https://p.example/"),
        ]);

        assert_eq!(directory.find("psalms daily").unwrap().id, "psalm");
        assert_eq!(directory.find("bhaj").unwrap().id, "bhajan");
        assert_eq!(directory.search("hindi").count(), 1);
        assert_eq!(directory.search("").count(), 2);
    }
}
