use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;

/// Una canción individual que el nodo puede resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub url: String,
}

impl Song {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Stream en vivo. El título se conoce recién cuando el nodo lo resuelve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStream {
    pub title: Option<String>,
    pub url: String,
}

impl AudioStream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            title: None,
            url: url.into(),
        }
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// Colección ordenada de canciones (playlist, álbum) con un cursor.
///
/// The cursor starts at `-1`: the advance step always increments it before
/// loading, so a fresh collection begins with its first song. Outside of that
/// transient state `0 <= position < songs.len()` holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongCollection {
    pub title: String,
    pub url: String,
    songs: Vec<Song>,
    position: i64,
}

impl SongCollection {
    pub fn new(title: impl Into<String>, url: impl Into<String>, songs: Vec<Song>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            songs,
            position: -1,
        }
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Mueve el cursor, acotado a `-1..len`
    pub fn set_position(&mut self, position: i64) {
        let last = self.songs.len() as i64 - 1;
        self.position = position.clamp(-1, last.max(-1));
    }

    pub fn is_at_last(&self) -> bool {
        self.position >= self.songs.len() as i64 - 1
    }

    pub fn current_song(&self) -> Option<&Song> {
        usize::try_from(self.position)
            .ok()
            .and_then(|index| self.songs.get(index))
    }

    pub(crate) fn step_forward(&mut self) {
        self.position += 1;
    }

    pub(crate) fn step_back(&mut self) {
        self.position -= 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayableKind {
    Song,
    Stream,
    Collection,
}

impl PlayableKind {
    pub fn emoji(&self) -> &'static str {
        match self {
            PlayableKind::Song => "🎵",
            PlayableKind::Stream => "📻",
            PlayableKind::Collection => "💿",
        }
    }
}

/// Cualquier cosa que puede ocupar el lugar de "actual".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Playable {
    Song(Song),
    Stream(AudioStream),
    Collection(SongCollection),
}

/// The single resolvable item behind a [`Playable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track<'a> {
    Song(&'a Song),
    Stream(&'a AudioStream),
}

impl Track<'_> {
    pub fn title(&self) -> &str {
        match self {
            Track::Song(song) => &song.title,
            Track::Stream(stream) => stream.title(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Track::Song(song) => &song.url,
            Track::Stream(stream) => &stream.url,
        }
    }
}

impl Playable {
    pub fn title(&self) -> &str {
        match self {
            Playable::Song(song) => &song.title,
            Playable::Stream(stream) => stream.title(),
            Playable::Collection(collection) => &collection.title,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Playable::Song(song) => &song.url,
            Playable::Stream(stream) => &stream.url,
            Playable::Collection(collection) => &collection.url,
        }
    }

    pub fn kind(&self) -> PlayableKind {
        match self {
            Playable::Song(_) => PlayableKind::Song,
            Playable::Stream(_) => PlayableKind::Stream,
            Playable::Collection(_) => PlayableKind::Collection,
        }
    }

    pub fn emoji(&self) -> &'static str {
        self.kind().emoji()
    }

    /// Lo que realmente se carga en el nodo. `None` para una colección cuyo
    /// cursor no apunta a ninguna canción.
    pub fn track(&self) -> Option<Track<'_>> {
        match self {
            Playable::Song(song) => Some(Track::Song(song)),
            Playable::Stream(stream) => Some(Track::Stream(stream)),
            Playable::Collection(collection) => collection.current_song().map(Track::Song),
        }
    }

    pub fn as_collection(&self) -> Option<&SongCollection> {
        match self {
            Playable::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut SongCollection> {
        match self {
            Playable::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Playable::Collection(_))
    }

    /// Actualiza el título de un stream con lo que reportó el nodo
    pub fn apply_resolved_title(&mut self, title: &str) {
        if let Playable::Stream(stream) = self {
            if !title.is_empty() {
                stream.title = Some(title.to_string());
            }
        }
    }
}

/// Un playable pedido por alguien.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongListing {
    pub playable: Playable,
    pub requested_by: UserId,
    /// Atribución opcional ("desde la playlist de X", "autoplay", ...)
    pub source: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl SongListing {
    pub fn new(playable: Playable, requested_by: UserId) -> Self {
        Self {
            playable,
            requested_by,
            source: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn title(&self) -> &str {
        self.playable.title()
    }

    /// Texto corto para anuncios
    pub fn describe(&self) -> String {
        format!("{} **{}**", self.playable.emoji(), self.playable.title())
    }
}
