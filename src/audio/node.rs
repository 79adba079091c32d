//! Interfaz con el nodo de audio externo (protocolo Lavalink v4).
//!
//! The engine only talks to the node through [`AudioNode`] and
//! [`PlayerHandle`]; [`crate::audio::lavalink_client::LavalinkNode`] is the
//! production implementation. Node-originated events arrive as [`NodeEvent`]s
//! and are routed to the owning guild worker by the registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};

use crate::error::NodeError;

/// Un track ya resuelto por el nodo, listo para reproducir
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTrack {
    /// Identificador opaco que el nodo entiende
    pub encoded: String,
    pub title: String,
    pub uri: Option<String>,
    pub length_ms: u64,
    pub is_stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Ok,
    Empty,
    Error,
}

#[derive(Debug, Clone)]
pub struct LoadResult {
    pub kind: LoadKind,
    pub tracks: Vec<ResolvedTrack>,
    /// Mensaje del nodo cuando `kind == Error`
    pub message: Option<String>,
}

impl LoadResult {
    pub fn empty() -> Self {
        Self {
            kind: LoadKind::Empty,
            tracks: Vec::new(),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: LoadKind::Error,
            tracks: Vec::new(),
            message: Some(message.into()),
        }
    }

    pub fn ok(tracks: Vec<ResolvedTrack>) -> Self {
        Self {
            kind: LoadKind::Ok,
            tracks,
            message: None,
        }
    }

    /// El track a reproducir, si la carga fue exitosa
    pub fn playable_track(&self) -> Option<&ResolvedTrack> {
        match self.kind {
            LoadKind::Ok => self.tracks.first(),
            LoadKind::Empty | LoadKind::Error => None,
        }
    }
}

/// Datos de la conexión de voz que el nodo necesita para transmitir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConnection {
    pub channel_id: ChannelId,
    pub endpoint: String,
    pub token: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerState {
    pub paused: bool,
    pub volume: u16,
}

#[async_trait]
pub trait AudioNode: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<LoadResult, NodeError>;

    /// Crea el player del guild sobre una conexión de voz nueva
    async fn create_player(
        &self,
        guild_id: GuildId,
        voice: &VoiceConnection,
        initial: PlayerState,
    ) -> Result<Box<dyn PlayerHandle>, NodeError>;
}

/// Handle exclusivo de una sesión sobre el player del nodo.
#[async_trait]
pub trait PlayerHandle: Send + Sync {
    /// Reproduce reemplazando lo que esté sonando
    async fn play(&self, track: &ResolvedTrack) -> Result<(), NodeError>;
    async fn stop(&self) -> Result<(), NodeError>;
    async fn seek(&self, position_ms: u64) -> Result<(), NodeError>;
    async fn set_paused(&self, paused: bool) -> Result<(), NodeError>;
    async fn set_volume(&self, volume: u16) -> Result<(), NodeError>;
    async fn destroy(&self) -> Result<(), NodeError>;

    /// Último estado conocido, sin ir al nodo
    fn state(&self) -> PlayerState;
}

/// Por qué terminó un track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl EndReason {
    /// `replaced` y `cleanup` los genera el propio nodo; no avanzan la cola
    pub fn may_start_next(&self) -> bool {
        matches!(self, EndReason::Finished | EndReason::LoadFailed | EndReason::Stopped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEvent {
    Start { encoded: String },
    End { encoded: String, reason: EndReason },
    Exception { encoded: String, message: String },
    Stuck { encoded: String, threshold_ms: u64 },
    /// Discord cerró la conexión de voz del nodo
    VoiceClosed { code: u16, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Evento de un player; se enruta al worker de ese guild
    Track { guild_id: GuildId, event: TrackEvent },
    /// Se perdió el enlace con el nodo (afecta a todos los guilds)
    Disconnected,
    /// El nodo volvió después de una caída
    Reconnected,
}
