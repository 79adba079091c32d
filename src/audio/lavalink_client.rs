//! Cliente REST de Lavalink v4.
//!
//! [`LavalinkNode`] implements [`AudioNode`] over the node's HTTP API and turns
//! the JSON frames of the node's websocket into [`NodeEvent`]s via
//! [`LavalinkNode::handle_message`]. Players are addressed as
//! `/v4/sessions/{session}/players/{guild}`; the session id comes from the
//! websocket `ready` frame, which [`LavalinkNode::listen`] keeps open.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serenity::model::id::{GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::HeaderValue,
    Message,
};
use tracing::{debug, error, info, warn};
use url::Url;

use super::node::{
    AudioNode, EndReason, LoadResult, NodeEvent, PlayerHandle, PlayerState, ResolvedTrack,
    TrackEvent, VoiceConnection,
};
use crate::{config::Config, error::NodeError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrackInfo {
    title: String,
    length: u64,
    is_stream: bool,
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    encoded: String,
    info: WireTrackInfo,
}

impl From<WireTrack> for ResolvedTrack {
    fn from(track: WireTrack) -> Self {
        Self {
            encoded: track.encoded,
            title: track.info.title,
            uri: track.info.uri,
            length_ms: track.info.length,
            is_stream: track.info.is_stream,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePlaylistInfo {
    name: String,
    selected_track: i64,
}

#[derive(Debug, Deserialize)]
struct WirePlaylist {
    info: WirePlaylistInfo,
    tracks: Vec<WireTrack>,
}

#[derive(Debug, Deserialize)]
struct WireException {
    message: Option<String>,
    severity: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
enum LoadResponse {
    Track(WireTrack),
    Playlist(WirePlaylist),
    Search(Vec<WireTrack>),
    Empty(serde::de::IgnoredAny),
    Error(WireException),
}

impl From<LoadResponse> for LoadResult {
    fn from(response: LoadResponse) -> Self {
        match response {
            LoadResponse::Track(track) => LoadResult::ok(vec![track.into()]),
            LoadResponse::Playlist(playlist) => {
                let mut tracks: Vec<ResolvedTrack> =
                    playlist.tracks.into_iter().map(Into::into).collect();
                debug!("📋 Playlist '{}' con {} tracks", playlist.info.name, tracks.len());
                // El track elegido en la URL va primero
                if let Ok(selected) = usize::try_from(playlist.info.selected_track) {
                    if selected < tracks.len() {
                        tracks.rotate_left(selected);
                    }
                }
                if tracks.is_empty() {
                    LoadResult::empty()
                } else {
                    LoadResult::ok(tracks)
                }
            }
            LoadResponse::Search(tracks) if tracks.is_empty() => LoadResult::empty(),
            LoadResponse::Search(tracks) => {
                LoadResult::ok(tracks.into_iter().map(Into::into).collect())
            }
            LoadResponse::Empty(_) => LoadResult::empty(),
            LoadResponse::Error(exception) => LoadResult::error(format!(
                "{} ({})",
                exception.message.unwrap_or_else(|| "error desconocido".to_string()),
                exception.severity
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireEventException {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
enum WireEvent {
    TrackStartEvent {
        guild_id: String,
        track: WireTrack,
    },
    TrackEndEvent {
        guild_id: String,
        track: WireTrack,
        reason: EndReason,
    },
    TrackExceptionEvent {
        guild_id: String,
        track: WireTrack,
        exception: WireEventException,
    },
    TrackStuckEvent {
        guild_id: String,
        track: WireTrack,
        threshold_ms: u64,
    },
    WebSocketClosedEvent {
        guild_id: String,
        code: u16,
        reason: String,
    },
}

impl WireEvent {
    fn into_node_event(self) -> Option<NodeEvent> {
        let (guild_id, event) = match self {
            WireEvent::TrackStartEvent { guild_id, track } => (
                guild_id,
                TrackEvent::Start {
                    encoded: track.encoded,
                },
            ),
            WireEvent::TrackEndEvent {
                guild_id,
                track,
                reason,
            } => (
                guild_id,
                TrackEvent::End {
                    encoded: track.encoded,
                    reason,
                },
            ),
            WireEvent::TrackExceptionEvent {
                guild_id,
                track,
                exception,
            } => (
                guild_id,
                TrackEvent::Exception {
                    encoded: track.encoded,
                    message: exception
                        .message
                        .unwrap_or_else(|| "error desconocido".to_string()),
                },
            ),
            WireEvent::TrackStuckEvent {
                guild_id,
                track,
                threshold_ms,
            } => (
                guild_id,
                TrackEvent::Stuck {
                    encoded: track.encoded,
                    threshold_ms,
                },
            ),
            WireEvent::WebSocketClosedEvent {
                guild_id,
                code,
                reason,
            } => (guild_id, TrackEvent::VoiceClosed { code, reason }),
        };
        let guild_id = guild_id.parse::<u64>().ok().filter(|id| *id != 0)?;
        Some(NodeEvent::Track {
            guild_id: GuildId::new(guild_id),
            event,
        })
    }
}

/// Frames del websocket del nodo
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum NodeMessage {
    #[serde(rename_all = "camelCase")]
    Ready { resumed: bool, session_id: String },
    Event(WireEvent),
    /// `playerUpdate` y `stats`: no los usamos
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
struct UpdateTrack {
    /// `null` detiene el track actual
    encoded: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoicePayload {
    token: String,
    endpoint: String,
    session_id: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<UpdateTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<VoicePayload>,
}

struct NodeInner {
    client: reqwest::Client,
    base: Url,
    password: String,
    session_id: RwLock<Option<String>>,
    /// Hubo una caída desde el último `ready`
    lost: Mutex<bool>,
}

impl NodeInner {
    fn player_url(&self, guild_id: GuildId) -> Result<Url, NodeError> {
        let session_id = self
            .session_id
            .read()
            .clone()
            .ok_or(NodeError::NoSession)?;
        Ok(self
            .base
            .join(&format!("v4/sessions/{}/players/{}", session_id, guild_id))?)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, NodeError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        error!("❌ Lavalink respondió {}: {}", status, message);
        Err(NodeError::Status { status, message })
    }

    async fn update(&self, guild_id: GuildId, body: &UpdatePlayer) -> Result<(), NodeError> {
        let url = self.player_url(guild_id)?;
        let response = self
            .client
            .patch(url)
            .header("Authorization", &self.password)
            .json(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Nodo Lavalink compartido por todos los guilds
#[derive(Clone)]
pub struct LavalinkNode {
    inner: Arc<NodeInner>,
}

impl LavalinkNode {
    pub fn new(config: &Config) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let base = Url::parse(&config.lavalink_url())?;
        info!("🎼 Nodo Lavalink configurado en {}", base);

        Ok(Self {
            inner: Arc::new(NodeInner {
                client,
                base,
                password: config.lavalink_password.clone(),
                session_id: RwLock::new(None),
                lost: Mutex::new(false),
            }),
        })
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().clone()
    }

    /// Procesa un frame de texto del websocket del nodo.
    ///
    /// Returns the event to dispatch, if any. A `ready` after
    /// [`LavalinkNode::connection_lost`] yields [`NodeEvent::Reconnected`].
    pub fn handle_message(&self, text: &str) -> Result<Option<NodeEvent>, NodeError> {
        match serde_json::from_str::<NodeMessage>(text)? {
            NodeMessage::Ready {
                resumed,
                session_id,
            } => {
                info!("✅ Lavalink listo (sesión {}, resumed={})", session_id, resumed);
                *self.inner.session_id.write() = Some(session_id);
                let was_lost = std::mem::take(&mut *self.inner.lost.lock());
                Ok(was_lost.then_some(NodeEvent::Reconnected))
            }
            NodeMessage::Event(event) => {
                let event = event.into_node_event();
                if event.is_none() {
                    warn!("Evento de Lavalink con guild inválido");
                }
                Ok(event)
            }
            NodeMessage::Other => Ok(None),
        }
    }

    /// Marca la caída del enlace; los players existentes dejan de ser válidos
    pub fn connection_lost(&self) -> NodeEvent {
        warn!("🔌 Conexión con Lavalink perdida");
        *self.inner.session_id.write() = None;
        *self.inner.lost.lock() = true;
        NodeEvent::Disconnected
    }

    fn websocket_url(&self) -> Result<Url, NodeError> {
        let mut url = self.inner.base.join("v4/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| NodeError::WebSocket(format!("esquema inválido para {}", url)))?;
        Ok(url)
    }

    /// Mantiene abierto el websocket del nodo y entrega cada evento a
    /// `on_event`. Reconecta con backoff exponencial; nunca retorna.
    pub async fn listen<F>(&self, user_id: UserId, on_event: F)
    where
        F: Fn(NodeEvent) + Send + Sync,
    {
        let mut backoff = Duration::from_secs(1);
        loop {
            match self.read_events(user_id, &on_event).await {
                Ok(()) => {
                    backoff = Duration::from_secs(1);
                    warn!("🔌 Lavalink cerró el websocket");
                }
                Err(e) => error!("❌ Error en el websocket de Lavalink: {}", e),
            }
            if !*self.inner.lost.lock() {
                on_event(self.connection_lost());
            }
            info!(
                "🔄 Reintentando conexión con Lavalink en {}",
                humantime::format_duration(backoff)
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(30));
        }
    }

    async fn read_events<F>(&self, user_id: UserId, on_event: &F) -> Result<(), NodeError>
    where
        F: Fn(NodeEvent) + Send + Sync,
    {
        let url = self.websocket_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| NodeError::WebSocket(e.to_string()))?;
        let headers = request.headers_mut();
        let header = |value: &str| {
            HeaderValue::from_str(value).map_err(|e| NodeError::WebSocket(e.to_string()))
        };
        headers.insert("Authorization", header(&self.inner.password)?);
        headers.insert("User-Id", header(&user_id.to_string())?);
        headers.insert(
            "Client-Name",
            header(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))?,
        );

        let (mut stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| NodeError::WebSocket(e.to_string()))?;
        info!("🔗 Websocket de Lavalink conectado en {}", url);

        while let Some(frame) = stream.next().await {
            match frame.map_err(|e| NodeError::WebSocket(e.to_string()))? {
                Message::Text(text) => match self.handle_message(&text) {
                    Ok(Some(event)) => on_event(event),
                    Ok(None) => {}
                    Err(e) => warn!("Mensaje de Lavalink inválido: {}", e),
                },
                Message::Close(frame) => {
                    debug!("Lavalink cerró: {:?}", frame);
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn resolve(&self, query: &str) -> Result<LoadResult, NodeError> {
        let identifier = if Url::parse(query).is_ok() {
            query.to_string()
        } else {
            format!("ytsearch:{}", query)
        };
        debug!("🔍 Resolviendo en Lavalink: {}", identifier);

        let url = self.inner.base.join("v4/loadtracks")?;
        let response = self
            .inner
            .client
            .get(url)
            .header("Authorization", &self.inner.password)
            .query(&[("identifier", identifier.as_str())])
            .send()
            .await?;
        let response = NodeInner::check(response).await?;
        let body = response.text().await?;
        let parsed: LoadResponse = serde_json::from_str(&body)?;
        Ok(parsed.into())
    }

    async fn create_player(
        &self,
        guild_id: GuildId,
        voice: &VoiceConnection,
        initial: PlayerState,
    ) -> Result<Box<dyn PlayerHandle>, NodeError> {
        let body = UpdatePlayer {
            paused: Some(initial.paused),
            volume: Some(initial.volume),
            voice: Some(VoicePayload {
                token: voice.token.clone(),
                endpoint: voice.endpoint.clone(),
                session_id: voice.session_id.clone(),
            }),
            ..UpdatePlayer::default()
        };
        self.inner.update(guild_id, &body).await?;
        info!("🎛️ Player de Lavalink creado para guild {}", guild_id);

        Ok(Box::new(LavalinkPlayer {
            inner: self.inner.clone(),
            guild_id,
            state: Mutex::new(initial),
        }))
    }
}

pub struct LavalinkPlayer {
    inner: Arc<NodeInner>,
    guild_id: GuildId,
    state: Mutex<PlayerState>,
}

#[async_trait]
impl PlayerHandle for LavalinkPlayer {
    async fn play(&self, track: &ResolvedTrack) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            track: Some(UpdateTrack {
                encoded: Some(track.encoded.clone()),
            }),
            ..UpdatePlayer::default()
        };
        self.inner.update(self.guild_id, &body).await
    }

    async fn stop(&self) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            track: Some(UpdateTrack { encoded: None }),
            ..UpdatePlayer::default()
        };
        self.inner.update(self.guild_id, &body).await
    }

    async fn seek(&self, position_ms: u64) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            position: Some(position_ms),
            ..UpdatePlayer::default()
        };
        self.inner.update(self.guild_id, &body).await
    }

    async fn set_paused(&self, paused: bool) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            paused: Some(paused),
            ..UpdatePlayer::default()
        };
        self.inner.update(self.guild_id, &body).await?;
        self.state.lock().paused = paused;
        Ok(())
    }

    async fn set_volume(&self, volume: u16) -> Result<(), NodeError> {
        let body = UpdatePlayer {
            volume: Some(volume),
            ..UpdatePlayer::default()
        };
        self.inner.update(self.guild_id, &body).await?;
        self.state.lock().volume = volume;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), NodeError> {
        let url = self.inner.player_url(self.guild_id)?;
        let response = self
            .inner
            .client
            .delete(url)
            .header("Authorization", &self.inner.password)
            .send()
            .await?;
        NodeInner::check(response).await?;
        debug!("🗑️ Player de guild {} destruido", self.guild_id);
        Ok(())
    }

    fn state(&self) -> PlayerState {
        *self.state.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::node::LoadKind;
    use pretty_assertions::assert_eq;

    fn node() -> LavalinkNode {
        LavalinkNode::new(&Config::default()).unwrap()
    }

    const TRACK: &str = r#"{
        "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "sourceName": "youtube"
        },
        "pluginInfo": {}
    }"#;

    fn parse_load(json: &str) -> LoadResult {
        serde_json::from_str::<LoadResponse>(json).unwrap().into()
    }

    #[test]
    fn test_parse_single_track() {
        let result = parse_load(&format!(r#"{{"loadType":"track","data":{TRACK}}}"#));
        let track = result.playable_track().unwrap();
        assert_eq!(track.title, "Never Gonna Give You Up");
        assert_eq!(track.length_ms, 212_000);
        assert!(!track.is_stream);
    }

    #[test]
    fn test_parse_empty_and_error() {
        let empty = parse_load(r#"{"loadType":"empty","data":{}}"#);
        assert_eq!(empty.kind, LoadKind::Empty);

        let error = parse_load(
            r#"{"loadType":"error","data":{"message":"Video unavailable","severity":"common","cause":"x"}}"#,
        );
        assert_eq!(error.kind, LoadKind::Error);
        assert!(error.message.as_deref().unwrap().contains("Video unavailable"));
        assert!(error.playable_track().is_none());
    }

    #[test]
    fn test_parse_search_with_no_results_is_empty() {
        let result = parse_load(r#"{"loadType":"search","data":[]}"#);
        assert_eq!(result.kind, LoadKind::Empty);
    }

    #[test]
    fn test_playlist_puts_selected_track_first() {
        let second = TRACK.replace("QAAAjQIAJVJpY2sgQXN0bGV5", "second");
        let json = format!(
            r#"{{"loadType":"playlist","data":{{"info":{{"name":"mix","selectedTrack":1}},"pluginInfo":{{}},"tracks":[{TRACK},{second}]}}}}"#
        );
        let result = parse_load(&json);
        assert_eq!(result.playable_track().map(|t| t.encoded.as_str()), Some("second"));
        assert_eq!(result.tracks.len(), 2);
    }

    #[test]
    fn test_ready_after_outage_reports_reconnect() {
        let node = node();
        let ready = r#"{"op":"ready","resumed":false,"sessionId":"abc"}"#;

        assert_eq!(node.handle_message(ready).unwrap(), None);
        assert_eq!(node.session_id().as_deref(), Some("abc"));

        assert_eq!(node.connection_lost(), NodeEvent::Disconnected);
        assert_eq!(node.session_id(), None);
        assert_eq!(node.handle_message(ready).unwrap(), Some(NodeEvent::Reconnected));
    }

    #[test]
    fn test_track_end_event_is_routed_by_guild() {
        let node = node();
        let json = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"123","track":{TRACK},"reason":"finished"}}"#
        );
        let event = node.handle_message(&json).unwrap();
        assert_eq!(
            event,
            Some(NodeEvent::Track {
                guild_id: GuildId::new(123),
                event: TrackEvent::End {
                    encoded: "QAAAjQIAJVJpY2sgQXN0bGV5".into(),
                    reason: EndReason::Finished,
                },
            })
        );
    }

    #[test]
    fn test_stuck_and_exception_events() {
        let node = node();
        let stuck = format!(
            r#"{{"op":"event","type":"TrackStuckEvent","guildId":"5","track":{TRACK},"thresholdMs":10000}}"#
        );
        assert!(matches!(
            node.handle_message(&stuck).unwrap(),
            Some(NodeEvent::Track { event: TrackEvent::Stuck { threshold_ms: 10_000, .. }, .. })
        ));

        let exception = format!(
            r#"{{"op":"event","type":"TrackExceptionEvent","guildId":"5","track":{TRACK},"exception":{{"message":"boom","severity":"fault","cause":"x"}}}}"#
        );
        assert!(matches!(
            node.handle_message(&exception).unwrap(),
            Some(NodeEvent::Track { event: TrackEvent::Exception { .. }, .. })
        ));
    }

    #[test]
    fn test_stats_and_player_updates_are_ignored() {
        let node = node();
        let update = r#"{"op":"playerUpdate","guildId":"1","state":{"time":1,"position":2,"connected":true,"ping":3}}"#;
        assert_eq!(node.handle_message(update).unwrap(), None);
        assert!(node.handle_message("not json").is_err());
    }

    #[test]
    fn test_update_body_serializes_stop_as_null_track() {
        let stop = UpdatePlayer {
            track: Some(UpdateTrack { encoded: None }),
            ..UpdatePlayer::default()
        };
        assert_eq!(serde_json::to_string(&stop).unwrap(), r#"{"track":{"encoded":null}}"#);

        let seek = UpdatePlayer {
            position: Some(5000),
            ..UpdatePlayer::default()
        };
        assert_eq!(serde_json::to_string(&seek).unwrap(), r#"{"position":5000}"#);
    }

    #[test]
    fn test_websocket_url_follows_rest_scheme() {
        assert_eq!(node().websocket_url().unwrap().as_str(), "ws://localhost:2333/v4/websocket");

        let secure = LavalinkNode::new(&Config {
            lavalink_ssl: true,
            ..Config::default()
        })
        .unwrap();
        assert_eq!(secure.websocket_url().unwrap().scheme(), "wss");
    }

    #[test]
    fn test_player_calls_require_a_session() {
        let node = node();
        let result = node.inner.player_url(GuildId::new(1));
        assert!(matches!(result, Err(NodeError::NoSession)));
    }
}
