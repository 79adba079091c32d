//! Servicio de reproducción por guild.
//!
//! Each guild gets one worker task that owns its [`Session`]. Commands from
//! Discord handlers, node events and timers all arrive through the worker's
//! mailbox, so per-guild state is only ever touched by a single task.
//! [`GuildPlayback`] is the cheap, cloneable handle used to talk to it.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    collaborators::{Messenger, VoiceStateCache, VoiceTransport},
    events::{EventHub, SessionEvent},
    listings::ListingManager,
    node::{AudioNode, NodeEvent, PlayerState},
    playable::SongListing,
    session::{Advance, LoopMode, Offset, PlaybackSnapshot, Scope, Session},
};
use crate::{
    config::Config,
    error::{PlaybackError, Result},
};

/// Todo lo externo que el servicio necesita
#[derive(Clone)]
pub struct Collaborators {
    pub node: Arc<dyn AudioNode>,
    pub transport: Arc<dyn VoiceTransport>,
    pub messenger: Arc<dyn Messenger>,
    pub voice_states: Arc<dyn VoiceStateCache>,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub queue_capacity: usize,
    pub history_capacity: usize,
    pub idle_timeout: Duration,
    pub default_volume: u16,
    pub deafen_on_join: bool,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_capacity: config.max_queue_size,
            history_capacity: config.max_history_size,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            default_volume: config.default_volume,
            deafen_on_join: config.deafen_on_join,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOutcome {
    /// Empezó a sonar de inmediato
    Playing,
    /// Quedó en la cola, en esta posición (1-based)
    Queued { position: usize },
    /// No se pudo reproducir y pasó directo al historial
    Skipped,
}

/// Qué tan estricta es la verificación de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCheck {
    /// Solo exige que el usuario esté en un canal de voz
    Presence,
    /// Además exige que sea el canal de la sesión, si existe
    Manage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    VoiceState(VoiceCheck),
    /// Para pedir canciones: voz + cola con espacio
    CanRequestPlayback,
    /// Para comandos de control (skip, pausa, volumen...)
    CanManagePlayback,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    ReceiveListing {
        listing: SongListing,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        reply: Reply<Result<ListingOutcome>>,
    },
    Skip {
        scope: Scope,
        offset: Offset,
        reply: Reply<Result<()>>,
    },
    Unskip {
        scope: Scope,
        offset: Offset,
        reply: Reply<Result<bool>>,
    },
    Replay {
        scope: Scope,
        reply: Reply<Result<()>>,
    },
    SkipTo {
        position_ms: u64,
        reply: Reply<Result<()>>,
    },
    SetPaused {
        paused: bool,
        reply: Reply<Result<()>>,
    },
    SetVolume {
        volume: u16,
        reply: Reply<Result<()>>,
    },
    SetLoop {
        mode: LoopMode,
        enabled: bool,
        reply: Reply<Result<()>>,
    },
    Stop {
        reply: Reply<Result<()>>,
    },
    Verify {
        actor: UserId,
        text_channel: ChannelId,
        guard: Guard,
        reply: Reply<bool>,
    },
    Snapshot {
        reply: Reply<Option<PlaybackSnapshot>>,
    },
    Subscribe {
        reply: Reply<Option<broadcast::Receiver<SessionEvent>>>,
    },
    Node(NodeEvent),
    VoiceStateChanged {
        user_id: UserId,
        channel_id: Option<ChannelId>,
    },
    IdleTimeout {
        generation: u64,
    },
}

/// Handle hacia el worker de un guild
#[derive(Clone)]
pub struct GuildPlayback {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<Command>,
}

impl GuildPlayback {
    /// Lanza el worker del guild. Requiere un runtime de tokio activo.
    pub fn spawn(
        guild_id: GuildId,
        collaborators: Collaborators,
        settings: ServiceSettings,
        node_available: bool,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = GuildWorker {
            guild_id,
            collaborators,
            settings,
            session: None,
            node_available,
            idle: IdleTimer::default(),
            mailbox: tx.downgrade(),
        };
        tokio::spawn(worker.run(rx));
        Self { guild_id, tx }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| PlaybackError::WorkerGone)?;
        rx.await.map_err(|_| PlaybackError::WorkerGone)
    }

    fn notify(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Worker del guild {} ya no recibe eventos", self.guild_id);
        }
    }

    /// Entrada principal: agrega una solicitud y arranca la sesión si hace
    /// falta
    pub async fn receive_new_listing(
        &self,
        listing: SongListing,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<ListingOutcome> {
        self.call(|reply| Command::ReceiveListing {
            listing,
            voice_channel,
            text_channel,
            reply,
        })
        .await?
    }

    pub async fn skip(&self, scope: Scope, offset: Offset) -> Result<()> {
        self.call(|reply| Command::Skip {
            scope,
            offset,
            reply,
        })
        .await?
    }

    /// `Ok(false)` si no había historial que restaurar
    pub async fn unskip(&self, scope: Scope, offset: Offset) -> Result<bool> {
        self.call(|reply| Command::Unskip {
            scope,
            offset,
            reply,
        })
        .await?
    }

    pub async fn replay(&self, scope: Scope) -> Result<()> {
        self.call(|reply| Command::Replay { scope, reply }).await?
    }

    pub async fn skip_to(&self, position_ms: u64) -> Result<()> {
        self.call(|reply| Command::SkipTo { position_ms, reply })
            .await?
    }

    pub async fn set_paused(&self, paused: bool) -> Result<()> {
        self.call(|reply| Command::SetPaused { paused, reply }).await?
    }

    pub async fn set_volume(&self, volume: u16) -> Result<()> {
        self.call(|reply| Command::SetVolume { volume, reply }).await?
    }

    pub async fn set_loop(&self, mode: LoopMode, enabled: bool) -> Result<()> {
        self.call(|reply| Command::SetLoop {
            mode,
            enabled,
            reply,
        })
        .await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.call(|reply| Command::Stop { reply }).await?
    }

    /// Corre un guard; si rechaza, el aviso ya se mandó al canal de texto
    pub async fn verify(&self, actor: UserId, text_channel: ChannelId, guard: Guard) -> bool {
        self.call(|reply| Command::Verify {
            actor,
            text_channel,
            guard,
            reply,
        })
        .await
        .unwrap_or(false)
    }

    pub async fn verify_voice_state(
        &self,
        actor: UserId,
        text_channel: ChannelId,
        check: VoiceCheck,
    ) -> bool {
        self.verify(actor, text_channel, Guard::VoiceState(check))
            .await
    }

    pub async fn verify_can_request_playback(&self, actor: UserId, text_channel: ChannelId) -> bool {
        self.verify(actor, text_channel, Guard::CanRequestPlayback)
            .await
    }

    pub async fn verify_can_manage_playback(&self, actor: UserId, text_channel: ChannelId) -> bool {
        self.verify(actor, text_channel, Guard::CanManagePlayback)
            .await
    }

    pub async fn snapshot(&self) -> Option<PlaybackSnapshot> {
        self.call(|reply| Command::Snapshot { reply })
            .await
            .ok()
            .flatten()
    }

    pub async fn is_occupied(&self) -> bool {
        self.snapshot().await.is_some()
    }

    pub async fn current(&self) -> Option<SongListing> {
        self.snapshot().await.and_then(|s| s.current)
    }

    pub async fn queue(&self) -> Vec<SongListing> {
        self.snapshot().await.map(|s| s.queue).unwrap_or_default()
    }

    pub async fn history(&self) -> Vec<SongListing> {
        self.snapshot().await.map(|s| s.history).unwrap_or_default()
    }

    pub async fn playing_since(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.snapshot().await.and_then(|s| s.playing_since)
    }

    /// Suscripción a los eventos de la sesión actual, si hay una
    pub async fn subscribe(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        self.call(|reply| Command::Subscribe { reply })
            .await
            .ok()
            .flatten()
    }

    pub fn node_event(&self, event: NodeEvent) {
        self.notify(Command::Node(event));
    }

    pub fn voice_state_changed(&self, user_id: UserId, channel_id: Option<ChannelId>) {
        self.notify(Command::VoiceStateChanged {
            user_id,
            channel_id,
        });
    }
}

/// Un único temporizador de inactividad por guild. Re-armarlo cancela el
/// anterior; la generación descarta disparos que ya estaban en el buzón.
#[derive(Default)]
struct IdleTimer {
    token: Option<CancellationToken>,
    generation: u64,
}

impl IdleTimer {
    fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.generation += 1;
    }

    fn arm(&mut self, timeout: Duration, mailbox: &mpsc::WeakUnboundedSender<Command>) {
        self.cancel();
        let Some(tx) = mailbox.upgrade() else {
            return;
        };
        let token = CancellationToken::new();
        let generation = self.generation;
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let _ = tx.send(Command::IdleTimeout { generation });
                }
            }
        });
        self.token = Some(token);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.token.is_some() && self.generation == generation
    }
}

struct GuildWorker {
    guild_id: GuildId,
    collaborators: Collaborators,
    settings: ServiceSettings,
    session: Option<Session>,
    node_available: bool,
    idle: IdleTimer,
    mailbox: mpsc::WeakUnboundedSender<Command>,
}

impl GuildWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        debug!("🎛️ Worker de reproducción iniciado para guild {}", self.guild_id);
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        self.idle.cancel();
        debug!("Worker de guild {} terminado", self.guild_id);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::ReceiveListing {
                listing,
                voice_channel,
                text_channel,
                reply,
            } => {
                let result = self
                    .receive_new_listing(listing, voice_channel, text_channel)
                    .await;
                let _ = reply.send(result);
            }
            Command::Skip {
                scope,
                offset,
                reply,
            } => {
                let result = match self.active_session() {
                    Ok(session) => session.skip(scope, offset).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(self.settle(result));
            }
            Command::Unskip {
                scope,
                offset,
                reply,
            } => {
                let result = match self.active_session() {
                    Ok(session) => session.unskip(scope, offset).await,
                    Err(e) => Err(e),
                };
                let result = match result {
                    Ok(Some(advance)) => {
                        self.after_advance(advance);
                        Ok(true)
                    }
                    Ok(None) => Ok(false),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Replay { scope, reply } => {
                let result = match self.active_session() {
                    Ok(session) => session.replay(scope).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(self.settle(result));
            }
            Command::SkipTo { position_ms, reply } => {
                let result = match self.active_session() {
                    Ok(session) => session.skip_to(position_ms).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::SetPaused { paused, reply } => {
                let result = match self.active_session() {
                    Ok(session) => session.set_paused(paused).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::SetVolume { volume, reply } => {
                let result = match self.active_session() {
                    Ok(session) => session.set_volume(volume).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::SetLoop {
                mode,
                enabled,
                reply,
            } => {
                let result = self.active_session().map(|s| s.set_loop(mode, enabled));
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let result = if self.session.is_some() {
                    self.teardown("⏹️ Reproducción detenida").await;
                    Ok(())
                } else {
                    Err(PlaybackError::NoSession)
                };
                let _ = reply.send(result);
            }
            Command::Verify {
                actor,
                text_channel,
                guard,
                reply,
            } => {
                let allowed = self.verify(actor, text_channel, guard).await;
                let _ = reply.send(allowed);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.as_ref().map(Session::snapshot));
            }
            Command::Subscribe { reply } => {
                let rx = self
                    .session
                    .as_ref()
                    .map(|s| s.listings().events().subscribe());
                let _ = reply.send(rx);
            }
            Command::Node(event) => self.node_event(event).await,
            Command::VoiceStateChanged {
                user_id,
                channel_id,
            } => self.voice_state_changed(user_id, channel_id).await,
            Command::IdleTimeout { generation } => {
                if !self.idle.is_current(generation) {
                    return;
                }
                self.idle.token = None;
                if self.session.as_ref().is_some_and(Session::is_idle) {
                    info!("💤 Guild {} inactivo, cerrando sesión", self.guild_id);
                    self.teardown("👋 Cola terminada, saliendo del canal de voz")
                        .await;
                }
            }
        }
    }

    fn active_session(&mut self) -> Result<&mut Session> {
        if !self.node_available {
            return Err(PlaybackError::NodeUnavailable);
        }
        match self.session.as_mut() {
            Some(session) if session.is_disconnected() => Err(PlaybackError::NodeUnavailable),
            Some(session) => Ok(session),
            None => Err(PlaybackError::NoSession),
        }
    }

    fn settle(&mut self, result: Result<Advance>) -> Result<()> {
        result.map(|advance| self.after_advance(advance))
    }

    fn after_advance(&mut self, advance: Advance) {
        match advance {
            Advance::Idle => {
                debug!("⏱️ Timer de inactividad armado para guild {}", self.guild_id);
                self.idle.arm(self.settings.idle_timeout, &self.mailbox);
            }
            Advance::Playing => self.idle.cancel(),
            Advance::Pending | Advance::Unchanged => {}
        }
    }

    async fn receive_new_listing(
        &mut self,
        listing: SongListing,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<ListingOutcome> {
        if !self.node_available
            || self.session.as_ref().is_some_and(Session::is_disconnected)
        {
            return Err(PlaybackError::NodeUnavailable);
        }
        if self.session.is_none() {
            let session = self.create_session(voice_channel, text_channel).await?;
            self.session = Some(session);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(PlaybackError::NoSession);
        };

        let description = listing.describe();
        let was_idle = session.is_idle();
        session.enqueue(listing)?;

        if was_idle {
            self.idle.cancel();
            let advance = session.advance_queue_and_play().await;
            self.after_advance(advance);
            return Ok(match advance {
                Advance::Playing => ListingOutcome::Playing,
                _ => ListingOutcome::Skipped,
            });
        }

        let position = session.listings().queue().len();
        session
            .announce(format!("➕ Agregado a la cola (#{}): {}", position, description))
            .await;
        Ok(ListingOutcome::Queued { position })
    }

    async fn create_session(
        &self,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<Session> {
        let Collaborators {
            node,
            transport,
            messenger,
            ..
        } = &self.collaborators;

        let voice = transport
            .join(self.guild_id, voice_channel, self.settings.deafen_on_join)
            .await?;
        let initial = PlayerState {
            paused: false,
            volume: self.settings.default_volume,
        };
        let player = match node.create_player(self.guild_id, &voice, initial).await {
            Ok(player) => player,
            Err(e) => {
                if let Err(leave_error) = transport.leave(self.guild_id).await {
                    warn!("Error al salir tras fallo del player: {:?}", leave_error);
                }
                return Err(e.into());
            }
        };

        info!(
            "🎧 Sesión creada en guild {} (voz {}, texto {})",
            self.guild_id, voice_channel, text_channel
        );
        let listings = ListingManager::new(
            self.settings.queue_capacity,
            self.settings.history_capacity,
            EventHub::default(),
        );
        Ok(Session::new(
            self.guild_id,
            voice_channel,
            text_channel,
            listings,
            player,
            node.clone(),
            messenger.clone(),
        ))
    }

    async fn verify(&self, actor: UserId, text_channel: ChannelId, guard: Guard) -> bool {
        match self.rejection(actor, guard) {
            None => true,
            Some(message) => {
                debug!("🚫 Guard {:?} rechazó a {} en guild {}", guard, actor, self.guild_id);
                if let Err(e) = self
                    .collaborators
                    .messenger
                    .send_message(text_channel, message.to_string())
                    .await
                {
                    warn!("Error al enviar rechazo: {:?}", e);
                }
                false
            }
        }
    }

    fn rejection(&self, actor: UserId, guard: Guard) -> Option<&'static str> {
        if !self.node_available || self.session.as_ref().is_some_and(Session::is_disconnected) {
            return Some("🔌 El nodo de audio no está disponible, intenta en un momento");
        }
        let check = match guard {
            Guard::VoiceState(check) => check,
            Guard::CanRequestPlayback | Guard::CanManagePlayback => VoiceCheck::Manage,
        };
        let Some(actor_channel) = self
            .collaborators
            .voice_states
            .user_channel(self.guild_id, actor)
        else {
            return Some("❌ Debes estar en un canal de voz");
        };
        if check == VoiceCheck::Manage {
            if let Some(session) = &self.session {
                if session.voice_channel() != actor_channel {
                    return Some("❌ Debes estar en el mismo canal de voz que el bot");
                }
            }
        }
        match guard {
            Guard::CanRequestPlayback => {
                if self
                    .session
                    .as_ref()
                    .is_some_and(|s| s.listings().queue().is_full())
                {
                    return Some("❌ La cola está llena");
                }
            }
            Guard::CanManagePlayback => {
                if self.session.is_none() {
                    return Some("❌ No hay nada reproduciéndose");
                }
            }
            Guard::VoiceState(_) => {}
        }
        None
    }

    async fn node_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Track { event, .. } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.is_disconnected() {
                    return;
                }
                let advance = session.handle_track_event(event).await;
                self.after_advance(advance);
            }
            NodeEvent::Disconnected => {
                self.node_available = false;
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                session.mark_disconnected();
                self.idle.cancel();
                if let Err(e) = self.collaborators.transport.leave(self.guild_id).await {
                    warn!("Error al salir de voz en guild {}: {:?}", self.guild_id, e);
                }
                session
                    .announce(
                        "🔌 Se perdió la conexión con el nodo de audio; se reanudará automáticamente"
                            .to_string(),
                    )
                    .await;
            }
            NodeEvent::Reconnected => {
                self.node_available = true;
                if self.session.as_ref().is_some_and(Session::is_disconnected) {
                    self.recover().await;
                }
            }
        }
    }

    /// Reconstruye la sesión sobre una conexión de voz y un player nuevos
    async fn recover(&mut self) {
        let Some(old) = self.session.take() else {
            return;
        };
        let parts = old.into_parts();
        let Collaborators {
            node,
            transport,
            messenger,
            ..
        } = &self.collaborators;

        info!("🔄 Recuperando sesión de guild {}", self.guild_id);
        let voice = match transport
            .join(self.guild_id, parts.voice_channel, self.settings.deafen_on_join)
            .await
        {
            Ok(voice) => voice,
            Err(e) => {
                error!("❌ No se pudo volver a voz en guild {}: {:?}", self.guild_id, e);
                parts.listings.events().emit(SessionEvent::Stop);
                return;
            }
        };
        let player = match node
            .create_player(self.guild_id, &voice, parts.player_state)
            .await
        {
            Ok(player) => player,
            Err(e) => {
                error!("❌ No se pudo recrear el player en guild {}: {:?}", self.guild_id, e);
                if let Err(e) = transport.leave(self.guild_id).await {
                    warn!("Error al salir de voz: {:?}", e);
                }
                parts.listings.events().emit(SessionEvent::Stop);
                return;
            }
        };

        let mut session =
            Session::from_parts(self.guild_id, parts, player, node.clone(), messenger.clone());
        let advance = session.resume().await;
        self.session = Some(session);
        self.after_advance(advance);
    }

    async fn voice_state_changed(&mut self, user_id: UserId, channel_id: Option<ChannelId>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        // Fuera de voz a propósito mientras el nodo está caído
        if session.is_disconnected() {
            return;
        }
        let voice_states = &self.collaborators.voice_states;
        let bot = voice_states.bot_user_id();

        if user_id == bot {
            match channel_id {
                None => {
                    warn!("🔌 Sacaron al bot de voz en guild {}", self.guild_id);
                    self.teardown("🔌 Me desconectaron del canal de voz").await;
                    return;
                }
                Some(channel) if channel != session.voice_channel() => {
                    info!("🔀 Bot movido al canal {} en guild {}", channel, self.guild_id);
                    session.set_voice_channel(channel);
                }
                Some(_) => {}
            }
        }

        let alone = voice_states
            .occupants(self.guild_id, session.voice_channel())
            .into_iter()
            .all(|user| user == bot);
        if alone {
            info!("🚪 Canal vacío en guild {}, abandonando", self.guild_id);
            self.teardown("🚪 Me quedé solo en el canal de voz, hasta luego")
                .await;
        }
    }

    /// Cierra la sesión: player, voz y oyentes
    async fn teardown(&mut self, farewell: &str) {
        self.idle.cancel();
        let Some(session) = self.session.take() else {
            return;
        };
        let disconnected = session.is_disconnected();
        session.announce(farewell.to_string()).await;
        session.destroy().await;
        if !disconnected {
            if let Err(e) = self.collaborators.transport.leave(self.guild_id).await {
                warn!("Error al salir de voz en guild {}: {:?}", self.guild_id, e);
            }
        }
        info!("👋 Sesión de guild {} cerrada", self.guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        collaborators::{MockMessenger, MockVoiceStateCache, MockVoiceTransport},
        node::{EndReason, TrackEvent, VoiceConnection},
        session::tests::{collection, quiet_messenger, song, Call, FakeNode},
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(1);
    const VOICE: ChannelId = ChannelId::new(10);
    const TEXT: ChannelId = ChannelId::new(20);
    const BOT: UserId = UserId::new(99);
    const ALICE: UserId = UserId::new(42);

    fn transport() -> MockVoiceTransport {
        let mut transport = MockVoiceTransport::new();
        transport.expect_join().returning(|_, channel_id, _| {
            Ok(VoiceConnection {
                channel_id,
                endpoint: "voice.example.com".into(),
                token: "token".into(),
                session_id: "session".into(),
            })
        });
        transport.expect_leave().returning(|_| Ok(()));
        transport
    }

    /// Alice está en VOICE junto al bot
    fn voice_states() -> MockVoiceStateCache {
        let mut states = MockVoiceStateCache::new();
        states.expect_bot_user_id().return_const(BOT);
        states
            .expect_user_channel()
            .returning(|_, user| (user == ALICE || user == BOT).then_some(VOICE));
        states.expect_occupants().returning(|_, _| vec![ALICE, BOT]);
        states
    }

    fn spawn_with(
        node: Arc<FakeNode>,
        messenger: MockMessenger,
        voice_states: MockVoiceStateCache,
        settings: ServiceSettings,
    ) -> GuildPlayback {
        let collaborators = Collaborators {
            node,
            transport: Arc::new(transport()),
            messenger: Arc::new(messenger),
            voice_states: Arc::new(voice_states),
        };
        GuildPlayback::spawn(GUILD, collaborators, settings, true)
    }

    fn spawn(node: Arc<FakeNode>) -> GuildPlayback {
        spawn_with(node, quiet_messenger(), voice_states(), ServiceSettings::default())
    }

    fn track(encoded: &str, event: fn(String) -> TrackEvent) -> NodeEvent {
        NodeEvent::Track {
            guild_id: GUILD,
            event: event(encoded.to_string()),
        }
    }

    fn finished(encoded: String) -> TrackEvent {
        TrackEvent::End {
            encoded,
            reason: EndReason::Finished,
        }
    }

    fn stopped(encoded: String) -> TrackEvent {
        TrackEvent::End {
            encoded,
            reason: EndReason::Stopped,
        }
    }

    fn title(listing: Option<SongListing>) -> Option<String> {
        listing.map(|l| l.title().to_string())
    }

    #[tokio::test]
    async fn test_first_listing_plays_and_second_is_queued() {
        let node = Arc::new(FakeNode::default());
        let playback = spawn(node.clone());

        let first = playback.receive_new_listing(song("a"), VOICE, TEXT).await;
        let second = playback.receive_new_listing(song("b"), VOICE, TEXT).await;

        assert_eq!(first.unwrap(), ListingOutcome::Playing);
        assert_eq!(second.unwrap(), ListingOutcome::Queued { position: 1 });
        assert_eq!(node.plays(), vec!["a"]);
        assert_eq!(
            node.players_created.lock().clone(),
            vec![PlayerState {
                paused: false,
                volume: 100
            }]
        );
        assert!(playback.is_occupied().await);
    }

    #[tokio::test]
    async fn test_rejected_play_does_not_block_later_listings() {
        let node = Arc::new(FakeNode::default());
        node.reject_play("a");
        let playback = spawn(node.clone());

        let first = playback.receive_new_listing(song("a"), VOICE, TEXT).await;
        assert_eq!(first.unwrap(), ListingOutcome::Skipped);
        assert!(playback.current().await.is_none());

        let second = playback.receive_new_listing(song("b"), VOICE, TEXT).await;
        let third = playback.receive_new_listing(song("c"), VOICE, TEXT).await;
        assert_eq!(second.unwrap(), ListingOutcome::Playing);
        assert_eq!(third.unwrap(), ListingOutcome::Queued { position: 1 });

        playback.node_event(track("b", finished));
        assert_eq!(title(playback.current().await), Some("c".into()));
        assert_eq!(node.plays(), vec!["b", "c"]);
        assert_eq!(
            playback
                .history()
                .await
                .iter()
                .map(|l| l.title().to_string())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn test_full_queue_rejects_listing() {
        let node = Arc::new(FakeNode::default());
        let settings = ServiceSettings {
            queue_capacity: 1,
            ..ServiceSettings::default()
        };
        let playback = spawn_with(node, quiet_messenger(), voice_states(), settings);

        playback.receive_new_listing(song("a"), VOICE, TEXT).await.unwrap();
        playback.receive_new_listing(song("b"), VOICE, TEXT).await.unwrap();
        let result = playback.receive_new_listing(song("c"), VOICE, TEXT).await;

        assert!(matches!(result, Err(PlaybackError::QueueFull { capacity: 1 })));
        assert!(!playback.verify_can_request_playback(ALICE, TEXT).await);
    }

    #[tokio::test]
    async fn test_node_events_drive_the_queue() {
        let node = Arc::new(FakeNode::default());
        let playback = spawn(node.clone());
        playback.receive_new_listing(song("a"), VOICE, TEXT).await.unwrap();
        playback.receive_new_listing(song("b"), VOICE, TEXT).await.unwrap();

        playback.node_event(track("a", finished));
        assert_eq!(title(playback.current().await), Some("b".into()));
        assert_eq!(node.plays(), vec!["a", "b"]);
        assert_eq!(playback.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_skip_and_unskip_through_the_worker() {
        let node = Arc::new(FakeNode::default());
        let playback = spawn(node.clone());
        for title in ["a", "b", "c"] {
            playback.receive_new_listing(song(title), VOICE, TEXT).await.unwrap();
        }

        playback.skip(Scope::Listing, Offset::By(1)).await.unwrap();
        playback.node_event(track("a", stopped));
        assert_eq!(title(playback.current().await), Some("b".into()));

        assert!(playback.unskip(Scope::Listing, Offset::By(1)).await.unwrap());
        playback.node_event(track("b", stopped));
        assert_eq!(title(playback.current().await), Some("a".into()));
        assert_eq!(playback.queue().await.len(), 2);
    }

    #[tokio::test]
    async fn test_collection_through_the_worker() {
        let node = Arc::new(FakeNode::default());
        let playback = spawn(node.clone());
        playback
            .receive_new_listing(collection("ab", &["A", "B"]), VOICE, TEXT)
            .await
            .unwrap();

        playback.node_event(track("A", finished));
        playback.node_event(track("B", finished));
        assert_eq!(playback.current().await, None);
        assert_eq!(node.plays(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_guards_reject_outsiders_and_announce() {
        let node = Arc::new(FakeNode::default());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut messenger = MockMessenger::new();
        let log = sent.clone();
        messenger.expect_send_message().returning(move |_, content| {
            log.lock().push(content);
            Ok(())
        });
        let mut states = MockVoiceStateCache::new();
        states.expect_bot_user_id().return_const(BOT);
        states
            .expect_user_channel()
            .returning(|_, user| {
                if user == ALICE || user == BOT {
                    Some(VOICE)
                } else {
                    Some(ChannelId::new(11))
                }
            });
        states.expect_occupants().returning(|_, _| vec![ALICE, BOT]);
        let playback = spawn_with(node, messenger, states, ServiceSettings::default());
        let bob = UserId::new(7);

        assert!(!playback.verify_can_manage_playback(ALICE, TEXT).await);
        playback.receive_new_listing(song("a"), VOICE, TEXT).await.unwrap();
        assert!(playback.verify_can_manage_playback(ALICE, TEXT).await);
        assert!(playback.verify_voice_state(bob, TEXT, VoiceCheck::Presence).await);
        assert!(!playback.verify_voice_state(bob, TEXT, VoiceCheck::Manage).await);

        let sent = sent.lock().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("mismo canal"));
    }

    #[tokio::test]
    async fn test_outage_rejects_requests_then_recovers() {
        let node = Arc::new(FakeNode::default());
        let playback = spawn(node.clone());
        playback.receive_new_listing(song("a"), VOICE, TEXT).await.unwrap();

        playback.node_event(NodeEvent::Disconnected);
        let during = playback.receive_new_listing(song("b"), VOICE, TEXT).await;
        assert!(matches!(during, Err(PlaybackError::NodeUnavailable)));
        assert!(!playback.verify_can_request_playback(ALICE, TEXT).await);

        playback.node_event(NodeEvent::Reconnected);
        assert_eq!(title(playback.current().await), Some("a".into()));
        assert_eq!(node.plays(), vec!["a", "a"]);
        assert_eq!(node.players_created.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_tears_down_session() {
        let node = Arc::new(FakeNode::default());
        let playback = spawn(node.clone());
        playback.receive_new_listing(song("a"), VOICE, TEXT).await.unwrap();
        let mut rx = playback.subscribe().await.unwrap();

        playback.node_event(track("a", finished));
        assert!(playback.is_occupied().await);

        tokio::time::sleep(ServiceSettings::default().idle_timeout + Duration::from_secs(1)).await;
        assert!(!playback.is_occupied().await);
        assert!(node.calls().contains(&Call::Destroy));

        let mut saw_stop = false;
        while let Ok(event) = rx.recv().await {
            saw_stop |= event == SessionEvent::Stop;
        }
        assert!(saw_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_listing_cancels_idle_timer() {
        let node = Arc::new(FakeNode::default());
        let playback = spawn(node.clone());
        playback.receive_new_listing(song("a"), VOICE, TEXT).await.unwrap();
        playback.node_event(track("a", finished));
        assert!(playback.is_occupied().await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        playback.receive_new_listing(song("b"), VOICE, TEXT).await.unwrap();
        tokio::time::sleep(ServiceSettings::default().idle_timeout * 2).await;

        assert_eq!(title(playback.current().await), Some("b".into()));
    }

    #[tokio::test]
    async fn test_abandoned_channel_tears_down() {
        let node = Arc::new(FakeNode::default());
        let mut states = MockVoiceStateCache::new();
        states.expect_bot_user_id().return_const(BOT);
        states.expect_user_channel().returning(|_, _| Some(VOICE));
        states.expect_occupants().returning(|_, _| vec![BOT]);
        let playback = spawn_with(node.clone(), quiet_messenger(), states, ServiceSettings::default());
        playback.receive_new_listing(song("a"), VOICE, TEXT).await.unwrap();

        playback.voice_state_changed(ALICE, None);
        assert!(!playback.is_occupied().await);
        assert!(node.calls().contains(&Call::Destroy));
    }

    #[tokio::test]
    async fn test_stop_without_session_is_an_error() {
        let playback = spawn(Arc::new(FakeNode::default()));
        assert!(matches!(playback.stop().await, Err(PlaybackError::NoSession)));
    }
}
