use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{
    collaborators::Messenger,
    events::SessionEvent,
    listings::ListingManager,
    node::{AudioNode, PlayerHandle, PlayerState, ResolvedTrack, TrackEvent},
    playable::SongListing,
};
use crate::error::{PlaybackError, Result};

/// Hasta dónde llega una navegación cuando lo actual es una colección
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// La colección entera cuenta como un solo elemento
    #[default]
    Listing,
    /// Navegar canción por canción dentro de la colección
    Song,
}

/// Offsets 1-based, tal como los escribe el usuario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// Relativo: `By(1)` es el siguiente (o el anterior)
    By(usize),
    /// Absoluto: posición en la lista mostrada
    To(usize),
}

impl Default for Offset {
    fn default() -> Self {
        Offset::By(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Song,
    Collection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub is_disconnected: bool,
    pub loop_song: bool,
    pub loop_collection: bool,
    pub break_loop_once: bool,
}

/// Result of anything that may have moved playback along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Se mandó a reproducir un track
    Playing,
    /// No quedó nada: la sesión está ociosa
    Idle,
    /// Se pidió al nodo detener el track; su evento de fin hará avanzar
    Pending,
    Unchanged,
}

enum LoadOutcome {
    Played,
    Failed,
}

enum CollectionStep {
    Replay,
    Restart,
    Retire,
    Next,
}

/// Estado que sobrevive a una reconexión del nodo
pub struct SessionParts {
    pub listings: ListingManager,
    pub flags: SessionFlags,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
    pub restore_at_offset_ms: u64,
    pub player_state: PlayerState,
    loaded: Option<ResolvedTrack>,
    loop_restore: Option<SessionFlags>,
}

/// Vista de solo lectura para comandos y pantallas
#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub voice_channel: ChannelId,
    pub current: Option<SongListing>,
    pub queue: Vec<SongListing>,
    pub history: Vec<SongListing>,
    pub flags: SessionFlags,
    pub paused: bool,
    pub volume: u16,
    pub position_ms: u64,
    pub playing_since: Option<DateTime<Utc>>,
}

/// Binds one guild's listings to one voice connection and one node player.
///
/// A session is driven only from its guild worker, so `&mut self` methods
/// never run concurrently.
pub struct Session {
    guild_id: GuildId,
    listings: ListingManager,
    voice_channel: ChannelId,
    text_channel: ChannelId,
    player: Box<dyn PlayerHandle>,
    node: Arc<dyn AudioNode>,
    messenger: Arc<dyn Messenger>,
    flags: SessionFlags,
    /// Track cargado en el player ahora mismo
    loaded: Option<ResolvedTrack>,
    /// Listeners one-shot de fin/excepción armados
    listening: bool,
    exception_reported: bool,
    started_at: Instant,
    restore_at_offset_ms: u64,
    /// Flags a restaurar en el próximo inicio de track (tras un replay)
    loop_restore: Option<SessionFlags>,
    recovering: bool,
    consecutive_failures: usize,
}

impl Session {
    pub fn new(
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        listings: ListingManager,
        player: Box<dyn PlayerHandle>,
        node: Arc<dyn AudioNode>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            guild_id,
            listings,
            voice_channel,
            text_channel,
            player,
            node,
            messenger,
            flags: SessionFlags::default(),
            loaded: None,
            listening: false,
            exception_reported: false,
            started_at: Instant::now(),
            restore_at_offset_ms: 0,
            loop_restore: None,
            recovering: false,
            consecutive_failures: 0,
        }
    }

    /// Rebuilds a session around a fresh player handle after a reconnect.
    pub fn from_parts(
        guild_id: GuildId,
        parts: SessionParts,
        player: Box<dyn PlayerHandle>,
        node: Arc<dyn AudioNode>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let mut session = Self::new(
            guild_id,
            parts.voice_channel,
            parts.text_channel,
            parts.listings,
            player,
            node,
            messenger,
        );
        session.flags = SessionFlags {
            is_disconnected: false,
            ..parts.flags
        };
        session.restore_at_offset_ms = parts.restore_at_offset_ms;
        session.loaded = parts.loaded;
        session.loop_restore = parts.loop_restore;
        session
    }

    /// Separa lo reutilizable; el player viejo se descarta
    pub fn into_parts(self) -> SessionParts {
        SessionParts {
            player_state: self.player.state(),
            listings: self.listings,
            flags: self.flags,
            voice_channel: self.voice_channel,
            text_channel: self.text_channel,
            restore_at_offset_ms: self.restore_at_offset_ms,
            loaded: self.loaded,
            loop_restore: self.loop_restore,
        }
    }

    // Accesores

    pub fn listings(&self) -> &ListingManager {
        &self.listings
    }

    pub fn current(&self) -> Option<&SongListing> {
        self.listings.current()
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn voice_channel(&self) -> ChannelId {
        self.voice_channel
    }

    pub fn set_voice_channel(&mut self, channel_id: ChannelId) {
        self.voice_channel = channel_id;
    }

    pub fn text_channel(&self) -> ChannelId {
        self.text_channel
    }

    pub fn is_disconnected(&self) -> bool {
        self.flags.is_disconnected
    }

    pub fn is_idle(&self) -> bool {
        self.listings.current().is_none()
    }

    pub fn restore_at_offset_ms(&self) -> u64 {
        self.restore_at_offset_ms
    }

    /// Posición estimada del track actual
    pub fn position_ms(&self) -> u64 {
        if self.loaded.is_none() {
            return 0;
        }
        if self.player.state().paused || self.flags.is_disconnected {
            return self.restore_at_offset_ms;
        }
        self.restore_at_offset_ms + self.started_at.elapsed().as_millis() as u64
    }

    pub fn playing_since(&self) -> Option<DateTime<Utc>> {
        self.loaded.as_ref()?;
        let position = chrono::Duration::milliseconds(self.position_ms() as i64);
        Some(Utc::now() - position)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let state = self.player.state();
        PlaybackSnapshot {
            voice_channel: self.voice_channel,
            current: self.listings.current().cloned(),
            queue: self.listings.queue().to_vec(),
            history: self.listings.history().to_vec(),
            flags: self.flags,
            paused: state.paused,
            volume: state.volume,
            position_ms: self.position_ms(),
            playing_since: self.playing_since(),
        }
    }

    pub fn enqueue(&mut self, listing: SongListing) -> Result<()> {
        let capacity = self.listings.queue().capacity();
        self.listings
            .enqueue(listing)
            .map_err(|_| PlaybackError::QueueFull { capacity })
    }

    /// Retira lo actual (si corresponde) y carga lo siguiente.
    ///
    /// Loops instead of recursing: a finished collection or a track that fails
    /// to resolve falls straight through to the next candidate.
    pub async fn advance_queue_and_play(&mut self) -> Advance {
        loop {
            if !self.flags.loop_song
                && self
                    .listings
                    .current()
                    .is_some_and(|listing| !listing.playable.is_collection())
            {
                self.listings.move_current_to_history();
            }
            if self.listings.current().is_none() && !self.listings.queue().is_empty() {
                self.listings.take_current_from_queue();
            }

            match self.collection_step() {
                Some(CollectionStep::Replay) | None => {}
                Some(CollectionStep::Restart) => {
                    if let Some(collection) = self.current_collection_mut() {
                        collection.set_position(0);
                    }
                }
                Some(CollectionStep::Next) => {
                    if let Some(collection) = self.current_collection_mut() {
                        collection.step_forward();
                    }
                }
                Some(CollectionStep::Retire) => {
                    self.listings.move_current_to_history();
                    continue;
                }
            }

            if self.listings.current().is_none() {
                info!("📭 Cola vacía en guild {}", self.guild_id);
                self.loaded = None;
                self.listening = false;
                return Advance::Idle;
            }

            match self.load_current().await {
                LoadOutcome::Played => return Advance::Playing,
                LoadOutcome::Failed => continue,
            }
        }
    }

    fn collection_step(&mut self) -> Option<CollectionStep> {
        let collection = self.listings.current()?.playable.as_collection()?;
        let step = if self.flags.loop_song && collection.current_song().is_some() {
            CollectionStep::Replay
        } else if collection.is_at_last() {
            if self.flags.loop_collection && !collection.is_empty() {
                if self.consecutive_failures >= collection.len() {
                    warn!(
                        "🔁 Ninguna canción de '{}' se pudo cargar, se desactiva el loop",
                        collection.title
                    );
                    self.flags.loop_collection = false;
                    CollectionStep::Retire
                } else {
                    CollectionStep::Restart
                }
            } else {
                CollectionStep::Retire
            }
        } else {
            CollectionStep::Next
        };
        Some(step)
    }

    fn current_collection_mut(&mut self) -> Option<&mut super::playable::SongCollection> {
        self.listings.current_mut()?.playable.as_collection_mut()
    }

    /// Resuelve y reproduce lo que apunta el listing actual
    async fn load_current(&mut self) -> LoadOutcome {
        let Some((query, title)) = self
            .listings
            .current()
            .and_then(|listing| listing.playable.track())
            .map(|track| (track.url().to_string(), track.title().to_string()))
        else {
            error!("Listing actual sin track reproducible en guild {}", self.guild_id);
            self.resolution_failed("?", "sin canción seleccionada").await;
            return LoadOutcome::Failed;
        };

        let resolved = match self.node.resolve(&query).await {
            Ok(result) => match result.playable_track() {
                Some(track) => track.clone(),
                None => {
                    let reason = result.message.unwrap_or_else(|| "sin resultados".to_string());
                    self.resolution_failed(&title, &reason).await;
                    return LoadOutcome::Failed;
                }
            },
            Err(e) => {
                self.resolution_failed(&title, &e.to_string()).await;
                return LoadOutcome::Failed;
            }
        };

        if let Some(listing) = self.listings.current_mut() {
            listing.playable.apply_resolved_title(&resolved.title);
        }

        self.exception_reported = false;
        self.listening = true;
        if let Err(e) = self.player.play(&resolved).await {
            error!("❌ El nodo rechazó el play en guild {}: {:?}", self.guild_id, e);
            self.listening = false;
            self.loaded = None;
            self.resolution_failed(&title, &e.to_string()).await;
            return LoadOutcome::Failed;
        }

        info!("🎵 Reproduciendo: {} en guild {}", resolved.title, self.guild_id);
        self.loaded = Some(resolved);
        self.consecutive_failures = 0;
        self.restore_at_offset_ms = 0;
        self.started_at = Instant::now();
        LoadOutcome::Played
    }

    async fn resolution_failed(&mut self, title: &str, reason: &str) {
        warn!("⚠️ No se pudo cargar '{}' en guild {}: {}", title, self.guild_id, reason);
        self.flags.loop_song = false;
        self.consecutive_failures += 1;
        self.announce(format!("⚠️ No se pudo cargar **{}**, saltando", title)).await;
        self.listings.events().emit(SessionEvent::QueueUpdate);
    }

    /// Entrada de los eventos del player del nodo
    pub async fn handle_track_event(&mut self, event: TrackEvent) -> Advance {
        match event {
            TrackEvent::Start { encoded } => {
                if !self.is_loaded(&encoded) {
                    debug!("Inicio de track ajeno ignorado en guild {}", self.guild_id);
                    return Advance::Unchanged;
                }
                if let Some(saved) = self.loop_restore.take() {
                    self.flags.loop_song = saved.loop_song;
                    self.flags.loop_collection = saved.loop_collection;
                }
                self.started_at = Instant::now();
                if self.recovering {
                    self.recovering = false;
                } else {
                    self.restore_at_offset_ms = 0;
                    if let Some(listing) = self.listings.current() {
                        let message = now_playing_message(listing);
                        self.announce(message).await;
                    }
                }
                self.listings.events().emit(SessionEvent::QueueUpdate);
                Advance::Playing
            }
            TrackEvent::End { encoded, reason } => {
                if !reason.may_start_next() {
                    debug!("Fin de track por {:?} ignorado", reason);
                    return Advance::Unchanged;
                }
                if self.flags.break_loop_once {
                    self.flags.break_loop_once = false;
                    debug!("Fin de track absorbido por replay en guild {}", self.guild_id);
                    return Advance::Unchanged;
                }
                if !self.listening || !self.is_loaded(&encoded) {
                    return Advance::Unchanged;
                }
                self.listening = false;
                self.advance_queue_and_play().await
            }
            TrackEvent::Exception { encoded, message } => {
                if self.listening && self.is_loaded(&encoded) {
                    self.playback_exception(&message).await;
                }
                Advance::Unchanged
            }
            TrackEvent::Stuck { encoded, threshold_ms } => {
                if !self.listening || !self.is_loaded(&encoded) {
                    return Advance::Unchanged;
                }
                self.playback_exception(&format!("sin audio por {threshold_ms} ms"))
                    .await;
                self.stop_loaded().await
            }
            TrackEvent::VoiceClosed { code, reason } => {
                warn!(
                    "🔌 El nodo perdió la voz en guild {} ({}): {}",
                    self.guild_id, code, reason
                );
                Advance::Unchanged
            }
        }
    }

    /// Se reporta una sola vez por carga de track
    async fn playback_exception(&mut self, message: &str) {
        if self.exception_reported {
            debug!("Excepción repetida ignorada en guild {}: {}", self.guild_id, message);
            return;
        }
        self.exception_reported = true;
        let title = self
            .listings
            .current()
            .map(|listing| listing.title().to_string())
            .unwrap_or_default();
        error!("❌ Error en track '{}' en guild {}: {}", title, self.guild_id, message);
        self.flags.loop_song = false;
        self.announce(format!("⚠️ Error durante la reproducción de **{}**: {}", title, message))
            .await;
        self.listings.events().emit(SessionEvent::QueueUpdate);
    }

    fn is_loaded(&self, encoded: &str) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|track| track.encoded == encoded)
    }

    /// Detiene el track; si no había nada cargado avanza directamente
    async fn stop_loaded(&mut self) -> Advance {
        if !(self.listening && self.loaded.is_some()) {
            return self.advance_queue_and_play().await;
        }
        match self.player.stop().await {
            Ok(()) => Advance::Pending,
            Err(e) => {
                error!("❌ Error al detener el track en guild {}: {:?}", self.guild_id, e);
                self.listening = false;
                self.advance_queue_and_play().await
            }
        }
    }

    pub async fn skip(&mut self, scope: Scope, offset: Offset) -> Result<Advance> {
        let Some(listing) = self.listings.current() else {
            return Err(PlaybackError::NothingPlaying);
        };
        let within = listing
            .playable
            .as_collection()
            .filter(|collection| scope == Scope::Song && !collection.is_at_last())
            .map(|collection| (collection.position(), collection.len() as i64));
        let is_collection = listing.playable.is_collection();

        match within {
            Some((position, len)) => {
                self.flags.loop_song = false;
                // El avance suma uno al cursor: apuntamos al anterior del destino
                let target = match offset {
                    Offset::By(n) => position + n.max(1) as i64 - 1,
                    Offset::To(k) => k.max(1) as i64 - 2,
                };
                if target + 1 >= len {
                    self.flags.loop_collection = false;
                    self.listings.move_current_to_history();
                } else if let Some(collection) = self.current_collection_mut() {
                    collection.set_position(target);
                }
            }
            None => {
                if is_collection {
                    self.flags.loop_collection = false;
                }
                self.flags.loop_song = false;
                // Solo si se saltó la colección entera o un listing suelto
                let extra = if is_collection && scope == Scope::Song {
                    0
                } else {
                    match offset {
                        Offset::By(n) => n.saturating_sub(1),
                        Offset::To(k) => k.saturating_sub(1),
                    }
                };
                self.listings.move_current_to_history();
                let skipped = self.listings.move_from_queue_to_history(extra);
                if skipped > 0 {
                    debug!("⏭️ {} pendientes saltados en guild {}", skipped, self.guild_id);
                }
            }
        }

        info!("⏭️ Skip en guild {}", self.guild_id);
        Ok(self.stop_loaded().await)
    }

    /// Devuelve `None` si no había nada que restaurar.
    ///
    /// With a full pending queue the current listing has nowhere to go, so the
    /// call is refused with `QueueFull` and nothing moves.
    pub async fn unskip(&mut self, scope: Scope, offset: Offset) -> Result<Option<Advance>> {
        let within = self
            .listings
            .current()
            .and_then(|listing| listing.playable.as_collection())
            .filter(|collection| scope == Scope::Song && collection.position() > 0)
            .map(|collection| collection.position());

        if let Some(position) = within {
            self.flags.loop_song = false;
            let target = match offset {
                Offset::By(n) => position - n.max(1) as i64 - 1,
                Offset::To(k) => k.max(1) as i64 - 2,
            };
            if let Some(collection) = self.current_collection_mut() {
                collection.set_position(target);
            }
            info!("⏮️ Unskip dentro de colección en guild {}", self.guild_id);
            return Ok(Some(self.stop_loaded().await));
        }

        let history_len = self.listings.history().len();
        if history_len == 0 {
            return Ok(None);
        }
        let count = match offset {
            Offset::By(n) => n.max(1),
            Offset::To(k) => history_len + 1 - k.clamp(1, history_len),
        };

        self.flags.loop_song = false;
        if self.listings.current().is_some() {
            // El cursor se compensa igual que al pasar al historial
            if let Some(collection) = self.current_collection_mut() {
                collection.step_back();
            }
            if !self.listings.move_current_to_queue() {
                if let Some(collection) = self.current_collection_mut() {
                    collection.step_forward();
                }
                let capacity = self.listings.queue().capacity();
                return Err(PlaybackError::QueueFull { capacity });
            }
        }
        let restored = self.listings.move_from_history_to_queue(count);
        info!("⏮️ {} elementos restaurados del historial en guild {}", restored, self.guild_id);

        Ok(Some(self.stop_loaded().await))
    }

    /// Vuelve a empezar la canción (o la colección) actual
    pub async fn replay(&mut self, scope: Scope) -> Result<Advance> {
        let Some(listing) = self.listings.current() else {
            return Err(PlaybackError::NothingPlaying);
        };
        let collection_len = listing
            .playable
            .as_collection()
            .filter(|_| scope == Scope::Listing)
            .map(|collection| collection.len());

        if self.loop_restore.is_none() {
            self.loop_restore = Some(self.flags);
        }
        match collection_len {
            Some(len) => {
                self.flags.loop_collection = true;
                self.flags.loop_song = false;
                if let Some(collection) = self.current_collection_mut() {
                    collection.set_position(len as i64 - 1);
                }
            }
            None => self.flags.loop_song = true,
        }
        self.restore_at_offset_ms = 0;

        if self.listening && self.loaded.is_some() {
            self.flags.break_loop_once = true;
            self.listening = false;
            if let Err(e) = self.player.stop().await {
                warn!("Error al detener para replay en guild {}: {:?}", self.guild_id, e);
                self.flags.break_loop_once = false;
            }
        }
        info!("🔄 Replay en guild {}", self.guild_id);
        Ok(self.advance_queue_and_play().await)
    }

    pub async fn skip_to(&mut self, position_ms: u64) -> Result<()> {
        if self.loaded.is_none() {
            return Err(PlaybackError::NothingPlaying);
        }
        self.player.seek(position_ms).await?;
        self.restore_at_offset_ms = position_ms;
        self.started_at = Instant::now();
        debug!("⏩ Seek a {} ms en guild {}", position_ms, self.guild_id);
        Ok(())
    }

    pub async fn set_paused(&mut self, paused: bool) -> Result<()> {
        let was_paused = self.player.state().paused;
        if was_paused == paused {
            return Ok(());
        }
        let position = self.position_ms();
        self.player.set_paused(paused).await?;
        if paused {
            self.restore_at_offset_ms = position;
        } else {
            self.started_at = Instant::now();
        }
        info!(
            "{} en guild {}",
            if paused { "⏸️ Pausado" } else { "▶️ Reanudado" },
            self.guild_id
        );
        self.listings.events().emit(SessionEvent::QueueUpdate);
        Ok(())
    }

    pub async fn set_volume(&mut self, volume: u16) -> Result<()> {
        let volume = volume.min(1000);
        self.player.set_volume(volume).await?;
        info!("🔊 Volumen {}% en guild {}", volume, self.guild_id);
        Ok(())
    }

    pub fn set_loop(&mut self, mode: LoopMode, enabled: bool) {
        match mode {
            LoopMode::Song => self.flags.loop_song = enabled,
            LoopMode::Collection => self.flags.loop_collection = enabled,
        }
        // Un cambio explícito pisa la restauración pendiente de un replay
        if let Some(saved) = self.loop_restore.as_mut() {
            match mode {
                LoopMode::Song => saved.loop_song = enabled,
                LoopMode::Collection => saved.loop_collection = enabled,
            }
        }
        self.listings.events().emit(SessionEvent::QueueUpdate);
    }

    /// El nodo se cayó: se congela la posición y se desarman los listeners
    pub fn mark_disconnected(&mut self) {
        if self.flags.is_disconnected {
            return;
        }
        if self.loaded.is_some() && !self.player.state().paused {
            self.restore_at_offset_ms += self.started_at.elapsed().as_millis() as u64;
        }
        self.flags.is_disconnected = true;
        self.listening = false;
        info!(
            "🔌 Sesión de guild {} desconectada en {}",
            self.guild_id,
            humantime::format_duration(Duration::from_millis(self.restore_at_offset_ms))
        );
    }

    /// Recarga el track actual sobre el player nuevo y salta a la posición
    /// guardada.
    pub async fn resume(&mut self) -> Advance {
        let Some(title) = self.listings.current().map(|l| l.title().to_string()) else {
            return Advance::Idle;
        };
        let Some(track) = self.loaded.clone() else {
            return match self.load_current().await {
                LoadOutcome::Played => Advance::Playing,
                LoadOutcome::Failed => self.advance_queue_and_play().await,
            };
        };

        let offset = self.restore_at_offset_ms;
        self.exception_reported = false;
        self.listening = true;
        if let Err(e) = self.player.play(&track).await {
            error!("❌ No se pudo recargar el track en guild {}: {:?}", self.guild_id, e);
            self.listening = false;
            self.loaded = None;
            self.restore_at_offset_ms = 0;
            self.resolution_failed(&title, &e.to_string()).await;
            return self.advance_queue_and_play().await;
        }
        if offset > 0 {
            if let Err(e) = self.player.seek(offset).await {
                warn!("Error al restaurar la posición en guild {}: {:?}", self.guild_id, e);
            }
        }
        self.recovering = true;
        self.started_at = Instant::now();
        info!(
            "🔄 Reanudando '{}' en guild {} desde {}",
            title,
            self.guild_id,
            humantime::format_duration(Duration::from_millis(offset))
        );
        self.announce(format!("🔄 Reanudando **{}**", title)).await;
        Advance::Playing
    }

    /// Termina la sesión: detiene el player y avisa a los oyentes
    pub async fn destroy(self) {
        if !self.flags.is_disconnected {
            if let Err(e) = self.player.destroy().await {
                warn!("Error al destruir el player de guild {}: {:?}", self.guild_id, e);
            }
        }
        self.listings.events().emit(SessionEvent::Stop);
        info!("⏹️ Sesión de guild {} destruida", self.guild_id);
    }

    pub async fn announce(&self, content: String) {
        if let Err(e) = self.messenger.send_message(self.text_channel, content).await {
            warn!("Error al enviar mensaje en guild {}: {:?}", self.guild_id, e);
        }
    }
}

fn now_playing_message(listing: &SongListing) -> String {
    match listing.playable.as_collection() {
        Some(collection) => format!(
            "🎶 Reproduciendo: {} ({}/{}: **{}**)",
            listing.describe(),
            collection.position() + 1,
            collection.len(),
            collection.current_song().map(|s| s.title.as_str()).unwrap_or("?")
        ),
        None => format!("🎶 Reproduciendo: {}", listing.describe()),
    }
}
