//! Implementaciones de los colaboradores sobre serenity y songbird.

use async_trait::async_trait;
use serenity::{
    cache::Cache,
    http::Http,
    model::id::{ChannelId, GuildId, UserId},
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        collaborators::{Messenger, VoiceStateCache, VoiceTransport},
        node::VoiceConnection,
    },
    error::PlaybackError,
};

/// Songbird solo maneja el gateway de voz; el audio lo manda el nodo
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        deafen: bool,
    ) -> Result<VoiceConnection, PlaybackError> {
        let (info, call) = self
            .manager
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| PlaybackError::Voice(e.to_string()))?;

        if deafen {
            if let Err(e) = call.lock().await.deafen(true).await {
                warn!("No se pudo ensordecer al bot en guild {}: {:?}", guild_id, e);
            }
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(VoiceConnection {
            channel_id,
            endpoint: info.endpoint,
            token: info.token,
            session_id: info.session_id,
        })
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| PlaybackError::Voice(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}

pub struct HttpMessenger {
    http: Arc<Http>,
}

impl HttpMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn send_message(&self, channel_id: ChannelId, content: String) -> anyhow::Result<()> {
        channel_id.say(&self.http, content).await?;
        Ok(())
    }
}

/// Lee los estados de voz del caché de serenity
pub struct CacheVoiceStates {
    cache: Arc<Cache>,
    bot_id: UserId,
}

impl CacheVoiceStates {
    pub fn new(cache: Arc<Cache>, bot_id: UserId) -> Self {
        Self { cache, bot_id }
    }
}

impl VoiceStateCache for CacheVoiceStates {
    fn bot_user_id(&self) -> UserId {
        self.bot_id
    }

    fn user_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = self.cache.guild(guild_id)?;
        guild.voice_states.get(&user_id).and_then(|state| state.channel_id)
    }

    fn occupants(&self, guild_id: GuildId, channel_id: ChannelId) -> Vec<UserId> {
        self.cache
            .guild(guild_id)
            .map(|guild| {
                guild
                    .voice_states
                    .values()
                    .filter(|state| state.channel_id == Some(channel_id))
                    .map(|state| state.user_id)
                    .collect()
            })
            .unwrap_or_default()
    }
}
