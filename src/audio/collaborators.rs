use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};

use super::node::VoiceConnection;
use crate::error::PlaybackError;

/// Conexión de voz a nivel de gateway de Discord
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        deafen: bool,
    ) -> Result<VoiceConnection, PlaybackError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), PlaybackError>;
}

/// Envío de mensajes al canal de texto. Fire-and-forget: quien llama solo
/// registra el error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, channel_id: ChannelId, content: String) -> anyhow::Result<()>;
}

/// Consultas de solo lectura sobre quién está en qué canal de voz
#[cfg_attr(test, mockall::automock)]
pub trait VoiceStateCache: Send + Sync {
    fn bot_user_id(&self) -> UserId;

    fn user_channel(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;

    fn occupants(&self, guild_id: GuildId, channel_id: ChannelId) -> Vec<UserId>;
}
