//! # Bot Module
//!
//! Discord side of the playback engine: the serenity [`EventHandler`] that
//! forwards voice-state changes to the guild workers, and the serenity/songbird
//! implementations of the engine's collaborators in [`voice`].
//!
//! The [`PlaybackRegistry`] lives in the client's `TypeMap`; command handlers
//! fetch it from `ctx.data` and call into the per-guild handle.

use serenity::{
    all::{Context, EventHandler, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod voice;

use crate::audio::registry::PlaybackRegistry;

pub struct OpenMusicBot;

impl OpenMusicBot {
    async fn registry(ctx: &Context) -> Option<Arc<PlaybackRegistry>> {
        let data = ctx.data.read().await;
        data.get::<PlaybackRegistry>().cloned()
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        match Self::registry(&ctx).await {
            Some(registry) if !registry.is_node_available() => {
                warn!("⚠️ El nodo de audio todavía no está disponible")
            }
            Some(_) => {}
            None => warn!("⚠️ Registro de reproducción no inicializado"),
        }
    }

    /// Reenvía cada cambio al worker del guild, que decide si la sesión
    /// quedó abandonada.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(registry) = Self::registry(&ctx).await else {
            return;
        };
        debug!(
            "🎙️ Voice state en guild {}: {} -> {:?}",
            guild_id, new.user_id, new.channel_id
        );
        registry.voice_state_update(guild_id, new.user_id, new.channel_id);
    }
}
