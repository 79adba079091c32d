use anyhow::{Context, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use open_music::{
    audio::{
        lavalink_client::LavalinkNode,
        registry::PlaybackRegistry,
        service::{Collaborators, ServiceSettings},
    },
    bot::{
        voice::{CacheVoiceStates, HttpMessenger, SongbirdTransport},
        OpenMusicBot,
    },
    config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Intents mínimos: guilds + estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Songbird solo para el gateway de voz
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(OpenMusicBot)
        .register_songbird_with(songbird.clone())
        .await
        .context("Error al construir el cliente de Discord")?;

    let bot_id = client.http.get_current_user().await?.id;
    info!("🤖 Bot ID: {}", bot_id);

    // Nodo de audio
    info!("🎼 Inicializando Lavalink...");
    let node = Arc::new(LavalinkNode::new(&config)?);

    let collaborators = Collaborators {
        node: node.clone(),
        transport: Arc::new(SongbirdTransport::new(songbird)),
        messenger: Arc::new(HttpMessenger::new(client.http.clone())),
        voice_states: Arc::new(CacheVoiceStates::new(client.cache.clone(), bot_id)),
    };
    let registry = Arc::new(PlaybackRegistry::new(
        collaborators,
        ServiceSettings::from_config(&config),
    ));

    {
        let mut data = client.data.write().await;
        data.insert::<PlaybackRegistry>(registry.clone());
    }

    // Eventos del nodo hacia los workers de cada guild
    tokio::spawn(async move {
        node.listen(bot_id, move |event| registry.dispatch(event)).await;
    });

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
