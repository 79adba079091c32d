use dashmap::DashMap;
use serenity::{
    model::id::{ChannelId, GuildId, UserId},
    prelude::TypeMapKey,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info};

use super::{
    node::NodeEvent,
    service::{Collaborators, GuildPlayback, ServiceSettings},
};

/// Un worker por guild, creado la primera vez que se lo pide.
///
/// Node-wide events (link lost / restored) are fanned out to every worker;
/// player events go only to the guild they name.
pub struct PlaybackRegistry {
    workers: DashMap<GuildId, GuildPlayback>,
    collaborators: Collaborators,
    settings: ServiceSettings,
    node_available: AtomicBool,
}

impl PlaybackRegistry {
    pub fn new(collaborators: Collaborators, settings: ServiceSettings) -> Self {
        Self {
            workers: DashMap::new(),
            collaborators,
            settings,
            node_available: AtomicBool::new(true),
        }
    }

    /// Handle del guild; lanza el worker si todavía no existe
    pub fn guild(&self, guild_id: GuildId) -> GuildPlayback {
        self.workers
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Nuevo worker de reproducción para guild {}", guild_id);
                GuildPlayback::spawn(
                    guild_id,
                    self.collaborators.clone(),
                    self.settings.clone(),
                    self.node_available.load(Ordering::Acquire),
                )
            })
            .clone()
    }

    pub fn existing(&self, guild_id: GuildId) -> Option<GuildPlayback> {
        self.workers.get(&guild_id).map(|worker| worker.clone())
    }

    pub fn is_node_available(&self) -> bool {
        self.node_available.load(Ordering::Acquire)
    }

    pub fn dispatch(&self, event: NodeEvent) {
        match event {
            NodeEvent::Track { guild_id, .. } => match self.existing(guild_id) {
                Some(worker) => worker.node_event(event),
                None => debug!("Evento para guild {} sin worker, ignorado", guild_id),
            },
            NodeEvent::Disconnected | NodeEvent::Reconnected => {
                let available = event == NodeEvent::Reconnected;
                self.node_available.store(available, Ordering::Release);
                info!(
                    "{} Nodo {}: avisando a {} guilds",
                    if available { "✅" } else { "🔌" },
                    if available { "recuperado" } else { "caído" },
                    self.workers.len()
                );
                for worker in self.workers.iter() {
                    worker.node_event(event.clone());
                }
            }
        }
    }

    pub fn voice_state_update(&self, guild_id: GuildId, user_id: UserId, channel_id: Option<ChannelId>) {
        if let Some(worker) = self.existing(guild_id) {
            worker.voice_state_changed(user_id, channel_id);
        }
    }
}

impl TypeMapKey for PlaybackRegistry {
    type Value = Arc<PlaybackRegistry>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        collaborators::{MockVoiceStateCache, MockVoiceTransport},
        node::{EndReason, TrackEvent, VoiceConnection},
        session::tests::{quiet_messenger, song, FakeNode},
    };
    use crate::error::PlaybackError;
    use pretty_assertions::assert_eq;

    fn registry(node: Arc<FakeNode>) -> PlaybackRegistry {
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
        let mut states = MockVoiceStateCache::new();
        states.expect_bot_user_id().return_const(UserId::new(99));
        states.expect_user_channel().returning(|_, _| Some(ChannelId::new(10)));
        states
            .expect_occupants()
            .returning(|_, _| vec![UserId::new(1), UserId::new(99)]);

        PlaybackRegistry::new(
            Collaborators {
                node,
                transport: Arc::new(transport),
                messenger: Arc::new(quiet_messenger()),
                voice_states: Arc::new(states),
            },
            ServiceSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_guild_handles_are_reused() {
        let registry = registry(Arc::new(FakeNode::default()));
        let first = registry.guild(GuildId::new(1));
        first
            .receive_new_listing(song("a"), ChannelId::new(10), ChannelId::new(20))
            .await
            .unwrap();

        assert!(registry.guild(GuildId::new(1)).is_occupied().await);
        assert!(!registry.guild(GuildId::new(2)).is_occupied().await);
        assert!(registry.existing(GuildId::new(3)).is_none());
    }

    #[tokio::test]
    async fn test_track_events_are_routed_to_their_guild() {
        let node = Arc::new(FakeNode::default());
        let registry = registry(node.clone());
        let guild = registry.guild(GuildId::new(1));
        for title in ["a", "b"] {
            guild
                .receive_new_listing(song(title), ChannelId::new(10), ChannelId::new(20))
                .await
                .unwrap();
        }

        registry.dispatch(NodeEvent::Track {
            guild_id: GuildId::new(1),
            event: TrackEvent::End {
                encoded: "a".into(),
                reason: EndReason::Finished,
            },
        });
        let current = guild.current().await.map(|l| l.title().to_string());
        assert_eq!(current, Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_outage_reaches_workers_spawned_later() {
        let registry = registry(Arc::new(FakeNode::default()));
        registry.dispatch(NodeEvent::Disconnected);
        assert!(!registry.is_node_available());

        let late = registry.guild(GuildId::new(5));
        let result = late
            .receive_new_listing(song("a"), ChannelId::new(10), ChannelId::new(20))
            .await;
        assert!(matches!(result, Err(PlaybackError::NodeUnavailable)));

        registry.dispatch(NodeEvent::Reconnected);
        let result = late
            .receive_new_listing(song("a"), ChannelId::new(10), ChannelId::new(20))
            .await;
        assert!(result.is_ok());
    }
}
