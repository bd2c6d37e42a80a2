use serenity::{
    cache::Cache,
    model::{
        id::{ChannelId, GuildId, UserId},
        voice::VoiceState,
    },
};
use std::sync::Arc;

use crate::audio::player::ListenerRoster;

/// Oyentes según los estados de voz cacheados por serenity
pub struct SerenityRoster {
    cache: Arc<Cache>,
}

impl SerenityRoster {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    fn is_bot(&self, state: &VoiceState) -> bool {
        state
            .member
            .as_ref()
            .map(|member| member.user.bot)
            .or_else(|| self.cache.user(state.user_id).map(|user| user.bot))
            .unwrap_or(false)
    }
}

impl ListenerRoster for SerenityRoster {
    fn listeners(&self, guild: GuildId, channel: ChannelId) -> Vec<UserId> {
        let Some(guild) = self.cache.guild(guild) else {
            return Vec::new();
        };

        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel))
            .filter(|state| !self.is_bot(state))
            .map(|state| state.user_id)
            .collect()
    }
}
