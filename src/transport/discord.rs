use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::all::{ActivityData, ChannelId, ChannelType, Context, CreateMessage, GuildId, UserId};
use songbird::{
    driver::Bitrate,
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Songbird,
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use super::{
    link::{LinkWatcher, VoiceLink},
    pcm_pipe::{PcmPipe, PipeReader},
    Sender, Target, Transport,
};
use crate::{
    audio::decoder::{CHANNELS, SAMPLE_RATE},
    error::TransportError,
};

/// Transporte sobre una guild de Discord: texto vía serenity, voz vía songbird.
pub struct DiscordTransport {
    ctx: Context,
    manager: Arc<Songbird>,
    guild_id: GuildId,
    pipe: Arc<PcmPipe>,
    link: Arc<VoiceLink>,
    /// Pista continua que lee del pipe; se crea al primer join
    stream: tokio::sync::Mutex<Option<TrackHandle>>,
    bitrate: AtomicU32,
    /// Último canal de texto desde el que llegó un comando
    reply_channel: Mutex<Option<ChannelId>>,
}

impl DiscordTransport {
    pub fn new(ctx: Context, manager: Arc<Songbird>, guild_id: GuildId, bitrate: u32) -> Self {
        let pipe = PcmPipe::new();
        Self {
            ctx,
            manager,
            guild_id,
            link: VoiceLink::new(pipe.clone()),
            pipe,
            stream: tokio::sync::Mutex::new(None),
            bitrate: AtomicU32::new(bitrate),
            reply_channel: Mutex::new(None),
        }
    }

    /// Recuerda dónde contestar mientras el bot no esté en un canal de voz
    pub fn note_reply_channel(&self, channel_id: ChannelId) {
        *self.reply_channel.lock() = Some(channel_id);
    }

    /// Sale del canal de voz y descarta el audio pendiente
    pub async fn leave(&self) {
        if let Some(track) = self.stream.lock().await.take() {
            let _ = track.stop();
        }
        self.link.idle();
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Sin conexión de voz que cerrar: {:?}", e);
        }
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }

    async fn voice_channel(&self) -> Option<ChannelId> {
        let call = self.manager.get(self.guild_id)?;
        let channel = call.lock().await.current_channel();
        channel.map(|c| ChannelId::from(c.0))
    }

    async fn join(&self, channel_id: ChannelId) -> Result<(), TransportError> {
        let call = self
            .manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Voice(e.to_string()))?;

        let mut handler = call.lock().await;
        handler.set_bitrate(self.current_bitrate());

        let mut stream = self.stream.lock().await;
        if stream.is_none() {
            let input: Input =
                RawAdapter::new(PipeReader::new(self.pipe.clone()), SAMPLE_RATE, CHANNELS).into();
            *stream = Some(handler.play_input(input));
            LinkWatcher::register(&mut handler, &self.link);
            info!("🎚️ Stream PCM conectado al mezclador de voz");
        }

        self.link.connected();
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, self.guild_id);
        Ok(())
    }

    fn current_bitrate(&self) -> Bitrate {
        let bits = self.bitrate.load(Ordering::Relaxed);
        Bitrate::BitsPerSecond(i32::try_from(bits).unwrap_or(i32::MAX))
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn send_text(&self, target: &Target, message: &str) -> Result<(), TransportError> {
        match target {
            Target::Channel => {
                let channel = match self.voice_channel().await {
                    Some(channel) => channel,
                    None => (*self.reply_channel.lock()).ok_or(TransportError::NotConnected)?,
                };
                channel.say(&self.ctx.http, message).await?;
            }
            Target::User(user) => {
                UserId::new(user.id)
                    .direct_message(&self.ctx, CreateMessage::new().content(message))
                    .await?;
            }
        }
        Ok(())
    }

    fn send_audio_frame(&self, pcm: &[u8]) -> Result<(), TransportError> {
        self.link.send_frame(pcm)
    }

    fn buffer_occupancy_seconds(&self) -> f64 {
        self.link.occupancy_seconds()
    }

    async fn move_to_channel(&self, name: &str) -> Result<(), TransportError> {
        let channel_id = {
            let guild = self
                .ctx
                .cache
                .guild(self.guild_id)
                .ok_or(TransportError::GuildUnavailable)?;
            guild
                .channels
                .values()
                .find(|c| c.kind == ChannelType::Voice && c.name == name)
                .map(|c| c.id)
        };

        match channel_id {
            Some(channel_id) => self.join(channel_id).await,
            None => {
                warn!("⚠️ Canal de voz no encontrado: {}", name);
                Err(TransportError::ChannelNotFound(name.to_string()))
            }
        }
    }

    async fn move_to_user(&self, user: &Sender) -> Result<(), TransportError> {
        let channel_id = {
            let guild = self
                .ctx
                .cache
                .guild(self.guild_id)
                .ok_or(TransportError::GuildUnavailable)?;
            guild
                .voice_states
                .get(&UserId::new(user.id))
                .and_then(|voice_state| voice_state.channel_id)
        };

        let channel_id =
            channel_id.ok_or_else(|| TransportError::UserNotInVoice(user.name.clone()))?;
        self.join(channel_id).await
    }

    async fn set_comment(&self, text: &str) -> Result<(), TransportError> {
        self.ctx.set_activity(Some(ActivityData::custom(text)));
        Ok(())
    }

    async fn set_bandwidth_cap(&self, bits_per_second: u32) -> Result<(), TransportError> {
        self.bitrate.store(bits_per_second, Ordering::Relaxed);
        if let Some(call) = self.manager.get(self.guild_id) {
            call.lock().await.set_bitrate(self.current_bitrate());
        }
        info!("📶 Bitrate de voz: {} bps", bits_per_second);
        Ok(())
    }
}
