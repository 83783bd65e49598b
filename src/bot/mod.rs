//! # Bot Module
//!
//! Discord event handling for the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. Once the guild
//! cache is ready it:
//!
//! - builds the [`DiscordTransport`] for the configured guild
//! - applies the session identity (comment, bitrate, home channel)
//! - spawns the audio [`ControlLoop`] on the shared [`TaskTracker`]
//!
//! Text messages are then forwarded to the [`Dispatcher`].

use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Message, Ready},
    async_trait,
};
use std::sync::{Arc, OnceLock};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{
        decoder::FfmpegDecoder,
        player::{ControlLoop, LoopTiming},
        queue::SharedState,
        speech::Text2Wave,
    },
    config::Config,
    transport::{discord::DiscordTransport, Sender, Transport},
};
use handlers::Dispatcher;

/// Conexión activa con la guild: transporte y despachador de comandos
struct Session {
    guild_id: GuildId,
    transport: Arc<DiscordTransport>,
    dispatcher: Dispatcher,
}

/// Main Discord event handler.
///
/// The bot serves a single guild. The session is built on the first
/// `cache_ready` and kept for the lifetime of the process; gateway
/// reconnections reuse it.
pub struct JukeboxBot {
    config: Arc<Config>,
    state: SharedState,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    session: OnceLock<Session>,
}

impl JukeboxBot {
    pub fn new(
        config: Arc<Config>,
        state: SharedState,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            config,
            state,
            shutdown,
            tracker,
            session: OnceLock::new(),
        }
    }

    fn target_guild(&self, guilds: &[GuildId]) -> Option<GuildId> {
        match self.config.bot.guild_id {
            0 => guilds.first().copied(),
            id => Some(GuildId::new(id)),
        }
    }

    async fn open_session(&self, ctx: &Context, guild_id: GuildId) -> anyhow::Result<Session> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no está registrado en el cliente"))?;

        let bot = &self.config.bot;
        let transport = Arc::new(DiscordTransport::new(
            ctx.clone(),
            manager,
            guild_id,
            bot.bandwidth,
        ));

        let dispatcher = Dispatcher::new(
            &self.config,
            self.state.clone(),
            transport.clone(),
            Arc::new(Text2Wave),
            self.shutdown.clone(),
        )?;

        Ok(Session {
            guild_id,
            transport,
            dispatcher,
        })
    }

    /// Comentario, bitrate y canal de inicio
    async fn apply_identity(&self, transport: &DiscordTransport) {
        let bot = &self.config.bot;

        if let Err(e) = transport.set_comment(&bot.comment).await {
            warn!("⚠️ No se pudo fijar el comentario: {}", e);
        }
        if let Err(e) = transport.set_bandwidth_cap(bot.bandwidth).await {
            warn!("⚠️ No se pudo fijar el bitrate: {}", e);
        }
        if let Some(home) = &bot.home_channel {
            if let Err(e) = transport.move_to_channel(home).await {
                warn!("⚠️ No se pudo entrar al canal de inicio '{}': {}", home, e);
            }
        }
    }

    fn spawn_control_loop(&self, transport: Arc<DiscordTransport>) {
        let config = &self.config;
        let backend = FfmpegDecoder::new(
            config.debug.ffmpeg,
            std::time::Duration::from_millis(config.audio.read_timeout_ms),
        );

        let control = ControlLoop::new(
            self.state.clone(),
            transport.clone(),
            Arc::new(backend),
            LoopTiming::from(&config.audio),
            config.bot.frame_size,
            self.shutdown.clone(),
        );

        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            if let Err(e) = control.run().await {
                error!("❌ Sesión de voz perdida: {}", e);
                shutdown.cancel();
            }
            transport.leave().await;
        });
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        ctx.set_activity(Some(ActivityData::custom(&self.config.bot.comment)));
    }

    /// Builds the session once every guild is in the cache, so channel
    /// lookups by name work from the start.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        if self.session.get().is_some() {
            info!("🔄 Gateway reconectado, sesión existente reutilizada");
            return;
        }

        let Some(guild_id) = self.target_guild(&guilds) else {
            error!("❌ El bot no está en ninguna guild");
            self.shutdown.cancel();
            return;
        };

        let session = match self.open_session(&ctx, guild_id).await {
            Ok(session) => session,
            Err(e) => {
                error!("❌ No se pudo iniciar la sesión: {:?}", e);
                self.shutdown.cancel();
                return;
            }
        };

        let transport = session.transport.clone();
        if self.session.set(session).is_err() {
            return;
        }

        self.apply_identity(&transport).await;
        self.spawn_control_loop(transport);
        info!("🎶 Sesión lista en guild {}", guild_id);
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(session) = self.session.get() else {
            return;
        };

        match msg.guild_id {
            Some(guild_id) if guild_id != session.guild_id => return,
            Some(_) => session.transport.note_reply_channel(msg.channel_id),
            // Mensajes privados
            None => {}
        }

        let sender = Sender::new(msg.author.id.get(), msg.author.name.clone());
        session.dispatcher.dispatch(&msg.content, &sender).await;
    }
}
