use anyhow::Result;
use clap::Parser;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::{path::PathBuf, sync::Arc};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod shutdown;
mod sources;
mod transport;
mod ui;

use crate::audio::{effects::FilterSet, queue::PlaybackState};
use crate::bot::JukeboxBot;
use crate::config::Config;

/// Bot de voz que reproduce archivos locales en un canal de Discord
#[derive(Parser, Debug)]
#[command(name = "vox-jukebox")]
#[command(version)]
struct Cli {
    /// Archivo de configuración (por defecto `configuration.*` en el directorio actual)
    #[arg(short, long, env = "JUKEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Canal de voz al que entrar al arrancar
    #[arg(long)]
    channel: Option<String>,

    /// Verifica las dependencias externas y termina
    #[arg(long)]
    health_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vox_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Manejar health check si es necesario
    if cli.health_check {
        return health_check().await;
    }

    info!("🎵 Iniciando Vox Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(channel) = cli.channel {
        config.bot.home_channel = Some(channel);
    }
    if config.bot.discord_token.is_empty() {
        anyhow::bail!("Falta el token de Discord (JUKEBOX__BOT__DISCORD_TOKEN)");
    }
    info!("{}", config.summary());
    let config = Arc::new(config);

    let state = PlaybackState::new(
        config.bot.default_volume,
        config.bot.filter.clone(),
        FilterSet::new(config.filters.clone()),
    )
    .into_shared();

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::DIRECT_MESSAGES;

    let handler = JukeboxBot::new(config.clone(), state, shutdown.clone(), tracker.clone());

    // Construir cliente
    let mut client = Client::builder(&config.bot.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;
    let shard_manager = client.shard_manager.clone();

    // Manejar shutdown: la primera señal vacía el audio, la segunda sale ya
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        shutdown::escalate(watcher, shutdown::wait_for_signal).await;
        std::process::exit(1);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    let mut client_task = tokio::spawn(async move { client.start().await });

    let mut transport_failed = false;
    tokio::select! {
        result = &mut client_task => {
            match result {
                Ok(Ok(())) => warn!("⚠️ El cliente de Discord terminó"),
                Ok(Err(why)) => error!("Error al ejecutar cliente: {:?}", why),
                Err(why) => error!("La tarea del cliente falló: {:?}", why),
            }
            transport_failed = true;
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    // Esperar a que el loop de audio vacíe el buffer y salga del canal
    tracker.close();
    tracker.wait().await;
    shard_manager.shutdown_all().await;

    if transport_failed {
        anyhow::bail!("Conexión con Discord perdida");
    }

    info!("👋 Apagado completo");
    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if !ffmpeg.status.success() {
        anyhow::bail!("Dependencias faltantes: ffmpeg");
    }

    // text2wave solo es necesario para el comando de voz
    let text2wave = async_process::Command::new("which")
        .arg("text2wave")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false);

    if !text2wave {
        warn!("⚠️ text2wave no encontrado: el comando de voz fallará");
    }

    println!("OK");
    Ok(())
}
