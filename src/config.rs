use anyhow::Result;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use crate::bot::commands::CommandTable;

/// Prefijo de variables de entorno (`JUKEBOX__BOT__DISCORD_TOKEN`, ...)
const ENV_PREFIX: &str = "JUKEBOX";
/// Archivo de configuración buscado en el directorio actual si no se indica otro
const DEFAULT_CONFIG_FILE: &str = "configuration";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot: BotSettings,
    pub audio: AudioSettings,
    pub debug: DebugSettings,
    /// Nombre de filtro → expresión `-filter:a` de ffmpeg
    pub filters: BTreeMap<String, String>,
    /// Nombre interno del comando → alias escrito en el chat
    pub commands: HashMap<String, String>,
    pub strings: Strings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotSettings::default(),
            audio: AudioSettings::default(),
            debug: DebugSettings::default(),
            filters: default_filters(),
            commands: HashMap::new(),
            strings: Strings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    // Discord
    pub discord_token: String,
    pub guild_id: u64,

    // Identidad de la sesión
    pub home_channel: Option<String>,
    pub comment: String,
    pub bandwidth: u32, // bits por segundo

    // Biblioteca
    pub media_root: PathBuf,
    pub tts_folder: String,
    pub tts_limit: usize, // caracteres

    // Reproducción
    pub default_volume: f32,
    pub filter: String,
    pub frame_size: usize, // muestras por frame

    // Comandos
    pub admins: Vec<String>,
    pub command_prefix: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: 0,
            home_channel: None,
            comment: "🎵 Escribe !help para ver los comandos".to_string(),
            bandwidth: 200_000,
            media_root: "./music".into(),
            tts_folder: "tts".to_string(),
            tts_limit: 1000,
            default_volume: 0.1,
            filter: "normal".to_string(),
            frame_size: 960, // 20ms @ 48kHz
            admins: Vec::new(),
            command_prefix: "!".to_string(),
        }
    }
}

/// Ritmo del loop de audio
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub high_water_seconds: f64,
    pub backpressure_poll_ms: u64,
    pub idle_poll_ms: u64,
    pub read_timeout_ms: u64,
    pub drain_timeout_secs: u64,
    pub drain_settle_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            high_water_seconds: 0.5,
            backpressure_poll_ms: 10,
            idle_poll_ms: 100,
            read_timeout_ms: 50,
            drain_timeout_secs: 10,
            drain_settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    /// Log detallado de ffmpeg en stderr
    pub ffmpeg: bool,
}

/// Plantillas de respuesta. Cada `{}` se sustituye en orden.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Strings {
    pub naughty: String,
    pub bad_command: String,
    pub bad_volume: String,
    pub bad_file: String,
    pub no_file: String,
    pub no_dir: String,
    pub empty_dir: String,
    pub not_admin: String,
    pub queued: String,
    pub change_volume: String,
    pub current_volume: String,
    pub change_filter: String,
    pub current_filter: String,
    pub now_playing: String,
    pub not_playing: String,
    pub not_in_voice: String,
    pub tts_longtext: String,
    pub tts_success: String,
    pub tts_failed: String,
    pub help: String,
}

impl Default for Strings {
    fn default() -> Self {
        Self {
            naughty: "🚫 Buen intento, {}.".to_string(),
            bad_command: "❌ Comando no reconocido".to_string(),
            bad_volume: "❌ Volumen inválido: usa un entero de 0 a 100 (actual: {}%)".to_string(),
            bad_file: "❌ Eso es una carpeta, no un archivo".to_string(),
            no_file: "❌ Archivo no encontrado".to_string(),
            no_dir: "❌ Carpeta no encontrada".to_string(),
            empty_dir: "📭 La carpeta está vacía".to_string(),
            not_admin: "⛔ No tienes permiso para hacer eso".to_string(),
            queued: "➕ Agregado a la playlist: {} (#{})".to_string(),
            change_volume: "🔊 Volumen al {}% por {}".to_string(),
            current_volume: "🔊 Volumen actual: {}%".to_string(),
            change_filter: "🎛️ Filtro '{}' aplicado por {}".to_string(),
            current_filter: "🎛️ Filtro actual: {} (disponibles: {})".to_string(),
            now_playing: "🎵 {} ({})".to_string(),
            not_playing: "⏹️ No hay nada sonando".to_string(),
            not_in_voice: "❌ Debes estar en un canal de voz".to_string(),
            tts_longtext: "❌ Texto demasiado largo (máximo {} caracteres)".to_string(),
            tts_success: "🗣️ Voz lista: usa {}{} {}/{}".to_string(),
            tts_failed: "❌ No se pudo sintetizar la voz".to_string(),
            help: "📖 Comandos: {}".to_string(),
        }
    }
}

fn default_filters() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("normal".to_string(), "anull".to_string()),
        ("bass".to_string(), "bass=g=8".to_string()),
        ("nightcore".to_string(), "asetrate=48000*1.25,aresample=48000".to_string()),
        ("echo".to_string(), "aecho=0.8:0.88:60:0.4".to_string()),
    ])
}

impl Config {
    /// Carga la configuración por capas: valores por defecto, archivo
    /// (`configuration.toml` o el indicado) y variables `JUKEBOX__*`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => config::File::from(path),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(";")
                    .with_list_parse_key("bot.admins")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Default volume must be between 0.0 and 1.0
    /// - The filter set must not be empty and must contain the default filter
    /// - Frame size and command prefix must not be empty
    /// - Command aliases must be unique and name known commands
    pub fn validate(&self) -> Result<()> {
        let bot = &self.bot;

        if !(0.0..=1.0).contains(&bot.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", bot.default_volume);
        }

        if self.filters.is_empty() {
            anyhow::bail!("At least one audio filter must be configured");
        }

        if !self.filters.contains_key(&bot.filter) {
            anyhow::bail!(
                "Default filter '{}' is not one of: {}",
                bot.filter,
                self.filters.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        if bot.frame_size == 0 {
            anyhow::bail!("Frame size must be greater than 0");
        }

        if bot.command_prefix.is_empty() {
            anyhow::bail!("Command prefix cannot be empty");
        }

        if self.audio.high_water_seconds <= 0.0 {
            anyhow::bail!("High water mark must be positive, got: {}", self.audio.high_water_seconds);
        }

        CommandTable::from_aliases(&self.commands)?;

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: guild {} (home: {})\n  \
            Audio: {}% vol, filter '{}', {}ms frames, {} bps\n  \
            Library: {} (tts: {}, limit {} chars)\n  \
            Commands: prefix '{}', {} admins, {} filters",
            self.bot.guild_id,
            self.bot.home_channel.as_deref().unwrap_or("-"),
            (self.bot.default_volume * 100.0) as u32,
            self.bot.filter,
            (self.bot.frame_size as f32 / 48.0) as u32, // Convert to ms at 48kHz
            self.bot.bandwidth,
            self.bot.media_root.display(),
            self.bot.tts_folder,
            self.bot.tts_limit,
            self.bot.command_prefix,
            self.bot.admins.len(),
            self.filters.len(),
        )
    }
}
