//! Tipos de error del bot.
//!
//! Cada familia corresponde a una forma distinta de recuperación:
//!
//! - [`CommandError`]: entrada de usuario inválida o no autorizada. Se
//!   convierte en una respuesta de texto y nunca detiene el loop de audio.
//! - [`StateError`]: una transición de estado rechazada (volumen fuera de
//!   rango, filtro desconocido). El estado queda intacto.
//! - [`DecodeError`]: fallo del proceso decodificador. Se trata como fin de
//!   stream y la reproducción avanza.
//! - [`TransportError`]: fallo de la conexión de voz. Fatal para la sesión.

use thiserror::Error;

/// Transición rechazada por [`crate::audio::queue::PlaybackState`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    #[error("volumen fuera de rango [0, 1]: {0}")]
    VolumeOutOfRange(f32),

    #[error("filtro desconocido '{requested}' (actual: '{current}')")]
    UnknownFilter {
        requested: String,
        current: String,
        valid: Vec<String>,
    },
}

/// Error de un comando de texto, recuperado localmente como respuesta.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Argumento con recorrido de directorios o ruta absoluta
    #[error("ruta prohibida: {0}")]
    Forbidden(String),

    /// Comando privilegiado invocado por alguien fuera de la lista de admins
    #[error("{0} no es administrador")]
    Unauthorized(String),

    #[error("comando desconocido: {0}")]
    UnknownCommand(String),

    #[error("falta el argumento del comando {0}")]
    MissingArgument(String),

    #[error("volumen inválido: {0}")]
    InvalidVolume(String),

    #[error("no existe el archivo: {0}")]
    NoFile(String),

    #[error("es un directorio, no un archivo: {0}")]
    IsDirectory(String),

    #[error("no existe el directorio: {0}")]
    NoDirectory(String),

    #[error("texto demasiado largo: {len} caracteres (límite {limit})")]
    TextTooLong { len: usize, limit: usize },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("síntesis de voz fallida: {0}")]
    Speech(#[from] SpeechError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Fallo al lanzar o leer el decodificador externo.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no se pudo lanzar el decodificador: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("el decodificador no expuso stdout")]
    MissingStdout,
}

/// Fallo del sintetizador de voz externo.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("error de E/S con el sintetizador: {0}")]
    Io(#[from] std::io::Error),

    #[error("el sintetizador terminó con estado {0}")]
    Exit(std::process::ExitStatus),
}

/// Fallo del transporte de voz.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no hay conexión de voz activa")]
    NotConnected,

    #[error("guild no disponible en caché")]
    GuildUnavailable,

    #[error("canal no encontrado: {0}")]
    ChannelNotFound(String),

    #[error("{0} no está en un canal de voz")]
    UserNotInVoice(String),

    #[error("error de voz: {0}")]
    Voice(String),

    #[error(transparent)]
    Discord(#[from] serenity::Error),
}
