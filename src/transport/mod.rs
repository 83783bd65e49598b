//! # Transport Module
//!
//! Frontera con el protocolo de voz. El resto del bot solo ve el trait
//! [`Transport`]:
//!
//! - salida de audio PCM con nivel de buffer observable
//! - mensajes de texto al canal o a un usuario
//! - directorio de canales y usuarios (moverse de canal, seguir a alguien)
//! - identidad de la sesión (comentario, límite de ancho de banda)
//!
//! La implementación de producción es [`discord::DiscordTransport`], que
//! publica el PCM como una pista continua de songbird a través de
//! [`pcm_pipe::PcmPipe`]. [`link::VoiceLink`] sigue el estado del driver de
//! voz: una caída vacía el pipe y hace fallar los envíos.

pub mod discord;
pub mod link;
pub mod pcm_pipe;

use async_trait::async_trait;

use crate::error::TransportError;

/// Identidad del autor de un mensaje
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: u64,
    pub name: String,
}

impl Sender {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Destino de un mensaje de texto
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Canal en el que está el bot
    Channel,
    /// Mensaje privado
    User(Sender),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, target: &Target, message: &str) -> Result<(), TransportError>;

    /// Encola un frame PCM s16le mono a 48 kHz
    fn send_audio_frame(&self, pcm: &[u8]) -> Result<(), TransportError>;

    /// Audio encolado y aún no transmitido, en segundos
    fn buffer_occupancy_seconds(&self) -> f64;

    async fn move_to_channel(&self, name: &str) -> Result<(), TransportError>;

    /// Se mueve al canal de voz en el que está `user`
    async fn move_to_user(&self, user: &Sender) -> Result<(), TransportError>;

    async fn set_comment(&self, text: &str) -> Result<(), TransportError>;

    async fn set_bandwidth_cap(&self, bits_per_second: u32) -> Result<(), TransportError>;
}
