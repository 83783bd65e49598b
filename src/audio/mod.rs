//! # Audio Module
//!
//! Reproducción de archivos locales hacia el canal de voz.
//!
//! ## Architecture
//!
//! ### [`player`] - Control Loop
//! - Marca el ritmo de entrega contra la ocupación del buffer del transporte
//! - Único dueño del decodificador activo
//! - Avanza la playlist cuando el decodificador se queda sin datos
//!
//! ### [`queue`] - Playback State
//! - Pista actual, playlist FIFO, volumen y filtro
//! - Transiciones serializadas bajo un único lock
//!
//! ### [`decoder`] - Decoder Adapter
//! - Un proceso `ffmpeg` por pista, cancelable e idempotente al matarlo
//!
//! ### [`effects`] / [`speech`]
//! - Ganancia lineal con saturación y filtros `-filter:a` con nombre
//! - Síntesis de voz con `text2wave`
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz
//! - **Bit Depth**: 16-bit signed, little-endian
//! - **Channels**: mono

pub mod decoder;
pub mod effects;
pub mod player;
pub mod queue;
pub mod speech;
