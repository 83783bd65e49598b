use async_trait::async_trait;
use std::{path::PathBuf, process::Stdio, time::Duration};
use tokio::{
    io::AsyncReadExt,
    process::{Child, ChildStdout, Command},
    time::{timeout, Instant},
};
use tracing::{debug, info, warn};

use crate::{error::DecodeError, sources::TrackRef};

/// Frecuencia de muestreo de todo el pipeline
pub const SAMPLE_RATE: u32 = 48_000;
/// El audio sale mono del decodificador
pub const CHANNELS: u32 = 1;
/// Bytes por muestra s16le
pub const BYTES_PER_SAMPLE: usize = 2;

/// Tiempo máximo para que un proceso muerto sea recogido
const KILL_WAIT: Duration = Duration::from_millis(500);

/// Resultado de leer un frame del decodificador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRead {
    /// `n` bytes PCM válidos al inicio del buffer (siempre un número par)
    Data(usize),
    /// No llegó nada dentro del plazo de lectura, pero el proceso sigue vivo
    Pending,
    /// Fin del stream: EOF, error de lectura o proceso caído
    Eof,
}

/// Stream PCM de un decodificador en curso. Pertenece a una sola pista.
#[async_trait]
pub trait PcmStream: Send {
    /// Llena `buf` con PCM. Nunca bloquea más allá del plazo de lectura.
    async fn read_frame(&mut self, buf: &mut [u8]) -> FrameRead;

    /// Termina el proceso y libera recursos. Seguro sobre un proceso ya terminado.
    async fn kill(&mut self);
}

/// Fábrica de decodificadores: una instancia por pista.
#[async_trait]
pub trait DecoderBackend: Send + Sync {
    async fn start(&self, track: &TrackRef, filter: &str)
        -> Result<Box<dyn PcmStream>, DecodeError>;
}

/// Decodificador basado en un proceso `ffmpeg` que emite s16le mono a 48 kHz.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    binary: PathBuf,
    debug: bool,
    read_timeout: Duration,
}

impl FfmpegDecoder {
    pub fn new(debug: bool, read_timeout: Duration) -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            debug,
            read_timeout,
        }
    }

    /// Argumentos de la invocación para una pista y filtro dados
    fn args(&self, track: &TrackRef, filter: &str) -> Vec<String> {
        let log_level = if self.debug { "debug" } else { "warning" };
        let mut args = vec![
            "-v".to_string(),
            log_level.to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            track.path().to_string_lossy().into_owned(),
        ];

        if !filter.is_empty() {
            args.push("-filter:a".to_string());
            args.push(filter.to_string());
        }

        args.extend([
            "-ac".to_string(),
            CHANNELS.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl DecoderBackend for FfmpegDecoder {
    async fn start(
        &self,
        track: &TrackRef,
        filter: &str,
    ) -> Result<Box<dyn PcmStream>, DecodeError> {
        let stderr = if self.debug {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(&self.binary)
            .args(self.args(track, filter))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or(DecodeError::MissingStdout)?;
        info!("🎼 ffmpeg lanzado para {} (pid {:?})", track, child.id());

        Ok(Box::new(FfmpegStream {
            label: track.to_string(),
            child: Some(child),
            stdout: Some(stdout),
            read_timeout: self.read_timeout,
            carry: None,
        }))
    }
}

/// Salida de un proceso ffmpeg en curso
struct FfmpegStream {
    label: String,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    read_timeout: Duration,
    /// Byte suelto de una lectura impar, pendiente para el siguiente frame
    carry: Option<u8>,
}

impl FfmpegStream {
    /// Recoge el proceso y registra salidas anómalas
    async fn reap(&mut self) {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return;
        };

        let _ = child.start_kill();
        match timeout(KILL_WAIT, child.wait()).await {
            Ok(Ok(status)) if status.success() => debug!("ffmpeg terminó: {}", self.label),
            Ok(Ok(status)) => debug!("ffmpeg terminó con {} para {}", status, self.label),
            Ok(Err(e)) => warn!("⚠️ Error esperando a ffmpeg ({}): {}", self.label, e),
            Err(_) => warn!("⚠️ ffmpeg no terminó a tiempo: {}", self.label),
        }
    }
}

#[async_trait]
impl PcmStream for FfmpegStream {
    async fn read_frame(&mut self, buf: &mut [u8]) -> FrameRead {
        let Some(stdout) = self.stdout.as_mut() else {
            return FrameRead::Eof;
        };

        let mut filled = 0;
        if let Some(byte) = self.carry.take() {
            buf[0] = byte;
            filled = 1;
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut ended = false;

        while filled < buf.len() {
            match tokio::time::timeout_at(deadline, stdout.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    ended = true;
                    break;
                }
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => {
                    // Un stream ilegible cuenta como fin de pista
                    warn!("⚠️ Error leyendo de ffmpeg ({}): {}", self.label, e);
                    ended = true;
                    break;
                }
                Err(_) => break,
            }
        }

        if ended {
            self.reap().await;
        }

        // Solo se entregan muestras completas
        if filled % BYTES_PER_SAMPLE != 0 {
            filled -= 1;
            if !ended {
                self.carry = Some(buf[filled]);
            }
        }

        match (filled, ended) {
            (0, true) => FrameRead::Eof,
            (0, false) => FrameRead::Pending,
            (n, _) => FrameRead::Data(n),
        }
    }

    async fn kill(&mut self) {
        if self.child.is_some() {
            info!("🛑 Deteniendo ffmpeg: {}", self.label);
        }
        self.reap().await;
    }
}
