use async_trait::async_trait;
use regex::Regex;
use std::{path::Path, process::Stdio, sync::LazyLock};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::info;

use crate::{audio::decoder::SAMPLE_RATE, error::SpeechError};

/// Caracteres permitidos en el nombre de archivo derivado del usuario
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("regex válida"));

/// Sintetizador de texto a voz que escribe un archivo de audio
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError>;
}

/// `text2wave` de festival: lee el texto por stdin y escribe un WAV
#[derive(Debug, Clone, Default)]
pub struct Text2Wave;

#[async_trait]
impl SpeechSynth for Text2Wave {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError> {
        let mut child = Command::new("text2wave")
            .arg("-F")
            .arg(SAMPLE_RATE.to_string())
            .arg("-o")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            // Cerrar stdin para que text2wave empiece a sintetizar
            drop(stdin);
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(SpeechError::Exit(status));
        }

        info!("🗣️ Voz sintetizada en {}", output.display());
        Ok(())
    }
}

/// Nombre de archivo seguro para la voz de un usuario
pub fn speech_file_name(speaker: &str) -> String {
    let clean = UNSAFE_CHARS.replace_all(speaker, "_");
    let clean = if clean.is_empty() { "anon".into() } else { clean };
    format!("{}.wav", clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_file_name_is_sanitized() {
        assert_eq!(speech_file_name("ana"), "ana.wav");
        assert_eq!(speech_file_name("../../root"), "______root.wav");
        assert_eq!(speech_file_name("José María"), "Jos__Mar_a.wav");
        assert_eq!(speech_file_name(""), "anon.wav");
    }
}
