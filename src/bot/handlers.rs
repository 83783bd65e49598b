use anyhow::Result;
use std::{collections::HashSet, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::commands::{self, Command, CommandTable};
use crate::{
    audio::{
        queue::SharedState,
        speech::{speech_file_name, SpeechSynth},
    },
    config::{Config, Strings},
    error::{CommandError, SpeechError, StateError, TransportError},
    sources::MediaLibrary,
    transport::{Sender, Target, Transport},
    ui::messages::{batches, format_duration, render, LIST_BATCH_SIZE},
};

/// Traduce mensajes de texto en transiciones de [`SharedState`] y respuestas.
///
/// Nunca toca el decodificador: stop/skip/play solo dejan una orden en el
/// estado que el loop de control ejecuta en su siguiente iteración.
pub struct Dispatcher {
    table: CommandTable,
    prefix: String,
    strings: Strings,
    admins: HashSet<String>,
    home_channel: Option<String>,
    tts_folder: String,
    tts_limit: usize,
    library: MediaLibrary,
    state: SharedState,
    transport: Arc<dyn Transport>,
    speech: Arc<dyn SpeechSynth>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        state: SharedState,
        transport: Arc<dyn Transport>,
        speech: Arc<dyn SpeechSynth>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let bot = &config.bot;

        Ok(Self {
            table: CommandTable::from_aliases(&config.commands)?,
            prefix: bot.command_prefix.clone(),
            strings: config.strings.clone(),
            admins: bot.admins.iter().cloned().collect(),
            home_channel: bot.home_channel.clone(),
            tts_folder: bot.tts_folder.clone(),
            tts_limit: bot.tts_limit,
            library: MediaLibrary::new(bot.media_root.clone()),
            state,
            transport,
            speech,
            shutdown,
        })
    }

    /// Procesa un mensaje entrante. El texto sin prefijo se ignora.
    pub async fn dispatch(&self, text: &str, sender: &Sender) {
        let Some((token, argument)) = commands::parse(&self.prefix, text) else {
            return;
        };

        info!(
            "💬 {} - {} por {}",
            token,
            argument.unwrap_or(""),
            sender.name
        );

        let outcome = match self.table.resolve(token) {
            Some(command) => self.execute(command, argument, sender).await,
            None => Err(CommandError::UnknownCommand(token.to_string())),
        };

        if let Err(e) = outcome {
            self.report(e, sender).await;
        }
    }

    async fn execute(
        &self,
        command: Command,
        argument: Option<&str>,
        sender: &Sender,
    ) -> Result<(), CommandError> {
        if command.requires_argument() && argument.is_none() {
            return Err(CommandError::MissingArgument(
                self.table.alias_of(command).to_string(),
            ));
        }
        let arg = argument.unwrap_or_default();

        match command {
            Command::PlayFile => self.play_file(arg).await,
            Command::Enqueue => self.enqueue(arg, sender).await,
            Command::Stop => {
                self.state.lock().stop();
                Ok(())
            }
            Command::StopAndLeave => self.stop_and_leave().await,
            Command::Kill => self.kill(sender),
            Command::JoinMe => Ok(self.transport.move_to_user(sender).await?),
            Command::Volume => self.volume(argument, sender).await,
            Command::Filter => self.filter(argument, sender).await,
            Command::CurrentMusic => self.current_music(sender).await,
            Command::List => self.list(argument, sender).await,
            Command::Skip => {
                self.state.lock().skip();
                Ok(())
            }
            Command::TextToSpeech => self.text_to_speech(arg, sender).await,
            Command::Help => self.help(sender).await,
        }
    }

    async fn play_file(&self, argument: &str) -> Result<(), CommandError> {
        let track = self.library.resolve_file(argument).await?;
        self.state.lock().play_now(track);
        Ok(())
    }

    async fn enqueue(&self, argument: &str, sender: &Sender) -> Result<(), CommandError> {
        let track = self.library.resolve_file(argument).await?;
        let name = track.to_string();
        let position = {
            let mut state = self.state.lock();
            state.enqueue(track);
            state.playlist_len()
        };

        let reply = render(&self.strings.queued, &[&name, &position]);
        self.reply(&Target::User(sender.clone()), &reply).await;
        Ok(())
    }

    async fn stop_and_leave(&self) -> Result<(), CommandError> {
        self.state.lock().stop();
        if let Some(home) = &self.home_channel {
            self.transport.move_to_channel(home).await?;
        }
        Ok(())
    }

    fn kill(&self, sender: &Sender) -> Result<(), CommandError> {
        if !self.is_admin(sender) {
            return Err(CommandError::Unauthorized(sender.name.clone()));
        }

        warn!("☠️ Apagado solicitado por {}", sender.name);
        self.state.lock().stop();
        self.shutdown.cancel();
        Ok(())
    }

    async fn volume(&self, argument: Option<&str>, sender: &Sender) -> Result<(), CommandError> {
        let Some(argument) = argument else {
            let percent = self.state.lock().volume_percent();
            let reply = render(&self.strings.current_volume, &[&percent]);
            self.reply(&Target::User(sender.clone()), &reply).await;
            return Ok(());
        };

        // Solo dígitos: `parse` aceptaría "+5"
        let digits = argument.bytes().all(|b| b.is_ascii_digit());
        let percent = match argument.parse::<u32>() {
            Ok(percent) if digits && percent <= 100 => percent,
            _ => return Err(CommandError::InvalidVolume(argument.to_string())),
        };

        self.state.lock().set_volume(percent as f32 / 100.0)?;
        info!("🔊 Volumen al {}% por {}", percent, sender.name);

        let reply = render(&self.strings.change_volume, &[&percent, &sender.name]);
        self.reply(&Target::Channel, &reply).await;
        Ok(())
    }

    async fn filter(&self, argument: Option<&str>, sender: &Sender) -> Result<(), CommandError> {
        let Some(name) = argument else {
            let (current, valid) = {
                let state = self.state.lock();
                (state.filter().to_string(), state.filter_names().join(", "))
            };
            let reply = render(&self.strings.current_filter, &[&current, &valid]);
            self.reply(&Target::User(sender.clone()), &reply).await;
            return Ok(());
        };

        self.state.lock().set_filter(name)?;
        info!("🎛️ Filtro '{}' por {}", name, sender.name);

        let reply = render(&self.strings.change_filter, &[&name, &sender.name]);
        self.reply(&Target::Channel, &reply).await;
        Ok(())
    }

    async fn current_music(&self, sender: &Sender) -> Result<(), CommandError> {
        let now = self.state.lock().current().cloned();

        match now {
            Some(now) => {
                let elapsed = format_duration(now.elapsed());
                let reply = render(&self.strings.now_playing, &[&now.track, &elapsed]);
                self.reply(&Target::Channel, &reply).await;
            }
            None => {
                let reply = self.strings.not_playing.clone();
                self.reply(&Target::User(sender.clone()), &reply).await;
            }
        }
        Ok(())
    }

    async fn list(&self, argument: Option<&str>, sender: &Sender) -> Result<(), CommandError> {
        let entries = match argument {
            Some(folder) => self.library.list_dir(folder).await?,
            None => self.library.list_subfolders().await?,
        };

        let target = Target::User(sender.clone());
        if entries.is_empty() {
            self.reply(&target, &self.strings.empty_dir).await;
            return Ok(());
        }

        for batch in batches(&entries, LIST_BATCH_SIZE) {
            self.reply(&target, &batch).await;
        }
        Ok(())
    }

    async fn text_to_speech(&self, text: &str, sender: &Sender) -> Result<(), CommandError> {
        let len = text.chars().count();
        if len > self.tts_limit {
            return Err(CommandError::TextTooLong {
                len,
                limit: self.tts_limit,
            });
        }

        let folder = self.library.root().join(&self.tts_folder);
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(SpeechError::from)?;

        let file_name = speech_file_name(&sender.name);
        self.speech.synthesize(text, &folder.join(&file_name)).await?;

        let play = self.table.alias_of(Command::PlayFile);
        let reply = render(
            &self.strings.tts_success,
            &[&self.prefix, &play, &self.tts_folder, &file_name],
        );
        self.reply(&Target::User(sender.clone()), &reply).await;
        Ok(())
    }

    async fn help(&self, sender: &Sender) -> Result<(), CommandError> {
        let names = self
            .table
            .aliases()
            .iter()
            .map(|alias| format!("{}{}", self.prefix, alias))
            .collect::<Vec<_>>()
            .join(", ");

        let reply = render(&self.strings.help, &[&names]);
        self.reply(&Target::User(sender.clone()), &reply).await;
        Ok(())
    }

    fn is_admin(&self, sender: &Sender) -> bool {
        self.admins.contains(&sender.name) || self.admins.contains(&sender.id.to_string())
    }

    /// Convierte un error de comando en la respuesta que ve el usuario
    async fn report(&self, e: CommandError, sender: &Sender) {
        debug!("Comando rechazado para {}: {}", sender.name, e);
        let user = Target::User(sender.clone());
        let strings = &self.strings;

        let (target, reply) = match e {
            CommandError::Forbidden(_) => (Target::Channel, render(&strings.naughty, &[&sender.name])),
            CommandError::Unauthorized(_) => (user, strings.not_admin.clone()),
            CommandError::UnknownCommand(_) | CommandError::MissingArgument(_) => {
                (user, strings.bad_command.clone())
            }
            CommandError::InvalidVolume(_) | CommandError::State(StateError::VolumeOutOfRange(_)) => {
                let percent = self.state.lock().volume_percent();
                (user, render(&strings.bad_volume, &[&percent]))
            }
            CommandError::State(StateError::UnknownFilter { current, valid, .. }) => {
                let valid = valid.join(", ");
                (user, render(&strings.current_filter, &[&current, &valid]))
            }
            CommandError::NoFile(_) => (user, strings.no_file.clone()),
            CommandError::IsDirectory(_) => (user, strings.bad_file.clone()),
            CommandError::NoDirectory(_) => (user, strings.no_dir.clone()),
            CommandError::TextTooLong { limit, .. } => {
                (user, render(&strings.tts_longtext, &[&limit]))
            }
            CommandError::Speech(e) => {
                warn!("⚠️ Síntesis de voz fallida para {}: {}", sender.name, e);
                (user, strings.tts_failed.clone())
            }
            CommandError::Transport(TransportError::UserNotInVoice(_)) => {
                (user, strings.not_in_voice.clone())
            }
            CommandError::Transport(e) => {
                error!("❌ Error de transporte atendiendo a {}: {}", sender.name, e);
                return;
            }
        };

        self.reply(&target, &reply).await;
    }

    async fn reply(&self, target: &Target, message: &str) {
        if let Err(e) = self.transport.send_text(target, message).await {
            warn!("⚠️ No se pudo enviar respuesta: {}", e);
        }
    }
}
