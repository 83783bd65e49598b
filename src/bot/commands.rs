use anyhow::Result;
use std::collections::HashMap;

/// Acciones que el bot entiende por texto.
///
/// Los nombres escritos en el chat son alias configurables; se resuelven una
/// sola vez al arrancar mediante [`CommandTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    PlayFile,
    Enqueue,
    Stop,
    StopAndLeave,
    Kill,
    JoinMe,
    Volume,
    Filter,
    CurrentMusic,
    List,
    Skip,
    TextToSpeech,
    Help,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::PlayFile,
        Command::Enqueue,
        Command::Stop,
        Command::StopAndLeave,
        Command::Kill,
        Command::JoinMe,
        Command::Volume,
        Command::Filter,
        Command::CurrentMusic,
        Command::List,
        Command::Skip,
        Command::TextToSpeech,
        Command::Help,
    ];

    /// Clave en la sección `[commands]` de la configuración
    pub fn key(self) -> &'static str {
        match self {
            Command::PlayFile => "play_file",
            Command::Enqueue => "enqueue",
            Command::Stop => "stop",
            Command::StopAndLeave => "stop_and_leave",
            Command::Kill => "kill",
            Command::JoinMe => "joinme",
            Command::Volume => "volume",
            Command::Filter => "filter",
            Command::CurrentMusic => "current_music",
            Command::List => "list",
            Command::Skip => "skip",
            Command::TextToSpeech => "tts",
            Command::Help => "help",
        }
    }

    pub fn default_alias(self) -> &'static str {
        match self {
            Command::PlayFile => "play",
            Command::Enqueue => "add",
            Command::Stop => "stop",
            Command::StopAndLeave => "oust",
            Command::Kill => "kill",
            Command::JoinMe => "joinme",
            Command::Volume => "v",
            Command::Filter => "filter",
            Command::CurrentMusic => "np",
            Command::List => "list",
            Command::Skip => "skip",
            Command::TextToSpeech => "tts",
            Command::Help => "help",
        }
    }

    pub fn requires_argument(self) -> bool {
        matches!(
            self,
            Command::PlayFile | Command::Enqueue | Command::TextToSpeech
        )
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

/// Alias del chat → [`Command`], fijado al arrancar.
#[derive(Debug, Clone)]
pub struct CommandTable {
    by_alias: HashMap<String, Command>,
    aliases: HashMap<Command, String>,
}

impl CommandTable {
    /// Construye la tabla a partir de los alias configurados.
    ///
    /// Los comandos sin alias configurado usan [`Command::default_alias`].
    /// Falla ante claves desconocidas, alias vacíos o alias repetidos.
    pub fn from_aliases(overrides: &HashMap<String, String>) -> Result<Self> {
        for key in overrides.keys() {
            if Command::from_key(key).is_none() {
                anyhow::bail!("Unknown command key in [commands]: '{}'", key);
            }
        }

        let mut by_alias = HashMap::new();
        let mut aliases = HashMap::new();

        for command in Command::ALL {
            let alias = overrides
                .get(command.key())
                .map(|a| a.trim().to_string())
                .unwrap_or_else(|| command.default_alias().to_string());

            if alias.is_empty() || alias.contains(char::is_whitespace) {
                anyhow::bail!("Invalid alias '{}' for command '{}'", alias, command.key());
            }

            if let Some(previous) = by_alias.insert(alias.clone(), command) {
                anyhow::bail!(
                    "Alias '{}' is used by both '{}' and '{}'",
                    alias,
                    previous.key(),
                    command.key()
                );
            }
            aliases.insert(command, alias);
        }

        Ok(Self { by_alias, aliases })
    }

    pub fn resolve(&self, token: &str) -> Option<Command> {
        self.by_alias.get(token).copied()
    }

    pub fn alias_of(&self, command: Command) -> &str {
        self.aliases
            .get(&command)
            .map(String::as_str)
            .unwrap_or(command.default_alias())
    }

    /// Alias en el orden de [`Command::ALL`]
    pub fn aliases(&self) -> Vec<&str> {
        Command::ALL.into_iter().map(|c| self.alias_of(c)).collect()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        let by_alias = Command::ALL
            .into_iter()
            .map(|c| (c.default_alias().to_string(), c))
            .collect();
        let aliases = Command::ALL
            .into_iter()
            .map(|c| (c, c.default_alias().to_string()))
            .collect();
        Self { by_alias, aliases }
    }
}

/// Separa `<prefijo><comando> <argumento>`.
///
/// Devuelve `None` si el texto no empieza por el prefijo. El argumento es
/// todo lo que sigue al primer espacio, sin modificar; vacío cuenta como
/// ausente.
pub fn parse<'a>(prefix: &str, text: &'a str) -> Option<(&'a str, Option<&'a str>)> {
    let body = text.strip_prefix(prefix)?;

    match body.split_once(char::is_whitespace) {
        Some((token, rest)) => {
            let rest = rest.trim();
            let argument = (!rest.is_empty()).then_some(rest);
            Some((token, argument))
        }
        None => Some((body, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_splits_on_first_whitespace() {
        assert_eq!(
            parse("!", "!tts hola a  todos"),
            Some(("tts", Some("hola a  todos")))
        );
        assert_eq!(parse("!", "!stop"), Some(("stop", None)));
        assert_eq!(parse("!", "!v   "), Some(("v", None)));
    }

    #[test]
    fn test_parse_trims_argument_edges() {
        assert_eq!(
            parse("!", "!play rock/a.mp3 \t"),
            Some(("play", Some("rock/a.mp3")))
        );
        assert_eq!(parse("!", "!v  40 "), Some(("v", Some("40"))));
    }

    #[test]
    fn test_parse_ignores_unprefixed_text() {
        assert_eq!(parse("!", "hola"), None);
        assert_eq!(parse("!", ""), None);
        assert_eq!(parse("::", "!play x"), None);
    }

    #[test]
    fn test_default_table_resolves_every_command() {
        let table = CommandTable::from_aliases(&HashMap::new()).unwrap();
        for command in Command::ALL {
            assert_eq!(table.resolve(command.default_alias()), Some(command));
        }
        assert_eq!(table.resolve("nope"), None);
    }

    #[test]
    fn test_overrides_replace_default_alias() {
        let overrides = HashMap::from([("play_file".to_string(), "p".to_string())]);
        let table = CommandTable::from_aliases(&overrides).unwrap();

        assert_eq!(table.resolve("p"), Some(Command::PlayFile));
        assert_eq!(table.resolve("play"), None);
        assert_eq!(table.alias_of(Command::PlayFile), "p");
    }

    #[test]
    fn test_rejects_unknown_key_and_clashes() {
        let unknown = HashMap::from([("shuffle".to_string(), "sh".to_string())]);
        assert!(CommandTable::from_aliases(&unknown).is_err());

        // "stop" ya es el alias por defecto de Stop
        let clash = HashMap::from([("skip".to_string(), "stop".to_string())]);
        assert!(CommandTable::from_aliases(&clash).is_err());

        let blank = HashMap::from([("skip".to_string(), "  ".to_string())]);
        assert!(CommandTable::from_aliases(&blank).is_err());
    }

    #[test]
    fn test_default_matches_empty_overrides() {
        let table = CommandTable::default();
        assert_eq!(table.aliases().len(), Command::ALL.len());
        assert_eq!(table.alias_of(Command::CurrentMusic), "np");
    }
}
