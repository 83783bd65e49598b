use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, info};

use crate::{audio::effects::FilterSet, error::StateError, sources::TrackRef};

/// Estado de reproducción compartido entre el loop de control y el despachador.
///
/// El lock se toma solo durante una transición y nunca a través de un `await`.
pub type SharedState = Arc<Mutex<PlaybackState>>;

/// Pista en reproducción y el instante en que empezó
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: TrackRef,
    pub started_at: Instant,
}

impl NowPlaying {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Orden pendiente para el loop de control.
///
/// El despachador nunca toca el proceso decodificador: deja la orden aquí y
/// el loop, dueño exclusivo del decodificador, la ejecuta en su siguiente
/// iteración.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    /// Reemplazar el decodificador por uno para `current`
    Restart,
    /// Matar el decodificador activo
    Halt,
}

/// Transición que el loop debe aplicar al decodificador
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Start { track: TrackRef, filter: String },
    Halt,
}

#[derive(Debug)]
pub struct PlaybackState {
    current: Option<NowPlaying>,
    playlist: VecDeque<TrackRef>,
    volume: f32,
    filter: String,
    filters: FilterSet,
    directive: Option<Directive>,
}

impl PlaybackState {
    pub fn new(volume: f32, filter: impl Into<String>, filters: FilterSet) -> Self {
        Self {
            current: None,
            playlist: VecDeque::new(),
            volume: volume.clamp(0.0, 1.0),
            filter: filter.into(),
            filters,
            directive: None,
        }
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    /// Agrega al final de la playlist
    pub fn enqueue(&mut self, track: TrackRef) {
        info!("➕ Agregado a la playlist: {}", track);
        self.playlist.push_back(track);
    }

    /// Reemplaza lo que suena por `track`, sin tocar la playlist
    pub fn play_now(&mut self, track: TrackRef) {
        info!("▶️ Reproducción inmediata: {}", track);
        self.set_current(track);
        self.directive = Some(Directive::Restart);
    }

    /// Salta a la cabeza de la playlist; con la playlist vacía equivale a [`stop`](Self::stop).
    pub fn skip(&mut self) -> Option<TrackRef> {
        match self.playlist.pop_front() {
            Some(next) => {
                info!("⏭️ Saltando a: {}", next);
                self.set_current(next.clone());
                self.directive = Some(Directive::Restart);
                Some(next)
            }
            None => {
                self.stop();
                None
            }
        }
    }

    /// Idempotente: limpia pista actual y playlist, y pide matar el decodificador.
    pub fn stop(&mut self) {
        self.clear();
        self.directive = Some(Directive::Halt);
    }

    /// Avance por inanición del decodificador: saca la cabeza de la playlist
    /// o, si está vacía, deja el estado ocioso.
    pub fn advance(&mut self) -> Option<Transition> {
        match self.playlist.pop_front() {
            Some(next) => {
                info!("➡️ Siguiente en playlist: {}", next);
                self.set_current(next.clone());
                Some(Transition::Start {
                    track: next,
                    filter: self.filter_expression(),
                })
            }
            None => {
                if self.current.is_some() {
                    info!("📭 Playlist vacía, en reposo");
                }
                self.clear();
                None
            }
        }
    }

    /// Consume la orden pendiente, resuelta contra el estado actual
    pub fn take_transition(&mut self) -> Option<Transition> {
        let directive = self.directive.take()?;
        match (directive, &self.current) {
            (Directive::Restart, Some(now)) => Some(Transition::Start {
                track: now.track.clone(),
                filter: self.filter_expression(),
            }),
            _ => Some(Transition::Halt),
        }
    }

    pub fn has_pending_transition(&self) -> bool {
        self.directive.is_some()
    }

    /// Cambia el volumen. Solo acepta valores en `[0, 1]`.
    pub fn set_volume(&mut self, volume: f32) -> Result<(), StateError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(StateError::VolumeOutOfRange(volume));
        }
        self.volume = volume;
        debug!("🔊 Volumen: {:.2}", volume);
        Ok(())
    }

    /// Cambia el filtro. Aplica a partir de la siguiente pista que se decodifique.
    pub fn set_filter(&mut self, name: &str) -> Result<(), StateError> {
        if !self.filters.contains(name) {
            return Err(StateError::UnknownFilter {
                requested: name.to_string(),
                current: self.filter.clone(),
                valid: self.filters.names(),
            });
        }
        self.filter = name.to_string();
        info!("🎛️ Filtro seleccionado: {}", name);
        Ok(())
    }

    pub fn current(&self) -> Option<&NowPlaying> {
        self.current.as_ref()
    }

    pub fn playlist_len(&self) -> usize {
        self.playlist.len()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Volumen como porcentaje entero
    pub fn volume_percent(&self) -> u32 {
        (self.volume * 100.0).round() as u32
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.names()
    }

    /// Expresión de ffmpeg del filtro seleccionado (vacía si no existe)
    pub fn filter_expression(&self) -> String {
        self.filters
            .expression(&self.filter)
            .unwrap_or_default()
            .to_string()
    }

    fn set_current(&mut self, track: TrackRef) {
        self.current = Some(NowPlaying {
            track,
            started_at: Instant::now(),
        });
    }

    fn clear(&mut self) {
        self.current = None;
        self.playlist.clear();
    }
}
