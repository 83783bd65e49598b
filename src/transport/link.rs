use async_trait::async_trait;
use parking_lot::Mutex;
use songbird::{
    events::{context_data::DisconnectKind, CoreEvent},
    Call, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use std::sync::Arc;
use tracing::{error, info};

use super::pcm_pipe::PcmPipe;
use crate::error::TransportError;

/// Estado de la conexión de voz vista por el pipe de salida
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Aún no se ha entrado a un canal, o se salió a propósito
    Idle,
    Connected,
    /// El driver de voz se cayó con la sesión en marcha
    Lost,
}

/// Pipe PCM con el estado de la conexión que lo consume.
///
/// Mientras no haya canal el audio se acumula y la contrapresión frena al
/// loop. Si la conexión se pierde, el pipe se vacía (para que nadie quede
/// esperando una ocupación que no baja) y cada envío falla.
#[derive(Debug)]
pub struct VoiceLink {
    pipe: Arc<PcmPipe>,
    state: Mutex<LinkState>,
}

impl VoiceLink {
    pub fn new(pipe: Arc<PcmPipe>) -> Arc<Self> {
        Arc::new(Self {
            pipe,
            state: Mutex::new(LinkState::Idle),
        })
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    pub fn send_frame(&self, pcm: &[u8]) -> Result<(), TransportError> {
        if self.state() == LinkState::Lost {
            return Err(TransportError::NotConnected);
        }
        self.pipe.push_frame(pcm);
        Ok(())
    }

    pub fn occupancy_seconds(&self) -> f64 {
        self.pipe.occupancy_seconds()
    }

    pub fn connected(&self) {
        *self.state.lock() = LinkState::Connected;
    }

    /// Salida voluntaria: descarta el audio sin marcar error
    pub fn idle(&self) {
        *self.state.lock() = LinkState::Idle;
        self.pipe.clear();
    }

    /// Caída del driver. Solo cuenta si había una conexión establecida.
    pub fn lost(&self) {
        let mut state = self.state.lock();
        if *state == LinkState::Connected {
            *state = LinkState::Lost;
            self.pipe.clear();
            error!("❌ Conexión de voz perdida, audio pendiente descartado");
        }
    }
}

/// Escucha los eventos del driver de songbird y actualiza el [`VoiceLink`]
pub struct LinkWatcher {
    link: Arc<VoiceLink>,
}

impl LinkWatcher {
    /// Registra el vigilante en la llamada para conexión, reconexión y caída
    pub fn register(call: &mut Call, link: &Arc<VoiceLink>) {
        for event in [
            CoreEvent::DriverConnect,
            CoreEvent::DriverReconnect,
            CoreEvent::DriverDisconnect,
        ] {
            call.add_global_event(VoiceEvent::Core(event), Self { link: link.clone() });
        }
    }
}

#[async_trait]
impl VoiceEventHandler for LinkWatcher {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        match ctx {
            EventContext::DriverDisconnect(data) => {
                // Un fallo al conectar ya lo reporta `join`
                if matches!(data.kind, DisconnectKind::Runtime | DisconnectKind::Reconnect) {
                    self.link.lost();
                }
            }
            EventContext::DriverConnect(_) | EventContext::DriverReconnect(_) => {
                if self.link.state() == LinkState::Lost {
                    info!("🔊 Driver de voz reconectado");
                }
                self.link.connected();
            }
            _ => {}
        }
        None
    }
}
