use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        decoder::{DecoderBackend, FrameRead, PcmStream, BYTES_PER_SAMPLE},
        effects::apply_volume,
        queue::{SharedState, Transition},
    },
    config::AudioSettings,
    error::TransportError,
    sources::TrackRef,
    transport::Transport,
};

/// Parámetros de ritmo del loop
#[derive(Debug, Clone)]
pub struct LoopTiming {
    /// Ocupación máxima del buffer de salida antes de esperar, en segundos
    pub high_water_seconds: f64,
    pub backpressure_poll: Duration,
    pub idle_poll: Duration,
    /// Límite para vaciar el buffer al apagar
    pub drain_timeout: Duration,
    /// Pausa final para que el transporte entregue los últimos frames
    pub drain_settle: Duration,
}

impl From<&AudioSettings> for LoopTiming {
    fn from(audio: &AudioSettings) -> Self {
        Self {
            high_water_seconds: audio.high_water_seconds,
            backpressure_poll: Duration::from_millis(audio.backpressure_poll_ms),
            idle_poll: Duration::from_millis(audio.idle_poll_ms),
            drain_timeout: Duration::from_secs(audio.drain_timeout_secs),
            drain_settle: Duration::from_millis(audio.drain_settle_ms),
        }
    }
}

/// Estado observable del loop tras una iteración
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Playing,
    Draining,
}

/// Loop de control: marca el ritmo de entrega de audio contra el buffer del
/// transporte y avanza el estado de reproducción.
///
/// Es el único dueño del decodificador activo; como mucho hay uno vivo.
pub struct ControlLoop {
    state: SharedState,
    transport: Arc<dyn Transport>,
    backend: Arc<dyn DecoderBackend>,
    timing: LoopTiming,
    shutdown: CancellationToken,
    decoder: Option<Box<dyn PcmStream>>,
    frame: Vec<u8>,
}

impl ControlLoop {
    pub fn new(
        state: SharedState,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn DecoderBackend>,
        timing: LoopTiming,
        frame_samples: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state,
            transport,
            backend,
            timing,
            shutdown,
            decoder: None,
            frame: vec![0; frame_samples.max(1) * BYTES_PER_SAMPLE],
        }
    }

    /// Corre hasta que se pida el apagado, luego vacía el buffer del transporte.
    ///
    /// Solo devuelve error ante un fallo del transporte, que es fatal.
    pub async fn run(mut self) -> Result<(), TransportError> {
        info!("🔁 Loop de audio iniciado");

        let result = loop {
            match self.step().await {
                Ok(LoopState::Draining) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = &result {
            warn!("❌ Transporte caído, cerrando loop de audio: {}", e);
        }
        self.drain().await;
        result
    }

    /// Una iteración: esperar buffer, aplicar órdenes, leer un frame y
    /// avanzar la playlist si el decodificador se quedó sin datos.
    pub async fn step(&mut self) -> Result<LoopState, TransportError> {
        if !self.wait_for_buffer().await {
            return Ok(LoopState::Draining);
        }

        self.apply_transition().await;

        let read = match self.decoder.as_mut() {
            Some(decoder) => decoder.read_frame(&mut self.frame).await,
            None => FrameRead::Eof,
        };

        match read {
            FrameRead::Data(n) => {
                let volume = self.state.lock().volume();
                let pcm = &mut self.frame[..n];
                apply_volume(pcm, volume);
                self.transport.send_audio_frame(pcm)?;
                Ok(LoopState::Playing)
            }
            FrameRead::Pending => Ok(LoopState::Playing),
            FrameRead::Eof => Ok(self.on_starvation().await),
        }
    }

    /// Espera mientras el buffer supere la marca alta. `false` si llegó el apagado.
    async fn wait_for_buffer(&mut self) -> bool {
        let mut stalled = false;
        while self.transport.buffer_occupancy_seconds() > self.timing.high_water_seconds {
            if !stalled {
                debug!("⏸️ Buffer lleno, esperando al transporte");
                stalled = true;
            }
            if pause(&self.shutdown, self.timing.backpressure_poll).await {
                return false;
            }
        }
        !self.shutdown.is_cancelled()
    }

    /// Ejecuta la orden que haya dejado el despachador
    async fn apply_transition(&mut self) {
        let transition = self.state.lock().take_transition();
        match transition {
            Some(Transition::Start { track, filter }) => {
                self.stop_decoder().await;
                self.start_decoder(&track, &filter).await;
            }
            Some(Transition::Halt) => self.stop_decoder().await,
            None => {}
        }
    }

    async fn on_starvation(&mut self) -> LoopState {
        let next = {
            let mut state = self.state.lock();
            if state.has_pending_transition() {
                // El despachador ya decidió qué sigue; se aplica en la próxima vuelta
                None
            } else {
                Some(state.advance())
            }
        };

        let Some(next) = next else {
            return LoopState::Playing;
        };

        self.stop_decoder().await;
        match next {
            Some(Transition::Start { track, filter }) => {
                self.start_decoder(&track, &filter).await;
                LoopState::Playing
            }
            _ => {
                if pause(&self.shutdown, self.timing.idle_poll).await {
                    LoopState::Draining
                } else {
                    LoopState::Idle
                }
            }
        }
    }

    async fn start_decoder(&mut self, track: &TrackRef, filter: &str) {
        match self.backend.start(track, filter).await {
            Ok(decoder) => self.decoder = Some(decoder),
            // Un decodificador que no arranca se trata como pista vacía
            Err(e) => warn!("⚠️ No se pudo decodificar {}: {}", track, e),
        }
    }

    async fn stop_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.kill().await;
        }
    }

    async fn drain(&mut self) {
        info!("⏳ Apagando: deteniendo reproducción y vaciando buffer de audio");
        self.stop_decoder().await;
        self.state.lock().stop();

        let deadline = Instant::now() + self.timing.drain_timeout;
        while self.transport.buffer_occupancy_seconds() > 0.0 {
            if Instant::now() >= deadline {
                warn!("⚠️ El buffer no se vació a tiempo, se descarta el resto");
                break;
            }
            sleep(self.timing.backpressure_poll).await;
        }

        sleep(self.timing.drain_settle).await;
        info!("✅ Loop de audio detenido");
    }
}

/// Duerme `duration` o hasta el apagado. `true` si se pidió apagar.
async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = sleep(duration) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{decoder::testing::ScriptedBackend, effects::FilterSet, queue::PlaybackState},
        sources::MediaLibrary,
        transport::testing::RecordingTransport,
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn timing() -> LoopTiming {
        LoopTiming {
            high_water_seconds: 0.5,
            backpressure_poll: Duration::from_millis(1),
            idle_poll: Duration::from_millis(1),
            drain_timeout: Duration::from_millis(50),
            drain_settle: Duration::from_millis(1),
        }
    }

    fn track(name: &str) -> TrackRef {
        MediaLibrary::new("/music").track(name).unwrap()
    }

    struct Harness {
        state: SharedState,
        transport: Arc<RecordingTransport>,
        backend: ScriptedBackend,
        shutdown: CancellationToken,
        control: ControlLoop,
    }

    fn harness(backend: ScriptedBackend, volume: f32) -> Harness {
        let filters = FilterSet::new(BTreeMap::from([("normal".to_string(), "anull".to_string())]));
        let state = PlaybackState::new(volume, "normal", filters).into_shared();
        let transport = Arc::new(RecordingTransport::default());
        let shutdown = CancellationToken::new();
        let control = ControlLoop::new(
            state.clone(),
            transport.clone(),
            Arc::new(backend.clone()),
            timing(),
            4,
            shutdown.clone(),
        );
        Harness {
            state,
            transport,
            backend,
            shutdown,
            control,
        }
    }

    fn current(state: &SharedState) -> Option<String> {
        state.lock().current().map(|now| now.track.to_string())
    }

    #[tokio::test]
    async fn test_playlist_plays_through_then_idles() {
        let backend = ScriptedBackend::default()
            .with_track("a.mp3", vec![vec![1, 2], vec![3, 4]])
            .with_track("b.mp3", vec![vec![5, 6]]);
        let mut h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));
        h.state.lock().enqueue(track("b.mp3"));

        // Primera vuelta: sin decodificador → arranca A
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(current(&h.state).as_deref(), Some("./a.mp3"));

        // Dos frames de A
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);

        // EOF de A → B arranca solo
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(current(&h.state).as_deref(), Some("./b.mp3"));
        assert_eq!(h.backend.kills("a.mp3"), 1);

        // Frame de B, luego EOF con la playlist vacía → reposo
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(h.control.step().await.unwrap(), LoopState::Idle);
        assert_eq!(current(&h.state), None);
        assert_eq!(h.backend.kills("b.mp3"), 1);

        assert_eq!(h.backend.started(), vec!["./a.mp3", "./b.mp3"]);
        assert_eq!(h.transport.samples(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_idle_resumes_when_playlist_fills() {
        let backend = ScriptedBackend::default().with_track("a.mp3", vec![vec![7]]);
        let mut h = harness(backend, 1.0);

        assert_eq!(h.control.step().await.unwrap(), LoopState::Idle);
        assert_eq!(h.control.step().await.unwrap(), LoopState::Idle);
        assert!(h.backend.started().is_empty());

        h.state.lock().enqueue(track("a.mp3"));
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(h.backend.started(), vec!["./a.mp3"]);
    }

    #[tokio::test]
    async fn test_skip_preempts_and_kills_superseded_decoder_once() {
        let backend = ScriptedBackend::default()
            .with_track("a.mp3", vec![vec![1]; 10])
            .with_track("b.mp3", vec![vec![2]; 10]);
        let mut h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));
        h.control.step().await.unwrap();
        h.control.step().await.unwrap();

        h.state.lock().enqueue(track("b.mp3"));
        h.state.lock().skip();
        assert_eq!(current(&h.state).as_deref(), Some("./b.mp3"));

        for _ in 0..3 {
            h.control.step().await.unwrap();
        }
        assert_eq!(h.backend.kills("a.mp3"), 1);
        assert_eq!(h.backend.kills("b.mp3"), 0);
        assert_eq!(h.backend.started(), vec!["./a.mp3", "./b.mp3"]);
        assert_eq!(h.transport.samples(), vec![1, 2, 2, 2]);
    }

    #[tokio::test]
    async fn test_stop_kills_decoder_and_idles() {
        let backend = ScriptedBackend::default().with_track("a.mp3", vec![vec![1]; 10]);
        let mut h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));
        h.control.step().await.unwrap();

        h.state.lock().stop();
        h.state.lock().stop();
        assert_eq!(h.control.step().await.unwrap(), LoopState::Idle);
        assert_eq!(h.backend.kills("a.mp3"), 1);
        assert_eq!(current(&h.state), None);
    }

    #[tokio::test]
    async fn test_volume_applied_to_frames() {
        let backend = ScriptedBackend::default().with_track("a.mp3", vec![vec![1000, -1000]]);
        let mut h = harness(backend, 0.25);
        h.state.lock().enqueue(track("a.mp3"));
        h.control.step().await.unwrap();
        h.control.step().await.unwrap();
        assert_eq!(h.transport.samples(), vec![250, -250]);
    }

    #[tokio::test]
    async fn test_backpressure_blocks_until_buffer_drains() {
        let backend = ScriptedBackend::default().with_track("a.mp3", vec![vec![1]]);
        let mut h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));
        *h.transport.occupancy.lock() = 0.8;

        let transport = h.transport.clone();
        let release = tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            *transport.occupancy.lock() = 0.1;
        });

        let started = Instant::now();
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert!(started.elapsed() >= Duration::from_millis(15));
        release.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_during_backpressure_drains() {
        let backend = ScriptedBackend::default().with_track("a.mp3", vec![vec![1]; 10]);
        let h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));
        *h.transport.occupancy.lock() = 0.8;

        let shutdown = h.shutdown.clone();
        let transport = h.transport.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            shutdown.cancel();
            sleep(Duration::from_millis(10)).await;
            *transport.occupancy.lock() = 0.0;
        });

        h.control.run().await.unwrap();
        assert_eq!(*h.transport.occupancy.lock(), 0.0);
        assert!(h.state.lock().current().is_none());
    }

    #[tokio::test]
    async fn test_run_kills_active_decoder_on_shutdown() {
        let backend = ScriptedBackend::default().with_endless_track("a.mp3");
        let h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));

        let shutdown = h.shutdown.clone();
        let runner = tokio::spawn(h.control.run());
        sleep(Duration::from_millis(10)).await;
        shutdown.cancel();

        runner.await.unwrap().unwrap();
        assert_eq!(h.backend.kills("a.mp3"), 1);
        assert_eq!(h.state.lock().playlist_len(), 0);
    }

    #[tokio::test]
    async fn test_decoder_spawn_failure_advances_to_next_track() {
        let backend = ScriptedBackend::default()
            .with_broken_track("a.mp3")
            .with_track("b.mp3", vec![vec![9, 9]]);
        let mut h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));
        h.state.lock().enqueue(track("b.mp3"));

        // A no arranca: queda como pista vacía, sin error para el loop
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(current(&h.state).as_deref(), Some("./a.mp3"));

        // La siguiente vuelta lo ve como EOF y pasa a B
        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(current(&h.state).as_deref(), Some("./b.mp3"));

        assert_eq!(h.control.step().await.unwrap(), LoopState::Playing);
        assert_eq!(h.backend.started(), vec!["./a.mp3", "./b.mp3"]);
        assert_eq!(h.backend.kills("a.mp3"), 0);
        assert_eq!(h.transport.samples(), vec![9, 9]);
    }

    #[tokio::test]
    async fn test_run_returns_transport_error_after_draining() {
        let backend = ScriptedBackend::default().with_endless_track("a.mp3");
        let h = harness(backend, 1.0);
        h.state.lock().enqueue(track("a.mp3"));
        *h.transport.disconnected.lock() = true;

        let result = tokio::time::timeout(Duration::from_secs(1), h.control.run())
            .await
            .unwrap();

        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert_eq!(h.backend.kills("a.mp3"), 1);
        assert!(h.state.lock().current().is_none());
        assert_eq!(h.state.lock().playlist_len(), 0);
        assert!(h.transport.samples().is_empty());
        // El token no se toca: cancelarlo es cosa de quien lanzó el loop
        assert!(!h.shutdown.is_cancelled());
    }
}
