use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
};
use symphonia::core::io::MediaSource;

use crate::audio::decoder::SAMPLE_RATE;

/// Silencio máximo emitido por lectura cuando no hay audio (20 ms)
const SILENCE_SAMPLES: usize = 960;
/// Bytes por muestra f32 en la salida hacia songbird
const F32_BYTES: usize = 4;

/// Cola de muestras PCM entre el loop de control y el mezclador de voz.
///
/// El loop empuja s16 mono; songbird lee f32 a su propio ritmo, así que la
/// longitud de la cola es la ocupación del buffer de salida.
#[derive(Debug, Default)]
pub struct PcmPipe {
    samples: Mutex<VecDeque<i16>>,
}

impl PcmPipe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Encola un frame s16le. Un byte final impar se descarta.
    pub fn push_frame(&self, pcm: &[u8]) {
        let mut samples = self.samples.lock();
        samples.extend(
            pcm.chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]])),
        );
    }

    pub fn queued_samples(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn occupancy_seconds(&self) -> f64 {
        self.queued_samples() as f64 / SAMPLE_RATE as f64
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    /// Saca hasta `max` muestras convertidas a f32 little-endian
    fn drain_f32(&self, max: usize, out: &mut Vec<u8>) -> usize {
        let mut samples = self.samples.lock();
        let n = max.min(samples.len());
        for sample in samples.drain(..n) {
            out.extend_from_slice(&(sample as f32 / 32768.0).to_le_bytes());
        }
        n
    }
}

/// Lado lector del pipe, entregado a songbird como una fuente sin fin.
///
/// Cuando la cola está vacía emite silencio, de modo que la pista nunca
/// termina y el mezclador sigue consumiendo en tiempo real.
pub struct PipeReader {
    pipe: Arc<PcmPipe>,
    spill: VecDeque<u8>,
}

impl PipeReader {
    pub fn new(pipe: Arc<PcmPipe>) -> Self {
        Self {
            pipe,
            spill: VecDeque::new(),
        }
    }

    fn refill(&mut self, wanted_bytes: usize) {
        let wanted = (wanted_bytes / F32_BYTES).max(1);
        let mut bytes = Vec::with_capacity(wanted * F32_BYTES);
        if self.pipe.drain_f32(wanted, &mut bytes) == 0 {
            bytes.resize(wanted.min(SILENCE_SAMPLES) * F32_BYTES, 0);
        }
        self.spill.extend(bytes);
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.spill.is_empty() {
            self.refill(buf.len());
        }

        let n = buf.len().min(self.spill.len());
        for (dst, src) in buf.iter_mut().zip(self.spill.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Seek for PipeReader {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "el pipe PCM no admite seek",
        ))
    }
}

impl MediaSource for PipeReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
