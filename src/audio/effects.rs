use std::collections::BTreeMap;
use tracing::info;

/// Escala un frame PCM s16le mono por `volume` en el sitio.
///
/// La ganancia es lineal y satura: cualquier resultado fuera de
/// `i16::MIN..=i16::MAX` se recorta al extremo en lugar de dar la vuelta.
/// Un byte final suelto (frame de longitud impar) se deja intacto.
pub fn apply_volume(frame: &mut [u8], volume: f32) {
    if volume == 1.0 {
        return;
    }

    for chunk in frame.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f32;
        // `as` desde f32 satura en los límites de i16
        let scaled = (sample * volume).round() as i16;
        chunk.copy_from_slice(&scaled.to_le_bytes());
    }
}

/// Conjunto configurado de filtros de audio: nombre → expresión de ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: BTreeMap<String, String>,
}

impl FilterSet {
    pub fn new(filters: BTreeMap<String, String>) -> Self {
        info!("🎛️ {} filtros de audio disponibles", filters.len());
        Self { filters }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Expresión de ffmpeg para el filtro `name`
    pub fn expression(&self, name: &str) -> Option<&str> {
        self.filters.get(name).map(String::as_str)
    }

    /// Nombres válidos, en orden alfabético
    pub fn names(&self) -> Vec<String> {
        self.filters.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples(frame: &[u8]) -> Vec<i16> {
        frame
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn test_volume_scales_linearly() {
        let mut pcm = frame(&[1000, -1000, 0, 32767]);
        apply_volume(&mut pcm, 0.5);
        assert_eq!(samples(&pcm), vec![500, -500, 0, 16384]);
    }

    #[test]
    fn test_volume_zero_silences() {
        let mut pcm = frame(&[i16::MAX, i16::MIN, 12]);
        apply_volume(&mut pcm, 0.0);
        assert_eq!(samples(&pcm), vec![0, 0, 0]);
    }

    #[test]
    fn test_volume_saturates_instead_of_wrapping() {
        let mut pcm = frame(&[30000, -30000]);
        apply_volume(&mut pcm, 2.0);
        assert_eq!(samples(&pcm), vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_odd_trailing_byte_untouched() {
        let mut pcm = frame(&[200]);
        pcm.push(0x7f);
        apply_volume(&mut pcm, 0.5);
        assert_eq!(pcm, vec![100, 0, 0x7f]);
    }

    #[test]
    fn test_filter_set_lookup() {
        let set = FilterSet::new(BTreeMap::from([
            ("normal".to_string(), "anull".to_string()),
            ("bass".to_string(), "bass=g=8".to_string()),
        ]));
        assert!(set.contains("bass"));
        assert!(!set.contains("treble"));
        assert_eq!(set.expression("normal"), Some("anull"));
        assert_eq!(set.names(), vec!["bass".to_string(), "normal".to_string()]);
    }
}
