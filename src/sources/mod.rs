//! Fuentes de audio reproducibles.
//!
//! Todo lo que entra a la cola es un [`TrackRef`]: una ruta ya resuelta y
//! confinada dentro de la raíz de medios. La única forma de construir uno
//! es a través de [`local::MediaLibrary`], que rechaza cualquier argumento
//! con recorrido de directorios antes de tocar el sistema de archivos.

pub mod local;

use std::fmt;
use std::path::{Path, PathBuf};

pub use local::MediaLibrary;

/// Marcador de recorrido al directorio padre
const PARENT_MARKER: &str = "..";

/// Referencia a una pista reproducible dentro de la raíz de medios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef {
    path: PathBuf,
    relative: String,
}

impl TrackRef {
    pub(crate) fn new(path: PathBuf, relative: String) -> Self {
        Self { path, relative }
    }

    /// Ruta absoluta que recibe el decodificador
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Nombre para mostrar a usuarios, sin exponer la raíz real (`./sub/pista.mp3`)
impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "./{}", self.relative)
    }
}

/// Verdadero si el argumento intenta salir de la raíz de medios.
///
/// Cualquier aparición de `..` cuenta, igual que una ruta absoluta: se
/// comprueba sobre el texto crudo, antes de resolver nada.
pub fn escapes_root(argument: &str) -> bool {
    argument.contains(PARENT_MARKER)
        || argument.starts_with('/')
        || argument.starts_with('\\')
        || Path::new(argument).is_absolute()
}
