use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{escapes_root, TrackRef};
use crate::error::CommandError;

/// Biblioteca de archivos locales bajo una raíz confinada.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Construye la referencia sin acceder al disco.
    ///
    /// Falla con [`CommandError::Forbidden`] si el argumento contiene `..` o
    /// es absoluto.
    pub fn track(&self, argument: &str) -> Result<TrackRef, CommandError> {
        if escapes_root(argument) {
            warn!("🚫 Ruta rechazada por recorrido de directorios: {}", argument);
            return Err(CommandError::Forbidden(argument.to_string()));
        }

        let relative = argument.trim_start_matches("./").to_string();
        let path = self.root.join(&relative);
        Ok(TrackRef::new(path, relative))
    }

    /// Resuelve un argumento a un archivo existente
    pub async fn resolve_file(&self, argument: &str) -> Result<TrackRef, CommandError> {
        let track = self.track(argument)?;

        match fs::metadata(track.path()).await {
            Ok(meta) if meta.is_file() => {}
            Ok(meta) if meta.is_dir() => {
                return Err(CommandError::IsDirectory(argument.to_string()))
            }
            _ => return Err(CommandError::NoFile(argument.to_string())),
        }

        self.confine(track.path(), argument).await?;
        Ok(track)
    }

    /// Entradas de un subdirectorio, ordenadas por nombre
    pub async fn list_dir(&self, argument: &str) -> Result<Vec<String>, CommandError> {
        if escapes_root(argument) {
            warn!("🚫 Listado rechazado por recorrido de directorios: {}", argument);
            return Err(CommandError::Forbidden(argument.to_string()));
        }

        let dir = self.root.join(argument);
        if !is_dir(&dir).await {
            return Err(CommandError::NoDirectory(argument.to_string()));
        }
        self.confine(&dir, argument).await?;

        read_names(&dir, false)
            .await
            .map_err(|_| CommandError::NoDirectory(argument.to_string()))
    }

    /// Subdirectorios directos de la raíz, ordenados por nombre
    pub async fn list_subfolders(&self) -> Result<Vec<String>, CommandError> {
        read_names(&self.root, true)
            .await
            .map_err(|_| CommandError::NoDirectory(".".to_string()))
    }

    /// Resuelve enlaces simbólicos y exige que el destino siga bajo la raíz
    async fn confine(&self, path: &Path, argument: &str) -> Result<(), CommandError> {
        let missing = || CommandError::NoFile(argument.to_string());
        let root = fs::canonicalize(&self.root).await.map_err(|_| missing())?;
        let target = fs::canonicalize(path).await.map_err(|_| missing())?;

        if !target.starts_with(&root) {
            warn!(
                "🚫 Enlace fuera de la biblioteca rechazado: {} -> {}",
                argument,
                target.display()
            );
            return Err(CommandError::Forbidden(argument.to_string()));
        }
        Ok(())
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn read_names(dir: &Path, only_dirs: bool) -> std::io::Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if only_dirs && !entry.file_type().await?.is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }

    names.sort();
    debug!("📂 {} entradas en {}", names.len(), dir.display());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn library_with(files: &[&str], dirs: &[&str]) -> (TempDir, MediaLibrary) {
        let tmp = TempDir::new().unwrap();
        for dir in dirs {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        for file in files {
            std::fs::write(tmp.path().join(file), b"RIFF").unwrap();
        }
        let library = MediaLibrary::new(tmp.path());
        (tmp, library)
    }

    #[tokio::test]
    async fn test_resolve_file_variants() {
        let (_tmp, library) = library_with(&["rock/a.mp3"], &["rock"]);

        let track = library.resolve_file("rock/a.mp3").await.unwrap();
        assert_eq!(track.to_string(), "./rock/a.mp3");
        assert!(track.path().starts_with(library.root()));

        assert!(matches!(
            library.resolve_file("rock").await,
            Err(CommandError::IsDirectory(_))
        ));
        assert!(matches!(
            library.resolve_file("rock/missing.mp3").await,
            Err(CommandError::NoFile(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_rejected_before_disk_access() {
        // La raíz no existe: si se tocara el disco el error sería NoFile/NoDirectory
        let library = MediaLibrary::new("/definitely/not/here");

        assert!(matches!(
            library.resolve_file("../etc/passwd").await,
            Err(CommandError::Forbidden(_))
        ));
        assert!(matches!(
            library.list_dir("sub/../..").await,
            Err(CommandError::Forbidden(_))
        ));
        assert!(matches!(library.track("/etc/passwd"), Err(CommandError::Forbidden(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_forbidden() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.mp3"), b"RIFF").unwrap();
        std::fs::create_dir_all(outside.path().join("private")).unwrap();

        let (tmp, library) = library_with(&["rock/a.mp3"], &["rock"]);
        std::os::unix::fs::symlink(outside.path().join("secret.mp3"), tmp.path().join("leak.mp3"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path().join("private"), tmp.path().join("vault"))
            .unwrap();
        std::os::unix::fs::symlink(tmp.path().join("rock/a.mp3"), tmp.path().join("alias.mp3"))
            .unwrap();

        assert!(matches!(
            library.resolve_file("leak.mp3").await,
            Err(CommandError::Forbidden(_))
        ));
        assert!(matches!(
            library.list_dir("vault").await,
            Err(CommandError::Forbidden(_))
        ));
        // Un enlace que apunta dentro de la raíz sigue siendo válido
        assert!(library.resolve_file("alias.mp3").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_dir_sorted() {
        let (_tmp, library) = library_with(&["jazz/c.mp3", "jazz/a.mp3", "jazz/b.mp3"], &["jazz"]);
        let names = library.list_dir("jazz").await.unwrap();
        assert_eq!(names, vec!["a.mp3", "b.mp3", "c.mp3"]);

        assert!(matches!(
            library.list_dir("blues").await,
            Err(CommandError::NoDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_list_subfolders_skips_files() {
        let (_tmp, library) = library_with(&["loose.mp3"], &["rock", "ambient"]);
        let names = library.list_subfolders().await.unwrap();
        assert_eq!(names, vec!["ambient", "rock"]);
    }
}
