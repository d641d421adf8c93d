//! Gravação do arquivo de resultados.
//!
//! O [`OutputWriter`] resolve o caminho final, junta os registros com o
//! separador `---` e grava de forma atômica (arquivo `.tmp` + rename).
//! Se o destino recusar a escrita por permissão, grava no diretório de dados
//! local do usuário.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Nome usado quando o destino é um diretório ou está vazio.
pub const DEFAULT_OUTPUT_NAME: &str = "output.txt";

/// Separador entre os textos de duas imagens no arquivo final.
pub const RECORD_SEPARATOR: &str = "\n---\n";

/// Onde o resultado foi parar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedOutput {
    pub path: PathBuf,
    /// `true` quando o destino pedido recusou a escrita e o fallback foi usado.
    pub fell_back: bool,
    pub records: usize,
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
    target: PathBuf,
    fallback_dir: Option<PathBuf>,
}

impl OutputWriter {
    /// Cria um writer para `target`, já resolvido com [`resolve_path`].
    pub fn new(target: &Path, default_dir: &Path) -> Self {
        Self {
            target: resolve_path(target, default_dir),
            fallback_dir: dirs::data_local_dir().map(|dir| dir.join("tooltip-ocr")),
        }
    }

    #[cfg(test)]
    fn with_fallback_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.fallback_dir = dir;
        self
    }

    /// Grava os registros. Uma lista vazia não gera arquivo e retorna `None`.
    pub fn save(&self, records: &[String]) -> Result<Option<SavedOutput>, AppError> {
        if records.is_empty() {
            return Ok(None);
        }
        let contents = records.join(RECORD_SEPARATOR);

        match write_atomic(&self.target, &contents) {
            Ok(()) => Ok(Some(SavedOutput {
                path: self.target.clone(),
                fell_back: false,
                records: records.len(),
            })),
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                let Some(fallback) = self.fallback_target() else {
                    return Err(AppError::Save {
                        path: self.target.clone(),
                        source: err,
                    });
                };
                tracing::warn!(
                    path = %self.target.display(),
                    fallback = %fallback.display(),
                    "write blocked, using fallback location"
                );
                write_atomic(&fallback, &contents).map_err(|source| AppError::Save {
                    path: fallback.clone(),
                    source,
                })?;
                Ok(Some(SavedOutput {
                    path: fallback,
                    fell_back: true,
                    records: records.len(),
                }))
            }
            Err(source) => Err(AppError::Save {
                path: self.target.clone(),
                source,
            }),
        }
    }

    fn fallback_target(&self) -> Option<PathBuf> {
        let name = self
            .target
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_NAME));
        self.fallback_dir.as_ref().map(|dir| dir.join(name))
    }
}

/// Normaliza o destino da saída.
///
/// Caminho vazio ou diretório existente viram `<dir>/output.txt`; um caminho
/// sem extensão recebe `.txt`.
pub fn resolve_path(target: &Path, default_dir: &Path) -> PathBuf {
    let path = if target.as_os_str().is_empty() {
        default_dir.join(DEFAULT_OUTPUT_NAME)
    } else if target.is_dir() {
        target.join(DEFAULT_OUTPUT_NAME)
    } else {
        target.to_path_buf()
    };

    if path.extension().is_none() {
        path.with_extension("txt")
    } else {
        path
    }
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, contents)?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}
