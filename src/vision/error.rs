//! Tipos de erro para o cliente de inferência de visão.
//!
//! Define [`InferenceError`], a taxonomia de falhas de uma única chamada
//! imagem → texto. O classificador em [`crate::batch::classify`] decide,
//! a partir da variante, se o job é retentado, falha sozinho ou derruba o lote.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Erros que podem ocorrer ao extrair texto de uma imagem.
///
/// - [`InputUnreadable`](InferenceError::InputUnreadable): o arquivo não pôde ser lido; nenhuma requisição saiu
/// - [`Timeout`](InferenceError::Timeout) e [`Network`](InferenceError::Network): falhas transitórias de transporte
/// - [`Http`](InferenceError::Http): resposta não-2xx
/// - [`RateLimited`](InferenceError::RateLimited): o servidor retornou HTTP 429
/// - [`MalformedResponse`](InferenceError::MalformedResponse): 2xx sem o campo de texto esperado
#[derive(Debug, Error)]
pub enum InferenceError {
    /// A imagem de entrada não existe, está vazia ou não pôde ser lida.
    #[error("cannot read image {}: {reason}", path.display())]
    InputUnreadable { path: PathBuf, reason: String },

    /// A chamada excedeu o timeout configurado.
    #[error("request timed out")]
    Timeout,

    /// Falha de rede subjacente (DNS, conexão recusada, conexão resetada).
    #[error("network error: {0}")]
    Network(String),

    /// Erro HTTP retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {body}")]
    Http { status: u16, body: String },

    /// O servidor rejeitou a chamada por limite de taxa.
    /// `retry_after` vem do cabeçalho `retry-after`, quando presente.
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {}ms", d.as_millis())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Resposta 2xx que não segue o formato esperado. Guarda o corpo bruto para diagnóstico.
    #[error("bad API response format: {reason}")]
    MalformedResponse { reason: String, raw: String },
}

impl InferenceError {
    /// Corpo bruto de uma resposta 2xx que não pôde ser interpretada.
    ///
    /// Erros HTTP já carregam o corpo na mensagem.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            InferenceError::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout
        } else {
            InferenceError::Network(err.to_string())
        }
    }
}
