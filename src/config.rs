//! Configuração do tooltip-ocr carregada a partir de `tooltip-ocr.toml`.
//!
//! A struct [`TrackerConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente não vazias têm precedência sobre o arquivo,
//! e as flags da CLI têm precedência sobre ambos.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::batch::BatchRunConfig;
use crate::error::AppError;
use crate::vision::client::{DEFAULT_ENDPOINT, DEFAULT_MODEL};

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "tooltip-ocr.toml";

/// Configuração de nível superior carregada de `tooltip-ocr.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Endpoint de chat completions compatível com OpenAI.
    #[serde(default = "default_endpoint")]
    pub vision_endpoint: String,

    /// Modelo de visão usado para ler os tooltips.
    #[serde(default = "default_model")]
    pub vision_model: String,

    /// Chave da API do provedor de visão.
    #[serde(default)]
    pub api_key: String,

    /// Número de workers paralelos (limitado entre 1 e 10).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Retentativas para falhas de rede antes de desistir da imagem.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Passo, em segundos, do backoff linear entre retentativas de rede.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Timeout de cada chamada, em segundos.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Orçamento de requisições por minuto para o lote inteiro.
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// Jitter máximo, em milissegundos, somado ao espaçamento entre chamadas.
    #[serde(default = "default_rate_jitter_ms")]
    pub rate_jitter_ms: u64,

    /// Retentativas após HTTP 429 antes de abortar o lote.
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Base, em segundos, do backoff exponencial após HTTP 429.
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,

    /// Teto, em segundos, de uma única espera após HTTP 429.
    #[serde(default = "default_rate_limit_backoff_cap_secs")]
    pub rate_limit_backoff_cap_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_workers() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_rate_limit_rpm() -> u32 {
    30
}

fn default_rate_jitter_ms() -> u64 {
    200
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

fn default_rate_limit_backoff_secs() -> u64 {
    5
}

fn default_rate_limit_backoff_cap_secs() -> u64 {
    60
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            vision_endpoint: default_endpoint(),
            vision_model: default_model(),
            api_key: String::new(),
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            rate_limit_rpm: default_rate_limit_rpm(),
            rate_jitter_ms: default_rate_jitter_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            rate_limit_backoff_cap_secs: default_rate_limit_backoff_cap_secs(),
        }
    }
}

impl TrackerConfig {
    /// Carrega a configuração de `path`, ou de `tooltip-ocr.toml` no diretório atual.
    ///
    /// Um caminho explícito precisa existir; o arquivo padrão é opcional.
    /// Em seguida aplica as variáveis de ambiente.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str::<TrackerConfig>(&contents)
            .map_err(AppError::from)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Aplica sobrescritas vindas do ambiente. Valores vazios são ignorados.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("VISION_ENDPOINT")
            && !v.trim().is_empty()
        {
            self.vision_endpoint = v.trim().to_string();
        }
        if let Some(v) = lookup("VISION_MODEL")
            && !v.trim().is_empty()
        {
            self.vision_model = v.trim().to_string();
        }
        if let Some(v) = lookup("VISION_API_KEY")
            && !v.trim().is_empty()
        {
            self.api_key = v.trim().to_string();
        }
        parse_env(&lookup, "MAX_WORKERS", &mut self.max_workers)?;
        parse_env(&lookup, "MAX_RETRIES", &mut self.max_retries)?;
        parse_env(&lookup, "RETRY_DELAY", &mut self.retry_delay_secs)?;
        parse_env(&lookup, "REQUEST_TIMEOUT", &mut self.request_timeout_secs)?;
        parse_env(&lookup, "RATE_LIMIT_RPM", &mut self.rate_limit_rpm)?;
        parse_env(&lookup, "RATE_JITTER_MS", &mut self.rate_jitter_ms)?;
        Ok(())
    }

    /// Verifica os campos obrigatórios antes de iniciar um lote.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.vision_endpoint.trim().is_empty() {
            return Err(AppError::Config("vision endpoint is empty".into()));
        }
        if self.vision_model.trim().is_empty() {
            return Err(AppError::Config("vision model is empty".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "API key is missing; set VISION_API_KEY or api_key in tooltip-ocr.toml".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config("request timeout must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configuração do lote derivada desta configuração.
    pub fn batch_config(&self) -> BatchRunConfig {
        BatchRunConfig {
            concurrency: self.max_workers.clamp(1, BatchRunConfig::MAX_CONCURRENCY),
            requests_per_minute: self.rate_limit_rpm.max(1),
            jitter_max: Duration::from_millis(self.rate_jitter_ms),
            max_transient_retries: self.max_retries,
            transient_backoff: Duration::from_secs(self.retry_delay_secs),
            max_rate_limit_retries: self.max_rate_limit_retries,
            rate_limit_backoff: Duration::from_secs(self.rate_limit_backoff_secs),
            rate_limit_backoff_cap: Duration::from_secs(self.rate_limit_backoff_cap_secs),
            per_call_timeout: self.request_timeout(),
        }
    }

    /// Renderiza a configuração efetiva como TOML, com a chave da API mascarada.
    pub fn to_masked_toml(&self) -> Result<String, AppError> {
        let mut shown = self.clone();
        shown.api_key = mask_secret(&self.api_key);
        Ok(toml::to_string_pretty(&shown)?)
    }
}

// Lê uma variável numérica do ambiente; um valor inválido é erro, não default silencioso.
fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(v) = lookup(key)
        && !v.trim().is_empty()
    {
        *slot = v
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key}={v:?}: {e}"))?;
    }
    Ok(())
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        String::new()
    } else if chars.len() <= 8 {
        "****".to_string()
    } else {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("****{tail}")
    }
}
