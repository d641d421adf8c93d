//! Tipos de dados para requisições e respostas de chat completions compatíveis com OpenAI.
//!
//! Todas as structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o formato esperado pelo endpoint `/v1/chat/completions`.

use serde::{Deserialize, Deserializer, Serialize};

/// Corpo da requisição para o endpoint de chat completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Identificador do modelo de visão (ex.: "meta-llama/llama-4-scout-17b-16e-instruct").
    pub model: String,
    /// Mensagens de sistema e de usuário.
    pub messages: Vec<ChatMessage>,
    /// Temperatura de amostragem; 0 para saída determinística.
    pub temperature: f32,
    /// Número máximo de tokens na resposta.
    pub max_tokens: u32,
}

/// Uma mensagem na conversa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Papel do remetente: "system" ou "user".
    pub role: String,
    pub content: MessageContent,
}

/// Conteúdo de uma mensagem: texto simples ou lista de partes (texto + imagem).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Uma parte de conteúdo multimodal. Serializada com o campo `"type"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Referência de imagem; aqui sempre uma data URI em base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Resposta do endpoint de chat completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    /// Estatísticas de uso de tokens; alguns provedores omitem.
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Texto gerado. Campo ausente fica `None`; `null` fica `Some(None)`.
    #[serde(default, deserialize_with = "present_field")]
    pub content: Option<Option<String>>,
}

impl ResponseMessage {
    /// `true` quando a resposta trouxe o campo `content`, mesmo que `null`.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Texto gerado; `null` ou ausente viram texto vazio.
    pub fn text(&self) -> &str {
        self.content.as_ref().and_then(|c| c.as_deref()).unwrap_or_default()
    }
}

// Só é chamado quando a chave existe, o que separa "ausente" de `null`.
fn present_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Estatísticas de consumo de tokens para uma chamada.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}
