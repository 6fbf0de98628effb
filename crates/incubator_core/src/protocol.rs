//! Decodificação dos payloads do tópico de temperatura.
//!
//! O sensor publica a temperatura como texto UTF-8 decimal puro:
//!
//! ```text
//! incubator/temp  →  "37.4"
//! ```
//!
//! Qualquer coisa que não seja um número finito é descartada; nunca vira
//! [`Sample`].

use crate::types::Sample;
use chrono::{DateTime, Utc};

/// Tópico padrão publicado pelo sensor da incubadora.
pub const DEFAULT_TOPIC: &str = "incubator/temp";

/// Tamanho máximo aceito para um payload de temperatura.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Erros de decodificação.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("Payload vazio")]
    Empty,

    #[error("Payload muito longo ({0} bytes, máximo {MAX_PAYLOAD_LEN})")]
    TooLong(usize),

    #[error("Payload não é UTF-8 válido")]
    InvalidUtf8,

    #[error("Payload não numérico: {0:?}")]
    NotANumber(String),

    #[error("Valor não finito: {0}")]
    NonFinite(String),
}

/// Converte o texto do payload em graus Celsius.
pub fn decode_value(payload: &[u8]) -> Result<f64, DecodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(DecodeError::TooLong(payload.len()));
    }
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: f64 = text
        .parse()
        .map_err(|_| DecodeError::NotANumber(text.to_string()))?;
    if !value.is_finite() {
        return Err(DecodeError::NonFinite(text.to_string()));
    }
    Ok(value)
}

/// Decodifica um payload em [`Sample`] carimbado com o instante de recepção.
pub fn decode_sample(
    payload: &[u8],
    observed_at: DateTime<Utc>,
    session: u64,
) -> Result<Sample, DecodeError> {
    decode_value(payload).map(|value| Sample::new(value, observed_at, session))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
