//! Avaliação de limites – classifica uma leitura em NORMAL/HIGH/LOW.

use crate::types::TemperatureStatus;
use serde::{Deserialize, Serialize};

/// Erros de configuração de limites. O avaliador nunca corrige limites
/// inválidos, apenas recusa.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("Limite inferior ({low}) deve ser menor que o superior ({high})")]
    InvertedBounds { low: f64, high: f64 },

    #[error("Limites precisam ser finitos (low={low}, high={high})")]
    NonFinite { low: f64, high: f64 },
}

/// Limites de temperatura (°C). Invariante: `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub low: f64,
    pub high: f64,
}

impl ThresholdConfig {
    /// Constrói limites validados.
    pub fn new(low: f64, high: f64) -> Result<Self, ThresholdError> {
        let config = Self { low, high };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ThresholdError> {
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(ThresholdError::NonFinite {
                low: self.low,
                high: self.high,
            });
        }
        if self.low >= self.high {
            return Err(ThresholdError::InvertedBounds {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            low: 36.0,
            high: 38.0,
        }
    }
}

/// Classifica `value` contra os limites.
///
/// `value >= high` → `High`; senão `value <= low` → `Low`; senão `Normal`.
/// Os dois extremos contam como fora da faixa.
pub fn classify(value: f64, config: &ThresholdConfig) -> Result<TemperatureStatus, ThresholdError> {
    config.validate()?;

    let status = if value >= config.high {
        TemperatureStatus::High
    } else if value <= config.low {
        TemperatureStatus::Low
    } else {
        TemperatureStatus::Normal
    };
    Ok(status)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
