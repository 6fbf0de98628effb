//! Tipos do domínio: amostras, estados de conexão, tendência, status
//! de temperatura e configuração de alarme.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Amostras
// ──────────────────────────────────────────────

/// Leitura de temperatura decodificada do broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Temperatura (°C)
    pub value: f64,
    /// Instante em que a mensagem foi recebida
    pub observed_at: DateTime<Utc>,
    /// Época da conexão (incrementa a cada handshake bem-sucedido)
    pub session: u64,
}

impl Sample {
    pub fn new(value: f64, observed_at: DateTime<Utc>, session: u64) -> Self {
        Self {
            value,
            observed_at,
            session,
        }
    }

    /// Mesma entrega repetida pelo transporte (timestamp e valor idênticos).
    pub fn is_duplicate_of(&self, other: &Sample) -> bool {
        self.observed_at == other.observed_at && self.value == other.value
    }
}

// ──────────────────────────────────────────────
// Conexão
// ──────────────────────────────────────────────

/// Estado da conexão com o broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(label)
    }
}

// ──────────────────────────────────────────────
// Tendência e status
// ──────────────────────────────────────────────

/// Tendência em relação à amostra anterior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Rising => "RISING",
            Self::Falling => "FALLING",
            Self::Stable => "STABLE",
        };
        f.write_str(label)
    }
}

/// Classificação de uma leitura contra os limites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemperatureStatus {
    Normal,
    High,
    Low,
}

impl TemperatureStatus {
    /// `High` ou `Low` disparam o alarme.
    pub fn is_qualifying(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for TemperatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Normal => "NORMAL",
            Self::High => "HIGH TEMP",
            Self::Low => "LOW TEMP",
        };
        f.write_str(label)
    }
}

// ──────────────────────────────────────────────
// Configuração de alarme
// ──────────────────────────────────────────────

/// Padrão sonoro do alarme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundProfile {
    #[default]
    Default,
    Pulse,
    Siren,
    Custom,
}

impl SoundProfile {
    /// Nome usado no registro de settings (`alarmSound`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Pulse => "pulse",
            Self::Siren => "siren",
            Self::Custom => "custom",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "pulse" => Some(Self::Pulse),
            "siren" => Some(Self::Siren),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for SoundProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuração do alarme consumida pelo controlador.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Chave geral: desligada, nenhum limite dispara o alarme
    pub master_enabled: bool,
    pub sound_profile: SoundProfile,
    /// Auto-silêncio em segundos (0 = toca até voltar ao normal)
    pub auto_silence_secs: u32,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            master_enabled: true,
            sound_profile: SoundProfile::Default,
            auto_silence_secs: 60,
        }
    }
}

/// Estado público do alarme, emitido a cada transição.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlarmState {
    pub active: bool,
    pub reason: Option<TemperatureStatus>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl AlarmState {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn activated(reason: TemperatureStatus, at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            reason: Some(reason),
            activated_at: Some(at),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
