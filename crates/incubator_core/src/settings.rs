//! Settings da incubadora: registro no formato da API, atualização parcial
//! e validação para um [`SettingsSnapshot`] imutável.
//!
//! Formato do registro (`GET /api/settings`):
//!
//! ```json
//! {
//!   "highThreshold": "38.0",
//!   "lowThreshold": "36.0",
//!   "masterAlarm": true,
//!   "alarmDuration": "60",
//!   "alarmSound": "default"
//! }
//! ```
//!
//! Campos numéricos trafegam como string; só `masterAlarm` é booleano.

use crate::threshold::ThresholdConfig;
use crate::types::{AlarmConfig, SoundProfile};
use serde::{Deserialize, Serialize};

/// Falha de validação; nomeia o primeiro campo inválido.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct SettingsError {
    pub field: &'static str,
    pub message: String,
}

impl SettingsError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Snapshot validado
// ──────────────────────────────────────────────

/// Configuração completa consumida pelo monitor, sempre válida.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSnapshot {
    pub thresholds: ThresholdConfig,
    pub alarm: AlarmConfig,
}

impl SettingsSnapshot {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.to_record().validate().map(|_| ())
    }

    pub fn to_record(&self) -> SettingsRecord {
        SettingsRecord {
            high_threshold: format_celsius(self.thresholds.high),
            low_threshold: format_celsius(self.thresholds.low),
            master_alarm: self.alarm.master_enabled,
            alarm_duration: self.alarm.auto_silence_secs.to_string(),
            alarm_sound: self.alarm.sound_profile.as_str().to_string(),
        }
    }
}

fn format_celsius(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

// ──────────────────────────────────────────────
// Registro da API
// ──────────────────────────────────────────────

/// Registro de settings como a API o serializa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRecord {
    pub high_threshold: String,
    pub low_threshold: String,
    pub master_alarm: bool,
    pub alarm_duration: String,
    pub alarm_sound: String,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            high_threshold: "38.0".into(),
            low_threshold: "36.0".into(),
            master_alarm: true,
            alarm_duration: "60".into(),
            alarm_sound: "default".into(),
        }
    }
}

impl SettingsRecord {
    /// Valida campo a campo, na ordem do registro, e monta o snapshot.
    pub fn validate(&self) -> Result<SettingsSnapshot, SettingsError> {
        let high = parse_celsius("highThreshold", &self.high_threshold)?;
        let low = parse_celsius("lowThreshold", &self.low_threshold)?;
        let auto_silence_secs = parse_duration("alarmDuration", &self.alarm_duration)?;
        let sound_profile = SoundProfile::parse(&self.alarm_sound).ok_or_else(|| {
            SettingsError::new(
                "alarmSound",
                format!(
                    "som desconhecido {:?} (default, pulse, siren, custom)",
                    self.alarm_sound
                ),
            )
        })?;

        if low >= high {
            return Err(SettingsError::new(
                "lowThreshold",
                format!("deve ser menor que highThreshold ({low} >= {high})"),
            ));
        }

        Ok(SettingsSnapshot {
            thresholds: ThresholdConfig { low, high },
            alarm: AlarmConfig {
                master_enabled: self.master_alarm,
                sound_profile,
                auto_silence_secs,
            },
        })
    }

    /// Aplica uma atualização parcial e devolve o registro mesclado.
    pub fn merge(&self, patch: &SettingsPatch) -> SettingsRecord {
        SettingsRecord {
            high_threshold: patch
                .high_threshold
                .clone()
                .unwrap_or_else(|| self.high_threshold.clone()),
            low_threshold: patch
                .low_threshold
                .clone()
                .unwrap_or_else(|| self.low_threshold.clone()),
            master_alarm: patch.master_alarm.unwrap_or(self.master_alarm),
            alarm_duration: patch
                .alarm_duration
                .clone()
                .unwrap_or_else(|| self.alarm_duration.clone()),
            alarm_sound: patch
                .alarm_sound
                .clone()
                .unwrap_or_else(|| self.alarm_sound.clone()),
        }
    }

    /// Mescla e valida; em caso de erro o registro atual continua valendo.
    pub fn apply(
        &self,
        patch: &SettingsPatch,
    ) -> Result<(SettingsRecord, SettingsSnapshot), SettingsError> {
        let merged = self.merge(patch);
        let snapshot = merged.validate()?;
        Ok((merged, snapshot))
    }
}

fn parse_celsius(field: &'static str, raw: &str) -> Result<f64, SettingsError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| SettingsError::new(field, format!("temperatura inválida {raw:?}")))?;
    if !value.is_finite() {
        return Err(SettingsError::new(field, format!("temperatura não finita {raw:?}")));
    }
    Ok(value)
}

fn parse_duration(field: &'static str, raw: &str) -> Result<u32, SettingsError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| SettingsError::new(field, format!("duração inválida {raw:?} (segundos inteiros)")))?;
    if value < 0 {
        return Err(SettingsError::new(field, "duração não pode ser negativa"));
    }
    u32::try_from(value).map_err(|_| SettingsError::new(field, format!("duração grande demais: {value}")))
}

// ──────────────────────────────────────────────
// Atualização parcial
// ──────────────────────────────────────────────

/// Corpo do `POST /api/settings`: qualquer subconjunto dos campos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_threshold: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_threshold: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_alarm: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_sound: Option<String>,
}

impl SettingsPatch {
    /// Lê o patch de um corpo JSON. Campos desconhecidos são ignorados.
    pub fn from_json(body: &str) -> Result<Self, SettingsError> {
        serde_json::from_str(body).map_err(|e| SettingsError::new("body", e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
