//! Pipeline de monitoramento: amostra → tendência → classificação → alarme.
//!
//! O [`Monitor`] processa uma amostra por vez, na ordem de chegada, e só
//! enxerga snapshots completos de settings.

use crate::alarm::{AlarmController, AlarmSink};
use crate::settings::{SettingsError, SettingsSnapshot};
use crate::threshold::classify;
use crate::trend::TrendTracker;
use crate::types::{AlarmState, ConnectionState, Sample, TemperatureStatus, Trend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Políticas ajustáveis do pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorPolicy {
    /// Primeira amostra após reconexão volta a `Stable`
    pub reset_trend_on_reconnect: bool,
    /// Trocar o som com o alarme tocando reinicia a reprodução
    pub restart_on_profile_change: bool,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            reset_trend_on_reconnect: true,
            restart_on_profile_change: false,
        }
    }
}

/// Resultado do processamento de uma amostra.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sample: Sample,
    pub trend: Trend,
    pub status: TemperatureStatus,
    /// Presente apenas quando o alarme mudou de estado
    pub alarm: Option<AlarmState>,
}

pub struct Monitor<S: AlarmSink> {
    settings: SettingsSnapshot,
    policy: MonitorPolicy,
    trend: TrendTracker,
    alarm: AlarmController<S>,
    connection: ConnectionState,
    last: Option<Reading>,
}

impl<S: AlarmSink> Monitor<S> {
    /// Cria o monitor. Settings inválidos são recusados.
    pub fn new(sink: S, settings: SettingsSnapshot, policy: MonitorPolicy) -> Result<Self, SettingsError> {
        settings.validate()?;
        let alarm = AlarmController::new(sink, settings.alarm)
            .with_restart_on_profile_change(policy.restart_on_profile_change);
        Ok(Self {
            settings,
            policy,
            trend: TrendTracker::new(policy.reset_trend_on_reconnect),
            alarm,
            connection: ConnectionState::Connecting,
            last: None,
        })
    }

    /// Processa uma amostra decodificada.
    pub fn handle_sample(&mut self, sample: Sample) -> Reading {
        let trend = self.trend.update(&sample);

        let (status, alarm) = match classify(sample.value, &self.settings.thresholds) {
            Ok(status) => (status, self.alarm.on_status(status, &sample)),
            Err(e) => {
                // Sem classificação o alarme fica como está
                warn!("Classificação ignorada: {e}");
                let last = self.last.map_or(TemperatureStatus::Normal, |r| r.status);
                (last, None)
            }
        };
        debug!("{:.1}°C {trend} {status}", sample.value);

        let reading = Reading {
            sample,
            trend,
            status,
            alarm,
        };
        self.last = Some(reading);
        reading
    }

    /// Mudança de conexão. Não mexe no alarme nem na tendência; a quebra de
    /// tendência após reconexão vem de [`Sample::session`].
    pub fn handle_connection(&mut self, state: ConnectionState) {
        if state == self.connection {
            return;
        }
        info!("Conexão: {} → {state}", self.connection);
        self.connection = state;
    }

    /// Substitui o snapshot de settings. Em caso de erro o anterior continua.
    pub fn update_settings(&mut self, settings: SettingsSnapshot) -> Result<Option<AlarmState>, SettingsError> {
        if let Err(e) = settings.validate() {
            warn!("Settings recusados ({e}), mantendo os anteriores");
            return Err(e);
        }
        if settings == self.settings {
            return Ok(None);
        }
        info!(
            "Settings: {:.1}–{:.1}°C | alarme {} | som {} | auto-silêncio {}s",
            settings.thresholds.low,
            settings.thresholds.high,
            if settings.alarm.master_enabled { "ON" } else { "OFF" },
            settings.alarm.sound_profile,
            settings.alarm.auto_silence_secs
        );
        self.settings = settings;
        Ok(self.alarm.update_config(settings.alarm))
    }

    pub fn handle_timer(&mut self, generation: u64) -> Option<AlarmState> {
        self.alarm.on_timer_elapsed(generation)
    }

    pub fn silence(&mut self) -> Option<AlarmState> {
        self.alarm.silence()
    }

    /// Alarme de teste de 3s. `false` se um alarme real estiver tocando.
    pub fn test_alarm(&mut self) -> bool {
        self.alarm.start_test()
    }

    pub fn policy(&self) -> MonitorPolicy {
        self.policy
    }

    pub fn settings(&self) -> &SettingsSnapshot {
        &self.settings
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn alarm_state(&self) -> AlarmState {
        self.alarm.state()
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.last.as_ref()
    }

    pub fn alarm(&self) -> &AlarmController<S> {
        &self.alarm
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
