//! # Incubator Core
//!
//! Crate compartilhada com a lógica do monitor de incubadora: decodificação
//! das leituras MQTT, tendência, classificação por limites, máquina de
//! estados do alarme e configuração TOML. Nenhum módulo faz I/O de rede
//! ou áudio diretamente.
//!
//! ## Módulos
//! - [`types`] – Amostras, estados de conexão, tendência, status e alarme
//! - [`protocol`] – Decodificação do payload textual (`"37.4"`)
//! - [`threshold`] – Limites HIGH/LOW e classificação
//! - [`trend`] – Tendência em relação à amostra anterior
//! - [`settings`] – Registro de settings da API, patch e validação
//! - [`alarm`] – Controlador do alarme e trait [`alarm::AlarmSink`]
//! - [`monitor`] – Pipeline amostra → tendência → status → alarme
//! - [`stream`] – Sessão MQTT: estados de conexão e reconexão
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod threshold;
pub mod trend;
pub mod settings;
pub mod alarm;
pub mod monitor;
pub mod stream;
pub mod config;

// Re-exports convenientes
pub use alarm::{AlarmController, AlarmSink, CancelHandle, SinkError};
pub use config::AppConfig;
pub use monitor::{Monitor, MonitorPolicy, Reading};
pub use protocol::{DEFAULT_TOPIC, decode_sample};
pub use settings::{SettingsError, SettingsPatch, SettingsRecord, SettingsSnapshot};
pub use stream::{ReconnectPolicy, SessionStep, StreamSession, TransportEvent};
pub use types::{AlarmConfig, AlarmState, ConnectionState, Sample, SoundProfile, TemperatureStatus, Trend};
