//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável: broker, reconexão,
//! settings iniciais do alarme, políticas e sink.

use crate::monitor::MonitorPolicy;
use crate::protocol::DEFAULT_TOPIC;
use crate::settings::SettingsSnapshot;
use crate::stream::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Erros ao salvar a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Transporte até o broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerTransport {
    Tcp,
    Tls,
    /// WebSocket sobre TLS (`wss://host:port/path`)
    Wss,
}

/// Conexão com o broker MQTT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub transport: BrokerTransport,
    pub host: String,
    pub port: u16,
    /// Caminho do endpoint WebSocket (apenas `wss`)
    pub path: String,
    /// Tópico de temperatura
    pub topic: String,
    /// Usuário (vazio = sem autenticação)
    pub username: String,
    pub password: String,
    pub keep_alive_secs: u64,
    /// Prefixo do client id; um sufixo aleatório é anexado
    pub client_id_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            transport: BrokerTransport::Wss,
            host: "broker.hivemq.cloud".into(),
            port: 8884,
            path: "/mqtt".into(),
            topic: DEFAULT_TOPIC.into(),
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 30,
            client_id_prefix: "incubator_monitor_".into(),
        }
    }
}

impl BrokerConfig {
    /// Endereço legível para logs (sem credenciais).
    pub fn endpoint(&self) -> String {
        match self.transport {
            BrokerTransport::Tcp => format!("mqtt://{}:{}", self.host, self.port),
            BrokerTransport::Tls => format!("mqtts://{}:{}", self.host, self.port),
            BrokerTransport::Wss => format!("wss://{}:{}{}", self.host, self.port, self.path),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Sink de áudio/notificação.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Toca o alarme com o sino do terminal (BEL)
    pub bell_enabled: bool,
    /// Repete a notificação no stdout além do log
    pub console_notifications: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            bell_enabled: true,
            console_notifications: true,
        }
    }
}

/// Arquivo JSON de settings escrito pelo serviço externo de settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFileConfig {
    /// Caminho do arquivo (vazio = desativado)
    pub path: String,
    /// Intervalo de verificação (segundos)
    pub poll_interval_secs: f64,
}

impl Default for SettingsFileConfig {
    fn default() -> Self {
        Self {
            path: "settings.json".into(),
            poll_interval_secs: 2.0,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub reconnect: ReconnectPolicy,
    /// Settings usados até o primeiro arquivo de settings válido
    pub settings: SettingsSnapshot,
    pub policy: MonitorPolicy,
    pub sink: SinkConfig,
    pub settings_file: SettingsFileConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Caminho do arquivo de settings, relativo ao config quando não absoluto.
    pub fn settings_file_path(&self, config_path: &Path) -> Option<PathBuf> {
        if self.settings_file.path.is_empty() {
            return None;
        }
        let path = PathBuf::from(&self.settings_file.path);
        if path.is_absolute() {
            return Some(path);
        }
        let base = config_path.parent().unwrap_or(Path::new("."));
        Some(base.join(path))
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.broker.host.trim().is_empty() {
            errors.push("Host do broker não pode ser vazio".into());
        }
        if self.broker.port == 0 {
            errors.push("Porta do broker não pode ser 0".into());
        }
        if self.broker.topic.trim().is_empty() {
            errors.push("Tópico de temperatura não pode ser vazio".into());
        }
        if self.broker.keep_alive_secs < 5 {
            errors.push(format!(
                "Keep-alive inválido: {}s (mínimo 5s)",
                self.broker.keep_alive_secs
            ));
        }
        errors.extend(self.reconnect.validate());
        if let Err(e) = self.settings.validate() {
            errors.push(format!("Settings iniciais inválidos: {e}"));
        }
        if !self.settings_file.poll_interval_secs.is_finite()
            || self.settings_file.poll_interval_secs < 0.1
            || self.settings_file.poll_interval_secs > 60.0
        {
            errors.push(format!(
                "Intervalo do arquivo de settings inválido: {} (0.1–60.0)",
                self.settings_file.poll_interval_secs
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.broker.port, parsed.broker.port);
        assert_eq!(config.broker.transport, parsed.broker.transport);
        assert_eq!(config.settings, parsed.settings);
        assert_eq!(config.reconnect, parsed.reconnect);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[broker]
transport = "tcp"
port = 1883

[settings.thresholds]
high = 37.5
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.broker.transport, BrokerTransport::Tcp);
        assert_eq!(config.broker.port, 1883);
        // Outros campos devem ter valor padrão
        assert_eq!(config.broker.topic, "incubator/temp");
        assert_eq!(config.settings.thresholds.high, 37.5);
        assert_eq!(config.settings.thresholds.low, 36.0);
        assert!(config.settings.alarm.master_enabled);
        assert!(config.policy.reset_trend_on_reconnect);
    }

    #[test]
    fn inverted_initial_thresholds_are_reported() {
        let mut config = AppConfig::default();
        config.settings.thresholds.low = 39.0;
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("lowThreshold"));
    }

    #[test]
    fn endpoint_hides_credentials() {
        let mut broker = BrokerConfig::default();
        broker.username = "incubator".into();
        broker.password = "secret".into();
        assert_eq!(broker.endpoint(), "wss://broker.hivemq.cloud:8884/mqtt");
        assert!(broker.has_credentials());
    }

    #[test]
    fn settings_file_is_relative_to_config() {
        let config = AppConfig::default();
        let path = config
            .settings_file_path(Path::new("/opt/incubator/config.toml"))
            .unwrap();
        assert_eq!(path, PathBuf::from("/opt/incubator/settings.json"));

        let mut disabled = AppConfig::default();
        disabled.settings_file.path.clear();
        assert!(disabled.settings_file_path(Path::new("config.toml")).is_none());
    }
}
