//! Sessão de stream: estados de conexão e política de reconexão.
//!
//! A sessão não faz I/O. O cliente de rede traduz os eventos do broker em
//! [`TransportEvent`], entrega à [`StreamSession`] e executa o
//! [`SessionStep`] devolvido:
//!
//! ```text
//!  Connecting ──handshake──▶ Connected ──queda──▶ Reconnecting ──handshake──▶ Connected
//!       │                        │                      │
//!       └──── credencial recusada / tentativas esgotadas / shutdown ────▶ Disconnected
//! ```

use crate::protocol::{DEFAULT_TOPIC, decode_sample};
use crate::types::{ConnectionState, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Atraso mínimo entre tentativas de reconexão.
pub const MIN_RECONNECT_DELAY_SECS: f64 = 1.0;

/// Teto absoluto do atraso de reconexão (1 h).
pub const MAX_RECONNECT_DELAY_SECS: f64 = 3600.0;

/// Limite do expoente do backoff (evita overflow em `powi`).
const MAX_BACKOFF_EXPONENT: u32 = 32;

// ──────────────────────────────────────────────
// Política de reconexão
// ──────────────────────────────────────────────

/// Backoff fixo (`multiplier = 1`) ou exponencial com teto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Atraso da primeira tentativa (s, mínimo 1)
    pub initial_delay_secs: f64,
    /// Teto do atraso (s)
    pub max_delay_secs: f64,
    /// Fator de crescimento por tentativa
    pub multiplier: f64,
    /// Tentativas seguidas antes de desistir (0 = sem limite)
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5.0,
            max_delay_secs: 60.0,
            multiplier: 1.5,
            max_retries: 120,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay_secs: f64, max_retries: u32) -> Self {
        Self {
            initial_delay_secs: delay_secs,
            max_delay_secs: delay_secs,
            multiplier: 1.0,
            max_retries,
        }
    }

    /// Atraso antes da tentativa `attempt` (a partir de 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self
            .initial_delay_secs
            .max(MIN_RECONNECT_DELAY_SECS)
            .min(MAX_RECONNECT_DELAY_SECS);
        let cap = self.max_delay_secs.min(MAX_RECONNECT_DELAY_SECS).max(initial);
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT) as i32;
        let secs = (initial * self.multiplier.max(1.0).powi(exponent)).min(cap);
        Duration::try_from_secs_f64(secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(MAX_RECONNECT_DELAY_SECS))
    }

    /// A tentativa `attempt` ainda está dentro do limite?
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries == 0 || attempt <= self.max_retries
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.initial_delay_secs.is_finite() || self.initial_delay_secs < MIN_RECONNECT_DELAY_SECS {
            errors.push(format!(
                "Atraso inicial de reconexão inválido: {} (mínimo {MIN_RECONNECT_DELAY_SECS}s)",
                self.initial_delay_secs
            ));
        }
        if !self.max_delay_secs.is_finite() || self.max_delay_secs < self.initial_delay_secs {
            errors.push(format!(
                "Teto de reconexão ({}) menor que o atraso inicial ({})",
                self.max_delay_secs, self.initial_delay_secs
            ));
        } else if self.max_delay_secs > MAX_RECONNECT_DELAY_SECS {
            errors.push(format!(
                "Teto de reconexão muito alto: {}s (máximo {MAX_RECONNECT_DELAY_SECS}s)",
                self.max_delay_secs
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            errors.push(format!("Multiplicador de backoff inválido: {}", self.multiplier));
        }
        errors
    }
}

// ──────────────────────────────────────────────
// Sessão
// ──────────────────────────────────────────────

/// Evento do transporte, já traduzido do cliente MQTT.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake aceito pelo broker
    Connected,
    /// Mensagem publicada em algum tópico assinado
    Message { topic: String, payload: Vec<u8> },
    /// Queda de transporte recuperável
    Lost(String),
    /// Credenciais recusadas / não autorizado
    Rejected(String),
    /// Broker ou cliente encerrou de vez
    Closed,
}

/// O que o cliente de rede deve fazer em seguida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    Continue,
    /// Assinar o tópico de temperatura
    Subscribe,
    /// Aguardar antes da próxima tentativa
    Wait(Duration),
    /// Parar de tentar e liberar a conexão
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutput {
    pub state: Option<ConnectionState>,
    pub sample: Option<Sample>,
    pub step: SessionStep,
}

impl SessionOutput {
    fn step(step: SessionStep) -> Self {
        Self {
            state: None,
            sample: None,
            step,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamSession {
    topic: String,
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    epoch: u64,
    dropped: u64,
}

impl StreamSession {
    pub fn new(topic: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            topic: topic.into(),
            policy,
            state: ConnectionState::Connecting,
            attempts: 0,
            epoch: 0,
            dropped: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Época da conexão atual (0 antes do primeiro handshake).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Payloads descartados por erro de decodificação.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn handle(&mut self, event: TransportEvent, now: DateTime<Utc>) -> SessionOutput {
        if self.state == ConnectionState::Disconnected {
            return SessionOutput::step(SessionStep::Stop);
        }

        match event {
            TransportEvent::Connected => {
                self.attempts = 0;
                self.epoch += 1;
                info!("Conectado ao broker (sessão {}), assinando {}", self.epoch, self.topic);
                SessionOutput {
                    state: self.transition(ConnectionState::Connected),
                    sample: None,
                    step: SessionStep::Subscribe,
                }
            }
            TransportEvent::Message { topic, payload } => {
                if topic != self.topic {
                    debug!("Ignorando mensagem do tópico {topic}");
                    return SessionOutput::step(SessionStep::Continue);
                }
                match decode_sample(&payload, now, self.epoch) {
                    Ok(sample) => SessionOutput {
                        state: None,
                        sample: Some(sample),
                        step: SessionStep::Continue,
                    },
                    Err(e) => {
                        self.dropped += 1;
                        warn!("Payload descartado em {topic}: {e}");
                        SessionOutput::step(SessionStep::Continue)
                    }
                }
            }
            TransportEvent::Lost(reason) => {
                self.attempts += 1;
                if !self.policy.allows(self.attempts) {
                    error!(
                        "Conexão perdida ({reason}); {} tentativas esgotadas, desistindo",
                        self.policy.max_retries
                    );
                    return self.stop();
                }
                let delay = self.policy.delay_for(self.attempts);
                warn!(
                    "Conexão perdida ({reason}). Tentativa {} em {:.1}s...",
                    self.attempts,
                    delay.as_secs_f64()
                );
                SessionOutput {
                    state: self.transition(ConnectionState::Reconnecting),
                    sample: None,
                    step: SessionStep::Wait(delay),
                }
            }
            TransportEvent::Rejected(reason) => {
                error!("Broker recusou a conexão: {reason}");
                self.stop()
            }
            TransportEvent::Closed => {
                info!("Stream encerrado pelo transporte");
                self.stop()
            }
        }
    }

    /// Encerramento explícito. Idempotente.
    pub fn shutdown(&mut self) -> SessionOutput {
        self.stop()
    }

    fn stop(&mut self) -> SessionOutput {
        SessionOutput {
            state: self.transition(ConnectionState::Disconnected),
            sample: None,
            step: SessionStep::Stop,
        }
    }

    fn transition(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC, ReconnectPolicy::default())
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &str) -> TransportEvent {
        TransportEvent::Message {
            topic: DEFAULT_TOPIC.into(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn lost() -> TransportEvent {
        TransportEvent::Lost("connection reset".into())
    }

    #[test]
    fn fixed_delay_never_grows() {
        let policy = ReconnectPolicy::fixed(5.0, 0);
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(50), Duration::from_secs(5));
    }

    #[test]
    fn exponential_delay_is_capped() {
        let policy = ReconnectPolicy {
            initial_delay_secs: 1.0,
            max_delay_secs: 30.0,
            multiplier: 2.0,
            max_retries: 0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn delay_has_one_second_floor() {
        let policy = ReconnectPolicy::fixed(0.1, 0);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert!(!policy.validate().is_empty());
    }

    #[test]
    fn huge_cap_is_rejected_and_clamped() {
        let policy = ReconnectPolicy {
            initial_delay_secs: 5.0,
            max_delay_secs: 1e20,
            multiplier: 10.0,
            max_retries: 0,
        };
        assert!(!policy.validate().is_empty());
        assert_eq!(policy.delay_for(40), Duration::from_secs(3600));

        let mut session = StreamSession::new(DEFAULT_TOPIC, policy);
        let now = Utc::now();
        for _ in 0..40 {
            let out = session.handle(lost(), now);
            assert!(matches!(out.step, SessionStep::Wait(d) if d <= Duration::from_secs(3600)));
        }
    }

    #[test]
    fn non_finite_values_never_panic() {
        let policy = ReconnectPolicy {
            initial_delay_secs: f64::INFINITY,
            max_delay_secs: f64::NAN,
            multiplier: f64::NAN,
            max_retries: 0,
        };
        assert!(!policy.validate().is_empty());
        assert_eq!(policy.delay_for(3), Duration::from_secs(3600));
    }

    #[test]
    fn default_policy_is_valid_and_bounded() {
        let policy = ReconnectPolicy::default();
        assert!(policy.validate().is_empty());
        assert!(policy.allows(policy.max_retries));
        assert!(!policy.allows(policy.max_retries + 1));
    }

    #[test]
    fn connect_sequence_with_reconnect() {
        let mut session = StreamSession::new(DEFAULT_TOPIC, ReconnectPolicy::fixed(1.0, 3));
        let now = Utc::now();
        assert_eq!(session.state(), ConnectionState::Connecting);

        let out = session.handle(TransportEvent::Connected, now);
        assert_eq!(out.state, Some(ConnectionState::Connected));
        assert_eq!(out.step, SessionStep::Subscribe);

        let out = session.handle(lost(), now);
        assert_eq!(out.state, Some(ConnectionState::Reconnecting));
        assert_eq!(out.step, SessionStep::Wait(Duration::from_secs(1)));

        // Falhas seguidas: continua em Reconnecting sem repetir o evento
        let out = session.handle(lost(), now);
        assert_eq!(out.state, None);

        let out = session.handle(TransportEvent::Connected, now);
        assert_eq!(out.state, Some(ConnectionState::Connected));
        assert_eq!(out.step, SessionStep::Subscribe);
        assert_eq!(session.epoch(), 2);
    }

    #[test]
    fn samples_carry_session_epoch() {
        let mut session = StreamSession::default();
        let now = Utc::now();
        session.handle(TransportEvent::Connected, now);
        let first = session.handle(message("37.0"), now).sample.unwrap();
        session.handle(lost(), now);
        session.handle(TransportEvent::Connected, now);
        let second = session.handle(message("37.2"), now).sample.unwrap();
        assert_eq!(first.session, 1);
        assert_eq!(second.session, 2);
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let mut session = StreamSession::default();
        let now = Utc::now();
        session.handle(TransportEvent::Connected, now);
        let out = session.handle(message("abc"), now);
        assert!(out.sample.is_none());
        assert_eq!(out.step, SessionStep::Continue);
        assert_eq!(session.dropped(), 1);
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn other_topics_are_ignored() {
        let mut session = StreamSession::default();
        let now = Utc::now();
        session.handle(TransportEvent::Connected, now);
        let out = session.handle(
            TransportEvent::Message {
                topic: "incubator/humidity".into(),
                payload: b"55".to_vec(),
            },
            now,
        );
        assert!(out.sample.is_none());
        assert_eq!(session.dropped(), 0);
    }

    #[test]
    fn rejection_is_terminal() {
        let mut session = StreamSession::default();
        let now = Utc::now();
        let out = session.handle(TransportEvent::Rejected("bad credentials".into()), now);
        assert_eq!(out.state, Some(ConnectionState::Disconnected));
        assert_eq!(out.step, SessionStep::Stop);

        let out = session.handle(TransportEvent::Connected, now);
        assert_eq!(out.state, None);
        assert_eq!(out.step, SessionStep::Stop);
    }

    #[test]
    fn retries_are_bounded() {
        let mut session = StreamSession::new(DEFAULT_TOPIC, ReconnectPolicy::fixed(1.0, 2));
        let now = Utc::now();
        assert!(matches!(session.handle(lost(), now).step, SessionStep::Wait(_)));
        assert!(matches!(session.handle(lost(), now).step, SessionStep::Wait(_)));
        let out = session.handle(lost(), now);
        assert_eq!(out.state, Some(ConnectionState::Disconnected));
        assert_eq!(out.step, SessionStep::Stop);
    }

    #[test]
    fn successful_handshake_resets_attempts() {
        let mut session = StreamSession::new(DEFAULT_TOPIC, ReconnectPolicy::fixed(1.0, 2));
        let now = Utc::now();
        session.handle(lost(), now);
        session.handle(lost(), now);
        session.handle(TransportEvent::Connected, now);
        assert!(matches!(session.handle(lost(), now).step, SessionStep::Wait(_)));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut session = StreamSession::default();
        let first = session.shutdown();
        assert_eq!(first.state, Some(ConnectionState::Disconnected));
        let second = session.shutdown();
        assert_eq!(second.state, None);
        assert_eq!(second.step, SessionStep::Stop);
    }

    #[test]
    fn closed_transport_disconnects() {
        let mut session = StreamSession::default();
        let out = session.handle(TransportEvent::Closed, Utc::now());
        assert_eq!(out.state, Some(ConnectionState::Disconnected));
    }
}
