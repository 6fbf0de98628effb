//! Máquina de estados do alarme.
//!
//! ```text
//!            HIGH/LOW ∧ master                 timer(geração) / silence()
//!   ┌──────┐ ────────────────▶ ┌────────┐ ──────────────────────────▶ ┌───────────┐
//!   │ Idle │                   │ Active │                             │ Silenced  │
//!   └──────┘ ◀──────────────── └────────┘                             └───────────┘
//!      ▲         NORMAL            │ master off                            │ NORMAL
//!      │                           ▼                                       │
//!      │  master on          ┌──────────┐                                  │
//!      └──────────────────── │ Disabled │ ◀──── master off (qualquer) ─────┘
//!                            └──────────┘
//! ```
//!
//! O controlador não guarda recursos de áudio nem de notificação: todo
//! efeito colateral passa pelo [`AlarmSink`]. Cada ativação incrementa
//! uma geração; um timer que dispara com geração antiga é ignorado.

use crate::types::{AlarmConfig, AlarmState, Sample, SoundProfile, TemperatureStatus};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Duração do alarme de teste.
pub const TEST_ALARM_DURATION: Duration = Duration::from_secs(3);

/// Geração reservada ao timer do alarme de teste; ativações reais contam
/// a partir de 1 e nunca chegam aqui.
pub const TEST_TIMER_GENERATION: u64 = u64::MAX;

// ──────────────────────────────────────────────
// Sink
// ──────────────────────────────────────────────

/// Erros do sink de áudio/notificação. Nunca são fatais.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Reprodução indisponível: {0}")]
    Playback(String),

    #[error("Falha ao notificar: {0}")]
    Notification(String),
}

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    hook: Mutex<Option<CancelHook>>,
}

/// Handle de cancelamento devolvido por [`AlarmSink::schedule_timer`].
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancela e executa o hook registrado (apenas na primeira chamada).
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(hook) = self.take_hook() {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registra `hook` para rodar no cancelamento, ex.: acordar a thread do
    /// timer. Se já estiver cancelado, roda na hora.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        if let Ok(mut slot) = self.inner.hook.lock() {
            *slot = Some(Box::new(hook));
        }
        if self.is_cancelled() {
            if let Some(hook) = self.take_hook() {
                hook();
            }
        }
    }

    fn take_hook(&self) -> Option<CancelHook> {
        self.inner.hook.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Efeitos colaterais do alarme (áudio, timer, notificação).
///
/// Nenhum método pode bloquear o processamento de amostras.
pub trait AlarmSink {
    fn start_playback(&mut self, profile: SoundProfile) -> Result<(), SinkError>;

    fn stop_playback(&mut self);

    /// Agenda um disparo único; ao expirar, quem implementa deve entregar
    /// `generation` de volta ao [`AlarmController::on_timer_elapsed`].
    fn schedule_timer(&mut self, duration: Duration, generation: u64) -> CancelHandle;

    /// Notificação best-effort.
    fn notify(&mut self, title: &str, body: &str) -> Result<(), SinkError>;
}

// ──────────────────────────────────────────────
// Estados
// ──────────────────────────────────────────────

/// Por que o alarme está calado mesmo com a leitura fora da faixa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Chave geral desligada
    Disabled,
    /// Auto-silêncio expirou ou mudo manual; só rearma após NORMAL
    Silenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmPhase {
    Idle,
    Active,
    Suppressed(Suppression),
}

// ──────────────────────────────────────────────
// Controlador
// ──────────────────────────────────────────────

pub struct AlarmController<S: AlarmSink> {
    sink: S,
    config: AlarmConfig,
    restart_on_profile_change: bool,
    phase: AlarmPhase,
    state: AlarmState,
    generation: u64,
    timer: Option<CancelHandle>,
    /// Reprodução iniciada com sucesso na ativação atual
    playing: bool,
    /// Silenciado antes de voltar ao normal: exige NORMAL para rearmar
    awaiting_normal: bool,
    /// Alarme de teste tocando (fora da máquina de estados)
    test_timer: Option<CancelHandle>,
}

impl<S: AlarmSink> AlarmController<S> {
    pub fn new(sink: S, config: AlarmConfig) -> Self {
        let phase = if config.master_enabled {
            AlarmPhase::Idle
        } else {
            AlarmPhase::Suppressed(Suppression::Disabled)
        };
        Self {
            sink,
            config,
            restart_on_profile_change: false,
            phase,
            state: AlarmState::inactive(),
            generation: 0,
            timer: None,
            playing: false,
            awaiting_normal: false,
            test_timer: None,
        }
    }

    /// Reinicia o som quando o perfil muda com o alarme tocando.
    pub fn with_restart_on_profile_change(mut self, enabled: bool) -> Self {
        self.restart_on_profile_change = enabled;
        self
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn phase(&self) -> AlarmPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == AlarmPhase::Active
    }

    pub fn is_testing(&self) -> bool {
        self.test_timer.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> AlarmConfig {
        self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Reage à classificação de uma amostra. Retorna o novo estado quando
    /// houve transição.
    pub fn on_status(&mut self, status: TemperatureStatus, sample: &Sample) -> Option<AlarmState> {
        if !status.is_qualifying() {
            self.awaiting_normal = false;
            return match self.phase {
                AlarmPhase::Active => {
                    info!("Temperatura normalizada ({:.1}°C), alarme desligado", sample.value);
                    self.halt();
                    self.phase = AlarmPhase::Idle;
                    Some(self.set_state(AlarmState::inactive()))
                }
                AlarmPhase::Suppressed(Suppression::Silenced) => {
                    debug!("Temperatura normalizada, alarme rearmado");
                    self.phase = AlarmPhase::Idle;
                    None
                }
                AlarmPhase::Idle | AlarmPhase::Suppressed(Suppression::Disabled) => None,
            };
        }

        match self.phase {
            AlarmPhase::Idle => {
                if !self.config.master_enabled || self.awaiting_normal {
                    return None;
                }
                Some(self.activate(status, sample))
            }
            AlarmPhase::Active => {
                if !self.playing {
                    self.start_playback();
                }
                if self.state.reason != Some(status) {
                    // Limites mudaram com o alarme ativo (HIGH ↔ LOW)
                    let state = AlarmState {
                        reason: Some(status),
                        ..self.state
                    };
                    return Some(self.set_state(state));
                }
                None
            }
            AlarmPhase::Suppressed(_) => None,
        }
    }

    /// Timer de auto-silêncio expirou.
    pub fn on_timer_elapsed(&mut self, generation: u64) -> Option<AlarmState> {
        if generation == TEST_TIMER_GENERATION {
            self.finish_test();
            return None;
        }
        if self.phase != AlarmPhase::Active || generation != self.generation {
            debug!(
                "Timer obsoleto ignorado (geração {generation}, atual {})",
                self.generation
            );
            return None;
        }
        info!("Auto-silêncio após {}s", self.config.auto_silence_secs);
        self.timer = None;
        Some(self.suppress_until_normal())
    }

    /// Mudo manual. Mesmo efeito do auto-silêncio; chamadas repetidas não
    /// geram efeito colateral.
    pub fn silence(&mut self) -> Option<AlarmState> {
        if self.phase != AlarmPhase::Active {
            if let Some(timer) = self.test_timer.as_ref() {
                timer.cancel();
                self.finish_test();
            }
            return None;
        }
        info!("Alarme silenciado manualmente");
        Some(self.suppress_until_normal())
    }

    /// Toca o som configurado e notifica por [`TEST_ALARM_DURATION`], sem
    /// alterar o [`AlarmState`]. Ignorado com alarme real ativo ou outro
    /// teste em andamento.
    pub fn start_test(&mut self) -> bool {
        if self.phase == AlarmPhase::Active || self.test_timer.is_some() {
            debug!("Teste de alarme ignorado");
            return false;
        }
        info!("Alarme de teste ({}s, som {})", TEST_ALARM_DURATION.as_secs(), self.config.sound_profile);
        if let Err(e) = self.sink.start_playback(self.config.sound_profile) {
            warn!("{e}");
            return false;
        }
        if let Err(e) = self.sink.notify("Test Alarm", "This is a test notification.") {
            warn!("{e}");
        }
        self.test_timer = Some(self.sink.schedule_timer(TEST_ALARM_DURATION, TEST_TIMER_GENERATION));
        true
    }

    /// Aplica nova configuração sem derrubar o timer em andamento.
    pub fn update_config(&mut self, config: AlarmConfig) -> Option<AlarmState> {
        let previous = std::mem::replace(&mut self.config, config);

        if !config.master_enabled {
            let was_active = self.phase == AlarmPhase::Active;
            if was_active {
                info!("Chave geral desligada, alarme interrompido");
                self.halt();
            }
            self.phase = AlarmPhase::Suppressed(Suppression::Disabled);
            return was_active.then(|| self.set_state(AlarmState::inactive()));
        }

        if self.phase == AlarmPhase::Suppressed(Suppression::Disabled) {
            info!("Chave geral ligada");
            self.phase = AlarmPhase::Idle;
        }

        if self.phase == AlarmPhase::Active
            && previous.sound_profile != config.sound_profile
            && self.restart_on_profile_change
        {
            info!("Perfil de som alterado para {}, reiniciando", config.sound_profile);
            if self.playing {
                self.sink.stop_playback();
                self.playing = false;
            }
            self.start_playback();
        }
        None
    }

    // ── Interno ──

    fn activate(&mut self, reason: TemperatureStatus, sample: &Sample) -> AlarmState {
        // O som do teste passa a pertencer à ativação
        if let Some(timer) = self.test_timer.take() {
            timer.cancel();
        }
        self.generation += 1;
        self.phase = AlarmPhase::Active;
        warn!(
            "ALARME {reason}: {:.1}°C (geração {})",
            sample.value, self.generation
        );

        self.start_playback();

        let (title, body) = notification_text(reason, sample.value);
        if let Err(e) = self.sink.notify(title, &body) {
            warn!("{e}");
        }

        if self.config.auto_silence_secs > 0 {
            let duration = Duration::from_secs(u64::from(self.config.auto_silence_secs));
            self.timer = Some(self.sink.schedule_timer(duration, self.generation));
        }

        self.set_state(AlarmState::activated(reason, sample.observed_at))
    }

    fn start_playback(&mut self) {
        match self.sink.start_playback(self.config.sound_profile) {
            Ok(()) => self.playing = true,
            Err(e) => {
                self.playing = false;
                warn!("{e} – nova tentativa na próxima leitura");
            }
        }
    }

    fn suppress_until_normal(&mut self) -> AlarmState {
        self.halt();
        self.phase = AlarmPhase::Suppressed(Suppression::Silenced);
        self.awaiting_normal = true;
        self.set_state(AlarmState::inactive())
    }

    fn finish_test(&mut self) {
        if self.test_timer.take().is_none() {
            return;
        }
        debug!("Alarme de teste encerrado");
        if self.phase != AlarmPhase::Active {
            self.sink.stop_playback();
        }
    }

    /// Para o som e cancela o timer. Idempotente.
    fn halt(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if self.playing {
            self.sink.stop_playback();
            self.playing = false;
        }
    }

    fn set_state(&mut self, state: AlarmState) -> AlarmState {
        self.state = state;
        state
    }
}

/// Título e corpo da notificação de alarme.
pub fn notification_text(reason: TemperatureStatus, value: f64) -> (&'static str, String) {
    match reason {
        TemperatureStatus::Low => (
            "Low Temperature Alert!",
            format!("Temperature dropped to {value:.1}°C"),
        ),
        _ => (
            "High Temperature Alert!",
            format!("Temperature reached {value:.1}°C"),
        ),
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
