//! Sink do alarme no terminal: sino (BEL) em thread própria, timers de
//! auto-silêncio e notificações no log.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use incubator_core::alarm::{AlarmSink, CancelHandle, SinkError};
use incubator_core::config::SinkConfig;
use incubator_core::types::SoundProfile;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Intervalo entre ciclos de toque.
const BEEP_PERIOD: Duration = Duration::from_millis(800);

/// Espaçamento entre toques do mesmo ciclo.
const BEEP_GAP: Duration = Duration::from_millis(120);

/// Toques por ciclo para cada perfil.
fn rings_per_cycle(profile: SoundProfile) -> u32 {
    match profile {
        SoundProfile::Default | SoundProfile::Custom => 1,
        SoundProfile::Pulse => 2,
        SoundProfile::Siren => 3,
    }
}

struct Player {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct BellSink {
    config: SinkConfig,
    timer_tx: Sender<u64>,
    player: Option<Player>,
    rings: Arc<AtomicU64>,
    pending_timers: Arc<AtomicUsize>,
}

impl BellSink {
    /// `timer_tx` recebe a geração de cada timer que expirar sem cancelamento.
    pub fn new(config: SinkConfig, timer_tx: Sender<u64>) -> Self {
        Self {
            config,
            timer_tx,
            player: None,
            rings: Arc::new(AtomicU64::new(0)),
            pending_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_some()
    }

    /// Toques emitidos desde a criação.
    pub fn rings(&self) -> u64 {
        self.rings.load(Ordering::Relaxed)
    }

    /// Threads de timer ainda vivas.
    pub fn pending_timers(&self) -> usize {
        self.pending_timers.load(Ordering::SeqCst)
    }
}

impl AlarmSink for BellSink {
    fn start_playback(&mut self, profile: SoundProfile) -> Result<(), SinkError> {
        if self.player.is_some() {
            return Ok(());
        }
        if profile == SoundProfile::Custom {
            debug!("Som customizado não suportado no terminal, usando padrão");
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let rings = self.rings.clone();
        let audible = self.config.bell_enabled;
        let per_cycle = rings_per_cycle(profile);
        let handle = std::thread::Builder::new()
            .name("alarm-bell".into())
            .spawn(move || bell_loop(&stop_rx, &rings, per_cycle, audible))
            .map_err(|e| SinkError::Playback(e.to_string()))?;

        debug!("Sino iniciado ({profile})");
        self.player = Some(Player { stop_tx, handle });
        Ok(())
    }

    fn stop_playback(&mut self) {
        let Some(player) = self.player.take() else {
            return;
        };
        let _ = player.stop_tx.send(());
        if player.handle.join().is_err() {
            warn!("Thread do sino terminou com pânico");
        }
        debug!("Sino parado");
    }

    fn schedule_timer(&mut self, duration: Duration, generation: u64) -> CancelHandle {
        let handle = CancelHandle::new();
        let cancelled = handle.clone();
        let tx = self.timer_tx.clone();
        // Cancelar derruba o remetente e acorda a thread
        let (wake_tx, wake_rx) = bounded::<()>(1);
        handle.on_cancel(move || drop(wake_tx));

        let pending = self.pending_timers.clone();
        pending.fetch_add(1, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("alarm-timer".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = wake_rx.recv_timeout(duration) {
                    if !cancelled.is_cancelled() {
                        let _ = tx.send(generation);
                    }
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            self.pending_timers.fetch_sub(1, Ordering::SeqCst);
            error!("Falha ao agendar timer do alarme: {e}");
        }
        handle
    }

    fn notify(&mut self, title: &str, body: &str) -> Result<(), SinkError> {
        info!("🔔 {title} {body}");
        if self.config.console_notifications {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "\n  🔔 {title}\n     {body}\n")
                .map_err(|e| SinkError::Notification(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for BellSink {
    fn drop(&mut self) {
        self.stop_playback();
    }
}

fn bell_loop(stop_rx: &Receiver<()>, rings: &AtomicU64, per_cycle: u32, audible: bool) {
    loop {
        for i in 0..per_cycle {
            if audible {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(b"\x07");
                let _ = stdout.flush();
            }
            rings.fetch_add(1, Ordering::Relaxed);
            if i + 1 < per_cycle && wait_or_stop(stop_rx, BEEP_GAP) {
                return;
            }
        }
        if wait_or_stop(stop_rx, BEEP_PERIOD) {
            return;
        }
    }
}

/// Dorme `period`; retorna `true` se pediram para parar.
fn wait_or_stop(stop_rx: &Receiver<()>, period: Duration) -> bool {
    !matches!(stop_rx.recv_timeout(period), Err(RecvTimeoutError::Timeout))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
