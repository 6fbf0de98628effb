//! Observa o arquivo JSON de settings e publica snapshots validados.
//!
//! O arquivo segue o formato do registro da API (`highThreshold`,
//! `lowThreshold`, ...). Campos ausentes mantêm o valor atual; um arquivo
//! inválido é ignorado e os settings anteriores continuam valendo.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use incubator_core::settings::{SettingsError, SettingsPatch, SettingsRecord, SettingsSnapshot};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Erro ao ler {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings inválidos em {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: SettingsError,
    },
}

/// Lê o arquivo e aplica sobre `current`.
pub fn load_settings(
    path: &Path,
    current: &SettingsRecord,
) -> Result<(SettingsRecord, SettingsSnapshot), WatchError> {
    let display = path.display().to_string();
    let body = std::fs::read_to_string(path).map_err(|source| WatchError::Io {
        path: display.clone(),
        source,
    })?;
    SettingsPatch::from_json(&body)
        .and_then(|patch| current.apply(&patch))
        .map_err(|source| WatchError::Invalid {
            path: display,
            source,
        })
}

/// Handle da thread de observação. Encerra no `Drop`.
pub struct SettingsWatcher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SettingsWatcher {
    pub fn shutdown(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Thread de settings terminou com pânico");
            }
        }
    }
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Inicia a observação. O arquivo existente no início é aplicado de imediato.
pub fn spawn_settings_watcher(
    path: PathBuf,
    initial: &SettingsSnapshot,
    poll_interval: Duration,
) -> std::io::Result<(SettingsWatcher, Receiver<SettingsSnapshot>)> {
    let (tx, rx) = bounded::<SettingsSnapshot>(8);
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let record = initial.to_record();

    info!("Observando settings em {}", path.display());
    let handle = std::thread::Builder::new()
        .name("settings-watch".into())
        .spawn(move || watch_loop(&path, record, poll_interval, &tx, &stop_rx))?;

    Ok((
        SettingsWatcher {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        },
        rx,
    ))
}

fn watch_loop(
    path: &Path,
    mut record: SettingsRecord,
    poll_interval: Duration,
    tx: &Sender<SettingsSnapshot>,
    stop_rx: &Receiver<()>,
) {
    let mut last_seen: Option<SystemTime> = None;
    loop {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        if modified.is_some() && modified != last_seen {
            last_seen = modified;
            match load_settings(path, &record) {
                Ok((merged, snapshot)) => {
                    if merged != record {
                        record = merged;
                        if tx.send(snapshot).is_err() {
                            return;
                        }
                    } else {
                        debug!("Arquivo de settings sem alterações");
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }

        match stop_rx.recv_timeout(poll_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
