//! # Incubator Monitor
//!
//! Assina o tópico de temperatura da incubadora no broker MQTT, calcula a
//! tendência, classifica cada leitura contra os limites e toca o alarme
//! (sino do terminal) enquanto a temperatura estiver fora da faixa.
//!
//! ## Comandos (stdin)
//! - `s`: Silenciar o alarme até a temperatura normalizar
//! - `t`: Alarme de teste (3s)
//! - `?`: Status atual
//! - `q`: Sair

mod event_loop;
mod net_thread;
mod settings_watch;
mod sink;

use crossbeam_channel::{Sender, bounded, never};
use event_loop::{Command, Exit, Inputs, MonitorEvent};
use incubator_core::config::AppConfig;
use incubator_core::monitor::Monitor;
use incubator_core::types::TemperatureStatus;
use sink::BellSink;
use std::io::BufRead;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = std::env::args()
        .nth(1)
        .map(Into::into)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        error!("Configuração inválida em {}", config_path.display());
        return ExitCode::FAILURE;
    }

    // ── Banner ──
    let thresholds = config.settings.thresholds;
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🌡  INCUBATOR MONITOR – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Broker:    {}", config.broker.endpoint());
    println!("  Tópico:    {}", config.broker.topic);
    println!("  Faixa:     {:.1}–{:.1}°C", thresholds.low, thresholds.high);
    println!(
        "  Alarme:    {} | som {} | auto-silêncio {}s",
        if config.settings.alarm.master_enabled { "ON" } else { "OFF" },
        config.settings.alarm.sound_profile,
        config.settings.alarm.auto_silence_secs
    );
    println!("  Comandos:  s = silenciar | t = testar | ? = status | q = sair");
    println!("══════════════════════════════════════════════");
    println!();

    match run(&config, &config_path) {
        Ok(Exit::Quit) => ExitCode::SUCCESS,
        Ok(Exit::StreamClosed) => {
            error!("Stream encerrado sem possibilidade de reconexão");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Falha ao iniciar: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(
    config: &AppConfig,
    config_path: &std::path::Path,
) -> Result<Exit, Box<dyn std::error::Error>> {
    // ── Alarme ──
    let (timer_tx, timer_rx) = bounded::<u64>(16);
    let sink = BellSink::new(config.sink.clone(), timer_tx);
    let mut monitor = Monitor::new(sink, config.settings, config.policy)?;

    // ── Settings externos ──
    let mut watcher = None;
    let settings_rx = match config.settings_file_path(config_path) {
        Some(path) => {
            let interval = Duration::from_secs_f64(config.settings_file.poll_interval_secs);
            let (handle, rx) = settings_watch::spawn_settings_watcher(path, &config.settings, interval)?;
            watcher = Some(handle);
            rx
        }
        None => never(),
    };

    // ── Stream MQTT ──
    let (mut stream, channels) = net_thread::spawn_stream_thread(&config.broker, config.reconnect)?;

    // ── Comandos do operador ──
    let (command_tx, command_rx) = bounded::<Command>(8);
    spawn_command_reader(command_tx)?;

    let inputs = Inputs {
        samples: channels.samples,
        states: channels.states,
        settings: settings_rx,
        timers: timer_rx,
        commands: command_rx,
    };
    let exit = event_loop::run(&mut monitor, inputs, present);

    stream.shutdown();
    if let Some(mut watcher) = watcher {
        watcher.shutdown();
    }
    info!("Monitor finalizado");
    Ok(exit)
}

/// Lê comandos do stdin. Sem stdin (serviço), a thread apenas termina.
fn spawn_command_reader(tx: Sender<Command>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None => println!("  Comando desconhecido: {} (s | t | ? | q)", line.trim()),
                }
            }
        })?;
    Ok(())
}

// ──────────────────────────────────────────────
// Apresentação no terminal
// ──────────────────────────────────────────────

fn present(event: MonitorEvent) {
    match event {
        MonitorEvent::Reading(reading) => {
            let marker = match reading.status {
                TemperatureStatus::Normal => " ",
                TemperatureStatus::High => "▲",
                TemperatureStatus::Low => "▼",
            };
            println!(
                "{} {marker} {:>6.1}°C  {:<7}  {}",
                reading.sample.observed_at.format("%H:%M:%S"),
                reading.sample.value,
                reading.trend.to_string(),
                reading.status
            );
            if let Some(alarm) = reading.alarm {
                present_alarm(&alarm);
            }
        }
        MonitorEvent::Alarm(alarm) => present_alarm(&alarm),
        MonitorEvent::Connection(state) => println!("  ◆ Conexão: {state}"),
        MonitorEvent::TestAlarm => println!("  ◆ Alarme de teste (3s)"),
        MonitorEvent::Settings(settings) => println!(
            "  ◆ Settings: {:.1}–{:.1}°C | alarme {} | som {} | auto-silêncio {}s",
            settings.thresholds.low,
            settings.thresholds.high,
            if settings.alarm.master_enabled { "ON" } else { "OFF" },
            settings.alarm.sound_profile,
            settings.alarm.auto_silence_secs
        ),
        MonitorEvent::Status {
            connection,
            alarm,
            last,
        } => {
            println!("  ── Status ──");
            println!("  Conexão: {connection}");
            match last {
                Some(r) => println!(
                    "  Última:  {:.1}°C {} {} ({})",
                    r.sample.value,
                    r.trend,
                    r.status,
                    r.sample.observed_at.format("%H:%M:%S")
                ),
                None => println!("  Última:  --"),
            }
            present_alarm(&alarm);
        }
    }
}

fn present_alarm(alarm: &incubator_core::types::AlarmState) {
    match (alarm.active, alarm.reason, alarm.activated_at) {
        (true, Some(reason), Some(at)) => {
            println!("  ⚠ ALARME {reason} desde {}", at.format("%H:%M:%S"));
        }
        _ => println!("  ✓ Alarme inativo"),
    }
}
