//! Loop principal: multiplexa amostras, estados de conexão, settings,
//! timers e comandos do operador sobre um único [`Monitor`].
//!
//! Tudo que muda o estado do monitor passa por esta thread, então leitura,
//! alarme e timer nunca competem entre si.

use crossbeam_channel::{Receiver, never, select};
use incubator_core::alarm::AlarmSink;
use incubator_core::monitor::{Monitor, Reading};
use incubator_core::settings::SettingsSnapshot;
use incubator_core::types::{AlarmState, ConnectionState, Sample};
use tracing::{debug, info};

/// Comandos digitados no terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Silence,
    /// Alarme de teste de 3s
    Test,
    Status,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "s" | "silence" | "mute" => Some(Self::Silence),
            "t" | "test" => Some(Self::Test),
            "?" | "status" => Some(Self::Status),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// O que o apresentador recebe.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Reading(Reading),
    /// Transição fora de uma leitura (timer, settings, silêncio manual)
    Alarm(AlarmState),
    Connection(ConnectionState),
    Settings(SettingsSnapshot),
    /// Alarme de teste começou
    TestAlarm,
    Status {
        connection: ConnectionState,
        alarm: AlarmState,
        last: Option<Reading>,
    },
}

/// Por que o loop terminou.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Operador pediu para sair
    Quit,
    /// Thread de rede terminou (credencial recusada ou tentativas esgotadas)
    StreamClosed,
}

#[derive(Debug, Clone, Copy)]
enum Input {
    States,
    Settings,
    Timers,
    Commands,
}

pub struct Inputs {
    pub samples: Receiver<Sample>,
    pub states: Receiver<ConnectionState>,
    pub settings: Receiver<SettingsSnapshot>,
    pub timers: Receiver<u64>,
    pub commands: Receiver<Command>,
}

/// Roda até o operador sair ou o stream fechar.
pub fn run<S, F>(monitor: &mut Monitor<S>, inputs: Inputs, mut present: F) -> Exit
where
    S: AlarmSink,
    F: FnMut(MonitorEvent),
{
    let Inputs {
        samples,
        mut states,
        mut settings,
        mut timers,
        mut commands,
    } = inputs;
    let mut stream_done = false;

    loop {
        // Canal fechado sai do select (senão o recv dispara em loop)
        let mut closed: Option<Input> = None;

        select! {
            recv(samples) -> msg => match msg {
                Ok(sample) => present(MonitorEvent::Reading(monitor.handle_sample(sample))),
                // Sem mais amostras: o stream acabou
                Err(_) => return Exit::StreamClosed,
            },
            recv(states) -> msg => match msg {
                Ok(state) => {
                    monitor.handle_connection(state);
                    present(MonitorEvent::Connection(state));
                    if state == ConnectionState::Disconnected {
                        stream_done = true;
                    }
                }
                Err(_) => closed = Some(Input::States),
            },
            recv(settings) -> msg => match msg {
                Ok(snapshot) => {
                    if let Ok(change) = monitor.update_settings(snapshot) {
                        present(MonitorEvent::Settings(*monitor.settings()));
                        if let Some(state) = change {
                            present(MonitorEvent::Alarm(state));
                        }
                    }
                }
                Err(_) => closed = Some(Input::Settings),
            },
            recv(timers) -> msg => match msg {
                Ok(generation) => {
                    if let Some(state) = monitor.handle_timer(generation) {
                        present(MonitorEvent::Alarm(state));
                    }
                }
                Err(_) => closed = Some(Input::Timers),
            },
            recv(commands) -> msg => match msg {
                Ok(Command::Silence) => {
                    if let Some(state) = monitor.silence() {
                        present(MonitorEvent::Alarm(state));
                    }
                }
                Ok(Command::Test) => {
                    if monitor.test_alarm() {
                        present(MonitorEvent::TestAlarm);
                    }
                }
                Ok(Command::Status) => present(MonitorEvent::Status {
                    connection: monitor.connection(),
                    alarm: monitor.alarm_state(),
                    last: monitor.last_reading().copied(),
                }),
                Ok(Command::Quit) => {
                    info!("Saída solicitada pelo operador");
                    return Exit::Quit;
                }
                Err(_) => closed = Some(Input::Commands),
            },
        }

        match closed {
            Some(Input::States) => states = never(),
            Some(Input::Settings) => settings = never(),
            Some(Input::Timers) => timers = never(),
            Some(Input::Commands) => commands = never(),
            None => {}
        }
        if let Some(input) = closed {
            debug!("Canal {input:?} encerrado");
        }

        // Após Disconnected, termina assim que as amostras pendentes forem processadas
        if stream_done && samples.is_empty() {
            return Exit::StreamClosed;
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use crossbeam_channel::{Sender, unbounded};
    use incubator_core::alarm::{CancelHandle, SinkError};
    use incubator_core::monitor::MonitorPolicy;
    use incubator_core::types::{SoundProfile, TemperatureStatus, Trend};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSink {
        playing: bool,
        scheduled: Vec<u64>,
    }

    impl AlarmSink for FakeSink {
        fn start_playback(&mut self, _profile: SoundProfile) -> Result<(), SinkError> {
            self.playing = true;
            Ok(())
        }

        fn stop_playback(&mut self) {
            self.playing = false;
        }

        fn schedule_timer(&mut self, _duration: Duration, generation: u64) -> CancelHandle {
            self.scheduled.push(generation);
            CancelHandle::new()
        }

        fn notify(&mut self, _title: &str, _body: &str) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct Harness {
        samples: Sender<Sample>,
        states: Sender<ConnectionState>,
        settings: Sender<SettingsSnapshot>,
        timers: Sender<u64>,
        commands: Sender<Command>,
        inputs: Inputs,
    }

    fn harness() -> Harness {
        let (samples, samples_rx) = unbounded();
        let (states, states_rx) = unbounded();
        let (settings, settings_rx) = unbounded();
        let (timers, timers_rx) = unbounded();
        let (commands, commands_rx) = unbounded();
        Harness {
            samples,
            states,
            settings,
            timers,
            commands,
            inputs: Inputs {
                samples: samples_rx,
                states: states_rx,
                settings: settings_rx,
                timers: timers_rx,
                commands: commands_rx,
            },
        }
    }

    fn monitor() -> Monitor<FakeSink> {
        Monitor::new(FakeSink::default(), SettingsSnapshot::default(), MonitorPolicy::default()).unwrap()
    }

    fn sample(value: f64, offset_secs: i64) -> Sample {
        Sample::new(value, Utc::now() + ChronoDuration::seconds(offset_secs), 1)
    }

    fn readings(events: &[MonitorEvent]) -> Vec<Reading> {
        events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Reading(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn command_parsing() {
        assert_eq!(Command::parse(" S "), Some(Command::Silence));
        assert_eq!(Command::parse("status"), Some(Command::Status));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("T"), Some(Command::Test));
        assert_eq!(Command::parse("louder"), None);
    }

    #[test]
    fn samples_are_processed_in_order_until_quit() {
        let h = harness();
        for (i, v) in [37.0, 37.2, 39.0].into_iter().enumerate() {
            h.samples.send(sample(v, i as i64)).unwrap();
        }
        let mut monitor = monitor();
        let mut events = Vec::new();

        // Quit só depois das amostras: o loop processa tudo que já chegou
        let commands = h.commands.clone();
        let inputs = h.inputs;
        let samples_tx = h.samples;
        let exit = std::thread::scope(|scope| {
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                commands.send(Command::Quit).unwrap();
            });
            run(&mut monitor, inputs, |e| events.push(e))
        });
        drop(samples_tx);

        assert_eq!(exit, Exit::Quit);
        let readings = readings(&events);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[1].trend, Trend::Rising);
        assert_eq!(readings[2].status, TemperatureStatus::High);
        assert!(readings[2].alarm.unwrap().active);
        assert!(monitor.alarm().sink().playing);
    }

    #[test]
    fn timer_and_silence_reach_the_controller() {
        let h = harness();
        let mut monitor = monitor();
        monitor.handle_sample(sample(39.0, 0));
        let generation = monitor.alarm().generation();
        assert_eq!(monitor.alarm().sink().scheduled, vec![generation]);

        // Timer obsoleto é ignorado; o atual silencia
        h.timers.send(generation + 5).unwrap();
        h.timers.send(generation).unwrap();
        h.commands.send(Command::Status).unwrap();
        let mut events = Vec::new();
        let exit = std::thread::scope(|scope| {
            let commands = h.commands.clone();
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                commands.send(Command::Quit).unwrap();
            });
            run(&mut monitor, h.inputs, |e| events.push(e))
        });

        assert_eq!(exit, Exit::Quit);
        assert!(events.contains(&MonitorEvent::Alarm(AlarmState::inactive())));
        assert!(!monitor.alarm_state().active);
        assert!(!monitor.alarm().sink().playing);
        drop((h.samples, h.states, h.settings));
    }

    #[test]
    fn disconnected_stream_ends_the_loop() {
        let h = harness();
        h.samples.send(sample(37.0, 0)).unwrap();
        h.states.send(ConnectionState::Connected).unwrap();
        h.states.send(ConnectionState::Disconnected).unwrap();

        let mut monitor = monitor();
        let mut events = Vec::new();
        let exit = run(&mut monitor, h.inputs, |e| events.push(e));

        assert_eq!(exit, Exit::StreamClosed);
        assert_eq!(readings(&events).len(), 1);
        assert_eq!(monitor.connection(), ConnectionState::Disconnected);
        drop((h.samples, h.states, h.settings, h.timers, h.commands));
    }

    #[test]
    fn connection_states_never_reorder_trend_of_queued_samples() {
        // Estados e amostras vêm por canais distintos; o select pode
        // atender qualquer um primeiro
        for _ in 0..50 {
            let h = harness();
            h.samples.send(sample(37.0, 0)).unwrap();
            h.samples.send(sample(37.4, 1)).unwrap();
            h.states.send(ConnectionState::Reconnecting).unwrap();
            h.states.send(ConnectionState::Disconnected).unwrap();

            let mut monitor = monitor();
            let mut events = Vec::new();
            let exit = run(&mut monitor, h.inputs, |e| events.push(e));

            assert_eq!(exit, Exit::StreamClosed);
            let readings = readings(&events);
            assert_eq!(readings.len(), 2);
            assert_eq!(readings[1].trend, Trend::Rising);
            drop((h.samples, h.states, h.settings, h.timers, h.commands));
        }
    }

    #[test]
    fn test_command_rings_and_stops_without_alarm() {
        let h = harness();
        h.commands.send(Command::Test).unwrap();
        let mut monitor = monitor();
        let mut events = Vec::new();
        let mut test_started = false;

        let exit = std::thread::scope(|scope| {
            let commands = h.commands.clone();
            let timers = h.timers.clone();
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                timers.send(incubator_core::alarm::TEST_TIMER_GENERATION).unwrap();
                std::thread::sleep(Duration::from_millis(50));
                commands.send(Command::Quit).unwrap();
            });
            run(&mut monitor, h.inputs, |e| {
                if e == MonitorEvent::TestAlarm {
                    test_started = true;
                }
                events.push(e);
            })
        });

        assert_eq!(exit, Exit::Quit);
        assert!(test_started);
        assert_eq!(
            monitor.alarm().sink().scheduled,
            vec![incubator_core::alarm::TEST_TIMER_GENERATION]
        );
        assert!(!monitor.alarm().sink().playing);
        assert_eq!(monitor.alarm_state(), AlarmState::inactive());
        assert!(!events.iter().any(|e| matches!(e, MonitorEvent::Alarm(_))));
        drop((h.samples, h.states, h.settings));
    }

    #[test]
    fn settings_update_switches_master_off() {
        let h = harness();
        let mut monitor = monitor();
        monitor.handle_sample(sample(39.0, 0));
        assert!(monitor.alarm_state().active);

        let mut off = SettingsSnapshot::default();
        off.alarm.master_enabled = false;
        h.settings.send(off).unwrap();

        let mut events = Vec::new();
        let exit = std::thread::scope(|scope| {
            let commands = h.commands.clone();
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                commands.send(Command::Quit).unwrap();
            });
            run(&mut monitor, h.inputs, |e| events.push(e))
        });

        assert_eq!(exit, Exit::Quit);
        assert!(!monitor.alarm_state().active);
        assert!(!monitor.alarm().sink().playing);
        assert!(events.contains(&MonitorEvent::Settings(off)));
        assert!(events.contains(&MonitorEvent::Alarm(AlarmState::inactive())));
        drop((h.samples, h.states, h.timers));
    }
}
