//! Thread de rede: cliente MQTT que assina o tópico de temperatura e
//! envia amostras e estados de conexão para o loop principal via channel.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use incubator_core::config::{BrokerConfig, BrokerTransport};
use incubator_core::stream::{ReconnectPolicy, SessionStep, StreamSession, TransportEvent};
use incubator_core::types::{ConnectionState, Sample};
use rumqttc::{
    Client, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions, Outgoing, Packet,
    QoS, Transport,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capacidade da fila de requisições do cliente rumqttc.
const REQUEST_CAPACITY: usize = 10;

/// Receivers entregues ao loop principal.
pub struct StreamChannels {
    pub samples: Receiver<Sample>,
    pub states: Receiver<ConnectionState>,
}

struct StreamSenders {
    samples: Sender<Sample>,
    states: Sender<ConnectionState>,
}

/// Handle do cliente de stream. `shutdown()` é idempotente e também roda no `Drop`.
pub struct StreamClient {
    client: Client,
    stopping: Arc<AtomicBool>,
    wake_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamClient {
    /// Encerra a conexão e aguarda a thread de rede.
    pub fn shutdown(&mut self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Encerrando stream MQTT...");
        // Acorda a thread se estiver aguardando reconexão
        self.wake_tx.take();
        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect não enviado: {e}");
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Thread de rede terminou com pânico");
            }
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Inicia a thread de rede. `Connecting` já está no channel de estados
/// quando a função retorna.
pub fn spawn_stream_thread(
    broker: &BrokerConfig,
    policy: ReconnectPolicy,
) -> std::io::Result<(StreamClient, StreamChannels)> {
    let (sample_tx, sample_rx) = bounded::<Sample>(256);
    let (state_tx, state_rx) = bounded::<ConnectionState>(16);
    let (wake_tx, wake_rx) = bounded::<()>(1);

    let client_id = client_id(&broker.client_id_prefix);
    let (client, connection) = Client::new(mqtt_options(broker, client_id.clone()), REQUEST_CAPACITY);
    let session = StreamSession::new(broker.topic.clone(), policy);

    let senders = StreamSenders {
        samples: sample_tx,
        states: state_tx,
    };
    // Capacidade 16: nunca bloqueia com o channel recém-criado
    let _ = senders.states.send(ConnectionState::Connecting);
    info!("Conectando a {} como {client_id}", broker.endpoint());

    let stopping = Arc::new(AtomicBool::new(false));
    let thread_client = client.clone();
    let thread_stopping = stopping.clone();
    let handle = std::thread::Builder::new()
        .name("mqtt-stream".into())
        .spawn(move || {
            stream_loop(connection, &thread_client, session, &senders, &wake_rx, &thread_stopping);
        })?;

    Ok((
        StreamClient {
            client,
            stopping,
            wake_tx: Some(wake_tx),
            handle: Some(handle),
        },
        StreamChannels {
            samples: sample_rx,
            states: state_rx,
        },
    ))
}

fn stream_loop(
    mut connection: Connection,
    client: &Client,
    mut session: StreamSession,
    tx: &StreamSenders,
    wake_rx: &Receiver<()>,
    stopping: &AtomicBool,
) {
    for item in connection.iter() {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        let Some(event) = translate(item) else {
            continue;
        };

        let out = session.handle(event, chrono::Utc::now());
        if let Some(state) = out.state {
            if tx.states.send(state).is_err() {
                return;
            }
        }
        if let Some(sample) = out.sample {
            if tx.samples.send(sample).is_err() {
                return;
            }
        }

        match out.step {
            SessionStep::Continue => {}
            SessionStep::Subscribe => {
                if let Err(e) = client.try_subscribe(session.topic(), QoS::AtLeastOnce) {
                    warn!("Falha ao assinar {}: {e}", session.topic());
                }
            }
            SessionStep::Wait(delay) => match wake_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                // Shutdown pedido durante a espera
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            },
            SessionStep::Stop => break,
        }
    }

    let out = session.shutdown();
    if let Some(state) = out.state {
        let _ = tx.states.send(state);
    }
    info!(
        "Thread de rede finalizada (sessões: {}, payloads descartados: {})",
        session.epoch(),
        session.dropped()
    );
}

/// Traduz um item do event loop do rumqttc. `None` = evento sem interesse.
pub(crate) fn translate(item: Result<Event, ConnectionError>) -> Option<TransportEvent> {
    match item {
        Ok(Event::Incoming(Packet::ConnAck(ack))) => match ack.code {
            ConnectReturnCode::Success => Some(TransportEvent::Connected),
            code => Some(refusal(code)),
        },
        Ok(Event::Incoming(Packet::Publish(publish))) => Some(TransportEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }),
        Ok(Event::Incoming(Packet::Disconnect)) => {
            Some(TransportEvent::Lost("broker enviou DISCONNECT".into()))
        }
        Ok(Event::Outgoing(Outgoing::Disconnect)) => Some(TransportEvent::Closed),
        Ok(_) => None,
        Err(ConnectionError::ConnectionRefused(code)) => Some(refusal(code)),
        Err(ConnectionError::RequestsDone) => Some(TransportEvent::Closed),
        Err(e) => Some(TransportEvent::Lost(e.to_string())),
    }
}

/// Credencial recusada é terminal; o resto vale nova tentativa.
fn refusal(code: ConnectReturnCode) -> TransportEvent {
    match code {
        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
            TransportEvent::Rejected(format!("{code:?}"))
        }
        other => TransportEvent::Lost(format!("conexão recusada: {other:?}")),
    }
}

fn mqtt_options(broker: &BrokerConfig, client_id: String) -> MqttOptions {
    let mut options = match broker.transport {
        BrokerTransport::Tcp => MqttOptions::new(client_id, &broker.host, broker.port),
        BrokerTransport::Tls => {
            let mut options = MqttOptions::new(client_id, &broker.host, broker.port);
            options.set_transport(Transport::tls_with_default_config());
            options
        }
        BrokerTransport::Wss => {
            // Para websocket o rumqttc espera a URL completa no lugar do host
            let mut options = MqttOptions::new(client_id, broker.endpoint(), broker.port);
            options.set_transport(Transport::wss_with_default_config());
            options
        }
    };
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
    if broker.has_credentials() {
        options.set_credentials(&broker.username, &broker.password);
    }
    options
}

/// Client id com sufixo derivado do pid e do relógio.
fn client_id(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let suffix = nanos ^ std::process::id().rotate_left(16);
    format!("{prefix}{suffix:08x}")
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
