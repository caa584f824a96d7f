//! Bidirectional event translation between the device vocabulary and the
//! upstream realtime vocabulary.
//!
//! One translator per connection. Device events arrive from the device
//! read loop, upstream events from the upstream read loop; the two loops
//! drive disjoint transcoder halves, so the uplink and downlink each sit
//! behind their own lock and are never contended in a correct session.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::audio::{Downlink, FrameSink, GainConfig, Transcoder, Uplink, UPSTREAM_SAMPLE_RATE};
use crate::config::ServerConfig;
use crate::errors::GatewayError;
use crate::protocol::device::{self, AudioParams, TtsState};
use crate::protocol::upstream::{
    self, AudioFormat, ClientSession, IntOrInf, Modality, ToolChoice, TurnDetection,
};
use crate::session::{DeviceAudio, Session};

/// Frame duration the gateway advertises back to the device.
const HELLO_FRAME_DURATION_MS: u32 = 60;

/// Token budget requested for every session.
const MAX_OUTPUT_TOKENS: i64 = 4096;

/// One entry on the device write queue: a text event serialized by the
/// writer, a raw synthesized audio frame, or an orderly close.
#[derive(Debug)]
pub enum Outbound {
    Event(device::ServerEvent),
    Audio(Bytes),
    /// Flush everything queued so far, then close the device socket.
    Close,
}

pub struct Translator {
    session: Arc<Mutex<Session>>,
    uplink: Mutex<Option<Uplink>>,
    downlink: Mutex<Option<Downlink>>,
    write_tx: mpsc::Sender<Outbound>,
    upstream_tx: mpsc::Sender<upstream::ClientEvent>,
    config: Arc<ServerConfig>,
    gain: GainConfig,
}

impl Translator {
    pub fn new(
        session: Arc<Mutex<Session>>,
        write_tx: mpsc::Sender<Outbound>,
        upstream_tx: mpsc::Sender<upstream::ClientEvent>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            session,
            uplink: Mutex::new(None),
            downlink: Mutex::new(None),
            write_tx,
            upstream_tx,
            config,
            gain: GainConfig::default(),
        }
    }

    /// Handle one event from the device.
    pub async fn dispatch_client_event(&self, event: device::ClientEvent) -> Result<(), GatewayError> {
        match event {
            device::ClientEvent::Hello { audio_params, .. } => {
                self.handle_hello(audio_params).await
            }
            device::ClientEvent::Listen { state, mode } => {
                debug!(?state, ?mode, "listen state change");
                Ok(())
            }
            device::ClientEvent::Abort { reason } => {
                debug!(%reason, "device aborted response");
                self.send_upstream(upstream::ClientEvent::ResponseCancel {
                    event_id: String::new(),
                })
                .await
            }
            device::ClientEvent::Iot { .. } => Ok(()),
            device::ClientEvent::AppendBuffer(data) => self.handle_append_buffer(data).await,
        }
    }

    async fn handle_hello(&self, audio_params: Option<AudioParams>) -> Result<(), GatewayError> {
        let params = audio_params.ok_or(GatewayError::InvalidAudioParams)?;
        if params.format.is_empty()
            || params.sample_rate == 0
            || params.channels == 0
            || params.frame_duration == 0
        {
            return Err(GatewayError::InvalidAudioParams);
        }

        // The emit path for synthesized frames: enqueue on the device write
        // queue and credit the pacing clock. A full queue blocks here so no
        // audio is ever dropped.
        let tx = self.write_tx.clone();
        let session = self.session.clone();
        let frame_ms = params.frame_duration as u64;
        let sink: FrameSink = Arc::new(move |frame| {
            let tx = tx.clone();
            let session = session.clone();
            Box::pin(async move {
                if tx.send(Outbound::Audio(frame)).await.is_ok() {
                    session.lock().await.pacing.add_emitted(frame_ms);
                }
            })
        });

        let (uplink, downlink) =
            Transcoder::new(params.sample_rate, params.frame_duration, self.gain, sink)?.split();
        *self.uplink.lock().await = Some(uplink);
        *self.downlink.lock().await = Some(downlink);
        self.session.lock().await.device_audio = Some(DeviceAudio::from_params(&params));

        let (instructions, voice) = {
            let session = self.session.lock().await;
            (
                self.config.openai.system_prompt.clone(),
                session.default_voice.clone(),
            )
        };
        self.send_upstream(upstream::ClientEvent::SessionUpdate {
            event_id: String::new(),
            session: ClientSession {
                modalities: vec![Modality::Text, Modality::Audio],
                instructions: Some(instructions),
                voice: Some(voice),
                input_audio_format: Some(AudioFormat::Pcm16),
                output_audio_format: Some(AudioFormat::Pcm16),
                turn_detection: Some(TurnDetection::server_vad()),
                tool_choice: Some(ToolChoice::required()),
                max_output_tokens: Some(IntOrInf::new(MAX_OUTPUT_TOKENS)),
                ..Default::default()
            },
        })
        .await
    }

    async fn handle_append_buffer(&self, data: Bytes) -> Result<(), GatewayError> {
        if data.is_empty() {
            return Ok(());
        }
        let audio = {
            let mut guard = self.uplink.lock().await;
            let uplink = guard.as_mut().ok_or(GatewayError::AudioBeforeHello)?;
            uplink.opus_to_pcm_base64(&data)?
        };
        self.send_upstream(upstream::ClientEvent::InputAudioBufferAppend {
            event_id: String::new(),
            audio,
        })
        .await
    }

    /// Handle one event from the upstream.
    pub async fn dispatch_server_event(
        &self,
        event: upstream::ServerEvent,
    ) -> Result<(), GatewayError> {
        match event {
            upstream::ServerEvent::Error { error, .. } => {
                warn!(kind = %error.kind, message = %error.message, "upstream error");
                let message =
                    serde_json::to_string(&error).unwrap_or_else(|_| error.message.clone());
                let session_id = self.session_id().await;
                self.emit(device::ServerEvent::Error {
                    error: message,
                    session_id,
                })
                .await
            }

            upstream::ServerEvent::SessionCreated { session, .. } => {
                debug!(session_id = %session.id, "upstream session created");
                self.session.lock().await.apply_snapshot(session);
                Ok(())
            }

            upstream::ServerEvent::SessionUpdated { session, .. } => {
                self.session.lock().await.apply_snapshot(session);
                let (session_id, format) = {
                    let session = self.session.lock().await;
                    let format = session
                        .device_audio
                        .as_ref()
                        .map(|a| a.format.clone())
                        .unwrap_or_else(|| self.config.xiaozhi.format.clone());
                    (session.id().to_string(), format)
                };
                self.emit(device::ServerEvent::Hello {
                    transport: self.config.xiaozhi.transport.clone(),
                    audio_params: AudioParams {
                        format,
                        sample_rate: UPSTREAM_SAMPLE_RATE,
                        channels: 1,
                        frame_duration: HELLO_FRAME_DURATION_MS,
                    },
                    session_id,
                })
                .await
            }

            upstream::ServerEvent::InputAudioBufferCommitted { .. } => {
                let session_id = self.session_id().await;
                self.emit(device::ServerEvent::Tts {
                    state: TtsState::Start,
                    text: None,
                    sample_rate: None,
                    session_id,
                })
                .await
            }

            upstream::ServerEvent::InputAudioTranscriptionCompleted { transcript, .. } => {
                let session_id = self.session_id().await;
                self.emit(device::ServerEvent::Stt {
                    text: transcript,
                    session_id: session_id.clone(),
                })
                .await?;
                self.emit(device::ServerEvent::Llm {
                    text: "😊".to_string(),
                    emotion: "happy".to_string(),
                    session_id,
                })
                .await
            }

            upstream::ServerEvent::AudioTranscriptDone { transcript, .. } => {
                let session_id = self.session_id().await;
                self.emit(device::ServerEvent::Tts {
                    state: TtsState::SentenceStart,
                    text: Some(transcript),
                    sample_rate: None,
                    session_id,
                })
                .await
            }

            upstream::ServerEvent::ContentPartDone { part, .. } => {
                let session_id = self.session_id().await;
                self.emit(device::ServerEvent::Tts {
                    state: TtsState::SentenceEnd,
                    text: Some(part.transcript.unwrap_or_default()),
                    sample_rate: None,
                    session_id,
                })
                .await
            }

            upstream::ServerEvent::AudioDelta { delta, .. } => {
                self.session.lock().await.pacing.mark_first_delta();
                let mut guard = self.downlink.lock().await;
                let downlink = guard.as_mut().ok_or(GatewayError::AudioBeforeHello)?;
                downlink.resolve_pcm(&delta).await?;
                Ok(())
            }

            upstream::ServerEvent::ResponseDone { .. } => {
                // Playback pacing gate: never announce tts.stop before the
                // device had wall-clock time to play what was queued.
                let wait = self.session.lock().await.pacing.remaining_wait();
                if !wait.is_zero() {
                    debug!(wait_ms = wait.as_millis() as u64, "pacing response end");
                    tokio::time::sleep(wait).await;
                }
                let session_id = {
                    let mut session = self.session.lock().await;
                    session.pacing.reset();
                    session.id().to_string()
                };
                self.emit(device::ServerEvent::Tts {
                    state: TtsState::Stop,
                    text: None,
                    sample_rate: None,
                    session_id,
                })
                .await
            }

            // The remaining lifecycle events have no device-side counterpart.
            _ => Ok(()),
        }
    }

    /// Best-effort device error event carrying the current session id.
    pub async fn error_event(&self, message: &str) -> device::ServerEvent {
        device::ServerEvent::Error {
            error: message.to_string(),
            session_id: self.session_id().await,
        }
    }

    pub async fn session_id(&self) -> String {
        self.session.lock().await.id().to_string()
    }

    async fn emit(&self, event: device::ServerEvent) -> Result<(), GatewayError> {
        self.write_tx
            .send(Outbound::Event(event))
            .await
            .map_err(|_| GatewayError::WriteQueueClosed)
    }

    async fn send_upstream(&self, event: upstream::ClientEvent) -> Result<(), GatewayError> {
        self.upstream_tx
            .send(event)
            .await
            .map_err(|_| GatewayError::UpstreamClosed)
    }
}
