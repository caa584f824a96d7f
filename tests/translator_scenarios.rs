//! End-to-end translation scenarios driven through the translator with
//! scripted upstream event sequences, without real sockets.

use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use xiaozhi_gateway::handlers::{Outbound, Translator};
use xiaozhi_gateway::protocol::device::{self, AudioParams, TtsState};
use xiaozhi_gateway::protocol::upstream::{
    self, ContentPart, ContentType, Response, ServerSession,
};
use xiaozhi_gateway::session::Session;
use xiaozhi_gateway::ServerConfig;

struct Rig {
    translator: Translator,
    write_rx: mpsc::Receiver<Outbound>,
    upstream_rx: mpsc::Receiver<upstream::ClientEvent>,
}

fn rig() -> Rig {
    let mut config = ServerConfig::default();
    config.openai.api_key = "sk-test".to_string();
    let config = Arc::new(config);
    let session = Arc::new(Mutex::new(Session::new(
        config.openai.model.clone(),
        config.openai.voice.clone(),
    )));
    let (write_tx, write_rx) = mpsc::channel(256);
    let (upstream_tx, upstream_rx) = mpsc::channel(256);
    Rig {
        translator: Translator::new(session, write_tx, upstream_tx, config),
        write_rx,
        upstream_rx,
    }
}

fn device_hello() -> device::ClientEvent {
    device::ClientEvent::Hello {
        version: 1,
        transport: "websocket".into(),
        audio_params: Some(AudioParams {
            format: "opus".into(),
            sample_rate: 16000,
            channels: 1,
            frame_duration: 20,
        }),
    }
}

fn session_descriptor(id: &str) -> ServerSession {
    ServerSession {
        id: id.to_string(),
        object: "realtime.session".into(),
        model: "gpt-4o-realtime-preview".into(),
        ..Default::default()
    }
}

fn audio_delta(samples: usize) -> upstream::ServerEvent {
    let mut raw = Vec::with_capacity(samples * 2);
    for i in 0..samples {
        let t = i as f64 / 24000.0;
        let v = ((t * 330.0 * 2.0 * std::f64::consts::PI).sin() * 4000.0) as i16;
        raw.extend_from_slice(&v.to_le_bytes());
    }
    upstream::ServerEvent::AudioDelta {
        event_id: String::new(),
        response_id: "resp_1".into(),
        item_id: "item_1".into(),
        output_index: 0,
        content_index: 0,
        delta: BASE64_STANDARD.encode(&raw),
    }
}

fn expect_event(outbound: Outbound) -> device::ServerEvent {
    match outbound {
        Outbound::Event(event) => event,
        other => panic!("expected text event, got {other:?}"),
    }
}

/// S1: hello negotiation. The device hello is answered exactly once, after
/// `session.updated`, with the upstream-assigned session id and the
/// gateway's fixed audio parameters.
#[tokio::test]
async fn happy_hello() {
    let mut rig = rig();

    rig.translator
        .dispatch_client_event(device_hello())
        .await
        .unwrap();
    assert!(matches!(
        rig.upstream_rx.recv().await.unwrap(),
        upstream::ClientEvent::SessionUpdate { .. }
    ));

    rig.translator
        .dispatch_server_event(upstream::ServerEvent::SessionCreated {
            event_id: String::new(),
            session: session_descriptor("sess_abc"),
        })
        .await
        .unwrap();
    // No device event yet.
    assert!(rig.write_rx.try_recv().is_err());

    rig.translator
        .dispatch_server_event(upstream::ServerEvent::SessionUpdated {
            event_id: String::new(),
            session: session_descriptor("sess_abc"),
        })
        .await
        .unwrap();

    match expect_event(rig.write_rx.recv().await.unwrap()) {
        device::ServerEvent::Hello {
            transport,
            audio_params,
            session_id,
        } => {
            assert_eq!(transport, "websocket");
            assert_eq!(session_id, "sess_abc");
            assert_eq!(audio_params.format, "opus");
            assert_eq!(audio_params.sample_rate, 24000);
            assert_eq!(audio_params.channels, 1);
            assert_eq!(audio_params.frame_duration, 60);
        }
        other => panic!("expected hello, got {other:?}"),
    }
    assert!(rig.write_rx.try_recv().is_err());
}

/// S2: one full turn. The device sees, in order: tts.start, stt, llm,
/// tts.sentence_start, at least one binary frame, tts.sentence_end,
/// tts.stop — and no audio after tts.stop.
#[tokio::test]
async fn one_turn_event_order() {
    let mut rig = rig();
    rig.translator
        .dispatch_client_event(device_hello())
        .await
        .unwrap();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::SessionCreated {
            event_id: String::new(),
            session: session_descriptor("sess_turn"),
        })
        .await
        .unwrap();

    rig.translator
        .dispatch_server_event(upstream::ServerEvent::InputAudioBufferCommitted {
            event_id: String::new(),
            previous_item_id: String::new(),
            item_id: "item_user".into(),
        })
        .await
        .unwrap();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::InputAudioTranscriptionCompleted {
            event_id: String::new(),
            item_id: "item_user".into(),
            content_index: 0,
            transcript: "hi".into(),
        })
        .await
        .unwrap();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::AudioTranscriptDone {
            event_id: String::new(),
            response_id: "resp_1".into(),
            item_id: "item_1".into(),
            output_index: 0,
            content_index: 0,
            transcript: "hello".into(),
        })
        .await
        .unwrap();
    // Two deltas of 1440 samples: exactly two 60 ms device frames.
    for _ in 0..2 {
        rig.translator
            .dispatch_server_event(audio_delta(1440))
            .await
            .unwrap();
    }
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::ContentPartDone {
            event_id: String::new(),
            response_id: "resp_1".into(),
            item_id: "item_1".into(),
            output_index: 0,
            content_index: 0,
            part: ContentPart {
                kind: ContentType::Audio,
                text: None,
                audio: None,
                transcript: Some("hello".into()),
            },
        })
        .await
        .unwrap();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::ResponseDone {
            event_id: String::new(),
            response: Response::default(),
        })
        .await
        .unwrap();

    // tts.start
    match expect_event(rig.write_rx.recv().await.unwrap()) {
        device::ServerEvent::Tts { state, .. } => assert_eq!(state, TtsState::Start),
        other => panic!("expected tts.start, got {other:?}"),
    }
    // stt
    match expect_event(rig.write_rx.recv().await.unwrap()) {
        device::ServerEvent::Stt { text, session_id } => {
            assert_eq!(text, "hi");
            assert_eq!(session_id, "sess_turn");
        }
        other => panic!("expected stt, got {other:?}"),
    }
    // llm
    match expect_event(rig.write_rx.recv().await.unwrap()) {
        device::ServerEvent::Llm { emotion, .. } => assert_eq!(emotion, "happy"),
        other => panic!("expected llm, got {other:?}"),
    }
    // tts.sentence_start
    match expect_event(rig.write_rx.recv().await.unwrap()) {
        device::ServerEvent::Tts { state, text, .. } => {
            assert_eq!(state, TtsState::SentenceStart);
            assert_eq!(text.as_deref(), Some("hello"));
        }
        other => panic!("expected tts.sentence_start, got {other:?}"),
    }
    // Binary frames, then tts.sentence_end.
    let mut frames = 0;
    loop {
        match rig.write_rx.recv().await.unwrap() {
            Outbound::Audio(frame) => {
                assert!(!frame.is_empty());
                frames += 1;
            }
            Outbound::Event(device::ServerEvent::Tts { state, text, .. }) => {
                assert_eq!(state, TtsState::SentenceEnd);
                assert_eq!(text.as_deref(), Some("hello"));
                break;
            }
            other => panic!("unexpected outbound: {other:?}"),
        }
    }
    assert_eq!(frames, 2);
    // tts.stop, and nothing after it.
    match expect_event(rig.write_rx.recv().await.unwrap()) {
        device::ServerEvent::Tts { state, .. } => assert_eq!(state, TtsState::Stop),
        other => panic!("expected tts.stop, got {other:?}"),
    }
    assert!(rig.write_rx.try_recv().is_err());
}

/// S3: binary audio before any hello leaves the connection open and yields
/// a recoverable error.
#[tokio::test]
async fn audio_before_hello() {
    let rig = rig();
    let err = rig
        .translator
        .dispatch_client_event(device::ClientEvent::AppendBuffer(Bytes::from_static(
            b"\x01\x02",
        )))
        .await
        .unwrap_err();
    assert!(!err.is_fatal());
    let event = rig.translator.error_event(&err.to_string()).await;
    match event {
        device::ServerEvent::Error { error, .. } => {
            assert_eq!(error, "audio received before hello")
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

/// S4: malformed device text is answered with the fixed invalid-format
/// error while the session survives.
#[tokio::test]
async fn malformed_device_text() {
    let rig = rig();
    let err = device::ClientEvent::from_text("{").unwrap_err();
    let event = rig.translator.error_event(&err.to_string()).await;
    match event {
        device::ServerEvent::Error { error, .. } => assert_eq!(error, "invalid event format"),
        other => panic!("expected error event, got {other:?}"),
    }
}

/// S5: the pacing gate. 960 ms of synthesized audio arriving in ~0 ms of
/// wall time defers tts.stop by roughly the unplayed remainder.
#[tokio::test(start_paused = true)]
async fn pacing_defers_tts_stop() {
    let mut rig = rig();
    rig.translator
        .dispatch_client_event(device_hello())
        .await
        .unwrap();

    // 16 frames x 60 ms = 960 ms of audio.
    for _ in 0..16 {
        rig.translator
            .dispatch_server_event(audio_delta(1440))
            .await
            .unwrap();
    }

    tokio::time::advance(Duration::from_millis(50)).await;

    let before = tokio::time::Instant::now();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::ResponseDone {
            event_id: String::new(),
            response: Response::default(),
        })
        .await
        .unwrap();
    let deferred = before.elapsed();

    // 960 ms emitted minus the 50 ms that already passed.
    assert!(
        deferred >= Duration::from_millis(900),
        "tts.stop deferred only {deferred:?}"
    );
    assert!(deferred <= Duration::from_millis(960));

    // All frames precede tts.stop on the queue.
    let mut frames = 0;
    loop {
        match rig.write_rx.recv().await.unwrap() {
            Outbound::Audio(_) => frames += 1,
            Outbound::Event(device::ServerEvent::Tts { state, .. }) => {
                assert_eq!(state, TtsState::Stop);
                break;
            }
            other => panic!("unexpected outbound: {other:?}"),
        }
    }
    assert_eq!(frames, 16);
    assert!(rig.write_rx.try_recv().is_err());
}

/// A second response after the first reuses a freshly reset pacing clock.
#[tokio::test(start_paused = true)]
async fn pacing_clock_resets_between_responses() {
    let mut rig = rig();
    rig.translator
        .dispatch_client_event(device_hello())
        .await
        .unwrap();

    rig.translator
        .dispatch_server_event(audio_delta(1440))
        .await
        .unwrap();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::ResponseDone {
            event_id: String::new(),
            response: Response::default(),
        })
        .await
        .unwrap();

    // With the clock reset and no new audio, the second response must not
    // wait at all.
    let before = tokio::time::Instant::now();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::ResponseDone {
            event_id: String::new(),
            response: Response::default(),
        })
        .await
        .unwrap();
    assert_eq!(before.elapsed(), Duration::ZERO);

    // Drain: one frame, two stops.
    let mut stops = 0;
    while let Ok(outbound) = rig.write_rx.try_recv() {
        if let Outbound::Event(device::ServerEvent::Tts { state, .. }) = outbound {
            if state == TtsState::Stop {
                stops += 1;
            }
        }
    }
    assert_eq!(stops, 2);
}

/// Upstream errors are relayed to the device as serialized error objects.
#[tokio::test]
async fn upstream_error_is_relayed() {
    let mut rig = rig();
    rig.translator
        .dispatch_server_event(upstream::ServerEvent::Error {
            event_id: String::new(),
            error: upstream::ApiError {
                message: "quota exceeded".into(),
                kind: "invalid_request_error".into(),
                ..Default::default()
            },
        })
        .await
        .unwrap();

    match expect_event(rig.write_rx.recv().await.unwrap()) {
        device::ServerEvent::Error { error, .. } => {
            assert!(error.contains("quota exceeded"));
            assert!(error.contains("invalid_request_error"));
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

/// Lifecycle events without a device counterpart stay silent.
#[tokio::test]
async fn uninteresting_upstream_events_emit_nothing() {
    let mut rig = rig();
    for event in [
        upstream::ServerEvent::ResponseCreated {
            event_id: String::new(),
            response: Response::default(),
        },
        upstream::ServerEvent::SpeechStarted {
            event_id: String::new(),
            audio_start_ms: 10,
            item_id: "item_1".into(),
        },
        upstream::ServerEvent::InputAudioBufferCleared {
            event_id: String::new(),
        },
        upstream::ServerEvent::ResponseCancelled {
            event_id: String::new(),
        },
        upstream::ServerEvent::RateLimitsUpdated {
            event_id: String::new(),
            rate_limits: vec![],
        },
    ] {
        rig.translator.dispatch_server_event(event).await.unwrap();
    }
    assert!(rig.write_rx.try_recv().is_err());
}
