//! # Dispatch Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | Envelope codec | Encode and decode a `TpProcessRequest` frame body |
//! | Correlated round trip | One `send_and_receive` through an in-memory peer |
//! | Concurrent fan-out | N simultaneous sub-requests sharing one dispatcher |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tp_channel::{Channel, MemoryChannel};
use tp_dispatch::MessageDispatcher;
use tp_types::{
    CorrelationId, Message, StateStatus, TpProcessRequest, TpStateEntry, TpStateGetRequest,
    TpStateGetResponse,
};

// ============================================================================
// Envelope codec
// ============================================================================

fn bench_envelope_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope-codec");

    for size in [64usize, 1024, 16 * 1024] {
        let request = TpProcessRequest {
            payload: vec![0xAB; size],
            context_id: "ctx".to_string(),
            signature: "sig".to_string(),
            ..Default::default()
        };
        let message = Message::from_payload(CorrelationId::generate(), &request)
            .expect("encode request");
        let frame = message.to_bytes().expect("encode envelope");

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &request, |b, r| {
            b.iter(|| {
                let message = Message::from_payload(CorrelationId::generate(), r).unwrap();
                black_box(message.to_bytes().unwrap())
            })
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, f| {
            b.iter(|| {
                let message = Message::from_bytes(f).unwrap();
                black_box(message.decode_payload::<TpProcessRequest>().unwrap())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Dispatcher round trips
// ============================================================================

/// Answers every state read with one entry per requested address.
async fn echo_peer(channel: MemoryChannel) {
    while let Ok(frame) = channel.receive().await {
        let Ok(message) = Message::from_bytes(&frame) else {
            continue;
        };
        let Ok(request) = message.decode_payload::<TpStateGetRequest>() else {
            continue;
        };
        let response = TpStateGetResponse {
            entries: request
                .addresses
                .into_iter()
                .map(|address| TpStateEntry {
                    address,
                    data: vec![1],
                })
                .collect(),
            status: StateStatus::Ok,
        };
        let Ok(reply) = Message::from_payload(message.correlation_id, &response) else {
            continue;
        };
        let Ok(bytes) = reply.to_bytes() else {
            continue;
        };
        if channel.send(&bytes).await.is_err() {
            break;
        }
    }
}

fn get_request() -> TpStateGetRequest {
    TpStateGetRequest {
        context_id: "ctx".to_string(),
        addresses: vec!["1cf126".to_string()],
    }
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime");

    let (local, peer) = MemoryChannel::pair();
    let dispatcher = rt.block_on(async {
        tokio::spawn(echo_peer(peer));
        let channel: Arc<dyn Channel> = Arc::new(local);
        Arc::new(MessageDispatcher::start(channel, Duration::from_secs(5)))
    });

    let mut group = c.benchmark_group("dispatcher");

    group.bench_function("round_trip_single", |b| {
        b.to_async(&rt).iter(|| {
            let dispatcher = dispatcher.clone();
            async move {
                let response: TpStateGetResponse = dispatcher
                    .send_and_receive(&get_request(), None)
                    .await
                    .unwrap();
                black_box(response)
            }
        })
    });

    for fan_out in [10usize, 100] {
        group.throughput(Throughput::Elements(fan_out as u64));
        group.bench_with_input(
            BenchmarkId::new("round_trip_concurrent", fan_out),
            &fan_out,
            |b, &n| {
                b.to_async(&rt).iter(|| {
                    let dispatcher = dispatcher.clone();
                    async move {
                        let calls = (0..n).map(|_| {
                            let dispatcher = dispatcher.clone();
                            async move {
                                dispatcher
                                    .send_and_receive::<_, TpStateGetResponse>(
                                        &get_request(),
                                        None,
                                    )
                                    .await
                            }
                        });
                        black_box(join_all(calls).await)
                    }
                })
            },
        );
    }

    group.finish();
    rt.block_on(dispatcher.close());
}

criterion_group!(benches, bench_envelope_codec, bench_round_trip);
criterion_main!(benches);
