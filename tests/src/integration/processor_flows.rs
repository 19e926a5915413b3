//! # Processor Flows
//!
//! End-to-end behaviour of a processor against a mock validator:
//!
//! 1. **Round trip**: a successful apply is answered OK under the request's token
//! 2. **Rejections**: invalid transactions, handler faults and unknown families
//!    become per-request responses and never stop the loop
//! 3. **Lifecycle**: registration, configuration freeze, shutdown, channel loss

use crate::harness::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tp_processor::{
    ApplyError, ContextError, TransactionContext, TransactionHandler,
};
use tp_types::TpProcessRequest;

/// Reads one address and records how the read ended.
pub struct ReadingHandler {
    pub outcome: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl TransactionHandler for ReadingHandler {
    fn family_name(&self) -> String {
        "reader".to_string()
    }

    fn family_versions(&self) -> Vec<String> {
        vec!["1.0".to_string()]
    }

    fn namespaces(&self) -> Vec<String> {
        vec!["eeeeee".to_string()]
    }

    async fn apply(
        &self,
        _request: &TpProcessRequest,
        context: &dyn TransactionContext,
    ) -> Result<(), ApplyError> {
        let result = context.get_state_entry("eeeeee00").await;
        *self.outcome.lock() = Some(match &result {
            Ok(_) => "ok".to_string(),
            Err(ContextError::ChannelClosed) => "channel_closed".to_string(),
            Err(e) => e.to_string(),
        });
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use tp_processor::{
        ProcessorConfig, ProcessorError, ProcessorState, RegistryError, TransactionProcessor,
    };
    use tp_types::{
        CorrelationId, HeaderStyle, MessageType, ProcessStatus, TpProcessResponse,
        TpStateGetRequest,
    };

    /// Round trip: OK status and the original token come back.
    #[tokio::test]
    async fn test_round_trip_echoes_token() {
        let running =
            RunningProcessor::start(processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]), 1)
                .await;

        let id = running.validator.submit("echo", "1.0", b"ok").await;
        let (reply_id, response) = running.validator.expect_response().await;

        assert_eq!(reply_id, id);
        assert_eq!(response.status, ProcessStatus::Ok);
        assert!(response.message.is_empty());

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// InvalidTransaction("bad input") is reported and the processor keeps going.
    #[tokio::test]
    async fn test_invalid_transaction_is_not_fatal() {
        let running =
            RunningProcessor::start(processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]), 1)
                .await;

        let bad = running.validator.submit("echo", "1.0", b"invalid:bad input").await;
        let (id, response) = running.validator.expect_response().await;
        assert_eq!(id, bad);
        assert_eq!(response.status, ProcessStatus::InvalidTransaction);
        assert_eq!(response.message, "bad input");
        assert!(running.processor.is_running());

        let good = running.validator.submit("echo", "1.0", b"ok").await;
        let (id, response) = running.validator.expect_response().await;
        assert_eq!(id, good);
        assert_eq!(response.status, ProcessStatus::Ok);

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// Unknown (family, version) gets INTERNAL_ERROR and the loop continues.
    #[tokio::test]
    async fn test_unknown_family_yields_internal_error() {
        let running =
            RunningProcessor::start(processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]), 1)
                .await;

        let unknown = running.validator.submit("xo", "1.0", b"ok").await;
        let (id, response) = running.validator.expect_response().await;
        assert_eq!(id, unknown);
        assert_eq!(response.status, ProcessStatus::InternalError);
        assert!(response.message.contains("xo"));

        let wrong_version = running.validator.submit("echo", "9.9", b"ok").await;
        let (id, response) = running.validator.expect_response().await;
        assert_eq!(id, wrong_version);
        assert_eq!(response.status, ProcessStatus::InternalError);

        running.validator.submit("echo", "1.0", b"ok").await;
        let (_, response) = running.validator.expect_response().await;
        assert_eq!(response.status, ProcessStatus::Ok);

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// Handler faults, including panics, become INTERNAL_ERROR responses.
    #[tokio::test]
    async fn test_handler_faults_are_contained() {
        let running =
            RunningProcessor::start(processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]), 1)
                .await;

        running.validator.submit("echo", "1.0", b"internal:disk on fire").await;
        let (_, response) = running.validator.expect_response().await;
        assert_eq!(response.status, ProcessStatus::InternalError);
        assert_eq!(response.message, "disk on fire");

        running.validator.submit("echo", "1.0", b"panic").await;
        let (_, response) = running.validator.expect_response().await;
        assert_eq!(response.status, ProcessStatus::InternalError);
        assert!(running.processor.is_running());

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// A process request whose body does not decode is still answered.
    #[tokio::test]
    async fn test_malformed_request_body_is_answered() {
        let running =
            RunningProcessor::start(processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]), 1)
                .await;

        let id = CorrelationId::generate();
        let garbage = tp_types::Message::new(id.clone(), MessageType::TpProcessRequest, vec![1, 2]);
        running.validator.send_raw(&garbage.to_bytes().unwrap()).await;

        let (reply_id, response) = running.validator.expect_response().await;
        assert_eq!(reply_id, id);
        assert_eq!(response.status, ProcessStatus::InternalError);

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// Frames that are not envelopes at all are dropped without a reply.
    #[tokio::test]
    async fn test_undecodable_frame_is_dropped() {
        let running =
            RunningProcessor::start(processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]), 1)
                .await;

        running.validator.send_raw(&[0xde, 0xad]).await;
        let id = running.validator.submit("echo", "1.0", b"ok").await;

        let (reply_id, response) = running.validator.expect_response().await;
        assert_eq!(reply_id, id);
        assert_eq!(response.status, ProcessStatus::Ok);

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// Duplicate (family, version) fails; registering after run is InvalidState.
    #[tokio::test]
    async fn test_registration_rules() {
        let processor = processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]);
        let duplicate = processor.register_handler(Arc::new(ScriptedHandler::new("echo")));
        assert!(matches!(
            duplicate,
            Err(ProcessorError::Registry(
                RegistryError::DuplicateRegistration { .. }
            ))
        ));

        let running = RunningProcessor::start(processor, 1).await;
        let late = running
            .processor
            .register_handler(Arc::new(ScriptedHandler::new("late")));
        assert!(matches!(late, Err(ProcessorError::InvalidState { .. })));

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// One registration per version, advertising namespaces and occupancy.
    #[tokio::test]
    async fn test_registration_per_version() {
        let handler = ScriptedHandler {
            family: "multi",
            versions: vec!["1.0", "2.0"],
        };
        let processor = TransactionProcessor::new(
            ProcessorConfig::default().with_max_concurrent_requests(7),
        );
        processor.register_handler(Arc::new(handler)).unwrap();
        let processor = Arc::new(processor);

        let (channel, validator) = MockValidator::connect();
        let task = {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.run_with_channel(channel).await })
        };

        let requests = validator.accept_registrations(2, 1).await;
        let versions: Vec<_> = requests.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1.0", "2.0"]);
        for request in &requests {
            assert_eq!(request.family, "multi");
            assert_eq!(request.namespaces, vec!["multi0".to_string()]);
            assert_eq!(request.max_occupancy, 7);
            assert_eq!(request.request_header_style, HeaderStyle::Expanded);
        }

        validator.shutdown().await;
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        assert_eq!(processor.state(), ProcessorState::Stopped);
    }

    /// Raw headers are decoded before dispatch when the validator agrees.
    #[tokio::test]
    async fn test_raw_header_style() {
        let processor = processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]);
        processor.set_header_style(HeaderStyle::Raw).unwrap();
        let running = RunningProcessor::start(processor, 1).await;

        let request = TpProcessRequest {
            header_bytes: header("echo", "1.0").to_bytes().unwrap(),
            payload: b"ok".to_vec(),
            ..Default::default()
        };
        let id = CorrelationId::generate();
        running.validator.send(&id, &request).await;

        let (reply_id, response): (_, TpProcessResponse) = running.validator.expect_response().await;
        assert_eq!(reply_id, id);
        assert_eq!(response.status, ProcessStatus::Ok);

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// Losing the channel unblocks a handler waiting on state.
    #[tokio::test]
    async fn test_channel_close_unblocks_sub_request() {
        let outcome = Arc::new(Mutex::new(None));
        let handler = ReadingHandler {
            outcome: Arc::clone(&outcome),
        };
        let running = RunningProcessor::start(processor_with(vec![Arc::new(handler)]), 1).await;

        running.validator.submit("reader", "1.0", b"").await;
        let (_, get) = running.validator.recv_payload::<TpStateGetRequest>().await;
        assert_eq!(get.addresses, vec!["eeeeee00".to_string()]);

        running.validator.close().await;

        let result = running.join().await;
        assert!(matches!(result, Err(ProcessorError::ChannelClosed)));
        assert_eq!(outcome.lock().as_deref(), Some("channel_closed"));
    }

    /// A local shutdown request stops the processor gracefully.
    #[tokio::test]
    async fn test_local_shutdown() {
        let running =
            RunningProcessor::start(processor_with(vec![Arc::new(ScriptedHandler::new("echo"))]), 1)
                .await;
        assert!(running.processor.is_running());

        running.processor.shutdown_handle().shutdown();
        let (id, _) = running
            .validator
            .recv_payload::<tp_types::TpUnregisterRequest>()
            .await;
        running
            .validator
            .send(
                &id,
                &tp_types::TpUnregisterResponse {
                    status: tp_types::UnregisterStatus::Ok,
                },
            )
            .await;

        let processor = Arc::clone(&running.processor);
        running.join().await.unwrap();
        assert_eq!(processor.state(), ProcessorState::Stopped);
        assert!(!processor.is_running());
    }

    /// In-flight transactions finish before the processor unregisters.
    #[tokio::test]
    async fn test_in_flight_work_drains_before_unregister() {
        let outcome = Arc::new(Mutex::new(None));
        let handler = ReadingHandler {
            outcome: Arc::clone(&outcome),
        };
        let running = RunningProcessor::start(processor_with(vec![Arc::new(handler)]), 1).await;

        let tx = running.validator.submit("reader", "1.0", b"").await;
        let (get_id, _) = running.validator.recv_payload::<TpStateGetRequest>().await;

        running
            .validator
            .send(&CorrelationId::generate(), &tp_types::TpShutdownNotification)
            .await;
        // Give the loop a moment to observe the notification.
        tokio::time::sleep(Duration::from_millis(50)).await;

        running
            .validator
            .send(
                &get_id,
                &tp_types::TpStateGetResponse {
                    entries: vec![],
                    status: tp_types::StateStatus::Ok,
                },
            )
            .await;

        let (reply_id, response) = running.validator.expect_response().await;
        assert_eq!(reply_id, tx);
        assert_eq!(response.status, ProcessStatus::Ok);

        let (unregister_id, _) = running
            .validator
            .recv_payload::<tp_types::TpUnregisterRequest>()
            .await;
        running
            .validator
            .send(
                &unregister_id,
                &tp_types::TpUnregisterResponse {
                    status: tp_types::UnregisterStatus::Ok,
                },
            )
            .await;
        running.join().await.unwrap();
        assert_eq!(outcome.lock().as_deref(), Some("ok"));
    }

    /// With every permit taken, pings and a local shutdown are still served
    /// promptly; requests that never started are rejected.
    #[tokio::test]
    async fn test_control_traffic_not_blocked_at_capacity() {
        let outcome = Arc::new(Mutex::new(None));
        let handler = ReadingHandler {
            outcome: Arc::clone(&outcome),
        };
        let config = ProcessorConfig::default()
            .with_request_timeout(WAIT)
            .with_unregister_timeout(Duration::from_secs(1))
            .with_max_concurrent_requests(1);
        let processor = TransactionProcessor::new(config);
        processor.register_handler(Arc::new(handler)).unwrap();
        let running = RunningProcessor::start(processor, 1).await;
        let validator = &running.validator;

        let first = validator.submit("reader", "1.0", b"").await;
        let (get_id, _) = validator.recv_payload::<TpStateGetRequest>().await;
        let second = validator.submit("reader", "1.0", b"").await;

        let ping_id = CorrelationId::new("ping-at-capacity");
        validator.send(&ping_id, &tp_types::PingRequest).await;
        let pong = timeout(Duration::from_secs(1), validator.recv())
            .await
            .expect("ping not answered while at capacity");
        assert_eq!(pong.message_type, MessageType::PingResponse);
        assert_eq!(pong.correlation_id, ping_id);

        running.processor.shutdown_handle().shutdown();
        let (reply_id, response) = timeout(Duration::from_secs(1), validator.expect_response())
            .await
            .expect("shutdown waited on a busy handler");
        assert_eq!(reply_id, second);
        assert_eq!(response.status, ProcessStatus::InternalError);

        validator
            .send(
                &get_id,
                &tp_types::TpStateGetResponse {
                    entries: vec![],
                    status: tp_types::StateStatus::Ok,
                },
            )
            .await;
        let (reply_id, response) = validator.expect_response().await;
        assert_eq!(reply_id, first);
        assert_eq!(response.status, ProcessStatus::Ok);

        let (unregister_id, _) = validator
            .recv_payload::<tp_types::TpUnregisterRequest>()
            .await;
        validator
            .send(
                &unregister_id,
                &tp_types::TpUnregisterResponse {
                    status: tp_types::UnregisterStatus::Ok,
                },
            )
            .await;
        running.join().await.unwrap();
        assert_eq!(outcome.lock().as_deref(), Some("ok"));
    }
}
