//! # Multiplexing Under Load
//!
//! Many concurrent sub-requests share one channel; replies arrive in an order
//! unrelated to the requests, and each must reach exactly its own caller.

use async_trait::async_trait;
use futures::future::join_all;
use tp_processor::{ApplyError, TransactionContext, TransactionHandler};
use tp_types::TpProcessRequest;

/// Sub-requests issued by each invocation of [`FanOutHandler`].
pub const READS_PER_TRANSACTION: usize = 10;

/// Issues `READS_PER_TRANSACTION` concurrent reads and checks that every
/// reply carries the data for the address it asked about.
pub struct FanOutHandler;

/// Data the mock validator stores at `address`.
pub fn data_for(address: &str) -> Vec<u8> {
    format!("value-of-{}", address).into_bytes()
}

#[async_trait]
impl TransactionHandler for FanOutHandler {
    fn family_name(&self) -> String {
        "fanout".to_string()
    }

    fn family_versions(&self) -> Vec<String> {
        vec!["1.0".to_string()]
    }

    fn namespaces(&self) -> Vec<String> {
        vec!["f0f0f0".to_string()]
    }

    async fn apply(
        &self,
        request: &TpProcessRequest,
        context: &dyn TransactionContext,
    ) -> Result<(), ApplyError> {
        let tag = String::from_utf8_lossy(&request.payload).to_string();
        let addresses: Vec<String> = (0..READS_PER_TRANSACTION)
            .map(|i| format!("f0f0f0{}{:02}", tag, i))
            .collect();

        let reads = addresses
            .iter()
            .map(|address| context.get_state_entry(address));
        let results = join_all(reads).await;

        for (address, result) in addresses.iter().zip(results) {
            let data = result?;
            if data.as_deref() != Some(data_for(address).as_slice()) {
                return Err(ApplyError::internal(format!(
                    "reply for {} carried someone else's data",
                    address
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::*;
    use rand::seq::SliceRandom;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tp_channel::MemoryChannel;
    use tp_dispatch::MessageDispatcher;
    use tp_types::{
        CorrelationId, Message, ProcessStatus, StateStatus, TpStateEntry, TpStateGetRequest,
        TpStateGetResponse,
    };

    const TRANSACTIONS: usize = 10;

    fn reply_for(request: &TpStateGetRequest) -> TpStateGetResponse {
        TpStateGetResponse {
            entries: request
                .addresses
                .iter()
                .map(|address| TpStateEntry {
                    address: address.clone(),
                    data: data_for(address),
                })
                .collect(),
            status: StateStatus::Ok,
        }
    }

    /// 100 sub-requests from 10 invocations, answered in reverse order.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_hundred_sub_requests_answered_in_reverse() {
        let running = RunningProcessor::start(processor_with(vec![Arc::new(FanOutHandler)]), 1).await;
        let validator = &running.validator;

        let mut submitted = HashSet::new();
        for t in 0..TRANSACTIONS {
            submitted.insert(validator.submit("fanout", "1.0", format!("{:02}", t).as_bytes()).await);
        }

        let mut pending = Vec::new();
        for _ in 0..TRANSACTIONS * READS_PER_TRANSACTION {
            pending.push(validator.recv_payload::<TpStateGetRequest>().await);
        }
        let distinct: HashSet<_> = pending.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(distinct.len(), 100, "every sub-request needs its own token");

        for (id, request) in pending.iter().rev() {
            validator.send(id, &reply_for(request)).await;
        }

        let mut answered = HashSet::new();
        for _ in 0..TRANSACTIONS {
            let (id, response) = validator.expect_response().await;
            assert_eq!(response.status, ProcessStatus::Ok, "{}", response.message);
            answered.insert(id);
        }
        assert_eq!(answered, submitted);

        running.validator.shutdown().await;
        running.join().await.unwrap();
    }

    /// Direct dispatcher use: shuffled replies still land on their callers.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shuffled_replies_reach_their_callers() {
        let (local, remote) = MemoryChannel::pair();
        let dispatcher = Arc::new(MessageDispatcher::start(Arc::new(local), WAIT));
        let validator = MockValidator::from_channel(remote);

        let callers: Vec<_> = (0..50)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let address = format!("addr-{}", i);
                    let request = TpStateGetRequest {
                        context_id: "ctx".into(),
                        addresses: vec![address.clone()],
                    };
                    let response: TpStateGetResponse =
                        dispatcher.send_and_receive(&request, None).await.unwrap();
                    (address, response)
                })
            })
            .collect();

        let mut pending: Vec<(CorrelationId, TpStateGetRequest)> = Vec::new();
        for _ in 0..50 {
            pending.push(validator.recv_payload().await);
        }
        pending.shuffle(&mut rand::thread_rng());
        for (id, request) in &pending {
            validator.send(id, &reply_for(request)).await;
        }

        for caller in callers {
            let (address, response) = caller.await.unwrap();
            assert_eq!(response.entries.len(), 1);
            assert_eq!(response.entries[0].address, address);
            assert_eq!(response.entries[0].data, data_for(&address));
        }
        assert_eq!(dispatcher.registry().pending_count(), 0);

        // Replies for tokens nobody is waiting on are treated as unsolicited.
        let stray = Message::from_payload(
            CorrelationId::new("stray"),
            &reply_for(&pending[0].1),
        )
        .unwrap();
        validator.send_raw(&stray.to_bytes().unwrap()).await;
        let unsolicited = dispatcher.next_unsolicited().await.unwrap();
        assert_eq!(unsolicited.correlation_id.as_str(), "stray");

        dispatcher.close().await;
    }
}
