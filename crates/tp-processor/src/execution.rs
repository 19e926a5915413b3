//! Execution of a single `TpProcessRequest`.

use crate::context::MessageContext;
use crate::handler::{ApplyError, DynHandler};
use crate::registry::{HandlerRegistry, RegistryError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;
use tp_dispatch::MessageDispatcher;
use tp_telemetry::{PROCESS_DURATION, PROCESS_REQUESTS};
use tp_types::{
    CodecError, HeaderStyle, Message, TpProcessRequest, TpProcessResponse, TransactionHeader,
};
use tracing::{debug, error, info_span, warn, Instrument};

/// Reasons a request never reached a handler.
#[derive(Debug, Error)]
enum ExecutionError {
    #[error("malformed process request: {0}")]
    MalformedRequest(CodecError),

    #[error("process request carries no {0} header")]
    MissingHeader(HeaderStyle),

    #[error("malformed transaction header: {0}")]
    MalformedHeader(CodecError),

    #[error(transparent)]
    UnknownHandler(RegistryError),
}

/// Run one request to completion and send its response.
///
/// Holds `_permit` for the whole execution so the dispatch loop can bound
/// concurrency.
pub(crate) async fn execute_request(
    dispatcher: Arc<MessageDispatcher>,
    handlers: Arc<HandlerRegistry>,
    header_style: HeaderStyle,
    message: Message,
    _permit: OwnedSemaphorePermit,
) {
    let correlation_id = message.correlation_id.clone();
    let span = info_span!("process", correlation_id = %correlation_id);

    async move {
        let (family, response) = match prepare(&handlers, header_style, &message) {
            Ok((request, header, handler)) => {
                let family = header.family_name.clone();
                let response = apply(&dispatcher, handler, request, header).await;
                (family, response)
            }
            Err(e) => {
                warn!(error = %e, "Rejecting process request");
                ("unknown".to_string(), TpProcessResponse::internal_error(e.to_string()))
            }
        };

        PROCESS_REQUESTS
            .with_label_values(&[family.as_str(), response.status.as_str()])
            .inc();
        debug!(status = response.status.as_str(), "Sending process response");

        if let Err(e) = dispatcher.reply(&correlation_id, &response).await {
            warn!(error = %e, "Failed to send process response");
        }
    }
    .instrument(span)
    .await
}

/// Decode the request, resolve its header and find its handler.
fn prepare(
    handlers: &HandlerRegistry,
    header_style: HeaderStyle,
    message: &Message,
) -> Result<(TpProcessRequest, TransactionHeader, DynHandler), ExecutionError> {
    let mut request: TpProcessRequest = message
        .decode_payload()
        .map_err(ExecutionError::MalformedRequest)?;
    let header = resolve_header(&request, header_style)?;

    let handler = handlers
        .lookup(&header.family_name, &header.family_version)
        .map(Arc::clone)
        .map_err(ExecutionError::UnknownHandler)?;

    request.header = Some(header.clone());
    Ok((request, header, handler))
}

/// The header as encoded under the negotiated style.
fn resolve_header(
    request: &TpProcessRequest,
    header_style: HeaderStyle,
) -> Result<TransactionHeader, ExecutionError> {
    match header_style {
        HeaderStyle::Expanded => request
            .header
            .clone()
            .ok_or(ExecutionError::MissingHeader(header_style)),
        HeaderStyle::Raw => {
            if request.header_bytes.is_empty() {
                return Err(ExecutionError::MissingHeader(header_style));
            }
            TransactionHeader::from_bytes(&request.header_bytes)
                .map_err(ExecutionError::MalformedHeader)
        }
    }
}

async fn apply(
    dispatcher: &Arc<MessageDispatcher>,
    handler: DynHandler,
    request: TpProcessRequest,
    header: TransactionHeader,
) -> TpProcessResponse {
    let context = MessageContext::new(Arc::clone(dispatcher), request.context_id.clone(), None);

    debug!(
        family = %header.family_name,
        version = %header.family_version,
        "Applying transaction"
    );
    let timer = PROCESS_DURATION
        .with_label_values(&[header.family_name.as_str()])
        .start_timer();

    // Own task, so a panicking handler only fails this request.
    let outcome =
        tokio::spawn(async move { handler.apply(&request, &context).await }.in_current_span())
            .await;
    timer.observe_duration();

    match outcome {
        Ok(Ok(())) => TpProcessResponse::ok(),
        Ok(Err(err)) => {
            if let ApplyError::InternalError(message) = &err {
                warn!(family = %header.family_name, error = %message, "Handler failed");
            }
            err.into_response()
        }
        Err(join_err) => {
            error!(
                family = %header.family_name,
                panicked = join_err.is_panic(),
                "Handler task aborted"
            );
            TpProcessResponse::internal_error("transaction handler panicked")
        }
    }
}
