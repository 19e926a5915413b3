//! # Transaction Processor Core
//!
//! Registers handlers with the validator, feeds execution requests to them,
//! and unregisters on the way out.
//!
//! The run state, handler registry and connection belong to one
//! [`TransactionProcessor`] value, so independent processors can coexist in
//! one process.

use crate::config::ProcessorConfig;
use crate::error::ProcessorError;
use crate::execution::execute_request;
use crate::handler::DynHandler;
use crate::registry::HandlerRegistry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tp_channel::{Channel, TcpChannel};
use tp_dispatch::{DispatchError, MessageDispatcher};
use tp_telemetry::REGISTERED_HANDLERS;
use tp_types::{
    FeatureVersion, HeaderStyle, Message, MessageType, PingResponse, RegisterStatus,
    TpProcessResponse, TpRegisterRequest, TpRegisterResponse, TpUnregisterRequest,
    TpUnregisterResponse, UnregisterStatus,
};
use tracing::{debug, error, info, warn};

/// Lifecycle of a processor. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Created,
    Registering,
    Running,
    Unregistering,
    Stopped,
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Registering => write!(f, "registering"),
            Self::Running => write!(f, "running"),
            Self::Unregistering => write!(f, "unregistering"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything that may only change before `run`.
struct Setup {
    state: ProcessorState,
    handlers: HandlerRegistry,
    header_style: HeaderStyle,
}

pub struct TransactionProcessor {
    config: ProcessorConfig,
    setup: Mutex<Setup>,
    running: AtomicBool,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Requests a local, graceful stop of a running processor.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Same effect as a shutdown notification from the validator.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Whether the dispatch loop keeps going after a message.
enum Flow {
    Continue,
    Stop,
}

impl TransactionProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let header_style = config.header_style;
        Self {
            config,
            setup: Mutex::new(Setup {
                state: ProcessorState::Created,
                handlers: HandlerRegistry::new(),
                header_style,
            }),
            running: AtomicBool::new(false),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Add a handler. Only allowed before `run`.
    pub fn register_handler(&self, handler: DynHandler) -> Result<(), ProcessorError> {
        let mut setup = self.setup.lock();
        if setup.state != ProcessorState::Created {
            return Err(ProcessorError::InvalidState {
                operation: "register a handler",
                state: setup.state,
            });
        }
        setup.handlers.register(handler)?;
        Ok(())
    }

    /// Override the header style requested at registration. Only allowed
    /// before `run`.
    pub fn set_header_style(&self, header_style: HeaderStyle) -> Result<(), ProcessorError> {
        let mut setup = self.setup.lock();
        if setup.state != ProcessorState::Created {
            return Err(ProcessorError::InvalidState {
                operation: "change the header style",
                state: setup.state,
            });
        }
        setup.header_style = header_style;
        Ok(())
    }

    /// Requested header style, before negotiation.
    pub fn header_style(&self) -> HeaderStyle {
        self.setup.lock().header_style
    }

    pub fn state(&self) -> ProcessorState {
        self.setup.lock().state
    }

    /// True between successful registration and the end of the dispatch loop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Connect to the configured endpoint and serve until shutdown.
    ///
    /// Returns `Ok` after a requested shutdown and `ChannelClosed` if the
    /// validator went away.
    pub async fn run(&self) -> Result<(), ProcessorError> {
        self.config.validate()?;
        let (handlers, header_style) = self.begin()?;

        info!(endpoint = %self.config.endpoint, "Connecting to validator");
        let channel =
            match TcpChannel::connect(&self.config.endpoint, self.config.max_frame_size).await {
                Ok(channel) => channel,
                Err(e) => {
                    error!(endpoint = %self.config.endpoint, error = %e, "Connection failed");
                    self.set_state(ProcessorState::Stopped);
                    return Err(e.into());
                }
            };

        self.serve(Arc::new(channel), handlers, header_style).await
    }

    /// Serve over an already connected channel.
    pub async fn run_with_channel(&self, channel: Arc<dyn Channel>) -> Result<(), ProcessorError> {
        self.config.validate()?;
        let (handlers, header_style) = self.begin()?;
        self.serve(channel, handlers, header_style).await
    }

    /// Leave `Created`, freezing the handler set.
    fn begin(&self) -> Result<(Arc<HandlerRegistry>, HeaderStyle), ProcessorError> {
        let mut setup = self.setup.lock();
        if setup.state != ProcessorState::Created {
            return Err(ProcessorError::InvalidState {
                operation: "run",
                state: setup.state,
            });
        }
        if setup.handlers.is_empty() {
            setup.state = ProcessorState::Stopped;
            return Err(ProcessorError::NoHandlersRegistered);
        }
        setup.state = ProcessorState::Registering;
        let handlers = std::mem::take(&mut setup.handlers);
        Ok((Arc::new(handlers), setup.header_style))
    }

    fn set_state(&self, state: ProcessorState) {
        let mut setup = self.setup.lock();
        debug!(from = %setup.state, to = %state, "Processor state change");
        setup.state = state;
    }

    async fn serve(
        &self,
        channel: Arc<dyn Channel>,
        handlers: Arc<HandlerRegistry>,
        header_style: HeaderStyle,
    ) -> Result<(), ProcessorError> {
        let dispatcher = Arc::new(MessageDispatcher::start(
            channel,
            self.config.request_timeout,
        ));

        let result = self.serve_connection(&dispatcher, handlers, header_style).await;

        dispatcher.close().await;
        self.running.store(false, Ordering::Release);
        REGISTERED_HANDLERS.set(0.0);
        self.set_state(ProcessorState::Stopped);

        match &result {
            Ok(()) => info!("Transaction processor stopped"),
            Err(e) => error!(error = %e, "Transaction processor stopped with error"),
        }
        result
    }

    async fn serve_connection(
        &self,
        dispatcher: &Arc<MessageDispatcher>,
        handlers: Arc<HandlerRegistry>,
        header_style: HeaderStyle,
    ) -> Result<(), ProcessorError> {
        let header_style = self.register(dispatcher, &handlers, header_style).await?;

        self.running.store(true, Ordering::Release);
        self.set_state(ProcessorState::Running);
        info!(
            handlers = handlers.len(),
            header_style = %header_style,
            "Transaction processor running"
        );

        let result = self.dispatch_loop(dispatcher, handlers, header_style).await;

        self.running.store(false, Ordering::Release);
        self.set_state(ProcessorState::Unregistering);
        self.unregister(dispatcher).await;
        result
    }

    /// Register every (family, version) and settle the header style.
    async fn register(
        &self,
        dispatcher: &MessageDispatcher,
        handlers: &HandlerRegistry,
        requested_style: HeaderStyle,
    ) -> Result<HeaderStyle, ProcessorError> {
        let requested = FeatureVersion::SDK_PROTOCOL_VERSION;
        let max_occupancy = u32::try_from(self.config.max_concurrent_requests).unwrap_or(u32::MAX);
        let mut acknowledged = requested;
        let descriptors = handlers.descriptors();

        for (accepted, descriptor) in descriptors.iter().enumerate() {
            let request = TpRegisterRequest {
                family: descriptor.family.clone(),
                version: descriptor.version.clone(),
                namespaces: descriptor.namespaces.clone(),
                max_occupancy,
                protocol_version: requested.as_u32(),
                request_header_style: requested_style,
            };
            let response: TpRegisterResponse = dispatcher.send_and_receive(&request, None).await?;

            if response.status != RegisterStatus::Ok {
                error!(
                    family = %descriptor.family,
                    version = %descriptor.version,
                    "Validator rejected registration"
                );
                if accepted > 0 {
                    // Withdraw the pairs this connection already registered.
                    self.set_state(ProcessorState::Unregistering);
                    self.unregister(dispatcher).await;
                }
                return Err(ProcessorError::RegistrationFailed {
                    family: descriptor.family.clone(),
                    version: descriptor.version.clone(),
                });
            }

            acknowledged = acknowledged.min(FeatureVersion::from_u32(response.protocol_version));
            info!(
                family = %descriptor.family,
                version = %descriptor.version,
                namespaces = ?descriptor.namespaces,
                "Registered with validator"
            );
        }

        let negotiated = requested_style.negotiate(acknowledged);
        if negotiated != requested_style {
            warn!(
                requested = %requested_style,
                acknowledged = acknowledged.as_u32(),
                "Validator does not support requested header style, using {}",
                negotiated
            );
        }
        REGISTERED_HANDLERS.set(descriptors.len() as f64);
        Ok(negotiated)
    }

    async fn dispatch_loop(
        &self,
        dispatcher: &Arc<MessageDispatcher>,
        handlers: Arc<HandlerRegistry>,
        header_style: HeaderStyle,
    ) -> Result<(), ProcessorError> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        let mut in_flight = JoinSet::new();
        // Requests read while every permit is taken, oldest first.
        let mut parked: VecDeque<Message> = VecDeque::new();
        let mut shutdown = self.shutdown.subscribe();

        let result = loop {
            if *shutdown.borrow_and_update() {
                info!("Local shutdown requested");
                break Ok(());
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Execution task failed");
                    }
                }
                permit = Arc::clone(&permits).acquire_owned(), if !parked.is_empty() => {
                    let Ok(permit) = permit else {
                        break Ok(());
                    };
                    if let Some(message) = parked.pop_front() {
                        in_flight.spawn(execute_request(
                            Arc::clone(dispatcher),
                            Arc::clone(&handlers),
                            header_style,
                            message,
                            permit,
                        ));
                    }
                }
                next = dispatcher.next_unsolicited() => {
                    let message = match next {
                        Ok(message) => message,
                        Err(DispatchError::ChannelClosed) => break Err(ProcessorError::ChannelClosed),
                        Err(e) => break Err(e.into()),
                    };

                    match message.message_type {
                        MessageType::TpProcessRequest => {
                            let permit = if parked.is_empty() {
                                Arc::clone(&permits).try_acquire_owned().ok()
                            } else {
                                None
                            };
                            match permit {
                                Some(permit) => {
                                    in_flight.spawn(execute_request(
                                        Arc::clone(dispatcher),
                                        Arc::clone(&handlers),
                                        header_style,
                                        message,
                                        permit,
                                    ));
                                }
                                None => {
                                    debug!(
                                        correlation_id = %message.correlation_id,
                                        parked = parked.len() + 1,
                                        "At capacity, parking process request"
                                    );
                                    parked.push_back(message);
                                }
                            }
                        }
                        _ => match self.handle_control(dispatcher, message).await {
                            Flow::Continue => {}
                            Flow::Stop => break Ok(()),
                        },
                    }
                }
            }
        };

        if !parked.is_empty() {
            warn!(parked = parked.len(), "Rejecting process requests that never started");
        }
        for message in parked {
            let response =
                TpProcessResponse::internal_error("transaction processor is shutting down");
            if let Err(e) = dispatcher.reply(&message.correlation_id, &response).await {
                debug!(error = %e, "Failed to reject parked request");
            }
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Draining in-flight transactions");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Execution task failed");
            }
        }
        result
    }

    /// Non-transaction messages from the validator.
    async fn handle_control(
        &self,
        dispatcher: &MessageDispatcher,
        message: Message,
    ) -> Flow {
        match message.message_type {
            MessageType::PingRequest => {
                debug!(correlation_id = %message.correlation_id, "Answering ping");
                if let Err(e) = dispatcher.reply(&message.correlation_id, &PingResponse).await {
                    warn!(error = %e, "Failed to answer ping");
                }
                Flow::Continue
            }
            MessageType::TpShutdownNotification => {
                info!("Validator requested shutdown");
                Flow::Stop
            }
            other => {
                warn!(
                    correlation_id = %message.correlation_id,
                    message_type = %other,
                    "Ignoring unexpected message"
                );
                Flow::Continue
            }
        }
    }

    /// Best effort; failures are logged.
    async fn unregister(&self, dispatcher: &MessageDispatcher) {
        if dispatcher.is_closed() {
            debug!("Channel already closed, skipping unregister");
            return;
        }

        let result = dispatcher
            .send_and_receive::<_, TpUnregisterResponse>(
                &TpUnregisterRequest,
                Some(self.config.unregister_timeout),
            )
            .await;
        match result {
            Ok(response) if response.status == UnregisterStatus::Ok => {
                info!("Unregistered from validator")
            }
            Ok(response) => warn!(status = ?response.status, "Validator refused unregister"),
            Err(e) => warn!(error = %e, "Unregister failed"),
        }
    }
}
