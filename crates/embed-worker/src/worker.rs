use std::sync::Arc;

use embed_error::{ErrorDetail, ErrorPolicy, ResultExt, WorkerError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::context::EmbeddingContext;
use crate::protocol::{WorkerCommand, WorkerResponse};

/// A message that can be sent to the worker loop.
#[derive(Debug)]
pub enum WorkerMessage {
    Request(WorkerRequest),
    Shutdown,
}

/// Success response or the typed failure; the handle decides how it crosses the boundary.
pub type WorkerReply = Result<WorkerResponse, WorkerError>;

/// One host command and where to deliver its reply.
#[derive(Debug)]
pub struct WorkerRequest {
    pub id: Uuid,
    pub command: WorkerCommand,
    pub responder: oneshot::Sender<WorkerReply>,
}

/// The worker actor: owns one [`EmbeddingContext`] and answers host commands.
///
/// Each request runs in its own task, so a slow `init` does not hold up the loop; an `infer`
/// that arrives meanwhile is answered from whatever state the context is in at that moment.
/// Every command gets exactly one response. Failures are reported through the installed
/// [`ErrorPolicy`] before being handed back; a panicking request becomes an
/// `uncaught_error` instead of taking the worker down.
///
/// On shutdown the loop stops accepting messages but waits for requests already in flight, so
/// their callers still get a response.
pub struct EmbedWorker {
    receiver: mpsc::Receiver<WorkerMessage>,
    context: Arc<EmbeddingContext>,
    policy: Arc<dyn ErrorPolicy>,
    in_flight: JoinSet<()>,
}

impl EmbedWorker {
    pub fn new(
        receiver: mpsc::Receiver<WorkerMessage>,
        context: Arc<EmbeddingContext>,
        policy: Arc<dyn ErrorPolicy>,
    ) -> Self {
        Self {
            receiver,
            context,
            policy,
            in_flight: JoinSet::new(),
        }
    }

    /// Runs the actor's event loop until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            // reap finished requests so the set only holds live ones
            while self.in_flight.try_join_next().is_some() {}
            match message {
                WorkerMessage::Request(request) => self.handle_request(request),
                WorkerMessage::Shutdown => break,
            }
        }
        self.receiver.close();
        let pending = self.in_flight.len();
        while self.in_flight.join_next().await.is_some() {}
        tracing::debug!(state = %self.context.state(), pending, "embed worker loop stopped");
    }

    fn handle_request(&mut self, request: WorkerRequest) {
        let WorkerRequest {
            id,
            command,
            responder,
        } = request;
        let span = tracing::info_span!("worker_request", request_id = %id, command = command.name());
        let context = Arc::clone(&self.context);
        let policy = Arc::clone(&self.policy);

        self.in_flight.spawn(
            async move {
                let reply = dispatch(context, command).await.emit_event(&*policy);
                if responder.send(reply).is_err() {
                    tracing::debug!("requester went away before the response was ready");
                }
            }
            .instrument(span),
        );
    }
}

async fn dispatch(context: Arc<EmbeddingContext>, command: WorkerCommand) -> WorkerReply {
    let task = tokio::spawn(async move {
        match command {
            WorkerCommand::Init => context
                .initialize()
                .await
                .map(|()| WorkerResponse::InitComplete),
            WorkerCommand::Infer { text } => context
                .embed(&text)
                .await
                .map(|embedding| WorkerResponse::InferComplete { embedding }),
        }
    });
    match task.await {
        Ok(result) => result,
        Err(join_err) => Err(WorkerError::with_cause(
            ErrorDetail::Uncaught {
                message: "request handler panicked".into(),
            },
            join_err,
        )),
    }
}
