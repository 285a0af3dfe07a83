use std::sync::Arc;
use std::time::Duration;

use durable_worker_core::{ActivityExecutor, OrchestrationExecutor, Registry};
use durable_worker_grpc::conversions::{self, ConversionError};
use durable_worker_grpc::proto;
use durable_worker_grpc::OrchestratorServiceClient;
use durable_worker_types::FailureDetails;
use tokio::sync::Semaphore;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use crate::config::WorkerConfig;
use crate::worker_error::WorkerError;

/// The long-lived loop started by `Worker::start`. Reconnects indefinitely
/// until `shutdown` is cancelled; each individual work item runs on a
/// bounded pool so a slow orchestrator replay can't starve the others.
pub async fn run(registry: Arc<Registry>, config: WorkerConfig, worker_id: String, shutdown: CancellationToken) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_work_items));

    while !shutdown.is_cancelled() {
        match run_one_connection(&registry, &config, &worker_id, &semaphore, &shutdown).await {
            Ok(()) => {}
            Err(err) => {
                tracing::warn!(error = %err, "dispatcher stream ended, will reconnect");
            }
        }

        if shutdown.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.reconnect_delay_secs)) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    tracing::info!("dispatcher loop exiting");
}

async fn run_one_connection(
    registry: &Arc<Registry>,
    config: &WorkerConfig,
    worker_id: &str,
    semaphore: &Arc<Semaphore>,
    shutdown: &CancellationToken,
) -> Result<(), tonic::Status> {
    let endpoint = Channel::from_shared(config.host_address.clone())
        .map_err(|err| tonic::Status::invalid_argument(err.to_string()))?;
    let channel = endpoint.connect().await.map_err(|source| {
        let err = WorkerError::Connect {
            address: config.host_address.clone(),
            source,
        };
        tracing::warn!(error = %err, "connect attempt failed");
        tonic::Status::unavailable(err.to_string())
    })?;

    let mut client = OrchestratorServiceClient::new(channel);
    client.hello(proto::Empty {}).await?;

    let mut stream = client
        .get_work_items(proto::GetWorkItemsRequest { worker_id: worker_id.to_string() })
        .await?
        .into_inner();

    loop {
        let next = tokio::select! {
            item = stream.next() => item,
            _ = shutdown.cancelled() => {
                tracing::info!("shutdown requested, closing work item stream");
                return Ok(());
            }
        };

        let Some(item) = next else {
            return Ok(());
        };

        match item {
            Ok(work_item) => {
                dispatch_work_item(work_item, registry.clone(), client.clone(), semaphore.clone());
            }
            Err(status) => match status.code() {
                tonic::Code::Cancelled | tonic::Code::Unavailable => {
                    tracing::warn!(code = ?status.code(), "sidecar stream interrupted");
                    return Ok(());
                }
                _ => {
                    tracing::warn!(code = ?status.code(), message = status.message(), "unexpected stream error");
                    return Err(status);
                }
            },
        }
    }
}

fn dispatch_work_item(
    item: proto::WorkItem,
    registry: Arc<Registry>,
    mut client: OrchestratorServiceClient<Channel>,
    semaphore: Arc<Semaphore>,
) {
    let Some(work) = item.work else {
        tracing::warn!("received work item with no oneof variant, dropping");
        return;
    };

    tokio::spawn(async move {
        let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");

        match work {
            proto::work_item::Work::OrchestratorRequest(request) => {
                run_orchestrator_request(request, registry, &mut client).await;
            }
            proto::work_item::Work::ActivityRequest(request) => {
                run_activity_request(request, registry, &mut client).await;
            }
        }
    });
}

async fn run_orchestrator_request(
    request: proto::OrchestratorRequest,
    registry: Arc<Registry>,
    client: &mut OrchestratorServiceClient<Channel>,
) {
    let instance_id = request.instance_id.clone();

    let decoded = match decode_history(&request) {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(instance_id, error = %err, "malformed history on the wire, dropping work item");
            return;
        }
    };

    let execution = tokio::task::spawn_blocking(move || {
        let (past_events, new_events) = decoded;
        let mut executor = OrchestrationExecutor::new(registry);
        executor.execute(&instance_id, &past_events, &new_events)
    })
    .await;

    let instance_id = request.instance_id;
    let actions = match execution {
        Ok(Ok(actions)) => actions,
        Ok(Err(err)) => {
            tracing::warn!(instance_id, error = %err, "orchestration executor rejected the batch");
            return;
        }
        Err(join_err) => {
            tracing::error!(instance_id, error = %join_err, "orchestration execution panicked");
            return;
        }
    };

    let response = proto::OrchestratorResponse {
        instance_id,
        actions: actions.iter().map(conversions::orchestrator_action_to_proto).collect(),
    };

    if let Err(err) = client.complete_orchestrator_task(response).await {
        tracing::warn!(error = %err, "failed to deliver orchestrator completion, letting the sidecar re-dispatch");
    }
}

async fn run_activity_request(
    request: proto::ActivityRequest,
    registry: Arc<Registry>,
    client: &mut OrchestratorServiceClient<Channel>,
) {
    let proto::ActivityRequest { orchestration_id, name, task_id, input } = request;
    let instance_id = orchestration_id.clone();

    let execution = tokio::task::spawn_blocking(move || {
        let executor = ActivityExecutor::new(registry);
        executor.execute(&orchestration_id, &name, task_id, input.as_deref())
    })
    .await;

    let response = match execution {
        Ok(Ok(result)) => proto::ActivityResponse {
            instance_id,
            task_id,
            result,
            failure_details: None,
        },
        Ok(Err(err)) => proto::ActivityResponse {
            instance_id,
            task_id,
            result: None,
            failure_details: Some(conversions::failure_details_to_proto(&FailureDetails::new(
                "ActivityError",
                err.to_string(),
            ))),
        },
        Err(join_err) => {
            tracing::error!(task_id, error = %join_err, "activity execution panicked");
            proto::ActivityResponse {
                instance_id,
                task_id,
                result: None,
                failure_details: Some(conversions::failure_details_to_proto(&FailureDetails::new(
                    "ActivityPanic",
                    join_err.to_string(),
                ))),
            }
        }
    };

    if let Err(err) = client.complete_activity_task(response).await {
        tracing::warn!(error = %err, "failed to deliver activity completion, letting the sidecar re-dispatch");
    }
}

type DecodedHistory = (Vec<durable_worker_types::HistoryEvent>, Vec<durable_worker_types::HistoryEvent>);

fn decode_history(request: &proto::OrchestratorRequest) -> Result<DecodedHistory, ConversionError> {
    let past_events = request
        .past_events
        .iter()
        .map(conversions::history_event_from_proto)
        .collect::<Result<Vec<_>, _>>()?;
    let new_events = request
        .new_events
        .iter()
        .map(conversions::history_event_from_proto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((past_events, new_events))
}
