use std::sync::Arc;

use crate::config::PollConfig;
use crate::fal::registry::ModelBinding;
use crate::fal::transport::QueueTransport;
use crate::logger;
use crate::models::{
    GenerationRequest, JobOutcome, QueueStatus, ResultResponse, StatusResponse, SubmitResponse,
};

/// A submitted job. Lives only for the duration of one `JobEngine::run`.
#[derive(Debug, Clone)]
pub struct JobHandle<'a> {
    pub request_id: String,
    pub binding: &'a ModelBinding,
}

impl JobHandle<'_> {
    fn status_url(&self) -> String {
        format!(
            "{}/requests/{}/status",
            self.binding.status_endpoint_base, self.request_id
        )
    }

    fn result_url(&self) -> String {
        format!("{}/requests/{}", self.binding.status_endpoint_base, self.request_id)
    }
}

/// Drives image jobs through submit → poll → retrieve on the queue API.
#[derive(Clone)]
pub struct JobEngine {
    transport: Arc<dyn QueueTransport>,
    poll: PollConfig,
}

impl JobEngine {
    pub fn new(transport: Arc<dyn QueueTransport>, poll: PollConfig) -> Self {
        Self { transport, poll }
    }

    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.transport
    }

    pub async fn run(&self, request: &GenerationRequest, binding: &ModelBinding) -> JobOutcome {
        let _timer = logger::timer(format!("{} image job", binding.display_name));

        let handle = match self.submit(request, binding).await {
            Ok(handle) => handle,
            Err(reason) => {
                log::error!("{}", reason);
                return JobOutcome::Failed { reason };
            }
        };

        let outcome = self.poll_until_terminal(&handle).await;
        match &outcome {
            JobOutcome::Completed { images } => log::info!(
                "Job {} for {} completed with {} image(s)",
                handle.request_id,
                binding.display_name,
                images.len()
            ),
            JobOutcome::Failed { reason } => log::error!("{}", reason),
            JobOutcome::TimedOut { .. } => log::error!(
                "Job {} for {} timed out after {} attempts",
                handle.request_id,
                binding.display_name,
                self.poll.max_attempts
            ),
        }
        outcome
    }

    async fn submit<'a>(
        &self,
        request: &GenerationRequest,
        binding: &'a ModelBinding,
    ) -> Result<JobHandle<'a>, String> {
        let name = &binding.display_name;
        let payload = serde_json::to_value(request)
            .map_err(|e| format!("Could not encode request for {}: {}", name, e))?;

        let reply = self
            .transport
            .submit(&binding.submit_endpoint, &payload)
            .await
            .map_err(|e| format!("Fal.ai API request to {} failed: {}", name, e))?;

        if !reply.is_success() {
            return Err(format!(
                "Fal.ai API request to {} failed with status {}: {}",
                name,
                reply.status,
                reply.text()
            ));
        }

        let request_id = reply
            .json::<SubmitResponse>()
            .ok()
            .and_then(|r| r.request_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| format!("Fal.ai submission to {} did not yield a request_id.", name))?;

        log::info!("Fal.ai job submitted for {}. Request ID: {}", name, request_id);
        Ok(JobHandle {
            request_id,
            binding,
        })
    }

    async fn poll_until_terminal(&self, handle: &JobHandle<'_>) -> JobOutcome {
        let name = &handle.binding.display_name;
        let id = &handle.request_id;
        let max = self.poll.max_attempts;
        let status_url = handle.status_url();

        for attempt in 1..=max {
            tokio::time::sleep(self.poll.interval).await;

            let reply = match self.transport.fetch(&status_url).await {
                Ok(reply) => reply,
                Err(e) => {
                    log::warn!(
                        "Network error during status check for {} ({}) (attempt {}): {}. Retrying...",
                        name,
                        id,
                        attempt,
                        e
                    );
                    continue;
                }
            };

            if !reply.is_success() {
                log::warn!(
                    "Status check for {} ({}) failed (attempt {}): {} {}. Retrying...",
                    name,
                    id,
                    attempt,
                    reply.status,
                    reply.text()
                );
                if reply.status >= 500 && self.poll.in_escalation_window(attempt) {
                    return JobOutcome::Failed {
                        reason: format!(
                            "Fal.ai status check for {} ({}) failed repeatedly. Last status: {}",
                            name, id, reply.status
                        ),
                    };
                }
                continue;
            }

            let status = match reply.json::<StatusResponse>() {
                Ok(status) => status,
                Err(e) => {
                    log::warn!(
                        "Unreadable status payload for {} ({}) (attempt {}): {}. Retrying...",
                        name,
                        id,
                        attempt,
                        e
                    );
                    continue;
                }
            };

            let queue_status = status.queue_status();
            log::info!(
                "Polling attempt {}/{} for {} ({}). Status: {:?}",
                attempt,
                max,
                name,
                id,
                queue_status
            );

            match queue_status {
                QueueStatus::Completed => return self.retrieve(handle).await,
                QueueStatus::Failed | QueueStatus::Cancelled => {
                    let label = status.status.as_deref().unwrap_or_default();
                    return JobOutcome::Failed {
                        reason: format!(
                            "Fal.ai request for {} ({}) {}. Logs: {}",
                            name,
                            id,
                            label,
                            status.logs_summary()
                        ),
                    };
                }
                QueueStatus::Pending(_) => {}
            }
        }

        JobOutcome::TimedOut {
            request_id: id.clone(),
            model: name.clone(),
        }
    }

    async fn retrieve(&self, handle: &JobHandle<'_>) -> JobOutcome {
        let name = &handle.binding.display_name;
        let id = &handle.request_id;

        let reply = match self.transport.fetch(&handle.result_url()).await {
            Ok(reply) => reply,
            Err(e) => {
                return JobOutcome::Failed {
                    reason: format!(
                        "Failed to fetch result for completed Fal.ai job {} ({}): {}",
                        name, id, e
                    ),
                }
            }
        };

        if !reply.is_success() {
            return JobOutcome::Failed {
                reason: format!(
                    "Failed to fetch result for completed Fal.ai job {} ({}) (status {}): {}",
                    name,
                    id,
                    reply.status,
                    reply.text()
                ),
            };
        }

        let images = reply
            .json::<ResultResponse>()
            .ok()
            .and_then(|r| r.images)
            .unwrap_or_default();
        if images.is_empty() {
            return JobOutcome::Failed {
                reason: format!(
                    "Fal.ai job {} ({}) completed but returned no images.",
                    name, id
                ),
            };
        }

        JobOutcome::Completed { images }
    }
}
