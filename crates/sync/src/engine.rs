//! Per-report submission engine.
//!
//! [`SubmissionEngine::spawn`] starts a task that owns one report's
//! [`SubmissionState`] and drives it through the transition table in
//! [`crate::machine`]. Commands arrive over an mpsc channel; while a step
//! (probe, wait, upload, submit) is running, commands are logged and
//! dropped, so a burst of retries can never start a second submission.
//!
//! Every state change is published on the engine's watch channel and as a
//! [`SyncEvent`], and whenever the persisted status differs the new status
//! is written through to the [`ReportStore`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fieldsync_core::config::{BackoffConfig, SyncConfig};
use fieldsync_core::failure::SubmissionFailure;
use fieldsync_core::report::Report;
use fieldsync_core::types::ReportId;
use fieldsync_db::store::ReportStore;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::api::{ReportApi, SubmitOutcome};
use crate::events::SyncEvent;
use crate::machine::{transition, SubmissionEvent, SubmissionState};
use crate::photo::{PhotoStaging, PhotoUploader};
use crate::prober::{NetworkProbe, NetworkStatus};

/// How long [`EngineHandle::shutdown`] waits for the task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The external services an engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub probe: Arc<dyn NetworkProbe>,
    pub api: Arc<dyn ReportApi>,
    pub uploader: Arc<dyn PhotoUploader>,
    pub staging: PhotoStaging,
}

/// Timing parameters shared by all engines.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub submit_timeout: Duration,
    pub photo_upload_timeout: Duration,
    pub network_retry: BackoffConfig,
}

impl EngineSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            submit_timeout: config.submit_timeout(),
            photo_upload_timeout: config.photo_upload_timeout(),
            network_retry: config.network_retry.clone(),
        }
    }
}

/// User commands accepted by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Submit,
    Retry,
}

/// Owner's side of a running engine.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    state: watch::Receiver<SubmissionState>,
    cancel: CancellationToken,
    task_handle: tokio::task::JoinHandle<()>,
}

impl EngineHandle {
    /// Queue a command. Returns `false` if the engine has stopped.
    pub fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SubmissionState> {
        self.state.clone()
    }

    /// Cancel the engine and wait up to five seconds for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.task_handle)
            .await
            .is_err()
        {
            tracing::warn!("Submission engine did not stop within grace period");
        }
    }
}

/// One unit of work performed in a busy state.
#[derive(Debug, Clone, Copy)]
enum Step {
    VerifyNetwork,
    WaitForNetwork(Duration),
    UploadPhoto,
    SubmitData,
}

impl Step {
    fn for_state(state: &SubmissionState, retry_delay: Duration) -> Option<Self> {
        match state {
            SubmissionState::VerifyingNetwork => Some(Step::VerifyNetwork),
            SubmissionState::WaitingForNetwork => Some(Step::WaitForNetwork(retry_delay)),
            SubmissionState::UploadingPhoto { .. } => Some(Step::UploadPhoto),
            SubmissionState::SubmittingData => Some(Step::SubmitData),
            SubmissionState::Idle
            | SubmissionState::Success { .. }
            | SubmissionState::Failure { .. } => None,
        }
    }
}

/// Drives a single report through submission.
pub struct SubmissionEngine {
    report: Report,
    store: Arc<ReportStore>,
    collaborators: Collaborators,
    settings: EngineSettings,
    event_tx: broadcast::Sender<SyncEvent>,
    state_tx: watch::Sender<SubmissionState>,
}

impl SubmissionEngine {
    /// Start an engine for `report`, resuming from its persisted status.
    pub fn spawn(
        report: Report,
        store: Arc<ReportStore>,
        collaborators: Collaborators,
        settings: EngineSettings,
        event_tx: broadcast::Sender<SyncEvent>,
        cancel: CancellationToken,
    ) -> EngineHandle {
        let (state_tx, state_rx) = watch::channel(SubmissionState::for_report(&report));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let report_id = report.id;

        let engine = Self {
            report,
            store,
            collaborators,
            settings,
            event_tx,
            state_tx,
        };

        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move {
            tracing::debug!(report_id = %report_id, "Submission engine started");
            engine.run(command_rx, task_cancel).await;
            tracing::debug!(report_id = %report_id, "Submission engine stopped");
        });

        EngineHandle {
            commands: command_tx,
            state: state_rx,
            cancel,
            task_handle,
        }
    }

    fn id(&self) -> ReportId {
        self.report.id
    }

    /// Main loop: wait for a command while resting, run a step while busy,
    /// feed the outcome through the transition table. Runs until cancelled.
    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        cancel: CancellationToken,
    ) {
        let mut state = self.state_tx.borrow().clone();
        let mut retry_delay = self.settings.network_retry.initial_delay();

        loop {
            let event = match Step::for_state(&state, retry_delay) {
                Some(step) => self.run_step(step, &mut state, &mut commands, &cancel).await,
                None => Self::next_command(&mut commands, &cancel).await,
            };
            let Some(event) = event else {
                return;
            };

            match event {
                SubmissionEvent::Submit
                | SubmissionEvent::Retry
                | SubmissionEvent::NetworkAvailable => {
                    retry_delay = self.settings.network_retry.initial_delay();
                }
                SubmissionEvent::RecheckNetwork => {
                    retry_delay = self.settings.network_retry.next_delay(retry_delay);
                }
                _ => {}
            }

            let label = format!("{event:?}");
            if !self.advance(&mut state, event).await {
                tracing::debug!(
                    report_id = %self.id(),
                    state = state.name(),
                    event = %label,
                    "Ignoring event with no transition",
                );
            }
        }
    }

    /// Wait for the next user command while resting.
    async fn next_command(
        commands: &mut mpsc::UnboundedReceiver<EngineCommand>,
        cancel: &CancellationToken,
    ) -> Option<SubmissionEvent> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            command = commands.recv() => command.map(|command| match command {
                EngineCommand::Submit => SubmissionEvent::Submit,
                EngineCommand::Retry => SubmissionEvent::Retry,
            }),
        }
    }

    /// Run `step` to completion, applying photo progress as it arrives and
    /// discarding commands. Returns `None` when cancelled.
    async fn run_step(
        &self,
        step: Step,
        state: &mut SubmissionState,
        commands: &mut mpsc::UnboundedReceiver<EngineCommand>,
        cancel: &CancellationToken,
    ) -> Option<SubmissionEvent> {
        // A fresh channel per attempt, so progress from an abandoned
        // attempt can never reach a later one.
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let work = self.perform(step, progress_tx);
        tokio::pin!(work);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                event = &mut work => return Some(event),
                Some(progress) = progress_rx.recv() => {
                    self.advance(state, SubmissionEvent::PhotoProgress(progress)).await;
                }
                command = commands.recv() => match command {
                    Some(command) => tracing::debug!(
                        report_id = %self.id(),
                        ?command,
                        state = state.name(),
                        "Ignoring command while submission is in progress",
                    ),
                    None => return None,
                },
            }
        }
    }

    async fn perform(&self, step: Step, progress: mpsc::UnboundedSender<f32>) -> SubmissionEvent {
        match step {
            Step::VerifyNetwork => match self.collaborators.probe.check_network_status().await {
                NetworkStatus::Available => SubmissionEvent::NetworkAvailable,
                NetworkStatus::Unavailable => SubmissionEvent::NetworkUnavailable,
            },
            Step::WaitForNetwork(delay) => {
                tracing::debug!(
                    report_id = %self.id(),
                    delay_ms = delay.as_millis() as u64,
                    "Waiting for network",
                );
                tokio::time::sleep(delay).await;
                SubmissionEvent::RecheckNetwork
            }
            Step::UploadPhoto => self.upload_photo(progress).await,
            Step::SubmitData => self.submit_data().await,
        }
    }

    async fn upload_photo(&self, progress: mpsc::UnboundedSender<f32>) -> SubmissionEvent {
        let Some(photo) = &self.report.photo else {
            return SubmissionEvent::PhotoUploaded;
        };

        let staged = match self
            .collaborators
            .staging
            .stage(self.id(), Path::new(&photo.uri))
            .await
        {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(report_id = %self.id(), error = %e, "Failed to stage photo");
                return SubmissionEvent::PhotoFailed(SubmissionFailure::Network);
            }
        };

        let upload = self
            .collaborators
            .uploader
            .upload(self.id(), &staged, progress);
        match tokio::time::timeout(self.settings.photo_upload_timeout, upload).await {
            Ok(Ok(())) => SubmissionEvent::PhotoUploaded,
            Ok(Err(e)) => {
                tracing::warn!(report_id = %self.id(), error = %e, "Photo upload failed");
                SubmissionEvent::PhotoFailed(e.to_failure())
            }
            Err(_) => SubmissionEvent::PhotoFailed(SubmissionFailure::timeout(
                self.settings.photo_upload_timeout.as_millis() as u64,
            )),
        }
    }

    async fn submit_data(&self) -> SubmissionEvent {
        let submit = self.collaborators.api.submit(&self.report);
        match tokio::time::timeout(self.settings.submit_timeout, submit).await {
            Ok(Ok(SubmitOutcome::Accepted {
                result,
                in_african_swine_fever_zone,
            })) => SubmissionEvent::DataAccepted {
                result,
                in_african_swine_fever_zone,
            },
            Ok(Ok(SubmitOutcome::Rejected {
                code,
                description,
                params,
            })) => SubmissionEvent::DataFailed(SubmissionFailure::Server {
                code,
                description,
                params,
            }),
            Ok(Err(e)) => {
                tracing::warn!(report_id = %self.id(), error = %e, "Report submission request failed");
                SubmissionEvent::DataFailed(e.to_failure())
            }
            Err(_) => SubmissionEvent::DataFailed(SubmissionFailure::timeout(
                self.settings.submit_timeout.as_millis() as u64,
            )),
        }
    }

    /// Apply `event`. Returns `false` if the current state ignores it.
    async fn advance(&self, state: &mut SubmissionState, event: SubmissionEvent) -> bool {
        let Some(next) = transition(state, event, self.report.has_photo()) else {
            return false;
        };
        let previous = std::mem::replace(state, next);
        self.enter(&previous, state).await;
        true
    }

    /// Persist and publish a newly entered state.
    async fn enter(&self, previous: &SubmissionState, current: &SubmissionState) {
        let report_id = self.id();

        if previous.report_status() != current.report_status() {
            if let Err(e) = self
                .store
                .update_status(report_id, current.status_update())
                .await
            {
                tracing::warn!(
                    report_id = %report_id,
                    status = %current.report_status(),
                    error = %e,
                    "Failed to record submission status",
                );
            }
        }

        match current {
            SubmissionState::Success { result, .. } => tracing::info!(
                report_id = %report_id,
                strap_number = result.strap_number.as_deref().unwrap_or("-"),
                "Report submitted",
            ),
            SubmissionState::Failure { failure } => tracing::warn!(
                report_id = %report_id,
                failure = %failure,
                "Report submission failed",
            ),
            SubmissionState::UploadingPhoto { progress } => tracing::trace!(
                report_id = %report_id,
                progress,
                "Photo upload progress",
            ),
            other => tracing::debug!(
                report_id = %report_id,
                from = previous.name(),
                to = other.name(),
                "Submission state changed",
            ),
        }

        self.state_tx.send_replace(current.clone());
        let _ = self.event_tx.send(SyncEvent::StateChanged {
            report_id,
            state: current.clone(),
        });
    }
}
