use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use super::state::Effect;
use super::types::EvaluationResult;
use crate::service::{EvaluationService, ServiceError};

/// Outcome of a background service call, tagged with the request it answers.
#[derive(Debug)]
pub(crate) enum JobMessage {
    VariablesFetched {
        token: u64,
        result: Result<Vec<String>, ServiceError>,
    },
    EvaluationFinished {
        id: u64,
        result: Result<EvaluationResult, ServiceError>,
    },
}

/// Runs effects on worker threads and funnels their results into one channel.
pub(crate) struct SessionJobs<S> {
    service: Arc<S>,
    message_tx: Sender<JobMessage>,
    message_rx: Receiver<JobMessage>,
    outstanding: usize,
}

impl<S: EvaluationService> SessionJobs<S> {
    pub(crate) fn new(service: Arc<S>) -> Self {
        let (message_tx, message_rx) = std::sync::mpsc::channel::<JobMessage>();
        Self {
            service,
            message_tx,
            message_rx,
            outstanding: 0,
        }
    }

    pub(crate) fn service(&self) -> &S {
        &self.service
    }

    /// Start the network call an effect asks for.
    pub(crate) fn run(&mut self, effect: Effect) {
        self.outstanding += 1;
        let service = Arc::clone(&self.service);
        let tx = self.message_tx.clone();
        match effect {
            Effect::FetchVariables { token, file } => {
                thread::spawn(move || {
                    let result = service.fetch_variables(&file);
                    let _ = tx.send(JobMessage::VariablesFetched { token, result });
                });
            }
            Effect::Evaluate(request) => {
                thread::spawn(move || {
                    let result = service.evaluate(&request);
                    let _ = tx.send(JobMessage::EvaluationFinished {
                        id: request.id,
                        result,
                    });
                });
            }
        }
    }

    /// Number of started calls whose result has not been received yet.
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub(crate) fn try_recv(&mut self) -> Option<JobMessage> {
        match self.message_rx.try_recv() {
            Ok(message) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                Some(message)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub(crate) fn recv_timeout(&mut self, timeout: Duration) -> Option<JobMessage> {
        match self.message_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.outstanding = self.outstanding.saturating_sub(1);
                Some(message)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
