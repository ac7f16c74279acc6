// src/service.rs

//! Single-owner repository service
//!
//! The [`Repository`] lives on one dedicated blocking thread. Everything
//! else talks to it through a cloneable [`RepositoryHandle`], sending a
//! [`Command`] with a reply channel. Commands run one at a time and each
//! runs its full re-sign and persist sequence before the next is received.

use crate::error::{Error, Result};
use crate::repository::{
    RepoLayout, RepoStatus, Repository, RotationReport, StagedTargets, TargetsReport,
};
use crate::scheduler::TickReport;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Queued requests before senders wait
const COMMAND_BUFFER: usize = 32;

/// A request to the repository owner
#[derive(Debug)]
pub enum Command {
    /// Run one freshness cycle
    Tick {
        reply: oneshot::Sender<Result<TickReport>>,
    },
    /// Swap in a staged target set
    ///
    /// The command owns the staging directory; whatever is left of it is
    /// removed once the swap has finished.
    ReplaceTargets {
        staged: StagedTargets,
        reply: oneshot::Sender<Result<TargetsReport>>,
    },
    /// Rotate the signing key
    RotateKey {
        reply: oneshot::Sender<Result<RotationReport>>,
    },
    Status {
        reply: oneshot::Sender<RepoStatus>,
    },
}

/// Cloneable client of the repository service
#[derive(Debug, Clone)]
pub struct RepositoryHandle {
    tx: mpsc::Sender<Command>,
    layout: RepoLayout,
}

impl RepositoryHandle {
    /// Layout of the served repository
    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub async fn tick(&self) -> Result<TickReport> {
        self.request(|reply| Command::Tick { reply }).await?
    }

    pub async fn replace_targets(&self, staged: StagedTargets) -> Result<TargetsReport> {
        self.request(|reply| Command::ReplaceTargets { staged, reply })
            .await?
    }

    pub async fn rotate_key(&self) -> Result<RotationReport> {
        self.request(|reply| Command::RotateKey { reply }).await?
    }

    pub async fn status(&self) -> Result<RepoStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| Error::ServiceClosed)?;
        response.await.map_err(|_| Error::ServiceClosed)
    }
}

/// The task owning the repository
pub struct RepositoryService;

impl RepositoryService {
    /// Move `repo` onto its own thread and return a handle to it
    ///
    /// The service stops once every handle has been dropped.
    pub fn spawn(repo: Repository) -> (RepositoryHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = RepositoryHandle {
            tx,
            layout: repo.layout().clone(),
        };
        let task = tokio::task::spawn_blocking(move || run(repo, rx));
        (handle, task)
    }
}

fn run(mut repo: Repository, mut rx: mpsc::Receiver<Command>) {
    info!("Repository service started for {:?}", repo.layout().root());

    while let Some(command) = rx.blocking_recv() {
        let now = Utc::now();
        match command {
            Command::Tick { reply } => {
                let _ = reply.send(repo.tick_at(now));
            }
            Command::ReplaceTargets { staged, reply } => {
                debug!("Replacing target set from {:?}", staged.path());
                let result = repo.replace_targets(staged.path(), now);
                drop(staged);
                let _ = reply.send(result);
            }
            Command::RotateKey { reply } => {
                let _ = reply.send(repo.rotate_key(now));
            }
            Command::Status { reply } => {
                let _ = reply.send(repo.status(now));
            }
        }
    }

    info!("Repository service stopped");
}
