use anyhow::Result;
use log::{debug, warn};

use crate::credentials::Credentials;
use crate::error::StageError;
use crate::orchestrator::{Orchestrator, RecordKey, RecordSet, Session, UpdateReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    SelectDomains,
    SelectRecords,
    Update,
    Done,
}

impl Stage {
    /// Next stage after this one was attempted. Failure repeats the stage.
    pub fn after(self, succeeded: bool) -> Stage {
        if !succeeded {
            return self;
        }
        match self {
            Stage::Authenticate => Stage::SelectDomains,
            Stage::SelectDomains => Stage::SelectRecords,
            Stage::SelectRecords => Stage::Update,
            Stage::Update | Stage::Done => Stage::Done,
        }
    }
}

/// Where credentials tried before the first prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Given on the command line.
    Flags,
    /// Loaded from the credentials file.
    Stored,
}

/// Whoever supplies the wizard's input and reads its messages.
///
/// Returning an error from any method ends the run.
pub trait Operator {
    fn credentials(&mut self) -> Result<Credentials>;

    fn choose_domains(&mut self, domains: &[String]) -> Result<Vec<String>>;

    fn choose_records(&mut self, records: &RecordSet) -> Result<Vec<RecordKey>>;

    /// Called when `stage` failed and is about to be offered again.
    fn rejected(&mut self, stage: Stage, error: &StageError) -> Result<()>;

    fn finished(&mut self, report: &UpdateReport);
}

pub struct Wizard {
    orchestrator: Orchestrator,
    session: Session,
    stage: Stage,
    initial: Option<(Credentials, CredentialSource)>,
}

impl Wizard {
    /// `initial` credentials, if any, are tried before asking the operator.
    pub fn new(
        orchestrator: Orchestrator,
        initial: Option<(Credentials, CredentialSource)>,
    ) -> Self {
        Self {
            orchestrator,
            session: Session::default(),
            stage: Stage::Authenticate,
            initial,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs the current stage once. Returns the report when the update stage
    /// completes.
    pub async fn step<O: Operator>(&mut self, operator: &mut O) -> Result<Option<UpdateReport>> {
        let outcome = match self.stage {
            Stage::Authenticate => match self.initial.take() {
                Some((creds, source)) => self
                    .orchestrator
                    .authenticate(&mut self.session, creds)
                    .await
                    .map_err(|e| match (e, source) {
                        (StageError::InvalidCredentials, CredentialSource::Stored) => {
                            StageError::SavedCredentialsRejected
                        }
                        (other, _) => other,
                    })
                    .map(|()| None),
                None => {
                    let creds = operator.credentials()?;
                    self.orchestrator
                        .authenticate(&mut self.session, creds)
                        .await
                        .map(|()| None)
                }
            },
            Stage::SelectDomains => {
                let chosen = operator.choose_domains(&self.session.domains)?;
                self.orchestrator
                    .select_domains(&mut self.session, &chosen)
                    .await
                    .map(|()| None)
            }
            Stage::SelectRecords => {
                debug!("Selected domains: {:?}", self.session.selected_domains);
                let chosen = operator.choose_records(&self.session.records)?;
                self.orchestrator
                    .select_records(&mut self.session, &chosen)
                    .map(|()| None)
            }
            Stage::Update => self.orchestrator.update(&self.session).await.map(Some),
            Stage::Done => return Ok(None),
        };

        match outcome {
            Ok(report) => {
                self.stage = self.stage.after(true);
                if let Some(report) = &report {
                    operator.finished(report);
                }
                Ok(report)
            }
            Err(error) => {
                warn!("{:?} stage failed: {}", self.stage, error);
                operator.rejected(self.stage, &error)?;
                self.stage = self.stage.after(false);
                Ok(None)
            }
        }
    }

    /// Steps until the update stage completes or the operator gives up.
    pub async fn run<O: Operator>(&mut self, operator: &mut O) -> Result<UpdateReport> {
        while self.stage() != Stage::Done {
            if let Some(report) = self.step(operator).await? {
                return Ok(report);
            }
        }
        anyhow::bail!("DNS update already ran in this session")
    }
}
