//! Two-phase team creation.
//!
//! Phase one fetches a leader and joins on it alone. Without a leader there is
//! nothing to build, so a failed or timed-out leader aborts the workflow.
//! Phase two fetches `team_size` members from the leader's region and joins
//! on all of them; members that failed, timed out or could not be admitted by
//! the pacer are dropped and the smaller team is still reported.

use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::core::{CorrelatedResult, CorrelationRegistry, CorrelationToken, CreationRequest, Person};
use crate::dispatch::{Dispatcher, Pacer, PersonDecoder, Transport};
use crate::orchestration::{JoinOrchestrator, Mailbox};
use crate::{mlog, mlog_debug, Error, Result};

/// What to ask the person service for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonQuery {
    Leader { female: bool },
    Member { region: String },
}

impl PersonQuery {
    /// Build the request URL against `api_url`.
    pub fn target(&self, api_url: &str) -> Result<String> {
        let params: [(&str, &str); 1] = match self {
            PersonQuery::Leader { female } => {
                [("gender", if *female { "female" } else { "male" })]
            }
            PersonQuery::Member { region } => [("region", region.as_str())],
        };
        let url = reqwest::Url::parse_with_params(api_url, &params)
            .map_err(|e| Error::Validation(format!("api_url '{}': {}", api_url, e)))?;
        Ok(url.into())
    }
}

/// An assembled team. Members keep their dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    pub leader: Person,
    pub members: Vec<Person>,
    pub requested: usize,
}

impl Team {
    pub fn dropped(&self) -> usize {
        self.requested - self.members.len()
    }

    pub fn summary(&self) -> String {
        let names: Vec<String> = self.members.iter().map(Person::full_name).collect();
        format!(
            "Team of {} from {}: {}",
            self.leader.full_name(),
            self.leader.location,
            names.join(", ")
        )
    }
}

/// Result of one workflow run.
#[derive(Debug)]
pub enum TeamOutcome {
    Assembled(Team),
    /// The leader could not be obtained; no members were requested.
    Aborted { reason: Error },
}

impl TeamOutcome {
    pub fn team(&self) -> Option<&Team> {
        match self {
            TeamOutcome::Assembled(team) => Some(team),
            TeamOutcome::Aborted { .. } => None,
        }
    }

    pub fn members(&self) -> &[Person] {
        self.team().map(|t| t.members.as_slice()).unwrap_or(&[])
    }
}

/// Runs team creation on top of a shared join orchestrator.
pub struct TeamWorkflow {
    joins: Arc<JoinOrchestrator<Person>>,
    api_url: String,
}

impl TeamWorkflow {
    pub fn new(joins: Arc<JoinOrchestrator<Person>>, api_url: &str) -> Self {
        Self {
            joins,
            api_url: api_url.to_string(),
        }
    }

    /// Wire registry, pacer, mailbox and dispatcher from `config`.
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let mailbox = Arc::new(Mailbox::new());
        let dispatcher = Dispatcher::new(
            Arc::new(CorrelationRegistry::new()),
            Arc::new(Pacer::new(config.min_interval(), config.max_scheduled)),
            transport,
            Arc::new(PersonDecoder),
            mailbox.clone(),
        );
        let joins = JoinOrchestrator::new(Arc::new(dispatcher), mailbox, config.join_timeout());
        Self::new(Arc::new(joins), &config.api_url)
    }

    pub fn joins(&self) -> &Arc<JoinOrchestrator<Person>> {
        &self.joins
    }

    /// Run both phases for one request.
    ///
    /// Returns `Err` only when the leader request cannot be admitted by the
    /// pacer. Call failures shape the outcome instead, and member requests
    /// rejected for capacity are dropped like failed members.
    pub async fn run(&self, request: CreationRequest) -> Result<TeamOutcome> {
        let leader_target = PersonQuery::Leader {
            female: request.leader_is_female(),
        }
        .target(&self.api_url)?;

        let report = self.joins.fan_out([leader_target]).await?;
        let Some((token, outcome)) = report.results.into_iter().next() else {
            return Err(Error::Validation("leader join produced no result".into()));
        };
        let leader = match self.accept("leader", token, outcome) {
            Ok(leader) => leader,
            Err(reason) => return Ok(TeamOutcome::Aborted { reason }),
        };

        let member_target = PersonQuery::Member {
            region: leader.location.clone(),
        }
        .target(&self.api_url)?;
        let targets = vec![member_target; request.team_size()];

        let report = self.joins.fan_out_admitted(targets).await?;
        if report.rejected > 0 {
            mlog_debug!(
                "{} team members not requested: pacer is full",
                report.rejected
            );
        }
        let members: Vec<Person> = report
            .results
            .into_iter()
            .filter_map(|(token, outcome)| self.accept("member", token, outcome).ok())
            .collect();

        let team = Team {
            leader,
            members,
            requested: request.team_size(),
        };
        if !team.members.is_empty() {
            mlog!("{}", team.summary());
        }
        Ok(TeamOutcome::Assembled(team))
    }

    fn accept(
        &self,
        role: &str,
        token: CorrelationToken,
        outcome: CorrelatedResult<Person>,
    ) -> std::result::Result<Person, Error> {
        match outcome {
            CorrelatedResult::Value(person) => Ok(person),
            CorrelatedResult::TimedOut => {
                mlog_debug!("Timeout for team {} with correlation id {}", role, token);
                Err(Error::DeadlineExpired(self.joins.timeout()))
            }
            CorrelatedResult::Failure(e) => {
                mlog_debug!(
                    "Failed to create team {} with correlation id {}: {}",
                    role,
                    token,
                    e
                );
                Err(e)
            }
        }
    }
}
