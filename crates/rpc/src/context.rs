//! Application context - wires everything together
//!
//! Every repository and service is constructed once here and handed to the
//! components that need it.

use chrono::{DateTime, Utc};
use stash_admission::AdmissionPipeline;
use stash_core::UserId;
use stash_events::RiskLog;
use stash_ledger::{
    AuditReport, EnvelopeLedger, EnvelopeLogRepository, InMemoryEnvelopeLogRepository, InMemoryTransactionRepository,
    TransactionRepository,
};
use stash_lending::LoanDesk;
use stash_policy::{InMemoryPolicyStore, InMemoryUserDirectory, PolicySnapshot, UserDirectory};
use stash_risk::RiskScorer;
use stash_velocity::VelocityTracker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::seed::Seed;
use crate::submission::SubmissionSlots;

pub struct AppContext {
    pub policy: Arc<InMemoryPolicyStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub velocity: Arc<VelocityTracker>,
    pub risk_log: Arc<RiskLog>,
    pub ledger: Arc<EnvelopeLedger>,
    pub pipeline: AdmissionPipeline,
    pub scorer: RiskScorer,
    pub loans: LoanDesk,
    pub(crate) submissions: Mutex<SubmissionSlots>,
    config: AppConfig,
}

impl AppContext {
    /// Policy bundle from `policy_file`, risk log under `data_dir`
    pub fn open(config: AppConfig) -> Result<Self, anyhow::Error> {
        std::fs::create_dir_all(&config.data_dir)?;

        let snapshot = match &config.policy_file {
            Some(path) => PolicySnapshot::from_file(path)?,
            None => {
                tracing::warn!("No policy file configured; the geo allowlist is empty");
                PolicySnapshot::default()
            }
        };
        let risk_log = RiskLog::open(config.risk_log_path())?;

        tracing::info!(data_dir = %config.data_dir.display(), "Application context opened");
        Ok(Self::assemble(config, snapshot, risk_log))
    }

    /// Nothing touches disk
    pub fn in_memory(config: AppConfig, snapshot: PolicySnapshot) -> Self {
        Self::assemble(config, snapshot, RiskLog::in_memory())
    }

    fn assemble(config: AppConfig, snapshot: PolicySnapshot, risk_log: RiskLog) -> Self {
        let policy = Arc::new(InMemoryPolicyStore::new(snapshot));
        let users = Arc::new(InMemoryUserDirectory::new());
        let velocity = Arc::new(VelocityTracker::new());
        let risk_log = Arc::new(risk_log);

        let transactions: Arc<dyn TransactionRepository> = Arc::new(InMemoryTransactionRepository::new());
        let logs: Arc<dyn EnvelopeLogRepository> = Arc::new(InMemoryEnvelopeLogRepository::new());
        let ledger = Arc::new(EnvelopeLedger::new(transactions.clone(), logs, config.ledger.clone()));

        let pipeline = AdmissionPipeline::new(policy.clone(), velocity.clone(), risk_log.clone(), &config.admission);
        let scorer = RiskScorer::new(transactions, config.risk.clone());
        let loans = LoanDesk::new(ledger.clone(), config.lending.clone());

        Self {
            policy,
            users,
            velocity,
            risk_log,
            ledger,
            pipeline,
            scorer,
            loans,
            submissions: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Register seeded users, their limitations and envelopes
    pub async fn load_seed(&self, seed: &Seed) -> Result<(), anyhow::Error> {
        let now = Utc::now();
        for user in &seed.users {
            self.users.register(user.to_user()).await?;
            if let Some(record) = user.limitation_record(now) {
                self.users.apply_limitation(record).await?;
            }
        }
        for envelope in &seed.envelopes {
            self.ledger.open_account(envelope.to_account()).await?;
        }
        tracing::info!(users = seed.users.len(), envelopes = seed.envelopes.len(), "Seed loaded");
        Ok(())
    }

    /// Lift temporary limitations that have run out
    pub async fn sweep_limitations(&self, now: DateTime<Utc>) -> Result<Vec<UserId>, anyhow::Error> {
        Ok(self.users.sweep_expired(now).await?)
    }

    /// Conservation audit for each of `users`
    pub async fn audit(&self, users: &[UserId]) -> Result<Vec<AuditReport>, anyhow::Error> {
        let mut reports = Vec::with_capacity(users.len());
        for user in users {
            reports.push(self.ledger.audit_user(user).await?);
        }
        let failed = reports.iter().filter(|r| !r.consistent).count();
        if failed > 0 {
            tracing::error!(failed, "Conservation audit found discrepancies");
        }
        Ok(reports)
    }
}
