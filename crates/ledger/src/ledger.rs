//! Envelope ledger
//!
//! Owns every envelope balance. All balance writes go through the
//! operations below, each of which is one unit of work:
//!
//! 1. lock every account involved, in `AccountId` order, within the lock
//!    timeout
//! 2. check preconditions under the locks
//! 3. apply the balance changes
//! 4. persist the transactions; on failure restore the locked accounts
//!    to their state at step 1
//!
//! Debt/surplus logging happens after the commit and never rolls it back.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use stash_core::{
    AccountId, AccountType, AllocationLine, Amount, DebtLog, EnvelopeAccount, IdempotencyKey, SurplusLog,
    Transaction, TransactionId, TransactionOrigin, TransactionType, UserId,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::allocation::{assess, split, validate_percentages, Gap, StatusAssessment};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::fingerprint::request_fingerprint;
use crate::repository::{EnvelopeLogRepository, TransactionRepository};
use crate::request::{
    DisbursementReceipt, DrawLine, EntryDetails, ExpenseReceipt, IncomeReceipt, Receipt, TransferReceipt,
};
use crate::snapshot::{AccountView, AuditReport, EnvelopeSnapshot};

type AccountCell = Arc<Mutex<EnvelopeAccount>>;

struct StoredReceipt {
    fingerprint: String,
    receipt: Receipt,
    stored_at: DateTime<Utc>,
}

type ReceiptSlot = Arc<Mutex<Option<StoredReceipt>>>;

/// Accounts held for one unit of work
struct LockedAccounts {
    guards: Vec<OwnedMutexGuard<EnvelopeAccount>>,
    before: Vec<EnvelopeAccount>,
}

impl LockedAccounts {
    fn get(&self, id: &AccountId) -> LedgerResult<&EnvelopeAccount> {
        self.guards
            .iter()
            .find(|g| g.id == *id)
            .map(|g| &**g)
            .ok_or(LedgerError::AccountNotFound(*id))
    }

    fn get_mut(&mut self, id: &AccountId) -> LedgerResult<&mut EnvelopeAccount> {
        self.guards
            .iter_mut()
            .find(|g| g.id == *id)
            .map(|g| &mut **g)
            .ok_or(LedgerError::AccountNotFound(*id))
    }

    fn iter(&self) -> impl Iterator<Item = &EnvelopeAccount> {
        self.guards.iter().map(|g| &**g)
    }

    /// Abort: put every account back as it was when locked
    fn rollback(&mut self) {
        for (guard, before) in self.guards.iter_mut().zip(&self.before) {
            **guard = before.clone();
        }
    }
}

fn debit(account: &mut EnvelopeAccount, amount: Amount) -> LedgerResult<()> {
    if !account.active {
        return Err(LedgerError::InactiveAccount(account.id));
    }
    account.balance = account
        .balance
        .checked_sub(&amount)
        .ok_or(LedgerError::InsufficientFunds {
            account: account.id,
            available: account.balance.minor_units(),
            requested: amount.minor_units(),
        })?;
    Ok(())
}

fn credit(account: &mut EnvelopeAccount, amount: Amount) -> LedgerResult<()> {
    if !account.active {
        return Err(LedgerError::InactiveAccount(account.id));
    }
    account.balance = account.balance.checked_add(&amount).ok_or(LedgerError::Overflow)?;
    Ok(())
}

fn link(a: &mut Transaction, b: &mut Transaction) {
    a.counterpart = Some(b.id);
    b.counterpart = Some(a.id);
}

/// Log and pass through requests rejected as invariant violations
fn reject(err: LedgerError) -> LedgerError {
    tracing::error!(error = %err, "Ledger request rejected");
    err
}

fn key_conflict(key: Option<&IdempotencyKey>) -> LedgerError {
    LedgerError::IdempotencyConflict(key.map(|k| k.to_string()).unwrap_or_default())
}

pub struct EnvelopeLedger {
    accounts: DashMap<AccountId, AccountCell>,
    owners: DashMap<UserId, Vec<AccountId>>,
    /// Keys are scoped to the user the operation is booked for
    receipts: DashMap<(UserId, IdempotencyKey), ReceiptSlot>,
    transactions: Arc<dyn TransactionRepository>,
    logs: Arc<dyn EnvelopeLogRepository>,
    config: LedgerConfig,
}

impl EnvelopeLedger {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        logs: Arc<dyn EnvelopeLogRepository>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            accounts: DashMap::new(),
            owners: DashMap::new(),
            receipts: DashMap::new(),
            transactions,
            logs,
            config,
        }
    }

    pub fn transactions(&self) -> &Arc<dyn TransactionRepository> {
        &self.transactions
    }

    pub fn logs(&self) -> &Arc<dyn EnvelopeLogRepository> {
        &self.logs
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // === Locking ===

    fn account_ids(&self, user: &UserId) -> Vec<AccountId> {
        self.owners.get(user).map(|ids| ids.value().clone()).unwrap_or_default()
    }

    async fn lock_accounts(&self, ids: &[AccountId]) -> LedgerResult<LockedAccounts> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        let cells = ids
            .iter()
            .map(|id| {
                self.accounts
                    .get(id)
                    .map(|cell| cell.value().clone())
                    .ok_or(LedgerError::AccountNotFound(*id))
            })
            .collect::<LedgerResult<Vec<AccountCell>>>()?;

        let acquire = async move {
            let mut guards = Vec::with_capacity(cells.len());
            for cell in cells {
                guards.push(cell.lock_owned().await);
            }
            guards
        };

        let timeout_ms = self.config.lock_timeout_ms;
        let guards = tokio::time::timeout(Duration::from_millis(timeout_ms), acquire)
            .await
            .map_err(|_| {
                tracing::error!(accounts = ids.len(), timeout_ms, "Account lock timeout");
                LedgerError::LockTimeout(timeout_ms)
            })?;

        let before = guards.iter().map(|g| (**g).clone()).collect();
        Ok(LockedAccounts { guards, before })
    }

    /// Persist the unit of work or roll the locked accounts back
    async fn commit(&self, locked: &mut LockedAccounts, transactions: Vec<Transaction>) -> LedgerResult<()> {
        if let Err(e) = self.transactions.insert_all(transactions).await {
            locked.rollback();
            tracing::error!(error = %e, "Commit failed, unit of work rolled back");
            return Err(e);
        }
        Ok(())
    }

    fn refresh_status(&self, account: &mut EnvelopeAccount) -> StatusAssessment {
        let assessment = assess(
            account.balance,
            account.target,
            account.percentage,
            account.allocation_cycles,
            self.config.target_horizon_cycles,
            self.config.on_target_band_pct,
        );
        account.status = assessment.status;
        assessment
    }

    // === Idempotency ===

    async fn idempotent<F, Fut>(
        &self,
        scope: &UserId,
        key: Option<&IdempotencyKey>,
        fingerprint: String,
        op: F,
    ) -> LedgerResult<Receipt>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LedgerResult<Receipt>>,
    {
        let Some(key) = key else {
            return op().await;
        };

        let scoped = (scope.clone(), key.clone());
        if !self.receipts.contains_key(&scoped) {
            self.prune_receipts(Utc::now());
        }
        let slot = self.receipts.entry(scoped).or_default().value().clone();
        let mut slot = slot.lock_owned().await;

        if let Some(stored) = slot.as_ref() {
            if stored.fingerprint == fingerprint {
                tracing::info!(key = %key, "Idempotent replay, returning stored receipt");
                return Ok(stored.receipt.clone());
            }
            tracing::error!(key = %key, "Idempotency key reused for a different request");
            return Err(LedgerError::IdempotencyConflict(key.to_string()));
        }

        // Failed operations leave the slot empty so the request can be retried.
        let receipt = op().await?;
        *slot = Some(StoredReceipt {
            fingerprint,
            receipt: receipt.clone(),
            stored_at: Utc::now(),
        });
        Ok(receipt)
    }

    /// Forget receipts older than the retention window. Slots that are in
    /// use (locked, or held by a caller about to lock them) are kept.
    fn prune_receipts(&self, now: DateTime<Utc>) {
        let ttl = chrono::Duration::seconds(self.config.idempotency_ttl_secs as i64);
        let before = self.receipts.len();
        self.receipts.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(stored) => stored.as_ref().is_some_and(|s| now - s.stored_at < ttl),
                Err(_) => true,
            }
        });
        let pruned = before.saturating_sub(self.receipts.len());
        if pruned > 0 {
            tracing::debug!(pruned, "Expired idempotency receipts dropped");
        }
    }

    /// Number of idempotency receipts currently retained
    pub fn retained_receipts(&self) -> usize {
        self.receipts.len()
    }

    async fn owner_of(&self, id: &AccountId) -> LedgerResult<UserId> {
        Ok(self.account(id).await?.owner)
    }

    // === Account administration ===

    /// Register a new envelope for its owner
    pub async fn open_account(&self, account: EnvelopeAccount) -> LedgerResult<AccountId> {
        if account.percentage < Decimal::ZERO || account.percentage > Decimal::ONE_HUNDRED {
            return Err(reject(LedgerError::InvalidPercentages(format!(
                "{} is outside 0..=100",
                account.percentage
            ))));
        }

        let id = account.id;
        let owner = account.owner.clone();
        tracing::info!(
            user_id = %owner,
            account_id = %id,
            account_type = %account.account_type,
            percentage = %account.percentage,
            "Envelope opened"
        );
        self.accounts.insert(id, Arc::new(Mutex::new(account)));
        self.owners.entry(owner).or_default().push(id);
        Ok(id)
    }

    /// Replace the percentages of all active accounts of `user`.
    ///
    /// Every active account must be listed and the new set must sum to 100
    /// within tolerance. Nothing changes unless the whole set is valid.
    pub async fn set_percentages(&self, user: &UserId, percentages: &[(AccountId, Decimal)]) -> LedgerResult<()> {
        let mut locked = self.lock_accounts(&self.account_ids(user)).await?;

        let active: HashSet<AccountId> = locked.iter().filter(|a| a.active).map(|a| a.id).collect();
        let listed: HashSet<AccountId> = percentages.iter().map(|(id, _)| *id).collect();

        for (id, _) in percentages {
            let account = locked.get(id)?;
            if !account.active {
                return Err(reject(LedgerError::InactiveAccount(*id)));
            }
        }
        if listed != active || listed.len() != percentages.len() {
            return Err(reject(LedgerError::InvalidPercentages(
                "every active account must be listed exactly once".to_string(),
            )));
        }

        let values: Vec<Decimal> = percentages.iter().map(|(_, p)| *p).collect();
        validate_percentages(&values, self.config.percentage_tolerance).map_err(reject)?;

        for (id, pct) in percentages {
            locked.get_mut(id)?.percentage = *pct;
        }
        tracing::info!(user_id = %user, accounts = percentages.len(), "Percentages updated");
        Ok(())
    }

    pub async fn set_target(&self, account_id: AccountId, target: Amount) -> LedgerResult<()> {
        let mut locked = self.lock_accounts(&[account_id]).await?;
        let account = locked.get_mut(&account_id)?;
        account.target = target;
        let assessment = self.refresh_status(account);
        tracing::info!(account_id = %account_id, target = %target, status = %assessment.status, "Target updated");
        Ok(())
    }

    /// Deactivate an empty envelope. It stops taking part in allocation.
    pub async fn deactivate(&self, account_id: AccountId) -> LedgerResult<()> {
        let mut locked = self.lock_accounts(&[account_id]).await?;
        let account = locked.get_mut(&account_id)?;
        if !account.balance.is_zero() {
            return Err(reject(LedgerError::NonZeroBalance(account_id)));
        }
        account.active = false;
        account.percentage = Decimal::ZERO;
        tracing::info!(account_id = %account_id, "Envelope deactivated");
        Ok(())
    }

    // === Income and allocation ===

    /// Split `amount` across the user's active envelopes and return the lines
    pub async fn allocate(&self, user: &UserId, amount: Amount) -> LedgerResult<Vec<AllocationLine>> {
        let receipt = self.record_income(user, amount, EntryDetails::new()).await?;
        Ok(receipt.transaction.allocations)
    }

    /// Record external income and allocate it.
    ///
    /// All-or-nothing: either every envelope receives its line and the
    /// transaction is stored, or no balance changes.
    pub async fn record_income(&self, user: &UserId, amount: Amount, details: EntryDetails) -> LedgerResult<IncomeReceipt> {
        let key = details.idempotency_key.clone();
        let fingerprint = request_fingerprint("income", &[user.to_string(), amount.to_string()]);
        let receipt = self
            .idempotent(user, key.as_ref(), fingerprint, || async {
                self.apply_income(user, amount, &details).await.map(Receipt::Income)
            })
            .await?;
        match receipt {
            Receipt::Income(r) => Ok(r),
            _ => Err(key_conflict(key.as_ref())),
        }
    }

    async fn apply_income(&self, user: &UserId, amount: Amount, details: &EntryDetails) -> LedgerResult<IncomeReceipt> {
        if amount.is_zero() {
            return Err(reject(LedgerError::ZeroAmount));
        }

        let mut locked = self.lock_accounts(&self.account_ids(user)).await?;

        let (shares, total) = {
            let mut active: Vec<&EnvelopeAccount> = locked.iter().filter(|a| a.active).collect();
            if active.is_empty() {
                return Err(reject(LedgerError::NoActiveAccounts(user.clone())));
            }
            active.sort_by_key(|a| (a.account_type, a.created_at, a.id));

            let percentages: Vec<Decimal> = active.iter().map(|a| a.percentage).collect();
            let total = validate_percentages(&percentages, self.config.percentage_tolerance).map_err(reject)?;
            let shares: Vec<(AccountId, Decimal)> = active.iter().map(|a| (a.id, a.percentage)).collect();
            (shares, total)
        };
        let lines = split(amount, &shares, total)?;

        let mut txn = details.stamp(Transaction::new(
            user.clone(),
            TransactionType::Income,
            TransactionOrigin::External,
            amount,
        ));
        txn.allocations = lines.clone();

        let mut assessments = Vec::with_capacity(lines.len());
        for line in &lines {
            match self.apply_share(&mut locked, line.account_id, line.amount) {
                Ok(applied) => assessments.push(applied),
                Err(e) => {
                    locked.rollback();
                    tracing::error!(user_id = %user, error = %e, "Allocation aborted, shares rolled back");
                    return Err(e);
                }
            }
        }

        self.commit(&mut locked, vec![txn.clone()]).await?;
        drop(locked);

        tracing::info!(
            user_id = %user,
            transaction_id = %txn.id,
            amount = %amount,
            lines = lines.len(),
            "Income allocated"
        );

        self.record_gaps(txn.id, assessments).await;
        Ok(IncomeReceipt { transaction: txn })
    }

    fn apply_share(
        &self,
        locked: &mut LockedAccounts,
        account_id: AccountId,
        share: Amount,
    ) -> LedgerResult<(AccountId, Amount, StatusAssessment)> {
        let account = locked.get_mut(&account_id)?;
        credit(account, share)?;
        account.allocation_cycles = account.allocation_cycles.saturating_add(1);
        let assessment = self.refresh_status(account);
        Ok((account.id, account.balance, assessment))
    }

    /// Best-effort debt/surplus telemetry for a committed allocation
    async fn record_gaps(&self, transaction_id: TransactionId, assessments: Vec<(AccountId, Amount, StatusAssessment)>) {
        let recorded_at = Utc::now();
        for (account_id, balance, assessment) in assessments {
            let result = match assessment.gap {
                Some(Gap::Shortfall(shortfall)) => {
                    self.logs
                        .append_debt(DebtLog {
                            account_id,
                            transaction_id,
                            shortfall,
                            balance,
                            expected: assessment.expected,
                            recorded_at,
                        })
                        .await
                }
                Some(Gap::Surplus(surplus)) => {
                    self.logs
                        .append_surplus(SurplusLog {
                            account_id,
                            transaction_id,
                            surplus,
                            balance,
                            expected: assessment.expected,
                            recorded_at,
                        })
                        .await
                }
                None => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!(account_id = %account_id, error = %e, "Failed to append envelope log");
            }
        }
    }

    // === Expense ===

    /// Debit one envelope for an external expense
    pub async fn record_expense(
        &self,
        account_id: AccountId,
        amount: Amount,
        details: EntryDetails,
    ) -> LedgerResult<ExpenseReceipt> {
        let key = details.idempotency_key.clone();
        let fingerprint = request_fingerprint("expense", &[account_id.to_string(), amount.to_string()]);
        let owner = self.owner_of(&account_id).await?;
        let receipt = self
            .idempotent(&owner, key.as_ref(), fingerprint, || async {
                self.apply_expense(account_id, amount, &details).await.map(Receipt::Expense)
            })
            .await?;
        match receipt {
            Receipt::Expense(r) => Ok(r),
            _ => Err(key_conflict(key.as_ref())),
        }
    }

    async fn apply_expense(&self, account_id: AccountId, amount: Amount, details: &EntryDetails) -> LedgerResult<ExpenseReceipt> {
        if amount.is_zero() {
            return Err(reject(LedgerError::ZeroAmount));
        }

        let mut locked = self.lock_accounts(&[account_id]).await?;
        let account = locked.get_mut(&account_id)?;
        debit(account, amount).map_err(reject)?;
        self.refresh_status(account);
        let owner = account.owner.clone();

        let txn = details.stamp(
            Transaction::new(owner.clone(), TransactionType::Expense, TransactionOrigin::External, amount)
                .on_account(account_id),
        );
        self.commit(&mut locked, vec![txn.clone()]).await?;

        tracing::info!(user_id = %owner, account_id = %account_id, amount = %amount, "Expense recorded");
        Ok(ExpenseReceipt { transaction: txn })
    }

    // === Transfers ===

    /// Peer transfer between envelopes of two different users
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        details: EntryDetails,
    ) -> LedgerResult<TransferReceipt> {
        self.transfer_as(TransactionOrigin::PeerTransfer, from, to, amount, details)
            .await
    }

    /// Peer transfer recorded with an explicit origin (e.g. loan repayment)
    pub async fn transfer_as(
        &self,
        origin: TransactionOrigin,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        details: EntryDetails,
    ) -> LedgerResult<TransferReceipt> {
        let key = details.idempotency_key.clone();
        let fingerprint = request_fingerprint(
            "transfer",
            &[origin.to_string(), from.to_string(), to.to_string(), amount.to_string()],
        );
        let sender = self.owner_of(&from).await?;
        let receipt = self
            .idempotent(&sender, key.as_ref(), fingerprint, || async {
                self.apply_transfer(origin, from, to, amount, &details)
                    .await
                    .map(Receipt::Transfer)
            })
            .await?;
        match receipt {
            Receipt::Transfer(r) => Ok(r),
            _ => Err(key_conflict(key.as_ref())),
        }
    }

    async fn apply_transfer(
        &self,
        origin: TransactionOrigin,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        details: &EntryDetails,
    ) -> LedgerResult<TransferReceipt> {
        if amount.is_zero() {
            return Err(reject(LedgerError::ZeroAmount));
        }
        if from == to {
            return Err(reject(LedgerError::SameAccount(from)));
        }

        let mut locked = self.lock_accounts(&[from, to]).await?;

        let sender = locked.get(&from)?.owner.clone();
        let recipient = locked.get(&to)?.owner.clone();
        if sender == recipient {
            return Err(reject(LedgerError::SameOwner(sender)));
        }

        // Balance is checked here, under the lock, and nowhere earlier.
        let source = locked.get_mut(&from)?;
        debit(source, amount).map_err(reject)?;
        self.refresh_status(source);

        let target = locked.get_mut(&to)?;
        if let Err(e) = credit(target, amount) {
            locked.rollback();
            return Err(reject(e));
        }
        self.refresh_status(target);

        let mut sender_txn = details.stamp(
            Transaction::new(sender.clone(), TransactionType::Expense, origin, amount).on_account(from),
        );
        let mut recipient_txn = details.stamp(
            Transaction::new(recipient.clone(), TransactionType::Income, origin, amount).on_account(to),
        );
        link(&mut sender_txn, &mut recipient_txn);

        self.commit(&mut locked, vec![sender_txn.clone(), recipient_txn.clone()])
            .await?;

        tracing::info!(
            from_user = %sender,
            to_user = %recipient,
            amount = %amount,
            origin = %origin,
            "Transfer committed"
        );
        Ok(TransferReceipt {
            sender: sender_txn,
            recipient: recipient_txn,
        })
    }

    /// Move funds between two envelopes of the same user
    pub async fn rebalance(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        details: EntryDetails,
    ) -> LedgerResult<TransferReceipt> {
        if amount.is_zero() {
            return Err(reject(LedgerError::ZeroAmount));
        }
        if from == to {
            return Err(reject(LedgerError::SameAccount(from)));
        }

        let mut locked = self.lock_accounts(&[from, to]).await?;
        let owner = locked.get(&from)?.owner.clone();
        let other = locked.get(&to)?.owner.clone();
        if owner != other {
            return Err(reject(LedgerError::OwnerMismatch(owner, other)));
        }

        let source = locked.get_mut(&from)?;
        debit(source, amount).map_err(reject)?;
        self.refresh_status(source);

        let target = locked.get_mut(&to)?;
        if let Err(e) = credit(target, amount) {
            locked.rollback();
            return Err(reject(e));
        }
        self.refresh_status(target);

        let mut out_txn = details.stamp(
            Transaction::new(owner.clone(), TransactionType::Transfer, TransactionOrigin::Rebalance, amount)
                .on_account(from),
        );
        let mut in_txn = details.stamp(
            Transaction::new(owner.clone(), TransactionType::Transfer, TransactionOrigin::Rebalance, amount)
                .on_account(to),
        );
        link(&mut out_txn, &mut in_txn);

        self.commit(&mut locked, vec![out_txn.clone(), in_txn.clone()]).await?;
        tracing::info!(user_id = %owner, amount = %amount, "Envelopes rebalanced");
        Ok(TransferReceipt {
            sender: out_txn,
            recipient: in_txn,
        })
    }

    /// Draw `principal` from envelopes of `lender` into a borrower's envelope,
    /// as one unit of work.
    ///
    /// `plan` chooses the sources. It runs while every envelope of the lender
    /// is locked, receives them in canonical order and must draw exactly
    /// `principal`; otherwise nothing moves and `InsufficientCapacity` is
    /// returned.
    pub async fn disburse<P>(
        &self,
        lender: &UserId,
        to: AccountId,
        principal: Amount,
        plan: P,
        details: EntryDetails,
    ) -> LedgerResult<DisbursementReceipt>
    where
        P: FnOnce(&[EnvelopeAccount], Amount) -> Vec<DrawLine> + Send,
    {
        let key = details.idempotency_key.clone();
        let fingerprint = request_fingerprint(
            "disburse",
            &[lender.to_string(), to.to_string(), principal.to_string()],
        );

        let receipt = self
            .idempotent(lender, key.as_ref(), fingerprint, || async {
                self.apply_disbursement(lender, to, principal, plan, &details)
                    .await
                    .map(Receipt::Disbursement)
            })
            .await?;
        match receipt {
            Receipt::Disbursement(r) => Ok(r),
            _ => Err(key_conflict(key.as_ref())),
        }
    }

    async fn apply_disbursement<P>(
        &self,
        lender: &UserId,
        to: AccountId,
        principal: Amount,
        plan: P,
        details: &EntryDetails,
    ) -> LedgerResult<DisbursementReceipt>
    where
        P: FnOnce(&[EnvelopeAccount], Amount) -> Vec<DrawLine>,
    {
        if principal.is_zero() {
            return Err(reject(LedgerError::ZeroAmount));
        }

        let mut ids = self.account_ids(lender);
        ids.push(to);
        let mut locked = self.lock_accounts(&ids).await?;

        let borrower = locked.get(&to)?.owner.clone();
        if borrower == *lender {
            return Err(reject(LedgerError::SameOwner(borrower)));
        }

        let mut sources: Vec<EnvelopeAccount> = locked.iter().filter(|a| a.owner == *lender).cloned().collect();
        sources.sort_by_key(|a| (a.account_type, a.created_at, a.id));
        let draws: Vec<DrawLine> = plan(&sources, principal)
            .into_iter()
            .filter(|d| !d.amount.is_zero())
            .collect();

        let drawn = Amount::checked_sum(draws.iter().map(|d| &d.amount))?;
        if drawn != principal {
            return Err(reject(LedgerError::InsufficientCapacity {
                available: drawn.minor_units(),
                requested: principal.minor_units(),
            }));
        }
        for draw in &draws {
            let owner = &locked.get(&draw.account_id)?.owner;
            if owner != lender {
                return Err(reject(LedgerError::OwnerMismatch(lender.clone(), owner.clone())));
            }
        }

        for draw in &draws {
            let result = locked.get_mut(&draw.account_id).and_then(|source| {
                debit(source, draw.amount)?;
                self.refresh_status(source);
                Ok(())
            });
            if let Err(e) = result {
                locked.rollback();
                return Err(reject(e));
            }
        }
        let result = locked.get_mut(&to).and_then(|target| {
            credit(target, principal)?;
            self.refresh_status(target);
            Ok(())
        });
        if let Err(e) = result {
            locked.rollback();
            return Err(reject(e));
        }

        let mut borrower_txn = details.stamp(
            Transaction::new(
                borrower.clone(),
                TransactionType::Income,
                TransactionOrigin::LoanDisbursement,
                principal,
            )
            .on_account(to),
        );
        let lender_txns: Vec<Transaction> = draws
            .iter()
            .map(|draw| {
                let mut txn = details.stamp(
                    Transaction::new(
                        lender.clone(),
                        TransactionType::Expense,
                        TransactionOrigin::LoanDisbursement,
                        draw.amount,
                    )
                    .on_account(draw.account_id),
                );
                txn.counterpart = Some(borrower_txn.id);
                txn
            })
            .collect();
        borrower_txn.counterpart = lender_txns.first().map(|t| t.id);

        let mut batch = lender_txns.clone();
        batch.push(borrower_txn.clone());
        self.commit(&mut locked, batch).await?;

        tracing::info!(
            lender = %lender,
            borrower = %borrower,
            amount = %principal,
            sources = draws.len(),
            "Loan disbursed"
        );
        Ok(DisbursementReceipt {
            lender: lender_txns,
            borrower: borrower_txn,
        })
    }

    // === Queries ===

    pub async fn account(&self, id: &AccountId) -> LedgerResult<EnvelopeAccount> {
        let cell = self
            .accounts
            .get(id)
            .map(|cell| cell.value().clone())
            .ok_or(LedgerError::AccountNotFound(*id))?;
        let account = cell.lock().await;
        Ok(account.clone())
    }

    /// All envelopes of `user`, in canonical order
    pub async fn accounts_for(&self, user: &UserId) -> LedgerResult<Vec<EnvelopeAccount>> {
        let mut accounts = Vec::new();
        for id in self.account_ids(user) {
            accounts.push(self.account(&id).await?);
        }
        accounts.sort_by_key(|a| (a.account_type, a.created_at, a.id));
        Ok(accounts)
    }

    /// First active envelope of the given type
    pub async fn find_account(
        &self,
        user: &UserId,
        account_type: AccountType,
    ) -> LedgerResult<Option<EnvelopeAccount>> {
        Ok(self
            .accounts_for(user)
            .await?
            .into_iter()
            .find(|a| a.active && a.account_type == account_type))
    }

    pub async fn envelope_snapshot(&self, user: &UserId) -> LedgerResult<EnvelopeSnapshot> {
        let accounts = self.accounts_for(user).await?;
        let total_balance = Amount::checked_sum(accounts.iter().map(|a| &a.balance))?;
        Ok(EnvelopeSnapshot {
            user_id: user.clone(),
            accounts: accounts.iter().map(AccountView::from).collect(),
            total_balance,
        })
    }

    /// Check that the user's balances equal the net of their transactions.
    ///
    /// Holds every account lock of the user while reading, so no commit can
    /// land between the two sums.
    pub async fn audit_user(&self, user: &UserId) -> LedgerResult<AuditReport> {
        let locked = self.lock_accounts(&self.account_ids(user)).await?;
        let balance_total: i64 = locked.iter().map(|a| a.balance.minor_units()).sum();
        let transaction_total: i64 = self
            .transactions
            .list_for_user(user, None)
            .await?
            .iter()
            .map(Transaction::net_effect)
            .sum();
        drop(locked);

        let consistent = balance_total == transaction_total;
        if consistent {
            tracing::debug!(user_id = %user, balance_total, "Conservation audit passed");
        } else {
            tracing::error!(
                user_id = %user,
                balance_total,
                transaction_total,
                "Conservation audit failed"
            );
        }
        Ok(AuditReport {
            user_id: user.clone(),
            balance_total,
            transaction_total,
            consistent,
        })
    }
}
