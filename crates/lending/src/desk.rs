//! Loan desk
//!
//! `evaluate_capacity` is the preview a loan-approval workflow shows the
//! lender. `approve` reserves and moves the funds in one ledger unit of
//! work, re-planning the draw against the balances it holds locked.

use stash_core::{AccountId, AccountType, Amount, EnvelopeAccount, TransactionOrigin, UserId};
use stash_ledger::{DisbursementReceipt, EntryDetails, EnvelopeLedger, TransferReceipt};
use std::sync::Arc;

use crate::capacity::{plan_draws, CapacityPreview};
use crate::config::LendingConfig;
use crate::error::{LendingError, LendingResult};

pub struct LoanDesk {
    ledger: Arc<EnvelopeLedger>,
    config: LendingConfig,
}

impl LoanDesk {
    pub fn new(ledger: Arc<EnvelopeLedger>, config: LendingConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    pub async fn evaluate_capacity(&self, lender: &UserId, principal: Amount) -> LendingResult<CapacityPreview> {
        let accounts = self.ledger.accounts_for(lender).await?;
        let preview = plan_draws(&accounts, principal, &self.config);
        tracing::debug!(
            lender = %lender,
            principal = %principal,
            allowed = %preview.allowed_amount,
            can_approve = preview.can_approve,
            "Lending capacity evaluated"
        );
        Ok(preview)
    }

    /// The borrower's envelope that receives loans: their first active
    /// daily envelope
    pub async fn receiving_account(&self, borrower: &UserId) -> LendingResult<AccountId> {
        self.ledger
            .find_account(borrower, AccountType::Daily)
            .await?
            .map(|a| a.id)
            .ok_or_else(|| LendingError::NoAccount(borrower.clone(), AccountType::Daily.to_string()))
    }

    /// Disburse `principal` from `lender` into `borrower_account`
    pub async fn approve(
        &self,
        lender: &UserId,
        borrower_account: AccountId,
        principal: Amount,
        details: EntryDetails,
    ) -> LendingResult<DisbursementReceipt> {
        let config = self.config.clone();
        let plan = move |accounts: &[EnvelopeAccount], principal: Amount| plan_draws(accounts, principal, &config).draw_plan;

        match self
            .ledger
            .disburse(lender, borrower_account, principal, plan, details)
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    lender = %lender,
                    borrower = %receipt.borrower.user_id,
                    principal = %principal,
                    "Loan approved"
                );
                Ok(receipt)
            }
            Err(e) => {
                let err = LendingError::from(e);
                tracing::warn!(lender = %lender, principal = %principal, error = %err, "Loan not approved");
                Err(err)
            }
        }
    }

    /// Move a repayment from the borrower's envelope back to the lender's
    pub async fn repay(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        details: EntryDetails,
    ) -> LendingResult<TransferReceipt> {
        let receipt = self
            .ledger
            .transfer_as(TransactionOrigin::LoanRepayment, from, to, amount, details)
            .await?;
        tracing::info!(
            borrower = %receipt.sender.user_id,
            lender = %receipt.recipient.user_id,
            amount = %amount,
            "Loan repayment recorded"
        );
        Ok(receipt)
    }
}
