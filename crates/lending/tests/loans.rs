//! Loan approval against live envelope balances

use std::sync::Arc;

use rust_decimal_macros::dec;
use stash_core::{AccountId, AccountType, Amount, EnvelopeAccount, TransactionOrigin, UserId};
use stash_ledger::{
    EntryDetails, EnvelopeLedger, InMemoryEnvelopeLogRepository, InMemoryTransactionRepository, LedgerConfig,
};
use stash_lending::{LendingConfig, LendingError, LoanDesk};

fn amt(v: i64) -> Amount {
    Amount::new(v).unwrap()
}

struct Fixture {
    ledger: Arc<EnvelopeLedger>,
    desk: LoanDesk,
    lender: Vec<AccountId>,
    borrower: Vec<AccountId>,
}

async fn open(ledger: &EnvelopeLedger, user: &str) -> Vec<AccountId> {
    let owner = UserId::new(user);
    let layout = [
        (AccountType::Daily, dec!(50)),
        (AccountType::Emergency, dec!(10)),
        (AccountType::Investment, dec!(20)),
        (AccountType::LongTerm, dec!(10)),
        (AccountType::Fun, dec!(10)),
    ];
    let mut ids = Vec::new();
    for (account_type, pct) in layout {
        let account = EnvelopeAccount::new(owner.clone(), account_type, pct, Amount::ZERO);
        ids.push(ledger.open_account(account).await.unwrap());
    }
    ids
}

/// Lender: daily 3_000, fun 1_000, payout-only fun 2_000, the rest not lendable
async fn fixture() -> Fixture {
    let ledger = Arc::new(EnvelopeLedger::new(
        Arc::new(InMemoryTransactionRepository::new()),
        Arc::new(InMemoryEnvelopeLogRepository::new()),
        LedgerConfig::default(),
    ));
    let mut lender = open(&ledger, "lender").await;
    let borrower = open(&ledger, "borrower").await;

    let payout_only = EnvelopeAccount::new(UserId::new("lender"), AccountType::Fun, dec!(0), Amount::ZERO)
        .with_external_payout_only(true);
    lender.push(ledger.open_account(payout_only).await.unwrap());

    ledger.allocate(&UserId::new("lender"), amt(10_000)).await.unwrap();
    ledger
        .rebalance(lender[0], lender[5], amt(2_000), EntryDetails::new())
        .await
        .unwrap();

    let desk = LoanDesk::new(ledger.clone(), LendingConfig::default());
    Fixture {
        ledger,
        desk,
        lender,
        borrower,
    }
}

async fn balance(ledger: &EnvelopeLedger, id: &AccountId) -> i64 {
    ledger.account(id).await.unwrap().balance.minor_units()
}

#[tokio::test]
async fn preview_uses_only_lendable_envelopes() {
    let f = fixture().await;
    let lender = UserId::new("lender");

    let preview = f.desk.evaluate_capacity(&lender, amt(3_500)).await.unwrap();
    assert!(preview.can_approve);
    let sources: Vec<_> = preview.draw_plan.iter().map(|d| (d.account_id, d.amount)).collect();
    assert_eq!(sources, vec![(f.lender[4], amt(1_000)), (f.lender[0], amt(2_500))]);

    let preview = f.desk.evaluate_capacity(&lender, amt(5_000)).await.unwrap();
    assert!(!preview.can_approve);
    assert_eq!(preview.allowed_amount, amt(4_000));
    assert_eq!(preview.shortfall, amt(1_000));
}

#[tokio::test]
async fn approve_moves_funds_atomically() {
    let f = fixture().await;
    let to = f.desk.receiving_account(&UserId::new("borrower")).await.unwrap();
    assert_eq!(to, f.borrower[0]);

    let receipt = f
        .desk
        .approve(&UserId::new("lender"), to, amt(3_500), EntryDetails::new())
        .await
        .unwrap();

    assert_eq!(receipt.lender.len(), 2);
    assert_eq!(receipt.borrower.origin, TransactionOrigin::LoanDisbursement);
    assert_eq!(balance(&f.ledger, &f.lender[4]).await, 0);
    assert_eq!(balance(&f.ledger, &f.lender[0]).await, 500);
    assert_eq!(balance(&f.ledger, &f.lender[5]).await, 2_000);
    assert_eq!(balance(&f.ledger, &f.borrower[0]).await, 3_500);

    for user in ["lender", "borrower"] {
        assert!(f.ledger.audit_user(&UserId::new(user)).await.unwrap().consistent);
    }
}

#[tokio::test]
async fn approval_rechecks_balances_after_preview() {
    let f = fixture().await;
    let lender = UserId::new("lender");

    let preview = f.desk.evaluate_capacity(&lender, amt(3_500)).await.unwrap();
    assert!(preview.can_approve);

    // lender spends before the approval lands
    f.ledger
        .record_expense(f.lender[0], amt(1_000), EntryDetails::new())
        .await
        .unwrap();

    let result = f
        .desk
        .approve(&lender, f.borrower[0], amt(3_500), EntryDetails::new())
        .await;
    assert_eq!(
        result,
        Err(LendingError::InsufficientCapacity {
            principal: 3_500,
            available: 3_000,
            shortfall: 500
        })
    );
    assert_eq!(balance(&f.ledger, &f.lender[4]).await, 1_000);
    assert_eq!(balance(&f.ledger, &f.borrower[0]).await, 0);
}

#[tokio::test]
async fn replayed_approval_returns_first_receipt() {
    let f = fixture().await;
    let lender = UserId::new("lender");
    let details = EntryDetails::new().with_key("loan-7");

    let first = f
        .desk
        .approve(&lender, f.borrower[0], amt(3_500), details.clone())
        .await
        .unwrap();
    // only 500 lendable is left, the replay must not re-plan
    let second = f
        .desk
        .approve(&lender, f.borrower[0], amt(3_500), details)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(balance(&f.ledger, &f.borrower[0]).await, 3_500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_never_overcommit() {
    let f = fixture().await;
    let desk = Arc::new(f.desk);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let desk = desk.clone();
        let to = f.borrower[0];
        handles.push(tokio::spawn(async move {
            desk.approve(&UserId::new("lender"), to, amt(3_000), EntryDetails::new())
                .await
        }));
    }

    let mut approved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(LendingError::InsufficientCapacity { .. }) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    assert_eq!(approved, 1);
    assert_eq!(balance(&f.ledger, &f.borrower[0]).await, 3_000);
}

#[tokio::test]
async fn repayment_flows_back_to_lender() {
    let f = fixture().await;
    f.desk
        .approve(&UserId::new("lender"), f.borrower[0], amt(3_500), EntryDetails::new())
        .await
        .unwrap();

    let receipt = f
        .desk
        .repay(f.borrower[0], f.lender[0], amt(1_000), EntryDetails::new().with_key("repay-1"))
        .await
        .unwrap();

    assert_eq!(receipt.sender.origin, TransactionOrigin::LoanRepayment);
    assert_eq!(balance(&f.ledger, &f.borrower[0]).await, 2_500);
    assert_eq!(balance(&f.ledger, &f.lender[0]).await, 1_500);
}

#[tokio::test]
async fn borrower_without_daily_envelope() {
    let f = fixture().await;
    let result = f.desk.receiving_account(&UserId::new("stranger")).await;
    assert!(matches!(result, Err(LendingError::NoAccount(_, _))));
}
