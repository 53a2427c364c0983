use biweekly_ledger::{
    domain::{AccountKind, Money},
    ledger::{AccountKey, HistoryBook},
};
use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Edit {
    Insert { offset: i64, cents: i64 },
    Update { pick: usize, offset: Option<i64>, cents: i64 },
    Delete { pick: usize },
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        2 => (-5i64..55, -10_000i64..10_000)
            .prop_map(|(offset, cents)| Edit::Insert { offset, cents }),
        1 => (any::<usize>(), proptest::option::of(-5i64..55), -10_000i64..10_000)
            .prop_map(|(pick, offset, cents)| Edit::Update { pick, offset, cents }),
        1 => any::<usize>().prop_map(|pick| Edit::Delete { pick }),
    ]
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

/// Balance recomputed from scratch: every entry dated on or before `date`.
fn naive_balance(book: &HistoryBook, account_id: Uuid, date: NaiveDate) -> Money {
    book.history(account_id)
        .unwrap()
        .entries()
        .iter()
        .filter(|entry| entry.date <= date)
        .map(|entry| entry.amount)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn edits_keep_running_balances_consistent(
        edits in prop::collection::vec(edit(), 1..120),
        probes in prop::collection::vec(-10i64..60, 1..8),
    ) {
        let mut book = HistoryBook::new();
        let key = AccountKey::new(Uuid::new_v4(), AccountKind::Accumulator);
        book.open_account(key, Money::from_cents(10_000), base_date(), None)
            .unwrap();
        let mut live: Vec<Uuid> = Vec::new();

        for (step, edit) in edits.into_iter().enumerate() {
            match edit {
                Edit::Insert { offset, cents } => {
                    let date = base_date() + Duration::days(offset);
                    let id = book
                        .post_entry(key, Money::from_cents(cents), date, Some(Uuid::new_v4()))
                        .unwrap();
                    live.push(id);
                }
                Edit::Update { pick, offset, cents } if !live.is_empty() => {
                    let id = live[pick % live.len()];
                    let date = offset.map(|offset| base_date() + Duration::days(offset));
                    book.update_entry(id, Some(Money::from_cents(cents)), date)
                        .unwrap();
                }
                Edit::Delete { pick } if !live.is_empty() => {
                    let id = live.swap_remove(pick % live.len());
                    book.delete_entry(id).unwrap();
                }
                _ => {}
            }

            let verified = book.verify(key.account_id);
            prop_assert!(verified.is_ok(), "step {}: {:?}", step, verified);
            for offset in &probes {
                let probe = base_date() + Duration::days(*offset);
                prop_assert_eq!(
                    book.balance_as_of(key.account_id, probe).unwrap_or(Money::ZERO),
                    naive_balance(&book, key.account_id, probe),
                    "step {}, probe {}",
                    step,
                    probe
                );
            }
        }

        let history = book.history(key.account_id).unwrap();
        let opening = history.opening().unwrap();
        prop_assert_eq!(history.entries()[0].id, opening.id);
        prop_assert_eq!(history.entries().len(), live.len() + 1);
    }
}

#[test]
fn backdated_entry_relocates_opening_entry() {
    let mut book = HistoryBook::new();
    let key = AccountKey::new(Uuid::new_v4(), AccountKind::Reserve);
    book.open_account(key, Money::from_cents(5_000), base_date(), None)
        .unwrap();
    book.post_entry(key, Money::from_cents(700), base_date() + Duration::days(3), Some(Uuid::new_v4()))
        .unwrap();

    let backdated = base_date() - Duration::days(10);
    book.post_entry(key, Money::from_cents(-200), backdated, Some(Uuid::new_v4()))
        .unwrap();

    let history = book.history(key.account_id).unwrap();
    let opening = history.opening().unwrap();
    assert_eq!(opening.date, backdated - Duration::days(1));
    assert_eq!(history.entries()[0].id, opening.id);
    let balances: Vec<i64> = history
        .entries()
        .iter()
        .map(|entry| entry.balance.cents())
        .collect();
    assert_eq!(balances, vec![5_000, 4_800, 5_500]);
}
