use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde::Serialize;
use strand_events::{AccountCreated, AccountUpdated, EventType, MessageCreated, StoredEvent};
use strand_types::{Account, AccountId, AccountStats, PlatformBinding, ThreadId};

use super::{account_of, encode, inapplicable};
use crate::error::ProjectionResult;
use crate::projection::Projection;

#[derive(Debug, Default, Serialize)]
struct State {
    accounts: BTreeMap<AccountId, Account>,
    bindings: BTreeMap<PlatformBinding, AccountId>,
    /// Kept for every author, including accounts never created explicitly.
    stats: BTreeMap<AccountId, AccountStats>,
    threads: BTreeMap<AccountId, BTreeSet<ThreadId>>,
}

/// Accounts, their platform bindings and activity statistics.
#[derive(Debug, Default)]
pub struct AccountIndex {
    state: RwLock<State>,
}

impl AccountIndex {
    pub const NAME: &'static str = "account-index";

    pub fn new() -> Self {
        Self::default()
    }

    /// The account with its derived statistics filled in.
    pub fn account(&self, id: &AccountId) -> Option<Account> {
        let state = self.state.read().expect("lock poisoned");
        let mut account = state.accounts.get(id).cloned()?;
        account.stats = state.stats.get(id).cloned().unwrap_or_default();
        Some(account)
    }

    pub fn accounts(&self) -> Vec<Account> {
        let state = self.state.read().expect("lock poisoned");
        state
            .accounts
            .values()
            .map(|a| {
                let mut a = a.clone();
                a.stats = state.stats.get(&a.id).cloned().unwrap_or_default();
                a
            })
            .collect()
    }

    /// Which account has claimed a platform handle.
    pub fn find_by_binding(&self, binding: &PlatformBinding) -> Option<AccountId> {
        self.state
            .read()
            .expect("lock poisoned")
            .bindings
            .get(binding)
            .copied()
    }

    pub fn stats(&self, id: &AccountId) -> Option<AccountStats> {
        self.state.read().expect("lock poisoned").stats.get(id).cloned()
    }
}

impl Projection for AccountIndex {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, stored: &StoredEvent) -> ProjectionResult<()> {
        let event = &stored.event;
        let mut state = self.state.write().expect("lock poisoned");
        match event.event_type {
            EventType::AccountCreated => {
                let AccountCreated { account } = event.payload_as()?;
                for binding in &account.bindings {
                    state.bindings.entry(binding.clone()).or_insert(account.id);
                }
                state.accounts.entry(account.id).or_insert(account);
            }
            EventType::AccountUpdated => {
                let id = account_of(event)?;
                let update: AccountUpdated = event.payload_as()?;
                let account = state
                    .accounts
                    .get_mut(&id)
                    .ok_or_else(|| inapplicable(event, "unknown account"))?;
                if let Some(name) = update.display_name {
                    account.display_name = name;
                }
                if update.did.is_some() {
                    account.did = update.did;
                }
                account.bindings.extend(update.add_bindings.iter().cloned());
                for binding in update.add_bindings {
                    state.bindings.entry(binding).or_insert(id);
                }
            }
            EventType::MessageCreated => {
                let MessageCreated { message } = event.payload_as()?;
                let author = message.author.account_id;
                let threads = state.threads.entry(author).or_default();
                threads.insert(message.refs.thread_id);
                let thread_count = threads.len() as u64;

                let stats = state.stats.entry(author).or_default();
                stats.message_count += 1;
                stats.thread_count = thread_count;
                stats.first_seen = Some(
                    stats
                        .first_seen
                        .map_or(message.created_at, |t| t.min(message.created_at)),
                );
                stats.last_seen = stats.last_seen.max(Some(message.created_at));
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&self) {
        *self.state.write().expect("lock poisoned") = State::default();
    }

    fn state_bytes(&self) -> ProjectionResult<Vec<u8>> {
        encode(&*self.state.read().expect("lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::fixtures::{self, at};

    fn loaded() -> AccountIndex {
        let s = fixtures::scenario();
        let index = AccountIndex::new();
        for stored in fixtures::all(&s.store) {
            index.apply(&stored).unwrap();
        }
        index
    }

    #[test]
    fn tracks_accounts_and_stats() {
        let index = loaded();
        let ana = index.account(&fixtures::account_id("ana")).unwrap();
        assert_eq!(ana.stats.message_count, 2);
        assert_eq!(ana.stats.thread_count, 2);
        assert_eq!(ana.stats.first_seen, Some(at(1)));
        assert_eq!(ana.stats.last_seen, Some(at(5)));
        assert_eq!(index.accounts().len(), 2);
    }

    #[test]
    fn updates_extend_bindings() {
        let index = loaded();
        let bo = fixtures::account_id("bo");
        assert_eq!(index.account(&bo).unwrap().display_name, "Bo B.");
        assert_eq!(
            index.find_by_binding(&PlatformBinding::new("email", "bo@example.com")),
            Some(bo)
        );
        assert_eq!(index.find_by_binding(&fixtures::binding("bo")), Some(bo));
        assert_eq!(index.find_by_binding(&fixtures::binding("nobody")), None);
    }
}
