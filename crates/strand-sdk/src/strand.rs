use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use strand_crypto::{hasher, SignedEnvelope, SigningKey};
use strand_dag::{IntegrityReport, NodeInput, ThreadGraph, ThreadProof};
use strand_events::{
    AccountAggregate, AggregateKind, AggregateRef, AggregateRepository, Event, EventMetadata,
    EventStore, EventType, Loaded, MessageAggregate, MessageCreated, MessageDeleted,
    MessageUpdated, Snapshot, SnapshotStore, StoredEvent, ThreadAggregate,
};
use strand_projection::{
    AccountIndex, CancellationToken, MessageView, ProjectionEngine, RebuildOutcome, ThreadIndex,
    Timeline,
};
use strand_search::{
    BackgroundIndexer, DocMetadata, HashingEmbedder, SearchError, SearchIndex, SearchMode,
    SearchOptions,
};
use strand_store::{mirror_path, ContentStore, FsContentStore, InMemoryContentStore, MirrorDocument};
use strand_types::{
    time, Account, AccountId, AccountInput, Author, Message, MessageId, MessageIdentity,
    MessageInput, MessageKind, Pagination, PlatformBinding, References, Thread, ThreadId,
};
use tracing::{debug, info, warn};

use crate::config::StrandConfig;
use crate::error::{SdkError, SdkResult};

/// Event metadata `source` for writes made through the facade.
const SOURCE: &str = "strand-sdk";

/// A search hit resolved to its message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageHit {
    pub message: Message,
    pub score: f32,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<MessageHit>,
    pub mode: SearchMode,
    pub degraded: bool,
    pub warnings: Vec<String>,
}

impl SearchResults {
    pub fn ids(&self) -> Vec<MessageId> {
        self.hits.iter().map(|h| h.message.id).collect()
    }
}

/// Counts for status output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub events: usize,
    pub messages: usize,
    pub threads: usize,
    pub accounts: usize,
    pub indexed: usize,
    pub graph_nodes: usize,
    pub snapshots: usize,
}

/// The Strand store.
pub struct Strand {
    config: StrandConfig,
    /// `None` for in-memory stores.
    data_dir: Option<PathBuf>,
    events: EventStore,
    snapshots: SnapshotStore,
    content: Box<dyn ContentStore>,
    graph: RwLock<ThreadGraph>,
    projections: ProjectionEngine,
    threads: Arc<ThreadIndex>,
    accounts: Arc<AccountIndex>,
    timeline: Arc<Timeline>,
    messages: Arc<MessageView>,
    search: Arc<SearchIndex>,
    indexer: BackgroundIndexer,
    /// Index jobs that never reached the indexer.
    search_misses: AtomicUsize,
    /// Serializes read-check-append sequences of facade writes.
    write: Mutex<()>,
}

impl Strand {
    /// Open (or create) an on-disk store and rebuild derived state from its
    /// event log.
    pub fn open(config: StrandConfig) -> SdkResult<Self> {
        let dir = config.data_dir.clone();
        std::fs::create_dir_all(&dir).map_err(strand_store::StoreError::from)?;
        let events = EventStore::open(config.events_dir(), config.events.clone())?;
        let snapshots = SnapshotStore::open(config.snapshots_dir())?;
        let content = Box::new(FsContentStore::open(&dir)?);
        let strand = Self::assemble(config, Some(dir), events, snapshots, content)?;
        strand.replay()?;
        Ok(strand)
    }

    /// A store that lives entirely in memory.
    pub fn in_memory() -> SdkResult<Self> {
        Self::in_memory_with(StrandConfig::default())
    }

    /// In-memory store with the given search, snapshot and ingest settings.
    /// `data_dir` is ignored and mirrors are never written.
    pub fn in_memory_with(config: StrandConfig) -> SdkResult<Self> {
        Self::assemble(
            config,
            None,
            EventStore::in_memory(),
            SnapshotStore::in_memory(),
            Box::new(InMemoryContentStore::new()),
        )
    }

    fn assemble(
        config: StrandConfig,
        data_dir: Option<PathBuf>,
        events: EventStore,
        snapshots: SnapshotStore,
        content: Box<dyn ContentStore>,
    ) -> SdkResult<Self> {
        let search = Arc::new(if config.search.semantic {
            SearchIndex::with_embedder(Arc::new(HashingEmbedder::new(
                config.search.embedding_dimensions,
            )))
        } else {
            SearchIndex::lexical_only()
        });
        let indexer = BackgroundIndexer::spawn(Arc::clone(&search), config.search.queue_capacity);

        let threads = Arc::new(ThreadIndex::new());
        let accounts = Arc::new(AccountIndex::new());
        let timeline = Arc::new(Timeline::new());
        let messages = Arc::new(MessageView::new());
        let projections = ProjectionEngine::new();
        projections.register(threads.clone())?;
        projections.register(accounts.clone())?;
        projections.register(timeline.clone())?;
        projections.register(messages.clone())?;

        Ok(Self {
            config,
            data_dir,
            events,
            snapshots,
            content,
            graph: RwLock::new(ThreadGraph::new()),
            projections,
            threads,
            accounts,
            timeline,
            messages,
            search,
            indexer,
            search_misses: AtomicUsize::new(0),
            write: Mutex::new(()),
        })
    }

    /// Feed the whole log into projections, the graph and the indexer.
    fn replay(&self) -> SdkResult<()> {
        let mut after = None;
        let mut replayed = 0usize;
        loop {
            let batch = self.events.all_after(after, 512)?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.position);
            replayed += batch.len();
            for stored in &batch {
                self.absorb(stored);
            }
        }
        info!(events = replayed, graph_nodes = self.graph.read().expect("lock poisoned").len(), "store opened");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Validate, identify and store a new message.
    ///
    /// Creating a message whose id already exists returns the stored message
    /// and appends nothing.
    pub fn create_message(&self, input: MessageInput) -> SdkResult<Message> {
        let kind: MessageKind = input.kind.parse()?;
        if input.content.trim().is_empty() {
            return Err(SdkError::InvalidInput("message content is empty".into()));
        }
        let now = time::now();
        let tolerance = Duration::seconds(self.config.ingest.future_tolerance_secs as i64);
        if input.created_at > now + tolerance {
            return Err(SdkError::InvalidInput(format!(
                "created_at {} is in the future",
                time::format(&input.created_at)
            )));
        }

        let thread_id = hasher::thread_id(&input.thread.platform, &input.thread.native_id)?;
        let identity = MessageIdentity {
            account_id: input.account_id,
            content: input.content,
            created_at: time::normalize(input.created_at),
            kind,
        };
        let identity_bytes = hasher::message_identity_bytes(&identity)?;
        let message = Message {
            id: hasher::message_id(&identity)?,
            kind,
            content: identity.content,
            author: Author {
                account_id: identity.account_id,
                did: input.did,
            },
            created_at: identity.created_at,
            ingested_at: now,
            refs: References {
                thread_id,
                reply_to: input.reply_to,
                room_id: input.room_id,
                mentions: input.mentions,
            },
            source: input.source,
            tags: input.tags,
        };

        let _guard = self.write.lock().expect("lock poisoned");
        if self.events.version_of(message.id.as_identifier()) > 0 {
            debug!(id = %message.id.short(), "message already stored");
            return self
                .stored_message(&message.id)?
                .current()
                .ok_or_else(|| SdkError::not_found("message", message.id));
        }

        let mut batch = Vec::with_capacity(2);
        let mut metadata = EventMetadata::command(message.source.platform.clone());
        if self.events.version_of(thread_id.as_identifier()) == 0 {
            let thread = Thread {
                id: thread_id,
                title: input.thread.title,
                participants: BTreeSet::from([message.author.account_id]),
                class: input.thread.class,
                platform: input.thread.platform,
                native_id: input.thread.native_id,
                message_count: 0,
                last_activity: None,
            };
            let created = Event::thread_created(&thread, metadata.clone(), now)?;
            metadata = metadata.caused_by(created.id);
            batch.push(created);
        }
        batch.push(Event::message_created(&message, metadata)?);

        // Content first: a logged message always has its bytes stored.
        self.content.put(message.id.as_identifier(), &identity_bytes)?;
        self.commit(&batch)?;

        if self.config.ingest.write_mirror {
            self.write_mirror(&message);
        }
        debug!(id = %message.id.short(), thread = %thread_id.short(), "message created");
        Ok(message)
    }

    /// Create a message and sign it as `key`'s identity.
    ///
    /// The input's DID defaults to the key's; a different DID is refused.
    pub fn create_signed_message(
        &self,
        mut input: MessageInput,
        key: &SigningKey,
    ) -> SdkResult<SignedEnvelope> {
        let signer = key.did();
        match &input.did {
            Some(did) if *did != signer => {
                return Err(SdkError::InvalidInput(format!(
                    "input DID {did} does not match signing key {signer}"
                )))
            }
            _ => input.did = Some(signer),
        }
        let message = self.create_message(input)?;
        Ok(SignedEnvelope::seal(message, key, time::now())?)
    }

    /// Check an envelope's identifier and signature, and that the signer is
    /// the message's declared author when one is declared.
    pub fn verify_envelope(&self, envelope: &SignedEnvelope) -> SdkResult<MessageId> {
        let message = envelope.open()?;
        if let Some(author) = &message.author.did {
            if *author != envelope.signer {
                return Err(SdkError::SignerMismatch {
                    signer: envelope.signer.to_string(),
                    author: author.to_string(),
                });
            }
        }
        Ok(message.id)
    }

    /// Replace a message's content. The message keeps its original id.
    pub fn edit_message(&self, id: &MessageId, content: impl Into<String>) -> SdkResult<Message> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(SdkError::InvalidInput("message content is empty".into()));
        }
        let _guard = self.write.lock().expect("lock poisoned");
        let stored = self.stored_message(id)?;
        let Some(mut message) = stored.current() else {
            return Err(SdkError::not_found("message", id));
        };
        if stored.is_deleted() {
            return Err(SdkError::InvalidInput(format!("message {id} is deleted")));
        }
        let update = MessageUpdated {
            content: Some(content.clone()),
            ..MessageUpdated::default()
        };
        let event = Event::message_updated(*id, &update, EventMetadata::command(SOURCE), time::now())?;
        self.commit(&[event])?;
        message.content = content;
        Ok(message)
    }

    /// Mark a message deleted. Deleting twice is a no-op.
    pub fn delete_message(&self, id: &MessageId, reason: Option<String>) -> SdkResult<()> {
        let _guard = self.write.lock().expect("lock poisoned");
        let stored = self.stored_message(id)?;
        if stored.message.is_none() {
            return Err(SdkError::not_found("message", id));
        }
        if stored.is_deleted() {
            return Ok(());
        }
        let event = Event::message_deleted(
            *id,
            &MessageDeleted { reason },
            EventMetadata::command(SOURCE),
            time::now(),
        )?;
        self.commit(&[event])
    }

    /// Register an account. Its id derives from the first binding.
    ///
    /// Re-creating an existing account returns it unchanged; claiming a
    /// binding that belongs to another account is refused.
    pub fn create_account(&self, input: AccountInput) -> SdkResult<Account> {
        let first = input
            .bindings
            .first()
            .ok_or_else(|| SdkError::InvalidInput("account needs at least one binding".into()))?;
        if input.display_name.trim().is_empty() {
            return Err(SdkError::InvalidInput("display name is empty".into()));
        }
        let id = hasher::account_id(first)?;

        let _guard = self.write.lock().expect("lock poisoned");
        if self.events.version_of(id.as_identifier()) > 0 {
            // The view carries live stats; the log answers while it rebuilds.
            if let Some(existing) = self.accounts.account(&id) {
                return Ok(existing);
            }
            return self
                .repository()
                .load::<AccountAggregate>(id.as_identifier())?
                .state
                .account
                .ok_or_else(|| SdkError::not_found("account", id));
        }
        for binding in &input.bindings {
            if let Some(owner) = self.accounts.find_by_binding(binding) {
                return Err(SdkError::BindingClaimed {
                    binding: format!("{}:{}", binding.platform, binding.handle),
                    account: owner.to_string(),
                });
            }
        }

        let account = Account {
            id,
            did: input.did,
            display_name: input.display_name,
            bindings: input.bindings.into_iter().collect(),
            created_at: time::normalize(input.created_at.unwrap_or_else(time::now)),
            stats: Default::default(),
        };
        self.commit(&[Event::account_created(&account, EventMetadata::command(SOURCE))?])?;
        info!(account = %id.short(), name = %account.display_name, "account created");
        Ok(account)
    }

    /// The logged history of a message, read from the event log rather than
    /// from a view that may be mid-rebuild.
    fn stored_message(&self, id: &MessageId) -> SdkResult<MessageAggregate> {
        if self.events.version_of(id.as_identifier()) == 0 {
            return Err(SdkError::not_found("message", id));
        }
        Ok(self.repository().load::<MessageAggregate>(id.as_identifier())?.state)
    }

    /// Append a batch and feed what was appended to the derived state.
    fn commit(&self, batch: &[Event]) -> SdkResult<()> {
        let appended = self.events.append(batch)?;
        for stored in &appended {
            self.absorb(stored);
            self.maybe_snapshot(&stored.event.aggregate);
        }
        Ok(())
    }

    /// Apply one logged event to projections, the graph and search.
    ///
    /// Never fails. Derived state that cannot take the event logs it and
    /// moves on.
    fn absorb(&self, stored: &StoredEvent) {
        self.projections.apply(stored);
        let event = &stored.event;
        let derived = match event.event_type {
            EventType::MessageCreated => self.absorb_created(event),
            EventType::MessageUpdated => self.absorb_updated(event),
            EventType::MessageDeleted => MessageId::new(event.aggregate.id)
                .map(|id| self.queue_search(id, self.indexer.remove(id)))
                .map_err(SdkError::from),
            _ => Ok(()),
        };
        if let Err(e) = derived {
            warn!(event = %event.id, kind = ?event.event_type, error = %e, "event skipped by derived state");
        }
    }

    fn absorb_created(&self, event: &Event) -> SdkResult<()> {
        let MessageCreated { message } = event.payload_as()?;
        let content = hasher::message_identity_bytes(&message.identity())?;
        let added = self.graph.write().expect("lock poisoned").add(NodeInput {
            id: message.id,
            thread: message.refs.thread_id,
            reply_to: message.refs.reply_to,
            content,
        });
        if let Err(e) = added {
            warn!(id = %message.id.short(), error = %e, "message not added to thread graph");
        }
        let queued = self
            .indexer
            .index(message.id, message.content.clone(), doc_metadata(&message));
        self.queue_search(message.id, queued);
        Ok(())
    }

    fn absorb_updated(&self, event: &Event) -> SdkResult<()> {
        let id = MessageId::new(event.aggregate.id)?;
        let stored = self.stored_message(&id)?;
        if stored.is_deleted() {
            return Ok(());
        }
        let Some(message) = stored.current() else {
            return Ok(());
        };
        let queued = self
            .indexer
            .index(id, message.content.clone(), doc_metadata(&message));
        self.queue_search(id, queued);
        Ok(())
    }

    /// A search job that could not be queued leaves the index incomplete;
    /// later searches report themselves degraded.
    fn queue_search(&self, id: MessageId, queued: Result<(), SearchError>) {
        if let Err(e) = queued {
            let missed = self.search_misses.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(id = %id.short(), missed, error = %e, "search index left incomplete");
        }
    }

    fn maybe_snapshot(&self, aggregate: &AggregateRef) {
        let repo = self.repository();
        let taken = match aggregate.kind {
            AggregateKind::Message => repo.maybe_snapshot::<MessageAggregate>(&aggregate.id),
            AggregateKind::Account => repo.maybe_snapshot::<AccountAggregate>(&aggregate.id),
            AggregateKind::Thread => repo.maybe_snapshot::<ThreadAggregate>(&aggregate.id),
        };
        if let Err(e) = taken {
            warn!(aggregate = %aggregate.id, error = %e, "snapshot failed");
        }
    }

    fn write_mirror(&self, message: &Message) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let path = mirror_path(dir, &message.id);
        if let Err(e) = MirrorDocument::for_message(message).write_to(&path) {
            warn!(id = %message.id.short(), path = %path.display(), error = %e, "mirror write failed");
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get_message(&self, id: &MessageId) -> SdkResult<Message> {
        self.messages
            .message(id)
            .ok_or_else(|| SdkError::not_found("message", id))
    }

    /// Messages of a thread in creation order.
    pub fn list_thread(&self, thread: &ThreadId, page: Pagination) -> SdkResult<Vec<Message>> {
        if self.threads.thread(thread).is_none() {
            return Err(SdkError::not_found("thread", thread));
        }
        let ids = self.threads.messages(thread, page);
        Ok(self.messages.messages(&ids))
    }

    pub fn get_thread(&self, id: &ThreadId) -> SdkResult<Thread> {
        self.threads
            .thread(id)
            .ok_or_else(|| SdkError::not_found("thread", id))
    }

    /// All threads, most recently active first.
    pub fn threads(&self) -> Vec<Thread> {
        self.threads.threads()
    }

    pub fn get_account(&self, id: &AccountId) -> SdkResult<Account> {
        self.accounts
            .account(id)
            .ok_or_else(|| SdkError::not_found("account", id))
    }

    pub fn find_account(&self, binding: &PlatformBinding) -> Option<Account> {
        self.accounts
            .find_by_binding(binding)
            .and_then(|id| self.accounts.account(&id))
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.accounts()
    }

    /// Messages across all threads, newest first.
    pub fn timeline(&self, page: Pagination) -> Vec<Message> {
        let ids: Vec<MessageId> = self
            .timeline
            .page(page)
            .into_iter()
            .map(|entry| entry.message_id)
            .collect();
        self.messages.messages(&ids)
    }

    /// Search messages. Never waits for pending indexing; call
    /// [`flush_search`](Self::flush_search) first to read your own writes.
    pub fn search(&self, query: &str, options: &SearchOptions) -> SdkResult<SearchResults> {
        let response = self.search.search(query, options)?;
        let hits = response
            .hits
            .into_iter()
            .filter_map(|hit| {
                self.messages.message(&hit.id).map(|message| MessageHit {
                    message,
                    score: hit.score,
                    lexical_rank: hit.lexical_rank,
                    semantic_rank: hit.semantic_rank,
                })
            })
            .collect();
        let mut warnings = response.warnings;
        let missed = self.search_misses.load(Ordering::Relaxed);
        if missed > 0 {
            warnings.push(format!("{missed} index updates were dropped; results may be incomplete"));
        }
        Ok(SearchResults {
            hits,
            mode: response.mode,
            degraded: response.degraded || missed > 0,
            warnings,
        })
    }

    /// Block until every queued indexing job has been applied.
    pub fn flush_search(&self) -> SdkResult<()> {
        Ok(self.indexer.flush()?)
    }

    /// Recompute every message id of a thread from the stored bytes and
    /// check its links.
    pub fn verify_thread(&self, thread: &ThreadId) -> SdkResult<IntegrityReport> {
        let graph = self.graph.read().expect("lock poisoned");
        Ok(graph.verify_thread(thread, self.content.as_ref())?)
    }

    /// Path from a message to its thread root.
    pub fn proof(&self, id: &MessageId) -> SdkResult<ThreadProof> {
        Ok(self.graph.read().expect("lock poisoned").proof(id)?)
    }

    /// Stored canonical bytes of a message's identity.
    pub fn content_bytes(&self, id: &MessageId) -> SdkResult<Vec<u8>> {
        Ok(self.content.get(id.as_identifier())?)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Reset and replay one projection. A cancelled rebuild resumes where it
    /// stopped on the next call.
    pub fn rebuild_projection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> SdkResult<RebuildOutcome> {
        Ok(self.projections.rebuild(name, &self.events, cancel)?)
    }

    pub fn projection_names(&self) -> Vec<String> {
        self.projections.names()
    }

    /// Serialized state of a projection, for equivalence checks.
    pub fn projection_state(&self, name: &str) -> SdkResult<Vec<u8>> {
        Ok(self.projections.state_bytes(name)?)
    }

    pub fn snapshot_aggregate(&self, aggregate: &AggregateRef) -> SdkResult<Snapshot> {
        let repo = self.repository();
        let snapshot = match aggregate.kind {
            AggregateKind::Message => repo.snapshot::<MessageAggregate>(&aggregate.id)?,
            AggregateKind::Account => repo.snapshot::<AccountAggregate>(&aggregate.id)?,
            AggregateKind::Thread => repo.snapshot::<ThreadAggregate>(&aggregate.id)?,
        };
        Ok(snapshot)
    }

    /// Full history of one message: snapshot, if any, plus later events.
    pub fn load_message_aggregate(&self, id: &MessageId) -> SdkResult<Loaded<MessageAggregate>> {
        Ok(self.repository().load(id.as_identifier())?)
    }

    /// The same aggregate rebuilt from events alone.
    pub fn replay_message_aggregate(&self, id: &MessageId) -> SdkResult<Loaded<MessageAggregate>> {
        Ok(self.repository().replay(id.as_identifier())?)
    }

    /// Delete every snapshot. Returns how many were removed.
    pub fn clear_snapshots(&self) -> SdkResult<usize> {
        Ok(self.snapshots.clear()?)
    }

    pub fn stats(&self) -> SdkResult<StoreStats> {
        Ok(StoreStats {
            events: self.events.len(),
            messages: self.messages.len(),
            threads: self.threads.threads().len(),
            accounts: self.accounts.accounts().len(),
            indexed: self.search.len(),
            graph_nodes: self.graph.read().expect("lock poisoned").len(),
            snapshots: self.snapshots.len()?,
        })
    }

    /// Every logged event in order.
    pub fn events(&self) -> SdkResult<Vec<StoredEvent>> {
        Ok(self.events.all_after(None, usize::MAX)?)
    }

    pub fn config(&self) -> &StrandConfig {
        &self.config
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    fn repository(&self) -> AggregateRepository<'_> {
        AggregateRepository::new(&self.events, &self.snapshots, self.config.snapshots)
    }
}

impl std::fmt::Debug for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strand")
            .field("data_dir", &self.data_dir)
            .field("events", &self.events.len())
            .field("search", &self.search)
            .finish()
    }
}

fn doc_metadata(message: &Message) -> DocMetadata {
    DocMetadata {
        thread_id: message.refs.thread_id,
        account_id: message.author.account_id,
        kind: message.kind,
        created_at: message.created_at,
    }
}
