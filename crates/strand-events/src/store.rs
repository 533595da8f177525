use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strand_types::{EventId, Identifier};
use tracing::{debug, error, info, warn};

use crate::config::{EventStoreConfig, SyncMode};
use crate::error::{EventStoreError, Result};
use crate::event::{Event, SCHEMA_VERSION};
use crate::framing;
use crate::position::Position;
use crate::segment::{self, SegmentName, Tail};

const LOCK_FILE: &str = "LOCK";

/// An event together with where it lives in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub position: Position,
    /// 1-based version of the event within its aggregate's stream.
    pub version: u64,
    pub event: Event,
}

/// Anything that can replay the global log in order.
pub trait EventSource: Send + Sync {
    /// Up to `limit` events strictly after `after` (from the start if `None`).
    fn read_after(&self, after: Option<Position>, limit: usize) -> Result<Vec<StoredEvent>>;
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Index {
    by_aggregate: HashMap<Identifier, Vec<Position>>,
    aggregate_of: HashMap<Position, Identifier>,
    ids: HashSet<EventId>,
    segments: BTreeMap<u64, PathBuf>,
    last: Option<Position>,
}

impl Index {
    fn record(&mut self, event: &Event, position: Position) -> u64 {
        self.ids.insert(event.id);
        self.aggregate_of.insert(position, event.aggregate.id);
        let stream = self.by_aggregate.entry(event.aggregate.id).or_default();
        stream.push(position);
        self.last = Some(self.last.map_or(position, |last| last.max(position)));
        stream.len() as u64
    }

    /// Stream version of the event at `position`, if it is indexed.
    fn version_at(&self, position: Position) -> Option<u64> {
        let aggregate = self.aggregate_of.get(&position)?;
        let stream = self.by_aggregate.get(aggregate)?;
        stream.binary_search(&position).ok().map(|i| i as u64 + 1)
    }
}

// ---------------------------------------------------------------------------
// Storage backends
// ---------------------------------------------------------------------------

enum Storage {
    Memory(RwLock<BTreeMap<Position, Event>>),
    Disk {
        dir: PathBuf,
        /// Held for the lifetime of the store; the advisory lock is released
        /// when the file is closed.
        _lock: File,
    },
}

struct OpenSegment {
    name: SegmentName,
    file: File,
    len: u64,
}

/// The append cursor. Holding its mutex is what makes a writer the writer.
enum Cursor {
    Memory { next: u64 },
    Disk {
        current: Option<OpenSegment>,
        next_seq: u64,
    },
}

/// Append-only, segmented event log.
///
/// Appends are serialized on a single in-process mutex and, for on-disk
/// stores, an exclusive advisory lock on `<dir>/LOCK` held for the store's
/// lifetime. Readers never take the append mutex.
pub struct EventStore {
    storage: Storage,
    cursor: Mutex<Cursor>,
    index: RwLock<Index>,
    config: EventStoreConfig,
}

impl EventStore {
    /// In-memory store, for tests and embedding.
    pub fn in_memory() -> Self {
        Self {
            storage: Storage::Memory(RwLock::new(BTreeMap::new())),
            cursor: Mutex::new(Cursor::Memory { next: 0 }),
            index: RwLock::new(Index::default()),
            config: EventStoreConfig::default(),
        }
    }

    /// Open (or create) an on-disk store in `dir`, recovering from any torn
    /// write left by a crash.
    pub fn open(dir: impl AsRef<Path>, config: EventStoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let lock = acquire_lock(&dir.join(LOCK_FILE), &config)?;

        let segments = segment::list_segments(&dir)?;
        let mut index = Index::default();
        let mut current = None;
        let segment_count = segments.len();

        for (i, (name, path)) in segments.into_iter().enumerate() {
            let is_last = i + 1 == segment_count;
            let bytes = fs::read(&path)?;
            let scan = segment::scan(&bytes);

            match scan.tail {
                Tail::Clean => {}
                Tail::Torn { offset, reason } if is_last => {
                    warn!(
                        segment = %path.display(),
                        offset,
                        discarded = bytes.len() as u64 - scan.committed_len,
                        %reason,
                        "discarding torn tail of event log"
                    );
                    let file = OpenOptions::new().write(true).open(&path)?;
                    file.set_len(scan.committed_len)?;
                    file.sync_all()?;
                }
                Tail::Torn { offset, reason } | Tail::Corrupt { offset, reason } => {
                    error!(segment = %path.display(), offset, %reason, "event log corruption");
                    return Err(EventStoreError::Corrupt {
                        path,
                        offset,
                        reason,
                    });
                }
                Tail::UnsupportedSchema { version, .. } => {
                    return Err(EventStoreError::SchemaVersion {
                        found: version,
                        supported: SCHEMA_VERSION,
                    });
                }
            }

            for record in &scan.records {
                let event = &record.frame.event;
                if index.ids.contains(&event.id) {
                    warn!(event = %event.id, segment = name.seq, "duplicate event in log; ignoring");
                    continue;
                }
                index.record(event, Position::new(name.seq, record.offset));
            }
            index.segments.insert(name.seq, path.clone());

            if is_last {
                let file = OpenOptions::new().append(true).open(&path)?;
                current = Some(OpenSegment {
                    name,
                    file,
                    len: scan.committed_len,
                });
            }
        }

        let next_seq = current.as_ref().map_or(1, |c| c.name.seq + 1);
        info!(
            dir = %dir.display(),
            segments = index.segments.len(),
            events = index.ids.len(),
            "event store opened"
        );

        Ok(Self {
            storage: Storage::Disk { dir, _lock: lock },
            cursor: Mutex::new(Cursor::Disk { current, next_seq }),
            index: RwLock::new(index),
            config,
        })
    }

    /// Append a batch atomically.
    ///
    /// Events whose id is already in the log (or repeated within the batch)
    /// are skipped; only newly appended events are returned. Either every
    /// new event of the batch becomes durable or none does.
    pub fn append(&self, events: &[Event]) -> Result<Vec<StoredEvent>> {
        for event in events {
            if event.schema_version > SCHEMA_VERSION {
                return Err(EventStoreError::SchemaVersion {
                    found: event.schema_version,
                    supported: SCHEMA_VERSION,
                });
            }
            event.verify_id()?;
        }

        let mut cursor = self.cursor.lock().expect("lock poisoned");

        let fresh: Vec<&Event> = {
            let index = self.index.read().expect("lock poisoned");
            let mut seen = HashSet::new();
            events
                .iter()
                .filter(|e| !index.ids.contains(&e.id) && seen.insert(e.id))
                .collect()
        };
        if fresh.len() < events.len() {
            debug!(skipped = events.len() - fresh.len(), "skipping already-logged events");
        }
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let positions = match &mut *cursor {
            Cursor::Memory { next } => {
                let Storage::Memory(map) = &self.storage else {
                    unreachable!("memory cursor with disk storage")
                };
                let mut map = map.write().expect("lock poisoned");
                let mut positions = Vec::with_capacity(fresh.len());
                for event in &fresh {
                    let pos = Position::new(0, *next);
                    *next += 1;
                    map.insert(pos, (*event).clone());
                    positions.push(pos);
                }
                positions
            }
            Cursor::Disk { current, next_seq } => {
                let Storage::Disk { dir, .. } = &self.storage else {
                    unreachable!("disk cursor with memory storage")
                };
                self.append_to_disk(dir, current, next_seq, &fresh)?
            }
        };

        let mut index = self.index.write().expect("lock poisoned");
        let stored = fresh
            .into_iter()
            .zip(positions)
            .map(|(event, position)| {
                let version = index.record(event, position);
                debug!(event = %event.id, %position, version, "event appended");
                StoredEvent {
                    position,
                    version,
                    event: event.clone(),
                }
            })
            .collect();
        Ok(stored)
    }

    fn append_to_disk(
        &self,
        dir: &Path,
        current: &mut Option<OpenSegment>,
        next_seq: &mut u64,
        events: &[&Event],
    ) -> Result<Vec<Position>> {
        let total = events.len() as u32;
        let mut lines = Vec::with_capacity(events.len());
        for (i, event) in events.iter().enumerate() {
            lines.push(framing::encode(i as u32 + 1, total, event)?);
        }
        let batch_len: u64 = lines.iter().map(|l| l.len() as u64).sum();
        let batch_day = events
            .iter()
            .map(|e| e.timestamp.date_naive())
            .max()
            .unwrap_or(NaiveDate::MIN);

        let rotate = match current {
            None => true,
            Some(seg) => {
                batch_day > seg.name.day
                    || (seg.len > 0 && seg.len + batch_len > self.config.max_segment_bytes)
            }
        };
        if rotate {
            let day = current
                .as_ref()
                .map_or(batch_day, |seg| seg.name.day.max(batch_day));
            let name = SegmentName::new(*next_seq, day);
            let path = dir.join(name.file_name());
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            info!(segment = %path.display(), "rotated to new segment");
            *next_seq += 1;
            self.index
                .write()
                .expect("lock poisoned")
                .segments
                .insert(name.seq, path);
            *current = Some(OpenSegment { name, file, len: 0 });
        }

        let Some(seg) = current.as_mut() else {
            return Err(io::Error::other("no open segment").into());
        };
        let base = seg.len;
        let mut buf = String::with_capacity(batch_len as usize);
        let mut positions = Vec::with_capacity(lines.len());
        let mut offset = base;
        for line in &lines {
            positions.push(Position::new(seg.name.seq, offset));
            offset += line.len() as u64;
            buf.push_str(line);
        }

        let written = seg.file.write_all(buf.as_bytes()).and_then(|()| {
            seg.file.flush()?;
            if self.config.sync_mode == SyncMode::EveryWrite {
                seg.file.sync_data()?;
            }
            Ok(())
        });
        if let Err(e) = written {
            error!(segment = seg.name.seq, error = %e, "batch write failed; rolling back");
            seg.file.set_len(base)?;
            return Err(e.into());
        }
        seg.len = offset;
        Ok(positions)
    }

    /// Full stream of one aggregate, in version order.
    pub fn stream_for(&self, aggregate: &Identifier) -> Result<Vec<StoredEvent>> {
        self.stream_from(aggregate, 0)
    }

    /// Events of one aggregate with version greater than `after_version`.
    pub fn stream_from(&self, aggregate: &Identifier, after_version: u64) -> Result<Vec<StoredEvent>> {
        let positions = {
            let index = self.index.read().expect("lock poisoned");
            index.by_aggregate.get(aggregate).cloned().unwrap_or_default()
        };
        positions
            .into_iter()
            .enumerate()
            .skip(after_version as usize)
            .map(|(i, position)| {
                Ok(StoredEvent {
                    position,
                    version: i as u64 + 1,
                    event: self.read_at(position)?,
                })
            })
            .collect()
    }

    /// Up to `limit` events in global log order strictly after `after`.
    pub fn all_after(&self, after: Option<Position>, limit: usize) -> Result<Vec<StoredEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = match after {
            Some(p) => Bound::Excluded(p),
            None => Bound::Unbounded,
        };
        match &self.storage {
            Storage::Memory(map) => {
                let map = map.read().expect("lock poisoned");
                let index = self.index.read().expect("lock poisoned");
                Ok(map
                    .range((start, Bound::Unbounded))
                    .take(limit)
                    .filter_map(|(pos, event)| {
                        index.version_at(*pos).map(|version| StoredEvent {
                            position: *pos,
                            version,
                            event: event.clone(),
                        })
                    })
                    .collect())
            }
            Storage::Disk { .. } => self.scan_after(after, limit),
        }
    }

    /// Disk reader: seeks into the segment holding `after` and reads forward,
    /// bounded by what the index has acknowledged so a batch mid-write is
    /// never surfaced.
    fn scan_after(&self, after: Option<Position>, limit: usize) -> Result<Vec<StoredEvent>> {
        let (segments, last) = {
            let index = self.index.read().expect("lock poisoned");
            (index.segments.clone(), index.last)
        };
        let Some(last) = last else {
            return Ok(Vec::new());
        };
        let first_seg = after.map_or(0, |p| p.segment);
        if first_seg > last.segment {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for (seq, path) in segments.range(first_seg..=last.segment) {
            let mut offset = match after {
                Some(a) if a.segment == *seq => a.offset,
                _ => 0,
            };
            let mut reader = BufReader::new(File::open(path)?);
            reader.seek(SeekFrom::Start(offset))?;
            let mut line = Vec::new();
            loop {
                line.clear();
                let read = reader.read_until(b'\n', &mut line)?;
                if read == 0 {
                    break;
                }
                let position = Position::new(*seq, offset);
                offset += read as u64;
                if position > last {
                    return Ok(out);
                }
                if after.is_some_and(|a| position <= a) {
                    continue;
                }
                // Duplicates skipped at open are not indexed.
                let Some(version) = self.index.read().expect("lock poisoned").version_at(position) else {
                    continue;
                };
                let frame = std::str::from_utf8(&line)
                    .map_err(|e| e.to_string())
                    .and_then(|text| {
                        framing::decode(text.trim_end_matches('\n')).map_err(|e| e.to_string())
                    })
                    .map_err(|reason| {
                        error!(segment = %path.display(), offset = position.offset, %reason, "unreadable record");
                        EventStoreError::Corrupt {
                            path: path.clone(),
                            offset: position.offset,
                            reason,
                        }
                    })?;
                out.push(StoredEvent {
                    position,
                    version,
                    event: frame.event,
                });
                if out.len() == limit {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }

    fn read_at(&self, position: Position) -> Result<Event> {
        match &self.storage {
            Storage::Memory(map) => {
                let map = map.read().expect("lock poisoned");
                map.get(&position)
                    .cloned()
                    .ok_or_else(|| EventStoreError::InvalidPosition(position.to_string()))
            }
            Storage::Disk { .. } => {
                let path = self
                    .index
                    .read()
                    .expect("lock poisoned")
                    .segments
                    .get(&position.segment)
                    .cloned()
                    .ok_or_else(|| EventStoreError::InvalidPosition(position.to_string()))?;
                let mut file = File::open(&path)?;
                file.seek(SeekFrom::Start(position.offset))?;
                let mut line = String::new();
                BufReader::new(file).read_line(&mut line)?;
                let frame = framing::decode(line.trim_end_matches('\n')).map_err(|e| {
                    error!(segment = %path.display(), offset = position.offset, error = %e, "unreadable record");
                    EventStoreError::Corrupt {
                        path: path.clone(),
                        offset: position.offset,
                        reason: e.to_string(),
                    }
                })?;
                Ok(frame.event)
            }
        }
    }

    /// Whether an event id is already in the log.
    pub fn contains(&self, id: &EventId) -> bool {
        self.index.read().expect("lock poisoned").ids.contains(id)
    }

    /// Current version of an aggregate's stream (0 if it has no events).
    pub fn version_of(&self, aggregate: &Identifier) -> u64 {
        self.index
            .read()
            .expect("lock poisoned")
            .by_aggregate
            .get(aggregate)
            .map_or(0, |s| s.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.index.read().expect("lock poisoned").ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the most recently appended event.
    pub fn last_position(&self) -> Option<Position> {
        self.index.read().expect("lock poisoned").last
    }

    pub fn segment_count(&self) -> usize {
        self.index.read().expect("lock poisoned").segments.len()
    }

    /// Directory of an on-disk store.
    pub fn dir(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Disk { dir, .. } => Some(dir),
            Storage::Memory(_) => None,
        }
    }
}

impl EventSource for EventStore {
    fn read_after(&self, after: Option<Position>, limit: usize) -> Result<Vec<StoredEvent>> {
        self.all_after(after, limit)
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("dir", &self.dir())
            .field("events", &self.len())
            .finish()
    }
}

/// Take the exclusive writer lock, retrying with exponential backoff.
fn acquire_lock(path: &Path, config: &EventStoreConfig) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    let contended = fs2::lock_contended_error();
    let mut backoff = Duration::from_millis(config.lock_backoff_ms);

    for attempt in 0..=config.lock_retries {
        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => return Ok(file),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.raw_os_error() == contended.raw_os_error() =>
            {
                if attempt < config.lock_retries {
                    debug!(attempt, backoff_ms = backoff.as_millis() as u64, "event log locked; retrying");
                    thread::sleep(backoff);
                    backoff *= 2;
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    warn!(path = %path.display(), "gave up waiting for event log lock");
    Err(EventStoreError::Locked {
        path: path.to_path_buf(),
        attempts: config.lock_retries + 1,
    })
}
