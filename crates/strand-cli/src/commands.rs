use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use strand_sdk::{
    AggregateKind, AggregateRef, ApiRecord, CancellationToken, IntegrityReport, Message,
    MessageId, MessageKind, Pagination, PlatformBinding, SearchMode, SearchOptions, SigningKey,
    SourceRecord, Strand, StrandConfig, ThreadHint, ThreadId, ToMessageInput,
};
use strand_types::{time, AccountId};
use tracing::{info, warn};

use crate::cli::*;

const CONFIG_FILE: &str = "strand.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.data_dir.as_deref(), cli.config.as_deref())?;
    let out = Output(cli.format);
    match cli.command {
        Command::Init(args) => cmd_init(config, args, out),
        Command::Keygen(args) => cmd_keygen(args, out),
        Command::Status(_) => cmd_status(&open(config)?, out),
        Command::Post(args) => cmd_post(&open(config)?, args, out),
        Command::Import(args) => cmd_import(&open(config)?, args, out),
        Command::Show(args) => cmd_show(&open(config)?, args, out),
        Command::Thread(args) => cmd_thread(&open(config)?, args, out),
        Command::Timeline(args) => cmd_timeline(&open(config)?, args, out),
        Command::Accounts(_) => cmd_accounts(&open(config)?, out),
        Command::Search(args) => cmd_search(&open(config)?, args, out),
        Command::Verify(args) => cmd_verify(&open(config)?, args, out),
        Command::Proof(args) => cmd_proof(&open(config)?, args, out),
        Command::Rebuild(args) => cmd_rebuild(&open(config)?, args, out),
        Command::Snapshot(args) => cmd_snapshot(&open(config)?, args, out),
        Command::Events(args) => cmd_events(&open(config)?, args, out),
    }
}

fn open(config: StrandConfig) -> anyhow::Result<Strand> {
    Strand::open(config).context("opening the store (run `strand init` to create one)")
}

/// `--config` wins, then `<data-dir>/strand.toml`, then defaults.
fn resolve_config(data_dir: Option<&Path>, config: Option<&Path>) -> anyhow::Result<StrandConfig> {
    let mut resolved = match config {
        Some(path) => StrandConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let dir = data_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| StrandConfig::default().data_dir);
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                StrandConfig::load(&candidate)?
            } else {
                StrandConfig::at(dir)
            }
        }
    };
    if let Some(dir) = data_dir {
        resolved.data_dir = dir.to_path_buf();
    }
    Ok(resolved)
}

#[derive(Clone, Copy)]
struct Output(OutputFormat);

impl Output {
    /// Print `value` as JSON, or run `text` for human output.
    fn emit<T: Serialize>(self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.0 {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

fn message_id(text: &str) -> anyhow::Result<MessageId> {
    MessageId::parse(text).with_context(|| format!("invalid message id {text:?}"))
}

fn thread_id(text: &str) -> anyhow::Result<ThreadId> {
    ThreadId::parse(text).with_context(|| format!("invalid thread id {text:?}"))
}

fn print_message_line(message: &Message) {
    let parent = message
        .refs
        .reply_to
        .map(|p| format!(" ↳ {}", p.short()))
        .unwrap_or_default();
    println!(
        "{}  {}  {}{}",
        message.id.short().yellow(),
        time::format(&message.created_at).dimmed(),
        message.author.account_id.short().cyan(),
        parent.dimmed(),
    );
    for line in message.content.lines() {
        println!("    {line}");
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn cmd_init(config: StrandConfig, args: InitArgs, out: Output) -> anyhow::Result<()> {
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let path = config.data_dir.join(CONFIG_FILE);
    let written = if path.exists() && !args.force {
        false
    } else {
        fs::write(&path, config.to_toml_string()?)?;
        true
    };
    let dir = config.data_dir.clone();
    drop(Strand::open(config)?);
    info!(dir = %dir.display(), "store initialized");

    let summary = serde_json::json!({
        "data_dir": dir,
        "config": path,
        "config_written": written,
    });
    out.emit(&summary, || {
        println!("{} Initialized Strand store in {}", "✓".green().bold(), dir.display().to_string().bold());
        if written {
            println!("  Config: {}", path.display());
        } else {
            println!("  Config: {} {}", path.display(), "(kept existing)".dimmed());
        }
    })
}

fn cmd_keygen(args: KeygenArgs, out: Output) -> anyhow::Result<()> {
    if args.out.exists() {
        bail!("{} already exists", args.out.display());
    }
    let key = SigningKey::generate();
    fs::write(&args.out, hex::encode(key.as_bytes()))?;
    let did = key.did();
    out.emit(&serde_json::json!({ "did": did, "path": args.out }), || {
        println!("{} Wrote key to {}", "✓".green().bold(), args.out.display());
        println!("  DID: {}", did.to_string().cyan());
    })
}

fn read_key(path: &Path) -> anyhow::Result<SigningKey> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let bytes: [u8; 32] = hex::decode(text.trim())?
        .try_into()
        .map_err(|_| anyhow::anyhow!("{} does not hold a 32-byte key", path.display()))?;
    Ok(SigningKey::from_bytes(bytes))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn cmd_post(strand: &Strand, args: PostArgs, out: Output) -> anyhow::Result<()> {
    let mut tags = std::collections::BTreeMap::new();
    for tag in &args.tags {
        let (k, v) = tag
            .split_once('=')
            .with_context(|| format!("tag {tag:?} is not key=value"))?;
        tags.insert(k.to_string(), v.to_string());
    }
    let reply_to = args.reply_to.as_deref().map(message_id).transpose()?;
    let record = ApiRecord {
        kind: args.kind,
        content: args.content,
        author: PlatformBinding::new(&args.platform, &args.author),
        did: None,
        thread: ThreadHint::new(&args.platform, &args.thread),
        created_at: time::now(),
        reply_to,
        tags,
    };
    let input = record.to_message_input()?;

    match args.key {
        Some(path) => {
            let key = read_key(&path)?;
            let envelope = strand.create_signed_message(input, &key)?;
            out.emit(&envelope, || {
                println!("{} Posted {}", "✓".green().bold(), envelope.message.id.to_string().yellow());
                println!("  Signed by {}", envelope.signer.to_string().cyan());
            })
        }
        None => {
            let message = strand.create_message(input)?;
            out.emit(&message, || {
                println!("{} Posted {}", "✓".green().bold(), message.id.to_string().yellow());
                println!("  Thread: {}", message.refs.thread_id);
            })
        }
    }
}

fn cmd_import(strand: &Strand, args: ImportArgs, out: Output) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = if args.path == PathBuf::from("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = fs::File::open(&args.path)
            .with_context(|| format!("opening {}", args.path.display()))?;
        Box::new(BufReader::new(file))
    };

    let before = strand.stats()?.messages;
    let (mut read, mut failed) = (0usize, 0usize);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        read += 1;
        let result = serde_json::from_str::<SourceRecord>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|record| Ok(record.to_message_input()?))
            .and_then(|input| Ok(strand.create_message(input)?));
        if let Err(e) = result {
            if !args.keep_going {
                return Err(e.context(format!("line {}", n + 1)));
            }
            warn!(line = n + 1, error = %e, "skipping record");
            failed += 1;
        }
    }
    let created = strand.stats()?.messages.saturating_sub(before);

    let summary = serde_json::json!({ "read": read, "created": created, "failed": failed });
    out.emit(&summary, || {
        println!(
            "{} Imported {} records: {} new, {} already present",
            "✓".green().bold(),
            read,
            created.to_string().bold(),
            (read - failed).saturating_sub(created),
        );
        if failed > 0 {
            println!("  {} {} skipped", "!".yellow().bold(), failed);
        }
    })
}

fn cmd_rebuild(strand: &Strand, args: RebuildArgs, out: Output) -> anyhow::Result<()> {
    let names = match args.projection {
        Some(name) => vec![name],
        None => strand.projection_names(),
    };
    let cancel = CancellationToken::new();
    let mut outcomes = Vec::new();
    for name in &names {
        let outcome = strand.rebuild_projection(name, &cancel)?;
        outcomes.push(serde_json::json!({
            "projection": outcome.projection,
            "applied": outcome.applied,
            "failed": outcome.failed,
            "completed": outcome.completed,
        }));
    }
    out.emit(&outcomes, || {
        for o in &outcomes {
            let mark = if o["failed"] == 0 { "✓".green() } else { "!".yellow() };
            println!(
                "{} {}: {} events applied, {} failed",
                mark, o["projection"].as_str().unwrap_or_default().bold(), o["applied"], o["failed"],
            );
        }
    })
}

fn cmd_snapshot(strand: &Strand, args: SnapshotArgs, out: Output) -> anyhow::Result<()> {
    if args.clear {
        let removed = strand.clear_snapshots()?;
        return out.emit(&serde_json::json!({ "removed": removed }), || {
            println!("{} Removed {} snapshots", "✓".green().bold(), removed);
        });
    }
    let Some(id) = args.message else {
        bail!("give a message id or --clear");
    };
    let id = message_id(&id)?;
    let snapshot = strand.snapshot_aggregate(&AggregateRef::new(id, AggregateKind::Message))?;
    out.emit(&snapshot, || {
        println!(
            "{} Snapshot of {} at version {}",
            "✓".green().bold(),
            id.short().yellow(),
            snapshot.version
        );
    })
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn cmd_status(strand: &Strand, out: Output) -> anyhow::Result<()> {
    let stats = strand.stats()?;
    out.emit(&stats, || {
        let dir = strand
            .data_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(memory)".into());
        println!("Store: {}", dir.bold());
        println!("  Events:    {}", stats.events);
        println!("  Messages:  {}", stats.messages);
        println!("  Threads:   {}", stats.threads);
        println!("  Accounts:  {}", stats.accounts);
        println!("  Indexed:   {}", stats.indexed);
        println!("  DAG nodes: {}", stats.graph_nodes);
        println!("  Snapshots: {}", stats.snapshots);
    })
}

fn cmd_show(strand: &Strand, args: ShowArgs, out: Output) -> anyhow::Result<()> {
    let id = message_id(&args.message)?;
    if args.raw {
        let bytes = strand.content_bytes(&id)?;
        println!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }
    let message = strand.get_message(&id)?;
    out.emit(&message, || {
        println!("{} {}", "Message".bold(), message.id.to_string().yellow());
        println!("  Kind:     {}", message.kind);
        println!("  Author:   {}", message.author.account_id.to_string().cyan());
        if let Some(did) = &message.author.did {
            println!("  DID:      {did}");
        }
        println!("  Thread:   {}", message.refs.thread_id);
        if let Some(parent) = &message.refs.reply_to {
            println!("  Reply to: {parent}");
        }
        println!("  Created:  {}", time::format(&message.created_at));
        println!("  Platform: {}", message.source.platform);
        for (k, v) in &message.tags {
            println!("  Tag:      {k}={v}");
        }
        println!();
        println!("{}", message.content);
    })
}

fn cmd_thread(strand: &Strand, args: ThreadArgs, out: Output) -> anyhow::Result<()> {
    let Some(id) = args.thread else {
        let threads = strand.threads();
        return out.emit(&threads, || {
            if threads.is_empty() {
                println!("No threads.");
            }
            for t in &threads {
                println!(
                    "{}  {:<8} {:>5} msgs  {}",
                    t.id.short().yellow(),
                    t.class.to_string(),
                    t.message_count,
                    t.title.as_deref().unwrap_or(&t.native_id),
                );
            }
        });
    };
    let id = thread_id(&id)?;
    let thread = strand.get_thread(&id)?;
    let messages = strand.list_thread(&id, Pagination::new(args.offset, args.limit))?;
    out.emit(&messages, || {
        println!(
            "{} {} ({} messages)",
            "Thread".bold(),
            thread.title.as_deref().unwrap_or(&thread.native_id).bold(),
            thread.message_count
        );
        for m in &messages {
            print_message_line(m);
        }
    })
}

fn cmd_timeline(strand: &Strand, args: TimelineArgs, out: Output) -> anyhow::Result<()> {
    let messages = strand.timeline(Pagination::new(args.offset, args.limit));
    out.emit(&messages, || {
        if messages.is_empty() {
            println!("No messages.");
        }
        for m in &messages {
            print_message_line(m);
        }
    })
}

fn cmd_accounts(strand: &Strand, out: Output) -> anyhow::Result<()> {
    let accounts = strand.accounts();
    out.emit(&accounts, || {
        if accounts.is_empty() {
            println!("No accounts.");
        }
        for a in &accounts {
            let bindings: Vec<String> = a
                .bindings
                .iter()
                .map(|b| format!("{}:{}", b.platform, b.handle))
                .collect();
            println!("{}  {}  {}", a.id.short().cyan(), a.display_name.bold(), bindings.join(", ").dimmed());
        }
    })
}

fn cmd_search(strand: &Strand, args: SearchArgs, out: Output) -> anyhow::Result<()> {
    let mode: SearchMode = args.mode.parse()?;
    let mut options = SearchOptions::new(mode).with_limit(args.limit);
    if let Some(t) = &args.thread {
        options = options.in_thread(thread_id(t)?);
    }
    if let Some(a) = &args.account {
        options = options.by_account(
            AccountId::parse(a).with_context(|| format!("invalid account id {a:?}"))?,
        );
    }
    if let Some(k) = &args.kind {
        options = options.of_kind(k.parse::<MessageKind>()?);
    }

    strand.flush_search()?;
    let results = strand.search(&args.query, &options)?;
    out.emit(&results, || {
        for w in &results.warnings {
            println!("{} {}", "warning:".yellow().bold(), w);
        }
        if results.hits.is_empty() {
            println!("No matches.");
        }
        for hit in &results.hits {
            print!("{:>8.4} ", hit.score);
            print_message_line(&hit.message);
        }
    })
}

fn cmd_verify(strand: &Strand, args: VerifyArgs, out: Output) -> anyhow::Result<()> {
    let threads = match args.thread {
        Some(t) => vec![thread_id(&t)?],
        None => strand.threads().into_iter().map(|t| t.id).collect(),
    };
    let reports: Vec<IntegrityReport> = threads
        .iter()
        .map(|t| strand.verify_thread(t))
        .collect::<Result<_, _>>()?;
    let invalid = reports.iter().filter(|r| !r.valid).count();

    out.emit(&reports, || {
        for r in &reports {
            if r.valid {
                println!("{} {} ({} nodes)", "✓".green().bold(), r.thread.short(), r.node_count);
            } else {
                println!("{} {} ({} nodes)", "✗".red().bold(), r.thread.short(), r.node_count);
                for issue in &r.errors {
                    println!("    {}", issue.to_string().red());
                }
            }
        }
    })?;
    if invalid > 0 {
        bail!("{invalid} of {} threads failed verification", reports.len());
    }
    Ok(())
}

fn cmd_proof(strand: &Strand, args: ProofArgs, out: Output) -> anyhow::Result<()> {
    let id = message_id(&args.message)?;
    let proof = strand.proof(&id)?;
    let valid = proof.verify_with_content(&strand.content_bytes(&id)?);
    out.emit(&serde_json::json!({ "proof": proof, "valid": valid }), || {
        for (depth, step) in proof.steps.iter().enumerate() {
            println!("{}{} {}", "  ".repeat(depth), "•".dimmed(), step.id.short().yellow());
        }
        if valid {
            println!("{} proof verifies against stored content", "✓".green().bold());
        } else {
            println!("{} proof does not verify", "✗".red().bold());
        }
    })
}

fn cmd_events(strand: &Strand, args: EventsArgs, out: Output) -> anyhow::Result<()> {
    let events = strand.events()?;
    let skip = events.len().saturating_sub(args.limit);
    let events = &events[skip..];
    out.emit(&events, || {
        for stored in events {
            let e = &stored.event;
            println!(
                "{:>8}  {}  {:<16} {} {} v{}",
                stored.position.to_string().dimmed(),
                time::format(&e.timestamp),
                e.event_type.to_string().bold(),
                e.aggregate.kind,
                e.aggregate.id.short().yellow(),
                stored.version,
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_in_data_dir_is_picked_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "[snapshots]\nevery = 7\n").unwrap();
        let config = resolve_config(Some(tmp.path()), None).unwrap();
        assert_eq!(config.snapshots.every, 7);
        assert_eq!(config.data_dir, tmp.path());
    }

    #[test]
    fn data_dir_flag_overrides_config_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("elsewhere.toml");
        fs::write(&file, "data_dir = \"/nowhere\"\n").unwrap();
        let config = resolve_config(Some(tmp.path()), Some(&file)).unwrap();
        assert_eq!(config.data_dir, tmp.path());

        let config = resolve_config(None, Some(&file)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/nowhere"));
    }
}
