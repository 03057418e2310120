use std::fs;

use anyhow::{anyhow, bail, Context as _};
use blueblock_crypto::{to_leaf_json, MerkleBuilder};
use blueblock_ledger::keyspace::encode_keyspace;
use blueblock_ledger::{
    AnchorLedgerState, AnchorSubmission, Clock, FileStateStore, HostGateway, LedgerConfig,
    LedgerGateway, LedgerSettings, StateSchema, StateValue, SystemClock, Transition,
    TransitionOutput,
};
use blueblock_types::{AnchorRecord, MerkleRoot, Principal, ProjectId};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::json;

use crate::cli::*;

/// Default submission window when only a batch is given.
const DEFAULT_WINDOW_SECS: u64 = 24 * 60 * 60;

struct Context {
    gateway: HostGateway<FileStateStore>,
    builder: MerkleBuilder,
    config: LedgerConfig,
    caller: Option<Principal>,
    format: OutputFormat,
}

impl Context {
    fn caller(&self) -> anyhow::Result<Principal> {
        self.caller
            .ok_or_else(|| anyhow!("this command needs a caller: pass --as <principal>"))
    }

    fn execute(&self, transition: Transition) -> anyhow::Result<TransitionOutput> {
        let caller = self.caller()?;
        Ok(self.gateway.execute(&caller, transition)?)
    }

    fn state(&self) -> anyhow::Result<AnchorLedgerState> {
        self.gateway.state()?.ok_or_else(|| {
            anyhow!(
                "no ledger at {}; run `blueblock init` first",
                self.gateway.store().path().display()
            )
        })
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(path) = cli.ledger {
        config.ledger_path = path;
    }
    if let Some(algorithm) = cli.hash {
        config.hash_algorithm = algorithm;
    }
    tracing::debug!(
        ledger = %config.ledger_path.display(),
        hash = %config.hash_algorithm,
        "configuration resolved"
    );

    let ctx = Context {
        gateway: HostGateway::new(FileStateStore::new(&config.ledger_path)),
        builder: MerkleBuilder::new(config.hash_algorithm),
        config,
        caller: cli.caller,
        format: cli.format,
    };

    match cli.command {
        Command::Root(args) => cmd_root(&ctx, args),
        Command::NewPrincipal => cmd_new_principal(&ctx),
        Command::Init(args) => cmd_init(&ctx, args),
        Command::OptIn => cmd_opt_in(&ctx),
        Command::Approve(args) => cmd_approve(&ctx, args),
        Command::Submit(args) => cmd_submit(&ctx, args),
        Command::Get(args) => cmd_get(&ctx, args),
        Command::List(args) => cmd_list(&ctx, args),
        Command::State(args) => cmd_state(&ctx, args),
        Command::Verify(args) => cmd_verify(&ctx, args),
        Command::Settings(args) => cmd_settings(&ctx, args),
        Command::ClearState => cmd_clear_state(&ctx),
        Command::Delete => cmd_delete(&ctx),
    }
}

fn cmd_root(ctx: &Context, args: RootArgs) -> anyhow::Result<()> {
    let batch = load_batch(&args.batch)?;
    let root = ctx.builder.build_root(&batch);

    if ctx.json() {
        let mut out = json!({
            "root": root.to_hex(),
            "records": batch.len(),
            "algorithm": ctx.builder.algorithm().name(),
        });
        if args.levels {
            out["levels"] = json!(hex_levels(&ctx.builder, &batch));
        }
        return print_json(&out);
    }

    println!("{}", root.to_hex().yellow().bold());
    println!("  Records: {}", batch.len());
    println!("  Hash: {}", ctx.builder.algorithm().name().cyan());
    if args.levels {
        for (depth, level) in hex_levels(&ctx.builder, &batch).iter().enumerate() {
            println!("  Level {depth}:");
            for digest in level {
                println!("    {}", digest.dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_new_principal(ctx: &Context) -> anyhow::Result<()> {
    let principal = Principal::ephemeral();
    if ctx.json() {
        return print_json(&json!({ "principal": principal.to_hex() }));
    }
    println!("{}", principal.to_hex());
    Ok(())
}

fn cmd_init(ctx: &Context, args: InitArgs) -> anyhow::Result<()> {
    let mut settings = ctx.config.settings.clone();
    if args.permissive {
        settings.enforce_window_order = false;
    }
    if args.deployed_schema {
        settings.schema = Some(StateSchema::DEPLOYED);
    }

    let output = ctx.execute(Transition::Create { settings })?;
    if ctx.json() {
        return print_json(&output);
    }
    if let TransitionOutput::Created { owner } = output {
        println!(
            "{} Created ledger at {}",
            "✓".green().bold(),
            ctx.config.ledger_path.display().to_string().bold()
        );
        println!("  Owner: {}", owner.to_hex().cyan());
    }
    Ok(())
}

fn cmd_opt_in(ctx: &Context) -> anyhow::Result<()> {
    let output = ctx.execute(Transition::OptIn)?;
    if ctx.json() {
        return print_json(&output);
    }
    match output {
        TransitionOutput::OptedIn { already: true } => println!("Already opted in."),
        _ => println!("{} Opted in", "✓".green().bold()),
    }
    Ok(())
}

fn cmd_approve(ctx: &Context, args: ApproveArgs) -> anyhow::Result<()> {
    let output = ctx.execute(Transition::SetApproved {
        target: args.principal,
        approved: !args.revoke,
    })?;
    if ctx.json() {
        return print_json(&output);
    }
    if let TransitionOutput::ApprovalSet { target, approved } = output {
        let verb = if approved { "Approved".green() } else { "Revoked".red() };
        println!("{} {}", verb.bold(), target.to_hex().cyan());
    }
    Ok(())
}

fn cmd_submit(ctx: &Context, args: SubmitArgs) -> anyhow::Result<()> {
    let (merkle_root, record_count, window_start, window_end) = match &args.records {
        Some(records) => {
            let batch = load_batch(&BatchArgs {
                records: records.clone(),
                lines: args.lines,
            })?;
            let window_end = args.to.unwrap_or_else(|| SystemClock.now());
            let window_start = args
                .from
                .unwrap_or_else(|| window_end.saturating_sub(DEFAULT_WINDOW_SECS));
            (
                ctx.builder.build_root(&batch),
                batch.len() as u64,
                window_start,
                window_end,
            )
        }
        None => {
            let root = args
                .root
                .as_deref()
                .ok_or_else(|| anyhow!("pass either --records or --root"))?;
            let (Some(count), Some(from), Some(to)) = (args.count, args.from, args.to) else {
                bail!("--root also needs --count, --from and --to");
            };
            let root = MerkleRoot::from_hex(root).context("parsing --root")?;
            (root, count, from, to)
        }
    };

    let submission = AnchorSubmission::new(
        args.project.as_str(),
        merkle_root,
        record_count,
        window_start,
        window_end,
    );
    let output = ctx.execute(Transition::SubmitAnchor(submission))?;
    if ctx.json() {
        return print_json(&output);
    }
    if let TransitionOutput::Anchored { index, committed_at } = output {
        println!("{} Anchor committed", "✓".green().bold());
        println!("  Index: {}", index.to_string().yellow().bold());
        println!("  Root: {}", merkle_root.to_hex());
        println!("  Records: {record_count}");
        println!("  Committed: {}", format_time(committed_at));
    }
    Ok(())
}

fn cmd_get(ctx: &Context, args: GetArgs) -> anyhow::Result<()> {
    let record = ctx.gateway.get_anchor(args.index)?;
    if ctx.json() {
        return print_json(&record_json(&record));
    }
    print_record(&record);
    Ok(())
}

fn cmd_list(ctx: &Context, args: ListArgs) -> anyhow::Result<()> {
    let view = ctx.gateway.read_global_state()?;
    let project = args.project.map(ProjectId::from);
    let mut records: Vec<&AnchorRecord> = view
        .anchors
        .iter()
        .filter(|r| project.as_ref().map_or(true, |p| &r.project_id == p))
        .collect();
    if let Some(limit) = args.limit {
        let skip = records.len().saturating_sub(limit);
        records = records.split_off(skip);
    }

    if ctx.json() {
        let out: Vec<_> = records.iter().map(|r| record_json(r)).collect();
        return print_json(&out);
    }
    if records.is_empty() {
        println!("No anchors.");
        return Ok(());
    }
    for record in records {
        println!(
            "{} {}  {}  {} records  {}",
            format!("#{}", record.index).yellow(),
            record.merkle_root.short_hex().dimmed(),
            record.project_id.to_string().bold(),
            record.record_count,
            format_time(record.committed_at)
        );
    }
    Ok(())
}

fn cmd_state(ctx: &Context, args: StateArgs) -> anyhow::Result<()> {
    let state = ctx.state()?;

    if args.raw {
        let keyspace = encode_keyspace(&state);
        if ctx.json() {
            let out: serde_json::Map<String, serde_json::Value> = keyspace
                .iter()
                .map(|(key, value)| (key.to_string(), value_json(value)))
                .collect();
            return print_json(&out);
        }
        for (key, value) in &keyspace {
            let rendered = match value {
                StateValue::Bytes(bytes) => hex::encode(bytes),
                StateValue::Uint(v) => v.to_string(),
            };
            println!("{} = {}", key.to_string().cyan(), rendered);
        }
        return Ok(());
    }

    let approved: Vec<String> = state.approved_principals().map(Principal::to_hex).collect();
    if ctx.json() {
        return print_json(&json!({
            "owner": state.owner().to_hex(),
            "anchor_count": state.anchor_count(),
            "version": state.version(),
            "deleted": state.is_deleted(),
            "approved": approved,
            "settings": state.settings(),
        }));
    }

    println!("Owner: {}", state.owner().to_hex().cyan());
    println!("Anchors: {}", state.anchor_count().to_string().bold());
    println!("Version: {}", state.version());
    if state.is_deleted() {
        println!("Status: {}", "deleted (read-only)".red().bold());
    } else {
        println!("Status: {}", "active".green());
    }
    if approved.is_empty() {
        println!("Approved: none");
    } else {
        println!("Approved:");
        for principal in &approved {
            println!("  {principal}");
        }
    }
    if let Some(latest) = state.latest() {
        println!(
            "Latest: #{} {} at {}",
            latest.index,
            latest.project_id,
            format_time(latest.committed_at)
        );
    }
    Ok(())
}

fn cmd_verify(ctx: &Context, args: VerifyArgs) -> anyhow::Result<()> {
    let state = ctx.state()?;
    let batch = load_batch(&args.batch)?;
    let matches = state.verify_batch(args.index, &ctx.builder, &batch)?;
    let recomputed = ctx.builder.build_root(&batch);

    if ctx.json() {
        print_json(&json!({
            "index": args.index,
            "matches": matches,
            "recomputed": recomputed.to_hex(),
        }))?;
    } else if matches {
        println!(
            "{} Batch matches anchor {}",
            "✓".green().bold(),
            args.index.to_string().yellow()
        );
    } else {
        println!(
            "{} Batch does not match anchor {}",
            "✗".red().bold(),
            args.index.to_string().yellow()
        );
        println!("  Recomputed: {}", recomputed.to_hex());
        if let Some(record) = state.anchor(args.index) {
            println!("  Anchored:   {}", record.merkle_root.to_hex());
        }
    }

    if !matches {
        bail!("batch does not match anchor {}", args.index);
    }
    Ok(())
}

fn cmd_settings(ctx: &Context, args: SettingsArgs) -> anyhow::Result<()> {
    let state = ctx.state()?;
    if !args.is_update() {
        return print_settings(ctx, state.settings());
    }

    let mut settings = state.settings().clone();
    if let Some(enforce) = args.enforce_window_order {
        settings.enforce_window_order = enforce;
    }
    if let Some(len) = args.max_project_id_len {
        settings.max_project_id_len = len;
    }
    if let (Some(num_uints), Some(num_byte_slices)) = (args.schema_uints, args.schema_byte_slices) {
        settings.schema = Some(StateSchema {
            num_uints,
            num_byte_slices,
        });
    }
    if args.no_schema {
        settings.schema = None;
    }

    ctx.execute(Transition::UpdateSettings {
        settings: settings.clone(),
    })?;
    if !ctx.json() {
        println!("{} Settings updated", "✓".green().bold());
    }
    print_settings(ctx, &settings)
}

fn cmd_clear_state(ctx: &Context) -> anyhow::Result<()> {
    let output = ctx.execute(Transition::ClearState)?;
    if ctx.json() {
        return print_json(&output);
    }
    match output {
        TransitionOutput::StateCleared { existed: false } => println!("No local state to clear."),
        _ => println!("{} Local state cleared", "✓".green().bold()),
    }
    Ok(())
}

fn cmd_delete(ctx: &Context) -> anyhow::Result<()> {
    let output = ctx.execute(Transition::Delete)?;
    if ctx.json() {
        return print_json(&output);
    }
    println!(
        "{} Ledger deleted; records remain readable",
        "✓".green().bold()
    );
    Ok(())
}

/// Read a batch as canonical leaf bytes.
///
/// JSON records are re-encoded compactly with their key order preserved.
fn load_batch(args: &BatchArgs) -> anyhow::Result<Vec<Vec<u8>>> {
    let text = fs::read_to_string(&args.records)
        .with_context(|| format!("reading {}", args.records.display()))?;

    if args.lines {
        return Ok(text
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(|line| line.as_bytes().to_vec())
            .collect());
    }

    let items: Vec<serde_json::Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array", args.records.display()))?;
    items
        .iter()
        .map(|item| to_leaf_json(item).map_err(Into::into))
        .collect()
}

fn hex_levels(builder: &MerkleBuilder, batch: &[Vec<u8>]) -> Vec<Vec<String>> {
    builder
        .levels(batch)
        .into_iter()
        .map(|level| level.iter().map(hex::encode).collect())
        .collect()
}

fn print_settings(ctx: &Context, settings: &LedgerSettings) -> anyhow::Result<()> {
    if ctx.json() {
        return print_json(settings);
    }
    println!("enforce_window_order = {}", settings.enforce_window_order);
    println!("max_project_id_len = {}", settings.max_project_id_len);
    match &settings.schema {
        Some(schema) => println!(
            "schema = {} uints, {} byte slices ({} anchors max)",
            schema.num_uints,
            schema.num_byte_slices,
            schema.max_anchors()
        ),
        None => println!("schema = unbounded"),
    }
    Ok(())
}

fn print_record(record: &AnchorRecord) {
    println!(
        "{} {}",
        format!("Anchor #{}", record.index).yellow().bold(),
        record.project_id.to_string().bold()
    );
    println!("  Root: {}", record.merkle_root.to_hex());
    println!("  Records: {}", record.record_count);
    println!(
        "  Window: {} .. {} ({}s)",
        format_time(record.window_start),
        format_time(record.window_end),
        record.window_len()
    );
    println!("  Committed: {}", format_time(record.committed_at));
}

fn record_json(record: &AnchorRecord) -> serde_json::Value {
    json!({
        "index": record.index,
        "project_id": record.project_id.to_string(),
        "project_id_hex": hex::encode(record.project_id.as_bytes()),
        "merkle_root": record.merkle_root.to_hex(),
        "record_count": record.record_count,
        "window_start": record.window_start,
        "window_end": record.window_end,
        "committed_at": record.committed_at,
    })
}

fn value_json(value: &StateValue) -> serde_json::Value {
    match value {
        StateValue::Bytes(bytes) => json!({ "bytes": hex::encode(bytes) }),
        StateValue::Uint(v) => json!({ "uint": v }),
    }
}

fn format_time(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
