use colored::Colorize;
use serde::{Deserialize, Serialize};
use strand_archive::Archive;
use strand_repo::{Commit, Event, Identity, RepoRoot, Tid};

use crate::cli::*;
use crate::workspace::{write_atomic, Workspace};

/// Record body stored for every entry the CLI writes.
#[derive(Debug, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let ws = Workspace::new(&cli.repo, cli.config.as_deref())?;
    match cli.command {
        Command::Init(args) => cmd_init(&ws, args).await,
        Command::Add(args) => cmd_add(&ws, args).await,
        Command::Edit(args) => cmd_edit(&ws, args).await,
        Command::Rm(args) => cmd_rm(&ws, args).await,
        Command::Ls(args) => cmd_ls(&ws, args).await,
        Command::Log(args) => cmd_log(&ws, args).await,
        Command::Export(args) => cmd_export(&ws, args).await,
        Command::Import(args) => cmd_import(&ws, args).await,
        Command::Inspect(args) => cmd_inspect(&ws, args).await,
    }
}

async fn cmd_init(ws: &Workspace, args: InitArgs) -> anyhow::Result<()> {
    let repo = ws.init(args.did.map(Identity::new)).await?;
    println!(
        "{} Initialized Strand repository in {}",
        "✓".green().bold(),
        ws.dir().display().to_string().bold()
    );
    println!("  Identity: {}", repo.did().to_string().cyan());
    println!("  Commit: {}", repo.cid().short_hex().yellow());
    Ok(())
}

async fn cmd_add(ws: &Workspace, args: AddArgs) -> anyhow::Result<()> {
    let mut repo = ws.open().await?;
    let record = repo.put_record(&Note { text: args.text }).await?;
    let tid = Tid::next();
    let commit = repo
        .add_entry(&args.namespace, args.collection, tid, record)
        .await?;
    ws.save(&repo).await?;
    println!(
        "{} Added {}/{} {}",
        "✓".green().bold(),
        args.namespace.bold(),
        args.collection,
        tid.to_string().yellow()
    );
    println!("  Commit: {}", commit.short_hex().yellow());
    Ok(())
}

async fn cmd_edit(ws: &Workspace, args: EditArgs) -> anyhow::Result<()> {
    let mut repo = ws.open().await?;
    let record = repo.put_record(&Note { text: args.text }).await?;
    let commit = repo
        .edit_entry(&args.namespace, args.collection, args.tid, record)
        .await?;
    ws.save(&repo).await?;
    println!(
        "{} Edited {}/{} {}",
        "✓".green().bold(),
        args.namespace.bold(),
        args.collection,
        args.tid.to_string().yellow()
    );
    println!("  Commit: {}", commit.short_hex().yellow());
    Ok(())
}

async fn cmd_rm(ws: &Workspace, args: RmArgs) -> anyhow::Result<()> {
    let mut repo = ws.open().await?;
    let commit = repo
        .delete_entry(&args.namespace, args.collection, args.tid)
        .await?;
    ws.save(&repo).await?;
    println!(
        "{} Deleted {}/{} {}",
        "✓".green().bold(),
        args.namespace.bold(),
        args.collection,
        args.tid.to_string().yellow()
    );
    println!("  Commit: {}", commit.short_hex().yellow());
    Ok(())
}

async fn cmd_ls(ws: &Workspace, args: LsArgs) -> anyhow::Result<()> {
    let repo = ws.open().await?;
    let Some(namespace) = args.namespace else {
        let names = repo.namespace_names();
        if names.is_empty() {
            println!("No namespaces.");
        }
        for name in names {
            println!("{}", name.bold());
        }
        return Ok(());
    };

    let entries = repo
        .get_entries(&namespace, args.collection, args.limit, args.from)
        .await?;
    if entries.is_empty() {
        println!("No entries in {}/{}.", namespace.bold(), args.collection);
    }
    for entry in entries {
        let note: Note = repo.get_record(&entry.cid).await?;
        println!(
            "{}  {}  {}",
            entry.tid.to_string().yellow(),
            entry.cid.short_hex().dimmed(),
            note.text
        );
    }
    Ok(())
}

async fn cmd_log(ws: &Workspace, args: LogArgs) -> anyhow::Result<()> {
    let repo = ws.open().await?;
    let mut cursor = Some(repo.cid());
    let mut shown = 0;
    while let Some(cid) = cursor {
        if shown >= args.limit {
            break;
        }
        let commit: Commit = repo.get_record(&cid).await?;
        let root: RepoRoot = repo.get_record(&commit.root).await?;
        let marker = if shown == 0 { " (head)".green().to_string() } else { String::new() };
        println!("{}{}", cid.short_hex().yellow().bold(), marker);
        println!(
            "  {} namespaces, {} new blocks",
            root.namespaces.len(),
            root.new_cids.len()
        );
        cursor = root.prev;
        shown += 1;
    }
    Ok(())
}

async fn cmd_export(ws: &Workspace, args: ExportArgs) -> anyhow::Result<()> {
    let repo = ws.open().await?;
    let (kind, bytes) = if args.snapshot {
        ("snapshot", repo.export_snapshot().await?)
    } else {
        ("diff", repo.export_diff(args.since).await?)
    };
    write_atomic(&args.output, &bytes)?;
    println!(
        "{} Exported {} of {} to {} ({} bytes)",
        "✓".green().bold(),
        kind,
        repo.cid().short_hex().yellow(),
        args.output.display().to_string().bold(),
        bytes.len()
    );
    Ok(())
}

async fn cmd_import(ws: &Workspace, args: ImportArgs) -> anyhow::Result<()> {
    let mut repo = ws.open().await?;
    let bytes = std::fs::read(&args.input)?;
    let from = repo.cid();
    if args.verify {
        let events = repo.load_and_verify_diff(&bytes).await?;
        for event in &events {
            print_event(event);
        }
        println!("  {} events", events.len());
    } else {
        repo.import_archive(&bytes).await?;
    }
    ws.save(&repo).await?;
    println!(
        "{} Imported {} → {}",
        "✓".green().bold(),
        from.short_hex().dimmed(),
        repo.cid().short_hex().yellow()
    );
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::AddedObject {
            namespace,
            collection,
            tid,
            ..
        } => println!("  {} {namespace}/{collection} {tid}", "+".green()),
        Event::UpdatedObject {
            namespace,
            collection,
            tid,
            ..
        } => println!("  {} {namespace}/{collection} {tid}", "~".yellow()),
        Event::DeletedObject {
            namespace,
            collection,
            tid,
        } => println!("  {} {namespace}/{collection} {tid}", "-".red()),
        Event::DeletedNamespace { namespace } => println!("  {} {namespace}", "-".red().bold()),
    }
}

async fn cmd_inspect(ws: &Workspace, args: InspectArgs) -> anyhow::Result<()> {
    let Some(input) = args.input else {
        return inspect_repo(ws).await;
    };
    let bytes = std::fs::read(&input)?;
    let archive = Archive::from_bytes(&bytes)?;
    let total: usize = archive.blocks.iter().map(|(_, data)| data.len()).sum();
    println!("Archive {}", input.display().to_string().bold());
    for root in &archive.roots {
        println!("  Root: {}", root.to_hex().yellow());
    }
    println!("  Blocks: {} ({} bytes)", archive.blocks.len(), total);
    Ok(())
}

async fn inspect_repo(ws: &Workspace) -> anyhow::Result<()> {
    let repo = ws.open().await?;
    println!("Repository {}", ws.dir().display().to_string().bold());
    println!("  Identity: {}", repo.did().to_string().cyan());
    println!("  Commit: {}", repo.cid().to_hex().yellow());
    for (name, cid) in &repo.root().namespaces {
        println!("  Namespace {} → {}", name.bold(), cid.short_hex().dimmed());
    }
    let missing = repo.missing_cids().await?;
    if missing.is_empty() {
        println!("  Blocks: {}", "complete".green());
    } else {
        println!("  Blocks: {} missing", missing.len().to_string().red().bold());
    }
    Ok(())
}
