use std::cmp;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atty::Stream;
use clap::{Parser, Subcommand, ValueEnum};
use fjalor_rs::prefs::{FilePreferences, MemoryPreferences};
use fjalor_rs::{
    Collection, DuplicatePolicy, Entry, EntryIndex, FacetKind, LetterPartition, LoadOptions,
    MemoryLocation, Query, SessionConfig, ViewSession, parse, resolve, snapshot,
};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fjalor-rs", about = "Browse a static Albanian dictionary", version)]
pub struct Cli {
    /// Dataset to load: a JSON collection or a compiled snapshot.
    #[arg(long, global = true, default_value = "data/fjalor.json")]
    dataset: PathBuf,

    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// What to do when two records share an identifier.
    #[arg(long, global = true, value_enum, default_value_t = DuplicateArg::LastWins)]
    duplicates: DuplicateArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DuplicateArg {
    LastWins,
    FirstWins,
    Reject,
}

impl From<DuplicateArg> for DuplicatePolicy {
    fn from(value: DuplicateArg) -> Self {
        match value {
            DuplicateArg::LastWins => DuplicatePolicy::LastWins,
            DuplicateArg::FirstWins => DuplicatePolicy::FirstWins,
            DuplicateArg::Reject => DuplicatePolicy::Reject,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List entries whose headword starts with a prefix, optionally narrowed by facets.
    Search {
        /// Prefix to match; case and diacritics are ignored.
        query: Option<String>,
        #[arg(long)]
        morph_class: Option<String>,
        #[arg(long)]
        formation: Option<String>,
        #[arg(long)]
        neologism: Option<String>,
        /// Maximum number of entries to print.
        #[arg(short, long, default_value_t = 25)]
        limit: usize,
    },
    /// Show the full entry for a word.
    Show { word: String },
    /// List the selectable values of every facet.
    Facets,
    /// Show the alphabet partition of the (optionally filtered) collection.
    Letters { query: Option<String> },
    /// Resolve a location token the way a deep link would.
    Route { token: String },
    /// Compile the dataset into a snapshot file.
    Compile { output: PathBuf },
    /// Read or toggle the persisted display mode.
    Theme {
        #[arg(long)]
        toggle: bool,
        /// Preference file.
        #[arg(long, default_value = "fjalor-prefs.json")]
        prefs: PathBuf,
    },
    /// Serve the read-only HTTP API.
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.command);
    let options = LoadOptions {
        duplicates: cli.duplicates.into(),
        ..LoadOptions::default()
    };
    match cli.command {
        Command::Search {
            query,
            morph_class,
            formation,
            neologism,
            limit,
        } => {
            let mut request = Query::text(query.unwrap_or_default());
            let selected = [
                (FacetKind::MorphClass, morph_class),
                (FacetKind::Formation, formation),
                (FacetKind::Neologism, neologism),
            ];
            for (kind, value) in selected {
                if let Some(value) = value {
                    request.facets.insert(kind, value);
                }
            }
            handle_search(&load(&cli.dataset, &options)?, &request, limit, cli.json)
        }
        Command::Show { word } => handle_show(&load(&cli.dataset, &options)?, &word, cli.json),
        Command::Facets => handle_facets(&load(&cli.dataset, &options)?, cli.json),
        Command::Letters { query } => handle_letters(
            &load(&cli.dataset, &options)?,
            query.as_deref().unwrap_or_default(),
            cli.json,
        ),
        Command::Route { token } => handle_route(load(&cli.dataset, &options)?, &token, cli.json),
        Command::Compile { output } => {
            handle_compile(&load(&cli.dataset, &options)?, &output, cli.json)
        }
        Command::Theme { toggle, prefs } => handle_theme(prefs, toggle, cli.json),
        #[cfg(feature = "web")]
        Command::Serve { addr } => handle_serve(cli.dataset, options, addr),
    }
}

fn init_tracing(command: &Command) {
    let default = match command {
        #[cfg(feature = "web")]
        Command::Serve { .. } => "info",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load(path: &Path, options: &LoadOptions) -> Result<Collection, Box<dyn Error>> {
    let (collection, _) = Collection::open(path, options)?;
    Ok(collection)
}

fn handle_search(
    collection: &Collection,
    query: &Query,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let limit = cmp::max(1, limit);
    let subset = resolve(collection, query);
    let shown: Vec<&Entry> = subset.entries(collection).take(limit).collect();

    if as_json {
        let payload = json!({
            "query": query,
            "total": subset.len(),
            "limit": limit,
            "results": shown,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_search_table(&query.text, &shown, subset.len());
    }
    Ok(())
}

fn handle_show(collection: &Collection, word: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let entry = collection
        .lookup_word(word)
        .ok_or_else(|| format!("No entry found for word {word:?}"))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        print_entry(entry);
    }
    Ok(())
}

fn handle_facets(collection: &Collection, as_json: bool) -> Result<(), Box<dyn Error>> {
    let index = EntryIndex::build(collection);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&index.catalogue)?);
        return Ok(());
    }
    for kind in FacetKind::ALL {
        let values = index.catalogue.values(kind);
        println!("{} ({}):", kind.label(), kind.as_str());
        if values.is_empty() {
            println!("  <none>");
        }
        for value in values {
            println!("  {value}");
        }
    }
    Ok(())
}

fn handle_letters(
    collection: &Collection,
    query: &str,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let subset = resolve(collection, &Query::text(query));
    let partition = LetterPartition::build(collection, &subset);
    let rows: Vec<(char, usize, &str)> = partition
        .iter()
        .map(|(letter, bucket)| {
            let first = bucket
                .first()
                .and_then(|pos| collection.get(*pos))
                .map(Entry::headword)
                .unwrap_or_default();
            (letter, bucket.len(), first)
        })
        .collect();

    if as_json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(letter, count, first)| json!({ "letter": letter, "count": count, "first": first }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No entries.");
        return Ok(());
    }
    println!("{:<6}  {:>5}  {}", "LETTER", "COUNT", "FIRST");
    println!("{:-<6}  {:->5}  {}", "", "", "-----");
    for (letter, count, first) in rows {
        println!("{:<6}  {:>5}  {}", letter.to_uppercase(), count, first);
    }
    Ok(())
}

fn handle_route(collection: Collection, token: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let intent = parse(token);
    let mut session = ViewSession::new(
        SessionConfig::default(),
        MemoryPreferences::default(),
        MemoryLocation::new(token),
    );
    session.finish_load(Ok(Arc::new(collection)));
    let headwords: Vec<&str> = session.active_entries().into_iter().map(Entry::headword).collect();
    let expanded = session.expanded();

    if as_json {
        let payload = json!({
            "intent": intent,
            "canonical": intent.token(),
            "state": session.state(),
            "breadcrumb": session.breadcrumb(),
            "expanded": expanded,
            "count": headwords.len(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    println!("Intent: {intent}");
    println!("Canonical token: {:?}", intent.token());
    if let Some(breadcrumb) = session.breadcrumb() {
        println!("Breadcrumb: {}", breadcrumb.label);
    }
    for id in expanded {
        println!("Expanded: {id}");
    }
    println!("Entries ({}):", headwords.len());
    if let Some(list) = format_list(headwords, 20) {
        println!("  {list}");
    }
    Ok(())
}

fn handle_compile(
    collection: &Collection,
    output: &Path,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let bytes = snapshot::write(output, collection)?;
    if as_json {
        let payload = json!({
            "output": output.display().to_string(),
            "entries": collection.len(),
            "bytes": bytes,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "Wrote {} entries ({bytes} bytes) to {}",
            collection.len(),
            output.display()
        );
    }
    Ok(())
}

fn handle_theme(prefs: PathBuf, toggle: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    let mut session = ViewSession::new(
        SessionConfig::default(),
        FilePreferences::open(prefs),
        MemoryLocation::default(),
    );
    if toggle {
        session.toggle_display_mode();
    }
    let mode = session.display_mode();
    if as_json {
        println!("{}", json!({ "theme": mode }));
    } else {
        println!("{}", mode.as_str());
    }
    Ok(())
}

#[cfg(feature = "web")]
fn handle_serve(
    dataset: PathBuf,
    load: LoadOptions,
    addr: std::net::SocketAddr,
) -> Result<(), Box<dyn Error>> {
    let config = fjalor_rs::web::WebConfig {
        addr,
        dataset,
        load,
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(fjalor_rs::web::serve(config))?;
    Ok(())
}

fn print_search_table(query: &str, rows: &[&Entry], total: usize) {
    if rows.is_empty() {
        println!("No entries matched \"{query}\".");
        return;
    }
    let width = rows
        .iter()
        .map(|entry| entry.headword().chars().count())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<width$}  {}", "WORD", "KLASA MORF.", width = width);
    println!("{:-<width$}  {}", "", "-----------", width = width);
    for entry in rows {
        let classes: Vec<&str> = entry.facets().values(FacetKind::MorphClass).collect();
        let padding = width - entry.headword().chars().count();
        println!(
            "{}{:padding$}  {}",
            entry.headword(),
            "",
            classes.join(", "),
            padding = padding
        );
    }
    if total > rows.len() {
        println!("… {} more", total - rows.len());
    }
}

fn print_entry(entry: &Entry) {
    println!("{}", entry.headword());
    println!("Link: #entry/{}", entry.id());
    for kind in FacetKind::ALL {
        let values: Vec<&str> = entry.facets().values(kind).collect();
        if let Some(list) = format_list(values, 6) {
            println!("{}: {list}", kind.label());
        }
    }
    let mut body = String::new();
    for (idx, definition) in entry.definitions().iter().enumerate() {
        body.push_str(&format!("{}. {}\n", idx + 1, definition.meaning));
        if let Some(example) = &definition.example {
            body.push_str(&format!("   *{example}*\n"));
        }
    }
    render_markdown_block("Definitions", &body);
}

fn format_list(items: Vec<&str>, limit: usize) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let truncated = items.len() > limit;
    let display = if truncated { &items[..limit] } else { &items[..] };
    let mut text = display.join(", ");
    if truncated {
        text.push_str(", …");
    }
    Some(text)
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
