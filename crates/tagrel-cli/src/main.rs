//! Tagrel CLI
//!
//! Command-line front end for:
//! - next-tag suggestions for a partial tag set (`suggest`)
//! - the relation review loop: inferred candidates, confirm / deny, and
//!   management of the stored relation table (`relations ...`)
//! - corpus tag counts (`counts`)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tagrel_core::{
    pair_cooccurrence, relation_overview, tag_counts, CandidateSuggestion, InferRequest,
    RelationInferenceEngine, RelationType, SuggestedDirection, SuggestionRanker, TagIndex,
    TagrelConfig,
};
use tagrel_store::{ConfirmRequest, ListQuery, NewRelation, RelationStore, SortBy};
use tracing_subscriber::EnvFilter;

mod corpus;

#[derive(Parser)]
#[command(name = "tagrel")]
#[command(
    author,
    version,
    about = "Tagrel: tag relationship inference and tag suggestions"
)]
struct Cli {
    /// Corpus file: a JSON array of tag arrays, or one tag array per line.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Relation table (JSON). Created on first write.
    #[arg(long, global = true, default_value = "relations.json")]
    relations: PathBuf,

    /// Settings file (`{"engine": {...}, "ranker": {...}}`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Machine-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// More logging (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest tags to add next, given the tags an object already has.
    Suggest {
        /// Current tags; the last one may be incomplete.
        #[arg(required = true)]
        tags: Vec<String>,
        #[arg(long, default_value_t = 10)]
        top: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Review and manage tag relations.
    Relations {
        #[command(subcommand)]
        command: RelationCommands,
    },

    /// Corpus counts; compound tags count the sum of their parts.
    Counts {
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RelationCommands {
    /// Inferred synonym / antonym candidates not yet reviewed.
    Suggest {
        #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
        limit: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
        /// `synonym` or `antonym`; both when omitted.
        #[arg(long = "type")]
        relation_type: Option<String>,
        /// Only pairs involving this tag.
        #[arg(long)]
        force_tag: Option<String>,
    },

    /// List stored relations.
    List(ListArgs),

    /// Store a relation between two tags.
    Confirm {
        tag1: String,
        tag2: String,
        #[arg(long = "type")]
        relation_type: String,
        /// Space-separated context tags.
        #[arg(long, default_value = "")]
        context: String,
        /// Only `tag1 -> tag2` holds.
        #[arg(long)]
        one_way: bool,
        /// Keep the given direction instead of pointing the rarer tag at the broader one.
        #[arg(long)]
        keep_direction: bool,
        #[arg(long, default_value_t = 0.0)]
        confidence: f64,
    },

    /// Mark two tags as unrelated so they are never suggested again.
    Deny { tag1: String, tag2: String },

    Delete { id: u64 },

    /// Change the relation type of a stored relation.
    SetType {
        id: u64,
        relation_type: String,
    },

    /// Change the direction of a stored relation.
    SetDirection {
        id: u64,
        #[arg(long)]
        one_way: bool,
        /// Exchange tag1 and tag2.
        #[arg(long)]
        swap: bool,
    },

    /// Current counts and overlap of a stored relation.
    Chart { id: u64 },
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 30)]
    page_size: usize,
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long, default_value = "created_date_asc")]
    sort_by: String,
    #[arg(long = "type")]
    relation_type: Option<String>,
    #[arg(long)]
    min_count: Option<u64>,
    #[arg(long)]
    max_count: Option<u64>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct Session {
    corpus: Option<PathBuf>,
    relations: PathBuf,
    config: TagrelConfig,
    json: bool,
}

impl Session {
    fn index(&self) -> Result<Arc<TagIndex>> {
        let path = self
            .corpus
            .as_deref()
            .ok_or_else(|| anyhow!("this command needs --corpus <file>"))?;
        Ok(Arc::new(corpus::load_index(path)?))
    }

    fn store(&self) -> Result<Arc<RelationStore>> {
        let store = RelationStore::open(&self.relations)
            .with_context(|| format!("failed to open relations {}", self.relations.display()))?;
        Ok(Arc::new(store))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => TagrelConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TagrelConfig::default(),
    };
    let ctx = Session {
        corpus: cli.corpus,
        relations: cli.relations,
        config,
        json: cli.json,
    };

    match cli.command {
        Commands::Suggest { tags, top, offset } => cmd_suggest(&ctx, &tags, top, offset),
        Commands::Counts { tags } => cmd_counts(&ctx, &tags),
        Commands::Relations { command } => match command {
            RelationCommands::Suggest {
                limit,
                offset,
                relation_type,
                force_tag,
            } => {
                let request = InferRequest::parse(
                    limit,
                    offset,
                    relation_type.as_deref(),
                    force_tag.as_deref(),
                )?;
                cmd_relations_suggest(&ctx, &request)
            }
            RelationCommands::List(args) => cmd_relations_list(&ctx, args),
            RelationCommands::Confirm {
                tag1,
                tag2,
                relation_type,
                context,
                one_way,
                keep_direction,
                confidence,
            } => {
                let relation_type: RelationType = relation_type.parse()?;
                cmd_confirm(
                    &ctx,
                    NewRelation {
                        context_tags: context,
                        bidirectional: !one_way,
                        confidence,
                        ..NewRelation::new(&tag1, &tag2, relation_type)
                    },
                    keep_direction,
                )
            }
            RelationCommands::Deny { tag1, tag2 } => {
                let id = ctx.store()?.deny(&tag1, &tag2)?;
                report_ok(&ctx, id, &format!("{tag1} / {tag2} marked unrelated"))
            }
            RelationCommands::Delete { id } => {
                let removed = ctx.store()?.delete_relation(id)?;
                report_ok(
                    &ctx,
                    id,
                    &format!("deleted {} {} {}", removed.tag1, removed.relation_type, removed.tag2),
                )
            }
            RelationCommands::SetType { id, relation_type } => {
                let relation_type: RelationType = relation_type.parse()?;
                ctx.store()?.update_type(id, relation_type)?;
                report_ok(&ctx, id, &format!("type set to {relation_type}"))
            }
            RelationCommands::SetDirection { id, one_way, swap } => {
                ctx.store()?.update_direction(id, !one_way, swap)?;
                let direction = if one_way { "one-way" } else { "bidirectional" };
                report_ok(&ctx, id, &format!("direction set to {direction}"))
            }
            RelationCommands::Chart { id } => cmd_chart(&ctx, id),
        },
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_ok(ctx: &Session, id: u64, message: &str) -> Result<()> {
    if ctx.json {
        return print_json(&serde_json::json!({ "status": "success", "id": id }));
    }
    eprintln!("{} [{}] {}", "ok".green().bold(), id, message);
    Ok(())
}

fn cmd_suggest(ctx: &Session, tags: &[String], top: usize, offset: usize) -> Result<()> {
    let index = ctx.index()?;
    let store = ctx.store()?;
    let ranker = SuggestionRanker::new(index, store, ctx.config.ranker.clone())?;
    let result = ranker.rank(tags, top, offset)?;

    if ctx.json {
        return print_json(&result);
    }
    println!(
        "{} {} objects",
        "matched".cyan().bold(),
        result.matched_documents
    );
    for s in &result.suggestions {
        let tag = if s.is_synonym {
            s.tag.green().bold()
        } else {
            s.tag.normal()
        };
        println!(
            "  {:<24} {:>10.4}  {}",
            tag,
            s.score,
            format!(
                "count={} co={:.2} rarity={:.2} penalty={:.2}",
                s.count, s.cooccurrence, s.rarity, s.penalty
            )
            .dimmed()
        );
    }
    if result.has_more {
        println!("  {}", format!("more: --offset {}", offset + top).dimmed());
    }
    Ok(())
}

fn cmd_counts(ctx: &Session, tags: &[String]) -> Result<()> {
    let index = ctx.index()?;
    let counts: Vec<(String, u64)> = tags
        .iter()
        .map(|t| (t.clone(), index.display_count(t)))
        .collect();
    if ctx.json {
        let map: serde_json::Map<String, serde_json::Value> = counts
            .into_iter()
            .map(|(t, c)| (t, serde_json::Value::from(c)))
            .collect();
        return print_json(&map);
    }
    for (tag, count) in counts {
        println!("{:<24} {}", tag, count.to_string().bold());
    }
    Ok(())
}

fn direction_label(direction: SuggestedDirection) -> &'static str {
    match direction {
        SuggestedDirection::Bidirectional => "<->",
        SuggestedDirection::OneWay => "->",
        SuggestedDirection::None => "--",
    }
}

fn print_candidate(s: &CandidateSuggestion) {
    let kind = match s.relation_type {
        RelationType::Synonym => "synonym".green(),
        RelationType::Antonym => "antonym".red(),
        RelationType::Unrelated => "unrelated".dimmed(),
    };
    println!(
        "{:>6.1}%  {:<9} {} ({}) {} {} ({})",
        s.confidence,
        kind,
        s.tag1.bold(),
        s.tag1_count,
        direction_label(s.suggested_direction),
        s.tag2.bold(),
        s.tag2_count
    );
    println!("         {}", s.calculation.dimmed());
}

fn cmd_relations_suggest(ctx: &Session, request: &InferRequest) -> Result<()> {
    let index = ctx.index()?;
    let store = ctx.store()?;
    let engine = RelationInferenceEngine::new(index, store, ctx.config.engine.clone())?;
    let suggestions = engine.review_queue(request)?;

    if ctx.json {
        return print_json(&suggestions);
    }
    if suggestions.is_empty() {
        eprintln!("{} no new candidates", "info:".yellow().bold());
    }
    for s in &suggestions {
        print_candidate(s);
    }
    Ok(())
}

fn cmd_relations_list(ctx: &Session, args: ListArgs) -> Result<()> {
    let query = ListQuery {
        page: args.page,
        page_size: args.page_size,
        search: args.search,
        sort_by: args.sort_by.parse::<SortBy>()?,
        filter_type: args
            .relation_type
            .as_deref()
            .map(str::parse::<RelationType>)
            .transpose()?,
        min_count: args.min_count,
        max_count: args.max_count,
    };
    let page = ctx.store()?.list(&query)?;

    if ctx.json {
        return print_json(&page);
    }
    for r in &page.relations {
        let arrow = if r.bidirectional { "<->" } else { "->" };
        let context = if r.context_tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", r.context_tags)
        };
        println!(
            "{:>5}  {:<9} {} ({}) {} {} ({}){}",
            r.id,
            r.relation_type.to_string(),
            r.tag1.bold(),
            r.tag1_count,
            arrow,
            r.tag2.bold(),
            r.tag2_count,
            context.dimmed()
        );
    }
    let by_type: Vec<String> = page
        .stats
        .by_type
        .iter()
        .map(|(t, n)| format!("{t}={n}"))
        .collect();
    println!(
        "{}",
        format!(
            "page {}/{} · {} matching · {} total ({})",
            page.current_page,
            page.total_pages,
            page.total,
            page.stats.total,
            by_type.join(" ")
        )
        .dimmed()
    );
    Ok(())
}

fn cmd_confirm(ctx: &Session, mut relation: NewRelation, keep_direction: bool) -> Result<()> {
    if let Some(path) = ctx.corpus.as_deref() {
        fill_counts(&mut relation, path)?;
    }
    let store = ctx.store()?;
    let id = store.confirm(ConfirmRequest {
        relation,
        user_swapped: keep_direction,
    })?;
    let row = store
        .get(id)
        .ok_or_else(|| anyhow!("relation {id} vanished after write"))?;
    let arrow = if row.bidirectional { "<->" } else { "->" };
    report_ok(
        ctx,
        id,
        &format!("{} {} {} {}", row.relation_type, row.tag1, arrow, row.tag2),
    )
}

fn fill_counts(relation: &mut NewRelation, corpus: &Path) -> Result<()> {
    let index = corpus::load_index(corpus)?;
    let (tag1_count, tag2_count) = tag_counts(&index, &relation.tag1, &relation.tag2);
    relation.tag1_count = tag1_count;
    relation.tag2_count = tag2_count;
    relation.cooccurrence = pair_cooccurrence(&index, &relation.tag1, &relation.tag2);
    Ok(())
}

fn cmd_chart(ctx: &Session, id: u64) -> Result<()> {
    let row = ctx
        .store()?
        .get(id)
        .ok_or_else(|| anyhow!("relation {id} not found"))?;
    let index = ctx.index()?;
    let overview = relation_overview(&index, &row.tag1, &row.tag2, row.cooccurrence);

    if ctx.json {
        return print_json(&overview);
    }
    println!(
        "{} ({}) / {} ({})",
        overview.tag1.bold(),
        overview.tag1_count,
        overview.tag2.bold(),
        overview.tag2_count
    );
    println!("  {:<12} {}", "only tag1", overview.tag1_only);
    println!("  {:<12} {}", "both", overview.cooccurrence.to_string().cyan());
    println!("  {:<12} {}", "only tag2", overview.tag2_only);
    println!("  {:<12} {:.1}%", "overlap", overview.overlap_percentage);
    Ok(())
}
