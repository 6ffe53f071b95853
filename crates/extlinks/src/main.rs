use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use extlinks_core::config::{ExtlinksConfig, load_config};
use extlinks_core::delimit::delimit;
use extlinks_core::namespace::namespace_id;
use extlinks_core::pages::{read_page, scan_pages, write_page};
use extlinks_core::params::{ParameterMap, extract_parameters};
use extlinks_core::policy::edit_summary;
use extlinks_core::processor::{ArticleEdit, SkipReason, process_article};
use extlinks_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_runtime_ready_for_batch,
    init_layout, inspect_runtime, normalize_for_display, resolve_paths, write_text_file,
};
use serde::Serialize;
use similar::TextDiff;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "EXTLINKS_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "extlinks",
    version,
    about = "Migrate template parameters out of External links sections"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Log debug events to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create wiki_content/ and .extlinks/config.toml")]
    Init(InitArgs),
    #[command(about = "Process a single article")]
    Process(ProcessArgs),
    #[command(about = "Process every page under wiki_content/")]
    Run(RunArgs),
    #[command(about = "Print the parameters of one template invocation")]
    Params(ParamsArgs),
    #[command(about = "Print resolved paths and the effective task")]
    Config,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct OutputArgs {
    #[arg(long, help = "Save committed edits")]
    write: bool,
    #[arg(long, help = "Print a unified diff of committed edits")]
    diff: bool,
    #[arg(long, help = "Print results as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ProcessArgs {
    #[arg(value_name = "FILE", help = "Article file, or - for stdin")]
    input: String,
    #[arg(long, help = "Article title")]
    title: String,
    #[arg(long, help = "Namespace id (derived from the title when omitted)")]
    namespace: Option<i32>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, value_name = "N", help = "Stop after N committed edits")]
    limit: Option<usize>,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct ParamsArgs {
    #[arg(value_name = "FILE", help = "Invocation file, or - for stdin")]
    input: String,
    #[arg(long, help = "Also print the tagged delimited form")]
    tagged: bool,
    #[arg(long, help = "Print results as JSON")]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ProcessReport<'a> {
    title: &'a str,
    namespace_id: i32,
    wrote: bool,
    #[serde(flatten)]
    edit: &'a ArticleEdit,
}

#[derive(Debug, Serialize)]
struct RunEntry {
    relative_path: String,
    title: String,
    skip: bool,
    skip_reason: Option<SkipReason>,
    invocations: usize,
    wrote: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    summary: String,
    pages: usize,
    edited: usize,
    skipped: BTreeMap<&'static str, usize>,
    entries: Vec<RunEntry>,
}

#[derive(Debug, Serialize)]
struct ParamsReport<'a> {
    parameters: &'a ParameterMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    tagged: Option<String>,
    passes: usize,
    residue: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Process(args)) => run_process(&runtime, args),
        Some(Commands::Run(args)) => run_batch(&runtime, args),
        Some(Commands::Params(args)) => run_params(args),
        Some(Commands::Config) => run_config(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized extlinks layout");
    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!(
        "wiki_content: {}",
        normalize_for_display(&paths.wiki_content_dir)
    );
    println!("state_dir: {}", normalize_for_display(&paths.state_dir));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_process(runtime: &RuntimeOptions, args: ProcessArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_task_config(&paths)?;
    let title = args.title.trim();
    if title.is_empty() {
        bail!("process requires a non-empty --title");
    }
    let from_stdin = args.input == "-";
    if from_stdin && args.output.write {
        bail!("--write needs a file path, not stdin");
    }

    let article = read_input(&args.input)?;
    let namespace_id = args
        .namespace
        .unwrap_or_else(|| namespace_id(title, &config.wiki.custom_namespaces));
    let edit = process_article(&config, &article, title, namespace_id);

    let mut wrote = false;
    if !edit.skip && args.output.write {
        wrote = write_text_file(Path::new(&args.input), &saved_text(&article, &edit), true)?;
        info!(path = %args.input, "saved edit");
    }

    if args.output.json {
        let report = ProcessReport {
            title,
            namespace_id,
            wrote,
            edit: &edit,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("title: {title}");
    println!("namespace_id: {namespace_id}");
    println!("invocations: {}", edit.invocations);
    println!("skip: {}", format_flag(edit.skip));
    println!(
        "skip_reason: {}",
        edit.skip_reason.map_or("<none>", SkipReason::as_str)
    );
    println!("summary: {}", edit.summary);
    println!("wrote: {}", format_flag(wrote));
    if args.output.diff && !edit.skip {
        print_diff(title, &article, &saved_text(&article, &edit));
    }
    if from_stdin && !edit.skip && !args.output.diff {
        println!();
        println!("{}", edit.text);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_batch(runtime: &RuntimeOptions, args: RunArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    ensure_runtime_ready_for_batch(&paths, &status)?;
    let config = load_task_config(&paths)?;
    let pages = scan_pages(&paths, &config.wiki.custom_namespaces)?;

    let mut report = RunReport {
        summary: edit_summary(&config.task),
        pages: 0,
        edited: 0,
        skipped: BTreeMap::new(),
        entries: Vec::new(),
    };
    for page in &pages {
        if args.limit.is_some_and(|limit| report.edited >= limit) {
            debug!(limit = ?args.limit, "edit limit reached");
            break;
        }
        let article = read_page(page)?;
        let edit = process_article(&config, &article, &page.title, page.namespace_id);
        report.pages += 1;

        let mut wrote = false;
        match edit.skip_reason {
            Some(reason) => *report.skipped.entry(reason.as_str()).or_insert(0) += 1,
            None => {
                report.edited += 1;
                let saved = saved_text(&article, &edit);
                if args.output.diff && !args.output.json {
                    print_diff(&page.relative_path, &article, &saved);
                }
                if args.output.write {
                    write_page(&paths, page, &saved)?;
                    wrote = true;
                }
            }
        }
        report.entries.push(RunEntry {
            relative_path: page.relative_path.clone(),
            title: page.title.clone(),
            skip: edit.skip,
            skip_reason: edit.skip_reason,
            invocations: edit.invocations,
            wrote,
        });
    }

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for entry in report.entries.iter().filter(|entry| !entry.skip) {
        println!("edit: {} ({})", entry.relative_path, entry.title);
    }
    println!("summary: {}", report.summary);
    println!("pages: {}", report.pages);
    println!("edited: {}", report.edited);
    println!("written: {}", format_flag(args.output.write));
    if report.skipped.is_empty() {
        println!("skipped: 0");
    } else {
        for (reason, count) in &report.skipped {
            println!("skipped.{reason}: {count}");
        }
    }
    for warning in &status.warnings {
        println!("warning: {warning}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_params(args: ParamsArgs) -> Result<()> {
    let input = read_input(&args.input)?;
    let invocation = input.trim();
    let delimited = delimit(invocation);
    let parameters = extract_parameters(&delimited);
    let tagged = args.tagged.then(|| delimited.to_tagged());

    if args.json {
        let report = ParamsReport {
            parameters: &parameters,
            tagged,
            passes: delimited.passes(),
            residue: delimited.has_residue(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("parameters.count: {}", parameters.len());
    for (key, value) in parameters.iter() {
        println!("parameter.{key}: {value}");
    }
    if let Some(tagged) = tagged {
        println!("tagged: {tagged}");
    }
    println!("passes: {}", delimited.passes());
    println!("residue: {}", format_flag(delimited.has_residue()));
    Ok(())
}

fn run_config(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    let config = load_task_config(&paths)?;
    let task = &config.task;

    println!("project_root: {}", normalize_for_display(&paths.project_root));
    println!("config_path: {}", normalize_for_display(&paths.config_path));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "wiki_content_exists: {}",
        format_flag(status.wiki_content_exists)
    );
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("task.target_template: {}", task.target_template);
    println!("task.aliases: {}", format_list(&task.aliases));
    println!(
        "task.remove_parameters: {}",
        format_list(&task.remove_parameters)
    );
    println!(
        "task.pagename_parameters: {}",
        format_list(&task.pagename_parameters)
    );
    if task.rename.is_empty() {
        println!("task.rename: <none>");
    }
    for rule in &task.rename {
        println!("task.rename: {} -> {}", rule.from, rule.to);
    }
    println!(
        "task.request_oldid: {}",
        task.request_oldid().unwrap_or("<none>")
    );
    println!("task.duplicate_policy: {}", task.duplicate_policy.as_str());
    println!(
        "wiki.custom_namespaces: {}",
        config.wiki.custom_namespaces.len()
    );
    println!("summary: {}", edit_summary(task));
    for warning in &status.warnings {
        println!("warning: {warning}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn load_task_config(paths: &ResolvedPaths) -> Result<ExtlinksConfig> {
    let config = load_config(&paths.config_path)?.resolved();
    config.validate()?;
    Ok(config)
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(input).with_context(|| format!("failed to read {input}"))
}

/// Edited text as saved to disk, keeping the file's trailing newline.
fn saved_text(original: &str, edit: &ArticleEdit) -> String {
    let mut text = edit.text.clone();
    if original.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn print_diff(label: &str, before: &str, after: &str) {
    let diff = TextDiff::from_lines(before, after);
    print!(
        "{}",
        diff.unified_diff()
            .context_radius(3)
            .header(&format!("a/{label}"), &format!("b/{label}"))
    );
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn format_list(values: &[String]) -> String {
    if values.is_empty() {
        "<none>".to_string()
    } else {
        values.join(", ")
    }
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
