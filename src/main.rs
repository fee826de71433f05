use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use revio_core::{GitProviderKind, LlmConfig, OutputFormat, RevioConfig};
use revio_review::llm::{ChatModel, LlmClient};
use revio_review::pipeline::CodeSuggestions;
use revio_review::provider::{create_provider, parse_pr_ref, GitProvider};
use revio_review::questions::Questions;

const CONFIG_FILE: &str = ".revio.toml";

#[derive(Parser)]
#[command(
    name = "revio",
    version,
    about = "AI pull-request assistant",
    long_about = "Revio reads a pull request, asks a language model for concrete code\n\
                   suggestions or answers, and posts them back to the PR.\n\n\
                   Examples:\n  \
                     revio improve https://github.com/o/r/pull/7     Post code suggestions\n  \
                     revio improve o/r#7 --extended                  Review large PRs chunk by chunk\n  \
                     revio improve o/r#7 --dry-run --format json     Print suggestions, post nothing\n  \
                     revio ask o/r#7 what does this change break?    Answer a question on the PR\n  \
                     revio init                                      Create a .revio.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .revio.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Git host (auto, github, gitlab); overrides git.provider
    #[arg(long, global = true)]
    provider: Option<GitProviderKind>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate code suggestions for a pull request
    #[command(long_about = "Generate code suggestions for a pull request.\n\n\
        Fetches the PR diff, asks the model for concrete improvements and publishes them\n\
        as committable suggestions (or a summary table with suggestions.summarize).\n\
        Extended mode splits large diffs into chunks and ranks the combined result.\n\n\
        Examples:\n  revio improve https://github.com/o/r/pull/7\n  \
        revio improve https://gitlab.com/g/p/-/merge_requests/3 --extended\n  \
        revio improve o/r#7 --dry-run")]
    Improve {
        /// PR URL or owner/repo#number
        pr: String,
        /// Review the whole diff chunk by chunk
        #[arg(long)]
        extended: bool,
        /// Print the result instead of posting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Answer a question about a pull request
    #[command(long_about = "Answer a free-text question about a pull request.\n\n\
        The answer is posted as a PR comment in the form 'Question: ... Answer: ...'.\n\n\
        Examples:\n  revio ask o/r#7 is the new cache thread safe?\n  \
        revio ask o/r#7 --dry-run which tests cover this?")]
    Ask {
        /// PR URL or owner/repo#number
        pr: String,
        /// The question; words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Print the answer instead of posting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Create a default .revio.toml configuration file
    #[command(long_about = "Create a default .revio.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .revio.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# Revio Configuration

[llm]
# api_key = ""                     # default: OPENAI_API_KEY
# model = "gpt-4o"
# fallback_models = ["gpt-4o-mini"]
# base_url = "https://api.openai.com"
# max_input_tokens = 128000
# temperature = 0.2
# timeout_secs = 120

[git]
# provider = "auto"                # auto, github, gitlab
# token = ""                       # default: GITHUB_TOKEN / GH_TOKEN / GITLAB_TOKEN
# github_api_url = "https://api.github.com"
# gitlab_url = "https://gitlab.com"

[suggestions]
# num_code_suggestions = 4
# num_code_suggestions_per_chunk = 8
# auto_extended_mode = false
# max_number_of_calls = 5
# rank_suggestions = false
# rank_extended_suggestions = true
# final_clip_factor = 0.9
# summarize = false
# include_improved_code = true
# extra_instructions = ""

[output]
# publish_output = true
# verbosity_level = 0              # 2 logs prompts and model responses

[filter]
# skip_patterns = ["docs/**"]
# skip_extensions = ["snap"]
"#;

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,revio={level},revio_core={level},revio_difflens={level},revio_review={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RevioConfig> {
    let config = match path {
        Some(path) => RevioConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                RevioConfig::from_file(default_path)?
            } else {
                RevioConfig::default()
            }
        }
    };
    Ok(config)
}

/// Resolve the PR reference and build the git host and model clients.
fn connect(pr: &str, config: &RevioConfig) -> Result<(Arc<dyn GitProvider>, Arc<dyn ChatModel>)> {
    let pr_ref = parse_pr_ref(pr, config.git.provider).map_err(|e| {
        miette::miette!(
            help = "use a PR URL, or owner/repo#number for GitHub",
            "{e}"
        )
    })?;
    tracing::debug!(pr = %pr_ref, "resolved pull request");

    if config.llm.resolve_api_key().is_none() && config.llm.base_url.is_none() {
        miette::bail!(
            help = format!(
                "set {} or llm.api_key in {CONFIG_FILE}",
                LlmConfig::API_KEY_ENV
            ),
            "no API key configured for the model backend"
        );
    }

    let provider = create_provider(&pr_ref, &config.git)?;
    let llm: Arc<dyn ChatModel> = Arc::new(LlmClient::new(&config.llm)?);
    Ok((provider, llm))
}

fn spinner(message: &'static str) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

fn finish(spinner: Option<ProgressBar>, message: &'static str) {
    if let Some(pb) = spinner {
        pb.finish_with_message(message);
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!("revio v{version}, AI suggestions and answers for your pull requests\n");

    println!("Quick start:");
    println!("  revio init                     Create a .revio.toml config file");
    println!("  revio improve <PR>             Post code suggestions on a PR");
    println!("  revio ask <PR> <QUESTION>...   Answer a question about a PR\n");

    println!("Run 'revio --help' for all options.");
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(kind) = cli.provider {
        config.git.provider = kind;
    }

    match cli.command {
        None => print_welcome(),
        Some(Command::Improve {
            pr,
            extended,
            dry_run,
        }) => {
            if dry_run {
                config.output.publish_output = false;
            }
            let (provider, llm) = connect(&pr, &config)?;

            let spinner = spinner("Generating code suggestions...");
            let result = CodeSuggestions::new(provider, llm, config)
                .extended(extended)
                .run()
                .await;
            let run = match result {
                Ok(run) => {
                    finish(spinner, "Done");
                    run
                }
                Err(e) => {
                    finish(spinner, "Failed");
                    return Err(e.into());
                }
            };

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&run).into_diagnostic()?);
                }
                OutputFormat::Markdown => println!("{}", run.to_markdown()),
                OutputFormat::Text => print!("{run}"),
            }
        }
        Some(Command::Ask {
            pr,
            question,
            dry_run,
        }) => {
            if dry_run {
                config.output.publish_output = false;
            }
            let (provider, llm) = connect(&pr, &config)?;

            let spinner = spinner("Preparing answer...");
            let result = Questions::new(provider, llm, config, question.join(" "))
                .run()
                .await;
            let answer = match result {
                Ok(Some(answer)) => {
                    finish(spinner, "Done");
                    answer
                }
                Ok(None) => {
                    finish(spinner, "Failed");
                    miette::bail!(
                        help = "rerun with --verbose to see why each model failed",
                        "no model could answer the question"
                    );
                }
                Err(e) => {
                    finish(spinner, "Failed");
                    return Err(e.into());
                }
            };

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&answer).into_diagnostic()?);
                }
                OutputFormat::Markdown => print!("{}", answer.comment()),
                OutputFormat::Text => println!("{answer}"),
            }
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!(
                    help = "edit the existing file or remove it first",
                    "{CONFIG_FILE} already exists"
                );
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "revio", &mut std::io::stdout());
        }
    }

    Ok(())
}
