//! # docscan CLI
//!
//! Ask a question of the demo document corpus.
//!
//! Usage:
//!   docscan <question>
//!   docscan ask [--offline] [--max-iterations N] [--config scan.json] <question>
//!   docscan pages
//!   docscan config
//!
//! Examples:
//!   docscan --offline "What day is pizza day?"
//!   docscan --stream "What is the retry policy for the payments service?"
//!   docscan --max-iterations 3 --json "When is pizza day?"

use clap::{Args, Parser, Subcommand};
use docscan_agent::{AgentConfig, AgentResult, DocAgent, LlmEvaluator, LlmSynthesizer};
use docscan_core::{
    AnswerSynthesizer, CancelFlag, DocumentSource, ExtractiveSynthesizer, KeywordEvaluator,
    LlmProvider, OpenAIProvider, PageEvaluator, ProviderConfig, Result, ScanConfig, StaticSource,
    DEMO_PAGES,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docscan")]
#[command(author, version, about = "docscan - answer questions by reading every page in order")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Question to ask (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    question: Vec<String>,

    #[command(flatten)]
    scan: ScanArgs,

    /// Enable verbose output (debug logs and all notes)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only show final answer
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question
    Ask {
        /// The question
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
    },
    /// List the demo corpus
    Pages,
    /// Print the effective scan configuration as JSON
    Config,
}

#[derive(Args)]
struct ScanArgs {
    /// Use the keyword evaluator and extractive synthesizer, no model calls
    #[arg(long, global = true)]
    offline: bool,

    /// Maximum pages to evaluate before answering
    #[arg(short = 'n', long, global = true)]
    max_iterations: Option<usize>,

    /// Scan configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model name (overrides DOCSCAN_MODEL)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible endpoint (overrides OPENAI_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Stream the answer as it is written
    #[arg(long, global = true, conflicts_with = "json")]
    stream: bool,

    /// Print the full result as JSON
    #[arg(long, global = true)]
    json: bool,
}

impl ScanArgs {
    /// Configuration file (or defaults), then flag overrides
    fn scan_config(&self) -> Result<ScanConfig> {
        let config = match &self.config {
            Some(path) => ScanConfig::from_file(path)?,
            None => ScanConfig::default(),
        };
        let config = match self.max_iterations {
            Some(n) => config.with_max_iterations(n),
            None => config,
        };
        config.validate()?;
        Ok(config)
    }

    fn provider_config(&self) -> Result<ProviderConfig> {
        let config = match (ProviderConfig::from_env(), &self.base_url) {
            (Ok(config), Some(url)) => config.with_base_url(url),
            (Ok(config), None) => config,
            // A base URL alone is enough for a local server
            (Err(_), Some(url)) => ProviderConfig::local(
                url,
                self.model
                    .as_deref()
                    .unwrap_or(docscan_core::provider::DEFAULT_OPENAI_MODEL),
            ),
            (Err(e), None) => return Err(e),
        };
        Ok(match &self.model {
            Some(model) => config.with_model(model),
            None => config,
        })
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "warn,docscan=debug"
    } else if quiet {
        "warn"
    } else {
        "warn,docscan=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// What a Ctrl-C does given the scan's cancel state
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    /// First press: stop before the next page and answer from the notes
    Cancel,
    /// Second press: the current page may take minutes, give up now
    Exit,
}

fn on_interrupt(cancel: &CancelFlag) -> Interrupt {
    if cancel.is_cancelled() {
        Interrupt::Exit
    } else {
        cancel.cancel();
        Interrupt::Cancel
    }
}

/// Cancel the scan on the first Ctrl-C, exit on the second
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            match on_interrupt(&flag) {
                Interrupt::Cancel => eprintln!(
                    "\nInterrupted, answering from the pages read so far (Ctrl-C again to quit)..."
                ),
                Interrupt::Exit => {
                    eprintln!("\nAborted.");
                    std::process::exit(130);
                }
            }
        }
    });
    cancel
}

async fn run_question(question: &str, args: &ScanArgs, verbose: bool, quiet: bool) -> Result<()> {
    let config = AgentConfig {
        scan: args.scan_config()?,
        verbose: !quiet && !args.json,
    };
    let cancel = cancel_on_ctrl_c();

    if args.offline {
        let agent = DocAgent::with_config(
            StaticSource::demo(),
            KeywordEvaluator::new(),
            ExtractiveSynthesizer,
            config,
        )
        .with_cancel(cancel);
        let result = agent.ask(question).await?;
        print_result(&result, args, verbose, quiet, false);
        return Ok(());
    }

    let provider = OpenAIProvider::new(args.provider_config()?)
        .map_err(|e| e.into_error("cli::provider"))?;
    let provider = Arc::new(provider);
    if !quiet && !args.json {
        println!("Model: {}\n", provider.default_model());
    }

    let evaluator = LlmEvaluator::new(provider.clone());
    let synthesizer = LlmSynthesizer::new(provider);

    if !args.stream {
        let agent = DocAgent::with_config(StaticSource::demo(), evaluator, synthesizer, config)
            .with_cancel(cancel);
        let result = agent.ask(question).await?;
        print_result(&result, args, verbose, quiet, false);
        return Ok(());
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        let mut first = true;
        while let Some(delta) = rx.recv().await {
            if first && !quiet {
                println!("\n--- ANSWER ---\n");
            }
            first = false;
            print!("{}", delta);
            let _ = stdout.flush();
        }
        if !first {
            println!();
        }
        !first
    });

    let result = ask_and_drop(
        DocAgent::with_config(
            StaticSource::demo(),
            evaluator,
            synthesizer.with_stream_sink(tx),
            config,
        )
        .with_cancel(cancel),
        question,
    )
    .await;
    // The sender went away with the agent, so the printer has drained.
    // Nothing was streamed when the model was never asked.
    let streamed = printer.await.unwrap_or(false);

    print_result(&result?, args, verbose, quiet, streamed);
    Ok(())
}

/// Run `ask` and drop the agent, closing any stream sink it holds
async fn ask_and_drop<S, E, Y>(agent: DocAgent<S, E, Y>, question: &str) -> Result<AgentResult>
where
    S: DocumentSource,
    E: PageEvaluator,
    Y: AnswerSynthesizer,
{
    agent.ask(question).await
}

fn print_result(result: &AgentResult, args: &ScanArgs, verbose: bool, quiet: bool, streamed: bool) {
    if args.json {
        match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing result: {}", e),
        }
        return;
    }

    if !streamed {
        if !quiet {
            println!("\n--- ANSWER ---\n");
        }
        println!("{}", result.answer);
    }

    if result.truncated && !quiet {
        println!(
            "\nNote: scan {} after {} of {} pages; later pages were not read.",
            result.outcome.label(),
            result.pages_scanned,
            result.pages_total
        );
    }

    if verbose {
        println!("\n--- Notes ({}) ---", result.notes.len());
        for (i, note) in result.notes.iter().enumerate() {
            println!("  {:2}. {}", i + 1, note);
        }
        for failure in &result.failures {
            println!(
                "  page {} failed ({}, {} attempts): {}",
                failure.index, failure.kind, failure.attempts, failure.message
            );
        }
    }
}

fn list_pages() {
    println!("Demo corpus ({} pages):\n", DEMO_PAGES.len());
    for (i, page) in DEMO_PAGES.iter().enumerate() {
        println!("--- page {} ---\n{}\n", i + 1, page);
    }
}

fn show_config(args: &ScanArgs) -> Result<()> {
    let config = args.scan_config()?;
    let json = serde_json::to_string_pretty(&config).map_err(|e| {
        docscan_core::Error::unexpected("failed to serialize configuration").set_source(e)
    })?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let outcome = match cli.command {
        Some(Commands::Pages) => {
            list_pages();
            Ok(())
        }
        Some(Commands::Config) => show_config(&cli.scan),
        Some(Commands::Ask { question }) => {
            run_question(&question.join(" "), &cli.scan, cli.verbose, cli.quiet).await
        }
        None => {
            if cli.question.is_empty() {
                eprintln!("Error: No question provided.");
                eprintln!("Usage: docscan [OPTIONS] <QUESTION>...");
                eprintln!("       docscan ask <QUESTION>...");
                eprintln!("       docscan pages");
                eprintln!("       docscan config");
                eprintln!("\nExamples:");
                eprintln!("  docscan --offline \"What day is pizza day?\"");
                eprintln!("  docscan --stream \"What is the retry policy?\"");
                std::process::exit(1);
            }
            run_question(&cli.question.join(" "), &cli.scan, cli.verbose, cli.quiet).await
        }
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_question() {
        let cli = Cli::parse_from(["docscan", "--offline", "What", "day", "is", "pizza", "day?"]);
        assert!(cli.command.is_none());
        assert!(cli.scan.offline);
        assert_eq!(cli.question.join(" "), "What day is pizza day?");
    }

    #[test]
    fn test_parse_ask_with_flags() {
        let cli = Cli::parse_from(["docscan", "ask", "-n", "3", "--json", "when", "is", "pizza"]);
        match cli.command {
            Some(Commands::Ask { question }) => assert_eq!(question, ["when", "is", "pizza"]),
            _ => panic!("expected ask"),
        }
        assert_eq!(cli.scan.max_iterations, Some(3));
        assert!(cli.scan.json);
    }

    #[test]
    fn test_stream_conflicts_with_json() {
        assert!(Cli::try_parse_from(["docscan", "--stream", "--json", "q"]).is_err());
    }

    #[test]
    fn test_second_interrupt_exits() {
        let cancel = CancelFlag::new();
        assert_eq!(on_interrupt(&cancel), Interrupt::Cancel);
        assert!(cancel.is_cancelled());
        assert_eq!(on_interrupt(&cancel), Interrupt::Exit);
    }

    #[test]
    fn test_max_iterations_flag_overrides_default() {
        let cli = Cli::parse_from(["docscan", "config", "--max-iterations", "4"]);
        let config = cli.scan.scan_config().unwrap();
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
