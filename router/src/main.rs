use anyhow::Result;
use clap::Parser;
use open_qa_backend::ReaderKind;
use open_qa_core::config::GroupLength;
use std::path::PathBuf;
use std::time::Duration;
use veil::Redact;

/// App Configuration
#[derive(Parser, Redact)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Corpus to answer from, one `{"id": ..., "text": ...}` JSON object per line
    #[clap(long, env)]
    corpus: PathBuf,

    /// Optional `tokenizer.json` used to annotate questions and passages.
    /// Without it, texts are split into words and punctuation.
    #[clap(long, env)]
    tokenizer: Option<PathBuf>,

    /// URL of the reader service
    #[clap(default_value = "http://127.0.0.1:8080", long, env)]
    reader_url: String,

    /// How the reader indexes answer spans
    #[clap(default_value = "word-tagging", long, env, value_enum)]
    reader_kind: ReaderKind,

    /// Bearer token sent to the reader service
    #[clap(long, env)]
    #[redact(partial)]
    reader_api_key: Option<String>,

    /// Reader request timeout in seconds
    #[clap(default_value = "60", long, env)]
    reader_timeout: u64,

    /// Maximum number of examples in a reader batch
    #[clap(default_value = "32", long, env)]
    batch_size: usize,

    /// How paragraphs are grouped into passages: `paragraph`, `document`
    /// or a number of characters
    #[clap(default_value = "paragraph", long, env)]
    group_length: String,

    /// Number of annotation workers.
    /// Default to the number of CPU cores on the machine.
    #[clap(long, env)]
    workers: Option<usize>,

    /// Answers returned per question
    #[clap(default_value = "1", long, env)]
    top_n: usize,

    /// Documents retrieved per question
    #[clap(default_value = "5", long, env)]
    n_docs: usize,

    /// Include the passage around each answer
    #[clap(long, env)]
    return_context: bool,

    /// Answer restriction list applied to every question, one candidate per line
    #[clap(long, env)]
    candidates_file: Option<PathBuf>,

    /// Number of questions processed together
    #[clap(default_value = "128", long, env)]
    query_batch_size: usize,

    /// Questions, one per line, as plain text or `{"question": ..., "candidates": [...]}`
    #[clap(long, env)]
    input: PathBuf,

    /// Where predictions are written as JSON lines. Default to stdout.
    #[clap(long, env)]
    output: Option<PathBuf>,

    /// Outputs the logs in JSON format (useful for telemetry)
    #[clap(long, env)]
    json_output: bool,

    // Whether or not to include the log trace through spans
    #[clap(long, env)]
    disable_spans: bool,

    /// The Prometheus port to listen on.
    #[clap(default_value = "9000", long, env)]
    prometheus_port: u16,
}

impl Args {
    pub fn parse_group_length(&self) -> Result<GroupLength> {
        Ok(self.group_length.parse()?)
    }
}


#[tokio::main]
async fn main() -> Result<()> {
    // Pattern match configuration
    let args: Args = Args::parse();

    // Initialize logging
    open_qa_router::init_logging(args.json_output, args.disable_spans);

    tracing::info!("{args:?}");

    let group_length = args.parse_group_length()?;

    open_qa_router::run(
        args.corpus,
        args.tokenizer,
        args.reader_url,
        args.reader_kind,
        args.reader_api_key,
        Duration::from_secs(args.reader_timeout),
        args.batch_size,
        group_length,
        args.workers,
        args.top_n,
        args.n_docs,
        args.return_context,
        args.candidates_file,
        args.query_batch_size,
        args.input,
        args.output,
        args.prometheus_port,
    )
    .await?;

    Ok(())
}
