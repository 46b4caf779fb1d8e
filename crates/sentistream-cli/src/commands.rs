//! Subcommand implementations

use anyhow::{Context, Result};
use sentistream_analyzer::{AnalyzerConfig, CommentProcessor, SentimentAnalyzer};
use sentistream_core::{AnalyzedComment, CommentRecord, ScoredSentiment};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

/// How `analyze` prints results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `label<TAB>text`
    Plain,
    /// `label<TAB>score<TAB>text`
    Scores,
    /// `{"text": ..., "label": ..., "score": ...}` per line
    Json,
}

impl OutputFormat {
    pub fn from_flags(scores: bool, json: bool) -> Self {
        match (json, scores) {
            (true, _) => Self::Json,
            (false, true) => Self::Scores,
            (false, false) => Self::Plain,
        }
    }
}

/// Load the model off the async runtime
async fn load_analyzer(config: AnalyzerConfig) -> Result<SentimentAnalyzer> {
    tokio::task::spawn_blocking(move || SentimentAnalyzer::load(&config))
        .await
        .context("Model loading task panicked")?
        .context("Failed to load sentiment model")
}

/// `analyze`: label texts from the arguments, or from stdin lines
pub async fn analyze(config: AnalyzerConfig, texts: Vec<String>, format: OutputFormat) -> Result<()> {
    let texts = if texts.is_empty() {
        read_lines(BufReader::new(tokio::io::stdin())).await?
    } else {
        texts
    };

    if texts.is_empty() {
        warn!("No input texts");
        return Ok(());
    }

    let analyzer = load_analyzer(config).await?;
    let (texts, results) = tokio::task::spawn_blocking(move || {
        let results = analyzer.predict_labels_with_scores(&texts);
        (texts, results)
    })
    .await
    .context("Inference task panicked")?;
    let results = results.context("Sentiment analysis failed")?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(render_analysis(&texts, &results, format)?.as_bytes())
        .await?;
    stdout.flush().await?;
    Ok(())
}

/// Non-empty lines of `reader`, trailing whitespace removed
async fn read_lines<R: AsyncBufRead + Unpin>(reader: R) -> Result<Vec<String>> {
    let mut lines = reader.lines();
    let mut texts = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if !line.is_empty() {
            texts.push(line.to_string());
        }
    }
    Ok(texts)
}

fn render_analysis(
    texts: &[String],
    results: &[ScoredSentiment],
    format: OutputFormat,
) -> Result<String> {
    let mut out = String::new();
    for (text, result) in texts.iter().zip(results) {
        let line = match format {
            OutputFormat::Plain => format!("{}\t{}", result.label, text),
            OutputFormat::Scores => format!("{}\t{:.4}\t{}", result.label, result.score, text),
            OutputFormat::Json => serde_json::to_string(&serde_json::json!({
                "text": text,
                "label": result.label,
                "score": result.score,
            }))?,
        };
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// `process`: enrich a JSON-lines comment stream, stdin to stdout
pub async fn process(
    config: AnalyzerConfig,
    input: Option<PathBuf>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let analyzer = Arc::new(load_analyzer(config.clone()).await?);
    let processor = CommentProcessor::from_config(analyzer, &config);
    let stdout = tokio::io::stdout();

    let stats = match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            process_stream(&processor, BufReader::new(file), stdout, shutdown).await?
        }
        None => {
            process_stream(&processor, BufReader::new(tokio::io::stdin()), stdout, shutdown)
                .await?
        }
    };

    info!(
        records = stats.records,
        analyzed = stats.analyzed,
        skipped = stats.skipped,
        malformed = stats.malformed,
        failed = stats.failed,
        "Comment stream finished"
    );
    Ok(())
}

/// Counters for one `process` run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    /// Valid records read
    pub records: usize,
    /// Records labeled
    pub analyzed: usize,
    /// Records without text
    pub skipped: usize,
    /// Lines that were not valid records
    pub malformed: usize,
    /// Records emitted unlabeled after a failed batch
    pub failed: usize,
}

/// Read records line by line, analyze them in batches and write enriched
/// records in input order. Stops at end of input or when `shutdown`
/// resolves, flushing whatever is pending.
async fn process_stream<R, W>(
    processor: &CommentProcessor,
    reader: R,
    mut writer: W,
    shutdown: impl Future<Output = ()>,
) -> Result<ProcessStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut pending: Vec<CommentRecord> = Vec::with_capacity(processor.batch_size());
    let mut stats = ProcessStats::default();
    let mut line_number = 0usize;

    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(pending = pending.len(), "Stopping, flushing pending comments");
                break;
            }
            line = lines.next_line() => line.context("Failed to read input")?,
        };

        let Some(line) = line else {
            break;
        };
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<CommentRecord>(&line) {
            Ok(record) => {
                stats.records += 1;
                pending.push(record);
            }
            Err(e) => {
                warn!(line = line_number, error = %e, "Skipping malformed record");
                metrics::counter!("sentistream_malformed_records_total").increment(1);
                stats.malformed += 1;
                continue;
            }
        }

        if pending.len() >= processor.batch_size() {
            flush_batch(processor, &mut pending, &mut writer, &mut stats).await?;
        }
    }

    flush_batch(processor, &mut pending, &mut writer, &mut stats).await?;
    writer.flush().await?;
    Ok(stats)
}

async fn flush_batch<W: AsyncWrite + Unpin>(
    processor: &CommentProcessor,
    pending: &mut Vec<CommentRecord>,
    writer: &mut W,
    stats: &mut ProcessStats,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }

    let batch = std::mem::take(pending);
    let fallback = batch.clone();
    let worker = processor.clone();

    let analyzed = match tokio::task::spawn_blocking(move || worker.process(batch))
        .await
        .context("Inference task panicked")?
    {
        Ok(analyzed) => analyzed,
        Err(e) if e.is_fatal() => return Err(e).context("Sentiment analysis failed"),
        Err(e) => {
            error!(error = %e, count = fallback.len(), "Batch failed, emitting comments unlabeled");
            stats.failed += fallback.len();
            fallback
                .into_iter()
                .map(|record| AnalyzedComment::new(record, None))
                .collect()
        }
    };

    let mut buf = Vec::new();
    for comment in &analyzed {
        if comment.sentiment.is_some() {
            stats.analyzed += 1;
        } else if comment.record.text().is_none() {
            stats.skipped += 1;
        }
        serde_json::to_writer(&mut buf, comment)?;
        buf.push(b'\n');
    }
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// `show-config`: effective configuration as YAML on stdout
pub fn show_config(config: &AnalyzerConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
