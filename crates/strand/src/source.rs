//! JSONL input adapters.
//!
//! Agent processes write one JSON object per line on stdout; transcripts on
//! disk use the same framing. These helpers turn any `AsyncBufRead` of such
//! lines into the `ProviderMessage` stream the pipeline consumes.

use std::path::{Path, PathBuf};

use async_stream::{stream, try_stream};
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use crate::canon::{ProviderFamily, ProviderMessage};

/// Errors raised while reading provider input.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read error after {lines} lines: {source}")]
    Read {
        lines: u64,
        #[source]
        source: std::io::Error,
    },
}

/// Decode each non-blank line of `reader`. Read errors end the stream after
/// being yielded.
pub fn read_messages<R>(
    reader: R,
    family: ProviderFamily,
) -> impl Stream<Item = Result<ProviderMessage, SourceError>> + Send + 'static
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    try_stream! {
        let mut lines = reader.lines();
        let mut count = 0u64;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|source| SourceError::Read { lines: count, source })?;
            let Some(line) = line else {
                break;
            };
            count += 1;
            if line.trim().is_empty() {
                continue;
            }
            yield ProviderMessage::parse_line(family, &line);
        }
    }
}

/// Like [`read_messages`], but logs read errors and ends the stream instead of
/// yielding them. This is the shape `StreamAugmenter::run` takes.
pub fn provider_messages<R>(
    reader: R,
    family: ProviderFamily,
) -> impl Stream<Item = ProviderMessage> + Send + 'static
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    stream! {
        let mut messages = Box::pin(read_messages(reader, family));
        while let Some(item) = messages.next().await {
            match item {
                Ok(message) => yield message,
                Err(err) => {
                    tracing::warn!(error = %err, "provider input ended with an error");
                    break;
                }
            }
        }
    }
}

/// Buffered reader over a transcript file, or stdin for `-`.
pub async fn open_input(
    path: &Path,
) -> Result<BufReader<Box<dyn AsyncRead + Unpin + Send>>, SourceError> {
    let inner: Box<dyn AsyncRead + Unpin + Send> = if path == Path::new("-") {
        Box::new(tokio::io::stdin())
    } else {
        let file = File::open(path).await.map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Box::new(file)
    };
    Ok(BufReader::new(inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::canon::ClaudeMessage;

    #[tokio::test]
    async fn test_skips_blank_lines_and_keeps_garbage_raw() {
        let input = b"{\"type\":\"system\",\"subtype\":\"init\"}\n\n   \nnot json\n".to_vec();
        let messages: Vec<_> = provider_messages(std::io::Cursor::new(input), ProviderFamily::Claude)
            .collect()
            .await;
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            messages[0],
            ProviderMessage::Claude(ClaudeMessage::System { .. })
        ));
        assert!(matches!(&messages[1], ProviderMessage::Raw(line) if line == "not json"));
    }

    #[tokio::test]
    async fn test_open_input_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"type\":\"agent_start\"}}").unwrap();

        let reader = open_input(file.path()).await.unwrap();
        let messages: Vec<_> = provider_messages(reader, ProviderFamily::Pi).collect().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].family(), Some(ProviderFamily::Pi));
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let Err(err) = open_input(Path::new("/nonexistent/strand.jsonl")).await else {
            panic!("expected open error");
        };
        assert!(matches!(err, SourceError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/strand.jsonl"));
    }
}
