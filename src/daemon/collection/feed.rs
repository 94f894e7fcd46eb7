use std::str::FromStr;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::history::Metric;

use super::{capture::CaptureBuffer, words::WordCounter};

/// Single line of the input feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Delta(Metric, u64),
    Distance(f64),
    Text(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum FeedParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
    #[error("`move` requires a pixel amount")]
    MissingDistance,
}

impl FromStr for FeedEvent {
    type Err = FeedParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (name, rest) = match line.trim_start().split_once(' ') {
            Some((name, rest)) => (name, rest),
            None => (line.trim(), ""),
        };

        let metric = match name {
            "" => return Err(FeedParseError::Empty),
            "text" => return Ok(FeedEvent::Text(rest.to_owned())),
            "move" => {
                let rest = rest.trim();
                if rest.is_empty() {
                    return Err(FeedParseError::MissingDistance);
                }
                let pixels = rest
                    .parse::<f64>()
                    .map_err(|_| FeedParseError::InvalidAmount(rest.to_owned()))?;
                return Ok(FeedEvent::Distance(pixels));
            }
            "key" => Metric::Keystrokes,
            "word" => Metric::Words,
            "click" => Metric::Clicks,
            "scroll" => Metric::Scrolls,
            other => return Err(FeedParseError::UnknownEvent(other.to_owned())),
        };

        let rest = rest.trim();
        let amount = if rest.is_empty() {
            1
        } else {
            rest.parse::<u64>()
                .map_err(|_| FeedParseError::InvalidAmount(rest.to_owned()))?
        };
        Ok(FeedEvent::Delta(metric, amount))
    }
}

/// Reads newline delimited events, as written by an external input hook, into the capture
/// buffer.
pub struct FeedModule<R> {
    lines: Lines<R>,
    buffer: CaptureBuffer,
    words: WordCounter,
    shutdown: CancellationToken,
}

impl<R: AsyncBufRead + Unpin> FeedModule<R> {
    pub fn new(reader: R, buffer: CaptureBuffer, shutdown: CancellationToken) -> Self {
        Self {
            lines: reader.lines(),
            buffer,
            words: WordCounter::new(),
            shutdown,
        }
    }

    fn apply(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Delta(metric, amount) => self.buffer.on_delta(metric, amount),
            FeedEvent::Distance(pixels) => self.buffer.on_distance_delta(pixels),
            FeedEvent::Text(text) => {
                let keystrokes = text.chars().count() as u64;
                let words = self.words.push_str(&text);
                self.buffer.on_delta(Metric::Keystrokes, keystrokes);
                self.buffer.on_delta(Metric::Words, words);
            }
        }
    }

    /// Executes the feed loop. Ends on cancellation or when the input is exhausted.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                line = self.lines.next_line() => line?,
            };
            let Some(line) = line else {
                info!("Input feed closed");
                return Ok(());
            };

            match line.parse::<FeedEvent>() {
                Ok(event) => {
                    debug!("Feed event {:?}", event);
                    self.apply(event);
                }
                Err(FeedParseError::Empty) => (),
                Err(e) => warn!("Skipping feed line {line:?}: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tokio_util::sync::CancellationToken;

    use crate::{daemon::collection::capture::CaptureBuffer, history::Metric};

    use super::{FeedEvent, FeedModule, FeedParseError};

    #[test]
    fn test_parse_events() {
        assert_eq!("key".parse::<FeedEvent>(), Ok(FeedEvent::Delta(Metric::Keystrokes, 1)));
        assert_eq!("click 3".parse::<FeedEvent>(), Ok(FeedEvent::Delta(Metric::Clicks, 3)));
        assert_eq!("scroll  2 ".parse::<FeedEvent>(), Ok(FeedEvent::Delta(Metric::Scrolls, 2)));
        assert_eq!("word 4".parse::<FeedEvent>(), Ok(FeedEvent::Delta(Metric::Words, 4)));
        assert_eq!("move 12.5".parse::<FeedEvent>(), Ok(FeedEvent::Distance(12.5)));
        assert_eq!(
            "text hi there".parse::<FeedEvent>(),
            Ok(FeedEvent::Text("hi there".to_owned()))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert_eq!("".parse::<FeedEvent>(), Err(FeedParseError::Empty));
        assert_eq!(
            "jump 1".parse::<FeedEvent>(),
            Err(FeedParseError::UnknownEvent("jump".to_owned()))
        );
        assert_eq!(
            "key many".parse::<FeedEvent>(),
            Err(FeedParseError::InvalidAmount("many".to_owned()))
        );
        assert_eq!(
            "move".parse::<FeedEvent>(),
            Err(FeedParseError::MissingDistance)
        );
    }

    #[tokio::test]
    async fn test_feed_fills_buffer() -> Result<()> {
        let input: &[u8] = b"key 2\nbogus\nclick\n\nmove 7\nmove -3\ntext ab cd \n";
        let buffer = CaptureBuffer::new();

        FeedModule::new(input, buffer.clone(), CancellationToken::new())
            .run()
            .await?;

        let delta = buffer.drain();
        assert_eq!(delta.keystrokes, 2 + 6);
        assert_eq!(delta.words, 2);
        assert_eq!(delta.clicks, 1);
        assert_eq!(delta.distance, 7.);
        Ok(())
    }
}
