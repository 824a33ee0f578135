//! Streaming scan for a page's JSON oEmbed `<link>`.
//!
//! html5ever's tokenizer does the lexing, including entity decoding in
//! attribute values. Run without a tree builder it cannot tell which elements
//! hold raw text, so [`LinkSink`] switches it into those states itself, the
//! same way the tree builder would. A `<link>` inside `<title>`, `<script>` or
//! a comment is therefore text, not a tag.
//!
//! Tokenizer state is built on non-atomic tendrils and is not `Send`. Async
//! callers go through [`ScanWorker`], which keeps the scanner on a blocking
//! thread and answers one chunk at a time.

use std::borrow::Cow;

use bytes::Bytes;
use html5ever::tendril::fmt::UTF8;
use html5ever::tendril::stream::{TendrilSink, Utf8LossyDecoder};
use html5ever::tendril::{ByteTendril, StrTendril};
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};
use tokio::sync::mpsc;

const REL_ALTERNATE: &str = "alternate";
const OEMBED_JSON_TYPE: &str = "application/json+oembed";

/// Incremental scanner over raw page bytes.
///
/// Chunks may split tags, attribute values and multi-byte characters
/// anywhere. Invalid UTF-8 is replaced rather than rejected.
pub struct LinkScanner {
    input: Utf8LossyDecoder<TokenizerInput>,
}

impl Default for LinkScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkScanner {
    pub fn new() -> Self {
        let input = TokenizerInput {
            tokenizer: Tokenizer::new(LinkSink::default(), TokenizerOpts::default()),
            queue: BufferQueue::default(),
        };
        Self { input: Utf8LossyDecoder::new(input) }
    }

    /// Feed the next chunk and return the first matching `href` seen so far.
    ///
    /// Once a link has been found every later call returns the same value.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<String> {
        if self.input.inner_sink.found().is_none() {
            self.input.process(ByteTendril::from_slice(chunk));
        }
        self.input.inner_sink.found()
    }
}

/// Decoded text goes straight into the tokenizer.
struct TokenizerInput {
    tokenizer: Tokenizer<LinkSink>,
    queue: BufferQueue,
}

impl TokenizerInput {
    fn found(&self) -> Option<String> {
        self.tokenizer.sink.found.clone()
    }
}

impl TendrilSink<UTF8> for TokenizerInput {
    type Output = ();

    fn process(&mut self, text: StrTendril) {
        self.queue.push_back(text);
        let _ = self.tokenizer.feed(&mut self.queue);
    }

    fn error(&mut self, _desc: Cow<'static, str>) {}

    fn finish(mut self) {
        self.tokenizer.end();
    }
}

/// Token sink that records the first oEmbed link and drives raw-text states.
#[derive(Default)]
struct LinkSink {
    found: Option<String>,
}

impl TokenSink for LinkSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        let Token::TagToken(tag) = token else {
            return TokenSinkResult::Continue;
        };
        if tag.kind != TagKind::StartTag {
            return TokenSinkResult::Continue;
        }

        match &*tag.name {
            "link" => {
                if self.found.is_none() {
                    self.found = oembed_href(&tag);
                }
                TokenSinkResult::Continue
            }
            "title" | "textarea" => TokenSinkResult::RawData(RawKind::Rcdata),
            "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" => {
                TokenSinkResult::RawData(RawKind::Rawtext)
            }
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "plaintext" => TokenSinkResult::Plaintext,
            _ => TokenSinkResult::Continue,
        }
    }
}

/// The `href` of a `<link rel="alternate" type="application/json+oembed">`.
fn oembed_href(tag: &Tag) -> Option<String> {
    let attr = |name: &str| {
        tag.attrs
            .iter()
            .find(|a| &*a.name.local == name)
            .map(|a| &*a.value)
    };

    let is_alternate = attr("rel")
        .is_some_and(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case(REL_ALTERNATE)));
    let is_oembed = attr("type").is_some_and(|t| t.trim().eq_ignore_ascii_case(OEMBED_JSON_TYPE));
    if !(is_alternate && is_oembed) {
        return None;
    }

    attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

/// A [`LinkScanner`] on a blocking thread, fed in lockstep.
///
/// Each `feed` waits for the scanner to finish that chunk, so the caller
/// never reads past the chunk that held the link.
pub struct ScanWorker {
    chunks: mpsc::Sender<Bytes>,
    replies: mpsc::Receiver<Option<String>>,
}

impl ScanWorker {
    /// Start a scanner. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (chunks, mut chunk_rx) = mpsc::channel::<Bytes>(1);
        let (reply_tx, replies) = mpsc::channel(1);

        tokio::task::spawn_blocking(move || {
            let mut scanner = LinkScanner::new();
            while let Some(chunk) = chunk_rx.blocking_recv() {
                let found = scanner.feed(&chunk);
                let done = found.is_some();
                if reply_tx.blocking_send(found).is_err() || done {
                    return;
                }
            }
        });

        Self { chunks, replies }
    }

    /// Scan one more chunk; `Some(href)` once the link has been seen.
    pub async fn feed(&mut self, chunk: Bytes) -> Option<String> {
        if self.chunks.send(chunk).await.is_err() {
            tracing::debug!("link scanner stopped early");
            return None;
        }
        self.replies.recv().await.flatten()
    }
}
