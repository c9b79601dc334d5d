//! Incremental rendering of streamed text into one edited message.
//!
//! The agent produces text in small fragments. Each chat message can only be
//! edited so often and can only hold so much, and its markup must parse after
//! every edit. [`IncrementalRenderer`] accumulates fragments and pushes a
//! bounded, balanced view of them to a [`MessageSurface`]:
//!
//! - When idle, an append flushes immediately (leading edge). Appends inside
//!   the throttle window schedule exactly one delayed flush (trailing edge).
//! - Text over the size limit is shown as its most recent part, prefixed by
//!   [`TRUNCATION_INDICATOR`], with the tags that were open at the cut
//!   re-opened.
//! - If the surface rejects the markup, the renderer falls back to plain text
//!   until [`IncrementalRenderer::finish`] tries markup one last time.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use teleclaude_core::{
    EditOutcome, MarkupMode, MessageRef, MessageSurface, truncate_to_boundary,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::markup::{balance, reopening_tags, safe_cut_point, safe_truncate_point, strip_markup};

/// Prefix shown when older text has been cut off.
pub const TRUNCATION_INDICATOR: &str = "[...]\n";

/// Default minimum time between edits.
pub const DEFAULT_EDIT_THROTTLE: Duration = Duration::from_millis(1000);

/// Default maximum rendered size in bytes (Telegram allows 4096).
pub const DEFAULT_MAX_SIZE: usize = 3800;

/// Default room reserved for re-opened tags, closers, and the indicator.
pub const DEFAULT_OVERHEAD_BUDGET: usize = 60;

/// Renderer limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    /// Minimum interval between pushes to the surface.
    pub edit_throttle: Duration,
    /// Maximum size of the pushed view, in bytes.
    pub max_size: usize,
    /// Bytes reserved for truncation overhead when cutting.
    pub overhead_budget: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            edit_throttle: DEFAULT_EDIT_THROTTLE,
            max_size: DEFAULT_MAX_SIZE,
            overhead_budget: DEFAULT_OVERHEAD_BUDGET,
        }
    }
}

/// Mutable per-message state. Guarded by the renderer's async mutex, which
/// is also held across the surface call so flushes are strictly ordered.
#[derive(Debug, Default)]
struct RenderBuffer {
    text: String,
    last_flush_at: Option<Instant>,
    flush_scheduled: bool,
    fallback_plain: bool,
    finished: bool,
}

struct Inner {
    surface: Arc<dyn MessageSurface>,
    message: MessageRef,
    config: RenderConfig,
    buffer: tokio::sync::Mutex<RenderBuffer>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Streams text into a single, repeatedly edited message.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Clone)]
pub struct IncrementalRenderer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for IncrementalRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalRenderer")
            .field("message", &self.inner.message)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl IncrementalRenderer {
    /// Create a renderer for `message` on `surface`.
    #[must_use]
    pub fn new(surface: Arc<dyn MessageSurface>, message: MessageRef, config: RenderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                message,
                config,
                buffer: tokio::sync::Mutex::new(RenderBuffer::default()),
                timer: Mutex::new(None),
            }),
        }
    }

    /// The message this renderer edits.
    #[must_use]
    pub fn message(&self) -> MessageRef {
        self.inner.message
    }

    /// Current accumulated text.
    pub async fn text(&self) -> String {
        self.inner.buffer.lock().await.text.clone()
    }

    /// Append a fragment, flushing now or scheduling a flush.
    pub async fn append(&self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        let mut buf = self.inner.buffer.lock().await;
        buf.text.push_str(fragment);

        let throttle = self.inner.config.edit_throttle;
        let since_last = buf.last_flush_at.map(|t| t.elapsed());
        match since_last {
            Some(elapsed) if elapsed < throttle => {
                if !buf.flush_scheduled {
                    buf.flush_scheduled = true;
                    self.schedule(throttle.saturating_sub(elapsed));
                }
            },
            _ => {
                self.inner.flush_locked(&mut buf).await;
                self.after_flush(&mut buf);
            },
        }
    }

    /// Push the current view now, ignoring the throttle.
    ///
    /// Returns `None` when there is nothing to show yet.
    pub async fn flush(&self) -> Option<EditOutcome> {
        let mut buf = self.inner.buffer.lock().await;
        let outcome = self.inner.flush_locked(&mut buf).await;
        self.after_flush(&mut buf);
        outcome
    }

    /// Final flush, optionally replacing the text first.
    ///
    /// Markup is attempted again even if an earlier edit forced the plain
    /// fallback. Pending timers are cancelled and no retries are scheduled
    /// afterwards.
    pub async fn finish(&self, final_text: Option<String>) -> Option<EditOutcome> {
        self.abort_timer();

        let mut buf = self.inner.buffer.lock().await;
        if let Some(text) = final_text {
            buf.text = text;
        }
        buf.fallback_plain = false;
        buf.flush_scheduled = false;
        buf.finished = true;
        self.inner.flush_locked(&mut buf).await
    }

    /// Replace the text without flushing.
    pub async fn set_text(&self, text: impl Into<String>) {
        self.inner.buffer.lock().await.text = text.into();
    }

    /// Stop the delayed flush, keeping the text.
    pub async fn cancel_pending(&self) {
        self.abort_timer();
        self.inner.buffer.lock().await.flush_scheduled = false;
    }

    /// Schedule a retry after a failed push, if we are still streaming.
    fn after_flush(&self, buf: &mut RenderBuffer) {
        if buf.flush_scheduled && !buf.finished && !self.timer_running() {
            self.schedule(self.inner.config.edit_throttle);
        }
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.timer.lock().unwrap_or_else(|e| {
            warn!("IncrementalRenderer timer lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn timer_running(&self) -> bool {
        self.lock_timer().as_ref().is_some_and(|h| !h.is_finished())
    }

    fn abort_timer(&self) {
        if let Some(handle) = self.lock_timer().take() {
            handle.abort();
        }
    }

    fn schedule(&self, delay: Duration) {
        let handle = spawn_timer(Arc::downgrade(&self.inner), delay);
        if let Some(previous) = self.lock_timer().replace(handle)
            && !previous.is_finished()
        {
            previous.abort();
        }
    }
}

/// Delayed flush. Re-arms itself after a failed push until the renderer is
/// finished, dropped, or the flush succeeds.
fn spawn_timer(weak: Weak<Inner>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut delay = delay;
        loop {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut buf = inner.buffer.lock().await;
            if !buf.flush_scheduled {
                return;
            }
            buf.flush_scheduled = false;
            inner.flush_locked(&mut buf).await;
            if !buf.flush_scheduled || buf.finished {
                return;
            }
            delay = inner.config.edit_throttle;
        }
    })
}

impl Inner {
    /// Push the view of `buf.text`. Caller holds the buffer lock.
    ///
    /// On a transient failure `flush_scheduled` is left set so the caller
    /// arms a retry; it is never retried immediately.
    async fn flush_locked(&self, buf: &mut RenderBuffer) -> Option<EditOutcome> {
        if buf.text.is_empty() {
            return None;
        }

        let outcome = if buf.fallback_plain {
            self.push_plain(&buf.text).await
        } else {
            let view = bounded_view(&buf.text, self.config.max_size, self.config.overhead_budget);
            match self.push(&view, MarkupMode::Html).await {
                EditOutcome::InvalidMarkup(reason) => {
                    warn!(
                        chat_id = self.message.chat_id,
                        message_id = self.message.message_id,
                        %reason,
                        "markup rejected, falling back to plain text"
                    );
                    buf.fallback_plain = true;
                    self.push_plain(&buf.text).await
                },
                other => other,
            }
        };

        buf.last_flush_at = Some(Instant::now());
        match &outcome {
            EditOutcome::Ok | EditOutcome::Unchanged => buf.flush_scheduled = false,
            EditOutcome::InvalidMarkup(reason) | EditOutcome::TransientFailure(reason) => {
                debug!(%reason, "edit failed, deferring to next flush");
                buf.flush_scheduled = true;
            },
        }
        Some(outcome)
    }

    async fn push(&self, content: &str, mode: MarkupMode) -> EditOutcome {
        debug!(
            chat_id = self.message.chat_id,
            message_id = self.message.message_id,
            len = content.len(),
            ?mode,
            "flushing view"
        );
        self.surface.edit_message(&self.message, content, mode).await
    }

    async fn push_plain(&self, text: &str) -> EditOutcome {
        let view = plain_view(text, self.config.max_size);
        self.push(&view, MarkupMode::Plain).await
    }
}

/// The markup view of `text` for a message of at most `max_size` bytes.
///
/// Text that fits is returned balanced; its closers may take it past
/// `max_size`, which the overhead budget leaves room for. Longer text keeps
/// its most recent part: the cut never starts inside a tag or entity and
/// prefers a line or word break, tags open at the cut are re-opened, the
/// result is balanced and prefixed with [`TRUNCATION_INDICATOR`]. A cut view
/// never exceeds `max_size`.
#[must_use]
pub fn bounded_view(text: &str, max_size: usize, overhead_budget: usize) -> String {
    if text.len() <= max_size {
        return balance(text);
    }

    // The overhead is a first guess; the loop below enforces the limit.
    let overhead = overhead_budget.min(max_size / 2);
    let mut budget = max_size.saturating_sub(overhead);

    loop {
        let raw = text.len().saturating_sub(budget);
        let preferred = after_break(text, safe_truncate_point(text, raw));
        if preferred < raw {
            let view = view_from(text, preferred);
            if view.len() <= max_size {
                return view;
            }
        }

        let view = view_from(text, safe_cut_point(text, raw));
        if view.len() <= max_size {
            return view;
        }
        if budget == 0 {
            return indicator_only(max_size);
        }
        let excess = view.len().saturating_sub(max_size).max(1);
        budget = budget.saturating_sub(excess);
    }
}

/// Step past the newline or space a break point sits on.
fn after_break(text: &str, point: usize) -> usize {
    match text.as_bytes().get(point) {
        Some(b'\n' | b' ') => point.saturating_add(1),
        _ => point,
    }
}

/// Truncated view of `text` starting at `start`.
fn view_from(text: &str, start: usize) -> String {
    let mut suffix = reopening_tags(&text[..start]);
    suffix.push_str(&text[start..]);
    format!("{TRUNCATION_INDICATOR}{}", balance(&suffix))
}

/// The plain-text view of `text`: markup stripped, bounded like
/// [`bounded_view`].
#[must_use]
pub fn plain_view(text: &str, max_size: usize) -> String {
    let plain = strip_markup(text);
    if plain.len() <= max_size {
        return plain;
    }
    if max_size <= TRUNCATION_INDICATOR.len() {
        return indicator_only(max_size);
    }
    let keep = max_size.saturating_sub(TRUNCATION_INDICATOR.len());
    let start = plain.ceil_char_boundary(plain.len().saturating_sub(keep));
    format!("{TRUNCATION_INDICATOR}{}", &plain[start..])
}

fn indicator_only(max_size: usize) -> String {
    truncate_to_boundary(TRUNCATION_INDICATOR, max_size).to_string()
}
