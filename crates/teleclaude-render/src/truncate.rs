//! Line-budget truncation around points of interest.
//!
//! Long tool output and code blocks are cut down to a fixed number of lines.
//! Lines the caller marks as interesting (errors, matches) are kept with a
//! little surrounding context; everything else collapses into
//! `... (N lines skipped) ...` markers.
//!
//! The fit is best effort. With two or more anchors the result always meets
//! the budget, since context can shrink to zero and anchors can be thinned.
//! A single anchor is never dropped, so the budget may then be exceeded.

use std::ops::RangeInclusive;

/// Share of the budget given to the head when there are no anchors.
const HEAD_SHARE_NUM: usize = 3;
const HEAD_SHARE_DEN: usize = 5;

/// The marker standing in for `count` omitted lines.
#[must_use]
pub fn skip_line(count: usize) -> String {
    format!("... ({count} lines skipped) ...")
}

/// Cut `lines` down to about `max_lines` lines, joined with `\n`.
///
/// - Input that already fits is returned unchanged.
/// - Without interesting lines, keeps 60% of the budget from the start and
///   the rest (minus one marker line) from the end.
/// - Otherwise keeps a window of `context` lines either side of each
///   interesting index, merging windows at most one line apart, and shrinks
///   context and then thins anchors until the budget is met.
///
/// Out-of-range interesting indices are ignored.
#[must_use]
pub fn truncate_lines<S: AsRef<str>>(
    lines: &[S],
    max_lines: usize,
    interesting: &[usize],
    context: usize,
) -> String {
    let total = lines.len();
    if total <= max_lines {
        return join(lines.iter().map(AsRef::as_ref));
    }

    let mut anchors: Vec<usize> = interesting.iter().copied().filter(|&i| i < total).collect();
    anchors.sort_unstable();
    anchors.dedup();

    if anchors.is_empty() {
        return head_and_tail(lines, max_lines);
    }

    let mut context = context;
    let mut windows = build_windows(&anchors, context, total);
    while rendered_len(&windows, total) > max_lines {
        if context > 0 {
            context = context.saturating_sub(1);
        } else if anchors.len() > 1 {
            anchors = anchors.into_iter().step_by(2).collect();
        } else {
            break;
        }
        windows = build_windows(&anchors, context, total);
    }

    render(lines, &windows)
}

fn join<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    lines.collect::<Vec<_>>().join("\n")
}

fn head_and_tail<S: AsRef<str>>(lines: &[S], max_lines: usize) -> String {
    let total = lines.len();
    let head = max_lines.saturating_mul(HEAD_SHARE_NUM) / HEAD_SHARE_DEN;
    let tail = max_lines.saturating_sub(head).saturating_sub(1);
    let skipped = total.saturating_sub(head).saturating_sub(tail);

    let mut out: Vec<String> = Vec::with_capacity(max_lines);
    out.extend(lines[..head].iter().map(|l| l.as_ref().to_string()));
    out.push(skip_line(skipped));
    out.extend(
        lines[total.saturating_sub(tail)..]
            .iter()
            .map(|l| l.as_ref().to_string()),
    );
    out.join("\n")
}

/// Context windows around `anchors` (sorted), merged when at most one line
/// apart.
fn build_windows(anchors: &[usize], context: usize, total: usize) -> Vec<RangeInclusive<usize>> {
    let last = total.saturating_sub(1);
    let mut windows: Vec<RangeInclusive<usize>> = Vec::new();

    for &anchor in anchors {
        let start = anchor.saturating_sub(context);
        let end = anchor.saturating_add(context).min(last);

        if let Some(prev) = windows.last_mut()
            && start <= prev.end().saturating_add(2)
        {
            // A one-line gap is cheaper shown than replaced by a marker.
            *prev = *prev.start()..=end.max(*prev.end());
            continue;
        }
        windows.push(start..=end);
    }

    windows
}

/// Line count of the rendered output: kept lines plus one marker per gap.
fn rendered_len(windows: &[RangeInclusive<usize>], total: usize) -> usize {
    let kept: usize = windows
        .iter()
        .map(|w| w.end().saturating_sub(*w.start()).saturating_add(1))
        .sum();

    let mut gaps = windows.len().saturating_sub(1);
    if windows.first().is_some_and(|w| *w.start() > 0) {
        gaps = gaps.saturating_add(1);
    }
    if windows
        .last()
        .is_some_and(|w| w.end().saturating_add(1) < total)
    {
        gaps = gaps.saturating_add(1);
    }

    kept.saturating_add(gaps)
}

fn render<S: AsRef<str>>(lines: &[S], windows: &[RangeInclusive<usize>]) -> String {
    let total = lines.len();
    let mut out: Vec<String> = Vec::new();
    let mut next = 0usize;

    for window in windows {
        let (start, end) = (*window.start(), *window.end());
        if start > next {
            out.push(skip_line(start.saturating_sub(next)));
        }
        out.extend(lines[start..=end].iter().map(|l| l.as_ref().to_string()));
        next = end.saturating_add(1);
    }
    if next < total {
        out.push(skip_line(total.saturating_sub(next)));
    }

    out.join("\n")
}
