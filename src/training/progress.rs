//! Progress bar decoration for batch iteration

use indicatif::{ProgressBar, ProgressStyle};

/// Iterator adapter that advances a progress bar as items are yielded.
///
/// Order and length of the wrapped iterator are preserved. With a hidden bar
/// nothing is drawn.
pub struct Progress<I> {
    inner: I,
    bar: ProgressBar,
}

/// Wrap `iter` in a bar labelled with `phase`; `visible = false` draws nothing
pub fn decorate<I: Iterator>(iter: I, total: usize, phase: &str, visible: bool) -> Progress<I> {
    let bar = if visible {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg:>8} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("█▇▆▅▄▃▂▁  "));
        }
        bar.set_message(phase.to_string());
        bar
    } else {
        ProgressBar::hidden()
    };

    Progress { inner: iter, bar }
}

impl<I> Progress<I> {
    /// Position of the bar
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl<I: Iterator> Iterator for Progress<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(item) => {
                self.bar.inc(1);
                Some(item)
            }
            None => {
                self.bar.finish_and_clear();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<I> Drop for Progress<I> {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
