use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;

const TICKS: &[&str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

/// Bar style used while objects are transferred (clone, fetch, push).
/// - Yellow spinner, message, object counter.
pub fn transfer_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[33m{spinner}\x1b[0m {msg} [{bar:30}] {pos}/{len}")
        .unwrap()
        .tick_strings(TICKS)
        .progress_chars("=> ")
}

/// Style used when an operation finishes successfully.
/// - Green check mark followed by the final message.
pub fn ok_style() -> ProgressStyle {
    ProgressStyle::with_template("\x1b[32m✔\x1b[0m {wide_msg}").unwrap()
}

/// Create a transfer bar with the given label. Hidden when stderr is not a terminal.
pub fn transfer_bar(msg: impl Into<Cow<'static, str>>) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(transfer_style());
    pb.set_message(msg);
    pb
}

/// Print a final "done" line in the ok style.
pub fn finish_ok(msg: impl Into<Cow<'static, str>>) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ok_style());
    pb.finish_with_message(msg);
}
