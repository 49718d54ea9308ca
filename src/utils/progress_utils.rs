use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for long-running CLI work. Returns `None` when there is
/// nothing to count.
pub fn progress_bar(len: u64, msg: String) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }

    let bar = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise} / {eta_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .ok()?
        .progress_chars("##-");

    bar.set_style(style);
    bar.set_message(msg);

    Some(bar)
}
