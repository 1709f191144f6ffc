pub use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub struct Feedback {
    multi: MultiProgress,
}

impl Feedback {
    pub fn indeterminate_progress_bar(&self) -> ProgressBar {
        let pb = ProgressBar::new_spinner();

        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}").unwrap(),
        );

        self.multi.add(pb)
    }

    pub fn block_progress_bar(&self, len: u64) -> ProgressBar {
        let pb = ProgressBar::new(len);

        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} blocks (eta: {eta}) {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
        );

        self.multi.add(pb)
    }
}

impl Default for Feedback {
    fn default() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }
}
