use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal progress for a run; a no-op when silent
pub struct ProgressReporter {
    progress_bar: Option<ProgressBar>,
    silent: bool,
}

impl ProgressReporter {
    /// Bar over `total` locations
    pub fn new(total: u64, message: &str, silent: bool) -> Self {
        if silent {
            return Self::silent();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} locations")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            progress_bar: Some(pb),
            silent: false,
        }
    }

    fn silent() -> Self {
        Self {
            progress_bar: None,
            silent: true,
        }
    }

    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    pub fn finish_with_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message(message.to_string());
        }
    }

    pub fn println(&self, message: &str) {
        if self.silent {
            return;
        }
        match self.progress_bar {
            Some(ref pb) => pb.println(message),
            None => println!("{}", message),
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(ref pb) = self.progress_bar {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_reporter_is_inert() {
        let progress = ProgressReporter::new(3, "Processing", true);
        progress.increment(1);
        progress.set_message("Koga");
        progress.println("hidden");
        progress.finish_with_message("done");
        assert!(progress.progress_bar.is_none());
    }
}
