use piper_log_analyzer::ErrorAnalyzer;
use piper_patches::PatchContribution;

/// Caller hooks into a `pip download`: an analyzer for its log and patches for its code.
#[derive(Default)]
pub struct DownloadObserver {
    analyzer: Option<Box<dyn ErrorAnalyzer>>,
    patches: Vec<PatchContribution>,
}

impl DownloadObserver {
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: impl ErrorAnalyzer + 'static) -> Self {
        self.analyzer = Some(Box::new(analyzer));
        self
    }

    #[must_use]
    pub fn with_patch(mut self, patch: PatchContribution) -> Self {
        self.patches.push(patch);
        self
    }

    pub(crate) fn into_parts(self) -> (Option<Box<dyn ErrorAnalyzer>>, Vec<PatchContribution>) {
        (self.analyzer, self.patches)
    }
}

impl std::fmt::Debug for DownloadObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadObserver")
            .field("analyzer", &self.analyzer.is_some())
            .field("patches", &self.patches)
            .finish()
    }
}
