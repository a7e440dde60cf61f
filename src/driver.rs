use prism_spirv::{DecodeError, Module};
use prism_translate::{translate_module, Target, TranslateError, TranslateOptions, Translation};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DriverError {
    /// The input could not be decoded at all; no target was attempted.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid target list: {0}")]
    Targets(#[from] serde_json::Error),
}

/// Outcome of one target in a batch.
#[derive(Debug)]
pub struct TargetResult {
    pub target: Target,
    pub result: Result<Translation, TranslateError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per requested target, in request order.
    pub results: Vec<TargetResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&Target, &Translation)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().ok().map(|t| (&r.target, t)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Target, &TranslateError)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (&r.target, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Process exit status for a command-line wrapper: non-zero when any target failed.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Parses a JSON array of targets such as `[{"lang": "glsl", "version": 330}, {"lang": "spirv"}]`.
pub fn load_targets_json(json: &str) -> Result<Vec<Target>, DriverError> {
    Ok(serde_json::from_str(json)?)
}

fn run_target(module: &Module, target: &Target, options: TranslateOptions) -> TargetResult {
    let result = translate_module(module.clone(), target, options);
    match &result {
        Ok(translation) => debug!(
            target = %target,
            bytes = translation.bytes().len(),
            diagnostics = translation.diagnostics.len(),
            "target translated"
        ),
        Err(err) => warn!(target = %target, error = %err, "target failed"),
    }
    TargetResult {
        target: target.clone(),
        result,
    }
}

/// Translates `bytes` for every target in turn.
///
/// Decoding happens once up front and a decode failure aborts the whole batch. After that each
/// target works on its own copy of the module, so one failing target never affects the others.
pub fn translate_all(
    bytes: &[u8],
    targets: &[Target],
    options: TranslateOptions,
) -> Result<BatchReport, DriverError> {
    let module = Module::decode(bytes)?;
    let results = targets
        .iter()
        .map(|target| run_target(&module, target, options))
        .collect();
    Ok(finish(results))
}

/// Like [`translate_all`], with one scoped thread per target.
pub fn translate_all_parallel(
    bytes: &[u8],
    targets: &[Target],
    options: TranslateOptions,
) -> Result<BatchReport, DriverError> {
    let module = Module::decode(bytes)?;
    let results = std::thread::scope(|scope| {
        let handles = targets
            .iter()
            .map(|target| {
                let module = &module;
                scope.spawn(move || run_target(module, target, options))
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<_>>()
    });
    Ok(finish(results))
}

fn finish(results: Vec<TargetResult>) -> BatchReport {
    let report = BatchReport { results };
    debug!(
        targets = report.results.len(),
        failed = report.failed().count(),
        "batch finished"
    );
    report
}
