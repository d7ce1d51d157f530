//! Batch `prepare` pipeline: RAML sources → render → assemble → serialize.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use ramlpreparer_shared::{PreparerConfig, PreparerError, Result, validate};

use crate::envelope::EnvelopeBuilder;
use crate::renderer::Renderer;
use crate::serializer;

/// Extension of source documents picked up by [`discover_sources`].
pub const SOURCE_EXTENSION: &str = "raml";

/// One document to prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// File to render.
    pub path: PathBuf,
    /// Name the envelope is keyed by: the path relative to the source root,
    /// `/`-separated.
    pub docname: String,
}

impl Source {
    /// Describe `path`, naming it relative to `root` when it lies beneath it
    /// and by its file name otherwise.
    pub fn new(path: impl Into<PathBuf>, root: &Path) -> Self {
        let path = path.into();
        let cwd_root = root.components().all(|c| matches!(c, Component::CurDir));
        let relative = path
            .strip_prefix(root)
            .ok()
            .or_else(|| (cwd_root && path.is_relative()).then_some(path.as_path()))
            .filter(|r| !r.as_os_str().is_empty())
            .or_else(|| path.file_name().map(Path::new))
            .unwrap_or(path.as_path());
        let docname = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        Self { path, docname }
    }
}

/// What happened to one document.
#[derive(Debug, Clone)]
pub enum DocumentStatus {
    Prepared {
        envelope_path: PathBuf,
        /// Non-fatal problems, already rendered as messages.
        warnings: Vec<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub docname: String,
    pub source: PathBuf,
    pub status: DocumentStatus,
}

impl DocumentOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, DocumentStatus::Failed { .. })
    }
}

/// Result of a batch run, one outcome per source in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<DocumentOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn prepared(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_failed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(DocumentOutcome::is_failed)
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each document's outcome is collected.
    fn document_finished(&self, outcome: &DocumentOutcome, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, report: &BatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn document_finished(&self, _outcome: &DocumentOutcome, _current: usize, _total: usize) {}
    fn done(&self, _report: &BatchReport) {}
}

/// Every `.raml` file beneath `root` in sorted path order, `.git` and
/// `node_modules` skipped.
pub fn discover_sources(root: &Path) -> Result<Vec<Source>> {
    if !root.is_dir() {
        return Err(PreparerError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "source root is not a directory"),
        ));
    }

    let sources: Vec<Source> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git" && e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
        })
        .map(|e| Source::new(e.into_path(), root))
        .collect();

    debug!(root = %root.display(), count = sources.len(), "discovered sources");
    Ok(sources)
}

/// Render, assemble and serialize a single document.
///
/// Rendering happens in a private scratch directory that is removed
/// afterwards, whatever the outcome.
#[instrument(skip_all, fields(docname = %source.docname))]
pub fn prepare_document(
    source: &Source,
    config: &PreparerConfig,
    renderer: &dyn Renderer,
) -> Result<DocumentOutcome> {
    let scratch = std::env::temp_dir().join(format!("ramlpreparer-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&scratch).map_err(|e| PreparerError::io(&scratch, e))?;

    let result = render_and_write(source, config, renderer, &scratch);
    let _ = std::fs::remove_dir_all(&scratch);
    result
}

fn render_and_write(
    source: &Source,
    config: &PreparerConfig,
    renderer: &dyn Renderer,
    scratch: &Path,
) -> Result<DocumentOutcome> {
    let stem = source
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    let html_path = scratch.join(format!("{stem}.html"));

    renderer.render(&source.path, &html_path)?;

    let assembled = EnvelopeBuilder::from_html_file(source.docname.clone(), &html_path)?
        .build(config)?;
    let envelope_path = serializer::write(&assembled.envelope, None, config)?;

    info!(
        content_id = %assembled.envelope.content_id,
        path = %envelope_path.display(),
        warnings = assembled.warnings.len(),
        "document prepared"
    );

    Ok(DocumentOutcome {
        docname: source.docname.clone(),
        source: source.path.clone(),
        status: DocumentStatus::Prepared {
            envelope_path,
            warnings: assembled.warnings.iter().map(ToString::to_string).collect(),
        },
    })
}

/// Prepare every source concurrently.
///
/// The configuration is validated first; a configuration error aborts the
/// run before any document is touched. After that, each document fails or
/// succeeds on its own and the report records which.
#[instrument(skip_all, fields(sources = sources.len()))]
pub async fn prepare_all(
    config: Arc<PreparerConfig>,
    renderer: Arc<dyn Renderer>,
    sources: Vec<Source>,
    progress: &dyn ProgressReporter,
) -> Result<BatchReport> {
    let start = Instant::now();
    validate(config.as_ref())?;

    let total = sources.len();
    let limit = config.batch.concurrency.max(1) as usize;
    info!(total, concurrency = limit, "starting prepare pipeline");
    progress.phase(&format!("Preparing {total} document(s)"));

    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles = Vec::with_capacity(total);

    for source in sources {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PreparerError::Render(format!("worker pool closed: {e}")))?;
        let config = Arc::clone(&config);
        let renderer = Arc::clone(&renderer);
        let meta = (source.docname.clone(), source.path.clone());

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            prepare_document(&source, &config, renderer.as_ref())
        });
        handles.push((meta, handle));
    }

    let mut report = BatchReport::default();
    for (i, ((docname, path), handle)) in handles.into_iter().enumerate() {
        let outcome = match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(%docname, error = %e, "document failed");
                failed(docname, path, e.to_string())
            }
            Err(e) => {
                warn!(%docname, error = %e, "document task aborted");
                failed(docname, path, format!("task aborted: {e}"))
            }
        };
        progress.document_finished(&outcome, i + 1, total);
        report.outcomes.push(outcome);
    }
    report.elapsed = start.elapsed();

    progress.done(&report);
    info!(
        prepared = report.prepared(),
        failed = report.failed(),
        elapsed_ms = report.elapsed.as_millis(),
        "prepare pipeline complete"
    );

    Ok(report)
}

fn failed(docname: String, source: PathBuf, error: String) -> DocumentOutcome {
    DocumentOutcome {
        docname,
        source,
        status: DocumentStatus::Failed { error },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_dir;

    /// Writes a fixed page, or nothing at all for sources named `broken`.
    struct FakeRenderer;

    impl Renderer for FakeRenderer {
        fn render(&self, source: &Path, output: &Path) -> Result<()> {
            let stem = source.file_stem().unwrap().to_string_lossy();
            if stem == "broken" {
                return Err(PreparerError::Render("syntax error".into()));
            }
            let page = format!(
                "<html><head><title>{stem}</title></head><body>\
                 <h1>{stem}</h1><img src=\"logo.png\"><h2>Resources</h2></body></html>"
            );
            std::fs::write(output, page).map_err(|e| PreparerError::io(output, e))
        }
    }

    fn setup(root: &Path) -> PreparerConfig {
        std::fs::create_dir_all(root.join("api/v1")).unwrap();
        std::fs::create_dir_all(root.join("api/.git")).unwrap();
        std::fs::write(root.join("api/widgets.raml"), "#%RAML 1.0").unwrap();
        std::fs::write(root.join("api/v1/gadgets.raml"), "#%RAML 1.0").unwrap();
        std::fs::write(root.join("api/.git/hidden.raml"), "").unwrap();
        std::fs::write(root.join("api/notes.md"), "").unwrap();
        std::fs::write(root.join("api/logo.png"), b"png").unwrap();

        let mut config = PreparerConfig::default();
        config.envelope.envelope_dir = Some(root.join("envelopes"));
        config.envelope.content_id_base = Some("https://github.com/org/api/".into());
        config.assets.original_asset_dir = Some(root.join("api"));
        config.assets.asset_dir = Some(root.join("store"));
        config
    }

    #[test]
    fn source_docname_is_relative_to_root() {
        let root = Path::new("/repo");
        assert_eq!(Source::new("/repo/specs/a.raml", root).docname, "specs/a.raml");
        assert_eq!(Source::new("/elsewhere/b.raml", root).docname, "b.raml");
        assert_eq!(Source::new("specs/c.raml", Path::new(".")).docname, "specs/c.raml");
        assert_eq!(Source::new("./d.raml", Path::new(".")).docname, "d.raml");
    }

    #[test]
    fn discovers_raml_files_in_sorted_order() {
        let root = temp_dir("pipeline-discover");
        setup(&root);

        let sources = discover_sources(&root.join("api")).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.docname.as_str()).collect();
        assert_eq!(names, ["v1/gadgets.raml", "widgets.raml"]);

        assert!(discover_sources(&root.join("missing")).is_err());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn prepares_every_document() {
        let root = temp_dir("pipeline-all");
        let config = setup(&root);
        let sources = discover_sources(&root.join("api")).unwrap();

        let report = prepare_all(
            Arc::new(config),
            Arc::new(FakeRenderer),
            sources,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(report.prepared(), 2);
        assert!(!report.has_failures());

        let DocumentStatus::Prepared { envelope_path, warnings } = &report.outcomes[1].status else {
            panic!("expected success");
        };
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("edit URL"));
        let env = serializer::read_envelope(envelope_path).unwrap();
        assert_eq!(env.docname, "widgets.raml");
        assert_eq!(env.title, "widgets");
        assert_eq!(env.content_id, "https://github.com/org/api/widgets.raml");
        assert_eq!(env.asset_offsets.len(), 1);
        assert!(root.join("store").join(&env.asset_offsets[0].rewritten).exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let root = temp_dir("pipeline-partial");
        let config = setup(&root);
        std::fs::write(root.join("api/broken.raml"), "oops").unwrap();
        let sources = discover_sources(&root.join("api")).unwrap();

        let mut config = config;
        config.batch.concurrency = 1;
        let report = prepare_all(
            Arc::new(config),
            Arc::new(FakeRenderer),
            sources,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed(), 1);
        assert!(report.has_failures());
        let broken = report.outcomes.iter().find(|o| o.is_failed()).unwrap();
        assert_eq!(broken.docname, "broken.raml");
        let written = std::fs::read_dir(root.join("envelopes")).unwrap().count();
        assert_eq!(written, 2);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn configuration_error_aborts_before_rendering() {
        let root = temp_dir("pipeline-config");
        let mut config = setup(&root);
        config.envelope.content_id_base = None;
        let sources = discover_sources(&root.join("api")).unwrap();

        let err = prepare_all(
            Arc::new(config),
            Arc::new(FakeRenderer),
            sources,
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PreparerError::Configuration { .. }));
        assert!(!root.join("envelopes").exists());
        let _ = std::fs::remove_dir_all(&root);
    }
}
