// generator.rs - Batch generation: one rendered (init, config, job) triple per file

use std::fs;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::campaign::{Artifact, Campaign};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::layout::{ensure_directories, OutputLayout};
use crate::template::{Template, TemplateSet};

/// What to do when one iteration fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the run at the first failure.
    #[default]
    FailFast,
    /// Record the failure in the report and carry on with the next file.
    KeepGoing,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Render and write iterations on the rayon pool.
    pub parallel: bool,
    pub policy:   FailurePolicy,
    /// Draw a progress bar on stderr.
    pub progress: bool,
    /// Also write a CSV listing every iteration.
    pub manifest: Option<PathBuf>,
}

/// Full paths of the five artifacts of one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub init:   PathBuf,
    pub config: PathBuf,
    pub job:    PathBuf,
    pub log:    PathBuf,
    pub output: PathBuf,
    /// Bare data file name (last component of `output`).
    pub data:   String,
}

/// Substitution values of a single iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    pub index:    usize,
    pub start_id: u64,
    pub n_evt:    u64,
    pub paths:    ArtifactPaths,
}

impl IterationRecord {
    pub fn build(campaign: &Campaign, layout: &OutputLayout, events_per_file: u64, index: usize) -> Result<Self> {
        let n = campaign.naming.names(index, &campaign.templates, &campaign.params)?;
        Ok(Self {
            index,
            start_id: events_per_file * index as u64,
            n_evt:    events_per_file,
            paths: ArtifactPaths {
                init:   layout.macros.join(&n.init),
                config: layout.macros.join(&n.config),
                job:    layout.jobs.join(&n.job),
                log:    layout.logs.join(&n.log),
                output: layout.data.join(&n.data),
                data:   n.data,
            },
        })
    }

    pub fn context(&self) -> Context {
        Context::new()
            .with("index",      self.index)
            .with("start_id",   self.start_id)
            .with("n_evt",      self.n_evt)
            .with("initfile",   self.paths.init.as_path())
            .with("conffile",   self.paths.config.as_path())
            .with("jobfile",    self.paths.job.as_path())
            .with("logfile",    self.paths.log.as_path())
            .with("outputfile", self.paths.output.as_path())
            .with("datafile",   self.paths.data.as_str())
    }
}

/// A failed iteration recorded under [`FailurePolicy::KeepGoing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub index:    usize,
    pub artifact: Option<Artifact>,
    pub message:  String,
}

impl Failure {
    fn new(index: usize, err: &Error) -> Self {
        let artifact = match err {
            Error::Artifact { artifact, .. } => Some(*artifact),
            _ => None,
        };
        Self { index, artifact, message: err.root().to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub campaign:        String,
    pub iterations:      usize,
    /// Rendered files written to disk (three per successful iteration).
    pub files_written:   usize,
    pub events_per_file: u64,
    /// Events lost to the floor division `nevents / nfiles`.
    pub dropped_events:  u64,
    pub failures:        Vec<Failure>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Events referenced by the written files.
    pub fn events_covered(&self) -> u64 {
        self.events_per_file * (self.iterations - self.failures.len()) as u64
    }
}

/// Names visible to every iteration: campaign parameters, event budget and
/// directories.
pub fn run_context(campaign: &Campaign, templates: &TemplateSet, layout: &OutputLayout, events_per_file: u64) -> Context {
    let mut ctx = campaign.params.merged(&layout.context());
    ctx.set("nevents", campaign.nevents)
        .set("nfiles", campaign.nfiles)
        .set("nevt_per_file", events_per_file)
        .set("prod_path", templates.dir.as_path());
    ctx
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|source| Error::FileWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        Error::FileWriteFailed { path: path.to_path_buf(), source }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Render and write the three files of one iteration.
///
/// All three are rendered before anything touches the disk. If a write
/// fails, files already written for this iteration are removed again.
fn write_iteration(
    campaign: &Campaign,
    templates: &TemplateSet,
    layout: &OutputLayout,
    base: &Context,
    events_per_file: u64,
    index: usize,
) -> Result<IterationRecord> {
    let record = IterationRecord::build(campaign, layout, events_per_file, index)?;
    let ctx = base.merged(&record.context());

    {
        let jobs: [(Artifact, &Template, &Path); 3] = [
            (Artifact::InitMacro,   &templates.init,   &record.paths.init),
            (Artifact::ConfigMacro, &templates.config, &record.paths.config),
            (Artifact::JobScript,   &templates.job,    &record.paths.job),
        ];

        let mut rendered = Vec::with_capacity(jobs.len());
        for (artifact, template, path) in jobs {
            let text = template.render(&ctx).map_err(|e| e.at(index, artifact))?;
            rendered.push((artifact, path, text));
        }

        let mut written: Vec<&Path> = Vec::with_capacity(rendered.len());
        for (artifact, path, text) in &rendered {
            let res = write_file(path, text).and_then(|()| {
                if *artifact == Artifact::JobScript { make_executable(path) } else { Ok(()) }
            });
            if let Err(e) = res {
                for p in &written {
                    let _ = fs::remove_file(p);
                }
                return Err(e.at(index, *artifact));
            }
            debug!(index, %artifact, path = %path.display(), "wrote");
            written.push(*path);
        }
    }
    Ok(record)
}

/// Every placeholder of every template must resolve. Keys do not depend on
/// the index, so checking the first iteration covers the whole run and a
/// missing key is reported before any file exists.
fn preflight(campaign: &Campaign, templates: &TemplateSet, layout: &OutputLayout, base: &Context, events_per_file: u64) -> Result<()> {
    let record = IterationRecord::build(campaign, layout, events_per_file, 0)?;
    let ctx = base.merged(&record.context());
    for (artifact, template) in [
        (Artifact::InitMacro,   &templates.init),
        (Artifact::ConfigMacro, &templates.config),
        (Artifact::JobScript,   &templates.job),
    ] {
        if let Some(key) = template.first_missing(&ctx) {
            let err = Error::MissingSubstitutionKey {
                template: template.name().to_owned(),
                key:      key.to_owned(),
            };
            return Err(err.at(0, artifact));
        }
    }
    Ok(())
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        " {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}]",
    ) {
        bar.set_style(style);
    }
    bar
}

fn write_manifest(path: &Path, records: &[IterationRecord]) -> Result<()> {
    let wrap = |source: csv::Error| Error::ManifestWriteFailed { path: path.to_path_buf(), source };

    let mut wtr = WriterBuilder::new().from_path(path).map_err(wrap)?;
    wtr.write_record([
        "index", "start_id", "n_evt", "initfile", "conffile", "jobfile", "logfile", "outputfile",
    ]).map_err(wrap)?;
    for r in records {
        wtr.write_record(&[
            r.index.to_string(),
            r.start_id.to_string(),
            r.n_evt.to_string(),
            r.paths.init.display().to_string(),
            r.paths.config.display().to_string(),
            r.paths.job.display().to_string(),
            r.paths.log.display().to_string(),
            r.paths.output.display().to_string(),
        ]).map_err(wrap)?;
    }
    wtr.flush().map_err(|e| wrap(e.into()))?;
    Ok(())
}

/// Render every iteration of `campaign` into `layout`.
///
/// The directories must already exist (see [`ensure_directories`]).
/// Sequential and parallel runs write identical trees.
pub fn generate(
    campaign: &Campaign,
    templates: &TemplateSet,
    layout: &OutputLayout,
    options: &GenerateOptions,
) -> Result<GenerationReport> {
    let events_per_file = campaign.events_per_file()?;
    let dropped_events  = campaign.dropped_events()?;
    if dropped_events > 0 {
        warn!(
            campaign = campaign.name,
            nevents = campaign.nevents,
            nfiles = campaign.nfiles,
            dropped_events,
            "event count not divisible by file count; remainder is not simulated"
        );
    }

    let iterations = usize::try_from(campaign.nfiles)
        .map_err(|_| Error::InvalidConfig(format!("nfiles = {} is too large", campaign.nfiles)))?;
    let base = run_context(campaign, templates, layout, events_per_file);
    preflight(campaign, templates, layout, &base, events_per_file)?;

    info!(campaign = campaign.name, iterations, events_per_file, "writing files");
    let bar = progress_bar(iterations as u64, options.progress);

    let one = |index: usize| {
        let r = write_iteration(campaign, templates, layout, &base, events_per_file, index);
        bar.inc(1);
        r
    };

    let outcomes: Vec<Result<IterationRecord>> = match (options.parallel, options.policy) {
        (true, FailurePolicy::FailFast) => {
            // Stops scheduling new iterations at the first error.
            let records = (0..iterations).into_par_iter().map(one).collect::<Result<Vec<_>>>()?;
            records.into_iter().map(Ok).collect()
        }
        // Indexed collect keeps index order regardless of scheduling.
        (true, FailurePolicy::KeepGoing) => (0..iterations).into_par_iter().map(one).collect(),
        (false, _) => {
            let mut out = Vec::with_capacity(iterations);
            for index in 0..iterations {
                let r = one(index);
                let failed = r.is_err();
                out.push(r);
                if failed && options.policy == FailurePolicy::FailFast {
                    break;
                }
            }
            out
        }
    };
    bar.finish();

    let mut records  = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(r) => records.push(r),
            Err(e) if options.policy == FailurePolicy::FailFast => return Err(e),
            Err(e) => {
                warn!(index, error = %e, "iteration failed");
                failures.push(Failure::new(index, &e));
            }
        }
    }

    if let Some(path) = &options.manifest {
        write_manifest(path, &records)?;
        info!(manifest = %path.display(), rows = records.len(), "wrote manifest");
    }

    Ok(GenerationReport {
        campaign: campaign.name.to_owned(),
        iterations,
        files_written: 3 * records.len(),
        events_per_file,
        dropped_events,
        failures,
    })
}

/// Whole production step: resolve and create the directory tree, load the
/// templates from `prod_dir`, then [`generate`].
pub fn run(
    campaign: &Campaign,
    prod_dir: &Path,
    data_root: &Path,
    options: &GenerateOptions,
) -> Result<GenerationReport> {
    campaign.events_per_file()?;
    let layout = OutputLayout::resolve(data_root, campaign.path_template, &campaign.params)?;
    ensure_directories(&layout.paths())?;
    let templates = TemplateSet::load(prod_dir, &campaign.templates)?;
    generate(campaign, &templates, &layout, options)
}
