use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use prodgen::campaign::{Artifact, Campaign};
use prodgen::error::Error;
use prodgen::generator::{run, FailurePolicy, GenerateOptions};
use prodgen::layout::{ensure_directories, OutputLayout};

const INIT: &str = "/control/execute {conffile}\n/nexus/RegisterTrackingAction DefaultTrackingAction\n";
const CONFIG: &str = "/nexus/random_seed {index}\n\
/nexus/persistency/start_id {start_id}\n\
/nexus/persistency/outputFile {outputfile}\n\
/run/beamOn {n_evt}\n";
const JOB: &str = "#!/bin/bash\nexport G4DATA=${{HOME}}/g4data\nnexus -b -n {n_evt} {initfile} > {logfile} 2>&1\n";

/// Write the three templates of `campaign` into `prod`, appending
/// `extra_config` to the config macro.
fn write_templates(prod: &Path, campaign: &Campaign, extra_config: &str) {
    fs::create_dir_all(prod).unwrap();
    fs::write(prod.join(&campaign.templates.init), INIT).unwrap();
    fs::write(prod.join(&campaign.templates.config), format!("{CONFIG}{extra_config}")).unwrap();
    fs::write(prod.join(&campaign.templates.job), JOB).unwrap();
}

fn quiet() -> GenerateOptions {
    GenerateOptions { progress: false, ..GenerateOptions::default() }
}

/// Every regular file under `root`, keyed by path relative to it.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out
}

#[test]
fn test_orientation_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::orientation("parallel").unwrap();
    write_templates(&prod, &campaign, "/Generator/momentum {px} {py} {pz}\n");

    let report = run(&campaign, &prod, &data, &quiet()).unwrap();
    assert!(report.is_success());
    assert_eq!(report.iterations, 10);
    assert_eq!(report.files_written, 30);
    assert_eq!(report.events_per_file, 200);
    assert_eq!(report.dropped_events, 0);

    let root = data.join("zlength/track_orientation/parallel");
    let config = fs::read_to_string(root.join("macs/NEW_track.config.3.mac")).unwrap();
    assert!(config.contains("/nexus/persistency/start_id 600\n"), "{config}");
    assert!(config.contains("/run/beamOn 200\n"));
    assert!(config.contains("/Generator/momentum 1 0 0\n"));

    let outputfile = root.join("data/nexus_parallel_3.next");
    assert!(config.contains(&format!("/nexus/persistency/outputFile {}\n", outputfile.display())));

    let job = fs::read_to_string(root.join("jobs/launch_nexus.3.sh")).unwrap();
    assert!(job.contains("${HOME}/g4data"));
    assert!(job.contains(&format!("{}", root.join("macs/NEW_track.init.3.mac").display())));
    assert!(job.contains(&format!("{}", root.join("logs/3.txt").display())));

    // Log and data files are only referenced.
    assert_eq!(fs::read_dir(root.join("data")).unwrap().count(), 0);
    assert_eq!(fs::read_dir(root.join("logs")).unwrap().count(), 0);
}

#[test]
fn test_exactly_nfiles_triples_and_nothing_else() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::mesh_performance("real").unwrap();
    write_templates(&prod, &campaign, "/Geometry/Mesh/use {use_mesh}\n");
    run(&campaign, &prod, &data, &quiet()).unwrap();

    let files = snapshot(&data);
    assert_eq!(files.len(), 9);
    assert!(files.values().all(|body| !body.is_empty()));
    for i in 0..3 {
        let base = PathBuf::from("ELsim/mesh_performance/real");
        assert!(files.contains_key(&base.join(format!("macs/new_mesh_performance.init.{i}.mac"))));
        assert!(files.contains_key(&base.join(format!("macs/new_mesh_performance.config.{i}.mac"))));
        assert!(files.contains_key(&base.join(format!("jobs/launch_nexus.{i}.sh"))));
    }
}

#[test]
fn test_remainder_dropped_not_redistributed() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::geantino().with_events(Some(31), Some(3));
    write_templates(&prod, &campaign, "");
    let report = run(&campaign, &prod, &data, &quiet()).unwrap();

    assert_eq!(report.events_per_file, 10);
    assert_eq!(report.dropped_events, 1);
    assert_eq!(report.events_covered(), 30);
    assert_eq!(report.events_per_file * 3 + report.dropped_events, 31);

    let macs = data.join("ELsim/mesh_debug/macs");
    for (i, start) in [(0, 0), (1, 10), (2, 20)] {
        let text = fs::read_to_string(macs.join(format!("new_geantino.config.{i}.mac"))).unwrap();
        assert!(text.contains(&format!("start_id {start}\n")));
        assert!(text.contains("/run/beamOn 10\n"));
        assert!(text.contains(&format!("geantino_{i}.next")));
    }
}

#[test]
fn test_missing_key_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::photo("center").unwrap();
    write_templates(&prod, &campaign, "/Generator/energy {photon_energy}\n");

    let err = run(&campaign, &prod, &data, &quiet()).unwrap_err();
    match err.root() {
        Error::MissingSubstitutionKey { key, template } => {
            assert_eq!(key, "photon_energy");
            assert_eq!(template, "new_photon_tracking.config.center.template");
        }
        other => panic!("expected MissingSubstitutionKey, got {other:?}"),
    }
    assert!(matches!(err, Error::Artifact { artifact: Artifact::ConfigMacro, .. }));
    assert!(snapshot(&data).is_empty());
}

#[test]
fn test_transparency_region_lookup() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::transparency("real", "border").unwrap();
    write_templates(&prod, &campaign, "/Generator/position {x} {y} {z}\n/Geometry/Mesh/use {use_mesh}\n");
    let report = run(&campaign, &prod, &data, &quiet()).unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.events_per_file, 20);

    let config = fs::read_to_string(
        data.join("ELsim/transparency/real/border/macs/new_mesh_transparency.config.0.mac"),
    ).unwrap();
    assert!(config.contains("/Generator/position 180 0 10\n"));
    assert!(config.contains("/Geometry/Mesh/use true\n"));
}

#[test]
fn test_unknown_region_is_rejected() {
    let err = Campaign::transparency("real", "edge").unwrap_err();
    match err {
        Error::InvalidCampaignVariant { param, value, allowed } => {
            assert_eq!(param, "region");
            assert_eq!(value, "edge");
            assert_eq!(allowed, vec!["center", "mid", "border"]);
        }
        other => panic!("expected InvalidCampaignVariant, got {other:?}"),
    }
    assert!(Campaign::transparency_sagg("1", "edge").is_err());
    assert!(Campaign::photo("edge").is_err());
}

#[test]
fn test_event_counts_above_i64_render_unsigned() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::geantino().with_events(Some(u64::MAX), Some(1));
    write_templates(&prod, &campaign, "nevents {nevents} per_file {nevt_per_file}\n");
    run(&campaign, &prod, &data, &quiet()).unwrap();

    let config = fs::read_to_string(
        data.join("ELsim/mesh_debug/macs/new_geantino.config.0.mac"),
    ).unwrap();
    assert!(config.contains("/run/beamOn 18446744073709551615\n"), "{config}");
    assert!(config.contains("nevents 18446744073709551615 per_file 18446744073709551615\n"));
    assert!(!config.contains(" -"), "{config}");
}

#[test]
fn test_sagg_paths_use_millimetres() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::transparency_sagg("2", "mid").unwrap();
    write_templates(&prod, &campaign, "/Geometry/Mesh/sagging {mesh_sagging} mm\n/Generator/x {x}\n");
    run(&campaign, &prod, &data, &quiet()).unwrap();

    let config = fs::read_to_string(
        data.join("ELsim/transparency/2mm/mid/macs/new_mesh_transparency_sagg.config.0.mac"),
    ).unwrap();
    assert!(config.contains("/Geometry/Mesh/sagging 2 mm\n"));
    assert!(config.contains("/Generator/x 90\n"));
}

#[test]
fn test_runs_are_reproducible_and_parallel_matches_sequential() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::orientation("perpendicular").unwrap().with_events(Some(1000), Some(25));
    write_templates(&prod, &campaign, "");

    run(&campaign, &prod, &data, &quiet()).unwrap();
    let first = snapshot(&data);
    run(&campaign, &prod, &data, &quiet()).unwrap();
    let second = snapshot(&data);
    assert_eq!(first, second);

    fs::remove_dir_all(&data).unwrap();
    let parallel = GenerateOptions { parallel: true, ..quiet() };
    let report = run(&campaign, &prod, &data, &parallel).unwrap();
    assert_eq!(report.files_written, 75);
    assert_eq!(snapshot(&data), first);
}

#[test]
fn test_template_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    fs::create_dir_all(&prod).unwrap();

    let err = run(&Campaign::geantino(), &prod, &tmp.path().join("data"), &quiet()).unwrap_err();
    match err {
        Error::TemplateNotFound { path } => assert_eq!(path, prod.join("new_geantino.init.template")),
        other => panic!("expected TemplateNotFound, got {other:?}"),
    }
}

#[test]
fn test_nfiles_zero_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let campaign = Campaign::geantino().with_events(None, Some(0));
    let err = run(&campaign, tmp.path(), &tmp.path().join("data"), &quiet()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
    assert!(!tmp.path().join("data").exists());
}

/// Block the config macro of iteration 1 with a directory of the same name.
fn block_config_of_second_file(data: &Path, campaign: &Campaign) -> PathBuf {
    let blocked = data
        .join("ELsim/transparency/none/center/macs")
        .join(campaign.templates.config.replace("template", "1.mac"));
    fs::create_dir_all(&blocked).unwrap();
    blocked
}

#[test]
fn test_write_failure_aborts_and_names_iteration() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::transparency("none", "center").unwrap().with_events(None, Some(4));
    write_templates(&prod, &campaign, "");
    block_config_of_second_file(&data, &campaign);

    let err = run(&campaign, &prod, &data, &quiet()).unwrap_err();
    match &err {
        Error::Artifact { index, artifact, source } => {
            assert_eq!(*index, 1);
            assert_eq!(*artifact, Artifact::ConfigMacro);
            assert!(matches!(**source, Error::FileWriteFailed { .. }));
        }
        other => panic!("expected Artifact error, got {other:?}"),
    }
    let macs = data.join("ELsim/transparency/none/center/macs");
    // Iteration 1's init macro was rolled back and nothing after it exists.
    assert!(!macs.join("new_mesh_transparency.init.1.mac").exists());
    assert!(!macs.join("new_mesh_transparency.init.2.mac").exists());
    assert!(macs.join("new_mesh_transparency.init.0.mac").exists());
}

#[test]
fn test_keep_going_reports_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::transparency("none", "center").unwrap().with_events(None, Some(4));
    write_templates(&prod, &campaign, "");
    block_config_of_second_file(&data, &campaign);

    for parallel in [false, true] {
        let options = GenerateOptions { parallel, policy: FailurePolicy::KeepGoing, ..quiet() };
        let report = run(&campaign, &prod, &data, &options).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].artifact, Some(Artifact::ConfigMacro));
        assert_eq!(report.files_written, 9);
        assert_eq!(report.events_covered(), 15);
    }
}

#[test]
fn test_manifest_lists_every_iteration() {
    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");
    let manifest = tmp.path().join("manifest.csv");

    let campaign = Campaign::orientation("parallel").unwrap();
    write_templates(&prod, &campaign, "");
    let options = GenerateOptions { manifest: Some(manifest.clone()), ..quiet() };
    run(&campaign, &prod, &data, &options).unwrap();

    let text = fs::read_to_string(&manifest).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 11);
    assert!(lines[0].starts_with("index,start_id,n_evt,initfile"));
    assert!(lines[4].starts_with("3,600,200,"));
    assert!(lines[4].ends_with("nexus_parallel_3.next"));
}

#[cfg(unix)]
#[test]
fn test_job_scripts_are_executable() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempfile::tempdir().unwrap();
    let prod = tmp.path().join("prod");
    let data = tmp.path().join("data");

    let campaign = Campaign::photo("mid").unwrap();
    write_templates(&prod, &campaign, "");
    run(&campaign, &prod, &data, &quiet()).unwrap();

    let job = data.join("ELsim/photo/mid/jobs/launch_nexus.mid.0.sh");
    let mode = fs::metadata(job).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn test_ensure_directories_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = OutputLayout::under(&tmp.path().join("a/b"));
    ensure_directories(&layout.paths()).unwrap();
    fs::write(layout.jobs.join("keep.sh"), "x").unwrap();
    ensure_directories(&layout.paths()).unwrap();

    let entries: Vec<_> = fs::read_dir(tmp.path().join("a/b")).unwrap().collect();
    assert_eq!(entries.len(), 4);
    assert_eq!(fs::read_to_string(layout.jobs.join("keep.sh")).unwrap(), "x");
}

#[test]
fn test_ensure_directories_reports_blocking_file() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("macs");
    fs::write(&blocker, "not a directory").unwrap();

    let err = ensure_directories(&[blocker.join("sub")]).unwrap_err();
    assert!(matches!(err, Error::DirectoryCreateFailed { .. }));
}
