//! Tier escalation tests for the verification engine, driven by a fake
//! build that breaks when required include lines disappear.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use incprune_core::candidate::select_candidates;
use incprune_core::fakes::RequiredLinesBuild;
use incprune_core::{FileCandidates, PrunerError, Resolution, Tier, VerificationEngine};

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn plan(path: &Path, lines: &[usize]) -> FileCandidates {
    let content = fs::read_to_string(path).unwrap();
    let set: BTreeSet<usize> = lines.iter().copied().collect();
    select_candidates(path, &set, &content)
}

fn resolution_of(report: &incprune_core::EngineReport, path: &Path, line: usize) -> (Resolution, Option<Tier>) {
    let o = report
        .outcomes
        .iter()
        .find(|o| o.candidate.path == path && o.candidate.line == line)
        .expect("candidate has an outcome");
    (o.resolution, o.tier)
}

#[tokio::test]
async fn false_positive_is_isolated_by_sequential_tier() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "a.cc",
        "#include \"safe.h\"\n#include \"needed.h\"\nint main() { return needed(); }\n",
    );
    let mut build = RequiredLinesBuild::new().require(&file, "#include \"needed.h\"");

    let report = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1, 2])])
        .await
        .unwrap();

    // pre-flight, global, per-file, then one build per candidate
    assert_eq!(build.builds(), 5);
    assert_eq!(report.verifications, 4);
    assert_eq!(report.removed(), 1);
    assert_eq!(resolution_of(&report, &file, 1), (Resolution::Committed, Some(Tier::Sequential)));
    assert_eq!(
        resolution_of(&report, &file, 2),
        (Resolution::KeptBuildFailed, Some(Tier::Sequential))
    );
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "#include \"needed.h\"\nint main() { return needed(); }\n"
    );
    assert!(build.check(), "final tree must build");
}

#[tokio::test]
async fn per_file_tier_commits_clean_files_independently() {
    let dir = tempfile::tempdir().unwrap();
    let clean = write(dir.path(), "clean.cc", "#include <a.h>\n#include <b.h>\nint c;\n");
    let mixed = write(
        dir.path(),
        "mixed.cc",
        "#include <c.h>\n#include <d.h>\n#include <e.h>\nint m;\n",
    );
    let mut build = RequiredLinesBuild::new().require(&mixed, "#include <d.h>");

    let report = VerificationEngine::new(&mut build)
        .run(vec![plan(&clean, &[1, 2]), plan(&mixed, &[1, 2, 3])])
        .await
        .unwrap();

    assert_eq!(report.removed_at(Tier::PerFile), 2);
    assert_eq!(report.removed_at(Tier::Sequential), 2);
    assert_eq!(report.removed(), 4);
    assert_eq!(fs::read_to_string(&clean).unwrap(), "int c;\n");
    assert_eq!(fs::read_to_string(&mixed).unwrap(), "#include <d.h>\nint m;\n");
    // global, per-file x2, sequential x3
    assert_eq!(report.verifications, 6);
    assert!(build.check());
}

#[tokio::test]
async fn single_candidate_files_skip_the_per_file_tier() {
    let dir = tempfile::tempdir().unwrap();
    let one = write(dir.path(), "one.cc", "#include <keep.h>\nint x;\n");
    let two = write(dir.path(), "two.cc", "#include <gone.h>\nint y;\n");
    let mut build = RequiredLinesBuild::new().require(&one, "#include <keep.h>");

    let report = VerificationEngine::new(&mut build)
        .run(vec![plan(&one, &[1]), plan(&two, &[1])])
        .await
        .unwrap();

    // global, then one sequential build per file
    assert_eq!(report.verifications, 3);
    assert_eq!(resolution_of(&report, &two, 1), (Resolution::Committed, Some(Tier::Sequential)));
    assert_eq!(fs::read_to_string(&one).unwrap(), "#include <keep.h>\nint x;\n");
    assert_eq!(fs::read_to_string(&two).unwrap(), "int y;\n");
}

#[tokio::test]
async fn total_failure_leaves_files_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let original = "#include <a.h>\r\n#include <b.h>\r\n\r\nint z;";
    let file = write(dir.path(), "z.cc", original);
    let mut build = RequiredLinesBuild::new()
        .require(&file, "#include <a.h>")
        .require(&file, "#include <b.h>");

    let report = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1, 2])])
        .await
        .unwrap();

    assert_eq!(report.removed(), 0);
    assert_eq!(report.kept(), 2);
    assert!(report.unrestored.is_empty());
    assert_eq!(fs::read(&file).unwrap(), original.as_bytes());
}

#[tokio::test]
async fn second_run_removes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "a.cc", "#include <gone.h>\n#include <kept.h>\nint a;\n");
    let mut build = RequiredLinesBuild::new().require(&file, "#include <kept.h>");

    let first = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1, 2])])
        .await
        .unwrap();
    assert_eq!(first.removed(), 1);
    let after_first = fs::read_to_string(&file).unwrap();

    // The surviving include is still flagged on the next run.
    let second = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1])])
        .await
        .unwrap();

    assert_eq!(second.removed(), 0);
    assert_eq!(fs::read_to_string(&file).unwrap(), after_first);
}

#[tokio::test]
async fn stale_candidate_is_skipped_not_failed() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "s.cc", "#include <a.h>\n#include <b.h>\nint s;\n");
    let candidates = plan(&file, &[1, 2]);
    // Line 2 changes between scan and mutation.
    fs::write(&file, "#include <a.h>\nint b;\nint s;\n").unwrap();
    let mut build = RequiredLinesBuild::new();

    let report = VerificationEngine::new(&mut build)
        .run(vec![candidates])
        .await
        .unwrap();

    // Global batch is abandoned unbuilt; the per-file batch commits line 1.
    assert_eq!(report.verifications, 1);
    assert_eq!(resolution_of(&report, &file, 1), (Resolution::Committed, Some(Tier::PerFile)));
    assert_eq!(resolution_of(&report, &file, 2), (Resolution::KeptSkipped, Some(Tier::PerFile)));
    assert_eq!(fs::read_to_string(&file).unwrap(), "int b;\nint s;\n");
}

#[tokio::test]
async fn broken_project_is_not_verifiable() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "b.cc", "#include <a.h>\n");
    let mut build = RequiredLinesBuild::broken();

    let err = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1])])
        .await
        .unwrap_err();

    assert!(matches!(err, PrunerError::PreflightBuildFailed));
    assert_eq!(build.builds(), 1);
    assert_eq!(fs::read_to_string(&file).unwrap(), "#include <a.h>\n");
}

#[tokio::test]
async fn every_commit_follows_a_passing_build_with_the_line_commented() {
    // A build that records what it saw lets us check monotonic commit directly.
    use async_trait::async_trait;
    use incprune_core::{BuildOracle, Verification};

    struct Recording {
        file: PathBuf,
        seen: Vec<(String, bool)>,
        inner: RequiredLinesBuild,
    }

    #[async_trait]
    impl BuildOracle for Recording {
        async fn verify(&mut self) -> Verification {
            let content = fs::read_to_string(&self.file).unwrap();
            let verdict = self.inner.verify().await;
            self.seen.push((content, verdict.passed()));
            verdict
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "m.cc", "#include <x.h>\n#include <y.h>\n#include <z.h>\n");
    let mut build = Recording {
        file: file.clone(),
        seen: Vec::new(),
        inner: RequiredLinesBuild::new().require(&file, "#include <y.h>"),
    };

    let report = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1, 2, 3])])
        .await
        .unwrap();

    for committed in report.committed() {
        let commented = format!("// {}", committed.content);
        assert!(
            build.seen.iter().any(|(content, passed)| *passed && content.contains(&commented)),
            "{committed} was removed without a passing build"
        );
    }
    assert_eq!(report.removed(), 2);
}

/// Passes through to a required-lines build, appending to the file on disk
/// during one chosen build.
struct EditsDuringBuild {
    file: PathBuf,
    edit_at: usize,
    builds: usize,
    inner: RequiredLinesBuild,
}

#[async_trait::async_trait]
impl incprune_core::BuildOracle for EditsDuringBuild {
    async fn verify(&mut self) -> incprune_core::Verification {
        self.builds += 1;
        let verdict = self.inner.verify().await;
        if self.builds == self.edit_at {
            let mut content = fs::read_to_string(&self.file).unwrap();
            content.push_str("// edited elsewhere\n");
            fs::write(&self.file, content).unwrap();
        }
        verdict
    }
}

const XYZ: &str = "#include <x.h>\n#include <y.h>\n#include <z.h>\nint m;\n";

#[tokio::test]
async fn sequential_commit_counts_only_once_written() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "m.cc", XYZ);
    // builds: pre-flight, global, per-file, x, y, z; edited while z builds
    let mut build = EditsDuringBuild {
        file: file.clone(),
        edit_at: 6,
        builds: 0,
        inner: RequiredLinesBuild::new().require(&file, "#include <y.h>"),
    };

    let report = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1, 2, 3])])
        .await
        .unwrap();

    // x left the file when y was commented; z never did.
    assert_eq!(resolution_of(&report, &file, 1), (Resolution::Committed, Some(Tier::Sequential)));
    assert_eq!(
        resolution_of(&report, &file, 2),
        (Resolution::KeptBuildFailed, Some(Tier::Sequential))
    );
    assert_eq!(
        resolution_of(&report, &file, 3),
        (Resolution::KeptIoFailure, Some(Tier::Sequential))
    );
    assert_eq!(report.removed(), 1);
    assert_eq!(report.unrestored, vec![file.clone()]);
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "#include <y.h>\n// #include <z.h>\nint m;\n// edited elsewhere\n"
    );
}

#[tokio::test]
async fn confirmed_line_left_commented_is_not_reported_removed() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "m.cc", XYZ);
    // edited while x builds, so commenting y is refused
    let mut build = EditsDuringBuild {
        file: file.clone(),
        edit_at: 4,
        builds: 0,
        inner: RequiredLinesBuild::new().require(&file, "#include <y.h>"),
    };

    let report = VerificationEngine::new(&mut build)
        .run(vec![plan(&file, &[1, 2, 3])])
        .await
        .unwrap();

    assert_eq!(report.removed(), 0);
    assert!(report.committed().is_empty());
    for line in 1..=3 {
        assert_eq!(resolution_of(&report, &file, line).0, Resolution::KeptIoFailure);
    }
    assert_eq!(report.unrestored, vec![file.clone()]);
    assert!(fs::read_to_string(&file).unwrap().starts_with("// #include <x.h>\n"));
}
