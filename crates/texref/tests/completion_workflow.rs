use filetime::{set_file_mtime, FileTime};
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use texref::{CompletionCoordinator, CompletionRequest, Config, ExtractorKind, TexrefError};

type TestResult<T = ()> = std::result::Result<T, Box<dyn Error>>;

/// A throwaway LaTeX project on disk.
struct SampleProject {
    dir: TempDir,
}

impl SampleProject {
    fn new() -> TestResult<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, relative: &str, contents: &str) -> TestResult<PathBuf> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write and pin the modification time so staleness checks are deterministic.
    fn write_at(&self, relative: &str, contents: &str, unix_secs: i64) -> TestResult<PathBuf> {
        let path = self.write(relative, contents)?;
        set_file_mtime(&path, FileTime::from_unix_time(unix_secs, 0))?;
        Ok(path)
    }
}

fn identifiers(candidates: &[texref::Candidate]) -> Vec<&str> {
    candidates.iter().map(|c| c.identifier.as_str()).collect()
}

fn stats_for(coordinator: &CompletionCoordinator, kind: ExtractorKind) -> texref::ExtractorStats {
    coordinator
        .stats()
        .into_iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, s)| s)
        .unwrap_or_default()
}

#[test]
fn label_and_ref_across_files() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "")?;
    let a = project.write("a.tex", "\\section{Introduction}\n\\label{intro}\n")?;
    let b = project.write("b.tex", "As shown in \\ref{intro}\n")?;

    let coordinator = CompletionCoordinator::new(Config::default());
    let line = r"As shown in \ref{";
    let request = CompletionRequest::new(&b, line, line.len());

    assert!(coordinator.should_use(&request));
    let candidates = coordinator.compute_candidates(&request);
    assert!(identifiers(&candidates).contains(&"intro"));

    let location = coordinator.resolve_definition("intro")?;
    assert_eq!(location.file, a);
    assert_eq!((location.line, location.column), (2, 7));
    Ok(())
}

#[test]
fn goto_round_trip_reports_line_and_column() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "")?;
    let mut contents = String::new();
    for i in 1..12 {
        contents.push_str(&format!("line {}\n", i));
    }
    contents.push_str("\\label{fig1}\n");
    let file = project.write("figures.tex", &contents)?;

    let coordinator = CompletionCoordinator::new(Config::default());
    coordinator.compute_candidates(&CompletionRequest::new(&file, r"\ref{", 5));

    let location = coordinator.resolve_definition("fig1")?;
    assert_eq!(location.file, file);
    assert_eq!(location.line, 12);
    assert_eq!(location.column, 7);
    Ok(())
}

#[test]
fn unchanged_files_are_not_rescanned() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "@book{knuth1984,\n  title = {The TeXbook},\n}\n")?;
    let file = project.write("main.tex", "\\label{intro}\n")?;

    let coordinator = CompletionCoordinator::new(Config::default());
    let request = CompletionRequest::new(&file, r"\ref{", 5);

    let first = coordinator.compute_candidates(&request);
    let second = coordinator.compute_candidates(&request);
    assert_eq!(first, second);

    let stats = stats_for(&coordinator, ExtractorKind::Reference);
    assert_eq!(stats.scans, 1);
    assert_eq!(stats.cache_hits, 1);

    // Citations were never requested, so the bibliography was never read
    assert_eq!(stats_for(&coordinator, ExtractorKind::BibEntry).scans, 0);
    Ok(())
}

#[test]
fn modified_file_replaces_stale_candidates() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "")?;
    let file = project.write_at("main.tex", "\\label{old}\n", 1_000_000)?;

    let coordinator = CompletionCoordinator::new(Config::default());
    let request = CompletionRequest::new(&file, r"\ref{", 5);
    assert_eq!(identifiers(&coordinator.compute_candidates(&request)), vec!["old"]);

    project.write_at("main.tex", "\\label{new}\n", 2_000_000)?;
    assert_eq!(identifiers(&coordinator.compute_candidates(&request)), vec!["new"]);

    assert!(matches!(
        coordinator.resolve_definition("old"),
        Err(TexrefError::DefinitionNotFound(_))
    ));
    assert_eq!(coordinator.resolve_definition("new")?.file, file);
    Ok(())
}

#[test]
fn shared_label_resolves_after_one_definition_is_removed() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "")?;
    let a = project.write_at("a.tex", "\\label{shared}\n", 1_000_000)?;
    let b = project.write_at("b.tex", "\\label{shared}\n", 1_000_000)?;

    let coordinator = CompletionCoordinator::new(Config::default());
    let request = CompletionRequest::new(&a, r"\ref{", 5);
    coordinator.compute_candidates(&request);

    // Drop the label from whichever file currently wins the lookup
    let winner = coordinator.resolve_definition("shared")?.file;
    let survivor = if winner == a { b.clone() } else { a.clone() };
    let relative = winner.file_name().ok_or("file name")?.to_string_lossy().to_string();
    project.write_at(&relative, "no labels here\n", 2_000_000)?;

    assert_eq!(identifiers(&coordinator.compute_candidates(&request)), vec!["shared"]);
    assert_eq!(coordinator.resolve_definition("shared")?.file, survivor);
    Ok(())
}

#[test]
fn deleted_file_loses_its_definitions() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "")?;
    let main = project.write("main.tex", "\\label{kept}\n")?;
    let gone = project.write("gone.tex", "\\label{old}\n")?;

    let coordinator = CompletionCoordinator::new(Config::default());
    let request = CompletionRequest::new(&main, r"\ref{", 5);
    coordinator.compute_candidates(&request);
    assert_eq!(coordinator.resolve_definition("old")?.file, gone);

    fs::remove_file(&gone)?;
    assert_eq!(identifiers(&coordinator.compute_candidates(&request)), vec!["kept"]);
    assert!(matches!(
        coordinator.resolve_definition("old"),
        Err(TexrefError::DefinitionNotFound(_))
    ));
    assert_eq!(coordinator.resolve_definition("kept")?.file, main);

    let stats = stats_for(&coordinator, ExtractorKind::Reference);
    assert_eq!(stats.tracked_files, 1);
    Ok(())
}

#[test]
fn duplicate_bib_keys_and_string_records() -> TestResult {
    let bib = "@string{jfp = \"Journal of Functional Programming\"}\n\
               @article{wadler1992,\n  title = {Monads for functional programming},\n  author = {Wadler, Philip},\n}\n\
               @inproceedings{wadler1992,\n  title = {Duplicate},\n}\n";

    for use_record_reader in [true, false] {
        let project = SampleProject::new()?;
        project.write("refs.bib", bib)?;
        let file = project.write("main.tex", "")?;

        let coordinator = CompletionCoordinator::new(Config {
            use_record_reader,
            ..Config::default()
        });
        let candidates = coordinator.compute_candidates(&CompletionRequest::new(&file, r"\cite{", 6));

        assert_eq!(identifiers(&candidates), vec!["wadler1992"], "record reader: {}", use_record_reader);
        assert!(coordinator.resolve_definition("jfp").is_err());
    }
    Ok(())
}

#[test]
fn escape_guard_skips_classification() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "@book{knuth1984,\n}\n")?;
    let file = project.write("main.tex", "")?;

    let coordinator = CompletionCoordinator::new(Config::default());
    let request = CompletionRequest::new(&file, r"\cite{", 6).with_start_column(0);

    assert!(!coordinator.should_use(&request));
    assert!(coordinator.compute_candidates(&request).is_empty());
    Ok(())
}

#[test]
fn project_without_marker_yields_no_candidates() -> TestResult {
    let project = SampleProject::new()?;
    let file = project.write("main.tex", "\\label{intro}\n")?;

    let coordinator = CompletionCoordinator::new(Config {
        marker_extension: "texref-no-such-marker".to_string(),
        ..Config::default()
    });
    let candidates = coordinator.compute_candidates(&CompletionRequest::new(&file, r"\ref{", 5));
    assert!(candidates.is_empty());
    Ok(())
}

#[test]
fn nested_chapters_share_the_root() -> TestResult {
    let project = SampleProject::new()?;
    project.write("refs.bib", "")?;
    project.write("chapters/one.tex", "\\label{ch:one}\n")?;
    let two = project.write("chapters/two/two.tex", "\\label{ch:two}\n")?;

    let coordinator = CompletionCoordinator::new(Config::default());
    let mut ids: Vec<String> = coordinator
        .compute_candidates(&CompletionRequest::new(&two, r"\ref{", 5))
        .into_iter()
        .map(|c| c.identifier)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["ch:one", "ch:two"]);
    Ok(())
}
