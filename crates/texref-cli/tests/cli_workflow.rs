#![allow(deprecated)] // cargo_bin is deprecated in assert_cmd but replacement not yet stable

use assert_cmd::Command;
use predicates::str::contains;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

type TestResult<T = ()> = std::result::Result<T, Box<dyn Error>>;

/// A throwaway LaTeX project on disk for exercising the CLI.
struct SampleProject {
    dir: TempDir,
}

impl SampleProject {
    /// Bibliography, a chapter with labels and a main file citing both.
    fn new() -> TestResult<Self> {
        let project = Self {
            dir: TempDir::new()?,
        };
        project.write(
            "refs.bib",
            "@string{tug = \"TeX Users Group\"}\n\
             @book{knuth1984,\n  title = {The TeXbook},\n  author = {Knuth, Donald E.},\n}\n",
        )?;
        project.write(
            "chapters/intro.tex",
            "\\chapter{Introduction}\n\\label{ch:intro}\n\\newtheorem{lemma}{Lemma}\n",
        )?;
        project.write("main.tex", "See \\ref{ch:intro} and \\cite{knuth1984}.\n\\cite{\n")?;
        Ok(project)
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

    fn texref(&self) -> TestResult<Command> {
        let mut cmd = Command::cargo_bin("texref")?;
        cmd.current_dir(self.root()).env_remove("RUST_LOG");
        Ok(cmd)
    }
}

#[test]
fn complete_lists_citations_as_json() -> TestResult {
    let project = SampleProject::new()?;

    let output = project
        .texref()?
        .args(["complete", "main.tex", "--line", "2"])
        .output()?;
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["state"], "cite");
    let candidates = value["candidates"].as_array().ok_or("candidates array")?;
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["identifier"], "knuth1984");
    assert_eq!(candidates[0]["annotation"], "The TeXbook (Knuth Donald E.)");
    Ok(())
}

#[test]
fn complete_text_output_for_labels() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["complete", "main.tex", "--line", "1", "--text", "\\ref{", "--format", "text"])
        .assert()
        .success()
        .stdout(contains("ch:intro\t[Ref]"));

    project
        .texref()?
        .args(["complete", "main.tex", "--line", "1", "--text", "\\begin{", "--format", "text"])
        .assert()
        .success()
        .stdout(contains("lemma"));
    Ok(())
}

#[test]
fn complete_without_trigger_exits_not_found() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["complete", "main.tex", "--line", "1", "--column", "3"])
        .assert()
        .code(1)
        .stdout(contains("\"state\":\"none\""));
    Ok(())
}

#[test]
fn def_reports_label_location() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["def", "ch:intro", "--file", "main.tex", "--format", "text", "--context"])
        .assert()
        .success()
        .stdout(contains("intro.tex:2:7"))
        .stdout(contains("\\label{ch:intro}"));
    Ok(())
}

#[test]
fn def_of_string_record_is_not_found() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["def", "tug", "--file", "main.tex"])
        .assert()
        .code(1)
        .stdout(contains("\"error\":\"NotFound\""));
    Ok(())
}

#[test]
fn goto_resolves_identifier_under_cursor() -> TestResult {
    let project = SampleProject::new()?;

    // Cursor inside \cite{knuth1984} on line 1
    project
        .texref()?
        .args(["goto", "main.tex", "--line", "1", "--column", "32", "--command", "GoTo"])
        .assert()
        .success()
        .stdout(contains("\"identifier\":\"knuth1984\""))
        .stdout(contains("refs.bib"));
    Ok(())
}

#[test]
fn goto_with_unknown_command_is_an_error() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["goto", "main.tex", "--line", "1", "--column", "10", "--command", "FixIt"])
        .assert()
        .code(2)
        .stderr(contains("FixIt"));
    Ok(())
}

#[test]
fn missing_file_is_an_error() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["complete", "nope.tex", "--line", "1", "--format", "text"])
        .assert()
        .code(2)
        .stderr(contains("File not found"));
    Ok(())
}

#[test]
fn root_describes_each_extractor() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["root", "chapters/intro.tex", "--format", "text"])
        .assert()
        .success()
        .stdout(contains("Looking for *.bib in"))
        .stdout(contains("Looking for *.tex in"));
    Ok(())
}

#[test]
fn filetypes_follow_config_file() -> TestResult {
    let project = SampleProject::new()?;

    project
        .texref()?
        .args(["filetypes", "--format", "text"])
        .assert()
        .success()
        .stdout(contains("plaintex"))
        .stdout(contains("tex"));

    project.write(".texref.toml", "filetypes = [\"latex\"]\n")?;
    project
        .texref()?
        .args(["filetypes"])
        .assert()
        .success()
        .stdout(contains("{\"filetypes\":[\"latex\"]}"));
    Ok(())
}
