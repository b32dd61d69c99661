//! Blocking execution of a [`Pipeline`] as a chain of child processes.

use super::Pipeline;
use crate::utils::{BackupError, Result};
use std::fs::File;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::debug;

type StderrReader = JoinHandle<String>;

impl Pipeline {
    /// Run every stage, wait for all of them and return the artifact size.
    ///
    /// Any stage exiting non-zero fails the whole pipeline; the partial
    /// artifact is removed and the captured stderr of every stage is attached
    /// to the error.
    pub fn run(&self) -> Result<u64> {
        let command = self.render();
        debug!(command = %command, "Running pipeline");

        if self.stages.is_empty() {
            return Err(BackupError::Config(format!("pipeline has no stages: {}", command)));
        }

        let output_file = File::create(&self.output)?;
        let mut children: Vec<(String, Child)> = Vec::with_capacity(self.stages.len());
        let mut stderr_readers: Vec<StderrReader> = Vec::with_capacity(self.stages.len());

        let started = self.spawn_stages(&command, output_file, &mut children, &mut stderr_readers);
        if let Err(e) = started {
            abort_children(&mut children);
            let _ = std::fs::remove_file(&self.output);
            return Err(e);
        }

        let mut failures = Vec::new();
        for (program, child) in children.iter_mut() {
            match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => failures.push(format!("{} exited with {}", program, status)),
                Err(e) => {
                    let _ = child.kill();
                    failures.push(format!("{}: wait failed: {}", program, e));
                }
            }
        }

        let captured: Vec<String> = stderr_readers
            .into_iter()
            .map(|handle| handle.join().unwrap_or_default())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if !failures.is_empty() {
            let _ = std::fs::remove_file(&self.output);
            failures.extend(captured);
            return Err(BackupError::Pipeline {
                command,
                output: failures.join("\n"),
            });
        }

        for line in &captured {
            debug!(command = %command, "stderr: {}", line);
        }

        Ok(std::fs::metadata(&self.output)?.len())
    }

    /// Start every stage, chaining stdout to stdin. Children started before a
    /// failure are left in `children` for the caller to reap.
    fn spawn_stages(
        &self,
        command: &str,
        output_file: File,
        children: &mut Vec<(String, Child)>,
        stderr_readers: &mut Vec<StderrReader>,
    ) -> Result<()> {
        let last = self.stages.len() - 1;
        let mut previous_stdout = None;

        for (index, stage) in self.stages.iter().enumerate() {
            let stdin = match previous_stdout.take() {
                Some(stdout) => Stdio::from(stdout),
                None => match &self.input {
                    Some(path) => Stdio::from(File::open(path)?),
                    None => Stdio::null(),
                },
            };
            let stdout = if index == last {
                Stdio::from(output_file.try_clone()?)
            } else {
                Stdio::piped()
            };

            let mut child = Command::new(&stage.program)
                .args(&stage.args)
                .stdin(stdin)
                .stdout(stdout)
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| BackupError::Pipeline {
                    command: command.to_string(),
                    output: format!("failed to start {}: {}", stage.program, e),
                })?;

            if let Some(mut stderr) = child.stderr.take() {
                stderr_readers.push(thread::spawn(move || {
                    let mut buf = Vec::new();
                    let _ = stderr.read_to_end(&mut buf);
                    String::from_utf8_lossy(&buf).into_owned()
                }));
            }
            previous_stdout = child.stdout.take();
            children.push((stage.program.clone(), child));
        }

        Ok(())
    }
}

fn abort_children(children: &mut [(String, Child)]) {
    for (_, child) in children.iter_mut() {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::super::{SourceKind, Stage};
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_through_filters() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("data");
        fs::write(&source, b"0123456789").unwrap();
        let output = temp_dir.path().join("data.out");

        let pipeline = Pipeline {
            kind: SourceKind::File,
            input: Some(source),
            stages: vec![Stage::new("cat"), Stage::new("cat")],
            output: output.clone(),
        };

        assert_eq!(pipeline.run().unwrap(), 10);
        assert_eq!(fs::read(&output).unwrap(), b"0123456789");
    }

    #[test]
    fn test_failing_stage_removes_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("broken.out");

        let pipeline = Pipeline {
            kind: SourceKind::Command,
            input: None,
            stages: vec![
                Stage::new("sh").arg("-c").arg("echo dump failed >&2; exit 3"),
                Stage::new("cat"),
            ],
            output: output.clone(),
        };

        match pipeline.run() {
            Err(BackupError::Pipeline { command, output: captured }) => {
                assert!(command.starts_with("sh -c"));
                assert!(captured.contains("sh exited with"));
                assert!(captured.contains("dump failed"));
            }
            other => panic!("expected pipeline error, got {:?}", other),
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_program_is_a_pipeline_error() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = Pipeline {
            kind: SourceKind::Command,
            input: None,
            stages: vec![Stage::new("echo").arg("hi"), Stage::new("no-such-program-xyz")],
            output: temp_dir.path().join("out"),
        };

        let err = pipeline.run().unwrap_err();
        assert!(err.to_string().contains("failed to start no-such-program-xyz"));
        assert!(!temp_dir.path().join("out").exists());
    }

    #[test]
    fn test_vanished_input_removes_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("gone.out");

        let pipeline = Pipeline {
            kind: SourceKind::File,
            input: Some(temp_dir.path().join("gone.db")),
            stages: vec![Stage::new("cat"), Stage::new("cat")],
            output: output.clone(),
        };

        assert!(matches!(pipeline.run(), Err(BackupError::Io(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_late_stage_failure_reaps_earlier_stages() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("late.out");

        // `yes` never exits on its own
        let pipeline = Pipeline {
            kind: SourceKind::Command,
            input: None,
            stages: vec![Stage::new("yes"), Stage::new("no-such-program-xyz")],
            output: output.clone(),
        };

        assert!(matches!(pipeline.run(), Err(BackupError::Pipeline { .. })));
        assert!(!output.exists());
    }
}
